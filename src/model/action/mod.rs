//! Actions and their lifecycle.
//!
//! An [`Action`] moves through
//! `Inactive -> Trigged -> Activated -> Active -> Deactivated -> Inactive`.
//! `Activated` and `Deactivated` are pass-through states held for exactly one
//! step so observers (state conditions, the owning event) can see the edge.

pub mod dynamics;
pub mod instant;
pub mod lateral;
pub mod longitudinal;
pub mod synchronize;

use std::fmt;

use log::{debug, warn};

use crate::core::EntityId;
use crate::model::entity::Entities;
use crate::model::story::TerminationKind;
use crate::road::RoadGeometry;

pub use dynamics::{DynamicsDimension, DynamicsShape, TransitionDynamics};
pub use instant::{AssignRouteAction, AutonomousAction, AutonomyDomain, TeleportAction};
pub use lateral::{LaneChangeAction, LaneChangeTarget, LaneOffsetAction, LaneOffsetTarget};
pub use longitudinal::{
    DistanceTarget, DynamicConstraints, LongitudinalDistanceAction, RelativeValueType, SpeedAction,
    SpeedTarget,
};
pub use synchronize::{FinalSpeed, SynchronizeAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Inactive,
    Trigged,
    Activated,
    Active,
    Deactivated,
}

impl ActionState {
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ActionState::Trigged | ActionState::Activated | ActionState::Active
        )
    }
}

/// Result of stepping a running behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Running,
    Done,
}

/// Inputs shared by every action step of one tick.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub dt: f64,
    pub simulation_time: f64,
    /// Entity state committed at the end of the previous tick. Reference
    /// entities are always read from here, never from the working copy.
    pub snapshot: &'a Entities,
    pub road: &'a dyn RoadGeometry,
}

/// A command raised by a user-defined action, for the driver to handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCommand {
    pub action: String,
    pub command_type: String,
    pub content: String,
}

/// Scenario-level side effects collected during a tick.
#[derive(Debug, Default)]
pub struct Effects {
    pub quit: bool,
    pub commands: Vec<UserCommand>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GlobalAction {
    /// Request the driver to end the run.
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserDefinedAction {
    Command { command_type: String, content: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PrivateAction {
    Speed(SpeedAction),
    LongitudinalDistance(LongitudinalDistanceAction),
    LaneChange(LaneChangeAction),
    LaneOffset(LaneOffsetAction),
    Synchronize(SynchronizeAction),
    Teleport(TeleportAction),
    AssignRoute(AssignRouteAction),
    Autonomous(AutonomousAction),
}

impl PrivateAction {
    pub fn type_name(&self) -> &'static str {
        match self {
            PrivateAction::Speed(_) => "SpeedAction",
            PrivateAction::LongitudinalDistance(_) => "LongitudinalDistanceAction",
            PrivateAction::LaneChange(_) => "LaneChangeAction",
            PrivateAction::LaneOffset(_) => "LaneOffsetAction",
            PrivateAction::Synchronize(_) => "SynchronizeAction",
            PrivateAction::Teleport(_) => "TeleportAction",
            PrivateAction::AssignRoute(_) => "AssignRouteAction",
            PrivateAction::Autonomous(_) => "AutonomousAction",
        }
    }

    /// Actions that drive motion over time; skipped for external owners.
    fn is_motion(&self) -> bool {
        matches!(
            self,
            PrivateAction::Speed(_)
                | PrivateAction::LongitudinalDistance(_)
                | PrivateAction::LaneChange(_)
                | PrivateAction::LaneOffset(_)
                | PrivateAction::Synchronize(_)
        )
    }

    fn reset(&mut self) {
        match self {
            PrivateAction::Speed(a) => a.reset(),
            PrivateAction::LaneChange(a) => a.reset(),
            PrivateAction::LaneOffset(a) => a.reset(),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    Global(GlobalAction),
    UserDefined(UserDefinedAction),
    Private { owner: EntityId, action: PrivateAction },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub name: String,
    pub kind: ActionKind,
    state: ActionState,
    /// Behavior finished during the current activation.
    finished: bool,
    /// Stopped mid-tick; hold `Deactivated` through the next step.
    just_stopped: bool,
    termination: Option<TerminationKind>,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.name, self.state)
    }
}

impl Action {
    pub fn new(name: &str, kind: ActionKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            state: ActionState::Inactive,
            finished: false,
            just_stopped: false,
            termination: None,
        }
    }

    pub fn state(&self) -> ActionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// How the last activation ended.
    pub fn termination(&self) -> Option<TerminationKind> {
        self.termination
    }

    pub fn owner(&self) -> Option<EntityId> {
        match &self.kind {
            ActionKind::Private { owner, .. } => Some(*owner),
            _ => None,
        }
    }

    /// Request activation. Ignored unless the action is idle.
    pub fn trig(&mut self) {
        if self.state != ActionState::Inactive {
            debug!("Action {} already running, trig ignored", self.name);
            return;
        }
        if let ActionKind::Private { action, .. } = &mut self.kind {
            action.reset();
        }
        self.finished = false;
        self.state = ActionState::Trigged;
        debug!("Action {} trigged", self.name);
    }

    /// Stop immediately; the action shows `Deactivated` for one step.
    pub fn stop(&mut self) {
        if self.state.is_active() {
            self.state = ActionState::Deactivated;
            self.termination = Some(TerminationKind::Cancel);
            self.just_stopped = true;
            debug!("Action {} stopped", self.name);
        }
    }

    /// Advance the lifecycle and, while running, the behavior.
    pub fn step(&mut self, ctx: &StepContext<'_>, entities: &mut Entities, effects: &mut Effects) {
        match self.state {
            ActionState::Inactive => {}
            ActionState::Deactivated => {
                if !std::mem::take(&mut self.just_stopped) {
                    self.state = ActionState::Inactive;
                }
            }
            ActionState::Trigged => {
                self.state = ActionState::Activated;
                self.run(ctx, entities, effects);
            }
            ActionState::Activated | ActionState::Active => {
                self.state = ActionState::Active;
                if !self.finished {
                    self.run(ctx, entities, effects);
                }
                if self.finished {
                    self.state = ActionState::Deactivated;
                    self.termination = Some(TerminationKind::End);
                    debug!("Action {} done", self.name);
                }
            }
        }
    }

    fn run(&mut self, ctx: &StepContext<'_>, entities: &mut Entities, effects: &mut Effects) {
        let progress = match &mut self.kind {
            ActionKind::Global(GlobalAction::Quit) => {
                effects.quit = true;
                Progress::Done
            }
            ActionKind::UserDefined(UserDefinedAction::Command {
                command_type,
                content,
            }) => {
                effects.commands.push(UserCommand {
                    action: self.name.clone(),
                    command_type: command_type.clone(),
                    content: content.clone(),
                });
                Progress::Done
            }
            ActionKind::Private { owner, action } => {
                match entities.get_mut(*owner) {
                    Some(entity) if entity.control.is_external() && action.is_motion() => {
                        debug!("{}: {} skipped, entity is externally controlled", self.name, entity.name);
                        Progress::Done
                    }
                    Some(entity) => match action {
                        PrivateAction::Speed(a) => a.step(entity, ctx),
                        PrivateAction::LongitudinalDistance(a) => a.step(entity, ctx),
                        PrivateAction::LaneChange(a) => a.step(entity, ctx),
                        PrivateAction::LaneOffset(a) => a.step(entity, ctx),
                        PrivateAction::Synchronize(a) => a.step(entity, ctx),
                        PrivateAction::Teleport(a) => {
                            a.apply(entity, ctx);
                            Progress::Done
                        }
                        PrivateAction::AssignRoute(a) => {
                            a.apply(entity);
                            Progress::Done
                        }
                        PrivateAction::Autonomous(a) => {
                            a.apply(entity);
                            Progress::Done
                        }
                    },
                    None => {
                        warn!("Action {}: owner {} does not exist", self.name, owner);
                        Progress::Done
                    }
                }
            }
        };
        if progress == Progress::Done {
            self.finished = true;
        }
    }
}
