//! The storyboard hierarchy and its per-tick state machine.
//!
//! Stories own Acts, Acts own ManeuverGroups (plus their start/stop gates),
//! ManeuverGroups bind actors to Maneuvers, and Maneuvers own Events. Event
//! arbitration works on [`EventAddr`] indices so that any event can inspect
//! any other while one of them is being mutated.

use std::collections::HashMap;
use std::collections::HashSet;
use std::str::FromStr;

use log::{debug, info, warn};

use crate::core::EntityId;
use crate::model::action::{Action, ActionState, Effects, StepContext};
use crate::model::condition::{ConditionKind, EvalContext, Trigger};
use crate::model::entity::Entities;
use crate::parameters::Parameter;
use crate::types::{Validate, ValidationResult};
use crate::validation_utils::{_return, find_duplicates};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoryElementType {
    Story,
    Act,
    ManeuverGroup,
    Maneuver,
    Event,
    Action,
}

impl FromStr for StoryElementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "story" => Ok(StoryElementType::Story),
            "act" | "scene" => Ok(StoryElementType::Act),
            "maneuverGroup" | "sequence" => Ok(StoryElementType::ManeuverGroup),
            "maneuver" => Ok(StoryElementType::Maneuver),
            "event" => Ok(StoryElementType::Event),
            "action" => Ok(StoryElementType::Action),
            other => Err(format!("invalid story element type '{}'", other)),
        }
    }
}

/// How a story element left its running state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationKind {
    /// Ran to completion.
    End,
    /// Stopped by a stop gate or an overwriting event.
    Cancel,
}

/// What a state condition observes of a story element on a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElementPhase {
    #[default]
    Standby,
    /// Entered its running state on the observed tick.
    Started,
    Running,
    /// Left its running state on the observed tick.
    Ended(TerminationKind),
}

impl ElementPhase {
    fn rank(self) -> u8 {
        match self {
            ElementPhase::Standby => 0,
            ElementPhase::Running => 1,
            ElementPhase::Started | ElementPhase::Ended(_) => 2,
        }
    }
}

/// Snapshot of every named element's phase, taken at the tick boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoryPhases {
    phases: HashMap<(StoryElementType, String), ElementPhase>,
}

impl StoryPhases {
    /// Record a phase. Same-named elements merge, transitions win.
    pub fn insert(&mut self, element_type: StoryElementType, name: &str, phase: ElementPhase) {
        let slot = self
            .phases
            .entry((element_type, name.to_string()))
            .or_default();
        if phase.rank() > slot.rank() {
            *slot = phase;
        }
    }

    pub fn get(&self, element_type: StoryElementType, name: &str) -> ElementPhase {
        self.phases
            .get(&(element_type, name.to_string()))
            .copied()
            .unwrap_or_default()
    }
}

/// Derived phase for elements whose activity follows their children.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct PhaseTracker {
    running: bool,
    phase: ElementPhase,
}

impl PhaseTracker {
    fn update(&mut self, running: bool, termination: TerminationKind) {
        self.phase = match (self.running, running) {
            (false, true) => ElementPhase::Started,
            (true, true) => ElementPhase::Running,
            (true, false) => ElementPhase::Ended(termination),
            (false, false) => ElementPhase::Standby,
        };
        self.running = running;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    Inactive,
    Activated,
    Active,
    Deactivated,
}

impl ElementState {
    pub fn is_active(self) -> bool {
        matches!(self, ElementState::Activated | ElementState::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    Inactive,
    Activated,
    Active,
    Deactivated,
    /// Queued behind an active conflicting event.
    Waiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventPriority {
    #[default]
    Overwrite,
    Following,
    Skip,
}

impl FromStr for EventPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overwrite" => Ok(EventPriority::Overwrite),
            "following" => Ok(EventPriority::Following),
            "skip" => Ok(EventPriority::Skip),
            other => Err(format!("invalid event priority '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub priority: EventPriority,
    pub actions: Vec<Action>,
    /// Empty means the event starts as soon as it is eligible.
    pub start_trigger: Trigger,
    state: EventState,
    termination: Option<TerminationKind>,
    /// Started during the current execution of its maneuver group.
    executed: bool,
}

impl Event {
    pub fn new(name: &str, priority: EventPriority, actions: Vec<Action>, start_trigger: Trigger) -> Self {
        Self {
            name: name.to_string(),
            priority,
            actions,
            start_trigger,
            state: EventState::Inactive,
            termination: None,
            executed: false,
        }
    }

    pub fn state(&self) -> EventState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, EventState::Activated | EventState::Active)
    }

    pub fn termination(&self) -> Option<TerminationKind> {
        self.termination
    }

    fn start(&mut self) {
        info!("Event {} started", self.name);
        self.state = EventState::Activated;
        self.termination = None;
        self.executed = true;
        self.actions.iter_mut().for_each(Action::trig);
    }

    fn stop(&mut self) {
        match self.state {
            EventState::Activated | EventState::Active => {
                info!("Event {} stopped", self.name);
                self.state = EventState::Deactivated;
                self.termination = Some(TerminationKind::Cancel);
                self.actions.iter_mut().for_each(Action::stop);
            }
            EventState::Waiting => self.state = EventState::Inactive,
            _ => {}
        }
    }

    fn settle(&mut self) {
        self.state = match self.state {
            EventState::Activated => EventState::Active,
            EventState::Deactivated => EventState::Inactive,
            other => other,
        };
    }

    fn phase(&self) -> ElementPhase {
        match self.state {
            EventState::Activated => ElementPhase::Started,
            EventState::Active => ElementPhase::Running,
            EventState::Deactivated => {
                ElementPhase::Ended(self.termination.unwrap_or(TerminationKind::End))
            }
            EventState::Inactive | EventState::Waiting => ElementPhase::Standby,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Maneuver {
    pub name: String,
    /// Local parameter declarations, as declared.
    pub parameters: Vec<Parameter>,
    pub events: Vec<Event>,
    tracker: PhaseTracker,
}

impl Maneuver {
    pub fn new(name: &str, parameters: Vec<Parameter>, events: Vec<Event>) -> Self {
        Self {
            name: name.to_string(),
            parameters,
            events,
            tracker: PhaseTracker::default(),
        }
    }

    /// Index of the event currently running, if any.
    pub fn active_event_index(&self) -> Option<usize> {
        self.events.iter().position(Event::is_active)
    }

    /// Index of the event queued behind a conflicting one, if any.
    pub fn waiting_event_index(&self) -> Option<usize> {
        self.events
            .iter()
            .position(|e| e.state == EventState::Waiting)
    }

    fn is_busy(&self) -> bool {
        self.events
            .iter()
            .any(|e| e.is_active() || e.state == EventState::Waiting || e.state == EventState::Deactivated)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManeuverGroup {
    pub name: String,
    pub number_of_executions: u32,
    pub actors: Vec<EntityId>,
    pub maneuvers: Vec<Maneuver>,
    executions: u32,
    completed: bool,
    tracker: PhaseTracker,
}

impl ManeuverGroup {
    pub fn new(name: &str, number_of_executions: u32, actors: Vec<EntityId>, maneuvers: Vec<Maneuver>) -> Self {
        Self {
            name: name.to_string(),
            number_of_executions,
            actors,
            maneuvers,
            executions: 0,
            completed: false,
            tracker: PhaseTracker::default(),
        }
    }

    /// Completed executions in the current run of the act.
    pub fn executions(&self) -> u32 {
        self.executions
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    fn events(&self) -> impl Iterator<Item = &Event> {
        self.maneuvers.iter().flat_map(|m| m.events.iter())
    }

    fn events_mut(&mut self) -> impl Iterator<Item = &mut Event> {
        self.maneuvers.iter_mut().flat_map(|m| m.events.iter_mut())
    }

    fn restart(&mut self) {
        self.executions = 0;
        self.completed = false;
        self.rearm();
    }

    /// Make every event eligible again for the next execution.
    fn rearm(&mut self) {
        for event in self.events_mut() {
            event.executed = false;
            event.start_trigger.reset();
        }
    }

    /// Count a finished execution once every event has run and settled.
    fn account_execution(&mut self) {
        if self.completed {
            return;
        }
        let finished = self
            .events()
            .all(|e| e.executed && e.state == EventState::Inactive);
        if !finished {
            return;
        }
        self.executions += 1;
        if self.executions >= self.number_of_executions {
            debug!("ManeuverGroup {} completed {} executions", self.name, self.executions);
            self.completed = true;
        } else {
            debug!("ManeuverGroup {} execution {} done", self.name, self.executions);
            self.rearm();
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Act {
    pub name: String,
    pub maneuver_groups: Vec<ManeuverGroup>,
    /// Empty means the act starts on the first tick.
    pub start_trigger: Trigger,
    /// Empty means the act only ends when its groups complete.
    pub stop_trigger: Trigger,
    state: ElementState,
    termination: Option<TerminationKind>,
    starts: u32,
}

impl Act {
    pub fn new(name: &str, maneuver_groups: Vec<ManeuverGroup>, start_trigger: Trigger, stop_trigger: Trigger) -> Self {
        Self {
            name: name.to_string(),
            maneuver_groups,
            start_trigger,
            stop_trigger,
            state: ElementState::Inactive,
            termination: None,
            starts: 0,
        }
    }

    pub fn state(&self) -> ElementState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    fn start(&mut self) {
        info!("Act {} started", self.name);
        self.state = ElementState::Activated;
        self.termination = None;
        self.starts += 1;
        self.maneuver_groups.iter_mut().for_each(ManeuverGroup::restart);
    }

    fn end(&mut self, kind: TerminationKind) {
        info!("Act {} {}", self.name, if kind == TerminationKind::End { "ended" } else { "stopped" });
        self.state = ElementState::Deactivated;
        self.termination = Some(kind);
        if kind == TerminationKind::Cancel {
            for group in &mut self.maneuver_groups {
                group.events_mut().for_each(Event::stop);
            }
        }
    }

    fn settle(&mut self) {
        self.state = match self.state {
            ElementState::Activated => ElementState::Active,
            ElementState::Deactivated => ElementState::Inactive,
            other => other,
        };
    }

    fn phase(&self) -> ElementPhase {
        match self.state {
            ElementState::Activated => ElementPhase::Started,
            ElementState::Active => ElementPhase::Running,
            ElementState::Deactivated => ElementPhase::Ended(self.termination.unwrap_or(TerminationKind::End)),
            ElementState::Inactive => ElementPhase::Standby,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Story {
    pub name: String,
    pub acts: Vec<Act>,
    tracker: PhaseTracker,
}

impl Story {
    pub fn new(name: &str, acts: Vec<Act>) -> Self {
        Self {
            name: name.to_string(),
            acts,
            tracker: PhaseTracker::default(),
        }
    }
}

/// Index path of one event in the storyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventAddr {
    pub story: usize,
    pub act: usize,
    pub group: usize,
    pub maneuver: usize,
    pub event: usize,
}

impl EventAddr {
    fn same_maneuver(&self, other: &EventAddr) -> bool {
        (self.story, self.act, self.group, self.maneuver)
            == (other.story, other.act, other.group, other.maneuver)
    }
}

/// Actions applied once before the first story tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Init {
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoryBoard {
    pub stories: Vec<Story>,
    /// Ends the whole run when it fires.
    pub stop_trigger: Trigger,
}

impl StoryBoard {
    pub fn event(&self, addr: EventAddr) -> &Event {
        &self.stories[addr.story].acts[addr.act].maneuver_groups[addr.group].maneuvers[addr.maneuver].events
            [addr.event]
    }

    fn event_mut(&mut self, addr: EventAddr) -> &mut Event {
        &mut self.stories[addr.story].acts[addr.act].maneuver_groups[addr.group].maneuvers[addr.maneuver].events
            [addr.event]
    }

    fn group(&self, addr: EventAddr) -> &ManeuverGroup {
        &self.stories[addr.story].acts[addr.act].maneuver_groups[addr.group]
    }

    /// Every event address, in document order.
    pub fn event_addresses(&self) -> Vec<EventAddr> {
        let mut addresses = Vec::new();
        for (story, s) in self.stories.iter().enumerate() {
            for (act, a) in s.acts.iter().enumerate() {
                for (group, g) in a.maneuver_groups.iter().enumerate() {
                    for (maneuver, m) in g.maneuvers.iter().enumerate() {
                        for event in 0..m.events.len() {
                            addresses.push(EventAddr {
                                story,
                                act,
                                group,
                                maneuver,
                                event,
                            });
                        }
                    }
                }
            }
        }
        addresses
    }

    pub fn find_event(&self, name: &str) -> Option<&Event> {
        self.events().find(|e| e.name == name)
    }

    pub fn find_act(&self, name: &str) -> Option<&Act> {
        self.stories
            .iter()
            .flat_map(|s| s.acts.iter())
            .find(|a| a.name == name)
    }

    pub fn find_maneuver_group(&self, name: &str) -> Option<&ManeuverGroup> {
        self.stories
            .iter()
            .flat_map(|s| s.acts.iter())
            .flat_map(|a| a.maneuver_groups.iter())
            .find(|g| g.name == name)
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.stories
            .iter()
            .flat_map(|s| s.acts.iter())
            .flat_map(|a| a.maneuver_groups.iter())
            .flat_map(|g| g.events())
    }

    /// Two events conflict when they belong to the same maneuver or their
    /// maneuver groups share an actor.
    pub fn conflicts(&self, a: EventAddr, b: EventAddr) -> bool {
        if a == b {
            return false;
        }
        if a.same_maneuver(&b) {
            return true;
        }
        let actors_b = &self.group(b).actors;
        self.group(a).actors.iter().any(|actor| actors_b.contains(actor))
    }

    fn active_conflicts(&self, addr: EventAddr, all: &[EventAddr]) -> Vec<EventAddr> {
        all.iter()
            .copied()
            .filter(|other| self.event(*other).is_active() && self.conflicts(addr, *other))
            .collect()
    }

    /// Apply the priority protocol to an event whose gate just fired.
    fn arbitrate(&mut self, addr: EventAddr, all: &[EventAddr]) {
        let active = self.active_conflicts(addr, all);
        if active.is_empty() {
            self.event_mut(addr).start();
            return;
        }

        let name = self.event(addr).name.clone();
        match self.event(addr).priority {
            EventPriority::Overwrite => {
                for other in active {
                    info!("Event {} overwrites {}", name, self.event(other).name);
                    self.event_mut(other).stop();
                }
                self.event_mut(addr).start();
            }
            EventPriority::Following => {
                // a single waiter per conflict set: the newest replaces older ones
                let waiters: Vec<_> = all
                    .iter()
                    .copied()
                    .filter(|other| {
                        self.event(*other).state == EventState::Waiting && self.conflicts(addr, *other)
                    })
                    .collect();
                for other in waiters {
                    info!("Event {} replaces waiting event {}", name, self.event(other).name);
                    self.event_mut(other).state = EventState::Inactive;
                }
                info!("Event {} waiting for {}", name, self.event(active[0]).name);
                self.event_mut(addr).state = EventState::Waiting;
            }
            EventPriority::Skip => {
                info!("Event {} skipped, {} is running", name, self.event(active[0]).name);
            }
        }
    }

    /// Phases of all named elements as of now.
    pub fn phases(&self) -> StoryPhases {
        let mut phases = StoryPhases::default();
        for story in &self.stories {
            phases.insert(StoryElementType::Story, &story.name, story.tracker.phase);
            for act in &story.acts {
                phases.insert(StoryElementType::Act, &act.name, act.phase());
                for group in &act.maneuver_groups {
                    phases.insert(StoryElementType::ManeuverGroup, &group.name, group.tracker.phase);
                    for maneuver in &group.maneuvers {
                        phases.insert(StoryElementType::Maneuver, &maneuver.name, maneuver.tracker.phase);
                        for event in &maneuver.events {
                            phases.insert(StoryElementType::Event, &event.name, event.phase());
                            for action in &event.actions {
                                phases.insert(StoryElementType::Action, &action.name, action_phase(action));
                            }
                        }
                    }
                }
            }
        }
        phases
    }

    /// Advance the whole storyboard by one tick.
    pub fn step(
        &mut self,
        eval: &EvalContext<'_>,
        ctx: &StepContext<'_>,
        entities: &mut Entities,
        effects: &mut Effects,
    ) {
        let stop = !self.stop_trigger.is_empty() && self.stop_trigger.update(eval);

        let all = self.event_addresses();
        for addr in &all {
            self.event_mut(*addr).settle();
        }

        self.step_acts(eval);

        // after settling, so cancelled acts and events show the transition
        if stop {
            info!("Storyboard stop trigger fired at {:.3}", eval.simulation_time);
            effects.quit = true;
            for act in self.stories.iter_mut().flat_map(|s| s.acts.iter_mut()) {
                if act.is_active() {
                    act.end(TerminationKind::Cancel);
                }
            }
        }

        let live: Vec<_> = all
            .iter()
            .copied()
            .filter(|addr| self.stories[addr.story].acts[addr.act].is_active())
            .collect();

        for addr in &live {
            if self.event(*addr).state == EventState::Waiting
                && self.active_conflicts(*addr, &all).is_empty()
            {
                debug!("Promoting waiting event {}", self.event(*addr).name);
                self.event_mut(*addr).start();
            }
        }

        for addr in &live {
            let group_done = self.group(*addr).completed;
            let event = self.event(*addr);
            if group_done || event.executed || event.state != EventState::Inactive {
                continue;
            }
            let event = self.event_mut(*addr);
            let fired = event.start_trigger.is_empty() || event.start_trigger.update(eval);
            if fired {
                self.arbitrate(*addr, &all);
            }
        }

        // every action is stepped so stopped ones settle even after their act ended
        for addr in &all {
            let event = self.event_mut(*addr);
            for action in &mut event.actions {
                action.step(ctx, entities, effects);
            }
            if event.state == EventState::Active
                && event.actions.iter().all(|a| a.state() == ActionState::Inactive)
            {
                info!("Event {} ended", event.name);
                event.state = EventState::Deactivated;
                event.termination = Some(TerminationKind::End);
            }
        }

        for act in self.stories.iter_mut().flat_map(|s| s.acts.iter_mut()) {
            if !act.is_active() {
                continue;
            }
            act.maneuver_groups.iter_mut().for_each(ManeuverGroup::account_execution);
            if act.maneuver_groups.iter().all(|g| g.completed) {
                act.end(TerminationKind::End);
            }
        }

        self.update_trackers();
    }

    fn step_acts(&mut self, eval: &EvalContext<'_>) {
        for act in self.stories.iter_mut().flat_map(|s| s.acts.iter_mut()) {
            act.settle();
            match act.state {
                ElementState::Inactive => {
                    let fire = if act.start_trigger.is_empty() {
                        act.starts == 0
                    } else {
                        act.start_trigger.update(eval)
                    };
                    if fire {
                        act.start();
                    }
                }
                ElementState::Active => {
                    if !act.stop_trigger.is_empty() && act.stop_trigger.update(eval) {
                        act.end(TerminationKind::Cancel);
                    }
                }
                _ => {}
            }
        }
    }

    fn update_trackers(&mut self) {
        for story in &mut self.stories {
            let mut story_running = false;
            let mut story_termination = TerminationKind::End;
            for act in &mut story.acts {
                story_running |= act.is_active();
                if let Some(kind) = act.termination {
                    story_termination = kind;
                }
                let act_termination = act.termination.unwrap_or(TerminationKind::End);
                for group in &mut act.maneuver_groups {
                    let mut group_running = false;
                    for maneuver in &mut group.maneuvers {
                        let running = maneuver.is_busy();
                        let termination = maneuver
                            .events
                            .iter()
                            .filter_map(|e| e.termination)
                            .last()
                            .unwrap_or(act_termination);
                        maneuver.tracker.update(running, termination);
                        group_running |= running;
                    }
                    group.tracker.update(group_running, act_termination);
                }
            }
            story.tracker.update(story_running, story_termination);
        }
    }
}

fn action_phase(action: &Action) -> ElementPhase {
    match action.state() {
        ActionState::Activated => ElementPhase::Started,
        ActionState::Active | ActionState::Trigged => ElementPhase::Running,
        ActionState::Deactivated => ElementPhase::Ended(action.termination().unwrap_or(TerminationKind::End)),
        ActionState::Inactive => ElementPhase::Standby,
    }
}

impl Validate for StoryBoard {
    fn validate(&self) -> ValidationResult {
        let mut warnings = Vec::new();

        for name in find_duplicates(self.events().map(|e| e.name.clone())) {
            warnings.push(format!("Duplicate event name: {}", name));
        }

        let mut known: HashSet<(StoryElementType, &str)> = HashSet::new();
        for story in &self.stories {
            known.insert((StoryElementType::Story, story.name.as_str()));
            for act in &story.acts {
                known.insert((StoryElementType::Act, act.name.as_str()));
                for group in &act.maneuver_groups {
                    known.insert((StoryElementType::ManeuverGroup, group.name.as_str()));
                    for maneuver in &group.maneuvers {
                        known.insert((StoryElementType::Maneuver, maneuver.name.as_str()));
                        for event in &maneuver.events {
                            known.insert((StoryElementType::Event, event.name.as_str()));
                            for action in &event.actions {
                                known.insert((StoryElementType::Action, action.name.as_str()));
                            }
                        }
                    }
                }
            }
        }

        let triggers = self
            .stories
            .iter()
            .flat_map(|s| s.acts.iter())
            .flat_map(|a| {
                [&a.start_trigger, &a.stop_trigger]
                    .into_iter()
                    .chain(a.maneuver_groups.iter().flat_map(|g| g.events().map(|e| &e.start_trigger)))
            })
            .chain(std::iter::once(&self.stop_trigger));

        for trigger in triggers {
            for condition in trigger.conditions() {
                let (element_type, element_name) = match &condition.kind {
                    ConditionKind::AtStart {
                        element_type,
                        element_name,
                    }
                    | ConditionKind::Running {
                        element_type,
                        element_name,
                    }
                    | ConditionKind::AfterTermination {
                        element_type,
                        element_name,
                        ..
                    } => (*element_type, element_name.as_str()),
                    _ => continue,
                };
                if !known.contains(&(element_type, element_name)) {
                    warnings.push(format!(
                        "Condition {} refers to unknown {:?} '{}'",
                        condition.name, element_type, element_name
                    ));
                }
            }
        }

        for warning in &warnings {
            warn!("{}", warning);
        }

        _return(warnings, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::action::{ActionKind, AutonomousAction, AutonomyDomain, PrivateAction};
    use crate::model::condition::{Condition, ConditionEdge, ConditionGroup, Rule};
    use crate::model::entity::{Category, Control, Entity, VehicleCategory};
    use crate::road::StraightRoads;

    fn instant_action(name: &str, owner: EntityId) -> Action {
        Action::new(
            name,
            ActionKind::Private {
                owner,
                action: PrivateAction::Autonomous(AutonomousAction {
                    activate: true,
                    domain: AutonomyDomain::Both,
                }),
            },
        )
    }

    fn at_time(t: f64) -> Trigger {
        Trigger {
            groups: vec![ConditionGroup {
                conditions: vec![Condition::new(
                    "time",
                    0.0,
                    ConditionEdge::Rising,
                    ConditionKind::SimulationTime {
                        value: t,
                        rule: Rule::GreaterThan,
                    },
                )],
            }],
        }
    }

    struct World {
        entities: Entities,
        road: StraightRoads,
        time: f64,
    }

    impl World {
        fn new() -> (Self, EntityId) {
            let mut entities = Entities::new();
            let ego = entities.push(Entity::new("Ego", Category::Vehicle(VehicleCategory::Car), Control::Internal));
            (
                Self {
                    entities,
                    road: StraightRoads::single(0, 1000.0, 1, 3.5),
                    time: 0.0,
                },
                ego,
            )
        }

        fn tick(&mut self, board: &mut StoryBoard) {
            self.time += 0.1;
            let snapshot = self.entities.clone();
            let phases = board.phases();
            let eval = EvalContext {
                entities: &snapshot,
                road: &self.road,
                simulation_time: self.time,
                phases: &phases,
            };
            let ctx = StepContext {
                dt: 0.1,
                simulation_time: self.time,
                snapshot: &snapshot,
                road: &self.road,
            };
            let mut effects = Effects::default();
            board.step(&eval, &ctx, &mut self.entities, &mut effects);
        }
    }

    fn single_event_board(ego: EntityId, executions: u32) -> StoryBoard {
        let event = Event::new("E", EventPriority::Overwrite, vec![instant_action("A", ego)], Trigger::default());
        let maneuver = Maneuver::new("M", vec![], vec![event]);
        let group = ManeuverGroup::new("G", executions, vec![ego], vec![maneuver]);
        let act = Act::new("Act", vec![group], Trigger::default(), Trigger::default());
        StoryBoard {
            stories: vec![Story::new("S", vec![act])],
            stop_trigger: Trigger::default(),
        }
    }

    #[test]
    fn test_event_pass_through_states() {
        let (mut world, ego) = World::new();
        let mut board = single_event_board(ego, 1);

        let mut states = Vec::new();
        for _ in 0..5 {
            world.tick(&mut board);
            states.push(board.find_event("E").unwrap().state());
        }
        assert_eq!(
            states,
            vec![
                EventState::Activated,
                EventState::Active,
                EventState::Deactivated,
                EventState::Inactive,
                EventState::Inactive,
            ]
        );
        assert_eq!(board.find_act("Act").unwrap().state(), ElementState::Inactive);
    }

    #[test]
    fn test_number_of_executions() {
        let (mut world, ego) = World::new();
        let mut board = single_event_board(ego, 3);
        let mut starts = 0;
        for _ in 0..30 {
            world.tick(&mut board);
            if board.find_event("E").unwrap().state() == EventState::Activated {
                starts += 1;
            }
        }
        assert_eq!(starts, 3);
        assert!(board.find_maneuver_group("G").unwrap().is_completed());
    }

    #[test]
    fn test_phases_report_transitions() {
        let (mut world, ego) = World::new();
        let mut board = single_event_board(ego, 1);
        world.tick(&mut board);
        let phases = board.phases();
        assert_eq!(phases.get(StoryElementType::Act, "Act"), ElementPhase::Started);
        assert_eq!(phases.get(StoryElementType::Event, "E"), ElementPhase::Started);
        assert_eq!(phases.get(StoryElementType::Maneuver, "M"), ElementPhase::Started);
        assert_eq!(phases.get(StoryElementType::Story, "S"), ElementPhase::Started);
        assert_eq!(phases.get(StoryElementType::Event, "missing"), ElementPhase::Standby);

        world.tick(&mut board);
        world.tick(&mut board);
        let phases = board.phases();
        assert_eq!(
            phases.get(StoryElementType::Event, "E"),
            ElementPhase::Ended(TerminationKind::End)
        );
    }

    #[test]
    fn test_act_stop_trigger_cancels_events() {
        let (mut world, ego) = World::new();
        let speed = Action::new(
            "slow",
            ActionKind::Private {
                owner: ego,
                action: PrivateAction::Speed(crate::model::action::SpeedAction::new(
                    crate::model::action::SpeedTarget::Absolute(10.0),
                    crate::model::action::TransitionDynamics {
                        value: 100.0,
                        ..Default::default()
                    },
                )),
            },
        );
        let event = Event::new("E", EventPriority::Overwrite, vec![speed], Trigger::default());
        let group = ManeuverGroup::new("G", 1, vec![ego], vec![Maneuver::new("M", vec![], vec![event])]);
        let act = Act::new("Act", vec![group], Trigger::default(), at_time(0.45));
        let mut board = StoryBoard {
            stories: vec![Story::new("S", vec![act])],
            stop_trigger: Trigger::default(),
        };

        for _ in 0..4 {
            world.tick(&mut board);
        }
        assert_eq!(board.find_event("E").unwrap().state(), EventState::Active);
        world.tick(&mut board);
        let event = board.find_event("E").unwrap();
        assert_eq!(event.state(), EventState::Deactivated);
        assert_eq!(event.termination(), Some(TerminationKind::Cancel));
        assert_eq!(board.find_act("Act").unwrap().state(), ElementState::Deactivated);
    }

    #[test]
    fn test_validate_reports_unknown_references() {
        let (_, ego) = World::new();
        let mut board = single_event_board(ego, 1);
        board.stop_trigger = Trigger {
            groups: vec![ConditionGroup {
                conditions: vec![Condition::new(
                    "after",
                    0.0,
                    ConditionEdge::Rising,
                    ConditionKind::AfterTermination {
                        element_type: StoryElementType::Event,
                        element_name: "Missing".to_string(),
                        rule: crate::model::condition::TerminationRule::Any,
                    },
                )],
            }],
        };
        let result = board.validate();
        assert!(result.is_valid());
        assert_eq!(result.warnings().len(), 1);
    }
}
