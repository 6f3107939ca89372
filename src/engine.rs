//! The per-tick scenario engine.
//!
//! Each [`ScenarioEngine::step`] runs in two phases. All conditions and all
//! reference-entity reads see a snapshot of the state committed at the end of
//! the previous tick; actions and kinematics then write the working copy.
//! Externally reported states are queued and applied at the next tick
//! boundary, so they never race with a tick in progress.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::core::EntityId;
use crate::model::action::{Effects, StepContext, UserCommand};
use crate::model::condition::EvalContext;
use crate::model::entity::{Entities, Entity};
use crate::model::story::{Init, StoryBoard};
use crate::parameters::Parameter;
use crate::recorder::{RecordError, RecordedFiles, Recorder};
use crate::road::{RoadGeometry, WorldPose};
use crate::xml::errors::ParseError;
use crate::xml::reader::{RoadNetwork, Scenario};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to load scenario: {0}")]
    Parse(#[from] ParseError),

    #[error("Failed to record: {0}")]
    Record(#[from] RecordError),
}

/// Alias for `Result<T, EngineError>`.
pub type EngineResult<T> = Result<T, EngineError>;

/// State of an externally controlled entity as reported by its driver.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExternalState {
    pub pose: WorldPose,
    pub speed: f64,
    pub wheel_angle: f64,
}

#[derive(Debug)]
pub struct ScenarioEngine {
    scenario_file: Option<PathBuf>,
    road_network: RoadNetwork,
    parameters: Vec<Parameter>,
    entities: Entities,
    init: Init,
    storyboard: StoryBoard,
    road: Box<dyn RoadGeometry>,
    config: EngineConfig,
    simulation_time: f64,
    init_trigged: bool,
    quit: bool,
    pending: Vec<(EntityId, ExternalState)>,
    commands: Vec<UserCommand>,
    recorder: Option<Recorder>,
}

impl ScenarioEngine {
    pub fn new(scenario: Scenario, road: Box<dyn RoadGeometry>, config: EngineConfig) -> Self {
        Self {
            scenario_file: scenario.path,
            road_network: scenario.road_network,
            parameters: scenario.parameters,
            entities: scenario.entities,
            init: scenario.init,
            storyboard: scenario.storyboard,
            road,
            config,
            simulation_time: 0.0,
            init_trigged: false,
            quit: false,
            pending: Vec::new(),
            commands: Vec::new(),
            recorder: None,
        }
    }

    pub fn from_file(path: impl AsRef<Path>, road: Box<dyn RoadGeometry>, config: EngineConfig) -> EngineResult<Self> {
        let scenario = Scenario::from_file(path, &config)?;
        Ok(Self::new(scenario, road, config))
    }

    pub fn from_str(
        xml: &str,
        base_dir: impl AsRef<Path>,
        road: Box<dyn RoadGeometry>,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        let scenario = Scenario::from_str(xml, base_dir, &config)?;
        Ok(Self::new(scenario, road, config))
    }

    /// Advance the scenario by `dt` seconds.
    ///
    /// The first call triggers the Init actions. With `init_only` the story
    /// is left untouched and only Init actions and kinematics advance.
    pub fn step(&mut self, dt: f64, init_only: bool) -> EngineResult<()> {
        let dt = self.config.clamp_step(dt);
        self.apply_external_states();

        if !self.init_trigged {
            info!("Triggering {} init actions", self.init.actions.len());
            for action in &mut self.init.actions {
                action.trig();
            }
            self.init_trigged = true;
        }

        self.simulation_time += dt;

        let snapshot = self.entities.clone();
        let phases = self.storyboard.phases();
        for entity in self.entities.iter_mut() {
            entity.pose_locked = false;
        }

        let road = self.road.as_ref();
        let ctx = StepContext {
            dt,
            simulation_time: self.simulation_time,
            snapshot: &snapshot,
            road,
        };
        let mut effects = Effects::default();

        for action in &mut self.init.actions {
            action.step(&ctx, &mut self.entities, &mut effects);
        }

        if !init_only {
            let eval = EvalContext {
                entities: &snapshot,
                road,
                simulation_time: self.simulation_time,
                phases: &phases,
            };
            self.storyboard.step(&eval, &ctx, &mut self.entities, &mut effects);
        }

        for entity in self.entities.iter_mut() {
            if !entity.control.is_external() && !entity.pose_locked {
                entity.advance(dt, road);
            }
        }

        if effects.quit && !self.quit {
            info!("Quit requested at {:.3}", self.simulation_time);
        }
        self.quit |= effects.quit;
        self.commands.extend(effects.commands);

        if let Some(recorder) = &mut self.recorder {
            recorder.record(self.simulation_time, &self.entities)?;
        }
        Ok(())
    }

    /// Queue the state of an externally controlled entity. It takes effect at
    /// the start of the next step. Returns false if the entity does not exist
    /// or is not externally controlled.
    pub fn report_external_state(&mut self, id: EntityId, state: ExternalState) -> bool {
        match self.entities.get(id) {
            Some(entity) if entity.control.is_external() => {
                self.pending.push((id, state));
                true
            }
            Some(entity) => {
                warn!("{} is not externally controlled, reported state ignored", entity.name);
                false
            }
            None => {
                warn!("Reported state for unknown entity {}", id);
                false
            }
        }
    }

    fn apply_external_states(&mut self) {
        for (id, state) in std::mem::take(&mut self.pending) {
            let entity = &mut self.entities[id];
            entity.set_world_pose(state.pose, self.road.as_ref());
            entity.speed = state.speed;
            entity.wheel_angle = state.wheel_angle;
            debug!("{}: external state applied", entity.name);
        }
    }

    /// Start writing a replay recording; every following step adds a row per
    /// entity.
    pub fn record_to_file(&mut self, path: impl AsRef<Path>) -> EngineResult<()> {
        let files = RecordedFiles {
            scenario: self.scenario_file.as_deref().unwrap_or(Path::new("")),
            logic_file: &self.road_network.logic_file,
            scene_graph_file: &self.road_network.scene_graph_file,
        };
        self.recorder = Some(Recorder::create(path.as_ref(), files)?);
        Ok(())
    }

    /// Flush and close the recording, if any.
    pub fn stop_recording(&mut self) -> EngineResult<()> {
        if let Some(mut recorder) = self.recorder.take() {
            recorder.finish()?;
            info!("Recording closed after {} rows", recorder.rows());
        }
        Ok(())
    }

    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.find_by_name(name).and_then(|id| self.entities.get(id))
    }

    pub fn storyboard(&self) -> &StoryBoard {
        &self.storyboard
    }

    pub fn init(&self) -> &Init {
        &self.init
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn simulation_time(&self) -> f64 {
        self.simulation_time
    }

    pub fn is_quit_requested(&self) -> bool {
        self.quit
    }

    /// Drain the commands raised by user-defined actions.
    pub fn take_user_commands(&mut self) -> Vec<UserCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn scenario_file(&self) -> Option<&Path> {
        self.scenario_file.as_deref()
    }

    pub fn road_network(&self) -> &RoadNetwork {
        &self.road_network
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// A cloneable handle for driving one engine from several threads.
///
/// Ticks and external state reports are serialized by the lock. A panic
/// while the lock was held does not make the engine unusable.
#[derive(Debug, Clone)]
pub struct SharedEngine(Arc<Mutex<ScenarioEngine>>);

impl SharedEngine {
    pub fn new(engine: ScenarioEngine) -> Self {
        Self(Arc::new(Mutex::new(engine)))
    }

    pub fn lock(&self) -> MutexGuard<'_, ScenarioEngine> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn step(&self, dt: f64, init_only: bool) -> EngineResult<()> {
        self.lock().step(dt, init_only)
    }

    pub fn report_external_state(&self, id: EntityId, state: ExternalState) -> bool {
        self.lock().report_external_state(id, state)
    }
}
