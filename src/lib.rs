//! Loading and executing driving-scenario documents.
//!
//! A scenario document is read into an in-memory graph ([`Scenario`]):
//! entities, an Init action list and a storyboard of stories, acts,
//! maneuver groups, maneuvers, events and actions, all gated by triggers.
//! [`ScenarioEngine`] then advances that graph tick by tick against a
//! [`RoadGeometry`] service.
//!
//! ```rust
//! use xosc::{EngineConfig, ScenarioEngine, StraightRoads};
//!
//! let xml = r#"<OpenSCENARIO>
//!   <Entities>
//!     <ScenarioObject name="Ego"><Vehicle name="car" vehicleCategory="car"/></ScenarioObject>
//!   </Entities>
//!   <Storyboard><Init/></Storyboard>
//! </OpenSCENARIO>"#;
//!
//! let road = Box::new(StraightRoads::single(0, 500.0, 2, 3.5));
//! let mut engine = ScenarioEngine::from_str(xml, ".", road, EngineConfig::default()).unwrap();
//! engine.step(0.0, true).unwrap();
//! assert_eq!(engine.entities().len(), 1);
//! ```

pub mod catalog;
pub mod config;
pub mod core;
pub mod engine;
pub mod model;
pub mod parameters;
pub mod recorder;
pub mod road;
pub mod types;
pub mod validation_utils;
pub mod xml;

pub use crate::config::{EngineConfig, RequestedControl};
pub use crate::core::EntityId;
pub use crate::engine::{EngineError, EngineResult, ExternalState, ScenarioEngine, SharedEngine};
pub use crate::road::{LaneCoord, RoadGeometry, StraightRoads, WorldPose};
pub use crate::xml::{ParseError, ParseResult, Scenario};
