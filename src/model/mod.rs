//! The in-memory scenario graph: entities, positions, conditions, actions
//! and the storyboard that ties them together.

pub mod action;
pub mod condition;
pub mod entity;
pub mod position;
pub mod route;
pub mod story;

pub use action::{Action, ActionKind, ActionState, PrivateAction};
pub use condition::{Condition, ConditionGroup, ConditionKind, Trigger};
pub use entity::{Category, Control, Entities, Entity};
pub use position::Position;
pub use route::Route;
pub use story::{Act, Event, EventPriority, EventState, Init, Maneuver, ManeuverGroup, Story, StoryBoard};
