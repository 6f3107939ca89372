pub mod ids;

pub use ids::EntityId;
