//! Reading scenario and catalog documents.
//!
//! [`node`] turns a document into a light element tree, [`reader`] walks that
//! tree into the scenario graph, and [`errors`] carries what can go wrong.

pub mod errors;
pub mod node;
pub mod reader;

pub use errors::{ErrorContext, ParseError, ParseResult};
pub use node::XmlNode;
pub use reader::{RoadNetwork, Scenario, ScenarioReader};
