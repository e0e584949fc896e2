pub mod engine;
pub mod nodes;

pub use engine::WorkflowEngine;
pub use nodes::{Node, TurnInput, TurnOutcome};
