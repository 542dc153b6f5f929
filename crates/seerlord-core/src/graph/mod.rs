//! Per-plugin execution graphs
//!
//! A graph is a compiled list of nodes with named jump edges, invoked
//! blocking (`invoke`) or streaming (`stream`). Execution is always bounded:
//! the executor enforces a step budget on top of whatever exit conditions
//! the graph's own loops carry.

mod executor;
mod node;
mod nodes;
mod state;

pub use executor::{ExecutionGraph, GraphEvent};
pub use node::{GraphContext, GraphNode, Transition};
pub use nodes::{CritiqueNode, LoadMemoryNode, LoadSkillsNode, RefineSkillsNode};
pub use state::GraphState;
