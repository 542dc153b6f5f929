//! Master plan types

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Error, Result};

/// Builtin task target for plain conversation; handled by the dispatcher
/// directly instead of a plugin graph.
pub const CHITCHAT_TARGET: &str = "chitchat";

/// Sentinel target meaning "let the planner decide"
pub const AUTO_TARGET: &str = "auto";

/// One step of an execution plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanTask {
    /// Step number, starting from 1
    pub id: u32,
    /// Plugin to execute, or the builtin chitchat target
    pub plugin_name: String,
    /// What this step should accomplish
    pub description: String,
    /// Specific instruction passed to the plugin
    #[serde(default)]
    pub instruction: String,
    /// Prerequisite task ids whose results must exist before this runs
    #[serde(default)]
    pub context: Vec<u32>,
}

/// The router's decomposition of one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterPlan {
    /// Tasks in execution order
    pub tasks: Vec<PlanTask>,
    /// The request this plan answers
    #[serde(default)]
    pub original_request: String,
}

impl MasterPlan {
    /// Build the single-task plan used by manual routing
    pub fn single_task(plugin_name: impl Into<String>, request: impl Into<String>) -> Self {
        let request = request.into();
        let plugin_name = plugin_name.into();
        Self {
            tasks: vec![PlanTask {
                id: 1,
                plugin_name: plugin_name.clone(),
                description: format!("Handle the request with {}", plugin_name),
                instruction: request.clone(),
                context: Vec::new(),
            }],
            original_request: request,
        }
    }

    /// Validate the task graph.
    ///
    /// Ids must be unique and every `context` edge must reference an earlier
    /// task id. Earlier-only references make the graph acyclic by
    /// construction and let the dispatcher run tasks strictly in emitted
    /// order.
    pub fn validate(&self) -> Result<()> {
        if self.tasks.is_empty() {
            return Err(Error::InvalidPlan("plan contains no tasks".to_string()));
        }

        let mut seen: HashSet<u32> = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.id) {
                return Err(Error::InvalidPlan(format!("duplicate task id {}", task.id)));
            }
            for prerequisite in &task.context {
                if *prerequisite == task.id {
                    return Err(Error::InvalidPlan(format!(
                        "task {} depends on itself",
                        task.id
                    )));
                }
                if !seen.contains(prerequisite) {
                    return Err(Error::InvalidPlan(format!(
                        "task {} references task {} which does not precede it",
                        task.id, prerequisite
                    )));
                }
            }
        }
        Ok(())
    }
}
