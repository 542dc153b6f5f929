//! Agent plugin contract and registry
//!
//! A plugin is one domain capability: a name, a planner-facing description,
//! a capability declaration, and a factory for its execution graph. Plugins
//! are registered through an explicit manifest at startup; there is no
//! filesystem discovery or runtime reflection.

mod registry;

pub use registry::PluginRegistry;

use crate::graph::ExecutionGraph;

/// Reserved prefix marking system plugins.
///
/// System plugins stay invokable by name (internal collaborators like a
/// mail-sending sub-agent) but are excluded from user-facing listings and
/// from the planner's plugin menu.
pub const SYSTEM_PLUGIN_PREFIX: &str = "_";

/// Whether a plugin name denotes a system plugin
pub fn is_system_plugin(name: &str) -> bool {
    name.starts_with(SYSTEM_PLUGIN_PREFIX)
}

/// How a plugin consumes retrieved skills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkillMode {
    /// Skills are injected as instruction context (the common case)
    #[default]
    Context,
    /// Skills are exposed as callable tools
    Tool,
}

impl SkillMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::Tool => "tool",
        }
    }
}

/// The capability contract every agent plugin implements.
///
/// `name` is the unique registry key; `description` is used verbatim in
/// planner prompts, so it should say what the plugin does in one line a
/// model can route on.
pub trait AgentPlugin: Send + Sync {
    /// Unique key
    fn name(&self) -> &str;

    /// Planner-facing one-line description
    fn description(&self) -> &str;

    /// Build this plugin's compiled execution graph.
    ///
    /// A plugin declaring `enable_skills` must wire the skill-loading node
    /// ahead of its domain logic; the dispatcher relies on the declaration,
    /// not on inspecting the graph.
    fn build_graph(&self) -> ExecutionGraph;

    /// Whether the skill-loading node is wired into this plugin's graph
    fn enable_skills(&self) -> bool {
        false
    }

    /// How retrieved skills are consumed
    fn skill_mode(&self) -> SkillMode {
        SkillMode::Context
    }

    /// Plugin-specific rubric for the critique node; empty means the
    /// generic standard applies
    fn critique_instructions(&self) -> String {
        String::new()
    }
}
