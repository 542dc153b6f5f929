//! SeerLord domain plugins
//!
//! Each plugin is one domain capability built on the core's graph framework.
//! `manifest()` is the explicit registration list resolved at startup; add a
//! plugin here and it becomes routable.

mod mail;
mod news;
mod tutorial;

pub use mail::MailServicePlugin;
pub use news::NewsReporterPlugin;
pub use tutorial::TutorialGeneratorPlugin;

use std::sync::Arc;

use seerlord_core::plugins::AgentPlugin;

/// The static plugin manifest.
///
/// Registered in order; later entries with a duplicate name would win, so
/// keep names unique here.
pub fn manifest() -> Vec<Arc<dyn AgentPlugin>> {
    vec![
        Arc::new(TutorialGeneratorPlugin),
        Arc::new(NewsReporterPlugin),
        Arc::new(MailServicePlugin),
    ]
}

#[cfg(test)]
mod testkit {
    //! Shared test fixtures for plugin graph tests

    use std::sync::Arc;

    use seerlord_core::config::{Config, SkillConfig};
    use seerlord_core::graph::GraphContext;
    use seerlord_core::memory::MemoryStore;
    use seerlord_core::skills::{
        DynamicSkillManager, EvolutionEngine, NullEventSink, SkillStore,
    };
    use seerlord_core::storage::Database;
    use seerlord_core::testing::{StubChatModel, StubEmbedder};

    /// A graph context over an in-memory database, with separate chat stubs
    /// for domain nodes and the evolution engine.
    pub(crate) async fn test_context(
        chat: Arc<StubChatModel>,
        evolver: Arc<StubChatModel>,
    ) -> GraphContext {
        let db = Database::in_memory().await.unwrap();
        let embedder = Arc::new(StubEmbedder::new());
        let skill_config = SkillConfig {
            min_score: 0.1,
            ..Config::default().skills
        };
        let store = Arc::new(SkillStore::new(
            db.pool().clone(),
            embedder.clone(),
            skill_config.clone(),
        ));
        GraphContext {
            chat,
            skills: Arc::new(DynamicSkillManager::new(
                store,
                EvolutionEngine::new(evolver),
                Arc::new(NullEventSink),
                skill_config,
            )),
            memory: Arc::new(MemoryStore::new(db.pool().clone(), embedder)),
            config: Config::default().graph,
        }
    }
}
