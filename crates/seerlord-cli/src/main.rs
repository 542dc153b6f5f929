//! SeerLord CLI - drive the orchestration kernel from a terminal

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use seerlord_core::config::Config;
use seerlord_core::graph::GraphContext;
use seerlord_core::llm::LlmClient;
use seerlord_core::memory::MemoryStore;
use seerlord_core::plugins::{PluginRegistry, is_system_plugin};
use seerlord_core::routing::{MasterRouter, PlanDispatcher, RouteRequest, TaskOutcome};
use seerlord_core::skills::{
    ChannelEventSink, DynamicSkillManager, EvolutionEngine, FeedbackService, SkillEvent,
    SkillStore,
};
use seerlord_core::storage::{Database, DatabaseConfig, migration_status};

#[derive(Parser)]
#[command(name = "seerlord")]
#[command(author, version, about = "Multi-tenant agent orchestration kernel", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database file (defaults to the platform config dir)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered plugins
    Plugins {
        /// Include system plugins
        #[arg(long)]
        all: bool,
    },

    /// Manage stored skills
    Skills {
        #[command(subcommand)]
        action: SkillAction,
    },

    /// Route a request and execute the resulting plan
    Dispatch {
        /// The user message
        message: String,
        /// Tenant scope
        #[arg(short, long)]
        tenant: String,
        /// User id within the tenant
        #[arg(short, long)]
        user: Option<String>,
        /// Target plugin name, or "auto" to plan
        #[arg(long, default_value = "auto")]
        target: String,
    },

    /// Rate a skill; low averages trigger refinement
    Feedback {
        /// Skill id
        skill_id: String,
        /// Rating from 1 to 5
        #[arg(short, long)]
        rating: u8,
        /// What went well or wrong
        #[arg(short, long, default_value = "")]
        comment: String,
        /// Tenant scope
        #[arg(short, long)]
        tenant: String,
        /// User id within the tenant
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Check database and credentials
    Doctor,
}

#[derive(Subcommand)]
enum SkillAction {
    /// List skills visible to a tenant
    List {
        #[arg(short, long)]
        tenant: String,
    },
    /// Show one skill as JSON
    Show { id: String },
    /// Delete a skill
    Delete { id: String },
    /// Seed the built-in Meta skills
    Seed,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print a config value
    Get { key: String },
    /// Print the config file path
    Path,
}

/// Everything a command needs, wired once
struct Services {
    config: Config,
    database: Database,
    registry: Arc<PluginRegistry>,
}

impl Services {
    async fn init(db_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let config = Config::load()?;

        let db_config = match db_path {
            Some(path) => DatabaseConfig::with_path(path),
            None => DatabaseConfig::default(),
        };
        let database = Database::new(db_config).await?;

        let mut registry = PluginRegistry::new();
        registry.register_manifest(seerlord_plugins::manifest());

        Ok(Self {
            config,
            database,
            registry: Arc::new(registry),
        })
    }

    fn llm_client(&self) -> anyhow::Result<LlmClient> {
        let api_key = self
            .config
            .llm
            .resolved_api_key()?
            .context("No API key found. Set SEERLORD_API_KEY or OPENROUTER_API_KEY.")?;
        Ok(LlmClient::new(self.config.llm.clone(), api_key)?)
    }

    fn skill_store(&self, client: &LlmClient) -> Arc<SkillStore> {
        Arc::new(SkillStore::new(
            self.database.pool().clone(),
            Arc::new(client.clone()),
            self.config.skills.clone(),
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("seerlord=info")),
        )
        .init();

    let cli = Cli::parse();
    let services = Services::init(cli.db).await?;

    match cli.command {
        Commands::Plugins { all } => plugins_command(&services, all),
        Commands::Skills { action } => skills_command(&services, action).await,
        Commands::Dispatch {
            message,
            tenant,
            user,
            target,
        } => dispatch_command(&services, message, tenant, user, target).await,
        Commands::Feedback {
            skill_id,
            rating,
            comment,
            tenant,
            user,
        } => feedback_command(&services, skill_id, rating, comment, tenant, user).await,
        Commands::Config { action } => config_command(&services, action),
        Commands::Doctor => doctor_command(&services).await,
    }
}

fn plugins_command(services: &Services, all: bool) -> anyhow::Result<()> {
    if all {
        for name in services.registry.names() {
            let Some(plugin) = services.registry.get(&name) else {
                continue;
            };
            let marker = if is_system_plugin(&name) { " [system]" } else { "" };
            println!("{}{}\n    {}", name, marker, plugin.description());
        }
    } else {
        for plugin in services.registry.visible_plugins() {
            println!("{}\n    {}", plugin.name(), plugin.description());
        }
    }
    Ok(())
}

async fn skills_command(services: &Services, action: SkillAction) -> anyhow::Result<()> {
    let client = services.llm_client()?;
    let store = services.skill_store(&client);

    match action {
        SkillAction::List { tenant } => {
            let skills = store.list(&tenant).await?;
            if skills.is_empty() {
                println!("No skills stored for tenant '{}'.", tenant);
            }
            for skill in skills {
                println!(
                    "{}  [{}]  {}\n    {}",
                    skill.id, skill.level, skill.name, skill.description
                );
            }
        }
        SkillAction::Show { id } => match store.get(&id).await? {
            Some(skill) => println!("{}", serde_json::to_string_pretty(&skill)?),
            None => bail!("Skill '{}' not found", id),
        },
        SkillAction::Delete { id } => {
            if store.delete(&id).await? {
                println!("Deleted skill {}.", id);
            } else {
                bail!("Skill '{}' not found", id);
            }
        }
        SkillAction::Seed => {
            store.ensure_builtin_skills().await?;
            println!("Built-in Meta skills seeded.");
        }
    }
    Ok(())
}

async fn dispatch_command(
    services: &Services,
    message: String,
    tenant: String,
    user: Option<String>,
    target: String,
) -> anyhow::Result<()> {
    let client = services.llm_client()?;
    let chat: Arc<LlmClient> = Arc::new(client.clone());
    let store = services.skill_store(&client);
    store.ensure_builtin_skills().await?;

    let (sink, mut events) = ChannelEventSink::pair();
    let manager = Arc::new(DynamicSkillManager::new(
        store,
        EvolutionEngine::new(chat.clone()),
        Arc::new(sink),
        services.config.skills.clone(),
    ));
    let memory = Arc::new(MemoryStore::new(
        services.database.pool().clone(),
        Arc::new(client.clone()),
    ));

    let router = MasterRouter::new(services.registry.clone(), chat.clone(), memory.clone());
    let dispatcher = PlanDispatcher::new(
        services.registry.clone(),
        GraphContext {
            chat,
            skills: manager,
            memory,
            config: services.config.graph.clone(),
        },
    );

    // Surface skill lifecycle events as they arrive
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SkillEvent::Retrieved { name, level, reason, .. } => {
                    println!("  [skill] retrieved {} ({}) - {}", name, level, reason);
                }
                SkillEvent::EvolutionStarted { query } => {
                    println!("  [skill] evolving a new skill for: {}", query);
                }
                SkillEvent::Evolved { name, level, .. } => {
                    println!("  [skill] evolved {} ({})", name, level);
                }
                SkillEvent::Refined { name, .. } => {
                    println!("  [skill] refined {}", name);
                }
            }
        }
    });

    let mut request = RouteRequest::new(
        vec![seerlord_core::llm::Message::user(message)],
        tenant,
    )
    .with_target(target);
    if let Some(user) = user {
        request = request.with_user(user);
    }

    let plan = router.plan(&request).await?;
    info!(tasks = plan.tasks.len(), "Plan ready");
    for task in &plan.tasks {
        println!("  [plan] task {} -> {}: {}", task.id, task.plugin_name, task.description);
    }

    let report = dispatcher.run(&plan, &request).await?;
    printer.abort();

    for result in report.results.values() {
        match &result.outcome {
            TaskOutcome::Completed { .. } => {
                println!("  [task {}] {} completed", result.task_id, result.plugin_name);
            }
            TaskOutcome::Failed { error } => {
                println!("  [task {}] {} failed: {}", result.task_id, result.plugin_name, error);
            }
            TaskOutcome::Skipped { reason } => {
                println!("  [task {}] {} skipped: {}", result.task_id, result.plugin_name, reason);
            }
        }
    }

    match report.final_output {
        Some(output) => println!("\n{}", output),
        None => bail!("No task produced output; see task failures above"),
    }
    Ok(())
}

async fn feedback_command(
    services: &Services,
    skill_id: String,
    rating: u8,
    comment: String,
    tenant: String,
    user: Option<String>,
) -> anyhow::Result<()> {
    let client = services.llm_client()?;
    let chat: Arc<LlmClient> = Arc::new(client.clone());
    let store = services.skill_store(&client);
    let manager = Arc::new(DynamicSkillManager::new(
        store,
        EvolutionEngine::new(chat),
        Arc::new(seerlord_core::skills::NullEventSink),
        services.config.skills.clone(),
    ));
    let service = FeedbackService::new(
        services.database.pool().clone(),
        manager,
        services.config.skills.clone(),
    );

    let outcome = service
        .submit(&skill_id, rating, &comment, &tenant, user.as_deref())
        .await?;

    println!(
        "Recorded. Average {:.2} over {} reviews.{}",
        outcome.average_rating,
        outcome.review_count,
        if outcome.refinement_triggered {
            " Refinement triggered."
        } else {
            ""
        }
    );
    Ok(())
}

fn config_command(services: &Services, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => println!("{}", services.config.get(&key)?),
        ConfigAction::Path => println!("{}", Config::config_path()?.display()),
    }
    Ok(())
}

async fn doctor_command(services: &Services) -> anyhow::Result<()> {
    let status = migration_status(services.database.pool()).await?;
    println!(
        "Database schema: v{} (target v{}){}",
        status.current_version,
        status.target_version,
        if status.needs_migration { " - MIGRATION NEEDED" } else { "" }
    );

    match services.config.llm.redacted_api_key()? {
        Some(key) => println!("API key: {}", key),
        None => println!("API key: NOT SET (export SEERLORD_API_KEY or OPENROUTER_API_KEY)"),
    }

    println!(
        "Plugins: {} registered ({} visible)",
        services.registry.len(),
        services.registry.visible_plugins().len()
    );
    Ok(())
}
