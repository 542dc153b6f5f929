//! Error types for SeerLord

use thiserror::Error;

/// Result type alias using SeerLord's Error
pub type Result<T> = std::result::Result<T, Error>;

/// SeerLord error types
///
/// Infrastructure failures (stores, transport) surface through these
/// variants. Domain-level "nothing found" conditions are not errors anywhere
/// in the kernel: retrieval falls back to defaults with a reason string, and
/// evolution failures degrade to reports.
#[derive(Error, Debug)]
pub enum Error {
    // Network errors (E100-E199)
    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    #[error("LLM API error: {0}")]
    LLMError(String),

    #[error("LLM call timed out after {0} seconds")]
    LLMTimeout(u64),

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Skill index inconsistent: {0}")]
    StoreInconsistent(String),

    // Plugin errors (E500-E599)
    #[error("Plugin '{0}' not found. Run `seerlord plugins list` to see registered plugins.")]
    PluginNotFound(String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Skill errors (E900-E999)
    #[error("Skill '{0}' not found. Run `seerlord skills list` to see stored skills.")]
    SkillNotFound(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    // Routing errors (E1100-E1199)
    #[error("Planning failed: {0}")]
    PlanningFailed(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    // Graph errors (E1200-E1299)
    #[error("Graph '{0}' exceeded its step budget of {1}")]
    GraphBudgetExceeded(String, u32),

    #[error("Graph node '{0}' failed: {1}")]
    NodeFailed(String, String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::NetworkError(_) => "E100",
            Self::LLMError(_) => "E101",
            Self::LLMTimeout(_) => "E102",
            Self::DatabaseError(_) => "E400",
            Self::StoreInconsistent(_) => "E401",
            Self::PluginNotFound(_) => "E500",
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::SkillNotFound(_) => "E900",
            Self::EmbeddingFailed(_) => "E901",
            Self::PlanningFailed(_) => "E1100",
            Self::InvalidPlan(_) => "E1101",
            Self::GraphBudgetExceeded(..) => "E1200",
            Self::NodeFailed(..) => "E1201",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Whether this error came from the infrastructure tier (store/transport)
    /// rather than from invalid caller input.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::NetworkError(_)
                | Self::LLMError(_)
                | Self::LLMTimeout(_)
                | Self::DatabaseError(_)
                | Self::StoreInconsistent(_)
                | Self::EmbeddingFailed(_)
                | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_stable() {
        assert_eq!(Error::LLMError("x".into()).code(), "E101");
        assert_eq!(Error::PlanningFailed("x".into()).code(), "E1100");
        assert_eq!(Error::PluginNotFound("x".into()).code(), "E500");
        assert_eq!(Error::Other("x".into()).code(), "E9999");
    }

    #[test]
    fn test_infrastructure_classification() {
        assert!(Error::LLMTimeout(30).is_infrastructure());
        assert!(Error::StoreInconsistent("drift".into()).is_infrastructure());
        assert!(!Error::InvalidInput("bad".into()).is_infrastructure());
        assert!(!Error::PlanningFailed("empty".into()).is_infrastructure());
    }
}
