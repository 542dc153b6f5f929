//! Hierarchical skill data types
//!
//! A skill is a reusable unit of agent behavior: a prompt template plus
//! supporting knowledge, tagged with a generality level. Specific (L1) skills
//! are narrow and directly executable, Domain (L2) skills cover a broader
//! category, and Meta (L3) skills are the always-available last resort.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The distinguished tenant scope for skills shared across all tenants.
///
/// Skills are collectively improved, so they persist and search under this
/// scope in addition to the caller's tenant. Memories never use it.
pub const GLOBAL_TENANT: &str = "global";

/// Generality level of a skill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    /// L1: narrow, directly executable (e.g. LearnEnglish)
    Specific,
    /// L2: broader category, used as fallback (e.g. LanguageLearning)
    Domain,
    /// L3: most general, last-resort fallback; never absent
    Meta,
}

impl SkillLevel {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Specific => "specific",
            Self::Domain => "domain",
            Self::Meta => "meta",
        }
    }

    /// Parse from string, defaulting unknown values to Specific
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "domain" | "l2" => Self::Domain,
            "meta" | "l3" => Self::Meta,
            _ => Self::Specific,
        }
    }
}

impl std::fmt::Display for SkillLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The executable payload of a skill
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillContent {
    /// Prompt template with named placeholders (e.g. `{task}`)
    pub prompt_template: String,
    /// Ordered list of knowledge points or rules
    #[serde(default)]
    pub knowledge_base: Vec<String>,
    /// Optional executable logic carried alongside the prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_logic: Option<String>,
    /// JSON-schema-like mapping of expected parameters
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub parameters_schema: serde_json::Map<String, serde_json::Value>,
}

impl SkillContent {
    /// Create content from a prompt template alone
    pub fn from_prompt(prompt_template: impl Into<String>) -> Self {
        Self {
            prompt_template: prompt_template.into(),
            ..Self::default()
        }
    }

    /// Add knowledge points
    pub fn with_knowledge(mut self, knowledge_base: Vec<String>) -> Self {
        self.knowledge_base = knowledge_base;
        self
    }
}

/// Usage counters, mutated after every execution attempt that uses the skill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageStats {
    pub success_count: u32,
    pub failure_count: u32,
    pub last_used: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Default for UsageStats {
    fn default() -> Self {
        Self {
            success_count: 0,
            failure_count: 0,
            last_used: None,
            created_at: Utc::now(),
        }
    }
}

impl UsageStats {
    /// Record one execution attempt
    pub fn record(&mut self, success: bool) {
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.last_used = Some(Utc::now());
    }
}

/// A hierarchical skill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    /// Opaque unique identifier, generated at creation, immutable
    #[serde(default = "new_skill_id")]
    pub id: String,
    /// Human-readable identifier, distinguishable within a level
    pub name: String,
    /// Natural-language summary; the embedding text for semantic retrieval
    pub description: String,
    pub level: SkillLevel,
    /// Weak reference to the broader skill this one was generalized from or
    /// evolved out of. Lineage only, never cascading deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub content: SkillContent,
    #[serde(default)]
    pub stats: UsageStats,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn new_skill_id() -> String {
    Uuid::new_v4().to_string()
}

impl Skill {
    /// Create a new skill with a fresh id
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        level: SkillLevel,
        content: SkillContent,
    ) -> Self {
        Self {
            id: new_skill_id(),
            name: name.into(),
            description: description.into(),
            level,
            parent_id: None,
            content,
            stats: UsageStats::default(),
            tags: Vec::new(),
        }
    }

    /// Set the lineage parent
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Add tags
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// The text embedded for semantic retrieval
    pub fn embedding_text(&self) -> String {
        format!("{}: {}", self.name, self.description)
    }
}

/// The default Meta skill returned when retrieval finds nothing.
///
/// Constructed fresh on every fallback so the caller always receives a valid
/// skill, even against an empty store.
pub fn default_meta_skill() -> Skill {
    Skill::new(
        "GeneralProblemSolver",
        "Decomposes the problem and solves it step-by-step.",
        SkillLevel::Meta,
        SkillContent::from_prompt("Solve this: {task}")
            .with_knowledge(vec!["Think step by step.".to_string()]),
    )
}

/// The two built-in Meta skills seeded into the global scope at startup.
///
/// Meta skills are never drafted by evolution; these are the only ones that
/// exist.
pub fn builtin_meta_skills() -> Vec<Skill> {
    vec![
        default_meta_skill(),
        Skill::new(
            "ConversationalGuide",
            "Carries a helpful general conversation when no task applies.",
            SkillLevel::Meta,
            SkillContent::from_prompt(
                "Respond helpfully and concisely to the user's message: {task}",
            )
            .with_knowledge(vec![
                "Match the user's language and tone.".to_string(),
                "Ask a clarifying question when the request is ambiguous.".to_string(),
            ]),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skill_creation() {
        let skill = Skill::new(
            "LearnGerman",
            "Teaches German vocabulary and grammar",
            SkillLevel::Specific,
            SkillContent::from_prompt("Teach the user German: {task}"),
        );

        assert!(!skill.id.is_empty());
        assert_eq!(skill.level, SkillLevel::Specific);
        assert!(skill.parent_id.is_none());
        assert_eq!(skill.stats.success_count, 0);
    }

    #[test]
    fn test_embedding_text() {
        let skill = Skill::new(
            "LearnEnglish",
            "English vocabulary, grammar, IELTS preparation",
            SkillLevel::Specific,
            SkillContent::default(),
        );
        assert_eq!(
            skill.embedding_text(),
            "LearnEnglish: English vocabulary, grammar, IELTS preparation"
        );
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!(SkillLevel::parse("specific"), SkillLevel::Specific);
        assert_eq!(SkillLevel::parse("Domain"), SkillLevel::Domain);
        assert_eq!(SkillLevel::parse("META"), SkillLevel::Meta);
        assert_eq!(SkillLevel::parse("unknown"), SkillLevel::Specific);
    }

    #[test]
    fn test_usage_stats_recording() {
        let mut stats = UsageStats::default();
        stats.record(true);
        stats.record(true);
        stats.record(false);

        assert_eq!(stats.success_count, 2);
        assert_eq!(stats.failure_count, 1);
        assert!(stats.last_used.is_some());
    }

    #[test]
    fn test_default_meta_skill_is_meta() {
        let skill = default_meta_skill();
        assert_eq!(skill.level, SkillLevel::Meta);
        assert!(!skill.content.prompt_template.is_empty());
    }

    #[test]
    fn test_builtin_meta_skills() {
        let skills = builtin_meta_skills();
        assert_eq!(skills.len(), 2);
        assert!(skills.iter().all(|s| s.level == SkillLevel::Meta));
    }

    #[test]
    fn test_skill_serde_roundtrip() {
        let skill = Skill::new(
            "CalculateTax",
            "Computes income tax for a salary",
            SkillLevel::Specific,
            SkillContent::from_prompt("Calculate tax: {task}")
                .with_knowledge(vec!["Apply brackets progressively.".to_string()]),
        )
        .with_parent("parent-123")
        .with_tags(vec!["finance".to_string()]);

        let json = serde_json::to_string(&skill).unwrap();
        let parsed: Skill = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, skill.id);
        assert_eq!(parsed.parent_id.as_deref(), Some("parent-123"));
        assert_eq!(parsed.content.knowledge_base.len(), 1);
    }

    #[test]
    fn test_skill_deserialize_without_id_generates_one() {
        let json = r#"{
            "name": "LearnGerman",
            "description": "German for beginners",
            "level": "specific",
            "content": {"prompt_template": "Teach German: {task}"}
        }"#;
        let skill: Skill = serde_json::from_str(json).unwrap();
        assert!(!skill.id.is_empty());
        assert_eq!(skill.level, SkillLevel::Specific);
    }
}
