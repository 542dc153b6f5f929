//! Mail service system plugin
//!
//! Internal collaborator other agents invoke by name to turn content into a
//! deliverable email. The reserved `_` prefix keeps it out of user-facing
//! listings and the planner's menu while leaving it invokable.

use std::sync::Arc;

use async_trait::async_trait;

use seerlord_core::error::Result;
use seerlord_core::graph::{ExecutionGraph, GraphContext, GraphNode, GraphState, Transition};
use seerlord_core::llm::{ChatOptions, Message};
use seerlord_core::plugins::AgentPlugin;

/// Drafts the email from the calling agent's content
struct ComposeNode;

#[async_trait]
impl GraphNode for ComposeNode {
    fn name(&self) -> &str {
        "compose"
    }

    async fn run(&self, state: &mut GraphState, ctx: &GraphContext) -> Result<Transition> {
        let mut messages = vec![Message::system(
            "You are the mail service agent. Turn the content in this \
             conversation into a complete email: a subject line, a short \
             greeting, the body, and a sign-off. Address it to the calling \
             agent's operator.",
        )];
        messages.extend(state.messages.iter().cloned());

        let response = ctx.chat.complete(messages, ChatOptions::default()).await?;
        state.set_extra("email_subject", extract_subject(&response.content));
        state.push_assistant(response.content);
        Ok(Transition::Next)
    }
}

/// Pull the subject line out of a drafted email, if one is present
fn extract_subject(email: &str) -> serde_json::Value {
    email
        .lines()
        .find_map(|line| line.strip_prefix("Subject:"))
        .map(|subject| serde_json::Value::String(subject.trim().to_string()))
        .unwrap_or(serde_json::Value::Null)
}

/// The mail service system plugin
pub struct MailServicePlugin;

impl AgentPlugin for MailServicePlugin {
    fn name(&self) -> &str {
        "_mail_service"
    }

    fn description(&self) -> &str {
        "Sends content as email on behalf of other agents. Internal use only."
    }

    fn build_graph(&self) -> ExecutionGraph {
        ExecutionGraph::new(self.name()).add_node(Arc::new(ComposeNode))
    }
}
