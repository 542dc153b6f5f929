//! Deterministic test doubles for the LLM seams
//!
//! Shared by this crate's unit tests and by downstream crates (plugins, CLI)
//! that exercise graphs and stores without a network.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::llm::{ChatModel, ChatOptions, Embedder, LlmResponse, Message};

/// A scripted chat model
///
/// Pops queued responses in order; once the queue is empty every further call
/// returns the configured default. Records every conversation it was given.
pub struct StubChatModel {
    responses: Mutex<VecDeque<String>>,
    default_response: String,
    fail: bool,
    calls: Mutex<Vec<Vec<Message>>>,
    call_count: AtomicUsize,
}

impl StubChatModel {
    /// A stub that always answers with `default_response`
    pub fn new(default_response: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default_response: default_response.into(),
            fail: false,
            calls: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// A stub that answers the given responses in order, then repeats the
    /// last one
    pub fn with_responses(responses: Vec<&str>) -> Self {
        let default_response = responses.last().map(|s| s.to_string()).unwrap_or_default();
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            default_response,
            fail: false,
            calls: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// A stub whose every call fails with an LLM transport error
    pub fn failing() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default_response: String::new(),
            fail: true,
            calls: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Number of completions requested so far
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Conversations passed to `complete`, in call order
    pub fn recorded_calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for StubChatModel {
    async fn complete(&self, messages: Vec<Message>, _options: ChatOptions) -> Result<LlmResponse> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(messages);

        if self.fail {
            return Err(Error::LLMError("stub failure".to_string()));
        }

        let content = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_response.clone());

        Ok(LlmResponse {
            content,
            model: "stub".to_string(),
            tokens_used: 0,
        })
    }
}

/// Dimensionality of stub embeddings
const STUB_EMBEDDING_DIMS: usize = 64;

/// A deterministic bag-of-words embedder
///
/// Each lowercase token is hashed into one of 64 buckets and the vector is
/// L2-normalized, so texts sharing vocabulary land near each other. Stable
/// across runs, which lets retrieval-precedence tests assert exact ranking.
pub struct StubEmbedder;

impl StubEmbedder {
    pub fn new() -> Self {
        Self
    }

    fn bucket(token: &str) -> usize {
        // FNV-1a, small and stable
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in token.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % STUB_EMBEDDING_DIMS as u64) as usize
    }

    /// The synchronous embedding function behind the trait impl
    pub fn embed_text(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; STUB_EMBEDDING_DIMS];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            vector[Self::bucket(token)] += 1.0;
        }

        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }
        vector
    }
}

impl Default for StubEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::embed_text(text))
    }
}

/// An embedder that always fails, for partial-write tests
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::EmbeddingFailed("stub embedder failure".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::cosine_similarity;

    #[tokio::test]
    async fn test_stub_chat_scripted_responses() {
        let stub = StubChatModel::with_responses(vec!["first", "second"]);

        let r1 = stub
            .complete(vec![Message::user("a")], ChatOptions::default())
            .await
            .unwrap();
        let r2 = stub
            .complete(vec![Message::user("b")], ChatOptions::default())
            .await
            .unwrap();
        let r3 = stub
            .complete(vec![Message::user("c")], ChatOptions::default())
            .await
            .unwrap();

        assert_eq!(r1.content, "first");
        assert_eq!(r2.content, "second");
        assert_eq!(r3.content, "second");
        assert_eq!(stub.call_count(), 3);
        assert_eq!(stub.recorded_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_failing_stub() {
        let stub = StubChatModel::failing();
        let result = stub
            .complete(vec![Message::user("x")], ChatOptions::default())
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_stub_embedder_deterministic() {
        let a = StubEmbedder::embed_text("learn english grammar");
        let b = StubEmbedder::embed_text("learn english grammar");
        assert_eq!(a, b);
    }

    #[test]
    fn test_stub_embedder_vocabulary_overlap_ranks_higher() {
        let query = StubEmbedder::embed_text("learn english for the exam");
        let english = StubEmbedder::embed_text("learn english vocabulary and grammar");
        let cooking = StubEmbedder::embed_text("bake sourdough bread at home");

        assert!(
            cosine_similarity(&query, &english) > cosine_similarity(&query, &cooking),
            "shared vocabulary should dominate"
        );
    }
}
