//! LLM client and wire types

mod client;
mod types;

pub use client::{ChatModel, Embedder, LlmClient};
pub use types::{
    ChatOptions, ChatRequest, ChatResponse, Choice, EmbeddingData, EmbeddingInput,
    EmbeddingRequest, EmbeddingResponse, LlmResponse, Message, MessageRole, ResponseFormat, Usage,
    cosine_similarity, embedding_from_bytes, embedding_to_bytes, latest_user_message,
};
