use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::models::message::Message;

/// Text fragments in the order the backend produced them. An `Err` item ends
/// the stream.
pub type TokenStream = BoxStream<'static, Result<String>>;

/// Base trait for inference backends
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stream the assistant reply for the given model and message history
    async fn stream(&self, model: &str, messages: &[Message]) -> Result<TokenStream>;
}
