//! Provider adapter contract.
//!
//! Concrete adapters (OpenAI, Anthropic, Gemini wire formats) live outside
//! this crate; anything that implements [`ProviderAdapter`] can be
//! registered with the [`Client`](crate::client::Client). Adapters never
//! apply middleware; the client does.

use std::future::Future;
use std::pin::Pin;

use futures::Stream;

use crate::error::LlmResult;
use crate::types::request::Request;
use crate::types::response::Response;
use crate::types::stream_event::StreamEvent;
use crate::types::tool::ToolChoice;

/// An owned, boxed, `Send` future; keeps the adapter trait object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An owned, boxed, `Send` stream of items.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// A provider plugin: translates the neutral [`Request`] into a vendor
/// wire format and back.
pub trait ProviderAdapter: Send + Sync {
    /// The name this adapter is registered and routed under.
    fn name(&self) -> &str;

    /// One-shot completion.
    fn complete(&self, request: Request) -> BoxFuture<'_, LlmResult<Response>>;

    /// Streaming completion. The final event must be `finish`, preferably
    /// carrying the fully-formed response.
    fn stream(
        &self,
        request: Request,
    ) -> BoxFuture<'_, LlmResult<BoxStream<'_, LlmResult<StreamEvent>>>>;

    /// Called once when the client starts using this adapter.
    fn initialize(&self) -> BoxFuture<'_, LlmResult<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Release connections or background resources.
    fn close(&self) -> BoxFuture<'_, LlmResult<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Whether the provider can honour this tool choice natively.
    fn supports_tool_choice(&self, _choice: &ToolChoice) -> bool {
        true
    }

    /// Whether the provider accepts a JSON-schema response format.
    /// `generate_object` falls back to tool-based extraction when false.
    fn supports_structured_output(&self) -> bool {
        true
    }
}
