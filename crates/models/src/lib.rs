//! # orrery-models
//!
//! A provider-neutral LLM client. Normalizes requests, responses,
//! streaming events, and errors across model vendors behind a single
//! [`Client`] with an onion-composed [`Middleware`] chain.
//!
//! ## Layers
//!
//! - [`types`]: the data model; [`Message`], [`ContentPart`], [`Request`],
//!   [`Response`], [`Usage`], [`StreamEvent`], tool types.
//! - [`error`]: the [`LlmError`] taxonomy with status-code and
//!   message-based classification.
//! - [`provider`]: the [`ProviderAdapter`] contract implemented by
//!   concrete vendor plugins.
//! - [`client`]: routing + middleware; `complete()` and `stream()`.
//! - [`stream`]: the eagerly-buffered, multi-consumer [`EventStream`].
//! - [`retry`]: shared exponential-backoff retry.
//! - [`generate`] / [`generate_object`]: high-level helpers with an
//!   internal tool-calling loop and structured-output extraction.
//!
//! Adapters do not apply middleware and do not retry; both concerns
//! belong to the client and its callers.

pub mod accumulator;
pub mod cancel;
pub mod client;
pub mod error;
pub mod generate;
pub mod generate_object;
pub mod middleware;
pub mod provider;
pub mod retry;
pub mod stream;
pub mod types;

pub use accumulator::StreamAccumulator;
pub use cancel::{AbortController, AbortSignal};
pub use client::{Client, ClientBuilder};
pub use error::{ErrorClassification, ErrorDetails, LlmError, LlmResult};
pub use generate::{GenerateOptions, GenerateResult, StepResult, Tool, generate};
pub use generate_object::{GenerateObjectOptions, GenerateObjectResult, generate_object};
pub use middleware::{Middleware, NextComplete, NextStream, RequestOnly};
pub use provider::{BoxFuture, BoxStream, ProviderAdapter};
pub use retry::{RetryConfig, retry};
pub use stream::EventStream;
pub use types::content::ContentPart;
pub use types::finish::{FinishReason, Reason};
pub use types::message::Message;
pub use types::request::Request;
pub use types::response::{Response, Warning};
pub use types::response_format::{ResponseFormat, ResponseFormatType};
pub use types::role::Role;
pub use types::stream_event::{StreamEvent, StreamEventType};
pub use types::tool::{ToolCall, ToolChoice, ToolDefinition, ToolResult};
pub use types::usage::Usage;
