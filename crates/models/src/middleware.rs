//! Middleware chain for the client.
//!
//! Middleware wraps both client surfaces. Composition is a strict onion
//! built by folding the registered list right-to-left over the terminal
//! adapter call, so the first-registered middleware is outermost: it sees
//! the request first and the response last.

use std::sync::{Arc, Mutex, PoisonError};

use crate::error::LlmResult;
use crate::provider::{BoxFuture, BoxStream};
use crate::types::finish::FinishReason;
use crate::types::message::Message;
use crate::types::request::Request;
use crate::types::response::Response;
use crate::types::stream_event::StreamEvent;
use crate::types::usage::Usage;

/// The continuation for `handle_complete`: call it to run the rest of the
/// chain (ultimately the provider adapter).
pub type NextComplete<'a> = Box<dyn FnOnce(Request) -> BoxFuture<'a, LlmResult<Response>> + Send + 'a>;

/// The continuation for `handle_stream`.
pub type NextStream<'a> = Box<
    dyn FnOnce(Request) -> BoxFuture<'a, LlmResult<BoxStream<'a, LlmResult<StreamEvent>>>>
        + Send
        + 'a,
>;

/// A layer around the client's `complete()` and `stream()` calls.
///
/// Both hooks default to pass-through, so a middleware only implements the
/// surface it cares about. A middleware may modify the request, transform
/// the response, wrap the stream, or short-circuit without calling `next`.
pub trait Middleware: Send + Sync {
    /// Wrap a `complete()` call.
    fn handle_complete<'a>(
        &'a self,
        request: Request,
        next: NextComplete<'a>,
    ) -> BoxFuture<'a, LlmResult<Response>> {
        next(request)
    }

    /// Wrap a `stream()` call.
    fn handle_stream<'a>(
        &'a self,
        request: Request,
        next: NextStream<'a>,
    ) -> BoxFuture<'a, LlmResult<BoxStream<'a, LlmResult<StreamEvent>>>> {
        next(request)
    }
}

/// Fold the middleware list over a terminal `complete` call.
pub(crate) fn compose_complete<'a>(
    middleware: &'a [Arc<dyn Middleware>],
    terminal: NextComplete<'a>,
) -> NextComplete<'a> {
    middleware.iter().rev().fold(terminal, |next, mw| {
        Box::new(move |request| mw.handle_complete(request, next))
    })
}

/// Fold the middleware list over a terminal `stream` call.
pub(crate) fn compose_stream<'a>(
    middleware: &'a [Arc<dyn Middleware>],
    terminal: NextStream<'a>,
) -> NextStream<'a> {
    middleware.iter().rev().fold(terminal, |next, mw| {
        Box::new(move |request| mw.handle_stream(request, next))
    })
}

/// Adapt a request-transforming middleware onto the stream path.
///
/// `handle_stream` invokes the inner middleware's `handle_complete` with a
/// dummy continuation that records the request it was called with, then
/// opens the real stream using the recorded (transformed) request. The
/// dummy response, and any response transformation the inner middleware
/// applies to it, is discarded.
pub struct RequestOnly<M>(pub M);

impl<M: Middleware> Middleware for RequestOnly<M> {
    fn handle_complete<'a>(
        &'a self,
        request: Request,
        next: NextComplete<'a>,
    ) -> BoxFuture<'a, LlmResult<Response>> {
        self.0.handle_complete(request, next)
    }

    fn handle_stream<'a>(
        &'a self,
        request: Request,
        next: NextStream<'a>,
    ) -> BoxFuture<'a, LlmResult<BoxStream<'a, LlmResult<StreamEvent>>>> {
        Box::pin(async move {
            let captured: Arc<Mutex<Option<Request>>> = Arc::new(Mutex::new(None));
            let capture = Arc::clone(&captured);

            let dummy: NextComplete<'_> = Box::new(move |req: Request| {
                let placeholder = placeholder_response(&req);
                *capture.lock().unwrap_or_else(PoisonError::into_inner) = Some(req);
                Box::pin(async move { Ok(placeholder) })
            });

            // Ignore the (placeholder) response; only the request matters.
            let _ = self.0.handle_complete(request.clone(), dummy).await;

            let transformed = captured
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
                .unwrap_or(request);
            next(transformed).await
        })
    }
}

/// A throwaway response handed to the dummy continuation in [`RequestOnly`].
fn placeholder_response(request: &Request) -> Response {
    Response {
        id: String::new(),
        model: request.model.clone(),
        provider: request.provider.clone().unwrap_or_default(),
        message: Message::assistant(""),
        finish_reason: FinishReason::stop(),
        usage: Usage::default(),
        warnings: None,
    }
}
