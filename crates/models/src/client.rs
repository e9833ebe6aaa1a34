//! The provider-neutral client: routing plus the middleware onion.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{LlmError, LlmResult};
use crate::middleware::{Middleware, NextComplete, NextStream, compose_complete, compose_stream};
use crate::provider::ProviderAdapter;
use crate::stream::EventStream;
use crate::types::request::Request;
use crate::types::response::Response;

/// Routes requests to registered provider adapters, applying the
/// middleware chain around every call.
pub struct Client {
    providers: IndexMap<String, Arc<dyn ProviderAdapter>>,
    default_provider: Option<String>,
    middleware: Arc<Vec<Arc<dyn Middleware>>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("default_provider", &self.default_provider)
            .field("middleware_count", &self.middleware.len())
            .finish()
    }
}

impl Client {
    /// Start building a client.
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Registered provider names, in registration order.
    #[must_use]
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// The provider used when a request does not name one.
    #[must_use]
    pub fn default_provider(&self) -> Option<&str> {
        self.default_provider.as_deref()
    }

    /// Number of registered middleware layers.
    #[must_use]
    pub fn middleware_count(&self) -> usize {
        self.middleware.len()
    }

    /// Resolve the adapter for a request: explicit `provider` field, then
    /// the configured default.
    fn resolve(&self, request: &Request) -> LlmResult<&Arc<dyn ProviderAdapter>> {
        let name = match request.provider.as_deref().or(self.default_provider.as_deref()) {
            Some(name) => name,
            None => {
                return Err(LlmError::Configuration {
                    message: "request names no provider and the client has no default".into(),
                });
            }
        };
        self.providers.get(name).ok_or_else(|| LlmError::Configuration {
            message: format!("provider '{name}' is not registered"),
        })
    }

    /// Whether the provider this request would route to accepts a
    /// JSON-schema response format. Unresolvable providers report false.
    #[must_use]
    pub fn supports_structured_output(&self, provider: Option<&str>) -> bool {
        provider
            .or(self.default_provider.as_deref())
            .and_then(|name| self.providers.get(name))
            .is_some_and(|adapter| adapter.supports_structured_output())
    }

    /// One-shot completion through the middleware chain.
    pub async fn complete(&self, request: Request) -> LlmResult<Response> {
        let adapter = self.resolve(&request)?;
        let terminal: NextComplete<'_> = Box::new(move |req| adapter.complete(req));
        let chain = compose_complete(&self.middleware, terminal);
        chain(request).await
    }

    /// Streaming completion. The returned handle buffers eagerly; see
    /// [`EventStream`] for the multi-consumer semantics.
    pub async fn stream(&self, request: Request) -> LlmResult<EventStream> {
        let adapter = Arc::clone(self.resolve(&request)?);
        let middleware = Arc::clone(&self.middleware);

        // The middleware chain borrows the adapter and the middleware
        // list, so the whole chain is built and driven inside the drainer
        // task where both are owned.
        Ok(EventStream::spawn(move |sink| async move {
            use futures::StreamExt;
            let terminal: NextStream<'_> = Box::new(|req| adapter.stream(req));
            let chain = compose_stream(&middleware, terminal);
            let mut upstream = match chain(request).await {
                Ok(stream) => stream,
                Err(err) => {
                    sink.fail(err);
                    return;
                }
            };
            while let Some(item) = upstream.next().await {
                match item {
                    Ok(event) => sink.push(event),
                    Err(err) => {
                        sink.fail(err);
                        return;
                    }
                }
            }
            sink.complete();
        }))
    }

    /// Close every registered adapter. The first error is returned after
    /// all adapters have been asked to close.
    pub async fn close(&self) -> LlmResult<()> {
        let mut first_error = None;
        for adapter in self.providers.values() {
            if let Err(err) = adapter.close().await {
                tracing::warn!(provider = adapter.name(), "error closing provider: {err}");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Builder for [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    providers: IndexMap<String, Arc<dyn ProviderAdapter>>,
    default_provider: Option<String>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl ClientBuilder {
    /// Register a provider adapter. The first registered adapter becomes
    /// the default unless [`default_provider`](Self::default_provider)
    /// names another. Re-registering a name replaces the adapter.
    #[must_use]
    pub fn add_provider(mut self, adapter: impl ProviderAdapter + 'static) -> Self {
        self.providers
            .insert(adapter.name().to_string(), Arc::new(adapter));
        self
    }

    /// Choose the default provider by name.
    #[must_use]
    pub fn default_provider(mut self, name: impl Into<String>) -> Self {
        self.default_provider = Some(name.into());
        self
    }

    /// Append a middleware layer. First added runs outermost.
    #[must_use]
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Build the client, validating that an explicit default provider is
    /// actually registered.
    pub fn build(self) -> LlmResult<Client> {
        let default_provider = match self.default_provider {
            Some(name) => {
                if !self.providers.contains_key(&name) {
                    return Err(LlmError::Configuration {
                        message: format!("default provider '{name}' is not registered"),
                    });
                }
                Some(name)
            }
            None => self.providers.keys().next().cloned(),
        };

        Ok(Client {
            providers: self.providers,
            default_provider,
            middleware: Arc::new(self.middleware),
        })
    }
}
