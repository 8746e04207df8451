//! Endpoint registration and lookup.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::ServiceError;
use crate::proxy::CallProxy;
use crate::request::Request;
use crate::response::Response;
use crate::scheme::{default_scheme, ArgScheme};

/// Boxed future returned by endpoint handlers.
pub type HandlerFuture = BoxFuture<'static, Result<(), ServiceError>>;

/// Type-erased endpoint handler function.
pub type HandlerFn =
    Arc<dyn Fn(Arc<Request>, Arc<Response>, CallProxy) -> HandlerFuture + Send + Sync>;

/// Immutable `(handler, request scheme, response scheme)` triple, fixed
/// at registration time.
#[derive(Clone)]
pub struct Handler {
    endpoint: HandlerFn,
    req_scheme: Arc<dyn ArgScheme>,
    resp_scheme: Arc<dyn ArgScheme>,
}

impl Handler {
    pub fn new(
        endpoint: HandlerFn,
        req_scheme: Arc<dyn ArgScheme>,
        resp_scheme: Arc<dyn ArgScheme>,
    ) -> Self {
        Self {
            endpoint,
            req_scheme,
            resp_scheme,
        }
    }

    pub fn req_scheme(&self) -> &Arc<dyn ArgScheme> {
        &self.req_scheme
    }

    pub fn resp_scheme(&self) -> &Arc<dyn ArgScheme> {
        &self.resp_scheme
    }

    pub(crate) fn invoke(
        &self,
        request: Arc<Request>,
        response: Arc<Response>,
        proxy: CallProxy,
    ) -> HandlerFuture {
        (self.endpoint)(request, response, proxy)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("req_scheme", &self.req_scheme.name())
            .field("resp_scheme", &self.resp_scheme.name())
            .finish_non_exhaustive()
    }
}

/// Registration rule: a concrete endpoint name, or the fallback slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Endpoint(String),
    /// Replaces the default-lookup behavior: any name not present in the
    /// registry resolves to this handler instead of the built-in
    /// not-found handler.
    Fallback,
}

impl From<&str> for Rule {
    fn from(name: &str) -> Self {
        Rule::Endpoint(name.to_string())
    }
}

impl From<String> for Rule {
    fn from(name: String) -> Self {
        Rule::Endpoint(name)
    }
}

/// Outcome of a registry lookup, with the fallback already applied.
#[derive(Debug, Clone)]
pub enum Lookup {
    Found(Handler),
    NotFound,
}

/// Mapping from endpoint name to handler triple, plus an optional
/// fallback and the default scheme injected at construction.
pub struct HandlerRegistry {
    primary: HashMap<String, Handler>,
    fallback: Option<Handler>,
    default_scheme: Arc<dyn ArgScheme>,
}

impl HandlerRegistry {
    /// Create a registry whose parameterless registrations use the given
    /// scheme for both directions.
    pub fn new(default_scheme: Arc<dyn ArgScheme>) -> Self {
        Self {
            primary: HashMap::new(),
            fallback: None,
            default_scheme,
        }
    }

    /// Register an endpoint with the registry's default scheme.
    ///
    /// ```ignore
    /// registry.register("echo", |request, response, _proxy| async move {
    ///     while let Some(chunk) = request.arg(2).unwrap().read().await {
    ///         response.write(chunk);
    ///     }
    ///     Ok(())
    /// });
    /// ```
    pub fn register<F, Fut>(&mut self, rule: impl Into<Rule>, handler: F)
    where
        F: Fn(Arc<Request>, Arc<Response>, CallProxy) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
    {
        let req_scheme = self.default_scheme.clone();
        let resp_scheme = self.default_scheme.clone();
        self.register_with_schemes(rule, handler, req_scheme, resp_scheme);
    }

    /// Register an endpoint with explicit request/response schemes.
    ///
    /// Registering a concrete rule twice overwrites the earlier entry.
    pub fn register_with_schemes<F, Fut>(
        &mut self,
        rule: impl Into<Rule>,
        handler: F,
        req_scheme: Arc<dyn ArgScheme>,
        resp_scheme: Arc<dyn ArgScheme>,
    ) where
        F: Fn(Arc<Request>, Arc<Response>, CallProxy) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
    {
        let boxed: HandlerFn =
            Arc::new(move |request, response, proxy| Box::pin(handler(request, response, proxy)));
        let handler = Handler::new(boxed, req_scheme, resp_scheme);
        match rule.into() {
            Rule::Endpoint(name) => {
                self.primary.insert(name, handler);
            }
            Rule::Fallback => {
                self.fallback = Some(handler);
            }
        }
    }

    /// Resolve a handler: exact match, else fallback, else not found.
    pub fn lookup(&self, endpoint: &str) -> Lookup {
        if let Some(handler) = self.primary.get(endpoint) {
            return Lookup::Found(handler.clone());
        }
        match &self.fallback {
            Some(handler) => Lookup::Found(handler.clone()),
            None => Lookup::NotFound,
        }
    }

    /// The built-in handler substituted for unmatched names when no
    /// fallback is registered.
    pub fn not_found_handler(&self) -> Handler {
        let endpoint: HandlerFn =
            Arc::new(|request, response, proxy| Box::pin(not_found(request, response, proxy)));
        Handler::new(
            endpoint,
            self.default_scheme.clone(),
            self.default_scheme.clone(),
        )
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new(default_scheme())
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("endpoints", &self.primary.keys().collect::<Vec<_>>())
            .field("has_fallback", &self.fallback.is_some())
            .finish_non_exhaustive()
    }
}

/// Default behavior for requests to unrecognized endpoints: always
/// signals invalid-endpoint, naming the requested endpoint and service.
pub async fn not_found(
    request: Arc<Request>,
    _response: Arc<Response>,
    _proxy: CallProxy,
) -> Result<(), ServiceError> {
    Err(ServiceError::InvalidEndpoint {
        endpoint: request.endpoint(),
        service: request.service.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_handler(
        _request: Arc<Request>,
        _response: Arc<Response>,
        _proxy: CallProxy,
    ) -> impl Future<Output = Result<(), ServiceError>> {
        async { Ok(()) }
    }

    #[test]
    fn lookup_prefers_exact_match() {
        let mut registry = HandlerRegistry::default();
        registry.register("health", noop_handler);
        assert!(matches!(registry.lookup("health"), Lookup::Found(_)));
        assert!(matches!(registry.lookup("other"), Lookup::NotFound));
    }

    #[test]
    fn fallback_catches_unmatched_names() {
        let mut registry = HandlerRegistry::default();
        registry.register(Rule::Fallback, noop_handler);
        assert!(matches!(registry.lookup("anything"), Lookup::Found(_)));
    }

    #[test]
    fn re_registration_overwrites() {
        let mut registry = HandlerRegistry::default();
        registry.register("dup", noop_handler);
        registry.register_with_schemes(
            "dup",
            noop_handler,
            Arc::new(crate::scheme::JsonScheme),
            Arc::new(crate::scheme::JsonScheme),
        );
        match registry.lookup("dup") {
            Lookup::Found(handler) => assert_eq!(handler.req_scheme().name(), "json"),
            Lookup::NotFound => panic!("expected handler"),
        }
    }
}
