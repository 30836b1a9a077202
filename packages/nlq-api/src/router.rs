//! Matchit routing configuration.

use std::sync::Arc;

use hyper::http::request::Parts;
use hyper::{body::Bytes, Method, Request, Response};
use matchit::Router as MatchitRouter;
use nlq_runtime::Orchestrator;

use crate::handlers;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// HTTP request router.
pub struct Router {
    inner: MatchitRouter<RouteHandler>,
    state: AppState,
}

impl Router {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        let mut router = MatchitRouter::new();
        for (path, handler) in [
            ("/", RouteHandler::Ask),
            ("/health", RouteHandler::Health),
            ("/schema", RouteHandler::Schema),
            ("/refresh", RouteHandler::Refresh),
        ] {
            // Static paths without parameters cannot conflict
            let _ = router.insert(path, handler);
        }

        Self {
            inner: router,
            state: AppState { orchestrator },
        }
    }

    /// Routes a request to its handler. Request bodies are never read.
    pub async fn route<B>(&self, req: Request<B>) -> Result<Response<Bytes>, RouterError> {
        let (parts, _) = req.into_parts();
        let path = parts.uri.path();

        match self.inner.at(path) {
            Ok(matched) => matched.value.handle(&parts, self.state.clone()).await,
            Err(_) => Err(RouterError::NotFound(format!("No route found for {}", path))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum RouteHandler {
    Ask,
    Health,
    Schema,
    Refresh,
}

impl RouteHandler {
    async fn handle(&self, parts: &Parts, state: AppState) -> Result<Response<Bytes>, RouterError> {
        match (self, &parts.method) {
            (RouteHandler::Ask, &Method::GET) => handlers::ask(parts, state).await,
            (RouteHandler::Health, &Method::GET) => handlers::health(parts, state).await,
            (RouteHandler::Schema, &Method::GET) => handlers::schema(parts, state).await,
            (RouteHandler::Refresh, &Method::POST) => handlers::refresh(parts, state).await,
            _ => Err(RouterError::MethodNotAllowed),
        }
    }
}

/// Transport-level failure. Pipeline failures are not router errors; they
/// are reported inside a 200 response envelope.
#[derive(Debug)]
pub enum RouterError {
    MethodNotAllowed,
    BadRequest(String),
    NotFound(String),
    InternalError(String),
}

impl std::fmt::Display for RouterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouterError::MethodNotAllowed => write!(f, "Method Not Allowed"),
            RouterError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            RouterError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            RouterError::InternalError(msg) => write!(f, "Internal Error: {}", msg),
        }
    }
}

impl std::error::Error for RouterError {}

impl From<RouterError> for Response<Bytes> {
    fn from(err: RouterError) -> Self {
        let (status, message) = match &err {
            RouterError::MethodNotAllowed => (405, "Method Not Allowed"),
            RouterError::BadRequest(msg) => (400, msg.as_str()),
            RouterError::NotFound(msg) => (404, msg.as_str()),
            RouterError::InternalError(msg) => (500, msg.as_str()),
        };

        let error_response = handlers::error_response(status, message.to_string(), None);
        let body = serde_json::to_vec(&error_response).unwrap_or_else(|e| {
            format!(
                "{{\"success\":false,\"error\":{{\"code\":\"500\",\"message\":\"Failed to serialize error: {}\"}}}}",
                e
            )
            .into_bytes()
        });

        let mut response = Response::new(Bytes::from(body));
        *response.status_mut() = hyper::StatusCode::from_u16(status)
            .unwrap_or(hyper::StatusCode::INTERNAL_SERVER_ERROR);
        response.headers_mut().insert(
            hyper::header::CONTENT_TYPE,
            hyper::header::HeaderValue::from_static("application/json"),
        );
        response
    }
}
