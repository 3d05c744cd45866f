//! YAML route tables.
//!
//! A route table lists patterns with canned responses:
//!
//! ```yaml
//! listen: 127.0.0.1:8080
//! health: /healthz
//! routes:
//!   - method: GET
//!     path: /users/{id:[0-9]+}
//!     response:
//!       status: 200
//!       body: { name: Alice }
//!   - path: /files/{path}*
//! ```
//!
//! A route without `method` answers any method. A response without `body`
//! echoes the matched pattern and path variables as JSON.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::HeaderMap;
use http_body_util::Full;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;

use crate::handler::{BoxedHandler, Handler};
use crate::mux::{json_response, method_label, path_vars, Mux, MuxConfig, MuxError};

/// Errors from loading or building a route table.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid route table: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("route {index} ({} {path}): {source}", method_label(.method))]
    Route {
        index: usize,
        method: String,
        path: String,
        #[source]
        source: MuxError,
    },

    #[error("route {index} ({path}): invalid status code {status}")]
    InvalidStatus {
        index: usize,
        path: String,
        status: u16,
    },

    #[error("route {index} ({path}): invalid header {name}")]
    InvalidHeader {
        index: usize,
        path: String,
        name: String,
    },
}

/// A parsed route table file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteTable {
    /// Listen address, used when the CLI does not override it.
    #[serde(default)]
    pub listen: Option<String>,

    /// Path of the built-in health check route.
    #[serde(default)]
    pub health: Option<String>,

    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// One route entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    /// HTTP method; absent means any method.
    #[serde(default)]
    pub method: Option<String>,

    pub path: String,

    #[serde(default)]
    pub response: ResponseConfig,
}

/// The canned response of a route.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseConfig {
    #[serde(default = "default_status")]
    pub status: u16,

    /// Strings are sent verbatim, anything else as JSON.
    #[serde(default)]
    pub body: Option<serde_json::Value>,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_status() -> u16 {
    200
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            status: default_status(),
            body: None,
            headers: BTreeMap::new(),
        }
    }
}

impl RouteTable {
    /// Read and parse a route table file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse a route table from YAML.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Register every route into a new mux.
    ///
    /// Stops at the first route that fails to register.
    pub fn build_mux(&self, config: &MuxConfig) -> Result<Mux<BoxedHandler>, ConfigError> {
        let mut mux: Mux<BoxedHandler> = Mux::with_config(config.clone());

        for (index, route) in self.routes.iter().enumerate() {
            let method = route.method.clone().unwrap_or_default();
            let handler = MockResponse::from_config(index, route)?;
            mux.handle(&method, &route.path, Arc::new(handler))
                .map_err(|source| ConfigError::Route {
                    index,
                    method: method.to_ascii_uppercase(),
                    path: route.path.clone(),
                    source,
                })?;
        }

        if let Some(health) = &self.health {
            let handler = HealthCheck {
                routes: self.routes.len(),
            };
            mux.handle("GET", health, Arc::new(handler))
                .map_err(|source| ConfigError::Route {
                    index: self.routes.len(),
                    method: "GET".to_string(),
                    path: health.clone(),
                    source,
                })?;
        }

        tracing::debug!(
            routes = self.routes.len(),
            patterns = mux.len(),
            "built route table"
        );
        Ok(mux)
    }
}

/// Handler answering with a configured response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<Bytes>,
    pattern: String,
}

impl MockResponse {
    fn from_config(index: usize, route: &RouteConfig) -> Result<Self, ConfigError> {
        let response = &route.response;
        let status =
            StatusCode::from_u16(response.status).map_err(|_| ConfigError::InvalidStatus {
                index,
                path: route.path.clone(),
                status: response.status,
            })?;

        let mut headers = HeaderMap::new();
        let body = match &response.body {
            Some(serde_json::Value::String(text)) => {
                headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; charset=utf-8"),
                );
                Some(Bytes::from(text.clone()))
            }
            Some(value) => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                Some(Bytes::from(value.to_string()))
            }
            None => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                None
            }
        };

        for (name, value) in &response.headers {
            let invalid = || ConfigError::InvalidHeader {
                index,
                path: route.path.clone(),
                name: name.clone(),
            };
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
            headers.insert(name, value);
        }

        Ok(Self {
            status,
            headers,
            body,
            pattern: route.path.clone(),
        })
    }

    fn echo(&self, req: &Request<Bytes>) -> Bytes {
        let params: serde_json::Map<String, serde_json::Value> = path_vars(req)
            .map(|vars| {
                vars.to_map()
                    .into_iter()
                    .map(|(name, value)| (name, serde_json::Value::String(value)))
                    .collect()
            })
            .unwrap_or_default();
        let body = serde_json::json!({
            "pattern": self.pattern,
            "params": params,
        });
        Bytes::from(body.to_string())
    }
}

impl Handler for MockResponse {
    fn call(&self, req: Request<Bytes>) -> BoxFuture<'static, Response<Full<Bytes>>> {
        let body = match &self.body {
            Some(body) => body.clone(),
            None => self.echo(&req),
        };
        let mut resp = Response::new(Full::new(body));
        *resp.status_mut() = self.status;
        *resp.headers_mut() = self.headers.clone();
        Box::pin(async move { resp })
    }
}

/// Handler for the built-in health check route.
#[derive(Debug, Clone, Copy)]
struct HealthCheck {
    routes: usize,
}

impl Handler for HealthCheck {
    fn call(&self, _req: Request<Bytes>) -> BoxFuture<'static, Response<Full<Bytes>>> {
        let body = serde_json::json!({
            "status": "healthy",
            "routes": self.routes,
        });
        let resp = json_response(StatusCode::OK, body.to_string());
        Box::pin(async move { resp })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use hyper::Method;
    use pathmux_router::{CompileErrorKind, InsertError};
    use std::io::Write;

    const TABLE: &str = r#"
listen: 127.0.0.1:9000
health: /healthz
routes:
  - method: GET
    path: /users/{id:[0-9]+}
    response:
      body:
        name: Alice
  - method: post
    path: /users
    response:
      status: 201
      body: created
      headers:
        x-request-source: mock
  - path: /files/{path}*
"#;

    fn request(method: Method, path: &str) -> Request<Bytes> {
        Request::builder()
            .method(method)
            .uri(path)
            .body(Bytes::new())
            .unwrap()
    }

    async fn body_json(resp: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_parse_route_table() {
        let table = RouteTable::parse(TABLE).unwrap();
        assert_eq!(table.listen.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(table.health.as_deref(), Some("/healthz"));
        assert_eq!(table.routes.len(), 3);
        assert_eq!(table.routes[1].method.as_deref(), Some("post"));
        assert_eq!(table.routes[1].response.status, 201);
        assert_eq!(table.routes[2].method, None);
        assert_eq!(table.routes[2].response, ResponseConfig::default());
    }

    #[test]
    fn test_parse_rejects_unknown_fields() {
        let err = RouteTable::parse("routes:\n  - path: /a\n    handler: x\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = RouteTable::load(Path::new("does-not-exist.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("does-not-exist.yaml"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TABLE.as_bytes()).unwrap();

        let table = RouteTable::load(file.path()).unwrap();
        assert_eq!(table.routes.len(), 3);
    }

    #[test]
    fn test_build_reports_invalid_pattern() {
        let table = RouteTable::parse("routes:\n  - path: /ok\n  - path: /api/{name\n").unwrap();
        let err = table.build_mux(&MuxConfig::default()).err().unwrap();
        match &err {
            ConfigError::Route {
                index,
                source: MuxError::Insert(InsertError::Compile(compile)),
                ..
            } => {
                assert_eq!(*index, 1);
                assert_eq!(compile.kind, CompileErrorKind::UnclosedVariable);
            }
            other => panic!("expected compile error, got {:?}", other),
        }
        assert!(err.to_string().starts_with("route 1 (* /api/{name):"));
    }

    #[test]
    fn test_build_reports_duplicate_route() {
        let table = RouteTable::parse(
            "routes:\n  - method: GET\n    path: /a\n  - method: get\n    path: /a\n",
        )
        .unwrap();
        let err = table.build_mux(&MuxConfig::default()).err().unwrap();
        assert!(matches!(
            err,
            ConfigError::Route {
                index: 1,
                source: MuxError::Conflict { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_build_reports_invalid_status() {
        let table =
            RouteTable::parse("routes:\n  - path: /a\n    response:\n      status: 42\n").unwrap();
        let err = table.build_mux(&MuxConfig::default()).err().unwrap();
        assert!(matches!(err, ConfigError::InvalidStatus { status: 42, .. }));
    }

    #[test]
    fn test_build_reports_invalid_header() {
        let table = RouteTable::parse(
            "routes:\n  - path: /a\n    response:\n      headers:\n        \"bad header\": x\n",
        )
        .unwrap();
        let err = table.build_mux(&MuxConfig::default()).err().unwrap();
        assert!(matches!(err, ConfigError::InvalidHeader { .. }));
    }

    #[tokio::test]
    async fn test_mock_json_body() {
        let mux = RouteTable::parse(TABLE)
            .unwrap()
            .build_mux(&MuxConfig::default())
            .unwrap();

        let resp = mux.serve(request(Method::GET, "/users/7")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(body_json(resp).await, serde_json::json!({"name": "Alice"}));
    }

    #[tokio::test]
    async fn test_mock_text_body_and_headers() {
        let mux = RouteTable::parse(TABLE)
            .unwrap()
            .build_mux(&MuxConfig::default())
            .unwrap();

        let resp = mux.serve(request(Method::POST, "/users")).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(resp.headers()["x-request-source"], "mock");
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"created");
    }

    #[tokio::test]
    async fn test_mock_echoes_pattern_and_params() {
        let mux = RouteTable::parse(TABLE)
            .unwrap()
            .build_mux(&MuxConfig::default())
            .unwrap();

        let resp = mux.serve(request(Method::DELETE, "/files/a/b.txt")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({
                "pattern": "/files/{path}*",
                "params": {"path": "a/b.txt"},
            })
        );
    }

    #[tokio::test]
    async fn test_constraint_mismatch_is_not_found() {
        let mux = RouteTable::parse(TABLE)
            .unwrap()
            .build_mux(&MuxConfig::default())
            .unwrap();

        let resp = mux.serve(request(Method::GET, "/users/alice")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_route() {
        let mux = RouteTable::parse(TABLE)
            .unwrap()
            .build_mux(&MuxConfig::default())
            .unwrap();

        let resp = mux.serve(request(Method::GET, "/healthz")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({"status": "healthy", "routes": 3})
        );
    }
}
