//! TestServer: full-stack integration test harness.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

use tempfile::TempDir;
use thiserror::Error;

/// Errors from TestServer operations.
#[derive(Debug, Error)]
pub enum TestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server failed to start: {0}")]
    StartupFailed(String),

    #[error("pathmux binary not found at {0}")]
    BinaryNotFound(String),
}

/// Absolute path to the shared test fixtures directory.
pub fn fixtures() -> PathBuf {
    // CARGO_MANIFEST_DIR = .../crates/pathmux-test
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(Path::parent)
        .map(|root| root.join("tests/fixtures"))
        .unwrap_or_else(|| PathBuf::from("tests/fixtures"))
}

/// Absolute path to one fixture file.
pub fn fixture(name: &str) -> PathBuf {
    fixtures().join(name)
}

/// Full-stack test harness.
///
/// Writes a route table into a temp directory, boots `pathmux serve` on a
/// random port, and provides HTTP request helpers.
pub struct TestServer {
    /// The child process running the server.
    child: Child,
    /// Collects the server's stderr until it exits, so the pipe never fills.
    stderr: Option<JoinHandle<String>>,
    /// The port the server is listening on.
    port: u16,
    /// HTTP client for making requests.
    client: reqwest::Client,
    /// The route table the server was started with.
    routes_path: PathBuf,
    /// Temp directory holding the route table (kept alive for the test duration).
    _temp_dir: TempDir,
}

impl TestServer {
    /// Start a server for a fixture file.
    pub async fn from_fixture(name: &str) -> Result<Self, TestError> {
        let yaml = std::fs::read_to_string(fixture(name))?;
        Self::start(&yaml, false).await
    }

    /// Start a server for an inline route table.
    pub async fn from_yaml(yaml: &str) -> Result<Self, TestError> {
        Self::start(yaml, false).await
    }

    /// Start a server that reloads its route table on change.
    pub async fn watched(yaml: &str) -> Result<Self, TestError> {
        Self::start(yaml, true).await
    }

    async fn start(yaml: &str, watch: bool) -> Result<Self, TestError> {
        let temp_dir = TempDir::new()?;
        let routes_path = temp_dir.path().join("routes.yaml");
        std::fs::write(&routes_path, yaml)?;

        let binary_path = find_pathmux_binary()?;
        let port = find_available_port()?;

        let mut command = Command::new(&binary_path);
        command
            .arg("serve")
            .arg("--routes")
            .arg(&routes_path)
            .arg("--listen")
            .arg(format!("127.0.0.1:{}", port))
            .arg("--log-level")
            .arg("warn");
        if watch {
            command.arg("--watch");
        }
        let mut child = command
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        let stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut output = String::new();
                let _ = pipe.read_to_string(&mut output);
                output
            })
        });

        let mut server = TestServer {
            child,
            stderr,
            port,
            client: reqwest::Client::new(),
            routes_path,
            _temp_dir: temp_dir,
        };

        server.wait_for_ready().await?;

        Ok(server)
    }

    /// Wait until the server answers HTTP at all.
    async fn wait_for_ready(&mut self) -> Result<(), TestError> {
        let max_attempts = 50;
        let delay = Duration::from_millis(100);

        for _ in 0..max_attempts {
            if self.client.get(self.base_url()).send().await.is_ok() {
                return Ok(());
            }

            // Check if the process has exited
            if let Ok(Some(status)) = self.child.try_wait() {
                // The pipe is closed once the process is gone, so this returns.
                let stderr = self
                    .stderr
                    .take()
                    .and_then(|reader| reader.join().ok())
                    .unwrap_or_default();
                return Err(TestError::StartupFailed(format!(
                    "server exited with status: {}: {}",
                    status,
                    stderr.trim()
                )));
            }

            tokio::time::sleep(delay).await;
        }

        Err(TestError::StartupFailed(
            "server did not become ready in time".to_string(),
        ))
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the base URL of the server.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Replace the route table file the server was started with.
    pub fn rewrite_routes(&self, yaml: &str) -> Result<(), TestError> {
        std::fs::write(&self.routes_path, yaml)?;
        Ok(())
    }

    /// Make a GET request to the given path.
    pub async fn get(&self, path: &str) -> Result<reqwest::Response, TestError> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.get(&url).send().await?)
    }

    /// Make a POST request to the given path.
    pub async fn post(&self, path: &str, body: &str) -> Result<reqwest::Response, TestError> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await?)
    }

    /// Make a request with any method.
    pub async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<reqwest::Response, TestError> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.request(method, &url).send().await?)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Find the pathmux binary in the target directory.
fn find_pathmux_binary() -> Result<PathBuf, TestError> {
    let root = fixtures()
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let mut candidates = vec![
        root.join("target/debug/pathmux"),
        root.join("target/release/pathmux"),
    ];
    if let Some(dir) = std::env::var_os("CARGO_TARGET_DIR") {
        let dir = PathBuf::from(dir);
        candidates.insert(0, dir.join("debug/pathmux"));
        candidates.insert(1, dir.join("release/pathmux"));
    }

    for path in &candidates {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    // Ask cargo where the target directory is
    if let Ok(output) = Command::new("cargo")
        .args(["metadata", "--format-version=1", "--no-deps"])
        .current_dir(&root)
        .output()
    {
        if output.status.success() {
            if let Ok(meta) = serde_json::from_slice::<serde_json::Value>(&output.stdout) {
                if let Some(dir) = meta["target_directory"].as_str() {
                    for profile in ["debug", "release"] {
                        let path = Path::new(dir).join(profile).join("pathmux");
                        if path.exists() {
                            return Ok(path);
                        }
                    }
                }
            }
        }
    }

    Err(TestError::BinaryNotFound(
        "target/debug/pathmux or target/release/pathmux".to_string(),
    ))
}

/// Find an available TCP port.
fn find_available_port() -> Result<u16, TestError> {
    // Bind to port 0 to get an OS-assigned port
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn json(resp: reqwest::Response) -> serde_json::Value {
        resp.json().await.unwrap()
    }

    #[tokio::test]
    async fn test_server_health() {
        let server = TestServer::from_fixture("minimal.yaml")
            .await
            .expect("failed to start server");

        let resp = server.get("/__pathmux/health").await.unwrap();
        assert_eq!(resp.status(), 200);

        let body = json(resp).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["routes"], 3);
    }

    #[tokio::test]
    async fn test_server_startup_failure_reports_stderr() {
        match TestServer::from_yaml("routes:\n  - path: /api/{name\n").await {
            Err(TestError::StartupFailed(message)) => {
                assert!(message.contains("unclosed variable"), "got: {message}");
            }
            Err(other) => panic!("expected StartupFailed, got {other}"),
            Ok(_) => panic!("server started with an invalid route table"),
        }
    }

    #[tokio::test]
    async fn test_server_mock_response() {
        let server = TestServer::from_fixture("minimal.yaml")
            .await
            .expect("failed to start server");

        let resp = server.get("/users/123").await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(json(resp).await["name"], "Alice");

        let resp = server.post("/users", "{}").await.unwrap();
        assert_eq!(resp.status(), 201);
        assert_eq!(resp.text().await.unwrap(), "created");
    }

    #[tokio::test]
    async fn test_server_404() {
        let server = TestServer::from_fixture("minimal.yaml")
            .await
            .expect("failed to start server");

        let resp = server.get("/nonexistent").await.unwrap();
        assert_eq!(resp.status(), 404);

        // Constraint rejects non-numeric ids
        let resp = server.get("/users/alice").await.unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn test_server_405() {
        let server = TestServer::from_fixture("minimal.yaml")
            .await
            .expect("failed to start server");

        let resp = server
            .request(reqwest::Method::DELETE, "/users")
            .await
            .unwrap();
        assert_eq!(resp.status(), 405);

        let allow = resp.headers().get("allow").unwrap().to_str().unwrap();
        assert_eq!(allow, "POST");
    }

    #[tokio::test]
    async fn test_server_options() {
        let server = TestServer::from_fixture("minimal.yaml")
            .await
            .expect("failed to start server");

        let resp = server
            .request(reqwest::Method::OPTIONS, "/users/1")
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["allow"], "GET");
    }

    #[tokio::test]
    async fn test_server_greedy_echo() {
        let server = TestServer::from_fixture("minimal.yaml")
            .await
            .expect("failed to start server");

        let resp = server
            .request(reqwest::Method::PUT, "/files/a/b/c.txt")
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body = json(resp).await;
        assert_eq!(body["pattern"], "/files/{path}*");
        assert_eq!(body["params"]["path"], "a/b/c.txt");
    }

    #[tokio::test]
    async fn test_server_routing_scenarios() {
        let server = TestServer::from_fixture("scenarios.yaml")
            .await
            .expect("failed to start server");

        let body = json(server.get("/api/v1/g/v/k").await.unwrap()).await;
        assert_eq!(body["pattern"], "/api/{path}*");
        assert_eq!(body["params"]["path"], "v1/g/v/k");

        let body = json(server.get("/api/dog/wang").await.unwrap()).await;
        assert_eq!(body["pattern"], "/api/{name}/{path}");
        assert_eq!(body["params"]["name"], "dog");
        assert_eq!(body["params"]["path"], "wang");

        let body = json(server.get("/v1/core/v1/configmap/abc").await.unwrap()).await;
        assert_eq!(body["pattern"], "/v1/{group}/{version}/configmap/{name}");
        assert_eq!(body["params"]["group"], "core");
        assert_eq!(body["params"]["version"], "v1");
        assert_eq!(body["params"]["name"], "abc");

        let resp = server.get("/dogs/HI").await.unwrap();
        assert_eq!(resp.status(), 404);

        let resp = server.get("/only").await.unwrap();
        assert_eq!(resp.status(), 404);

        let body = json(server.get("/ops/dog/wang/1:action").await.unwrap()).await;
        assert_eq!(body["pattern"], "/ops/{name}/{path}*:action");
        assert_eq!(body["params"]["path"], "wang/1");
    }

    #[tokio::test]
    async fn test_server_reloads_changed_routes() {
        let server = TestServer::watched("routes:\n  - path: /before\n")
            .await
            .expect("failed to start server");

        assert_eq!(server.get("/before").await.unwrap().status(), 200);
        assert_eq!(server.get("/after").await.unwrap().status(), 404);

        server
            .rewrite_routes("routes:\n  - path: /after\n")
            .unwrap();

        let mut reloaded = false;
        for _ in 0..50 {
            if server.get("/after").await.unwrap().status() == 200 {
                reloaded = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(reloaded, "route table was not reloaded");
        assert_eq!(server.get("/before").await.unwrap().status(), 404);
    }

    #[tokio::test]
    async fn test_server_keeps_routes_on_bad_reload() {
        let server = TestServer::watched("routes:\n  - path: /stable\n")
            .await
            .expect("failed to start server");

        server
            .rewrite_routes("routes:\n  - path: /broken/{name\n")
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(server.get("/stable").await.unwrap().status(), 200);
    }
}
