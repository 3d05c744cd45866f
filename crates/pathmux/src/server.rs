//! HTTP/1 server loop.

use std::convert::Infallible;
use std::future::Future;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use pathmux_telemetry::{log_connection_error, log_request_completed, log_shutdown};
use tokio::net::TcpListener;

use crate::mux::{json_response, MatchedPattern};
use crate::reload::SharedMux;

/// How long in-flight connections get to finish after shutdown is signalled.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Accept connections until `shutdown` resolves, then drain.
///
/// Each connection runs on its own task and every request is dispatched
/// through whichever route table is live when it arrives.
pub async fn serve<F>(listener: TcpListener, routes: SharedMux, shutdown: F)
where
    F: Future<Output = ()>,
{
    let graceful = GracefulShutdown::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => {
                let (stream, remote) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        log_connection_error!(error = %e, "accept failed");
                        continue;
                    }
                };

                let routes = routes.clone();
                let service = service_fn(move |req| handle_request(routes.clone(), req));
                let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
                let conn = graceful.watch(conn);

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        log_connection_error!(remote = %remote, error = %e, "connection error");
                    }
                });
            }
        }
    }

    log_shutdown!("draining connections");
    tokio::select! {
        _ = graceful.shutdown() => {}
        _ = tokio::time::sleep(DRAIN_TIMEOUT) => {
            tracing::warn!("drain timed out, closing remaining connections");
        }
    }
}

/// Handle an incoming HTTP request.
async fn handle_request(
    routes: SharedMux,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let (parts, body) = req.into_parts();
    let resp = match body.collect().await {
        Ok(collected) => {
            let req = Request::from_parts(parts, collected.to_bytes());
            let mux = routes.load_full();
            mux.serve(req).await
        }
        Err(_) => json_response(
            StatusCode::BAD_REQUEST,
            r#"{"error":"failed to read request body"}"#,
        ),
    };

    let pattern = resp
        .extensions()
        .get::<MatchedPattern>()
        .map(|p| p.0.as_str())
        .unwrap_or("");
    log_request_completed!(
        method = %method,
        path = %path,
        status = resp.status().as_u16(),
        pattern,
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "request completed"
    );

    Ok(resp)
}
