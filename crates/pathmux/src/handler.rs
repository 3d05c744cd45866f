//! Request handlers.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http_body_util::Full;
use hyper::{Request, Response};

/// A request handler stored in the routing table.
///
/// Handlers are shared by every in-flight request, so they must be safe to
/// call concurrently.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, req: Request<Bytes>) -> BoxFuture<'static, Response<Full<Bytes>>>;
}

/// Type-erased handler, the value type of config-built muxes.
pub type BoxedHandler = Arc<dyn Handler>;

impl Handler for Arc<dyn Handler> {
    fn call(&self, req: Request<Bytes>) -> BoxFuture<'static, Response<Full<Bytes>>> {
        (**self).call(req)
    }
}

/// Handler backed by an async function. Created with [`handler_fn`].
#[derive(Clone)]
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap an async function or closure as a [`Handler`].
///
/// ```
/// use bytes::Bytes;
/// use http_body_util::Full;
/// use hyper::Response;
/// use pathmux_lib::handler_fn;
///
/// let hello = handler_fn(|_req| async { Response::new(Full::new(Bytes::from("hello"))) });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Request<Bytes>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    HandlerFn { f }
}

impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Request<Bytes>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    fn call(&self, req: Request<Bytes>) -> BoxFuture<'static, Response<Full<Bytes>>> {
        Box::pin((self.f)(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_string(resp: Response<Full<Bytes>>) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_handler_fn_receives_request() {
        let echo = handler_fn(|req: Request<Bytes>| async move {
            Response::new(Full::new(req.into_body()))
        });

        let resp = echo.call(Request::new(Bytes::from("ping"))).await;
        assert_eq!(body_string(resp).await, "ping");
    }

    #[tokio::test]
    async fn test_boxed_handler_delegates() {
        let boxed: BoxedHandler = Arc::new(handler_fn(|_req| async {
            Response::new(Full::new(Bytes::from("boxed")))
        }));

        let resp = boxed.call(Request::new(Bytes::new())).await;
        assert_eq!(body_string(resp).await, "boxed");
    }
}
