//! Egress guard.
//!
//! Last stop before the backend client: any outbound request without a
//! non-empty `ce-id` header is refused with `MissingEventId` and never sent.
//! The dispatcher always stamps one, so tripping this guard means a bug in
//! the pipeline rather than a bad webhook.

use std::task::{Context, Poll};

use futures_util::future::{Either, Ready, ready};
use http::Request;
use tower::{Layer, Service};
use tracing::error;

use crate::cloudevents::CE_ID;
use crate::error::GatewayError;

/// Wraps a service in an [`EgressGuard`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EgressGuardLayer;

impl<S> Layer<S> for EgressGuardLayer {
    type Service = EgressGuard<S>;

    fn layer(&self, inner: S) -> Self::Service {
        EgressGuard { inner }
    }
}

#[derive(Debug, Clone)]
pub struct EgressGuard<S> {
    inner: S,
}

fn has_event_id<B>(req: &Request<B>) -> bool {
    req.headers()
        .get(CE_ID)
        .is_some_and(|v| !v.as_bytes().is_empty())
}

impl<S, B> Service<Request<B>> for EgressGuard<S>
where
    S: Service<Request<B>, Error = GatewayError>,
{
    type Response = S::Response;
    type Error = GatewayError;
    type Future = Either<Ready<Result<S::Response, GatewayError>>, S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        if !has_event_id(&req) {
            error!(target_uri = %req.uri(), "Refusing to forward request without ce-id");
            return Either::Left(ready(Err(GatewayError::MissingEventId)));
        }
        Either::Right(self.inner.call(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    /// Counts forwarded requests and answers with their `ce-id`.
    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<AtomicUsize>,
    }

    impl Service<Request<()>> for Recorder {
        type Response = String;
        type Error = GatewayError;
        type Future = Ready<Result<String, GatewayError>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<()>) -> Self::Future {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let id = req.headers()[CE_ID].to_str().unwrap_or_default().to_string();
            ready(Ok(id))
        }
    }

    fn guarded() -> (EgressGuard<Recorder>, Arc<AtomicUsize>) {
        let recorder = Recorder::default();
        let calls = recorder.calls.clone();
        (EgressGuardLayer.layer(recorder), calls)
    }

    #[tokio::test]
    async fn request_with_event_id_passes() {
        let (guard, calls) = guarded();
        let req = Request::post("http://backend/").header(CE_ID, "42").body(()).unwrap();

        let id = guard.oneshot(req).await.unwrap();
        assert_eq!(id, "42");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn request_without_event_id_is_refused() {
        let (guard, calls) = guarded();
        let req = Request::post("http://backend/").body(()).unwrap();

        let err = guard.oneshot(req).await.unwrap_err();
        assert!(matches!(err, GatewayError::MissingEventId));
        assert_eq!(err.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_event_id_is_refused() {
        let (guard, calls) = guarded();
        let req = Request::post("http://backend/").header(CE_ID, "").body(()).unwrap();

        assert!(guard.oneshot(req).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
