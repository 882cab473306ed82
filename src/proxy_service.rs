//! Gateway request service.
//!
//! Ties the pipeline together for one inbound request:
//!
//! ```text
//! route lookup ─▶ collect body ─▶ Dispatcher::dispatch ─▶ EgressGuard ─▶ UpstreamClient
//!      │                │                  │                    │               │
//!     404          413 / 408          400 / 401               500        502 / 504
//! ```
//!
//! Errors come back as `GatewayError`; the server turns them into empty
//! responses with the matching status.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use chrono::Utc;
use http_body::Body;
use http_body_util::BodyExt;
use hyper::{Request, Response};
use tower::{Layer, Service, ServiceExt};
use tracing::{debug, error};

use crate::config::Limits;
use crate::dispatcher::{BodyLimits, collect_body};
use crate::error::{GatewayError, GatewayResult};
use crate::transport::egress::{EgressGuard, EgressGuardLayer};
use crate::transport::router::RouteTable;
use crate::transport::upstream::{GatewayBody, UpstreamClient, UpstreamConfig};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The gateway as a tower service. Cheap to clone per connection.
#[derive(Clone)]
pub struct GatewayService {
    routes: Arc<RouteTable>,
    limits: BodyLimits,
    egress: EgressGuard<UpstreamClient>,
}

impl GatewayService {
    /// Build the service with a fresh backend client bounded by
    /// `limits.backend_timeout`.
    pub fn new(routes: Arc<RouteTable>, limits: &Limits) -> GatewayResult<Self> {
        let upstream = UpstreamClient::new(UpstreamConfig::with_timeout(limits.backend_timeout))?;
        Ok(Self::with_upstream(routes, BodyLimits::from(limits), upstream))
    }

    pub fn with_upstream(
        routes: Arc<RouteTable>,
        limits: BodyLimits,
        upstream: UpstreamClient,
    ) -> Self {
        Self {
            routes,
            limits,
            egress: EgressGuardLayer.layer(upstream),
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Run one request through the pipeline.
    pub async fn handle_request<B>(&self, req: Request<B>) -> GatewayResult<Response<GatewayBody>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let received_at = Utc::now();

        let Some(route) = self.routes.route(req.uri().path()) else {
            debug!(path = %req.uri().path(), "No route for request");
            return Err(GatewayError::NoRoute(req.uri().path().to_string()));
        };

        let (parts, body) = req.into_parts();
        let body = collect_body(body, self.limits).await?;
        let outbound = route
            .dispatcher
            .dispatch(Request::from_parts(parts, body), received_at)?;

        self.egress.clone().oneshot(outbound).await
    }

    /// Like [`handle_request`](Self::handle_request), with errors turned into
    /// empty-bodied responses.
    pub async fn respond<B>(&self, req: Request<B>) -> Response<GatewayBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        match self.handle_request(req).await {
            Ok(response) => response,
            Err(e) => {
                let status = e.status();
                if status.is_server_error() {
                    error!(status = status.as_u16(), error = %e, "Request failed");
                } else {
                    debug!(status = status.as_u16(), error = %e, "Request rejected");
                }
                e.to_response()
                    .map(|body| body.map_err(|never| match never {}).boxed())
            }
        }
    }
}

impl<B> Service<Request<B>> for GatewayService
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    type Response = Response<GatewayBody>;
    type Error = GatewayError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { service.handle_request(req).await })
    }
}
