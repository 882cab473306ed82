//! cloudevents-gateway - webhook ingress that speaks CloudEvents to backends.
//!
//! Providers (GitHub, Docker Hub, Alertmanager, Anchore Engine, Clair, Slack)
//! post their native webhooks to a per-provider path. For each request the
//! gateway:
//!
//! 1. picks the route by path and buffers the body
//! 2. parses the payload into a [`cloudevents::CanonicalEvent`]
//! 3. forwards the original body unchanged to the route's backend, with the
//!    event attributes as `ce-*` binary-mode headers
//!
//! A payload that cannot be parsed is answered with 400 (401 for a bad
//! signature) and never forwarded.

pub mod cloudevents;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod logging_layer;
pub mod proxy_service;
pub mod timeout;
pub mod transport;
pub mod webhook;
