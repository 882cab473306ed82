//! Network plumbing around the dispatcher.
//!
//! ```text
//! ┌──────────┐     ┌──────────────────────────────────────────────┐     ┌─────────┐
//! │ Provider │────▶│ server ─▶ router ─▶ dispatcher ─▶ egress ─▶ upstream │────▶│ Backend │
//! │ webhook  │◀────│                                              │◀────│         │
//! └──────────┘     └──────────────────────────────────────────────┘     └─────────┘
//! ```

pub mod egress;
pub mod router;
pub mod server;
pub mod tls;
pub mod upstream;

pub use egress::{EgressGuard, EgressGuardLayer};
pub use router::{Route, RouteTable, parser_for};
pub use server::Server;
pub use tls::{TlsSetupError, install_crypto_provider, load_acceptor};
pub use upstream::{GatewayBody, UpstreamClient, UpstreamConfig};
