//! cloudevents-gateway binary.
//!
//! Loads the YAML configuration, builds the route table and serves until
//! SIGINT/SIGTERM. Any startup error exits with status 1.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use cloudevents_gateway::config::{listen_addr, load_and_validate};
use cloudevents_gateway::lifecycle::{Lifecycle, spawn_signal_handlers};
use cloudevents_gateway::proxy_service::GatewayService;
use cloudevents_gateway::transport::{RouteTable, Server, load_acceptor};
use tracing::{info, warn};

const COMMIT: &str = match option_env!("GIT_COMMIT") {
    Some(commit) => commit,
    None => "HEAD",
};

#[derive(Parser, Debug)]
#[command(author, about, long_about = None, disable_version_flag = true)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(
        short,
        long,
        env = "CLOUDEVENTS_GATEWAY_CONFIG",
        default_value = "config.yml"
    )]
    config: PathBuf,

    /// Print version and exit
    #[arg(short = 'v', long)]
    version: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Usage errors exit 1 like every other startup failure; clap's default
    // is 2. Help output still exits 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = exit_code_for(&e);
            e.print()?;
            std::process::exit(code);
        }
    };
    if cli.version {
        println!("{} ({COMMIT})", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = COMMIT,
        config = %cli.config.display(),
        "Starting cloudevents-gateway"
    );

    let (config, validation) = load_and_validate(&cli.config)?;
    for warning in &validation.warnings {
        warn!(%warning, "Configuration warning");
    }

    let addr = listen_addr(&config)?;
    let routes = Arc::new(RouteTable::from_config(&config)?);
    let service = GatewayService::new(routes, &config.limits)?;

    let lifecycle = Arc::new(Lifecycle::default());
    spawn_signal_handlers(lifecycle.clone());

    let mut server = Server::bind(addr, service, lifecycle)
        .await?
        .with_header_read_timeout(config.limits.read_timeout);
    if let Some(tls) = config.tls.as_ref().filter(|tls| tls.is_enabled()) {
        server = server.with_tls(load_acceptor(tls)?);
    }

    server.run().await?;
    info!("Shutdown complete");
    Ok(())
}

fn exit_code_for(err: &clap::Error) -> i32 {
    if err.use_stderr() { 1 } else { 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_flag_exits_with_one() {
        let err = Cli::try_parse_from(["cloudevents-gateway", "--bogus"]).unwrap_err();
        assert_eq!(exit_code_for(&err), 1);
    }

    #[test]
    fn help_exits_with_zero() {
        let err = Cli::try_parse_from(["cloudevents-gateway", "--help"]).unwrap_err();
        assert_eq!(exit_code_for(&err), 0);
    }

    #[test]
    fn version_flag_is_parsed() {
        let cli = Cli::try_parse_from(["cloudevents-gateway", "-v", "-c", "gw.yml"]).unwrap();
        assert!(cli.version);
        assert_eq!(cli.config, PathBuf::from("gw.yml"));
    }
}
