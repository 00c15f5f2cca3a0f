//! netbin
//!
//! Listens on a socket and runs CMD for every accepted connection, with the
//! connection as the command's stdin and stdout. The command's stderr is
//! logged.

use clap::{CommandFactory, Parser};
use tracing::info;

use netbin::Server;
use netbin_core::config::{DEFAULT_ADDR, DEFAULT_MAX_CONCURRENT, DEFAULT_TCP_KEEPALIVE_SECS};
use netbin_core::{Config, Domain};

#[derive(Parser, Debug)]
#[command(name = "netbin")]
#[command(
    version,
    about = "Serve a fresh subprocess per accepted socket connection",
    override_usage = "netbin [OPTIONS] CMD [CMDARGS]..."
)]
struct Args {
    /// Domain to listen on
    #[arg(long, value_enum, default_value_t = Domain::Tcp, env = "NETBIN_DOMAIN")]
    domain: Domain,

    /// Address to listen on, or socket path for the unix domain
    #[arg(long, default_value = DEFAULT_ADDR, env = "NETBIN_ADDR")]
    addr: String,

    /// Maximum concurrent connections, 0 to disable
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT, env = "NETBIN_MAX_CONCURRENT")]
    max_concurrent: usize,

    /// TCP keepalive in seconds, 0 to disable
    #[arg(long, default_value_t = DEFAULT_TCP_KEEPALIVE_SECS, env = "NETBIN_TCP_KEEPALIVE")]
    tcp_keepalive: u64,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "NETBIN_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "NETBIN_LOG_JSON")]
    log_json: bool,

    /// Command (and its arguments) to run for each connection
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "CMD")]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let Ok(config) = Config::new(args.command) else {
        usage_and_exit();
    };
    let config = config
        .with_domain(args.domain)
        .with_addr(args.addr)
        .with_max_concurrent(args.max_concurrent)
        .with_tcp_keepalive(args.tcp_keepalive);

    netbin_core::tracing_init::init_tracing(
        &netbin_core::tracing_init::default_filter(&args.log_level),
        args.log_json,
    );

    info!(
        version = env!("CARGO_PKG_VERSION"),
        domain = %config.domain,
        max_concurrent = config.max_concurrent,
        tcp_keepalive = config.tcp_keepalive_secs,
        program = %config.program,
        "Starting netbin"
    );

    let server = Server::bind(config).await?;
    server.run().await?;

    info!("netbin stopped");
    Ok(())
}

#[allow(clippy::print_stderr)]
fn usage_and_exit() -> ! {
    eprintln!("{}", Args::command().render_help());
    std::process::exit(1);
}
