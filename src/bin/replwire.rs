//! `replwire` – debug-console adapter speaking NDJSON over stdio or TCP.

use anyhow::{Context, Result};
use clap::Parser;
use replwire::{Repl, ReplConfig};
use std::io::{self, BufReader};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "replwire")]
#[command(about = "Debug-console protocol adapter", version = replwire::VERSION, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Connect to a front end listening on this local port
    #[arg(long, conflicts_with = "listen")]
    port: Option<u16>,

    /// Accept one front-end connection on this address
    #[arg(long)]
    listen: Option<String>,

    /// Extra directory searched by `import` (repeatable)
    #[arg(long = "module-path")]
    module_paths: Vec<PathBuf>,

    /// Default truncation length for textual fields
    #[arg(long)]
    max_length: Option<usize>,

    /// Render lists and dicts as JSON display entries
    #[arg(long)]
    rich_display: bool,
}

fn main() -> Result<()> {
    // stdout may carry the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ReplConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ReplConfig::default(),
    };
    config.module_paths.extend(cli.module_paths.iter().cloned());
    if let Some(max) = cli.max_length {
        config.maximum_length = max;
    }
    config.rich_display |= cli.rich_display;

    let mut repl = if let Some(port) = cli.port {
        let stream = TcpStream::connect(("127.0.0.1", port))
            .with_context(|| format!("connecting to port {port}"))?;
        info!(port, "connected to front end");
        tcp_repl(stream, config)?
    } else if let Some(addr) = &cli.listen {
        let listener = TcpListener::bind(addr).with_context(|| format!("binding {addr}"))?;
        info!(addr = %listener.local_addr()?, "waiting for front end");
        let (stream, peer) = listener.accept()?;
        info!(%peer, "front end connected");
        tcp_repl(stream, config)?
    } else {
        info!("serving on stdio");
        Repl::new(BufReader::new(io::stdin()), io::stdout(), config)
    };

    repl.run().context("protocol failure")?;
    Ok(())
}

fn tcp_repl(stream: TcpStream, config: ReplConfig) -> Result<Repl> {
    let reader = BufReader::new(stream.try_clone()?);
    Ok(Repl::new(reader, stream, config))
}
