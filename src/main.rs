//! proxylet: a lightweight HTTP/1.x reverse proxy.
//!
//! ```text
//!     Client ──▶ net::Listener ──▶ proxy::Session ──▶ routing::Router
//!                                        │                   │
//!                                        │◀── Destination ───┘
//!                                        ▼
//!                          rewrite::Rewriter (request)
//!                                        │
//!                                        ▼
//!                                    Upstream
//!                                        │
//!                          rewrite::Rewriter (response)
//!                                        │
//!     Client ◀───────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "proxylet", version, about = "Lightweight HTTP/1.x reverse proxy")]
struct Args {
    /// Path to the TOML configuration file. Routes reload when it changes.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    proxylet::lifecycle::run(args.config.as_deref()).await?;
    Ok(())
}
