//! # seglog Server Entry Point
//!
//! Serves the produce/consume HTTP API over a log directory.
//!
//! ## Usage
//!
//! ```bash
//! # Serve an existing (or fresh) log directory on the default address
//! seglog ./data
//!
//! # Bind a different address
//! seglog --addr 0.0.0.0:9090 ./data
//!
//! # Show version
//! seglog --version
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use eyre::{bail, Result};
use seglog::{server, Config, Log};

const DEFAULT_ADDR: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::fmt().init();

    let args: Vec<String> = env::args().collect();

    let mut addr = DEFAULT_ADDR.to_string();
    let mut dir: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            "--version" | "-v" => {
                println!("seglog {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--addr" | "-a" => {
                i += 1;
                match args.get(i) {
                    Some(value) => addr = value.clone(),
                    None => bail!("--addr requires an address"),
                }
            }
            arg if arg.starts_with('-') => {
                bail!("Unknown option: {}", arg);
            }
            path => {
                if dir.is_some() {
                    bail!("Multiple log directories specified");
                }
                dir = Some(PathBuf::from(path));
            }
        }
        i += 1;
    }

    let dir = match dir {
        Some(d) => d,
        None => {
            print_usage();
            return Ok(());
        }
    };

    let log = Arc::new(Log::open(&dir, Config::default())?);
    server::serve(log, &addr).await
}

fn print_usage() {
    println!("seglog - segmented append-only record log server");
    println!();
    println!("USAGE:");
    println!("    seglog [OPTIONS] <LOG_DIR>");
    println!();
    println!("OPTIONS:");
    println!("    -a, --addr <ADDR>    Address to listen on (default {DEFAULT_ADDR})");
    println!("    -h, --help           Show this help");
    println!("    -v, --version        Show version");
}
