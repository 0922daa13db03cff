//! Anvil Host Example
//!
//! Loads the plugins listed in `anvil.toml` and runs until Ctrl+C.
//!
//! The greeter module is linked in, so `static:greeter` entries work without
//! building a dynamic library.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package anvil-host
//! cargo run --package anvil-host -- --profile debug --run-for 12
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anvil::prelude::*;
use anyhow::Result;
use clap::Parser;

// Links the greeter module into the binary.
use greeter_plugin as _;

#[derive(Parser, Debug)]
#[command(name = "anvil-host", about = "Runs the Anvil plugin host", version)]
struct Cli {
    /// Configuration file (searched in the usual locations when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile
    #[arg(short, long)]
    profile: Option<String>,

    /// Extra plugin paths to load after the configured ones
    #[arg(long = "plugin", value_name = "PATH")]
    plugins: Vec<String>,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long, value_name = "SECS")]
    run_for: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder = PluginHost::builder();
    if let Some(path) = &cli.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = cli.profile {
        builder = builder.profile(profile);
    }
    let mut host = builder.build()?;

    let mut reports = host.load_configured_plugins();
    for path in &cli.plugins {
        reports.push(host.manager_mut().load_plugin(path, None));
    }

    for report in reports.iter().filter(|r| !r.is_success()) {
        for error in &report.errors {
            warn!(path = %report.path, error = %error, "Plugin load problem");
        }
    }

    match cli.run_for {
        Some(secs) => {
            host.run_until(tokio::time::sleep(Duration::from_secs(secs)))
                .await?
        }
        None => host.run().await?,
    }

    Ok(())
}
