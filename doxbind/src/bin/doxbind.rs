//! CLI entry point for doxbind.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use doxbind::Mode;

/// doxbind — generate scripting-engine bindings from Doxygen XML.
#[derive(Parser, Debug)]
#[command(name = "doxbind", version, about)]
struct Cli {
    /// Path to the doxbind.toml configuration file.
    #[arg(default_value = "doxbind.toml")]
    config: PathBuf,

    /// What to generate.
    #[arg(long, value_enum, default_value_t = Mode::Bindings)]
    mode: Mode,

    /// Output directory (overrides config).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Run doxygen over the source roots instead of reading existing XML.
    #[arg(long)]
    generate_xml: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("doxbind=info")),
        )
        .init();

    let cli = Cli::parse();
    doxbind::run(&cli.config, cli.mode, cli.output.as_deref(), cli.generate_xml)?;
    Ok(())
}
