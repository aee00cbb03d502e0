#![recursion_limit = "256"]

mod cli;
mod application;
mod domain;
mod data;
mod ml;
mod infra;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy()
                .add_directive("procedure_mlm=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    cli.run()
}
