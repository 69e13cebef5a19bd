// Entry point - CLI parsing and wiring

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, prelude::*};

mod app;
mod command;
mod config;
mod delegate;
mod error;
mod resolve;
mod store;

use crate::app::App;
use crate::command::Args;
use crate::config::Config;
use crate::delegate::Https;
use crate::error::Error;

fn init_tracing() {
    // RUST_LOG overrides the default; logs go to stderr so stdout only
    // carries the server acknowledgement.
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(args: Args) -> Result<(), Error> {
    let config = Config::load()?;
    let passphrase = app::prompt_passphrase()?;
    App::new(config).run(&args, &passphrase, Https).await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "error".red(), e);
            ExitCode::FAILURE
        }
    }
}
