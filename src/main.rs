use clap::Parser;
use std::process::{ExitCode, Termination};
use volshift::cmd;
use volshift::cmd::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.cmd {
        Command::Serve(args) => cmd::serve(args).await,
        Command::Run(args) => cmd::run(*args).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => e.report(),
    }
}
