use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use payoff::config::{Cli, Command, SimulateArgs};
use payoff::core::{parse_debt_form, simulate, simulate_with_seed};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "payoff=info,tower_http=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Serve(args) => match args.into_config() {
            Ok(config) => payoff::api::run_http_server(config).await,
            Err(e) => Err(e.into()),
        },
        Command::Simulate(args) => run_simulate(&args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run_simulate(args: &SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let entries = parse_debt_form(&args.to_form())?;
    let debts: Vec<_> = entries.into_iter().map(|e| e.debt).collect();
    let simulation = match args.seed {
        Some(seed) => simulate_with_seed(&debts, seed),
        None => simulate(&debts),
    };
    println!("{}", serde_json::to_string_pretty(&simulation)?);
    Ok(())
}
