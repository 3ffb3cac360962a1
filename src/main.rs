use std::process::ExitCode;

use clap::{CommandFactory, Parser, error::ErrorKind};

use stress_tester::app;
use stress_tester::cli::Cli;
use stress_tester::config::Config;
use stress_tester::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(msg) = cli.validate() {
        Cli::command().error(ErrorKind::ArgumentConflict, msg).exit();
    }

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::from(&err);
        }
    };
    cli.apply_overrides(&mut config);

    let telemetry_guard = match init_telemetry(&config, cli.verbose) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Error: failed to initialize telemetry: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        environment = %config.environment,
        provider = %config.llm_provider,
        model = %config.llm_model,
        inputs = cli.inputs.len(),
        staged = cli.staged,
        dry_run = cli.dry_run,
        otel_export = telemetry_guard.is_exporting(),
        "Starting business-model-stress-tester"
    );

    let code = match app::run(&cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, error.type = err.kind(), exit_code = err.exit_code(), "Run failed");
            ExitCode::from(&err)
        }
    };

    telemetry_guard.shutdown();
    code
}
