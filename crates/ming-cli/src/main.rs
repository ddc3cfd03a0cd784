//! Ming Gateway - S3-compatible storage gateway

use ming_cli::cli::Cli;
use ming_cli::{run, GatewayEnv};
use std::process::ExitCode;
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(debug: bool, json: bool) {
    let log_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("ming_cli={log_level},ming_core={log_level},ming_backend={log_level},tower_http={log_level}").into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = match Cli::try_parse_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(e) => return e.report(),
    };
    if cli.backend.wants_help() {
        cli.print_backend_help();
        return ExitCode::from(1);
    }

    init_tracing(cli.global.debug, cli.global.json);

    let mut env = GatewayEnv::from_process();
    let deployment_id = env.deployment_id();
    let span = tracing::info_span!("ming", deployment_id = %deployment_id);

    let config = cli.global.gateway_config();
    let gateway = cli.backend.into_gateway();
    match run(config, gateway, env).instrument(span).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(stage = %e.stage, error = %e.source, "gateway stopped with an error");
            eprintln!("ERROR Unable to start the gateway: {e}");
            ExitCode::from(1)
        }
    }
}
