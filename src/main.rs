use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tide::config::{Config, Settings};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Config::parse_args();

    // Setup logging
    setup_logging(cli.debug);

    // Load settings
    let mut settings = match Settings::load(cli.config.as_ref()) {
        Ok(settings) => settings,
        Err(e) => return report(e),
    };
    settings.merge_cli(&cli);
    settings.validate();

    // Run the application
    match tide::app::run(cli, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(e),
    }
}

fn report(error: anyhow::Error) -> ExitCode {
    eprintln!("Error: {:#}", error);
    ExitCode::FAILURE
}

fn setup_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("tide=debug,tide_core=debug")
    } else {
        EnvFilter::new("tide=info,tide_core=info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
