use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pbilink::commands;
use pbilink::config::{Command, Config, Settings};
use pbilink::demo;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Config::parse_args();

    // Setup logging
    setup_logging(cli.debug);

    // Load settings
    let mut settings = Settings::load(cli.config.as_ref())?;
    settings.merge_cli(&cli);
    settings.validate();

    match cli.command() {
        Command::List { json } => commands::list(&settings, json).await,
        Command::Probe { port } => commands::probe(&settings, port).await,
        Command::Watch { .. } => commands::watch(&settings).await,
        Command::Demo => demo::run(&settings),
    }
}

fn setup_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("pbilink=debug,pbilink_core=debug")
    } else {
        EnvFilter::new("pbilink=info,pbilink_core=info")
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
