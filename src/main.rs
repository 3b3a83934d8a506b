use clap::Parser;
use model_gate::config::RouterConfig;
use model_gate::logging::{self, LoggingConfig};
use model_gate::server;
use tracing::error;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RouterConfig::parse();

    logging::init_logging(LoggingConfig {
        level: logging::parse_level(config.log_level.as_deref()),
        json_format: config.log_json,
        log_dir: None,
    });

    if let Err(err) = server::startup(config).await {
        error!("model-gate exited with error: {err}");
        std::process::exit(1);
    }

    Ok(())
}
