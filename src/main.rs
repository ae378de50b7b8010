use std::sync::Arc;

use readiness_quiz::agent::QuizAgent;
use readiness_quiz::channels::{Channel, CliChannel, TelegramChannel};
use readiness_quiz::config::{QuizConfig, TransportKind};
use readiness_quiz::error::ConfigError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = QuizConfig::from_env().inspect_err(|e| {
        if matches!(e, ConfigError::MissingEnvVar(_)) {
            eprintln!("Error: {e}");
            eprintln!("  export BOT_TOKEN=123456:ABC-...");
        }
    })?;

    eprintln!("🤖 Readiness Quiz v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Operator: {}", config.operator_id);
    eprintln!("   CTA link: {}", config.channel_link);
    eprintln!(
        "   Thresholds: high c>={}, medium b>={}",
        config.thresholds.high, config.thresholds.medium
    );

    let channel: Arc<dyn Channel> = match (config.transport, config.bot_token.clone()) {
        (TransportKind::Telegram, Some(token)) => {
            eprintln!("   Transport: telegram\n");
            Arc::new(TelegramChannel::new(token))
        }
        (TransportKind::Telegram, None) => {
            return Err(ConfigError::MissingEnvVar("BOT_TOKEN".into()).into());
        }
        (TransportKind::Cli, _) => {
            eprintln!("   Transport: cli (type /start, then a, b or c)\n");
            Arc::new(CliChannel::new())
        }
    };

    let agent = QuizAgent::new(config, channel);
    agent.run().await?;

    Ok(())
}
