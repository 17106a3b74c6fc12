use anyhow::Result;
use tracing::info;
use vigil::config;
use vigil::notify::Notifier;
use vigil::remote::RemoteClient;
use vigil::retry::RetryPolicy;
use vigil::tracker::Tracker;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vigil=info".into()),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "vigil.toml".to_string());
    let config = config::load_config(&config_path)?;
    config.validate()?;

    info!(
        users = config.usernames().len(),
        interval_s = config.poll_interval_seconds,
        cooldown_s = config.notify_cooldown_seconds,
        state_file = %config.state_file.display(),
        "Starting vigil"
    );

    let policy = RetryPolicy {
        max_retries: config.max_retries,
        base: config.retry_base(),
    };
    let client = RemoteClient::new(config.api.clone(), config.http_timeout(), policy)?;
    let notifier = Notifier::new(config.webhook_url.clone(), config.http_timeout(), policy)?;

    let mut tracker = Tracker::start(&config, client, notifier).await?;
    tracker.run().await
}
