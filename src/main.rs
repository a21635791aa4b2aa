use anyhow::Result;
use solarprognose_poller::config::Config;
use solarprognose_poller::coordinator::Coordinator;
use solarprognose_poller::http;
use solarprognose_poller::restore::CounterStore;
use solarprognose_poller::service::PollService;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,solarprognose_poller=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let config = Config::from_env()?;

    let counter_store = config.counter_state_path.clone().map(CounterStore::new);
    let coordinator = Arc::new(Coordinator::new(
        reqwest::Client::new(),
        config.api_url.clone(),
        config.request_timeout,
        config.timezone,
        counter_store.clone(),
    ));

    if let Some(store) = &counter_store {
        if let Some(raw) = store.load() {
            if coordinator.restore_call_count(&raw) {
                tracing::info!(
                    calls = coordinator.snapshot().api_calls_today,
                    "restored api call counter"
                );
            } else {
                tracing::warn!(value = %raw.trim(), "ignoring unparsable persisted api call counter");
            }
        }
    }

    let cancel = CancellationToken::new();
    let poll_handle =
        PollService::new(coordinator.clone(), config.poll_interval).start(cancel.clone());

    let app = http::router(http::HttpState {
        coordinator: coordinator.clone(),
    });
    let listener = tokio::net::TcpListener::bind(&config.http_bind).await?;
    tracing::info!(
        bind = %config.http_bind,
        timezone = %config.timezone,
        interval_minutes = config.poll_interval.as_secs() / 60,
        "solarprognose-poller listening"
    );
    let http_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        _ = http_handle => {}
    }

    cancel.cancel();
    let _ = poll_handle.await;
    Ok(())
}
