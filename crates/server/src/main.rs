mod bootstrap;
mod health;
mod webhook;

use std::time::Duration;

use anyhow::Result;
use carlos_core::config::{AppConfig, LoadOptions};
use tokio::sync::oneshot;

fn init_logging(config: &AppConfig) {
    use carlos_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging needs the loaded config, so it comes up before anything else.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let server_config = app.config.server.clone();

    health::spawn(
        &server_config.bind_address,
        server_config.health_check_port,
        app.platform.clone(),
        app.bot.clone(),
    )
    .await?;

    let address = format!("{}:{}", server_config.bind_address, server_config.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        bot_user_id = %app.bot.user_id,
        "rent-a-carlos webhook listener started"
    );

    let (stop, stopped) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, webhook::router(app.webhook))
            .with_graceful_shutdown(async {
                let _ = stopped.await;
            })
            .await
    });

    tokio::select! {
        finished = &mut server => {
            finished??;
            return Ok(());
        }
        signal = wait_for_shutdown() => signal?,
    }

    tracing::info!(event_name = "system.server.stopping", "rent-a-carlos stopping");
    let _ = stop.send(());
    match tokio::time::timeout(Duration::from_secs(server_config.graceful_shutdown_secs), server)
        .await
    {
        Ok(finished) => finished??,
        Err(_) => tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            grace_secs = server_config.graceful_shutdown_secs,
            "in-flight callbacks did not finish before the grace period"
        ),
    }

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
