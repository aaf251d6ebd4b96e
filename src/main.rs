use referral_rewards::application::handlers::router;
use referral_rewards::application::referral_program::ReferralProgram;
use referral_rewards::config::ReferralConfig;
use referral_rewards::persistence::{init_database_with, DatabaseConfig};
use referral_rewards::task_runner::{run_periodic_with_circuit_breaker, CircuitBreakerConfig};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Environment from .env, if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "referral_rewards=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Referral rewards service starting...");

    let config = ReferralConfig::from_env();
    let database = DatabaseConfig::from_env();
    info!("Opening database {}", database.url);
    let pool = init_database_with(&database).await?;

    let program = Arc::new(ReferralProgram::from_pool(pool.clone(), &config));

    if config.sweep_enabled && config.mail_relay_url.is_none() {
        info!("Referral email sweep not scheduled: no mail relay configured");
    } else if config.sweep_enabled {
        let sweep_program = program.clone();
        let interval = config.sweep_interval();
        info!("Referral email sweep scheduled every {:?}", interval);
        tokio::spawn(async move {
            let open = run_periodic_with_circuit_breaker(
                "referral_email_sweep",
                interval,
                CircuitBreakerConfig::default(),
                || {
                    let program = sweep_program.clone();
                    async move {
                        program
                            .run_referral_email_sweep()
                            .await
                            .map(|_| ())
                            .map_err(|e| e.to_string())
                    }
                },
            )
            .await;
            error!("{}", open);
        });
    } else {
        info!("Referral email sweep disabled");
    }

    let app = router(program);

    info!("Listening on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    let server = axum::serve(listener, app);

    let shutdown_signal = async {
        let ctrl_c = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C signal"),
                Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                    info!("Received SIGTERM signal");
                }
                Err(e) => error!("Failed to install SIGTERM handler: {}", e),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    };

    info!("Server started successfully. Press Ctrl+C to stop.");
    server.with_graceful_shutdown(shutdown_signal).await?;

    info!("Server shutting down gracefully...");
    pool.close().await;

    info!("Shutdown complete");
    Ok(())
}
