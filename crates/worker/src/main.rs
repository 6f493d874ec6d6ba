//! Courier delivery pipeline worker binary entrypoint.

use std::sync::Arc;
use std::time::Duration;

use courier_common::config::AppConfig;
use courier_common::db;
use courier_common::encryption::PayloadCipher;
use courier_common::queue::TaskQueue;
use courier_common::redis_pool::create_redis_pool;
use courier_dispatcher::sender::CallbackSender;
use courier_pipeline::identity::{ContactLookup, ContactProfileClient};
use courier_pipeline::process::ReceiptProcessor;
use courier_pipeline::retry::RetryPolicy;
use courier_providers::{PlatformSenders, ProviderRegistry};
use courier_worker::consumers::{run_callback_loop, run_inbound_loop, run_retry_promoter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_worker=info,courier_pipeline=debug".into()),
        )
        .json()
        .init();

    tracing::info!("Courier worker starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // Connect to Redis
    let redis = create_redis_pool(&config.redis_url).await?;
    let queue = TaskQueue::new(redis);

    let http_timeout = Duration::from_secs(config.http_timeout_seconds);
    let retry_delay = Duration::from_secs(config.retry_delay_seconds);

    // Injected dependencies, constructed once at startup
    let cipher = Arc::new(PayloadCipher::new(&config.callback_secret)?);
    let sender = Arc::new(CallbackSender::new(http_timeout)?);
    let registry = Arc::new(ProviderRegistry::new(PlatformSenders {
        verify_sender: config.verify_sender_email.clone(),
        invitation_sender: config.invitation_sender_email.clone(),
    }));
    let contact_client: Option<Arc<dyn ContactLookup>> = match &config.contact_profile_url {
        Some(url) => Some(Arc::new(ContactProfileClient::new(
            url.clone(),
            http_timeout,
        )?)),
        None => None,
    };

    let processor = ReceiptProcessor::new(
        pool.clone(),
        registry,
        cipher.clone(),
        sender.clone(),
        config.operator_complaint_url.clone(),
        config.max_retry_attempts,
        retry_delay,
    );

    let lookup_policy = RetryPolicy {
        max_attempts: config.max_retry_attempts,
        retry_delay,
        ..RetryPolicy::default()
    };

    tracing::info!("Starting queue consumers");

    // Run with graceful shutdown on Ctrl+C
    tokio::select! {
        result = run_inbound_loop(
            pool.clone(),
            queue.clone(),
            processor,
            contact_client,
            lookup_policy,
        ) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Inbound consumer exited with error");
                return Err(e);
            }
        }
        result = run_callback_loop(
            queue.clone(),
            sender,
            cipher,
            config.max_retry_attempts,
            retry_delay,
        ) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Callback consumer exited with error");
                return Err(e);
            }
        }
        result = run_retry_promoter(queue.clone()) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Retry promoter exited with error");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("Courier worker stopped.");
    Ok(())
}
