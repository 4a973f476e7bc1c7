use quill_payments::api::{self, AppState};
use quill_payments::config::AppConfig;
use quill_payments::logging::init_tracing;
use quill_payments::middleware::logging::with_request_tracing;
use quill_payments::payments::factory::{PaymentFactoryConfig, PaymentProviderFactory};
use quill_payments::payments::sdk::{shared_sdk_cache, ApprovalRegistry, HttpSdkLoader};
use quill_payments::payments::settlement::HttpSettlementBackend;
use quill_payments::payments::types::PaymentMethod;
use quill_payments::services::CheckoutRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        methods = ?config.enabled_methods,
        "Starting payment orchestration service"
    );

    let backend = Arc::new(HttpSettlementBackend::new(config.settlement.clone())?);
    let approvals = ApprovalRegistry::new();
    let sdk = shared_sdk_cache(Arc::new(HttpSdkLoader::new(
        config.wallet.clone(),
        approvals.clone(),
    )));

    let factory = PaymentProviderFactory::new(
        PaymentFactoryConfig::from_app_config(&config),
        backend,
        sdk.clone(),
    );
    if config.wallet.plan_id.is_none()
        && factory
            .list_available_methods()
            .contains(&PaymentMethod::WalletProcessor)
    {
        warn!("WALLET_PLAN_ID is not set; wallet subscriptions will be rejected");
    }

    let app = with_request_tracing(api::router(AppState {
        checkouts: Arc::new(CheckoutRegistry::new(factory)),
        approvals,
        sdk,
    }));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");

    Ok(())
}
