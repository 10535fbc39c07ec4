use std::sync::Arc;

use anyhow::Context;
use coin_ledger::{
    auth::jwt::get_public_key,
    coin::{
        controller::CoinController,
        coordinator::{LedgerCoordinator, RetryPolicy},
        repository::LedgerRepository,
        service::CoinService,
    },
    config::Config,
    db::Database,
    server::Server,
    telemetry,
};
use tokio::sync::oneshot;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let config = Config::from_env().context("Failed to load configuration")?;
    let public_key = get_public_key(&config.jwt_public_key).context("Failed to load JWT_PUBLIC_KEY")?;
    let database = Database::connect(&config)
        .await
        .context("Failed to create DB pool")?;

    let store = Arc::new(LedgerRepository::new(database.pool.clone()));
    let coordinator = LedgerCoordinator::new(Arc::clone(&store), RetryPolicy::from(&config));
    let service = CoinService::new(store, coordinator);
    let controller = Arc::new(CoinController::new(service, public_key));
    let server = Server::new(controller, config.bind_addr.clone(), config.connection_timeout());

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let mut serving = tokio::spawn(async move { server.start(shutdown_rx).await });

    let joined = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutdown requested");
            let _ = shutdown_tx.send(());
            (&mut serving).await
        }
        joined = &mut serving => joined,
    };

    match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Server stopped with error: {:#}", e),
        Err(e) => error!("Server task panicked: {}", e),
    }

    database.close().await;
    Ok(())
}
