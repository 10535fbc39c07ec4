use crate::coin::controller::CoinController;
use crate::coin::repo::LedgerStore;
use crate::constants::{NOT_FOUND, REQUEST_TIMEOUT};
use crate::req::Method::{GET, POST};
use crate::req::Request;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot::Receiver;
use tracing::{error, info, warn};

const TRANSACTIONS_PREFIX: &str = "/coins/transactions/";

pub struct Server<S: LedgerStore> {
    controller: Arc<CoinController<S>>,
    bind_addr: String,
    connection_timeout: Duration,
}

impl<S: LedgerStore + 'static> Server<S> {
    pub fn new(controller: Arc<CoinController<S>>, bind_addr: String, connection_timeout: Duration) -> Self {
        Self {
            controller,
            bind_addr,
            connection_timeout,
        }
    }

    pub async fn start(&self, mut shutdown_rx: Receiver<()>) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.bind_addr)
            .await
            .with_context(|| format!("failed to bind {}", self.bind_addr))?;
        info!("Server running on http://{}", self.bind_addr);

        loop {
            tokio::select! {
                conn = listener.accept() => {
                    let (mut stream, peer) = match conn {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("unable to accept: {}", e);
                            continue;
                        }
                    };

                    let controller = Arc::clone(&self.controller);
                    let connection_timeout = self.connection_timeout;

                    tokio::spawn(async move {
                        let (reader, mut writer) = stream.split();
                        let served = tokio::time::timeout(
                            connection_timeout,
                            Self::handle_client(reader, &mut writer, &controller),
                        )
                        .await;
                        match served {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => error!("Connection error from {}: {:#}", peer, e),
                            Err(_) => {
                                warn!("Request from {} timed out", peer);
                                let _ = writer.write_all(REQUEST_TIMEOUT.as_bytes()).await;
                            }
                        }
                    });
                }
                // Shutdown signal check
                _ = &mut shutdown_rx => {
                    info!("Shutting down server...");
                    break;
                }
            }
        }
        Ok(())
    }

    pub async fn handle_client<Reader, Writer>(
        reader: Reader,
        mut writer: Writer,
        controller: &CoinController<S>,
    ) -> Result<()>
    where
        Reader: AsyncRead + Unpin,
        Writer: AsyncWrite + Unpin,
    {
        let request = Request::read_from(reader)
            .await
            .context("Failed to read request")?;

        let (status_line, content) = Self::route(&request, controller).await;

        writer
            .write_all(format!("{}{}", status_line, content).as_bytes())
            .await
            .context("Failed to write")
    }

    pub async fn route(request: &Request, controller: &CoinController<S>) -> (String, String) {
        match (&request.method, request.path.as_str()) {
            (POST, "/coins/charge") => controller.charge(request).await,
            (POST, "/coins/spend") => controller.spend(request).await,
            (GET, "/coins/balance") => controller.balance(request).await,
            (GET, "/coins/transactions") => controller.transactions(request).await,
            (GET, path) if path.starts_with(TRANSACTIONS_PREFIX) => {
                controller
                    .transaction(request, &path[TRANSACTIONS_PREFIX.len()..])
                    .await
            }
            _ => (NOT_FOUND.to_string(), "404 Not Found".to_string()),
        }
    }
}
