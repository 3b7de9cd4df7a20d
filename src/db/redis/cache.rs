use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::error::AppResult;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Current temperature at a "lat,lon" location
    Temperature(String),
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Temperature(location) => write!(f, "temp:{}", location),
        }
    }
}

/// Creates a Redis client for caching
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Message for asynchronous cache writes
struct CacheWriteMessage {
    key: String,
    value: String,
    ttl: u64,
}

/// Cache handler for storing and retrieving data from Redis
#[derive(Clone)]
pub struct Cache {
    redis_client: Client,
    write_tx: mpsc::UnboundedSender<CacheWriteMessage>,
}

/// Handle for gracefully shutting down the cache writer
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl CacheWriterHandle {
    /// Signals the writer task to flush pending writes and stop
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Cache writer shutdown signal sent");
    }
}

impl Cache {
    /// Creates a cache and spawns its background writer
    ///
    /// Writes go through a channel so a slow Redis never delays a
    /// recommendation response.
    pub async fn new(redis_client: Client) -> (Self, CacheWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let client = redis_client.clone();
        tokio::spawn(async move {
            Self::cache_writer_task(client, write_rx, shutdown_rx).await;
        });

        let cache = Self {
            redis_client,
            write_tx,
        };

        (cache, CacheWriterHandle { shutdown_tx })
    }

    async fn cache_writer_task(
        client: Client,
        mut write_rx: mpsc::UnboundedReceiver<CacheWriteMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Cache writer task started");

        loop {
            tokio::select! {
                Some(msg) = write_rx.recv() => {
                    if let Err(e) = Self::write_to_redis(&client, msg).await {
                        tracing::error!(error = %e, "Failed to write to Redis cache");
                    }
                }
                _ = shutdown_rx.recv() => {
                    // Drain what is already queued without waiting for new senders
                    let mut flushed = 0;
                    while let Ok(msg) = write_rx.try_recv() {
                        if let Err(e) = Self::write_to_redis(&client, msg).await {
                            tracing::error!(error = %e, "Failed to flush cache write during shutdown");
                        } else {
                            flushed += 1;
                        }
                    }

                    tracing::info!(flushed, "Cache writer task stopped");
                    break;
                }
            }
        }
    }

    async fn write_to_redis(client: &Client, msg: CacheWriteMessage) -> AppResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(msg.key, msg.value, msg.ttl).await?;
        Ok(())
    }

    /// Cached value for `key`, `None` on a miss
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let cached: Option<String> = conn.get(key.to_string()).await?;

        match cached {
            Some(json) => {
                let data = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Cache deserialization error: {}", e))
                })?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    /// Queues a write for the background task and returns immediately
    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) {
        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Cache serialization error");
                return;
            }
        };

        let msg = CacheWriteMessage {
            key: key.to_string(),
            value: json,
            ttl,
        };

        if let Err(e) = self.write_tx.send(msg) {
            tracing::error!(error = %e, "Failed to send cache write message");
        }
    }
}
