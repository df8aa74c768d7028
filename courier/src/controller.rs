use std::{
    path::PathBuf,
    sync::{Arc, LazyLock},
};

use courier_common::{
    Signal, SystemClock,
    crypto::{CredentialCipher, SecretsConfig},
    internal, logging,
};
use courier_delivery::{
    MemoryJobQueue, MemoryStore, RateLimitConfig, RateLimiter, Seed, Services, Worker,
    WorkerConfig,
};
use courier_providers::{ProviderFactory, ProviderSettings};
use courier_tracking::{TrackingConfig, TrackingInjector};
use serde::Deserialize;
use tokio::{sync::broadcast, task::JoinHandle};

#[derive(Debug, Default, Deserialize)]
pub struct Courier {
    #[serde(default)]
    worker: WorkerConfig,
    #[serde(default)]
    rate_limit: RateLimitConfig,
    #[serde(default)]
    tracking: TrackingConfig,
    #[serde(default)]
    providers: ProviderSettings,
    #[serde(default)]
    secrets: SecretsConfig,
    /// JSON file of brands, lists, campaigns and sequences to load at start
    #[serde(default)]
    seed: Option<PathBuf>,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

#[tracing::instrument(level = "trace")]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

async fn join_workers(
    handles: Vec<JoinHandle<Result<(), courier_delivery::DispatchError>>>,
) -> anyhow::Result<()> {
    for handle in handles {
        handle.await??;
    }

    Ok(())
}

impl Courier {
    fn store(&self) -> anyhow::Result<MemoryStore> {
        let Some(path) = &self.seed else {
            return Ok(MemoryStore::new());
        };

        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read seed from {}: {e}", path.display()))?;
        let seed: Seed = serde_json::from_str(&content)?;

        internal!(level = INFO, seed = %path.display(), "Loaded seed data");
        Ok(MemoryStore::from_seed(seed))
    }

    /// Wire the dispatch services together from this configuration.
    ///
    /// # Errors
    ///
    /// Fails when a secret is missing, the seed file cannot be loaded or
    /// the provider settings are invalid.
    pub fn services(self) -> anyhow::Result<(WorkerConfig, Services)> {
        let store = self.store()?;
        let secrets = self.secrets.with_env_overrides();
        if secrets.server_secret.trim().is_empty() {
            anyhow::bail!(
                "No server secret configured; set secrets.server_secret or COURIER_SERVER_SECRET"
            );
        }
        if secrets.encryption_key.trim().is_empty() {
            anyhow::bail!(
                "No encryption key configured; set secrets.encryption_key or COURIER_ENCRYPTION_KEY"
            );
        }

        let cipher = Arc::new(CredentialCipher::new(&secrets.encryption_key)?);
        let providers = ProviderFactory::new(cipher, self.providers)?;

        let services = Services {
            store: Arc::new(store),
            queue: Arc::new(MemoryJobQueue::default()),
            providers: Arc::new(providers),
            limiter: Arc::new(RateLimiter::new(self.rate_limit)),
            injector: Arc::new(TrackingInjector::new(&self.tracking, &secrets.server_secret)),
            clock: Arc::new(SystemClock),
        };

        Ok((self.worker, services))
    }

    /// Run the dispatch workers until shutdown
    ///
    /// # Errors
    ///
    /// This function will return an error if the services cannot be built
    /// or a worker stops with an error.
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let (config, services) = self.services()?;
        let workers = config.workers.max(1);
        let worker = Worker::new(config, services);

        internal!(level = INFO, workers, "Controller running");

        let handles = (0..workers)
            .map(|_| {
                let worker = worker.clone();
                let receiver = SHUTDOWN_BROADCAST.subscribe();
                tokio::spawn(async move { worker.serve(receiver).await })
            })
            .collect();

        let ret = tokio::select! {
            r = join_workers(handles) => {
                r
            }
            r = shutdown() => {
                r
            }
        };

        internal!(level = INFO, "Shutting down...");

        ret
    }
}
