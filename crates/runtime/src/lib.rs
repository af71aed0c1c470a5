//! Process wiring: bus, engine workers, correlator, orchestrator.
//!
//! The [`Runtime`] is an explicit object passed to lifecycle code, never
//! a package-level singleton: `start` wires everything together and
//! `shutdown` stops the stream workers, letting in-flight awaits time
//! out or observe the closed correlator.

pub mod config;

use std::sync::Arc;

use channel::{ChannelError, InMemoryBus, MessageBus, Topic};
use inventory::{InMemoryInventoryStore, ReservationEngine, spawn_workers};
use saga::{InMemoryOrderStore, ResponseCorrelator, SagaOrchestrator};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub use config::Config;

/// Initializes tracing from the configured filter directive.
pub fn init_tracing(config: &Config) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// A running single-process deployment of the fulfillment system.
pub struct Runtime {
    orchestrator: SagaOrchestrator<InMemoryBus, InMemoryOrderStore>,
    inventory: InMemoryInventoryStore,
    order_store: InMemoryOrderStore,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Wires the bus, engine workers, correlator, and orchestrator.
    pub fn start(config: Config) -> Result<Self, ChannelError> {
        let bus = InMemoryBus::with_capacity(config.channel_capacity);
        let inventory = InMemoryInventoryStore::new();
        let order_store = InMemoryOrderStore::new();

        let (shutdown, shutdown_rx) = watch::channel(false);

        let engine = Arc::new(ReservationEngine::new(inventory.clone()));
        let mut handles = spawn_workers(engine, bus.clone(), shutdown_rx.clone())?;

        let correlator = Arc::new(ResponseCorrelator::new());
        handles.push(correlator.run(bus.subscribe(Topic::Results)?, shutdown_rx));

        let orchestrator = SagaOrchestrator::new(bus, order_store.clone(), correlator)
            .with_await_timeout(config.await_timeout);

        tracing::info!("runtime started");
        Ok(Self {
            orchestrator,
            inventory,
            order_store,
            shutdown,
            handles,
        })
    }

    /// The saga orchestrator; the HTTP layer binds to this.
    pub fn orchestrator(&self) -> &SagaOrchestrator<InMemoryBus, InMemoryOrderStore> {
        &self.orchestrator
    }

    /// The inventory store, for seeding stock.
    pub fn inventory(&self) -> &InMemoryInventoryStore {
        &self.inventory
    }

    /// The order store, for saga audit queries.
    pub fn order_store(&self) -> &InMemoryOrderStore {
        &self.order_store
    }

    /// Stops the stream workers and waits for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "worker task panicked during shutdown");
            }
        }
        tracing::info!("runtime shut down");
    }
}
