use std::sync::Arc;
use std::time::Duration;
use axum::Router;
use tower_http::trace::TraceLayer;
use crate::api::rate_limit::RateLimiter;
use crate::api::rest::{create_router, ApiState};
use crate::config::loader::AppConfig;
use crate::controls::Controls;
use crate::core::services::SettlementServices;
use crate::error::{Error, Result};
use crate::interfaces::notifier::Notifier;
use crate::interfaces::Collaborators;
use crate::store::memory::MemoryStore;
use crate::store::simulated_rail::SimulatedBankRail;
use crate::utils::task_supervisor::TaskSupervisor;

/// The service wired against the in-process store.
pub struct App {
    pub config: AppConfig,
    pub store: Arc<MemoryStore>,
    pub bank_rail: Arc<SimulatedBankRail>,
    pub services: Arc<SettlementServices>,
    pub state: Arc<ApiState>,
}

impl App {
    pub fn in_memory(config: AppConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        config.validate()?;
        let platform_user_id = config
            .fees
            .platform_user_id()
            .map_err(|e| Error::ConfigError(format!("fees.platform_wallet_user_id: {e}")))?;

        let store = Arc::new(MemoryStore::new());
        store.seed(platform_user_id, &config.seed)?;

        let bank_rail = Arc::new(SimulatedBankRail::new());
        let collaborators = Collaborators::from_store(store.clone(), notifier, bank_rail.clone());
        Self::with_collaborators(config, store, bank_rail, collaborators)
    }

    /// Same wiring with caller-supplied collaborators, e.g. a store wrapped
    /// to inject failures.
    pub fn with_collaborators(
        config: AppConfig,
        store: Arc<MemoryStore>,
        bank_rail: Arc<SimulatedBankRail>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let services = Arc::new(SettlementServices::new(
            collaborators,
            config.transfer.clone(),
            config.fees.clone(),
            config.workers.max_notification_attempts,
            Arc::new(Controls::new()),
        )?);
        let limiter = RateLimiter::new(config.server.rate_limit_max_requests, config.server.rate_limit_window());
        let state = Arc::new(ApiState::new(services.clone(), limiter));

        Ok(App {
            config,
            store,
            bank_rail,
            services,
            state,
        })
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone()).layer(TraceLayer::new_for_http())
    }

    /// Outbox drain, dead-letter retry and reconciliation loops.
    pub fn start_workers(&self) -> TaskSupervisor {
        let mut supervisor = TaskSupervisor::new();
        let workers = &self.config.workers;

        let services = self.services.clone();
        supervisor.spawn_periodic("outbox_drain", workers.outbox_interval(), move || {
            let services = services.clone();
            async move {
                let report = services.drain_outbox().await;
                if report.replayed > 0 || report.requeued > 0 {
                    tracing::info!(replayed = report.replayed, requeued = report.requeued, "outbox drained");
                }
            }
        });

        let services = self.services.clone();
        supervisor.spawn_periodic("dead_letter_retry", workers.dead_letter_interval(), move || {
            let services = services.clone();
            async move {
                let report = services.notifications.retry_dead_letters().await;
                if report != Default::default() {
                    tracing::info!(
                        delivered = report.delivered,
                        requeued = report.requeued,
                        abandoned = report.abandoned,
                        "dead letters retried"
                    );
                }
            }
        });

        let services = self.services.clone();
        let grace = workers.reconciliation_grace();
        supervisor.spawn_periodic("reconciliation", workers.reconciliation_interval(), move || {
            let reconciler = services.reconciler(grace);
            async move {
                if let Err(e) = reconciler.run().await {
                    tracing::error!(error = %e, "reconciliation run failed");
                }
            }
        });

        let state = self.state.clone();
        let every = state.rate_limiter.window().max(Duration::from_secs(1));
        supervisor.spawn_periodic("rate_limit_eviction", every, move || {
            let state = state.clone();
            async move {
                let evicted = state.rate_limiter.evict_expired();
                if evicted > 0 {
                    tracing::debug!(evicted, "expired rate limit windows dropped");
                }
            }
        });

        supervisor
    }
}
