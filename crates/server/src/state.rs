use std::sync::Arc;

use pflow_core::{Config, SanitizedConfig, SubmissionCoordinator, TicketStore, WorkerPool};

/// Shared application state
pub struct AppState {
    config: Config,
    coordinator: Arc<SubmissionCoordinator>,
    ticket_store: Arc<dyn TicketStore>,
    /// Consumer loops, absent when this process only accepts submissions.
    worker_pool: Option<Arc<WorkerPool>>,
}

impl AppState {
    pub fn new(
        config: Config,
        coordinator: Arc<SubmissionCoordinator>,
        ticket_store: Arc<dyn TicketStore>,
        worker_pool: Option<Arc<WorkerPool>>,
    ) -> Self {
        Self {
            config,
            coordinator,
            ticket_store,
            worker_pool,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn coordinator(&self) -> &SubmissionCoordinator {
        self.coordinator.as_ref()
    }

    pub fn ticket_store(&self) -> &dyn TicketStore {
        self.ticket_store.as_ref()
    }

    pub fn worker_pool(&self) -> Option<&WorkerPool> {
        self.worker_pool.as_deref()
    }
}
