//! Application state.

use chrono::Duration;
use skilllink_core::{JobRequest, JobStore, ProviderKey};
use skilllink_lifecycle::JobLifecycleManager;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::session::SessionStore;
use crate::ws::JobEvent;

const EVENT_CAPACITY: usize = 256;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobLifecycleManager>,
    pub sessions: Arc<SessionStore>,
    pub events: broadcast::Sender<JobEvent>,
    /// Present when running against PostgreSQL; used by readiness checks.
    pub pool: Option<PgPool>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn JobStore>,
        session_ttl: Duration,
        provider_key: ProviderKey,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            jobs: Arc::new(JobLifecycleManager::new(store)),
            sessions: Arc::new(SessionStore::new(session_ttl, provider_key)),
            events,
            pool: None,
        }
    }

    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Tell WebSocket subscribers that a job changed so they refetch it.
    pub fn publish(&self, job: &JobRequest) {
        let event = JobEvent::JobUpdated {
            job_id: job.id,
            status: job.status,
        };
        if self.events.send(event).is_err() {
            debug!(job_id = %job.id, "No WebSocket subscribers");
        }
    }
}
