//! In-memory job repository.
//!
//! Used when no database is configured and in tests. The conditional update
//! checks and writes under one write guard, which gives the same
//! check-and-set guarantee as the PostgreSQL `UPDATE ... WHERE`.

use async_trait::async_trait;
use chrono::Utc;
use skilllink_core::{
    Error, JobFilter, JobPatch, JobRequest, JobStore, Precondition, ResourceId, Result,
    UpdateOutcome,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
pub struct MemoryJobRepo {
    jobs: RwLock<HashMap<ResourceId, JobRequest>>,
}

impl MemoryJobRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing records.
    pub fn from_jobs(jobs: impl IntoIterator<Item = JobRequest>) -> Self {
        Self {
            jobs: RwLock::new(jobs.into_iter().map(|job| (job.id, job)).collect()),
        }
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobRepo {
    async fn insert(&self, job: JobRequest) -> Result<JobRequest> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(Error::Conflict(format!("job {} already exists", job.id)));
        }
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: ResourceId) -> Result<Option<JobRequest>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn conditional_update(
        &self,
        id: ResourceId,
        expected: &Precondition,
        patch: &JobPatch,
    ) -> Result<UpdateOutcome> {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(UpdateOutcome::PreconditionFailed);
        };
        if !expected.holds(job) {
            debug!(job_id = %id, status = %job.status, "Precondition no longer holds");
            return Ok(UpdateOutcome::PreconditionFailed);
        }
        patch.apply(job, Utc::now());
        Ok(UpdateOutcome::Applied(job.clone()))
    }

    async fn query(&self, filter: &JobFilter) -> Result<Vec<JobRequest>> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<JobRequest> =
            jobs.values().filter(|job| filter.matches(job)).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        if let Some(limit) = filter.limit {
            matching.truncate(usize::try_from(limit).unwrap_or(0));
        }
        Ok(matching)
    }
}
