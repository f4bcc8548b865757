//! Persistence trait for job requests.
//!
//! Stores must apply [`JobStore::conditional_update`] as a single atomic
//! check-and-set over `(status, assignee)`: two racing updates with
//! overlapping preconditions can never both apply.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{JobFilter, JobRequest, JobStatus, ResourceId, Result};

/// Constraint on the assignee column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssigneeGuard {
    #[default]
    Any,
    Unassigned,
    Is(ResourceId),
}

/// What must hold on the stored record for an update to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precondition {
    pub statuses: Vec<JobStatus>,
    pub requester_id: Option<ResourceId>,
    pub assignee: AssigneeGuard,
}

impl Precondition {
    pub fn in_statuses(statuses: &[JobStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            requester_id: None,
            assignee: AssigneeGuard::Any,
        }
    }

    pub fn with_requester(mut self, requester: ResourceId) -> Self {
        self.requester_id = Some(requester);
        self
    }

    pub fn with_assignee(mut self, guard: AssigneeGuard) -> Self {
        self.assignee = guard;
        self
    }

    pub fn holds(&self, job: &JobRequest) -> bool {
        if !self.statuses.contains(&job.status) {
            return false;
        }
        if self.requester_id.is_some_and(|id| id != job.requester_id) {
            return false;
        }
        match self.assignee {
            AssigneeGuard::Any => true,
            AssigneeGuard::Unassigned => job.assignee_id.is_none(),
            AssigneeGuard::Is(id) => job.assignee_id == Some(id),
        }
    }
}

/// Fields written by a successful transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobPatch {
    pub status: JobStatus,
    /// Set only by accept; `None` leaves the stored assignee untouched.
    pub assignee_id: Option<ResourceId>,
}

impl JobPatch {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status,
            assignee_id: None,
        }
    }

    pub fn assign_to(mut self, assignee: ResourceId) -> Self {
        self.assignee_id = Some(assignee);
        self
    }

    pub fn apply(&self, job: &mut JobRequest, now: DateTime<Utc>) {
        job.status = self.status;
        if let Some(assignee) = self.assignee_id {
            job.assignee_id = Some(assignee);
        }
        job.updated_at = now;
    }
}

/// Result of a conditional update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The precondition held and the patch was written.
    Applied(JobRequest),
    /// The record was missing or no longer satisfied the precondition.
    PreconditionFailed,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: JobRequest) -> Result<JobRequest>;
    async fn get(&self, id: ResourceId) -> Result<Option<JobRequest>>;
    async fn conditional_update(
        &self,
        id: ResourceId,
        expected: &Precondition,
        patch: &JobPatch,
    ) -> Result<UpdateOutcome>;
    /// Matching jobs, newest first.
    async fn query(&self, filter: &JobFilter) -> Result<Vec<JobRequest>>;
}
