//! The job lifecycle manager.

use chrono::Utc;
use skilllink_core::{
    Actor, Error, JobFilter, JobRequest, JobStore, NewJob, ResourceId, Result, Role, Transition,
    UpdateOutcome,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owns the status state machine of job requests.
///
/// Each transition observes the job once to classify obvious rejections,
/// then submits a single conditional update that restates every guard.
/// Only that update admits a write, so a guard that held when the call was
/// submitted but no longer holds when the store applies it surfaces as
/// [`Error::Conflict`].
pub struct JobLifecycleManager {
    store: Arc<dyn JobStore>,
}

impl JobLifecycleManager {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Post a new job in status `open` with no assignee.
    pub async fn create_job(&self, actor: &Actor, new_job: NewJob) -> Result<JobRequest> {
        if actor.role != Role::Client {
            return Err(Error::Unauthorized(
                "only clients may post jobs".to_string(),
            ));
        }

        let job = new_job.into_job(actor.id, Utc::now())?;
        let job = self.store.insert(job).await?;
        info!(job_id = %job.id, requester = %actor.id, "Job posted");
        Ok(job)
    }

    pub async fn accept_job(&self, actor: &Actor, job_id: ResourceId) -> Result<JobRequest> {
        self.transition(actor, job_id, Transition::Accept).await
    }

    pub async fn start_job(&self, actor: &Actor, job_id: ResourceId) -> Result<JobRequest> {
        self.transition(actor, job_id, Transition::Start).await
    }

    pub async fn complete_job(&self, actor: &Actor, job_id: ResourceId) -> Result<JobRequest> {
        self.transition(actor, job_id, Transition::Complete).await
    }

    pub async fn cancel_job(&self, actor: &Actor, job_id: ResourceId) -> Result<JobRequest> {
        self.transition(actor, job_id, Transition::Cancel).await
    }

    pub async fn get_job(&self, job_id: ResourceId) -> Result<JobRequest> {
        self.store
            .get(job_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))
    }

    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<JobRequest>> {
        if filter.limit.is_some_and(|limit| limit <= 0) {
            return Err(Error::InvalidInput("limit must be positive".to_string()));
        }
        self.store.query(filter).await
    }

    /// The default listing for an actor: a client's own bookings, or a
    /// technician's feed of available and assigned jobs.
    pub async fn jobs_for(&self, actor: &Actor, filter: JobFilter) -> Result<Vec<JobRequest>> {
        let filter = match actor.role {
            Role::Client => filter.requester(actor.id),
            Role::Technician => filter.visible_to(actor.id),
        };
        self.list_jobs(&filter).await
    }

    /// The read only chooses which error a rejected call reports. Whether the
    /// write happens is decided by the conditional update alone.
    async fn transition(
        &self,
        actor: &Actor,
        job_id: ResourceId,
        transition: Transition,
    ) -> Result<JobRequest> {
        let observed = self.get_job(job_id).await?;
        if let Err(e) = transition.check(actor, &observed) {
            debug!(
                job_id = %job_id,
                actor_id = %actor.id,
                transition = %transition,
                status = %observed.status,
                error = %e,
                "Transition rejected"
            );
            return Err(e);
        }

        let precondition = transition.precondition(actor);
        let patch = transition.patch(actor);
        match self
            .store
            .conditional_update(job_id, &precondition, &patch)
            .await?
        {
            UpdateOutcome::Applied(job) => {
                info!(
                    job_id = %job.id,
                    actor_id = %actor.id,
                    transition = %transition,
                    status = %job.status,
                    "Job transitioned"
                );
                Ok(job)
            }
            UpdateOutcome::PreconditionFailed => {
                warn!(
                    job_id = %job_id,
                    actor_id = %actor.id,
                    transition = %transition,
                    "Lost race for job"
                );
                Err(Error::Conflict(format!(
                    "job {} changed before it could be {}",
                    job_id,
                    past_tense(transition)
                )))
            }
        }
    }
}

fn past_tense(transition: Transition) -> &'static str {
    match transition {
        Transition::Accept => "accepted",
        Transition::Start => "started",
        Transition::Complete => "completed",
        Transition::Cancel => "cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use skilllink_core::{JobPatch, JobStatus, Precondition, StatusGroup};
    use skilllink_db::MemoryJobRepo;
    use tokio::sync::Barrier;

    /// Holds every conditional update until `racers` of them have arrived,
    /// so all racers observe the job before any of them applies.
    struct GatedStore {
        inner: MemoryJobRepo,
        gate: Barrier,
    }

    impl GatedStore {
        fn new(racers: usize) -> Self {
            Self {
                inner: MemoryJobRepo::new(),
                gate: Barrier::new(racers),
            }
        }
    }

    #[async_trait]
    impl JobStore for GatedStore {
        async fn insert(&self, job: JobRequest) -> Result<JobRequest> {
            self.inner.insert(job).await
        }

        async fn get(&self, id: ResourceId) -> Result<Option<JobRequest>> {
            self.inner.get(id).await
        }

        async fn conditional_update(
            &self,
            id: ResourceId,
            expected: &Precondition,
            patch: &JobPatch,
        ) -> Result<UpdateOutcome> {
            self.gate.wait().await;
            self.inner.conditional_update(id, expected, patch).await
        }

        async fn query(&self, filter: &JobFilter) -> Result<Vec<JobRequest>> {
            self.inner.query(filter).await
        }
    }

    fn manager() -> JobLifecycleManager {
        JobLifecycleManager::new(Arc::new(MemoryJobRepo::new()))
    }

    fn client() -> Actor {
        Actor::client(ResourceId::new())
    }

    fn technician() -> Actor {
        Actor::technician(ResourceId::new())
    }

    async fn post(manager: &JobLifecycleManager, requester: &Actor) -> JobRequest {
        manager
            .create_job(requester, NewJob::new("Fix kitchen sink"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_job_starts_open() {
        let manager = manager();
        let requester = client();
        let job = post(&manager, &requester).await;

        assert_eq!(job.status, JobStatus::Open);
        assert_eq!(job.requester_id, requester.id);
        assert!(job.assignee_id.is_none());
        assert_eq!(manager.get_job(job.id).await.unwrap(), job);
    }

    #[tokio::test]
    async fn test_technician_cannot_post() {
        let manager = manager();
        let err = manager
            .create_job(&technician(), NewJob::new("Anything"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let manager = manager();
        let err = manager
            .accept_job(&technician(), ResourceId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_full_happy_path() {
        let manager = manager();
        let requester = client();
        let tech = technician();
        let job = post(&manager, &requester).await;

        let job = manager.accept_job(&tech, job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Accepted);
        assert_eq!(job.assignee_id, Some(tech.id));

        let job = manager.start_job(&tech, job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::InProgress);

        let job = manager.complete_job(&tech, job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.assignee_id, Some(tech.id));
        assert!(job.is_consistent());
    }

    #[tokio::test]
    async fn test_complete_straight_from_accepted() {
        let manager = manager();
        let tech = technician();
        let job = post(&manager, &client()).await;
        manager.accept_job(&tech, job.id).await.unwrap();

        let job = manager.complete_job(&tech, job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_concurrent_accepts_have_one_winner() {
        let store = Arc::new(GatedStore::new(2));
        let manager = JobLifecycleManager::new(store);
        let job = post(&manager, &client()).await;
        let (t1, t2) = (technician(), technician());

        let (r1, r2) = tokio::join!(manager.accept_job(&t1, job.id), manager.accept_job(&t2, job.id));

        let (winner, loser, loser_result) = match (r1.is_ok(), r2.is_ok()) {
            (true, false) => (t1, t2, r2),
            (false, true) => (t2, t1, r1),
            _ => panic!("expected exactly one winner, got {:?} and {:?}", r1, r2),
        };
        assert!(matches!(loser_result, Err(Error::Conflict(_))));

        let stored = manager.get_job(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Accepted);
        assert_eq!(stored.assignee_id, Some(winner.id));

        // A retry after the race sees the committed state.
        let retry = JobLifecycleManager::new(Arc::new(MemoryJobRepo::from_jobs(vec![stored])));
        let err = retry.accept_job(&loser, job.id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_technicians_race_for_one_job() {
        const RACERS: usize = 8;
        let store = Arc::new(GatedStore::new(RACERS));
        let manager = Arc::new(JobLifecycleManager::new(store));
        let job_id = post(&manager, &client()).await.id;

        let handles: Vec<_> = (0..RACERS)
            .map(|_| {
                let manager = manager.clone();
                let tech = technician();
                tokio::spawn(async move { (tech, manager.accept_job(&tech, job_id).await) })
            })
            .collect();
        let results = futures::future::join_all(handles).await;

        let mut winners = Vec::new();
        for result in results {
            let (tech, outcome) = result.unwrap();
            match outcome {
                Ok(_) => winners.push(tech.id),
                Err(Error::Conflict(_)) => {}
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(winners.len(), 1);

        let stored = manager.get_job(job_id).await.unwrap();
        assert_eq!(stored.assignee_id, Some(winners[0]));
    }

    #[tokio::test]
    async fn test_cancel_while_technician_accepts() {
        let store = Arc::new(GatedStore::new(2));
        let manager = JobLifecycleManager::new(store);
        let requester = client();
        let tech = technician();
        let job = post(&manager, &requester).await;

        let (cancel, accept) = tokio::join!(
            manager.cancel_job(&requester, job.id),
            manager.accept_job(&tech, job.id)
        );

        let stored = manager.get_job(job.id).await.unwrap();
        match (cancel, accept) {
            (Ok(_), Err(Error::Conflict(_))) => {
                assert_eq!(stored.status, JobStatus::Cancelled);
                assert!(stored.assignee_id.is_none());
            }
            (Err(Error::Conflict(_)), Ok(_)) => {
                assert_eq!(stored.status, JobStatus::Accepted);
                assert_eq!(stored.assignee_id, Some(tech.id));
            }
            other => panic!("expected one winner and one conflict, got {:?}", other),
        }
        assert!(stored.is_consistent());
    }

    #[tokio::test]
    async fn test_sequential_accept_scenario() {
        let manager = manager();
        let job = post(&manager, &client()).await;
        let (t1, t2) = (technician(), technician());

        let accepted = manager.accept_job(&t2, job.id).await.unwrap();
        assert_eq!(accepted.assignee_id, Some(t2.id));

        let err = manager.accept_job(&t1, job.id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_cancelled_job_cannot_be_accepted() {
        let manager = manager();
        let requester = client();
        let job = post(&manager, &requester).await;

        let cancelled = manager.cancel_job(&requester, job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);

        let err = manager.accept_job(&technician(), job.id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_cancel_after_accept_is_rejected() {
        let manager = manager();
        let requester = client();
        let job = post(&manager, &requester).await;
        manager.accept_job(&technician(), job.id).await.unwrap();

        let err = manager.cancel_job(&requester, job.id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_cancel_by_non_requester_is_unauthorized() {
        let manager = manager();
        let requester = client();
        let tech = technician();
        let job = post(&manager, &requester).await;

        let err = manager.cancel_job(&client(), job.id).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        manager.accept_job(&tech, job.id).await.unwrap();
        let err = manager.cancel_job(&tech, job.id).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_complete_by_requester_is_unauthorized() {
        let manager = manager();
        let requester = client();
        let job = post(&manager, &requester).await;
        manager.accept_job(&technician(), job.id).await.unwrap();

        let err = manager.complete_job(&requester, job.id).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_terminal_job_rejects_further_transitions() {
        let manager = manager();
        let requester = client();
        let tech = technician();
        let job = post(&manager, &requester).await;
        manager.accept_job(&tech, job.id).await.unwrap();
        manager.complete_job(&tech, job.id).await.unwrap();

        let attempts = [
            manager.accept_job(&technician(), job.id).await,
            manager.start_job(&tech, job.id).await,
            manager.complete_job(&tech, job.id).await,
            manager.cancel_job(&requester, job.id).await,
        ];
        for attempt in attempts {
            assert!(matches!(attempt, Err(Error::InvalidTransition(_))));
        }

        let stored = manager.get_job(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_preferred_assignee_does_not_restrict_accept() {
        let manager = manager();
        let preferred = technician();
        let other = technician();
        let form = NewJob {
            preferred_assignee_id: Some(preferred.id),
            ..NewJob::new("Install ceiling fan")
        };
        let job = manager.create_job(&client(), form).await.unwrap();

        let job = manager.accept_job(&other, job.id).await.unwrap();
        assert_eq!(job.assignee_id, Some(other.id));
    }

    #[tokio::test]
    async fn test_jobs_for_client_and_technician() {
        let manager = manager();
        let alice = client();
        let bob = client();
        let tech = technician();

        let a1 = post(&manager, &alice).await;
        let a2 = post(&manager, &alice).await;
        let b1 = post(&manager, &bob).await;
        manager.accept_job(&tech, a1.id).await.unwrap();
        manager.cancel_job(&alice, a2.id).await.unwrap();

        let alice_jobs = manager.jobs_for(&alice, JobFilter::new()).await.unwrap();
        assert_eq!(alice_jobs.len(), 2);

        let active = manager
            .jobs_for(&alice, JobFilter::new().group(StatusGroup::Active))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, a1.id);

        let feed = manager.jobs_for(&tech, JobFilter::new()).await.unwrap();
        let ids: Vec<_> = feed.iter().map(|j| j.id).collect();
        assert!(ids.contains(&a1.id));
        assert!(ids.contains(&b1.id));
        assert!(!ids.contains(&a2.id));
    }

    #[tokio::test]
    async fn test_list_rejects_non_positive_limit() {
        let manager = manager();
        let err = manager
            .list_jobs(&JobFilter::new().limit(0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
