//! Job requests and the status state machine.
//!
//! ```text
//! open -------accept(technician)------> accepted
//! open -------cancel(requester)-------> cancelled
//! accepted ----start(assignee)--------> in_progress
//! accepted ----complete(assignee)-----> completed
//! in_progress --complete(assignee)----> completed
//! ```
//!
//! `completed` and `cancelled` are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::store::{AssigneeGuard, JobPatch, Precondition};
use crate::{Actor, Error, ResourceId, Result, Role};

/// Status of a job request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Open,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Open,
        JobStatus::Accepted,
        JobStatus::InProgress,
        JobStatus::Completed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Open => "open",
            JobStatus::Accepted => "accepted",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }

    /// Whether a job in this status must carry an assignee.
    pub fn requires_assignee(&self) -> bool {
        matches!(
            self,
            JobStatus::Accepted | JobStatus::InProgress | JobStatus::Completed
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown job status: {}", s)))
    }
}

/// Status buckets shown to clients on their bookings list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusGroup {
    /// Not yet finished: open, accepted or in progress.
    Active,
    Completed,
    Cancelled,
}

impl StatusGroup {
    pub fn statuses(&self) -> &'static [JobStatus] {
        match self {
            StatusGroup::Active => &[JobStatus::Open, JobStatus::Accepted, JobStatus::InProgress],
            StatusGroup::Completed => &[JobStatus::Completed],
            StatusGroup::Cancelled => &[JobStatus::Cancelled],
        }
    }
}

impl FromStr for StatusGroup {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(StatusGroup::Active),
            "completed" => Ok(StatusGroup::Completed),
            "cancelled" => Ok(StatusGroup::Cancelled),
            other => Err(Error::InvalidInput(format!("unknown status group: {}", other))),
        }
    }
}

/// A unit of work posted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub id: ResourceId,
    /// Client who posted the job. Never changes.
    pub requester_id: ResourceId,
    /// Technician who accepted the job. Set exactly once, on accept.
    pub assignee_id: Option<ResourceId>,
    /// Technician the client booked through, if any. Informational only:
    /// it does not restrict who may accept.
    pub preferred_assignee_id: Option<ResourceId>,
    pub title: String,
    pub description: Option<String>,
    pub budget_min: Option<f64>,
    pub budget_max: Option<f64>,
    pub location: Option<String>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRequest {
    pub fn is_assigned_to(&self, actor_id: ResourceId) -> bool {
        self.assignee_id == Some(actor_id)
    }

    /// `assignee` is present exactly when the status requires one.
    pub fn is_consistent(&self) -> bool {
        self.assignee_id.is_some() == self.status.requires_assignee()
    }
}

/// Fields supplied by a client when posting a job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewJob {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub budget_min: Option<f64>,
    #[serde(default)]
    pub budget_max: Option<f64>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub preferred_assignee_id: Option<ResourceId>,
}

impl NewJob {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Validate the form and build an `open`, unassigned job owned by `requester`.
    pub fn into_job(self, requester: ResourceId, now: DateTime<Utc>) -> Result<JobRequest> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(Error::InvalidInput("title is required".to_string()));
        }

        for (field, value) in [("budget_min", self.budget_min), ("budget_max", self.budget_max)] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(Error::InvalidInput(format!(
                        "{} must be a non-negative amount",
                        field
                    )));
                }
            }
        }
        if let (Some(min), Some(max)) = (self.budget_min, self.budget_max) {
            if min > max {
                return Err(Error::InvalidInput(
                    "budget_min must not exceed budget_max".to_string(),
                ));
            }
        }

        Ok(JobRequest {
            id: ResourceId::new(),
            requester_id: requester,
            assignee_id: None,
            preferred_assignee_id: self.preferred_assignee_id,
            title: title.to_string(),
            description: non_blank(self.description),
            budget_min: self.budget_min,
            budget_max: self.budget_max,
            location: non_blank(self.location),
            status: JobStatus::Open,
            created_at: now,
            updated_at: now,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// A state-machine edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Accept,
    Start,
    Complete,
    Cancel,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Accept => "accept",
            Transition::Start => "start",
            Transition::Complete => "complete",
            Transition::Cancel => "cancel",
        }
    }

    /// Statuses this edge may leave from.
    pub fn sources(&self) -> &'static [JobStatus] {
        match self {
            Transition::Accept | Transition::Cancel => &[JobStatus::Open],
            Transition::Start => &[JobStatus::Accepted],
            Transition::Complete => &[JobStatus::Accepted, JobStatus::InProgress],
        }
    }

    pub fn target(&self) -> JobStatus {
        match self {
            Transition::Accept => JobStatus::Accepted,
            Transition::Start => JobStatus::InProgress,
            Transition::Complete => JobStatus::Completed,
            Transition::Cancel => JobStatus::Cancelled,
        }
    }

    /// Decide whether `actor` may take this edge on `job` as currently observed.
    ///
    /// Terminal jobs reject every edge with `InvalidTransition`, except that a
    /// cancel by anyone other than the requester is always `Unauthorized`.
    pub fn check(&self, actor: &Actor, job: &JobRequest) -> Result<()> {
        match self {
            Transition::Cancel => {
                if actor.id != job.requester_id {
                    return Err(Error::Unauthorized(format!(
                        "only the requester may cancel job {}",
                        job.id
                    )));
                }
            }
            Transition::Accept => {
                if job.status.is_terminal() {
                    return Err(self.invalid(job));
                }
                if actor.role != Role::Technician {
                    return Err(Error::Unauthorized(format!(
                        "only technicians may accept job {}",
                        job.id
                    )));
                }
                if job.assignee_id.is_some() {
                    return Err(self.invalid(job));
                }
            }
            Transition::Start | Transition::Complete => {
                if job.status.is_terminal() {
                    return Err(self.invalid(job));
                }
                if !job.is_assigned_to(actor.id) {
                    return Err(Error::Unauthorized(format!(
                        "only the assigned technician may {} job {}",
                        self.as_str(),
                        job.id
                    )));
                }
            }
        }

        if !self.sources().contains(&job.status) {
            return Err(self.invalid(job));
        }
        Ok(())
    }

    /// Every guard of [`check`](Self::check), restated for the atomic update.
    pub fn precondition(&self, actor: &Actor) -> Precondition {
        let base = Precondition::in_statuses(self.sources());
        match self {
            Transition::Accept => base.with_assignee(AssigneeGuard::Unassigned),
            Transition::Cancel => base.with_requester(actor.id),
            Transition::Start | Transition::Complete => {
                base.with_assignee(AssigneeGuard::Is(actor.id))
            }
        }
    }

    pub fn patch(&self, actor: &Actor) -> JobPatch {
        match self {
            Transition::Accept => JobPatch::status(self.target()).assign_to(actor.id),
            _ => JobPatch::status(self.target()),
        }
    }

    fn invalid(&self, job: &JobRequest) -> Error {
        Error::InvalidTransition(format!(
            "cannot {} job {} in status {}",
            self.as_str(),
            job.id,
            job.status
        ))
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed description of a job listing query.
///
/// All set fields must match. Stores translate this into whatever query
/// mechanism they have.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobFilter {
    pub requester_id: Option<ResourceId>,
    pub assignee_id: Option<ResourceId>,
    /// Allowed statuses; empty means any.
    #[serde(default)]
    pub statuses: Vec<JobStatus>,
    #[serde(default)]
    pub unassigned_only: bool,
    /// Technician feed: open unassigned jobs not aimed at another
    /// technician, plus jobs assigned to this technician.
    pub visible_to: Option<ResourceId>,
    pub limit: Option<i64>,
}

impl JobFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requester(mut self, id: ResourceId) -> Self {
        self.requester_id = Some(id);
        self
    }

    pub fn assignee(mut self, id: ResourceId) -> Self {
        self.assignee_id = Some(id);
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        if !self.statuses.contains(&status) {
            self.statuses.push(status);
        }
        self
    }

    pub fn group(mut self, group: StatusGroup) -> Self {
        for status in group.statuses() {
            self = self.status(*status);
        }
        self
    }

    pub fn unassigned_only(mut self) -> Self {
        self.unassigned_only = true;
        self
    }

    pub fn visible_to(mut self, technician: ResourceId) -> Self {
        self.visible_to = Some(technician);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// In-process evaluation, used by stores without a query language.
    pub fn matches(&self, job: &JobRequest) -> bool {
        if self.requester_id.is_some_and(|id| job.requester_id != id) {
            return false;
        }
        if self.assignee_id.is_some() && job.assignee_id != self.assignee_id {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&job.status) {
            return false;
        }
        if self.unassigned_only && job.assignee_id.is_some() {
            return false;
        }
        if let Some(tech) = self.visible_to {
            let available = job.status == JobStatus::Open
                && job.assignee_id.is_none()
                && job.preferred_assignee_id.is_none_or(|p| p == tech);
            if !available && !job.is_assigned_to(tech) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_job(requester: ResourceId) -> JobRequest {
        NewJob::new("Fix home wiring")
            .into_job(requester, Utc::now())
            .unwrap()
    }

    fn accepted_by(requester: ResourceId, tech: ResourceId) -> JobRequest {
        let mut job = open_job(requester);
        job.status = JobStatus::Accepted;
        job.assignee_id = Some(tech);
        job
    }

    #[test]
    fn test_status_parse_and_terminal() {
        assert_eq!("in_progress".parse::<JobStatus>().unwrap(), JobStatus::InProgress);
        assert!("done".parse::<JobStatus>().is_err());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Accepted.is_terminal());
    }

    #[test]
    fn test_new_job_trims_and_drops_blank_fields() {
        let form = NewJob {
            title: "  Leaking tap  ".to_string(),
            description: Some("   ".to_string()),
            location: Some(" Westlands ".to_string()),
            ..Default::default()
        };
        let job = form.into_job(ResourceId::new(), Utc::now()).unwrap();
        assert_eq!(job.title, "Leaking tap");
        assert_eq!(job.description, None);
        assert_eq!(job.location.as_deref(), Some("Westlands"));
        assert_eq!(job.status, JobStatus::Open);
        assert!(job.assignee_id.is_none());
        assert!(job.is_consistent());
    }

    #[test]
    fn test_new_job_requires_title() {
        let err = NewJob::new("   ")
            .into_job(ResourceId::new(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_new_job_rejects_inverted_budget() {
        let form = NewJob {
            budget_min: Some(5000.0),
            budget_max: Some(1000.0),
            ..NewJob::new("Paint bedroom")
        };
        assert!(form.into_job(ResourceId::new(), Utc::now()).is_err());

        let negative = NewJob {
            budget_min: Some(-1.0),
            ..NewJob::new("Paint bedroom")
        };
        assert!(negative.into_job(ResourceId::new(), Utc::now()).is_err());
    }

    #[test]
    fn test_preferred_assignee_does_not_assign() {
        let tech = ResourceId::new();
        let form = NewJob {
            preferred_assignee_id: Some(tech),
            ..NewJob::new("Service AC unit")
        };
        let job = form.into_job(ResourceId::new(), Utc::now()).unwrap();
        assert_eq!(job.preferred_assignee_id, Some(tech));
        assert_eq!(job.assignee_id, None);
    }

    #[test]
    fn test_accept_requires_technician_and_open() {
        let job = open_job(ResourceId::new());
        let tech = Actor::technician(ResourceId::new());
        let client = Actor::client(ResourceId::new());

        assert!(Transition::Accept.check(&tech, &job).is_ok());
        assert!(matches!(
            Transition::Accept.check(&client, &job),
            Err(Error::Unauthorized(_))
        ));

        let taken = accepted_by(job.requester_id, ResourceId::new());
        assert!(matches!(
            Transition::Accept.check(&tech, &taken),
            Err(Error::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_cancel_by_stranger_is_unauthorized_in_any_status() {
        let stranger = Actor::client(ResourceId::new());
        for status in JobStatus::ALL {
            let mut job = open_job(ResourceId::new());
            job.status = status;
            assert!(matches!(
                Transition::Cancel.check(&stranger, &job),
                Err(Error::Unauthorized(_))
            ));
        }
    }

    #[test]
    fn test_cancel_after_accept_is_invalid() {
        let requester = ResourceId::new();
        let job = accepted_by(requester, ResourceId::new());
        assert!(matches!(
            Transition::Cancel.check(&Actor::client(requester), &job),
            Err(Error::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_complete_by_requester_is_unauthorized() {
        let requester = ResourceId::new();
        let job = accepted_by(requester, ResourceId::new());
        assert!(matches!(
            Transition::Complete.check(&Actor::client(requester), &job),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn test_start_only_from_accepted() {
        let tech = ResourceId::new();
        let mut job = accepted_by(ResourceId::new(), tech);
        let actor = Actor::technician(tech);
        assert!(Transition::Start.check(&actor, &job).is_ok());

        job.status = JobStatus::InProgress;
        assert!(matches!(
            Transition::Start.check(&actor, &job),
            Err(Error::InvalidTransition(_))
        ));
        assert!(Transition::Complete.check(&actor, &job).is_ok());
    }

    #[test]
    fn test_terminal_jobs_reject_every_edge() {
        let requester = ResourceId::new();
        let tech = ResourceId::new();
        let mut job = accepted_by(requester, tech);
        job.status = JobStatus::Completed;

        let attempts = [
            (Transition::Accept, Actor::technician(ResourceId::new())),
            (Transition::Start, Actor::technician(tech)),
            (Transition::Complete, Actor::technician(tech)),
            (Transition::Cancel, Actor::client(requester)),
        ];
        for (transition, actor) in attempts {
            assert!(
                matches!(transition.check(&actor, &job), Err(Error::InvalidTransition(_))),
                "{} should be rejected",
                transition
            );
        }
    }

    #[test]
    fn test_precondition_mirrors_check() {
        let tech = Actor::technician(ResourceId::new());
        let job = open_job(ResourceId::new());
        assert!(Transition::Accept.precondition(&tech).holds(&job));

        let taken = accepted_by(job.requester_id, ResourceId::new());
        assert!(!Transition::Accept.precondition(&tech).holds(&taken));
        assert!(!Transition::Complete.precondition(&tech).holds(&taken));
    }

    #[test]
    fn test_filter_groups_and_requester() {
        let requester = ResourceId::new();
        let job = open_job(requester);

        assert!(JobFilter::new().requester(requester).matches(&job));
        assert!(!JobFilter::new().requester(ResourceId::new()).matches(&job));
        assert!(JobFilter::new().group(StatusGroup::Active).matches(&job));
        assert!(!JobFilter::new().group(StatusGroup::Cancelled).matches(&job));
        assert_eq!(JobFilter::new().group(StatusGroup::Active).statuses.len(), 3);
    }

    #[test]
    fn test_filter_visible_to_technician() {
        let me = ResourceId::new();
        let other = ResourceId::new();

        let open = open_job(ResourceId::new());
        let mut aimed_at_me = open_job(ResourceId::new());
        aimed_at_me.preferred_assignee_id = Some(me);
        let mut aimed_at_other = open_job(ResourceId::new());
        aimed_at_other.preferred_assignee_id = Some(other);
        let mine = accepted_by(ResourceId::new(), me);
        let theirs = accepted_by(ResourceId::new(), other);

        let filter = JobFilter::new().visible_to(me);
        assert!(filter.matches(&open));
        assert!(filter.matches(&aimed_at_me));
        assert!(!filter.matches(&aimed_at_other));
        assert!(filter.matches(&mine));
        assert!(!filter.matches(&theirs));
    }

    #[test]
    fn test_filter_unassigned_only() {
        let job = open_job(ResourceId::new());
        let taken = accepted_by(job.requester_id, ResourceId::new());
        let filter = JobFilter::new().unassigned_only();
        assert!(filter.matches(&job));
        assert!(!filter.matches(&taken));
    }
}
