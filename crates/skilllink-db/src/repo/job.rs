//! PostgreSQL job repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skilllink_core::{
    AssigneeGuard, JobFilter, JobPatch, JobRequest, JobStatus, JobStore, Precondition, ResourceId,
    UpdateOutcome,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use crate::{DbError, DbResult};

/// A job request row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobRecord {
    pub id: uuid::Uuid,
    pub requester_id: uuid::Uuid,
    pub assignee_id: Option<uuid::Uuid>,
    pub preferred_assignee_id: Option<uuid::Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub budget_min: Option<f64>,
    pub budget_max: Option<f64>,
    pub location: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<JobRecord> for JobRequest {
    type Error = DbError;

    fn try_from(record: JobRecord) -> DbResult<Self> {
        let status: JobStatus = record
            .status
            .parse()
            .map_err(|_| DbError::CorruptRecord(format!("job {} status {}", record.id, record.status)))?;

        Ok(JobRequest {
            id: record.id.into(),
            requester_id: record.requester_id.into(),
            assignee_id: record.assignee_id.map(ResourceId::from),
            preferred_assignee_id: record.preferred_assignee_id.map(ResourceId::from),
            title: record.title,
            description: record.description,
            budget_min: record.budget_min,
            budget_max: record.budget_max,
            location: record.location,
            status,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

/// PostgreSQL implementation of JobStore.
pub struct PgJobRepo {
    pool: PgPool,
}

impl PgJobRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_record(&self, job: &JobRequest) -> DbResult<JobRecord> {
        let record = sqlx::query_as::<_, JobRecord>(
            r#"
            INSERT INTO job_requests (
                id, requester_id, assignee_id, preferred_assignee_id, title, description,
                budget_min, budget_max, location, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.requester_id.as_uuid())
        .bind(job.assignee_id.map(uuid::Uuid::from))
        .bind(job.preferred_assignee_id.map(uuid::Uuid::from))
        .bind(&job.title)
        .bind(&job.description)
        .bind(job.budget_min)
        .bind(job.budget_max)
        .bind(&job.location)
        .bind(job.status.as_str())
        .bind(job.created_at)
        .bind(job.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DbError::Duplicate(format!("job {}", job.id))
            }
            other => DbError::Database(other),
        })?;
        Ok(record)
    }

    async fn fetch_one(&self, id: ResourceId) -> DbResult<Option<JobRecord>> {
        let record = sqlx::query_as::<_, JobRecord>("SELECT * FROM job_requests WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn update_where(
        &self,
        id: ResourceId,
        expected: &Precondition,
        patch: &JobPatch,
    ) -> DbResult<Option<JobRecord>> {
        let record = update_query(id, expected, patch)
            .build_query_as::<JobRecord>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn fetch_matching(&self, filter: &JobFilter) -> DbResult<Vec<JobRecord>> {
        let records = select_query(filter)
            .build_query_as::<JobRecord>()
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }
}

/// Single `UPDATE ... WHERE <guards> RETURNING *`. Postgres evaluates the
/// guards against the locked row, so no row back means they did not hold.
fn update_query(
    id: ResourceId,
    expected: &Precondition,
    patch: &JobPatch,
) -> QueryBuilder<'static, Postgres> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE job_requests SET status = ");
    qb.push_bind(patch.status.as_str());
    if let Some(assignee) = patch.assignee_id {
        qb.push(", assignee_id = ").push_bind(uuid::Uuid::from(assignee));
    }
    qb.push(", updated_at = NOW() WHERE id = ")
        .push_bind(uuid::Uuid::from(id));
    push_status_guard(&mut qb, &expected.statuses);
    if let Some(requester) = expected.requester_id {
        qb.push(" AND requester_id = ")
            .push_bind(uuid::Uuid::from(requester));
    }
    match expected.assignee {
        AssigneeGuard::Any => {}
        AssigneeGuard::Unassigned => {
            qb.push(" AND assignee_id IS NULL");
        }
        AssigneeGuard::Is(assignee) => {
            qb.push(" AND assignee_id = ")
                .push_bind(uuid::Uuid::from(assignee));
        }
    }
    qb.push(" RETURNING *");
    qb
}

fn select_query(filter: &JobFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM job_requests WHERE TRUE");
    if let Some(requester) = filter.requester_id {
        qb.push(" AND requester_id = ")
            .push_bind(uuid::Uuid::from(requester));
    }
    if let Some(assignee) = filter.assignee_id {
        qb.push(" AND assignee_id = ")
            .push_bind(uuid::Uuid::from(assignee));
    }
    if !filter.statuses.is_empty() {
        push_status_guard(&mut qb, &filter.statuses);
    }
    if filter.unassigned_only {
        qb.push(" AND assignee_id IS NULL");
    }
    if let Some(tech) = filter.visible_to {
        let tech = uuid::Uuid::from(tech);
        qb.push(
            " AND ((status = 'open' AND assignee_id IS NULL \
             AND (preferred_assignee_id IS NULL OR preferred_assignee_id = ",
        )
        .push_bind(tech)
        .push(")) OR assignee_id = ")
        .push_bind(tech)
        .push(")");
    }
    qb.push(" ORDER BY created_at DESC, id DESC");
    if let Some(limit) = filter.limit {
        qb.push(" LIMIT ").push_bind(limit);
    }
    qb
}

fn push_status_guard(qb: &mut QueryBuilder<'_, Postgres>, statuses: &[JobStatus]) {
    let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
    qb.push(" AND status = ANY(").push_bind(statuses).push(")");
}

#[async_trait]
impl JobStore for PgJobRepo {
    async fn insert(&self, job: JobRequest) -> skilllink_core::Result<JobRequest> {
        let record = self.insert_record(&job).await?;
        Ok(JobRequest::try_from(record)?)
    }

    async fn get(&self, id: ResourceId) -> skilllink_core::Result<Option<JobRequest>> {
        match self.fetch_one(id).await? {
            Some(record) => Ok(Some(JobRequest::try_from(record)?)),
            None => Ok(None),
        }
    }

    async fn conditional_update(
        &self,
        id: ResourceId,
        expected: &Precondition,
        patch: &JobPatch,
    ) -> skilllink_core::Result<UpdateOutcome> {
        match self.update_where(id, expected, patch).await? {
            Some(record) => Ok(UpdateOutcome::Applied(JobRequest::try_from(record)?)),
            None => {
                debug!(job_id = %id, status = %patch.status, "Conditional update matched no row");
                Ok(UpdateOutcome::PreconditionFailed)
            }
        }
    }

    async fn query(&self, filter: &JobFilter) -> skilllink_core::Result<Vec<JobRequest>> {
        let records = self.fetch_matching(filter).await?;
        let jobs = records
            .into_iter()
            .map(JobRequest::try_from)
            .collect::<DbResult<Vec<_>>>()?;
        Ok(jobs)
    }
}
