//! Job endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use skilllink_core::{JobFilter, JobRequest, JobStatus, NewJob, ResourceId, StatusGroup, Transition};

use crate::AppState;
use crate::error::ApiError;
use crate::session::CurrentSession;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_jobs).post(create_job))
        .route("/mine", get(my_jobs))
        .route("/{id}", get(get_job))
        .route("/{id}/accept", post(accept_job))
        .route("/{id}/start", post(start_job))
        .route("/{id}/complete", post(complete_job))
        .route("/{id}/cancel", post(cancel_job))
}

#[derive(Debug, Default, Deserialize)]
struct ListJobsQuery {
    requester: Option<ResourceId>,
    assignee: Option<ResourceId>,
    status: Option<JobStatus>,
    group: Option<StatusGroup>,
    #[serde(default)]
    unassigned_only: bool,
    visible_to: Option<ResourceId>,
    limit: Option<i64>,
}

impl ListJobsQuery {
    fn into_filter(self) -> JobFilter {
        let mut filter = JobFilter::new();
        if let Some(id) = self.requester {
            filter = filter.requester(id);
        }
        if let Some(id) = self.assignee {
            filter = filter.assignee(id);
        }
        if let Some(status) = self.status {
            filter = filter.status(status);
        }
        if let Some(group) = self.group {
            filter = filter.group(group);
        }
        if self.unassigned_only {
            filter = filter.unassigned_only();
        }
        if let Some(id) = self.visible_to {
            filter = filter.visible_to(id);
        }
        if let Some(limit) = self.limit {
            filter = filter.limit(limit);
        }
        filter
    }
}

async fn create_job(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Json(req): Json<NewJob>,
) -> Result<(StatusCode, Json<JobRequest>), ApiError> {
    let actor = session.actor()?;
    let job = state.jobs.create_job(&actor, req).await?;
    state.publish(&job);
    Ok((StatusCode::CREATED, Json(job)))
}

async fn list_jobs(
    State(state): State<AppState>,
    CurrentSession(_session): CurrentSession,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Vec<JobRequest>>, ApiError> {
    let jobs = state.jobs.list_jobs(&query.into_filter()).await?;
    Ok(Json(jobs))
}

#[derive(Debug, Deserialize)]
struct MyJobsQuery {
    group: Option<StatusGroup>,
    limit: Option<i64>,
}

/// A client's bookings, or a technician's feed.
async fn my_jobs(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Query(query): Query<MyJobsQuery>,
) -> Result<Json<Vec<JobRequest>>, ApiError> {
    let actor = session.actor()?;
    let mut filter = JobFilter::new();
    if let Some(group) = query.group {
        filter = filter.group(group);
    }
    if let Some(limit) = query.limit {
        filter = filter.limit(limit);
    }
    let jobs = state.jobs.jobs_for(&actor, filter).await?;
    Ok(Json(jobs))
}

async fn get_job(
    State(state): State<AppState>,
    CurrentSession(_session): CurrentSession,
    Path(id): Path<ResourceId>,
) -> Result<Json<JobRequest>, ApiError> {
    Ok(Json(state.jobs.get_job(id).await?))
}

async fn accept_job(
    State(state): State<AppState>,
    session: CurrentSession,
    Path(id): Path<ResourceId>,
) -> Result<Json<JobRequest>, ApiError> {
    transition(&state, session, id, Transition::Accept).await
}

async fn start_job(
    State(state): State<AppState>,
    session: CurrentSession,
    Path(id): Path<ResourceId>,
) -> Result<Json<JobRequest>, ApiError> {
    transition(&state, session, id, Transition::Start).await
}

async fn complete_job(
    State(state): State<AppState>,
    session: CurrentSession,
    Path(id): Path<ResourceId>,
) -> Result<Json<JobRequest>, ApiError> {
    transition(&state, session, id, Transition::Complete).await
}

async fn cancel_job(
    State(state): State<AppState>,
    session: CurrentSession,
    Path(id): Path<ResourceId>,
) -> Result<Json<JobRequest>, ApiError> {
    transition(&state, session, id, Transition::Cancel).await
}

async fn transition(
    state: &AppState,
    CurrentSession(session): CurrentSession,
    id: ResourceId,
    transition: Transition,
) -> Result<Json<JobRequest>, ApiError> {
    let actor = session.actor()?;
    let job = match transition {
        Transition::Accept => state.jobs.accept_job(&actor, id).await?,
        Transition::Start => state.jobs.start_job(&actor, id).await?,
        Transition::Complete => state.jobs.complete_job(&actor, id).await?,
        Transition::Cancel => state.jobs.cancel_job(&actor, id).await?,
    };
    state.publish(&job);
    Ok(Json(job))
}
