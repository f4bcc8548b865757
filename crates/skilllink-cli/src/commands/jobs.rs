//! Job commands.

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use skilllink_core::{JobRequest, JobStatus, NewJob, ResourceId, StatusGroup, Transition};

use super::ApiClient;

const JOBS_PATH: &str = "api/v1/jobs";

/// Query parameters for `GET /api/v1/jobs`.
#[derive(Debug, Default, Serialize)]
pub struct ListFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<StatusGroup>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub unassigned_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible_to: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
struct MineQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<StatusGroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<i64>,
}

pub async fn list(client: &ApiClient, filter: &ListFilter) -> Result<()> {
    let jobs: Vec<JobRequest> = client.get_with_query(JOBS_PATH, filter).await?;
    print_table(&jobs);
    Ok(())
}

pub async fn mine(
    client: &ApiClient,
    group: Option<StatusGroup>,
    limit: Option<i64>,
) -> Result<()> {
    let jobs: Vec<JobRequest> = client
        .get_with_query(&format!("{}/mine", JOBS_PATH), &MineQuery { group, limit })
        .await?;
    print_table(&jobs);
    Ok(())
}

pub async fn show(client: &ApiClient, id: ResourceId) -> Result<()> {
    let job: JobRequest = client.get(&format!("{}/{}", JOBS_PATH, id)).await?;
    print_details(&job);
    Ok(())
}

pub async fn post(client: &ApiClient, job: &NewJob) -> Result<()> {
    let job: JobRequest = client.post(JOBS_PATH, job).await?;
    println!("Posted job {}", job.id);
    print_details(&job);
    Ok(())
}

pub async fn transition(client: &ApiClient, id: ResourceId, transition: Transition) -> Result<()> {
    let path = format!("{}/{}/{}", JOBS_PATH, id, transition.as_str());
    let job: JobRequest = client.post(&path, &json!({})).await?;
    println!("Job {} is now {}", job.id, job.status);
    Ok(())
}

fn print_table(jobs: &[JobRequest]) {
    if jobs.is_empty() {
        println!("No jobs found");
        return;
    }

    println!(
        "{:<36}  {:<11}  {:<30}  {:<27}  CREATED",
        "ID", "STATUS", "TITLE", "BUDGET"
    );
    for job in jobs {
        println!(
            "{:<36}  {:<11}  {:<30}  {:<27}  {}",
            job.id,
            job.status,
            truncate(&job.title, 30),
            format_budget(job.budget_min, job.budget_max),
            job.created_at.format("%Y-%m-%d %H:%M"),
        );
    }
}

fn print_details(job: &JobRequest) {
    println!("ID:          {}", job.id);
    println!("Title:       {}", job.title);
    println!("Status:      {}", job.status);
    println!("Requester:   {}", job.requester_id);
    if let Some(assignee) = job.assignee_id {
        println!("Technician:  {}", assignee);
    }
    if let Some(preferred) = job.preferred_assignee_id {
        println!("Booked with: {}", preferred);
    }
    println!("Budget:      {}", format_budget(job.budget_min, job.budget_max));
    if let Some(location) = &job.location {
        println!("Location:    {}", location);
    }
    if let Some(description) = &job.description {
        println!();
        println!("{}", description);
        println!();
    }
    println!("Created:     {}", job.created_at.format("%Y-%m-%d %H:%M"));
    println!("Updated:     {}", job.updated_at.format("%Y-%m-%d %H:%M"));
}

fn format_budget(min: Option<f64>, max: Option<f64>) -> String {
    if min.is_none() && max.is_none() {
        return "Not set".to_string();
    }
    let side = |v: Option<f64>| v.map(format_kes).unwrap_or_else(|| "?".to_string());
    format!("{} - {}", side(min), side(max))
}

/// Format an amount in Kenyan shillings, e.g. `KES 1,500.00`.
fn format_kes(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let digits = (cents / 100).to_string();
    let mut whole = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            whole.push(',');
        }
        whole.push(c);
    }
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{}KES {}.{:02}", sign, whole, cents % 100)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
