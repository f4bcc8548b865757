//! Skilllink CLI tool.

use clap::{Parser, Subcommand};
use skilllink_core::{JobStatus, NewJob, ResourceId, Role, StatusGroup, Transition};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::ApiClient;

#[derive(Parser)]
#[command(name = "skilllink")]
#[command(about = "Skilllink marketplace CLI", long_about = None)]
struct Cli {
    /// API server URL
    #[arg(long, env = "SKILLLINK_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Session token from `skilllink login`
    #[arg(long, env = "SKILLLINK_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a session for an authenticated user
    Login {
        /// Sign-in assertion issued by the auth provider
        #[arg(long)]
        assertion: Option<String>,
        /// User id to sign in as, signing the assertion with the provider key
        #[arg(long)]
        actor: Option<ResourceId>,
        /// Key shared with the auth provider (development only)
        #[arg(long, env = "SKILLLINK_PROVIDER_KEY", hide_env_values = true)]
        provider_key: Option<String>,
        /// Role, if already chosen
        #[arg(long)]
        role: Option<Role>,
    },
    /// Choose the session's role (client or technician)
    Role {
        role: Role,
    },
    /// Show the current session
    Whoami,
    /// End the current session
    Logout,
    /// Manage job requests
    Jobs {
        #[command(subcommand)]
        command: JobCommands,
    },
}

#[derive(Subcommand)]
enum JobCommands {
    /// List jobs matching filters
    List {
        #[arg(long)]
        requester: Option<ResourceId>,
        #[arg(long)]
        assignee: Option<ResourceId>,
        #[arg(long)]
        status: Option<JobStatus>,
        /// active, completed or cancelled
        #[arg(long)]
        group: Option<StatusGroup>,
        #[arg(long)]
        unassigned_only: bool,
        #[arg(long)]
        visible_to: Option<ResourceId>,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Your bookings (client) or job feed (technician)
    Mine {
        #[arg(long)]
        group: Option<StatusGroup>,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Show one job
    Show { id: ResourceId },
    /// Post a new job
    Post {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        budget_min: Option<f64>,
        #[arg(long)]
        budget_max: Option<f64>,
        #[arg(long)]
        location: Option<String>,
        /// Technician the job is meant for
        #[arg(long)]
        technician: Option<ResourceId>,
    },
    /// Accept an open job
    Accept { id: ResourceId },
    /// Mark an accepted job as in progress
    Start { id: ResourceId },
    /// Mark a job as completed
    Complete { id: ResourceId },
    /// Cancel an open job
    Cancel { id: ResourceId },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = ApiClient::new(&cli.api_url, cli.token)?;

    match cli.command {
        Commands::Login {
            assertion,
            actor,
            provider_key,
            role,
        } => {
            let credential =
                commands::session::Credential::from_args(assertion, actor, provider_key)?;
            commands::session::login(&client, credential, role).await?
        }
        Commands::Role { role } => commands::session::select_role(&client, role).await?,
        Commands::Whoami => commands::session::whoami(&client).await?,
        Commands::Logout => commands::session::logout(&client).await?,
        Commands::Jobs { command } => match command {
            JobCommands::List {
                requester,
                assignee,
                status,
                group,
                unassigned_only,
                visible_to,
                limit,
            } => {
                let filter = commands::jobs::ListFilter {
                    requester,
                    assignee,
                    status,
                    group,
                    unassigned_only,
                    visible_to,
                    limit,
                };
                commands::jobs::list(&client, &filter).await?;
            }
            JobCommands::Mine { group, limit } => {
                commands::jobs::mine(&client, group, limit).await?;
            }
            JobCommands::Show { id } => commands::jobs::show(&client, id).await?,
            JobCommands::Post {
                title,
                description,
                budget_min,
                budget_max,
                location,
                technician,
            } => {
                let job = NewJob {
                    title,
                    description,
                    budget_min,
                    budget_max,
                    location,
                    preferred_assignee_id: technician,
                };
                commands::jobs::post(&client, &job).await?;
            }
            JobCommands::Accept { id } => {
                commands::jobs::transition(&client, id, Transition::Accept).await?
            }
            JobCommands::Start { id } => {
                commands::jobs::transition(&client, id, Transition::Start).await?
            }
            JobCommands::Complete { id } => {
                commands::jobs::transition(&client, id, Transition::Complete).await?
            }
            JobCommands::Cancel { id } => {
                commands::jobs::transition(&client, id, Transition::Cancel).await?
            }
        },
    }

    Ok(())
}
