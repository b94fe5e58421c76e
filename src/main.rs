use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use questline::config::{AdvisorArgs, StoreArgs};
use questline::models::CreateProjectInput;
use questline::{advisor, mcp};

#[derive(Parser)]
#[command(name = "qline")]
#[command(about = "Quest-style task tracking for AI-assisted development", version)]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    advisor: AdvisorArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server via stdio (default)
    Mcp,
    /// Print the task most worth doing next
    Next {
        /// Limit to one project (id, slug or path)
        #[arg(short, long)]
        project: Option<String>,
    },
    /// Print the pulse of one project
    Pulse {
        /// Project id, slug or path
        project: String,
    },
    /// Register a project, updating it if the path is already known
    Register {
        #[arg(long)]
        name: String,

        #[arg(long)]
        path: String,

        #[arg(long)]
        slug: Option<String>,

        #[arg(long = "tag")]
        tags: Vec<String>,
    },
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries protocol frames, so logs go to stderr.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "questline=info,questline_core=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let db = cli.store.open()?;
    let advisor_config = cli.advisor.into_config();

    match cli.command.unwrap_or(Commands::Mcp) {
        Commands::Mcp => {
            mcp::run_stdio_server(db, advisor_config).await?;
        }
        Commands::Next { project } => {
            let project_id = match project {
                Some(key) => Some(db.resolve_project(&key)?.id),
                None => None,
            };
            let recommendation = db.next_task_recommendation(project_id)?;
            let context = advisor::build_context(&db, project_id, recommendation.clone())?;
            let bridge = advisor::from_config(&advisor_config);
            let advice = advisor::advise(bridge.as_ref(), &context, advisor_config.timeout).await;
            print_json(&json!({ "recommendation": recommendation, "advice": advice }))?;
        }
        Commands::Pulse { project } => {
            let project = db.resolve_project(&project)?;
            print_json(&db.project_pulse(project.id)?)?;
        }
        Commands::Register {
            name,
            path,
            slug,
            tags,
        } => {
            let project = db.register_project(CreateProjectInput {
                slug,
                name,
                path,
                status: None,
                tags,
            })?;
            tracing::info!("Registered {} at {}", project.slug, project.path);
            print_json(&project)?;
        }
    }

    Ok(())
}
