mod config;
mod exit;
mod instance_cmd;
mod project_cmd;
mod serve_cmd;
mod ssh_key_cmd;
mod task_cmd;

use anyhow::Context;
use clap::{Parser, Subcommand};

use exit::CliError;
use nimbus_db::models::{Action, InstanceStatus, Priority, ADMIN};
use nimbus_db::pool;

use config::NimbusConfig;

#[derive(Parser)]
#[command(name = "nimbus", about = "Control plane for cloud compute instance provisioning")]
struct Cli {
    /// Database URL (overrides NIMBUS_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Tenant owner id. Defaults to the admin sentinel (0), which can read
    /// across every tenant but cannot create resources.
    #[arg(long, global = true, default_value_t = ADMIN)]
    owner_id: i64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database (if needed) and run migrations
    DbInit,
    /// Run the scheduler loop and HTTP API
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Project management
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// SSH key management
    SshKey {
        #[command(subcommand)]
        command: SshKeyCommands,
    },
    /// Task submission and inspection
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Instance inspection and create/terminate shortcuts
    Instance {
        #[command(subcommand)]
        command: InstanceCommands,
    },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// Create a project
    Create { name: String },
    /// List live projects
    List,
}

#[derive(Subcommand)]
enum SshKeyCommands {
    /// Register (or replace) an SSH key
    Add { name: String, public_key: String },
    /// List registered SSH keys
    List,
    /// Delete an SSH key
    Remove { name: String },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Submit a task
    Submit {
        project: String,
        #[arg(long, value_parser = clap::value_parser!(Action))]
        action: Action,
        #[arg(long, default_value = "normal", value_parser = clap::value_parser!(Priority))]
        priority: Priority,
        /// Task payload as a JSON string
        #[arg(long)]
        payload: String,
        #[arg(long)]
        instance_id: Option<String>,
    },
    /// List tasks in a project
    List { project: String },
    /// Show a task's status, including result and logs
    Get { task_id: String },
    /// Reset a failed task back to pending for another attempt
    Retry { task_id: String },
}

#[derive(Subcommand)]
enum InstanceCommands {
    /// List instances
    List {
        #[arg(long, value_parser = clap::value_parser!(InstanceStatus))]
        status: Option<InstanceStatus>,
        /// Invert the status filter (status != given value)
        #[arg(long)]
        not_equal: bool,
        #[arg(long)]
        include_deleted: bool,
    },
    /// Enqueue a CreateInstances task (shortcut for `task submit`)
    Create {
        project: String,
        #[arg(long, default_value = "normal", value_parser = clap::value_parser!(Priority))]
        priority: Priority,
        /// CreateInstances payload as a JSON string
        #[arg(long)]
        payload: String,
    },
    /// Enqueue a TerminateInstances task (shortcut for `task submit`)
    Terminate {
        project: String,
        #[arg(long, default_value = "normal", value_parser = clap::value_parser!(Priority))]
        priority: Priority,
        /// TerminateInstances payload as a JSON string
        #[arg(long)]
        payload: String,
    },
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::DbInit => {
            let resolved = NimbusConfig::resolve(cli.database_url.as_deref(), None, None)?;
            println!("Initializing nimbus database...");

            pool::ensure_database_exists(&resolved.db_config)
                .await
                .map_err(CliError::from_connect_error)?;
            let db_pool = pool::create_pool(&resolved.db_config)
                .await
                .map_err(CliError::from_connect_error)?;
            pool::run_migrations(&db_pool).await.context("failed to run migrations")?;

            let counts = pool::table_counts(&db_pool).await.context("failed to read table counts")?;
            println!("Database ready. Tables:");
            for (table, count) in &counts {
                println!("  {table}: {count} rows");
            }
            db_pool.close().await;
            println!("nimbus db-init complete.");
        }
        Commands::Serve { bind, port } => {
            let resolved = NimbusConfig::resolve(cli.database_url.as_deref(), bind.as_deref(), port)?;
            let db_pool = pool::create_pool(&resolved.db_config)
                .await
                .map_err(CliError::from_connect_error)?;
            let result = serve_cmd::run(db_pool.clone(), &resolved.bind, resolved.port).await;
            db_pool.close().await;
            result.context("server exited with an error")?;
        }
        Commands::Project { command } => {
            let resolved = NimbusConfig::resolve(cli.database_url.as_deref(), None, None)?;
            let db_pool = pool::create_pool(&resolved.db_config)
                .await
                .map_err(CliError::from_connect_error)?;
            let result = match command {
                ProjectCommands::Create { name } => project_cmd::create(&db_pool, cli.owner_id, &name).await,
                ProjectCommands::List => project_cmd::list(&db_pool, cli.owner_id).await,
            };
            db_pool.close().await;
            result?;
        }
        Commands::SshKey { command } => {
            let resolved = NimbusConfig::resolve(cli.database_url.as_deref(), None, None)?;
            let db_pool = pool::create_pool(&resolved.db_config)
                .await
                .map_err(CliError::from_connect_error)?;
            let result = match command {
                SshKeyCommands::Add { name, public_key } => {
                    ssh_key_cmd::add(&db_pool, cli.owner_id, &name, &public_key).await
                }
                SshKeyCommands::List => ssh_key_cmd::list(&db_pool, cli.owner_id).await,
                SshKeyCommands::Remove { name } => ssh_key_cmd::remove(&db_pool, cli.owner_id, &name).await,
            };
            db_pool.close().await;
            result?;
        }
        Commands::Task { command } => {
            let resolved = NimbusConfig::resolve(cli.database_url.as_deref(), None, None)?;
            let db_pool = pool::create_pool(&resolved.db_config)
                .await
                .map_err(CliError::from_connect_error)?;
            let result = match command {
                TaskCommands::Submit {
                    project,
                    action,
                    priority,
                    payload,
                    instance_id,
                } => {
                    let payload: serde_json::Value = serde_json::from_str(&payload)
                        .map_err(|e| CliError::Usage(format!("invalid --payload JSON: {e}")))?;
                    task_cmd::submit(
                        &db_pool,
                        cli.owner_id,
                        &project,
                        action,
                        priority,
                        payload,
                        instance_id.as_deref(),
                    )
                    .await
                }
                TaskCommands::List { project } => task_cmd::list(&db_pool, cli.owner_id, &project).await,
                TaskCommands::Get { task_id } => task_cmd::get(&db_pool, cli.owner_id, &task_id).await,
                TaskCommands::Retry { task_id } => task_cmd::retry(&db_pool, &task_id).await,
            };
            db_pool.close().await;
            result?;
        }
        Commands::Instance { command } => {
            let resolved = NimbusConfig::resolve(cli.database_url.as_deref(), None, None)?;
            let db_pool = pool::create_pool(&resolved.db_config)
                .await
                .map_err(CliError::from_connect_error)?;
            let result = match command {
                InstanceCommands::List {
                    status,
                    not_equal,
                    include_deleted,
                } => instance_cmd::list(&db_pool, cli.owner_id, status, not_equal, include_deleted).await,
                InstanceCommands::Create { project, priority, payload } => {
                    let payload = serde_json::from_str(&payload)
                        .map_err(|e| CliError::Usage(format!("invalid --payload JSON: {e}")))?;
                    instance_cmd::create(&db_pool, cli.owner_id, &project, priority, payload).await
                }
                InstanceCommands::Terminate { project, priority, payload } => {
                    let payload = serde_json::from_str(&payload)
                        .map_err(|e| CliError::Usage(format!("invalid --payload JSON: {e}")))?;
                    instance_cmd::terminate(&db_pool, cli.owner_id, &project, priority, payload).await
                }
            };
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}
