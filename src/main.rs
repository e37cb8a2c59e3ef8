//! cdflow - build, release and deploy services to AWS

use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, debug};
use tracing_subscriber::FmtSubscriber;

use cdflow::aws::sdk::SdkRoleAssumer;
use cdflow::component::resolve_component_name;
use cdflow::config::{load_platform_config, load_service_metadata};
use cdflow::paths::ProjectPaths;
use cdflow::shell::{CommandRunner, ProcessRunner};
use cdflow::wrapper::WrapperVars;
use cdflow::{CdflowError, Deployment, Release, ReleaseConfig, Tool, Wrapper};

#[derive(Parser)]
#[command(name = "cdflow")]
#[command(author, version, about = "Release and deploy services to AWS", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Root of the service project
    #[arg(long, env = "CDFLOW_PROJECT_DIR", default_value = ".")]
    project_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the service image, pushing it to ECR when a version is given
    Release {
        /// Version to release (omit for a local dev build)
        version: Option<String>,
        /// Component name (default: COMPONENT_NAME or the git remote)
        #[arg(short, long)]
        component_name: Option<String>,
    },
    /// Deploy a released version to an environment
    Deploy {
        environment: String,
        version: String,
        /// Component name (default: COMPONENT_NAME or the git remote)
        #[arg(short, long)]
        component_name: Option<String>,
        /// Deploy a parallel copy named <component>-<leg>
        #[arg(short, long)]
        leg: Option<String>,
    },
    /// Run terragrunt with remote state and credentials set up
    Terragrunt {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Run terraform in infra/ with remote state and credentials set up
    Terraform {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CdflowError> {
    let paths = project_paths(&cli.project_dir)?;
    let env: HashMap<String, String> = std::env::vars().collect();
    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new());

    match cli.command {
        Commands::Release {
            version,
            component_name,
        } => {
            let component =
                resolve_component_name(component_name.as_deref(), &env, runner.as_ref()).await?;
            let metadata = load_service_metadata(&paths, &component).await?;
            let platform = load_platform_config(&paths, &metadata.region).await?;
            let config = ReleaseConfig::from_platform(&platform, &metadata.region);
            let aws = Arc::new(SdkRoleAssumer::new(&metadata.region).await);

            Release::new(config, component, version, metadata, runner, aws)
                .with_paths(paths)
                .with_env(env)
                .create()
                .await?;
        }
        Commands::Deploy {
            environment,
            version,
            component_name,
            leg,
        } => {
            let component =
                resolve_component_name(component_name.as_deref(), &env, runner.as_ref()).await?;
            let metadata = load_service_metadata(&paths, &component).await?;
            let platform = load_platform_config(&paths, &metadata.region).await?;
            let aws = Arc::new(SdkRoleAssumer::new(&metadata.region).await);

            Deployment::new(environment, version, component, metadata, platform, runner, aws)
                .with_leg(leg)
                .with_paths(paths)
                .with_env(env)
                .run()
                .await?;
        }
        Commands::Terragrunt { args } => run_wrapper(Tool::Terragrunt, args, paths, runner).await?,
        Commands::Terraform { args } => run_wrapper(Tool::Terraform, args, paths, runner).await?,
    }

    Ok(())
}

async fn run_wrapper(
    tool: Tool,
    args: Vec<String>,
    paths: ProjectPaths,
    runner: Arc<dyn CommandRunner>,
) -> Result<(), CdflowError> {
    let vars = WrapperVars::parse(tool, &args)?;
    let aws = Arc::new(SdkRoleAssumer::new(&vars.aws_region).await);

    Wrapper::new(tool, args, runner, aws)
        .with_paths(paths)
        .run()
        .await
}

/// Absolute project root, so hooks resolve regardless of working directory
fn project_paths(dir: &Path) -> Result<ProjectPaths, CdflowError> {
    let root = std::fs::canonicalize(dir).map_err(|e| {
        CdflowError::user(format!("project directory {} not usable: {}", dir.display(), e))
    })?;
    debug!("Project root: {}", root.display());
    Ok(ProjectPaths::with_root(root))
}
