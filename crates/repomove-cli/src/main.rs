//! repomove - move a repository between organizations
//!
//! The `repomove` command runs one migration step for one source project:
//!
//! - `clean`: remove the migration's working area
//! - `clone`: clone or refresh every working copy
//! - `commit`: copy content, rewrite references, create migration commits
//! - `review`: push migration commits for review
//! - `merge`: approve reviewed and verified changes
//! - `notify`: comment on open reviews of the moved project
//! - `status`: report the state of every repository branch

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, Level};

use repomove_core::telemetry::init_tracing;
use repomove_core::workflow::DEFAULT_JOBS;
use repomove_core::{
    GerritSsh, GitCli, Migration, MigrationOptions, Operation, OperationReport, ReposConfig,
};

#[derive(Parser, Debug)]
#[command(name = "repomove")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Move a repository to a new organization and fix everything that references it", long_about = None)]
struct Cli {
    /// Path to the repositories config
    #[arg(long, default_value = "./repos-config.yaml")]
    repos_config: PathBuf,

    /// Directory where working copies are placed
    #[arg(long, default_value = "./workspace")]
    workspace: PathBuf,

    /// User for ssh access to the review system
    #[arg(long, env = "REPOMOVE_USER")]
    user: Option<String>,

    /// Approve the ready subset even if some reviews lack votes
    #[arg(long)]
    force: bool,

    /// Maximum number of concurrent clones
    #[arg(short, long, default_value_t = DEFAULT_JOBS)]
    jobs: usize,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines and a JSON report
    #[arg(long)]
    json: bool,

    /// Operation to execute
    #[arg(value_enum)]
    operation: OperationArg,

    /// Source project, either `name` or `org/name`
    src: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OperationArg {
    Clean,
    Clone,
    Commit,
    Review,
    Merge,
    Notify,
    Status,
}

impl From<OperationArg> for Operation {
    fn from(arg: OperationArg) -> Self {
        match arg {
            OperationArg::Clean => Operation::Clean,
            OperationArg::Clone => Operation::Clone,
            OperationArg::Commit => Operation::Commit,
            OperationArg::Review => Operation::Review,
            OperationArg::Merge => Operation::Merge,
            OperationArg::Notify => Operation::Notify,
            OperationArg::Status => Operation::Status,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let report = execute(&cli).await?;
    print_report(&report, cli.json)
}

async fn execute(cli: &Cli) -> Result<OperationReport> {
    let operation = Operation::from(cli.operation);

    let config = ReposConfig::load(&cli.repos_config)
        .with_context(|| format!("Failed to load {}", cli.repos_config.display()))?;
    let (set, settings) = config.resolve().context("Invalid repos config")?;

    let vcs = Arc::new(GitCli::new().with_identity(settings.git_identity.clone()));
    let review = Arc::new(GerritSsh::new(settings.review.clone(), cli.user.clone()));
    let migration = Migration::new(
        set,
        settings,
        &cli.src,
        &cli.workspace,
        vcs,
        review,
        MigrationOptions {
            user: cli.user.clone(),
            force: cli.force,
            jobs: cli.jobs,
        },
    )
    .with_context(|| format!("Cannot migrate {}", cli.src))?;

    info!(
        source = %migration.moved().source,
        destination = %migration.moved().destination,
        "execute operation {operation}"
    );
    migration
        .run(operation)
        .await
        .with_context(|| format!("Operation '{operation}' failed"))
}

fn print_report(report: &OperationReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!(
        "{} {} -> {}",
        report.operation, report.source, report.destination
    );
    match report.operation {
        Operation::Clean => {}
        Operation::Clone => println!("  working copies: {}", report.working_copies),
        Operation::Commit => {
            println!("  commits:         {}", report.commits);
            println!("  files rewritten: {}", report.files_rewritten);
            println!("  warnings:        {}", report.warnings);
        }
        Operation::Review => {
            for id in &report.pushed {
                println!("  pushed    {id}");
            }
        }
        Operation::Merge => {
            for id in &report.approved {
                println!("  approved  {id}");
            }
            for id in &report.pending {
                println!("  pending   {id}");
            }
            for id in &report.abandoned {
                println!("  abandoned {id}");
            }
        }
        Operation::Notify => println!("  notified: {}", report.notified.len()),
        Operation::Status => {
            for line in &report.branches {
                let change = line
                    .change_id
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  {:<40} {:<12} {:<13} {:?} {}",
                    line.repository.to_string(),
                    line.branch,
                    line.role.as_str(),
                    line.state,
                    change
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    const CONFIG: &str = r#"
default_branches: [master]
projects:
  - { src: contrail-foo, dst_org: tungstenfabric, dst: tf-foo }
"#;

    fn write_config(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("repos-config.yaml");
        std::fs::write(&path, CONFIG).unwrap();
        path
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_defaults() {
        let cli = Cli::try_parse_from(["repomove", "commit", "contrail-foo"]).unwrap();
        assert_eq!(cli.operation, OperationArg::Commit);
        assert_eq!(cli.src, "contrail-foo");
        assert_eq!(cli.jobs, DEFAULT_JOBS);
        assert_eq!(cli.repos_config, PathBuf::from("./repos-config.yaml"));
        assert!(!cli.force);
    }

    #[test]
    fn test_parse_rejects_unknown_operation() {
        assert!(Cli::try_parse_from(["repomove", "deploy", "contrail-foo"]).is_err());
    }

    #[test]
    fn test_every_operation_maps_to_workflow() {
        for arg in OperationArg::value_variants() {
            let op = Operation::from(*arg);
            let name = arg.to_possible_value().unwrap().get_name().to_string();
            assert_eq!(op.as_str(), name);
        }
    }

    #[tokio::test]
    async fn test_execute_clean_creates_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let config = write_config(tmp.path());
        let workspace = tmp.path().join("ws");
        let cli = Cli::try_parse_from([
            "repomove",
            "--repos-config",
            config.to_str().unwrap(),
            "--workspace",
            workspace.to_str().unwrap(),
            "clean",
            "contrail-foo",
        ])
        .unwrap();
        let report = execute(&cli).await.unwrap();
        assert_eq!(report.operation, Operation::Clean);
        assert!(!workspace.join("contrail-foo").exists());
    }

    #[tokio::test]
    async fn test_execute_unknown_project_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let config = write_config(tmp.path());
        let cli = Cli::try_parse_from([
            "repomove",
            "--repos-config",
            config.to_str().unwrap(),
            "clean",
            "contrail-missing",
        ])
        .unwrap();
        let err = execute(&cli).await.unwrap_err();
        assert!(format!("{err:#}").contains("could not be found"));
    }

    #[tokio::test]
    async fn test_execute_clone_requires_user() {
        let tmp = tempfile::tempdir().unwrap();
        let config = write_config(tmp.path());
        let workspace = tmp.path().join("ws");
        let cli = Cli::try_parse_from([
            "repomove",
            "--repos-config",
            config.to_str().unwrap(),
            "--workspace",
            workspace.to_str().unwrap(),
            "clone",
            "contrail-foo",
        ])
        .unwrap();
        if cli.user.is_some() {
            // REPOMOVE_USER is set in the environment running the tests.
            return;
        }
        let err = execute(&cli).await.unwrap_err();
        assert!(format!("{err:#}").contains("user must be set"));
    }
}
