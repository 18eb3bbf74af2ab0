use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use reconflow::api::{ActivitiesResponse, ApiServer};
use reconflow::app::{handle_fatal_error, init_logging, AppConfig, Runtime};
use reconflow::config::SchedulerConfig;
use reconflow::options::OptionSet;
use reconflow::poller::ActivitySource;
use reconflow::workflow::{get_workspace_routine, RunSettings};

/// Run reconnaissance workflows as tracked, chunked shell commands
#[derive(Parser)]
#[command(name = "reconflow", version)]
#[command(about = "Chunked command scheduler for reconnaissance pipelines", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Command catalog to use instead of the configured one
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the execute and activities endpoints
    Serve {
        /// Address to listen on (default from config)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run a workflow against a target
    Run {
        /// Domain, URL or IP to scan
        target: String,

        /// Workflow name from the catalog
        #[arg(short = 'w', long, default_value = "general")]
        workflow: String,

        /// Module profile (speed)
        #[arg(short = 'p', long, default_value = "quick")]
        profile: String,

        /// Workspace name (derived from the target by default)
        #[arg(long)]
        workspace: Option<String>,

        /// Remote executor URL
        #[arg(long)]
        remote: Option<String>,

        /// Re-run commands even when their output exists
        #[arg(short = 'f', long)]
        force: bool,

        /// Polls before forcing a module complete (0 waits forever)
        #[arg(long)]
        max_retries: Option<u32>,

        /// Seconds between polls
        #[arg(long)]
        poll_delay: Option<u64>,

        /// Do not echo command output
        #[arg(long)]
        nolog: bool,

        /// Extra option as KEY=VALUE, repeatable
        #[arg(short = 'O', long = "option", value_parser = parse_option)]
        options: Vec<(String, String)>,
    },
    /// Print the resolved commands of a workspace for a profile
    Routine {
        /// Workspace name
        workspace: String,

        #[arg(short = 'p', long, default_value = "quick")]
        profile: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Inspect or change a module's activities
    Activities {
        #[command(subcommand)]
        command: ActivitiesCommands,
    },
}

#[derive(Subcommand)]
enum ActivitiesCommands {
    /// Show the activities of a module
    Show(ActivityTarget),
    /// Force every running activity of a module to Done
    Force(ActivityTarget),
    /// Delete the activities of a module
    Clear(ActivityTarget),
}

#[derive(clap::Args)]
struct ActivityTarget {
    workspace: String,
    module: String,

    /// Remote executor URL
    #[arg(long)]
    remote: Option<String>,
}

fn parse_option(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.trim().is_empty())
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let app_config = AppConfig::new(cli.verbose).with_config_path(cli.config.clone());
    init_logging(&app_config);

    if let Err(e) = run(cli, &app_config).await {
        handle_fatal_error(e, app_config.verbose);
    }
}

async fn run(cli: Cli, app_config: &AppConfig) -> Result<()> {
    let config = SchedulerConfig::load(app_config.config_path.as_deref()).await?;
    let runtime = Runtime::new(config).catalog_override(cli.catalog.as_deref());

    match cli.command {
        Commands::Serve { bind } => serve(&runtime, bind).await,
        Commands::Run {
            target,
            workflow,
            profile,
            workspace,
            remote,
            force,
            max_retries,
            poll_delay,
            nolog,
            options,
        } => {
            let mut settings = RunSettings::new(profile);
            settings.forced = force;
            settings.nolog = nolog;
            settings.poll = runtime.config.poll_policy();
            if let Some(max_retries) = max_retries {
                settings.poll.max_retries = max_retries;
            }
            if let Some(delay) = poll_delay {
                settings.poll.delay = Duration::from_secs(delay);
            }

            let extra: OptionSet = options.into_iter().collect();
            let remote = remote.or_else(|| runtime.config.remote.clone());
            run_workflow(
                &runtime,
                &target,
                &workflow,
                workspace.as_deref(),
                remote.as_deref(),
                extra,
                &settings,
            )
            .await
        }
        Commands::Routine {
            workspace,
            profile,
            json,
        } => show_routine(&runtime, &workspace, &profile, json).await,
        Commands::Activities { command } => activities(&runtime, command).await,
    }
}

async fn serve(runtime: &Runtime, bind: Option<String>) -> Result<()> {
    let bind = bind.unwrap_or_else(|| runtime.config.server.bind.clone());
    let listener = ApiServer::bind(&bind).await?;
    ApiServer::new(runtime.local_dispatcher(true))
        .serve(listener)
        .await?;
    Ok(())
}

async fn run_workflow(
    runtime: &Runtime,
    target: &str,
    workflow: &str,
    workspace: Option<&str>,
    remote: Option<&str>,
    extra: OptionSet,
    settings: &RunSettings,
) -> Result<()> {
    let runner = runtime.workflow_runner(remote, !settings.nolog).await?;
    let options = runtime.prepare_workspace(target, workspace, extra).await?;
    let report = runner.run_workflow(workflow, &options, settings).await?;

    println!("Workflow '{}' on {}:", report.workflow, report.workspace);
    for module in &report.modules {
        println!(
            "  {:<12} dispatched {:>3}  done {:>3}  errors {:>3}  skipped {:>3}{}",
            module.module,
            module.dispatched,
            module.done,
            module.errors,
            module.skipped,
            if module.forced_continue { "  (forced)" } else { "" }
        );
    }
    Ok(())
}

async fn show_routine(runtime: &Runtime, workspace: &str, profile: &str, json: bool) -> Result<()> {
    let catalog = runtime.catalog().await?;
    let routine = get_workspace_routine(&runtime.store, &catalog, workspace, profile).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&routine)?);
        return Ok(());
    }

    for (module, commands) in &routine {
        if commands.is_empty() {
            println!("{} (no commands for {})", module, profile);
            continue;
        }
        println!("{}:", module);
        for command in commands {
            println!("  {}", command.cmd);
        }
    }
    Ok(())
}

async fn activities(runtime: &Runtime, command: ActivitiesCommands) -> Result<()> {
    let target = match &command {
        ActivitiesCommands::Show(t) | ActivitiesCommands::Force(t) | ActivitiesCommands::Clear(t) => t,
    };
    let remote = target.remote.clone().or_else(|| runtime.config.remote.clone());
    let source = runtime.activity_source(remote.as_deref())?;
    let (ws, module) = (target.workspace.as_str(), target.module.as_str());

    match command {
        ActivitiesCommands::Show(_) => {
            let records = source
                .snapshot(ws, module)
                .await
                .with_context(|| format!("Reading activities of {}/{}", ws, module))?;
            let response = ActivitiesResponse::from_records(records);
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        ActivitiesCommands::Force(_) => {
            let forced = source.force_remaining(ws, module).await?;
            println!("Forced {} activities of {}/{}", forced, ws, module);
        }
        ActivitiesCommands::Clear(_) => {
            let cleared = source.reset_module(ws, module).await?;
            println!("Cleared {} activities of {}/{}", cleared, ws, module);
        }
    }
    Ok(())
}
