// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use humanlog_projects::{
    backend::EphemeralBackend,
    model::{LocalhostPointer, ProjectPointer, RemoteGitPointer},
    path::default_registry_file,
    MemoryAlertStatusStore, RawExprParser, Registry, SystemClock, TomlConfigFile, Watch,
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, process::exit, sync::Arc};
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "humanlog-projects [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to project registry file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Include the in-memory example project.
    #[arg(short, long, global = true)]
    pub example: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let watch = self.watch()?;
        match self.command {
            Command::List(opts) => run_list(&watch, opts),
            Command::Show(opts) => run_show(&watch, opts),
            Command::Dashboards(opts) => run_dashboards(&watch, opts),
            Command::Alerts(opts) => run_alerts(&watch, opts),
            Command::Sync(opts) => run_sync(&watch, opts),
            Command::AddLocal(opts) => run_add_local(&watch, opts),
            Command::AddRemote(opts) => run_add_remote(&watch, opts),
            Command::Remove(opts) => run_remove(&watch, opts),
        }
    }

    fn watch(&self) -> Result<Watch> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => default_registry_file()?,
        };
        let clock = Arc::new(SystemClock);
        let parser = Arc::new(RawExprParser);
        let registry = Arc::new(Registry::new(TomlConfigFile::new(path)));
        let watch = Watch::new(
            registry,
            clock.clone(),
            parser.clone(),
            Arc::new(MemoryAlertStatusStore::new()),
        );

        if self.example {
            return Ok(watch.with_ephemeral(EphemeralBackend::with_example(clock, parser)?));
        }

        Ok(watch)
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// List registered projects.
    #[command(override_usage = "humanlog-projects list [options]")]
    List(ListOptions),

    /// Show everything a project contains.
    #[command(override_usage = "humanlog-projects show [options] <project>")]
    Show(ProjectOptions),

    /// List dashboards of a project.
    #[command(override_usage = "humanlog-projects dashboards [options] <project>")]
    Dashboards(ListInProjectOptions),

    /// List alert groups of a project.
    #[command(override_usage = "humanlog-projects alerts [options] <project>")]
    Alerts(ListInProjectOptions),

    /// Refresh project from its source of truth.
    #[command(override_usage = "humanlog-projects sync [options] <project>")]
    Sync(ProjectOptions),

    /// Register project living in a local directory.
    #[command(override_usage = "humanlog-projects add-local [options] <project> <path>")]
    AddLocal(AddLocalOptions),

    /// Register project living in a remote git repository.
    #[command(override_usage = "humanlog-projects add-remote [options] <project> <url>")]
    AddRemote(AddRemoteOptions),

    /// Unregister projects. Their files are left alone.
    #[command(override_usage = "humanlog-projects remove [options] <project>...")]
    Remove(RemoveOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ListOptions {
    /// Cursor returned by a previous page.
    #[arg(long, value_name = "cursor")]
    pub cursor: Option<String>,

    /// Number of entries per page.
    #[arg(short, long, default_value_t = 0, value_name = "limit")]
    pub limit: usize,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ProjectOptions {
    /// Name of project.
    #[arg(required = true, value_name = "project")]
    pub project: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ListInProjectOptions {
    /// Name of project.
    #[arg(required = true, value_name = "project")]
    pub project: String,

    #[command(flatten)]
    pub page: ListOptions,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct AddLocalOptions {
    /// Name to register project under.
    #[arg(required = true, value_name = "project")]
    pub project: String,

    /// Absolute path to project directory.
    #[arg(required = true, value_name = "path")]
    pub path: PathBuf,

    /// Directory holding dashboards, relative to project path.
    #[arg(long, default_value = "dashboards", value_name = "dir")]
    pub dashboard_dir: PathBuf,

    /// Directory holding alert groups, relative to project path.
    #[arg(long, default_value = "alerts", value_name = "dir")]
    pub alert_dir: PathBuf,

    /// Refuse every write to the project.
    #[arg(short, long)]
    pub read_only: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct AddRemoteOptions {
    /// Name to register project under.
    #[arg(required = true, value_name = "project")]
    pub project: String,

    /// URL of repository to clone.
    #[arg(required = true, value_name = "url")]
    pub url: String,

    /// Branch, tag, or commit to check out instead of the default branch.
    #[arg(short = 'r', long = "ref", value_name = "ref")]
    pub git_ref: Option<String>,

    /// Directory holding dashboards, relative to repository root.
    #[arg(long, default_value = "dashboards", value_name = "dir")]
    pub dashboard_dir: PathBuf,

    /// Directory holding alert groups, relative to repository root.
    #[arg(long, default_value = "alerts", value_name = "dir")]
    pub alert_dir: PathBuf,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RemoveOptions {
    /// Names of projects to unregister.
    #[arg(required = true, value_name = "project")]
    pub projects: Vec<String>,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry().with(layer).with(filter).init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_list(watch: &Watch, opts: ListOptions) -> Result<()> {
    let (projects, next) = watch.list_project(opts.cursor.as_deref(), opts.limit)?;
    for hydrated in &projects {
        let project = &hydrated.project;
        println!(
            "{}\t{}\t{} dashboards\t{} alert groups",
            project.spec.name,
            project.spec.pointer.kind(),
            hydrated.dashboards.len(),
            hydrated.alert_groups.len()
        );
        for warning in &project.status.warnings {
            warn!("{}: {warning}", project.spec.name);
        }
        for err in &project.status.errors {
            error!("{}: {err}", project.spec.name);
        }
    }
    print_next(next);

    Ok(())
}

fn run_show(watch: &Watch, opts: ProjectOptions) -> Result<()> {
    let hydrated = watch.get_project(&opts.project)?;
    println!("{}", serde_json::to_string_pretty(&hydrated.project)?);
    for dashboard in &hydrated.dashboards {
        println!("dashboard {}\t{}", dashboard.meta.id, dashboard.spec.name);
    }
    for group in &hydrated.alert_groups {
        println!("alert group {}\t{} rules", group.meta.id, group.spec.rules.len());
    }

    Ok(())
}

fn run_dashboards(watch: &Watch, opts: ListInProjectOptions) -> Result<()> {
    let (dashboards, next) =
        watch.list_dashboard(&opts.project, opts.page.cursor.as_deref(), opts.page.limit)?;
    for dashboard in &dashboards {
        let lock = if dashboard.spec.is_readonly { "readonly" } else { "editable" };
        println!("{}\t{}\t{lock}", dashboard.meta.id, dashboard.spec.name);
        for err in &dashboard.status.errors {
            error!("{}: {err}", dashboard.meta.id);
        }
    }
    print_next(next);

    Ok(())
}

fn run_alerts(watch: &Watch, opts: ListInProjectOptions) -> Result<()> {
    let (groups, next) =
        watch.list_alert_group(&opts.project, opts.page.cursor.as_deref(), opts.page.limit)?;
    for group in &groups {
        let lock = if group.spec.is_readonly { "readonly" } else { "editable" };
        println!("{}\t{} rules\t{lock}", group.meta.id, group.spec.rules.len());
        for err in &group.status.errors {
            error!("{}: {err}", group.meta.id);
        }
    }
    print_next(next);

    Ok(())
}

fn run_sync(watch: &Watch, opts: ProjectOptions) -> Result<()> {
    let project = watch.sync_project(&opts.project)?;
    println!("{} synced at {}", project.spec.name, project.status.updated_at);

    Ok(())
}

fn run_add_local(watch: &Watch, opts: AddLocalOptions) -> Result<()> {
    let pointer = ProjectPointer::Localhost(LocalhostPointer {
        path: opts.path,
        dashboard_dir: opts.dashboard_dir,
        alert_dir: opts.alert_dir,
        read_only: opts.read_only,
    });
    let project = watch.create_project(&opts.project, pointer)?;
    for warning in &project.status.warnings {
        warn!("{warning}");
    }

    Ok(())
}

fn run_add_remote(watch: &Watch, opts: AddRemoteOptions) -> Result<()> {
    let pointer = ProjectPointer::RemoteGit(RemoteGitPointer {
        url: opts.url,
        git_ref: opts.git_ref.unwrap_or_default(),
        dashboard_dir: opts.dashboard_dir,
        alert_dir: opts.alert_dir,
    });
    let project = watch.create_project(&opts.project, pointer)?;
    for warning in &project.status.warnings {
        warn!("{warning}");
    }

    Ok(())
}

fn run_remove(watch: &Watch, opts: RemoveOptions) -> Result<()> {
    for project in opts.projects {
        watch.delete_project(&project)?;
    }

    Ok(())
}

fn print_next(next: Option<String>) {
    if let Some(cursor) = next {
        println!("next page: --cursor '{cursor}'");
    }
}
