// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Backend dispatcher.
//!
//! [`Watch`] is the front door of the crate. It resolves the backend owning a
//! project from the tag of its pointer, serializes access to the project
//! registry, and decorates results with conflict warnings, rule status, and
//! pagination cursors. Despite the name nothing runs in the background:
//! every call performs a fresh read.
//!
//! # Registry Contract
//!
//! The registry is shared through a [`Registry`] handed to [`Watch::new`].
//! Every call holds the registry lock from the moment it reloads the
//! registry until it is done, so there is exactly one reader or writer at a
//! time. Mutations follow the same critical section: reload, validate, run
//! the backend operation, write back. A slow operation on one project
//! therefore delays calls on every other project sharing the registry.
//!
//! Remote git projects are the exception. Their handles carry their own
//! lock, so the registry is released once the pointer is resolved and
//! before the handle is touched. Clones and fetches of different remote
//! projects run in parallel, and a second call on a busy remote project
//! fails with [`Error::Busy`] instead of queueing on the registry.

use crate::{
    alert_state::AlertStatusStore,
    backend::{
        files::alert_rule_of, EphemeralBackend, LocalBackend, ProjectBackend, RemoteGitBackend,
    },
    clock::Clock,
    config::{expand_pointer, ConfigSource, ProjectConfig, ProjectsConfig},
    conflict::conflict_warnings,
    error::{Context, Error, Result},
    expr::ExprParser,
    model::{
        AlertGroup, AlertGroupSpec, AlertGroupUpdate, AlertRule, AlertRuleSpec, AlertRuleStatus,
        Dashboard, DashboardSpec, DashboardUpdate, HydratedProject, Meta, NamedAlertRuleSpec,
        NamedAlertRuleStatus, Project, ProjectPointer, ProjectSpec, ProjectStatus,
    },
    pager,
};

use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Shared handle on the project registry.
///
/// Whoever holds the lock is the single reader or writer of the registry.
pub struct Registry {
    source: Mutex<Box<dyn ConfigSource>>,
}

impl Registry {
    pub fn new(source: impl ConfigSource + 'static) -> Self {
        Self {
            source: Mutex::new(Box::new(source)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn ConfigSource>> {
        self.source.lock()
    }
}

/// Run `$body` with `$backend` bound to the backend owning `$pointer`, and
/// `$inner` bound to the pointer variant it understands.
macro_rules! dispatch {
    ($watch:expr, $pointer:expr, |$backend:ident, $inner:ident| $body:expr) => {
        match $pointer {
            ProjectPointer::Localhost($inner) => {
                let $backend = &$watch.local;
                $body
            }
            ProjectPointer::RemoteGit($inner) => {
                let $backend = &$watch.remote;
                $body
            }
            ProjectPointer::Virtual($inner) => {
                let $backend = &$watch.ephemeral;
                $body
            }
        }
    };
}

/// Project storage front door.
pub struct Watch {
    registry: Arc<Registry>,
    local: LocalBackend,
    remote: RemoteGitBackend,
    ephemeral: EphemeralBackend,
    alerts: Arc<dyn AlertStatusStore>,
    clock: Arc<dyn Clock>,
}

impl Watch {
    /// Construct new dispatcher with an empty ephemeral backend.
    pub fn new(
        registry: Arc<Registry>,
        clock: Arc<dyn Clock>,
        parser: Arc<dyn ExprParser>,
        alerts: Arc<dyn AlertStatusStore>,
    ) -> Self {
        Self {
            registry,
            local: LocalBackend::new(clock.clone(), parser.clone()),
            remote: RemoteGitBackend::new(clock.clone(), parser.clone()),
            ephemeral: EphemeralBackend::new(clock.clone(), parser),
            alerts,
            clock,
        }
    }

    /// Replace ephemeral backend, e.g., with a seeded one.
    pub fn with_ephemeral(mut self, ephemeral: EphemeralBackend) -> Self {
        self.ephemeral = ephemeral;
        self
    }

    /// Remote backend, for inspecting its cached handles.
    pub fn remote(&self) -> &RemoteGitBackend {
        &self.remote
    }

    /// Register new project.
    ///
    /// # Errors
    ///
    /// - Return [`Error::InvalidArgument`] if the name is empty or taken, or
    ///   the pointer is rejected by its backend.
    #[instrument(skip(self, pointer), level = "debug")]
    pub fn create_project(&self, name: &str, pointer: ProjectPointer) -> Result<Project> {
        let source = self.registry.lock();
        let mut config = source.reload()?;
        let expanded = expand_request(&pointer)?;
        let warnings = self.validate(&config.expanded()?, name, &expanded, true)?;

        dispatch!(self, &expanded, |backend, inner| backend.create_project(name, inner))?;
        config.projects.push(ProjectConfig::new(name, pointer.clone()));
        source.write_back(&config)?;
        info!("created {} project {name:?}", pointer.kind());

        Ok(self.project(name, expanded, warnings))
    }

    /// Run the validation of [`Watch::create_project`] without registering
    /// anything.
    #[instrument(skip(self, pointer), level = "debug")]
    pub fn validate_project(&self, name: &str, pointer: ProjectPointer) -> Result<Project> {
        let source = self.registry.lock();
        let config = source.reload()?.expanded()?;
        let pointer = expand_request(&pointer)?;
        let warnings = self.validate(&config, name, &pointer, true)?;

        Ok(self.project(name, pointer, warnings))
    }

    /// Fetch project together with its dashboards and alert groups.
    #[instrument(skip(self), level = "debug")]
    pub fn get_project(&self, name: &str) -> Result<HydratedProject> {
        let source = self.registry.lock();
        let config = source.reload()?.expanded()?;
        let pointer = self.resolve(&config, name)?;
        let warnings = conflict_warnings(name, &pointer, &config);
        let _source = unlock_for_remote(source, &pointer);

        self.hydrate(self.project(name, pointer, warnings))
    }

    /// List one page of projects.
    ///
    /// Registry projects come first in registry order, followed by seeded
    /// ephemeral projects. Problems hydrating a single project are recorded
    /// in its status rather than failing the page.
    #[instrument(skip(self), level = "debug")]
    pub fn list_project(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<(Vec<HydratedProject>, Option<String>)> {
        let source = self.registry.lock();
        let config = source.reload()?.expanded()?;

        let mut entries = Vec::new();
        for entry in &config.projects {
            match &entry.pointer {
                Some(pointer) => entries.push((entry.name.clone(), pointer.clone())),
                None => warn!("skipping project {:?}, it has no pointer", entry.name),
            }
        }
        for (name, pointer) in self.ephemeral.seeded_projects() {
            if config.get(&name).is_none() {
                entries.push((name, ProjectPointer::Virtual(pointer)));
            }
        }

        let (page, next) = pager::page(&entries, cursor, limit, |(name, _)| name.as_str())?;
        let mut projects = Vec::with_capacity(page.len());
        let mut remote = Vec::new();
        for (name, pointer) in page {
            let warnings = conflict_warnings(&name, &pointer, &config);
            let project = self.project(&name, pointer, warnings);
            if matches!(project.spec.pointer, ProjectPointer::RemoteGit(_)) {
                remote.push((projects.len(), project));
                projects.push(None);
            } else {
                projects.push(Some(self.hydrate_or_report(project)));
            }
        }

        // INVARIANT: Remote projects are hydrated after the registry is released.
        drop(source);
        for (slot, project) in remote {
            projects[slot] = Some(self.hydrate_or_report(project));
        }

        Ok((projects.into_iter().flatten().collect(), next))
    }

    /// Point existing project somewhere else.
    #[instrument(skip(self, pointer), level = "debug")]
    pub fn update_project(&self, name: &str, pointer: ProjectPointer) -> Result<Project> {
        let source = self.registry.lock();
        let mut config = source.reload()?;
        let Some(previous) = config.get(name).map(|entry| entry.pointer.clone()) else {
            return Err(Error::ProjectNotFound(name.to_string()));
        };
        let expanded = expand_request(&pointer)?;
        let warnings = self.validate(&config.expanded()?, name, &expanded, false)?;

        if let Some(previous) = &previous {
            if *previous != pointer {
                dispatch!(self, previous, |backend, _inner| backend.delete_project(name))?;
            }
        }
        dispatch!(self, &expanded, |backend, inner| backend.create_project(name, inner))?;

        if let Some(entry) = config.get_mut(name) {
            entry.pointer = Some(pointer.clone());
        }
        source.write_back(&config)?;
        info!("updated project {name:?} to {} pointer", pointer.kind());

        Ok(self.project(name, expanded, warnings))
    }

    /// Unregister project.
    ///
    /// Files of localhost and remote projects are left alone. Contents of
    /// ephemeral projects are dropped.
    #[instrument(skip(self), level = "debug")]
    pub fn delete_project(&self, name: &str) -> Result<()> {
        let source = self.registry.lock();
        let mut config = source.reload()?;
        let pointer = match config.remove(name) {
            Some(entry) => {
                source.write_back(&config)?;
                entry.pointer
            }
            None => {
                let pointer = self.resolve(&config, name)?;
                Some(pointer)
            }
        };

        if let Some(pointer) = &pointer {
            dispatch!(self, pointer, |backend, _inner| backend.delete_project(name))?;
        }
        info!("deleted project {name:?}");

        Ok(())
    }

    /// Refresh project from its source of truth.
    #[instrument(skip(self), level = "debug")]
    pub fn sync_project(&self, name: &str) -> Result<Project> {
        let source = self.registry.lock();
        let config = source.reload()?.expanded()?;
        let pointer = self.resolve(&config, name)?;
        let warnings = conflict_warnings(name, &pointer, &config);
        let mut project = self.project(name, pointer.clone(), warnings);
        let _source = unlock_for_remote(source, &pointer);

        dispatch!(self, &pointer, |backend, inner| backend.sync_project(&mut project, inner))?;

        Ok(project)
    }

    #[instrument(skip(self, spec), level = "debug")]
    pub fn create_dashboard(&self, project: &str, spec: &DashboardSpec) -> Result<Dashboard> {
        self.with_pointer(project, |pointer| {
            dispatch!(self, pointer, |backend, inner| backend.create_dashboard(project, inner, spec))
        })
    }

    #[instrument(skip(self), level = "debug")]
    pub fn get_dashboard(&self, project: &str, id: &str) -> Result<Dashboard> {
        self.with_pointer(project, |pointer| {
            dispatch!(self, pointer, |backend, inner| backend.get_dashboard(project, inner, id))
        })
    }

    #[instrument(skip(self), level = "debug")]
    pub fn list_dashboard(
        &self,
        project: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<(Vec<Dashboard>, Option<String>)> {
        let dashboards = self.with_pointer(project, |pointer| {
            dispatch!(self, pointer, |backend, inner| backend.list_dashboards(project, inner))
        })?;

        pager::page(&dashboards, cursor, limit, |dashboard| dashboard.meta.id.as_str())
    }

    #[instrument(skip(self, update), level = "debug")]
    pub fn update_dashboard(
        &self,
        project: &str,
        id: &str,
        update: &DashboardUpdate,
    ) -> Result<Dashboard> {
        self.with_pointer(project, |pointer| {
            dispatch!(self, pointer, |backend, inner| backend.update_dashboard(project, inner, id, update))
        })
    }

    #[instrument(skip(self), level = "debug")]
    pub fn delete_dashboard(&self, project: &str, id: &str) -> Result<()> {
        self.with_pointer(project, |pointer| {
            dispatch!(self, pointer, |backend, inner| backend.delete_dashboard(project, inner, id))
        })
    }

    #[instrument(skip(self, spec), level = "debug")]
    pub fn create_alert_group(&self, project: &str, spec: &AlertGroupSpec) -> Result<AlertGroup> {
        let group = self.with_pointer(project, |pointer| {
            dispatch!(self, pointer, |backend, inner| backend.create_alert_group(project, inner, spec))
        })?;

        self.with_rule_status(project, group)
    }

    #[instrument(skip(self), level = "debug")]
    pub fn get_alert_group(&self, project: &str, name: &str) -> Result<AlertGroup> {
        let group = self.with_pointer(project, |pointer| {
            dispatch!(self, pointer, |backend, inner| backend.get_alert_group(project, inner, name))
        })?;

        self.with_rule_status(project, group)
    }

    #[instrument(skip(self), level = "debug")]
    pub fn list_alert_group(
        &self,
        project: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<(Vec<AlertGroup>, Option<String>)> {
        let groups = self.with_pointer(project, |pointer| {
            dispatch!(self, pointer, |backend, inner| backend.list_alert_groups(project, inner))
        })?;

        let (page, next) = pager::page(&groups, cursor, limit, |group| group.meta.id.as_str())?;
        let page = page
            .into_iter()
            .map(|group| self.with_rule_status(project, group))
            .collect::<Result<Vec<_>>>()?;

        Ok((page, next))
    }

    /// Apply update to alert group, forgetting state of rules it no longer
    /// holds.
    #[instrument(skip(self, update), level = "debug")]
    pub fn update_alert_group(
        &self,
        project: &str,
        name: &str,
        update: &AlertGroupUpdate,
    ) -> Result<AlertGroup> {
        self.with_pointer(project, |pointer| {
            let group = dispatch!(self, pointer, |backend, inner| {
                backend.update_alert_group(project, inner, name, update)
            })?;
            self.settle_rule_states(project, name, group)
        })
    }

    /// Forget state of rules an updated group no longer holds, then decorate
    /// it with the state of the ones it does.
    ///
    /// Runs inside the critical section of the update, so a concurrent
    /// update of the same group cannot prune states this one just created.
    fn settle_rule_states(&self, project: &str, name: &str, group: AlertGroup) -> Result<AlertGroup> {
        if group.spec.name != name {
            self.prune_rule_states(project, name, &[])?;
        }
        let keep = group
            .spec
            .rules
            .iter()
            .map(|rule| rule.id.clone())
            .collect::<Vec<_>>();
        self.prune_rule_states(project, &group.spec.name, &keep)?;

        self.with_rule_status(project, group)
    }

    #[instrument(skip(self), level = "debug")]
    pub fn delete_alert_group(&self, project: &str, name: &str) -> Result<()> {
        self.with_pointer(project, |pointer| {
            dispatch!(self, pointer, |backend, inner| backend.delete_alert_group(project, inner, name))
        })?;

        self.prune_rule_states(project, name, &[])
    }

    /// Add rule to alert group.
    ///
    /// # Errors
    ///
    /// - Return [`Error::InvalidArgument`] if the group already holds a rule
    ///   with the same name, or the group is locked.
    #[instrument(skip(self, spec), level = "debug")]
    pub fn create_alert_rule(
        &self,
        project: &str,
        group: &str,
        spec: &AlertRuleSpec,
    ) -> Result<AlertRule> {
        let updated = self.rewrite_group(project, group, |rules| {
            if rules.rules.iter().any(|rule| rule.id == spec.name) {
                return Err(Error::invalid(format!(
                    "alert rule {:?} already exists in alert group {group:?}",
                    spec.name
                )));
            }
            rules.rules.push(NamedAlertRuleSpec {
                id: spec.name.clone(),
                spec: spec.clone(),
            });
            Ok(())
        })?;

        self.alert_rule(project, &updated, &spec.name)
    }

    #[instrument(skip(self), level = "debug")]
    pub fn get_alert_rule(&self, project: &str, group: &str, rule: &str) -> Result<AlertRule> {
        let group = self.get_alert_group(project, group)?;
        self.alert_rule(project, &group, rule)
    }

    #[instrument(skip(self), level = "debug")]
    pub fn list_alert_rule(
        &self,
        project: &str,
        group: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<(Vec<AlertRule>, Option<String>)> {
        let group = self.get_alert_group(project, group)?;
        let (page, next) = pager::page(&group.spec.rules, cursor, limit, |rule| rule.id.as_str())?;
        let rules = page
            .iter()
            .map(|rule| self.alert_rule(project, &group, &rule.id))
            .collect::<Result<Vec<_>>>()?;

        Ok((rules, next))
    }

    /// Replace rule of alert group. Renaming the rule is allowed.
    #[instrument(skip(self, spec), level = "debug")]
    pub fn update_alert_rule(
        &self,
        project: &str,
        group: &str,
        rule: &str,
        spec: &AlertRuleSpec,
    ) -> Result<AlertRule> {
        let updated = self.rewrite_group(project, group, |rules| {
            let Some(position) = rules.rules.iter().position(|named| named.id == rule) else {
                return Err(rule_not_found(project, group, rule));
            };
            if spec.name != rule && rules.rules.iter().any(|named| named.id == spec.name) {
                return Err(Error::invalid(format!(
                    "alert rule {:?} already exists in alert group {group:?}",
                    spec.name
                )));
            }
            rules.rules[position] = NamedAlertRuleSpec {
                id: spec.name.clone(),
                spec: spec.clone(),
            };
            Ok(())
        })?;

        self.alert_rule(project, &updated, &spec.name)
    }

    #[instrument(skip(self), level = "debug")]
    pub fn delete_alert_rule(&self, project: &str, group: &str, rule: &str) -> Result<()> {
        self.rewrite_group(project, group, |rules| {
            let before = rules.rules.len();
            rules.rules.retain(|named| named.id != rule);
            if rules.rules.len() == before {
                return Err(rule_not_found(project, group, rule));
            }
            Ok(())
        })?;

        Ok(())
    }

    /// Make sure project can be registered under `name`.
    fn validate(
        &self,
        config: &ProjectsConfig,
        name: &str,
        pointer: &ProjectPointer,
        is_new: bool,
    ) -> Result<Vec<String>> {
        if name.trim().is_empty() {
            return Err(Error::invalid("project name must not be empty"));
        }

        let seeded = self
            .ephemeral
            .seeded_projects()
            .iter()
            .any(|(seeded, _)| seeded == name);
        if is_new && (config.get(name).is_some() || seeded) {
            return Err(Error::invalid(format!("project {name:?} already exists")));
        }

        dispatch!(self, pointer, |backend, inner| backend.validate_project_pointer(inner))?;

        Ok(conflict_warnings(name, pointer, config))
    }

    /// Find pointer of project in registry, falling back to seeded
    /// ephemeral projects.
    fn resolve(&self, config: &ProjectsConfig, name: &str) -> Result<ProjectPointer> {
        if let Some(entry) = config.get(name) {
            return entry.pointer.clone().ok_or_else(|| {
                Error::invalid(format!(
                    "project {name:?} has no pointer, cannot tell which backend owns it"
                ))
            });
        }

        self.ephemeral
            .seeded_projects()
            .into_iter()
            .find(|(seeded, _)| seeded == name)
            .map(|(_, pointer)| ProjectPointer::Virtual(pointer))
            .ok_or_else(|| Error::ProjectNotFound(name.to_string()))
    }

    /// Run `op` on pointer of project while holding the registry, unless
    /// the project is a remote one.
    fn with_pointer<T>(&self, project: &str, op: impl FnOnce(&ProjectPointer) -> Result<T>) -> Result<T> {
        let source = self.registry.lock();
        let config = source.reload()?.expanded()?;
        let pointer = self.resolve(&config, project)?;
        let _source = unlock_for_remote(source, &pointer);

        op(&pointer)
    }

    fn project(&self, name: &str, pointer: ProjectPointer, warnings: Vec<String>) -> Project {
        let mut status = ProjectStatus::stamped(self.clock.now());
        status.warnings = warnings;

        Project {
            meta: Meta::new(name),
            spec: ProjectSpec {
                name: name.to_string(),
                pointer,
            },
            status,
        }
    }

    /// Hydrate project, recording failure in its status instead of
    /// returning it.
    fn hydrate_or_report(&self, project: Project) -> HydratedProject {
        self.hydrate(project.clone()).unwrap_or_else(|err| {
            let mut project = project;
            project.status.errors.push(err.to_string());
            HydratedProject {
                project,
                dashboards: Vec::new(),
                alert_groups: Vec::new(),
            }
        })
    }

    fn hydrate(&self, mut project: Project) -> Result<HydratedProject> {
        let pointer = project.spec.pointer.clone();
        let (dashboards, alert_groups) = dispatch!(self, &pointer, |backend, inner| {
            backend.get_project_hydrated(&mut project, inner)
        })?;

        let alert_groups = alert_groups
            .into_iter()
            .map(|group| self.with_rule_status(&project.spec.name, group))
            .collect::<Result<Vec<_>>>()?;

        Ok(HydratedProject {
            project,
            dashboards,
            alert_groups,
        })
    }

    /// Read group, apply `edit` to its spec, and write it back, leaving its
    /// lock untouched.
    ///
    /// Read and write share one critical section, so concurrent edits of
    /// the same group never lose each other's rules.
    fn rewrite_group(
        &self,
        project: &str,
        group: &str,
        edit: impl FnOnce(&mut AlertGroupSpec) -> Result<()>,
    ) -> Result<AlertGroup> {
        self.with_pointer(project, |pointer| {
            let updated = dispatch!(self, pointer, |backend, inner| {
                let mut spec = backend.get_alert_group(project, inner, group)?.spec;
                edit(&mut spec)?;
                backend.update_alert_group(
                    project,
                    inner,
                    group,
                    &AlertGroupUpdate {
                        spec: Some(spec),
                        is_readonly: None,
                    },
                )
            })?;
            self.settle_rule_states(project, group, updated)
        })
    }

    fn alert_rule(&self, project: &str, group: &AlertGroup, rule: &str) -> Result<AlertRule> {
        let mut alert_rule = alert_rule_of(project, group, rule)?;
        alert_rule.status = self.rule_status(project, &group.spec.name, rule)?;

        Ok(alert_rule)
    }

    fn with_rule_status(&self, project: &str, mut group: AlertGroup) -> Result<AlertGroup> {
        group.status.rules = group
            .spec
            .rules
            .iter()
            .map(|rule| {
                Ok(NamedAlertRuleStatus {
                    id: rule.id.clone(),
                    status: self.rule_status(project, &group.spec.name, &rule.id)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(group)
    }

    fn rule_status(&self, project: &str, group: &str, rule: &str) -> Result<AlertRuleStatus> {
        self.alerts
            .alert_get_or_create(project, group, rule, &AlertRuleStatus::default)
            .context(|| format!("reading state of alert rule {rule:?} in group {group:?}"))
    }

    fn prune_rule_states(&self, project: &str, group: &str, keep: &[String]) -> Result<()> {
        self.alerts
            .alert_delete_state_not_in_list(project, group, keep)
            .context(|| format!("pruning rule states of alert group {group:?}"))
    }
}

/// Shell-expand pointer handed in by a caller.
fn expand_request(pointer: &ProjectPointer) -> Result<ProjectPointer> {
    expand_pointer(pointer)
        .map_err(|err| Error::invalid(format!("cannot expand path of project pointer: {err}")))
}

/// Keep registry guard only for backends that rely on it.
fn unlock_for_remote<'a>(
    source: MutexGuard<'a, Box<dyn ConfigSource>>,
    pointer: &ProjectPointer,
) -> Option<MutexGuard<'a, Box<dyn ConfigSource>>> {
    match pointer {
        ProjectPointer::RemoteGit(_) => None,
        _ => Some(source),
    }
}

fn rule_not_found(project: &str, group: &str, rule: &str) -> Error {
    Error::ResourceNotFound(format!(
        "alert rule {rule:?} not found in alert group {group:?} of project {project:?}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        alert_state::MemoryAlertStatusStore,
        clock::ManualClock,
        config::MemoryConfig,
        error::ErrorKind,
        expr::RawExprParser,
        model::{AlertState, Expr, RemoteGitPointer, VirtualPointer},
    };
    use std::thread;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    struct Fixture {
        watch: Watch,
        config: Arc<MemoryConfig>,
        alerts: Arc<MemoryAlertStatusStore>,
    }

    fn fixture() -> Fixture {
        let config = Arc::new(MemoryConfig::default());
        let alerts = Arc::new(MemoryAlertStatusStore::new());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap()));
        let watch = Watch::new(
            Arc::new(Registry::new(config.clone())),
            clock,
            Arc::new(RawExprParser),
            alerts.clone(),
        );

        Fixture {
            watch,
            config,
            alerts,
        }
    }

    fn scratch() -> ProjectPointer {
        ProjectPointer::Virtual(VirtualPointer {
            uri: "mem://scratch".into(),
        })
    }

    fn rule(name: &str) -> AlertRuleSpec {
        AlertRuleSpec {
            name: name.into(),
            expr: Expr {
                text: "up == 0".into(),
                query: None,
            },
            ..AlertRuleSpec::default()
        }
    }

    #[test]
    fn project_lifecycle_persists_registry() -> anyhow::Result<()> {
        let fixture = fixture();
        fixture.watch.create_project("scratch", scratch())?;
        assert_eq!(fixture.config.snapshot().projects.len(), 1);

        let err = fixture.watch.create_project("scratch", scratch()).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        let err = fixture.watch.create_project(" ", scratch()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        fixture.watch.delete_project("scratch")?;
        assert!(fixture.config.snapshot().projects.is_empty());
        let err = fixture.watch.get_project("scratch").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        Ok(())
    }

    #[test]
    fn validate_project_does_not_persist() -> anyhow::Result<()> {
        let fixture = fixture();
        let project = fixture.watch.validate_project("scratch", scratch())?;
        assert_eq!(project.spec.name, "scratch");
        assert!(fixture.config.snapshot().projects.is_empty());

        let err = fixture
            .watch
            .validate_project(
                "scratch",
                ProjectPointer::Virtual(VirtualPointer { uri: "".into() }),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        Ok(())
    }

    #[test]
    fn validate_project_rejects_taken_name() -> anyhow::Result<()> {
        let fixture = fixture();
        fixture.watch.create_project("taken", scratch())?;

        let err = fixture.watch.validate_project("taken", scratch()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("already exists"));
        assert_eq!(fixture.config.snapshot().projects.len(), 1);

        Ok(())
    }

    #[test]
    fn busy_remote_project_fails_fast() -> anyhow::Result<()> {
        let fixture = fixture();
        let pointer = RemoteGitPointer {
            url: "https://example.invalid/obs.git".into(),
            git_ref: "main".into(),
            dashboard_dir: "dashboards".into(),
            alert_dir: "alerts".into(),
        };
        fixture
            .watch
            .create_project("shared", ProjectPointer::RemoteGit(pointer.clone()))?;

        let handle = fixture.watch.remote().handle("shared", &pointer);
        let _guard = handle.checkout.lock();

        let err = fixture.watch.list_dashboard("shared", None, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Busy);
        let err = fixture.watch.sync_project("shared").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Busy);

        let (projects, _) = fixture.watch.list_project(None, 0)?;
        assert_eq!(projects.len(), 1);
        assert!(projects[0].project.status.errors[0].contains("please wait"));

        Ok(())
    }

    #[test]
    fn concurrent_rule_creates_keep_every_rule() -> anyhow::Result<()> {
        let fixture = fixture();
        let watch = &fixture.watch;
        watch.create_project("scratch", scratch())?;
        watch.create_alert_group(
            "scratch",
            &AlertGroupSpec {
                name: "node".into(),
                ..AlertGroupSpec::default()
            },
        )?;

        thread::scope(|scope| {
            for worker in 0..4 {
                scope.spawn(move || {
                    for n in 0..8 {
                        watch
                            .create_alert_rule("scratch", "node", &rule(&format!("Rule{worker}x{n}")))
                            .unwrap();
                    }
                });
            }
        });

        assert_eq!(fixture.alerts.len(), 32);
        let group = watch.get_alert_group("scratch", "node")?;
        assert_eq!(group.spec.rules.len(), 32);

        Ok(())
    }

    #[test]
    fn pointerless_entry_is_invalid() -> anyhow::Result<()> {
        let fixture = fixture();
        fixture.config.write_back(&ProjectsConfig {
            projects: vec![ProjectConfig {
                name: "dangling".into(),
                pointer: None,
            }],
        })?;

        let err = fixture.watch.get_project("dangling").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let (projects, next) = fixture.watch.list_project(None, 0)?;
        assert!(projects.is_empty());
        assert_eq!(next, None);

        Ok(())
    }

    #[test]
    fn seeded_projects_follow_registry_projects() -> anyhow::Result<()> {
        let fixture = fixture();
        let ephemeral = EphemeralBackend::with_example(
            Arc::new(ManualClock::new(Utc::now())),
            Arc::new(RawExprParser),
        )?;
        let watch = fixture.watch.with_ephemeral(ephemeral);
        watch.create_project("zeta", scratch())?;

        let (projects, next) = watch.list_project(None, 0)?;
        let names = projects
            .iter()
            .map(|project| project.project.spec.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["zeta", "example"]);
        assert_eq!(projects[1].dashboards.len(), 1);
        assert_eq!(next, None);

        let (first, next) = watch.list_project(None, 1)?;
        assert_eq!(first[0].project.spec.name, "zeta");
        let (second, last) = watch.list_project(next.as_deref(), 1)?;
        assert_eq!(second[0].project.spec.name, "example");
        assert_eq!(last, None);

        Ok(())
    }

    #[test]
    fn rule_crud_goes_through_group() -> anyhow::Result<()> {
        let fixture = fixture();
        let watch = &fixture.watch;
        watch.create_project("scratch", scratch())?;
        watch.create_alert_group(
            "scratch",
            &AlertGroupSpec {
                name: "node".into(),
                ..AlertGroupSpec::default()
            },
        )?;

        let created = watch.create_alert_rule("scratch", "node", &rule("NodeDown"))?;
        assert_eq!(created.status.state, AlertState::Unknown);
        assert!(watch.create_alert_rule("scratch", "node", &rule("NodeDown")).is_err());
        watch.create_alert_rule("scratch", "node", &rule("DiskFull"))?;

        let (rules, next) = watch.list_alert_rule("scratch", "node", None, 1)?;
        assert_eq!(rules[0].meta.id, "NodeDown");
        assert!(next.is_some());

        let renamed = watch.update_alert_rule("scratch", "node", "DiskFull", &rule("DiskAlmostFull"))?;
        assert_eq!(renamed.meta.id, "DiskAlmostFull");
        assert_eq!(fixture.alerts.len(), 2);

        watch.delete_alert_rule("scratch", "node", "NodeDown")?;
        let group = watch.get_alert_group("scratch", "node")?;
        assert_eq!(group.status.rules.len(), 1);
        assert_eq!(group.status.rules[0].id, "DiskAlmostFull");
        assert_eq!(fixture.alerts.len(), 1);

        let err = watch.get_alert_rule("scratch", "node", "NodeDown").unwrap_err();
        assert!(err.to_string().contains("NodeDown"));

        watch.delete_alert_group("scratch", "node")?;
        assert!(fixture.alerts.is_empty());

        Ok(())
    }
}
