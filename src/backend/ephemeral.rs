// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Ephemeral backend.
//!
//! Projects that live in memory only, used for scratch projects and tests.
//! Nothing survives the process. There is no provenance either: everything
//! stored here was put there through the API, so it is always managed, but
//! the `is_readonly` flag still works as a lock.

use crate::{
    backend::{
        files::{check_writable, new_dashboard_document, parse_perses_json, set_at, validate_rules},
        ProjectBackend,
    },
    clock::Clock,
    error::{Error, Result},
    expr::ExprParser,
    id::{dashboard_id, is_valid_slug},
    model::{
        AlertGroup, AlertGroupSpec, AlertGroupStatus, AlertGroupUpdate, Dashboard, DashboardSpec,
        DashboardStatus, DashboardUpdate, Meta, Project, SourceFormat, VirtualPointer,
    },
    provenance::Provenance,
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, info};

/// Name of the project seeded by [`EphemeralBackend::with_example`].
pub const EXAMPLE_PROJECT: &str = "example";

/// Backend for `virtual` pointers.
pub struct EphemeralBackend {
    clock: Arc<dyn Clock>,
    parser: Arc<dyn ExprParser>,
    projects: Mutex<BTreeMap<String, MemProject>>,
}

/// Contents of a single in-memory project.
#[derive(Debug, Clone)]
struct MemProject {
    pointer: VirtualPointer,
    seeded: bool,
    created_at: DateTime<Utc>,

    // INVARIANT: Dashboards are keyed by identifier, alert groups by name.
    dashboards: BTreeMap<String, Dashboard>,
    alert_groups: BTreeMap<String, AlertGroup>,
}

impl MemProject {
    fn new(pointer: VirtualPointer, now: DateTime<Utc>) -> Self {
        Self {
            pointer,
            seeded: false,
            created_at: now,
            dashboards: BTreeMap::new(),
            alert_groups: BTreeMap::new(),
        }
    }
}

impl EphemeralBackend {
    /// Construct new empty backend.
    pub fn new(clock: Arc<dyn Clock>, parser: Arc<dyn ExprParser>) -> Self {
        Self {
            clock,
            parser,
            projects: Mutex::new(BTreeMap::new()),
        }
    }

    /// Construct new backend seeded with an example project holding one
    /// example dashboard.
    pub fn with_example(clock: Arc<dyn Clock>, parser: Arc<dyn ExprParser>) -> Result<Self> {
        let backend = Self::new(clock, parser);
        let pointer = VirtualPointer {
            uri: format!("mem://{EXAMPLE_PROJECT}"),
        };
        backend.create_project(EXAMPLE_PROJECT, &pointer)?;
        backend.create_dashboard(
            EXAMPLE_PROJECT,
            &pointer,
            &DashboardSpec {
                name: "Example".into(),
                description: "Example dashboard of the example project".into(),
                is_readonly: false,
                perses_json: serde_json::json!({
                    "metadata": { "name": "example" },
                    "spec": { "panels": {}, "layouts": [] },
                })
                .to_string(),
                source: SourceFormat::Memory,
            },
        )?;

        if let Some(project) = backend.projects.lock().get_mut(EXAMPLE_PROJECT) {
            project.seeded = true;
        }

        Ok(backend)
    }

    /// Projects that exist because the backend was seeded with them.
    pub fn seeded_projects(&self) -> Vec<(String, VirtualPointer)> {
        self.projects
            .lock()
            .iter()
            .filter(|(_, project)| project.seeded)
            .map(|(name, project)| (name.clone(), project.pointer.clone()))
            .collect()
    }

    /// Run `op` on a project, creating it empty if it was never seen.
    ///
    /// Virtual projects of a registry outlive the process, their contents
    /// do not.
    fn with_project<T>(
        &self,
        name: &str,
        pointer: &VirtualPointer,
        op: impl FnOnce(&mut MemProject, DateTime<Utc>) -> Result<T>,
    ) -> Result<T> {
        let now = self.clock.now();
        let mut projects = self.projects.lock();
        let project = projects
            .entry(name.to_string())
            .or_insert_with(|| MemProject::new(pointer.clone(), now));

        op(project, now)
    }

    /// Parse rule expressions that carry no structured query yet.
    fn parse_rules(&self, spec: &mut AlertGroupSpec) -> Vec<String> {
        let mut errors = Vec::new();
        for rule in &mut spec.rules {
            if rule.spec.expr.query.is_some() {
                continue;
            }
            match self.parser.parse(&rule.spec.expr.text) {
                Ok(query) => rule.spec.expr.query = Some(query),
                Err(err) => errors.push(format!("rule {:?}: invalid expression: {err}", rule.id)),
            }
        }

        errors
    }
}

impl ProjectBackend for EphemeralBackend {
    type Pointer = VirtualPointer;

    fn validate_project_pointer(&self, pointer: &VirtualPointer) -> Result<()> {
        if pointer.uri.trim().is_empty() {
            return Err(Error::invalid("virtual project uri must not be empty"));
        }

        Ok(())
    }

    fn create_project(&self, project: &str, pointer: &VirtualPointer) -> Result<()> {
        self.with_project(project, pointer, |stored, _| {
            stored.pointer = pointer.clone();
            Ok(())
        })
    }

    fn delete_project(&self, project: &str) -> Result<()> {
        if self.projects.lock().remove(project).is_some() {
            debug!("dropped contents of project {project:?}");
        }

        Ok(())
    }

    fn get_project_hydrated(
        &self,
        project: &mut Project,
        pointer: &VirtualPointer,
    ) -> Result<(Vec<Dashboard>, Vec<AlertGroup>)> {
        let name = project.spec.name.clone();
        self.with_project(&name, pointer, |stored, _| {
            project.status.created_at = stored.created_at;
            Ok((
                stored.dashboards.values().cloned().collect(),
                stored.alert_groups.values().cloned().collect(),
            ))
        })
    }

    fn list_dashboards(&self, project: &str, pointer: &VirtualPointer) -> Result<Vec<Dashboard>> {
        self.with_project(project, pointer, |stored, _| {
            Ok(stored.dashboards.values().cloned().collect())
        })
    }

    fn get_dashboard(&self, project: &str, pointer: &VirtualPointer, id: &str) -> Result<Dashboard> {
        self.with_project(project, pointer, |stored, _| {
            stored
                .dashboards
                .get(id)
                .cloned()
                .ok_or_else(|| dashboard_not_found(project, id))
        })
    }

    fn create_dashboard(
        &self,
        project: &str,
        pointer: &VirtualPointer,
        spec: &DashboardSpec,
    ) -> Result<Dashboard> {
        let (slug, document) = new_dashboard_document(project, spec)?;
        let id = dashboard_id(project, project, &slug);
        let perses_json = serde_json::to_string(&document)
            .map_err(|err| Error::internal("encoding dashboard", err))?;

        self.with_project(project, pointer, |stored, now| {
            if stored.dashboards.contains_key(&id) {
                return Err(Error::invalid(format!(
                    "dashboard {slug:?} already exists in project {project:?}"
                )));
            }

            let dashboard = Dashboard {
                meta: Meta::new(id.clone()),
                spec: DashboardSpec {
                    name: spec.name.clone(),
                    description: spec.description.clone(),
                    is_readonly: spec.is_readonly,
                    perses_json,
                    source: SourceFormat::Memory,
                },
                status: DashboardStatus {
                    created_at: now,
                    updated_at: now,
                    origin: None,
                    errors: Vec::new(),
                },
            };
            stored.dashboards.insert(id, dashboard.clone());
            info!("created dashboard {slug:?} in project {project:?}");

            Ok(dashboard)
        })
    }

    fn update_dashboard(
        &self,
        project: &str,
        pointer: &VirtualPointer,
        id: &str,
        update: &DashboardUpdate,
    ) -> Result<Dashboard> {
        self.with_project(project, pointer, |stored, now| {
            let dashboard = stored
                .dashboards
                .get_mut(id)
                .ok_or_else(|| dashboard_not_found(project, id))?;
            check_writable(
                &format!("dashboard {:?}", dashboard.spec.name),
                &Provenance::managed(dashboard.spec.is_readonly),
                update.is_readonly,
            )?;

            let current = parse_perses_json(&dashboard.spec.perses_json)?;
            let mut document = match &update.perses_json {
                Some(json) => parse_perses_json(json)?,
                None => current.clone(),
            };
            for key in ["kind", "metadata"] {
                if let Some(value) = current.get(key) {
                    set_at(&mut document, &[key], value.clone());
                }
            }
            if let Some(name) = &update.name {
                dashboard.spec.name = name.clone();
            }
            if let Some(description) = &update.description {
                dashboard.spec.description = description.clone();
            }
            set_at(
                &mut document,
                &["spec", "display", "name"],
                Value::String(dashboard.spec.name.clone()),
            );
            set_at(
                &mut document,
                &["spec", "display", "description"],
                Value::String(dashboard.spec.description.clone()),
            );

            dashboard.spec.perses_json = serde_json::to_string(&document)
                .map_err(|err| Error::internal("encoding dashboard", err))?;
            dashboard.spec.is_readonly = update.is_readonly.unwrap_or(dashboard.spec.is_readonly);
            dashboard.status.updated_at = now;

            Ok(dashboard.clone())
        })
    }

    fn delete_dashboard(&self, project: &str, pointer: &VirtualPointer, id: &str) -> Result<()> {
        self.with_project(project, pointer, |stored, _| {
            let dashboard = stored
                .dashboards
                .get(id)
                .ok_or_else(|| dashboard_not_found(project, id))?;
            check_writable(
                &format!("dashboard {:?}", dashboard.spec.name),
                &Provenance::managed(dashboard.spec.is_readonly),
                None,
            )?;
            stored.dashboards.remove(id);

            Ok(())
        })
    }

    fn list_alert_groups(&self, project: &str, pointer: &VirtualPointer) -> Result<Vec<AlertGroup>> {
        self.with_project(project, pointer, |stored, _| {
            Ok(stored.alert_groups.values().cloned().collect())
        })
    }

    fn get_alert_group(
        &self,
        project: &str,
        pointer: &VirtualPointer,
        name: &str,
    ) -> Result<AlertGroup> {
        self.with_project(project, pointer, |stored, _| {
            stored
                .alert_groups
                .get(name)
                .cloned()
                .ok_or_else(|| alert_group_not_found(project, name))
        })
    }

    fn create_alert_group(
        &self,
        project: &str,
        pointer: &VirtualPointer,
        spec: &AlertGroupSpec,
    ) -> Result<AlertGroup> {
        if !is_valid_slug(&spec.name) {
            return Err(Error::invalid(format!(
                "alert group name {:?} is invalid, only letters, digits, '-', and '_' are allowed",
                spec.name
            )));
        }
        validate_rules(&spec.rules)?;

        let mut spec = spec.clone();
        let errors = self.parse_rules(&mut spec);
        self.with_project(project, pointer, |stored, now| {
            if stored.alert_groups.contains_key(&spec.name) {
                return Err(Error::invalid(format!(
                    "alert group {:?} already exists in project {project:?}",
                    spec.name
                )));
            }

            let group = AlertGroup {
                meta: Meta::new(spec.name.clone()),
                status: AlertGroupStatus {
                    created_at: now,
                    updated_at: now,
                    errors,
                    rules: Vec::new(),
                    origin: None,
                },
                spec,
            };
            stored
                .alert_groups
                .insert(group.spec.name.clone(), group.clone());
            info!("created alert group {:?} in project {project:?}", group.spec.name);

            Ok(group)
        })
    }

    fn update_alert_group(
        &self,
        project: &str,
        pointer: &VirtualPointer,
        name: &str,
        update: &AlertGroupUpdate,
    ) -> Result<AlertGroup> {
        let replacement = match &update.spec {
            Some(spec) => {
                if !is_valid_slug(&spec.name) {
                    return Err(Error::invalid(format!(
                        "alert group name {:?} is invalid, only letters, digits, '-', and '_' are allowed",
                        spec.name
                    )));
                }
                validate_rules(&spec.rules)?;
                let mut spec = spec.clone();
                let errors = self.parse_rules(&mut spec);
                Some((spec, errors))
            }
            None => None,
        };

        self.with_project(project, pointer, |stored, now| {
            let current = stored
                .alert_groups
                .get(name)
                .ok_or_else(|| alert_group_not_found(project, name))?;
            check_writable(
                &format!("alert group {name:?}"),
                &Provenance::managed(current.spec.is_readonly),
                update.is_readonly,
            )?;

            let mut group = current.clone();
            if let Some((spec, errors)) = replacement {
                if spec.name != name && stored.alert_groups.contains_key(&spec.name) {
                    return Err(Error::invalid(format!(
                        "alert group {:?} already exists in project {project:?}",
                        spec.name
                    )));
                }
                group.meta = Meta::new(spec.name.clone());
                group.spec = spec;
                group.status.errors = errors;
            }
            group.spec.is_readonly = update.is_readonly.unwrap_or(current.spec.is_readonly);
            group.status.updated_at = now;

            stored.alert_groups.remove(name);
            stored
                .alert_groups
                .insert(group.spec.name.clone(), group.clone());

            Ok(group)
        })
    }

    fn delete_alert_group(&self, project: &str, pointer: &VirtualPointer, name: &str) -> Result<()> {
        self.with_project(project, pointer, |stored, _| {
            let group = stored
                .alert_groups
                .get(name)
                .ok_or_else(|| alert_group_not_found(project, name))?;
            check_writable(
                &format!("alert group {name:?}"),
                &Provenance::managed(group.spec.is_readonly),
                None,
            )?;
            stored.alert_groups.remove(name);

            Ok(())
        })
    }
}

fn dashboard_not_found(project: &str, id: &str) -> Error {
    Error::ResourceNotFound(format!("dashboard {id:?} not found in project {project:?}"))
}

fn alert_group_not_found(project: &str, name: &str) -> Error {
    Error::ResourceNotFound(format!(
        "alert group {name:?} not found in project {project:?}"
    ))
}
