// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Localhost backend.
//!
//! Projects living in a directory of the local machine. Dashboards and alert
//! groups are plain files under the two configured subdirectories, and may
//! be edited by the user or other tools at any time. Nothing is cached: every
//! call reads the directory afresh.

use crate::{
    backend::{files::ProjectFiles, ProjectBackend},
    clock::Clock,
    error::{Error, Result},
    expr::ExprParser,
    model::{
        AlertGroup, AlertGroupSpec, AlertGroupUpdate, Dashboard, DashboardSpec, DashboardUpdate,
        LocalhostPointer, Project,
    },
    tree::{normalize, OsTree},
};

use std::{path::Path, sync::Arc};
use tracing::instrument;

/// Backend for `localhost` pointers.
pub struct LocalBackend {
    clock: Arc<dyn Clock>,
    parser: Arc<dyn ExprParser>,
}

impl LocalBackend {
    pub fn new(clock: Arc<dyn Clock>, parser: Arc<dyn ExprParser>) -> Self {
        Self { clock, parser }
    }

    fn files<'a>(&'a self, project: &'a str, pointer: &'a LocalhostPointer) -> ProjectFiles<'a, OsTree> {
        ProjectFiles {
            project,
            tree: OsTree::new(&pointer.path),
            root: &pointer.path,
            dashboard_dir: &pointer.dashboard_dir,
            alert_dir: &pointer.alert_dir,
            parser: &*self.parser,
            now: self.clock.now(),
        }
    }

    /// Refuse every write to a project whose pointer is marked read-only.
    fn writable<'a>(&'a self, project: &'a str, pointer: &'a LocalhostPointer) -> Result<ProjectFiles<'a, OsTree>> {
        if pointer.read_only {
            return Err(Error::Permission(format!(
                "project {project:?} is readonly, its localhost pointer sets read_only = true"
            )));
        }

        Ok(self.files(project, pointer))
    }
}

impl ProjectBackend for LocalBackend {
    type Pointer = LocalhostPointer;

    fn validate_project_pointer(&self, pointer: &LocalhostPointer) -> Result<()> {
        if !pointer.path.is_absolute() {
            return Err(Error::invalid(format!(
                "project path {:?} must be absolute",
                pointer.path.display()
            )));
        }
        if !pointer.path.is_dir() {
            return Err(Error::invalid(format!(
                "project path {:?} is not a directory",
                pointer.path.display()
            )));
        }

        validate_subdir(&pointer.path, "dashboard", &pointer.dashboard_dir)?;
        validate_subdir(&pointer.path, "alert", &pointer.alert_dir)
    }

    #[instrument(skip(self, project, pointer), fields(project = %project.spec.name), level = "debug")]
    fn get_project_hydrated(
        &self,
        project: &mut Project,
        pointer: &LocalhostPointer,
    ) -> Result<(Vec<Dashboard>, Vec<AlertGroup>)> {
        let name = project.spec.name.clone();
        Ok(self.files(&name, pointer).hydrate(project))
    }

    fn list_dashboards(&self, project: &str, pointer: &LocalhostPointer) -> Result<Vec<Dashboard>> {
        self.files(project, pointer).list_dashboards()
    }

    fn get_dashboard(&self, project: &str, pointer: &LocalhostPointer, id: &str) -> Result<Dashboard> {
        self.files(project, pointer).get_dashboard(id)
    }

    #[instrument(skip(self, pointer, spec), level = "debug")]
    fn create_dashboard(
        &self,
        project: &str,
        pointer: &LocalhostPointer,
        spec: &DashboardSpec,
    ) -> Result<Dashboard> {
        self.writable(project, pointer)?.create_dashboard(spec)
    }

    #[instrument(skip(self, pointer, update), level = "debug")]
    fn update_dashboard(
        &self,
        project: &str,
        pointer: &LocalhostPointer,
        id: &str,
        update: &DashboardUpdate,
    ) -> Result<Dashboard> {
        self.writable(project, pointer)?.update_dashboard(id, update)
    }

    #[instrument(skip(self, pointer), level = "debug")]
    fn delete_dashboard(&self, project: &str, pointer: &LocalhostPointer, id: &str) -> Result<()> {
        self.writable(project, pointer)?.delete_dashboard(id)
    }

    fn list_alert_groups(&self, project: &str, pointer: &LocalhostPointer) -> Result<Vec<AlertGroup>> {
        self.files(project, pointer).list_alert_groups()
    }

    fn get_alert_group(
        &self,
        project: &str,
        pointer: &LocalhostPointer,
        name: &str,
    ) -> Result<AlertGroup> {
        self.files(project, pointer).get_alert_group(name)
    }

    #[instrument(skip(self, pointer, spec), level = "debug")]
    fn create_alert_group(
        &self,
        project: &str,
        pointer: &LocalhostPointer,
        spec: &AlertGroupSpec,
    ) -> Result<AlertGroup> {
        self.writable(project, pointer)?.create_alert_group(spec)
    }

    #[instrument(skip(self, pointer, update), level = "debug")]
    fn update_alert_group(
        &self,
        project: &str,
        pointer: &LocalhostPointer,
        name: &str,
        update: &AlertGroupUpdate,
    ) -> Result<AlertGroup> {
        self.writable(project, pointer)?.update_alert_group(name, update)
    }

    #[instrument(skip(self, pointer), level = "debug")]
    fn delete_alert_group(&self, project: &str, pointer: &LocalhostPointer, name: &str) -> Result<()> {
        self.writable(project, pointer)?.delete_alert_group(name)
    }
}

/// Make sure `dir` names an existing directory inside `root`.
fn validate_subdir(root: &Path, what: &str, dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() || dir.is_absolute() {
        return Err(Error::invalid(format!(
            "{what} directory {:?} must be a relative path inside the project",
            dir.display()
        )));
    }

    // INVARIANT: Lexical check, so `..` cannot escape the project even through missing paths.
    let root = normalize(root);
    let full = normalize(&root.join(dir));
    if full == root || !full.starts_with(&root) {
        return Err(Error::invalid(format!(
            "{what} directory {:?} escapes project path {:?}",
            dir.display(),
            root.display()
        )));
    }

    if !full.is_dir() {
        return Err(Error::invalid(format!(
            "{what} directory {:?} does not exist",
            full.display()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualClock, expr::RawExprParser, model::DashboardOrigin};
    use chrono::{TimeZone, Utc};
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn backend() -> LocalBackend {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        LocalBackend::new(Arc::new(clock), Arc::new(RawExprParser))
    }

    fn pointer(root: &Path) -> LocalhostPointer {
        LocalhostPointer {
            path: root.to_path_buf(),
            dashboard_dir: "dashboards".into(),
            alert_dir: "alerts".into(),
            read_only: false,
        }
    }

    #[test]
    fn validate_pointer_rules() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        fs::create_dir(root.path().join("dashboards"))?;
        fs::create_dir(root.path().join("alerts"))?;
        let backend = backend();

        backend.validate_project_pointer(&pointer(root.path()))?;

        let mut relative = pointer(root.path());
        relative.path = "relative/path".into();
        assert!(backend.validate_project_pointer(&relative).is_err());

        let mut escaping = pointer(root.path());
        escaping.alert_dir = "../alerts".into();
        let err = backend.validate_project_pointer(&escaping).unwrap_err();
        assert!(err.to_string().contains("escapes"));

        let mut missing = pointer(root.path());
        missing.dashboard_dir = "nope".into();
        let err = backend.validate_project_pointer(&missing).unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        Ok(())
    }

    #[test]
    fn read_only_pointer_rejects_writes() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        fs::create_dir(root.path().join("dashboards"))?;
        fs::create_dir(root.path().join("alerts"))?;
        let mut pointer = pointer(root.path());
        pointer.read_only = true;

        let err = backend()
            .create_alert_group(
                "demo",
                &pointer,
                &AlertGroupSpec {
                    name: "cpu".into(),
                    ..AlertGroupSpec::default()
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("readonly"));
        assert!(fs::read_dir(root.path().join("alerts"))?.next().is_none());

        Ok(())
    }

    #[test]
    fn hydrate_reports_missing_dirs_without_failing() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        fs::create_dir(root.path().join("dashboards"))?;
        fs::write(
            root.path().join("dashboards").join("cpu.yaml"),
            indoc! {r#"
                # Generated by jsonnet
                kind: Dashboard
                metadata:
                  name: cpu
                  project: demo
                spec:
                  display:
                    name: CPU
            "#},
        )?;
        let backend = backend();
        let pointer = pointer(root.path());
        let mut project = Project {
            meta: crate::model::Meta::new("demo"),
            spec: crate::model::ProjectSpec {
                name: "demo".into(),
                pointer: crate::model::ProjectPointer::Localhost(pointer.clone()),
            },
            status: crate::model::ProjectStatus::stamped(Utc::now()),
        };

        let (dashboards, groups) = backend.get_project_hydrated(&mut project, &pointer)?;
        assert_eq!(dashboards.len(), 1);
        assert!(groups.is_empty());
        assert_eq!(project.status.errors.len(), 1);
        assert!(project.status.errors[0].contains("alert directory"));

        let dashboard = &dashboards[0];
        assert!(dashboard.spec.is_readonly);
        assert_eq!(
            dashboard.status.origin,
            Some(DashboardOrigin::Generated {
                path: root.path().join("dashboards/cpu.yaml"),
                detection_reason: "found generation marker \"# Generated by jsonnet\"".into(),
            })
        );

        Ok(())
    }
}
