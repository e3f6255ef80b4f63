// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Project backends.
//!
//! A __backend__ owns the contents of the projects whose pointer carries its
//! tag. There are exactly three of them, one per [`ProjectPointer`] variant:
//!
//! | Pointer     | Backend                  | Storage                          |
//! |-------------|--------------------------|----------------------------------|
//! | `localhost` | [`LocalBackend`]         | directory on the local machine   |
//! | `remote_git`| [`RemoteGitBackend`]     | sparse checkout of a git remote  |
//! | `virtual`   | [`EphemeralBackend`]     | process memory                   |
//!
//! All of them implement [`ProjectBackend`]. The set is closed, so the
//! dispatcher matches on the pointer tag instead of boxing backends behind
//! trait objects.
//!
//! [`ProjectPointer`]: crate::model::ProjectPointer

pub mod ephemeral;
pub(crate) mod files;
pub mod local;
pub mod remote;

pub use ephemeral::EphemeralBackend;
pub use local::LocalBackend;
pub use remote::RemoteGitBackend;

use crate::{
    error::Result,
    model::{
        AlertGroup, AlertGroupSpec, AlertGroupUpdate, Dashboard, DashboardSpec, DashboardUpdate,
        Project,
    },
};

/// Shared contract of every backend.
///
/// Each operation receives the name of the project being addressed together
/// with the pointer the registry holds for it. Backends never consult the
/// registry themselves.
pub trait ProjectBackend: Send + Sync {
    /// Pointer variant handled by this backend.
    type Pointer;

    /// Check that pointer is usable before it enters the registry.
    fn validate_project_pointer(&self, pointer: &Self::Pointer) -> Result<()>;

    /// Prepare storage for a project that was just registered.
    fn create_project(&self, _project: &str, _pointer: &Self::Pointer) -> Result<()> {
        Ok(())
    }

    /// Release storage of a project that was just unregistered.
    fn delete_project(&self, _project: &str) -> Result<()> {
        Ok(())
    }

    /// Read every dashboard and alert group of a project.
    ///
    /// Problems that only affect part of the project are recorded in
    /// `project.status.errors` or in the status of the affected item.
    fn get_project_hydrated(
        &self,
        project: &mut Project,
        pointer: &Self::Pointer,
    ) -> Result<(Vec<Dashboard>, Vec<AlertGroup>)>;

    /// Refresh project from its source of truth.
    fn sync_project(&self, _project: &mut Project, _pointer: &Self::Pointer) -> Result<()> {
        Ok(())
    }

    fn list_dashboards(&self, project: &str, pointer: &Self::Pointer) -> Result<Vec<Dashboard>>;

    fn get_dashboard(&self, project: &str, pointer: &Self::Pointer, id: &str) -> Result<Dashboard>;

    fn create_dashboard(
        &self,
        project: &str,
        pointer: &Self::Pointer,
        spec: &DashboardSpec,
    ) -> Result<Dashboard>;

    fn update_dashboard(
        &self,
        project: &str,
        pointer: &Self::Pointer,
        id: &str,
        update: &DashboardUpdate,
    ) -> Result<Dashboard>;

    fn delete_dashboard(&self, project: &str, pointer: &Self::Pointer, id: &str) -> Result<()>;

    fn list_alert_groups(&self, project: &str, pointer: &Self::Pointer) -> Result<Vec<AlertGroup>>;

    fn get_alert_group(
        &self,
        project: &str,
        pointer: &Self::Pointer,
        name: &str,
    ) -> Result<AlertGroup>;

    fn create_alert_group(
        &self,
        project: &str,
        pointer: &Self::Pointer,
        spec: &AlertGroupSpec,
    ) -> Result<AlertGroup>;

    fn update_alert_group(
        &self,
        project: &str,
        pointer: &Self::Pointer,
        name: &str,
        update: &AlertGroupUpdate,
    ) -> Result<AlertGroup>;

    fn delete_alert_group(&self, project: &str, pointer: &Self::Pointer, name: &str)
        -> Result<()>;
}
