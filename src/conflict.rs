// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Directory conflicts between localhost projects.
//!
//! Two projects pointing at the same dashboard or alert directory would
//! fight over the same files. That is allowed, but the user gets warned about
//! it every time either project is read.

use crate::{
    config::ProjectsConfig,
    model::{LocalhostPointer, ProjectPointer},
    tree::normalize,
};

use std::path::PathBuf;

/// Warn about every directory `pointer` shares with another localhost project.
///
/// Only localhost projects take part. Dashboard and alert directories are
/// compared independently, so a project sharing both with another project
/// yields two warnings.
pub fn conflict_warnings(name: &str, pointer: &ProjectPointer, registry: &ProjectsConfig) -> Vec<String> {
    let ProjectPointer::Localhost(local) = pointer else {
        return Vec::new();
    };
    let (dashboards, alerts) = directories(local);

    let mut warnings = Vec::new();
    for other in &registry.projects {
        if other.name == name {
            continue;
        }
        let Some(ProjectPointer::Localhost(other_local)) = &other.pointer else {
            continue;
        };

        let (other_dashboards, other_alerts) = directories(other_local);
        if dashboards == other_dashboards {
            warnings.push(format!(
                "dashboard directory {:?} is shared with project {:?}",
                dashboards.display(),
                other.name
            ));
        }
        if alerts == other_alerts {
            warnings.push(format!(
                "alert directory {:?} is shared with project {:?}",
                alerts.display(),
                other.name
            ));
        }
    }

    warnings
}

fn directories(pointer: &LocalhostPointer) -> (PathBuf, PathBuf) {
    (
        normalize(&pointer.path.join(&pointer.dashboard_dir)),
        normalize(&pointer.path.join(&pointer.alert_dir)),
    )
}
