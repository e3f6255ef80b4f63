// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{localhost, Harness};

use humanlog_projects::{
    model::{DashboardSpec, LocalhostPointer, ProjectPointer},
    ErrorKind,
};

use anyhow::Result;
use indoc::formatdoc;
use pretty_assertions::assert_eq;
use std::{collections::BTreeSet, fs};

#[test]
fn registry_file_tracks_project_lifecycle() -> Result<()> {
    let harness = Harness::new()?;
    let root = harness.local_dir("infra")?;

    let project = harness.watch.create_project("infra", localhost(&root))?;
    assert!(project.status.warnings.is_empty());
    let registry = fs::read_to_string(&harness.registry_file)?;
    assert!(registry.contains("name = \"infra\""));

    let err = harness
        .watch
        .create_project("infra", localhost(&root))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    harness.watch.delete_project("infra")?;
    let registry = fs::read_to_string(&harness.registry_file)?;
    assert!(!registry.contains("infra"));
    assert!(root.join("dashboards").is_dir());

    let err = harness.watch.get_project("infra").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = harness.watch.delete_project("infra").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    Ok(())
}

#[test]
fn hand_written_registry_is_honored() -> Result<()> {
    let harness = Harness::new()?;
    let root = harness.local_dir("infra")?;
    fs::create_dir_all(harness.registry_file.parent().unwrap())?;
    fs::write(
        &harness.registry_file,
        formatdoc! {r#"
            [[project]]
            name = "infra"

            [project.pointer.localhost]
            path = "{}"
            dashboard_dir = "dashboards"
            alert_dir = "alerts"

            [[project]]
            name = "dangling"
        "#, root.display()},
    )?;

    let hydrated = harness.watch.get_project("infra")?;
    assert_eq!(hydrated.project.spec.pointer, localhost(&root));

    let err = harness.watch.get_project("dangling").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.to_string().contains("no pointer"));

    let (projects, next) = harness.watch.list_project(None, 0)?;
    assert_eq!(projects.len(), 1);
    assert_eq!(next, None);

    Ok(())
}

#[test]
fn shared_dashboard_dir_warns_once_per_project() -> Result<()> {
    let harness = Harness::new()?;
    let root = harness.local_dir("infra")?;
    fs::create_dir_all(root.join("team-alerts"))?;

    let first = harness.watch.create_project("infra", localhost(&root))?;
    assert!(first.status.warnings.is_empty());

    let second = harness.watch.create_project(
        "team",
        ProjectPointer::Localhost(LocalhostPointer {
            path: root.clone(),
            dashboard_dir: "dashboards".into(),
            alert_dir: "team-alerts".into(),
            read_only: false,
        }),
    )?;
    assert_eq!(second.status.warnings.len(), 1);
    assert!(second.status.warnings[0].contains("infra"));

    let (projects, _) = harness.watch.list_project(None, 0)?;
    for hydrated in &projects {
        assert_eq!(hydrated.project.status.warnings.len(), 1);
    }
    let infra = harness.watch.get_project("infra")?;
    assert!(infra.project.status.warnings[0].contains("team"));

    Ok(())
}

#[test]
fn cursor_walks_every_dashboard_once() -> Result<()> {
    let harness = Harness::new()?;
    let root = harness.local_dir("infra")?;
    harness.watch.create_project("infra", localhost(&root))?;
    for name in ["alpha", "beta", "gamma"] {
        harness.watch.create_dashboard(
            "infra",
            &DashboardSpec {
                name: name.into(),
                ..DashboardSpec::default()
            },
        )?;
    }

    let mut seen = BTreeSet::new();
    let (page, mut cursor) = harness.watch.list_dashboard("infra", None, 2)?;
    assert_eq!(page.len(), 2);
    seen.extend(page.into_iter().map(|dashboard| dashboard.spec.name));
    while let Some(next) = cursor {
        let (page, following) = harness.watch.list_dashboard("infra", Some(&next), 2)?;
        seen.extend(page.into_iter().map(|dashboard| dashboard.spec.name));
        cursor = following;
    }
    assert_eq!(
        seen.into_iter().collect::<Vec<_>>(),
        vec!["alpha", "beta", "gamma"]
    );

    let err = harness
        .watch
        .list_dashboard("infra", Some("garbage"), 2)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    Ok(())
}

#[test]
fn repointing_project_changes_backend() -> Result<()> {
    let harness = Harness::new()?;
    let old = harness.local_dir("old")?;
    let new = harness.local_dir("new")?;
    fs::write(
        new.join("dashboards").join("moved.json"),
        r#"{"kind": "Dashboard", "metadata": {"name": "moved"}}"#,
    )?;
    harness.watch.create_project("infra", localhost(&old))?;

    let updated = harness.watch.update_project("infra", localhost(&new))?;
    assert_eq!(updated.spec.pointer, localhost(&new));

    let (dashboards, _) = harness.watch.list_dashboard("infra", None, 0)?;
    assert_eq!(dashboards.len(), 1);
    assert_eq!(dashboards[0].spec.name, "moved");

    let err = harness
        .watch
        .update_project("ghost", localhost(&new))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    Ok(())
}
