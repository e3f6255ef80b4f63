// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{remote_git, Harness, RepoFixture, RepoKind};

use humanlog_projects::{
    model::{AlertGroupOrigin, DashboardSpec},
    ErrorKind,
};

use anyhow::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;

const CPU_DASHBOARD: &str = indoc! {r#"
    # managed-by: humanlog
    kind: Dashboard
    metadata:
      name: cpu
    spec:
      display:
        name: CPU
"#};

const MEMORY_DASHBOARD: &str = indoc! {r#"
    kind: Dashboard
    metadata:
      name: memory
    spec:
      display:
        name: Memory
"#};

const NODE_ALERTS: &str = indoc! {r#"
    groups:
      - name: node
        interval: 30s
        rules:
          - alert: NodeDown
            expr: up{job="node"} == 0
            for: 5m
"#};

#[test]
fn remote_project_exposes_only_project_dirs() -> Result<()> {
    let harness = Harness::new()?;
    let fixture = RepoFixture::new(harness.scratch.path().join("remote.git"), RepoKind::Bare)?;
    fixture.stage_and_commit("README.md", "# observability\n")?;
    fixture.stage_and_commit("dashboards/cpu.yaml", CPU_DASHBOARD)?;
    fixture.stage_and_commit("alerts/node.yaml", NODE_ALERTS)?;
    fixture.stage_and_commit("other/dashboards/ignored.yaml", MEMORY_DASHBOARD)?;

    harness
        .watch
        .create_project("shared", remote_git(fixture.url(), ""))?;

    let hydrated = harness.watch.get_project("shared")?;
    assert!(hydrated.project.status.errors.is_empty());
    assert_eq!(hydrated.dashboards.len(), 1);
    assert_eq!(hydrated.dashboards[0].spec.name, "CPU");
    assert_eq!(hydrated.alert_groups.len(), 1);

    let group = harness.watch.get_alert_group("shared", "node")?;
    assert_eq!(group.spec.rules[0].id, "NodeDown");
    assert!(matches!(
        group.status.origin,
        Some(AlertGroupOrigin::Discovered { .. })
    ));
    assert_eq!(harness.watch.remote().handle_count(), 1);

    Ok(())
}

#[test]
fn remote_project_rejects_mutations() -> Result<()> {
    let harness = Harness::new()?;
    let fixture = RepoFixture::new(harness.scratch.path().join("remote.git"), RepoKind::Bare)?;
    fixture.stage_and_commit("dashboards/cpu.yaml", CPU_DASHBOARD)?;
    fixture.stage_and_commit("alerts/node.yaml", NODE_ALERTS)?;
    harness
        .watch
        .create_project("shared", remote_git(fixture.url(), "main"))?;

    let err = harness
        .watch
        .create_dashboard(
            "shared",
            &DashboardSpec {
                name: "new".into(),
                ..DashboardSpec::default()
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.to_string().contains("read-only"));

    let err = harness
        .watch
        .delete_alert_group("shared", "node")
        .unwrap_err();
    assert!(err.to_string().contains("read-only"));

    Ok(())
}

#[test]
fn missing_remote_dir_is_reported_not_fatal() -> Result<()> {
    let harness = Harness::new()?;
    let fixture = RepoFixture::new(harness.scratch.path().join("remote.git"), RepoKind::Bare)?;
    fixture.stage_and_commit("dashboards/cpu.yaml", CPU_DASHBOARD)?;
    harness
        .watch
        .create_project("shared", remote_git(fixture.url(), ""))?;

    let hydrated = harness.watch.get_project("shared")?;
    assert_eq!(hydrated.dashboards.len(), 1);
    assert_eq!(hydrated.project.status.errors.len(), 1);
    assert!(hydrated.project.status.errors[0].contains("alert directory"));

    let err = harness.watch.get_alert_group("shared", "node").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.to_string().contains("does not exist"));

    Ok(())
}

#[test]
fn sync_picks_up_new_commits() -> Result<()> {
    let harness = Harness::new()?;
    let fixture = RepoFixture::new(harness.scratch.path().join("remote.git"), RepoKind::Bare)?;
    fixture.stage_and_commit("dashboards/cpu.yaml", CPU_DASHBOARD)?;
    fixture.stage_and_commit("alerts/node.yaml", NODE_ALERTS)?;
    harness
        .watch
        .create_project("shared", remote_git(fixture.url(), ""))?;

    let (dashboards, _) = harness.watch.list_dashboard("shared", None, 0)?;
    assert_eq!(dashboards.len(), 1);

    fixture.stage_and_commit("dashboards/memory.yaml", MEMORY_DASHBOARD)?;
    fixture.remove_and_commit("alerts/node.yaml")?;

    // Reads between syncs are served from the existing checkout.
    let (dashboards, _) = harness.watch.list_dashboard("shared", None, 0)?;
    assert_eq!(dashboards.len(), 1);

    harness.watch.sync_project("shared")?;
    let (dashboards, _) = harness.watch.list_dashboard("shared", None, 0)?;
    let mut names = dashboards
        .iter()
        .map(|dashboard| dashboard.spec.name.as_str())
        .collect::<Vec<_>>();
    names.sort_unstable();
    assert_eq!(names, vec!["CPU", "Memory"]);

    let hydrated = harness.watch.get_project("shared")?;
    assert!(hydrated.alert_groups.is_empty());
    assert_eq!(hydrated.project.status.errors.len(), 1);

    Ok(())
}

#[test]
fn remote_pointer_is_validated() -> Result<()> {
    let harness = Harness::new()?;

    let err = harness
        .watch
        .validate_project("shared", remote_git("", ""))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let mut pointer = remote_git("https://example.com/repo.git", "");
    if let humanlog_projects::model::ProjectPointer::RemoteGit(remote) = &mut pointer {
        remote.alert_dir = "../alerts".into();
    }
    let err = harness
        .watch
        .validate_project("shared", pointer)
        .unwrap_err();
    assert!(err.to_string().contains("relative path inside the repository"));

    Ok(())
}

#[test]
fn pinned_tag_ignores_later_commits() -> Result<()> {
    let harness = Harness::new()?;
    let fixture = RepoFixture::new(harness.scratch.path().join("upstream"), RepoKind::Normal)?;
    fixture.stage_and_commit("dashboards/cpu.yaml", CPU_DASHBOARD)?;
    fixture.stage_and_commit("alerts/node.yaml", NODE_ALERTS)?;
    fixture.tag("v1")?;
    fixture.stage_and_commit("dashboards/memory.yaml", MEMORY_DASHBOARD)?;

    harness
        .watch
        .create_project("pinned", remote_git(fixture.url(), "v1"))?;
    harness
        .watch
        .create_project("tracking", remote_git(fixture.url(), "main"))?;

    let (pinned, _) = harness.watch.list_dashboard("pinned", None, 0)?;
    assert_eq!(pinned.len(), 1);
    let (tracking, _) = harness.watch.list_dashboard("tracking", None, 0)?;
    assert_eq!(tracking.len(), 2);
    assert_eq!(harness.watch.remote().handle_count(), 2);

    harness.watch.sync_project("pinned")?;
    let (pinned, _) = harness.watch.list_dashboard("pinned", None, 0)?;
    assert_eq!(pinned.len(), 1);

    Ok(())
}
