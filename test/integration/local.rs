// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{localhost, Harness};

use humanlog_projects::{
    model::{
        AlertGroupOrigin, AlertGroupSpec, AlertGroupUpdate, AlertRuleSpec, AlertRuleStatus,
        AlertState, DashboardSpec, DashboardUpdate, Expr, LocalhostPointer, NamedAlertRuleSpec,
        ProjectPointer,
    },
    AlertStatusStore, ErrorKind,
};

use anyhow::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::fs;

fn rule(name: &str, expr: &str) -> NamedAlertRuleSpec {
    NamedAlertRuleSpec {
        id: name.into(),
        spec: AlertRuleSpec {
            name: name.into(),
            expr: Expr {
                text: expr.into(),
                query: None,
            },
            ..AlertRuleSpec::default()
        },
    }
}

#[test]
fn created_alert_group_is_managed_file() -> Result<()> {
    let harness = Harness::new()?;
    let root = harness.local_dir("infra")?;
    harness.watch.create_project("infra", localhost(&root))?;

    let group = harness.watch.create_alert_group(
        "infra",
        &AlertGroupSpec {
            name: "cpu-alerts".into(),
            interval: Some("1m".parse()?),
            rules: vec![rule("HighCpu", "cpu_usage > 0.9")],
            ..AlertGroupSpec::default()
        },
    )?;
    assert!(!group.spec.is_readonly);
    assert_eq!(
        group.status.origin,
        Some(AlertGroupOrigin::Managed {
            path: root.join("alerts").join("cpu-alerts.yaml"),
        })
    );
    assert_eq!(group.status.rules.len(), 1);
    assert_eq!(group.status.rules[0].status.state, AlertState::Unknown);

    let contents = fs::read_to_string(root.join("alerts").join("cpu-alerts.yaml"))?;
    assert!(contents.starts_with("# managed-by: humanlog\n"));
    assert!(contents.contains("name: cpu-alerts"));
    assert!(contents.contains("interval: 1m"));
    assert!(contents.contains("alert: HighCpu"));

    let err = harness
        .watch
        .create_alert_group(
            "infra",
            &AlertGroupSpec {
                name: "cpu-alerts".into(),
                ..AlertGroupSpec::default()
            },
        )
        .unwrap_err();
    assert!(err.to_string().contains("already exists"));

    Ok(())
}

#[test]
fn discovered_alert_group_must_be_adopted() -> Result<()> {
    let harness = Harness::new()?;
    let root = harness.local_dir("infra")?;
    harness.watch.create_project("infra", localhost(&root))?;
    let file = root.join("alerts").join("external.yaml");
    fs::write(
        &file,
        indoc! {r#"
            groups:
              - name: external
                rules:
                  - alert: InstanceDown
                    expr: up == 0
                    for: 5m
        "#},
    )?;

    let group = harness.watch.get_alert_group("infra", "external")?;
    assert!(group.spec.is_readonly);
    assert_eq!(
        group.status.origin,
        Some(AlertGroupOrigin::Discovered { path: file.clone() })
    );

    let err = harness
        .watch
        .delete_alert_group("infra", "external")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.to_string().contains("readonly"));
    assert!(err.to_string().contains("generated"));
    assert!(file.exists());

    let adopted = harness.watch.update_alert_group(
        "infra",
        "external",
        &AlertGroupUpdate {
            spec: None,
            is_readonly: Some(false),
        },
    )?;
    assert!(!adopted.spec.is_readonly);
    assert!(adopted
        .status
        .origin
        .as_ref()
        .is_some_and(AlertGroupOrigin::is_managed));
    assert_eq!(adopted.spec.rules[0].id, "InstanceDown");

    let contents = fs::read_to_string(&file)?;
    assert!(contents.starts_with("# managed-by: humanlog\n# humanlog.is_readonly: false\n"));

    harness.watch.delete_alert_group("infra", "external")?;
    assert!(!file.exists());

    Ok(())
}

#[test]
fn dashboard_lock_round_trip() -> Result<()> {
    let harness = Harness::new()?;
    let root = harness.local_dir("infra")?;
    harness.watch.create_project("infra", localhost(&root))?;

    let dashboard = harness.watch.create_dashboard(
        "infra",
        &DashboardSpec {
            name: "CPU Overview".into(),
            ..DashboardSpec::default()
        },
    )?;
    let id = dashboard.meta.id.clone();
    let file = root.join("dashboards").join("CPU-Overview.yaml");
    assert!(file.exists());

    let lock = DashboardUpdate {
        is_readonly: Some(true),
        ..DashboardUpdate::default()
    };
    let locked = harness.watch.update_dashboard("infra", &id, &lock)?;
    assert!(locked.spec.is_readonly);
    assert!(fs::read_to_string(&file)?.contains("# humanlog.is_readonly: true"));

    let rename = DashboardUpdate {
        name: Some("CPU".into()),
        ..DashboardUpdate::default()
    };
    let err = harness.watch.update_dashboard("infra", &id, &rename).unwrap_err();
    assert!(err.to_string().contains("set is_readonly to false to unlock it"));
    let err = harness.watch.delete_dashboard("infra", &id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let unlock = DashboardUpdate {
        is_readonly: Some(false),
        ..DashboardUpdate::default()
    };
    let first = harness.watch.update_dashboard("infra", &id, &unlock)?;
    let second = harness.watch.update_dashboard("infra", &id, &unlock)?;
    assert_eq!(first.spec, second.spec);
    assert!(!second.spec.is_readonly);
    assert_eq!(second.meta.id, id);

    harness.watch.delete_dashboard("infra", &id)?;
    assert!(!file.exists());

    Ok(())
}

#[test]
fn corrupt_files_do_not_hide_healthy_ones() -> Result<()> {
    let harness = Harness::new()?;
    let root = harness.local_dir("infra")?;
    harness.watch.create_project("infra", localhost(&root))?;
    fs::write(
        root.join("dashboards").join("healthy.yaml"),
        indoc! {r#"
            # managed-by: humanlog
            kind: Dashboard
            metadata:
              name: healthy
              project: infra
            spec:
              display:
                name: Healthy
        "#},
    )?;
    fs::write(root.join("dashboards").join("broken.json"), "{ this is not json")?;
    fs::write(root.join("alerts").join("broken.yaml"), "groups: [")?;

    let hydrated = harness.watch.get_project("infra")?;
    assert!(hydrated.project.status.errors.is_empty());
    assert_eq!(hydrated.dashboards.len(), 2);
    let healthy = hydrated
        .dashboards
        .iter()
        .find(|dashboard| dashboard.status.errors.is_empty())
        .map(|dashboard| dashboard.spec.name.as_str());
    assert_eq!(healthy, Some("Healthy"));
    assert_eq!(
        hydrated
            .dashboards
            .iter()
            .filter(|dashboard| !dashboard.status.errors.is_empty())
            .count(),
        1
    );
    assert_eq!(hydrated.alert_groups.len(), 1);
    assert!(!hydrated.alert_groups[0].status.errors.is_empty());

    Ok(())
}

#[test]
fn read_only_pointer_blocks_writes() -> Result<()> {
    let harness = Harness::new()?;
    let root = harness.local_dir("infra")?;
    let pointer = ProjectPointer::Localhost(LocalhostPointer {
        path: root.clone(),
        dashboard_dir: "dashboards".into(),
        alert_dir: "alerts".into(),
        read_only: true,
    });
    harness.watch.create_project("infra", pointer)?;

    let err = harness
        .watch
        .create_dashboard(
            "infra",
            &DashboardSpec {
                name: "cpu".into(),
                ..DashboardSpec::default()
            },
        )
        .unwrap_err();
    assert!(err.to_string().contains("read_only = true"));
    assert!(fs::read_dir(root.join("dashboards"))?.next().is_none());

    Ok(())
}

#[test]
fn rule_status_follows_group_lifecycle() -> Result<()> {
    let harness = Harness::new()?;
    let root = harness.local_dir("infra")?;
    harness.watch.create_project("infra", localhost(&root))?;
    harness.watch.create_alert_group(
        "infra",
        &AlertGroupSpec {
            name: "node".into(),
            rules: vec![rule("NodeDown", "up == 0")],
            ..AlertGroupSpec::default()
        },
    )?;

    harness.alerts.alert_update_state(
        "infra",
        "node",
        "NodeDown",
        AlertRuleStatus {
            state: AlertState::Firing,
            ..AlertRuleStatus::default()
        },
    )?;
    let fetched = harness.watch.get_alert_rule("infra", "node", "NodeDown")?;
    assert_eq!(fetched.status.state, AlertState::Firing);
    assert_eq!(fetched.spec.expr.text, "up == 0");

    let renamed = harness.watch.update_alert_group(
        "infra",
        "node",
        &AlertGroupUpdate {
            spec: Some(AlertGroupSpec {
                name: "nodes".into(),
                rules: vec![rule("NodeDown", "up == 0")],
                ..AlertGroupSpec::default()
            }),
            is_readonly: None,
        },
    )?;
    assert_eq!(renamed.spec.name, "nodes");
    assert_eq!(renamed.status.rules[0].status.state, AlertState::Unknown);
    assert_eq!(harness.alerts.len(), 1);

    let err = harness.watch.get_alert_group("infra", "node").unwrap_err();
    assert!(err.to_string().contains("not found"));

    Ok(())
}

#[test]
fn generated_files_stay_untouched_until_adopted() -> Result<()> {
    let harness = Harness::new()?;
    let root = harness.local_dir("infra")?;
    harness.watch.create_project("infra", localhost(&root))?;
    let dashboard_file = root.join("dashboards").join("mixin.yaml");
    let group_file = root.join("alerts").join("mixin.yaml");
    fs::write(
        &dashboard_file,
        indoc! {r#"
            # Generated by jsonnet
            kind: Dashboard
            metadata:
              name: mixin
            spec:
              display:
                name: Mixin
        "#},
    )?;
    fs::write(
        &group_file,
        indoc! {r#"
            # Generated by jsonnet
            groups:
              - name: mixin
                rules:
                  - alert: NodeDown
                    expr: up == 0
        "#},
    )?;
    let dashboard_bytes = fs::read(&dashboard_file)?;
    let group_bytes = fs::read(&group_file)?;

    let (dashboards, _) = harness.watch.list_dashboard("infra", None, 0)?;
    assert_eq!(dashboards.len(), 1);
    assert!(dashboards[0].spec.is_readonly);
    let id = dashboards[0].meta.id.clone();

    let rename = DashboardUpdate {
        name: Some("Renamed".into()),
        ..DashboardUpdate::default()
    };
    let err = harness.watch.update_dashboard("infra", &id, &rename).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.to_string().contains("generated"));
    let err = harness.watch.delete_dashboard("infra", &id).unwrap_err();
    assert!(err.to_string().contains("generated"));

    let regroup = AlertGroupUpdate {
        spec: Some(AlertGroupSpec {
            name: "mixin".into(),
            rules: vec![rule("NodeDown", "up == 1")],
            ..AlertGroupSpec::default()
        }),
        is_readonly: None,
    };
    let err = harness
        .watch
        .update_alert_group("infra", "mixin", &regroup)
        .unwrap_err();
    assert!(err.to_string().contains("generated"));
    let err = harness
        .watch
        .delete_alert_group("infra", "mixin")
        .unwrap_err();
    assert!(err.to_string().contains("generated"));
    let err = harness
        .watch
        .create_alert_rule("infra", "mixin", &rule("DiskFull", "disk > 0.9").spec)
        .unwrap_err();
    assert!(err.to_string().contains("generated"));

    assert_eq!(fs::read(&dashboard_file)?, dashboard_bytes);
    assert_eq!(fs::read(&group_file)?, group_bytes);

    let adopt = DashboardUpdate {
        is_readonly: Some(false),
        ..DashboardUpdate::default()
    };
    let adopted = harness.watch.update_dashboard("infra", &id, &adopt)?;
    assert!(!adopted.spec.is_readonly);
    assert!(fs::read_to_string(&dashboard_file)?.starts_with("# managed-by: humanlog\n"));
    let again = harness.watch.update_dashboard("infra", &id, &adopt)?;
    assert_eq!(adopted.spec, again.spec);
    harness.watch.delete_dashboard("infra", &id)?;
    assert!(!dashboard_file.exists());

    let adopted = harness.watch.update_alert_group(
        "infra",
        "mixin",
        &AlertGroupUpdate {
            spec: None,
            is_readonly: Some(false),
        },
    )?;
    assert!(!adopted.spec.is_readonly);
    assert!(fs::read_to_string(&group_file)?.starts_with("# managed-by: humanlog\n"));
    harness.watch.delete_alert_group("infra", "mixin")?;
    assert!(!group_file.exists());

    Ok(())
}
