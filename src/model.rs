// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Resource model.
//!
//! Projects, dashboards, alert groups, and alert rules as seen by callers of
//! [`Watch`](crate::watch::Watch). A file-backed dashboard or alert group is a
//! view over one file on disk. It is re-derived on every read and never
//! cached, so out-of-band edits show up on the next call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

/// Identity of a resource.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub id: String,
}

impl Meta {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// A named collection of dashboards and alert groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub meta: Meta,
    pub spec: ProjectSpec,
    pub status: ProjectStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub name: String,
    pub pointer: ProjectPointer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStatus {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ProjectStatus {
    pub fn stamped(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Where the contents of a project live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectPointer {
    /// Directory on the local machine.
    Localhost(LocalhostPointer),

    /// Sparse checkout of a remote git repository.
    RemoteGit(RemoteGitPointer),

    /// Not backed by any filesystem.
    Virtual(VirtualPointer),
}

impl ProjectPointer {
    /// Tag of the pointer, used to pick a backend.
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Localhost(_) => BackendKind::Localhost,
            Self::RemoteGit(_) => BackendKind::RemoteGit,
            Self::Virtual(_) => BackendKind::Virtual,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalhostPointer {
    pub path: PathBuf,
    pub dashboard_dir: PathBuf,
    pub alert_dir: PathBuf,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteGitPointer {
    pub url: String,
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    pub dashboard_dir: PathBuf,
    pub alert_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualPointer {
    pub uri: String,
}

/// Closed set of backends a pointer can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Localhost,
    RemoteGit,
    Virtual,
}

impl Display for BackendKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::Localhost => "localhost",
            Self::RemoteGit => "remote git",
            Self::Virtual => "virtual",
        })
    }
}

/// Project together with everything it contains.
#[derive(Debug, Clone, PartialEq)]
pub struct HydratedProject {
    pub project: Project,
    pub dashboards: Vec<Dashboard>,
    pub alert_groups: Vec<AlertGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub meta: Meta,
    pub spec: DashboardSpec,
    pub status: DashboardStatus,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSpec {
    pub name: String,
    pub description: String,
    pub is_readonly: bool,

    /// Canonical JSON of the dashboard document.
    pub perses_json: String,

    pub source: SourceFormat,
}

/// Encoding the dashboard was stored in.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Yaml,
    Json,
    #[default]
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStatus {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Provenance of file-backed dashboards. Ephemeral dashboards have none.
    pub origin: Option<DashboardOrigin>,

    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardOrigin {
    Managed { path: PathBuf },
    Generated { path: PathBuf, detection_reason: String },
}

impl DashboardOrigin {
    pub fn path(&self) -> &Path {
        match self {
            Self::Managed { path } | Self::Generated { path, .. } => path,
        }
    }

    pub fn is_managed(&self) -> bool {
        matches!(self, Self::Managed { .. })
    }
}

/// Fields that may change on a dashboard. Unset fields are left untouched.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DashboardUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_readonly: Option<bool>,
    pub perses_json: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertGroup {
    pub meta: Meta,
    pub spec: AlertGroupSpec,
    pub status: AlertGroupStatus,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertGroupSpec {
    pub name: String,
    pub interval: Option<PromDuration>,
    pub query_offset: Option<PromDuration>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub rules: Vec<NamedAlertRuleSpec>,
    #[serde(default)]
    pub is_readonly: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertGroupStatus {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub rules: Vec<NamedAlertRuleStatus>,

    /// Provenance of file-backed groups. Ephemeral groups have none.
    pub origin: Option<AlertGroupOrigin>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertGroupOrigin {
    Managed { path: PathBuf },
    Discovered { path: PathBuf },
    Generated { path: PathBuf, detection_reason: String },
}

impl AlertGroupOrigin {
    pub fn path(&self) -> &Path {
        match self {
            Self::Managed { path } | Self::Discovered { path } | Self::Generated { path, .. } => {
                path
            }
        }
    }

    pub fn is_managed(&self) -> bool {
        matches!(self, Self::Managed { .. })
    }
}

/// Change to an alert group.
///
/// `spec` replaces the contents of the group wholesale. The write lock is
/// controlled by `is_readonly` alone; `spec.is_readonly` is ignored.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AlertGroupUpdate {
    pub spec: Option<AlertGroupSpec>,
    pub is_readonly: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedAlertRuleSpec {
    pub id: String,
    pub spec: AlertRuleSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedAlertRuleStatus {
    pub id: String,
    pub status: AlertRuleStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub meta: Meta,
    pub spec: AlertRuleSpec,
    pub status: AlertRuleStatus,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRuleSpec {
    pub name: String,
    pub expr: Expr,
    pub for_duration: Option<PromDuration>,
    pub keep_firing_for: Option<PromDuration>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// Alert condition.
///
/// Keeps the text the user wrote next to the structured form produced by the
/// injected [`ExprParser`](crate::expr::ExprParser). `query` is empty when
/// the text failed to parse.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub text: String,
    pub query: Option<serde_json::Value>,
}

impl Expr {
    pub fn parsed(text: impl Into<String>, query: serde_json::Value) -> Self {
        Self {
            text: text.into(),
            query: Some(query),
        }
    }
}

/// Last known evaluation state of a rule.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRuleStatus {
    pub state: AlertState,
    pub transitioned_at: Option<DateTime<Utc>>,
    pub last_evaluated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    #[default]
    Unknown,
    Pending,
    Firing,
    Ok,
}

/// Duration in Prometheus notation, e.g., `1m`, `1h30m`, `500ms`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PromDuration(Duration);

impl PromDuration {
    pub fn new(duration: Duration) -> Self {
        Self(duration)
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

const DURATION_UNITS: [(&str, u128); 7] = [
    ("y", 365 * 24 * 60 * 60 * 1000),
    ("w", 7 * 24 * 60 * 60 * 1000),
    ("d", 24 * 60 * 60 * 1000),
    ("h", 60 * 60 * 1000),
    ("m", 60 * 1000),
    ("s", 1000),
    ("ms", 1),
];

impl FromStr for PromDuration {
    type Err = DurationError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let invalid = || DurationError(data.to_string());
        if data.is_empty() {
            return Err(invalid());
        }
        if data == "0" {
            return Ok(Self::default());
        }

        let mut millis: u128 = 0;
        let mut rest = data;
        // INVARIANT: Units must appear largest first, each at most once.
        let mut last_unit = None;
        while !rest.is_empty() {
            let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
            if digits == 0 {
                return Err(invalid());
            }
            let value: u128 = rest[..digits].parse().map_err(|_| invalid())?;
            rest = &rest[digits..];

            let unit_len = rest
                .bytes()
                .take_while(|byte| byte.is_ascii_alphabetic())
                .count();
            let unit = &rest[..unit_len];
            rest = &rest[unit_len..];

            let position = DURATION_UNITS
                .iter()
                .position(|(name, _)| *name == unit)
                .ok_or_else(invalid)?;
            if last_unit.is_some_and(|last| position <= last) {
                return Err(invalid());
            }
            last_unit = Some(position);
            millis = value
                .checked_mul(DURATION_UNITS[position].1)
                .and_then(|part| millis.checked_add(part))
                .ok_or_else(invalid)?;
        }

        let millis = u64::try_from(millis).map_err(|_| invalid())?;
        Ok(Self(Duration::from_millis(millis)))
    }
}

impl Display for PromDuration {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let mut millis = self.0.as_millis();
        if millis == 0 {
            return fmt.write_str("0s");
        }

        for (unit, size) in DURATION_UNITS {
            let count = millis / size;
            if count > 0 {
                write!(fmt, "{count}{unit}")?;
                millis %= size;
            }
        }

        Ok(())
    }
}

impl Serialize for PromDuration {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PromDuration {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Duration text is not in Prometheus notation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid duration {0:?}, expected something like \"1m\" or \"1h30m\"")]
pub struct DurationError(String);
