// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Dashboard and alert group files.
//!
//! Reading, writing, and lifecycle rules for resources that live as files in
//! a [`FileTree`]. Both the localhost and the remote git backend read through
//! here; only the localhost backend ever writes.
//!
//! # Lifecycle
//!
//! Every file is classified by [`provenance::detect`] each time it is read.
//! Writes must pass [`check_writable`]:
//!
//! - Writable files can be changed freely.
//! - Locked managed files can only be changed by a request that unlocks them.
//! - Generated and discovered files are locked until a request adopts them by
//!   setting `is_readonly` to false. Adopted files are rewritten with the
//!   managed header, so they stay managed from then on.

use crate::{
    error::{Context, Error, Result},
    expr::ExprParser,
    id::{dashboard_id, is_valid_slug},
    model::{
        AlertGroup, AlertGroupOrigin, AlertGroupSpec, AlertGroupStatus, AlertGroupUpdate,
        AlertRule, AlertRuleSpec, AlertRuleStatus, Dashboard, DashboardOrigin, DashboardSpec,
        DashboardStatus, DashboardUpdate, Expr, Meta, NamedAlertRuleSpec, Project, PromDuration,
        SourceFormat,
    },
    provenance::{self, managed_header, strip_header, Origin, Provenance, ResourceKind},
    tree::FileTree,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// View over the dashboard and alert group files of one project.
pub(crate) struct ProjectFiles<'a, T> {
    pub project: &'a str,
    pub tree: T,

    /// Prefix for paths reported in resource origins.
    pub root: &'a Path,

    pub dashboard_dir: &'a Path,
    pub alert_dir: &'a Path,
    pub parser: &'a dyn ExprParser,
    pub now: DateTime<Utc>,
}

/// Dashboard together with the file it came from.
struct DashboardFile {
    dashboard: Dashboard,
    path: PathBuf,
    format: SourceFormat,
    provenance: Provenance,
    document: Option<Value>,
}

/// Alert group together with the file it came from.
struct AlertGroupFile {
    group: AlertGroup,
    path: PathBuf,
    index: usize,
    provenance: Provenance,
    contents: String,
}

impl<T> ProjectFiles<'_, T>
where
    T: FileTree,
{
    /// Read every dashboard and alert group into `project`.
    ///
    /// Never fails because of a single bad file or a missing directory. Those
    /// are reported through item and project errors instead.
    pub fn hydrate(&self, project: &mut Project) -> (Vec<Dashboard>, Vec<AlertGroup>) {
        let dashboards = match self.load_dashboards() {
            Ok(files) => files.into_iter().map(|file| file.dashboard).collect(),
            Err(err) => {
                project.status.errors.push(err.to_string());
                Vec::new()
            }
        };

        let alert_groups = match self.load_alert_groups() {
            Ok(files) => files.into_iter().map(|file| file.group).collect(),
            Err(err) => {
                project.status.errors.push(err.to_string());
                Vec::new()
            }
        };

        (dashboards, alert_groups)
    }

    pub fn list_dashboards(&self) -> Result<Vec<Dashboard>> {
        Ok(self
            .load_dashboards()?
            .into_iter()
            .map(|file| file.dashboard)
            .collect())
    }

    pub fn get_dashboard(&self, id: &str) -> Result<Dashboard> {
        Ok(self.find_dashboard(id)?.dashboard)
    }

    pub fn list_alert_groups(&self) -> Result<Vec<AlertGroup>> {
        Ok(self
            .load_alert_groups()?
            .into_iter()
            .map(|file| file.group)
            .collect())
    }

    pub fn get_alert_group(&self, name: &str) -> Result<AlertGroup> {
        Ok(self.find_alert_group(name)?.group)
    }

    pub fn get_alert_rule(&self, group: &str, rule: &str) -> Result<AlertRule> {
        let group = self.get_alert_group(group)?;
        alert_rule_of(self.project, &group, rule)
    }

    /// Write new managed dashboard.
    pub fn create_dashboard(&mut self, spec: &DashboardSpec) -> Result<Dashboard> {
        self.require_dir("dashboard", self.dashboard_dir)?;

        let (slug, document) = new_dashboard_document(self.project, spec)?;
        if self.slug_taken(self.dashboard_dir, &slug) {
            return Err(Error::invalid(format!(
                "dashboard {slug:?} already exists in project {:?}",
                self.project
            )));
        }

        let path = self.dashboard_dir.join(format!("{slug}.yaml"));
        let header = managed_header(spec.is_readonly, spec.is_readonly);
        let contents = render_dashboard(&header, &document, SourceFormat::Yaml)?;
        self.write(&path, &contents)?;
        info!("created dashboard {slug:?} in project {:?}", self.project);

        Ok(self.dashboard_from(&path, &contents, SourceFormat::Yaml).dashboard)
    }

    /// Apply update to dashboard, adopting it if asked to.
    pub fn update_dashboard(&mut self, id: &str, update: &DashboardUpdate) -> Result<Dashboard> {
        let file = self.find_dashboard(id)?;
        let what = format!("dashboard {:?}", display_name(&file.dashboard.spec.name, id));
        check_writable(&what, &file.provenance, update.is_readonly)?;

        let Some(current) = file.document else {
            return Err(Error::invalid(format!(
                "{what} cannot be updated because its file is invalid: {}",
                file.dashboard.status.errors.join("; ")
            )));
        };

        let mut document = match &update.perses_json {
            Some(json) => parse_perses_json(json)?,
            None => current.clone(),
        };

        // INVARIANT: Identity of a dashboard never changes through an update.
        for key in ["kind", "metadata"] {
            if let Some(value) = current.get(key) {
                set_at(&mut document, &[key], value.clone());
            }
        }
        let name = update
            .name
            .clone()
            .unwrap_or_else(|| file.dashboard.spec.name.clone());
        let description = update
            .description
            .clone()
            .unwrap_or_else(|| file.dashboard.spec.description.clone());
        set_at(&mut document, &["spec", "display", "name"], Value::String(name));
        set_at(
            &mut document,
            &["spec", "display", "description"],
            Value::String(description),
        );

        let is_readonly = update.is_readonly.unwrap_or(file.provenance.is_readonly);
        if !file.provenance.is_managed() {
            info!("adopting {what} at {:?}", file.path.display());
        }

        let header = managed_header(is_readonly, update.is_readonly.is_some());
        let contents = render_dashboard(&header, &document, file.format)?;
        self.write(&file.path, &contents)?;

        Ok(self.dashboard_from(&file.path, &contents, file.format).dashboard)
    }

    pub fn delete_dashboard(&mut self, id: &str) -> Result<()> {
        let file = self.find_dashboard(id)?;
        let what = format!("dashboard {:?}", display_name(&file.dashboard.spec.name, id));
        check_writable(&what, &file.provenance, None)?;

        self.remove(&file.path)?;
        info!("deleted {what} from project {:?}", self.project);

        Ok(())
    }

    /// Write new managed alert group file holding a single group.
    pub fn create_alert_group(&mut self, spec: &AlertGroupSpec) -> Result<AlertGroup> {
        self.require_dir("alert", self.alert_dir)?;
        if !is_valid_slug(&spec.name) {
            return Err(Error::invalid(format!(
                "alert group name {:?} cannot be used as a file name, only letters, digits, '-', and '_' are allowed",
                spec.name
            )));
        }
        validate_rules(&spec.rules)?;

        let exists = self
            .load_alert_groups()?
            .iter()
            .any(|file| file.group.spec.name == spec.name);
        if exists || self.slug_taken(self.alert_dir, &spec.name) {
            return Err(Error::invalid(format!(
                "alert group {:?} already exists in project {:?}",
                spec.name, self.project
            )));
        }

        let path = self.alert_dir.join(format!("{}.yaml", spec.name));
        let header = managed_header(spec.is_readonly, spec.is_readonly);
        let rule_file = RuleFile {
            groups: vec![RuleGroupDoc::from(spec)],
        };
        let contents = render_rule_file(&header, &rule_file)?;
        self.write(&path, &contents)?;
        info!("created alert group {:?} in project {:?}", spec.name, self.project);

        self.find_alert_group(&spec.name).map(|file| file.group)
    }

    /// Apply update to alert group, adopting its file if asked to.
    pub fn update_alert_group(&mut self, name: &str, update: &AlertGroupUpdate) -> Result<AlertGroup> {
        let file = self.find_alert_group(name)?;
        let what = format!("alert group {name:?}");
        check_writable(&what, &file.provenance, update.is_readonly)?;

        let mut rule_file = parse_rule_file(strip_header(&file.contents))
            .map_err(|err| Error::invalid(format!("{what} cannot be updated: {err}")))?;

        let new_name = match &update.spec {
            Some(spec) => {
                if spec.name != name {
                    if !is_valid_slug(&spec.name) {
                        return Err(Error::invalid(format!(
                            "alert group name {:?} is invalid, only letters, digits, '-', and '_' are allowed",
                            spec.name
                        )));
                    }
                    let taken = self
                        .load_alert_groups()?
                        .iter()
                        .any(|other| other.group.spec.name == spec.name);
                    if taken {
                        return Err(Error::invalid(format!(
                            "alert group {:?} already exists in project {:?}",
                            spec.name, self.project
                        )));
                    }
                }
                validate_rules(&spec.rules)?;

                // INVARIANT: Recording rules are not modeled, carry them over untouched.
                let mut doc = RuleGroupDoc::from(spec);
                doc.rules.extend(
                    rule_file.groups[file.index]
                        .rules
                        .iter()
                        .filter(|rule| rule.alert.is_none())
                        .cloned(),
                );
                rule_file.groups[file.index] = doc;
                spec.name.clone()
            }
            None => name.to_string(),
        };

        let is_readonly = update.is_readonly.unwrap_or(file.provenance.is_readonly);
        if !file.provenance.is_managed() {
            info!("adopting {what} at {:?}", file.path.display());
        }

        let header = managed_header(is_readonly, update.is_readonly.is_some());
        let contents = render_rule_file(&header, &rule_file)?;
        self.write(&file.path, &contents)?;

        self.find_alert_group(&new_name).map(|file| file.group)
    }

    /// Remove alert group, deleting its file once no groups are left in it.
    pub fn delete_alert_group(&mut self, name: &str) -> Result<()> {
        let file = self.find_alert_group(name)?;
        check_writable(&format!("alert group {name:?}"), &file.provenance, None)?;

        let mut rule_file = parse_rule_file(strip_header(&file.contents))
            .map_err(|err| Error::invalid(format!("alert group {name:?} cannot be deleted: {err}")))?;
        rule_file.groups.remove(file.index);

        if rule_file.groups.is_empty() {
            self.remove(&file.path)?;
        } else {
            let header = leading_header(&file.contents);
            let contents = render_rule_file(header, &rule_file)?;
            self.write(&file.path, &contents)?;
        }
        info!("deleted alert group {name:?} from project {:?}", self.project);

        Ok(())
    }

    fn find_dashboard(&self, id: &str) -> Result<DashboardFile> {
        self.load_dashboards()?
            .into_iter()
            .find(|file| file.dashboard.meta.id == id)
            .ok_or_else(|| {
                Error::ResourceNotFound(format!(
                    "dashboard {id:?} not found in project {:?}",
                    self.project
                ))
            })
    }

    fn find_alert_group(&self, name: &str) -> Result<AlertGroupFile> {
        self.load_alert_groups()?
            .into_iter()
            .find(|file| !file.group.spec.name.is_empty() && file.group.spec.name == name)
            .ok_or_else(|| {
                Error::ResourceNotFound(format!(
                    "alert group {name:?} not found in project {:?}",
                    self.project
                ))
            })
    }

    fn load_dashboards(&self) -> Result<Vec<DashboardFile>> {
        let files = self.resource_files("dashboard", self.dashboard_dir)?;
        let mut dashboards = Vec::with_capacity(files.len());
        for (path, format) in files {
            let dashboard = match self.tree.read(&path) {
                Ok(contents) => self.dashboard_from(&path, &contents, format),
                Err(err) => self.broken_dashboard(&path, format, &err),
            };
            dashboards.push(dashboard);
        }

        Ok(dashboards)
    }

    fn load_alert_groups(&self) -> Result<Vec<AlertGroupFile>> {
        let files = self.resource_files("alert", self.alert_dir)?;
        let mut groups = Vec::new();
        for (path, _) in files {
            match self.tree.read(&path) {
                Ok(contents) => groups.extend(self.alert_groups_from(&path, contents)),
                Err(err) => groups.push(self.broken_alert_group(&path, String::new(), err.to_string())),
            }
        }

        Ok(groups)
    }

    /// List resource files of a directory, ignoring subdirectories and
    /// unknown extensions.
    fn resource_files(&self, what: &'static str, dir: &Path) -> Result<Vec<(PathBuf, SourceFormat)>> {
        self.require_dir(what, dir)?;
        let entries = self
            .tree
            .read_dir(dir)
            .context(|| format!("listing {what} directory {:?}", dir.display()))?;

        Ok(entries
            .into_iter()
            .filter(|entry| !entry.is_dir)
            .filter_map(|entry| {
                let path = dir.join(&entry.name);
                match source_format(&path) {
                    Some(format) => Some((path, format)),
                    None => {
                        debug!("skipping {:?}, not a yaml or json file", path.display());
                        None
                    }
                }
            })
            .collect())
    }

    fn dashboard_from(&self, path: &Path, contents: &str, format: SourceFormat) -> DashboardFile {
        let provenance = provenance::detect(contents, ResourceKind::Dashboard);
        let document = match decode_document(strip_header(contents), format) {
            Ok(document) => document,
            Err(err) => return self.broken_dashboard(path, format, &err),
        };

        let parsed = (|| -> std::result::Result<_, String> {
            if str_at(&document, &["kind"]) != Some("Dashboard") {
                return Err("expected top-level \"kind: Dashboard\"".into());
            }
            let slug = str_at(&document, &["metadata", "name"])
                .filter(|slug| !slug.is_empty())
                .ok_or("missing \"metadata.name\"")?;
            let perses_project = str_at(&document, &["metadata", "project"]).unwrap_or_default();
            let name = str_at(&document, &["spec", "display", "name"]).unwrap_or(slug);
            let description =
                str_at(&document, &["spec", "display", "description"]).unwrap_or_default();
            let json = serde_json::to_string(&document).map_err(|err| err.to_string())?;

            Ok((
                dashboard_id(self.project, perses_project, slug),
                name.to_string(),
                description.to_string(),
                json,
            ))
        })();

        let (id, name, description, perses_json) = match parsed {
            Ok(parsed) => parsed,
            Err(err) => {
                let err = format!("invalid dashboard {:?}: {err}", path.display());
                return self.broken_dashboard(path, format, &err);
            }
        };

        DashboardFile {
            dashboard: Dashboard {
                meta: Meta::new(id),
                spec: DashboardSpec {
                    name,
                    description,
                    is_readonly: provenance.is_readonly,
                    perses_json,
                    source: format,
                },
                status: DashboardStatus {
                    created_at: self.now,
                    updated_at: self.now,
                    origin: Some(dashboard_origin(self.root.join(path), &provenance)),
                    errors: Vec::new(),
                },
            },
            path: path.to_path_buf(),
            format,
            provenance,
            document: Some(document),
        }
    }

    fn broken_dashboard(&self, path: &Path, format: SourceFormat, err: &dyn std::fmt::Display) -> DashboardFile {
        // INVARIANT: Broken files still get a stable identifier derived from their file name.
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let contents = self.tree.read(path).unwrap_or_default();
        let provenance = provenance::detect(&contents, ResourceKind::Dashboard);

        DashboardFile {
            dashboard: Dashboard {
                meta: Meta::new(dashboard_id(self.project, "", &stem)),
                spec: DashboardSpec {
                    is_readonly: provenance.is_readonly,
                    source: format,
                    ..DashboardSpec::default()
                },
                status: DashboardStatus {
                    created_at: self.now,
                    updated_at: self.now,
                    origin: Some(dashboard_origin(self.root.join(path), &provenance)),
                    errors: vec![err.to_string()],
                },
            },
            path: path.to_path_buf(),
            format,
            provenance,
            document: None,
        }
    }

    fn alert_groups_from(&self, path: &Path, contents: String) -> Vec<AlertGroupFile> {
        let rule_file = match parse_rule_file(strip_header(&contents)) {
            Ok(rule_file) => rule_file,
            Err(err) => {
                let err = format!("invalid alert group file {:?}: {err}", path.display());
                return vec![self.broken_alert_group(path, contents, err)];
            }
        };

        let provenance = provenance::detect(&contents, ResourceKind::AlertGroup);
        let origin = alert_group_origin(self.root.join(path), &provenance);
        rule_file
            .groups
            .into_iter()
            .enumerate()
            .map(|(index, doc)| {
                let (spec, errors) = doc.into_spec(self.parser, provenance.is_readonly);
                AlertGroupFile {
                    group: AlertGroup {
                        meta: Meta::new(spec.name.clone()),
                        spec,
                        status: AlertGroupStatus {
                            created_at: self.now,
                            updated_at: self.now,
                            errors,
                            rules: Vec::new(),
                            origin: Some(origin.clone()),
                        },
                    },
                    path: path.to_path_buf(),
                    index,
                    provenance: provenance.clone(),
                    contents: contents.clone(),
                }
            })
            .collect()
    }

    fn broken_alert_group(&self, path: &Path, contents: String, err: String) -> AlertGroupFile {
        let provenance = provenance::detect(&contents, ResourceKind::AlertGroup);
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        AlertGroupFile {
            group: AlertGroup {
                meta: Meta::new(file_name),
                spec: AlertGroupSpec {
                    is_readonly: provenance.is_readonly,
                    ..AlertGroupSpec::default()
                },
                status: AlertGroupStatus {
                    created_at: self.now,
                    updated_at: self.now,
                    errors: vec![err],
                    rules: Vec::new(),
                    origin: Some(alert_group_origin(self.root.join(path), &provenance)),
                },
            },
            path: path.to_path_buf(),
            index: 0,
            provenance,
            contents,
        }
    }

    fn require_dir(&self, what: &'static str, dir: &Path) -> Result<()> {
        if self.tree.is_dir(dir) {
            return Ok(());
        }
        Err(self.missing_dir(what, dir))
    }

    fn missing_dir(&self, what: &'static str, dir: &Path) -> Error {
        Error::MissingDirectory {
            project: self.project.to_string(),
            what,
            path: self.root.join(dir),
        }
    }

    fn slug_taken(&self, dir: &Path, slug: &str) -> bool {
        ["yaml", "yml", "json"]
            .iter()
            .any(|ext| self.tree.is_file(&dir.join(format!("{slug}.{ext}"))))
    }

    fn write(&mut self, path: &Path, contents: &str) -> Result<()> {
        self.tree
            .write(path, contents)
            .context(|| format!("writing {:?}", self.root.join(path).display()))
    }

    fn remove(&mut self, path: &Path) -> Result<()> {
        self.tree
            .remove(path)
            .context(|| format!("removing {:?}", self.root.join(path).display()))
    }
}

/// Refuse to write to a locked resource unless the request unlocks it.
///
/// Generated and discovered resources have never been adopted, and say so
/// with the word "generated". Locked managed resources say "readonly".
pub(crate) fn check_writable(what: &str, provenance: &Provenance, unlock: Option<bool>) -> Result<()> {
    if !provenance.is_readonly || unlock == Some(false) {
        return Ok(());
    }

    let message = match &provenance.origin {
        Origin::Managed => format!("{what} is readonly, set is_readonly to false to unlock it"),
        Origin::Generated { reason } => format!(
            "{what} is readonly because it was generated outside of humanlog ({}), set is_readonly to false to adopt it",
            reason.replace('\n', "; ")
        ),
        Origin::Discovered => format!(
            "{what} is readonly because it was discovered outside of humanlog and is treated as generated until adopted, set is_readonly to false to adopt it"
        ),
    };

    Err(Error::Permission(message))
}

/// Shape the document of a new dashboard, returning it with its slug.
///
/// The slug is `metadata.name` of the document when set, or the display name
/// with whitespace turned into dashes.
pub(crate) fn new_dashboard_document(project: &str, spec: &DashboardSpec) -> Result<(String, Value)> {
    let mut document = parse_perses_json(&spec.perses_json)?;
    let slug = match str_at(&document, &["metadata", "name"]) {
        Some(slug) if !slug.is_empty() => slug.to_string(),
        _ => slugify(&spec.name),
    };
    if !is_valid_slug(&slug) {
        return Err(Error::invalid(format!(
            "dashboard name {slug:?} cannot be used as a file name, only letters, digits, '-', and '_' are allowed"
        )));
    }

    set_at(&mut document, &["kind"], Value::String("Dashboard".into()));
    set_at(&mut document, &["metadata", "name"], Value::String(slug.clone()));
    set_at(
        &mut document,
        &["metadata", "project"],
        Value::String(project.into()),
    );
    set_at(
        &mut document,
        &["spec", "display", "name"],
        Value::String(spec.name.clone()),
    );
    set_at(
        &mut document,
        &["spec", "display", "description"],
        Value::String(spec.description.clone()),
    );

    Ok((slug, document))
}

/// Look up rule of group, attaching default status.
pub(crate) fn alert_rule_of(project: &str, group: &AlertGroup, rule: &str) -> Result<AlertRule> {
    group
        .spec
        .rules
        .iter()
        .find(|named| named.id == rule)
        .map(|named| AlertRule {
            meta: Meta::new(named.id.clone()),
            spec: named.spec.clone(),
            status: AlertRuleStatus::default(),
        })
        .ok_or_else(|| {
            Error::ResourceNotFound(format!(
                "alert rule {rule:?} not found in alert group {:?} of project {project:?}",
                group.spec.name
            ))
        })
}

/// Make sure rules of a group can be told apart.
pub(crate) fn validate_rules(rules: &[NamedAlertRuleSpec]) -> Result<()> {
    let mut seen = Vec::with_capacity(rules.len());
    for rule in rules {
        if rule.id.is_empty() {
            return Err(Error::invalid("alert rule name must not be empty"));
        }
        if rule.spec.name != rule.id {
            return Err(Error::invalid(format!(
                "alert rule id {:?} does not match its name {:?}",
                rule.id, rule.spec.name
            )));
        }
        if seen.contains(&rule.id.as_str()) {
            return Err(Error::invalid(format!(
                "alert rule {:?} is defined more than once",
                rule.id
            )));
        }
        seen.push(rule.id.as_str());
    }

    Ok(())
}

fn dashboard_origin(path: PathBuf, provenance: &Provenance) -> DashboardOrigin {
    match &provenance.origin {
        Origin::Managed => DashboardOrigin::Managed { path },
        Origin::Generated { reason } => DashboardOrigin::Generated {
            path,
            detection_reason: reason.clone(),
        },
        // INVARIANT: Dashboards are never classified as discovered.
        Origin::Discovered => DashboardOrigin::Generated {
            path,
            detection_reason: provenance::NO_MARKERS_REASON.into(),
        },
    }
}

fn alert_group_origin(path: PathBuf, provenance: &Provenance) -> AlertGroupOrigin {
    match &provenance.origin {
        Origin::Managed => AlertGroupOrigin::Managed { path },
        Origin::Generated { reason } => AlertGroupOrigin::Generated {
            path,
            detection_reason: reason.clone(),
        },
        Origin::Discovered => AlertGroupOrigin::Discovered { path },
    }
}

fn display_name<'a>(name: &'a str, id: &'a str) -> &'a str {
    if name.is_empty() {
        id
    } else {
        name
    }
}

fn source_format(path: &Path) -> Option<SourceFormat> {
    match path.extension()?.to_str()? {
        "yaml" | "yml" => Some(SourceFormat::Yaml),
        "json" => Some(SourceFormat::Json),
        _ => None,
    }
}

pub(crate) fn slugify(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("-")
}

fn decode_document(body: &str, format: SourceFormat) -> std::result::Result<Value, String> {
    let document: Value = match format {
        SourceFormat::Json => serde_json::from_str(body).map_err(|err| err.to_string())?,
        SourceFormat::Yaml | SourceFormat::Memory => {
            serde_yaml::from_str(body).map_err(|err| err.to_string())?
        }
    };
    if !document.is_object() {
        return Err("expected a mapping at the top level".into());
    }

    Ok(document)
}

pub(crate) fn parse_perses_json(json: &str) -> Result<Value> {
    if json.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    let document: Value = serde_json::from_str(json)
        .map_err(|err| Error::invalid(format!("invalid perses json: {err}")))?;
    if !document.is_object() {
        return Err(Error::invalid("invalid perses json: expected an object"));
    }

    Ok(document)
}

fn render_dashboard(header: &str, document: &Value, format: SourceFormat) -> Result<String> {
    let body = match format {
        SourceFormat::Json => serde_json::to_string_pretty(document)
            .map(|json| json + "\n")
            .context(|| "encoding dashboard as json".into())?,
        SourceFormat::Yaml | SourceFormat::Memory => {
            serde_yaml::to_string(document).context(|| "encoding dashboard as yaml".into())?
        }
    };

    Ok(format!("{header}{body}"))
}

fn render_rule_file(header: &str, rule_file: &RuleFile) -> Result<String> {
    let body = serde_yaml::to_string(rule_file).context(|| "encoding alert groups as yaml".into())?;
    Ok(format!("{header}{body}"))
}

/// Leading comment block of a file, verbatim.
fn leading_header(contents: &str) -> &str {
    let body = strip_header(contents);
    &contents[..contents.len() - body.len()]
}

pub(crate) fn str_at<'v>(document: &'v Value, path: &[&str]) -> Option<&'v str> {
    path.iter()
        .try_fold(document, |value, key| value.get(key))
        .and_then(Value::as_str)
}

pub(crate) fn set_at(document: &mut Value, path: &[&str], value: Value) {
    let mut current = document;
    for key in path {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map.entry(key.to_string()).or_insert(Value::Null),
            _ => return,
        };
    }
    *current = value;
}

/// Prometheus compatible rule file.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RuleFile {
    #[serde(default)]
    pub groups: Vec<RuleGroupDoc>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RuleGroupDoc {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<PromDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_offset: Option<PromDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub rules: Vec<RuleDoc>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RuleDoc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,
    pub expr: String,
    #[serde(rename = "for", default, skip_serializing_if = "Option::is_none")]
    pub for_duration: Option<PromDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_firing_for: Option<PromDuration>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

fn parse_rule_file(body: &str) -> std::result::Result<RuleFile, serde_yaml::Error> {
    if body.trim().is_empty() {
        return Ok(RuleFile::default());
    }
    serde_yaml::from_str(body)
}

impl RuleGroupDoc {
    /// Convert to group spec, parsing every rule expression.
    ///
    /// Rules that cannot be understood are reported as errors of the group
    /// instead of failing the whole file.
    fn into_spec(self, parser: &dyn ExprParser, is_readonly: bool) -> (AlertGroupSpec, Vec<String>) {
        let mut errors = Vec::new();
        let mut rules = Vec::with_capacity(self.rules.len());
        for (position, rule) in self.rules.into_iter().enumerate() {
            let Some(alert) = rule.alert.filter(|alert| !alert.is_empty()) else {
                errors.push(match rule.record {
                    Some(record) => format!("recording rule {record:?} is not supported"),
                    None => format!("rule #{} has no alert name", position + 1),
                });
                continue;
            };

            let query = match parser.parse(&rule.expr) {
                Ok(query) => Some(query),
                Err(err) => {
                    errors.push(format!("rule {alert:?}: invalid expression: {err}"));
                    None
                }
            };

            rules.push(NamedAlertRuleSpec {
                id: alert.clone(),
                spec: AlertRuleSpec {
                    name: alert,
                    expr: Expr {
                        text: rule.expr,
                        query,
                    },
                    for_duration: rule.for_duration,
                    keep_firing_for: rule.keep_firing_for,
                    labels: rule.labels,
                    annotations: rule.annotations,
                },
            });
        }

        let spec = AlertGroupSpec {
            name: self.name,
            interval: self.interval,
            query_offset: self.query_offset,
            limit: self.limit,
            labels: self.labels,
            rules,
            is_readonly,
        };

        (spec, errors)
    }
}

impl From<&AlertGroupSpec> for RuleGroupDoc {
    fn from(spec: &AlertGroupSpec) -> Self {
        Self {
            name: spec.name.clone(),
            interval: spec.interval,
            query_offset: spec.query_offset,
            limit: spec.limit,
            labels: spec.labels.clone(),
            rules: spec
                .rules
                .iter()
                .map(|named| RuleDoc {
                    alert: Some(named.spec.name.clone()),
                    record: None,
                    expr: named.spec.expr.text.clone(),
                    for_duration: named.spec.for_duration,
                    keep_firing_for: named.spec.keep_firing_for,
                    labels: named.spec.labels.clone(),
                    annotations: named.spec.annotations.clone(),
                })
                .collect(),
        }
    }
}
