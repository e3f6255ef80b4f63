// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Provenance detection for file-backed resources.
//!
//! Humanlog keeps no metadata about dashboard and alert group files besides
//! comments at the top of the file itself. This module reads those comments
//! to figure out who owns a file, and whether humanlog may write to it.
//!
//! # Header Protocol
//!
//! Only leading comment lines are examined, i.e., lines starting with `#`
//! that appear before any structural content. Blank lines in between are
//! skipped. The recognized lines are:
//!
//! - `# managed-by: humanlog` marks the file as managed by humanlog.
//! - `# humanlog.is_readonly: true|false` overrides the default write lock
//!   of a managed file.
//! - `# Generated by <tool>`, `# DO NOT EDIT`, `# @generated`, and
//!   `# generated-by: <tool>` mark the file as produced by some other tool.
//!
//! Any other comment is ignored.

/// Header line that marks a file as managed by humanlog.
pub const MANAGED_MARKER: &str = "# managed-by: humanlog";

/// Header key overriding the write lock of a managed file.
pub const READONLY_KEY: &str = "humanlog.is_readonly";

/// Reason recorded for dashboards carrying no markers at all.
pub const NO_MARKERS_REASON: &str = "No humanlog metadata or generation markers found";

/// Kind of resource being classified.
///
/// Dashboards and alert groups disagree on what an unmarked file means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Dashboard,
    AlertGroup,
}

/// Where a file came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Created or adopted through humanlog.
    Managed,

    /// Produced by another tool.
    Generated { reason: String },

    /// Alert group file dropped in by hand, carrying no markers.
    Discovered,
}

/// Classification of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub origin: Origin,
    pub is_readonly: bool,
}

impl Provenance {
    /// Provenance of a file written by humanlog.
    pub fn managed(is_readonly: bool) -> Self {
        Self {
            origin: Origin::Managed,
            is_readonly,
        }
    }

    pub fn is_managed(&self) -> bool {
        self.origin == Origin::Managed
    }
}

/// Classify file contents.
///
/// Pure function of its input: scanning the same bytes twice always yields
/// the same answer.
pub fn detect(contents: &str, kind: ResourceKind) -> Provenance {
    let mut managed = false;
    let mut readonly_override = None;
    let mut generation_markers = Vec::new();

    for line in leading_comments(contents) {
        if line == MANAGED_MARKER {
            managed = true;
        } else if let Some(value) = readonly_value(line) {
            readonly_override = Some(value);
        } else if is_generation_marker(line) {
            generation_markers.push(line);
        }
    }

    if managed {
        return Provenance::managed(readonly_override.unwrap_or(false));
    }

    if !generation_markers.is_empty() {
        let reason = generation_markers
            .iter()
            .map(|line| format!("found generation marker {line:?}"))
            .collect::<Vec<_>>()
            .join("\n");
        return Provenance {
            origin: Origin::Generated { reason },
            is_readonly: true,
        };
    }

    let origin = match kind {
        ResourceKind::Dashboard => Origin::Generated {
            reason: NO_MARKERS_REASON.into(),
        },
        ResourceKind::AlertGroup => Origin::Discovered,
    };

    Provenance {
        origin,
        is_readonly: true,
    }
}

/// Render header lines for a file humanlog is about to write.
///
/// The read-only line is only emitted when it carries information, i.e.,
/// when the caller explicitly asked for a lock state or the file is locked.
pub fn managed_header(is_readonly: bool, explicit: bool) -> String {
    let mut header = String::from(MANAGED_MARKER);
    header.push('\n');
    if explicit || is_readonly {
        header.push_str(&format!("# {READONLY_KEY}: {is_readonly}\n"));
    }
    header
}

/// Strip leading comments and blank lines, leaving structural content.
pub fn strip_header(contents: &str) -> &str {
    let mut offset = 0;
    for line in contents.split_inclusive('\n') {
        let trimmed = line.trim();
        if !trimmed.is_empty() && !trimmed.starts_with('#') {
            break;
        }
        offset += line.len();
    }
    &contents[offset..]
}

fn leading_comments(contents: &str) -> impl Iterator<Item = &str> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take_while(|line| line.starts_with('#'))
}

fn readonly_value(line: &str) -> Option<bool> {
    let rest = line.strip_prefix('#')?.trim_start();
    let value = rest.strip_prefix(READONLY_KEY)?.trim_start();
    let value = value.strip_prefix(':')?.trim();
    match value {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn is_generation_marker(line: &str) -> bool {
    let Some(rest) = line.strip_prefix('#') else {
        return false;
    };
    let rest = rest.trim_start().to_ascii_lowercase();

    rest.starts_with("generated by ")
        || rest.starts_with("generated-by:")
        || rest.starts_with("do not edit")
        || rest.starts_with("@generated")
}
