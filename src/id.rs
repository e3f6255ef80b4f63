// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Stable resource identifiers.

use data_encoding::BASE32HEX_NOPAD;

/// Prefix of every dashboard identifier.
pub const DASHBOARD_ID_PREFIX: &str = "hdash_";

/// Derive identifier of a dashboard.
///
/// Hashes the owning project name, the project name recorded inside the
/// dashboard document, and the dashboard slug with BLAKE3. The digest is
/// rendered in lowercase base32hex without padding, so the result never
/// needs URL escaping.
pub fn dashboard_id(project: &str, perses_project: &str, slug: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(project.as_bytes());
    hasher.update(perses_project.as_bytes());
    hasher.update(slug.as_bytes());
    let digest = hasher.finalize();

    let encoded = BASE32HEX_NOPAD.encode(digest.as_bytes());
    format!("{DASHBOARD_ID_PREFIX}{}", encoded.to_ascii_lowercase())
}

/// Check that name can be used as a file name slug.
///
/// Only ASCII letters, digits, `-`, and `_` are accepted.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}
