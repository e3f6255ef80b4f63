// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Sparse checkout of remote projects.
//!
//! A remote repository may hold far more than the dashboards and alert
//! groups of a project, so only the two configured directories are ever
//! checked out. Which paths make it into the checkout is decided by a set of
//! __sparsity rules__.
//!
//! # Sparsity Rules
//!
//! Sparsity rules use gitignore syntax with inverted semantics: nothing is
//! included by default, and each rule names what to _include_ instead of
//! what to exclude. A rule ending in `/` includes a directory together with
//! everything below it. Rules are anchored to the top of the repository, so
//! `/dashboards/` does not pull in `nested/dashboards/`.
//!
//! # Checkout Layout
//!
//! The checkout never touches disk. Matching blobs of the resolved commit are
//! copied into a [`MemTree`] under their repository-relative paths, which is
//! then read through the same file handling as a localhost project. A
//! directory that does not exist in the commit simply does not show up in
//! the tree.

use crate::tree::MemTree;

use git2::{ObjectType, Oid, Repository, Tree, TreeWalkMode, TreeWalkResult};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::{
    collections::HashSet,
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Component, Path, PathBuf},
};
use tracing::{debug, instrument};

/// Sparsity rule set.
///
/// # Invariant
///
/// - No duplicate sparsity rules.
/// - Rule insertion does not overwrite existing rules.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SparsityEdit {
    rules: HashSet<String>,
}

impl SparsityEdit {
    /// Construct new empty sparsity rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build rule set including each of the given directories.
    pub fn for_dirs<'a>(dirs: impl IntoIterator<Item = &'a Path>) -> Self {
        let mut edit = Self::new();
        for dir in dirs {
            edit.insert_dir(dir);
        }
        edit
    }

    /// Insert a sparsity rule.
    pub fn insert_rule(&mut self, rule: impl Into<String>) {
        self.rules.insert(rule.into());
    }

    /// Insert rule including a repository-relative directory.
    pub fn insert_dir(&mut self, dir: &Path) {
        let dir = dir
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");
        self.insert_rule(format!("/{dir}/"));
    }

    /// Iterate over rules in sorted order.
    pub fn rules(&self) -> impl Iterator<Item = &str> {
        let mut rules = self.rules.iter().map(String::as_str).collect::<Vec<_>>();
        rules.sort_unstable();
        rules.into_iter()
    }
}

impl Display for SparsityEdit {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        for rule in self.rules() {
            writeln!(fmt, "{rule}")?;
        }

        Ok(())
    }
}

impl From<&str> for SparsityEdit {
    fn from(content: &str) -> Self {
        let rules = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect::<HashSet<_>>();

        Self { rules }
    }
}

/// Match sparsity rules.
pub trait SparsityMatcher: Send + Sync {
    /// Check if repository-relative path is included by the rules.
    fn path_matches(&self, path: &Path, is_dir: bool) -> bool;
}

/// A sparsity rule matcher that inverts gitignore semantics.
///
/// Takes a gitignore rule parser, and inverts incoming patterns to match
/// sparsity patterns instead. Is this very lazy and hacky way to interpret
/// sparsity patterns? Yes. Does it work? Also yes.
#[derive(Debug)]
pub struct InvertedGitignore {
    matcher: Gitignore,
}

impl InvertedGitignore {
    /// Compile sparsity rules into a matcher.
    ///
    /// # Errors
    ///
    /// - Return [`SparseError::Pattern`] if a rule is not valid gitignore
    ///   syntax.
    pub fn new(edit: &SparsityEdit) -> Result<Self> {
        let mut builder = GitignoreBuilder::new("");
        // INVARIANT: Invert gitignore logic.
        //   - Ignore everything by default.
        //   - Invert '!' to mean to unignore.
        //   - Invert any rule without '!' to mean ignore.
        add_line(&mut builder, "/*")?;
        for rule in edit.rules() {
            let is_negated = rule.starts_with('!');
            let pattern = rule.trim_start_matches('!');
            let is_dir = pattern.ends_with('/');

            if is_negated {
                add_line(&mut builder, pattern)?;
                if is_dir {
                    add_line(&mut builder, &format!("{pattern}**"))?;
                }
            } else {
                add_line(&mut builder, &format!("!{pattern}"))?;
                if is_dir {
                    add_line(&mut builder, &format!("!{pattern}**"))?;
                }
            }
        }

        let matcher = builder.build().map_err(|err| SparseError::Pattern {
            source: err,
            rule: edit.to_string(),
        })?;

        Ok(Self { matcher })
    }
}

impl SparsityMatcher for InvertedGitignore {
    fn path_matches(&self, path: &Path, is_dir: bool) -> bool {
        !self
            .matcher
            .matched_path_or_any_parents(path, is_dir)
            .is_ignore()
    }
}

fn add_line(builder: &mut GitignoreBuilder, rule: &str) -> Result<()> {
    builder
        .add_line(None, rule)
        .map(|_| ())
        .map_err(|err| SparseError::Pattern {
            source: err,
            rule: rule.to_string(),
        })
}

/// Copy every blob of `tree` that the matcher includes into memory.
///
/// # Errors
///
/// - Return [`SparseError::Git2`] if the tree cannot be walked or a blob
///   cannot be read.
#[instrument(skip(repository, tree, matcher), fields(tree = %tree.id()), level = "debug")]
pub fn sparse_checkout(
    repository: &Repository,
    tree: &Tree<'_>,
    matcher: &impl SparsityMatcher,
) -> Result<MemTree> {
    let mut selected: Vec<(PathBuf, Oid)> = Vec::new();
    tree.walk(TreeWalkMode::PreOrder, |root, entry| {
        if entry.kind() != Some(ObjectType::Blob) {
            return TreeWalkResult::Ok;
        }

        if let Some(name) = entry.name() {
            let path = PathBuf::from(format!("{root}{name}"));
            if matcher.path_matches(&path, false) {
                selected.push((path, entry.id()));
            }
        }

        TreeWalkResult::Ok
    })?;

    let mut checkout = MemTree::new();
    for (path, oid) in selected {
        let blob = repository.find_blob(oid)?;
        checkout.insert_file(path, blob.content());
    }
    debug!("checked out {} files", checkout.len());

    Ok(checkout)
}

/// Sparse checkout error types.
#[derive(Debug, thiserror::Error)]
pub enum SparseError {
    /// Sparsity rule cannot be compiled.
    #[error("invalid sparsity rule {rule:?}")]
    Pattern {
        #[source]
        source: ignore::Error,
        rule: String,
    },

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
pub type Result<T, E = SparseError> = std::result::Result<T, E>;
