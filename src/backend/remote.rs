// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remote git backend.
//!
//! Projects living in a remote git repository at a pinned ref. Humanlog only
//! ever reads them; editing happens out-of-band in the repository itself.
//!
//! # Handles
//!
//! Each remote project gets a [`GitHandle`] the first time it is accessed.
//! The handle owns a bare clone of the remote in a temporary directory, and
//! an in-memory sparse checkout of the dashboard and alert directories at
//! the resolved commit. Later accesses reuse the handle. A handle whose
//! pointer no longer matches the registry is thrown away and rebuilt.
//!
//! Handles are guarded by their own lock. Operations on different projects
//! run in parallel, while a second operation on a project whose handle is in
//! use fails right away with [`Error::Busy`] instead of waiting.
//!
//! # Cloning
//!
//! Network remotes are cloned with depth 1. Local paths and `file://` URLs
//! are cloned in full, because libgit2 does not negotiate shallow clones over
//! its local transport. Credentials come from the SSH agent, then from the
//! default SSH key files. Remotes that need no credentials, e.g., public
//! HTTPS repositories, are cloned anonymously.
//!
//! # Ref Resolution
//!
//! The configured ref is tried as a remote branch, then as a tag, then as any
//! revision libgit2 understands. An empty ref means the default branch of the
//! remote.

pub mod sparse;

use crate::{
    backend::{
        files::ProjectFiles,
        remote::sparse::{sparse_checkout, InvertedGitignore, SparseError, SparsityEdit},
        ProjectBackend,
    },
    clock::Clock,
    error::{Context, Error, Result},
    expr::ExprParser,
    model::{
        AlertGroup, AlertGroupSpec, AlertGroupUpdate, Dashboard, DashboardSpec, DashboardUpdate,
        Project, RemoteGitPointer,
    },
    tree::{FileTree, MemTree},
};

use auth_git2::GitAuthenticator;
use git2::{build::RepoBuilder, Commit, Config, FetchOptions, Oid, RemoteCallbacks, Repository};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    path::{Component, Path},
    sync::Arc,
};
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

/// Backend for `remote_git` pointers.
pub struct RemoteGitBackend {
    handles: Mutex<HashMap<String, Arc<GitHandle>>>,
    clock: Arc<dyn Clock>,
    parser: Arc<dyn ExprParser>,
}

/// Cached state of a single remote project.
pub(crate) struct GitHandle {
    project: String,
    pointer: RemoteGitPointer,
    pub(crate) checkout: Mutex<Option<Checkout>>,
}

/// Bare clone plus sparse checkout of the resolved commit.
pub(crate) struct Checkout {
    // INVARIANT: Repository must be dropped before the directory it lives in.
    repository: Repository,
    worktree: MemTree,
    commit: Oid,
    _storage: TempDir,
}

impl RemoteGitBackend {
    pub fn new(clock: Arc<dyn Clock>, parser: Arc<dyn ExprParser>) -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            clock,
            parser,
        }
    }

    /// Number of cached handles.
    pub fn handle_count(&self) -> usize {
        self.handles.lock().len()
    }

    /// Fetch handle of project, rebuilding it if its pointer changed.
    pub(crate) fn handle(&self, project: &str, pointer: &RemoteGitPointer) -> Arc<GitHandle> {
        let mut handles = self.handles.lock();
        if let Some(handle) = handles.get(project) {
            if handle.pointer == *pointer {
                return Arc::clone(handle);
            }
            info!("pointer of project {project:?} changed, rebuilding its handle");
        }

        let handle = Arc::new(GitHandle {
            project: project.to_string(),
            pointer: pointer.clone(),
            checkout: Mutex::new(None),
        });
        handles.insert(project.to_string(), Arc::clone(&handle));

        handle
    }

    /// Run `op` against the checkout of a project.
    ///
    /// Clones the remote on first access. With `sync` set, an existing
    /// checkout is refreshed from the remote first.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Busy`] if another operation holds the handle.
    fn with_checkout<T>(
        &self,
        project: &str,
        pointer: &RemoteGitPointer,
        sync: bool,
        op: impl FnOnce(&mut Checkout) -> Result<T>,
    ) -> Result<T> {
        let handle = self.handle(project, pointer);
        let Some(mut guard) = handle.checkout.try_lock() else {
            warn!("handle of project {project:?} is in use");
            return Err(Error::Busy(project.to_string()));
        };

        // INVARIANT: A checkout that failed to sync is dropped, so the next access clones afresh.
        let mut checkout = match guard.take() {
            Some(mut checkout) => {
                if sync {
                    checkout.sync(&handle.project, &handle.pointer)?;
                }
                checkout
            }
            None => Checkout::open(&handle.project, &handle.pointer)?,
        };

        let result = op(&mut checkout);
        *guard = Some(checkout);

        result
    }

    fn read<T>(
        &self,
        project: &str,
        pointer: &RemoteGitPointer,
        op: impl FnOnce(&ProjectFiles<'_, &mut MemTree>) -> Result<T>,
    ) -> Result<T> {
        let now = self.clock.now();
        self.with_checkout(project, pointer, false, |checkout| {
            let files = ProjectFiles {
                project,
                tree: &mut checkout.worktree,
                root: Path::new(""),
                dashboard_dir: &pointer.dashboard_dir,
                alert_dir: &pointer.alert_dir,
                parser: &*self.parser,
                now,
            };
            op(&files)
        })
    }
}

impl Checkout {
    /// Clone remote and check out the configured ref.
    #[instrument(skip(pointer), fields(url = %pointer.url, git_ref = %pointer.git_ref), level = "debug")]
    fn open(project: &str, pointer: &RemoteGitPointer) -> Result<Self> {
        info!("clone {:?} for project {project:?}", pointer.url);
        let storage = tempfile::Builder::new()
            .prefix("humanlog-remote-")
            .tempdir()
            .context(|| "creating storage for remote clone".into())?;

        let authenticator = authenticator();
        let config = Config::open_default().context(|| "opening git configuration".into())?;
        let repository = RepoBuilder::new()
            .bare(true)
            .fetch_options(fetch_options(&pointer.url, &authenticator, &config))
            .clone(&pointer.url, storage.path())
            .context(|| format!("cloning {:?}", pointer.url))?;

        let (commit, worktree) = {
            let commit = resolve_commit(&repository, &pointer.git_ref)?;
            let worktree = checkout_dirs(&repository, &commit, pointer)?;
            (commit.id(), worktree)
        };

        Ok(Self {
            repository,
            worktree,
            commit,
            _storage: storage,
        })
    }

    /// Fetch from remote, then re-resolve and re-check-out the configured ref.
    #[instrument(skip(self, pointer), fields(url = %pointer.url), level = "debug")]
    fn sync(&mut self, project: &str, pointer: &RemoteGitPointer) -> Result<()> {
        let authenticator = authenticator();
        let config = Config::open_default().context(|| "opening git configuration".into())?;
        let mut remote = self
            .repository
            .find_remote("origin")
            .context(|| format!("finding origin of project {project:?}"))?;
        let mut options = fetch_options(&pointer.url, &authenticator, &config);
        remote
            .fetch::<&str>(&[], Some(&mut options), None)
            .context(|| format!("fetching {:?}", pointer.url))?;

        let commit = resolve_commit(&self.repository, &pointer.git_ref)?;
        if commit.id() == self.commit {
            debug!("project {project:?} already at {}", self.commit);
            return Ok(());
        }

        info!("project {project:?} moved from {} to {}", self.commit, commit.id());
        self.worktree = checkout_dirs(&self.repository, &commit, pointer)?;
        self.commit = commit.id();

        Ok(())
    }
}

fn authenticator() -> GitAuthenticator {
    GitAuthenticator::new_empty()
        .try_ssh_agent(true)
        .add_default_ssh_keys()
}

fn fetch_options<'cb>(
    url: &str,
    authenticator: &'cb GitAuthenticator,
    config: &'cb Config,
) -> FetchOptions<'cb> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(authenticator.credentials(config));

    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    if !is_local_url(url) {
        options.depth(1);
    }

    options
}

/// Check if url is served by libgit2's local transport.
fn is_local_url(url: &str) -> bool {
    url.starts_with("file://") || Path::new(url).exists()
}

/// Resolve configured ref to a commit.
fn resolve_commit<'r>(repository: &'r Repository, git_ref: &str) -> Result<Commit<'r>> {
    let git_ref = match git_ref.trim() {
        "" => default_branch(repository),
        git_ref => git_ref.to_string(),
    };

    // INVARIANT: Remote branches come first, local branches of a bare clone go stale after fetch.
    let candidates = [
        format!("refs/remotes/origin/{git_ref}"),
        format!("refs/tags/{git_ref}"),
        git_ref.clone(),
    ];
    for candidate in &candidates {
        if let Ok(object) = repository.revparse_single(candidate) {
            return object
                .peel_to_commit()
                .context(|| format!("ref {git_ref:?} does not point to a commit"));
        }
    }

    Err(Error::invalid(format!(
        "ref {git_ref:?} cannot be resolved to a commit"
    )))
}

/// Name of the branch HEAD of a fresh clone points at.
fn default_branch(repository: &Repository) -> String {
    repository
        .find_reference("HEAD")
        .ok()
        .and_then(|head| {
            head.symbolic_target()
                .map(|target| target.trim_start_matches("refs/heads/").to_string())
        })
        .unwrap_or_else(|| "HEAD".into())
}

/// Sparse checkout of the project directories of a commit.
fn checkout_dirs(
    repository: &Repository,
    commit: &Commit<'_>,
    pointer: &RemoteGitPointer,
) -> Result<MemTree> {
    let tree = commit
        .tree()
        .context(|| format!("reading tree of commit {}", commit.id()))?;
    let edit = SparsityEdit::for_dirs([pointer.dashboard_dir.as_path(), pointer.alert_dir.as_path()]);
    let matcher = InvertedGitignore::new(&edit)?;
    let worktree = sparse_checkout(repository, &tree, &matcher)?;

    // INVARIANT: Missing directories are reported on read, never fatal here.
    for (what, dir) in [("dashboard", &pointer.dashboard_dir), ("alert", &pointer.alert_dir)] {
        if !worktree.is_dir(dir) {
            warn!("{what} directory {:?} missing at commit {}", dir.display(), commit.id());
        }
    }

    Ok(worktree)
}

fn read_only(project: &str) -> Error {
    Error::invalid(format!(
        "remote git projects are read-only, edit project {project:?} in its repository instead"
    ))
}

fn validate_dir(what: &str, dir: &Path) -> Result<()> {
    let is_relative_inside = !dir.as_os_str().is_empty()
        && dir
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
        && dir.components().any(|component| matches!(component, Component::Normal(_)));
    if !is_relative_inside {
        return Err(Error::invalid(format!(
            "{what} directory {:?} must be a relative path inside the repository",
            dir.display()
        )));
    }

    Ok(())
}

impl From<SparseError> for Error {
    fn from(err: SparseError) -> Self {
        Error::internal("sparse checkout failed", err)
    }
}

impl ProjectBackend for RemoteGitBackend {
    type Pointer = RemoteGitPointer;

    fn validate_project_pointer(&self, pointer: &RemoteGitPointer) -> Result<()> {
        if pointer.url.trim().is_empty() {
            return Err(Error::invalid("remote git url must not be empty"));
        }

        validate_dir("dashboard", &pointer.dashboard_dir)?;
        validate_dir("alert", &pointer.alert_dir)
    }

    fn delete_project(&self, project: &str) -> Result<()> {
        if self.handles.lock().remove(project).is_some() {
            debug!("dropped handle of project {project:?}");
        }

        Ok(())
    }

    #[instrument(skip(self, project, pointer), fields(project = %project.spec.name), level = "debug")]
    fn get_project_hydrated(
        &self,
        project: &mut Project,
        pointer: &RemoteGitPointer,
    ) -> Result<(Vec<Dashboard>, Vec<AlertGroup>)> {
        let name = project.spec.name.clone();
        let now = self.clock.now();
        self.with_checkout(&name, pointer, true, |checkout| {
            let files = ProjectFiles {
                project: &name,
                tree: &mut checkout.worktree,
                root: Path::new(""),
                dashboard_dir: &pointer.dashboard_dir,
                alert_dir: &pointer.alert_dir,
                parser: &*self.parser,
                now,
            };
            project.status.updated_at = now;
            Ok(files.hydrate(project))
        })
    }

    #[instrument(skip(self, project, pointer), fields(project = %project.spec.name), level = "debug")]
    fn sync_project(&self, project: &mut Project, pointer: &RemoteGitPointer) -> Result<()> {
        let name = project.spec.name.clone();
        self.with_checkout(&name, pointer, true, |_| Ok(()))?;
        project.status.updated_at = self.clock.now();

        Ok(())
    }

    fn list_dashboards(&self, project: &str, pointer: &RemoteGitPointer) -> Result<Vec<Dashboard>> {
        self.read(project, pointer, |files| files.list_dashboards())
    }

    fn get_dashboard(&self, project: &str, pointer: &RemoteGitPointer, id: &str) -> Result<Dashboard> {
        self.read(project, pointer, |files| files.get_dashboard(id))
    }

    fn create_dashboard(
        &self,
        project: &str,
        _pointer: &RemoteGitPointer,
        _spec: &DashboardSpec,
    ) -> Result<Dashboard> {
        Err(read_only(project))
    }

    fn update_dashboard(
        &self,
        project: &str,
        _pointer: &RemoteGitPointer,
        _id: &str,
        _update: &DashboardUpdate,
    ) -> Result<Dashboard> {
        Err(read_only(project))
    }

    fn delete_dashboard(&self, project: &str, _pointer: &RemoteGitPointer, _id: &str) -> Result<()> {
        Err(read_only(project))
    }

    fn list_alert_groups(&self, project: &str, pointer: &RemoteGitPointer) -> Result<Vec<AlertGroup>> {
        self.read(project, pointer, |files| files.list_alert_groups())
    }

    fn get_alert_group(
        &self,
        project: &str,
        pointer: &RemoteGitPointer,
        name: &str,
    ) -> Result<AlertGroup> {
        self.read(project, pointer, |files| files.get_alert_group(name))
    }

    fn create_alert_group(
        &self,
        project: &str,
        _pointer: &RemoteGitPointer,
        _spec: &AlertGroupSpec,
    ) -> Result<AlertGroup> {
        Err(read_only(project))
    }

    fn update_alert_group(
        &self,
        project: &str,
        _pointer: &RemoteGitPointer,
        _name: &str,
        _update: &AlertGroupUpdate,
    ) -> Result<AlertGroup> {
        Err(read_only(project))
    }

    fn delete_alert_group(&self, project: &str, _pointer: &RemoteGitPointer, _name: &str) -> Result<()> {
        Err(read_only(project))
    }
}
