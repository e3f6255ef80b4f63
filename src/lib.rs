// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Project storage layer of humanlog.
//!
//! A __project__ groups dashboards and alert groups. Where its contents live
//! is decided by the pointer it is registered with: a directory on the local
//! machine, a directory of a remote git repository, or process memory. All
//! access goes through [`Watch`], which looks up projects in the registry
//! and dispatches to the backend owning them.
//!
//! Files found in a project are classified by [`provenance`] so that
//! dashboards and alert groups produced outside of humanlog are never
//! clobbered by accident, and must be explicitly adopted before they can be
//! edited.

pub mod alert_state;
pub mod backend;
pub mod clock;
pub mod config;
pub mod conflict;
pub mod error;
pub mod expr;
pub mod id;
pub mod model;
pub mod pager;
pub mod path;
pub mod provenance;
pub mod tree;
pub mod watch;

pub use alert_state::{AlertStatusStore, MemoryAlertStatusStore};
pub use backend::{EphemeralBackend, LocalBackend, ProjectBackend, RemoteGitBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigSource, MemoryConfig, ProjectConfig, ProjectsConfig, TomlConfigFile};
pub use error::{Error, ErrorKind, Result};
pub use expr::{ExprParser, RawExprParser};
pub use watch::{Registry, Watch};
