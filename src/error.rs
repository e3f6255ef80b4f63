// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Error taxonomy.
//!
//! Every failure that leaves this crate belongs to one of four kinds, see
//! [`ErrorKind`]. The transport layer sitting on top of us maps those kinds to
//! its own status codes, so the kind of a variant must never change silently.

use std::path::PathBuf;

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller asked for something malformed, missing, or forbidden.
    InvalidArgument,

    /// Something went wrong that the caller cannot fix.
    Internal,

    /// Project name is not present in the registry.
    NotFound,

    /// Remote project handle already has an operation in flight.
    Busy,
}

/// All possible errors of the project storage layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed request, bad pointer, duplicate name, invalid slug, etc.
    #[error("{0}")]
    InvalidArgument(String),

    /// Directory addressed by a direct lookup does not exist.
    #[error("{what} directory {path:?} does not exist in project {project:?}")]
    MissingDirectory {
        project: String,
        what: &'static str,
        path: PathBuf,
    },

    /// Resource addressed by a direct lookup does not exist.
    #[error("{0}")]
    ResourceNotFound(String),

    /// Resource is locked against writes.
    #[error("{0}")]
    Permission(String),

    /// Project is not present in the registry.
    #[error("project {0:?} not found")]
    ProjectNotFound(String),

    /// Remote handle is in use by another operation.
    #[error("project {0:?} is busy syncing with its remote, please wait and try again")]
    Busy(String),

    /// Registry configuration could not be read or written.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// Unexpected failure, wrapped with context.
    #[error("{context}: {source}")]
    Internal {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_)
            | Self::MissingDirectory { .. }
            | Self::ResourceNotFound(_)
            | Self::Permission(_) => ErrorKind::InvalidArgument,
            Self::ProjectNotFound(_) => ErrorKind::NotFound,
            Self::Busy(_) => ErrorKind::Busy,
            Self::Config(_) | Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn internal(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self::Internal {
            context: context.into(),
            source: source.into(),
        }
    }
}

/// Attach context to foreign errors, turning them into [`Error::Internal`].
pub(crate) trait Context<T> {
    fn context(self, context: impl FnOnce() -> String) -> Result<T>;
}

impl<T, E> Context<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, context: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|err| Error::internal(context(), err))
    }
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;
