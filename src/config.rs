// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Project registry configuration.
//!
//! Specify the layout of the project registry, and the [`ConfigSource`]
//! capability through which it is reloaded and written back. The registry
//! is the source of truth for which projects exist and where they point.
//!
//! # General Layout
//!
//! The registry is a TOML file listing projects. Each project has a unique
//! name and a pointer saying which backend owns its contents:
//!
//! ```toml
//! [[project]]
//! name = "infra"
//!
//! [project.pointer.localhost]
//! path = "~/observability/infra"
//! dashboard_dir = "dashboards"
//! alert_dir = "alerts"
//! read_only = false
//!
//! [[project]]
//! name = "shared"
//!
//! [project.pointer.remote_git]
//! url = "git@github.com:acme/observability.git"
//! ref = "main"
//! dashboard_dir = "dashboards"
//! alert_dir = "alerts"
//! ```
//!
//! Localhost paths may use shell syntax like `~` or `$HOME`. The registry
//! keeps them as written, and they are only expanded through
//! [`ProjectsConfig::expanded`] or [`expand_pointer`] when a backend needs
//! the real path.

use crate::model::{LocalhostPointer, ProjectPointer};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs,
    io::ErrorKind as IoErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, instrument};

/// Project registry layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ProjectsConfig {
    /// Registered projects.
    #[serde(rename = "project", default)]
    pub projects: Vec<ProjectConfig>,
}

impl ProjectsConfig {
    /// Find project by name.
    pub fn get(&self, name: &str) -> Option<&ProjectConfig> {
        self.projects.iter().find(|project| project.name == name)
    }

    /// Find mutable project by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut ProjectConfig> {
        self.projects.iter_mut().find(|project| project.name == name)
    }

    /// Copy of registry with shell expansion performed on localhost paths.
    ///
    /// Never write the copy back, it would replace what the user wrote.
    pub fn expanded(&self) -> Result<ProjectsConfig> {
        let projects = self
            .projects
            .iter()
            .map(|project| -> Result<ProjectConfig> {
                Ok(ProjectConfig {
                    name: project.name.clone(),
                    pointer: project.pointer.as_ref().map(expand_pointer).transpose()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ProjectsConfig { projects })
    }

    /// Remove project by name, returning it if it was registered.
    pub fn remove(&mut self, name: &str) -> Option<ProjectConfig> {
        let index = self
            .projects
            .iter()
            .position(|project| project.name == name)?;
        Some(self.projects.remove(index))
    }
}

impl FromStr for ProjectsConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        toml::de::from_str(data).map_err(ConfigError::Deserialize)
    }
}

impl Display for ProjectsConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Perform shell expansion on path of localhost pointer.
///
/// Other pointers are returned as is.
pub fn expand_pointer(pointer: &ProjectPointer) -> Result<ProjectPointer> {
    let ProjectPointer::Localhost(local) = pointer else {
        return Ok(pointer.clone());
    };

    let raw = local.path.to_string_lossy();
    let path = shellexpand::full(raw.as_ref())?;
    Ok(ProjectPointer::Localhost(LocalhostPointer {
        path: PathBuf::from(path.into_owned()),
        ..local.clone()
    }))
}

/// Registry entry of a single project.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ProjectConfig {
    /// Unique name of the project.
    pub name: String,

    /// Backend owning the project's contents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<ProjectPointer>,
}

impl ProjectConfig {
    pub fn new(name: impl Into<String>, pointer: ProjectPointer) -> Self {
        Self {
            name: name.into(),
            pointer: Some(pointer),
        }
    }
}

/// Source of truth for the project registry.
///
/// Implementations only need to move the registry in and out of storage.
/// Serializing access to it is the job of [`Registry`](crate::watch::Registry).
pub trait ConfigSource: Send {
    /// Read latest registry from storage.
    fn reload(&self) -> Result<ProjectsConfig>;

    /// Persist registry to storage.
    fn write_back(&self, config: &ProjectsConfig) -> Result<()>;
}

/// Registry stored as a TOML file.
///
/// A missing file is treated as an empty registry.
#[derive(Debug, Clone)]
pub struct TomlConfigFile {
    path: PathBuf,
}

impl TomlConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for TomlConfigFile {
    #[instrument(skip(self), fields(path = %self.path.display()), level = "debug")]
    fn reload(&self) -> Result<ProjectsConfig> {
        match fs::read_to_string(&self.path) {
            Ok(data) => data.parse(),
            Err(err) if err.kind() == IoErrorKind::NotFound => {
                debug!("registry file missing, starting with empty registry");
                Ok(ProjectsConfig::default())
            }
            Err(err) => Err(ConfigError::Io {
                source: err,
                path: self.path.clone(),
            }),
        }
    }

    #[instrument(skip(self, config), fields(path = %self.path.display()), level = "debug")]
    fn write_back(&self, config: &ProjectsConfig) -> Result<()> {
        let data = toml::ser::to_string_pretty(config)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| ConfigError::Io {
                source: err,
                path: parent.to_path_buf(),
            })?;
        }

        fs::write(&self.path, data).map_err(|err| ConfigError::Io {
            source: err,
            path: self.path.clone(),
        })
    }
}

/// Registry held in memory.
#[derive(Debug, Default)]
pub struct MemoryConfig {
    config: Mutex<ProjectsConfig>,
}

impl MemoryConfig {
    pub fn new(config: ProjectsConfig) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }

    /// Copy of current registry.
    pub fn snapshot(&self) -> ProjectsConfig {
        self.config.lock().clone()
    }
}

impl ConfigSource for MemoryConfig {
    fn reload(&self) -> Result<ProjectsConfig> {
        Ok(self.config.lock().clone())
    }

    fn write_back(&self, config: &ProjectsConfig) -> Result<()> {
        *self.config.lock() = config.clone();
        Ok(())
    }
}

impl<C> ConfigSource for std::sync::Arc<C>
where
    C: ConfigSource + Sync + ?Sized,
{
    fn reload(&self) -> Result<ProjectsConfig> {
        (**self).reload()
    }

    fn write_back(&self, config: &ProjectsConfig) -> Result<()> {
        (**self).write_back(config)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Failed to read or write registry file.
    #[error("failed to access registry file at {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RemoteGitPointer, VirtualPointer};
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("OBS_HOME", "/home/blah/obs")])]
    fn deserialize_projects_config() -> anyhow::Result<()> {
        let result: ProjectsConfig = r#"
            [[project]]
            name = "infra"

            [project.pointer.localhost]
            path = "$OBS_HOME/infra"
            dashboard_dir = "dashboards"
            alert_dir = "alerts"

            [[project]]
            name = "shared"

            [project.pointer.remote_git]
            url = "https://example.com/obs.git"
            ref = "main"
            dashboard_dir = "dash"
            alert_dir = "rules"

            [[project]]
            name = "scratch"

            [project.pointer.virtual]
            uri = "mem://scratch"

            [[project]]
            name = "dangling"
        "#
        .parse::<ProjectsConfig>()?
        .expanded()?;

        let expect = ProjectsConfig {
            projects: vec![
                ProjectConfig::new(
                    "infra",
                    ProjectPointer::Localhost(LocalhostPointer {
                        path: "/home/blah/obs/infra".into(),
                        dashboard_dir: "dashboards".into(),
                        alert_dir: "alerts".into(),
                        read_only: false,
                    }),
                ),
                ProjectConfig::new(
                    "shared",
                    ProjectPointer::RemoteGit(RemoteGitPointer {
                        url: "https://example.com/obs.git".into(),
                        git_ref: "main".into(),
                        dashboard_dir: "dash".into(),
                        alert_dir: "rules".into(),
                    }),
                ),
                ProjectConfig::new(
                    "scratch",
                    ProjectPointer::Virtual(VirtualPointer {
                        uri: "mem://scratch".into(),
                    }),
                ),
                ProjectConfig {
                    name: "dangling".into(),
                    pointer: None,
                },
            ],
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[sealed_test(env = [("OBS_HOME", "/home/blah/obs")])]
    fn write_back_keeps_unexpanded_paths() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let source = TomlConfigFile::new(dir.path().join("projects.toml"));
        let config = ProjectsConfig {
            projects: vec![ProjectConfig::new(
                "infra",
                ProjectPointer::Localhost(LocalhostPointer {
                    path: "$OBS_HOME/infra".into(),
                    dashboard_dir: "dashboards".into(),
                    alert_dir: "alerts".into(),
                    read_only: false,
                }),
            )],
        };
        source.write_back(&config)?;

        let reloaded = source.reload()?;
        assert_eq!(reloaded, config);
        source.write_back(&reloaded)?;
        assert!(fs::read_to_string(source.path())?.contains("$OBS_HOME/infra"));

        let expanded = reloaded.expanded()?;
        let Some(ProjectPointer::Localhost(local)) = &expanded.projects[0].pointer else {
            panic!("expected localhost pointer");
        };
        assert_eq!(local.path, PathBuf::from("/home/blah/obs/infra"));

        Ok(())
    }

    #[test]
    fn serialized_config_parses_back() -> anyhow::Result<()> {
        let config = ProjectsConfig {
            projects: vec![ProjectConfig::new(
                "infra",
                ProjectPointer::Localhost(LocalhostPointer {
                    path: "/srv/obs".into(),
                    dashboard_dir: "dashboards".into(),
                    alert_dir: "alerts".into(),
                    read_only: true,
                }),
            )],
        };

        let text = config.to_string();
        assert!(text.contains("[[project]]"));
        let result: ProjectsConfig = text.parse()?;
        assert_eq!(result, config);

        Ok(())
    }

    #[test]
    fn toml_file_missing_is_empty_registry() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let source = TomlConfigFile::new(dir.path().join("nested").join("projects.toml"));
        assert_eq!(source.reload()?, ProjectsConfig::default());

        let config = ProjectsConfig {
            projects: vec![ProjectConfig::new(
                "scratch",
                ProjectPointer::Virtual(VirtualPointer {
                    uri: "mem://scratch".into(),
                }),
            )],
        };
        source.write_back(&config)?;
        assert_eq!(source.reload()?, config);

        Ok(())
    }
}
