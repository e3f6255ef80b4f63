// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine default locations of files humanlog needs to read or write.

use std::path::PathBuf;

/// Determine default absolute path to project registry file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/humanlog/projects.toml` as
/// the default location. Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if configuration directory cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_registry_file() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("humanlog").join("projects.toml"))
        .ok_or(NoWayHome)
}

/// No way to determine user's configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[cfg(target_os = "linux")]
    #[sealed_test(env = [("XDG_CONFIG_HOME", "/home/blah/.config")])]
    fn registry_file_follows_xdg() {
        assert_eq!(
            default_registry_file().unwrap(),
            PathBuf::from("/home/blah/.config/humanlog/projects.toml")
        );
    }
}
