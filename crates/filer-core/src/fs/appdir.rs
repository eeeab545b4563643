//! Application directory detection.
//!
//! A directory is an AppDir when it contains an executable `AppRun`. Its
//! icon comes from `.DirIcon`, or `AppIcon.xpm` as a fallback. Every file is
//! checked against the owner of the directory itself so that a hostile
//! user cannot plant an icon or launcher in someone else's directory
//! (a shared `/tmp`, for example).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::fs::classify::StatInfo;
use crate::icons::{check_icon_candidate, IconCache, IconHandle, MAX_ICON_SIZE};

pub const DIR_ICON: &str = ".DirIcon";
pub const APP_RUN: &str = "AppRun";
pub const APP_ICON: &str = "AppIcon.xpm";

/// What an examine pass learned about a directory.
#[derive(Debug, Clone)]
pub struct AppDirScan {
    pub is_app_dir: bool,
    /// The icon found inside the directory. When `is_app_dir` is set and
    /// nothing was found this is the generic application icon.
    pub icon: Option<IconHandle>,
    /// Number of children, excluding `.` and `..`. `None` if the
    /// directory could not be listed.
    pub child_count: Option<u64>,
}

/// Probes a directory for `.DirIcon`, `AppRun` and `AppIcon.xpm`.
pub struct AppDirScanner {
    icons: Arc<dyn IconCache>,
    max_icon_size: u64,
}

impl AppDirScanner {
    pub fn new(icons: Arc<dyn IconCache>) -> Self {
        Self {
            icons,
            max_icon_size: MAX_ICON_SIZE,
        }
    }

    #[must_use]
    pub fn with_max_icon_size(self, max_icon_size: u64) -> Self {
        Self {
            max_icon_size,
            ..self
        }
    }

    pub fn max_icon_size(&self) -> u64 {
        self.max_icon_size
    }

    /// Examines `dir`, trusting only files owned by whoever owns `dir`
    /// itself. For a symlinked directory that is the owner of the link.
    pub fn scan(&self, dir: &Path) -> AppDirScan {
        match StatInfo::lstat(dir) {
            Ok(info) => self.scan_as(dir, info.uid),
            Err(e) => {
                tracing::trace!("cannot examine {}: {e}", dir.display());
                AppDirScan {
                    is_app_dir: false,
                    icon: None,
                    child_count: None,
                }
            }
        }
    }

    /// Examines `dir`, trusting only files owned by `owner`.
    pub fn scan_as(&self, dir: &Path, owner: u32) -> AppDirScan {
        let real = std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());

        let mut icon = match self.probe_dir_icon(&real.join(DIR_ICON), owner) {
            Ok(path) => self.icons.lookup_by_path(&path),
            Err(e) => {
                tracing::trace!("{DIR_ICON} rejected: {e}");
                None
            }
        };

        let is_app_dir = match probe_app_run(&real.join(APP_RUN), owner) {
            Ok(()) => true,
            Err(e) => {
                tracing::trace!("{APP_RUN} rejected: {e}");
                false
            }
        };

        if is_app_dir && icon.is_none() {
            icon = match self.probe_app_icon(&real.join(APP_ICON)) {
                Ok(path) => self.icons.lookup_by_path(&path),
                Err(e) => {
                    tracing::trace!("{APP_ICON} rejected: {e}");
                    None
                }
            };
        }

        if is_app_dir && icon.is_none() {
            icon = Some(self.icons.app_dir_fallback());
        }

        AppDirScan {
            is_app_dir,
            icon,
            child_count: count_children(&real),
        }
    }

    /// Returns the file to load the icon from.
    fn probe_dir_icon(&self, path: &Path, owner: u32) -> CoreResult<PathBuf> {
        let info = StatInfo::lstat(path).map_err(|e| CoreError::from_io(path, e))?;
        check_owner(path, &info, owner)?;

        let (target, info) = if info.is_symlink() {
            let link = std::fs::read_link(path).map_err(|e| CoreError::from_io(path, e))?;
            let target = match path.parent() {
                Some(parent) if link.is_relative() => parent.join(link),
                _ => link,
            };
            let info = StatInfo::lstat(&target).map_err(|e| CoreError::from_io(&target, e))?;
            if info.is_symlink() {
                // One hop only.
                return Err(CoreError::NotRegularFile(target));
            }
            (target, info)
        } else {
            (path.to_path_buf(), info)
        };

        check_icon_candidate(&target, &info, self.max_icon_size)?;
        Ok(target)
    }

    /// `AppIcon.xpm` is trusted by virtue of sitting next to a valid `AppRun`.
    fn probe_app_icon(&self, path: &Path) -> CoreResult<PathBuf> {
        let info = StatInfo::stat(path).map_err(|e| CoreError::from_io(path, e))?;
        check_icon_candidate(path, &info, self.max_icon_size)?;
        Ok(path.to_path_buf())
    }
}

fn probe_app_run(path: &Path, owner: u32) -> CoreResult<()> {
    let info = StatInfo::lstat(path).map_err(|e| CoreError::from_io(path, e))?;
    check_owner(path, &info, owner)?;
    if !info.is_executable() {
        return Err(CoreError::NotExecutable(path.to_path_buf()));
    }
    Ok(())
}

fn check_owner(path: &Path, info: &StatInfo, owner: u32) -> CoreResult<()> {
    if info.uid != owner {
        return Err(CoreError::OwnershipMismatch {
            path: path.to_path_buf(),
            expected: owner,
            found: info.uid,
        });
    }
    Ok(())
}

/// Children of `dir`, not counting `.` and `..`.
fn count_children(dir: &Path) -> Option<u64> {
    match std::fs::read_dir(dir) {
        Ok(entries) => Some(entries.count() as u64),
        Err(e) => {
            tracing::trace!("cannot count {}: {e}", dir.display());
            None
        }
    }
}
