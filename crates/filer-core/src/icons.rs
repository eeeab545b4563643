//! Icon handles and the process-wide icon cache.
//!
//! Decoding pixels is left to the frontend: an [`Icon`] only records where
//! the image comes from. What the cache does own is the policy: which files
//! are acceptable icon sources, the size ceiling, and sharing one handle per
//! source so entries can hold counted references.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{CoreError, CoreResult};
use crate::fs::classify::StatInfo;
use crate::mime::MimeType;

/// Don't load icons larger than this; it only exists to stop huge files
/// from being read as images.
pub const MAX_ICON_SIZE: u64 = 400 * 1024;

/// Where an icon's pixels come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IconSource {
    /// An image file on disk.
    File(PathBuf),
    /// The stock icon for a MIME type.
    MimeType(MimeType),
    /// Generic "application" icon for AppDirs without their own.
    AppDir,
    /// Shown for entries that could not be stat'd.
    Error,
}

/// A decoded (or decodable) icon.
#[derive(Debug, PartialEq, Eq)]
pub struct Icon {
    source: IconSource,
    byte_size: u64,
}

impl Icon {
    pub fn new(source: IconSource, byte_size: u64) -> Self {
        Self { source, byte_size }
    }

    pub fn source(&self) -> &IconSource {
        &self.source
    }

    /// Size of the backing file, `0` for built-in icons.
    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }
}

/// Shared, reference-counted icon handle. Dropping the last clone frees it.
pub type IconHandle = Arc<Icon>;

/// Process-wide icon cache.
pub trait IconCache: Send + Sync {
    /// Loads (or reuses) the image file at `path`. `None` if it is missing,
    /// too big, or not a regular file.
    fn lookup_by_path(&self, path: &Path) -> Option<IconHandle>;

    /// Like [`IconCache::lookup_by_path`] but never loads anything.
    /// The flag is `true` if the cache has a current record for `path`,
    /// even a record of a failed load.
    fn lookup_only_new(&self, path: &Path) -> (Option<IconHandle>, bool);

    /// The stock icon for a MIME type.
    fn lookup_by_mime_type(&self, mime: &MimeType) -> IconHandle;

    /// The icon named by a `.desktop` file's `Icon=` key.
    fn desktop_icon(&self, path: &Path) -> Option<IconHandle>;

    fn app_dir_fallback(&self) -> IconHandle;

    fn error_icon(&self) -> IconHandle;
}

/// One cached path lookup, valid while the file's mtime and size match.
#[derive(Debug, Clone)]
struct CachedFile {
    mtime: i64,
    size: u64,
    icon: Option<IconHandle>,
}

/// Icon cache keyed by file path, validated against the file's stat.
pub struct FsIconCache {
    max_size: u64,
    files: Mutex<HashMap<PathBuf, CachedFile>>,
    desktop: Mutex<HashMap<PathBuf, CachedFile>>,
    mime: Mutex<HashMap<MimeType, IconHandle>>,
    app_dir: IconHandle,
    error: IconHandle,
}

impl FsIconCache {
    pub fn new() -> Self {
        Self::with_max_size(MAX_ICON_SIZE)
    }

    pub fn with_max_size(max_size: u64) -> Self {
        Self {
            max_size,
            files: Mutex::new(HashMap::new()),
            desktop: Mutex::new(HashMap::new()),
            mime: Mutex::new(HashMap::new()),
            app_dir: Arc::new(Icon::new(IconSource::AppDir, 0)),
            error: Arc::new(Icon::new(IconSource::Error, 0)),
        }
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Number of file paths with a cached record.
    pub fn cached_files(&self) -> usize {
        self.files.lock().len()
    }


    fn load(&self, path: &Path, info: &StatInfo) -> CoreResult<IconHandle> {
        check_icon_candidate(path, info, self.max_size)?;
        // Opening is the cheapest proof that we can read the pixels later.
        std::fs::File::open(path).map_err(|e| CoreError::from_io(path, e))?;
        Ok(Arc::new(Icon::new(
            IconSource::File(path.to_path_buf()),
            info.size,
        )))
    }
}

impl Default for FsIconCache {
    fn default() -> Self {
        Self::new()
    }
}

impl IconCache for FsIconCache {
    fn lookup_by_path(&self, path: &Path) -> Option<IconHandle> {
        let info = stat_or_evict(&self.files, path)?;
        if let Some(cached) = self.files.lock().get(path) {
            if cached.mtime == info.mtime && cached.size == info.size {
                return cached.icon.clone();
            }
        }

        let icon = match self.load(path, &info) {
            Ok(icon) => Some(icon),
            Err(e) => {
                tracing::debug!("icon not loaded: {e}");
                None
            }
        };
        self.files.lock().insert(
            path.to_path_buf(),
            CachedFile {
                mtime: info.mtime,
                size: info.size,
                icon: icon.clone(),
            },
        );
        icon
    }

    fn lookup_only_new(&self, path: &Path) -> (Option<IconHandle>, bool) {
        let Some(info) = stat_or_evict(&self.files, path) else {
            return (None, false);
        };
        let mut files = self.files.lock();
        match files.get(path) {
            Some(cached) if cached.mtime == info.mtime && cached.size == info.size => {
                (cached.icon.clone(), true)
            }
            Some(_) => {
                files.remove(path);
                (None, false)
            }
            None => (None, false),
        }
    }

    fn lookup_by_mime_type(&self, mime: &MimeType) -> IconHandle {
        self.mime
            .lock()
            .entry(mime.clone())
            .or_insert_with(|| Arc::new(Icon::new(IconSource::MimeType(mime.clone()), 0)))
            .clone()
    }

    fn desktop_icon(&self, path: &Path) -> Option<IconHandle> {
        let info = stat_or_evict(&self.desktop, path)?;
        if let Some(cached) = self.desktop.lock().get(path) {
            if cached.mtime == info.mtime && cached.size == info.size {
                return cached.icon.clone();
            }
        }

        let icon = if info.size <= self.max_size {
            std::fs::read_to_string(path)
                .ok()
                .and_then(|text| desktop_icon_key(&text))
                .filter(|icon| icon.is_absolute())
                .and_then(|icon| self.lookup_by_path(&icon))
        } else {
            None
        };
        self.desktop.lock().insert(
            path.to_path_buf(),
            CachedFile {
                mtime: info.mtime,
                size: info.size,
                icon: icon.clone(),
            },
        );
        icon
    }

    fn app_dir_fallback(&self) -> IconHandle {
        self.app_dir.clone()
    }

    fn error_icon(&self) -> IconHandle {
        self.error.clone()
    }
}

/// Stats `path`, dropping its record from `records` if it is gone.
fn stat_or_evict(
    records: &Mutex<HashMap<PathBuf, CachedFile>>,
    path: &Path,
) -> Option<StatInfo> {
    match StatInfo::stat(path) {
        Ok(info) => Some(info),
        Err(_) => {
            records.lock().remove(path);
            None
        }
    }
}

/// Checks that a stat'd icon candidate is a regular file within `limit`.
pub fn check_icon_candidate(path: &Path, info: &StatInfo, limit: u64) -> CoreResult<()> {
    if !info.is_regular() {
        return Err(CoreError::NotRegularFile(path.to_path_buf()));
    }
    if info.size > limit {
        return Err(CoreError::SizeLimitExceeded {
            path: path.to_path_buf(),
            size: info.size,
            limit,
        });
    }
    Ok(())
}

/// Extracts `Icon=` from the `[Desktop Entry]` group of a desktop file.
pub fn desktop_icon_key(text: &str) -> Option<PathBuf> {
    let mut in_entry = false;
    for line in text.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_entry = line == "[Desktop Entry]";
            continue;
        }
        if !in_entry {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == "Icon" {
                let value = value.trim();
                return (!value.is_empty()).then(|| PathBuf::from(value));
            }
        }
    }
    None
}
