//! Filer core library: entry metadata and window control, without any UI.
//!
//! `filer-core` keeps a live, shared picture of directories for a file
//! manager frontend. Each directory entry is refreshed ("restat") from the
//! filesystem into an immutable record that readers see whole, and
//! directories that look like application bundles are examined for their
//! icon and launcher.
//!
//! # Modules
//!
//! - [`fs`] — Path classification, attribute probes, AppDir scanning and the [`DirEntryResolver`].
//! - [`dir`] — Cached directory listings shared between windows ([`FsDirectoryCache`]).
//! - [`window`] — Per-window state and the [`WindowManager`] that drives it.
//! - [`nav`] — Symbolic path helpers and saved selection groups.
//! - [`mime`] / [`icons`] — Process-wide MIME registry and icon cache.
//! - [`config`] — TOML-based settings.
//! - [`event`] — Batches sent from directories to windows.
//! - [`error`] — Unified error type ([`CoreError`]) and result alias ([`CoreResult`]).

pub mod config;
pub mod context;
pub mod dir;
pub mod error;
pub mod event;
pub mod fs;
pub mod icons;
pub mod mime;
pub mod nav;
pub mod window;

pub use config::settings::Config;
pub use context::FilerContext;
pub use dir::{DirectoryCache, FsDirectoryCache, ScanMode};
pub use error::{CoreError, CoreResult};
pub use event::{DirAction, DirBatch};
pub use fs::entry::{DirEntry, EntryRecord, ItemFlags};
pub use fs::resolver::DirEntryResolver;
pub use icons::{FsIconCache, IconCache, IconHandle};
pub use mime::{GuessMimeRegistry, MimeRegistry, MimeType};
pub use nav::groups::{Group, GroupStore};
pub use window::{SessionId, WindowManager};

/// Normalises a string to NFC (composed) form.
///
/// macOS stores filenames in NFD (decomposed), which causes Korean Hangul
/// characters to appear as individual Jamo. This helper re-composes them.
pub fn nfc_string(s: &str) -> String {
    use unicode_normalization::UnicodeNormalization;
    s.nfc().collect()
}
