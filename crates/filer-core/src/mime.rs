//! MIME classification.
//!
//! Entries never own their MIME type: they hold a shared handle that the
//! registry interned, so two entries of the same type point at the same
//! string.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::fs::classify::BaseType;

/// Bytes read when sniffing file content.
const SNIFF_LEN: usize = 512;

/// A shared, interned MIME type such as `text/plain`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MimeType(Arc<str>);

impl MimeType {
    pub fn new(essence: &str) -> Self {
        Self(Arc::from(essence))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before the `/`, e.g. `image`.
    pub fn media_type(&self) -> &str {
        self.0.split_once('/').map(|(m, _)| m).unwrap_or(&self.0)
    }

    /// The part after the `/`, e.g. `png`.
    pub fn subtype(&self) -> &str {
        self.0.split_once('/').map(|(_, s)| s).unwrap_or("")
    }
}

impl fmt::Debug for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MimeType({})", self.0)
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Well-known types the resolver assigns directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentinel {
    TextPlain,
    OctetStream,
    Executable,
    ShellScript,
    DesktopEntry,
    MountPoint,
}

impl Sentinel {
    pub fn essence(self) -> &'static str {
        match self {
            Sentinel::TextPlain => "text/plain",
            Sentinel::OctetStream => "application/octet-stream",
            Sentinel::Executable => "application/x-executable",
            Sentinel::ShellScript => "application/x-shellscript",
            Sentinel::DesktopEntry => "application/x-desktop",
            Sentinel::MountPoint => "inode/mount-point",
        }
    }
}

/// Process-wide MIME database.
pub trait MimeRegistry: Send + Sync {
    /// Guesses a type from the path (and optionally the content).
    /// `None` means nothing matched.
    fn classify(&self, path: &Path) -> Option<MimeType>;

    /// One of the sentinel types.
    fn sentinel(&self, which: Sentinel) -> MimeType;

    /// The `inode/*` type used when nothing more specific is known.
    fn for_base_type(&self, base_type: BaseType) -> MimeType;
}

/// Registry backed by `mime_guess`'s extension table.
pub struct GuessMimeRegistry {
    interned: Mutex<HashMap<String, MimeType>>,
    sniff_content: bool,
}

impl GuessMimeRegistry {
    pub fn new() -> Self {
        Self {
            interned: Mutex::new(HashMap::new()),
            sniff_content: false,
        }
    }

    /// Fall back to looking at the first bytes when the name says nothing.
    #[must_use]
    pub fn with_sniffing(self, sniff_content: bool) -> Self {
        Self {
            sniff_content,
            ..self
        }
    }

    /// Returns the shared handle for `essence`, creating it once.
    pub fn intern(&self, essence: &str) -> MimeType {
        let mut interned = self.interned.lock();
        if let Some(mime) = interned.get(essence) {
            return mime.clone();
        }
        let mime = MimeType::new(essence);
        interned.insert(essence.to_owned(), mime.clone());
        mime
    }

    fn sniff(&self, path: &Path) -> Option<MimeType> {
        let mut buf = [0u8; SNIFF_LEN];
        let n = std::fs::File::open(path)
            .and_then(|mut f| f.read(&mut buf))
            .ok()?;
        let head = &buf[..n];
        let essence = if head.starts_with(b"#!") {
            Sentinel::ShellScript.essence()
        } else if head.starts_with(b"\x7fELF") {
            Sentinel::Executable.essence()
        } else if head.starts_with(b"\x89PNG\r\n\x1a\n") {
            "image/png"
        } else if head.starts_with(b"GIF8") {
            "image/gif"
        } else if head.starts_with(b"\xff\xd8\xff") {
            "image/jpeg"
        } else if head.starts_with(b"%PDF-") {
            "application/pdf"
        } else {
            return None;
        };
        Some(self.intern(essence))
    }
}

impl Default for GuessMimeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MimeRegistry for GuessMimeRegistry {
    fn classify(&self, path: &Path) -> Option<MimeType> {
        let is_desktop = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("desktop"));
        if is_desktop {
            return Some(self.sentinel(Sentinel::DesktopEntry));
        }

        match mime_guess::from_path(path).first() {
            Some(guess) => Some(self.intern(guess.essence_str())),
            None if self.sniff_content => self.sniff(path),
            None => None,
        }
    }

    fn sentinel(&self, which: Sentinel) -> MimeType {
        self.intern(which.essence())
    }

    fn for_base_type(&self, base_type: BaseType) -> MimeType {
        let essence = match base_type {
            BaseType::Unknown => "inode/unknown",
            BaseType::Error => "inode/error",
            BaseType::File => "text/plain",
            BaseType::Directory => "inode/directory",
            BaseType::Pipe => "inode/fifo",
            BaseType::Socket => "inode/socket",
            BaseType::CharDevice => "inode/chardevice",
            BaseType::BlockDevice => "inode/blockdevice",
            BaseType::Special => "inode/unknown",
        };
        self.intern(essence)
    }
}
