//! Plain-text rendering of a window's contents.

use std::fmt::Write as _;
use std::sync::Arc;

use filer_core::fs::entry::{DirEntry, ItemFlags};
use filer_core::nfc_string;

const FLAG_COLUMNS: [(ItemFlags, char); 7] = [
    (ItemFlags::SYMLINK, 'l'),
    (ItemFlags::APP_DIR, 'A'),
    (ItemFlags::MOUNT_POINT, 'm'),
    (ItemFlags::MOUNTED, 'M'),
    (ItemFlags::EXEC_FILE, 'x'),
    (ItemFlags::HAS_XATTR, '@'),
    (ItemFlags::RECENT, 'r'),
];

/// One line per entry: flags, size, MIME type, name and label.
pub fn format_entry(entry: &DirEntry) -> String {
    let record = entry.record();
    let flags: String = FLAG_COLUMNS
        .iter()
        .map(|(flag, ch)| if record.flags.contains(*flag) { *ch } else { '-' })
        .collect();
    let mime = record
        .mime_type
        .as_ref()
        .map_or_else(|| record.base_type.label().to_string(), |m| m.to_string());
    let mut line = format!(
        "{flags} {:>10} {:<32} {}",
        record.size,
        mime,
        nfc_string(entry.leafname())
    );
    if let Some(label) = &record.label {
        let _ = write!(line, " [{label}]");
    }
    line
}

/// The title followed by every entry.
pub fn render(title: &str, entries: &[Arc<DirEntry>]) -> String {
    let mut out = format!("{title}\n");
    for entry in entries {
        out.push_str(&format_entry(entry));
        out.push('\n');
    }
    out
}
