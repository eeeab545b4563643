//! Refreshing directory entries from the filesystem.
//!
//! [`DirEntryResolver::restat`] builds a complete [`EntryRecord`] without
//! holding any lock, then publishes it into the entry in one swap. Two
//! restats of the same entry may race; whichever publishes last wins.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::settings::Config;
use crate::error::CoreResult;
use crate::fs::appdir::AppDirScanner;
use crate::fs::classify::{classify, BaseType, StatInfo};
use crate::fs::entry::{DirEntry, EntryRecord, ItemFlags};
use crate::fs::mount::MountTable;
use crate::fs::overrides::IconOverrides;
use crate::fs::probe::{probe_attributes, probe_mount, read_label, RecentClock};
use crate::icons::{IconCache, IconHandle};
use crate::mime::{MimeRegistry, MimeType, Sentinel};

pub struct DirEntryResolver {
    mime: Arc<dyn MimeRegistry>,
    icons: Arc<dyn IconCache>,
    mounts: Arc<dyn MountTable>,
    overrides: IconOverrides,
    clock: RecentClock,
    scanner: AppDirScanner,
}

impl DirEntryResolver {
    pub fn new(
        mime: Arc<dyn MimeRegistry>,
        icons: Arc<dyn IconCache>,
        mounts: Arc<dyn MountTable>,
    ) -> Self {
        Self {
            scanner: AppDirScanner::new(icons.clone()),
            mime,
            icons,
            mounts,
            overrides: IconOverrides::new(),
            clock: RecentClock::default(),
        }
    }

    /// Builds a resolver with the window, size ceiling and overrides from
    /// `config`.
    pub fn from_config(
        config: &Config,
        mime: Arc<dyn MimeRegistry>,
        icons: Arc<dyn IconCache>,
        mounts: Arc<dyn MountTable>,
    ) -> CoreResult<Self> {
        let overrides = IconOverrides::from_config(&config.icons.overrides)?;
        Ok(Self::new(mime, icons, mounts)
            .with_overrides(overrides)
            .with_recent_window(config.metadata.recent_window_secs)
            .with_max_icon_size(config.metadata.max_icon_size))
    }

    #[must_use]
    pub fn with_overrides(self, overrides: IconOverrides) -> Self {
        Self { overrides, ..self }
    }

    #[must_use]
    pub fn with_recent_window(self, window_secs: i64) -> Self {
        Self {
            clock: RecentClock::new(window_secs),
            ..self
        }
    }

    #[must_use]
    pub fn with_max_icon_size(self, max_icon_size: u64) -> Self {
        Self {
            scanner: self.scanner.with_max_icon_size(max_icon_size),
            ..self
        }
    }

    pub fn clock(&self) -> &RecentClock {
        &self.clock
    }

    pub fn icons(&self) -> &Arc<dyn IconCache> {
        &self.icons
    }

    pub fn mime(&self) -> &Arc<dyn MimeRegistry> {
        &self.mime
    }

    /// Moves the "recent" reference to now and re-reads the live mount
    /// table. Call once before a batch.
    pub fn begin_batch(&self) {
        self.clock.refresh();
        if self.mounts.refresh() {
            tracing::debug!("mount table changed");
        }
    }

    /// Re-reads the live mount table. Returns `true` if it changed.
    pub fn refresh_mounts(&self) -> bool {
        self.mounts.refresh()
    }

    /// Brings `entry` up to date with the file at `path`.
    ///
    /// `parent` is the containing directory's stat, if the caller has it;
    /// it saves a stat per directory. Failures never propagate: an entry
    /// that cannot be stat'd becomes an `Error` record.
    pub fn restat(
        &self,
        path: &Path,
        entry: &DirEntry,
        parent: Option<&StatInfo>,
        examine_now: bool,
    ) {
        let (record, image) = self.build_record(path, entry.leafname(), parent);
        let examine = examine_now && record.flags.contains(ItemFlags::NEED_EXAMINE);
        entry.publish(record, image);

        if examine {
            self.examine(path, entry);
        }
    }

    fn build_record(
        &self,
        path: &Path,
        leafname: &str,
        parent: Option<&StatInfo>,
    ) -> (EntryRecord, Option<IconHandle>) {
        let classification = classify(path);
        let Some(link_info) = classification.link_info else {
            let mut record = EntryRecord::failed(classification.errno);
            record.mime_type = Some(self.mime.for_base_type(BaseType::Error));
            return (record, None);
        };

        let mut record = EntryRecord {
            base_type: classification.base_type,
            mode: link_info.mode,
            size: link_info.size,
            uid: link_info.uid,
            gid: link_info.gid,
            mtime: link_info.mtime,
            ctime: link_info.ctime,
            atime: link_info.atime,
            lstat_errno: 0,
            mime_type: None,
            flags: probe_attributes(path, &link_info, &self.clock),
            label: read_label(path),
        };

        // Symlink targets are probed through their canonical path.
        let target: PathBuf = if classification.symlink {
            record.flags |= ItemFlags::SYMLINK;
            std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
        } else {
            path.to_path_buf()
        };
        let info = classification.info.unwrap_or(link_info);
        let mut image = None;

        match record.base_type {
            BaseType::Directory => {
                record.size = 0;
                let hint = if classification.symlink { None } else { parent };
                record.flags |= probe_mount(self.mounts.as_ref(), &target, &info, hint);

                image = self.override_icon(path);
                if record.flags.contains(ItemFlags::MOUNT_POINT) {
                    record.mime_type = Some(self.mime.sentinel(Sentinel::MountPoint));
                } else if !info.is_world_writable() {
                    record.flags |= ItemFlags::NEED_EXAMINE;
                }
            }
            BaseType::File => {
                record.mime_type = self.file_type(&target, leafname, &info, &mut record.flags);
                image = self.override_icon(path);
                let is_desktop = record
                    .mime_type
                    .as_ref()
                    .is_some_and(|m| *m == self.mime.sentinel(Sentinel::DesktopEntry));
                if is_desktop && image.is_none() {
                    image = self.icons.desktop_icon(path);
                }
            }
            _ => image = self.override_icon(path),
        }

        if record.mime_type.is_none() {
            record.mime_type = Some(self.mime.for_base_type(record.base_type));
        }
        (record, image)
    }

    /// MIME type of a regular file, adjusted for its execute bits.
    fn file_type(
        &self,
        target: &Path,
        leafname: &str,
        info: &StatInfo,
        flags: &mut ItemFlags,
    ) -> Option<MimeType> {
        let mut mime = self.mime.classify(target);
        let octet = self.mime.sentinel(Sentinel::OctetStream);
        let text = self.mime.sentinel(Sentinel::TextPlain);
        let desktop = self.mime.sentinel(Sentinel::DesktopEntry);

        if info.is_executable() {
            *flags |= ItemFlags::EXEC_FILE;
            if mime.is_none() || mime.as_ref() == Some(&octet) {
                mime = Some(self.mime.sentinel(Sentinel::Executable));
            } else if mime.as_ref() == Some(&text) && !leafname.contains('.') {
                mime = Some(self.mime.sentinel(Sentinel::ShellScript));
            }
        } else if mime.as_ref() == Some(&desktop) {
            *flags |= ItemFlags::EXEC_FILE;
        }

        Some(mime.unwrap_or(text))
    }

    fn override_icon(&self, path: &Path) -> Option<IconHandle> {
        let icon = self.overrides.icon_for(path)?;
        self.icons.lookup_by_path(icon)
    }

    /// Runs the AppDir probe on a directory entry and publishes the result.
    ///
    /// Returns `true` if the child count changed or a different icon was
    /// installed.
    pub fn examine(&self, path: &Path, entry: &DirEntry) -> bool {
        let scan = self.scanner.scan(path);

        entry.update(|record, image| {
            let old_size = record.size;
            if let Some(count) = scan.child_count {
                record.size = count;
            }
            record.flags.remove(ItemFlags::NEED_EXAMINE);
            record.flags.set(ItemFlags::APP_DIR, scan.is_app_dir);

            let icon_changed = match (&scan.icon, image.as_ref()) {
                (Some(new), Some(old)) => !Arc::ptr_eq(new, old),
                (Some(_), None) => true,
                (None, _) => false,
            };
            if let Some(icon) = scan.icon {
                *image = Some(icon);
            }
            icon_changed || record.size != old_size
        })
    }

    /// The icon to draw for `entry`, filling in a default if none has been
    /// resolved yet. Safe to call from any thread and idempotent.
    pub fn resolve_display_icon(&self, entry: &DirEntry) -> Option<IconHandle> {
        entry.image_or_insert_with(|record| match record.base_type {
            BaseType::Unknown => None,
            BaseType::Error => Some(self.icons.error_icon()),
            base_type => {
                let mime = record
                    .mime_type
                    .clone()
                    .unwrap_or_else(|| self.mime.for_base_type(base_type));
                Some(self.icons.lookup_by_mime_type(&mime))
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fs::entry::ID_UNKNOWN;
    use crate::fs::mount::SystemMountTable;
    use crate::icons::{FsIconCache, IconSource};
    use crate::mime::GuessMimeRegistry;
    use std::fs;
    use tempfile::TempDir;

    pub(crate) fn resolver() -> (DirEntryResolver, Arc<FsIconCache>) {
        let icons = Arc::new(FsIconCache::new());
        let resolver = DirEntryResolver::new(
            Arc::new(GuessMimeRegistry::new()),
            icons.clone(),
            Arc::new(SystemMountTable::with_mtab("/nonexistent/mounts", Vec::new())),
        );
        (resolver, icons)
    }

    fn restat(resolver: &DirEntryResolver, path: &Path, examine: bool) -> DirEntry {
        let entry = DirEntry::new(path.file_name().unwrap().to_string_lossy());
        resolver.restat(path, &entry, None, examine);
        entry
    }

    #[test]
    fn missing_path_becomes_error_record() {
        let tmp = TempDir::new().unwrap();
        let (resolver, _) = resolver();
        let entry = restat(&resolver, &tmp.path().join("gone"), false);

        let record = entry.record();
        assert_eq!(record.base_type, BaseType::Error);
        assert_eq!(record.size, 0);
        assert_eq!(record.uid, ID_UNKNOWN);
        assert_eq!(record.gid, ID_UNKNOWN);
        assert_eq!(record.lstat_errno, 2);
        assert_eq!(record.mime_type.as_ref().unwrap().as_str(), "inode/error");
        assert!(!record.flags.contains(ItemFlags::NEED_RESCAN_QUEUE));
    }

    #[test]
    fn unmount_is_seen_at_next_batch() {
        let tmp = TempDir::new().unwrap();
        let mtab = tmp.path().join("mounts");
        let mnt = tmp.path().join("mnt");
        fs::create_dir(&mnt).unwrap();
        fs::write(&mtab, format!("dev {} ext4 rw 0 0\n", mnt.display())).unwrap();
        let resolver = DirEntryResolver::new(
            Arc::new(GuessMimeRegistry::new()),
            Arc::new(FsIconCache::new()),
            Arc::new(SystemMountTable::with_mtab(&mtab, Vec::new())),
        );

        let record = restat(&resolver, &mnt, false).record();
        assert!(record.flags.contains(ItemFlags::MOUNTED));
        assert_eq!(
            record.mime_type.as_ref().unwrap().as_str(),
            "inode/mount-point"
        );

        fs::write(&mtab, "").unwrap();
        resolver.begin_batch();
        let record = restat(&resolver, &mnt, false).record();
        assert!(!record.flags.contains(ItemFlags::MOUNTED));
        assert!(!record.flags.contains(ItemFlags::MOUNT_POINT));
        assert!(record.flags.contains(ItemFlags::NEED_EXAMINE));
        assert_eq!(record.mime_type.as_ref().unwrap().as_str(), "inode/directory");
    }

    #[test]
    fn regular_file_gets_mime_and_size() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.txt");
        fs::write(&path, "hello").unwrap();
        let (resolver, _) = resolver();

        let record = restat(&resolver, &path, false).record();
        assert_eq!(record.base_type, BaseType::File);
        assert_eq!(record.size, 5);
        assert_eq!(record.mime_type.as_ref().unwrap().as_str(), "text/plain");
        assert!(!record.flags.contains(ItemFlags::EXEC_FILE));
    }

    #[test]
    fn unknown_file_falls_back_to_text() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data.zzqq");
        fs::write(&path, "x").unwrap();
        let (resolver, _) = resolver();

        let record = restat(&resolver, &path, false).record();
        assert_eq!(record.mime_type.as_ref().unwrap().as_str(), "text/plain");
    }

    #[cfg(unix)]
    #[test]
    fn executable_rules() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let make = |name: &str| {
            let path = tmp.path().join(name);
            fs::write(&path, "x").unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        };
        let (resolver, _) = resolver();

        let binary = restat(&resolver, &make("tool"), false).record();
        assert!(binary.flags.contains(ItemFlags::EXEC_FILE));
        assert_eq!(
            binary.mime_type.as_ref().unwrap().as_str(),
            "application/x-executable"
        );

        let text = restat(&resolver, &make("notes.txt"), false).record();
        assert!(text.flags.contains(ItemFlags::EXEC_FILE));
        assert_eq!(text.mime_type.as_ref().unwrap().as_str(), "text/plain");

        let script = restat(&resolver, &make("run.sh"), false).record();
        assert!(script.flags.contains(ItemFlags::EXEC_FILE));
        assert_ne!(
            script.mime_type.as_ref().unwrap().as_str(),
            "application/x-executable"
        );
    }

    #[test]
    fn desktop_entry_is_executable_without_bits() {
        let tmp = TempDir::new().unwrap();
        let icon = tmp.path().join("app.png");
        fs::write(&icon, b"png").unwrap();
        let path = tmp.path().join("app.desktop");
        fs::write(&path, format!("[Desktop Entry]\nIcon={}\n", icon.display())).unwrap();
        let (resolver, _) = resolver();

        let entry = restat(&resolver, &path, false);
        let (record, image) = entry.snapshot();
        assert!(record.flags.contains(ItemFlags::EXEC_FILE));
        assert_eq!(
            record.mime_type.as_ref().unwrap().as_str(),
            "application/x-desktop"
        );
        assert_eq!(image.unwrap().source(), &IconSource::File(icon));
    }

    #[test]
    fn directory_needs_examine_and_has_zero_size() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("sub");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("a"), "").unwrap();
        let (resolver, _) = resolver();

        let record = restat(&resolver, &dir, false).record();
        assert_eq!(record.base_type, BaseType::Directory);
        assert_eq!(record.size, 0);
        assert!(record.flags.contains(ItemFlags::NEED_EXAMINE));
        assert_eq!(record.mime_type.as_ref().unwrap().as_str(), "inode/directory");
    }

    #[cfg(unix)]
    #[test]
    fn world_writable_directory_is_not_examined() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("shared");
        fs::create_dir(&dir).unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o777)).unwrap();
        let (resolver, _) = resolver();

        let record = restat(&resolver, &dir, true).record();
        assert!(!record.flags.contains(ItemFlags::NEED_EXAMINE));
        assert!(!record.flags.contains(ItemFlags::APP_DIR));
        assert_eq!(record.size, 0);
    }

    #[test]
    fn static_mount_gets_mountpoint_type() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("cdrom");
        fs::create_dir(&dir).unwrap();
        let resolver = DirEntryResolver::new(
            Arc::new(GuessMimeRegistry::new()),
            Arc::new(FsIconCache::new()),
            Arc::new(SystemMountTable::with_mtab(
                "/nonexistent/mounts",
                vec![dir.clone()],
            )),
        );

        let record = restat(&resolver, &dir, true).record();
        assert!(record.flags.contains(ItemFlags::MOUNT_POINT));
        assert!(!record.flags.contains(ItemFlags::MOUNTED));
        assert!(!record.flags.contains(ItemFlags::NEED_EXAMINE));
        assert_eq!(
            record.mime_type.as_ref().unwrap().as_str(),
            "inode/mount-point"
        );
    }

    #[cfg(unix)]
    #[test]
    fn examine_now_detects_app_dir() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let app = tmp.path().join("app");
        fs::create_dir(&app).unwrap();
        let run = app.join("AppRun");
        fs::write(&run, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&run, fs::Permissions::from_mode(0o755)).unwrap();
        let (resolver, icons) = resolver();

        let (record, image) = restat(&resolver, &app, true).snapshot();
        assert!(record.flags.contains(ItemFlags::APP_DIR));
        assert!(!record.flags.contains(ItemFlags::NEED_EXAMINE));
        assert_eq!(record.size, 1);
        assert!(Arc::ptr_eq(&image.unwrap(), &icons.app_dir_fallback()));
    }

    #[test]
    fn examine_reports_count_changes() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("sub");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("a"), "").unwrap();
        fs::write(dir.join("b"), "").unwrap();
        let (resolver, _) = resolver();

        let entry = restat(&resolver, &dir, false);
        assert!(resolver.examine(&dir, &entry), "0 -> 2 is a change");
        assert_eq!(entry.record().size, 2);
        assert!(!resolver.examine(&dir, &entry), "nothing changed");

        fs::write(dir.join("c"), "").unwrap();
        assert!(resolver.examine(&dir, &entry));
        assert_eq!(entry.record().size, 3);
    }

    #[test]
    fn examine_reports_new_icon() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("sub");
        fs::create_dir(&dir).unwrap();
        let (resolver, _) = resolver();

        let entry = restat(&resolver, &dir, true);
        assert!(entry.image().is_none());

        fs::write(dir.join(".DirIcon"), b"png").unwrap();
        assert!(resolver.examine(&dir, &entry));
        assert!(entry.image().is_some());
        assert!(!resolver.examine(&dir, &entry), "same cached icon");
    }

    #[test]
    fn restat_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        fs::write(&path, "abc").unwrap();
        let (resolver, _) = resolver();

        let entry = DirEntry::new("a.txt");
        resolver.restat(&path, &entry, None, true);
        let first = entry.record();
        resolver.restat(&path, &entry, None, true);
        assert_eq!(*first, *entry.record());
    }

    #[test]
    fn recent_uses_batch_reference() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        fs::write(&path, "abc").unwrap();
        let (resolver, _) = resolver();

        resolver.begin_batch();
        assert!(restat(&resolver, &path, false)
            .record()
            .flags
            .contains(ItemFlags::RECENT));

        let info = StatInfo::lstat(&path).unwrap();
        resolver
            .clock()
            .set_reference(info.mtime.max(info.ctime) + resolver.clock().window_secs());
        assert!(!restat(&resolver, &path, false)
            .record()
            .flags
            .contains(ItemFlags::RECENT));
    }

    #[cfg(unix)]
    #[test]
    fn broken_symlink_keeps_symlink_flag() {
        let tmp = TempDir::new().unwrap();
        let link = tmp.path().join("dangling");
        std::os::unix::fs::symlink(tmp.path().join("nowhere"), &link).unwrap();
        let (resolver, _) = resolver();

        let record = restat(&resolver, &link, false).record();
        assert_eq!(record.base_type, BaseType::Error);
        assert!(record.flags.contains(ItemFlags::SYMLINK));
        assert_eq!(record.lstat_errno, 0);
        assert!(matches!(
            record.error(&link),
            Some(crate::error::CoreError::BrokenSymlink(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_uses_target_mime_type() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("photo.png");
        fs::write(&target, b"png").unwrap();
        let link = tmp.path().join("shortcut");
        std::os::unix::fs::symlink(&target, &link).unwrap();
        let (resolver, _) = resolver();

        let record = restat(&resolver, &link, false).record();
        assert_eq!(record.base_type, BaseType::File);
        assert!(record.flags.contains(ItemFlags::SYMLINK));
        assert_eq!(record.mime_type.as_ref().unwrap().as_str(), "image/png");
    }

    #[test]
    fn override_icon_applies_to_any_type() {
        let tmp = TempDir::new().unwrap();
        let icon = tmp.path().join("special.png");
        fs::write(&icon, b"png").unwrap();
        let dir = tmp.path().join("music");
        fs::create_dir(&dir).unwrap();
        let pattern = format!("{}/mu*", tmp.path().display());
        let (resolver, _) = resolver();
        let resolver = resolver.with_overrides(IconOverrides::new().with_rule(&pattern, &icon).unwrap());

        let entry = restat(&resolver, &dir, false);
        assert_eq!(entry.image().unwrap().source(), &IconSource::File(icon));
    }

    #[test]
    fn display_icon_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        fs::write(&path, "x").unwrap();
        let (resolver, icons) = resolver();

        let unknown = DirEntry::new("never-statted");
        assert!(resolver.resolve_display_icon(&unknown).is_none());

        let broken = restat(&resolver, &tmp.path().join("gone"), false);
        let icon = resolver.resolve_display_icon(&broken).unwrap();
        assert!(Arc::ptr_eq(&icon, &icons.error_icon()));

        let file = restat(&resolver, &path, false);
        let first = resolver.resolve_display_icon(&file).unwrap();
        let second = resolver.resolve_display_icon(&file).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            first.source(),
            &IconSource::MimeType(MimeType::new("text/plain"))
        );
    }

    #[test]
    fn concurrent_restats_publish_whole_records() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("file.txt");
        fs::write(&file, "0123456789").unwrap();
        let dir = tmp.path().join("dir");
        fs::create_dir(&dir).unwrap();

        let (resolver, _) = resolver();
        let resolver = Arc::new(resolver);
        let entry = Arc::new(DirEntry::new("shared"));

        let writers: Vec<_> = [file.clone(), dir.clone()]
            .into_iter()
            .map(|path| {
                let resolver = resolver.clone();
                let entry = entry.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        resolver.restat(&path, &entry, None, false);
                    }
                })
            })
            .collect();

        let reader = {
            let entry = entry.clone();
            std::thread::spawn(move || {
                for _ in 0..2000 {
                    let record = entry.record();
                    // Each record must be wholly from one source.
                    match record.base_type {
                        BaseType::File => {
                            assert_eq!(record.size, 10);
                            assert_eq!(record.mime_type.as_ref().unwrap().as_str(), "text/plain");
                            assert!(!record.flags.contains(ItemFlags::NEED_EXAMINE));
                        }
                        BaseType::Directory => {
                            assert_eq!(record.size, 0);
                            assert_eq!(
                                record.mime_type.as_ref().unwrap().as_str(),
                                "inode/directory"
                            );
                            assert!(record.flags.contains(ItemFlags::NEED_EXAMINE));
                        }
                        BaseType::Unknown => assert!(record.mime_type.is_none()),
                        other => panic!("unexpected base type {other:?}"),
                    }
                }
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        reader.join().unwrap();

        let last = entry.record();
        assert!(matches!(last.base_type, BaseType::File | BaseType::Directory));
    }
}
