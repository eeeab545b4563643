//! Wires the process-wide registries together.
//!
//! The MIME registry, icon cache and mount table are built once here and
//! handed to everything that needs them.

use std::sync::Arc;

use crate::config::settings::Config;
use crate::dir::{DirectoryCache, FsDirectoryCache, ScanMode};
use crate::error::CoreResult;
use crate::fs::mount::SystemMountTable;
use crate::fs::resolver::DirEntryResolver;
use crate::icons::{FsIconCache, IconCache};
use crate::mime::{GuessMimeRegistry, MimeRegistry};
use crate::nav::groups::GroupStore;
use crate::window::WindowManager;

pub struct FilerContext {
    config: Config,
    mime: Arc<dyn MimeRegistry>,
    icons: Arc<dyn IconCache>,
    resolver: Arc<DirEntryResolver>,
    cache: Arc<FsDirectoryCache>,
}

impl FilerContext {
    /// # Errors
    ///
    /// [`crate::CoreError::ConfigParse`] if an icon override pattern is
    /// invalid.
    pub fn from_config(config: Config, mode: ScanMode) -> CoreResult<Self> {
        let mime: Arc<dyn MimeRegistry> =
            Arc::new(GuessMimeRegistry::new().with_sniffing(config.metadata.sniff_content));
        let icons: Arc<dyn IconCache> =
            Arc::new(FsIconCache::with_max_size(config.metadata.max_icon_size));
        let mounts = Arc::new(SystemMountTable::new(config.static_mounts()));
        let resolver = Arc::new(DirEntryResolver::from_config(
            &config,
            mime.clone(),
            icons.clone(),
            mounts,
        )?);
        let cache = Arc::new(
            FsDirectoryCache::new(resolver.clone())
                .with_mode(mode)
                .with_workers(config.metadata.restat_workers),
        );
        tracing::debug!("filer context ready");

        Ok(Self {
            config,
            mime,
            icons,
            resolver,
            cache,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mime(&self) -> &Arc<dyn MimeRegistry> {
        &self.mime
    }

    pub fn icons(&self) -> &Arc<dyn IconCache> {
        &self.icons
    }

    pub fn resolver(&self) -> &Arc<DirEntryResolver> {
        &self.resolver
    }

    pub fn cache(&self) -> &Arc<FsDirectoryCache> {
        &self.cache
    }

    /// A window manager over this context, with the configured groups file
    /// loaded.
    pub fn window_manager(&self) -> WindowManager {
        let groups_file = self.config.groups_file();
        let groups = GroupStore::load(&groups_file);
        let cache: Arc<dyn DirectoryCache> = self.cache.clone();
        WindowManager::new(cache, self.icons.clone())
            .with_config(self.config.general.clone())
            .with_groups(groups, Some(groups_file))
    }
}
