//! Filesystem side of the filer: classifying paths, probing attributes,
//! recognising application directories and keeping [`entry::DirEntry`]
//! records up to date.
//!
//! [`resolver::DirEntryResolver`] ties the pieces together; everything
//! else here is a building block it calls.

pub mod appdir;
pub mod classify;
pub mod entry;
pub mod mount;
pub mod overrides;
pub mod pool;
pub mod probe;
pub mod resolver;

pub use appdir::{AppDirScan, AppDirScanner};
pub use classify::{classify, BaseType, Classification, StatInfo};
pub use entry::{DirEntry, EntryRecord, ItemFlags};
pub use mount::{MountTable, SystemMountTable};
pub use overrides::IconOverrides;
pub use pool::{RestatJob, RestatPool};
pub use probe::RecentClock;
pub use resolver::DirEntryResolver;
