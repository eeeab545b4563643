//! Filer windows: per-window state and the manager that drives them.

pub mod collab;
pub mod manager;
pub mod session;
pub mod thumbs;

pub use collab::{
    IconThumbnailer, LocalSelection, LogNotifier, Notifier, SelectionOwner, Thumbnailer,
};
pub use manager::WindowManager;
pub use session::{
    DisplayOptions, OpenOutcome, SelectionState, SelectionTarget, SessionId, SessionState,
    TargetCallback, WindowSession,
};
pub use thumbs::{ThumbProgress, ThumbnailQueue};
