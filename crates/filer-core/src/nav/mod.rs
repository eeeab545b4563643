//! Navigation helpers: symbolic path handling and saved selection
//! [`groups::GroupStore`]s.

pub mod groups;
pub mod path;
