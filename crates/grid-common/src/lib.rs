//! Common types and utilities shared across the grid data workspace.

pub mod error;
pub mod extents;
pub mod time;

pub use error::{GridError, Result};
pub use extents::Extents;
pub use time::{parse_time_stamp, TimeStep};
