//! Framework-boundary extractors.

pub mod tenant;
