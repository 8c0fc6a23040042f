//! autorec: automatic live-stream recorder.
//!
//! Watches a list of streamer page URLs and records their broadcasts the
//! moment they start, driving an external downloader such as streamlink.
//! Site specifics live behind the adapter interface in the [`sites`]
//! crate; this crate is the tracking engine around it.

pub mod config;
pub mod error;
pub mod tracker;
pub mod utils;

pub use error::{Error, Result};

// Re-exported so adapter implementors and tests depend on one crate.
pub use sites;
