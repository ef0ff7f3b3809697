//! Tracks videos on followed channels until English subtitles show up.
//!
//! [`sync::Syncer`] polls channels through a [`fetcher::VideoSource`] and reconciles
//! what it finds into a [`library::Library`], which owns the entries, the filtered
//! views over them, the persistent store and the thumbnail pipeline.

pub mod collection;
pub mod config;
pub mod constants;
pub mod entry;
pub mod error;
pub mod fetcher;
pub mod format;
pub mod library;
pub mod store;
pub mod sync;
pub mod thumbnail;
pub mod view;

#[cfg(test)]
mod testing;
