//! Save a project's working files as a zip, and restore one without
//! overwriting anything already on disk.
//!
//! The pipeline is `rules` -> `select` -> `archive` on the way out and
//! `restore` on the way back. `engine` ties these to a [`store::RemoteStore`].

pub mod archive;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod models;
pub mod paths;
pub mod restore;
pub mod rules;
pub mod select;
pub mod store;
pub mod templates;

pub use error::{Error, Result};
