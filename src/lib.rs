//! Basin - incremental watershed context builder
//!
//! Fetches hydrography, elevation and transportation sources for one
//! watershed, derives rasters and vector layers from them and records
//! everything in a project manifest. Reruns only redo what changed.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod ops;
pub mod pipeline;
pub mod raster;
pub mod segment;
pub mod ui;
pub mod vector;

pub use error::{BasinError, BasinResult};
