//! # xenlink Common
//!
//! Shared utilities for the xenlink binaries.
//!
//! ## Logging
//!
//! ```rust,ignore
//! use xenlink_common::{init_logging, LogFormat};
//!
//! // Human readable output, RUST_LOG wins over the level when set
//! init_logging("info").unwrap();
//!
//! // Or pick the format from configuration
//! xenlink_common::init_logging_with_format("debug", LogFormat::Json).unwrap();
//! ```

pub mod logging;

pub use logging::{init_logging, init_logging_json, init_logging_with_format, LogFormat};
