//! Shared infrastructure for certwatch components.
//!
//! Currently this hosts the logging configuration used by the scanner binary
//! and by integration harnesses. Keeping it in its own crate lets future
//! components (an API front end, operational tooling) share the same setup.

pub mod logging;
