//! Logging setup shared by geto binaries.
//!
//! Everything goes to stderr (or journald), leaving stdout to command output.

mod logger;
pub use logger::*;
