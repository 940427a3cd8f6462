//! Plain data shared by the geto crates.
//!
//! Nothing here talks to a host or touches the dispatch protocol; these are the records the engine reads and produces.

mod error;
pub use error::ModelError;

mod domain;
pub use domain::*;

mod kind;
pub use kind::*;
