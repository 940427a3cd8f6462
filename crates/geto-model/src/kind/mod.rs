mod max_concurrent;
pub use max_concurrent::MaxConcurrent;

mod script;
pub use script::Script;
