//! Property-based tests for Conduit

mod cache_keys;
mod step_merge;
