//! Integration tests for Conduit

mod test_utils;

mod cli_routing;
mod response_cache;
mod retry_controller;
mod session_store;
mod workflow_batch;
mod workflow_session;
