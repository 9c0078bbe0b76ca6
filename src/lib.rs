//! Conduit: LLM provider routing with resumable workflow tools
//!
//! Routes prompts to configured model providers behind a response cache and a retry
//! controller, and drives multi-step workflow tools to completion either in one batch
//! run or one step at a time through persisted sessions.

pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod lockfile;
pub mod logging;
pub mod provider;
pub mod retry;
pub mod session;
pub mod storage;
pub mod tools;
pub mod workflow;
