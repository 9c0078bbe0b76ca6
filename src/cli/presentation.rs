//! CLI presentation: text and json formatters per command family.

mod cache;
mod chat;
mod sessions;
mod shared;
mod workflow;

pub use cache::{format_cache_clear, format_cache_stats};
pub use chat::format_chat_response;
pub use sessions::{format_session_delete, format_session_list, format_session_show};
pub use workflow::{format_session_outcome, format_workflow_summary};
