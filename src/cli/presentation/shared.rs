//! Shared presentation helpers.

use crate::error::{ApiError, StorageError};
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde::Serialize;

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::StorageError(StorageError::Serialization(e.to_string())))
}

pub(crate) fn heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

pub(crate) fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(header);
    table
}

/// Bulleted block, or nothing when `items` is empty.
pub(crate) fn bullet_section(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("\n{} ({}):\n", title, items.len()));
    for item in items {
        out.push_str(&format!("  - {}\n", item));
    }
}
