//! Cache command presentation.

use crate::cache::CacheStats;
use crate::cli::parse::OutputFormat;
use crate::cli::presentation::shared::{table, to_json};
use crate::error::ApiError;
use serde_json::json;

fn megabytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

pub fn format_cache_stats(stats: Option<&CacheStats>, format: OutputFormat) -> Result<String, ApiError> {
    let Some(stats) = stats else {
        return match format {
            OutputFormat::Json => to_json(&json!({ "enabled": false })),
            OutputFormat::Text => Ok("Response cache is disabled.".to_string()),
        };
    };
    if format == OutputFormat::Json {
        return to_json(stats);
    }
    let lookups = stats.hits + stats.misses;
    let hit_rate = if lookups == 0 {
        "-".to_string()
    } else {
        format!("{:.1}%", stats.hits as f64 * 100.0 / lookups as f64)
    };
    let mut table = table(vec!["Metric", "Value"]);
    table.add_row(vec!["Backend".to_string(), stats.backend.clone()]);
    table.add_row(vec!["Entries".to_string(), stats.entries.to_string()]);
    table.add_row(vec!["Size".to_string(), megabytes(stats.total_size_bytes)]);
    if let Some(max) = stats.max_size_bytes {
        table.add_row(vec!["Max size".to_string(), megabytes(max)]);
    }
    if let Some(max) = stats.max_entries {
        table.add_row(vec!["Max entries".to_string(), max.to_string()]);
    }
    table.add_row(vec!["Hit rate".to_string(), hit_rate]);
    table.add_row(vec!["Evictions".to_string(), stats.evictions.to_string()]);
    Ok(table.to_string())
}

pub fn format_cache_clear(removed: Option<usize>, format: OutputFormat) -> Result<String, ApiError> {
    match (format, removed) {
        (OutputFormat::Json, removed) => to_json(&json!({ "cleared": removed.unwrap_or(0), "enabled": removed.is_some() })),
        (OutputFormat::Text, Some(n)) => Ok(format!("Removed {} cached response(s).", n)),
        (OutputFormat::Text, None) => Ok("Response cache is disabled.".to_string()),
    }
}
