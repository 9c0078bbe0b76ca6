//! Workflow step schema and merge semantics.
//!
//! A tool's reply is parsed into a [`StepResult`] where every field is optional. Folding
//! a result into [`WorkflowState`] applies a fixed rule per field:
//!
//! | field                 | rule                                              |
//! |-----------------------|---------------------------------------------------|
//! | `step_number`         | ignored; the engine numbers steps                 |
//! | `total_steps`         | replace when present, never below `current_step`  |
//! | `next_step_required`  | replace; absent means the tool is done            |
//! | `findings`            | replace when present and non-empty                |
//! | `files_checked`       | append, order-preserving dedupe                   |
//! | `relevant_files`      | replace when present                              |
//! | `relevant_context`    | replace when present                              |
//! | `issues_found`        | append, dedupe                                    |
//! | `hypotheses`          | append, dedupe                                    |
//! | `confidence`          | replace when present                              |
//! | other keys            | merged into `metadata`                            |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Confidence level reported by a workflow tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Exploring,
    Low,
    Medium,
    High,
    VeryHigh,
    AlmostCertain,
    Certain,
}

impl Confidence {
    pub const ALL: [Confidence; 7] = [
        Confidence::Exploring,
        Confidence::Low,
        Confidence::Medium,
        Confidence::High,
        Confidence::VeryHigh,
        Confidence::AlmostCertain,
        Confidence::Certain,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Exploring => "exploring",
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
            Confidence::VeryHigh => "very_high",
            Confidence::AlmostCertain => "almost_certain",
            Confidence::Certain => "certain",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidence {
    type Err = String;

    /// Accepts `very_high`, `very-high` and `Very High` alike.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Confidence::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown confidence '{}' (expected one of: {})",
                    s,
                    Confidence::ALL.map(|c| c.as_str()).join(", ")
                )
            })
    }
}

/// A problem reported by a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(default = "default_severity")]
    pub severity: String,
    pub description: String,
}

fn default_severity() -> String {
    "medium".to_string()
}

impl Issue {
    pub fn new(severity: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            severity: severity.into(),
            description: description.into(),
        }
    }
}

/// Partial step reply. Every field is optional; see the module docs for merge rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step_required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub findings: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_checked: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevant_files: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevant_context: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issues_found: Option<Vec<Issue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hypotheses: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    /// Free-form answer text, when the tool sends one alongside the step fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

const KNOWN_FIELDS: &[&str] = &[
    "step_number",
    "total_steps",
    "next_step_required",
    "findings",
    "files_checked",
    "relevant_files",
    "relevant_context",
    "issues_found",
    "hypotheses",
    "hypothesis",
    "confidence",
    "content",
    "metadata",
];

impl StepResult {
    /// Parse a tool reply. Returns `None` when the text is not a JSON object,
    /// which callers treat as a final, unstructured answer.
    ///
    /// The object may be bare or wrapped in a fenced code block. Field values are read
    /// leniently: numbers may arrive as strings, single strings stand in for lists, and
    /// an unrecognized confidence is dropped rather than failing the step.
    pub fn parse(raw: &str) -> Option<Self> {
        let body = strip_code_fence(raw);
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => Some(Self::from_map(map)),
            _ => None,
        }
    }

    pub fn from_map(mut map: Map<String, Value>) -> Self {
        let mut hypotheses = map.get("hypotheses").and_then(string_list);
        if let Some(single) = map.get("hypothesis").and_then(string_value) {
            hypotheses.get_or_insert_with(Vec::new).push(single);
        }

        let mut metadata = match map.remove("metadata") {
            Some(Value::Object(inner)) => inner,
            _ => Map::new(),
        };

        let result = Self {
            step_number: map.get("step_number").and_then(u32_value),
            total_steps: map.get("total_steps").and_then(u32_value),
            next_step_required: map.get("next_step_required").and_then(bool_value),
            findings: map.get("findings").and_then(string_value),
            files_checked: map.get("files_checked").and_then(string_list),
            relevant_files: map.get("relevant_files").and_then(string_list),
            relevant_context: map.get("relevant_context").and_then(string_list),
            issues_found: map.get("issues_found").and_then(issue_list),
            hypotheses,
            confidence: map
                .get("confidence")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok()),
            content: map.get("content").and_then(string_value),
            metadata: Map::new(),
        };

        for (key, value) in map {
            if !KNOWN_FIELDS.contains(&key.as_str()) {
                metadata.insert(key, value);
            }
        }
        Self { metadata, ..result }
    }

    /// Text to show as this step's answer.
    pub fn display_text(&self) -> Option<&str> {
        self.content
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.findings.as_deref().filter(|s| !s.trim().is_empty()))
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening fence line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn u32_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn bool_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn string_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(items.iter().filter_map(string_value).collect()),
        Value::String(s) if s.trim().is_empty() => Some(Vec::new()),
        Value::String(s) => Some(vec![s.clone()]),
        _ => None,
    }
}

fn issue_list(value: &Value) -> Option<Vec<Issue>> {
    let Value::Array(items) = value else {
        return None;
    };
    Some(
        items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(Issue::new(default_severity(), s.clone())),
                Value::Object(_) => serde_json::from_value::<Issue>(item.clone()).ok(),
                _ => None,
            })
            .collect(),
    )
}

/// Arguments sent to a workflow tool for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepArguments {
    /// The goal or question driving the workflow.
    pub step: String,
    pub step_number: u32,
    pub total_steps: u32,
    pub next_step_required: bool,
    #[serde(default)]
    pub findings: String,
    #[serde(default)]
    pub files_checked: Vec<String>,
    #[serde(default)]
    pub relevant_files: Vec<String>,
    #[serde(default)]
    pub relevant_context: Vec<String>,
    #[serde(default)]
    pub issues_found: Vec<Issue>,
    #[serde(default)]
    pub hypotheses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_id: Option<String>,
    /// Extra fields from earlier replies, handed back to the tool unchanged.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// Tool-specific fields such as `analysis_type` or `framework`.
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl StepArguments {
    pub fn first_step(goal: impl Into<String>, total_steps: u32) -> Self {
        Self {
            step: goal.into(),
            step_number: 1,
            total_steps: total_steps.max(1),
            next_step_required: true,
            findings: String::new(),
            files_checked: Vec::new(),
            relevant_files: Vec::new(),
            relevant_context: Vec::new(),
            issues_found: Vec::new(),
            hypotheses: Vec::new(),
            confidence: None,
            model: None,
            provider: None,
            continuation_id: None,
            metadata: Map::new(),
            options: Map::new(),
        }
    }
}

/// Accumulated state of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub tool_name: String,
    pub continuation_id: String,
    pub current_step: u32,
    pub total_steps: u32,
    pub next_step_required: bool,
    #[serde(default)]
    pub findings: String,
    #[serde(default)]
    pub files_checked: Vec<String>,
    #[serde(default)]
    pub relevant_files: Vec<String>,
    #[serde(default)]
    pub relevant_context: Vec<String>,
    #[serde(default)]
    pub issues_found: Vec<Issue>,
    #[serde(default)]
    pub hypotheses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl WorkflowState {
    /// State as it stood when `arguments` were sent.
    pub fn from_arguments(tool_name: &str, continuation_id: &str, arguments: &StepArguments) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            continuation_id: continuation_id.to_string(),
            current_step: arguments.step_number.max(1),
            total_steps: arguments.total_steps.max(arguments.step_number).max(1),
            next_step_required: arguments.next_step_required,
            findings: arguments.findings.clone(),
            files_checked: arguments.files_checked.clone(),
            relevant_files: arguments.relevant_files.clone(),
            relevant_context: arguments.relevant_context.clone(),
            issues_found: arguments.issues_found.clone(),
            hypotheses: arguments.hypotheses.clone(),
            confidence: arguments.confidence,
            metadata: arguments.metadata.clone(),
        }
    }

    /// Fold one step reply into the state.
    ///
    /// `current_step` stays at the step the engine sent; a `step_number` echoed by the
    /// tool is not trusted.
    pub fn apply(&mut self, result: &StepResult) {
        if let Some(total) = result.total_steps {
            self.total_steps = total;
        }
        self.total_steps = self.total_steps.max(self.current_step);
        self.next_step_required = result.next_step_required.unwrap_or(false);

        if let Some(findings) = result.findings.as_ref().filter(|f| !f.trim().is_empty()) {
            self.findings = findings.clone();
        }
        if let Some(files) = &result.files_checked {
            append_unique(&mut self.files_checked, files);
        }
        if let Some(files) = &result.relevant_files {
            self.relevant_files = files.clone();
        }
        if let Some(context) = &result.relevant_context {
            self.relevant_context = context.clone();
        }
        if let Some(issues) = &result.issues_found {
            append_unique(&mut self.issues_found, issues);
        }
        if let Some(hypotheses) = &result.hypotheses {
            append_unique(&mut self.hypotheses, hypotheses);
        }
        if result.confidence.is_some() {
            self.confidence = result.confidence;
        }
        for (key, value) in &result.metadata {
            self.metadata.insert(key.clone(), value.clone());
        }
    }

    /// Arguments for the step after this one. `findings` replaces the carried-forward
    /// narrative when the caller supplies new text.
    pub fn next_arguments(&self, previous: &StepArguments, findings: Option<String>) -> StepArguments {
        let step_number = previous.step_number.max(self.current_step) + 1;
        StepArguments {
            step: previous.step.clone(),
            step_number,
            total_steps: self.total_steps.max(step_number),
            next_step_required: true,
            findings: findings.unwrap_or_else(|| self.findings.clone()),
            files_checked: self.files_checked.clone(),
            relevant_files: self.relevant_files.clone(),
            relevant_context: self.relevant_context.clone(),
            issues_found: self.issues_found.clone(),
            hypotheses: self.hypotheses.clone(),
            confidence: self.confidence,
            model: previous.model.clone(),
            provider: previous.provider.clone(),
            continuation_id: previous.continuation_id.clone(),
            metadata: self.metadata.clone(),
            options: previous.options.clone(),
        }
    }

    /// Move the state to the step `arguments` describe, before the tool runs.
    pub fn begin_step(&mut self, arguments: &StepArguments) {
        self.current_step = arguments.step_number.max(1);
        self.total_steps = self.total_steps.max(arguments.total_steps).max(self.current_step);
    }
}

fn append_unique<T: PartialEq + Clone>(target: &mut Vec<T>, items: &[T]) {
    for item in items {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}
