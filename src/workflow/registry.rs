//! Tool identifiers and their step-1 defaults.
//!
//! Each tool kind maps to a [`StepDefaults`] descriptor holding the initial step
//! estimate and the tool-specific fields seeded into the first step's arguments.
//! The registry is validated once at startup.

use crate::error::ApiError;
use crate::workflow::{Confidence, StepArguments};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Debug,
    CodeReview,
    SecAudit,
    Analyze,
    Refactor,
    TestGen,
    PreCommit,
    ThinkDeep,
    Planner,
}

impl ToolKind {
    pub const ALL: [ToolKind; 9] = [
        ToolKind::Debug,
        ToolKind::CodeReview,
        ToolKind::SecAudit,
        ToolKind::Analyze,
        ToolKind::Refactor,
        ToolKind::TestGen,
        ToolKind::PreCommit,
        ToolKind::ThinkDeep,
        ToolKind::Planner,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolKind::Debug => "debug",
            ToolKind::CodeReview => "codereview",
            ToolKind::SecAudit => "secaudit",
            ToolKind::Analyze => "analyze",
            ToolKind::Refactor => "refactor",
            ToolKind::TestGen => "testgen",
            ToolKind::PreCommit => "precommit",
            ToolKind::ThinkDeep => "thinkdeep",
            ToolKind::Planner => "planner",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolKind {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ToolKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| ApiError::validation("tool", s, "unknown workflow tool"))
    }
}

/// Step-1 descriptor for one tool.
#[derive(Debug, Clone)]
pub struct StepDefaults {
    pub kind: ToolKind,
    pub description: &'static str,
    pub initial_total_steps: u32,
    pub fields: Map<String, Value>,
}

impl StepDefaults {
    fn new(kind: ToolKind, description: &'static str, initial_total_steps: u32) -> Self {
        Self {
            kind,
            description,
            initial_total_steps,
            fields: Map::new(),
        }
    }

    fn field(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }
}

/// What the caller asked for, before defaults are applied.
#[derive(Debug, Clone, Default)]
pub struct WorkflowRequest {
    pub prompt: String,
    pub files: Vec<String>,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub confidence: Option<Confidence>,
    /// Tool-specific overrides (`--set key=value`).
    pub options: Map<String, Value>,
}

impl WorkflowRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }
}

/// Core step fields a tool default may not shadow.
const RESERVED_FIELDS: &[&str] = &[
    "step",
    "step_number",
    "total_steps",
    "next_step_required",
    "findings",
    "files_checked",
    "relevant_files",
    "relevant_context",
    "issues_found",
    "hypotheses",
    "confidence",
    "model",
    "provider",
    "continuation_id",
];

#[derive(Debug, Clone)]
pub struct ToolRegistry {
    entries: BTreeMap<ToolKind, StepDefaults>,
}

impl ToolRegistry {
    pub fn builtin() -> Self {
        let defaults = [
            StepDefaults::new(ToolKind::Debug, "Systematic root-cause investigation", 3)
                .field("hypothesis", json!("")),
            StepDefaults::new(ToolKind::CodeReview, "Step-by-step code review", 3)
                .field("review_type", json!("full"))
                .field("severity_filter", json!("all")),
            StepDefaults::new(ToolKind::SecAudit, "Security audit", 4)
                .field("audit_focus", json!("comprehensive"))
                .field("threat_level", json!("medium")),
            StepDefaults::new(ToolKind::Analyze, "Architecture and code analysis", 3)
                .field("analysis_type", json!("general"))
                .field("output_format", json!("detailed")),
            StepDefaults::new(ToolKind::Refactor, "Refactoring opportunity analysis", 3)
                .field("refactor_type", json!("codesmells")),
            StepDefaults::new(ToolKind::TestGen, "Test generation planning", 3)
                .field("framework", json!("auto")),
            StepDefaults::new(ToolKind::PreCommit, "Pre-commit change validation", 3)
                .field("compare_to", json!("HEAD"))
                .field("include_staged", json!(true))
                .field("include_unstaged", json!(true)),
            StepDefaults::new(ToolKind::ThinkDeep, "Extended reasoning", 2)
                .field("thinking_mode", json!("high")),
            StepDefaults::new(ToolKind::Planner, "Incremental planning", 4)
                .field("is_step_revision", json!(false)),
        ];
        Self {
            entries: defaults.into_iter().map(|d| (d.kind, d)).collect(),
        }
    }

    pub fn get(&self, kind: ToolKind) -> Option<&StepDefaults> {
        self.entries.get(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = ToolKind> + '_ {
        self.entries.keys().copied()
    }

    /// Every tool kind has a descriptor, estimates are positive, and no default
    /// field shadows a core step field.
    pub fn validate(&self) -> Result<(), ApiError> {
        for kind in ToolKind::ALL {
            let defaults = self.entries.get(&kind).ok_or_else(|| {
                ApiError::ConfigError(format!("No step defaults registered for '{}'", kind))
            })?;
            if defaults.kind != kind {
                return Err(ApiError::ConfigError(format!(
                    "Step defaults for '{}' are registered under '{}'",
                    defaults.kind, kind
                )));
            }
            if defaults.initial_total_steps == 0 {
                return Err(ApiError::ConfigError(format!(
                    "Tool '{}' must estimate at least one step",
                    kind
                )));
            }
            if let Some(field) = defaults
                .fields
                .keys()
                .find(|f| RESERVED_FIELDS.contains(&f.as_str()))
            {
                return Err(ApiError::ConfigError(format!(
                    "Tool '{}' default '{}' shadows a core step field",
                    kind, field
                )));
            }
        }
        Ok(())
    }

    /// Build step 1 for `kind` from the caller's request.
    pub fn initial_arguments(
        &self,
        kind: ToolKind,
        request: &WorkflowRequest,
    ) -> Result<StepArguments, ApiError> {
        if request.prompt.trim().is_empty() {
            return Err(ApiError::validation("prompt", "", "a workflow needs a goal"));
        }
        let defaults = self.get(kind).ok_or_else(|| {
            ApiError::ConfigError(format!("No step defaults registered for '{}'", kind))
        })?;
        if let Some(field) = request
            .options
            .keys()
            .find(|f| RESERVED_FIELDS.contains(&f.as_str()))
        {
            return Err(ApiError::validation(
                field.clone(),
                request.options[field].to_string(),
                "core step fields cannot be overridden with --set",
            ));
        }

        let mut args = StepArguments::first_step(request.prompt.clone(), defaults.initial_total_steps);
        args.relevant_files = request.files.clone();
        args.model = request.model.clone();
        args.provider = request.provider.clone();
        args.confidence = Some(request.confidence.unwrap_or(Confidence::Exploring));
        args.options = defaults.fields.clone();
        for (key, value) in &request.options {
            args.options.insert(key.clone(), value.clone());
        }
        Ok(args)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
