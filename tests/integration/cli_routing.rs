//! End-to-end command routing through `RunContext`, one context per invocation.

use crate::integration::test_utils::with_isolated_env;
use clap::Parser;
use conduit::cli::{Cli, RunContext};
use conduit::error::ApiError;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

/// Two-step tool: asks for one more step, then answers.
const TOOL_SCRIPT: &str = r#"input=$(cat)
case "$input" in
  *'"step_number":1,'*)
    printf '%s' '{"step_number":1,"total_steps":2,"next_step_required":true,"findings":"looked at token refresh","relevant_files":["src/auth.rs"],"confidence":"medium"}' ;;
  *)
    printf '%s' '{"step_number":2,"total_steps":2,"next_step_required":false,"confidence":"high","content":"Refresh runs after expiry"}' ;;
esac
"#;

fn write_config(root: &Path) -> std::path::PathBuf {
    let script = root.join("tool.sh");
    std::fs::write(&script, TOOL_SCRIPT).unwrap();
    let config = root.join("conduit.toml");
    std::fs::write(
        &config,
        format!(
            "[storage]\nbackend = \"file\"\ndirectory = '{}'\n\n\
             [cache]\nbackend = \"memory\"\n\n\
             [tools.debug]\ncommand = [\"sh\", '{}']\ntimeout_secs = 30\n",
            root.join("state").display(),
            script.display()
        ),
    )
    .unwrap();
    config
}

fn run(root: &Path, config: &Path, args: &[&str]) -> Result<String, ApiError> {
    let mut argv = vec![
        "conduit".to_string(),
        "--workspace".to_string(),
        root.display().to_string(),
        "--config".to_string(),
        config.display().to_string(),
    ];
    argv.extend(args.iter().map(|s| s.to_string()));
    let cli = Cli::try_parse_from(argv).unwrap();
    let context = RunContext::new(cli.workspace.clone(), cli.config.clone())?.with_format(cli.format);
    context.execute(&cli.command)
}

fn json(output: &str) -> Value {
    serde_json::from_str(output).unwrap()
}

#[cfg(unix)]
#[test]
fn interactive_session_resumes_across_invocations() {
    let temp = TempDir::new().unwrap();
    with_isolated_env(&temp, || {
        let root = temp.path();
        let config = write_config(root);

        let first = json(&run(root, &config, &["--format", "json", "debug", "login fails", "--interactive"]).unwrap());
        assert_eq!(first["status"], "in_progress");
        assert_eq!(first["step_number"], 1);
        let session_id = first["session_id"].as_str().unwrap().to_string();
        assert!(first["continuation_command"]
            .as_str()
            .unwrap()
            .contains(&format!("--session {}", session_id)));

        let listed = json(&run(root, &config, &["--format", "json", "sessions", "list"]).unwrap());
        assert_eq!(listed["total"], 1);
        assert_eq!(listed["sessions"][0]["session_id"], session_id.as_str());

        let shown = run(root, &config, &["sessions", "show", &session_id]).unwrap();
        assert!(shown.contains("looked at token refresh"));

        let second = json(
            &run(
                root,
                &config,
                &["--format", "json", "debug", "--session", &session_id, "--continue", "checked expiry"],
            )
            .unwrap(),
        );
        assert_eq!(second["status"], "complete");
        assert_eq!(second["content"], "Refresh runs after expiry");

        let listed = json(&run(root, &config, &["--format", "json", "sessions", "list"]).unwrap());
        assert_eq!(listed["total"], 0);

        let err = run(root, &config, &["debug", "--session", &session_id]).unwrap_err();
        assert!(matches!(err, ApiError::SessionNotFound(_)));
    });
}

#[cfg(unix)]
#[test]
fn batch_run_renders_summary() {
    let temp = TempDir::new().unwrap();
    with_isolated_env(&temp, || {
        let root = temp.path();
        let config = write_config(root);

        let text = run(root, &config, &["debug", "login fails"]).unwrap();
        assert!(text.contains("debug workflow complete"));
        assert!(text.contains("Refresh runs after expiry"));
        assert!(text.contains("src/auth.rs"));

        let summary = json(&run(root, &config, &["--format", "json", "debug", "login fails", "--max-steps", "3"]).unwrap());
        assert_eq!(summary["workflow_complete"], true);
        assert_eq!(summary["total_steps_executed"], 2);
        assert_eq!(summary["final_confidence"], "high");
    });
}

#[test]
fn session_commands_report_missing_sessions() {
    let temp = TempDir::new().unwrap();
    with_isolated_env(&temp, || {
        let root = temp.path();
        let config = write_config(root);
        let err = run(root, &config, &["sessions", "show", "debug_1_deadbeef"]).unwrap_err();
        assert!(matches!(err, ApiError::SessionNotFound(_)));
        let err = run(root, &config, &["sessions", "delete", "debug_1_deadbeef"]).unwrap_err();
        assert!(matches!(err, ApiError::SessionNotFound(_)));
        let err = run(root, &config, &["sessions", "list", "--tool", "nonsense"]).unwrap_err();
        assert!(matches!(err, ApiError::ValidationError { .. }));
    });
}

#[test]
fn cache_commands_use_the_configured_backend() {
    let temp = TempDir::new().unwrap();
    with_isolated_env(&temp, || {
        let root = temp.path();
        let config = write_config(root);
        let stats = json(&run(root, &config, &["--format", "json", "cache", "stats"]).unwrap());
        assert_eq!(stats["backend"], "memory");
        assert_eq!(stats["entries"], 0);
        let cleared = run(root, &config, &["cache", "clear"]).unwrap();
        assert_eq!(cleared, "Removed 0 cached response(s).");
    });
}

#[test]
fn chat_without_providers_is_a_config_error() {
    let temp = TempDir::new().unwrap();
    with_isolated_env(&temp, || {
        let root = temp.path();
        let config = write_config(root);
        let err = run(root, &config, &["chat", "hello"]).unwrap_err();
        assert!(matches!(err, ApiError::ConfigError(_)));
    });
}

#[test]
fn invalid_config_fails_context_creation() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("bad.toml");
    std::fs::write(&config, "[retry]\nmax_attempts = 0\n").unwrap();
    with_isolated_env(&temp, || {
        let err = run(temp.path(), &config, &["cache", "stats"]).unwrap_err();
        assert!(matches!(err, ApiError::ConfigError(_)));
    });
}
