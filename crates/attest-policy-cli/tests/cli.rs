//! Integration tests for the attest-policy CLI
//!
//! Commands run in-process through `run` with output captured in a buffer.

use attest_policy_cli::{run, Cli, ExitCode};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Script writes and spawns must not overlap across test threads
static SPAWN: Mutex<()> = Mutex::new(());

fn spawn_guard() -> MutexGuard<'static, ()> {
    SPAWN.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

const SCHEMA: &str = r#"
tables:
  - name: _build_as_code_check
    columns:
      - { name: id, type: INTEGER, primary_key: true }
      - { name: repository_id, type: INTEGER }
      - { name: check_id, type: VARCHAR }
      - { name: passed, type: BOOLEAN }
  - name: repository
    columns:
      - { name: id, type: INTEGER, primary_key: true }
"#;

const STRUCTURAL_POLICY: &str = r#"
metadata:
  id: builder
  description: trusted builder only
definition:
  predicate:
    builder:
      id: https://github.com/actions/runner
"#;

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        let ws = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        ws.write("macaron.db", "");
        ws.write("schema.yaml", SCHEMA);
        ws
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn path(&self, name: &str) -> String {
        self.dir.path().join(name).display().to_string()
    }
}

fn execute(args: &[&str]) -> (anyhow::Result<ExitCode>, String) {
    let cli = Cli::parse_from(std::iter::once("attest-policy").chain(args.iter().copied()));
    let mut out = Vec::new();
    let result = run(cli, &mut out);
    (result, String::from_utf8(out).unwrap())
}

#[test]
fn test_show_prelude() {
    let ws = Workspace::new();
    let (result, out) = execute(&[
        "datalog",
        "-d",
        &ws.path("macaron.db"),
        "-s",
        &ws.path("schema.yaml"),
        "--show-prelude",
    ]);

    assert_eq!(result.unwrap(), ExitCode::Success);
    assert!(out.contains(".decl build_as_code_check (id:number, repository_id:number, check_id:symbol, passed:number)"));
    assert!(out.contains(".input build_as_code_check (IO=sqlite, filename=\"/"));
    assert!(out.contains("check_name(\"build_as_code_check\")."));
    assert!(!out.contains(".decl repository "));
}

#[test]
fn test_missing_database_is_invalid_input() {
    let ws = Workspace::new();
    let (result, _) = execute(&[
        "datalog",
        "-d",
        &ws.path("missing.db"),
        "-s",
        &ws.path("schema.yaml"),
        "-p",
    ]);

    let err = result.unwrap_err();
    assert_eq!(ExitCode::from_error(&err), ExitCode::InvalidInput);
    assert!(err.to_string().contains("Unable to open database"));
}

#[test]
fn test_validate_structural_policy() {
    let ws = Workspace::new();
    ws.write("policy.yaml", STRUCTURAL_POLICY);
    ws.write(
        "good.json",
        r#"{"predicate": {"builder": {"id": "https://github.com/actions/runner"}}}"#,
    );
    ws.write(
        "bad.json",
        r#"{"predicate": {"builder": {"id": "https://example.com/builder"}}}"#,
    );

    let (result, out) = execute(&["validate", "-p", &ws.path("policy.yaml"), "-d", &ws.path("good.json")]);
    assert_eq!(result.unwrap(), ExitCode::Success);
    assert_eq!(out, "Policy(id='builder', description='trusted builder only'): PASSED\n");

    let (result, out) = execute(&[
        "validate",
        "-p",
        &ws.path("policy.yaml"),
        "-d",
        &ws.path("bad.json"),
        "--format",
        "json",
    ]);
    assert_eq!(result.unwrap(), ExitCode::PolicyFailed);
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(value["passed"], false);
    assert_eq!(value["target"], "any");
}

#[test]
fn test_invalid_structural_policy() {
    let ws = Workspace::new();
    ws.write("policy.yaml", "metadata: {id: p}\ndefinition: {a: !env HOME}");
    ws.write("doc.json", "{}");

    let (result, _) = execute(&["validate", "-p", &ws.path("policy.yaml"), "-d", &ws.path("doc.json")]);
    assert_eq!(ExitCode::from_error(&result.unwrap_err()), ExitCode::InvalidInput);
}

#[cfg(unix)]
fn fake_interpreter(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-souffle");
    let script = format!(
        "#!/bin/sh\nfor arg in \"$@\"; do\n  case \"$arg\" in\n    --output-dir=*) out=\"${{arg#--output-dir=}}\" ;;\n    --include-dir=*) inc=\"${{arg#--include-dir=}}\" ;;\n  esac\ndone\n{}\n",
        body
    );
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
#[test]
fn test_evaluate_datalog_policy() {
    let _guard = spawn_guard();
    let ws = Workspace::new();
    ws.write("policy.dl", "#include \"helpers.dl\"\n");
    ws.write("helpers.dl", ".decl helper(x:number)\n");
    let interpreter = fake_interpreter(
        ws.dir.path(),
        r#"test -f "$inc/helpers.dl" || exit 1
printf 'build_as_code_policy\t10\n' > "$out/passed_policies.csv"
printf 'provenance_policy\t11\tno provenance\n' > "$out/failed_policies.csv""#,
    );
    let interpreter = interpreter.display().to_string();

    let base: [&str; 11] = [
        "datalog",
        "-d",
        &ws.path("macaron.db"),
        "-s",
        &ws.path("schema.yaml"),
        "-f",
        &ws.path("policy.dl"),
        "--include",
        &ws.path("helpers.dl"),
        "--interpreter",
        &interpreter,
    ];

    let (result, out) = execute(&base);
    assert_eq!(result.unwrap(), ExitCode::PolicyFailed);
    assert!(out.contains("passed_policies\n    build_as_code_policy\t10\n"));
    assert!(out.contains("failed_policies\n    provenance_policy\t11\tno provenance\n"));
    assert!(out.ends_with("Verdict: FAILED\n"));

    let mut scoped = base.to_vec();
    scoped.extend(["--repo", "10"]);
    let (result, _) = execute(&scoped);
    assert_eq!(result.unwrap(), ExitCode::Success);
}

#[test]
fn test_check_structural_policies_in_directory() {
    let ws = Workspace::new();
    fs::create_dir(ws.dir.path().join("policies")).unwrap();
    ws.write("policies/builder.yaml", STRUCTURAL_POLICY);
    ws.write(
        "good.json",
        r#"{"predicate": {"builder": {"id": "https://github.com/actions/runner"}}}"#,
    );

    let (result, out) = execute(&["check", &ws.path("policies"), "--document", &ws.path("good.json")]);
    assert_eq!(result.unwrap(), ExitCode::Success);
    assert_eq!(
        out,
        "Policy(id='builder', description='trusted builder only'): PASSED\nVerdict: PASSED\n"
    );
}

#[test]
fn test_check_datalog_policies_need_database() {
    let ws = Workspace::new();
    ws.write("policy.dl", ".decl a(x:number)\n");

    let (result, _) = execute(&["check", &ws.path("policy.dl")]);
    assert_eq!(ExitCode::from_error(&result.unwrap_err()), ExitCode::InvalidInput);
}

#[cfg(unix)]
#[test]
fn test_check_evaluates_registry() {
    let _guard = spawn_guard();
    let ws = Workspace::new();
    fs::create_dir(ws.dir.path().join("policies")).unwrap();
    ws.write("policies/provenance.dl", ".decl a(x:number)\n");
    ws.write("policies/builder.yaml", STRUCTURAL_POLICY);
    ws.write(
        "good.json",
        r#"{"predicate": {"builder": {"id": "https://github.com/actions/runner"}}}"#,
    );
    let interpreter = fake_interpreter(
        ws.dir.path(),
        r#"printf 'build_as_code_policy\t10\n' > "$out/passed_policies.csv"
printf 'provenance_policy\t11\tno provenance\n' > "$out/failed_policies.csv""#,
    );
    let interpreter = interpreter.display().to_string();

    let base: [&str; 10] = [
        "check",
        &ws.path("policies"),
        "-d",
        &ws.path("macaron.db"),
        "-s",
        &ws.path("schema.yaml"),
        "--interpreter",
        &interpreter,
        "--document",
        &ws.path("good.json"),
    ];

    let (result, out) = execute(&base);
    assert_eq!(result.unwrap(), ExitCode::PolicyFailed);
    assert!(out.contains("Failed policies:\n    provenance_policy (repository 11): no provenance\n"));
    assert!(out.contains("Policy(id='builder', description='trusted builder only'): PASSED\n"));

    let mut scoped = base.to_vec();
    scoped.extend(["--repo", "10", "--format", "json"]);
    let (result, out) = execute(&scoped);
    assert_eq!(result.unwrap(), ExitCode::Success);
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(value["datalog_passed"], true);
    assert_eq!(value["passed_policies"][0]["policy"], "build_as_code_policy");
    assert!(value["failed_policies"].as_array().unwrap().is_empty());
    assert_eq!(value["validation"]["passed"], true);
}
