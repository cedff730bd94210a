//! End-to-end CLI tests against the offline `hash` embedding provider.

use std::path::Path;
use std::process::{Command, Output};

fn repolens(cwd: &Path, index: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_repolens"))
        .args(args)
        .arg("--index")
        .arg(index)
        .env("REPOLENS_EMBEDDING_PROVIDER", "hash")
        .env_remove("REPOLENS_INDEX_PATH")
        .env_remove("REPOLENS_COLLECTION")
        .env_remove("RUST_LOG")
        .current_dir(cwd)
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn write_project(root: &Path) {
    std::fs::create_dir_all(root.join("src/auth")).unwrap();
    std::fs::write(
        root.join("README.md"),
        "# Overview\nA small service.\n\n# Deploy\nRun the deploy script.\n",
    )
    .unwrap();
    std::fs::write(
        root.join("src/auth/session.py"),
        "def open_session(user):\n    return user\n\ndef close_session(session):\n    pass\n",
    )
    .unwrap();
}

#[test]
fn ingest_then_query_eval_and_stats() {
    let project = tempfile::tempdir().unwrap();
    write_project(project.path());
    let index = project.path().join(".repolens/index.db");

    let out = stdout(&repolens(project.path(), &index, &["ingest", ".", "--format", "json"]));
    let report: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(report["total"], 4);
    assert_eq!(report["paths"][0], "README.md");
    assert_eq!(report["paths"][1], "src/auth/session.py");
    assert!(index.exists());

    let out = stdout(&repolens(
        project.path(),
        &index,
        &["query", "open_session user", "-k", "2", "--format", "json"],
    ));
    let result: serde_json::Value = serde_json::from_str(&out).unwrap();
    let hits = result["hits"].as_array().unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0]["metadata"]["path"], "src/auth/session.py");

    let csv = project.path().join("questions.csv");
    std::fs::write(
        &csv,
        "question,relevant_keywords\nopen_session user,auth\ndeploy script,readme\n",
    )
    .unwrap();
    let out = stdout(&repolens(
        project.path(),
        &index,
        &["eval", "questions.csv", "-k", "1", "--format", "json"],
    ));
    let eval: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(eval["precision"], 1.0);
    assert_eq!(eval["details"].as_array().unwrap().len(), 2);

    let out = stdout(&repolens(project.path(), &index, &["stats"]));
    assert!(out.contains("Chunks:     4"), "{out}");
    assert!(out.contains("Files:      2"), "{out}");
}

#[test]
fn text_output_is_human_readable() {
    let project = tempfile::tempdir().unwrap();
    write_project(project.path());
    let index = project.path().join("index.db");

    let out = stdout(&repolens(project.path(), &index, &["ingest"]));
    assert!(out.contains("Indexed 2 files"), "{out}");
    assert!(out.contains("Collection now holds 4 chunks"), "{out}");
    assert!(out.contains("4 new"), "{out}");

    let out = stdout(&repolens(project.path(), &index, &["ingest", "--format", "json"]));
    let again: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(again["chunksWritten"], 4);
    assert_eq!(again["added"], 0);
    assert_eq!(again["total"], 4);

    let out = stdout(&repolens(project.path(), &index, &["query", "deploy", "-k", "1"]));
    assert!(out.starts_with("1. README.md"), "{out}");
}

#[test]
fn query_on_empty_index_reports_no_results() {
    let project = tempfile::tempdir().unwrap();
    let index = project.path().join("empty.db");

    let out = stdout(&repolens(project.path(), &index, &["query", "anything"]));
    assert!(out.contains("No results found."), "{out}");
}

#[test]
fn ask_without_context_does_not_call_the_model() {
    let project = tempfile::tempdir().unwrap();
    std::fs::write(
        project.path().join(".repolens.toml"),
        "[llm]\nprovider = \"ollama\"\nbase_url = \"http://127.0.0.1:9\"\n",
    )
    .unwrap();
    let index = project.path().join("empty.db");

    let out = stdout(&repolens(project.path(), &index, &["ask", "How does auth work?"]));
    assert!(out.contains("No indexed content matched"), "{out}");
}

#[test]
fn collections_are_selected_per_invocation() {
    let project = tempfile::tempdir().unwrap();
    write_project(project.path());
    let index = project.path().join("index.db");

    stdout(&repolens(
        project.path(),
        &index,
        &["ingest", "--collection", "docs"],
    ));

    let out = stdout(&repolens(project.path(), &index, &["stats", "--format", "json"]));
    let stats: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(stats["collection"], "default");
    assert_eq!(stats["totalChunks"], 0);

    let out = stdout(&repolens(
        project.path(),
        &index,
        &["stats", "--collection", "docs", "--format", "json"],
    ));
    let stats: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(stats["totalChunks"], 4);
}

#[test]
fn invalid_config_fails_with_diagnostic() {
    let project = tempfile::tempdir().unwrap();
    std::fs::write(
        project.path().join(".repolens.toml"),
        "[ingest]\nmax_chars = 0\n",
    )
    .unwrap();
    let index = project.path().join("index.db");

    let output = repolens(project.path(), &index, &["stats"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("max_chars"), "{stderr}");
}
