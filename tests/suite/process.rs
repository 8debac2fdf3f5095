//! End-to-end runs against a stand-in `bin/packwerk` script.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use packlint_config::StaticConfig;
use packlint_engine::{
    AnalysisError, Analyzer, DiagnosticsStore, Document, LogNotifier, RunOutcome,
    TokioProcessRunner,
};
use packlint_types::DocumentId;
use tokio::time::timeout;

/// Writes an executable `bin/packwerk` under `root` with the given body.
fn install_tool(root: &Path, body: &str) {
    let bin = root.join("bin");
    fs::create_dir_all(&bin).unwrap();
    let script = bin.join("packwerk");
    fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
}

fn analyzer(root: &Path, store: &DiagnosticsStore) -> Analyzer {
    Analyzer::new(
        Arc::new(StaticConfig::default()),
        Arc::new(TokioProcessRunner),
        Arc::new(LogNotifier),
        Arc::new(store.clone()),
    )
    .with_roots(vec![root.to_path_buf()])
}

#[tokio::test]
async fn real_process_reads_stdin_and_reports() {
    let root = tempfile::tempdir().unwrap();
    // Echo the line count of stdin back as the violation's line.
    install_tool(
        root.path(),
        r#"lines=$(wc -l | tr -d ' ')
printf '{"files":[{"path":"%s","violations":[{"message":"seen %s","type":"dependency","location":{"line":%s,"column":0,"length":1}}]}]}' "$3" "$1" "$lines"
exit 1"#,
    );
    let store = DiagnosticsStore::new();
    let analyzer = analyzer(root.path(), &store);
    let id = DocumentId::from_path(&root.path().join("a.rb")).unwrap();

    let handle = analyzer
        .execute(&Document::new(id.clone(), "ruby", "a\nb\nc\n"))
        .unwrap();
    assert_eq!(handle.outcome().await, RunOutcome::Published { count: 1 });

    let diagnostics = store.get(&id).unwrap();
    assert_eq!(diagnostics[0].message(), "seen check (dependency)");
    assert_eq!(diagnostics[0].range().start.line, 2);
}

#[tokio::test]
async fn missing_tool_is_not_executable() {
    let root = tempfile::tempdir().unwrap();
    let store = DiagnosticsStore::new();
    let analyzer = analyzer(root.path(), &store);
    let id = DocumentId::from_path(&root.path().join("a.rb")).unwrap();

    let outcome = analyzer
        .execute(&Document::new(id, "ruby", ""))
        .unwrap()
        .outcome()
        .await;
    assert_eq!(
        outcome,
        RunOutcome::Warned(AnalysisError::NotExecutable {
            command: "bin/packwerk check".into()
        })
    );
    assert!(store.snapshot().is_empty());
}

#[tokio::test]
async fn superseded_slow_run_is_killed() {
    let root = tempfile::tempdir().unwrap();
    install_tool(root.path(), "cat > /dev/null\nsleep 30\necho '{\"files\":[]}'");
    let store = DiagnosticsStore::new();
    let analyzer = analyzer(root.path(), &store);
    let doc = Document::new(
        DocumentId::from_path(&root.path().join("a.rb")).unwrap(),
        "ruby",
        "",
    );

    let first = analyzer.execute(&doc).unwrap();
    analyzer.clear(&doc.id);

    let outcome = timeout(Duration::from_secs(10), first.outcome())
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::Canceled);
}
