//! Orchestrator scenarios driven through fake collaborators.

use packlint_config::{PackwerkConfig, StderrPolicy};
use packlint_engine::{AnalysisError, Document, ProcessError, ProcessOutput, RunOutcome};
use packlint_types::{DiagnosticSeverity, DocumentId, Position};

use crate::common::{CLEAN, Harness, ONE_VIOLATION, SinkCall, exited, file_id, ruby};

#[tokio::test]
async fn publishes_mapped_diagnostics_from_live_text() {
    let h = Harness::new(true);
    let doc = ruby("/repo/app/models/a.rb", "class A\n  Billing::Card\nend\n");

    let handle = h.analyzer.execute(&doc).unwrap();
    let mut runs = h.runner.take_runs();
    assert_eq!(runs.len(), 1);
    let run = runs.remove(0);
    assert_eq!(run.stdin, "class A\n  Billing::Card\nend\n");
    assert_eq!(
        run.invocation.args,
        vec!["--stdin", "/repo/app/models/a.rb", "--force-exclusion", "--format", "json"]
    );
    assert_eq!(run.invocation.command, "bin/packwerk check");

    // packwerk exits 1 when it finds violations; that is not a failure.
    run.complete(exited(1, ONE_VIOLATION, ""));
    assert_eq!(handle.outcome().await, RunOutcome::Published { count: 1 });

    let calls = h.sink.calls();
    let [SinkCall::Set(id, diagnostics)] = calls.as_slice() else {
        panic!("expected one publication, got {calls:?}");
    };
    assert_eq!(id, &doc.id);
    let d = &diagnostics[0];
    assert_eq!(d.range().start, Position::new(2, 5));
    assert_eq!(d.range().end, Position::new(2, 9));
    assert_eq!(d.severity(), DiagnosticSeverity::Error);
    assert_eq!(d.source(), "packwerk");
    assert_eq!(
        d.message(),
        "Privacy violation: '::Billing::Card' is private (privacy)"
    );
    assert!(h.notifier.messages().is_empty());
    assert!(!h.analyzer.is_running(&doc.id));
}

#[tokio::test]
async fn clean_report_publishes_empty_replacement() {
    let h = Harness::new(true);
    let doc = ruby("/repo/a.rb", "");
    let handle = h.analyzer.execute(&doc).unwrap();
    h.runner.take_runs().remove(0).complete(exited(0, CLEAN, ""));

    assert_eq!(handle.outcome().await, RunOutcome::Published { count: 0 });
    assert_eq!(h.sink.calls(), vec![SinkCall::Set(doc.id, Vec::new())]);
}

#[tokio::test]
async fn second_save_aborts_first_before_it_can_publish() {
    let h = Harness::new(false);
    let doc = ruby("/repo/a.rb", "v1");

    let first = h.analyzer.execute(&doc).unwrap();
    let second = h
        .analyzer
        .execute(&Document { text: "v2".into(), ..doc.clone() })
        .unwrap();
    let mut runs = h.runner.take_runs();
    let second_run = runs.pop().unwrap();
    let first_run = runs.pop().unwrap();
    assert!(first_run.abort.is_aborted());
    assert!(!second_run.abort.is_aborted());
    assert_eq!(second_run.stdin, "v2");

    // The first process ignores the kill and still reports.
    first_run.complete(exited(1, ONE_VIOLATION, ""));
    assert_eq!(first.outcome().await, RunOutcome::Canceled);
    assert!(h.sink.calls().is_empty());

    second_run.complete(exited(0, CLEAN, ""));
    assert_eq!(second.outcome().await, RunOutcome::Published { count: 0 });
    assert_eq!(h.sink.calls(), vec![SinkCall::Set(doc.id, Vec::new())]);
}

#[tokio::test]
async fn only_the_last_of_many_saves_publishes() {
    let h = Harness::new(true);
    let doc = ruby("/repo/a.rb", "");
    let handles: Vec<_> = (0..5).map(|_| h.analyzer.execute(&doc).unwrap()).collect();

    let mut runs = h.runner.take_runs();
    let last = runs.pop().unwrap();
    assert!(runs.iter().all(|run| run.abort.is_aborted()));
    for run in runs {
        run.complete(exited(1, ONE_VIOLATION, ""));
    }
    last.complete(exited(1, ONE_VIOLATION, ""));

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.outcome().await);
    }
    assert_eq!(outcomes.iter().filter(|o| **o == RunOutcome::Canceled).count(), 4);
    assert_eq!(outcomes[4], RunOutcome::Published { count: 1 });
    assert_eq!(h.sink.calls().len(), 1);
}

#[tokio::test]
async fn different_documents_run_independently() {
    let h = Harness::new(true);
    let a = h.analyzer.execute(&ruby("/repo/a.rb", "")).unwrap();
    let b = h.analyzer.execute(&ruby("/repo/b.rb", "")).unwrap();

    let runs = h.runner.take_runs();
    assert!(runs.iter().all(|run| !run.abort.is_aborted()));
    for run in runs {
        run.complete(exited(0, CLEAN, ""));
    }
    assert_eq!(a.outcome().await, RunOutcome::Published { count: 0 });
    assert_eq!(b.outcome().await, RunOutcome::Published { count: 0 });
}

#[tokio::test]
async fn clear_cancels_in_flight_run_and_deletes() {
    let h = Harness::new(false);
    let doc = ruby("/repo/a.rb", "");
    let handle = h.analyzer.execute(&doc).unwrap();

    h.analyzer.clear(&doc.id);
    let run = h.runner.take_runs().remove(0);
    assert!(run.abort.is_aborted());
    run.complete(exited(1, ONE_VIOLATION, ""));

    assert_eq!(handle.outcome().await, RunOutcome::Canceled);
    assert_eq!(h.sink.calls(), vec![SinkCall::Delete(doc.id)]);
}

#[tokio::test]
async fn clear_with_nothing_in_flight_only_deletes() {
    let h = Harness::new(true);
    let id = file_id("/repo/never-opened.rb");

    h.analyzer.clear(&id);
    h.analyzer.clear(&id);

    assert!(h.runner.take_runs().is_empty());
    assert!(!h.analyzer.is_running(&id));
    assert_eq!(
        h.sink.calls(),
        vec![SinkCall::Delete(id.clone()), SinkCall::Delete(id)]
    );
}

#[tokio::test]
async fn clear_ignores_non_file_documents() {
    let h = Harness::new(true);
    h.analyzer
        .clear(&DocumentId::parse("untitled:Untitled-1").unwrap());
    assert!(h.sink.calls().is_empty());
}

#[tokio::test]
async fn unsupported_documents_are_skipped() {
    let h = Harness::new(true);
    let mut untitled = ruby("/repo/a.rb", "");
    untitled.untitled = true;
    let skipped = [
        Document::new(file_id("/repo/a.py"), "python", ""),
        untitled,
        Document::new(DocumentId::parse("git:/repo/a.rb?HEAD").unwrap(), "ruby", ""),
    ];

    for doc in &skipped {
        assert!(h.analyzer.execute(doc).is_none());
    }
    assert!(h.runner.take_runs().is_empty());
    assert!(h.sink.calls().is_empty());
    assert!(h.notifier.messages().is_empty());
}

#[tokio::test]
async fn gemfiles_are_analysed() {
    let h = Harness::new(true);
    let doc = Document::new(file_id("/repo/Gemfile"), "gemfile", "source 'x'\n");
    assert!(h.analyzer.execute(&doc).is_some());
    assert_eq!(h.runner.take_runs().len(), 1);
}

async fn warned(h: &Harness, output: ProcessOutput) -> AnalysisError {
    let doc = ruby("/repo/a.rb", "");
    let handle = h.analyzer.execute(&doc).unwrap();
    h.runner.take_runs().remove(0).complete(output);
    match handle.outcome().await {
        RunOutcome::Warned(err) => err,
        other => panic!("expected a warning, got {other:?}"),
    }
}

#[tokio::test]
async fn failures_warn_once_and_leave_diagnostics_alone() {
    let cases = [
        (
            ProcessOutput::failed(ProcessError::NotFound),
            "bin/packwerk check is not executable",
        ),
        (
            exited(127, "", "sh: 1: bin/packwerk: not found\n"),
            "sh: 1: bin/packwerk: not found\n",
        ),
        (
            exited(0, CLEAN, "Bundler is using a binstub\n"),
            "Bundler is using a binstub\n",
        ),
        (
            exited(0, "", ""),
            "command bin/packwerk check returns empty output! please check configuration.",
        ),
        (
            exited(1, "Traceback\n\tfrom x.rb:1", ""),
            "Error on parsing output (It might non-JSON output) : \"Traceback  from x.rb:1\"",
        ),
    ];

    for (output, message) in cases {
        let h = Harness::new(true);
        let err = warned(&h, output).await;
        assert_eq!(err.to_string(), message);
        assert_eq!(h.notifier.messages(), vec![message.to_string()]);
        assert!(h.sink.calls().is_empty(), "{message}");
    }
}

#[tokio::test]
async fn stderr_can_be_ignored() {
    let h = Harness::new(true);
    h.config.replace(PackwerkConfig {
        stderr: StderrPolicy::Ignore,
        ..PackwerkConfig::default()
    });
    let doc = ruby("/repo/a.rb", "");
    let handle = h.analyzer.execute(&doc).unwrap();
    h.runner
        .take_runs()
        .remove(0)
        .complete(exited(1, ONE_VIOLATION, "deprecation warning\n"));

    assert_eq!(handle.outcome().await, RunOutcome::Published { count: 1 });
    assert!(h.notifier.messages().is_empty());
}

#[tokio::test]
async fn configuration_is_read_fresh_for_every_run() {
    let h = Harness::new(true);
    let doc = ruby("/repo/a.rb", "");

    h.analyzer.execute(&doc).unwrap();
    h.config.replace(PackwerkConfig {
        command: "bundle exec bin/packwerk check".into(),
        use_bundler: true,
        on_save: false,
        ..PackwerkConfig::default()
    });
    h.analyzer.execute(&doc).unwrap();

    let runs = h.runner.take_runs();
    assert!(!runs[0].invocation.use_shell);
    assert!(runs[1].invocation.use_shell);
    assert_eq!(runs[1].invocation.command, "bundle exec bin/packwerk check");
    assert!(!h.analyzer.is_on_save());
}

#[tokio::test]
async fn missing_tool_config_warns_on_each_run_without_config_flag() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::with_roots(true, vec![dir.path().to_path_buf()]);
    h.config.replace(PackwerkConfig {
        config_file_path: "x.yml".into(),
        ..PackwerkConfig::default()
    });

    let doc = Document::new(
        DocumentId::from_path(&dir.path().join("a.rb")).unwrap(),
        "ruby",
        "",
    );
    h.analyzer.execute(&doc).unwrap();

    let run = h.runner.take_runs().remove(0);
    assert!(!run.invocation.args.iter().any(|a| a == "--config"));
    assert_eq!(run.invocation.cwd, dir.path());
    assert_eq!(
        h.notifier.messages(),
        vec!["x.yml file does not exist. Ignoring...".to_string()]
    );
}

#[tokio::test]
async fn shutdown_cancels_everything_in_flight() {
    let h = Harness::new(true);
    let a = h.analyzer.execute(&ruby("/repo/a.rb", "")).unwrap();
    let b = h.analyzer.execute(&ruby("/repo/b.rb", "")).unwrap();

    h.analyzer.shutdown();

    let runs = h.runner.take_runs();
    assert!(runs.iter().all(|run| run.abort.is_aborted()));
    assert_eq!(a.outcome().await, RunOutcome::Canceled);
    assert_eq!(b.outcome().await, RunOutcome::Canceled);
    assert!(h.sink.calls().is_empty());
}
