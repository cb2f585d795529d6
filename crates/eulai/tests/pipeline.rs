//! End-to-end runs through the real sandbox with a scripted runtime

mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use common::{model_source, three_block_text, RecordingSink, Reply, Script};
use eulai::analysis::{BlockOutcome, NO_DOCUMENT_NOTICE};
use eulai::types::{Extraction, Severity};
use eulai::{EulaiConfig, Error, Orchestrator, SessionManager, SessionState};

fn config() -> EulaiConfig {
    let mut config = EulaiConfig::default();
    config.segmentation.max_chunk_chars = 200;
    config
}

fn orchestrator(script: &Script) -> Orchestrator {
    let config = config();
    let session = Arc::new(SessionManager::spawn(script.factory(), config.session.clone()));
    Orchestrator::new(session, &config)
        .unwrap()
        .with_model_source(Box::new(model_source()))
}

#[tokio::test]
async fn test_reset_precedes_every_completion() {
    let script = Script::new(vec![]);
    let orchestrator = orchestrator(&script);
    let sink = RecordingSink::default();

    let report = orchestrator.run(&three_block_text(), &sink).await.unwrap();
    assert_eq!(report.total_chunks, 3);

    let events = script.events();
    assert_eq!(&events[..2], &["start".to_string(), "load:2048".to_string()]);
    assert_eq!(script.loaded_model().len(), 3000);

    let lifecycle: Vec<&str> = events
        .iter()
        .map(String::as_str)
        .filter(|e| matches!(*e, "reset" | "complete:begin" | "complete:end"))
        .collect();
    assert_eq!(
        lifecycle,
        ["reset", "complete:begin", "complete:end"].repeat(3)
    );
}

#[tokio::test]
async fn test_each_prompt_carries_one_chunk() {
    let script = Script::new(vec![]);
    let orchestrator = orchestrator(&script);

    orchestrator
        .run(&three_block_text(), &RecordingSink::default())
        .await
        .unwrap();

    let prompts: Vec<String> = script
        .events()
        .into_iter()
        .filter_map(|e| e.strip_prefix("prompt:").map(str::to_string))
        .collect();
    assert_eq!(prompts.len(), 3);
    for (i, prompt) in prompts.iter().enumerate() {
        assert!(prompt.starts_with("STRICTLY ANALYZE THIS TEXT ONLY:\n\n"));
        assert!(prompt.contains(&format!("Section {} applies.", i + 1)));
        assert_eq!(prompt.matches("Section").count(), 1);
    }
}

#[tokio::test]
async fn test_progress_sequence() {
    let script = Script::new(vec![]);
    let orchestrator = orchestrator(&script);
    let sink = RecordingSink::default();

    orchestrator.run(&three_block_text(), &sink).await.unwrap();

    let expected: Vec<(String, u8)> = vec![
        ("Preparing 3 blocks...".into(), 1),
        ("Analyzing Block 1/3".into(), 0),
        ("Analyzing Block 2/3".into(), 33),
        ("Analyzing Block 3/3".into(), 67),
        ("Analysis Complete".into(), 100),
    ];
    assert_eq!(sink.run_progress(), expected);
    assert_eq!(
        sink.progress.lock().iter().find(|(m, _)| m.starts_with("Loading model")).map(|(m, _)| m.clone()),
        Some("Loading model: 0%".to_string())
    );
    assert_eq!(*sink.started.lock(), vec![0, 1, 2]);
}

#[tokio::test]
async fn test_failed_block_does_not_stop_the_run() {
    let script = Script::new(vec![
        Reply::Tokens(vec!["[BAD]: Fees", ": Hidden fees apply."]),
        Reply::Fail("engine crashed"),
        Reply::Tokens(vec!["NO_CLAUSES", "_FOUND"]),
    ]);
    let orchestrator = orchestrator(&script);
    let sink = RecordingSink::default();

    let report = orchestrator.run(&three_block_text(), &sink).await.unwrap();

    assert_eq!(report.completed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].severity, Severity::Bad);
    assert_eq!(report.findings[0].title, "Fees");
    assert_eq!(report.findings[0].explanation, "Hidden fees apply.");

    let outcomes = sink.outcomes.lock().clone();
    assert!(matches!(outcomes[0], (0, BlockOutcome::Findings { .. })));
    assert!(matches!(&outcomes[1], (1, BlockOutcome::Failed { error }) if error.contains("engine crashed")));
    assert_eq!(outcomes[2], (2, BlockOutcome::Empty));

    assert!(sink.last_html(0).unwrap().contains("status-box BAD"));
    assert!(sink.last_html(1).unwrap().contains("Error during analysis"));
    assert!(sink.last_html(2).unwrap().contains("No significant clauses found."));
    assert_eq!(orchestrator.session().state(), SessionState::Ready);
}

#[tokio::test]
async fn test_streaming_updates_grow() {
    let script = Script::new(vec![Reply::Tokens(vec![
        "[GOOD]",
        ": Refunds",
        ": 30-day window.",
    ])]);
    let orchestrator = orchestrator(&script);
    let sink = RecordingSink::default();

    orchestrator
        .run("A short refund clause.", &sink)
        .await
        .unwrap();

    let updates = sink.updates.lock().clone();
    assert!(updates.len() >= 3);
    assert!(updates[0].1.contains("Analysis in progress..."));
    assert!(updates.last().unwrap().1.contains("30-day window."));
}

#[tokio::test]
async fn test_degraded_result_is_rendered() {
    let script = Script::new(vec![Reply::Nothing]);
    let orchestrator = orchestrator(&script);
    let sink = RecordingSink::default();

    let report = orchestrator.run("One clause.", &sink).await.unwrap();

    assert_eq!(report.completed, 1);
    let html = sink.last_html(0).unwrap();
    assert!(html.contains("Internal generation error."));
    assert!(html.contains("Non-standard format detected"));
}

#[tokio::test]
async fn test_invalid_page_sends_notice() {
    let script = Script::new(vec![]);
    let orchestrator = orchestrator(&script);
    let sink = RecordingSink::default();

    let report = orchestrator
        .analyze_page(&Extraction::invalid(), &sink)
        .await
        .unwrap();

    assert_eq!(report.total_chunks, 0);
    assert_eq!(*sink.notices.lock(), vec![NO_DOCUMENT_NOTICE.to_string()]);
    assert_eq!(orchestrator.session().state(), SessionState::Uninitialized);
    assert!(script.events().is_empty());
}

#[tokio::test]
async fn test_blank_text_skips_model_load() {
    let script = Script::new(vec![]);
    let orchestrator = orchestrator(&script);
    let sink = RecordingSink::default();

    let report = orchestrator.run("   \n  ", &sink).await.unwrap();

    assert_eq!(report.total_chunks, 0);
    assert_eq!(*sink.notices.lock(), vec![NO_DOCUMENT_NOTICE.to_string()]);
    assert!(sink.progress.lock().is_empty());
    assert!(script.events().is_empty());
    assert_eq!(orchestrator.session().state(), SessionState::Uninitialized);
}

#[tokio::test]
async fn test_second_run_rejected_while_active() {
    let gate = Arc::new(Notify::new());
    let script = Script::new(vec![]).gated(gate.clone());
    let orchestrator = Arc::new(orchestrator(&script));
    let sink = Arc::new(RecordingSink::default());

    let first = {
        let orchestrator = orchestrator.clone();
        let sink = sink.clone();
        tokio::spawn(async move { orchestrator.run("Only clause.", sink.as_ref()).await })
    };

    while orchestrator.session().state() != SessionState::Busy {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let second = orchestrator.run("Another text.", &RecordingSink::default()).await;
    assert!(matches!(second, Err(Error::Busy(_))));

    gate.notify_one();
    let report = first.await.unwrap().unwrap();
    assert_eq!(report.total_chunks, 1);
}

#[tokio::test]
async fn test_missing_model_source() {
    let script = Script::new(vec![]);
    let config = config();
    let session = Arc::new(SessionManager::spawn(script.factory(), config.session.clone()));
    let orchestrator = Orchestrator::new(session, &config).unwrap();

    let err = orchestrator
        .run("Text.", &RecordingSink::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotReady(SessionState::Uninitialized)));
}
