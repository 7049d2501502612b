// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{
    api_settings, fixture_match, payload, pipeline_settings, valid_matches, Harness,
};
use async_trait::async_trait;
use matchday::domain::models::extraction_run::{RunId, RunOutcome};
use matchday::domain::models::task_run::TaskState;
use matchday::domain::repositories::raw_repository::RawRepository;
use matchday::domain::repositories::run_repository::RunRepository;
use matchday::domain::repositories::storage_repository::StorageRepository;
use matchday::pipeline::cancel::CancelHandle;
use matchday::pipeline::collaborators::{
    CollaboratorError, HttpQualityCheck, HttpTransformTrigger, NoopQualityCheck,
    StorageCompletionSink, TransformTrigger,
};
use matchday::pipeline::summary::RunSummary;
use matchday::utils::errors::ErrorClass;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// 记录被触发的运行
#[derive(Default)]
struct RecordingTransform {
    calls: Mutex<Vec<RunId>>,
}

#[async_trait]
impl TransformTrigger for RecordingTransform {
    async fn trigger(&self, run_id: RunId) -> Result<(), CollaboratorError> {
        self.calls.lock().push(run_id);
        Ok(())
    }
}

fn task_state(summary: &RunSummary, node: &str) -> Option<TaskState> {
    summary
        .tasks
        .iter()
        .find(|t| t.node_id == node)
        .map(|t| t.state)
}

/// PL 有10场合法比赛和1场半场比分超过全场的比赛，PD 上游返回404
#[tokio::test]
async fn test_one_failed_competition_gives_partial_run() {
    let h = Harness::new().await;
    let mut pl = valid_matches(1, 10);
    pl.push(fixture_match(11, (2, 0), (1, 0)));
    h.serve_matches("PL", pl).await;
    h.serve_status("PD", 404).await;

    let transform = Arc::new(RecordingTransform::default());
    let orchestrator = h.orchestrator_with(
        &["PL", "PD"],
        transform.clone(),
        Arc::new(NoopQualityCheck),
    );
    let summary = orchestrator
        .run(CancelHandle::new().signal())
        .await
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Partial);
    assert_eq!(task_state(&summary, "extract:PD"), Some(TaskState::Failed));
    assert_eq!(task_state(&summary, "load:PD"), Some(TaskState::Skipped));
    assert_eq!(task_state(&summary, "load:PL"), Some(TaskState::Success));

    let gate = summary.quality_gate.clone().unwrap();
    assert!(gate.passed);
    assert_eq!((gate.rejected, gate.seen), (1, 11));
    assert!((gate.ratio - 1.0 / 11.0).abs() < 1e-9);

    // 闸门在部分成功时依然放行转换
    assert_eq!(*transform.calls.lock(), vec![summary.run_id]);

    let pl = &summary.competitions[0];
    assert_eq!(pl.state, TaskState::Success);
    assert_eq!((pl.accepted, pl.rejected), (10, 1));
    assert_eq!(pl.raw_matches, Some(10));
    let pd = &summary.competitions[1];
    assert_eq!(pd.state, TaskState::Failed);
    assert!(pd.error.as_deref().unwrap().starts_with("extract:PD"));

    assert_eq!(h.raw_repo.count_matches(Some("PL")).await.unwrap(), 10);
    assert_eq!(h.raw_repo.count_matches(Some("PD")).await.unwrap(), 0);

    let run = h.run_repo.find_run(summary.run_id).await.unwrap().unwrap();
    assert_eq!(run.outcome, Some(RunOutcome::Partial));
    assert_eq!(run.request_counts.get("PL"), Some(&1));
    assert_eq!(run.request_counts.get("PD"), Some(&1));
    assert!(run.finished_at.is_some());

    let written = h
        .storage
        .get(&StorageCompletionSink::summary_key(summary.run_id))
        .await
        .unwrap()
        .expect("completion signal missing");
    let signal: RunSummary = serde_json::from_slice(&written).unwrap();
    assert_eq!(signal.run_id, summary.run_id);
    assert_eq!(signal.outcome, RunOutcome::Partial);
}

#[tokio::test]
async fn test_rerun_converges() {
    let h = Harness::new().await;
    h.serve_matches("PL", valid_matches(1, 6)).await;
    h.serve_matches("FL1", valid_matches(100, 4)).await;
    let orchestrator = h.orchestrator(&["PL", "FL1"]);

    let first = orchestrator
        .run(CancelHandle::new().signal())
        .await
        .unwrap();
    let second = orchestrator
        .run(CancelHandle::new().signal())
        .await
        .unwrap();

    assert_eq!(first.outcome, RunOutcome::Success);
    assert_eq!(second.outcome, RunOutcome::Success);
    assert!(second.run_id > first.run_id);

    let load = second.competitions[0].load.unwrap();
    assert_eq!(load.rows_inserted, 0);
    assert_eq!(load.rows_updated, 6);
    assert_eq!(h.raw_repo.count_matches(None).await.unwrap(), 10);

    // 每次运行各自落地，按运行ID排序
    let artifacts = h.landing.list("PL").await.unwrap();
    let runs: Vec<RunId> = artifacts.iter().map(|a| a.run_id).collect();
    assert_eq!(runs, vec![first.run_id, second.run_id]);
    let second_run = h.run_repo.find_run(second.run_id).await.unwrap().unwrap();
    assert_eq!(second_run.request_counts.get("PL"), Some(&1));
}

#[tokio::test]
async fn test_gate_failure_skips_downstream_and_keeps_loads() {
    let h = Harness::new().await;
    let mut pl = valid_matches(1, 3);
    pl.push(fixture_match(4, (3, 0), (1, 0)));
    pl.push(fixture_match(5, (0, 3), (0, 1)));
    h.serve_matches("PL", pl).await;

    let transform = Arc::new(RecordingTransform::default());
    let orchestrator =
        h.orchestrator_with(&["PL"], transform.clone(), Arc::new(NoopQualityCheck));
    let summary = orchestrator
        .run(CancelHandle::new().signal())
        .await
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Failed);
    let gate_run = summary
        .tasks
        .iter()
        .find(|t| t.node_id == "quality_gate")
        .unwrap();
    assert_eq!(gate_run.state, TaskState::Failed);
    assert_eq!(
        gate_run.last_error.as_ref().map(|e| e.class),
        Some(ErrorClass::QualityGate)
    );
    for node in ["transform", "quality_check", "complete"] {
        assert_eq!(task_state(&summary, node), Some(TaskState::Skipped), "{}", node);
    }
    assert!(transform.calls.lock().is_empty());
    assert_eq!(h.raw_repo.count_matches(Some("PL")).await.unwrap(), 3);
    assert!(h
        .storage
        .get(&StorageCompletionSink::summary_key(summary.run_id))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_http_collaborators_and_failed_quality_check() {
    let h = Harness::new().await;
    h.serve_matches("PL", valid_matches(1, 5)).await;

    let collaborators = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transform/runs"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({"id": "dbt-1"})))
        .expect(1)
        .mount(&collaborators)
        .await;
    Mock::given(method("GET"))
        .and(path("/transform/runs/dbt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "succeeded"})))
        .mount(&collaborators)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/quality/runs/\d+$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"passed": false, "details": {"unique_match_id": 2}})),
        )
        .expect(1)
        .mount(&collaborators)
        .await;

    let transform = HttpTransformTrigger::new(
        &format!("{}/transform", collaborators.uri()),
        Duration::from_millis(5),
    )
    .unwrap();
    let quality = HttpQualityCheck::new(&format!("{}/quality", collaborators.uri())).unwrap();
    let summary = h
        .orchestrator_with(&["PL"], Arc::new(transform), Arc::new(quality))
        .run(CancelHandle::new().signal())
        .await
        .unwrap();

    assert_eq!(task_state(&summary, "transform"), Some(TaskState::Success));
    assert_eq!(task_state(&summary, "quality_check"), Some(TaskState::Failed));
    assert_eq!(task_state(&summary, "complete"), Some(TaskState::Skipped));
    assert_eq!(summary.outcome, RunOutcome::Failed);
    assert_eq!(
        summary.quality_check.as_ref().map(|r| r.passed),
        Some(false)
    );
}

#[tokio::test]
async fn test_cancellation_fails_open_tasks_and_keeps_run_record() {
    let h = Harness::new().await;
    Mock::given(method("GET"))
        .and(path("/competitions/PL/matches"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(payload("PL", valid_matches(1, 2)))
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&h.api)
        .await;

    let orchestrator = h.orchestrator(&["PL"]);
    let cancel = CancelHandle::new();
    let run = orchestrator.run(cancel.signal());
    let trigger = async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    };
    let (summary, _) = tokio::join!(run, trigger);
    let summary = summary.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Failed);
    for task in &summary.tasks {
        assert_eq!(task.state, TaskState::Failed, "{}", task.node_id);
        assert_eq!(
            task.last_error.as_ref().map(|e| e.class),
            Some(ErrorClass::Cancelled)
        );
    }
    assert_eq!(h.raw_repo.count_matches(None).await.unwrap(), 0);
    let run = h.run_repo.find_run(summary.run_id).await.unwrap().unwrap();
    assert_eq!(run.outcome, Some(RunOutcome::Failed));
}

/// PD 的每次请求都超过客户端超时，重试耗尽后该分支失败，运行为部分成功
#[tokio::test]
async fn test_upstream_timeouts_exhaust_retries_and_give_partial_run() {
    let h = Harness::new().await;
    h.serve_matches("PL", valid_matches(1, 4)).await;
    Mock::given(method("GET"))
        .and(path("/competitions/PD/matches"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(payload("PD", valid_matches(50, 2)))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&h.api)
        .await;

    let mut settings = api_settings(&h.api.uri(), &["PL", "PD"]);
    settings.timeout_secs = 1;
    let transform = Arc::new(RecordingTransform::default());
    let summary = h
        .orchestrator_tuned(
            settings,
            pipeline_settings(),
            transform.clone(),
            Arc::new(NoopQualityCheck),
        )
        .run(CancelHandle::new().signal())
        .await
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Partial);
    let extract = summary
        .tasks
        .iter()
        .find(|t| t.node_id == "extract:PD")
        .unwrap();
    assert_eq!(extract.state, TaskState::Failed);
    assert_eq!(extract.attempt, 1);
    let error = extract.last_error.as_ref().unwrap();
    assert_eq!(error.class, ErrorClass::Permanent);
    assert!(error.message.contains("exhausted retries after 3 attempts"), "{}", error.message);
    assert!(error.message.contains("timed out"), "{}", error.message);
    assert_eq!(task_state(&summary, "load:PD"), Some(TaskState::Skipped));
    assert_eq!(task_state(&summary, "load:PL"), Some(TaskState::Success));

    assert!(summary.quality_gate.as_ref().unwrap().passed);
    assert_eq!(*transform.calls.lock(), vec![summary.run_id]);
    assert_eq!(task_state(&summary, "complete"), Some(TaskState::Success));

    let run = h.run_repo.find_run(summary.run_id).await.unwrap().unwrap();
    assert_eq!(run.request_counts.get("PD"), Some(&3));
    assert_eq!(h.raw_repo.count_matches(Some("PL")).await.unwrap(), 4);
    assert_eq!(h.raw_repo.count_matches(Some("PD")).await.unwrap(), 0);
}

/// 节点超时短于重试预算时，抽取节点直接以超时失败，不再重试
#[tokio::test]
async fn test_extract_node_timeout_fails_without_retry() {
    let h = Harness::new().await;
    h.serve_matches("PL", valid_matches(1, 3)).await;
    Mock::given(method("GET"))
        .and(path("/competitions/PD/matches"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(payload("PD", valid_matches(50, 2)))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&h.api)
        .await;

    let settings = api_settings(&h.api.uri(), &["PL", "PD"]);
    let mut pipeline = pipeline_settings();
    pipeline.extract_timeout_secs = 1;
    pipeline.extract_max_attempts = 3;
    let transform = Arc::new(RecordingTransform::default());
    let summary = h
        .orchestrator_tuned(settings, pipeline, transform.clone(), Arc::new(NoopQualityCheck))
        .run(CancelHandle::new().signal())
        .await
        .unwrap();

    let extract = summary
        .tasks
        .iter()
        .find(|t| t.node_id == "extract:PD")
        .unwrap();
    assert_eq!(extract.state, TaskState::Failed);
    assert_eq!(extract.attempt, 1);
    assert_eq!(
        extract.last_error.as_ref().map(|e| e.class),
        Some(ErrorClass::Timeout)
    );
    assert_eq!(task_state(&summary, "extract:PL"), Some(TaskState::Success));
    assert_eq!(summary.outcome, RunOutcome::Partial);
    assert_eq!(*transform.calls.lock(), vec![summary.run_id]);
}
