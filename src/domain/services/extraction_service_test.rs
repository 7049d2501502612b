// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::*;
use crate::domain::models::match_record::RejectionReason;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// 按赛事预设响应序列的数据源
struct ScriptedSource {
    responses: Mutex<HashMap<String, VecDeque<Result<String, ApiError>>>>,
    seen: Mutex<Vec<MatchQuery>>,
}

impl ScriptedSource {
    fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, competition: &str, response: Result<String, ApiError>) {
        self.responses
            .lock()
            .entry(competition.to_string())
            .or_default()
            .push_back(response);
    }
}

#[async_trait]
impl MatchSource for ScriptedSource {
    async fn fetch_matches(&self, query: &MatchQuery) -> Result<String, ApiError> {
        self.seen.lock().push(query.clone());
        self.responses
            .lock()
            .get_mut(&query.competition)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| Err(ApiError::Client {
                status: 404,
                message: "no scripted response".to_string(),
            }))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

fn fixture_match(id: i64, half: (i64, i64), full: (i64, i64)) -> Value {
    json!({
        "id": id,
        "utcDate": "2024-09-14T14:00:00Z",
        "status": "FINISHED",
        "matchday": 4,
        "homeTeam": {"id": 57, "name": "Arsenal FC", "shortName": "Arsenal", "tla": "ARS"},
        "awayTeam": {"id": 61, "name": "Chelsea FC", "shortName": "Chelsea", "tla": "CHE"},
        "score": {
            "winner": "HOME_TEAM",
            "halfTime": {"home": half.0, "away": half.1},
            "fullTime": {"home": full.0, "away": full.1}
        }
    })
}

fn payload(code: &str, matches: Vec<Value>) -> String {
    json!({
        "competition": {"id": 2021, "name": "Premier League", "code": code},
        "matches": matches
    })
    .to_string()
}

fn extractor(source: Arc<ScriptedSource>, seasons: Vec<i32>) -> Extractor {
    Extractor::new(
        source,
        Arc::new(RateLimiter::new(100, Duration::from_secs(60))),
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        },
        ExtractionWindow {
            seasons,
            date_from: None,
            date_to: None,
        },
    )
}

#[tokio::test]
async fn test_bad_record_is_rejected_without_failing_batch() {
    let source = Arc::new(ScriptedSource::new());
    source.push(
        "PL",
        Ok(payload(
            "PL",
            vec![
                fixture_match(1, (0, 0), (1, 0)),
                fixture_match(2, (2, 0), (1, 0)),
                fixture_match(3, (1, 1), (2, 2)),
            ],
        )),
    );

    let extract = extractor(source, vec![2024])
        .extract("PL", RunId(1))
        .await
        .unwrap();

    assert_eq!(extract.accepted, 2);
    assert_eq!(extract.rejected.len(), 1);
    assert_eq!(extract.rejected[0].match_id, Some(2));
    assert_eq!(
        extract.rejected[0].reason,
        RejectionReason::HalfTimeExceedsFullTime
    );
    assert_eq!(extract.batch.teams.len(), 2);
    assert_eq!(extract.requests, 1);
}

#[tokio::test]
async fn test_every_season_is_requested() {
    let source = Arc::new(ScriptedSource::new());
    source.push("PL", Ok(payload("PL", vec![fixture_match(1, (0, 0), (1, 0))])));
    source.push("PL", Ok(payload("PL", vec![fixture_match(2, (0, 0), (0, 0))])));

    let extractor = extractor(source.clone(), vec![2023, 2024]);
    let extract = extractor.extract("PL", RunId(4)).await.unwrap();

    assert_eq!(extract.accepted, 2);
    assert_eq!(extract.raw_payloads.len(), 2);
    let seasons: Vec<_> = source.seen.lock().iter().map(|q| q.season).collect();
    assert_eq!(seasons, vec![Some(2023), Some(2024)]);
    assert_eq!(extractor.request_counts().get("PL"), Some(&2));
    assert_eq!(extractor.take_request_counts().get("PL"), Some(&2));
    assert!(extractor.request_counts().is_empty());
}

#[tokio::test]
async fn test_transient_failure_is_retried_and_counted() {
    let source = Arc::new(ScriptedSource::new());
    source.push("PL", Err(ApiError::Server { status: 502 }));
    source.push(
        "PL",
        Err(ApiError::RateLimited {
            retry_after: Some(Duration::from_millis(2)),
        }),
    );
    source.push("PL", Ok(payload("PL", vec![fixture_match(1, (0, 0), (1, 0))])));

    let extract = extractor(source, vec![2024])
        .extract("PL", RunId(1))
        .await
        .unwrap();
    assert_eq!(extract.requests, 3);
    assert_eq!(extract.accepted, 1);
}

#[tokio::test]
async fn test_malformed_payload_is_permanent() {
    let source = Arc::new(ScriptedSource::new());
    source.push("PL", Ok("<html>maintenance</html>".to_string()));

    let err = extractor(source, vec![2024])
        .extract("PL", RunId(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::Malformed { .. }));
    assert_eq!(err.class(), ErrorClass::Permanent);
}

#[tokio::test]
async fn test_exhausted_retries_are_permanent_for_scheduler() {
    let source = Arc::new(ScriptedSource::new());
    for _ in 0..3 {
        source.push("PL", Err(ApiError::Timeout));
    }

    let err = extractor(source, vec![2024])
        .extract("PL", RunId(1))
        .await
        .unwrap_err();
    match &err {
        ExtractError::Api {
            source: RetryError::ExhaustedRetries { attempts, .. },
            ..
        } => assert_eq!(*attempts, 3),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.class(), ErrorClass::Permanent);
}

#[tokio::test]
async fn test_extract_all_isolates_failures() {
    let source = Arc::new(ScriptedSource::new());
    source.push("PL", Ok(payload("PL", vec![fixture_match(1, (0, 0), (1, 0))])));
    source.push(
        "PD",
        Err(ApiError::Client {
            status: 403,
            message: "restricted".to_string(),
        }),
    );

    let results = extractor(source, vec![2024])
        .extract_all(&["PL".to_string(), "PD".to_string()], RunId(1))
        .await;

    assert!(results["PL"].is_ok());
    assert!(results["PD"].is_err());
}
