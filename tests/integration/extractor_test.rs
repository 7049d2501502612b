// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{api_settings, fast_retry, fixture_match, payload, valid_matches};
use matchday::domain::models::extraction_run::RunId;
use matchday::domain::models::match_record::RejectionReason;
use matchday::domain::services::extraction_service::{ExtractError, ExtractionWindow, Extractor};
use matchday::engines::football_data_engine::FootballDataClient;
use matchday::utils::errors::{Classify, ErrorClass};
use matchday::utils::rate_limiter::RateLimiter;
use matchday::utils::retry_policy::RetryError;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn extractor(
    server: &MockServer,
    competitions: &[&str],
    seasons: Vec<i32>,
    limiter: RateLimiter,
) -> Extractor {
    let mut settings = api_settings(&server.uri(), competitions);
    settings.seasons = seasons;
    let client = Arc::new(FootballDataClient::new(&settings).unwrap());
    Extractor::new(
        client,
        Arc::new(limiter),
        fast_retry(),
        ExtractionWindow::from(&settings),
    )
}

#[tokio::test]
async fn test_rate_limited_response_is_retried_after_delay() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/competitions/PL/matches"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/competitions/PL/matches"))
        .and(header("X-Auth-Token", "test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(payload("PL", valid_matches(1, 3))))
        .mount(&server)
        .await;

    let extractor = extractor(
        &server,
        &["PL"],
        vec![2024],
        RateLimiter::new(10, Duration::from_secs(60)),
    );
    let started = Instant::now();
    let extract = extractor.extract("PL", RunId(1)).await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(extract.accepted, 3);
    assert_eq!(extract.requests, 2);
}

#[tokio::test]
async fn test_shared_limiter_bounds_request_rate() {
    let server = MockServer::start().await;
    for season in ["2022", "2023", "2024"] {
        Mock::given(method("GET"))
            .and(path("/competitions/PL/matches"))
            .and(query_param("season", season))
            .respond_with(ResponseTemplate::new(200).set_body_json(payload("PL", vec![])))
            .mount(&server)
            .await;
    }

    let extractor = extractor(
        &server,
        &["PL"],
        vec![2022, 2023, 2024],
        RateLimiter::new(2, Duration::from_millis(300)),
    );
    let started = Instant::now();
    let extract = extractor.extract("PL", RunId(1)).await.unwrap();

    // 第三个请求必须等到第一个请求滑出窗口
    assert!(started.elapsed() >= Duration::from_millis(280));
    assert_eq!(extract.requests, 3);
    assert_eq!(extract.accepted, 0);
}

#[tokio::test]
async fn test_failures_are_isolated_per_competition() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/competitions/PL/matches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(payload(
            "PL",
            vec![fixture_match(1, (0, 0), (2, 1)), fixture_match(2, (1, 0), (0, 0))],
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/competitions/PD/matches"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/competitions/FL1/matches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"matches": "oops"})))
        .mount(&server)
        .await;

    let codes = ["PL", "PD", "FL1"];
    let extractor = extractor(
        &server,
        &codes,
        vec![2024],
        RateLimiter::new(50, Duration::from_secs(60)),
    );
    let results = extractor
        .extract_all(&codes.map(String::from), RunId(3))
        .await;

    let pl = results["PL"].as_ref().unwrap();
    assert_eq!(pl.accepted, 1);
    assert_eq!(pl.rejected[0].reason, RejectionReason::HalfTimeExceedsFullTime);

    match results["PD"].as_ref().unwrap_err() {
        ExtractError::Api { source, .. } => {
            assert!(matches!(source, RetryError::ExhaustedRetries { attempts: 3, .. }));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(results["PD"].as_ref().unwrap_err().class(), ErrorClass::Permanent);

    let fl1 = results["FL1"].as_ref().unwrap_err();
    assert!(matches!(fl1, ExtractError::Malformed { .. }));
    assert_eq!(fl1.class(), ErrorClass::Permanent);

    let counts = extractor.request_counts();
    assert_eq!(counts.get("PD"), Some(&3));
    assert_eq!(counts.get("PL"), Some(&1));
}
