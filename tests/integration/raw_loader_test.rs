// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{extract_of, fixture_match, memory_db, valid_matches};
use matchday::domain::models::extraction_run::RunId;
use matchday::domain::repositories::raw_repository::RawRepository;
use matchday::domain::repositories::storage_repository::StorageError;
use matchday::domain::services::landing_service::{LandingError, LandingWriter};
use matchday::domain::services::load_service::RawLoader;
use matchday::infrastructure::repositories::raw_repo_impl::RawRepositoryImpl;
use matchday::infrastructure::storage::LocalStorage;
use std::sync::Arc;
use tempfile::TempDir;

struct FileHarness {
    _dir: TempDir,
    landing: Arc<LandingWriter>,
    repo: Arc<RawRepositoryImpl>,
    loader: RawLoader,
}

async fn file_harness() -> FileHarness {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(LocalStorage::new(dir.path()));
    let landing = Arc::new(LandingWriter::new(storage, false));
    let repo = Arc::new(RawRepositoryImpl::new(memory_db().await));
    FileHarness {
        loader: RawLoader::new(landing.clone(), repo.clone()),
        _dir: dir,
        landing,
        repo,
    }
}

#[tokio::test]
async fn test_landing_is_create_only_on_disk() {
    let h = file_harness().await;
    let extract = extract_of("PL", RunId(1), &valid_matches(1, 2));
    h.landing.write(RunId(1), &extract).await.unwrap();

    let err = h.landing.write(RunId(1), &extract).await.unwrap_err();
    assert!(matches!(
        err,
        LandingError::Storage(StorageError::AlreadyExists(_))
    ));
}

/// 运行7先于运行5加载，运行5的旧数据不能覆盖
#[tokio::test]
async fn test_late_older_run_never_overwrites_newer_rows() {
    let h = file_harness().await;
    let newer = extract_of("PL", RunId(7), &[fixture_match(1, (1, 0), (3, 1))]);
    let older = extract_of(
        "PL",
        RunId(5),
        &[fixture_match(1, (0, 0), (0, 0)), fixture_match(2, (0, 0), (1, 0))],
    );

    let newer_artifact = h.landing.write(RunId(7), &newer).await.unwrap();
    let stats = h.loader.load(&newer_artifact).await.unwrap();
    assert_eq!(stats.rows_inserted, 1);

    let older_artifact = h.landing.write(RunId(5), &older).await.unwrap();
    let stats = h.loader.load(&older_artifact).await.unwrap();
    assert_eq!(stats.rows_stale, 1);
    assert_eq!(stats.rows_inserted, 1);

    let stored = h.repo.find_match(1).await.unwrap().unwrap();
    assert_eq!(stored.extraction_run_id, RunId(7));
    assert_eq!(stored.full_time.home, Some(3));
    assert_eq!(h.repo.count_matches(Some("PL")).await.unwrap(), 2);
}

#[tokio::test]
async fn test_pending_artifacts_load_in_run_order() {
    let h = file_harness().await;
    for run in [3, 1, 2] {
        let extract = extract_of(
            "PD",
            RunId(run),
            &[fixture_match(10, (0, 0), (run, 0))],
        );
        h.landing.write(RunId(run), &extract).await.unwrap();
    }

    let applied = h.loader.load_pending("PD", RunId(2)).await.unwrap();
    let order: Vec<RunId> = applied.iter().map(|(id, _)| *id).collect();
    assert_eq!(order, vec![RunId(1), RunId(2)]);
    assert_eq!(
        h.repo.find_match(10).await.unwrap().unwrap().full_time.home,
        Some(2)
    );

    let applied = h.loader.load_pending("PD", RunId(3)).await.unwrap();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].0, RunId(3));
    assert_eq!(
        h.repo.ledgered_runs("PD").await.unwrap().into_iter().collect::<Vec<_>>(),
        vec![RunId(1), RunId(2), RunId(3)]
    );
}
