//! End-to-end tests for backup jobs and their executions.

mod common;

use backup_engine::store::{
    ExecutionFilter, ExecutionStatus, ExecutionStore, HttpMethod, NewExecution, PageRequest,
    TerminalOutcome, WebhookParams,
};
use backup_engine::{EngineError, EventType};
use common::{CaptureServer, FakeDumper, TestEngine, WAIT_TIMEOUT};
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn test_trigger_now_streams_dump_and_notifies_webhook() {
    let server = CaptureServer::spawn(vec![]).await;
    let mut env = TestEngine::start(FakeDumper::new(1_048_576)).await;
    let engine = env.engine().clone();

    let job = env.create_job("nightly").await;
    engine
        .create_webhook(WebhookParams {
            name: "on success".to_string(),
            event_type: EventType::ExecutionSuccess,
            target_ids: vec![job.id],
            is_active: true,
            method: HttpMethod::Post,
            url: server.url("/backup-done"),
            headers: None,
            body: None,
        })
        .unwrap();

    let running = engine.trigger_now(job.id).await.unwrap();
    assert_eq!(running.status, ExecutionStatus::Running);
    assert_eq!(running.backup_id, Some(job.id));

    let done = env.wait_for_terminal(running.id).await;
    assert_eq!(done.status, ExecutionStatus::Success);
    assert_eq!(done.file_size, Some(1_048_576));
    assert!(done.error.is_none());
    assert!(done.finished_at.unwrap() > done.started_at);

    let files = env.destination.files();
    assert_eq!(files.len(), 1);
    assert_eq!(files.values().next().unwrap().len(), 1_048_576);

    let requests = server.wait_for_requests(1, WAIT_TIMEOUT).await;
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/backup-done");
    assert_eq!(request.header("content-type"), Some("application/json"));

    let body = request.json();
    assert_eq!(body["event_type"], "backup.execution.success");
    assert_eq!(body["backup_id"], job.id.to_string());
    assert_eq!(body["execution_id"], done.id.to_string());
    assert_eq!(body["payload"]["execution"]["file_size"], 1_048_576);

    // Exactly one delivery.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.requests().len(), 1);

    env.shutdown().await;
}

#[tokio::test]
async fn test_dump_failure_records_failed_execution() {
    let env = TestEngine::start(FakeDumper::failing("could not connect to server")).await;
    let job = env.create_job("broken").await;

    let running = env.engine().trigger_now(job.id).await.unwrap();
    let done = env.wait_for_terminal(running.id).await;

    assert_eq!(done.status, ExecutionStatus::Failed);
    assert!(done.error.unwrap().contains("could not connect to server"));
    assert!(done.file_size.is_none());
    assert!(done.finished_at.is_some());
    assert!(env.destination.files().is_empty());
}

#[tokio::test]
async fn test_concurrent_triggers_allow_one_running_execution() {
    let env = TestEngine::start(FakeDumper::new(1024).with_delay(Duration::from_millis(300))).await;
    let job = env.create_job("slow").await;

    let job_id = job.id;
    let attempts = (0..8).map(|_| {
        let engine = env.engine().clone();
        async move { engine.trigger_now(job_id).await }
    });
    let results = futures::future::join_all(attempts).await;

    let started: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(EngineError::Conflict { .. })))
        .count();
    assert_eq!(started.len(), 1);
    assert_eq!(conflicts, 7);

    let done = env.wait_for_terminal(started[0].id).await;
    assert_eq!(done.status, ExecutionStatus::Success);

    // The slot is free again once the run is terminal.
    let again = env.engine().trigger_now(job.id).await.unwrap();
    assert_eq!(
        env.wait_for_terminal(again.id).await.status,
        ExecutionStatus::Success
    );
}

#[tokio::test]
async fn test_execution_pagination() {
    let env = TestEngine::start(FakeDumper::new(16)).await;
    let job = env.create_job("paged").await;

    for i in 0..45u64 {
        let execution = env
            .store
            .create_execution(&NewExecution {
                backup_id: Some(job.id),
                database_id: job.database_id,
                destination_id: job.destination_id,
            })
            .unwrap();
        env.store.set_running(execution.id).unwrap();
        env.store
            .set_terminal(
                execution.id,
                &TerminalOutcome::Success {
                    file_size: i,
                    path: format!("backup-{}.sql", i),
                },
            )
            .unwrap();
    }

    let filter = ExecutionFilter {
        backup_id: Some(job.id),
        ..Default::default()
    };
    let (page2, rows) = env
        .engine()
        .list_executions(&filter, PageRequest::new(2, 20))
        .unwrap();
    assert_eq!(rows.len(), 20);
    assert!(page2.has_next_page);
    assert!(page2.has_previous_page);
    assert_eq!(page2.total_items, 45);
    assert_eq!(page2.total_pages, 3);

    let (page3, rows) = env
        .engine()
        .list_executions(&filter, PageRequest::new(3, 20))
        .unwrap();
    assert_eq!(rows.len(), 5);
    assert!(!page3.has_next_page);

    let other = ExecutionFilter {
        database_id: Some(Uuid::new_v4()),
        ..Default::default()
    };
    let (empty, rows) = env
        .engine()
        .list_executions(&other, PageRequest::new(1, 20))
        .unwrap();
    assert!(rows.is_empty());
    assert_eq!(empty.total_items, 0);

    assert!(matches!(
        env.engine().list_executions(&filter, PageRequest::new(0, 20)),
        Err(EngineError::Validation(_))
    ));
}

#[tokio::test]
async fn test_delete_lets_running_execution_finish() {
    let env = TestEngine::start(FakeDumper::new(512).with_delay(Duration::from_millis(200))).await;
    let job = env.create_job("doomed").await;

    let running = env.engine().trigger_now(job.id).await.unwrap();
    env.engine().delete_backup_job(job.id).await.unwrap();

    let done = env.wait_for_terminal(running.id).await;
    assert_eq!(done.status, ExecutionStatus::Success);
    // History survives without the job.
    assert_eq!(done.backup_id, None);

    assert!(matches!(
        env.engine().get_backup_job(job.id),
        Err(EngineError::NotFound { .. })
    ));
    assert_eq!(env.engine().next_run_at(job.id).await.unwrap(), None);
    assert!(matches!(
        env.engine().trigger_now(job.id).await,
        Err(EngineError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_delete_while_running_still_delivers_terminal_webhook() {
    let server = CaptureServer::spawn(vec![]).await;
    let env = TestEngine::start(FakeDumper::new(512).with_delay(Duration::from_millis(300))).await;
    let job = env.create_job("removed mid-run").await;
    for (event_type, path) in [
        (EventType::ExecutionStarted, "/started"),
        (EventType::ExecutionSuccess, "/success"),
    ] {
        env.engine()
            .create_webhook(WebhookParams {
                name: path.to_string(),
                event_type,
                target_ids: vec![job.id],
                is_active: true,
                method: HttpMethod::Post,
                url: server.url(path),
                headers: None,
                body: None,
            })
            .unwrap();
    }

    let running = env.engine().trigger_now(job.id).await.unwrap();
    env.engine().delete_backup_job(job.id).await.unwrap();
    assert_eq!(
        env.wait_for_terminal(running.id).await.status,
        ExecutionStatus::Success
    );

    let requests = server.wait_for_requests(2, WAIT_TIMEOUT).await;
    let mut paths: Vec<_> = requests.iter().map(|r| r.path.clone()).collect();
    paths.sort();
    assert_eq!(paths, vec!["/started".to_string(), "/success".to_string()]);

    let success = requests.iter().find(|r| r.path == "/success").unwrap();
    assert_eq!(success.json()["backup_id"], job.id.to_string());
    assert_eq!(success.json()["execution_id"], running.id.to_string());
}

#[tokio::test]
async fn test_duplicate_and_update_jobs() {
    let env = TestEngine::start(FakeDumper::new(8)).await;
    let job = env.create_job("weekly").await;

    let copy = env.engine().duplicate_backup_job(job.id).await.unwrap();
    assert_ne!(copy.id, job.id);
    assert_eq!(copy.name, "weekly (copy)");
    assert_eq!(copy.cron_expression, job.cron_expression);
    assert_eq!(copy.destination_id, job.destination_id);
    assert!(env.engine().next_run_at(copy.id).await.unwrap().is_some());

    let mut params = env.job_params("weekly");
    params.is_active = false;
    let updated = env.engine().update_backup_job(job.id, params).await.unwrap();
    assert!(!updated.is_active);
    assert_eq!(env.engine().next_run_at(job.id).await.unwrap(), None);
    // The copy keeps its own schedule.
    assert!(env.engine().next_run_at(copy.id).await.unwrap().is_some());

    let mut bad = env.job_params("weekly");
    bad.cron_expression = "61 * * * *".to_string();
    assert!(matches!(
        env.engine().update_backup_job(job.id, bad).await,
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        env.engine()
            .update_backup_job(Uuid::new_v4(), env.job_params("ghost"))
            .await,
        Err(EngineError::NotFound { .. })
    ));

    let jobs = env.engine().list_backup_jobs().unwrap();
    assert_eq!(jobs.len(), 2);
}

#[tokio::test]
async fn test_ad_hoc_run() {
    let env = TestEngine::start(FakeDumper::new(2048)).await;

    let running = env
        .engine()
        .run_ad_hoc(env.database_id, env.destination_id)
        .await
        .unwrap();
    assert!(running.backup_id.is_none());

    let done = env.wait_for_terminal(running.id).await;
    assert_eq!(done.status, ExecutionStatus::Success);
    assert_eq!(done.file_size, Some(2048));
    assert_eq!(env.engine().get_execution(done.id).unwrap(), done);
}

#[tokio::test]
async fn test_restart_fails_interrupted_executions() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let db_path = temp_dir.path().join("engine.db");

    let stale_id = {
        let store = backup_engine::SqliteStore::new(&db_path).unwrap();
        let execution = store
            .create_execution(&NewExecution {
                backup_id: None,
                database_id: Uuid::new_v4(),
                destination_id: Uuid::new_v4(),
            })
            .unwrap();
        store.set_running(execution.id).unwrap();
        execution.id
    };

    let mut env = TestEngine::start_at(&db_path, FakeDumper::new(1)).await;
    let recovered = env.engine().get_execution(stale_id).unwrap();
    assert_eq!(recovered.status, ExecutionStatus::Failed);
    assert_eq!(recovered.error.as_deref(), Some("interrupted: process restarted"));
    assert!(recovered.finished_at.is_some());
    env.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_cancels_running_execution() {
    let mut env =
        TestEngine::start(FakeDumper::new(1).with_delay(Duration::from_secs(60))).await;
    let job = env.create_job("endless").await;
    let running = env.engine().trigger_now(job.id).await.unwrap();

    tokio::time::timeout(WAIT_TIMEOUT, env.shutdown())
        .await
        .expect("shutdown took too long");

    let stored = env.store.get_execution(running.id).unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Failed);
    assert!(stored.error.unwrap().contains("cancelled"));
}
