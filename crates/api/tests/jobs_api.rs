//! Integration tests for the job, queue and pool endpoints.

mod common;

use axum::http::StatusCode;
use common::{body_json, get, post_empty, post_json, submit};
use serde_json::json;

// ---------------------------------------------------------------------------
// Submission and dedup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_then_duplicate_then_other_tool() {
    let (app, _) = common::build_test_app();

    let first = submit(app.clone(), "col_1", "photostats").await;
    assert_eq!(first["status"], "queued");
    assert_eq!(first["position"], 1);
    assert_eq!(first["resource_key"], "col_1:photostats");

    let dup = post_json(
        app.clone(),
        "/api/v1/jobs",
        json!({ "target": "col_1", "tool": "photostats" }),
    )
    .await;
    assert_eq!(dup.status(), StatusCode::CONFLICT);
    let body = body_json(dup).await;
    assert_eq!(body["code"], "CONFLICT");
    assert_eq!(body["existing_job_id"], first["id"]);

    let other = submit(app, "col_1", "photo_pairing").await;
    assert_eq!(other["position"], 2);
}

#[tokio::test]
async fn invalid_target_is_400() {
    let (app, _) = common::build_test_app();
    let response = post_json(
        app,
        "/api/v1/jobs",
        json!({ "target": "bad target!", "tool": "photostats" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn display_graph_requires_pipeline_validation() {
    let (app, _) = common::build_test_app();
    let bad = post_json(
        app.clone(),
        "/api/v1/jobs",
        json!({ "target": "pipe_1", "tool": "photostats", "mode": "display_graph" }),
    )
    .await;
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

    let good = post_json(
        app,
        "/api/v1/jobs",
        json!({ "target": "pipe_1", "tool": "pipeline_validation", "mode": "display_graph" }),
    )
    .await;
    assert_eq!(good.status(), StatusCode::CREATED);
    assert_eq!(
        body_json(good).await["data"]["resource_key"],
        "pipe_1:pipeline_validation:display_graph"
    );
}

#[tokio::test]
async fn future_submission_is_scheduled_without_position() {
    let (app, _) = common::build_test_app();
    let at = chrono::Utc::now() + chrono::Duration::hours(1);
    let response = post_json(
        app,
        "/api/v1/jobs",
        json!({ "target": "col_1", "tool": "photostats", "scheduled_for": at }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let job = body_json(response).await["data"].clone();
    assert_eq!(job["status"], "scheduled");
    assert!(job["position"].is_null());
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_unknown_job_is_404() {
    let (app, _) = common::build_test_app();
    let id = uuid::Uuid::now_v7();
    let response = get(app, &format!("/api/v1/jobs/{id}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn list_filters_by_status() {
    let (app, _) = common::build_test_app();
    let a = submit(app.clone(), "a", "photostats").await;
    let b = submit(app.clone(), "b", "photostats").await;
    let cancel = post_empty(app.clone(), &format!("/api/v1/jobs/{}/cancel", b["id"].as_str().unwrap())).await;
    assert_eq!(cancel.status(), StatusCode::OK);

    let all = body_json(get(app.clone(), "/api/v1/jobs").await).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 2);

    let queued = body_json(get(app.clone(), "/api/v1/jobs?status=queued").await).await;
    let queued = queued["data"].as_array().unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0]["id"], a["id"]);

    let bad = get(app, "/api/v1/jobs?status=paused").await;
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_twice_is_412() {
    let (app, _) = common::build_test_app();
    let job = submit(app.clone(), "col_1", "photostats").await;
    let uri = format!("/api/v1/jobs/{}/cancel", job["id"].as_str().unwrap());

    let first = post_empty(app.clone(), &uri).await;
    assert_eq!(first.status(), StatusCode::OK);
    let body = body_json(first).await;
    assert_eq!(body["data"]["status"], "cancelled");
    assert!(body["data"]["completed_at"].is_string());

    let second = post_empty(app, &uri).await;
    assert_eq!(second.status(), StatusCode::PRECONDITION_FAILED);
    assert_eq!(body_json(second).await["code"], "PRECONDITION_FAILED");
}

#[tokio::test]
async fn cancel_running_is_412() {
    let (app, _) = common::build_test_app();
    let job = submit(app.clone(), "col_1", "photostats").await;
    let claim = post_empty(app.clone(), "/api/v1/agents/agent-1/claim").await;
    assert_eq!(claim.status(), StatusCode::OK);

    let uri = format!("/api/v1/jobs/{}/cancel", job["id"].as_str().unwrap());
    let response = post_empty(app, &uri).await;
    assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
}

// ---------------------------------------------------------------------------
// Worker lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn claim_progress_complete() {
    let (app, _) = common::build_test_app();
    let job = submit(app.clone(), "col_1", "photostats").await;
    let id = job["id"].as_str().unwrap().to_string();

    let claimed = body_json(post_empty(app.clone(), "/api/v1/agents/agent-1/claim").await).await;
    assert_eq!(claimed["data"]["id"], job["id"]);
    assert_eq!(claimed["data"]["status"], "running");
    assert_eq!(claimed["data"]["agent_id"], "agent-1");

    let progress = post_json(
        app.clone(),
        &format!("/api/v1/jobs/{id}/progress"),
        json!({ "agent_id": "agent-1", "progress": { "files": 12, "total": 40 } }),
    )
    .await;
    assert_eq!(progress.status(), StatusCode::OK);
    assert_eq!(body_json(progress).await["data"]["progress"]["files"], 12);

    let done = post_json(
        app.clone(),
        &format!("/api/v1/jobs/{id}/complete"),
        json!({ "agent_id": "agent-1", "result_ref": "results/col_1" }),
    )
    .await;
    assert_eq!(done.status(), StatusCode::OK);
    let done = body_json(done).await;
    assert_eq!(done["data"]["status"], "completed");
    assert_eq!(done["data"]["result_ref"], "results/col_1");

    let status = body_json(get(app, "/api/v1/queue/status").await).await;
    assert_eq!(status["data"]["completed_count"], 1);
    assert!(status["data"]["current_job_id"].is_null());
}

#[tokio::test]
async fn claim_on_empty_queue_is_204() {
    let (app, _) = common::build_test_app();
    let response = post_empty(app, "/api/v1/agents/agent-1/claim").await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn report_from_wrong_agent_is_412() {
    let (app, _) = common::build_test_app();
    let job = submit(app.clone(), "col_1", "photostats").await;
    post_empty(app.clone(), "/api/v1/agents/agent-1/claim").await;

    let response = post_json(
        app,
        &format!("/api/v1/jobs/{}/fail", job["id"].as_str().unwrap()),
        json!({ "agent_id": "agent-2", "error_message": "nope" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn fail_records_error_message() {
    let (app, _) = common::build_test_app();
    let job = submit(app.clone(), "col_1", "photostats").await;
    post_empty(app.clone(), "/api/v1/agents/agent-1/claim").await;

    let response = post_json(
        app,
        &format!("/api/v1/jobs/{}/fail", job["id"].as_str().unwrap()),
        json!({ "agent_id": "agent-1", "error_message": "collection offline" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "failed");
    assert_eq!(body["data"]["error_message"], "collection offline");
}

#[tokio::test]
async fn release_puts_job_back_at_the_front() {
    let (app, _) = common::build_test_app();
    let a = submit(app.clone(), "a", "photostats").await;
    let b = submit(app.clone(), "b", "photostats").await;
    post_empty(app.clone(), "/api/v1/agents/agent-1/claim").await;

    let response = post_json(
        app.clone(),
        &format!("/api/v1/jobs/{}/release", a["id"].as_str().unwrap()),
        json!({ "agent_id": "agent-1" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let released = body_json(response).await;
    assert_eq!(released["data"]["status"], "queued");
    assert_eq!(released["data"]["position"], 1);
    assert!(released["data"]["agent_id"].is_null());

    let b = body_json(get(app, &format!("/api/v1/jobs/{}", b["id"].as_str().unwrap())).await).await;
    assert_eq!(b["data"]["position"], 2);
}

// ---------------------------------------------------------------------------
// Queue and pool status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queue_status_reports_current_job() {
    let (app, _) = common::build_test_app();
    let a = submit(app.clone(), "a", "photostats").await;
    submit(app.clone(), "b", "photostats").await;
    post_empty(app.clone(), "/api/v1/agents/agent-1/claim").await;

    let status = body_json(get(app, "/api/v1/queue/status").await).await;
    assert_eq!(status["data"]["queued_count"], 1);
    assert_eq!(status["data"]["running_count"], 1);
    assert_eq!(status["data"]["current_job_id"], a["id"]);
}

#[tokio::test]
async fn pool_status_matches_latest_pool_event() {
    let (app, state) = common::build_test_app();
    let mut rx = state.event_bus.subscribe();

    post_json(app.clone(), "/api/v1/agents/agent-1/heartbeat", json!({})).await;
    post_json(app.clone(), "/api/v1/agents/agent-2/heartbeat", json!({ "name": "Lab" })).await;
    submit(app.clone(), "a", "photostats").await;
    post_empty(app.clone(), "/api/v1/agents/agent-1/claim").await;

    let mut last_pool = None;
    while let Ok(event) = rx.try_recv() {
        if let toolq_events::QueueEvent::PoolStatus { status } = event {
            last_pool = Some(status);
        }
    }
    let last_pool = serde_json::to_value(last_pool.expect("pool event published")).unwrap();

    let polled = body_json(get(app, "/api/v1/pool/status").await).await;
    assert_eq!(polled["data"], last_pool);
    assert_eq!(polled["data"]["online_count"], 2);
    assert_eq!(polled["data"]["idle_count"], 1);
    assert_eq!(polled["data"]["status"], "running");
}
