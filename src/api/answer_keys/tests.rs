use axum::http::{Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use crate::test_support::{self, bearer_token, json_request, pending_submission, read_json};

const OWNER: &str = "teacher-1";

fn geography_key() -> serde_json::Value {
    json!({
        "title": "Geography unit test",
        "subject": "Social science",
        "total_marks": 10,
        "items": [
            {"question_number": 1, "type": "short_answer", "expected_answer": "Paris",
             "keywords": ["Paris"], "max_marks": 5},
            {"question_number": 2, "type": "short_answer", "expected_answer": "forty-two",
             "keywords": ["42"], "max_marks": 5}
        ]
    })
}

async fn create_key(
    app: &axum::Router,
    token: &str,
    body: serde_json::Value,
) -> serde_json::Value {
    let response = app
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/answer-keys", Some(token), Some(body)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    read_json(response).await
}

#[tokio::test]
async fn create_and_fetch_answer_key() {
    let ctx = test_support::setup_test_context();
    let token = bearer_token(OWNER, ctx.state.settings());

    let created = create_key(&ctx.app, &token, geography_key()).await;
    assert_eq!(created["title"], "Geography unit test");
    assert_eq!(created["question_count"], 2);
    assert!(created["marking_scheme"]["keyword_weight_percent"].is_number());

    let id = created["id"].as_str().expect("id").to_string();
    let response = ctx
        .app
        .clone()
        .oneshot(json_request(Method::GET, &format!("/api/v1/answer-keys/{id}"), Some(&token), None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let fetched = read_json(response).await;
    assert_eq!(fetched["id"], id);
    assert_eq!(fetched["items"][1]["expected_answer"], "forty-two");
}

#[tokio::test]
async fn invalid_rubric_is_rejected() {
    let ctx = test_support::setup_test_context();
    let token = bearer_token(OWNER, ctx.state.settings());

    let mut body = geography_key();
    body["items"][1]["question_number"] = json!(1);

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/answer-keys", Some(&token), Some(body)))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = read_json(response).await;
    assert_eq!(json["status"], 400);
    assert_eq!(ctx.store.answer_key_count(), 0);
}

#[tokio::test]
async fn empty_title_fails_validation() {
    let ctx = test_support::setup_test_context();
    let token = bearer_token(OWNER, ctx.state.settings());

    let mut body = geography_key();
    body["title"] = json!("");

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/answer-keys", Some(&token), Some(body)))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_is_scoped_to_owner_and_searchable() {
    let ctx = test_support::setup_test_context();
    let owner_token = bearer_token(OWNER, ctx.state.settings());
    let other_token = bearer_token("teacher-2", ctx.state.settings());

    create_key(&ctx.app, &owner_token, geography_key()).await;
    let mut history = geography_key();
    history["title"] = json!("History midterm");
    create_key(&ctx.app, &owner_token, history).await;
    create_key(&ctx.app, &other_token, geography_key()).await;

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(Method::GET, "/api/v1/answer-keys", Some(&owner_token), None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let all = read_json(response).await;
    assert_eq!(all.as_array().map(Vec::len), Some(2));

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::GET,
            "/api/v1/answer-keys?search=history",
            Some(&owner_token),
            None,
        ))
        .await
        .expect("response");
    let found = read_json(response).await;
    let found = found.as_array().expect("array");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["title"], "History midterm");
}

#[tokio::test]
async fn other_owners_key_is_not_found() {
    let ctx = test_support::setup_test_context();
    let owner_token = bearer_token(OWNER, ctx.state.settings());
    let other_token = bearer_token("teacher-2", ctx.state.settings());

    let created = create_key(&ctx.app, &owner_token, geography_key()).await;
    let id = created["id"].as_str().expect("id");

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::GET,
            &format!("/api/v1/answer-keys/{id}"),
            Some(&other_token),
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::DELETE,
            &format!("/api/v1/answer-keys/{id}"),
            Some(&other_token),
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(ctx.store.answer_key_count(), 1);
}

#[tokio::test]
async fn delete_is_refused_while_submissions_reference_key() {
    let ctx = test_support::setup_test_context();
    let token = bearer_token(OWNER, ctx.state.settings());

    let created = create_key(&ctx.app, &token, geography_key()).await;
    let id = created["id"].as_str().expect("id").to_string();

    let submission = pending_submission(OWNER, &id);
    ctx.state.store().insert_submission(&submission).await.expect("insert");

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(Method::DELETE, &format!("/api/v1/answer-keys/{id}"), Some(&token), None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            Method::GET,
            &format!("/api/v1/answer-keys/{id}/submissions"),
            Some(&token),
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let listed = read_json(response).await;
    assert_eq!(listed[0]["id"], submission.id);
    assert_eq!(listed[0]["status"], "pending");
}

#[tokio::test]
async fn unused_key_can_be_deleted() {
    let ctx = test_support::setup_test_context();
    let token = bearer_token(OWNER, ctx.state.settings());

    let created = create_key(&ctx.app, &token, geography_key()).await;
    let id = created["id"].as_str().expect("id");

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(Method::DELETE, &format!("/api/v1/answer-keys/{id}"), Some(&token), None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(ctx.store.answer_key_count(), 0);
}
