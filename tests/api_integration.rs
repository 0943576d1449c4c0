//! Integration tests for CareWatch API endpoints.
//!
//! These tests verify the full request/response cycle through the HTTP API.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum_test::TestServer;
use serde_json::{Value, json};
use tower::ServiceExt;

use carewatch::analysis::Analyzer;
use carewatch::api::{AppState, router};
use carewatch::storage::Storage;
use carewatch::surveillance::DetectionParams;

async fn create_state() -> AppState {
    let storage = Storage::new("sqlite::memory:").await.unwrap();
    AppState {
        storage,
        analyzer: Analyzer::default(),
        detection: DetectionParams::default(),
    }
}

async fn create_test_server() -> TestServer {
    TestServer::new(router(create_state().await)).unwrap()
}

fn gastro_submission(location: Option<&str>) -> Value {
    let mut body = json!({
        "symptoms": [
            { "name": "nausea", "severity": 4, "duration": { "value": 1, "unit": "days" } },
            { "name": "vomiting", "severity": 5, "duration": { "value": 12, "unit": "hours" } }
        ]
    });
    if let Some(location) = location {
        body["location"] = json!(location);
    }
    body
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = create_test_server().await;

    let response = server.get("/health").await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_health_via_oneshot() {
    let app = router(create_state().await);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_post_analysis() {
    let server = create_test_server().await;

    let response = server
        .post("/analyses")
        .json(&gastro_submission(None))
        .await;

    response.assert_status(StatusCode::CREATED);

    let body: Value = response.json();
    assert_eq!(body["result"]["predicted_syndrome"], "gastrointestinal");
    assert_eq!(body["result"]["risk_level"], "medium");
    assert_eq!(body["result"]["flagged_for_review"], false);
    assert_eq!(
        body["result"]["recommendations"][0],
        "Schedule a routine appointment with your doctor"
    );
    // No location, no surveillance case.
    assert!(body["disease_case_id"].is_null());
}

#[tokio::test]
async fn test_post_analysis_with_location_logs_case() {
    let server = create_test_server().await;

    let response = server
        .post("/analyses")
        .json(&gastro_submission(Some("Clinic A")))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    let case_id = body["disease_case_id"].as_i64().unwrap();

    let cases: Value = server.get("/cases").await.json();
    let cases = cases.as_array().unwrap();
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0]["id"], case_id);
    assert_eq!(cases[0]["disease_name"], "gastrointestinal");
    assert_eq!(cases[0]["location"], "Clinic A");
    assert_eq!(cases[0]["severity"], "medium");
    assert_eq!(cases[0]["status"], "detected");
}

#[tokio::test]
async fn test_post_analysis_rejects_bad_severity() {
    let server = create_test_server().await;

    let response = server
        .post("/analyses")
        .json(&json!({
            "symptoms": [
                { "name": "fever", "severity": 11, "duration": { "value": 2, "unit": "days" } }
            ]
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["field"], "symptoms[0].severity");
    assert_eq!(body["retryable"], false);

    // Nothing was stored.
    let listed: Value = server.get("/analyses").await.json();
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_post_analysis_rejects_empty_symptoms() {
    let server = create_test_server().await;

    let response = server.post("/analyses").json(&json!({ "symptoms": [] })).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["field"], "symptoms");
}

#[tokio::test]
async fn test_flagged_filter() {
    let server = create_test_server().await;

    server
        .post("/analyses")
        .json(&gastro_submission(None))
        .await
        .assert_status(StatusCode::CREATED);
    server
        .post("/analyses")
        .json(&json!({
            "symptoms": [
                { "name": "headache", "severity": 2, "duration": { "value": 1, "unit": "days" } }
            ],
            "vital_signs": { "oxygen_saturation": 90 }
        }))
        .await
        .assert_status(StatusCode::CREATED);

    let flagged: Value = server.get("/analyses?flagged=true").await.json();
    let flagged = flagged.as_array().unwrap();
    assert_eq!(flagged.len(), 1);
    assert!(
        flagged[0]["result"]["review_reasons"]
            .as_array()
            .unwrap()
            .contains(&json!("low_oxygen_saturation"))
    );

    let all: Value = server.get("/analyses").await.json();
    assert_eq!(all.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_get_and_rerun_analysis() {
    let server = create_test_server().await;

    let created: Value = server
        .post("/analyses")
        .json(&gastro_submission(None))
        .await
        .json();
    let id = created["id"].as_i64().unwrap();

    let fetched = server.get(&format!("/analyses/{id}")).await;
    fetched.assert_status_ok();
    let fetched: Value = fetched.json();
    assert_eq!(fetched["report"]["symptoms"][1]["name"], "vomiting");

    let rerun = server.post(&format!("/analyses/{id}/rerun")).await;
    rerun.assert_status(StatusCode::CREATED);
    let rerun: Value = rerun.json();
    assert_ne!(rerun["id"], id);
    assert_eq!(rerun["result"]["risk_score"], created["result"]["risk_score"]);
    assert_eq!(rerun["result"]["predicted_syndrome"], "gastrointestinal");
}

#[tokio::test]
async fn test_missing_resources_are_not_found() {
    let server = create_test_server().await;

    server.get("/analyses/42").await.assert_status(StatusCode::NOT_FOUND);
    server.post("/analyses/42/rerun").await.assert_status(StatusCode::NOT_FOUND);
    server.get("/outbreaks/42").await.assert_status(StatusCode::NOT_FOUND);
    server.post("/outbreaks/42/refresh").await.assert_status(StatusCode::NOT_FOUND);
    server
        .patch("/cases/42")
        .json(&json!({ "status": "confirmed" }))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_manual_case_and_review() {
    let server = create_test_server().await;

    let response = server
        .post("/cases")
        .json(&json!({
            "disease_name": "flu",
            "confidence": 0.9,
            "severity": "high",
            "location": "Clinic B",
            "case_date": "2026-10-01T08:00:00Z"
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let case: Value = response.json();
    let id = case["id"].as_i64().unwrap();

    let reviewed = server
        .patch(&format!("/cases/{id}"))
        .json(&json!({ "status": "confirmed", "reviewed_by": "dr-lee" }))
        .await;
    reviewed.assert_status_ok();
    let reviewed: Value = reviewed.json();
    assert_eq!(reviewed["status"], "confirmed");
    assert_eq!(reviewed["severity"], "high");
    assert_eq!(reviewed["reviewed_by"], "dr-lee");

    let confirmed: Value = server.get("/cases?status=confirmed&disease=flu").await.json();
    assert_eq!(confirmed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_manual_case_rejects_blank_location() {
    let server = create_test_server().await;

    let response = server
        .post("/cases")
        .json(&json!({
            "disease_name": "flu",
            "confidence": 0.9,
            "severity": "high",
            "location": "  ",
            "case_date": "2026-10-01T08:00:00Z"
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["field"], "location");
}

#[tokio::test]
async fn test_detect_rejects_bad_parameters() {
    let server = create_test_server().await;

    let response = server
        .post("/outbreaks/detect")
        .json(&json!({ "threshold": 0 }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["field"], "threshold");
}

#[tokio::test]
async fn test_detect_rejects_malformed_threshold() {
    let server = create_test_server().await;

    for bad in [json!({ "threshold": -1 }), json!({ "threshold": "five" })] {
        let response = server.post("/outbreaks/detect").json(&bad).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["field"], "threshold");
        assert_eq!(body["retryable"], false);
    }

    // Nothing was declared by the rejected requests.
    let outbreaks: Value = server.get("/outbreaks").await.json();
    assert!(outbreaks.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_post_analysis_mistyped_field_names_path() {
    let server = create_test_server().await;

    let response = server
        .post("/analyses")
        .json(&json!({
            "symptoms": [
                { "name": "fever", "severity": "high", "duration": { "value": 2, "unit": "days" } }
            ],
            "location": "Clinic A"
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["field"], "symptoms[0].severity");
    assert!(body["error"].as_str().unwrap().starts_with("invalid request"));
}

#[tokio::test]
async fn test_symptom_catalog() {
    let server = create_test_server().await;

    let response = server.get("/symptoms").await;
    response.assert_status_ok();

    let names: Vec<String> = response.json();
    assert!(names.contains(&"fever".to_string()));
    assert!(names.contains(&"shortness_of_breath".to_string()));
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}

#[tokio::test]
async fn test_syndrome_details() {
    let server = create_test_server().await;

    let response = server.get("/syndromes/cardiac").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["name"], "cardiac");
    assert_eq!(body["min_matches"], 1);
    assert_eq!(body["emergency"], true);
    assert!(body["triggers"].as_array().unwrap().contains(&json!("chest_pain")));
    assert!(!body["advice"].as_array().unwrap().is_empty());

    let flu: Value = server.get("/syndromes/flu").await.json();
    assert_eq!(flu["min_matches"], 2);
    assert_eq!(flu["emergency"], false);

    let all: Value = server.get("/syndromes").await.json();
    assert_eq!(all.as_array().unwrap().len(), 5);
    assert_eq!(all[0]["name"], "respiratory_infection");

    server
        .get("/syndromes/unknown_thing")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_full_outbreak_workflow() {
    let server = create_test_server().await;

    // 1. Three matching submissions from the same clinic
    for _ in 0..3 {
        server
            .post("/analyses")
            .json(&gastro_submission(Some("Clinic A")))
            .await
            .assert_status(StatusCode::CREATED);
    }
    // One elsewhere does not count towards Clinic A
    server
        .post("/analyses")
        .json(&gastro_submission(Some("Clinic B")))
        .await
        .assert_status(StatusCode::CREATED);

    // 2. Detection declares one outbreak
    let report = server.post("/outbreaks/detect").json(&json!({})).await;
    report.assert_status_ok();
    let report: Value = report.json();
    assert_eq!(report["threshold"], 3);
    assert_eq!(report["time_window_days"], 7);
    assert_eq!(report["scanned_cases"], 4);
    assert_eq!(report["candidates"].as_array().unwrap().len(), 1);
    let created = report["created"].as_array().unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0]["disease_name"], "gastrointestinal");
    assert_eq!(created[0]["location"], "Clinic A");
    assert_eq!(created[0]["total_cases"], 3);
    assert_eq!(created[0]["severity"], "low");
    assert_eq!(created[0]["status"], "detected");
    let id = created[0]["id"].as_i64().unwrap();

    // 3. Running again does not duplicate it
    let again: Value = server.post("/outbreaks/detect").await.json();
    assert!(again["created"].as_array().unwrap().is_empty());
    assert_eq!(again["existing_outbreak_ids"], json!([id]));

    let active: Value = server.get("/outbreaks?active=true").await.json();
    assert_eq!(active.as_array().unwrap().len(), 1);

    // 4. Cases are linked to the outbreak
    let cases: Value = server.get("/cases?disease=gastrointestinal").await.json();
    let linked = cases
        .as_array()
        .unwrap()
        .iter()
        .filter(|c| c["outbreak_id"] == json!(id))
        .count();
    assert_eq!(linked, 3);

    // 5. A new case arrives and a refresh picks it up
    server
        .post("/analyses")
        .json(&gastro_submission(Some("Clinic A")))
        .await
        .assert_status(StatusCode::CREATED);
    let refreshed = server.post(&format!("/outbreaks/{id}/refresh")).await;
    refreshed.assert_status_ok();
    let refreshed: Value = refreshed.json();
    assert_eq!(refreshed["total_cases"], 4);
    assert_eq!(refreshed["affected_case_ids"].as_array().unwrap().len(), 4);

    // 6. Status changes and manual actions land in the action log
    let confirmed = server
        .patch(&format!("/outbreaks/{id}/status"))
        .json(&json!({ "status": "confirmed", "performed_by": "admin" }))
        .await;
    confirmed.assert_status_ok();
    let confirmed: Value = confirmed.json();
    assert_eq!(confirmed["status"], "confirmed");

    let with_action = server
        .post(&format!("/outbreaks/{id}/actions"))
        .json(&json!({ "action": "Notified health department", "performed_by": "admin" }))
        .await;
    with_action.assert_status(StatusCode::CREATED);
    let with_action: Value = with_action.json();
    let actions = with_action["actions"].as_array().unwrap();
    assert_eq!(actions.len(), 3);
    assert_eq!(actions[1]["action"], "Status changed from detected to confirmed");
    assert_eq!(actions[2]["action"], "Notified health department");

    // 7. Illegal transitions conflict
    server
        .patch(&format!("/outbreaks/{id}/status"))
        .json(&json!({ "status": "resolved" }))
        .await
        .assert_status_ok();
    let conflict = server
        .patch(&format!("/outbreaks/{id}/status"))
        .json(&json!({ "status": "detected" }))
        .await;
    conflict.assert_status(StatusCode::CONFLICT);

    let active: Value = server.get("/outbreaks?active=true").await.json();
    assert!(active.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_surveillance_summary() {
    let server = create_test_server().await;

    for location in ["Clinic A", "Clinic A", "Clinic B"] {
        server
            .post("/analyses")
            .json(&gastro_submission(Some(location)))
            .await
            .assert_status(StatusCode::CREATED);
    }

    let response = server.get("/surveillance/summary").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["days"], 30);
    assert_eq!(body["total_cases"], 3);
    assert_eq!(body["medium_count"], 3);
    assert_eq!(body["by_disease"]["gastrointestinal"], 3);
    assert_eq!(body["top_locations"][0]["location"], "Clinic A");
    assert_eq!(body["top_locations"][0]["count"], 2);
    assert_eq!(body["active_outbreaks"], 0);

    server
        .get("/surveillance/summary?days=0")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}
