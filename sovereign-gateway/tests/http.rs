//! End-to-end tests against a gateway bound to an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use sovereign_agent::{DecisionPipeline, MockBackend, PipelineConfig, RetryPolicy, NODE_ID};
use sovereign_gateway::{serve, AccessPolicy, AppState};
use sovereign_ledger::{LedgerStore, MemoryKv};

const OK_ORIGIN: &str = "https://console.example";

fn decision() -> String {
    json!({
        "mission_id": "M",
        "objective": "x",
        "phase_cursor": "PHASE_1_FEASIBILITY",
        "planner": {
            "resource_request": {"power_mw": 20, "land_sqft": 1000, "water_gpd": 100},
            "staffing_request": {"hires_local": 10, "hires_golden_visas": 2, "hires_global": 1, "time_to_staff_months": 3}
        },
        "guard": {"verdict": "APPROVED", "reasons": ["ok"], "risk_flags": []}
    })
    .to_string()
}

fn packet(mission_id: &str) -> Value {
    json!({
        "mission_id": mission_id,
        "objective": "Localize advanced packaging",
        "status": "ACTIVE",
        "phases": {
            "PHASE_1_FEASIBILITY": {"focus": "imports", "action": "map HS codes", "result": "leakage baseline"}
        }
    })
}

async fn start(backend: MockBackend, access: AccessPolicy) -> String {
    let config = PipelineConfig {
        retry: RetryPolicy {
            attempts: 1,
            backoff_step_ms: 0,
            timeout_ms: 5_000,
        },
        ..Default::default()
    };
    let store = LedgerStore::new(Arc::new(MemoryKv::new()));
    let pipeline = DecisionPipeline::new(Arc::new(backend), store, config);
    let state = Arc::new(AppState::new(pipeline, access));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, state));
    format!("http://{}", addr)
}

async fn open_gateway(backend: MockBackend) -> String {
    start(backend, AccessPolicy::default()).await
}

#[tokio::test]
async fn test_health_answers_any_method() {
    let base = open_gateway(MockBackend::default()).await;
    let client = reqwest::Client::new();

    for request in [
        client.get(format!("{}/omega/health", base)),
        client.post(format!("{}/omega/health", base)),
    ] {
        let response = request.send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(
            response.headers()["content-type"],
            "application/json; charset=utf-8"
        );
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({"ok": true, "node": NODE_ID, "model": "mock-model"}));
    }
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let base = open_gateway(MockBackend::default()).await;
    let response = reqwest::get(format!("{}/omega/nothing", base)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().contains_key("access-control-allow-origin"));
    assert_eq!(response.text().await.unwrap(), "Not Found");

    // wrong method on a known path
    let response = reqwest::get(format!("{}/omega/chat", base)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_origin_allowlist() {
    let base = start(
        MockBackend::default(),
        AccessPolicy::new(vec![OK_ORIGIN.to_string()], None),
    )
    .await;
    let client = reqwest::Client::new();
    let url = format!("{}/omega/health", base);

    let response = client
        .get(&url)
        .header("Origin", "https://evil.example")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(!response.headers().contains_key("access-control-allow-origin"));
    assert_eq!(response.text().await.unwrap(), "Forbidden origin");

    let response = client.get(&url).header("Origin", OK_ORIGIN).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], OK_ORIGIN);

    // no Origin header: CLI callers pass
    let response = client.get(&url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn test_preflight_echoes_origin() {
    let base = start(
        MockBackend::default(),
        AccessPolicy::new(vec![OK_ORIGIN.to_string()], Some("s3cret".to_string())),
    )
    .await;
    let client = reqwest::Client::new();

    let response = client
        .request(reqwest::Method::OPTIONS, format!("{}/omega/chat", base))
        .header("Origin", "https://other.example")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "https://other.example");
    assert_eq!(headers["access-control-allow-methods"], "POST,OPTIONS,GET");
    assert_eq!(headers["access-control-allow-headers"], "Content-Type,X-OMEGA-CODE");
    assert_eq!(headers["access-control-max-age"], "86400");

    let response = client
        .request(reqwest::Method::OPTIONS, format!("{}/omega/chat", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn test_access_code_gate() {
    let base = start(
        MockBackend::default(),
        AccessPolicy::new(vec![], Some("s3cret".to_string())),
    )
    .await;
    let client = reqwest::Client::new();
    let url = format!("{}/omega/health", base);

    let response = client.get(&url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(response.text().await.unwrap(), "Unauthorized");

    let response = client
        .get(&url)
        .header("X-OMEGA-CODE", "wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .get(&url)
        .header("X-OMEGA-CODE", "s3cret")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_chat_rejects_bad_bodies() {
    let base = open_gateway(MockBackend::default()).await;
    let client = reqwest::Client::new();
    let url = format!("{}/omega/chat", base);

    for body in ["{not json", "{}", "{\"messages\": \"hello\"}"] {
        let response = client.post(&url).body(body).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {}", body);
        assert!(response.headers().contains_key("access-control-allow-origin"));
        assert_eq!(response.text().await.unwrap(), "Bad Request");
    }
}

#[tokio::test]
async fn test_chat_decision_is_enforced_and_audited() {
    let base = open_gateway(MockBackend::default().with_response(decision())).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/omega/chat", base))
        .json(&json!({"messages": [{"role": "user", "content": "fund the pilot line"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["node"], NODE_ID);
    assert!(body.get("error").is_none());
    assert_eq!(body["json"]["guard"]["verdict"], "APPROVED");
    assert_eq!(body["json"]["mission_id"], "UAE-SOV-IND-2026-ALPHA");
    assert_eq!(body["json"]["state_update"]["power_mw_remaining"], 660.0);
    let text: Value = serde_json::from_str(body["text"].as_str().unwrap()).unwrap();
    assert_eq!(text, body["json"]);

    let trail: Value = client
        .get(format!("{}/omega/audit", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(trail["isValid"], true);
    assert_eq!(trail["brokenAt"], Value::Null);
    let stages: Vec<&str> = trail["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["stage"].as_str().unwrap())
        .collect();
    assert_eq!(stages, vec!["INGEST", "PLAN", "GUARD_CHECK", "PUBLISH"]);

    // other jurisdictions have their own empty chain
    let trail: Value = client
        .get(format!("{}/omega/audit?country=Oman", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(trail["events"], json!([]));
    assert_eq!(trail["isValid"], true);
}

#[tokio::test]
async fn test_mission_set_and_get() {
    let base = open_gateway(MockBackend::default()).await;
    let client = reqwest::Client::new();
    let url = format!("{}/omega/mission", base);

    let response = client
        .post(&url)
        .json(&json!({"packet": {"mission_id": "M-1"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"ok": false, "error": "Invalid mission packet"}));

    let response = client
        .post(&url)
        .json(&json!({"country": "Oman", "packet": packet("OM-1")}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"ok": true, "active_mission_id": "OM-1"}));

    // a bare packet body is accepted too; set_active false keeps the pointer
    let mut bare = packet("OM-2");
    bare["set_active"] = json!(false);
    bare["country"] = json!("Oman");
    let body: Value = client
        .post(&url)
        .json(&bare)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"ok": true, "active_mission_id": null}));

    let view: Value = client
        .get(format!("{}?country=Oman", url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view["active_mission_id"], "OM-1");
    assert_eq!(view["packet"]["objective"], "Localize advanced packaging");
    assert_eq!(
        view["packet"]["phases"]["PHASE_1_FEASIBILITY"]["action"],
        "map HS codes"
    );

    let view: Value = client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(view, json!({"active_mission_id": null, "packet": null}));
}

#[tokio::test]
async fn test_dataset_falls_back_on_garbage() {
    let base = open_gateway(MockBackend::default()).await;
    let client = reqwest::Client::new();

    // unreadable body means defaults; the mock answers prose
    let response = client
        .post(format!("{}/omega/dataset", base))
        .body("definitely not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["note"], "fallback");
    assert_eq!(body["rows"].as_array().unwrap().len(), 12);
}
