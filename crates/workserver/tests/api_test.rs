use actix_web::{http::StatusCode, test, web, App};
use serde_json::json;
use workruntime::RuntimeConfig;
use workserver::{build_runtime, configure, AppState};

macro_rules! app {
    () => {{
        let runtime = build_runtime(RuntimeConfig::default()).await.unwrap();
        test::init_service(
            App::new()
                .app_data(web::Data::new(AppState { runtime }))
                .configure(configure),
        )
        .await
    }};
}

fn traffic_body(driver_id: &str, speed: f64) -> serde_json::Value {
    json!({
        "driverId": driver_id,
        "violation": {
            "type": "speed",
            "speedLimit": 100,
            "actualSpeed": speed
        }
    })
}

#[actix_web::test]
async fn health_reports_healthy() {
    let app = app!();
    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "healthy");
}

#[actix_web::test]
async fn traffic_process_over_http() {
    let app = app!();

    let cases = [
        ("12345", 120.0, json!("No"), true),
        ("12345", 140.0, json!("Yes"), true),
        ("1234", 140.0, json!(null), false),
    ];

    for (driver_id, speed, suspended, valid_license) in cases {
        let req = test::TestRequest::post()
            .uri("/traffic_wih")
            .set_json(traffic_body(driver_id, speed))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["id"].is_string());
        assert_eq!(body["driver"]["validLicense"], json!(valid_license));
        // Null response means no decision
        let decided = &body["trafficViolationResponse"]["Suspended"];
        assert_eq!(decided, &suspended, "driver {} at {}", driver_id, speed);
    }
}

#[actix_web::test]
async fn hello_process_completes_and_fails() {
    let app = app!();

    let req = test::TestRequest::post()
        .uri("/hello")
        .set_json(json!({ "name": "world" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["greeting"], "Hello world");

    let req = test::TestRequest::post()
        .uri("/hello")
        .set_json(json!({ "name": "trigger error" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "error_handling");
}

#[actix_web::test]
async fn aborted_process_is_a_conflict() {
    let app = app!();
    let req = test::TestRequest::post()
        .uri("/traffic_wih")
        .set_json(traffic_body("999", 140.0))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[actix_web::test]
async fn unknown_process_is_not_found() {
    let app = app!();
    let req = test::TestRequest::post()
        .uri("/nope")
        .set_json(json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn listings() {
    let app = app!();

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/handlers").to_request()).await;
    let handlers: Vec<serde_json::Value> = test::read_body_json(resp).await;
    let types: Vec<_> = handlers.iter().filter_map(|h| h["type"].as_str()).collect();
    assert!(types.contains(&"custom-task"));
    assert!(types.contains(&"traffic.violation-decision"));

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/processes").to_request()).await;
    let processes: Vec<serde_json::Value> = test::read_body_json(resp).await;
    let ids: Vec<_> = processes.iter().filter_map(|p| p["id"].as_str()).collect();
    assert_eq!(ids, vec!["hello", "hello_boundary", "traffic_wih"]);
}

#[actix_web::test]
async fn aborting_unknown_work_item_is_not_found() {
    let app = app!();
    let req = test::TestRequest::post()
        .uri(&format!("/api/work-items/{}/abort", uuid::Uuid::new_v4()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
