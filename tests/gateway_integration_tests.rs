use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{TimeDelta, Utc};
use common::config::LifecycleConfig;
use gateway::{GatewayState, ObjectEntry, create_router};
use lifecycle::{
    LifecycleMetrics, LifecycleScheduler, ObjectStoreTierStore, StorageClass, TierStore,
    rules_from_config,
};
use object_store::memory::InMemory;
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "integration-boundary";

fn upload_request(filename: &str, content: &str) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"File\"; filename=\"{filename}\"\r\n\r\n{content}\r\n--{BOUNDARY}--\r\n"
    );
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn list(app: &axum::Router) -> Vec<ObjectEntry> {
    let request = Request::builder()
        .uri("/objects")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Files uploaded through the gateway are picked up by the lifecycle
/// engine and the listing reflects their new tier.
#[tokio::test]
async fn test_upload_then_tier() {
    let store: Arc<dyn TierStore> = Arc::new(ObjectStoreTierStore::new(Arc::new(InMemory::new())));
    let app = create_router(GatewayState::new(
        store.clone(),
        "uploads",
        Some("https://files.example.com".to_string()),
    ));

    let response = app
        .clone()
        .oneshot(upload_request("invoice.pdf", "%PDF-1.7"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let entries = list(&app).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].tier, StorageClass::Hot);
    assert!(entries[0].name.starts_with("invoice"));
    assert!(entries[0].name.ends_with(".pdf"));
    assert_eq!(
        entries[0].url.as_deref(),
        Some(format!("https://files.example.com/uploads/{}", entries[0].name).as_str())
    );

    let config = LifecycleConfig {
        container: "uploads".to_string(),
        ..Default::default()
    };
    let rules = rules_from_config(&config.rules).unwrap();
    let scheduler = LifecycleScheduler::from_config(store, rules, &config, LifecycleMetrics::new());
    let report = scheduler
        .run_cycle(Utc::now() + TimeDelta::days(31))
        .await
        .unwrap();
    assert_eq!(report.summary.applied, 1);

    let entries = list(&app).await;
    assert_eq!(entries[0].tier, StorageClass::Cool);

    let request = Request::builder()
        .uri(format!("/objects/{}", entries[0].name))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    assert_eq!(&body[..], b"%PDF-1.7");
}
