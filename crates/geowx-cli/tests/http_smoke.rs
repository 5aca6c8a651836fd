use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use geowx_refresh::{RefreshReport, RefreshScheduler};
use geowx_store::MapStore;
use tower::ServiceExt;

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_ready_metrics_endpoints() {
    let (app, state) = geowx_cli::build_app(Arc::new(MapStore::default()), None).unwrap();

    // /healthz returns 200 and increments a counter
    let res = app.clone().oneshot(get("/healthz")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // /readyz initially 503
    let res = app.clone().oneshot(get("/readyz")).await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    geowx_cli::set_ready(&state, true);

    let res = app.clone().oneshot(get("/readyz")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    geowx_cli::record_refresh(
        &state,
        &RefreshReport {
            updated: 2,
            failed: 1,
            ..RefreshReport::default()
        },
    );

    // /metrics returns prometheus text and contains our counters
    let res = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let ct = res.headers().get("content-type").unwrap().to_str().unwrap();
    assert!(ct.starts_with("text/plain"));
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("geowx_requests_total"));
    assert!(text.contains("geowx_refresh_passes_total"));
    assert!(text.contains("outcome=\"failed\""));
}

#[tokio::test]
async fn manual_refresh_needs_scheduler() {
    let store = Arc::new(MapStore::default());
    let (app, _) = geowx_cli::build_app(Arc::clone(&store), None).unwrap();

    let post = || {
        Request::builder()
            .method("POST")
            .uri("/api/v1/refresh")
            .body(Body::empty())
            .unwrap()
    };

    let res = app.oneshot(post()).await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    let (handle, _task) =
        RefreshScheduler::new(Duration::from_millis(10)).spawn(|| async {});
    let (app, _) = geowx_cli::build_app(store, Some(handle)).unwrap();
    let res = app.oneshot(post()).await.unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn status_reports_counts() {
    let (app, _) = geowx_cli::build_app(Arc::new(MapStore::default()), None).unwrap();

    let res = app.oneshot(get("/api/v1/status")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let status: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(status["loading"], false);
    assert_eq!(status["polygons"], 0);
    assert_eq!(status["dataSources"], 1);
}
