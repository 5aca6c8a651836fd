use std::collections::HashMap;

use axum::{extract::Query, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::NaiveDate;
use geowx_core::{value_at, Coordinate, SeriesRequest, WeatherProvider};
use geowx_provider::{OpenMeteoProvider, ProviderError};
use tokio::net::TcpListener;

async fn archive(Query(q): Query<HashMap<String, String>>) -> impl IntoResponse {
    if q.get("timezone").map(String::as_str) != Some("auto") {
        return (StatusCode::BAD_REQUEST, "timezone must be auto").into_response();
    }
    let field = q.get("daily").cloned().unwrap_or_default();
    let latitude: f64 = q
        .get("latitude")
        .and_then(|v| v.parse().ok())
        .unwrap_or(f64::NAN);
    let body = serde_json::json!({
        "latitude": latitude,
        "daily": {
            "time": [q["start_date"], q["end_date"]],
            field: [latitude, null],
        }
    });
    (StatusCode::OK, Json(body)).into_response()
}

async fn spawn_archive() -> String {
    let router = Router::new()
        .route("/v1/archive", get(archive))
        .route(
            "/broken",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded") }),
        )
        .route("/garbage", get(|| async { "<html>not json</html>" }))
        .route(
            "/no-daily",
            get(|| async { Json(serde_json::json!({"latitude": 1.0})) }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn request(endpoint: Option<String>) -> SeriesRequest {
    SeriesRequest {
        location: Coordinate::new(48.25, 11.5),
        start: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
        fields: vec!["temperature_2m_mean".into()],
        endpoint,
    }
}

#[tokio::test]
async fn fetches_and_decodes_daily_series() {
    let base = spawn_archive().await;
    let provider = OpenMeteoProvider::new(&format!("{}/v1/archive", base)).unwrap();

    let series = provider.daily_series(&request(None)).await.unwrap();

    assert_eq!(series.time, ["2024-05-01", "2024-05-02"]);
    assert_eq!(value_at(&series, "2024-05-01", "temperature_2m_mean"), 48.25);
    assert!(value_at(&series, "2024-05-02", "temperature_2m_mean").is_nan());
}

#[tokio::test]
async fn data_source_endpoint_takes_precedence() {
    let base = spawn_archive().await;
    let provider = OpenMeteoProvider::new(&format!("{}/broken", base)).unwrap();

    let series = provider
        .fetch(&request(Some(format!("{}/v1/archive", base))))
        .await
        .unwrap();
    assert_eq!(series.time.len(), 2);
}

#[tokio::test]
async fn non_success_status_is_an_error() {
    let base = spawn_archive().await;
    let provider = OpenMeteoProvider::new(&format!("{}/broken", base)).unwrap();

    let err = provider.fetch(&request(None)).await.unwrap_err();
    match &err {
        ProviderError::Status { status, body } => {
            assert_eq!(*status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body, "upstream exploded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err
        .to_string()
        .starts_with("failed to fetch polygon weather data"));
}

#[tokio::test]
async fn malformed_bodies_are_errors() {
    let base = spawn_archive().await;

    for path in ["garbage", "no-daily"] {
        let provider = OpenMeteoProvider::new(&format!("{}/{}", base, path)).unwrap();
        let err = provider.fetch(&request(None)).await.unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)), "{path}: {err:?}");
    }
}

#[tokio::test]
async fn unreachable_provider_is_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let provider = OpenMeteoProvider::new(&format!("http://{}/v1/archive", addr)).unwrap();
    let err = provider.daily_series(&request(None)).await.unwrap_err();
    assert!(err.to_string().contains("failed to fetch polygon weather data"));
}
