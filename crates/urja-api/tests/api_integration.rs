//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Networking API surface for external integrations."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use urja_api::{spawn_api_server, ApiServer, ApiState};
use urja_common::config::AppConfig;
use urja_metrics::{new_registry, PipelineMetrics};

async fn start(config: AppConfig) -> (ApiServer, String) {
    let registry = new_registry();
    let metrics = PipelineMetrics::new(registry.clone()).unwrap();
    let state = ApiState::from_config(&config).unwrap().with_metrics(metrics);
    let server = spawn_api_server(
        Arc::new(state),
        Some(registry),
        "127.0.0.1:0".parse().unwrap(),
    )
    .unwrap();
    let base = format!("http://{}", server.addr());
    (server, base)
}

fn seeded() -> AppConfig {
    let mut config = AppConfig::default();
    config.synthesis.random_seed = Some(2024);
    config
}

#[tokio::test]
async fn realtime_metrics_snapshot_and_health_check() {
    let (server, base) = start(seeded()).await;
    let client = Client::new();

    let snapshot: Value = client
        .get(format!("{base}/api/real-time-metrics"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(snapshot["success"], true);
    assert_eq!(snapshot["data"].as_array().unwrap().len(), 8);
    assert_eq!(snapshot["isConnected"], true);
    assert!(snapshot["metrics"]["totalConsumptionKwh"].as_f64().unwrap() > 0.0);

    let health: Value = client
        .post(format!("{base}/api/real-time-metrics"))
        .json(&json!({ "action": "health-check" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["services"]["store"], true);
    assert_eq!(health["services"]["dataGeneration"], true);
    assert_eq!(health["services"]["anomalyDetection"], true);

    let invalid = client
        .post(format!("{base}/api/real-time-metrics"))
        .json(&json!({ "action": "reboot" }))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    let body: Value = invalid.json().await.unwrap();
    assert_eq!(body["success"], false);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn series_envelope_defaults_to_a_day() {
    let (server, base) = start(seeded()).await;
    let client = Client::new();

    let body: Value = client
        .get(format!("{base}/api/real-time-data"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["range"], "24h");
    assert_eq!(body["dataSource"], "synthetic");
    assert_eq!(body["data"].as_array().unwrap().len(), 768);
    assert!(body["anomalies"].is_array());
    assert!(body["timestamp"].is_string());

    let hour: Value = client
        .get(format!("{base}/api/real-time-data?range=1h"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(hour["data"].as_array().unwrap().len(), 480);

    let unknown = client
        .get(format!("{base}/api/real-time-data?range=2w"))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn ingestion_feeds_live_queries() {
    let mut config = seeded();
    config.store.fallback_to_synthetic = false;
    let (server, base) = start(config).await;
    let client = Client::new();

    let empty: Value = client
        .get(format!("{base}/api/real-time-data?range=1h&source=live"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(empty["dataSource"], "live");
    assert!(empty["data"].as_array().unwrap().is_empty());

    let ingest = client
        .post(format!("{base}/api/real-time-data"))
        .json(&json!({
            "userId": "flat-12",
            "dataPoints": [
                { "deviceId": "dev_001", "consumptionKwh": 0.4, "costLocal": 2.6 },
                { "deviceId": "dev_002", "consumptionKwh": 1.1, "costLocal": 7.15 },
                { "deviceId": "", "consumptionKwh": 1.0 },
                { "deviceId": "dev_003", "consumptionKwh": -2.0 }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(ingest.status(), StatusCode::OK);
    let ack: Value = ingest.json().await.unwrap();
    assert_eq!(ack["accepted"], 2);
    assert_eq!(ack["rejected"], 2);
    assert_eq!(ack["message"], "Processed 2 data points");

    let live: Value = client
        .get(format!("{base}/api/real-time-data?range=1h&source=live&userId=flat-12"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(live["dataSource"], "live");
    assert_eq!(live["data"].as_array().unwrap().len(), 2);
    let total = live["metrics"]["totalConsumptionKwh"].as_f64().unwrap();
    assert!((total - 1.5).abs() < 1e-9);

    let stats: Value = client
        .get(format!("{base}/api/time-series/query?type=stats&userId=flat-12"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["data"]["activeDevices"], 2);

    let readings: Value = client
        .get(format!(
            "{base}/api/time-series/query?timeRange=1h&granularity=1h&userId=flat-12"
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(readings["metadata"]["granularity"], "1h");
    assert_eq!(readings["metadata"]["dataPoints"], 2);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn rejects_batches_without_valid_points_and_unknown_types() {
    let (server, base) = start(seeded()).await;
    let client = Client::new();

    let rejected = client
        .post(format!("{base}/api/real-time-data"))
        .json(&json!({ "dataPoints": [{ "deviceId": "dev_001", "consumptionKwh": -1.0 }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
    let body: Value = rejected.json().await.unwrap();
    assert_eq!(body["error"], "No valid data points provided");

    let malformed = client
        .post(format!("{base}/api/real-time-data"))
        .json(&json!({ "points": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

    let unknown = client
        .get(format!("{base}/api/time-series/query?type=weather"))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

    let bad_granularity = client
        .get(format!("{base}/api/time-series/query?granularity=5x"))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_granularity.status(), StatusCode::BAD_REQUEST);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn expired_points_are_reported_as_rejected() {
    let (server, base) = start(seeded()).await;
    let client = Client::new();

    let stale_only = client
        .post(format!("{base}/api/real-time-data"))
        .json(&json!({
            "dataPoints": [
                { "timestamp": "2020-01-01T00:00:00Z", "deviceId": "dev_001", "consumptionKwh": 0.5 }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(stale_only.status(), StatusCode::BAD_REQUEST);
    let body: Value = stale_only.json().await.unwrap();
    assert_eq!(body["success"], false);

    let mixed: Value = client
        .post(format!("{base}/api/real-time-data"))
        .json(&json!({
            "dataPoints": [
                { "timestamp": "2020-01-01T00:00:00Z", "deviceId": "dev_001", "consumptionKwh": 0.5 },
                { "deviceId": "dev_002", "consumptionKwh": 0.7 }
            ]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(mixed["accepted"], 1);
    assert_eq!(mixed["rejected"], 1);
    assert_eq!(mixed["message"], "Processed 1 data points");

    let stats: Value = client
        .get(format!("{base}/api/time-series/query?type=stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["data"]["activeDevices"], 1);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn readings_ingest_is_all_or_nothing() {
    let (server, base) = start(seeded()).await;
    let client = Client::new();

    let empty = client
        .post(format!("{base}/api/time-series/ingest"))
        .json(&json!({ "readings": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    let body: Value = empty.json().await.unwrap();
    assert_eq!(body["error"], "Readings array is required and cannot be empty");

    let invalid = client
        .post(format!("{base}/api/time-series/ingest"))
        .json(&json!({
            "userId": "flat-7",
            "readings": [
                { "consumption": 0.4, "power": 400.0, "cost": 2.6, "deviceId": "dev_001" },
                { "consumption": 0.3, "power": 300.0, "cost": -1.0, "deviceId": "dev_002" }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    let body: Value = invalid.json().await.unwrap();
    assert_eq!(body["error"], "Invalid cost value");

    let stats: Value = client
        .get(format!("{base}/api/time-series/query?type=stats&userId=flat-7"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["data"]["activeDevices"], 0);

    let ingested: Value = client
        .post(format!("{base}/api/time-series/ingest"))
        .json(&json!({
            "userId": "flat-7",
            "source": "smart-meter",
            "readings": [
                { "consumption": 0.4, "power": 400.0, "cost": 2.6, "deviceId": "dev_001", "location": "Kitchen" },
                { "consumption": 0.3, "power": 300.0, "cost": 1.95 }
            ]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ingested["success"], true);
    assert_eq!(ingested["count"], 2);
    assert_eq!(ingested["message"], "Successfully ingested 2 readings");
    assert!(ingested["timestamp"].is_string());

    let devices: Value = client
        .get(format!(
            "{base}/api/time-series/query?type=devices&timeRange=1h&userId=flat-7"
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(devices["metadata"]["deviceId"], "all");
    assert_eq!(devices["metadata"]["deviceCount"], 2);

    let one_device: Value = client
        .get(format!(
            "{base}/api/time-series/query?type=devices&timeRange=1h&deviceId=dev_001&userId=flat-7"
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(one_device["success"], true);
    assert_eq!(one_device["metadata"]["deviceId"], "dev_001");
    assert_eq!(one_device["metadata"]["deviceCount"], 1);
    assert_eq!(one_device["data"][0]["deviceId"], "dev_001");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn seeding_fills_the_store_with_synthetic_hours() {
    let mut config = seeded();
    config.store.fallback_to_synthetic = false;
    let (server, base) = start(config).await;
    let client = Client::new();

    let ack: Value = client
        .put(format!("{base}/api/time-series/ingest"))
        .json(&json!({ "batchSize": 2, "userId": "demo" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ack["success"], true);
    assert_eq!(ack["batchSize"], 2);
    assert_eq!(ack["deviceCount"], 8);
    assert_eq!(ack["count"], 2 * 60 * 8);
    assert_eq!(
        ack["message"],
        "Generated 2 batches of mock data with 8 devices each"
    );

    let live: Value = client
        .get(format!("{base}/api/real-time-data?range=24h&source=live&userId=demo"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(live["dataSource"], "live");
    assert!(!live["data"].as_array().unwrap().is_empty());

    let no_batches = client
        .put(format!("{base}/api/time-series/ingest"))
        .json(&json!({ "batchSize": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(no_batches.status(), StatusCode::BAD_REQUEST);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn metrics_endpoint_exposes_pipeline_counters() {
    let (server, base) = start(seeded()).await;
    let client = Client::new();

    client
        .get(format!("{base}/api/real-time-data?range=6h"))
        .send()
        .await
        .unwrap();
    let text = client
        .get(format!("{base}/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.contains("urja_samples_synthesized_total 576"));
    assert!(text.contains("urja_series_responses_total{data_source=\"synthetic\"} 1"));

    let head = client
        .head(format!("{base}/api/time-series/query"))
        .send()
        .await
        .unwrap();
    assert_eq!(head.status(), StatusCode::OK);
    assert_eq!(head.headers()["x-status"], "healthy");

    server.shutdown().await.unwrap();
}
