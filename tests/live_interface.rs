// Live interface client over real HTTP against httpmock

use httpmock::prelude::*;
use railsync::remote::{
    HttpClient, LiveInterfaceClient, PositionSource, RemoteDocumentSource, RemoteError,
    ReqwestHttpClient,
};
use railsync::retry::RetryPolicy;
use railsync::trainlocation::{HttpPublishSink, PublishSink};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn http() -> Arc<dyn HttpClient> {
    Arc::new(ReqwestHttpClient::new(Duration::from_secs(5)).unwrap())
}

fn client(server: &MockServer) -> LiveInterfaceClient {
    let retry = RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        multiplier: 2.0,
    };
    LiveInterfaceClient::new(format!("{}/", server.base_url()), http(), retry)
}

#[tokio::test]
async fn test_statuses_are_parsed() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/ruma/rti");
            then.status(200)
                .json_body(json!([{"id": 11, "version": 3}, {"id": 12, "version": null}, {"id": 13}]));
        })
        .await;

    let statuses = client(&server).statuses().await.unwrap();

    mock.assert_async().await;
    assert_eq!(statuses.len(), 3);
    assert_eq!(statuses[0].latest_version(), 3);
    assert_eq!(statuses[1].latest_version(), 0);
    assert_eq!(statuses[2].latest_version(), 0);
}

#[tokio::test]
async fn test_fetch_version_keeps_unknown_fields() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/ruma/rti/11/2");
            then.status(200).json_body(json!({
                "id": 11,
                "version": 2,
                "state": "ACTIVE",
                "organization": "Rail Works Oy",
                "workParts": [{"partIndex": 1}]
            }));
        })
        .await;

    let notification = client(&server).fetch_version(11, 2).await.unwrap();

    assert_eq!(notification.versioned_id().to_string(), "11@v2");
    assert_eq!(notification.content["state"], "ACTIVE");
    assert_eq!(notification.content["workParts"][0]["partIndex"], 1);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/ruma/rti/11/9");
            then.status(404);
        })
        .await;

    let err = client(&server).fetch_version(11, 9).await.unwrap_err();

    assert!(matches!(err, RemoteError::NotFound { .. }));
    assert_eq!(mock.hits_async().await, 1);
}

#[tokio::test]
async fn test_server_errors_are_retried_until_budget_is_spent() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/ruma/rti");
            then.status(503);
        })
        .await;

    let err = client(&server).statuses().await.unwrap_err();

    assert!(matches!(err, RemoteError::Status { status: 503, .. }));
    assert_eq!(mock.hits_async().await, 3);
}

#[tokio::test]
async fn test_mismatched_version_is_malformed() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/ruma/rti/11/2");
            then.status(200).json_body(json!({"id": 11, "version": 3}));
        })
        .await;

    let err = client(&server).fetch_version(11, 2).await.unwrap_err();
    assert!(matches!(err, RemoteError::Malformed { .. }));
}

#[tokio::test]
async fn test_invalid_json_is_malformed() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/kuplas");
            then.status(200).body("[{\"trainLocationId\":");
        })
        .await;

    let err = client(&server).fetch_locations().await.unwrap_err();
    assert!(matches!(err, RemoteError::Malformed { .. }));
    assert_eq!(mock.hits_async().await, 1);
}

#[tokio::test]
async fn test_train_locations_are_parsed() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/kuplas");
            then.status(200).json_body(json!([{
                "trainLocationId": {"trainNumber": 8431, "departureDate": "2024-09-02"},
                "timestamp": "2024-09-02T06:00:01Z",
                "location": {"x": 24.93745, "y": 60.1854},
                "liikeLocation": {"x": 24.9375, "y": 60.1855},
                "speed": 42,
                "accuracy": 5
            }]));
        })
        .await;

    let locations = client(&server).fetch_locations().await.unwrap();

    assert_eq!(locations.len(), 1);
    let location = &locations[0];
    assert_eq!(location.train_location_id.train_number, 8431);
    assert_eq!(location.location.lat, 60.1854);
    assert_eq!(location.location.lon, 24.93745);
    assert_eq!(location.speed, Some(42));
}

#[tokio::test]
async fn test_http_publish_sink_posts_topic_and_payload() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/publish")
                .header("content-type", "application/json")
                .json_body(json!({
                    "topic": "train-locations/2024-09-02/8431",
                    "payload": {"speed": 42}
                }));
            then.status(204);
        })
        .await;

    let sink = HttpPublishSink::new(server.url("/publish"), http());
    sink.publish("train-locations/2024-09-02/8431", br#"{"speed":42}"#)
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_http_publish_sink_reports_bridge_errors() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/publish");
            then.status(502);
        })
        .await;

    let sink = HttpPublishSink::new(server.url("/publish"), http());
    assert!(sink.publish("t", b"{}").await.is_err());
}
