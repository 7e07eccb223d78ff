use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vigil_detection::{
    DetectionBackend, DetectionClientConfig, DetectionError, HttpDetectionClient, PollStatus,
    ResultHandle,
};
use vigil_models::{FrameSample, JobId, MediaUnit, StorageRef};

fn client(server: &MockServer) -> HttpDetectionClient {
    HttpDetectionClient::new(DetectionClientConfig {
        base_url: server.uri(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn media() -> MediaUnit {
    MediaUnit::new("cam-7", "Parking lot", StorageRef::new("cam-7/0001.mp4"))
}

fn frames(media: &MediaUnit, count: u32) -> Vec<FrameSample> {
    (0..count)
        .map(|i| FrameSample {
            media_id: media.id.clone(),
            sequence: i,
            offset: Duration::from_secs(i as u64),
            payload: vec![0xFF, 0xD8, 0xFF, 0xD9],
            width: 1280,
            height: 720,
        })
        .collect()
}

#[tokio::test]
async fn submit_posts_multipart_and_returns_job_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .and(header_regex("content-type", "^multipart/form-data"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({"job_id": "job-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let media = media();
    let job_id = client(&server)
        .submit(&media, &frames(&media, 3))
        .await
        .unwrap();
    assert_eq!(job_id, JobId::from_string("job-1"));

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"media\""));
    assert!(body.contains("name=\"frame-2\""));
    assert!(body.contains("filename=\"2000.jpg\""));
    assert!(body.contains(media.id.as_str()));
}

#[tokio::test]
async fn submit_classifies_throttling_and_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(422).set_body_string("unsupported codec"))
        .mount(&server)
        .await;

    let media = media();
    let client = client(&server);

    let err = client.submit(&media, &frames(&media, 1)).await.unwrap_err();
    assert!(matches!(err, DetectionError::Throttled(_)));
    assert!(err.is_retryable());

    let err = client.submit(&media, &frames(&media, 1)).await.unwrap_err();
    assert!(matches!(err, DetectionError::Rejected(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn submit_without_frames_is_rejected_locally() {
    let server = MockServer::start().await;
    let err = client(&server).submit(&media(), &[]).await.unwrap_err();
    assert!(matches!(err, DetectionError::Rejected(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn poll_maps_statuses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/running"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "in_progress"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs/done"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "succeeded", "result": "res-9"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs/broken"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "failed", "reason": "model crashed"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs/deleted"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client(&server);
    assert_eq!(
        client.poll(&JobId::from_string("running")).await.unwrap(),
        PollStatus::InProgress
    );
    assert_eq!(
        client.poll(&JobId::from_string("done")).await.unwrap(),
        PollStatus::Succeeded {
            result: ResultHandle::new("res-9")
        }
    );
    assert_eq!(
        client.poll(&JobId::from_string("broken")).await.unwrap(),
        PollStatus::Failed {
            reason: "model crashed".to_string()
        }
    );
    assert!(client
        .poll(&JobId::from_string("deleted"))
        .await
        .unwrap_err()
        .is_gone());
    assert!(client
        .poll(&JobId::from_string("flaky"))
        .await
        .unwrap_err()
        .is_retryable());
}

#[tokio::test]
async fn succeeded_without_result_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/odd"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "succeeded"})))
        .mount(&server)
        .await;

    let err = client(&server)
        .poll(&JobId::from_string("odd"))
        .await
        .unwrap_err();
    assert!(matches!(err, DetectionError::InvalidResponse(_)));
}

#[tokio::test]
async fn fetch_returns_raw_detections() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/results/res-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "detections": [
                {"label": "Person", "confidence": 95.0, "offset_ms": 3000},
                {"label": "car", "confidence": 0.42, "offset_ms": 8000}
            ]
        })))
        .mount(&server)
        .await;

    let detections = client(&server)
        .fetch(&ResultHandle::new("res-9"))
        .await
        .unwrap();
    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0].label, "Person");
    assert_eq!(detections[1].offset_ms, 8000);
}

#[tokio::test]
async fn backend_ids_stay_inside_their_path_segment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/tenant%2F7%3Fdebug=1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "in_progress"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/results/..%2Fjobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"detections": []})))
        .expect(1)
        .mount(&server)
        .await;
    let client = client(&server);

    let status = client
        .poll(&JobId::from_string("tenant/7?debug=1"))
        .await
        .unwrap();
    assert!(matches!(status, PollStatus::InProgress));

    let detections = client.fetch(&ResultHandle::new("../jobs")).await.unwrap();
    assert!(detections.is_empty());

    let err = client.poll(&JobId::from_string("..")).await.unwrap_err();
    assert!(matches!(err, DetectionError::InvalidResponse(_)));
}

#[tokio::test]
async fn health_check_reports_service_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;
    assert!(client(&server).health_check().await.unwrap());

    let down = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&down)
        .await;
    assert!(!client(&down).health_check().await.unwrap());
}
