use std::sync::Arc;
use std::time::Duration;

use harvester_core::{AuxFields, RecordCandidate};
use harvester_engine::{
    content_hash, ArtifactPipeline, ArtifactUploader, FetchAndUpload, FetchSettings,
    ReqwestFetcher, StorageClient, StorageError, StorageSettings, CONTENT_HASH_HEADER,
};
use pretty_assertions::assert_eq;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "bids/2025-12-01/GeM_011225_B_6950285.pdf";
const OBJECT_PATH: &str = "/storage/v1/object/gem-pdfs/bids/2025-12-01/GeM_011225_B_6950285.pdf";

fn settings(server: &MockServer) -> StorageSettings {
    StorageSettings {
        backoff_base: Duration::from_millis(1),
        default_retry_after: Duration::from_millis(1),
        politeness_delay: Duration::ZERO,
        ..StorageSettings::new(server.uri(), "gem-pdfs", "secret")
    }
}

fn uploader(settings: StorageSettings) -> ArtifactUploader {
    ArtifactUploader::new(Arc::new(StorageClient::new(settings).unwrap()))
}

async fn mount_absent_probe(server: &MockServer) {
    Mock::given(method("HEAD"))
        .and(path(OBJECT_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

#[tokio::test]
async fn identical_bytes_are_written_once() {
    let server = MockServer::start().await;
    let bytes = b"%PDF-1.7 bid document";
    let hash = content_hash(bytes);

    Mock::given(method("HEAD"))
        .and(path(OBJECT_PATH))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path(OBJECT_PATH))
        .respond_with(ResponseTemplate::new(200).insert_header(CONTENT_HASH_HEADER, hash.to_uppercase().as_str()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(OBJECT_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let uploader = uploader(settings(&server));
    let first = uploader.upload(bytes, KEY).await.unwrap();
    let second = uploader.upload(bytes, KEY).await.unwrap();

    assert!(first.uploaded);
    assert!(!second.uploaded);
    assert_eq!(first.content_hash, hash);
    assert_eq!(second.content_hash, hash);
}

#[tokio::test]
async fn upsert_carries_auth_and_content_hash_headers() {
    let server = MockServer::start().await;
    let bytes = b"%PDF";
    let hash = content_hash(bytes);
    mount_absent_probe(&server).await;
    Mock::given(method("POST"))
        .and(path(OBJECT_PATH))
        .and(header("apikey", "secret"))
        .and(header("authorization", "Bearer secret"))
        .and(header("x-upsert", "true"))
        .and(header("content-type", "application/pdf"))
        .and(header(CONTENT_HASH_HEADER, hash.as_str()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = uploader(settings(&server)).upload(bytes, KEY).await.unwrap();
    assert!(outcome.uploaded);
}

#[tokio::test]
async fn stale_hash_is_overwritten() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path(OBJECT_PATH))
        .respond_with(ResponseTemplate::new(200).insert_header(CONTENT_HASH_HEADER, "deadbeef"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(OBJECT_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = uploader(settings(&server)).upload(b"new", KEY).await.unwrap();
    assert!(outcome.uploaded);
}

#[tokio::test]
async fn rate_limits_do_not_spend_the_attempt_budget() {
    let server = MockServer::start().await;
    mount_absent_probe(&server).await;
    Mock::given(method("POST"))
        .and(path(OBJECT_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(OBJECT_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let settings = StorageSettings {
        max_attempts: 1,
        ..settings(&server)
    };
    let outcome = uploader(settings).upload(b"%PDF", KEY).await.unwrap();
    assert!(outcome.uploaded);
}

#[tokio::test]
async fn endless_rate_limiting_hits_the_ceiling() {
    let server = MockServer::start().await;
    mount_absent_probe(&server).await;
    Mock::given(method("POST"))
        .and(path(OBJECT_PATH))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let settings = StorageSettings {
        max_rate_limit_waits: 2,
        ..settings(&server)
    };
    let err = uploader(settings).upload(b"%PDF", KEY).await.unwrap_err();
    assert!(matches!(err, StorageError::RateLimited { waits: 2 }), "{err:?}");
}

#[tokio::test]
async fn server_errors_are_retried_until_success() {
    let server = MockServer::start().await;
    mount_absent_probe(&server).await;
    Mock::given(method("POST"))
        .and(path(OBJECT_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(OBJECT_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = uploader(settings(&server)).upload(b"%PDF", KEY).await.unwrap();
    assert!(outcome.uploaded);
}

#[tokio::test]
async fn server_errors_exhaust_the_attempt_budget() {
    let server = MockServer::start().await;
    mount_absent_probe(&server).await;
    Mock::given(method("POST"))
        .and(path(OBJECT_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let err = uploader(settings(&server)).upload(b"%PDF", KEY).await.unwrap_err();
    assert!(matches!(err, StorageError::Exhausted { attempts: 3, .. }), "{err:?}");
}

#[tokio::test]
async fn client_errors_fail_immediately() {
    let server = MockServer::start().await;
    mount_absent_probe(&server).await;
    Mock::given(method("POST"))
        .and(path(OBJECT_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .expect(1)
        .mount(&server)
        .await;

    let err = uploader(settings(&server)).upload(b"%PDF", KEY).await.unwrap_err();
    match err {
        StorageError::Status { status, body } => {
            assert_eq!(status, 403);
            assert_eq!(body, "forbidden");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn json_documents_skip_the_probe() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/storage/v1/object/gem-pdfs/daily_meta/gem_bids_2025-12-01_meta.json"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    uploader(settings(&server))
        .upload_json(b"{}", "daily_meta/gem_bids_2025-12-01_meta.json")
        .await
        .unwrap();
}

#[tokio::test]
async fn get_object_reads_back_or_reports_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(OBJECT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/storage/v1/object/gem-pdfs/bids/missing.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = StorageClient::new(settings(&server)).unwrap();
    assert_eq!(client.get_object(KEY).await.unwrap(), Some(b"%PDF".to_vec()));
    assert_eq!(client.get_object("bids/missing.pdf").await.unwrap(), None);
}

fn candidate(detail_url: String) -> RecordCandidate {
    RecordCandidate {
        page_number: 1,
        identifier: "GEM/2025/B/6950285".to_string(),
        detail_url,
        raw_text: "Start Date: 01-12-2025 11:29 AM".to_string(),
        start_datetime: None,
        end_datetime: None,
        aux: AuxFields::default(),
    }
}

#[tokio::test]
async fn pipeline_records_storage_details() {
    let server = MockServer::start().await;
    let bytes = b"%PDF-1.7".to_vec();
    Mock::given(method("GET"))
        .and(path("/showbidDocument/6950285"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(bytes.clone(), "application/pdf"))
        .mount(&server)
        .await;
    mount_absent_probe(&server).await;
    Mock::given(method("POST"))
        .and(path(OBJECT_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let pipeline = FetchAndUpload::new(
        Arc::new(ReqwestFetcher::new(FetchSettings::default()).unwrap()),
        uploader(settings(&server)),
    );
    let status = pipeline
        .store(&candidate(format!("{}/showbidDocument/6950285", server.uri())), KEY)
        .await;

    assert!(status.uploaded);
    assert_eq!(status.storage_path, KEY);
    assert_eq!(status.content_hash, Some(content_hash(&bytes)));
    assert_eq!(
        status.public_url,
        Some(format!(
            "{}/storage/v1/object/public/gem-pdfs/{KEY}",
            server.uri()
        ))
    );
}

#[tokio::test]
async fn pipeline_folds_download_failures_into_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let pipeline = FetchAndUpload::new(
        Arc::new(ReqwestFetcher::new(FetchSettings::default()).unwrap()),
        uploader(settings(&server)),
    );
    let status = pipeline
        .store(&candidate(format!("{}/showbidDocument/1", server.uri())), KEY)
        .await;

    assert!(!status.uploaded);
    assert_eq!(status.content_hash, None);
    assert_eq!(status.storage_path, KEY);
}
