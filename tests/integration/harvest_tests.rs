//! Integration tests for the harvester
//!
//! These tests use wiremock to stand in for the tender API and run the
//! full fetch → compress → checkpoint cycle end-to-end.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tender_harvest::config::{
    CompressionConfig, Config, CrawlConfig, RetryConfig, SourceConfig, StorageConfig,
};
use tender_harvest::crawler::{Codec, CrawlPhase, Harvester, XzCodec};
use tender_harvest::state::{CrawlState, Cursor, NextPointer};
use tender_harvest::storage::{CheckpointStore, JsonCheckpointStore, NEXT_FILE, RESUME_FILE};
use tender_harvest::HarvestError;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EPOCH: &str = "2015-01-01T00:00:00.000";

/// Creates a test configuration pointing at `base_url`
fn create_test_config(base_url: &str, data_dir: &Path) -> Config {
    Config {
        source: SourceConfig {
            base_url: base_url.to_string(),
            resource: "master_tender".to_string(),
            sub_path: String::new(),
            request_timeout_secs: 10,
        },
        storage: StorageConfig {
            data_dir: data_dir.to_path_buf(),
            staging_dir: PathBuf::from("import"),
        },
        retry: RetryConfig {
            max_attempts: 10,
            delay_ms: 20, // Very short for testing
        },
        compression: CompressionConfig { level: 6 },
        crawl: CrawlConfig {
            start_timestamp: EPOCH.to_string(),
        },
    }
}

fn page_path(timestamp: &str, page: u64) -> String {
    format!("/master_tender/timestamp/{}/page/{}", timestamp, page)
}

async fn mount_page(server: &MockServer, timestamp: &str, page: u64, body: &str) {
    Mock::given(method("GET"))
        .and(path(page_path(timestamp, page)))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> T {
    serde_json::from_str(&std::fs::read_to_string(path).expect("record missing"))
        .expect("record is not valid JSON")
}

/// Copies input through unchanged, failing for bodies containing `poison`
struct PoisonCodec {
    poison: &'static str,
}

impl Codec for PoisonCodec {
    fn suffix(&self) -> &str {
        ".xz"
    }

    fn compress(&self, input: &mut dyn Read, output: &mut dyn Write) -> io::Result<()> {
        let mut buf = Vec::new();
        input.read_to_end(&mut buf)?;
        if String::from_utf8_lossy(&buf).contains(self.poison) {
            return Err(io::Error::new(io::ErrorKind::Other, "forced failure"));
        }
        output.write_all(&buf)
    }
}

#[tokio::test]
async fn test_full_harvest_single_page() {
    let server = MockServer::start().await;
    let data = TempDir::new().unwrap();

    let body = r#"[
        {"id": "t1", "modified": "2015-01-02T00:00:00.000"},
        {"id": "t2", "modified": "2015-01-02T00:00:00.001"}
    ]"#;
    mount_page(&server, EPOCH, 0, body).await;
    mount_page(&server, "2015-01-02T00:00:00.001", 0, "[]").await;

    let config = create_test_config(&server.uri(), data.path());
    let mut harvester = Harvester::new(&config).expect("Failed to create harvester");
    let report = harvester.run().await.expect("Harvest failed");

    assert_eq!(report.phase, CrawlPhase::Done);
    assert_eq!(harvester.phase(), CrawlPhase::Done);
    assert_eq!(report.pages, 1);
    assert_eq!(report.final_cursor.timestamp, "2015-01-02T00:00:00.001");
    assert_eq!(
        report.files,
        vec!["master_tender_2015-01-01T00-00-00-000_0000.json.xz".to_string()]
    );
    assert!(report.errors.is_empty());

    // Compressed artifact holds the raw page; staging copy is gone
    let import = data.path().join("import");
    let compressed = std::fs::read(import.join(&report.files[0])).unwrap();
    let mut decoded = String::new();
    xz2::read::XzDecoder::new(compressed.as_slice())
        .read_to_string(&mut decoded)
        .unwrap();
    assert_eq!(decoded, body);
    assert!(!import
        .join("master_tender_2015-01-01T00-00-00-000_0000.json")
        .exists());

    // Checkpoint rotated
    assert!(!data.path().join(RESUME_FILE).exists());
    let permanent: CrawlState =
        read_json(&data.path().join("package_2015-01-01T00-00-00-000.json"));
    assert_eq!(permanent.cursor.timestamp, "2015-01-02T00:00:00.001");
    assert_eq!(permanent.files.len(), 1);
    assert!(permanent.errors.is_empty());
    assert_eq!(report.record, data.path().join("package_2015-01-01T00-00-00-000.json"));

    let next: NextPointer = read_json(&data.path().join(NEXT_FILE));
    assert_eq!(next.first.as_deref(), Some(EPOCH));
    assert_eq!(next.timestamp, "2015-01-02T00:00:00.001");
}

#[tokio::test]
async fn test_compression_failure_is_recorded_and_crawl_completes() {
    let server = MockServer::start().await;
    let data = TempDir::new().unwrap();

    mount_page(
        &server,
        EPOCH,
        0,
        r#"[{"id": "poison", "modified": "2015-02-01T00:00:00.000"}]"#,
    )
    .await;
    mount_page(
        &server,
        "2015-02-01T00:00:00.000",
        0,
        r#"[{"id": "fine", "modified": "2015-03-01T00:00:00.000"}]"#,
    )
    .await;
    mount_page(&server, "2015-03-01T00:00:00.000", 0, "[]").await;

    let config = create_test_config(&server.uri(), data.path());
    let store: Arc<dyn CheckpointStore> =
        Arc::new(JsonCheckpointStore::new(data.path(), EPOCH));
    let codec: Arc<dyn Codec> = Arc::new(PoisonCodec { poison: "poison" });
    let mut harvester = Harvester::with_collaborators(&config, store, codec).unwrap();

    let report = harvester.run().await.expect("Harvest failed");

    let failed = "master_tender_2015-01-01T00-00-00-000_0000.json".to_string();
    assert_eq!(report.phase, CrawlPhase::Done);
    assert_eq!(report.errors, vec![failed.clone()]);
    assert_eq!(
        report.files,
        vec!["master_tender_2015-02-01T00-00-00-000_0000.json.xz".to_string()]
    );
    assert!(!report.files.iter().any(|f| f.starts_with(&failed)));

    // Staging copy kept for manual recovery
    assert!(data.path().join("import").join(&failed).exists());

    let permanent: CrawlState =
        read_json(&data.path().join("package_2015-01-01T00-00-00-000.json"));
    assert_eq!(permanent.errors, vec![failed]);
}

#[tokio::test]
async fn test_persistent_server_error_fails_after_ten_attempts() {
    let server = MockServer::start().await;
    let data = TempDir::new().unwrap();

    // A previous run was interrupted here
    let prior = CrawlState {
        cursor: Cursor {
            timestamp: "2016-07-01T12:30:00.000".to_string(),
            page: 0,
        },
        files: vec!["master_tender_2015-01-01T00-00-00-000_0000.json.xz".to_string()],
        errors: vec![],
        first: Some(EPOCH.to_string()),
    };
    let store = JsonCheckpointStore::new(data.path(), EPOCH);
    store.save(&prior).unwrap();
    let before = std::fs::read(data.path().join(RESUME_FILE)).unwrap();

    Mock::given(method("GET"))
        .and(path(page_path("2016-07-01T12:30:00.000", 0)))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .expect(10)
        .mount(&server)
        .await;

    let mut config = create_test_config(&server.uri(), data.path());
    config.retry.delay_ms = 50;
    let mut harvester = Harvester::new(&config).unwrap();

    let started = Instant::now();
    let result = harvester.run().await;
    let elapsed = started.elapsed();

    match result {
        Err(HarvestError::RetriesExhausted {
            cursor,
            attempts,
            last_error,
        }) => {
            assert_eq!(cursor, prior.cursor);
            assert_eq!(attempts, 10);
            assert!(last_error.contains("500"));
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }
    assert_eq!(harvester.phase(), CrawlPhase::Failed);

    // Nine waits between ten attempts
    assert!(elapsed >= Duration::from_millis(9 * 50));

    // Prior checkpoint untouched and not rotated
    assert_eq!(std::fs::read(data.path().join(RESUME_FILE)).unwrap(), before);
    assert!(!data.path().join(NEXT_FILE).exists());

    server.verify().await;
}

#[tokio::test]
async fn test_transient_errors_are_retried_on_same_cursor() {
    let server = MockServer::start().await;
    let data = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(page_path(EPOCH, 0)))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;
    mount_page(
        &server,
        EPOCH,
        0,
        r#"[{"modified": "2015-05-05T05:05:05.5"}]"#,
    )
    .await;
    mount_page(&server, "2015-05-05T05:05:05.500", 0, "[]").await;

    let config = create_test_config(&server.uri(), data.path());
    let report = Harvester::new(&config).unwrap().run().await.unwrap();

    assert_eq!(report.pages, 1);
    assert_eq!(report.files.len(), 1);
    // Watermark normalized to millisecond precision
    assert_eq!(report.final_cursor.timestamp, "2015-05-05T05:05:05.500");
}

#[tokio::test]
async fn test_pages_through_a_crowded_timestamp() {
    let server = MockServer::start().await;
    let data = TempDir::new().unwrap();

    // Every record on page 0 sits at the cursor timestamp itself
    mount_page(
        &server,
        EPOCH,
        0,
        r#"[{"modified": "2015-01-01T00:00:00.000"}, {"modified": "2015-01-01T00:00:00"}]"#,
    )
    .await;
    mount_page(
        &server,
        EPOCH,
        1,
        r#"[{"modified": "2015-01-01T00:00:00.000"}, {"modified": "2015-01-09T00:00:00.000"}]"#,
    )
    .await;
    mount_page(&server, "2015-01-09T00:00:00.000", 0, "[]").await;

    let config = create_test_config(&server.uri(), data.path());
    let report = Harvester::new(&config).unwrap().run().await.unwrap();

    assert_eq!(report.pages, 2);
    let mut files = report.files.clone();
    files.sort();
    assert_eq!(
        files,
        vec![
            "master_tender_2015-01-01T00-00-00-000_0000.json.xz".to_string(),
            "master_tender_2015-01-01T00-00-00-000_0001.json.xz".to_string(),
        ]
    );
    assert_eq!(report.final_cursor, Cursor::at("2015-01-09T00:00:00.000"));
}

#[tokio::test]
async fn test_resumes_from_continue_package() {
    let server = MockServer::start().await;
    let data = TempDir::new().unwrap();

    let prior = CrawlState {
        cursor: Cursor {
            timestamp: "2016-07-01T12:30:00.000".to_string(),
            page: 2,
        },
        files: vec!["master_tender_2015-01-01T00-00-00-000_0000.json.xz".to_string()],
        errors: vec!["master_tender_2016-07-01T12-30-00-000_0001.json".to_string()],
        first: Some(EPOCH.to_string()),
    };
    JsonCheckpointStore::new(data.path(), EPOCH)
        .save(&prior)
        .unwrap();

    // Only the resumed cursor is mounted; any other request would 404
    mount_page(&server, "2016-07-01T12:30:00.000", 2, "[]").await;

    let config = create_test_config(&server.uri(), data.path());
    let report = Harvester::new(&config).unwrap().run().await.unwrap();

    assert_eq!(report.pages, 0);
    assert_eq!(report.files, prior.files);
    assert_eq!(report.errors, prior.errors);
    assert!(data
        .path()
        .join("package_2015-01-01T00-00-00-000.json")
        .exists());

    let next: NextPointer = read_json(&data.path().join(NEXT_FILE));
    assert_eq!(next.timestamp, "2016-07-01T12:30:00.000");
}

#[tokio::test]
async fn test_consecutive_runs_chain_through_next_package() {
    let server = MockServer::start().await;
    let data = TempDir::new().unwrap();

    mount_page(
        &server,
        EPOCH,
        0,
        r#"[{"modified": "2015-06-01T00:00:00.000"}]"#,
    )
    .await;
    mount_page(&server, "2015-06-01T00:00:00.000", 0, "[]").await;

    let config = create_test_config(&server.uri(), data.path());
    let first = Harvester::new(&config).unwrap().run().await.unwrap();
    assert_eq!(first.files.len(), 1);

    // Second run starts from the pointer, finds nothing new
    let second = Harvester::new(&config).unwrap().run().await.unwrap();
    assert_eq!(second.pages, 0);
    assert!(second.files.is_empty());
    assert_eq!(second.final_cursor, Cursor::at("2015-06-01T00:00:00.000"));
    assert!(data
        .path()
        .join("package_2015-06-01T00-00-00-000.json")
        .exists());

    let next: NextPointer = read_json(&data.path().join(NEXT_FILE));
    assert_eq!(next.first.as_deref(), Some("2015-06-01T00:00:00.000"));
}

#[tokio::test]
async fn test_sub_path_is_part_of_request() {
    let server = MockServer::start().await;
    let data = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(format!(
            "/master_tender/timestamp/{}/source/eu.digiwhist.worker.eu.master.TedTenderMaster/page/0",
            EPOCH
        )))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]\n"))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = create_test_config(&server.uri(), data.path());
    config.source.sub_path = "/source/eu.digiwhist.worker.eu.master.TedTenderMaster".to_string();

    let report = Harvester::new(&config).unwrap().run().await.unwrap();
    assert_eq!(report.phase, CrawlPhase::Done);
    assert_eq!(report.final_cursor, Cursor::at(EPOCH));
}

#[tokio::test]
async fn test_xz_codec_clamps_level() {
    // Level is clamped rather than rejected at this layer
    let codec = XzCodec::new(99);
    let mut out = Vec::new();
    codec.compress(&mut &b"[1]"[..], &mut out).unwrap();
    assert_eq!(codec.suffix(), ".xz");
    assert!(!out.is_empty());
}
