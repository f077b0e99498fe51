//! Integration tests for the harvester
//!
//! These tests use wiremock to stand in for the EDGAR archive and drive
//! resolution, download, ledger and resume end-to-end.

use edgar_harvest::config::{
    Config, EdgarConfig, HarvestConfig, HashAlgorithm, OutputConfig, UserAgentConfig,
};
use edgar_harvest::harvester::FetchErrorKind;
use edgar_harvest::ledger::load_pending;
use edgar_harvest::resolver::{resolve_listing, resolve_quarters, ResolveError};
use edgar_harvest::{Orchestrator, ResourceId};
use std::io::{Cursor, Write};
use std::path::Path;
use std::time::{Duration, Instant};
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CIK_LISTING: &str = "/Archives/edgar/data/320193/";

const FILINGS: [&str; 3] = [
    "edgar/data/320193/0000320193-20-000010.txt",
    "edgar/data/320193/0000320193-20-000052.txt",
    "edgar/data/320193/0000320193-20-000096.txt",
];

/// Creates a test configuration pointing at the mock archive
fn create_test_config(server_uri: &str, dir: &Path) -> Config {
    Config {
        harvest: HarvestConfig {
            max_concurrency: 2,
            request_delay_ms: 0,
            timeout_secs: 5,
            max_attempts: 2,
            backoff_base_ms: 10, // Very short for testing
            hash_algorithm: HashAlgorithm::Sha256,
        },
        user_agent: UserAgentConfig {
            name: "TestHarvester".to_string(),
            contact_email: "test@example.com".to_string(),
            backup: None,
        },
        output: OutputConfig {
            download_dir: dir.join("filings").display().to_string(),
            ledger_path: dir.join("ledger.csv").display().to_string(),
            pending_path: dir.join("pending.txt").display().to_string(),
        },
        edgar: EdgarConfig {
            archive_base_url: format!("{}/Archives/", server_uri),
            index_header_lines: 11,
            forms: vec![],
        },
    }
}

fn ids(paths: &[&str]) -> Vec<ResourceId> {
    paths.iter().map(|p| ResourceId::new(*p).unwrap()).collect()
}

fn body_for(id: &str) -> String {
    format!("<SEC-DOCUMENT>{}</SEC-DOCUMENT>", id)
}

/// Mounts one filing body, expecting exactly `times` requests
async fn mount_filing(server: &MockServer, id: &str, times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/Archives/{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_string(body_for(id)))
        .expect(times)
        .mount(server)
        .await;
}

/// Mounts the filer directory listing with three accession folders
async fn mount_listing(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(CIK_LISTING))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(
                    r#"<html><body><table>
                    <tr><td><a href="/Archives/edgar/data/">Parent Directory</a></td></tr>
                    <tr><td><a href="/Archives/edgar/data/320193/000032019320000010">000032019320000010</a></td></tr>
                    <tr><td><a href="/Archives/edgar/data/320193/000032019320000052">000032019320000052</a></td></tr>
                    <tr><td><a href="/Archives/edgar/data/320193/000032019320000096">000032019320000096</a></td></tr>
                    <tr><td><a href="/Archives/edgar/data/320193/index.json">index.json</a></td></tr>
                    </table></body></html>"#,
                )
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

fn ledger_lines(dir: &Path) -> usize {
    std::fs::read_to_string(dir.join("ledger.csv"))
        .unwrap()
        .lines()
        .count()
}

#[tokio::test]
async fn test_listing_clean_run() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_listing(&mock_server).await;
    for id in FILINGS {
        mount_filing(&mock_server, id, 1).await;
    }

    let config = create_test_config(&mock_server.uri(), dir.path());
    let mut orchestrator = Orchestrator::from_config(&config).unwrap();

    let listing_url = Url::parse(&format!("{}{}", mock_server.uri(), CIK_LISTING)).unwrap();
    let resolution = resolve_listing(orchestrator.fetcher(), &listing_url, orchestrator.archive_base())
        .await
        .unwrap();
    assert_eq!(resolution.children, ids(&FILINGS));

    let summary = orchestrator.run(resolution.children).await.unwrap();

    assert_eq!(
        (summary.attempted, summary.succeeded, summary.skipped, summary.failed),
        (3, 3, 0, 0)
    );
    assert_eq!(ledger_lines(dir.path()), 3);

    let stored = std::fs::read_to_string(
        dir.path()
            .join("filings/320193/0000320193-20-000052.txt"),
    )
    .unwrap();
    assert_eq!(stored, body_for(FILINGS[1]));
}

#[tokio::test]
async fn test_partial_failure_is_reported() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_filing(&mock_server, FILINGS[0], 1).await;
    mount_filing(&mock_server, FILINGS[2], 1).await;
    Mock::given(method("GET"))
        .and(path(format!("/Archives/{}", FILINGS[1])))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), dir.path());
    let mut orchestrator = Orchestrator::from_config(&config).unwrap();
    let summary = orchestrator.run(ids(&FILINGS)).await.unwrap();

    assert_eq!(
        (summary.attempted, summary.succeeded, summary.skipped, summary.failed),
        (3, 2, 0, 1)
    );
    assert_eq!(summary.failed_ids(), ids(&[FILINGS[1]]));
    assert_eq!(summary.failures[0].kind, FetchErrorKind::HttpStatus(404));
    assert_eq!(summary.failures[0].attempts, 2);

    assert_eq!(ledger_lines(dir.path()), 2);
    assert_eq!(
        load_pending(&dir.path().join("pending.txt")).unwrap(),
        ids(&[FILINGS[1]])
    );
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    for id in FILINGS {
        mount_filing(&mock_server, id, 1).await;
    }

    let config = create_test_config(&mock_server.uri(), dir.path());

    let mut first = Orchestrator::from_config(&config).unwrap();
    first.run(ids(&FILINGS)).await.unwrap();
    let ledger_before = std::fs::read(dir.path().join("ledger.csv")).unwrap();

    let mut second = Orchestrator::from_config(&config).unwrap();
    let summary = second.run(ids(&FILINGS)).await.unwrap();

    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.attempted, 0);
    assert_eq!(
        std::fs::read(dir.path().join("ledger.csv")).unwrap(),
        ledger_before
    );
    // Mock expectations (one request per filing) are verified on drop
}

#[tokio::test]
async fn test_resume_fetches_only_what_remains() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_filing(&mock_server, FILINGS[0], 1).await;
    mount_filing(&mock_server, FILINGS[1], 1).await;

    // Unavailable for the whole first run, then served
    Mock::given(method("GET"))
        .and(path(format!("/Archives/{}", FILINGS[2])))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;
    mount_filing(&mock_server, FILINGS[2], 1).await;

    let config = create_test_config(&mock_server.uri(), dir.path());

    let mut first = Orchestrator::from_config(&config).unwrap();
    let summary = first.run(ids(&FILINGS)).await.unwrap();
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed_ids(), ids(&[FILINGS[2]]));

    let mut second = Orchestrator::from_config(&config).unwrap();
    let summary = second.resume().await.unwrap();

    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.succeeded, 1);
    assert!(summary.is_complete());
    assert_eq!(ledger_lines(dir.path()), 3);
    assert!(load_pending(&dir.path().join("pending.txt"))
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_corrupted_file_is_fetched_again() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_filing(&mock_server, FILINGS[0], 2).await;
    mount_filing(&mock_server, FILINGS[1], 1).await;
    mount_filing(&mock_server, FILINGS[2], 1).await;

    let config = create_test_config(&mock_server.uri(), dir.path());

    let mut first = Orchestrator::from_config(&config).unwrap();
    first.run(ids(&FILINGS)).await.unwrap();

    let damaged = dir.path().join("filings/320193/0000320193-20-000010.txt");
    std::fs::write(&damaged, "truncated").unwrap();

    let mut second = Orchestrator::from_config(&config).unwrap();
    let summary = second.run(ids(&FILINGS)).await.unwrap();

    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.skipped, 2);
    assert_eq!(std::fs::read_to_string(&damaged).unwrap(), body_for(FILINGS[0]));
}

#[tokio::test]
async fn test_retry_backoff_recovers() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path(format!("/Archives/{}", FILINGS[0])))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;
    mount_filing(&mock_server, FILINGS[0], 1).await;

    let mut config = create_test_config(&mock_server.uri(), dir.path());
    config.harvest.max_attempts = 5;
    config.harvest.backoff_base_ms = 100;

    let mut orchestrator = Orchestrator::from_config(&config).unwrap();

    let start = Instant::now();
    let summary = orchestrator.run(ids(&[FILINGS[0]])).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);
    // 100ms after the first failure, then 200ms after the second
    assert!(elapsed >= Duration::from_millis(300), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_backup_identity_used_after_refusal() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path(format!("/Archives/{}", FILINGS[0])))
        .and(header("user-agent", "Backup Person backup@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body_for(FILINGS[0])))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/Archives/{}", FILINGS[0])))
        .respond_with(ResponseTemplate::new(403))
        .expect(2)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(&mock_server.uri(), dir.path());
    config.user_agent.backup = Some("Backup Person backup@example.com".to_string());

    let mut orchestrator = Orchestrator::from_config(&config).unwrap();
    let summary = orchestrator.run(ids(&[FILINGS[0]])).await.unwrap();

    assert_eq!(summary.succeeded, 1);
}

fn master_index_zip() -> Vec<u8> {
    let index = format!(
        "{}{}",
        "Description:           Master Index of EDGAR Dissemination Feed
Last Data Received:    March 31, 2020
Comments:              webmaster@sec.gov
Anonymous FTP:         ftp://ftp.sec.gov/edgar/
Cloud HTTP:            https://www.sec.gov/Archives/




CIK|Company Name|Form Type|Date Filed|Filename
--------------------------------------------------------------------------------
",
        "320193|Apple Inc.|10-K|2020-01-10|edgar/data/320193/0000320193-20-000010.txt
320193|Apple Inc.|8-K|2020-01-28|edgar/data/320193/0000320193-20-000052.txt
this|is|malformed
320193|Apple Inc.|10-Q|2020-01-29|edgar/data/320193/0000320193-20-000096.txt
"
    );

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        writer
            .start_file("master.idx", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(index.as_bytes()).unwrap();
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

#[tokio::test]
async fn test_index_run_with_form_filter() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/Archives/edgar/full-index/2020/QTR1/master.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(master_index_zip()))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_filing(&mock_server, FILINGS[0], 1).await;
    mount_filing(&mock_server, FILINGS[1], 0).await;
    mount_filing(&mock_server, FILINGS[2], 1).await;

    let mut config = create_test_config(&mock_server.uri(), dir.path());
    config.edgar.forms = vec!["10-K".to_string(), "10-Q".to_string()];

    let mut orchestrator = Orchestrator::from_config(&config).unwrap();
    let resolution = resolve_quarters(
        orchestrator.fetcher(),
        orchestrator.archive_base(),
        &[(2020, 1)],
        config.edgar.index_header_lines,
        &config.edgar.forms,
        Duration::ZERO,
    )
    .await
    .unwrap();

    assert_eq!(resolution.children, ids(&[FILINGS[0], FILINGS[2]]));
    assert_eq!(resolution.discarded, 1);
    assert_eq!(resolution.filtered, 1);

    let summary = orchestrator.run(resolution.children).await.unwrap();
    assert_eq!((summary.succeeded, summary.failed), (2, 0));
}

#[tokio::test]
async fn test_unreachable_listing_is_an_error() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path(CIK_LISTING))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), dir.path());
    let orchestrator = Orchestrator::from_config(&config).unwrap();

    let listing_url = Url::parse(&format!("{}{}", mock_server.uri(), CIK_LISTING)).unwrap();
    let result = resolve_listing(orchestrator.fetcher(), &listing_url, orchestrator.archive_base()).await;

    assert!(matches!(
        result,
        Err(ResolveError::RootUnavailable {
            kind: FetchErrorKind::HttpStatus(503),
            attempts: 2,
            ..
        })
    ));
}
