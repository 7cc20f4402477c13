//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the registry and run the full
//! property → buildings → units crawl end-to-end through the runtime.

use crate::support::{building_list_page, create_test_config, unit_page, PROPERTY_PAGE};
use presale_crawler::output::load_snapshot;
use presale_crawler::storage::{lock_sink, CrawlSink};
use presale_crawler::{CrawlPhase, PresaleError, Runtime};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_page(server: &MockServer, page_path: &str, body: String, expected: u64) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_crawl_with_one_retry() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_page(&mock_server, "/floorinfo/P1", PROPERTY_PAGE.to_string(), 1).await;
    mount_page(
        &mock_server,
        "/floorinfo/P1/buildings",
        building_list_page("P1", &["B1", "B2", "B3"]),
        1,
    )
    .await;
    mount_page(&mock_server, "/floorinfo/P1/B1", unit_page("B1", 4), 1).await;
    mount_page(&mock_server, "/floorinfo/P1/B3", unit_page("B3", 2), 1).await;

    // B2 fails on the first pass and succeeds on the retry pass
    Mock::given(method("GET"))
        .and(path("/floorinfo/P1/B2"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "/floorinfo/P1/B2", unit_page("B2", 3), 1).await;

    let config = create_test_config(&mock_server.uri(), &dir.path().join("crawl.db"));
    let runtime = Runtime::init(config, "integration").unwrap();

    let job = runtime.trigger_crawl("P1").unwrap();
    let report = runtime.tracker().wait(job).await.unwrap();

    assert_eq!(report.phase, CrawlPhase::Done);
    assert_eq!(report.buildings_total, 3);
    assert_eq!(report.first_pass_failures, vec!["B2"]);
    assert!(report.residual_failures.is_empty());
    assert_eq!(report.retry_passes, 1);
    assert_eq!(report.units_saved, 9);

    {
        let sink = runtime.sink();
        let sink = lock_sink(&sink).unwrap();

        let snapshot = load_snapshot(&*sink, "P1").unwrap().unwrap();
        assert_eq!(snapshot.property.name, "Riverside Garden");
        assert_eq!(snapshot.property.district.as_deref(), Some("Yuelu"));
        let order: Vec<&str> = snapshot
            .buildings
            .iter()
            .map(|b| b.building.id.as_str())
            .collect();
        assert_eq!(order, vec!["B1", "B2", "B3"]);
        assert_eq!(snapshot.unit_count(), 9);
        assert_eq!(snapshot.buildings[0].units[0].area, Some(89.5));

        let record = sink.get_job(report.job_id).unwrap();
        assert_eq!(record.phase, CrawlPhase::Done);
        assert_eq!(record.config_hash, "integration");

        let failures = sink.get_building_failures(report.job_id).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].building_id, "B2");
        assert!(failures[0].error_message.contains("502"));
    }

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_building_list_failure_aborts_job() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_page(&mock_server, "/floorinfo/P1", PROPERTY_PAGE.to_string(), 1).await;

    // A maintenance page instead of the building table
    mount_page(
        &mock_server,
        "/floorinfo/P1/buildings",
        "<html><body>系统维护中</body></html>".to_string(),
        1,
    )
    .await;

    // No unit page may be requested
    Mock::given(method("GET"))
        .and(path("/floorinfo/P1/B1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), &dir.path().join("crawl.db"));
    let runtime = Runtime::init(config, "integration").unwrap();

    let job = runtime.trigger_crawl("P1").unwrap();
    let err = runtime.tracker().wait(job).await.unwrap_err();
    assert!(matches!(err, PresaleError::JobAborted(id, _) if id == job));

    {
        let sink = runtime.sink();
        let sink = lock_sink(&sink).unwrap();
        let record = sink.latest_job("P1").unwrap().unwrap();
        assert_eq!(record.phase, CrawlPhase::Failed);
        assert!(record.error_message.unwrap().contains("hs_xqxx"));
        assert_eq!(sink.count_buildings().unwrap(), 0);
    }

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_property_not_found_is_fatal() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/floorinfo/P404"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), &dir.path().join("crawl.db"));
    let runtime = Runtime::init(config, "integration").unwrap();

    let cancel = tokio_util::sync::CancellationToken::new();
    let err = runtime.crawl("P404", &cancel).await.unwrap_err();
    assert!(err.to_string().contains("HTTP 404"));

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_empty_building_list_finishes_without_unit_requests() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_page(&mock_server, "/floorinfo/P2", PROPERTY_PAGE.to_string(), 1).await;
    mount_page(
        &mock_server,
        "/floorinfo/P2/buildings",
        building_list_page("P2", &[]),
        1,
    )
    .await;

    let config = create_test_config(&mock_server.uri(), &dir.path().join("crawl.db"));
    let runtime = Runtime::init(config, "integration").unwrap();

    let job = runtime.trigger_crawl("P2").unwrap();
    let report = runtime.tracker().wait(job).await.unwrap();

    assert_eq!(report.phase, CrawlPhase::Done);
    assert_eq!(report.buildings_total, 0);
    assert_eq!(report.units_saved, 0);

    // Only the property and building-list pages were requested
    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_cancelled_crawl_is_recorded() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_page(&mock_server, "/floorinfo/P1", PROPERTY_PAGE.to_string(), 1).await;

    let mut config = create_test_config(&mock_server.uri(), &dir.path().join("crawl.db"));
    config.crawler.request_delay_ms = 60_000;
    let runtime = Runtime::init(config, "integration").unwrap();

    let job = runtime.trigger_crawl("P1").unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    runtime.tracker().cancel(job).unwrap();

    let report = runtime.tracker().wait(job).await.unwrap();
    assert_eq!(report.phase, CrawlPhase::Cancelled);

    {
        let sink = runtime.sink();
        let sink = lock_sink(&sink).unwrap();
        assert_eq!(sink.count_jobs_by_phase(CrawlPhase::Cancelled).unwrap(), 1);
        assert_eq!(sink.count_properties().unwrap(), 1);
    }

    runtime.shutdown().await;
}
