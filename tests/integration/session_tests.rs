//! Integration tests for the verification session
//!
//! The mock registry ties the CAPTCHA to a session cookie and checks the
//! anti-forgery token, the way the live lookup form does.

use crate::support::{building_list_page, create_test_config, unit_page, PROPERTY_PAGE};
use presale_crawler::config::RegistryConfig;
use presale_crawler::{CaptchaSession, CrawlPhase, FetchErrorKind, Runtime, VerificationRequest};
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LANDING_PAGE: &str = r#"<html><body>
<form id="form" action="/preselllicence" method="post">
    <input type="hidden" name="_token" value="tok123">
    <input type="text" name="yszh">
    <input type="text" name="verify_code">
</form>
</body></html>"#;

const SUCCESS_BODY: &str = r#"{"status":"1","content":"<tr><td><a href=\"http:\/\/www.cszjxx.net\/floorinfo\/P1\" target=\"_blank\">Riverside Garden<\/a><\/td><\/tr>"}"#;

const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// Mounts the captcha (which sets the session cookie) and the landing page
async fn mount_session(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/newCaptcha"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "registry_session=abc123; Path=/")
                .insert_header("content-type", "image/png")
                .set_body_bytes(PNG_BYTES),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/preselllicence"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LANDING_PAGE))
        .mount(server)
        .await;
}

fn registry_config(server: &MockServer) -> RegistryConfig {
    let dir = std::env::temp_dir();
    create_test_config(&server.uri(), &dir.join("unused.db")).registry
}

#[tokio::test]
async fn test_verify_license_resolves_property_id() {
    let mock_server = MockServer::start().await;
    mount_session(&mock_server).await;

    // Only a submission carrying the session cookie, the token and the
    // fields in form order is accepted
    Mock::given(method("POST"))
        .and(path("/preselllicence"))
        .and(header("cookie", "registry_session=abc123"))
        .and(header("x-requested-with", "XMLHttpRequest"))
        .and(body_string(
            "area=cs&yszh=2021-0042&_token=tok123&ismobile=0&xmmc=&verify_code=ab12",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string(SUCCESS_BODY))
        .expect(1)
        .mount(&mock_server)
        .await;

    let session = CaptchaSession::new(&registry_config(&mock_server)).unwrap();

    let image = session.fetch_captcha_image().await.unwrap();
    assert_eq!(image, PNG_BYTES);

    let result = session
        .verify_license(&VerificationRequest::new("2021-0042", "ab12"))
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.property_id.as_deref(), Some("P1"));

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["status"], "1");
    assert_eq!(json["id"], "P1");
}

#[tokio::test]
async fn test_wrong_captcha_is_declared_failure() {
    let mock_server = MockServer::start().await;
    mount_session(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/preselllicence"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"status":"0","content":"验证码错误"}"#),
        )
        .mount(&mock_server)
        .await;

    let session = CaptchaSession::new(&registry_config(&mock_server)).unwrap();
    session.fetch_captcha_image().await.unwrap();

    let result = session
        .verify_license(&VerificationRequest::new("2021-0042", "wrong"))
        .await
        .unwrap();

    assert!(!result.is_success());
    assert_eq!(result.status.as_deref(), Some("0"));
    assert_eq!(result.property_id, None);
    assert_eq!(
        result.into_property_id().unwrap_err().kind(),
        FetchErrorKind::Session
    );
}

#[tokio::test]
async fn test_server_error_on_submit_is_network_error() {
    let mock_server = MockServer::start().await;
    mount_session(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/preselllicence"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let session = CaptchaSession::new(&registry_config(&mock_server)).unwrap();
    let err = session
        .verify_license(&VerificationRequest::new("2021-0042", "ab12"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FetchErrorKind::Network);
}

#[tokio::test]
async fn test_captcha_unavailable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/newCaptcha"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let session = CaptchaSession::new(&registry_config(&mock_server)).unwrap();
    let err = session.fetch_captcha_image().await.unwrap_err();

    assert_eq!(err.kind(), FetchErrorKind::Network);
    assert!(err.to_string().contains("captcha image"));
}

#[tokio::test]
async fn test_sessions_do_not_share_cookies() {
    let mock_server = MockServer::start().await;
    mount_session(&mock_server).await;

    // Without the cookie the registry treats the submission as expired
    Mock::given(method("POST"))
        .and(path("/preselllicence"))
        .and(header("cookie", "registry_session=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SUCCESS_BODY))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/preselllicence"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"status":"0","content":"expired"}"#),
        )
        .mount(&mock_server)
        .await;

    let config = registry_config(&mock_server);
    let first = CaptchaSession::new(&config).unwrap();
    first.fetch_captcha_image().await.unwrap();

    let second = CaptchaSession::new(&config).unwrap();
    let result = second
        .verify_license(&VerificationRequest::new("2021-0042", "ab12"))
        .await
        .unwrap();
    assert_eq!(result.status.as_deref(), Some("0"));

    let result = first
        .verify_license(&VerificationRequest::new("2021-0042", "ab12"))
        .await
        .unwrap();
    assert_eq!(result.property_id.as_deref(), Some("P1"));
}

#[tokio::test]
async fn test_resolve_then_crawl() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_session(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/preselllicence"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SUCCESS_BODY))
        .mount(&mock_server)
        .await;
    for (page, body) in [
        ("/floorinfo/P1", PROPERTY_PAGE.to_string()),
        ("/floorinfo/P1/buildings", building_list_page("P1", &["B1"])),
        ("/floorinfo/P1/B1", unit_page("B1", 2)),
    ] {
        Mock::given(method("GET"))
            .and(path(page))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;
    }

    let config = create_test_config(&mock_server.uri(), &dir.path().join("resolve.db"));
    let runtime = Runtime::init(config, "integration").unwrap();

    let session = runtime.new_session().unwrap();
    session.fetch_captcha_image().await.unwrap();
    let property_id = session
        .verify_license(&VerificationRequest::new("2021-0042", "ab12"))
        .await
        .unwrap()
        .into_property_id()
        .unwrap();

    let job = runtime.trigger_crawl(&property_id).unwrap();
    let report = runtime.tracker().wait(job).await.unwrap();

    assert_eq!(report.property_id, "P1");
    assert_eq!(report.phase, CrawlPhase::Done);
    assert_eq!(report.units_saved, 2);

    runtime.shutdown().await;
}
