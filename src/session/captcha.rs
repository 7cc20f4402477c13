//! CAPTCHA-gated license verification
//!
//! One [`CaptchaSession`] covers one verification attempt: it owns a fresh
//! cookie jar so that the CAPTCHA image, the anti-forgery token and the form
//! submission are all bound to the same server-side session.

use crate::config::RegistryConfig;
use crate::crawler::build_http_client;
use crate::crawler::fetcher::read_text;
use crate::session::unescape::unescape_fragment;
use crate::{FetchError, FetchResult, FetchTarget};
use chrono::Utc;
use regex::Regex;
use reqwest::header::{ACCEPT, REFERER};
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::Value;
use std::sync::OnceLock;

/// Status value the registry uses for a successful lookup
pub const SUCCESS_STATUS: &str = "1";

const LANDING_PATH: &str = "preselllicence";
const CAPTCHA_PATH: &str = "newCaptcha";
const TOKEN_SELECTOR: &str = r#"#form [name="_token"]"#;

/// A license number and the user's answer to the current CAPTCHA
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub license_number: String,
    pub captcha_answer: String,
}

impl VerificationRequest {
    pub fn new(license_number: impl Into<String>, captcha_answer: impl Into<String>) -> Self {
        Self {
            license_number: license_number.into(),
            captcha_answer: captcha_answer.into(),
        }
    }
}

/// Outcome of a verification as reported by the registry
///
/// Serializes as `{status, content, id?}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    pub status: Option<String>,
    pub content: Option<String>,
    #[serde(rename = "id", skip_serializing_if = "Option::is_none")]
    pub property_id: Option<String>,
}

impl VerificationResult {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some(SUCCESS_STATUS)
    }

    /// Extracts the property id, treating a declared failure as an error
    pub fn into_property_id(self) -> FetchResult<String> {
        if !self.is_success() {
            return Err(FetchError::Session {
                status: self.status,
                message: self
                    .content
                    .unwrap_or_else(|| "registry declined the lookup".to_string()),
            });
        }

        self.property_id.ok_or_else(|| {
            FetchError::parse(
                FetchTarget::Verification,
                "successful response carried no property link",
            )
        })
    }
}

/// A single verification attempt with its own cookie jar
pub struct CaptchaSession {
    client: Client,
    config: RegistryConfig,
}

impl CaptchaSession {
    /// Creates a session; no request is sent until a method is called
    pub fn new(config: &RegistryConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config, true)?,
            config: config.clone(),
        })
    }

    fn landing_url(&self) -> String {
        self.config.endpoint(LANDING_PATH)
    }

    /// Fetches a fresh CAPTCHA image bound to this session
    ///
    /// Every call invalidates the previous challenge.
    pub async fn fetch_captcha_image(&self) -> FetchResult<Vec<u8>> {
        let url = self.config.endpoint(CAPTCHA_PATH);
        let cache_buster = Utc::now().timestamp_millis().to_string();
        tracing::debug!("GET {} (captcha)", url);

        let response = self
            .client
            .get(&url)
            .query(&[("r", cache_buster.as_str())])
            .header(REFERER, self.landing_url())
            .header(ACCEPT, "image/webp,image/apng,image/*,*/*;q=0.8")
            .send()
            .await
            .map_err(|source| FetchError::Network {
                target: FetchTarget::Captcha,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                target: FetchTarget::Captcha,
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|source| FetchError::Network {
            target: FetchTarget::Captcha,
            source,
        })?;
        Ok(bytes.to_vec())
    }

    /// Reads the anti-forgery token from the landing page
    ///
    /// A page without the token yields an empty string, which the registry
    /// then rejects with a declared failure.
    async fn fetch_token(&self) -> FetchResult<String> {
        let url = self.landing_url();
        tracing::debug!("GET {} (token)", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Network {
                target: FetchTarget::Verification,
                source,
            })?;
        let body = read_text(response, FetchTarget::Verification).await?;

        let token = extract_token(&body);
        if token.is_empty() {
            tracing::warn!("Landing page carried no anti-forgery token");
        }
        Ok(token)
    }

    /// Submits a license lookup and parses the registry's answer
    pub async fn verify_license(
        &self,
        request: &VerificationRequest,
    ) -> FetchResult<VerificationResult> {
        let token = self.fetch_token().await?;
        let url = self.landing_url();

        let form = [
            ("area", self.config.region_code.as_str()),
            ("yszh", request.license_number.as_str()),
            ("_token", token.as_str()),
            ("ismobile", "0"),
            ("xmmc", ""),
            ("verify_code", request.captcha_answer.as_str()),
        ];

        tracing::info!("Verifying presale license {}", request.license_number);
        let response = self
            .client
            .post(&url)
            .form(&form)
            .header("X-Requested-With", "XMLHttpRequest")
            .header(ACCEPT, "application/json, text/javascript, */*; q=0.01")
            .header(REFERER, url.as_str())
            .send()
            .await
            .map_err(|source| FetchError::Network {
                target: FetchTarget::Verification,
                source,
            })?;
        let body = read_text(response, FetchTarget::Verification).await?;

        let result = parse_verification_response(&body)?;
        match &result.property_id {
            Some(id) => tracing::info!("License {} resolved to property {}", request.license_number, id),
            None => tracing::info!(
                "License {} not resolved (status {:?})",
                request.license_number,
                result.status
            ),
        }
        Ok(result)
    }
}

/// Parses the JSON body returned by the verification endpoint
pub fn parse_verification_response(body: &str) -> FetchResult<VerificationResult> {
    let json: Value = serde_json::from_str(body).map_err(|e| {
        FetchError::parse(
            FetchTarget::Verification,
            format!("response is not JSON: {}", e),
        )
    })?;

    let status = match json.get("status") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    };
    let content = json
        .get("content")
        .and_then(Value::as_str)
        .map(String::from);

    let property_id = match (&status, &content) {
        (Some(s), Some(fragment)) if s == SUCCESS_STATUS => {
            extract_property_id_from_fragment(fragment)
        }
        _ => None,
    };

    Ok(VerificationResult {
        status,
        content,
        property_id,
    })
}

/// Decodes the escaped result fragment and reads the first link's property id
pub fn extract_property_id_from_fragment(fragment: &str) -> Option<String> {
    let html = unescape_fragment(fragment);
    let document = Html::parse_fragment(&html);
    let anchor = Selector::parse("a").ok()?;

    let href = document.select(&anchor).next()?.value().attr("href")?;
    extract_property_id(href)
}

/// Applies the `floorinfo/<id>` pattern to a link
pub fn extract_property_id(href: &str) -> Option<String> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"\S+floorinfo/(\w+)").ok())
        .as_ref()?;

    pattern
        .captures(href)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn extract_token(html: &str) -> String {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(TOKEN_SELECTOR) else {
        return String::new();
    };

    document
        .select(&selector)
        .next()
        .and_then(|input| input.value().attr("value"))
        .unwrap_or_default()
        .to_string()
}
