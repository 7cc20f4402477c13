//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests to the registry site, including:
//! - Building HTTP clients with the configured user agent and timeouts
//! - The three phase fetchers (property, building list, unit info)
//! - Error classification into [`FetchError`] variants
//!
//! Each fetcher call performs exactly one request and one parse. There is no
//! retry here; retries are driven per building by the orchestrator.

use crate::config::RegistryConfig;
use crate::crawler::parser::{parse_building_list, parse_property, parse_units};
use crate::storage::{Building, Property, Unit};
use crate::{FetchError, FetchResult, FetchTarget};
use async_trait::async_trait;
use reqwest::{Client, Response};
use std::sync::Arc;
use std::time::Duration;

/// Fetches the registry record of a property
#[async_trait]
pub trait PropertyInfoFetcher: Send + Sync {
    async fn fetch_property(&self, property_id: &str) -> FetchResult<Property>;
}

/// Fetches the ordered building list of a property
#[async_trait]
pub trait BuildingListFetcher: Send + Sync {
    async fn fetch_buildings(&self, property_id: &str) -> FetchResult<Vec<Building>>;
}

/// Fetches the units of one building
#[async_trait]
pub trait UnitInfoFetcher: Send + Sync {
    async fn fetch_units(&self, property_id: &str, building_id: &str) -> FetchResult<Vec<Unit>>;
}

/// The three phase fetchers handed to the orchestrator
#[derive(Clone)]
pub struct PhaseFetchers {
    pub property: Arc<dyn PropertyInfoFetcher>,
    pub buildings: Arc<dyn BuildingListFetcher>,
    pub units: Arc<dyn UnitInfoFetcher>,
}

impl PhaseFetchers {
    /// Uses one registry client for all three phases
    pub fn from_client(client: Arc<RegistryClient>) -> Self {
        Self {
            property: client.clone(),
            buildings: client.clone(),
            units: client,
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The registry configuration
/// * `cookies` - Whether the client keeps a cookie jar (verification sessions do)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use presale_crawler::config::{RegistryConfig, DEFAULT_USER_AGENT};
/// use presale_crawler::crawler::build_http_client;
///
/// let config = RegistryConfig {
///     base_url: "http://www.cszjxx.net".to_string(),
///     region_code: "cs".to_string(),
///     user_agent: DEFAULT_USER_AGENT.to_string(),
///     request_timeout_secs: 30,
/// };
///
/// let client = build_http_client(&config, false).unwrap();
/// ```
pub fn build_http_client(config: &RegistryConfig, cookies: bool) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.request_timeout())
        .connect_timeout(Duration::from_secs(10))
        .cookie_store(cookies)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Sends a GET request and returns the body of a successful response
///
/// Transport failures become [`FetchError::Network`], non-2xx responses
/// become [`FetchError::Status`].
pub(crate) async fn get_text(
    client: &Client,
    url: &str,
    target: FetchTarget,
) -> FetchResult<String> {
    tracing::debug!("GET {}", url);
    let response = client.get(url).send().await.map_err(|source| FetchError::Network {
        target: target.clone(),
        source,
    })?;

    read_text(response, target).await
}

/// Reads the body of a response after checking its status
pub(crate) async fn read_text(response: Response, target: FetchTarget) -> FetchResult<String> {
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            target,
            status: status.as_u16(),
        });
    }

    response
        .text()
        .await
        .map_err(|source| FetchError::Network { target, source })
}

/// Live client for the registry's property pages
pub struct RegistryClient {
    client: Client,
    config: RegistryConfig,
}

impl RegistryClient {
    pub fn new(config: RegistryConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(&config, false)?;
        Ok(Self { client, config })
    }

    /// `GET {base}/floorinfo/{property_id}`
    pub fn property_url(&self, property_id: &str) -> String {
        self.config.endpoint(&format!("floorinfo/{}", property_id))
    }

    /// `GET {base}/floorinfo/{property_id}/buildings`
    pub fn building_list_url(&self, property_id: &str) -> String {
        self.config
            .endpoint(&format!("floorinfo/{}/buildings", property_id))
    }

    /// `GET {base}/floorinfo/{property_id}/{building_id}`
    pub fn units_url(&self, property_id: &str, building_id: &str) -> String {
        self.config
            .endpoint(&format!("floorinfo/{}/{}", property_id, building_id))
    }
}

#[async_trait]
impl PropertyInfoFetcher for RegistryClient {
    async fn fetch_property(&self, property_id: &str) -> FetchResult<Property> {
        let target = FetchTarget::Property {
            property_id: property_id.to_string(),
        };
        let body = get_text(&self.client, &self.property_url(property_id), target).await?;
        parse_property(&body, property_id)
    }
}

#[async_trait]
impl BuildingListFetcher for RegistryClient {
    async fn fetch_buildings(&self, property_id: &str) -> FetchResult<Vec<Building>> {
        let target = FetchTarget::BuildingList {
            property_id: property_id.to_string(),
        };
        let body = get_text(&self.client, &self.building_list_url(property_id), target).await?;
        parse_building_list(&body, property_id)
    }
}

#[async_trait]
impl UnitInfoFetcher for RegistryClient {
    async fn fetch_units(&self, property_id: &str, building_id: &str) -> FetchResult<Vec<Unit>> {
        let target = FetchTarget::Units {
            property_id: property_id.to_string(),
            building_id: building_id.to_string(),
        };
        let url = self.units_url(property_id, building_id);
        let body = get_text(&self.client, &url, target).await?;
        parse_units(&body, property_id, building_id)
    }
}
