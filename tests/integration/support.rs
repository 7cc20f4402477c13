//! Shared fixtures for the integration tests

use presale_crawler::config::{
    Config, CrawlerConfig, OutputConfig, RegistryConfig, DEFAULT_USER_AGENT,
};
use std::path::Path;

/// Creates a configuration pointing at a mock registry
pub fn create_test_config(base_url: &str, db_path: &Path) -> Config {
    Config {
        registry: RegistryConfig {
            base_url: base_url.to_string(),
            region_code: "cs".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: 5,
        },
        crawler: CrawlerConfig {
            request_delay_ms: 100, // Lowest delay validation allows
            max_retry_passes: 1,
            retry_backoff_ms: None,
        },
        output: OutputConfig {
            database_path: db_path.to_string_lossy().to_string(),
        },
    }
}

pub const PROPERTY_PAGE: &str = r#"<html><body>
<table class="hs_table">
    <tr><th>项目名称</th><td>Riverside Garden</td></tr>
    <tr><th>项目地址</th><td>88 River Road</td></tr>
    <tr><th>开发企业</th><td>Riverside Development Co.</td></tr>
    <tr><th>预售证号</th><td>2021-0042</td></tr>
    <tr><th>所在区域</th><td>Yuelu</td></tr>
</table>
</body></html>"#;

/// Building list page linking to the given building ids
pub fn building_list_page(property_id: &str, building_ids: &[&str]) -> String {
    let rows: String = building_ids
        .iter()
        .map(|id| {
            format!(
                r#"<tr><td><a href="/floorinfo/{}/{}">{}栋</a></td><td>18</td></tr>"#,
                property_id, id, id
            )
        })
        .collect();

    format!(
        r#"<html><body><table class="hs_xqxx"><thead><tr><th>楼栋</th><th>层数</th></tr></thead><tbody>{}</tbody></table></body></html>"#,
        rows
    )
}

/// Unit page with `count` units for a building
pub fn unit_page(building_id: &str, count: usize) -> String {
    let rows: String = (1..=count)
        .map(|n| {
            format!(
                "<tr><td>{}-{:02}</td><td>89.50㎡</td><td>可售</td></tr>",
                building_id, n
            )
        })
        .collect();

    format!(
        r#"<html><body><table class="hs_table"><tbody>{}</tbody></table></body></html>"#,
        rows
    )
}
