/// HTTP access to the ThingSpeak channel feed API
use async_trait::async_trait;
use log::{debug, info};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::mapping::ChannelSettings;
use crate::thingspeak::decode::{FeedEntry, FeedPage};

pub const DEFAULT_BASE_URL: &str = "https://api.thingspeak.com/";

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Body the latest-entry endpoint returns for a channel with no data
const EMPTY_CHANNEL_BODY: &str = "-1";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedError {
    #[error("Network error: {0}")]
    Http(String),
    #[error("ThingSpeak API error: {0}")]
    Status(u16),
    #[error("Unexpected response: {0}")]
    Decode(String),
    #[error("Invalid API URL: {0}")]
    Url(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(e: reqwest::Error) -> Self {
        FeedError::Http(e.to_string())
    }
}

impl From<url::ParseError> for FeedError {
    fn from(e: url::ParseError) -> Self {
        FeedError::Url(e.to_string())
    }
}

/// Source of channel records
///
/// The poller only talks to this trait, so tests can substitute an
/// in-memory feed for the HTTP client.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Newest record, or `None` if the channel has never received data
    async fn fetch_latest(&self, channel: &ChannelSettings) -> Result<Option<FeedEntry>, FeedError>;

    /// Up to `results` most recent records, oldest first
    async fn fetch_history(&self, channel: &ChannelSettings, results: u32) -> Result<FeedPage, FeedError>;
}

pub struct ThingSpeakClient {
    base_url: Url,
    client: reqwest::Client,
}

impl ThingSpeakClient {
    pub fn new(base_url: &str) -> Result<Self, FeedError> {
        // Url::join drops the last path segment unless it ends with a slash
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { base_url, client })
    }

    pub fn latest_url(&self, channel: &ChannelSettings) -> Result<Url, FeedError> {
        let mut url = self
            .base_url
            .join(&format!("channels/{}/feeds/last.json", channel.channel_id.trim()))?;
        url.query_pairs_mut().append_pair("api_key", &channel.api_key);
        Ok(url)
    }

    pub fn history_url(&self, channel: &ChannelSettings, results: u32) -> Result<Url, FeedError> {
        let mut url = self
            .base_url
            .join(&format!("channels/{}/feeds.json", channel.channel_id.trim()))?;
        url.query_pairs_mut()
            .append_pair("api_key", &channel.api_key)
            .append_pair("results", &results.to_string());
        Ok(url)
    }

    async fn get_text(&self, url: Url) -> Result<String, FeedError> {
        debug!("GET {}", url.path());
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

/// Parse the latest-entry body, treating `-1` as an empty channel
pub fn parse_latest(body: &str) -> Result<Option<FeedEntry>, FeedError> {
    let body = body.trim();
    if body == EMPTY_CHANNEL_BODY {
        return Ok(None);
    }
    serde_json::from_str(body)
        .map(Some)
        .map_err(|e| FeedError::Decode(e.to_string()))
}

pub fn parse_history(body: &str) -> Result<FeedPage, FeedError> {
    serde_json::from_str(body).map_err(|e| FeedError::Decode(e.to_string()))
}

#[async_trait]
impl FeedSource for ThingSpeakClient {
    async fn fetch_latest(&self, channel: &ChannelSettings) -> Result<Option<FeedEntry>, FeedError> {
        let body = self.get_text(self.latest_url(channel)?).await?;
        parse_latest(&body)
    }

    async fn fetch_history(&self, channel: &ChannelSettings, results: u32) -> Result<FeedPage, FeedError> {
        let body = self.get_text(self.history_url(channel, results)?).await?;
        let page = parse_history(&body)?;
        if let Some(name) = page.channel.as_ref().and_then(|c| c.name.as_deref()) {
            info!("Channel '{}' returned {} records", name, page.feeds.len());
        }
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::FieldMappings;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer a single HTTP request with `response` and return the base URL
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{}", addr)
    }

    /// Client for a loopback server, bypassing any configured proxy
    fn local_client(base: &str) -> ThingSpeakClient {
        let client = ThingSpeakClient::new(base).unwrap();
        ThingSpeakClient {
            client: reqwest::Client::builder().no_proxy().build().unwrap(),
            ..client
        }
    }

    fn channel() -> ChannelSettings {
        ChannelSettings {
            channel_id: "123456".into(),
            api_key: "AB CD".into(),
            mappings: FieldMappings::standard(),
        }
    }

    #[test]
    fn test_endpoint_urls() {
        let client = ThingSpeakClient::new("https://api.thingspeak.com").unwrap();
        assert_eq!(
            client.latest_url(&channel()).unwrap().as_str(),
            "https://api.thingspeak.com/channels/123456/feeds/last.json?api_key=AB+CD"
        );
        assert_eq!(
            client.history_url(&channel(), 144).unwrap().as_str(),
            "https://api.thingspeak.com/channels/123456/feeds.json?api_key=AB+CD&results=144"
        );
    }

    #[test]
    fn test_base_url_with_path_prefix() {
        let client = ThingSpeakClient::new("http://localhost:8080/proxy").unwrap();
        let url = client.history_url(&channel(), 10).unwrap();
        assert_eq!(url.path(), "/proxy/channels/123456/feeds.json");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(ThingSpeakClient::new("not a url"), Err(FeedError::Url(_))));
    }

    #[test]
    fn test_parse_latest() {
        assert_eq!(parse_latest(" -1\n"), Ok(None));
        let entry = parse_latest(r#"{"created_at":"2024-01-01T00:00:00Z","entry_id":7,"field1":"3.2"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(entry.value("field1"), 3.2);
        assert!(matches!(parse_latest("<html>"), Err(FeedError::Decode(_))));
    }

    #[test]
    fn test_status_error_message() {
        assert_eq!(FeedError::Status(404).to_string(), "ThingSpeak API error: 404");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let base = serve_once(
            "HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;
        let client = local_client(&base);
        assert_eq!(client.fetch_latest(&channel()).await.unwrap_err(), FeedError::Status(500));
    }

    #[tokio::test]
    async fn test_empty_channel_over_http() {
        let base = serve_once(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 2\r\nconnection: close\r\n\r\n-1",
        )
        .await;
        let client = local_client(&base);
        assert_eq!(client.fetch_latest(&channel()).await.unwrap(), None);
    }
}
