use std::time::Duration;

use anyhow::{bail, Context, Result};
use chatdesk_contracts::news::{parse_headline_envelope, HeadlineResult};
use reqwest::blocking::Client as HttpClient;
use serde_json::Value;
use tracing::debug;

use crate::{truncate_text, HeadlineSource};

pub const DEFAULT_NEWS_API_BASE: &str = "https://newsapi.org/v2";

/// NewsAPI `top-headlines`. One GET per call, no retries, no caching.
pub struct NewsApiSource {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl NewsApiSource {
    pub fn new(
        api_key: Option<String>,
        api_base: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        // NewsAPI rejects requests that carry no User-Agent.
        let http = HttpClient::builder()
            .user_agent(concat!("chatdesk/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("failed to build NewsAPI HTTP client")?;
        Ok(Self {
            api_base: api_base
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_NEWS_API_BASE.to_string()),
            api_key: api_key.filter(|value| !value.trim().is_empty()),
            http,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/top-headlines", self.api_base)
    }
}

impl HeadlineSource for NewsApiSource {
    fn name(&self) -> &str {
        "newsapi"
    }

    fn fetch(&self, country: &str, category: &str) -> Result<HeadlineResult> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("News API key missing (set NEWS_API_KEY or add it to secrets.toml)");
        };
        debug!(country, category, "fetching top headlines");
        let response = self
            .http
            .get(self.endpoint())
            .query(&[
                ("country", country),
                ("category", category),
                ("apiKey", api_key),
            ])
            .send()
            .context("NewsAPI request failed")?;
        // Error envelopes arrive with 4xx statuses; the body is still the
        // authoritative answer.
        let status = response.status();
        let body = response
            .text()
            .context("NewsAPI response body read failed")?;
        let parsed: Value = serde_json::from_str(&body).with_context(|| {
            format!(
                "NewsAPI returned invalid JSON ({}): {}",
                status.as_u16(),
                truncate_text(body.trim(), 256)
            )
        })?;
        Ok(parse_headline_envelope(&parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::{NewsApiSource, DEFAULT_NEWS_API_BASE};
    use crate::HeadlineSource;

    #[test]
    fn endpoint_uses_configured_base() -> anyhow::Result<()> {
        let source = NewsApiSource::new(None, Some("http://127.0.0.1:1/v2/".to_string()), None)?;
        assert_eq!(source.endpoint(), "http://127.0.0.1:1/v2/top-headlines");

        let source = NewsApiSource::new(None, None, None)?;
        assert_eq!(source.endpoint(), format!("{DEFAULT_NEWS_API_BASE}/top-headlines"));
        Ok(())
    }

    #[test]
    fn missing_key_fails_without_network() -> anyhow::Result<()> {
        let source = NewsApiSource::new(Some(String::new()), None, None)?;
        let err = source
            .fetch("us", "general")
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert!(err.contains("NEWS_API_KEY"));
        Ok(())
    }
}
