use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.twitter.com";

/// Matches the typical API page cap.
pub const PAGE_SIZE: u32 = 100;

/// One page of the account timeline. `data` is absent both for an empty
/// account and for the page past the end of pagination; `includes` is
/// absent whenever no post on the page carries media.
#[derive(Debug, Deserialize)]
pub struct PostsPage {
    pub data: Option<Vec<ApiPost>>,
    pub includes: Option<Includes>,
    pub meta: Option<PageMeta>,
}

#[derive(Debug, Deserialize)]
pub struct ApiPost {
    pub id: String,
    pub text: String,
    pub attachments: Option<Attachments>,
}

#[derive(Debug, Deserialize)]
pub struct Attachments {
    #[serde(default)]
    pub media_keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Includes {
    #[serde(default)]
    pub media: Vec<ApiMedia>,
}

#[derive(Debug, Deserialize)]
pub struct ApiMedia {
    pub media_key: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: Option<String>,
    /// Quality/encoding options for videos, ordered by the API with the
    /// intended-highest-quality variant last.
    pub variants: Option<Vec<Variant>>,
}

#[derive(Debug, Deserialize)]
pub struct Variant {
    pub url: String,
    pub bit_rate: Option<u64>,
    pub content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PageMeta {
    pub next_token: Option<String>,
    pub result_count: Option<u32>,
}

/// Thin client for the paginated account-timeline endpoint.
pub struct ApiClient {
    base_url: String,
    bearer_token: String,
    client: reqwest::blocking::Client,
}

impl ApiClient {
    pub fn new(base_url: &str, bearer_token: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("post-archiver/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(ApiClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token: bearer_token.to_string(),
            client,
        })
    }

    /// Fetches one timeline page for `account_id`, excluding replies and
    /// reshares and asking for media expansions. `since_id` bounds the
    /// fetch from below; `pagination_token` continues a previous page.
    pub fn fetch_page(
        &self,
        account_id: &str,
        since_id: Option<i64>,
        pagination_token: Option<&str>,
    ) -> Result<PostsPage> {
        let url = format!("{}/2/users/{}/tweets", self.base_url, account_id);

        let mut query: Vec<(&str, String)> = vec![
            ("exclude", "replies,retweets".to_string()),
            ("expansions", "attachments.media_keys".to_string()),
            ("media.fields", "type,media_key,url,variants".to_string()),
            ("max_results", PAGE_SIZE.to_string()),
        ];
        if let Some(since_id) = since_id {
            query.push(("since_id", since_id.to_string()));
        }
        if let Some(token) = pagination_token {
            query.push(("pagination_token", token.to_string()));
        }

        debug!("Fetching timeline page from {}", url);
        let response = self
            .client
            .get(&url)
            .query(&query)
            .header("Authorization", format!("Bearer {}", self.bearer_token))
            .send()
            .with_context(|| format!("Failed to fetch posts for account {}", account_id))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "Timeline request for account {} failed: {}",
                account_id,
                status
            ));
        }

        let page: PostsPage = response
            .json()
            .context("Failed to parse timeline page JSON")?;
        debug!(
            "Received page with {} post(s)",
            page.data.as_ref().map_or(0, |d| d.len())
        );
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_deserializes_full_shape() {
        let raw = r#"{
            "data": [
                {"id": "101", "text": "hello", "attachments": {"media_keys": ["3_1"]}},
                {"id": "100", "text": "plain"}
            ],
            "includes": {
                "media": [
                    {"media_key": "3_1", "type": "photo", "url": "https://cdn.example.com/a.jpg"}
                ]
            },
            "meta": {"next_token": "tok123", "result_count": 2}
        }"#;

        let page: PostsPage = serde_json::from_str(raw).unwrap();
        let data = page.data.unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0].id, "101");
        assert_eq!(
            data[0].attachments.as_ref().unwrap().media_keys,
            vec!["3_1"]
        );
        assert!(data[1].attachments.is_none());

        let media = &page.includes.unwrap().media;
        assert_eq!(media[0].kind, "photo");
        assert_eq!(page.meta.unwrap().next_token.as_deref(), Some("tok123"));
    }

    #[test]
    fn test_page_deserializes_without_data() {
        let raw = r#"{"meta": {"result_count": 0}}"#;
        let page: PostsPage = serde_json::from_str(raw).unwrap();
        assert!(page.data.is_none());
        assert!(page.includes.is_none());
        assert!(page.meta.unwrap().next_token.is_none());
    }

    #[test]
    fn test_video_variants_keep_order() {
        let raw = r#"{
            "media_key": "7_9",
            "type": "video",
            "variants": [
                {"url": "https://v.example.com/low.mp4", "bit_rate": 256000, "content_type": "video/mp4"},
                {"url": "https://v.example.com/mid.mp4", "bit_rate": 832000, "content_type": "video/mp4"},
                {"url": "https://v.example.com/high.mp4", "bit_rate": 2176000, "content_type": "video/mp4"}
            ]
        }"#;
        let media: ApiMedia = serde_json::from_str(raw).unwrap();
        let variants = media.variants.unwrap();
        assert_eq!(variants.last().unwrap().url, "https://v.example.com/high.mp4");
    }

    #[test]
    fn test_fetch_page_non_success_status() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(401)
            .create();

        let client = ApiClient::new(&server.url(), "bad-token").unwrap();
        let result = client.fetch_page("12345", None, None);
        assert!(result.is_err());
        mock.assert();
    }
}
