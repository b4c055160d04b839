//! Twitter/X standard search client with OAuth 1.0a authentication.
//!
//! Fetches recent tweets matching a query, newest first, bounded by
//! `since_id` (exclusive) and `max_id` (inclusive).

use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use mood_monitor_types::{
    Entities, HashtagEntity, Indices, MediaEntity, MentionEntity, TwitterUser, UrlEntity,
};
use serde::Deserialize;
use std::fmt;
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

const SEARCH_URL: &str = "https://api.twitter.com/1.1/search/tweets.json";
const PAGE_SIZE: u32 = 100;
const EXCLUDE_REPOSTS: &str = "-filter:retweets";

/// Application half of the OAuth 1.0a credentials, shared by every user
#[derive(Debug, Clone)]
pub struct ConsumerKeys {
    pub consumer_key: String,
    pub consumer_secret: String,
}

impl ConsumerKeys {
    pub fn from_env() -> Option<Self> {
        Some(Self {
            consumer_key: std::env::var("TWITTER_CONSUMER_KEY").ok()?,
            consumer_secret: std::env::var("TWITTER_CONSUMER_SECRET").ok()?,
        })
    }
}

/// User half of the OAuth 1.0a credentials. Requests are made, and rate
/// limited, on behalf of this user.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub secret: String,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &self.token)
            .field("secret", &"***")
            .finish()
    }
}

/// One search request
#[derive(Debug, Clone, PartialEq)]
pub struct SearchInput {
    pub token: AccessToken,
    pub query: String,
    pub since_id: Option<u64>,
    pub max_id: Option<u64>,
}

/// A tweet as returned by the search source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTweet {
    pub id: u64,
    pub author_id: u64,
    pub user: TwitterUser,
    pub text: String,
    pub entities: Entities,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait SearchSource: Send + Sync {
    /// Tweets matching the input, newest first
    async fn search(&self, input: &SearchInput) -> Result<Vec<SourceTweet>>;
}

/// Append the repost exclusion unless the query already carries it.
pub fn exclude_reposts(query: &str) -> String {
    if query.contains(EXCLUDE_REPOSTS) {
        query.to_string()
    } else {
        format!("{} {}", query, EXCLUDE_REPOSTS)
    }
}

// =====================================================
// Wire format
// =====================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    statuses: Vec<WireStatus>,
}

#[derive(Debug, Deserialize)]
struct WireStatus {
    id: u64,
    #[serde(alias = "text")]
    full_text: String,
    created_at: String,
    user: WireUser,
    #[serde(default)]
    entities: WireEntities,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: u64,
    name: String,
    screen_name: String,
    #[serde(default)]
    profile_image_url_https: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireEntities {
    #[serde(default)]
    hashtags: Vec<WireHashtag>,
    #[serde(default)]
    user_mentions: Vec<WireMention>,
    #[serde(default)]
    urls: Vec<WireUrl>,
    #[serde(default)]
    media: Vec<WireMedia>,
}

#[derive(Debug, Deserialize)]
struct WireHashtag {
    indices: Indices,
    text: String,
}

#[derive(Debug, Deserialize)]
struct WireMention {
    indices: Indices,
    id: u64,
    screen_name: String,
}

#[derive(Debug, Deserialize)]
struct WireUrl {
    indices: Indices,
    url: String,
    #[serde(default)]
    display_url: Option<String>,
    #[serde(default)]
    expanded_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMedia {
    indices: Indices,
    id: u64,
    #[serde(rename = "type")]
    media_type: String,
    url: String,
    #[serde(default)]
    media_url_https: Option<String>,
}

impl WireStatus {
    fn into_source_tweet(self) -> Result<SourceTweet> {
        let created_at = DateTime::parse_from_str(&self.created_at, "%a %b %d %H:%M:%S %z %Y")
            .map_err(|e| {
                Error::malformed(
                    "twitter search",
                    format!("bad created_at '{}': {}", self.created_at, e),
                )
            })?
            .with_timezone(&Utc);

        let e = self.entities;
        let entities = Entities {
            hashtags: e
                .hashtags
                .into_iter()
                .map(|h| HashtagEntity {
                    indices: h.indices,
                    tag: h.text,
                })
                .collect(),
            mentions: e
                .user_mentions
                .into_iter()
                .map(|m| MentionEntity {
                    indices: m.indices,
                    id: m.id,
                    tag: m.screen_name,
                })
                .collect(),
            urls: e
                .urls
                .into_iter()
                .map(|u| UrlEntity {
                    indices: u.indices,
                    url: u.url,
                    display_url: u.display_url.unwrap_or_default(),
                    expanded_url: u.expanded_url.unwrap_or_default(),
                })
                .collect(),
            media: e
                .media
                .into_iter()
                .map(|m| MediaEntity {
                    indices: m.indices,
                    id: m.id,
                    media_type: m.media_type,
                    url: m.url,
                    media_url: m.media_url_https.unwrap_or_default(),
                })
                .collect(),
        };

        Ok(SourceTweet {
            id: self.id,
            author_id: self.user.id,
            user: TwitterUser {
                id: self.user.id,
                name: self.user.name,
                screen_name: self.user.screen_name,
                profile_image_url: self.user.profile_image_url_https.unwrap_or_default(),
            },
            text: self.full_text,
            entities,
            created_at,
        })
    }
}

fn parse_search_body(body: &str) -> Result<Vec<SourceTweet>> {
    let response: SearchResponse = serde_json::from_str(body)
        .map_err(|e| Error::malformed("twitter search", format!("invalid JSON: {}", e)))?;
    response
        .statuses
        .into_iter()
        .map(WireStatus::into_source_tweet)
        .collect()
}

// =====================================================
// Client
// =====================================================

pub struct TwitterSearchClient {
    client: reqwest::Client,
    consumer: ConsumerKeys,
}

impl TwitterSearchClient {
    pub fn new(client: reqwest::Client, consumer: ConsumerKeys) -> Self {
        Self { client, consumer }
    }
}

#[async_trait]
impl SearchSource for TwitterSearchClient {
    async fn search(&self, input: &SearchInput) -> Result<Vec<SourceTweet>> {
        let mut query_params: Vec<(&str, String)> = vec![
            ("q", exclude_reposts(&input.query)),
            ("count", PAGE_SIZE.to_string()),
            ("result_type", "recent".to_string()),
            ("tweet_mode", "extended".to_string()),
            ("include_entities", "true".to_string()),
        ];
        if let Some(since_id) = input.since_id.filter(|id| *id > 0) {
            query_params.push(("since_id", since_id.to_string()));
        }
        if let Some(max_id) = input.max_id.filter(|id| *id > 0) {
            query_params.push(("max_id", max_id.to_string()));
        }

        let extra_params: Vec<(&str, &str)> = query_params
            .iter()
            .map(|(k, v)| (*k, v.as_str()))
            .collect();

        let auth = generate_oauth_header(
            "GET",
            SEARCH_URL,
            &self.consumer,
            &input.token,
            &extra_params,
        );

        let query_string: String = query_params
            .iter()
            .map(|(k, v)| format!("{}={}", k, percent_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let full_url = format!("{}?{}", SEARCH_URL, query_string);

        let response = self
            .client
            .get(&full_url)
            .header("Authorization", auth)
            .send()
            .await
            .map_err(|e| Error::upstream("twitter search", e))?;

        let remaining: Option<u32> = response
            .headers()
            .get("x-rate-limit-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        if let Some(remaining) = remaining {
            if remaining < 5 {
                log::warn!("[TWITTER] Rate limit low: {} search calls remaining", remaining);
            }
        }

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| {
            Error::upstream("twitter search", format!("failed to read response: {}", e))
        })?;

        if status.as_u16() == 429 {
            return Err(Error::RateLimited);
        }

        if !status.is_success() {
            return Err(Error::upstream(
                "twitter search",
                format!("status {}: {}", status, truncate_error(&body)),
            ));
        }

        parse_search_body(&body)
    }
}

// =====================================================
// OAuth 1.0a Implementation
// =====================================================

fn percent_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

fn generate_oauth_header(
    method: &str,
    url: &str,
    consumer: &ConsumerKeys,
    token: &AccessToken,
    extra_params: &[(&str, &str)],
) -> String {
    let timestamp = Utc::now().timestamp().to_string();
    let nonce: String = (0..32)
        .map(|_| format!("{:x}", rand::random::<u8>()))
        .collect();
    let signature = sign(method, url, consumer, token, extra_params, &nonce, &timestamp);

    let auth_params = [
        ("oauth_consumer_key", consumer.consumer_key.as_str()),
        ("oauth_nonce", nonce.as_str()),
        ("oauth_signature", signature.as_str()),
        ("oauth_signature_method", "HMAC-SHA1"),
        ("oauth_timestamp", timestamp.as_str()),
        ("oauth_token", token.token.as_str()),
        ("oauth_version", "1.0"),
    ];

    let auth_string: String = auth_params
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, percent_encode(v)))
        .collect::<Vec<_>>()
        .join(", ");

    format!("OAuth {}", auth_string)
}

fn sign(
    method: &str,
    url: &str,
    consumer: &ConsumerKeys,
    token: &AccessToken,
    extra_params: &[(&str, &str)],
    nonce: &str,
    timestamp: &str,
) -> String {
    let mut params: Vec<(String, String)> = vec![
        ("oauth_consumer_key".into(), consumer.consumer_key.clone()),
        ("oauth_nonce".into(), nonce.to_string()),
        ("oauth_signature_method".into(), "HMAC-SHA1".into()),
        ("oauth_timestamp".into(), timestamp.to_string()),
        ("oauth_token".into(), token.token.clone()),
        ("oauth_version".into(), "1.0".into()),
    ];
    params.extend(extra_params.iter().map(|(k, v)| (k.to_string(), v.to_string())));

    // Sorted by encoded key, then encoded value
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let base_string = format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(url),
        percent_encode(&param_string)
    );

    let signing_key = format!(
        "{}&{}",
        percent_encode(&consumer.consumer_secret),
        percent_encode(&token.secret)
    );

    let mut mac =
        HmacSha1::new_from_slice(signing_key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(base_string.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

fn truncate_error(s: &str) -> &str {
    match s.char_indices().nth(200) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
