//! Shared types for the mood monitor service and its RPC clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// =====================================================
// Domain Types
// =====================================================

/// A saved search owned by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Search {
    pub search_id: String,
    pub user_id: String,
    pub title: String,
    pub query: String,
    pub next_update_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A registered user. The Twitter access token is stored but never returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Author fields copied at ingestion time. Not kept in sync with the source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TwitterUser {
    pub id: u64,
    pub name: String,
    pub screen_name: String,
    pub profile_image_url: String,
}

/// `[start, end)` offsets into the tweet text
pub type Indices = [usize; 2];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashtagEntity {
    pub indices: Indices,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentionEntity {
    pub indices: Indices,
    pub id: u64,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlEntity {
    pub indices: Indices,
    pub url: String,
    pub display_url: String,
    pub expanded_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaEntity {
    pub indices: Indices,
    pub id: u64,
    #[serde(rename = "type")]
    pub media_type: String,
    pub url: String,
    pub media_url: String,
}

/// Entities attached to a tweet
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Entities {
    #[serde(default)]
    pub hashtags: Vec<HashtagEntity>,
    #[serde(default)]
    pub mentions: Vec<MentionEntity>,
    #[serde(default)]
    pub urls: Vec<UrlEntity>,
    #[serde(default)]
    pub media: Vec<MediaEntity>,
}

/// Per-class sentiment probabilities
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SentimentScore {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mixed: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
    Unknown,
    /// The content filter skipped scoring for this tweet
    Undetected,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "POSITIVE",
            SentimentLabel::Negative => "NEGATIVE",
            SentimentLabel::Neutral => "NEUTRAL",
            SentimentLabel::Unknown => "UNKNOWN",
            SentimentLabel::Undetected => "UNDETECTED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "POSITIVE" => Some(SentimentLabel::Positive),
            "NEGATIVE" => Some(SentimentLabel::Negative),
            "NEUTRAL" => Some(SentimentLabel::Neutral),
            "UNKNOWN" => Some(SentimentLabel::Unknown),
            "UNDETECTED" => Some(SentimentLabel::Undetected),
            _ => None,
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored tweet matching a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tweet {
    pub search_id: String,
    pub tweet_id: u64,
    pub author_id: u64,
    pub user: TwitterUser,
    pub text: String,
    pub entities: Entities,
    pub sentiment_score: Option<SentimentScore>,
    pub sentiment_label: SentimentLabel,
    pub tweet_created_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// =====================================================
// Filter / Query Types
// =====================================================

/// Sentiment restriction for tweet listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentimentFilter {
    Label(SentimentLabel),
    /// Positive and negative tweets together
    Polarized,
}

impl SentimentFilter {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "POLARIZED" | "POS_OR_NEG" => Some(SentimentFilter::Polarized),
            other => SentimentLabel::from_str(other).map(SentimentFilter::Label),
        }
    }
}

/// One page of tweets for a search, newest first
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TweetPage {
    pub tweets: Vec<Tweet>,
    pub has_more: bool,
}

// =====================================================
// RPC Request Types
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSearchRequest {
    #[serde(default)]
    pub query: String,
    pub title: Option<String>,
}

/// Body of `POST /users/@me`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RegisterUserRequest {
    #[serde(default, alias = "TwitterAccessToken")]
    pub twitter_access_token: String,
    #[serde(default, alias = "TwitterAccessTokenSecret")]
    pub twitter_access_token_secret: String,
}

/// Query string of `GET /searches/:id/tweets`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListTweetsParams {
    pub until_id: Option<u64>,
    pub limit: Option<usize>,
    pub sentiment_label: Option<String>,
}

// =====================================================
// RPC Response Types
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Field → message map for rejected input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<std::collections::BTreeMap<String, String>>,
}

impl<T: Serialize> RpcResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            errors: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
            errors: None,
        }
    }

    pub fn invalid(errors: std::collections::BTreeMap<String, String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some("validation failed".to_string()),
            errors: Some(errors),
        }
    }
}

// =====================================================
// Service Status
// =====================================================

/// Row counts for the status endpoint
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub searches: i64,
    pub due_searches: i64,
    pub tweets: i64,
    pub undetected_tweets: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub worker_enabled: bool,
    pub uptime_secs: u64,
    pub searches: i64,
    pub due_searches: i64,
    pub total_tweets: i64,
    pub last_tick_at: Option<String>,
    pub tick_secs: u64,
}
