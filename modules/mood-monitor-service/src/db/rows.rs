//! Storage row shapes and the mapping between them and domain types.
//!
//! Key prefixes, index columns and the JSON attribute payload stay in here;
//! callers only ever see `Search` and `Tweet`.

use crate::error::Result;
use crate::twitter_api::AccessToken;
use chrono::{DateTime, SecondsFormat, Utc};
use mood_monitor_types::*;
use serde::{Deserialize, Serialize};

pub const KIND_SEARCH: &str = "search";
pub const KIND_TWEET: &str = "tweet";
pub const KIND_USER: &str = "user";

/// Sort key of the profile row in a user partition
pub const USER_PROFILE_SK: &str = "PROFILE";

/// Shared partition of the due-queue index
pub const SEARCH_DUE_PK: &str = "SEARCH_DUE";

const POLARIZED_BUCKET: &str = "POLARIZED";

pub fn user_pk(user_id: &str) -> String {
    format!("USER#{}", user_id)
}

pub fn search_sk(search_id: &str) -> String {
    format!("SEARCH#{}", search_id)
}

pub fn tweets_pk(search_id: &str) -> String {
    format!("SEARCH#{}", search_id)
}

/// Zero-padded so that string order matches numeric order
pub fn tweet_sk(tweet_id: u64) -> String {
    format!("TWEET#{:020}", tweet_id)
}

pub fn parse_tweet_sk(sk: &str) -> Option<u64> {
    sk.strip_prefix("TWEET#")?.parse().ok()
}

/// Positive and negative share a bucket so the polarized view is one range.
pub fn sentiment_bucket(label: SentimentLabel) -> &'static str {
    match label {
        SentimentLabel::Positive | SentimentLabel::Negative => POLARIZED_BUCKET,
        other => other.as_str(),
    }
}

pub fn filter_bucket(filter: SentimentFilter) -> &'static str {
    match filter {
        SentimentFilter::Polarized => POLARIZED_BUCKET,
        SentimentFilter::Label(label) => sentiment_bucket(label),
    }
}

pub fn sentiment_pk(search_id: &str, bucket: &str) -> String {
    format!("SEARCH#{}#{}", search_id, bucket)
}

/// Fixed-width UTC timestamp, lexicographically ordered
pub fn sort_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// =====================================================
// Search rows
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
struct SearchAttrs {
    search_id: String,
    user_id: String,
    #[serde(default)]
    title: String,
    query: String,
    next_update_at: DateTime<Utc>,
    #[serde(default)]
    last_updated_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SearchRow {
    pub pk: String,
    pub sk: String,
    pub due_pk: String,
    pub due_sk: String,
    pub attrs: String,
}

impl SearchRow {
    pub fn from_search(search: &Search) -> Result<Self> {
        let attrs = SearchAttrs {
            search_id: search.search_id.clone(),
            user_id: search.user_id.clone(),
            title: search.title.clone(),
            query: search.query.clone(),
            next_update_at: search.next_update_at,
            last_updated_at: search.last_updated_at,
            created_at: search.created_at,
            updated_at: search.updated_at,
        };
        Ok(Self {
            pk: user_pk(&search.user_id),
            sk: search_sk(&search.search_id),
            due_pk: SEARCH_DUE_PK.to_string(),
            due_sk: sort_time(search.next_update_at),
            attrs: serde_json::to_string(&attrs)?,
        })
    }
}

pub fn decode_search(attrs: &str) -> Result<Search> {
    let a: SearchAttrs = serde_json::from_str(attrs)?;
    Ok(Search {
        search_id: a.search_id,
        user_id: a.user_id,
        title: a.title,
        query: a.query,
        next_update_at: a.next_update_at,
        last_updated_at: a.last_updated_at,
        created_at: a.created_at,
        updated_at: a.updated_at,
    })
}

// =====================================================
// User rows
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
struct UserAttrs {
    user_id: String,
    twitter_access_token: String,
    twitter_access_token_secret: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

pub fn encode_user(profile: &UserProfile, token: &AccessToken) -> Result<String> {
    let attrs = UserAttrs {
        user_id: profile.user_id.clone(),
        twitter_access_token: token.token.clone(),
        twitter_access_token_secret: token.secret.clone(),
        created_at: profile.created_at,
        updated_at: profile.updated_at,
    };
    Ok(serde_json::to_string(&attrs)?)
}

pub fn decode_user(attrs: &str) -> Result<(UserProfile, AccessToken)> {
    let a: UserAttrs = serde_json::from_str(attrs)?;
    Ok((
        UserProfile {
            user_id: a.user_id,
            created_at: a.created_at,
            updated_at: a.updated_at,
        },
        AccessToken {
            token: a.twitter_access_token,
            secret: a.twitter_access_token_secret,
        },
    ))
}

// =====================================================
// Tweet rows
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
struct TweetAttrs {
    search_id: String,
    tweet_id: u64,
    author_id: u64,
    user: TwitterUser,
    text: String,
    #[serde(default)]
    entities: Entities,
    sentiment_score: Option<SentimentScore>,
    sentiment_label: SentimentLabel,
    tweet_created_at: DateTime<Utc>,
    ingested_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct TweetRow {
    pub pk: String,
    pub sk: String,
    pub sentiment_pk: String,
    pub label: &'static str,
    pub expires_at: i64,
    pub attrs: String,
}

impl TweetRow {
    pub fn from_tweet(tweet: &Tweet) -> Result<Self> {
        let attrs = TweetAttrs {
            search_id: tweet.search_id.clone(),
            tweet_id: tweet.tweet_id,
            author_id: tweet.author_id,
            user: tweet.user.clone(),
            text: tweet.text.clone(),
            entities: tweet.entities.clone(),
            sentiment_score: tweet.sentiment_score,
            sentiment_label: tweet.sentiment_label,
            tweet_created_at: tweet.tweet_created_at,
            ingested_at: tweet.ingested_at,
            expires_at: tweet.expires_at,
        };
        Ok(Self {
            pk: tweets_pk(&tweet.search_id),
            sk: tweet_sk(tweet.tweet_id),
            sentiment_pk: sentiment_pk(&tweet.search_id, sentiment_bucket(tweet.sentiment_label)),
            label: tweet.sentiment_label.as_str(),
            expires_at: tweet.expires_at.timestamp(),
            attrs: serde_json::to_string(&attrs)?,
        })
    }
}

pub fn decode_tweet(attrs: &str) -> Result<Tweet> {
    let a: TweetAttrs = serde_json::from_str(attrs)?;
    Ok(Tweet {
        search_id: a.search_id,
        tweet_id: a.tweet_id,
        author_id: a.author_id,
        user: a.user,
        text: a.text,
        entities: a.entities,
        sentiment_score: a.sentiment_score,
        sentiment_label: a.sentiment_label,
        tweet_created_at: a.tweet_created_at,
        ingested_at: a.ingested_at,
        expires_at: a.expires_at,
    })
}
