//! Sentiment classification.
//!
//! One capability, `batch_detect`. Single-text detection is a batch of one so
//! both paths derive labels the same way.

use crate::error::{Error, Result};
use async_trait::async_trait;
use mood_monitor_types::{SentimentLabel, SentimentScore};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectOutput {
    pub score: SentimentScore,
    pub label: SentimentLabel,
}

impl DetectOutput {
    pub fn from_score(score: SentimentScore) -> Self {
        Self {
            score,
            label: determine_label(&score),
        }
    }
}

/// Strict winner between positive and negative, otherwise neutral.
pub fn determine_label(score: &SentimentScore) -> SentimentLabel {
    if score.positive > score.negative && score.positive > score.neutral {
        return SentimentLabel::Positive;
    }
    if score.negative > score.positive && score.negative > score.neutral {
        return SentimentLabel::Negative;
    }
    SentimentLabel::Neutral
}

#[async_trait]
pub trait SentimentDetector: Send + Sync {
    /// Score every text. Output order and length match the input.
    async fn batch_detect(&self, texts: &[String]) -> Result<Vec<DetectOutput>>;

    async fn detect(&self, text: &str) -> Result<DetectOutput> {
        let mut outputs = self.batch_detect(&[text.to_string()]).await?;
        outputs
            .pop()
            .ok_or_else(|| Error::upstream("sentiment detect", "empty response"))
    }
}

// =====================================================
// HTTP batch detector
// =====================================================

#[derive(Serialize)]
struct BatchRequest<'a> {
    #[serde(rename = "TextList")]
    text_list: &'a [String],
}

#[derive(Deserialize)]
struct BatchResponse {
    result: Vec<WireScore>,
}

#[derive(Deserialize)]
struct WireScore {
    #[serde(rename = "Positive")]
    positive: f64,
    #[serde(rename = "Negative")]
    negative: f64,
    #[serde(rename = "Neutral")]
    neutral: f64,
    #[serde(rename = "Mixed", default)]
    mixed: Option<f64>,
}

/// Posts `{"TextList": [...]}` and reads `{"result": [{Positive, Negative, Neutral}]}`
pub struct HttpDetector {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDetector {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl SentimentDetector for HttpDetector {
    async fn batch_detect(&self, texts: &[String]) -> Result<Vec<DetectOutput>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&BatchRequest { text_list: texts })
            .send()
            .await
            .map_err(|e| Error::upstream("sentiment request", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::upstream("sentiment response", e))?;

        parse_batch_response(status, &body, texts.len())
    }
}

/// Check status and shape of a batch response: one score per input text.
fn parse_batch_response(
    status: reqwest::StatusCode,
    body: &str,
    expected: usize,
) -> Result<Vec<DetectOutput>> {
    if !status.is_success() {
        return Err(Error::upstream(
            "sentiment request",
            format!("status {}: {}", status, truncate(body)),
        ));
    }

    let parsed: BatchResponse = serde_json::from_str(body)
        .map_err(|e| Error::malformed("sentiment response", format!("invalid JSON: {}", e)))?;

    if parsed.result.len() != expected {
        return Err(Error::upstream(
            "sentiment response",
            format!("{} scores for {} texts", parsed.result.len(), expected),
        ));
    }

    Ok(parsed
        .result
        .into_iter()
        .map(|s| {
            DetectOutput::from_score(SentimentScore {
                positive: s.positive,
                negative: s.negative,
                neutral: s.neutral,
                mixed: s.mixed,
            })
        })
        .collect())
}

/// Scores every text 0.25 across the board. For running without a sentiment backend.
pub struct FixedDetector;

#[async_trait]
impl SentimentDetector for FixedDetector {
    async fn batch_detect(&self, texts: &[String]) -> Result<Vec<DetectOutput>> {
        let score = SentimentScore {
            positive: 0.25,
            negative: 0.25,
            neutral: 0.25,
            mixed: Some(0.25),
        };
        Ok(texts.iter().map(|_| DetectOutput::from_score(score)).collect())
    }
}

fn truncate(s: &str) -> &str {
    match s.char_indices().nth(200) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
