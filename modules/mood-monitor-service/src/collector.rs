//! One catch-up pass for a single search.
//!
//! Pages backwards from the newest matching tweet down to the last stored id,
//! scores eligible tweets in fixed-size batches and stores everything it sees.

use crate::deps::Deps;
use crate::error::{Error, Result};
use crate::filter;
use crate::retry::with_backoff;
use crate::sentiment::DetectOutput;
use crate::twitter_api::{AccessToken, SearchInput, SourceTweet, exclude_reposts};
use chrono::{DateTime, Duration, Utc};
use mood_monitor_types::{Search, SentimentLabel, SentimentScore, Tweet};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CollectReport {
    pub pages: usize,
    pub fetched: usize,
    pub scored: usize,
    pub undetected: usize,
    pub max_tweet_id: Option<u64>,
}

pub struct Collector<'a> {
    deps: &'a Deps,
}

impl<'a> Collector<'a> {
    pub fn new(deps: &'a Deps) -> Self {
        Self { deps }
    }

    /// Fetch and store every tweet newer than `last_stored_max_id`, searching
    /// on behalf of the owner of `token`.
    ///
    /// Any upstream failure aborts the pass. Batches written before the
    /// failure stay stored; rewriting them later is harmless.
    pub async fn collect(
        &self,
        search: &Search,
        token: &AccessToken,
        last_stored_max_id: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<CollectReport> {
        let policy = &self.deps.policy;
        let since_id = last_stored_max_id.filter(|id| *id > 0);
        let mut input = SearchInput {
            token: token.clone(),
            query: exclude_reposts(&search.query),
            since_id,
            max_id: None,
        };
        let mut buffer: Vec<SourceTweet> = Vec::with_capacity(policy.batch_size);
        let mut report = CollectReport::default();

        loop {
            let mut page = self.fetch_page(&input).await?;
            report.pages += 1;

            // max_id is inclusive, so the boundary tweet comes back again
            if let Some(max_id) = input.max_id {
                page.retain(|t| t.id < max_id);
            }
            let Some(oldest) = page.iter().map(|t| t.id).min() else {
                break;
            };

            let mut undetected = Vec::new();
            for tweet in page {
                if since_id.is_some_and(|since| tweet.id <= since) {
                    continue;
                }
                report.fetched += 1;
                report.max_tweet_id = report.max_tweet_id.max(Some(tweet.id));

                if filter::should_detect(&tweet, policy) {
                    buffer.push(tweet);
                    if buffer.len() >= policy.batch_size {
                        report.scored += self.flush(search, &mut buffer, now).await?;
                    }
                } else {
                    undetected.push(self.undetected_tweet(search, tweet, now));
                }
            }

            if !undetected.is_empty() {
                report.undetected += self.deps.db.upsert_tweets(&undetected)?;
            }

            // Everything further back is already stored
            if since_id.is_some_and(|since| oldest <= since) {
                break;
            }
            input.max_id = Some(oldest);
        }

        if !buffer.is_empty() {
            report.scored += self.flush(search, &mut buffer, now).await?;
        }

        log::debug!(
            "[COLLECTOR] search {}: {} pages, {} fetched, {} scored, {} undetected",
            search.search_id,
            report.pages,
            report.fetched,
            report.scored,
            report.undetected
        );
        Ok(report)
    }

    async fn fetch_page(&self, input: &SearchInput) -> Result<Vec<SourceTweet>> {
        let policy = &self.deps.policy;
        let source = self.deps.source.as_ref();
        with_backoff(
            "twitter search",
            policy.max_attempts,
            policy.retry_base,
            move || source.search(input),
        )
        .await
    }

    /// Score the buffered tweets in one call and store them.
    async fn flush(
        &self,
        search: &Search,
        buffer: &mut Vec<SourceTweet>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let policy = &self.deps.policy;
        let batch = std::mem::replace(buffer, Vec::with_capacity(policy.batch_size));
        log::info!(
            "[COLLECTOR] Writing {} tweets with sentiment detection",
            batch.len()
        );

        let texts: Vec<String> = batch.iter().map(|t| t.text.clone()).collect();
        let texts = &texts;
        let detector = self.deps.detector.as_ref();
        let outputs = with_backoff(
            "sentiment batch",
            policy.max_attempts,
            policy.retry_base,
            move || detector.batch_detect(texts),
        )
        .await?;

        if outputs.len() != batch.len() {
            return Err(Error::upstream(
                "sentiment batch",
                format!("{} results for {} texts", outputs.len(), batch.len()),
            ));
        }

        let tweets: Vec<Tweet> = batch
            .into_iter()
            .zip(outputs)
            .map(|(tweet, output)| self.scored_tweet(search, tweet, output, now))
            .collect();
        self.deps.db.upsert_tweets(&tweets)
    }

    fn scored_tweet(
        &self,
        search: &Search,
        tweet: SourceTweet,
        output: DetectOutput,
        now: DateTime<Utc>,
    ) -> Tweet {
        build_tweet(
            search,
            tweet,
            Some(output.score),
            output.label,
            now,
            self.deps.policy.scored_ttl,
        )
    }

    fn undetected_tweet(&self, search: &Search, tweet: SourceTweet, now: DateTime<Utc>) -> Tweet {
        build_tweet(
            search,
            tweet,
            None,
            SentimentLabel::Undetected,
            now,
            self.deps.policy.undetected_ttl,
        )
    }
}

fn build_tweet(
    search: &Search,
    tweet: SourceTweet,
    score: Option<SentimentScore>,
    label: SentimentLabel,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Tweet {
    Tweet {
        search_id: search.search_id.clone(),
        tweet_id: tweet.id,
        author_id: tweet.author_id,
        user: tweet.user,
        text: tweet.text,
        entities: tweet.entities,
        sentiment_score: score,
        sentiment_label: label,
        tweet_created_at: tweet.created_at,
        ingested_at: now,
        expires_at: now + ttl,
    }
}
