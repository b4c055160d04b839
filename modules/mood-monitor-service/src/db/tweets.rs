//! Tweet rows: per-search partition plus the sentiment bucket index.

use super::Db;
use super::rows::{self, TweetRow};
use crate::error::Result;
use mood_monitor_types::{SentimentFilter, Tweet, TweetPage};
use rusqlite::OptionalExtension;

/// Listing request for the tweets of one search
#[derive(Debug, Clone)]
pub struct TweetQuery {
    pub search_id: String,
    /// Only tweets with a strictly smaller id
    pub until_id: Option<u64>,
    pub limit: usize,
    pub sentiment: Option<SentimentFilter>,
}

impl Db {
    /// Insert or replace tweets by `(search_id, tweet_id)` in one transaction.
    pub fn upsert_tweets(&self, tweets: &[Tweet]) -> Result<usize> {
        if tweets.is_empty() {
            return Ok(0);
        }
        let rows = tweets
            .iter()
            .map(TweetRow::from_tweet)
            .collect::<Result<Vec<_>>>()?;

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO items (pk, sk, kind, sentiment_pk, label, expires_at, attrs)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for row in &rows {
                stmt.execute(rusqlite::params![
                    row.pk,
                    row.sk,
                    rows::KIND_TWEET,
                    row.sentiment_pk,
                    row.label,
                    row.expires_at,
                    row.attrs
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    /// Highest stored tweet id for a search, used as the next `since_id`
    pub fn latest_tweet_id(&self, search_id: &str) -> Result<Option<u64>> {
        let conn = self.conn();
        let sk: Option<String> = conn
            .query_row(
                "SELECT sk FROM items WHERE pk = ?1 AND sk LIKE 'TWEET#%'
                 ORDER BY sk DESC LIMIT 1",
                [rows::tweets_pk(search_id)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(sk.as_deref().and_then(rows::parse_tweet_sk))
    }

    /// Drop every tweet stored for a search.
    pub fn delete_tweets(&self, search_id: &str) -> Result<usize> {
        let conn = self.conn();
        let deleted = conn.execute(
            "DELETE FROM items WHERE pk = ?1 AND sk LIKE 'TWEET#%'",
            [rows::tweets_pk(search_id)],
        )?;
        Ok(deleted)
    }

    pub fn count_tweets(&self, search_id: &str) -> Result<i64> {
        let conn = self.conn();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM items WHERE pk = ?1 AND sk LIKE 'TWEET#%'",
            [rows::tweets_pk(search_id)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Tweets of a search, newest first. Sentiment filters go through the
    /// bucket index instead of the search partition.
    pub fn list_tweets(&self, query: &TweetQuery) -> Result<Vec<Tweet>> {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        let mut param_idx = 1u32;

        match query.sentiment {
            None => {
                conditions.push(format!("pk = ?{}", param_idx));
                params.push(Box::new(rows::tweets_pk(&query.search_id)));
                param_idx += 1;
                conditions.push("sk LIKE 'TWEET#%'".to_string());
            }
            Some(filter) => {
                conditions.push(format!("sentiment_pk = ?{}", param_idx));
                params.push(Box::new(rows::sentiment_pk(
                    &query.search_id,
                    rows::filter_bucket(filter),
                )));
                param_idx += 1;
                if let SentimentFilter::Label(label) = filter {
                    conditions.push(format!("label = ?{}", param_idx));
                    params.push(Box::new(label.as_str()));
                    param_idx += 1;
                }
            }
        }

        if let Some(until_id) = query.until_id.filter(|id| *id > 0) {
            conditions.push(format!("sk < ?{}", param_idx));
            params.push(Box::new(rows::tweet_sk(until_id)));
            param_idx += 1;
        }

        let sql = format!(
            "SELECT attrs FROM items WHERE {} ORDER BY sk DESC LIMIT ?{}",
            conditions.join(" AND "),
            param_idx
        );
        params.push(Box::new(query.limit as i64));

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let raw = stmt
            .query_map(param_refs.as_slice(), |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.iter().map(|attrs| rows::decode_tweet(attrs)).collect()
    }

    /// Fetch one row past `limit` to learn whether another page exists.
    pub fn list_tweet_page(&self, query: &TweetQuery) -> Result<TweetPage> {
        let lookahead = TweetQuery {
            limit: query.limit + 1,
            ..query.clone()
        };
        let mut tweets = self.list_tweets(&lookahead)?;
        let has_more = tweets.len() > query.limit;
        tweets.truncate(query.limit);
        Ok(TweetPage { tweets, has_more })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::tweet;
    use super::*;
    use mood_monitor_types::SentimentLabel;

    fn query(search_id: &str, limit: usize) -> TweetQuery {
        TweetQuery {
            search_id: search_id.to_string(),
            until_id: None,
            limit,
            sentiment: None,
        }
    }

    fn seed(db: &Db, search_id: &str, count: u64) {
        let tweets: Vec<_> = (1..=count)
            .map(|id| tweet(search_id, id * 10, SentimentLabel::Neutral))
            .collect();
        db.upsert_tweets(&tweets).unwrap();
    }

    #[test]
    fn test_delete_tweets_leaves_other_searches() {
        let db = Db::open(":memory:").unwrap();
        seed(&db, "s1", 3);
        seed(&db, "s2", 2);

        assert_eq!(db.delete_tweets("s1").unwrap(), 3);
        assert_eq!(db.count_tweets("s1").unwrap(), 0);
        assert_eq!(db.count_tweets("s2").unwrap(), 2);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let db = Db::open(":memory:").unwrap();
        let batch = vec![
            tweet("s1", 1, SentimentLabel::Positive),
            tweet("s1", 2, SentimentLabel::Undetected),
        ];
        db.upsert_tweets(&batch).unwrap();
        db.upsert_tweets(&batch).unwrap();

        assert_eq!(db.count_tweets("s1").unwrap(), 2);
        let stored = db.list_tweets(&query("s1", 10)).unwrap();
        assert_eq!(stored, vec![batch[1].clone(), batch[0].clone()]);
    }

    #[test]
    fn test_latest_tweet_id_uses_numeric_order() {
        let db = Db::open(":memory:").unwrap();
        assert_eq!(db.latest_tweet_id("s1").unwrap(), None);
        db.upsert_tweets(&[
            tweet("s1", 99, SentimentLabel::Neutral),
            tweet("s1", 1000, SentimentLabel::Neutral),
            tweet("s2", 5000, SentimentLabel::Neutral),
        ])
        .unwrap();
        assert_eq!(db.latest_tweet_id("s1").unwrap(), Some(1000));
    }

    #[test]
    fn test_page_with_more() {
        let db = Db::open(":memory:").unwrap();
        seed(&db, "s1", 11);

        let page = db.list_tweet_page(&query("s1", 10)).unwrap();
        assert_eq!(page.tweets.len(), 10);
        assert!(page.has_more);
        assert_eq!(page.tweets[0].tweet_id, 110);
        assert_eq!(page.tweets[9].tweet_id, 20);
    }

    #[test]
    fn test_page_exact_fit() {
        let db = Db::open(":memory:").unwrap();
        seed(&db, "s1", 10);

        let page = db.list_tweet_page(&query("s1", 10)).unwrap();
        assert_eq!(page.tweets.len(), 10);
        assert!(!page.has_more);
    }

    #[test]
    fn test_until_id_is_exclusive() {
        let db = Db::open(":memory:").unwrap();
        seed(&db, "s1", 5);

        let mut q = query("s1", 10);
        q.until_id = Some(30);
        let ids: Vec<_> = db
            .list_tweets(&q)
            .unwrap()
            .iter()
            .map(|t| t.tweet_id)
            .collect();
        assert_eq!(ids, vec![20, 10]);
    }

    #[test]
    fn test_sentiment_filters() {
        let db = Db::open(":memory:").unwrap();
        db.upsert_tweets(&[
            tweet("s1", 1, SentimentLabel::Positive),
            tweet("s1", 2, SentimentLabel::Negative),
            tweet("s1", 3, SentimentLabel::Neutral),
            tweet("s1", 4, SentimentLabel::Undetected),
            tweet("s2", 5, SentimentLabel::Positive),
        ])
        .unwrap();

        let ids = |filter: SentimentFilter| -> Vec<u64> {
            let mut q = query("s1", 10);
            q.sentiment = Some(filter);
            db.list_tweets(&q).unwrap().iter().map(|t| t.tweet_id).collect()
        };

        assert_eq!(ids(SentimentFilter::Polarized), vec![2, 1]);
        assert_eq!(ids(SentimentFilter::Label(SentimentLabel::Positive)), vec![1]);
        assert_eq!(ids(SentimentFilter::Label(SentimentLabel::Negative)), vec![2]);
        assert_eq!(ids(SentimentFilter::Label(SentimentLabel::Neutral)), vec![3]);
        assert_eq!(ids(SentimentFilter::Label(SentimentLabel::Undetected)), vec![4]);
    }

    #[test]
    fn test_filtered_page_with_until_id() {
        let db = Db::open(":memory:").unwrap();
        let tweets: Vec<_> = (1..=6)
            .map(|id| {
                let label = if id % 2 == 0 {
                    SentimentLabel::Negative
                } else {
                    SentimentLabel::Neutral
                };
                tweet("s1", id, label)
            })
            .collect();
        db.upsert_tweets(&tweets).unwrap();

        let page = db
            .list_tweet_page(&TweetQuery {
                search_id: "s1".to_string(),
                until_id: Some(6),
                limit: 1,
                sentiment: Some(SentimentFilter::Polarized),
            })
            .unwrap();
        assert_eq!(page.tweets.len(), 1);
        assert_eq!(page.tweets[0].tweet_id, 4);
        assert!(page.has_more);
    }
}
