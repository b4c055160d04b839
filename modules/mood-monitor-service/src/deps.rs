use crate::config::CollectPolicy;
use crate::db::Db;
use crate::sentiment::SentimentDetector;
use crate::twitter_api::SearchSource;
use std::sync::Arc;

/// Everything the ingestion pipeline talks to, built once in `main`.
#[derive(Clone)]
pub struct Deps {
    pub db: Arc<Db>,
    pub source: Arc<dyn SearchSource>,
    pub detector: Arc<dyn SentimentDetector>,
    pub policy: CollectPolicy,
}

impl Deps {
    pub fn new(
        db: Arc<Db>,
        source: Arc<dyn SearchSource>,
        detector: Arc<dyn SentimentDetector>,
        policy: CollectPolicy,
    ) -> Self {
        Self {
            db,
            source,
            detector,
            policy,
        }
    }
}
