//! Picks searches whose next update time has passed and runs one collection
//! pass for each, concurrently.

use crate::collector::{CollectReport, Collector};
use crate::db::Db;
use crate::deps::Deps;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use mood_monitor_types::Search;
use tokio::task::JoinSet;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Due searches, most overdue first.
pub fn list_due(db: &Db, now: DateTime<Utc>, limit: usize) -> Result<Vec<Search>> {
    db.list_due_searches(now, limit)
}

/// Catch one search up and move it to the back of the queue.
///
/// The pass runs with the owner's access token; an owner without one fails
/// the pass. The schedule only moves after a successful pass, so a failing
/// search is picked up again on the next tick. If the search was deleted
/// while the pass ran, the tweets it wrote are dropped again.
pub async fn run_search(
    deps: &Deps,
    mut search: Search,
    now: DateTime<Utc>,
) -> Result<CollectReport> {
    let token = deps
        .db
        .user_token(&search.user_id)?
        .ok_or_else(|| Error::MissingToken(search.user_id.clone()))?;
    let since_id = deps.db.latest_tweet_id(&search.search_id)?;
    let report = Collector::new(deps)
        .collect(&search, &token, since_id, now)
        .await?;

    search.last_updated_at = Some(now);
    search.next_update_at = now + deps.policy.update_interval;
    search.updated_at = now;
    match deps.db.update_search(&search) {
        Err(Error::NotFound(what)) => {
            let dropped = deps.db.delete_tweets(&search.search_id)?;
            log::info!(
                "[SCHEDULER] search {} deleted during its pass, dropped {} tweets",
                search.search_id,
                dropped
            );
            Err(Error::NotFound(what))
        }
        Err(e) => Err(e),
        Ok(()) => Ok(report),
    }
}

/// One scheduler tick: every due search runs in its own task.
pub async fn run_due(deps: &Deps, now: DateTime<Utc>, limit: usize) -> Result<TickReport> {
    let due = list_due(&deps.db, now, limit)?;
    let mut report = TickReport {
        due: due.len(),
        ..Default::default()
    };
    if due.is_empty() {
        return Ok(report);
    }
    log::debug!("[SCHEDULER] {} searches due", due.len());

    let mut tasks = JoinSet::new();
    for search in due {
        let deps = deps.clone();
        tasks.spawn(async move {
            let search_id = search.search_id.clone();
            (search_id, run_search(&deps, search, now).await)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((search_id, Ok(pass))) => {
                report.succeeded += 1;
                if pass.fetched > 0 {
                    log::info!(
                        "[SCHEDULER] search {}: {} new tweets ({} scored), newest id {}",
                        search_id,
                        pass.fetched,
                        pass.scored,
                        pass.max_tweet_id.unwrap_or_default()
                    );
                }
            }
            Ok((search_id, Err(Error::RateLimited))) => {
                report.failed += 1;
                log::warn!("[SCHEDULER] search {}: rate limited, retrying next tick", search_id);
            }
            Ok((search_id, Err(Error::MissingToken(user_id)))) => {
                report.failed += 1;
                log::warn!(
                    "[SCHEDULER] search {}: owner {} has no access token",
                    search_id,
                    user_id
                );
            }
            Ok((search_id, Err(Error::NotFound(_)))) => {
                report.failed += 1;
                log::info!("[SCHEDULER] search {} no longer exists", search_id);
            }
            Ok((search_id, Err(e))) => {
                report.failed += 1;
                log::error!("[SCHEDULER] search {} failed: {}", search_id, e);
            }
            Err(e) => {
                report.failed += 1;
                log::error!("[SCHEDULER] collection task aborted: {}", e);
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::test_support::{RecordingDetector, Scripted, Timeline, long_text};
    use crate::config::CollectPolicy;
    use crate::db::test_support::at;
    use crate::sentiment::SentimentDetector;
    use crate::twitter_api::SearchSource;
    use crate::twitter_api::test_support::{access_token, source_tweet};
    use chrono::Duration;
    use std::sync::Arc;

    fn deps(source: Arc<dyn SearchSource>, detector: Arc<dyn SentimentDetector>) -> Deps {
        let policy = CollectPolicy {
            retry_base: std::time::Duration::ZERO,
            max_attempts: 1,
            ..CollectPolicy::default()
        };
        let db = Db::open(":memory:").unwrap();
        db.register_user("u1", &access_token("u1"), Utc::now()).unwrap();
        Deps::new(Arc::new(db), source, detector, policy)
    }

    fn schedule(db: &Db, query: &str, next_update_at: DateTime<Utc>) -> Search {
        let mut search = db.create_search("u1", query, "", next_update_at).unwrap();
        search.next_update_at = next_update_at;
        db.update_search(&search).unwrap();
        search
    }

    #[test]
    fn test_list_due_in_order() {
        let db = Db::open(":memory:").unwrap();
        let now = Utc::now();
        let soon = schedule(&db, "later", at(now, 5));
        let a = schedule(&db, "a", at(now, -10));
        let b = schedule(&db, "b", at(now, -1));

        let due: Vec<String> = list_due(&db, now, 10)
            .unwrap()
            .into_iter()
            .map(|s| s.search_id)
            .collect();
        assert_eq!(due, vec![a.search_id, b.search_id]);
        assert!(!due.contains(&soon.search_id));
    }

    #[tokio::test]
    async fn test_success_advances_schedule() {
        let deps = deps(
            Arc::new(Timeline::long(1..=3, 10)),
            Arc::new(RecordingDetector::default()),
        );
        let now = Utc::now();
        let search = schedule(&deps.db, "rust", at(now, -1));

        let report = run_search(&deps, search.clone(), now).await.unwrap();
        assert_eq!(report.fetched, 3);

        let stored = deps.db.find_search("u1", &search.search_id).unwrap().unwrap();
        assert_eq!(stored.last_updated_at, Some(now));
        assert_eq!(stored.next_update_at, now + Duration::minutes(30));
        assert!(list_due(&deps.db, now, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_leaves_schedule_untouched() {
        let source = Arc::new(Scripted::new(vec![Err(Error::RateLimited)]));
        let deps = deps(source, Arc::new(RecordingDetector::default()));
        let now = Utc::now();
        let search = schedule(&deps.db, "rust", at(now, -1));

        let result = run_search(&deps, search.clone(), now).await;
        assert!(matches!(result, Err(Error::RateLimited)));

        let stored = deps.db.find_search("u1", &search.search_id).unwrap().unwrap();
        assert_eq!(stored.last_updated_at, None);
        assert_eq!(stored.next_update_at, search.next_update_at);
        assert_eq!(list_due(&deps.db, now, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pass_uses_owner_token() {
        let source = Arc::new(Timeline::long(1..=2, 10));
        let deps = deps(source.clone(), Arc::new(RecordingDetector::default()));
        let now = Utc::now();
        deps.db.register_user("u2", &access_token("u2"), now).unwrap();
        let mut search = deps.db.create_search("u2", "rust", "", now).unwrap();
        search.next_update_at = at(now, -1);
        deps.db.update_search(&search).unwrap();

        run_search(&deps, search, now).await.unwrap();

        let requests = source.requests.lock().unwrap();
        assert!(requests.iter().all(|r| r.token == access_token("u2")));
    }

    #[tokio::test]
    async fn test_missing_token_fails_pass() {
        let source = Arc::new(Timeline::long(1..=3, 10));
        let deps = deps(source.clone(), Arc::new(RecordingDetector::default()));
        let now = Utc::now();
        let mut search = deps.db.create_search("stranger", "rust", "", now).unwrap();
        search.next_update_at = at(now, -1);
        deps.db.update_search(&search).unwrap();

        let result = run_search(&deps, search.clone(), now).await;

        assert!(matches!(result, Err(Error::MissingToken(ref u)) if u == "stranger"));
        assert!(source.requests.lock().unwrap().is_empty());
        let stored = deps.db.find_search("stranger", &search.search_id).unwrap().unwrap();
        assert_eq!(stored.next_update_at, search.next_update_at);
        assert_eq!(stored.last_updated_at, None);
    }

    #[tokio::test]
    async fn test_deleted_mid_pass_leaves_no_tweets() {
        let deps = deps(
            Arc::new(Timeline::long(1..=3, 10)),
            Arc::new(RecordingDetector::default()),
        );
        let now = Utc::now();
        schedule(&deps.db, "rust", at(now, -1));
        let snapshot = list_due(&deps.db, now, 10).unwrap().remove(0);
        deps.db.delete_search("u1", &snapshot.search_id).unwrap();

        let result = run_search(&deps, snapshot.clone(), now).await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(deps.db.count_tweets(&snapshot.search_id).unwrap(), 0);
        assert!(list_due(&deps.db, now, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_pass_resumes_from_latest_id() {
        let source = Arc::new(Timeline::long(1..=4, 10));
        let deps = deps(source.clone(), Arc::new(RecordingDetector::default()));
        let now = Utc::now();
        let search = schedule(&deps.db, "rust", at(now, -1));

        run_search(&deps, search.clone(), now).await.unwrap();
        let later = now + Duration::minutes(31);
        let again = deps.db.find_search("u1", &search.search_id).unwrap().unwrap();
        let report = run_search(&deps, again, later).await.unwrap();

        assert_eq!(report.fetched, 0);
        let requests = source.requests.lock().unwrap();
        assert_eq!(requests.last().unwrap().since_id, Some(4));
    }

    #[tokio::test]
    async fn test_run_due_isolates_failures() {
        // Every search shares the scripted source: the first request fails,
        // the rest see an empty timeline.
        let source = Arc::new(Scripted::new(vec![Err(Error::upstream(
            "twitter search",
            "status 500",
        ))]));
        let deps = deps(source, Arc::new(RecordingDetector::default()));
        let now = Utc::now();
        for (i, query) in ["a", "b", "c"].into_iter().enumerate() {
            schedule(&deps.db, query, at(now, -(i as i64) - 1));
        }
        schedule(&deps.db, "not yet", at(now, 10));

        let report = run_due(&deps, now, 10).await.unwrap();

        assert_eq!(report.due, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(list_due(&deps.db, now, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_due_stores_tweets_per_search() {
        let page = vec![source_tweet(7, &long_text(7))];
        let source = Arc::new(Scripted::new(vec![Ok(page)]));
        let deps = deps(source, Arc::new(RecordingDetector::default()));
        let now = Utc::now();
        let search = schedule(&deps.db, "only", at(now, -1));

        let report = run_due(&deps, now, 10).await.unwrap();

        assert_eq!(report, TickReport { due: 1, succeeded: 1, failed: 0 });
        assert_eq!(deps.db.latest_tweet_id(&search.search_id).unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_run_due_with_nothing_due() {
        let deps = deps(
            Arc::new(Scripted::new(vec![])),
            Arc::new(RecordingDetector::default()),
        );
        let report = run_due(&deps, Utc::now(), 10).await.unwrap();
        assert_eq!(report, TickReport::default());
    }
}
