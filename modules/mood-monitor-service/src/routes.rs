//! Axum route handlers for the mood monitor API.
//!
//! Every route is scoped to the caller named by the identity header.

use crate::db::{Db, TweetQuery};
use crate::error::Error;
use crate::identity;
use crate::twitter_api::AccessToken;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use mood_monitor_types::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;
const QUERY_LEN: std::ops::RangeInclusive<usize> = 3..=100;
const MAX_TITLE_LEN: usize = 100;
const TOKEN_LEN: std::ops::RangeInclusive<usize> = 2..=500;

pub struct AppState {
    pub db: Arc<Db>,
    pub start_time: Instant,
    pub last_tick_at: Arc<Mutex<Option<String>>>,
    pub tick_secs: u64,
    pub worker_enabled: bool,
}

type Reply<T> = (StatusCode, Json<RpcResponse<T>>);

fn ok<T: Serialize>(data: T) -> Reply<T> {
    (StatusCode::OK, Json(RpcResponse::ok(data)))
}

fn fail<T: Serialize>(e: Error) -> Reply<T> {
    match e {
        Error::Validation(errors) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(RpcResponse::invalid(errors)),
        ),
        Error::NotFound(what) => (
            StatusCode::NOT_FOUND,
            Json(RpcResponse::err(format!("{} not found", what))),
        ),
        Error::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            Json(RpcResponse::err("missing X-User-Id header")),
        ),
        other => {
            log::error!("[ROUTES] {}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(RpcResponse::err(other.to_string())),
            )
        }
    }
}

/// Trimmed `(query, title)` or a field → message map.
pub fn validate_create(req: &CreateSearchRequest) -> Result<(String, String), Error> {
    let mut errors = BTreeMap::new();

    let query = req.query.trim();
    let query_len = query.chars().count();
    if query_len == 0 {
        errors.insert("query".to_string(), "query is required".to_string());
    } else if !QUERY_LEN.contains(&query_len) {
        errors.insert(
            "query".to_string(),
            format!(
                "query must be {} to {} characters",
                QUERY_LEN.start(),
                QUERY_LEN.end()
            ),
        );
    }

    let title = req.title.as_deref().unwrap_or("").trim();
    if title.chars().count() > MAX_TITLE_LEN {
        errors.insert(
            "title".to_string(),
            format!("title must be at most {} characters", MAX_TITLE_LEN),
        );
    }

    if errors.is_empty() {
        Ok((query.to_string(), title.to_string()))
    } else {
        Err(Error::Validation(errors))
    }
}

/// Access token pair from a registration body, or a field → message map.
pub fn validate_register(req: &RegisterUserRequest) -> Result<AccessToken, Error> {
    let mut errors = BTreeMap::new();
    let fields = [
        ("twitter_access_token", req.twitter_access_token.trim()),
        ("twitter_access_token_secret", req.twitter_access_token_secret.trim()),
    ];
    for (field, value) in fields {
        let len = value.chars().count();
        if len == 0 {
            errors.insert(field.to_string(), format!("{} is required", field));
        } else if !TOKEN_LEN.contains(&len) {
            errors.insert(
                field.to_string(),
                format!(
                    "{} must be {} to {} characters",
                    field,
                    TOKEN_LEN.start(),
                    TOKEN_LEN.end()
                ),
            );
        }
    }

    if errors.is_empty() {
        Ok(AccessToken {
            token: fields[0].1.to_string(),
            secret: fields[1].1.to_string(),
        })
    } else {
        Err(Error::Validation(errors))
    }
}

/// Turn query-string parameters into a store query.
pub fn tweet_query(search_id: &str, params: &ListTweetsParams) -> Result<TweetQuery, Error> {
    let sentiment = match params.sentiment_label.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match SentimentFilter::parse(raw) {
            Some(filter) => Some(filter),
            None => {
                let mut errors = BTreeMap::new();
                errors.insert(
                    "sentiment_label".to_string(),
                    format!("unknown sentiment label: {}", raw),
                );
                return Err(Error::Validation(errors));
            }
        },
    };

    Ok(TweetQuery {
        search_id: search_id.to_string(),
        until_id: params.until_id,
        limit: params
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE),
        sentiment,
    })
}

// =====================================================
// User Endpoints
// =====================================================

// GET /users/@me
pub async fn users_me_get(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Reply<UserProfile> {
    let user_id = match identity::user_id(&headers) {
        Ok(id) => id,
        Err(e) => return fail(e),
    };
    match state.db.find_user(&user_id) {
        Ok(Some(profile)) => ok(profile),
        Ok(None) => fail(Error::not_found(format!("user {}", user_id))),
        Err(e) => fail(e),
    }
}

// POST /users/@me
pub async fn users_me_register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RegisterUserRequest>,
) -> Reply<UserProfile> {
    let user_id = match identity::user_id(&headers) {
        Ok(id) => id,
        Err(e) => return fail(e),
    };
    let token = match validate_register(&req) {
        Ok(token) => token,
        Err(e) => return fail(e),
    };

    match state.db.register_user(&user_id, &token, chrono::Utc::now()) {
        Ok((profile, true)) => {
            log::info!("[ROUTES] registered user {}", user_id);
            (StatusCode::CREATED, Json(RpcResponse::ok(profile)))
        }
        Ok((profile, false)) => {
            log::info!("[ROUTES] user {} replaced their access token", user_id);
            ok(profile)
        }
        Err(e) => fail(e),
    }
}

// =====================================================
// Search Endpoints
// =====================================================

// GET /searches
pub async fn searches_list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Reply<Vec<Search>> {
    let user_id = match identity::user_id(&headers) {
        Ok(id) => id,
        Err(e) => return fail(e),
    };
    match state.db.list_searches_by_owner(&user_id) {
        Ok(searches) => ok(searches),
        Err(e) => fail(e),
    }
}

// GET /searches/:id
pub async fn searches_get(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(search_id): Path<String>,
) -> Reply<Search> {
    let user_id = match identity::user_id(&headers) {
        Ok(id) => id,
        Err(e) => return fail(e),
    };
    match state.db.find_search(&user_id, &search_id) {
        Ok(Some(search)) => ok(search),
        Ok(None) => fail(Error::not_found(format!("search {}", search_id))),
        Err(e) => fail(e),
    }
}

// POST /searches
pub async fn searches_create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateSearchRequest>,
) -> Reply<Search> {
    let user_id = match identity::user_id(&headers) {
        Ok(id) => id,
        Err(e) => return fail(e),
    };
    let (query, title) = match validate_create(&req) {
        Ok(fields) => fields,
        Err(e) => return fail(e),
    };

    match state
        .db
        .create_search(&user_id, &query, &title, chrono::Utc::now())
    {
        Ok(search) => {
            log::info!(
                "[ROUTES] user {} created search {} ({})",
                user_id,
                search.search_id,
                search.query
            );
            (StatusCode::CREATED, Json(RpcResponse::ok(search)))
        }
        Err(e) => fail(e),
    }
}

// DELETE /searches/:id
pub async fn searches_delete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(search_id): Path<String>,
) -> Reply<bool> {
    let user_id = match identity::user_id(&headers) {
        Ok(id) => id,
        Err(e) => return fail(e),
    };
    match state.db.delete_search(&user_id, &search_id) {
        Ok(true) => ok(true),
        Ok(false) => fail(Error::not_found(format!("search {}", search_id))),
        Err(e) => fail(e),
    }
}

// =====================================================
// Tweet Endpoints
// =====================================================

// GET /searches/:id/tweets
pub async fn tweets_list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(search_id): Path<String>,
    Query(params): Query<ListTweetsParams>,
) -> Reply<TweetPage> {
    let user_id = match identity::user_id(&headers) {
        Ok(id) => id,
        Err(e) => return fail(e),
    };
    let query = match tweet_query(&search_id, &params) {
        Ok(q) => q,
        Err(e) => return fail(e),
    };

    match state.db.find_search(&user_id, &search_id) {
        Ok(Some(_)) => {}
        Ok(None) => return fail(Error::not_found(format!("search {}", search_id))),
        Err(e) => return fail(e),
    }

    match state.db.list_tweet_page(&query) {
        Ok(page) => ok(page),
        Err(e) => fail(e),
    }
}

// =====================================================
// Service Endpoints
// =====================================================

// GET /status
pub async fn status(State(state): State<Arc<AppState>>) -> Reply<ServiceStatus> {
    let stats = match state.db.stats(chrono::Utc::now()) {
        Ok(stats) => stats,
        Err(e) => {
            log::warn!("[ROUTES] stats failed: {}", e);
            Default::default()
        }
    };
    let last_tick = state.last_tick_at.lock().await.clone();

    let status = ServiceStatus {
        running: true,
        worker_enabled: state.worker_enabled,
        uptime_secs: state.start_time.elapsed().as_secs(),
        searches: stats.searches,
        due_searches: stats.due_searches,
        total_tweets: stats.tweets,
        last_tick_at: last_tick,
        tick_secs: state.tick_secs,
    };

    ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::tweet;
    use axum::http::HeaderValue;

    fn state() -> Arc<AppState> {
        Arc::new(AppState {
            db: Arc::new(Db::open(":memory:").unwrap()),
            start_time: Instant::now(),
            last_tick_at: Arc::new(Mutex::new(None)),
            tick_secs: 60,
            worker_enabled: false,
        })
    }

    fn caller(user_id: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(identity::USER_ID_HEADER, HeaderValue::from_static(user_id));
        headers
    }

    fn create_req(query: &str, title: Option<&str>) -> CreateSearchRequest {
        CreateSearchRequest {
            query: query.to_string(),
            title: title.map(str::to_string),
        }
    }

    #[test]
    fn test_validate_create() {
        let (query, title) = validate_create(&create_req("  rust lang ", None)).unwrap();
        assert_eq!(query, "rust lang");
        assert_eq!(title, "");

        let Err(Error::Validation(errors)) = validate_create(&create_req("", None)) else {
            panic!("empty query accepted");
        };
        assert_eq!(errors["query"], "query is required");

        let long_title = "t".repeat(101);
        let Err(Error::Validation(errors)) =
            validate_create(&create_req("ab", Some(&long_title)))
        else {
            panic!("invalid request accepted");
        };
        assert!(errors.contains_key("query"));
        assert!(errors.contains_key("title"));

        assert!(validate_create(&create_req(&"q".repeat(100), Some(&"t".repeat(100)))).is_ok());
        assert!(validate_create(&create_req(&"q".repeat(101), None)).is_err());
    }

    #[test]
    fn test_tweet_query_defaults_and_clamps() {
        let q = tweet_query("s1", &ListTweetsParams::default()).unwrap();
        assert_eq!(q.limit, 20);
        assert_eq!(q.sentiment, None);

        let params = ListTweetsParams {
            limit: Some(1000),
            until_id: Some(42),
            sentiment_label: Some("pos_or_neg".to_string()),
        };
        let q = tweet_query("s1", &params).unwrap();
        assert_eq!(q.limit, 100);
        assert_eq!(q.until_id, Some(42));
        assert_eq!(q.sentiment, Some(SentimentFilter::Polarized));

        let zero = ListTweetsParams {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(tweet_query("s1", &zero).unwrap().limit, 1);
    }

    #[test]
    fn test_unknown_label_rejected() {
        let params = ListTweetsParams {
            sentiment_label: Some("ANGRY".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            tweet_query("s1", &params),
            Err(Error::Validation(_))
        ));
    }

    fn register_req(token: &str, secret: &str) -> RegisterUserRequest {
        RegisterUserRequest {
            twitter_access_token: token.to_string(),
            twitter_access_token_secret: secret.to_string(),
        }
    }

    #[test]
    fn test_validate_register() {
        let token = validate_register(&register_req(" tok ", "sec")).unwrap();
        assert_eq!(token.token, "tok");
        assert_eq!(token.secret, "sec");

        let Err(Error::Validation(errors)) = validate_register(&register_req("", "x")) else {
            panic!("expected validation error");
        };
        assert_eq!(errors["twitter_access_token"], "twitter_access_token is required");
        assert!(errors["twitter_access_token_secret"].contains("2 to 500"));

        let long = "t".repeat(501);
        assert!(validate_register(&register_req(&long, "secret")).is_err());
    }

    #[tokio::test]
    async fn test_register_then_get_user() {
        let state = state();
        let (code, _) = users_me_get(State(state.clone()), caller("alice")).await;
        assert_eq!(code, StatusCode::NOT_FOUND);

        let (code, Json(body)) = users_me_register(
            State(state.clone()),
            caller("alice"),
            Json(register_req("tok-1", "sec-1")),
        )
        .await;
        assert_eq!(code, StatusCode::CREATED);
        assert_eq!(body.data.unwrap().user_id, "alice");

        let (code, _) = users_me_register(
            State(state.clone()),
            caller("alice"),
            Json(register_req("tok-2", "sec-2")),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        let token = state.db.user_token("alice").unwrap().unwrap();
        assert_eq!(token.token, "tok-2");

        let (code, Json(body)) = users_me_get(State(state), caller("alice")).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body.data.unwrap().user_id, "alice");
    }

    #[tokio::test]
    async fn test_register_rejects_missing_secret() {
        let state = state();
        let (code, Json(body)) = users_me_register(
            State(state.clone()),
            caller("alice"),
            Json(register_req("tok", "")),
        )
        .await;
        assert_eq!(code, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body.errors.unwrap().contains_key("twitter_access_token_secret"));
        assert_eq!(state.db.find_user("alice").unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_and_get_search() {
        let state = state();
        let (code, Json(created)) = searches_create(
            State(state.clone()),
            caller("alice"),
            Json(create_req("rust", Some("Rust"))),
        )
        .await;
        assert_eq!(code, StatusCode::CREATED);
        let created = created.data.unwrap();

        let (code, Json(found)) = searches_get(
            State(state.clone()),
            caller("alice"),
            Path(created.search_id.clone()),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(found.data.unwrap().title, "Rust");

        let (code, _) =
            searches_get(State(state), caller("bob"), Path(created.search_id)).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_body() {
        let (code, Json(body)) =
            searches_create(State(state()), caller("alice"), Json(create_req("x", None))).await;
        assert_eq!(code, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!body.success);
        assert!(body.errors.unwrap().contains_key("query"));
    }

    #[tokio::test]
    async fn test_missing_identity() {
        let (code, _) = searches_list(State(state()), HeaderMap::new()).await;
        assert_eq!(code, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_list_tweets_page() {
        let state = state();
        let search = state
            .db
            .create_search("alice", "rust", "", chrono::Utc::now())
            .unwrap();
        let tweets: Vec<Tweet> = (1..=11)
            .map(|id| tweet(&search.search_id, id, SentimentLabel::Neutral))
            .collect();
        state.db.upsert_tweets(&tweets).unwrap();

        let params = ListTweetsParams {
            limit: Some(10),
            ..Default::default()
        };
        let (code, Json(body)) = tweets_list(
            State(state.clone()),
            caller("alice"),
            Path(search.search_id.clone()),
            Query(params),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        let page = body.data.unwrap();
        assert_eq!(page.tweets.len(), 10);
        assert!(page.has_more);
        assert_eq!(page.tweets[0].tweet_id, 11);

        let (code, _) = tweets_list(
            State(state),
            caller("bob"),
            Path(search.search_id),
            Query(ListTweetsParams::default()),
        )
        .await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_search() {
        let state = state();
        let search = state
            .db
            .create_search("alice", "rust", "", chrono::Utc::now())
            .unwrap();

        let (code, _) = searches_delete(
            State(state.clone()),
            caller("bob"),
            Path(search.search_id.clone()),
        )
        .await;
        assert_eq!(code, StatusCode::NOT_FOUND);

        let (code, Json(body)) =
            searches_delete(State(state.clone()), caller("alice"), Path(search.search_id)).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body.data, Some(true));

        let (_, Json(list)) = searches_list(State(state), caller("alice")).await;
        assert!(list.data.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status() {
        let state = state();
        state
            .db
            .create_search("alice", "rust", "", chrono::Utc::now())
            .unwrap();
        *state.last_tick_at.lock().await = Some("2026-01-01T00:00:00+00:00".to_string());

        let (code, Json(body)) = status(State(state)).await;
        assert_eq!(code, StatusCode::OK);
        let status = body.data.unwrap();
        assert_eq!(status.searches, 1);
        assert_eq!(status.due_searches, 1);
        assert_eq!(status.tick_secs, 60);
        assert!(!status.worker_enabled);
        assert!(status.last_tick_at.is_some());
    }
}
