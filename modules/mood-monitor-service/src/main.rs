//! Mood Monitor Service: collects tweets for saved searches, scores their
//! sentiment and serves them back per search.
//!
//! Default: http://127.0.0.1:9103/

mod collector;
mod config;
mod db;
mod deps;
mod error;
mod filter;
mod identity;
mod retry;
mod routes;
mod scheduler;
mod sentiment;
mod twitter_api;
mod worker;

use config::Config;
use deps::Deps;
use routes::AppState;
use sentiment::{FixedDetector, HttpDetector, SentimentDetector};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = Config::from_env();

    log::info!("Opening database at: {}", config.db_path);
    let database = Arc::new(db::Db::open(&config.db_path).expect("Failed to open database"));

    let last_tick_at: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let consumer = twitter_api::ConsumerKeys::from_env();

    let state = Arc::new(AppState {
        db: database.clone(),
        start_time: Instant::now(),
        last_tick_at: last_tick_at.clone(),
        tick_secs: config.tick_secs,
        worker_enabled: consumer.is_some(),
    });

    // Spawn background worker if the Twitter app keys are configured
    if let Some(consumer) = consumer {
        let client = reqwest::Client::new();
        let detector: Arc<dyn SentimentDetector> = match &config.sentiment_api_url {
            Some(url) => {
                log::info!("Sentiment detection via {}", url);
                Arc::new(HttpDetector::new(client.clone(), url.clone()))
            }
            None => {
                log::warn!("SENTIMENT_API_URL not set, every tweet scores neutral");
                Arc::new(FixedDetector)
            }
        };
        let deps = Deps::new(
            database.clone(),
            Arc::new(twitter_api::TwitterSearchClient::new(client, consumer)),
            detector,
            config.policy.clone(),
        );

        let worker_last_tick = last_tick_at.clone();
        let (tick_secs, due_limit) = (config.tick_secs, config.due_limit);
        tokio::spawn(async move {
            worker::run_worker(deps, tick_secs, due_limit, worker_last_tick).await;
        });
        log::info!("Background worker started (tick interval: {}s)", tick_secs);
    } else {
        log::warn!("TWITTER_CONSUMER_KEY/SECRET not set, background worker disabled");
    }

    let cors = tower_http::cors::CorsLayer::permissive();

    let app = axum::Router::new()
        // Users
        .route(
            "/users/@me",
            axum::routing::get(routes::users_me_get).post(routes::users_me_register),
        )
        // Searches
        .route(
            "/searches",
            axum::routing::get(routes::searches_list).post(routes::searches_create),
        )
        .route(
            "/searches/:id",
            axum::routing::get(routes::searches_get).delete(routes::searches_delete),
        )
        // Tweets
        .route(
            "/searches/:id/tweets",
            axum::routing::get(routes::tweets_list),
        )
        // Service
        .route("/status", axum::routing::get(routes::status))
        .with_state(state)
        .layer(cors);

    let addr = format!("127.0.0.1:{}", config.port);
    log::info!("Mood Monitor Service listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app).await.expect("Server error");
}
