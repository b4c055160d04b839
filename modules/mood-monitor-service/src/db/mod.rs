//! SQLite-backed item store for users, searches and tweets.
//!
//! All entities live in one `items` table keyed by `(pk, sk)`. A user's
//! profile row and their searches share the `USER#<id>` partition. Two partial
//! indexes give the secondary access paths:
//!
//! - `idx_items_due (due_pk, due_sk)`: every search row carries the same
//!   `due_pk` and its `next_update_at` as `due_sk`, which makes a single
//!   time-ordered queue across all owners.
//! - `idx_items_sentiment (sentiment_pk, sk)`: tweets are bucketed per search
//!   by sentiment so filtered listings never touch unrelated rows.

mod rows;
mod searches;
mod tweets;
mod users;

pub use tweets::TweetQuery;

use crate::error::Result;
use chrono::{DateTime, Utc};
use mood_monitor_types::StoreStats;
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn open(path: &str) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.create_tables()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the guard cannot leave SQLite half-written.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.conn();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS items (
                pk TEXT NOT NULL,
                sk TEXT NOT NULL,
                kind TEXT NOT NULL,
                due_pk TEXT,
                due_sk TEXT,
                sentiment_pk TEXT,
                label TEXT,
                expires_at INTEGER,
                attrs TEXT NOT NULL,
                PRIMARY KEY (pk, sk)
            ) WITHOUT ROWID",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_items_due ON items(due_pk, due_sk)
             WHERE due_pk IS NOT NULL",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_items_sentiment ON items(sentiment_pk, sk)
             WHERE sentiment_pk IS NOT NULL",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_items_expires ON items(expires_at)
             WHERE expires_at IS NOT NULL",
            [],
        )?;

        Ok(())
    }

    /// Delete every row whose TTL instant has passed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn();
        let deleted = conn.execute(
            "DELETE FROM items WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            [now.timestamp()],
        )?;
        Ok(deleted)
    }

    pub fn stats(&self, now: DateTime<Utc>) -> Result<StoreStats> {
        let conn = self.conn();
        let count = |sql: &str, params: &[&dyn rusqlite::ToSql]| -> rusqlite::Result<i64> {
            conn.query_row(sql, params, |row| row.get(0))
        };

        Ok(StoreStats {
            searches: count("SELECT COUNT(*) FROM items WHERE kind = 'search'", &[])?,
            due_searches: count(
                "SELECT COUNT(*) FROM items WHERE due_pk = ?1 AND due_sk <= ?2",
                &[&rows::SEARCH_DUE_PK, &rows::sort_time(now)],
            )?,
            tweets: count("SELECT COUNT(*) FROM items WHERE kind = 'tweet'", &[])?,
            undetected_tweets: count(
                "SELECT COUNT(*) FROM items WHERE kind = 'tweet' AND label = 'UNDETECTED'",
                &[],
            )?,
        })
    }
}
