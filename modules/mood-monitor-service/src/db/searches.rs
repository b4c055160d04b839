//! Search rows: owner partition plus the due-queue index.

use super::Db;
use super::rows::{self, SearchRow};
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use mood_monitor_types::Search;
use rusqlite::OptionalExtension;

impl Db {
    /// Insert a new search. It is due immediately.
    pub fn create_search(
        &self,
        user_id: &str,
        query: &str,
        title: &str,
        now: DateTime<Utc>,
    ) -> Result<Search> {
        let search = Search {
            search_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            query: query.to_string(),
            next_update_at: now - Duration::days(365),
            last_updated_at: None,
            created_at: now,
            updated_at: now,
        };
        let row = SearchRow::from_search(&search)?;

        let conn = self.conn();
        conn.execute(
            "INSERT INTO items (pk, sk, kind, due_pk, due_sk, attrs)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                row.pk,
                row.sk,
                rows::KIND_SEARCH,
                row.due_pk,
                row.due_sk,
                row.attrs
            ],
        )?;
        Ok(search)
    }

    pub fn find_search(&self, user_id: &str, search_id: &str) -> Result<Option<Search>> {
        let conn = self.conn();
        let attrs: Option<String> = conn
            .query_row(
                "SELECT attrs FROM items WHERE pk = ?1 AND sk = ?2",
                [rows::user_pk(user_id), rows::search_sk(search_id)],
                |row| row.get(0),
            )
            .optional()?;
        attrs.as_deref().map(rows::decode_search).transpose()
    }

    /// All searches of one owner, oldest first
    pub fn list_searches_by_owner(&self, user_id: &str) -> Result<Vec<Search>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT attrs FROM items
             WHERE pk = ?1 AND sk LIKE 'SEARCH#%'",
        )?;
        let raw = stmt
            .query_map([rows::user_pk(user_id)], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut searches = raw
            .iter()
            .map(|attrs| rows::decode_search(attrs))
            .collect::<Result<Vec<_>>>()?;
        searches.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(searches)
    }

    /// Searches with `next_update_at <= now`, most overdue first
    pub fn list_due_searches(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Search>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT attrs FROM items
             WHERE due_pk = ?1 AND due_sk <= ?2
             ORDER BY due_sk ASC
             LIMIT ?3",
        )?;
        let raw = stmt
            .query_map(
                rusqlite::params![rows::SEARCH_DUE_PK, rows::sort_time(now), limit as i64],
                |row| row.get::<_, String>(0),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.iter().map(|attrs| rows::decode_search(attrs)).collect()
    }

    /// Persist query, title and schedule fields of an existing search.
    pub fn update_search(&self, search: &Search) -> Result<()> {
        let row = SearchRow::from_search(search)?;
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE items SET due_sk = ?1, attrs = ?2 WHERE pk = ?3 AND sk = ?4",
            rusqlite::params![row.due_sk, row.attrs, row.pk, row.sk],
        )?;
        if updated == 0 {
            return Err(Error::not_found(format!("search {}", search.search_id)));
        }
        Ok(())
    }

    /// Remove a search and the tweets collected for it.
    pub fn delete_search(&self, user_id: &str, search_id: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM items WHERE pk = ?1 AND sk = ?2",
            [rows::user_pk(user_id), rows::search_sk(search_id)],
        )?;
        if removed > 0 {
            tx.execute(
                "DELETE FROM items WHERE pk = ?1",
                [rows::tweets_pk(search_id)],
            )?;
        }
        tx.commit()?;
        Ok(removed > 0)
    }
}
