//! User profile rows holding each owner's Twitter access token.

use super::Db;
use super::rows;
use crate::error::Result;
use crate::twitter_api::AccessToken;
use chrono::{DateTime, Utc};
use mood_monitor_types::UserProfile;
use rusqlite::OptionalExtension;

impl Db {
    /// Store the user's access token, replacing any earlier one.
    /// Returns the profile and whether it was newly created.
    pub fn register_user(
        &self,
        user_id: &str,
        token: &AccessToken,
        now: DateTime<Utc>,
    ) -> Result<(UserProfile, bool)> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT attrs FROM items WHERE pk = ?1 AND sk = ?2",
                [rows::user_pk(user_id), rows::USER_PROFILE_SK.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let created_at = match existing.as_deref().map(rows::decode_user).transpose()? {
            Some((profile, _)) => profile.created_at,
            None => now,
        };

        let profile = UserProfile {
            user_id: user_id.to_string(),
            created_at,
            updated_at: now,
        };
        tx.execute(
            "INSERT OR REPLACE INTO items (pk, sk, kind, attrs) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                rows::user_pk(user_id),
                rows::USER_PROFILE_SK,
                rows::KIND_USER,
                rows::encode_user(&profile, token)?
            ],
        )?;
        tx.commit()?;

        Ok((profile, existing.is_none()))
    }

    fn find_user_row(&self, user_id: &str) -> Result<Option<(UserProfile, AccessToken)>> {
        let conn = self.conn();
        let attrs: Option<String> = conn
            .query_row(
                "SELECT attrs FROM items WHERE pk = ?1 AND sk = ?2",
                [rows::user_pk(user_id), rows::USER_PROFILE_SK.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        attrs.as_deref().map(rows::decode_user).transpose()
    }

    pub fn find_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.find_user_row(user_id)?.map(|(profile, _)| profile))
    }

    /// Token used for every collection pass over this user's searches
    pub fn user_token(&self, user_id: &str) -> Result<Option<AccessToken>> {
        Ok(self.find_user_row(user_id)?.map(|(_, token)| token))
    }
}
