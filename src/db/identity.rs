use super::Database;
use crate::error::StoreError;
use crate::models::Identity;
use rusqlite::{params, OptionalExtension};

impl Database {
    /// Links a pseudonymous id to its Discord user. Returns false when already linked.
    pub fn register_identity(&self, author_id: &str, real_author_id: u64) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO identity (author_id, real_author_id) VALUES (?1, ?2)",
            params![author_id, real_author_id],
        )?;
        Ok(changed > 0)
    }

    pub fn unregister_identity(&self, author_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM identity WHERE author_id = ?1", [author_id])?;
        Ok(changed > 0)
    }

    /// Deletes every message of `author_id` and its identity link, both or
    /// neither. Returns the number of messages removed and whether a link existed.
    pub fn forget_author(&self, author_id: &str) -> Result<(usize, bool), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let messages = tx.execute("DELETE FROM message WHERE author_id = ?1", [author_id])?;
        let identity = tx.execute("DELETE FROM identity WHERE author_id = ?1", [author_id])?;
        tx.commit()?;
        Ok((messages, identity > 0))
    }

    pub fn get_identity(&self, author_id: &str) -> Result<Option<Identity>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT author_id, real_author_id FROM identity WHERE author_id = ?1",
                [author_id],
                |row| {
                    Ok(Identity {
                        author_id: row.get(0)?,
                        real_author_id: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }
}
