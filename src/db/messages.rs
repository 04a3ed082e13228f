use super::{message_from_row, Database, MESSAGE_COLUMNS};
use crate::error::StoreError;
use crate::models::{
    format_sqlite_utc, parse_sqlite_utc, ChannelStats, InsertOutcome, Message, RandomFilter,
    UpsertOutcome,
};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use std::collections::BTreeSet;

impl Database {
    /// Inserts a message unless its id is already stored.
    pub fn insert_new(&self, msg: &Message) -> Result<InsertOutcome, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO message (message_id, author_id, channel_id, timestamp, content, attachment_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                msg.message_id,
                msg.author_id,
                msg.channel_id,
                format_sqlite_utc(&msg.timestamp),
                msg.content,
                msg.attachment_url,
            ],
        )?;
        Ok(if changed == 0 {
            InsertOutcome::AlreadyPresent
        } else {
            InsertOutcome::Inserted
        })
    }

    /// Inserts the message or overwrites its content, attachment and timestamp.
    pub fn upsert(&self, msg: &Message) -> Result<UpsertOutcome, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let existed: bool = tx.query_row(
            "SELECT EXISTS (SELECT 1 FROM message WHERE message_id = ?1)",
            [msg.message_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO message (message_id, author_id, channel_id, timestamp, content, attachment_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (message_id) DO UPDATE SET
                timestamp = excluded.timestamp,
                content = excluded.content,
                attachment_url = excluded.attachment_url",
            params![
                msg.message_id,
                msg.author_id,
                msg.channel_id,
                format_sqlite_utc(&msg.timestamp),
                msg.content,
                msg.attachment_url,
            ],
        )?;
        tx.commit()?;
        Ok(if existed {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    /// Returns whether a row was removed.
    pub fn delete_message(&self, message_id: i64) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM message WHERE message_id = ?1", [message_id])?;
        Ok(changed > 0)
    }

    pub fn get_message(&self, message_id: i64) -> Result<Option<Message>, StoreError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM message WHERE message_id = ?1", MESSAGE_COLUMNS);
        Ok(conn
            .query_row(&sql, [message_id], message_from_row)
            .optional()?)
    }

    pub fn distinct_channels(&self) -> Result<BTreeSet<i64>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT DISTINCT channel_id FROM message")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        let mut channels = BTreeSet::new();
        for channel in rows {
            channels.insert(channel?);
        }
        Ok(channels)
    }

    pub fn message_count(&self) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM message", [], |row| row.get(0))?)
    }

    /// Oldest stored message of a channel, where backward paging resumes.
    pub fn oldest_in_channel(&self, channel_id: i64) -> Result<Option<Message>, StoreError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM message WHERE channel_id = ?1 ORDER BY message_id ASC LIMIT 1",
            MESSAGE_COLUMNS
        );
        Ok(conn.query_row(&sql, [channel_id], message_from_row).optional()?)
    }

    /// Newest stored message of a channel.
    pub fn newest_in_channel(&self, channel_id: i64) -> Result<Option<Message>, StoreError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM message WHERE channel_id = ?1 ORDER BY message_id DESC LIMIT 1",
            MESSAGE_COLUMNS
        );
        Ok(conn.query_row(&sql, [channel_id], message_from_row).optional()?)
    }

    pub fn delete_channel_messages(&self, channel_id: i64) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM message WHERE channel_id = ?1", [channel_id])?)
    }

    pub fn messages_by_author(&self, author_id: &str) -> Result<Vec<Message>, StoreError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM message WHERE author_id = ?1 ORDER BY message_id",
            MESSAGE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([author_id], message_from_row)?;
        let mut messages = Vec::new();
        for msg in rows {
            messages.push(msg?);
        }
        Ok(messages)
    }

    /// Deletes one message only if `author_id` wrote it.
    pub fn delete_author_message(&self, author_id: &str, message_id: i64) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM message WHERE message_id = ?1 AND author_id = ?2",
            params![message_id, author_id],
        )?;
        Ok(changed > 0)
    }

    pub fn channel_stats(&self) -> Result<Vec<ChannelStats>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT channel_id, COUNT(*), MIN(timestamp), MAX(timestamp)
             FROM message GROUP BY channel_id ORDER BY COUNT(*) DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            let first: Option<String> = row.get(2)?;
            let last: Option<String> = row.get(3)?;
            Ok(ChannelStats {
                channel_id: row.get(0)?,
                count: row.get(1)?,
                first_message: first.as_deref().and_then(parse_sqlite_utc),
                last_message: last.as_deref().and_then(parse_sqlite_utc),
            })
        })?;
        let mut stats = Vec::new();
        for s in rows {
            stats.push(s?);
        }
        Ok(stats)
    }

    pub fn count_where(&self, filter: &RandomFilter) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let (clause, params) = filter_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM message WHERE {}", clause);
        let count: i64 = conn.query_row(&sql, to_refs(&params).as_slice(), |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// Picks a message matching `filter`.
    ///
    /// Draws a pivot uniformly in the filtered id range and returns the first
    /// matching message at or after it. Messages that follow a sparse stretch
    /// of ids are favoured.
    pub fn sample_where<R: Rng + ?Sized>(
        &self,
        filter: &RandomFilter,
        rng: &mut R,
    ) -> Result<Option<Message>, StoreError> {
        let conn = self.conn()?;
        let Some((low, high)) = id_range(&conn, filter)? else {
            return Ok(None);
        };
        let pivot = rng.gen_range(low..=high);
        first_at_or_after(&conn, filter, pivot)
    }
}

fn filter_clause(filter: &RandomFilter) -> (String, Vec<Box<dyn ToSql>>) {
    let mut clause = String::from("channel_id = ?");
    let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(filter.channel_id)];

    if let Some(author_id) = &filter.author_id {
        clause.push_str(" AND author_id = ?");
        params.push(Box::new(author_id.clone()));
    }
    if let Some(min_length) = filter.min_length {
        clause.push_str(" AND length(content) >= ?");
        params.push(Box::new(min_length as i64));
    }
    if filter.attachment_only {
        clause.push_str(" AND attachment_url IS NOT NULL");
    }
    (clause, params)
}

fn to_refs(params: &[Box<dyn ToSql>]) -> Vec<&dyn ToSql> {
    params.iter().map(|p| p.as_ref()).collect()
}

fn id_range(conn: &Connection, filter: &RandomFilter) -> Result<Option<(i64, i64)>, StoreError> {
    let (clause, params) = filter_clause(filter);
    let sql = format!(
        "SELECT MIN(message_id), MAX(message_id) FROM message WHERE {}",
        clause
    );
    let (low, high): (Option<i64>, Option<i64>) =
        conn.query_row(&sql, to_refs(&params).as_slice(), |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
    Ok(low.zip(high))
}

fn first_at_or_after(
    conn: &Connection,
    filter: &RandomFilter,
    pivot: i64,
) -> Result<Option<Message>, StoreError> {
    let (clause, mut params) = filter_clause(filter);
    params.push(Box::new(pivot));
    let sql = format!(
        "SELECT {} FROM message WHERE {} AND message_id >= ? ORDER BY message_id LIMIT 1",
        MESSAGE_COLUMNS, clause
    );
    Ok(conn
        .query_row(&sql, to_refs(&params).as_slice(), message_from_row)
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::message;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_insert_new_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let msg = message(1, 10, "a", "hello world");

        assert_eq!(db.insert_new(&msg).unwrap(), InsertOutcome::Inserted);
        assert_eq!(db.insert_new(&msg).unwrap(), InsertOutcome::AlreadyPresent);

        // A differing duplicate does not overwrite the stored row
        let mut changed = msg.clone();
        changed.content = "something else".to_string();
        assert_eq!(db.insert_new(&changed).unwrap(), InsertOutcome::AlreadyPresent);

        assert_eq!(db.message_count().unwrap(), 1);
        assert_eq!(db.get_message(1).unwrap().unwrap(), msg);
    }

    #[test]
    fn test_upsert_converges_on_last_edit() {
        let db = Database::open_in_memory().unwrap();
        let mut msg = message(5, 10, "a", "first draft");

        // Edit seen before the create
        assert_eq!(db.upsert(&msg).unwrap(), UpsertOutcome::Inserted);

        msg.content = "second draft".to_string();
        assert_eq!(db.upsert(&msg).unwrap(), UpsertOutcome::Updated);
        msg.content = "final version".to_string();
        msg.attachment_url = Some("https://cdn.example/a.png".to_string());
        assert_eq!(db.upsert(&msg).unwrap(), UpsertOutcome::Updated);

        // A late create must not roll the edit back
        let late_create = message(5, 10, "a", "first draft");
        assert_eq!(db.insert_new(&late_create).unwrap(), InsertOutcome::AlreadyPresent);

        let stored = db.get_message(5).unwrap().unwrap();
        assert_eq!(stored.content, "final version");
        assert_eq!(stored.attachment_url.as_deref(), Some("https://cdn.example/a.png"));
        assert_eq!(db.message_count().unwrap(), 1);
        assert_eq!(db.search("final", false).unwrap(), vec![5]);
        assert!(db.search("draft", false).unwrap().is_empty());
    }

    #[test]
    fn test_delete_message() {
        let db = Database::open_in_memory().unwrap();
        db.insert_new(&message(1, 10, "a", "to be removed")).unwrap();

        assert!(db.delete_message(1).unwrap());
        assert!(!db.delete_message(1).unwrap());
        assert!(db.get_message(1).unwrap().is_none());
        assert!(db.search("removed", false).unwrap().is_empty());
    }

    #[test]
    fn test_channel_queries() {
        let db = Database::open_in_memory().unwrap();
        db.insert_new(&message(3, 20, "a", "c")).unwrap();
        db.insert_new(&message(1, 10, "a", "a")).unwrap();
        db.insert_new(&message(2, 10, "b", "b")).unwrap();

        assert_eq!(db.distinct_channels().unwrap(), BTreeSet::from([10, 20]));
        assert_eq!(db.oldest_in_channel(10).unwrap().unwrap().message_id, 1);
        assert!(db.oldest_in_channel(30).unwrap().is_none());
        assert!(db.newest_in_channel(30).unwrap().is_none());

        let stats = db.channel_stats().unwrap();
        assert_eq!(stats[0].channel_id, 10);
        assert_eq!(stats[0].count, 2);
        assert_eq!(stats[0].first_message, Some(message(1, 10, "a", "").timestamp));
        assert_eq!(stats[0].last_message, Some(message(2, 10, "b", "").timestamp));

        assert_eq!(db.delete_channel_messages(10).unwrap(), 2);
        assert_eq!(db.distinct_channels().unwrap(), BTreeSet::from([20]));
    }

    #[test]
    fn test_author_queries() {
        let db = Database::open_in_memory().unwrap();
        db.insert_new(&message(2, 10, "alice", "two")).unwrap();
        db.insert_new(&message(1, 10, "alice", "one")).unwrap();
        db.insert_new(&message(3, 10, "bob", "three")).unwrap();

        let ids: Vec<i64> = db
            .messages_by_author("alice")
            .unwrap()
            .iter()
            .map(|m| m.message_id)
            .collect();
        assert_eq!(ids, vec![1, 2]);

        // Someone else's message is left alone
        assert!(!db.delete_author_message("alice", 3).unwrap());
        assert!(db.delete_author_message("alice", 2).unwrap());
        assert_eq!(db.forget_author("alice").unwrap(), (1, false));
        assert_eq!(db.message_count().unwrap(), 1);
    }

    #[test]
    fn test_count_where() {
        let db = Database::open_in_memory().unwrap();
        db.insert_new(&message(1, 10, "a", "short")).unwrap();
        db.insert_new(&message(2, 10, "b", "a much longer message")).unwrap();
        let mut with_file = message(3, 10, "a", "");
        with_file.attachment_url = Some("https://cdn.example/f.png".to_string());
        db.insert_new(&with_file).unwrap();
        db.insert_new(&message(4, 20, "a", "another channel")).unwrap();

        assert_eq!(db.count_where(&RandomFilter::new(10)).unwrap(), 3);
        assert_eq!(db.count_where(&RandomFilter::new(20)).unwrap(), 1);
        assert_eq!(
            db.count_where(&RandomFilter::new(10).by_author("a".to_string())).unwrap(),
            2
        );
        assert_eq!(db.count_where(&RandomFilter::new(10).with_min_length(10)).unwrap(), 1);
        assert_eq!(db.count_where(&RandomFilter::new(10).attachments_only()).unwrap(), 1);
        assert_eq!(
            db.count_where(&RandomFilter::new(20).by_author("b".to_string()))
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_sample_where() {
        let db = Database::open_in_memory().unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        assert!(db
            .sample_where(&RandomFilter::new(1), &mut rng)
            .unwrap()
            .is_none());

        for id in [10, 20, 30, 1000] {
            let channel = if id == 20 { 2 } else { 1 };
            db.insert_new(&message(id, channel, "a", "text")).unwrap();
        }

        let filter = RandomFilter::new(1);
        for _ in 0..50 {
            let picked = db.sample_where(&filter, &mut rng).unwrap().unwrap();
            assert_eq!(picked.channel_id, 1);
            assert!([10, 30, 1000].contains(&picked.message_id));
        }

        // A single candidate is always found
        let only = RandomFilter::new(2);
        assert_eq!(db.sample_where(&only, &mut rng).unwrap().unwrap().message_id, 20);
    }

    #[test]
    fn test_sample_stays_in_its_channel() {
        let db = Database::open_in_memory().unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        for id in 1..=20 {
            db.insert_new(&message(id, 10, "a", "public")).unwrap();
            db.insert_new(&message(100 + id, 99, "b", "staff-only secret")).unwrap();
        }

        for _ in 0..50 {
            let picked = db.sample_where(&RandomFilter::new(10), &mut rng).unwrap().unwrap();
            assert_eq!(picked.channel_id, 10);
            assert_eq!(picked.content, "public");
        }
    }
}
