use super::{fts_phrase, Database};
use crate::error::StoreError;
use crate::models::MessageDay;
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Match count of one author for an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankRow {
    pub author_id: String,
    /// Set when the author registered their identity.
    pub real_author_id: Option<u64>,
    pub count: i64,
}

impl Database {
    /// Recomputes the per-day totals from scratch.
    ///
    /// With `until`, only days strictly before it are counted so that a day
    /// still in progress is not frozen with a partial total.
    pub fn refresh_message_days(&self, until: Option<NaiveDate>) -> Result<usize, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM messageday", [])?;
        let inserted = tx.execute(
            "INSERT INTO messageday (date, count)
             SELECT DATE(timestamp) AS day, COUNT(*) FROM message
             WHERE ?1 IS NULL OR DATE(timestamp) < ?1
             GROUP BY day",
            [until.map(|d| d.format(DATE_FORMAT).to_string())],
        )?;
        tx.commit()?;
        Ok(inserted)
    }

    /// First and last day with a stored total.
    pub fn message_day_bounds(&self) -> Result<Option<(NaiveDate, NaiveDate)>, StoreError> {
        let conn = self.conn()?;
        let bounds: Option<(Option<String>, Option<String>)> = conn
            .query_row("SELECT MIN(date), MAX(date) FROM messageday", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;
        let Some((Some(first), Some(last))) = bounds else {
            return Ok(None);
        };
        Ok(parse_date(&first).zip(parse_date(&last)))
    }

    pub fn message_days(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<MessageDay>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT date, count FROM messageday WHERE date BETWEEN ?1 AND ?2 ORDER BY date",
        )?;
        let rows = stmt.query_map(
            params![start.format(DATE_FORMAT).to_string(), end.format(DATE_FORMAT).to_string()],
            |row| {
                Ok(MessageDay {
                    date: date_column(row, 0)?,
                    count: row.get(1)?,
                })
            },
        )?;
        let mut days = Vec::new();
        for day in rows {
            days.push(day?);
        }
        Ok(days)
    }

    /// Per-day message count of one channel, read from the messages
    /// themselves since daily totals are kept per guild only.
    pub fn channel_message_days(
        &self,
        channel_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MessageDay>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DATE(timestamp) AS day, COUNT(*) FROM message
             WHERE channel_id = ?1 AND DATE(timestamp) BETWEEN ?2 AND ?3
             GROUP BY day ORDER BY day",
        )?;
        let rows = stmt.query_map(
            params![
                channel_id,
                start.format(DATE_FORMAT).to_string(),
                end.format(DATE_FORMAT).to_string()
            ],
            |row| {
                Ok(MessageDay {
                    date: date_column(row, 0)?,
                    count: row.get(1)?,
                })
            },
        )?;
        let mut days = Vec::new();
        for day in rows {
            days.push(day?);
        }
        Ok(days)
    }

    /// Per-day count of messages containing `expression`, ascending by day.
    pub fn daily_match_counts(
        &self,
        expression: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MessageDay>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DATE(m.timestamp) AS day, COUNT(*)
             FROM messageindex
             JOIN message m ON m.message_id = messageindex.rowid
             WHERE messageindex MATCH ?1 AND DATE(m.timestamp) BETWEEN ?2 AND ?3
             GROUP BY day ORDER BY day",
        )?;
        let rows = stmt.query_map(
            params![
                fts_phrase(expression),
                start.format(DATE_FORMAT).to_string(),
                end.format(DATE_FORMAT).to_string()
            ],
            |row| {
                Ok(MessageDay {
                    date: date_column(row, 0)?,
                    count: row.get(1)?,
                })
            },
        )?;
        let mut days = Vec::new();
        for day in rows {
            days.push(day?);
        }
        Ok(days)
    }

    /// Authors who used `expression`, most matches first.
    pub fn author_match_counts(&self, expression: &str) -> Result<Vec<RankRow>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT m.author_id, i.real_author_id, COUNT(*) AS matches
             FROM messageindex
             JOIN message m ON m.message_id = messageindex.rowid
             LEFT JOIN identity i ON i.author_id = m.author_id
             WHERE messageindex MATCH ?1
             GROUP BY m.author_id
             ORDER BY matches DESC, m.author_id",
        )?;
        let rows = stmt.query_map([fts_phrase(expression)], |row| {
            Ok(RankRow {
                author_id: row.get(0)?,
                real_author_id: row.get(1)?,
                count: row.get(2)?,
            })
        })?;
        let mut counts = Vec::new();
        for r in rows {
            counts.push(r?);
        }
        Ok(counts)
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()
}

fn date_column(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    parse_date(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("invalid date '{}'", raw).into(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::message;
    use crate::models::Message;
    use chrono::{TimeZone, Utc};

    fn at(id: i64, day: u32, hour: u32, author: &str, content: &str) -> Message {
        let mut msg = message(id, 1, author, content);
        msg.timestamp = Utc.with_ymd_and_hms(2023, 3, day, hour, 0, 0).unwrap();
        msg
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 3, day).unwrap()
    }

    #[test]
    fn test_refresh_message_days() {
        let db = Database::open_in_memory().unwrap();
        db.insert_new(&at(1, 1, 8, "a", "x")).unwrap();
        db.insert_new(&at(2, 1, 23, "a", "x")).unwrap();
        db.insert_new(&at(3, 3, 0, "b", "x")).unwrap();
        db.insert_new(&at(4, 5, 12, "b", "x")).unwrap();

        assert_eq!(db.refresh_message_days(Some(date(5))).unwrap(), 2);
        assert_eq!(db.message_day_bounds().unwrap(), Some((date(1), date(3))));
        assert_eq!(
            db.message_days(date(1), date(31)).unwrap(),
            vec![
                MessageDay { date: date(1), count: 2 },
                MessageDay { date: date(3), count: 1 },
            ]
        );

        // Full recompute replaces previous totals
        db.delete_message(1).unwrap();
        assert_eq!(db.refresh_message_days(None).unwrap(), 3);
        assert_eq!(db.message_days(date(1), date(1)).unwrap()[0].count, 1);
        assert_eq!(db.message_day_bounds().unwrap(), Some((date(1), date(5))));
    }

    #[test]
    fn test_message_day_bounds_empty() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.message_day_bounds().unwrap(), None);
    }

    #[test]
    fn test_channel_message_days() {
        let db = Database::open_in_memory().unwrap();
        db.insert_new(&at(1, 1, 8, "a", "x")).unwrap();
        db.insert_new(&at(2, 1, 9, "a", "x")).unwrap();
        db.insert_new(&at(3, 4, 9, "a", "x")).unwrap();
        let mut elsewhere = at(4, 1, 9, "a", "x");
        elsewhere.channel_id = 2;
        db.insert_new(&elsewhere).unwrap();

        assert_eq!(
            db.channel_message_days(1, date(1), date(3)).unwrap(),
            vec![MessageDay { date: date(1), count: 2 }]
        );
        assert_eq!(db.channel_message_days(2, date(1), date(31)).unwrap().len(), 1);
        assert!(db.channel_message_days(3, date(1), date(31)).unwrap().is_empty());
    }

    #[test]
    fn test_daily_match_counts() {
        let db = Database::open_in_memory().unwrap();
        db.insert_new(&at(1, 1, 8, "a", "abeille")).unwrap();
        db.insert_new(&at(2, 1, 9, "b", "une abeille")).unwrap();
        db.insert_new(&at(3, 2, 9, "b", "guêpe")).unwrap();
        db.insert_new(&at(4, 4, 9, "b", "abeilles")).unwrap();

        assert_eq!(
            db.daily_match_counts("abeille", date(1), date(3)).unwrap(),
            vec![MessageDay { date: date(1), count: 2 }]
        );
        assert_eq!(db.daily_match_counts("abeille", date(1), date(4)).unwrap().len(), 2);
    }

    #[test]
    fn test_author_match_counts() {
        let db = Database::open_in_memory().unwrap();
        let mut id = 0;
        for (author, n) in [("a", 3), ("b", 1), ("c", 3)] {
            for _ in 0..n {
                id += 1;
                db.insert_new(&at(id, 1, 0, author, "bzz bzz")).unwrap();
            }
        }
        db.insert_new(&at(100, 1, 0, "d", "silence")).unwrap();
        db.register_identity("c", 777).unwrap();

        assert_eq!(
            db.author_match_counts("bzz").unwrap(),
            vec![
                RankRow { author_id: "a".into(), real_author_id: None, count: 3 },
                RankRow { author_id: "c".into(), real_author_id: Some(777), count: 3 },
                RankRow { author_id: "b".into(), real_author_id: None, count: 1 },
            ]
        );
    }
}
