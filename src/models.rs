use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::ops::AddAssign;

const SQLITE_DATETIME: &str = "%Y-%m-%d %H:%M:%S";

/// One archived Discord message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub message_id: i64,
    /// Pseudonymous author id, never the Discord user id.
    pub author_id: String,
    pub channel_id: i64,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    /// First attachment only.
    pub attachment_url: Option<String>,
}

/// Message count for one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageDay {
    pub date: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub author_id: String,
    pub real_author_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Tally of one backfill pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveResult {
    pub found: u64,
    pub saved: u64,
    pub already_saved: u64,
    pub from_bot: u64,
}

impl SaveResult {
    pub fn record(&mut self, outcome: InsertOutcome) {
        match outcome {
            InsertOutcome::Inserted => self.saved += 1,
            InsertOutcome::AlreadyPresent => self.already_saved += 1,
        }
    }
}

impl AddAssign for SaveResult {
    fn add_assign(&mut self, other: Self) {
        self.found += other.found;
        self.saved += other.saved;
        self.already_saved += other.already_saved;
        self.from_bot += other.from_bot;
    }
}

impl fmt::Display for SaveResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} saved out of {} found ({} from bots, {} already saved)",
            self.saved, self.found, self.from_bot, self.already_saved
        )
    }
}

/// Constraints for `/random`. Sampling never crosses channels.
#[derive(Debug, Clone)]
pub struct RandomFilter {
    pub channel_id: i64,
    pub author_id: Option<String>,
    pub min_length: Option<usize>,
    pub attachment_only: bool,
}

impl RandomFilter {
    pub fn new(channel_id: i64) -> Self {
        Self {
            channel_id,
            author_id: None,
            min_length: None,
            attachment_only: false,
        }
    }

    pub fn by_author(mut self, author_id: String) -> Self {
        self.author_id = Some(author_id);
        self
    }

    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = Some(min_length);
        self
    }

    pub fn attachments_only(mut self) -> Self {
        self.attachment_only = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStats {
    pub channel_id: i64,
    pub count: i64,
    pub first_message: Option<DateTime<Utc>>,
    pub last_message: Option<DateTime<Utc>>,
}

pub fn format_sqlite_utc(ts: &DateTime<Utc>) -> String {
    ts.format(SQLITE_DATETIME).to_string()
}

pub fn parse_sqlite_utc(ts: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(ts, SQLITE_DATETIME).ok()?;
    Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}
