use crate::chart::Series;
use crate::db::RankRow;
use crate::hasher::IdentityHasher;
use crate::models::{Message, RandomFilter};
use crate::queries::{competition_rank, daily_counts, daily_ratios, rolling_mean, Rank};
use crate::tracked::TrackedGuild;
use chrono::{Months, NaiveDate};
use std::sync::Arc;

/// How far back a chart goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    All,
    Months(u32),
}

impl Period {
    /// First day drawn, given the first day with data.
    fn start(self, first: NaiveDate, today: NaiveDate) -> NaiveDate {
        match self {
            Period::All => first,
            Period::Months(n) => today
                .checked_sub_months(Months::new(n))
                .map_or(first, |limit| limit.max(first)),
        }
    }
}

pub struct RankSummary {
    pub own: Option<Rank>,
    /// Best authors first.
    pub leaderboard: Vec<RankRow>,
}

/// A sampled message and how many messages matched the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomPick {
    pub message: Message,
    pub out_of: u64,
}

/// Messages containing an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHits {
    pub total: usize,
    /// Newest first.
    pub latest: Vec<Message>,
}

pub struct ActivityService {
    guild: Arc<TrackedGuild>,
    hasher: IdentityHasher,
}

impl ActivityService {
    pub fn new(guild: Arc<TrackedGuild>, hasher: IdentityHasher) -> Self {
        Self { guild, hasher }
    }

    /// Smoothed daily share of messages containing each expression.
    ///
    /// Returns nothing when no daily totals were computed yet.
    pub async fn trend(
        &self,
        expressions: &[String],
        period: Period,
        window: usize,
        today: NaiveDate,
    ) -> anyhow::Result<Option<Vec<Series>>> {
        let bounds = self
            .guild
            .db
            .run_blocking(|db| db.message_day_bounds())
            .await?;
        let Some((first, last)) = bounds else {
            return Ok(None);
        };
        let start = period.start(first, today);
        if start > last {
            return Ok(None);
        }

        let totals = self
            .guild
            .db
            .run_blocking(move |db| db.message_days(start, last))
            .await?;

        let mut series = Vec::with_capacity(expressions.len());
        for expression in expressions {
            let term = expression.clone();
            let matches = self
                .guild
                .db
                .run_blocking(move |db| db.daily_match_counts(&term, start, last))
                .await?;
            let ratios = daily_ratios(&matches, &totals, start, last);
            series.push(Series {
                label: expression.clone(),
                points: rolling_mean(&ratios, window),
            });
        }
        Ok(Some(series))
    }

    /// Smoothed number of messages per day, for the guild or one channel.
    ///
    /// The calendar is the one of the guild's daily totals, so days still in
    /// progress are left out.
    pub async fn activity(
        &self,
        channel_id: Option<i64>,
        period: Period,
        window: usize,
        today: NaiveDate,
    ) -> anyhow::Result<Option<Series>> {
        let bounds = self
            .guild
            .db
            .run_blocking(|db| db.message_day_bounds())
            .await?;
        let Some((first, last)) = bounds else {
            return Ok(None);
        };
        let start = period.start(first, today);
        if start > last {
            return Ok(None);
        }

        let days = self
            .guild
            .db
            .run_blocking(move |db| match channel_id {
                Some(channel_id) => db.channel_message_days(channel_id, start, last),
                None => db.message_days(start, last),
            })
            .await?;
        Ok(Some(Series {
            label: "messages".to_string(),
            points: rolling_mean(&daily_counts(&days, start, last), window),
        }))
    }

    /// Where `user_id` stands among the authors who used `expression`.
    pub async fn rank(&self, expression: &str, user_id: u64, top: usize) -> anyhow::Result<RankSummary> {
        let hasher = self.hasher.clone();
        let author_id = tokio::task::spawn_blocking(move || hasher.hash(user_id)).await?;
        let term = expression.to_string();
        let counts = self
            .guild
            .db
            .run_blocking(move |db| db.author_match_counts(&term))
            .await?;

        Ok(RankSummary {
            own: competition_rank(&counts, &author_id),
            leaderboard: counts.into_iter().take(top).collect(),
        })
    }

    pub async fn random(&self, filter: RandomFilter) -> anyhow::Result<Option<RandomPick>> {
        Ok(self
            .guild
            .db
            .run_blocking(move |db| {
                let out_of = db.count_where(&filter)?;
                if out_of == 0 {
                    return Ok(None);
                }
                let picked = db.sample_where(&filter, &mut rand::thread_rng())?;
                Ok(picked.map(|message| RandomPick { message, out_of }))
            })
            .await?)
    }

    pub async fn search(&self, expression: &str, limit: usize) -> anyhow::Result<SearchHits> {
        let term = expression.to_string();
        Ok(self
            .guild
            .db
            .run_blocking(move |db| {
                let ids = db.search(&term, false)?;
                let mut latest = Vec::with_capacity(limit.min(ids.len()));
                for id in ids.iter().take(limit) {
                    if let Some(message) = db.get_message(*id)? {
                        latest.push(message);
                    }
                }
                Ok(SearchHits {
                    total: ids.len(),
                    latest,
                })
            })
            .await?)
    }

    /// Pseudonymous id of a member, for author filters.
    pub async fn author_id(&self, user_id: u64) -> anyhow::Result<String> {
        let hasher = self.hasher.clone();
        Ok(tokio::task::spawn_blocking(move || hasher.hash(user_id)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::hasher::test_hasher;
    use crate::models::Message;
    use chrono::{TimeZone, Utc};

    fn msg(id: i64, day: u32, author: &str, content: &str) -> Message {
        Message {
            message_id: id,
            author_id: author.to_string(),
            channel_id: 1,
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
            content: content.to_string(),
            attachment_url: None,
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn service(db: Database) -> ActivityService {
        let guild = TrackedGuild::new(1, db, []).unwrap();
        ActivityService::new(Arc::new(guild), test_hasher())
    }

    #[tokio::test]
    async fn test_trend_series() {
        let db = Database::open_in_memory().unwrap();
        db.insert_new(&msg(1, 1, "a", "bzz")).unwrap();
        db.insert_new(&msg(2, 1, "a", "rien")).unwrap();
        db.insert_new(&msg(3, 3, "a", "bzz bzz")).unwrap();
        db.insert_new(&msg(4, 4, "a", "rien")).unwrap();
        db.refresh_message_days(None).unwrap();
        let svc = service(db);

        let daily = svc
            .trend(&["bzz".to_string()], Period::All, 1, date(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(daily.len(), 1);
        assert_eq!(
            daily[0].points,
            vec![(date(1), 0.5), (date(2), 0.0), (date(3), 1.0), (date(4), 0.0)]
        );

        let smoothed = svc
            .trend(&["bzz".to_string(), "rien".to_string()], Period::All, 2, date(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(smoothed[0].points, vec![(date(2), 0.25), (date(3), 0.5), (date(4), 0.5)]);
        assert_eq!(smoothed[1].label, "rien");
    }

    #[tokio::test]
    async fn test_trend_without_totals() {
        let db = Database::open_in_memory().unwrap();
        db.insert_new(&msg(1, 1, "a", "bzz")).unwrap();
        let svc = service(db);
        assert!(svc
            .trend(&["bzz".to_string()], Period::Months(12), 14, date(10))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_rank() {
        let hasher = test_hasher();
        let me = hasher.hash(42);
        let db = Database::open_in_memory().unwrap();
        db.insert_new(&msg(1, 1, "other", "abeille")).unwrap();
        db.insert_new(&msg(2, 1, "other", "abeille")).unwrap();
        db.insert_new(&msg(3, 1, &me, "abeille")).unwrap();
        let svc = service(db);

        let summary = svc.rank("abeille", 42, 10).await.unwrap();
        assert_eq!(summary.own.unwrap().position, 2);
        assert_eq!(summary.leaderboard[0].author_id, "other");

        let none = svc.rank("frelon", 42, 10).await.unwrap();
        assert!(none.own.is_none());
        assert!(none.leaderboard.is_empty());
    }

    #[tokio::test]
    async fn test_random_respects_filter() {
        let db = Database::open_in_memory().unwrap();
        db.insert_new(&msg(1, 1, "a", "one")).unwrap();
        db.insert_new(&msg(2, 1, "b", "two")).unwrap();
        let svc = service(db);

        let picked = svc
            .random(RandomFilter::new(1).by_author("b".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(picked.message.message_id, 2);
        assert_eq!(picked.out_of, 1);

        let any = svc.random(RandomFilter::new(1)).await.unwrap().unwrap();
        assert_eq!(any.out_of, 2);
        assert!(svc
            .random(RandomFilter::new(2))
            .await
            .unwrap()
            .is_none());
        assert!(svc
            .random(RandomFilter::new(1).by_author("c".to_string()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_search_latest_first() {
        let db = Database::open_in_memory().unwrap();
        db.insert_new(&msg(1, 1, "a", "du miel")).unwrap();
        db.insert_new(&msg(2, 2, "a", "rien")).unwrap();
        db.insert_new(&msg(3, 3, "b", "encore du miel")).unwrap();
        db.insert_new(&msg(4, 4, "b", "miel toujours")).unwrap();
        let svc = service(db);

        let hits = svc.search("miel", 2).await.unwrap();
        assert_eq!(hits.total, 3);
        let ids: Vec<i64> = hits.latest.iter().map(|m| m.message_id).collect();
        assert_eq!(ids, vec![4, 3]);

        let none = svc.search("abeille", 2).await.unwrap();
        assert_eq!(none.total, 0);
        assert!(none.latest.is_empty());
    }

    #[tokio::test]
    async fn test_activity_series() {
        let db = Database::open_in_memory().unwrap();
        db.insert_new(&msg(1, 1, "a", "x")).unwrap();
        db.insert_new(&msg(2, 1, "a", "x")).unwrap();
        db.insert_new(&msg(3, 3, "a", "x")).unwrap();
        let mut elsewhere = msg(4, 3, "a", "x");
        elsewhere.channel_id = 2;
        db.insert_new(&elsewhere).unwrap();
        db.refresh_message_days(None).unwrap();
        let svc = service(db);

        let guild = svc.activity(None, Period::All, 1, date(10)).await.unwrap().unwrap();
        assert_eq!(guild.points, vec![(date(1), 2.0), (date(2), 0.0), (date(3), 2.0)]);

        let channel = svc.activity(Some(2), Period::All, 1, date(10)).await.unwrap().unwrap();
        assert_eq!(channel.points, vec![(date(1), 0.0), (date(2), 0.0), (date(3), 1.0)]);

        let smoothed = svc.activity(None, Period::All, 3, date(10)).await.unwrap().unwrap();
        assert_eq!(smoothed.points.len(), 1);
        assert!((smoothed.points[0].1 - 4.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_period_start() {
        let first = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 7, 15).unwrap();
        assert_eq!(Period::All.start(first, today), first);
        assert_eq!(
            Period::Months(6).start(first, today),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
        // Never before the first day with data
        assert_eq!(Period::Months(120).start(first, today), first);
    }
}
