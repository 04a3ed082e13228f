//! Registry of the guilds being archived.

use crate::config::TrackedGuildConfig;
use crate::db::Database;
use crate::error::StoreError;
use crate::models::Message;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info};

/// Proof that the holder is the only backfill running on a guild. Owned, so
/// it can move into the task doing the work.
pub type BackfillGuard = OwnedMutexGuard<()>;

pub struct TrackedGuild {
    pub guild_id: u64,
    pub db: Database,
    ignored_channels: HashSet<u64>,
    /// Highest stored message when the guild was loaded or last backfilled.
    watermark: RwLock<Option<Message>>,
    backfill_lock: Arc<Mutex<()>>,
}

impl TrackedGuild {
    pub fn new(guild_id: u64, db: Database, ignored_channels: impl IntoIterator<Item = u64>) -> Result<Self, StoreError> {
        let watermark = db.watermark()?;
        Ok(Self {
            guild_id,
            db,
            ignored_channels: ignored_channels.into_iter().collect(),
            watermark: RwLock::new(watermark),
            backfill_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn is_ignored(&self, channel_id: u64) -> bool {
        self.ignored_channels.contains(&channel_id)
    }

    pub fn watermark(&self) -> Option<Message> {
        self.watermark.read().ok().and_then(|w| w.clone())
    }

    pub async fn refresh_watermark(&self) -> Result<(), StoreError> {
        let latest = self.db.run_blocking(|db| db.watermark()).await?;
        let mut guard = self.watermark.write().map_err(|_| StoreError::Poisoned)?;
        *guard = latest;
        Ok(())
    }

    /// Serializes backfills of this guild. Live ingestion never takes it.
    pub async fn lock_backfill(&self) -> BackfillGuard {
        self.backfill_lock.clone().lock_owned().await
    }

    pub fn try_lock_backfill(&self) -> Option<BackfillGuard> {
        self.backfill_lock.clone().try_lock_owned().ok()
    }

    /// Whether `guard` was taken on this guild's lock.
    pub fn is_locked_by(&self, guard: &BackfillGuard) -> bool {
        Arc::ptr_eq(OwnedMutexGuard::mutex(guard), &self.backfill_lock)
    }
}

/// Open archives keyed by guild id. Built once at startup and shared.
#[derive(Default)]
pub struct GuildRegistry {
    guilds: BTreeMap<u64, Arc<TrackedGuild>>,
}

impl GuildRegistry {
    /// Opens every configured guild. Guilds whose database cannot be opened
    /// are logged and left out.
    pub fn load(dbs_folder: &Path, configs: &[TrackedGuildConfig]) -> Self {
        let mut registry = Self::default();
        for cfg in configs {
            let opened = Database::open(dbs_folder, cfg.guild_id).and_then(|db| {
                TrackedGuild::new(cfg.guild_id, db, cfg.ignored_channels.iter().copied())
            });
            match opened {
                Ok(guild) => {
                    info!(
                        "Tracking guild {} ({} ignored channels)",
                        cfg.guild_id,
                        cfg.ignored_channels.len()
                    );
                    registry.insert(guild);
                }
                Err(e) => error!("Skipping guild {}: {}", cfg.guild_id, e),
            }
        }
        registry
    }

    pub fn insert(&mut self, guild: TrackedGuild) {
        self.guilds.insert(guild.guild_id, Arc::new(guild));
    }

    pub fn get(&self, guild_id: u64) -> Option<Arc<TrackedGuild>> {
        self.guilds.get(&guild_id).cloned()
    }

    pub fn guilds(&self) -> impl Iterator<Item = &Arc<TrackedGuild>> {
        self.guilds.values()
    }

    pub fn len(&self) -> usize {
        self.guilds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guilds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::message;

    #[test]
    fn test_load_skips_unavailable_guilds() {
        let dir = tempfile::tempdir().unwrap();
        // A directory squatting on the database file name makes it unopenable
        std::fs::create_dir_all(dir.path().join("2.db")).unwrap();

        let registry = GuildRegistry::load(
            dir.path(),
            &[
                TrackedGuildConfig {
                    guild_id: 1,
                    ignored_channels: vec![10],
                },
                TrackedGuildConfig {
                    guild_id: 2,
                    ignored_channels: vec![],
                },
            ],
        );

        assert_eq!(registry.len(), 1);
        let guild = registry.get(1).unwrap();
        assert!(guild.is_ignored(10));
        assert!(!guild.is_ignored(11));
        assert!(registry.get(2).is_none());
    }

    #[tokio::test]
    async fn test_watermark_snapshot() {
        let db = Database::open_in_memory().unwrap();
        db.insert_new(&message(100, 1, "a", "x")).unwrap();
        let guild = TrackedGuild::new(5, db, []).unwrap();
        assert_eq!(guild.watermark().unwrap().message_id, 100);

        // Live writes do not move the snapshot until it is refreshed
        guild.db.insert_new(&message(200, 1, "a", "y")).unwrap();
        assert_eq!(guild.watermark().unwrap().message_id, 100);
        guild.refresh_watermark().await.unwrap();
        assert_eq!(guild.watermark().unwrap().message_id, 200);
    }

    #[tokio::test]
    async fn test_backfill_lock_is_exclusive() {
        let guild = TrackedGuild::new(5, Database::open_in_memory().unwrap(), []).unwrap();
        let held = guild.lock_backfill().await;
        assert!(guild.try_lock_backfill().is_none());
        assert!(guild.is_locked_by(&held));
        drop(held);
        assert!(guild.try_lock_backfill().is_some());
    }

    #[tokio::test]
    async fn test_backfill_guard_outlives_the_borrow() {
        let guild = Arc::new(TrackedGuild::new(5, Database::open_in_memory().unwrap(), []).unwrap());
        let other = TrackedGuild::new(6, Database::open_in_memory().unwrap(), []).unwrap();
        let guard = guild.try_lock_backfill().unwrap();
        assert!(!other.is_locked_by(&guard));

        // Still held while the task owning it runs
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _guard = guard;
            let _ = rx.await;
        });
        assert!(guild.try_lock_backfill().is_none());
        tx.send(()).unwrap();
        task.await.unwrap();
        assert!(guild.try_lock_backfill().is_some());
    }
}
