use crate::hasher::{HashAlgorithm, HashParams};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const DEFAULT_ITERATIONS: u32 = 100_000;
const TRACKED_GUILDS_FILE: &str = "tracked_guilds.toml";

/// A guild whose messages are archived.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TrackedGuildConfig {
    pub guild_id: u64,
    #[serde(default)]
    pub ignored_channels: Vec<u64>,
}

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub owner_id: Option<u64>,
    pub dev_guild_id: Option<u64>,
    pub register_commands: bool,

    // Archive settings
    pub dbs_folder: PathBuf,
    pub tracked_guilds: Vec<TrackedGuildConfig>,
    pub hash: HashParams,
    pub backfill_on_startup: bool,
    pub message_day_interval: Duration,

    // External feeds
    pub http_timeout_secs: u64,
    pub ecowatt_token: Option<String>,
    pub ecowatt_interval: Duration,
    pub weather_url: String,
    pub weather_api_key: Option<String>,
    pub weather_latitude: f64,
    pub weather_longitude: f64,
    pub weather_interval: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        // A known salt would let anyone map ids back to users
        let salt = env::var("SALT")
            .ok()
            .filter(|salt| !salt.is_empty())
            .ok_or_else(|| anyhow::anyhow!("SALT must be set to a private value"))?;

        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            owner_id: env::var("OWNER_ID").ok().and_then(|id| id.parse().ok()),
            dev_guild_id: env::var("DEV_GUILD_ID").ok().and_then(|id| id.parse().ok()),
            register_commands: env::var("REGISTER_COMMANDS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            dbs_folder: PathBuf::from(
                env::var("DBS_FOLDER").unwrap_or_else(|_| "dbs".to_string()),
            ),
            tracked_guilds: Self::load_tracked_guilds(Path::new(TRACKED_GUILDS_FILE))?,
            hash: HashParams {
                algorithm: env::var("HASHNAME")
                    .unwrap_or_else(|_| "sha512".to_string())
                    .parse::<HashAlgorithm>()?,
                salt,
                iterations: env::var("ITER")
                    .unwrap_or_else(|_| DEFAULT_ITERATIONS.to_string())
                    .parse()
                    .map_err(|_| anyhow::anyhow!("ITER must be a positive integer"))?,
            },
            backfill_on_startup: env::var("BACKFILL_ON_STARTUP")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            message_day_interval: env_duration("MESSAGE_DAY_INTERVAL", Duration::from_secs(86_400)),
            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            ecowatt_token: env::var("ECOWATT_BASE64_TOKEN").ok(),
            ecowatt_interval: env_duration("ECOWATT_INTERVAL", Duration::from_secs(3_600)),
            weather_url: env::var("WEATHER_URL")
                .unwrap_or_else(|_| "https://api.open-meteo.com/v1/forecast".to_string()),
            weather_api_key: env::var("WEATHER_API_KEY").ok(),
            weather_latitude: env::var("WEATHER_LATITUDE")
                .unwrap_or_else(|_| "48.8566".to_string())
                .parse()
                .unwrap_or(48.8566),
            weather_longitude: env::var("WEATHER_LONGITUDE")
                .unwrap_or_else(|_| "2.3522".to_string())
                .parse()
                .unwrap_or(2.3522),
            weather_interval: env_duration("WEATHER_INTERVAL", Duration::from_secs(86_400)),
        })
    }

    /// Reads the tracked guild list from `path`, falling back to the
    /// `TRACKED_GUILDS` variable (JSON array) when the file is absent.
    pub fn load_tracked_guilds(path: &Path) -> anyhow::Result<Vec<TrackedGuildConfig>> {
        if let Ok(content) = fs::read_to_string(path) {
            #[derive(Deserialize)]
            struct GuildsWrapper {
                guilds: Vec<TrackedGuildConfig>,
            }
            let wrapper = toml::from_str::<GuildsWrapper>(&content)
                .map_err(|e| anyhow::anyhow!("Invalid {}: {}", path.display(), e))?;
            return Ok(wrapper.guilds);
        }

        // Fallback to env variable
        if let Ok(env_guilds) = env::var("TRACKED_GUILDS") {
            if let Ok(guilds) = serde_json::from_str(&env_guilds) {
                return Ok(guilds);
            }
            warn!("TRACKED_GUILDS is not a valid JSON guild list, ignoring it");
        }

        Ok(Vec::new())
    }
}

fn env_duration(key: &str, default: Duration) -> Duration {
    match env::var(key) {
        Ok(raw) => humantime::parse_duration(raw.trim()).unwrap_or_else(|e| {
            warn!("Invalid {} '{}': {}, using {:?}", key, raw, e, default);
            default
        }),
        Err(_) => default,
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("owner_id", &self.owner_id)
            .field("dev_guild_id", &self.dev_guild_id)
            .field("register_commands", &self.register_commands)
            .field("dbs_folder", &self.dbs_folder)
            .field("tracked_guilds", &self.tracked_guilds)
            .field("hash", &self.hash)
            .field("backfill_on_startup", &self.backfill_on_startup)
            .field("message_day_interval", &self.message_day_interval)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field(
                "ecowatt_token",
                &self.ecowatt_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("ecowatt_interval", &self.ecowatt_interval)
            .field("weather_url", &self.weather_url)
            .field(
                "weather_api_key",
                &self.weather_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("weather_latitude", &self.weather_latitude)
            .field("weather_longitude", &self.weather_longitude)
            .field("weather_interval", &self.weather_interval)
            .finish()
    }
}

/// Discord message limit is 2000 characters
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, MutexGuard};

    /// The process environment is shared by every test thread.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const KEYS: [&str; 7] = [
        "DISCORD_TOKEN",
        "SALT",
        "HASHNAME",
        "ITER",
        "ECOWATT_INTERVAL",
        "ECOWATT_BASE64_TOKEN",
        "TRACKED_GUILDS",
    ];

    /// Locks the environment and starts from a clean one.
    fn clean_env() -> MutexGuard<'static, ()> {
        let guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        for key in KEYS {
            env::remove_var(key);
        }
        guard
    }

    #[test]
    fn test_required_vars() {
        let _env = clean_env();
        env::set_var("SALT", "private");
        assert!(
            Config::build().is_err(),
            "Should fail when DISCORD_TOKEN is missing"
        );

        env::set_var("DISCORD_TOKEN", "test_token");
        env::remove_var("SALT");
        let err = Config::build().unwrap_err();
        assert!(err.to_string().contains("SALT"));

        env::set_var("SALT", "");
        assert!(Config::build().is_err());
    }

    #[test]
    fn test_defaults_and_overrides() {
        let _env = clean_env();
        env::set_var("DISCORD_TOKEN", "test_token");
        env::set_var("SALT", "private");
        let config = Config::build().unwrap();
        assert_eq!(config.discord_token, "test_token");
        assert_eq!(config.hash.algorithm, HashAlgorithm::Sha512);
        assert_eq!(config.hash.salt, "private");
        assert_eq!(config.hash.iterations, 100_000);
        assert_eq!(config.ecowatt_interval, Duration::from_secs(3600));

        env::set_var("HASHNAME", "sha256");
        env::set_var("ITER", "42");
        env::set_var("ECOWATT_INTERVAL", "30m");
        let config = Config::build().unwrap();
        assert_eq!(config.hash.algorithm, HashAlgorithm::Sha256);
        assert_eq!(config.hash.iterations, 42);
        assert_eq!(config.ecowatt_interval, Duration::from_secs(1800));

        env::set_var("HASHNAME", "md5");
        assert!(Config::build().is_err());
    }

    #[test]
    fn test_debug_redaction() {
        let _env = clean_env();
        env::set_var("DISCORD_TOKEN", "test_token");
        env::set_var("SALT", "secret_salt");
        env::set_var("ECOWATT_BASE64_TOKEN", "secret_token");
        let debug_output = format!("{:?}", Config::build().unwrap());
        assert!(!debug_output.contains("test_token"));
        assert!(!debug_output.contains("secret_salt"));
        assert!(!debug_output.contains("secret_token"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_tracked_guilds_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracked_guilds.toml");
        fs::write(
            &path,
            r#"
            [[guilds]]
            guild_id = 123
            ignored_channels = [1, 2]

            [[guilds]]
            guild_id = 456
            "#,
        )
        .unwrap();

        let guilds = Config::load_tracked_guilds(&path).unwrap();
        assert_eq!(
            guilds,
            vec![
                TrackedGuildConfig {
                    guild_id: 123,
                    ignored_channels: vec![1, 2]
                },
                TrackedGuildConfig {
                    guild_id: 456,
                    ignored_channels: vec![]
                },
            ]
        );

        fs::write(&path, "guilds = 3").unwrap();
        assert!(Config::load_tracked_guilds(&path).is_err());
    }

    #[test]
    fn test_tracked_guilds_env_fallback() {
        let _env = clean_env();
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        env::set_var("TRACKED_GUILDS", r#"[{"guild_id": 7}]"#);
        let guilds = Config::load_tracked_guilds(&missing).unwrap();
        assert_eq!(guilds[0].guild_id, 7);
        assert!(guilds[0].ignored_channels.is_empty());

        env::set_var("TRACKED_GUILDS", "not json");
        assert!(Config::load_tracked_guilds(&missing).unwrap().is_empty());
    }
}
