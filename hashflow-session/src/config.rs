//! Session configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use hashflow_core::{LevelId, FIRST_LEVEL_ID, LAST_LEVEL_ID};
use hashflow_ledger::{ExclusivityMode, SupabaseEndpoint};

/// Error types for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid YAML for this schema
    #[error("Invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Configuration for a player session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Unlocking, narrowing and rewards
    pub progression: ProgressionConfig,
    /// Run protocol timing and pricing
    pub run: RunConfig,
    /// Remote ledger connection
    pub ledger: LedgerConfig,
    /// Dedup policy expected from the ledger
    pub exclusivity: ExclusivityMode,
}

impl SessionConfig {
    /// Parse from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Load from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        Ok(Self::from_yaml(&yaml)?)
    }
}

/// Progression configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressionConfig {
    /// Levels playable from the start
    pub starter_unlocked_levels: LevelId,
    /// Floor for adaptive narrowing
    pub minimum_top_level_id: LevelId,
    /// Idle days before the frontier narrows
    pub narrowing_idle_days: i64,
    /// Respect per unique completion
    pub unique_completion_respect: i64,
    /// Bonus points granted once per calendar day
    pub daily_bonus: i64,
    /// Last campaign level
    pub campaign_last_level_id: LevelId,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            starter_unlocked_levels: 5,
            minimum_top_level_id: 5,
            narrowing_idle_days: 2,
            unique_completion_respect: 5,
            daily_bonus: 50,
            campaign_last_level_id: LAST_LEVEL_ID,
        }
    }
}

impl ProgressionConfig {
    /// Highest level of the starter window.
    pub fn starter_top(&self) -> LevelId {
        (FIRST_LEVEL_ID + self.starter_unlocked_levels - 1)
            .min(self.campaign_last_level_id)
            .max(FIRST_LEVEL_ID)
    }

    /// Lowest frontier adaptive narrowing may leave.
    pub fn narrowing_floor(&self) -> LevelId {
        self.minimum_top_level_id.max(FIRST_LEVEL_ID)
    }
}

/// Run protocol configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Watchdog for the uniqueness check (ms)
    pub uniqueness_timeout_ms: u64,
    /// Delay before the "checking" state shows (ms)
    pub checking_overlay_delay_ms: u64,
    /// Tier label sent to run pricing
    pub level_tier: String,
    /// Credits charged per hint
    pub hint_cost: i64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            uniqueness_timeout_ms: 12_000,
            checking_overlay_delay_ms: 300,
            level_tier: "medium".to_string(),
            hint_cost: 10,
        }
    }
}

impl RunConfig {
    pub fn uniqueness_timeout(&self) -> Duration {
        Duration::from_millis(self.uniqueness_timeout_ms)
    }

    pub fn checking_overlay_delay(&self) -> Duration {
        Duration::from_millis(self.checking_overlay_delay_ms)
    }
}

/// Remote ledger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Supabase project URL
    pub base_url: Option<String>,
    /// Public anon key
    pub anon_key: Option<String>,
    /// Request timeout (ms)
    pub request_timeout_ms: u64,
    /// Edge function that mints solution NFTs
    pub mint_function: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            anon_key: None,
            request_timeout_ms: 15_000,
            mint_function: "mint_pipeline_nft".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Endpoint settings, when both URL and key are configured.
    pub fn endpoint(&self, access_token: Option<String>) -> Option<SupabaseEndpoint> {
        let base_url = self.base_url.as_deref().filter(|u| !u.is_empty())?;
        let anon_key = self.anon_key.as_deref().filter(|k| !k.is_empty())?;

        let mut endpoint = SupabaseEndpoint::new(base_url, anon_key)
            .with_timeout(Duration::from_millis(self.request_timeout_ms));
        if let Some(token) = access_token {
            endpoint = endpoint.with_access_token(token);
        }
        Some(endpoint)
    }
}
