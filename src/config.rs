//! Layered settings loader.
//!
//! Layers (highest precedence last):
//!   1) Built-in defaults (`Settings::default()`)
//!   2) Config file (explicit path, or `tiered-sale.{toml,yaml,yml,json}` in cwd)
//!   3) Environment variables `TIERED_SALE__SECTION__KEY`
//!
//! Amounts are decimal strings in whole units (`"2000"`, `"0.1"`) so they
//! survive every source format; addresses are `0x` hex.
//!
//! Examples:
//!   TIERED_SALE__SALE__OWNER=0x00000000000000000000000000000000000000aa
//!   TIERED_SALE__SALE__END_TIME=1700003600
//!   TIERED_SALE__SALE__TIER_RATES=5000,4000,3000,2000
//!   TIERED_SALE__TELEMETRY__LOG_FILTER=debug

use std::path::{Path, PathBuf};

use config as cfg;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::SaleError;
use crate::sale::SaleConfig;
use crate::tiers::{Tier, TierTable, TIER_COUNT};
use crate::types::{parse_units, Address};

const ENV_PREFIX: &str = "TIERED_SALE";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sale: SaleSettings,
    pub telemetry: TelemetrySettings,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SaleSettings {
    pub owner: String,
    pub wallet: String,
    pub cap: String,
    pub goal: String,
    pub min_purchase: String,
    pub max_purchase: String,
    pub max_per_buyer: Option<String>,
    pub start_time: u64,
    /// 0 = open-ended.
    pub end_time: u64,
    /// Cumulative whole-token thresholds, one per tier.
    pub tier_thresholds: Vec<String>,
    pub tier_rates: Vec<u64>,
    pub owner_reserve: String,
    pub presale_allocation: String,
    pub event_capacity: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// RUST_LOG-like directive, e.g. "info,tiered_sale=debug".
    pub log_filter: String,
    pub json: bool,
}

impl Default for SaleSettings {
    fn default() -> Self {
        Self {
            owner: String::new(),
            wallet: String::new(),
            cap: "50000000".into(),
            goal: "7500000".into(),
            min_purchase: "0.1".into(),
            max_purchase: "2000".into(),
            max_per_buyer: None,
            start_time: 0,
            end_time: 0,
            tier_thresholds: vec!["12500000".into(), "25000000".into(), "37500000".into(), "50000000".into()],
            tier_rates: vec![5000, 4000, 3000, 2000],
            owner_reserve: "40000000".into(),
            presale_allocation: "10000000".into(),
            event_capacity: 1024,
        }
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_filter: "info".into(),
            json: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config build error: {0}")]
    Build(#[from] cfg::ConfigError),
    #[error("path not found `{0}`")]
    PathNotFound(String),
    #[error("invalid sale settings: {0}")]
    Invalid(#[from] SaleError),
}

/// Load settings: defaults -> file -> environment.
pub fn load(explicit_file: Option<&Path>) -> Result<Settings, ConfigError> {
    let mut builder = cfg::Config::builder().add_source(cfg::Config::try_from(&Settings::default())?);

    for path in discover_config_files(explicit_file)? {
        builder = builder.add_source(cfg::File::from(path));
    }

    builder = builder.add_source(
        cfg::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("sale.tier_rates")
            .with_list_parse_key("sale.tier_thresholds")
            .try_parsing(true),
    );

    Ok(builder.build()?.try_deserialize()?)
}

fn discover_config_files(explicit: Option<&Path>) -> Result<Vec<PathBuf>, ConfigError> {
    if let Some(p) = explicit {
        if !p.exists() {
            return Err(ConfigError::PathNotFound(p.display().to_string()));
        }
        return Ok(vec![p.to_path_buf()]);
    }
    Ok(["tiered-sale.toml", "tiered-sale.yaml", "tiered-sale.yml", "tiered-sale.json"]
        .into_iter()
        .map(PathBuf::from)
        .filter(|p| p.exists())
        .collect())
}

impl SaleSettings {
    /// Parse into a validated [`SaleConfig`].
    pub fn to_config(&self) -> Result<SaleConfig, ConfigError> {
        if self.tier_thresholds.len() != TIER_COUNT || self.tier_rates.len() != TIER_COUNT {
            return Err(SaleError::InvalidConfig(format!("exactly {TIER_COUNT} tier thresholds and rates required")).into());
        }
        let mut tiers = [Tier { threshold: 0, rate: 0 }; TIER_COUNT];
        for (i, t) in tiers.iter_mut().enumerate() {
            t.threshold = parse_units(&self.tier_thresholds[i])?;
            t.rate = u128::from(self.tier_rates[i]);
        }

        let cfg = SaleConfig {
            owner: self.owner.parse::<Address>()?,
            wallet: self.wallet.parse::<Address>()?,
            tiers: TierTable::new(tiers)?,
            cap: parse_units(&self.cap)?,
            goal: parse_units(&self.goal)?,
            min_purchase: parse_units(&self.min_purchase)?,
            max_purchase: parse_units(&self.max_purchase)?,
            max_per_buyer: match self.max_per_buyer.as_deref().map(str::trim) {
                None | Some("") => None,
                Some(v) => Some(parse_units(v)?),
            },
            start_time: self.start_time,
            end_time: self.end_time,
            owner_reserve: parse_units(&self.owner_reserve)?,
            presale_allocation: parse_units(&self.presale_allocation)?,
            event_capacity: self.event_capacity,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::types::{units, UNIT};

    const OWNER: &str = "0x00000000000000000000000000000000000000aa";
    const WALLET: &str = "0x00000000000000000000000000000000000000bb";

    // Environment is process-wide; tests that run `load` take turns.
    static ENV_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());

    #[test]
    fn defaults_need_addresses() {
        let s = Settings::default();
        assert!(matches!(s.sale.to_config(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn defaults_match_sale_defaults() {
        let mut s = SaleSettings::default();
        s.owner = OWNER.into();
        s.wallet = WALLET.into();
        let c = s.to_config().unwrap();
        let d = SaleConfig::default();
        assert_eq!(c.cap, d.cap);
        assert_eq!(c.goal, d.goal);
        assert_eq!(c.min_purchase, UNIT / 10);
        assert_eq!(c.max_purchase, d.max_purchase);
        assert_eq!(c.tiers, d.tiers);
        assert_eq!(c.owner_reserve, d.owner_reserve);
        assert_eq!(c.max_per_buyer, None);
    }

    #[test]
    fn file_layer_overrides_defaults() {
        let mut f = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            f,
            r#"
[sale]
owner = "{OWNER}"
wallet = "{WALLET}"
start_time = 100
end_time = 200
max_per_buyer = "2500"
tier_rates = [6000, 5000, 4000, 3000]
"#
        )
        .unwrap();

        let _env = ENV_LOCK.lock();
        let s = load(Some(f.path())).unwrap();
        let c = s.sale.to_config().unwrap();
        assert_eq!(c.owner.to_string(), OWNER);
        assert_eq!(c.start_time, 100);
        assert_eq!(c.end_time, 200);
        assert_eq!(c.max_per_buyer, Some(units(2500)));
        assert_eq!(c.tiers.rate_for_tier(1).unwrap(), 6000);
        assert_eq!(c.tiers.ceiling(), units(50_000_000));
    }

    #[test]
    fn env_layer_overrides_file() {
        let _env = ENV_LOCK.lock();
        std::env::set_var("TIERED_SALE__TELEMETRY__LOG_FILTER", "tiered_sale=trace");
        let s = load(None).unwrap();
        std::env::remove_var("TIERED_SALE__TELEMETRY__LOG_FILTER");
        assert_eq!(s.telemetry.log_filter, "tiered_sale=trace");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let _env = ENV_LOCK.lock();
        let err = load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::PathNotFound(_)));
    }

    #[test]
    fn wrong_tier_count_rejected() {
        let mut s = SaleSettings::default();
        s.owner = OWNER.into();
        s.wallet = WALLET.into();
        s.tier_rates.pop();
        assert!(s.to_config().is_err());
    }
}
