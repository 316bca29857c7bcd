use crate::{error::Error, MAX_MODULUS_BITS, MIN_MODULUS_BITS};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "Ballot.toml";
pub const ENV_PREFIX: &str = "BALLOT_";

/// Configuration, derived from defaults, then `Ballot.toml`, then `BALLOT_*` environment
/// variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Bit length of each election's prime modulus
    pub modulus_bits: usize,
    /// Ballot timestamps are truncated to a multiple of this many seconds
    pub ballot_time_granularity_secs: u32,
    /// log4rs configuration file used by the binaries
    pub log_config: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            modulus_bits: 2048,
            ballot_time_granularity_secs: 3600,
            log_config: PathBuf::from("log4rs.yaml"),
        }
    }
}

impl Config {
    pub fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load from the default file and the environment
    pub fn load() -> Result<Self, Error> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    pub fn load_from(file: &Path) -> Result<Self, Error> {
        let config: Config = Self::figment(file).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !(MIN_MODULUS_BITS..=MAX_MODULUS_BITS).contains(&self.modulus_bits) {
            return Err(Error::Config(format!(
                "modulus_bits must lie in {MIN_MODULUS_BITS}..={MAX_MODULUS_BITS}, got {}",
                self.modulus_bits
            )));
        }
        if self.ballot_time_granularity_secs == 0 {
            return Err(Error::Config(
                "ballot_time_granularity_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}
