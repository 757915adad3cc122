use std::path::PathBuf;

use crate::error::{AccountError, AccountResult};
use crate::id::DEFAULT_ID_LENGTH;

pub const DEFAULT_DATA_DIR: &str = "./fmd-data";
pub const DEFAULT_MAX_SAVED_LOCATIONS: usize = 1000;
pub const DEFAULT_MAX_SAVED_PICTURES: usize = 10;

/// Storage location, identifier length and retention caps. The library takes
/// all four explicitly; defaults only exist in [`AccountConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountConfig {
    pub storage_dir: PathBuf,
    pub id_length: usize,
    pub max_saved_locations: usize,
    pub max_saved_pictures: usize,
}

impl AccountConfig {
    pub fn new(
        storage_dir: impl Into<PathBuf>,
        id_length: usize,
        max_saved_locations: usize,
        max_saved_pictures: usize,
    ) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            id_length,
            max_saved_locations,
            max_saved_pictures,
        }
    }

    /// Reads `FMD_DATA_DIR`, `FMD_ID_LENGTH`, `FMD_MAX_SAVED_LOCATIONS` and
    /// `FMD_MAX_SAVED_PICTURES`.
    pub fn from_env() -> AccountResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> AccountResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |key: &str, default: usize| -> AccountResult<usize> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| AccountError::InvalidConfig(format!("{key}={raw} is not a number"))),
                None => Ok(default),
            }
        };

        let config = Self {
            storage_dir: lookup("FMD_DATA_DIR")
                .unwrap_or_else(|| DEFAULT_DATA_DIR.into())
                .into(),
            id_length: number("FMD_ID_LENGTH", DEFAULT_ID_LENGTH)?,
            max_saved_locations: number("FMD_MAX_SAVED_LOCATIONS", DEFAULT_MAX_SAVED_LOCATIONS)?,
            max_saved_pictures: number("FMD_MAX_SAVED_PICTURES", DEFAULT_MAX_SAVED_PICTURES)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AccountResult<()> {
        if self.id_length == 0 {
            return Err(AccountError::InvalidConfig("id_length must be at least 1".into()));
        }
        if self.max_saved_locations == 0 {
            return Err(AccountError::InvalidConfig(
                "max_saved_locations must be at least 1".into(),
            ));
        }
        if self.max_saved_pictures == 0 {
            return Err(AccountError::InvalidConfig(
                "max_saved_pictures must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
