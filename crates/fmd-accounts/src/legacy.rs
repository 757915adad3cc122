//! One-way import of records exported from the retired object database.
//!
//! The export is a JSON array of the old record shape, placed next to the
//! store as `legacy-users.json`. It is imported once, then renamed so it is
//! never read again.

use std::path::{Path, PathBuf};

use chrono::Utc;
use fmd_db::{Database, History, NewAccount, queries};
use serde::{Deserialize, Deserializer};
use tracing::{info, warn};

use crate::config::AccountConfig;
use crate::error::{AccountError, AccountResult};

pub const LEGACY_EXPORT_FILE: &str = "legacy-users.json";
pub const LEGACY_IMPORT_SETTING: &str = "legacy_import_completed";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LegacyUser {
    #[serde(rename = "UID")]
    pub uid: String,
    #[serde(default)]
    pub salt: String,
    #[serde(default)]
    pub hashed_password: String,
    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub command_to_user: String,
    #[serde(default)]
    pub push_url: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub location_data: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub pictures: Vec<String>,
}

/// Empty slices were exported as `null`.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

pub fn export_path(storage_dir: &Path) -> PathBuf {
    storage_dir.join(LEGACY_EXPORT_FILE)
}

/// Import `<storage_dir>/legacy-users.json` unless it is missing or an
/// import already completed. Returns the number of accounts imported.
pub fn import_if_present(
    db: &Database,
    storage_dir: &Path,
    config: &AccountConfig,
) -> AccountResult<usize> {
    let path = export_path(storage_dir);
    if !path.exists() {
        return Ok(0);
    }

    if let Some(at) = db.get_setting(LEGACY_IMPORT_SETTING)? {
        warn!(
            "Legacy export {} still present but was already imported at {}; ignoring",
            path.display(),
            at
        );
        return Ok(0);
    }

    let raw = std::fs::read_to_string(&path)?;
    let users: Vec<LegacyUser> = serde_json::from_str(&raw)?;
    let imported = import_users(db, &users, config)?;

    let mut done = path.clone().into_os_string();
    done.push(".migrated");
    std::fs::rename(&path, &done)?;

    info!(
        "Legacy import complete: {} of {} accounts imported from {}",
        imported,
        users.len(),
        path.display()
    );
    Ok(imported)
}

/// Insert `users` in one transaction, keeping only the newest history entries
/// that fit under the configured caps. Accounts whose identifier already
/// exists are skipped.
pub fn import_users(
    db: &Database,
    users: &[LegacyUser],
    config: &AccountConfig,
) -> AccountResult<usize> {
    db.transaction(|tx| {
        let mut imported = 0;

        for user in users {
            if user.uid.is_empty() {
                warn!("Skipping legacy record without an identifier");
                continue;
            }
            if queries::account_key(tx, &user.uid)?.is_some() {
                warn!(uid = %user.uid, "Skipping legacy record, identifier already exists");
                continue;
            }

            let id = queries::create_account(
                tx,
                &NewAccount {
                    uid: &user.uid,
                    salt: &user.salt,
                    hashed_password: &user.hashed_password,
                    private_key: &user.private_key,
                    public_key: &user.public_key,
                },
            )?;

            let mut account = queries::account_by_uid(tx, &user.uid)?
                .ok_or_else(|| AccountError::NotFound(user.uid.clone()))?;
            account.command_to_user = user.command_to_user.clone();
            account.push_url = user.push_url.clone();
            queries::save_account(tx, &account)?;

            for position in newest(&user.location_data, config.max_saved_locations) {
                queries::append_entry(tx, History::Locations, id, position)?;
            }
            for content in newest(&user.pictures, config.max_saved_pictures) {
                queries::append_entry(tx, History::Pictures, id, content)?;
            }

            imported += 1;
        }

        queries::put_setting(tx, LEGACY_IMPORT_SETTING, &Utc::now().to_rfc3339())?;
        Ok(imported)
    })
}

fn newest(entries: &[String], cap: usize) -> &[String] {
    &entries[entries.len().saturating_sub(cap)..]
}
