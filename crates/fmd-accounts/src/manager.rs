use std::sync::Arc;

use argon2::PasswordHash;
use fmd_db::{AccountRecord, AccountRow, DB_FILE_NAME, Database, History, NewAccount, queries};
use tracing::{debug, info, warn};

use crate::access::{AccessController, AccessToken};
use crate::config::AccountConfig;
use crate::error::{AccountError, AccountResult};
use crate::id::IdGenerator;
use crate::legacy;

/// Entry point for account lifecycle, history retention and credential checks.
///
/// Every load-modify-save runs inside one immediate transaction, so
/// concurrent setters on the same account serialize instead of losing writes.
pub struct AccountManager {
    db: Arc<Database>,
    ids: IdGenerator,
    max_saved_locations: usize,
    max_saved_pictures: usize,
}

impl AccountManager {
    /// Open (or create) `<storage_dir>/fmd.db` and import a pending legacy
    /// export if one is present.
    pub fn open(config: &AccountConfig) -> AccountResult<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.storage_dir)?;

        let db = Arc::new(Database::open(&config.storage_dir.join(DB_FILE_NAME))?);
        let manager = Self::with_database(db, config)?;

        legacy::import_if_present(&manager.db, &config.storage_dir, config)?;

        Ok(manager)
    }

    pub fn with_database(db: Arc<Database>, config: &AccountConfig) -> AccountResult<Self> {
        config.validate()?;
        Ok(Self {
            db,
            ids: IdGenerator::new(config.id_length),
            max_saved_locations: config.max_saved_locations,
            max_saved_pictures: config.max_saved_pictures,
        })
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    // -- Lifecycle --

    /// Create an account under a freshly minted identifier and return it.
    pub fn create_account(
        &self,
        private_key: &str,
        public_key: &str,
        salt: &str,
        hashed_password: &str,
    ) -> AccountResult<String> {
        loop {
            let uid = self.ids.generate()?;
            if self.db.account_key(&uid)?.is_some() {
                warn!("Generated identifier collided with an existing account, retrying");
                continue;
            }

            let inserted = self.db.create_account(&NewAccount {
                uid: &uid,
                salt,
                hashed_password,
                private_key,
                public_key,
            });
            match inserted {
                Ok(id) => {
                    info!(account_id = id, "Account created");
                    return Ok(uid);
                }
                // Lost a race with a concurrent creator; the UNIQUE index caught it.
                Err(e) if e.is_unique_violation() => {
                    warn!("Identifier taken between check and insert, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn update_password(
        &self,
        uid: &str,
        private_key: &str,
        salt: &str,
        hashed_password: &str,
    ) -> AccountResult<()> {
        self.modify(uid, |account| {
            account.hashed_password = hashed_password.to_string();
            account.salt = salt.to_string();
            account.private_key = private_key.to_string();
        })
    }

    pub fn delete_account(&self, uid: &str) -> AccountResult<()> {
        self.db.transaction(|tx| {
            let id = queries::account_key(tx, uid)?.ok_or_else(|| not_found(uid))?;
            queries::delete_account(tx, id)?;
            Ok::<_, AccountError>(())
        })?;
        info!(uid, "Account deleted");
        Ok(())
    }

    /// Full record with both histories, `None` if the account does not exist.
    pub fn account(&self, uid: &str) -> AccountResult<Option<AccountRecord>> {
        Ok(self.db.account_record_by_uid(uid)?)
    }

    /// Highest account surrogate key, `None` for an empty store.
    pub fn last_sequence(&self) -> AccountResult<Option<i64>> {
        Ok(self.db.last_account_id()?)
    }

    pub fn account_count(&self) -> AccountResult<usize> {
        Ok(self.db.account_count()?)
    }

    // -- History --

    pub fn add_location(&self, uid: &str, position: &str) -> AccountResult<()> {
        self.append(History::Locations, uid, position)
    }

    pub fn add_picture(&self, uid: &str, content: &str) -> AccountResult<()> {
        self.append(History::Pictures, uid, content)
    }

    /// Location at `index`, oldest first. `None` when there are no locations.
    pub fn location(&self, uid: &str, index: usize) -> AccountResult<Option<String>> {
        self.entry(History::Locations, uid, index)
    }

    /// Picture at `index`, oldest first. `None` when there are no pictures.
    pub fn picture(&self, uid: &str, index: usize) -> AccountResult<Option<String>> {
        self.entry(History::Pictures, uid, index)
    }

    pub fn location_count(&self, uid: &str) -> AccountResult<usize> {
        self.count(History::Locations, uid)
    }

    pub fn picture_count(&self, uid: &str) -> AccountResult<usize> {
        self.count(History::Pictures, uid)
    }

    fn cap(&self, history: History) -> usize {
        match history {
            History::Locations => self.max_saved_locations,
            History::Pictures => self.max_saved_pictures,
        }
    }

    fn append(&self, history: History, uid: &str, payload: &str) -> AccountResult<()> {
        let keep = self.cap(history);
        let evicted = self.db.transaction(|tx| {
            let id = queries::account_key(tx, uid)?.ok_or_else(|| not_found(uid))?;
            queries::append_entry(tx, history, id, payload)?;
            Ok::<_, AccountError>(queries::evict_oldest(tx, history, id, keep)?)
        })?;
        if evicted > 0 {
            debug!(uid, %history, evicted, "Evicted oldest entries over the cap");
        }
        Ok(())
    }

    fn entry(&self, history: History, uid: &str, index: usize) -> AccountResult<Option<String>> {
        let found = self.db.with_conn(|conn| {
            let Some(id) = queries::account_key(conn, uid)? else {
                return Ok(None);
            };
            let len = queries::count_entries(conn, history, id)?;
            let payload = if index < len {
                queries::entry_at(conn, history, id, index)?
            } else {
                None
            };
            Ok(Some((len, payload)))
        })?;

        let (len, payload) = found.ok_or_else(|| not_found(uid))?;
        if len == 0 {
            return Ok(None);
        }
        if index >= len {
            return Err(AccountError::OutOfRange { index, len });
        }
        Ok(payload)
    }

    fn count(&self, history: History, uid: &str) -> AccountResult<usize> {
        let id = self.db.account_key(uid)?.ok_or_else(|| not_found(uid))?;
        Ok(self.db.count_entries(history, id)?)
    }

    // -- Fields --

    pub fn private_key(&self, uid: &str) -> AccountResult<String> {
        self.read(uid, |account| account.private_key)
    }

    pub fn set_private_key(&self, uid: &str, key: &str) -> AccountResult<()> {
        self.modify(uid, |account| account.private_key = key.to_string())
    }

    pub fn public_key(&self, uid: &str) -> AccountResult<String> {
        self.read(uid, |account| account.public_key)
    }

    pub fn set_public_key(&self, uid: &str, key: &str) -> AccountResult<()> {
        self.modify(uid, |account| account.public_key = key.to_string())
    }

    pub fn command_to_user(&self, uid: &str) -> AccountResult<String> {
        self.read(uid, |account| account.command_to_user)
    }

    pub fn set_command_to_user(&self, uid: &str, command: &str) -> AccountResult<()> {
        self.modify(uid, |account| account.command_to_user = command.to_string())
    }

    pub fn push_url(&self, uid: &str) -> AccountResult<String> {
        self.read(uid, |account| account.push_url)
    }

    pub fn set_push_url(&self, uid: &str, push_url: &str) -> AccountResult<()> {
        self.modify(uid, |account| account.push_url = push_url.to_string())
    }

    /// Stored salt, or the salt embedded in the PHC-encoded hash when none
    /// was stored. The derived value is not written back.
    pub fn salt(&self, uid: &str) -> AccountResult<String> {
        let account = self.load(uid)?;
        if !account.salt.is_empty() {
            return Ok(account.salt);
        }
        salt_from_phc(&account.hashed_password)
    }

    fn load(&self, uid: &str) -> AccountResult<AccountRow> {
        self.db.account_by_uid(uid)?.ok_or_else(|| not_found(uid))
    }

    fn read<T>(&self, uid: &str, f: impl FnOnce(AccountRow) -> T) -> AccountResult<T> {
        self.load(uid).map(f)
    }

    fn modify(&self, uid: &str, f: impl FnOnce(&mut AccountRow)) -> AccountResult<()> {
        self.db.transaction(|tx| {
            let mut account = queries::account_by_uid(tx, uid)?.ok_or_else(|| not_found(uid))?;
            f(&mut account);
            queries::save_account(tx, &account)?;
            Ok(())
        })
    }

    // -- Access --

    /// Check `hashed_password` against the stored hash and, on a match, clear
    /// the lockout and issue a token through `access`.
    ///
    /// The comparison ignores case. A missing account and a wrong hash both
    /// yield `(false, AccessToken::default())`.
    pub fn request_access(
        &self,
        access: &dyn AccessController,
        uid: &str,
        hashed_password: &str,
    ) -> AccountResult<(bool, AccessToken)> {
        let Some(account) = self.db.account_by_uid(uid)? else {
            return Ok((false, AccessToken::default()));
        };

        if account.hashed_password.to_lowercase() != hashed_password.to_lowercase() {
            return Ok((false, AccessToken::default()));
        }

        access.reset_lock(uid);
        let token = access.put_access(uid);
        debug!(uid, "Access granted");
        Ok((true, token))
    }
}

fn not_found(uid: &str) -> AccountError {
    AccountError::NotFound(uid.to_string())
}

fn salt_from_phc(hash: &str) -> AccountResult<String> {
    let parsed =
        PasswordHash::new(hash).map_err(|e| AccountError::InvalidPasswordHash(e.to_string()))?;
    let salt = parsed
        .salt
        .ok_or_else(|| AccountError::InvalidPasswordHash("no salt segment".into()))?;
    Ok(salt.as_str().to_string())
}
