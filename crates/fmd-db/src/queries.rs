use crate::models::{AccountRecord, AccountRow, History, LocationRow, NewAccount, PictureRow};
use crate::{Database, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};

const ACCOUNT_COLUMNS: &str =
    "id, uid, salt, hashed_password, private_key, public_key, command_to_user, push_url";

impl Database {
    // -- Accounts --

    /// Highest account surrogate key, `None` for an empty store.
    pub fn last_account_id(&self) -> Result<Option<i64>> {
        self.with_conn(last_account_id)
    }

    pub fn account_count(&self) -> Result<usize> {
        self.with_conn(account_count)
    }

    pub fn account_key(&self, uid: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| account_key(conn, uid))
    }

    pub fn account_by_uid(&self, uid: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| account_by_uid(conn, uid))
    }

    pub fn account_record_by_uid(&self, uid: &str) -> Result<Option<AccountRecord>> {
        self.with_conn(|conn| account_record_by_uid(conn, uid))
    }

    pub fn create_account(&self, account: &NewAccount<'_>) -> Result<i64> {
        self.with_conn(|conn| create_account(conn, account))
    }

    pub fn save_account(&self, account: &AccountRow) -> Result<()> {
        self.with_conn(|conn| save_account(conn, account))
    }

    pub fn delete_account(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| delete_account(conn, id))
    }

    // -- History --

    pub fn count_entries(&self, history: History, account_id: i64) -> Result<usize> {
        self.with_conn(|conn| count_entries(conn, history, account_id))
    }

    // -- Settings --

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| get_setting(conn, key))
    }

    pub fn put_setting(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn(|conn| put_setting(conn, key, value))
    }
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<AccountRow> {
    Ok(AccountRow {
        id: row.get(0)?,
        uid: row.get(1)?,
        salt: row.get(2)?,
        hashed_password: row.get(3)?,
        private_key: row.get(4)?,
        public_key: row.get(5)?,
        command_to_user: row.get(6)?,
        push_url: row.get(7)?,
    })
}

pub fn last_account_id(conn: &Connection) -> Result<Option<i64>> {
    let id = conn.query_row("SELECT MAX(id) FROM accounts", [], |row| {
        row.get::<_, Option<i64>>(0)
    })?;
    Ok(id)
}

pub fn account_count(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
    Ok(count as usize)
}

/// Surrogate key for `uid`, without loading the row.
pub fn account_key(conn: &Connection, uid: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row("SELECT id FROM accounts WHERE uid = ?1", [uid], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(id)
}

pub fn account_by_uid(conn: &Connection, uid: &str) -> Result<Option<AccountRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE uid = ?1"
    ))?;
    let row = stmt.query_row([uid], account_from_row).optional()?;
    Ok(row)
}

/// Account plus both histories in insertion order. `None` is "not found",
/// not an error.
pub fn account_record_by_uid(conn: &Connection, uid: &str) -> Result<Option<AccountRecord>> {
    let Some(account) = account_by_uid(conn, uid)? else {
        return Ok(None);
    };
    let locations = locations_for(conn, account.id)?;
    let pictures = pictures_for(conn, account.id)?;
    Ok(Some(AccountRecord {
        account,
        locations,
        pictures,
    }))
}

pub fn create_account(conn: &Connection, account: &NewAccount<'_>) -> Result<i64> {
    conn.execute(
        "INSERT INTO accounts (uid, salt, hashed_password, private_key, public_key)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            account.uid,
            account.salt,
            account.hashed_password,
            account.private_key,
            account.public_key,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Upsert keyed by the surrogate id.
pub fn save_account(conn: &Connection, account: &AccountRow) -> Result<()> {
    conn.execute(
        "INSERT INTO accounts (id, uid, salt, hashed_password, private_key, public_key, command_to_user, push_url)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
            uid = excluded.uid,
            salt = excluded.salt,
            hashed_password = excluded.hashed_password,
            private_key = excluded.private_key,
            public_key = excluded.public_key,
            command_to_user = excluded.command_to_user,
            push_url = excluded.push_url",
        params![
            account.id,
            account.uid,
            account.salt,
            account.hashed_password,
            account.private_key,
            account.public_key,
            account.command_to_user,
            account.push_url,
        ],
    )?;
    Ok(())
}

/// Deletes the account; its locations and pictures go with it.
pub fn delete_account(conn: &Connection, id: i64) -> Result<bool> {
    let n = conn.execute("DELETE FROM accounts WHERE id = ?1", [id])?;
    Ok(n > 0)
}

// -- Locations / pictures --

pub fn locations_for(conn: &Connection, account_id: i64) -> Result<Vec<LocationRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, account_id, position FROM locations WHERE account_id = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map([account_id], |row| {
            Ok(LocationRow {
                id: row.get(0)?,
                account_id: row.get(1)?,
                position: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn pictures_for(conn: &Connection, account_id: i64) -> Result<Vec<PictureRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, account_id, content FROM pictures WHERE account_id = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map([account_id], |row| {
            Ok(PictureRow {
                id: row.get(0)?,
                account_id: row.get(1)?,
                content: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn create_location(conn: &Connection, account_id: i64, position: &str) -> Result<i64> {
    append_entry(conn, History::Locations, account_id, position)
}

pub fn save_location(conn: &Connection, location: &LocationRow) -> Result<()> {
    save_entry(
        conn,
        History::Locations,
        location.id,
        location.account_id,
        &location.position,
    )
}

pub fn delete_location(conn: &Connection, id: i64) -> Result<bool> {
    delete_entry(conn, History::Locations, id)
}

pub fn create_picture(conn: &Connection, account_id: i64, content: &str) -> Result<i64> {
    append_entry(conn, History::Pictures, account_id, content)
}

pub fn save_picture(conn: &Connection, picture: &PictureRow) -> Result<()> {
    save_entry(
        conn,
        History::Pictures,
        picture.id,
        picture.account_id,
        &picture.content,
    )
}

pub fn delete_picture(conn: &Connection, id: i64) -> Result<bool> {
    delete_entry(conn, History::Pictures, id)
}

/// Inserts a history entry and returns its surrogate key.
pub fn append_entry(
    conn: &Connection,
    history: History,
    account_id: i64,
    payload: &str,
) -> Result<i64> {
    conn.execute(
        &format!(
            "INSERT INTO {} (account_id, {}) VALUES (?1, ?2)",
            history.table(),
            history.payload_column()
        ),
        params![account_id, payload],
    )?;
    Ok(conn.last_insert_rowid())
}

fn save_entry(
    conn: &Connection,
    history: History,
    id: i64,
    account_id: i64,
    payload: &str,
) -> Result<()> {
    let column = history.payload_column();
    conn.execute(
        &format!(
            "INSERT INTO {table} (id, account_id, {column}) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                account_id = excluded.account_id,
                {column} = excluded.{column}",
            table = history.table(),
        ),
        params![id, account_id, payload],
    )?;
    Ok(())
}

fn delete_entry(conn: &Connection, history: History, id: i64) -> Result<bool> {
    let n = conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1", history.table()),
        [id],
    )?;
    Ok(n > 0)
}

pub fn count_entries(conn: &Connection, history: History, account_id: i64) -> Result<usize> {
    let count: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM {} WHERE account_id = ?1",
            history.table()
        ),
        [account_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

/// Payload at zero-based `index` in insertion order.
pub fn entry_at(
    conn: &Connection,
    history: History,
    account_id: i64,
    index: usize,
) -> Result<Option<String>> {
    // No table holds more than i64::MAX rows.
    let Ok(offset) = i64::try_from(index) else {
        return Ok(None);
    };
    let payload = conn
        .query_row(
            &format!(
                "SELECT {} FROM {} WHERE account_id = ?1 ORDER BY id LIMIT 1 OFFSET ?2",
                history.payload_column(),
                history.table()
            ),
            params![account_id, offset],
            |row| row.get(0),
        )
        .optional()?;
    Ok(payload)
}

/// Deletes the oldest entries until at most `keep` remain. Returns how many
/// rows were removed.
pub fn evict_oldest(
    conn: &Connection,
    history: History,
    account_id: i64,
    keep: usize,
) -> Result<usize> {
    let count = count_entries(conn, history, account_id)?;
    if count <= keep {
        return Ok(0);
    }
    let excess = count - keep;
    let table = history.table();
    let n = conn.execute(
        &format!(
            "DELETE FROM {table} WHERE id IN (
                SELECT id FROM {table} WHERE account_id = ?1 ORDER BY id LIMIT ?2
             )"
        ),
        params![account_id, excess as i64],
    )?;
    Ok(n)
}

// -- Settings --

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM settings WHERE setting = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

pub fn put_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (setting, value) VALUES (?1, ?2)
         ON CONFLICT(setting) DO UPDATE SET value = excluded.value",
        [key, value],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_account(db: &Database, uid: &str) -> i64 {
        db.create_account(&NewAccount {
            uid,
            salt: "salt",
            hashed_password: "hash",
            private_key: "priv",
            public_key: "pub",
        })
        .unwrap()
    }

    #[test]
    fn test_last_account_id() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.last_account_id().unwrap(), None);

        new_account(&db, "first");
        let second = new_account(&db, "second");
        assert_eq!(db.last_account_id().unwrap(), Some(second));
    }

    #[test]
    fn test_find_missing_account_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.account_record_by_uid("nobody").unwrap().is_none());
        assert!(db.account_key("nobody").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_uid_is_unique_violation() {
        let db = Database::open_in_memory().unwrap();
        new_account(&db, "dup");

        let err = db
            .create_account(&NewAccount {
                uid: "dup",
                salt: "",
                hashed_password: "",
                private_key: "",
                public_key: "",
            })
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[test]
    fn test_save_account_updates_in_place() {
        let db = Database::open_in_memory().unwrap();
        new_account(&db, "u1");

        let mut account = db.account_by_uid("u1").unwrap().unwrap();
        account.push_url = "https://push.example/abc".into();
        account.command_to_user = "locate".into();
        db.save_account(&account).unwrap();

        let reloaded = db.account_by_uid("u1").unwrap().unwrap();
        assert_eq!(reloaded, account);
        assert_eq!(db.account_count().unwrap(), 1);
    }

    #[test]
    fn test_record_loads_history_in_insertion_order() {
        let db = Database::open_in_memory().unwrap();
        let id = new_account(&db, "u1");

        db.with_conn(|conn| {
            create_location(conn, id, "L1")?;
            create_location(conn, id, "L2")?;
            create_picture(conn, id, "P1")?;
            Ok(())
        })
        .unwrap();

        let record = db.account_record_by_uid("u1").unwrap().unwrap();
        let positions: Vec<_> = record.locations.iter().map(|l| l.position.as_str()).collect();
        assert_eq!(positions, vec!["L1", "L2"]);
        assert_eq!(record.pictures.len(), 1);
        assert_eq!(record.pictures[0].content, "P1");
        assert_eq!(record.pictures[0].account_id, id);
    }

    #[test]
    fn test_delete_account_cascades() {
        let db = Database::open_in_memory().unwrap();
        let id = new_account(&db, "u1");
        let other = new_account(&db, "u2");

        db.with_conn(|conn| {
            create_location(conn, id, "L1")?;
            create_picture(conn, id, "P1")?;
            create_location(conn, other, "keep")?;
            Ok(())
        })
        .unwrap();

        assert!(db.delete_account(id).unwrap());
        assert!(!db.delete_account(id).unwrap());
        assert!(db.account_by_uid("u1").unwrap().is_none());
        assert_eq!(db.count_entries(History::Locations, id).unwrap(), 0);
        assert_eq!(db.count_entries(History::Pictures, id).unwrap(), 0);
        assert_eq!(db.count_entries(History::Locations, other).unwrap(), 1);
    }

    #[test]
    fn test_evict_oldest_keeps_newest() {
        let db = Database::open_in_memory().unwrap();
        let id = new_account(&db, "u1");

        let evicted = db
            .with_conn(|conn| {
                for p in ["L1", "L2", "L3", "L4", "L5"] {
                    create_location(conn, id, p)?;
                }
                evict_oldest(conn, History::Locations, id, 3)
            })
            .unwrap();
        assert_eq!(evicted, 2);

        let remaining: Vec<_> = db
            .with_conn(|conn| locations_for(conn, id))
            .unwrap()
            .into_iter()
            .map(|l| l.position)
            .collect();
        assert_eq!(remaining, vec!["L3", "L4", "L5"]);

        let nothing = db
            .with_conn(|conn| evict_oldest(conn, History::Locations, id, 3))
            .unwrap();
        assert_eq!(nothing, 0);
    }

    #[test]
    fn test_entry_at_and_typed_entry_ops() {
        let db = Database::open_in_memory().unwrap();
        let id = new_account(&db, "u1");

        db.with_conn(|conn| {
            let first = create_picture(conn, id, "P1")?;
            create_picture(conn, id, "P2")?;
            save_picture(
                conn,
                &PictureRow {
                    id: first,
                    account_id: id,
                    content: "P1-edited".into(),
                },
            )?;
            assert_eq!(entry_at(conn, History::Pictures, id, 0)?.as_deref(), Some("P1-edited"));
            assert_eq!(entry_at(conn, History::Pictures, id, 1)?.as_deref(), Some("P2"));
            assert_eq!(entry_at(conn, History::Pictures, id, 2)?, None);
            assert_eq!(entry_at(conn, History::Pictures, id, usize::MAX)?, None);

            assert!(delete_picture(conn, first)?);
            assert_eq!(entry_at(conn, History::Pictures, id, 0)?.as_deref(), Some("P2"));

            let loc = create_location(conn, id, "L1")?;
            save_location(
                conn,
                &LocationRow {
                    id: loc,
                    account_id: id,
                    position: "L1-edited".into(),
                },
            )?;
            assert_eq!(entry_at(conn, History::Locations, id, 0)?.as_deref(), Some("L1-edited"));
            assert!(delete_location(conn, loc)?);
            assert_eq!(count_entries(conn, History::Locations, id)?, 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_history_rejects_unknown_account() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .with_conn(|conn| create_location(conn, 42, "orphan"))
            .unwrap_err();
        assert!(matches!(err, crate::DbError::Sqlite(_)));
    }

    #[test]
    fn test_settings_upsert() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get_setting("version").unwrap(), None);

        db.put_setting("version", "1").unwrap();
        db.put_setting("version", "2").unwrap();
        assert_eq!(db.get_setting("version").unwrap().as_deref(), Some("2"));
    }
}
