use crate::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (accounts, history, settings)");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS accounts (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                uid              TEXT NOT NULL UNIQUE,
                salt             TEXT NOT NULL DEFAULT '',
                hashed_password  TEXT NOT NULL DEFAULT '',
                private_key      TEXT NOT NULL DEFAULT '',
                public_key       TEXT NOT NULL DEFAULT '',
                command_to_user  TEXT NOT NULL DEFAULT '',
                push_url         TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS locations (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id  INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                position    TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_locations_account
                ON locations(account_id, id);

            CREATE TABLE IF NOT EXISTS pictures (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id  INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                content     TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_pictures_account
                ON pictures(account_id, id);

            CREATE TABLE IF NOT EXISTS settings (
                id       INTEGER PRIMARY KEY AUTOINCREMENT,
                setting  TEXT NOT NULL UNIQUE,
                value    TEXT NOT NULL DEFAULT ''
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
