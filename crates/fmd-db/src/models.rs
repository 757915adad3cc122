//! Database row types. These map directly to SQLite rows.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRow {
    pub id: i64,
    pub uid: String,
    /// Empty when the hashed password is a PHC string carrying its own salt.
    pub salt: String,
    pub hashed_password: String,
    pub private_key: String,
    pub public_key: String,
    pub command_to_user: String,
    pub push_url: String,
}

/// Column values for a row that has not been assigned a surrogate key yet.
#[derive(Debug, Clone, Copy)]
pub struct NewAccount<'a> {
    pub uid: &'a str,
    pub salt: &'a str,
    pub hashed_password: &'a str,
    pub private_key: &'a str,
    pub public_key: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationRow {
    pub id: i64,
    pub account_id: i64,
    pub position: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureRow {
    pub id: i64,
    pub account_id: i64,
    pub content: String,
}

/// An account with both histories loaded, oldest entry first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub account: AccountRow,
    pub locations: Vec<LocationRow>,
    pub pictures: Vec<PictureRow>,
}

/// The two bounded per-account histories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum History {
    Locations,
    Pictures,
}

impl History {
    pub(crate) fn table(self) -> &'static str {
        match self {
            Self::Locations => "locations",
            Self::Pictures => "pictures",
        }
    }

    pub(crate) fn payload_column(self) -> &'static str {
        match self {
            Self::Locations => "position",
            Self::Pictures => "content",
        }
    }
}

impl std::fmt::Display for History {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}
