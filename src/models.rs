use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A physical serving location
///
/// Every canteen owns its own item collection in the document store.
/// The label is what users see and what order records carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Canteen {
    #[default]
    It,
    Mba,
    Main,
}

impl Canteen {
    pub const ALL: [Canteen; 3] = [Canteen::It, Canteen::Mba, Canteen::Main];

    /// Display label, e.g. `"IT"`
    pub fn label(self) -> &'static str {
        match self {
            Canteen::It => "IT",
            Canteen::Mba => "MBA",
            Canteen::Main => "MAIN",
        }
    }

    /// Name of the item collection backing this canteen
    pub fn collection(self) -> &'static str {
        match self {
            Canteen::It => "items",
            Canteen::Mba => "items1",
            Canteen::Main => "items2",
        }
    }
}

impl fmt::Display for Canteen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown canteen: {0}")]
pub struct ParseCanteenError(pub String);

impl FromStr for Canteen {
    type Err = ParseCanteenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Canteen::ALL
            .into_iter()
            .find(|canteen| canteen.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseCanteenError(s.to_string()))
    }
}

impl TryFrom<String> for Canteen {
    type Error = ParseCanteenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Canteen> for String {
    fn from(canteen: Canteen) -> Self {
        canteen.label().to_string()
    }
}

/// Catalog entry of a canteen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    /// Price in whole currency units
    pub cost: u32,
    /// Cumulative units sold; only order placement touches it
    pub quantity_sold: u64,
}

/// Purchase-time snapshot of an item
///
/// `item_name` and `cost` are copies, not references: editing or deleting
/// the item later leaves the order untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub token: String,
    pub item_name: String,
    pub cost: u32,
    pub timestamp: DateTime<Utc>,
    pub canteen: Canteen,
    pub username: String,
}

/// Stored login record for a user or an administrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    /// Argon2 PHC string
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Which credential collection an account lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn collection(self) -> &'static str {
        match self {
            Role::User => "user_detail",
            Role::Admin => "admin",
        }
    }
}

/// Verified identity attached to a request by the session middleware
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub username: String,
    pub role: Role,
}
