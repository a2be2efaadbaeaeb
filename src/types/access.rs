use std::fmt;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Account tier of a user. Elevated tiers unlock private playgrounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Sponsor,
    Pro,
    Admin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::User, Role::Sponsor, Role::Pro, Role::Admin];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Sponsor => "sponsor",
            Role::Pro => "pro",
            Role::Admin => "admin",
        }
    }

    /// Parses a role from its wire name.
    pub fn parse(s: &str) -> Option<Role> {
        Self::ALL.into_iter().find(|r| r.as_str() == s)
    }

    /// Returns true if this role may set or keep `Privacy::Private`.
    #[must_use]
    pub const fn can_use_private(self) -> bool {
        matches!(self, Role::Sponsor | Role::Pro | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility of a playground.
///
/// - `Public`: listed and fetchable by anyone.
/// - `Secret`: fetchable by anyone who knows the hash, never listed to others.
/// - `Private`: visible to the owner only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    Private,
    Secret,
    #[default]
    Public,
}

impl Privacy {
    pub const ALL: [Privacy; 3] = [Privacy::Private, Privacy::Secret, Privacy::Public];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Privacy::Private => "private",
            Privacy::Secret => "secret",
            Privacy::Public => "public",
        }
    }

    pub fn parse(s: &str) -> Option<Privacy> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

impl fmt::Display for Privacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Role::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown role '{s}'").into()))
    }
}

impl ToSql for Privacy {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Privacy {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Privacy::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown privacy '{s}'").into()))
    }
}
