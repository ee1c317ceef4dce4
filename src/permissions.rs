use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Permission groups known to the file host, ordered from least to most
/// privileged. The numeric level is what the `users.permission` column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Permission {
    User,
    Vip,
    Vvip,
    Moderator,
    Admin,
    Superadmin,
}

impl Permission {
    pub const ALL: [Permission; 6] = [
        Permission::User,
        Permission::Vip,
        Permission::Vvip,
        Permission::Moderator,
        Permission::Admin,
        Permission::Superadmin,
    ];

    pub const fn level(self) -> i64 {
        match self {
            Permission::User => 0,
            Permission::Vip => 5,
            Permission::Vvip => 10,
            Permission::Moderator => 50,
            Permission::Admin => 80,
            Permission::Superadmin => 100,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Permission::User => "user",
            Permission::Vip => "vip",
            Permission::Vvip => "vvip",
            Permission::Moderator => "moderator",
            Permission::Admin => "admin",
            Permission::Superadmin => "superadmin",
        }
    }

    /// Exact match on a stored level.
    pub fn from_level(level: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.level() == level)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid permission group: {value}")]
pub struct PermissionError {
    value: String,
}

impl FromStr for Permission {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| PermissionError {
                value: s.to_string(),
            })
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
