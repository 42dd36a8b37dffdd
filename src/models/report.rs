use std::fmt;

/// Numeric ids below this are system accounts on most UNIX systems.
pub const MAX_SYSTEM_UID: u32 = 499;

/// Account status of a file owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UserCategory {
    Real,
    System,
    Departed,
}

impl UserCategory {
    /// Categorize an owner id.
    ///
    /// `resolvable` is whether the identity database knows the id.
    pub fn from_uid(uid: u32, resolvable: bool) -> Self {
        if !resolvable {
            Self::Departed
        } else if uid < MAX_SYSTEM_UID {
            Self::System
        } else {
            Self::Real
        }
    }

    /// Heading used in the administrator summary
    pub fn heading(self) -> &'static str {
        match self {
            Self::Real => "Real Users",
            Self::System => "System Users",
            Self::Departed => "Departed Users",
        }
    }
}

impl fmt::Display for UserCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Real => "REAL",
            Self::System => "SYSTEM",
            Self::Departed => "DEPARTED",
        };
        f.write_str(name)
    }
}

/// Where a candidate file ends up after classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Delete,
    Except,
}

/// Which per-user lists an operation covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    User(u32),
    AllUsers,
}

/// Aggregated per-owner counts for reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCountRecord {
    /// Login name, or the decimal id for departed accounts
    pub user_name: String,
    pub uid: u32,
    pub category: UserCategory,
    pub total: usize,
    pub to_delete: usize,
    pub to_except: usize,
}

impl UserCountRecord {
    /// Summary row: `name total delete except`
    pub fn summary_line(&self) -> String {
        format!(
            "{} {} {} {}",
            self.user_name, self.total, self.to_delete, self.to_except
        )
    }
}
