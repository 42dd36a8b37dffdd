use crate::services::identity::SystemIdentity;

/// Members of this group get the administrative commands
pub const SUPPORT_GROUP: &str = "support";

/// Who is running the tool, which decides the commands on offer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// root or a member of [`SUPPORT_GROUP`]
    Admin,
    /// Anyone else; may only list their own files
    User { uid: u32 },
}

impl Role {
    /// Resolve the role of the calling process
    pub fn resolve(identity: &SystemIdentity) -> Self {
        let uid = identity.current_uid();
        if uid == 0 || identity.in_group(SUPPORT_GROUP) {
            tracing::debug!("uid {} resolved as administrator", uid);
            Self::Admin
        } else {
            Self::User { uid }
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}
