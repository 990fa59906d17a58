use serde::{Deserialize, Serialize};

// Closed role set. The UI never sees any role string outside these five.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    SuperAdmin,
    Admin,
    Owner,
    Manager,
    Staff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ManageBrands,
    ManageUsers,
    AuthorContent,
    ViewCourses,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManageBrands => "manageBrands",
            Self::ManageUsers => "manageUsers",
            Self::AuthorContent => "authorContent",
            Self::ViewCourses => "viewCourses",
        }
    }
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "superadmin" => Some(Self::SuperAdmin),
            "admin" => Some(Self::Admin),
            "owner" => Some(Self::Owner),
            "manager" => Some(Self::Manager),
            "staff" => Some(Self::Staff),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SuperAdmin => "superAdmin",
            Self::Admin => "admin",
            Self::Owner => "owner",
            Self::Manager => "manager",
            Self::Staff => "staff",
        }
    }

    // Platform roles act across brands; the rest are pinned to their own.
    pub fn is_platform(self) -> bool {
        matches!(self, Self::SuperAdmin | Self::Admin)
    }

    pub fn can(self, capability: Capability) -> bool {
        match capability {
            Capability::ManageBrands => matches!(self, Self::SuperAdmin | Self::Admin),
            Capability::ManageUsers => {
                matches!(self, Self::SuperAdmin | Self::Admin | Self::Owner | Self::Manager)
            }
            Capability::AuthorContent => {
                matches!(self, Self::SuperAdmin | Self::Admin | Self::Owner | Self::Manager)
            }
            Capability::ViewCourses => true,
        }
    }

    // Whether a user with this role may grant `target` to someone else
    // (invites and role changes use the same matrix).
    pub fn can_assign(self, target: Role) -> bool {
        match self {
            Self::SuperAdmin => true,
            Self::Admin => target != Self::SuperAdmin,
            Self::Owner => matches!(target, Self::Manager | Self::Staff),
            Self::Manager => target == Self::Staff,
            Self::Staff => false,
        }
    }
}
