use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Caller role. ADMIN is global, ORG_ADMIN is scoped to one organization, TEACHER to
/// resources it owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    OrgAdmin,
    Teacher,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::OrgAdmin => "ORG_ADMIN",
            Role::Teacher => "TEACHER",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// Identity resolved from a verified access token. Lives for one request; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub subject_id: i64,
    pub display_name: String,
    pub role: Role,
    /// Organization of the subject at resolution time. ADMIN may have none.
    #[serde(default)]
    pub org_id: Option<i64>,
}
