//! Role-scoped permission decisions.
//!
//! One generic decision function driven by a small per-resource-type rule table:
//! - ADMIN is allowed everything.
//! - A resource type may restrict DELETE to ADMIN; that override is applied first.
//! - A resource type may open VIEW to any authenticated principal.
//! - Otherwise access is scoped: ORG_ADMIN within its organization, TEACHER on resources
//!   it owns.
//! - No principal is never allowed.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::identity::{Principal, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    View,
    Update,
    Delete,
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Action::View => "VIEW",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Student,
    Scenario,
    Session,
}

impl Display for ResourceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ResourceType::Student => "student",
            ResourceType::Scenario => "scenario",
            ResourceType::Session => "session",
        })
    }
}

/// Ownership fact for one resource, supplied by the directory. Read-only input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOwnership {
    pub resource_type: ResourceType,
    pub resource_id: i64,
    pub owner_id: i64,
    pub org_id: i64,
}

impl ResourceOwnership {
    /// `type:id`, as used in audit lines and denial messages.
    pub fn label(&self) -> String { format!("{}:{}", self.resource_type, self.resource_id) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewRule {
    AnyAuthenticated,
    Scoped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteRule {
    Scoped,
    AdminOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceRule {
    pub view: ViewRule,
    pub delete: DeleteRule,
}

impl ResourceRule {
    pub const SCOPED: ResourceRule = ResourceRule { view: ViewRule::Scoped, delete: DeleteRule::Scoped };
}

#[derive(Debug, Clone)]
pub struct PermissionPolicy {
    rules: HashMap<ResourceType, ResourceRule>,
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        let mut rules = HashMap::new();
        rules.insert(ResourceType::Student, ResourceRule { view: ViewRule::AnyAuthenticated, delete: DeleteRule::Scoped });
        rules.insert(ResourceType::Scenario, ResourceRule { view: ViewRule::AnyAuthenticated, delete: DeleteRule::AdminOnly });
        rules.insert(ResourceType::Session, ResourceRule { view: ViewRule::Scoped, delete: DeleteRule::AdminOnly });
        Self { rules }
    }
}

impl PermissionPolicy {
    pub fn with_rule(mut self, resource_type: ResourceType, rule: ResourceRule) -> Self {
        self.rules.insert(resource_type, rule);
        self
    }

    /// Unlisted resource types are fully scoped.
    pub fn rule(&self, resource_type: ResourceType) -> ResourceRule {
        self.rules.get(&resource_type).copied().unwrap_or(ResourceRule::SCOPED)
    }

    pub fn allow(&self, principal: Option<&Principal>, ownership: &ResourceOwnership, action: Action) -> bool {
        let Some(p) = principal else { return false };
        if p.role == Role::Admin {
            return true;
        }
        let rule = self.rule(ownership.resource_type);
        match action {
            Action::Delete if rule.delete == DeleteRule::AdminOnly => false,
            Action::View if rule.view == ViewRule::AnyAuthenticated => true,
            _ => scoped(p, ownership),
        }
    }

    /// `allow` as a gate: a denial becomes `AuthorizationDenied` and is logged for audit.
    pub fn authorize(&self, principal: Option<&Principal>, ownership: &ResourceOwnership, action: Action) -> AppResult<()> {
        let resource_id = ownership.label();
        if self.allow(principal, ownership, action) {
            debug!(target: "practicum::policy", subject = principal.map(|p| p.subject_id), resource = %resource_id, %action, "granted");
            return Ok(());
        }
        let role = principal.map(|p| p.role);
        warn!(
            target: "practicum::policy",
            subject = principal.map(|p| p.subject_id),
            role = role.map(|r| r.as_str()).unwrap_or("anonymous"),
            resource = %resource_id,
            %action,
            "denied"
        );
        Err(AppError::AuthorizationDenied { role, resource_id, action })
    }

    /// Gate for a resource with no ownership facts (absent or deleted). Only admins pass, so
    /// for everyone else a missing resource is indistinguishable from someone else's.
    pub fn authorize_unknown(
        &self,
        principal: Option<&Principal>,
        resource_type: ResourceType,
        resource_id: i64,
        action: Action,
    ) -> AppResult<()> {
        if principal.map(|p| p.role) == Some(Role::Admin) {
            return Ok(());
        }
        let resource_id = format!("{}:{}", resource_type, resource_id);
        warn!(
            target: "practicum::policy",
            subject = principal.map(|p| p.subject_id),
            resource = %resource_id,
            %action,
            "denied: no ownership facts"
        );
        Err(AppError::AuthorizationDenied { role: principal.map(|p| p.role), resource_id, action })
    }
}

fn scoped(p: &Principal, ownership: &ResourceOwnership) -> bool {
    match p.role {
        Role::Admin => true,
        Role::OrgAdmin => p.org_id == Some(ownership.org_id),
        Role::Teacher => p.subject_id == ownership.owner_id,
    }
}
