//! Authentication and authorization: tokens, revocation, principal resolution and the
//! permission policy. Keep the public surface thin and split implementation across
//! sub-modules.

mod password;
mod policy;
mod principal;
mod provider;
mod request_context;
mod resolver;
mod revocation;
mod token;

pub use password::{hash_password, verify_password};
pub use policy::{Action, DeleteRule, PermissionPolicy, ResourceOwnership, ResourceRule, ResourceType, ViewRule};
pub use principal::{Principal, Role};
pub use provider::{AuthProvider, LocalAuthProvider, LoginRequest, SignupRequest, TokenPair, UserInfo};
pub use request_context::RequestContext;
pub use resolver::{bearer_token, PrincipalResolver};
pub use revocation::{KvRevocationBackend, RevocationBackend, RevocationEntry, RevocationStore, StoreError};
pub use token::{Claims, IssuedToken, TokenError, TokenService, TokenType};
