//! The authenticated caller of a request.

use engine::UserRole;

/// Inserted into the request extensions by the auth middleware.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentUser {
    pub username: String,
    pub role: UserRole,
}
