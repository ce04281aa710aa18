/// Authentication context for request handlers
///
/// After the API server's JWT layer validates a token, it inserts an
/// [`AuthContext`] into the request extensions; handlers extract it with
/// the framework's `Extension` extractor.
///
/// # Example
///
/// ```
/// use teamflow_shared::auth::jwt::{Claims, TokenType};
/// use teamflow_shared::auth::middleware::AuthContext;
///
/// let claims = Claims::new(uuid::Uuid::new_v4(), TokenType::Access);
/// let ctx = AuthContext::from_claims(&claims);
/// assert_eq!(ctx.user_id, claims.sub);
/// ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::jwt::Claims;

/// Authentication context added to request extensions
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AuthContext {
    /// Authenticated user ID
    pub user_id: Uuid,
}

impl AuthContext {
    /// Creates auth context from validated JWT claims
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            user_id: claims.sub,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::TokenType;

    #[test]
    fn test_auth_context_from_claims() {
        let user_id = Uuid::new_v4();
        let claims = Claims::new(user_id, TokenType::Access);

        let ctx = AuthContext::from_claims(&claims);
        assert_eq!(ctx.user_id, user_id);
    }
}
