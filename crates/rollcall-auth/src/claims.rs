//! JWT claim structure for access tokens.

use rollcall_models::Role;
use serde::{Deserialize, Serialize};

/// Claims embedded in every access token.
///
/// - `sub`: subject (UIN)
/// - `role`: role at issue time
/// - `iat` / `exp`: issued-at and expiry, Unix seconds
/// - `iss`: issuer, checked against configuration
/// - `jti`: unique token id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub jti: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_serialize() {
        let claims = Claims {
            sub: "870101300123".to_string(),
            role: Role::Teacher,
            iat: 1_700_000_000,
            exp: 1_700_003_600,
            iss: "rollcall".to_string(),
            jti: "abc".to_string(),
        };
        let serialized = serde_json::to_string(&claims).unwrap();
        assert!(serialized.contains(r#""sub":"870101300123""#));
        assert!(serialized.contains(r#""role":"teacher""#));
    }

    #[test]
    fn test_claims_deserialize_requires_role() {
        let json = r#"{"sub":"u1","iat":1,"exp":2,"iss":"rollcall","jti":"x"}"#;
        assert!(serde_json::from_str::<Claims>(json).is_err());
    }
}
