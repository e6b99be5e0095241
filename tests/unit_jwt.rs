use chrono::{Duration, TimeZone, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};

use rollcall_auth::{Claims, TokenError, TokenIssuer};
use rollcall_config::JwtConfig;
use rollcall_core::ManualClock;
use rollcall_models::{Role, SubjectId};

const SECRET: &str = "test_secret_key_for_testing_purposes_0123";

fn get_test_jwt_config() -> JwtConfig {
    JwtConfig::new(SECRET, 3600, "rollcall").unwrap()
}

fn issuer() -> (TokenIssuer, std::sync::Arc<ManualClock>) {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap());
    (TokenIssuer::new(&get_test_jwt_config(), clock.clone()), clock)
}

fn subject(uin: &str) -> SubjectId {
    SubjectId::parse(uin).unwrap()
}

fn segments(token: &str) -> Vec<&str> {
    token.split('.').collect()
}

#[test]
fn test_issue_and_validate_all_roles() {
    let (tokens, _) = issuer();

    for role in [Role::Student, Role::Teacher, Role::Admin] {
        let issued = tokens.issue(&subject("U1"), role).unwrap();
        let verified = tokens.validate(&issued.token).unwrap();
        assert_eq!(verified.subject_id, subject("U1"));
        assert_eq!(verified.role, role);
        assert_eq!(verified.expires_at, issued.expires_at);
        assert_eq!(issued.expires_at - issued.issued_at, Duration::seconds(3600));
    }
}

#[test]
fn test_tokens_are_unique_per_issue() {
    let (tokens, _) = issuer();
    let first = tokens.issue(&subject("U1"), Role::Student).unwrap();
    let second = tokens.issue(&subject("U1"), Role::Student).unwrap();
    assert_ne!(first.token, second.token);
}

#[test]
fn test_swapped_claims_fail_the_signature() {
    let (tokens, _) = issuer();
    let student = tokens.issue(&subject("U1"), Role::Student).unwrap().token;
    let admin = tokens.issue(&subject("U1"), Role::Admin).unwrap().token;

    let student = segments(&student);
    let admin = segments(&admin);
    let forged = format!("{}.{}.{}", student[0], admin[1], student[2]);

    assert_eq!(tokens.validate(&forged), Err(TokenError::BadSignature));
}

#[test]
fn test_unsigned_token_rejected() {
    let (tokens, _) = issuer();
    let issued = tokens.issue(&subject("U1"), Role::Admin).unwrap().token;
    // {"alg":"none","typ":"JWT"}
    let header = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0";
    let unsigned = format!("{}.{}.", header, segments(&issued)[1]);

    assert_eq!(tokens.validate(&unsigned), Err(TokenError::BadSignature));
}

#[test]
fn test_other_algorithm_with_same_secret_rejected() {
    let (tokens, _) = issuer();
    let claims = Claims {
        sub: "U1".to_string(),
        role: Role::Admin,
        iat: Utc::now().timestamp(),
        exp: Utc::now().timestamp() + 3600,
        iss: "rollcall".to_string(),
        jti: "j".to_string(),
    };
    let token = encode(
        &Header::new(Algorithm::HS512),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();

    assert_eq!(tokens.validate(&token), Err(TokenError::BadSignature));
}

#[test]
fn test_token_expires_on_the_server_clock() {
    let (tokens, clock) = issuer();
    let issued = tokens.issue(&subject("U1"), Role::Teacher).unwrap();

    clock.advance(Duration::seconds(3599));
    assert!(tokens.validate(&issued.token).is_ok());

    clock.advance(Duration::seconds(1));
    assert_eq!(tokens.validate(&issued.token), Err(TokenError::Expired));
}

#[test]
fn test_garbage_is_malformed_or_unsigned() {
    let (tokens, _) = issuer();

    assert_eq!(tokens.validate(""), Err(TokenError::Malformed));
    assert_eq!(tokens.validate("no-dots-here"), Err(TokenError::Malformed));
    assert_eq!(tokens.validate("a.b.c"), Err(TokenError::BadSignature));
}
