/// JSON Web Tokens signed with an account's RSA key pair
///
/// Tokens carry `kid` (the account uid) in the header and `iat`, `exp`, `sub`
/// in the claims. They expire 24 hours after issuance. Store lookups live in
/// the manager; this module only signs, inspects and verifies.
use crate::error::{CredError, CredResult};
use chrono::Utc;
use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use serde::{Deserialize, Serialize};

/// Token lifetime in seconds
pub const TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Algorithm used when issuing
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::RS512;

/// Algorithms accepted when validating
const RSA_ALGORITHMS: [Algorithm; 3] = [Algorithm::RS256, Algorithm::RS384, Algorithm::RS512];

/// Token claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
}

impl Claims {
    /// Claims for a token issued now
    pub fn new(uid: &str) -> Self {
        let now = Utc::now().timestamp();
        Claims {
            sub: uid.to_string(),
            iat: now,
            exp: now + TOKEN_TTL_SECS,
            nbf: None,
        }
    }
}

/// Sign a token for `uid` with its PKCS#1 PEM private key
pub fn generate_token(uid: &str, priv_pem: &str) -> CredResult<String> {
    if uid.is_empty() {
        return Err(CredError::NilArgument("uid"));
    }
    sign_claims(uid, &Claims::new(uid), priv_pem)
}

/// Sign arbitrary claims under `kid`
pub fn sign_claims(kid: &str, claims: &Claims, priv_pem: &str) -> CredResult<String> {
    let mut header = Header::new(SIGNING_ALGORITHM);
    header.kid = Some(kid.to_string());

    let key = EncodingKey::from_rsa_pem(priv_pem.as_bytes()).map_err(|e| {
        tracing::error!(kid = %kid, error = %e, "unusable private key");
        CredError::SigningFailed(e.to_string())
    })?;

    encode(&header, claims, &key).map_err(|e| {
        tracing::error!(kid = %kid, error = %e, "token signing failed");
        CredError::SigningFailed(e.to_string())
    })
}

/// Read the header without verifying and return the signing key id
///
/// Rejects anything not signed with an RSA algorithm before any key lookup
/// happens, so a public key can never be used as an HMAC secret.
pub fn signing_kid(token: &str) -> CredResult<String> {
    let header = decode_header(token).map_err(|e| {
        tracing::debug!(error = %e, "that's not even a token");
        CredError::Malformed
    })?;

    if !RSA_ALGORITHMS.contains(&header.alg) {
        tracing::warn!(alg = ?header.alg, "unexpected signing method");
        return Err(CredError::WrongSigningMethod);
    }

    match header.kid {
        Some(kid) if !kid.is_empty() => Ok(kid),
        _ => {
            tracing::warn!("token header carries no kid");
            Err(CredError::Unauthorized)
        }
    }
}

/// Verify signature and time claims against a PKIX PEM public key
pub fn verify(token: &str, kid: &str, pub_pem: &str) -> CredResult<Claims> {
    let key = DecodingKey::from_rsa_pem(pub_pem.as_bytes()).map_err(|e| {
        tracing::error!(kid = %kid, error = %e, "unusable public key");
        CredError::Unauthorized
    })?;

    let mut validation = Validation::new(SIGNING_ALGORITHM);
    validation.algorithms = RSA_ALGORITHMS.to_vec();
    validation.leeway = 0;
    validation.validate_nbf = true;
    validation.set_required_spec_claims(&["exp", "sub"]);

    let data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            tracing::debug!(kid = %kid, error = %e, "malformed token");
            CredError::Malformed
        }
        ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => {
            tracing::debug!(kid = %kid, "token expired or not active yet");
            CredError::Expired
        }
        _ => {
            tracing::warn!(kid = %kid, error = %e, "couldn't handle this token");
            CredError::Unauthorized
        }
    })?;

    if data.claims.sub != kid {
        tracing::warn!(kid = %kid, sub = %data.claims.sub, "subject does not match key id");
        return Err(CredError::Unauthorized);
    }

    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyPair;
    use lazy_static::lazy_static;

    lazy_static! {
        static ref KEY: KeyPair = KeyPair::generate("uid-1").unwrap();
        static ref OTHER_KEY: KeyPair = KeyPair::generate("uid-2").unwrap();
    }

    #[test]
    fn test_round_trip() {
        let token = generate_token("uid-1", &KEY.priv_key).unwrap();
        assert_eq!(signing_kid(&token).unwrap(), "uid-1");

        let claims = verify(&token, "uid-1", &KEY.pub_key).unwrap();
        assert_eq!(claims.sub, "uid-1");
        assert_eq!(claims.exp - claims.iat, TOKEN_TTL_SECS);
    }

    #[test]
    fn test_header_and_claim_shape() {
        let token = generate_token("uid-1", &KEY.priv_key).unwrap();
        let header = decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::RS512);
        assert_eq!(header.kid.as_deref(), Some("uid-1"));

        let claims = verify(&token, "uid-1", &KEY.pub_key).unwrap();
        let json = serde_json::to_value(&claims).unwrap();
        assert!(json["iat"].is_i64());
        assert!(json["exp"].is_i64());
        assert_eq!(json["sub"], "uid-1");
        assert!(json.get("nbf").is_none());
    }

    #[test]
    fn test_expired_token() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "uid-1".to_string(),
            iat: now - 2 * TOKEN_TTL_SECS,
            exp: now - TOKEN_TTL_SECS,
            nbf: None,
        };
        let token = sign_claims("uid-1", &claims, &KEY.priv_key).unwrap();
        assert!(matches!(
            verify(&token, "uid-1", &KEY.pub_key),
            Err(CredError::Expired)
        ));
    }

    #[test]
    fn test_not_yet_valid_token() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "uid-1".to_string(),
            iat: now,
            exp: now + TOKEN_TTL_SECS,
            nbf: Some(now + 3600),
        };
        let token = sign_claims("uid-1", &claims, &KEY.priv_key).unwrap();
        assert!(matches!(
            verify(&token, "uid-1", &KEY.pub_key),
            Err(CredError::Expired)
        ));
    }

    #[test]
    fn test_hmac_token_rejected_before_key_lookup() {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("uid-1".to_string());
        let token = encode(
            &header,
            &Claims::new("uid-1"),
            &EncodingKey::from_secret(KEY.pub_key.as_bytes()),
        )
        .unwrap();

        assert!(matches!(signing_kid(&token), Err(CredError::WrongSigningMethod)));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(signing_kid("not-a-token"), Err(CredError::Malformed)));
        assert!(matches!(signing_kid(""), Err(CredError::Malformed)));
    }

    #[test]
    fn test_missing_kid_is_unauthorized() {
        let header = Header::new(Algorithm::RS512);
        let key = EncodingKey::from_rsa_pem(KEY.priv_key.as_bytes()).unwrap();
        let token = encode(&header, &Claims::new("uid-1"), &key).unwrap();
        assert!(matches!(signing_kid(&token), Err(CredError::Unauthorized)));
    }

    #[test]
    fn test_wrong_key_is_unauthorized() {
        let token = generate_token("uid-1", &KEY.priv_key).unwrap();
        assert!(matches!(
            verify(&token, "uid-1", &OTHER_KEY.pub_key),
            Err(CredError::Unauthorized)
        ));
    }

    #[test]
    fn test_subject_must_match_kid() {
        let token = sign_claims("uid-1", &Claims::new("uid-2"), &KEY.priv_key).unwrap();
        assert!(matches!(
            verify(&token, "uid-1", &KEY.pub_key),
            Err(CredError::Unauthorized)
        ));
    }

    #[test]
    fn test_bad_private_key_fails_signing() {
        assert!(matches!(
            generate_token("uid-1", "not a pem"),
            Err(CredError::SigningFailed(_))
        ));
    }
}
