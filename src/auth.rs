use crate::error::ApiError;
use crate::schemas::RecordId;
use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use chrono::Utc;
use futures::future::{ready, Ready};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Admin,
    DataEntry,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    ReadBills,
    CreateBill,
    UpdateBill,
    DeleteBill,
    CreateExpense,
    ReadExpenses,
    UpdateExpense,
    DeleteExpense,
    ReadCategories,
    ManageCategories,
}

impl Role {
    pub fn capabilities(self) -> &'static [Capability] {
        use Capability::*;
        match self {
            Role::Admin => &[
                ReadBills,
                CreateBill,
                UpdateBill,
                DeleteBill,
                CreateExpense,
                ReadExpenses,
                UpdateExpense,
                DeleteExpense,
                ReadCategories,
                ManageCategories,
            ],
            Role::DataEntry => &[
                ReadBills,
                CreateBill,
                UpdateBill,
                CreateExpense,
                UpdateExpense,
                ReadCategories,
            ],
        }
    }

    pub fn can(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "admin" => Ok(Role::Admin),
            "data-entry" => Ok(Role::DataEntry),
            _ => Err(()),
        }
    }
}

/// Work factor for stored password hashes.
const PASSWORD_COST: u32 = 10;

/// Hashes a password into a self-describing bcrypt string (`$2b$10$...`).
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    bcrypt::hash(password, PASSWORD_COST)
        .map_err(|err| ApiError::Internal(format!("failed to hash password: {err}")))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    bcrypt::verify(password, stored).unwrap_or(false)
}

/// Checks `password` against the stored hash of a login candidate. Unknown
/// users are checked against a throwaway hash so both paths cost the same.
pub fn check_login(password: &str, stored: Option<&str>) -> bool {
    match stored {
        Some(stored) => verify_password(password, stored),
        None => {
            verify_password(password, unknown_user_hash());
            false
        }
    }
}

fn unknown_user_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password("no-such-user").unwrap_or_default())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: RecordId,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Signing material and lifetime for access tokens.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl TokenKeys {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        TokenKeys {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    pub fn issue(&self, user_id: &str, role: Role) -> Result<String, ApiError> {
        let iat = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            iat,
            exp: iat + self.ttl_secs,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| ApiError::Internal(format!("failed to sign token: {err}")))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|err| {
                debug!("rejected token: {err}");
                ApiError::InvalidToken
            })
    }
}

/// The caller behind a verified bearer token.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthUser {
    pub id: RecordId,
    pub role: Role,
}

impl AuthUser {
    pub fn require(&self, capability: Capability) -> Result<(), ApiError> {
        if self.role.can(capability) {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

fn bearer_token(request: &HttpRequest) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn authenticate(request: &HttpRequest) -> Result<AuthUser, ApiError> {
    let keys = request
        .app_data::<web::Data<TokenKeys>>()
        .ok_or_else(|| ApiError::Internal("token keys are not configured".to_string()))?;
    let token = bearer_token(request).ok_or(ApiError::Unauthenticated)?;
    let claims = keys.verify(token)?;
    Ok(AuthUser {
        id: claims.sub,
        role: claims.role,
    })
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(request: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(authenticate(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn roles_use_original_names() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(
            serde_json::from_str::<Role>("\"data-entry\"").unwrap(),
            Role::DataEntry
        );
        assert!(serde_json::from_str::<Role>("\"superuser\"").is_err());
        assert_eq!("data-entry".parse(), Ok(Role::DataEntry));
        assert_eq!("Admin".parse::<Role>(), Err(()));
    }

    #[test]
    fn data_entry_cannot_delete_or_manage() {
        assert!(Role::DataEntry.can(Capability::CreateExpense));
        assert!(Role::DataEntry.can(Capability::UpdateBill));
        assert!(!Role::DataEntry.can(Capability::DeleteBill));
        assert!(!Role::DataEntry.can(Capability::ReadExpenses));
        assert!(!Role::DataEntry.can(Capability::ManageCategories));
        assert!(Role::Admin.can(Capability::DeleteExpense));
    }

    #[test]
    fn passwords_are_bcrypt_hashed() {
        let stored = hash_password("correct horse").unwrap();
        assert!(stored.starts_with("$2b$10$"));
        assert!(verify_password("correct horse", &stored));
        assert!(!verify_password("wrong horse", &stored));
        assert!(!verify_password("correct horse", "not-a-hash"));
        assert_ne!(stored, hash_password("correct horse").unwrap());
    }

    #[test]
    fn unknown_user_never_passes() {
        let stored = hash_password("correct horse").unwrap();
        assert!(check_login("correct horse", Some(&stored)));
        assert!(!check_login("correct horse", None));
        assert!(!check_login("no-such-user", None));
        assert!(unknown_user_hash().starts_with("$2b$10$"));
    }

    #[test]
    fn issued_token_verifies() {
        let keys = TokenKeys::new("a-test-secret-that-is-long-enough!", 3600);
        let token = keys.issue("user-1", Role::DataEntry).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.role, Role::DataEntry);
        assert_eq!(claims.exp - claims.iat, 3600);

        let other = TokenKeys::new("a-different-secret-entirely-here", 3600);
        assert!(matches!(other.verify(&token), Err(ApiError::InvalidToken)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = TokenKeys::new("a-test-secret-that-is-long-enough!", -3600);
        let token = keys.issue("user-1", Role::Admin).unwrap();
        assert!(matches!(keys.verify(&token), Err(ApiError::InvalidToken)));
    }

    #[test]
    fn extracts_bearer_token() {
        let keys = TokenKeys::new("a-test-secret-that-is-long-enough!", 60);
        let token = keys.issue("user-2", Role::Admin).unwrap();
        let request = TestRequest::default()
            .app_data(web::Data::new(keys))
            .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
            .to_http_request();
        assert_eq!(
            authenticate(&request).unwrap(),
            AuthUser {
                id: "user-2".to_string(),
                role: Role::Admin,
            }
        );
    }

    #[test]
    fn missing_header_is_unauthenticated() {
        let request = TestRequest::default()
            .app_data(web::Data::new(TokenKeys::new("secret", 60)))
            .insert_header((header::AUTHORIZATION, "Basic abc"))
            .to_http_request();
        assert!(matches!(
            authenticate(&request),
            Err(ApiError::Unauthenticated)
        ));
    }
}
