use actix_web::{middleware::from_fn, post, web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::{check_login, hash_password, Role, TokenKeys};
use crate::error::ApiError;
use crate::rate_limit::{limit_login, limit_register};
use crate::schemas::{new_id, ApiResponse, PublicUser, User};
use crate::store::{StoreError, Stores};
use crate::validation::{is_email, is_username, Checks};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Deserialize)]
struct RegisterJson {
    #[serde(default)]
    email: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    role: String,
}

#[derive(Deserialize)]
struct LoginJson {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
struct Session {
    token: String,
    user: PublicUser,
}

#[post("/register", wrap = "from_fn(limit_register)")]
pub async fn register(
    stores: web::Data<Stores>,
    json: web::Json<RegisterJson>,
) -> Result<HttpResponse, ApiError> {
    let json = json.into_inner();
    let email = json.email.trim().to_lowercase();
    let username = json.username.trim().to_string();
    let role = json.role.parse::<Role>().ok();

    Checks::new()
        .check(
            is_email(&email),
            "email",
            "Please provide a valid email address",
        )
        .check(
            is_username(&username),
            "username",
            "Username must be 3-30 letters, numbers, or underscores",
        )
        .check(
            json.password.chars().count() >= MIN_PASSWORD_LEN,
            "password",
            "Password must be at least 8 characters long",
        )
        .check(
            role.is_some(),
            "role",
            "Role must be either admin or data-entry",
        )
        .finish()?;
    let role = role.ok_or_else(|| ApiError::invalid("role", "Role is required"))?;

    if stores.users.exists(&email, &username).await? {
        return Err(ApiError::BadRequest("user already exists"));
    }

    let password = json.password;
    let password_hash = web::block(move || hash_password(&password)).await??;
    let user = User {
        id: new_id(),
        email,
        username,
        password_hash,
        role,
        created_at: Utc::now(),
    };
    match stores.users.insert(&user).await {
        Err(StoreError::Duplicate) => return Err(ApiError::BadRequest("user already exists")),
        result => result?,
    }
    info!("Registered user {} as {:?}", user.username, user.role);

    Ok(HttpResponse::Created().json(ApiResponse::with_message(
        "user created successfully",
        PublicUser::from(&user),
    )))
}

#[post("/login", wrap = "from_fn(limit_login)")]
pub async fn login(
    stores: web::Data<Stores>,
    keys: web::Data<TokenKeys>,
    json: web::Json<LoginJson>,
) -> Result<HttpResponse, ApiError> {
    let LoginJson { username, password } = json.into_inner();
    let username = username.trim();

    Checks::new()
        .check(!username.is_empty(), "username", "Username is required")
        .check(!password.is_empty(), "password", "Password is required")
        .finish()?;

    let user = stores.users.find_by_username(username).await?;
    let stored = user.as_ref().map(|user| user.password_hash.clone());
    let verified = web::block(move || check_login(&password, stored.as_deref())).await?;
    let user = match user {
        Some(user) if verified => user,
        _ => {
            warn!("Failed login attempt for {username}");
            return Err(ApiError::InvalidCredentials);
        }
    };

    let token = keys.issue(&user.id, user.role)?;
    info!("User {} logged in", user.username);
    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        "login successful",
        Session {
            token,
            user: PublicUser::from(&user),
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{keys, test_app};
    use crate::store::{memory, UserStore};
    use actix_web::{http::StatusCode, test};
    use serde_json::{json, Value};

    fn registration() -> Value {
        json!({
            "email": "Ana@Example.com",
            "username": "ana_k",
            "password": "s3cret-pass",
            "role": "data-entry"
        })
    }

    #[actix_web::test]
    async fn register_then_login() {
        let stores = memory::stores();
        let app = test_app!(stores.clone());

        let request = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(registration())
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["data"]["email"], "ana@example.com");
        assert_eq!(body["data"]["role"], "data-entry");
        assert!(body["data"].get("passwordHash").is_none());

        let stored = stores.users.find_by_username("ana_k").await.unwrap().unwrap();
        assert_ne!(stored.password_hash, "s3cret-pass");

        let request = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({ "username": "ana_k", "password": "s3cret-pass" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(body["message"], "login successful");
        assert_eq!(body["data"]["user"]["name"], "ana_k");

        let claims = keys()
            .verify(body["data"]["token"].as_str().unwrap())
            .unwrap();
        assert_eq!(claims.sub, stored.id);
        assert_eq!(claims.role, Role::DataEntry);
    }

    #[actix_web::test]
    async fn duplicate_registration_is_refused() {
        let app = test_app!(memory::stores());
        for expected in [StatusCode::CREATED, StatusCode::BAD_REQUEST] {
            let request = test::TestRequest::post()
                .uri("/auth/register")
                .set_json(registration())
                .to_request();
            let response = test::call_service(&app, request).await;
            assert_eq!(response.status(), expected);
        }
    }

    #[actix_web::test]
    async fn registration_fields_are_validated() {
        let app = test_app!(memory::stores());
        let request = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(json!({
                "email": "not-an-email",
                "username": "x",
                "password": "short",
                "role": "owner"
            }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["errors"].as_array().unwrap().len(), 4);
    }

    #[actix_web::test]
    async fn wrong_password_is_unauthorized() {
        let app = test_app!(memory::stores());
        let request = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(registration())
            .to_request();
        test::call_service(&app, request).await;

        for (username, password) in [("ana_k", "wrong-pass"), ("nobody", "s3cret-pass")] {
            let request = test::TestRequest::post()
                .uri("/auth/login")
                .set_json(json!({ "username": username, "password": password }))
                .to_request();
            let response = test::call_service(&app, request).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[actix_web::test]
    async fn registration_is_throttled_per_client() {
        let stores = memory::stores();
        let app = test_app!(stores.clone());
        for n in 0..3 {
            let request = test::TestRequest::post()
                .uri("/auth/register")
                .set_json(json!({
                    "email": format!("user{n}@example.com"),
                    "username": format!("user_{n}"),
                    "password": "s3cret-pass",
                    "role": "data-entry"
                }))
                .to_request();
            let response = test::call_service(&app, request).await;
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let request = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(registration())
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(
            body["message"],
            "Too many registration attempts, please try again later"
        );
        assert!(stores.users.find_by_username("ana_k").await.unwrap().is_none());
    }

    #[actix_web::test]
    async fn login_attempts_are_throttled_per_client() {
        let app = test_app!(memory::stores());
        for _ in 0..5 {
            let request = test::TestRequest::post()
                .uri("/auth/login")
                .set_json(json!({ "username": "ana_k", "password": "guess" }))
                .to_request();
            let response = test::call_service(&app, request).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        let request = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({ "username": "ana_k", "password": "guess" }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(
            body["message"],
            "Too many login attempts, please try again later"
        );
    }

    /// Misses existing users on lookup, like a request that lost a race to a
    /// concurrent registration.
    struct LateUserCheck(memory::MemoryCollection<User>);

    #[async_trait::async_trait]
    impl UserStore for LateUserCheck {
        async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
            self.0.find_by_username(username).await
        }

        async fn exists(&self, _email: &str, _username: &str) -> Result<bool, StoreError> {
            Ok(false)
        }

        async fn insert(&self, user: &User) -> Result<(), StoreError> {
            self.0.insert(user).await
        }
    }

    #[actix_web::test]
    async fn unique_index_collision_is_a_bad_request() {
        let mut stores = memory::stores();
        stores.users = std::sync::Arc::new(LateUserCheck(Default::default()));
        let app = test_app!(stores);
        for expected in [StatusCode::CREATED, StatusCode::BAD_REQUEST] {
            let request = test::TestRequest::post()
                .uri("/auth/register")
                .set_json(registration())
                .to_request();
            let response = test::call_service(&app, request).await;
            assert_eq!(response.status(), expected);
            if expected == StatusCode::BAD_REQUEST {
                let body: Value = test::read_body_json(response).await;
                assert_eq!(body["message"], "user already exists");
            }
        }
    }
}
