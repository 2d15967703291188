use actix_web::{get, middleware::from_fn, web, HttpResponse};

use crate::rate_limit::limit_api;

pub mod auth;
pub mod bills;
pub mod categories;
pub mod expenses;

#[get("/health")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().body("app is online")
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(
            web::scope("/auth")
                .service(auth::register)
                .service(auth::login),
        )
        .service(
            web::scope("/bills")
                .wrap(from_fn(limit_api))
                .service(bills::list_bills)
                .service(bills::create_bill)
                .service(bills::get_bill)
                .service(bills::update_bill)
                .service(bills::delete_bill)
                .service(bills::get_bill_expenses)
                .service(bills::get_bill_split)
                .service(bills::get_bill_settlement),
        )
        .service(
            web::scope("/expenses")
                .wrap(from_fn(limit_api))
                .service(expenses::list_expenses)
                .service(expenses::create_expense)
                .service(expenses::get_expenses_for_bill)
                .service(expenses::get_expense)
                .service(expenses::update_expense)
                .service(expenses::delete_expense),
        )
        .service(
            web::scope("/categories")
                .wrap(from_fn(limit_api))
                .service(categories::list_categories)
                .service(categories::create_category)
                .service(categories::get_category)
                .service(categories::update_category)
                .service(categories::delete_category),
        );
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::auth::{Role, TokenKeys};

    pub const SECRET: &str = "test-secret-test-secret-test-secret";

    pub fn keys() -> TokenKeys {
        TokenKeys::new(SECRET, 3600)
    }

    pub const ADMIN_ID: &str = "0f5b7c43-2f0e-4d1e-9d4f-2a4b8d7e1a01";
    pub const CLERK_ID: &str = "7c1e2d3f-4a5b-4c6d-8e7f-9a0b1c2d3e4f";

    pub fn bearer(role: Role) -> (&'static str, String) {
        let user_id = match role {
            Role::Admin => ADMIN_ID,
            Role::DataEntry => CLERK_ID,
        };
        let token = keys().issue(user_id, role).unwrap();
        ("Authorization", format!("Bearer {token}"))
    }

    /// Builds the full application over the given stores.
    macro_rules! test_app {
        ($stores:expr) => {
            actix_web::test::init_service(
                actix_web::App::new()
                    .app_data(actix_web::web::Data::new($stores))
                    .app_data(actix_web::web::Data::new(
                        $crate::routes::test_support::keys(),
                    ))
                    .app_data(actix_web::web::Data::new(
                        $crate::rate_limit::RateLimits::default(),
                    ))
                    .app_data(
                        actix_web::web::JsonConfig::default()
                            .error_handler($crate::validation::json_error_handler),
                    )
                    .configure($crate::routes::configure),
            )
            .await
        };
    }
    pub(crate) use test_app;
}
