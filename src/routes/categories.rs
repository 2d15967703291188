use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::auth::{AuthUser, Capability};
use crate::error::ApiError;
use crate::schemas::{
    new_id, ApiResponse, Category, RecordId, DEFAULT_CATEGORY_COLOR, DEFAULT_CATEGORY_ICON,
};
use crate::store::{StoreError, Stores};
use crate::validation::{char_len_between, is_hex_color, parse_id, Checks};

const DEFAULTS: [(&str, &str, &str, &str, &str); 5] = [
    (
        "food",
        "Food & Dining",
        "Restaurants, groceries, and food-related expenses",
        "utensils",
        "#F59E0B",
    ),
    (
        "transport",
        "Transportation",
        "Travel, fuel, public transport, and vehicle expenses",
        "car",
        "#3B82F6",
    ),
    (
        "entertainment",
        "Entertainment",
        "Movies, games, events, and leisure activities",
        "film",
        "#8B5CF6",
    ),
    (
        "utilities",
        "Utilities",
        "Electricity, water, internet, and utility bills",
        "zap",
        "#EF4444",
    ),
    (
        "shopping",
        "Shopping",
        "Clothing, electronics, and general shopping",
        "shopping-bag",
        "#10B981",
    ),
];

pub(crate) fn default_categories(created_by: Option<RecordId>) -> Vec<Category> {
    let now = Utc::now();
    DEFAULTS
        .iter()
        .map(|(name, display_name, description, icon, color)| Category {
            id: new_id(),
            name: name.to_string(),
            display_name: display_name.to_string(),
            description: description.to_string(),
            icon: icon.to_string(),
            color: color.to_string(),
            is_active: true,
            created_by: created_by.clone(),
            created_at: now,
            updated_at: now,
        })
        .collect()
}

/// Inserts the default categories when no active category exists yet.
/// Names already taken by a deactivated category are left alone.
pub async fn seed_default_categories(stores: &Stores) -> Result<usize, StoreError> {
    if !stores.categories.list_active().await?.is_empty() {
        return Ok(0);
    }
    let mut missing = Vec::new();
    for category in default_categories(None) {
        if stores.categories.find_by_name(&category.name).await?.is_none() {
            missing.push(category);
        }
    }
    stores.categories.insert_many(&missing).await?;
    if !missing.is_empty() {
        info!("Default categories created: {}", missing.len());
    }
    Ok(missing.len())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewCategoryJson {
    #[serde(default)]
    name: String,
    #[serde(default)]
    display_name: String,
    description: Option<String>,
    icon: Option<String>,
    color: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategoryChangesJson {
    display_name: Option<String>,
    description: Option<String>,
    icon: Option<String>,
    color: Option<String>,
    is_active: Option<bool>,
}

fn check_display(
    checks: &mut Checks,
    display_name: Option<&str>,
    icon: Option<&str>,
    color: Option<&str>,
) {
    checks
        .check(
            display_name.map_or(true, |name| char_len_between(name.trim(), 1, 100)),
            "displayName",
            "Display name is required and must be less than 100 characters",
        )
        .check(
            icon.map_or(true, |icon| char_len_between(icon.trim(), 1, 50)),
            "icon",
            "Icon must be between 1 and 50 characters",
        )
        .check(
            color.map_or(true, |color| is_hex_color(color.trim())),
            "color",
            "Color must be a hex color such as #3B82F6",
        );
}

fn duplicate_name() -> ApiError {
    ApiError::invalid("name", "Category with this name already exists")
}

async fn fetch_category(stores: &Stores, id: &str) -> Result<Category, ApiError> {
    stores
        .categories
        .find(id)
        .await?
        .ok_or(ApiError::NotFound("Category"))
}

#[get("")]
pub async fn list_categories(
    user: AuthUser,
    stores: web::Data<Stores>,
) -> Result<HttpResponse, ApiError> {
    user.require(Capability::ReadCategories)?;
    let categories = stores.categories.list_active().await?;
    Ok(HttpResponse::Ok().json(ApiResponse::data(categories)))
}

#[get("/{id}")]
pub async fn get_category(
    user: AuthUser,
    stores: web::Data<Stores>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    user.require(Capability::ReadCategories)?;
    let id = parse_id(&id, "id")?;
    let category = fetch_category(&stores, &id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::data(category)))
}

#[post("")]
pub async fn create_category(
    user: AuthUser,
    stores: web::Data<Stores>,
    json: web::Json<NewCategoryJson>,
) -> Result<HttpResponse, ApiError> {
    user.require(Capability::ManageCategories)?;
    let json = json.into_inner();
    let name = json.name.trim().to_lowercase();

    let mut checks = Checks::new();
    checks.check(
        char_len_between(&name, 1, 50),
        "name",
        "Name is required and must be less than 50 characters",
    );
    check_display(
        &mut checks,
        Some(json.display_name.as_str()),
        json.icon.as_deref(),
        json.color.as_deref(),
    );
    checks.finish()?;

    if stores.categories.find_by_name(&name).await?.is_some() {
        return Err(duplicate_name());
    }

    let now = Utc::now();
    let category = Category {
        id: new_id(),
        name,
        display_name: json.display_name.trim().to_string(),
        description: json.description.unwrap_or_default().trim().to_string(),
        icon: json
            .icon
            .map(|icon| icon.trim().to_string())
            .unwrap_or_else(|| DEFAULT_CATEGORY_ICON.to_string()),
        color: json
            .color
            .map(|color| color.trim().to_string())
            .unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.to_string()),
        is_active: true,
        created_by: Some(user.id),
        created_at: now,
        updated_at: now,
    };
    match stores
        .categories
        .insert_many(std::slice::from_ref(&category))
        .await
    {
        Err(StoreError::Duplicate) => return Err(duplicate_name()),
        result => result?,
    }
    info!("Created category {}", category.name);

    Ok(HttpResponse::Created().json(ApiResponse::with_message(
        "Category created successfully",
        category,
    )))
}

#[put("/{id}")]
pub async fn update_category(
    user: AuthUser,
    stores: web::Data<Stores>,
    id: web::Path<String>,
    json: web::Json<CategoryChangesJson>,
) -> Result<HttpResponse, ApiError> {
    user.require(Capability::ManageCategories)?;
    let id = parse_id(&id, "id")?;
    let changes = json.into_inner();

    let mut checks = Checks::new();
    check_display(
        &mut checks,
        changes.display_name.as_deref(),
        changes.icon.as_deref(),
        changes.color.as_deref(),
    );
    checks.finish()?;

    let mut category = fetch_category(&stores, &id).await?;
    if let Some(display_name) = changes.display_name {
        category.display_name = display_name.trim().to_string();
    }
    if let Some(description) = changes.description {
        category.description = description.trim().to_string();
    }
    if let Some(icon) = changes.icon {
        category.icon = icon.trim().to_string();
    }
    if let Some(color) = changes.color {
        category.color = color.trim().to_string();
    }
    if let Some(is_active) = changes.is_active {
        category.is_active = is_active;
    }
    category.updated_at = Utc::now();

    if !stores.categories.replace(&category).await? {
        return Err(ApiError::NotFound("Category"));
    }
    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        "Category updated successfully",
        category,
    )))
}

#[delete("/{id}")]
pub async fn delete_category(
    user: AuthUser,
    stores: web::Data<Stores>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    user.require(Capability::ManageCategories)?;
    let id = parse_id(&id, "id")?;
    let mut category = fetch_category(&stores, &id).await?;
    category.is_active = false;
    category.updated_at = Utc::now();
    if !stores.categories.replace(&category).await? {
        return Err(ApiError::NotFound("Category"));
    }
    info!("Deactivated category {}", category.name);
    Ok(HttpResponse::Ok().json(ApiResponse::message(
        "Category deactivated successfully",
    )))
}
