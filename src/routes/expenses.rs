use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use super::bills::fetch_bill;
use crate::auth::{AuthUser, Capability};
use crate::error::ApiError;
use crate::schemas::{new_id, ApiResponse, Expense};
use crate::store::Stores;
use crate::validation::{char_len_between, is_valid_amount, parse_id, Checks};

const MIN_AMOUNT: f64 = 0.01;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewExpenseJson {
    #[serde(default)]
    bill: String,
    description: Option<String>,
    date: Option<DateTime<Utc>>,
    #[serde(default)]
    category: String,
    amount: Option<f64>,
    #[serde(default)]
    payment_by: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExpenseChangesJson {
    bill: Option<String>,
    description: Option<String>,
    date: Option<DateTime<Utc>>,
    category: Option<String>,
    amount: Option<f64>,
    payment_by: Option<String>,
}

fn normalize_category(name: &str) -> String {
    name.trim().to_lowercase()
}

async fn ensure_active_category(stores: &Stores, name: &str) -> Result<(), ApiError> {
    match stores.categories.find_by_name(name).await? {
        Some(category) if category.is_active => Ok(()),
        _ => Err(ApiError::invalid(
            "category",
            "Category must be one of the active categories",
        )),
    }
}

async fn fetch_expense(stores: &Stores, id: &str) -> Result<Expense, ApiError> {
    stores
        .expenses
        .find(id)
        .await?
        .ok_or(ApiError::NotFound("expense"))
}

#[post("")]
pub async fn create_expense(
    user: AuthUser,
    stores: web::Data<Stores>,
    json: web::Json<NewExpenseJson>,
) -> Result<HttpResponse, ApiError> {
    user.require(Capability::CreateExpense)?;
    let json = json.into_inner();
    let bill_id = parse_id(&json.bill, "bill").ok();
    let category = normalize_category(&json.category);

    let mut checks = Checks::new();
    checks
        .check(bill_id.is_some(), "bill", "Valid bill ID is required")
        .check(
            json.description
                .as_deref()
                .map_or(true, |d| char_len_between(d.trim(), 0, 200)),
            "description",
            "Description must be less than 200 characters",
        )
        .check(!category.is_empty(), "category", "Category is required")
        .check(
            json.amount
                .is_some_and(|amount| is_valid_amount(amount, MIN_AMOUNT)),
            "amount",
            "Amount must be a positive number",
        )
        .check(
            !json.payment_by.trim().is_empty(),
            "paymentBy",
            "Payment by is required",
        );
    checks.finish()?;

    let (Some(bill_id), Some(amount)) = (bill_id, json.amount) else {
        return Err(ApiError::BadRequest("Validation failed"));
    };
    let bill = fetch_bill(&stores, &bill_id).await?;
    ensure_active_category(&stores, &category).await?;

    let expense = Expense {
        id: new_id(),
        bill: bill.id,
        description: json.description.unwrap_or_default().trim().to_string(),
        date: json.date.unwrap_or_else(Utc::now),
        category,
        amount,
        payment_by: json.payment_by.trim().to_string(),
        submitted_by: user.id,
    };
    stores.expenses.insert(&expense).await?;
    info!(
        "Recorded expense {} of {} against bill {}",
        expense.id, expense.amount, expense.bill
    );

    Ok(HttpResponse::Created().json(ApiResponse::with_message(
        "Expense created successfully",
        expense,
    )))
}

#[get("")]
pub async fn list_expenses(
    user: AuthUser,
    stores: web::Data<Stores>,
) -> Result<HttpResponse, ApiError> {
    user.require(Capability::ReadExpenses)?;
    let expenses = stores.expenses.list().await?;
    Ok(HttpResponse::Ok().json(ApiResponse::data(expenses)))
}

#[get("/bill/{bill_id}")]
pub async fn get_expenses_for_bill(
    user: AuthUser,
    stores: web::Data<Stores>,
    bill_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    user.require(Capability::ReadExpenses)?;
    let bill_id = parse_id(&bill_id, "billId")?;
    let expenses = stores.expenses.list_for_bill(&bill_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::data(expenses)))
}

#[get("/{id}")]
pub async fn get_expense(
    user: AuthUser,
    stores: web::Data<Stores>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    user.require(Capability::ReadExpenses)?;
    let id = parse_id(&id, "id")?;
    let expense = fetch_expense(&stores, &id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::data(expense)))
}

#[put("/{id}")]
pub async fn update_expense(
    user: AuthUser,
    stores: web::Data<Stores>,
    id: web::Path<String>,
    json: web::Json<ExpenseChangesJson>,
) -> Result<HttpResponse, ApiError> {
    user.require(Capability::UpdateExpense)?;
    let id = parse_id(&id, "id")?;
    let changes = json.into_inner();
    let bill_id = match changes.bill.as_deref() {
        Some(raw) => Some(parse_id(raw, "bill").map_err(|_| {
            ApiError::invalid("bill", "Bill ID must be valid")
        })?),
        None => None,
    };
    let category = changes.category.as_deref().map(normalize_category);

    let mut checks = Checks::new();
    checks
        .check(
            changes
                .description
                .as_deref()
                .map_or(true, |d| char_len_between(d.trim(), 0, 200)),
            "description",
            "Description must be less than 200 characters",
        )
        .check(
            category.as_deref().map_or(true, |c| !c.is_empty()),
            "category",
            "Category cannot be empty",
        )
        .check(
            changes
                .amount
                .map_or(true, |amount| is_valid_amount(amount, MIN_AMOUNT)),
            "amount",
            "Amount must be a positive number",
        )
        .check(
            changes
                .payment_by
                .as_deref()
                .map_or(true, |p| !p.trim().is_empty()),
            "paymentBy",
            "Payment by cannot be empty",
        );
    checks.finish()?;

    let mut expense = fetch_expense(&stores, &id).await?;
    if let Some(bill_id) = bill_id {
        expense.bill = fetch_bill(&stores, &bill_id).await?.id;
    }
    if let Some(category) = category {
        ensure_active_category(&stores, &category).await?;
        expense.category = category;
    }
    if let Some(description) = changes.description {
        expense.description = description.trim().to_string();
    }
    if let Some(date) = changes.date {
        expense.date = date;
    }
    if let Some(amount) = changes.amount {
        expense.amount = amount;
    }
    if let Some(payment_by) = changes.payment_by {
        expense.payment_by = payment_by.trim().to_string();
    }

    if !stores.expenses.replace(&expense).await? {
        return Err(ApiError::NotFound("expense"));
    }
    info!("Updated expense {}", expense.id);
    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        "Expense updated successfully",
        expense,
    )))
}

#[delete("/{id}")]
pub async fn delete_expense(
    user: AuthUser,
    stores: web::Data<Stores>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    user.require(Capability::DeleteExpense)?;
    let id = parse_id(&id, "id")?;
    if !stores.expenses.delete(&id).await? {
        return Err(ApiError::NotFound("expense"));
    }
    info!("Deleted expense {id}");
    Ok(HttpResponse::Ok().json(ApiResponse::message("expense deleted successfully")))
}
