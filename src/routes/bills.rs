use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::{AuthUser, Capability};
use crate::error::ApiError;
use crate::exchange::get_exchanges_from_split;
use crate::schemas::{new_id, ApiResponse, Bill, Contributor, Expense};
use crate::split::{compute_split, summarize_bill};
use crate::store::Stores;
use crate::validation::{char_len_between, is_valid_amount, parse_id, Checks};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributorJson {
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    amount_paid: f64,
    #[serde(default)]
    amount_owed: f64,
}

impl From<ContributorJson> for Contributor {
    fn from(json: ContributorJson) -> Self {
        Contributor {
            user: json
                .user
                .and_then(|user| Uuid::parse_str(&user).ok())
                .map(|user| user.to_string()),
            name: json.name.trim().to_string(),
            amount_paid: json.amount_paid,
            amount_owed: json.amount_owed,
        }
    }
}

fn check_contributors(checks: &mut Checks, contributors: &[ContributorJson]) {
    for contributor in contributors {
        checks
            .check(
                !contributor.name.trim().is_empty(),
                "contributors",
                "Contributor name is required",
            )
            .check(
                is_valid_amount(contributor.amount_paid, 0.0)
                    && is_valid_amount(contributor.amount_owed, 0.0),
                "contributors",
                "Contributor amounts must be non-negative numbers",
            )
            .check(
                contributor
                    .user
                    .as_deref()
                    .map_or(true, |user| Uuid::parse_str(user).is_ok()),
                "contributors",
                "Invalid contributor user ID",
            );
    }
}

fn check_description(checks: &mut Checks, description: Option<&str>) {
    checks.check(
        description.map_or(true, |d| char_len_between(d.trim(), 0, 500)),
        "description",
        "Description must be less than 500 characters",
    );
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewBillJson {
    #[serde(default)]
    title: String,
    description: Option<String>,
    date: Option<DateTime<Utc>>,
    #[serde(default)]
    contributors: Vec<ContributorJson>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BillChangesJson {
    title: Option<String>,
    description: Option<String>,
    date: Option<DateTime<Utc>>,
    contributors: Option<Vec<ContributorJson>>,
    is_settled: Option<bool>,
}

#[derive(Serialize)]
struct BillWithExpenses {
    bill: Bill,
    expenses: Vec<Expense>,
}

pub(crate) async fn fetch_bill(stores: &Stores, id: &str) -> Result<Bill, ApiError> {
    stores.bills.find(id).await?.ok_or(ApiError::NotFound("bill"))
}

#[get("")]
pub async fn list_bills(
    user: AuthUser,
    stores: web::Data<Stores>,
) -> Result<HttpResponse, ApiError> {
    user.require(Capability::ReadBills)?;
    let bills = stores.bills.list().await?;
    Ok(HttpResponse::Ok().json(ApiResponse::data(bills)))
}

#[post("")]
pub async fn create_bill(
    user: AuthUser,
    stores: web::Data<Stores>,
    json: web::Json<NewBillJson>,
) -> Result<HttpResponse, ApiError> {
    user.require(Capability::CreateBill)?;
    let json = json.into_inner();

    let mut checks = Checks::new();
    checks.check(
        char_len_between(json.title.trim(), 1, 100),
        "title",
        "Title is required and must be less than 100 characters",
    );
    check_description(&mut checks, json.description.as_deref());
    check_contributors(&mut checks, &json.contributors);
    checks.finish()?;

    let now = Utc::now();
    let mut bill = Bill {
        id: new_id(),
        title: json.title.trim().to_string(),
        description: json.description.unwrap_or_default().trim().to_string(),
        date: json.date.unwrap_or(now),
        created_by: Some(user.id),
        contributors: json.contributors.into_iter().map(Contributor::from).collect(),
        total_amount: 0.0,
        is_settled: false,
        created_at: now,
        updated_at: now,
    };
    bill.recalculate_total();
    stores.bills.insert(&bill).await?;
    info!("Created bill {} with total {}", bill.id, bill.total_amount);

    Ok(HttpResponse::Created().json(ApiResponse::with_message(
        "Bill created successfully",
        bill,
    )))
}

#[get("/{id}")]
pub async fn get_bill(
    user: AuthUser,
    stores: web::Data<Stores>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    user.require(Capability::ReadBills)?;
    let id = parse_id(&id, "id")?;
    let bill = fetch_bill(&stores, &id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::data(bill)))
}

#[put("/{id}")]
pub async fn update_bill(
    user: AuthUser,
    stores: web::Data<Stores>,
    id: web::Path<String>,
    json: web::Json<BillChangesJson>,
) -> Result<HttpResponse, ApiError> {
    user.require(Capability::UpdateBill)?;
    let id = parse_id(&id, "id")?;
    let changes = json.into_inner();

    let mut checks = Checks::new();
    checks.check(
        changes
            .title
            .as_deref()
            .map_or(true, |title| char_len_between(title.trim(), 1, 100)),
        "title",
        "Title must be between 1 and 100 characters",
    );
    check_description(&mut checks, changes.description.as_deref());
    if let Some(contributors) = &changes.contributors {
        check_contributors(&mut checks, contributors);
    }
    checks.finish()?;

    let mut bill = fetch_bill(&stores, &id).await?;
    if let Some(title) = changes.title {
        bill.title = title.trim().to_string();
    }
    if let Some(description) = changes.description {
        bill.description = description.trim().to_string();
    }
    if let Some(date) = changes.date {
        bill.date = date;
    }
    if let Some(contributors) = changes.contributors {
        bill.contributors = contributors.into_iter().map(Contributor::from).collect();
    }
    if let Some(is_settled) = changes.is_settled {
        bill.is_settled = is_settled;
    }
    bill.recalculate_total();
    bill.updated_at = Utc::now();

    if !stores.bills.replace(&bill).await? {
        return Err(ApiError::NotFound("bill"));
    }
    info!("Updated bill {}", bill.id);
    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        "Bill updated successfully",
        bill,
    )))
}

#[delete("/{id}")]
pub async fn delete_bill(
    user: AuthUser,
    stores: web::Data<Stores>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    user.require(Capability::DeleteBill)?;
    let id = parse_id(&id, "id")?;
    if !stores.bills.delete(&id).await? {
        return Err(ApiError::NotFound("bill"));
    }
    let removed = stores.expenses.delete_for_bill(&id).await?;
    info!("Deleted bill {id} and its {removed} expenses");
    Ok(HttpResponse::Ok().json(ApiResponse::message("bill deleted successfully")))
}

#[get("/{id}/expenses")]
pub async fn get_bill_expenses(
    user: AuthUser,
    stores: web::Data<Stores>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    user.require(Capability::ReadBills)?;
    let id = parse_id(&id, "id")?;
    let bill = fetch_bill(&stores, &id).await?;
    let expenses = stores.expenses.list_for_bill(&id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::data(BillWithExpenses { bill, expenses })))
}

#[get("/{id}/split")]
pub async fn get_bill_split(
    user: AuthUser,
    stores: web::Data<Stores>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    user.require(Capability::ReadBills)?;
    let id = parse_id(&id, "id")?;
    let bill = fetch_bill(&stores, &id).await?;
    let expenses = stores.expenses.list_for_bill(&id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::data(summarize_bill(bill, expenses))))
}

#[get("/{id}/settlement")]
pub async fn get_bill_settlement(
    user: AuthUser,
    stores: web::Data<Stores>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    user.require(Capability::ReadBills)?;
    let id = parse_id(&id, "id")?;
    let bill = fetch_bill(&stores, &id).await?;
    let exchanges = get_exchanges_from_split(&compute_split(&bill));
    Ok(HttpResponse::Ok().json(ApiResponse::data(exchanges)))
}
