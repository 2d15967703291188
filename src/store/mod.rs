//! Persistence seams. Handlers only see these traits; `mongo` backs them in
//! production and `memory` in tests.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::schemas::{Bill, Category, Expense, User};

#[cfg(test)]
pub mod memory;
pub mod mongo;

#[derive(Error, Debug)]
pub enum StoreError {
    /// A write collided with a unique index.
    #[error("record already exists")]
    Duplicate,

    #[error("database error: {0}")]
    Database(mongodb::error::Error),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        if mongo::is_duplicate_key(&err) {
            StoreError::Duplicate
        } else {
            StoreError::Database(err)
        }
    }
}

#[async_trait]
pub trait BillStore: Send + Sync {
    /// All bills, newest first.
    async fn list(&self) -> Result<Vec<Bill>, StoreError>;
    async fn find(&self, id: &str) -> Result<Option<Bill>, StoreError>;
    async fn insert(&self, bill: &Bill) -> Result<(), StoreError>;
    /// Returns `false` when no bill with that id exists.
    async fn replace(&self, bill: &Bill) -> Result<bool, StoreError>;
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait ExpenseStore: Send + Sync {
    /// All expenses, newest first.
    async fn list(&self) -> Result<Vec<Expense>, StoreError>;
    async fn list_for_bill(&self, bill_id: &str) -> Result<Vec<Expense>, StoreError>;
    async fn find(&self, id: &str) -> Result<Option<Expense>, StoreError>;
    async fn insert(&self, expense: &Expense) -> Result<(), StoreError>;
    async fn replace(&self, expense: &Expense) -> Result<bool, StoreError>;
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
    async fn delete_for_bill(&self, bill_id: &str) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait CategoryStore: Send + Sync {
    /// Active categories ordered by display name.
    async fn list_active(&self) -> Result<Vec<Category>, StoreError>;
    async fn find(&self, id: &str) -> Result<Option<Category>, StoreError>;
    async fn find_by_name(&self, name: &str) -> Result<Option<Category>, StoreError>;
    async fn insert_many(&self, categories: &[Category]) -> Result<(), StoreError>;
    async fn replace(&self, category: &Category) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn exists(&self, email: &str, username: &str) -> Result<bool, StoreError>;
    async fn insert(&self, user: &User) -> Result<(), StoreError>;
}

/// Everything a request handler may read or write, shared through
/// `web::Data`.
#[derive(Clone)]
pub struct Stores {
    pub bills: Arc<dyn BillStore>,
    pub expenses: Arc<dyn ExpenseStore>,
    pub categories: Arc<dyn CategoryStore>,
    pub users: Arc<dyn UserStore>,
}
