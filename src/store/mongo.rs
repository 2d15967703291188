use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bson::{doc, Document};
use futures::TryStreamExt;
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::{FindOptions, IndexOptions},
    Client, Collection, Database, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};

use super::{BillStore, CategoryStore, ExpenseStore, StoreError, Stores, UserStore};
use crate::schemas::{Bill, Category, Expense, User};

const CONNECT_ATTEMPTS: u32 = 5;

/// Server code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;

pub(super) fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY
        }
        ErrorKind::BulkWrite(failure) => failure
            .write_errors
            .iter()
            .flatten()
            .any(|write_error| write_error.code == DUPLICATE_KEY),
        _ => false,
    }
}

/// Connects and pings the server, backing off 2^n seconds between failed
/// attempts.
pub async fn connect(uri: &str, database: &str) -> Result<Database, StoreError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = async {
            let client = Client::with_uri_str(uri).await?;
            let db = client.database(database);
            db.run_command(doc! { "ping": 1 }, None).await?;
            Ok::<_, mongodb::error::Error>(db)
        }
        .await;

        match result {
            Ok(db) => {
                info!("Connected to MongoDB database {database}");
                return Ok(db);
            }
            Err(err) if attempt < CONNECT_ATTEMPTS => {
                let delay = Duration::from_secs(2u64.pow(attempt));
                warn!("MongoDB connection attempt {attempt} failed: {err}");
                info!("Retrying connection in {}ms", delay.as_millis());
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn index(keys: Document, unique: bool) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(unique).build())
        .build()
}

pub async fn ensure_indexes(db: &Database) -> Result<(), StoreError> {
    let users = db.collection::<Document>(USERS);
    users.create_index(index(doc! { "email": 1 }, true), None).await?;
    users.create_index(index(doc! { "username": 1 }, true), None).await?;

    let bills = db.collection::<Document>(BILLS);
    bills.create_index(index(doc! { "createdBy": 1 }, false), None).await?;
    bills.create_index(index(doc! { "createdAt": -1 }, false), None).await?;

    let expenses = db.collection::<Document>(EXPENSES);
    for keys in [
        doc! { "bill": 1 },
        doc! { "submittedBy": 1 },
        doc! { "category": 1 },
        doc! { "date": -1 },
    ] {
        expenses.create_index(index(keys, false), None).await?;
    }

    let categories = db.collection::<Document>(CATEGORIES);
    categories.create_index(index(doc! { "name": 1 }, true), None).await?;
    categories.create_index(index(doc! { "isActive": 1 }, false), None).await?;

    info!("Database indexes created");
    Ok(())
}

const BILLS: &str = "bills";
const EXPENSES: &str = "expenses";
const CATEGORIES: &str = "categories";
const USERS: &str = "users";

pub fn stores(db: &Database) -> Stores {
    Stores {
        bills: Arc::new(MongoCollection::<Bill>::new(db, BILLS)),
        expenses: Arc::new(MongoCollection::<Expense>::new(db, EXPENSES)),
        categories: Arc::new(MongoCollection::<Category>::new(db, CATEGORIES)),
        users: Arc::new(MongoCollection::<User>::new(db, USERS)),
    }
}

pub struct MongoCollection<T: Send + Sync> {
    collection: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    fn new(db: &Database, name: &str) -> Self {
        MongoCollection {
            collection: db.collection(name),
        }
    }

    async fn find_many(
        &self,
        filter: Document,
        sort: Option<Document>,
    ) -> Result<Vec<T>, StoreError> {
        let options = FindOptions::builder().sort(sort).build();
        let cursor = self.collection.find(filter, options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_one(&self, filter: Document) -> Result<Option<T>, StoreError> {
        Ok(self.collection.find_one(filter, None).await?)
    }

    async fn insert_record(&self, record: &T) -> Result<(), StoreError> {
        self.collection.insert_one(record, None).await?;
        Ok(())
    }

    async fn replace_by_id(&self, id: &str, record: &T) -> Result<bool, StoreError> {
        let result = self
            .collection
            .replace_one(doc! { "_id": id }, record, None)
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn delete_where(&self, filter: Document) -> Result<u64, StoreError> {
        Ok(self.collection.delete_many(filter, None).await?.deleted_count)
    }
}

#[async_trait]
impl BillStore for MongoCollection<Bill> {
    async fn list(&self) -> Result<Vec<Bill>, StoreError> {
        self.find_many(doc! {}, Some(doc! { "createdAt": -1 })).await
    }

    async fn find(&self, id: &str) -> Result<Option<Bill>, StoreError> {
        self.find_one(doc! { "_id": id }).await
    }

    async fn insert(&self, bill: &Bill) -> Result<(), StoreError> {
        self.insert_record(bill).await
    }

    async fn replace(&self, bill: &Bill) -> Result<bool, StoreError> {
        self.replace_by_id(&bill.id, bill).await
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.delete_where(doc! { "_id": id }).await? > 0)
    }
}

#[async_trait]
impl ExpenseStore for MongoCollection<Expense> {
    async fn list(&self) -> Result<Vec<Expense>, StoreError> {
        self.find_many(doc! {}, Some(doc! { "date": -1 })).await
    }

    async fn list_for_bill(&self, bill_id: &str) -> Result<Vec<Expense>, StoreError> {
        self.find_many(doc! { "bill": bill_id }, Some(doc! { "date": -1 }))
            .await
    }

    async fn find(&self, id: &str) -> Result<Option<Expense>, StoreError> {
        self.find_one(doc! { "_id": id }).await
    }

    async fn insert(&self, expense: &Expense) -> Result<(), StoreError> {
        self.insert_record(expense).await
    }

    async fn replace(&self, expense: &Expense) -> Result<bool, StoreError> {
        self.replace_by_id(&expense.id, expense).await
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.delete_where(doc! { "_id": id }).await? > 0)
    }

    async fn delete_for_bill(&self, bill_id: &str) -> Result<u64, StoreError> {
        self.delete_where(doc! { "bill": bill_id }).await
    }
}

#[async_trait]
impl CategoryStore for MongoCollection<Category> {
    async fn list_active(&self) -> Result<Vec<Category>, StoreError> {
        self.find_many(doc! { "isActive": true }, Some(doc! { "displayName": 1 }))
            .await
    }

    async fn find(&self, id: &str) -> Result<Option<Category>, StoreError> {
        self.find_one(doc! { "_id": id }).await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Category>, StoreError> {
        self.find_one(doc! { "name": name }).await
    }

    async fn insert_many(&self, categories: &[Category]) -> Result<(), StoreError> {
        if !categories.is_empty() {
            self.collection.insert_many(categories, None).await?;
        }
        Ok(())
    }

    async fn replace(&self, category: &Category) -> Result<bool, StoreError> {
        self.replace_by_id(&category.id, category).await
    }
}

#[async_trait]
impl UserStore for MongoCollection<User> {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.find_one(doc! { "username": username }).await
    }

    async fn exists(&self, email: &str, username: &str) -> Result<bool, StoreError> {
        let filter = doc! { "$or": [{ "email": email }, { "username": username }] };
        Ok(self.collection.count_documents(filter, None).await? > 0)
    }

    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        self.insert_record(user).await
    }
}
