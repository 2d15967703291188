use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{BillStore, CategoryStore, ExpenseStore, StoreError, Stores, UserStore};
use crate::schemas::{Bill, Category, Expense, User};

/// Enforces the same unique keys as the Mongo indexes.
pub struct MemoryCollection<T> {
    records: Mutex<Vec<T>>,
}

impl<T> Default for MemoryCollection<T> {
    fn default() -> Self {
        MemoryCollection {
            records: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone> MemoryCollection<T> {
    fn filtered(&self, keep: impl Fn(&T) -> bool) -> Vec<T> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|record| keep(record))
            .cloned()
            .collect()
    }

    fn first(&self, keep: impl Fn(&T) -> bool) -> Option<T> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|record| keep(record))
            .cloned()
    }

    fn push(&self, record: &T) {
        self.records.lock().unwrap().push(record.clone());
    }

    fn replace_where(&self, record: &T, matches: impl Fn(&T) -> bool) -> bool {
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|existing| matches(existing)) {
            Some(slot) => {
                *slot = record.clone();
                true
            }
            None => false,
        }
    }

    fn remove_where(&self, matches: impl Fn(&T) -> bool) -> u64 {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|record| !matches(record));
        (before - records.len()) as u64
    }
}

pub fn stores() -> Stores {
    Stores {
        bills: Arc::new(MemoryCollection::<Bill>::default()),
        expenses: Arc::new(MemoryCollection::<Expense>::default()),
        categories: Arc::new(MemoryCollection::<Category>::default()),
        users: Arc::new(MemoryCollection::<User>::default()),
    }
}

#[async_trait]
impl BillStore for MemoryCollection<Bill> {
    async fn list(&self) -> Result<Vec<Bill>, StoreError> {
        let mut bills = self.filtered(|_| true);
        bills.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bills)
    }

    async fn find(&self, id: &str) -> Result<Option<Bill>, StoreError> {
        Ok(self.first(|bill| bill.id == id))
    }

    async fn insert(&self, bill: &Bill) -> Result<(), StoreError> {
        self.push(bill);
        Ok(())
    }

    async fn replace(&self, bill: &Bill) -> Result<bool, StoreError> {
        Ok(self.replace_where(bill, |existing| existing.id == bill.id))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.remove_where(|bill| bill.id == id) > 0)
    }
}

#[async_trait]
impl ExpenseStore for MemoryCollection<Expense> {
    async fn list(&self) -> Result<Vec<Expense>, StoreError> {
        let mut expenses = self.filtered(|_| true);
        expenses.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(expenses)
    }

    async fn list_for_bill(&self, bill_id: &str) -> Result<Vec<Expense>, StoreError> {
        let mut expenses = self.filtered(|expense| expense.bill == bill_id);
        expenses.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(expenses)
    }

    async fn find(&self, id: &str) -> Result<Option<Expense>, StoreError> {
        Ok(self.first(|expense| expense.id == id))
    }

    async fn insert(&self, expense: &Expense) -> Result<(), StoreError> {
        self.push(expense);
        Ok(())
    }

    async fn replace(&self, expense: &Expense) -> Result<bool, StoreError> {
        Ok(self.replace_where(expense, |existing| existing.id == expense.id))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.remove_where(|expense| expense.id == id) > 0)
    }

    async fn delete_for_bill(&self, bill_id: &str) -> Result<u64, StoreError> {
        Ok(self.remove_where(|expense| expense.bill == bill_id))
    }
}

#[async_trait]
impl CategoryStore for MemoryCollection<Category> {
    async fn list_active(&self) -> Result<Vec<Category>, StoreError> {
        let mut categories = self.filtered(|category| category.is_active);
        categories.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(categories)
    }

    async fn find(&self, id: &str) -> Result<Option<Category>, StoreError> {
        Ok(self.first(|category| category.id == id))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Category>, StoreError> {
        Ok(self.first(|category| category.name == name))
    }

    async fn insert_many(&self, categories: &[Category]) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        for category in categories {
            if records.iter().any(|existing| existing.name == category.name) {
                return Err(StoreError::Duplicate);
            }
            records.push(category.clone());
        }
        Ok(())
    }

    async fn replace(&self, category: &Category) -> Result<bool, StoreError> {
        Ok(self.replace_where(category, |existing| existing.id == category.id))
    }
}

#[async_trait]
impl UserStore for MemoryCollection<User> {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.first(|user| user.username == username))
    }

    async fn exists(&self, email: &str, username: &str) -> Result<bool, StoreError> {
        Ok(self
            .first(|user| user.email == email || user.username == username)
            .is_some())
    }

    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        if self.exists(&user.email, &user.username).await? {
            return Err(StoreError::Duplicate);
        }
        self.push(user);
        Ok(())
    }
}
