use serde::Serialize;

use crate::schemas::{Bill, Expense};

/// Largest gap between the summed expenses and the bill total that still
/// counts as balanced.
pub const BALANCE_TOLERANCE: f64 = 0.01;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ContributorSplit {
    pub name: String,
    pub paid: f64,
    pub owes: f64,
    pub balance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillSummary {
    pub bill: Bill,
    pub total_expenses: f64,
    pub split: Vec<ContributorSplit>,
    pub expenses: Vec<Expense>,
    pub is_balanced: bool,
}

/// Evenly divides the recorded bill total among its contributors.
///
/// A bill without contributors has nobody to split between and yields an
/// empty list.
pub fn compute_split(bill: &Bill) -> Vec<ContributorSplit> {
    if bill.contributors.is_empty() {
        return Vec::new();
    }
    let split_amount = bill.total_amount / bill.contributors.len() as f64;
    bill.contributors
        .iter()
        .map(|contributor| ContributorSplit {
            name: contributor.name.clone(),
            paid: contributor.amount_paid,
            owes: split_amount,
            balance: contributor.amount_paid - split_amount,
        })
        .collect()
}

pub fn total_expenses(expenses: &[Expense]) -> f64 {
    expenses.iter().map(|expense| expense.amount).sum()
}

pub fn is_balanced(total_expenses: f64, total_amount: f64) -> bool {
    (total_expenses - total_amount).abs() < BALANCE_TOLERANCE
}

pub fn summarize_bill(bill: Bill, expenses: Vec<Expense>) -> BillSummary {
    let total_expenses = total_expenses(&expenses);
    let split = compute_split(&bill);
    let is_balanced = is_balanced(total_expenses, bill.total_amount);
    BillSummary {
        bill,
        total_expenses,
        split,
        expenses,
        is_balanced,
    }
}
