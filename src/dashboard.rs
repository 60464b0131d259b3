//! The dashboard endpoint, which aggregates a user's transactions into
//! income and expense totals and a per-category expense breakdown.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use axum::{
    Extension, Json,
    extract::{FromRef, State},
    http::StatusCode,
    response::IntoResponse,
};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    AppState, Error,
    category::Category,
    transaction::{TransactionFilter, TransactionType, query_transactions},
    user::UserID,
};

// ============================================================================
// MODELS
// ============================================================================

/// The total amount spent on a single category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    /// The category the expenses were filed under.
    pub category: Category,
    /// The sum of all expense amounts in this category.
    pub total: Decimal,
}

/// An overview of a user's finances across all of their transactions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    /// The sum of all income amounts.
    pub total_income: Decimal,
    /// The sum of all expense amounts.
    pub total_expense: Decimal,
    /// Income minus expenses. Negative when the user spent more than they
    /// earned.
    pub net_balance: Decimal,
    /// Expense totals per category, largest first.
    pub category_breakdown: Vec<CategoryTotal>,
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// The state needed for the dashboard endpoint.
#[derive(Debug, Clone)]
pub struct DashboardState {
    /// The database connection for reading transactions.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for DashboardState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A route handler for the current user's dashboard summary.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub async fn get_dashboard_endpoint(
    State(state): State<DashboardState>,
    Extension(user_id): Extension<UserID>,
) -> impl IntoResponse {
    let connection = state.db_connection.lock().unwrap();

    get_dashboard_summary(user_id, &connection).map(|summary| (StatusCode::OK, Json(summary)))
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Aggregate all of the transactions owned by `user_id` into a
/// [DashboardSummary].
///
/// The sums are computed with exact decimal arithmetic, so the dashboard
/// totals always match the sum of the listed transaction amounts. Categories
/// with equal totals are broken down in name order to keep the output stable.
///
/// # Errors
/// This function will return an [Error::SqlError] if there is an SQL error.
pub fn get_dashboard_summary(
    user_id: UserID,
    connection: &Connection,
) -> Result<DashboardSummary, Error> {
    let transactions = query_transactions(user_id, TransactionFilter::default(), connection)?;

    let mut total_income = Decimal::ZERO;
    let mut total_expense = Decimal::ZERO;
    let mut expenses_by_category: BTreeMap<Category, Decimal> = BTreeMap::new();

    for transaction in transactions {
        match transaction.transaction_type {
            TransactionType::Income => total_income += transaction.amount,
            TransactionType::Expense => {
                total_expense += transaction.amount;
                *expenses_by_category
                    .entry(transaction.category)
                    .or_insert(Decimal::ZERO) += transaction.amount;
            }
        }
    }

    let mut category_breakdown: Vec<CategoryTotal> = expenses_by_category
        .into_iter()
        .map(|(category, total)| CategoryTotal { category, total })
        .collect();
    // The map iterates in category order, so a stable sort by descending total
    // leaves equal totals in name order.
    category_breakdown.sort_by(|a, b| b.total.cmp(&a.total));

    let mut net_balance = total_income - total_expense;
    total_income.rescale(2);
    total_expense.rescale(2);
    net_balance.rescale(2);

    Ok(DashboardSummary {
        total_income,
        total_expense,
        net_balance,
        category_breakdown,
    })
}

// ============================================================================
// TESTS
// ============================================================================
