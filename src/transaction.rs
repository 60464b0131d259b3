//! Transaction management for the finance tracking API.
//!
//! This module contains everything related to transactions:
//! - The `Transaction` model and the validated `NewTransaction` data it is created from
//! - Database functions for storing, querying, and managing transactions
//! - Route handlers for the transaction collection and detail endpoints

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::{
    Connection, Row, params_from_iter,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};

use crate::{
    AppState, Error, category::Category, database_id::DatabaseID, user::UserID,
    validation::FieldErrors,
};

/// The format transaction dates use in the API and the database.
const DATE_FORMAT: &[BorrowedFormatItem] = format_description!("[year]-[month]-[day]");

// ============================================================================
// MODELS
// ============================================================================

/// Whether a transaction took money out of the account or put money into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money spent.
    Expense,
    /// Money earned.
    Income,
}

impl TransactionType {
    /// The lowercase name used in the API and the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Expense => "expense",
            TransactionType::Income => "income",
        }
    }

    /// Parse a transaction type from its lowercase name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "expense" => Some(TransactionType::Expense),
            "income" => Some(TransactionType::Income),
            _ => None,
        }
    }
}

impl ToSql for TransactionType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;

        TransactionType::parse(text).ok_or_else(|| {
            FromSqlError::Other(format!("unknown transaction type {text:?}").into())
        })
    }
}

/// An expense or income recorded by a user.
///
/// Amounts are exact decimals with two decimal places, so monetary values
/// survive storage and aggregation without floating point drift.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: DatabaseID,
    /// The ID of the user who recorded the transaction. Not exposed in API
    /// responses since transactions are only ever served to their owner.
    #[serde(skip)]
    pub user_id: UserID,
    /// Whether this is an expense or income.
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// The amount of money spent or earned.
    pub amount: Decimal,
    /// What the transaction was for.
    pub category: Category,
    /// A text description of the transaction.
    pub description: String,
    /// When the transaction happened.
    pub date: Date,
    /// When the transaction was recorded.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the transaction was last modified.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The validated data for creating or replacing a transaction.
///
/// Produced by [TransactionForm::validate], which guarantees the amount has
/// exactly two decimal places and at most twelve digits in total.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// Whether this is an expense or income.
    pub transaction_type: TransactionType,
    /// The amount of money spent or earned.
    pub amount: Decimal,
    /// What the transaction was for.
    pub category: Category,
    /// A text description of the transaction.
    pub description: String,
    /// When the transaction happened.
    pub date: Date,
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// The state needed for the transaction endpoints.
#[derive(Debug, Clone)]
pub struct TransactionState {
    /// The database connection for managing transactions.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for TransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The request body for creating or updating a transaction.
///
/// Every field is optional so that validation can report all missing and
/// invalid fields at once instead of rejecting the request at the first
/// deserialization failure.
#[derive(Debug, Default, Deserialize)]
pub struct TransactionForm {
    /// Either "expense" or "income".
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    /// The amount of money spent or earned.
    pub amount: Option<Decimal>,
    /// The lowercase name of the category.
    pub category: Option<String>,
    /// A text description of the transaction, at most 255 characters.
    pub description: Option<String>,
    /// The date of the transaction in the format YYYY-MM-DD.
    pub date: Option<String>,
}

impl TransactionForm {
    /// Validate the form for creating a transaction or fully replacing one.
    ///
    /// Missing category and description fall back to [Category::Other] and the
    /// empty string. All other fields are required.
    ///
    /// # Errors
    /// Returns [FieldErrors] listing every invalid field and why.
    pub fn validate(self) -> Result<NewTransaction, FieldErrors> {
        let mut errors = FieldErrors::new();

        let transaction_type = match &self.transaction_type {
            Some(raw) => check_type(raw, &mut errors),
            None => {
                errors.add("type", "this field is required");
                None
            }
        };
        let amount = match self.amount {
            Some(amount) => check_amount(amount, &mut errors),
            None => {
                errors.add("amount", "this field is required");
                None
            }
        };
        let category = match &self.category {
            Some(raw) => check_category(raw, &mut errors),
            None => Some(Category::Other),
        };
        let description = match self.description {
            Some(raw) => check_description(raw, &mut errors),
            None => Some(String::new()),
        };
        let date = match &self.date {
            Some(raw) => check_date(raw, &mut errors),
            None => {
                errors.add("date", "this field is required");
                None
            }
        };

        match (transaction_type, amount, category, description, date) {
            (Some(transaction_type), Some(amount), Some(category), Some(description), Some(date))
                if errors.is_empty() =>
            {
                Ok(NewTransaction {
                    transaction_type,
                    amount,
                    category,
                    description,
                    date,
                })
            }
            _ => Err(errors),
        }
    }

    /// Validate the form as a partial update of `existing`.
    ///
    /// Fields absent from the form keep their current values. Fields that are
    /// present are validated the same way as in [TransactionForm::validate].
    ///
    /// # Errors
    /// Returns [FieldErrors] listing every invalid field and why.
    pub fn validate_partial(self, existing: &Transaction) -> Result<NewTransaction, FieldErrors> {
        let mut errors = FieldErrors::new();

        let transaction_type = match &self.transaction_type {
            Some(raw) => check_type(raw, &mut errors),
            None => Some(existing.transaction_type),
        };
        let amount = match self.amount {
            Some(amount) => check_amount(amount, &mut errors),
            None => Some(existing.amount),
        };
        let category = match &self.category {
            Some(raw) => check_category(raw, &mut errors),
            None => Some(existing.category),
        };
        let description = match self.description {
            Some(raw) => check_description(raw, &mut errors),
            None => Some(existing.description.clone()),
        };
        let date = match &self.date {
            Some(raw) => check_date(raw, &mut errors),
            None => Some(existing.date),
        };

        match (transaction_type, amount, category, description, date) {
            (Some(transaction_type), Some(amount), Some(category), Some(description), Some(date))
                if errors.is_empty() =>
            {
                Ok(NewTransaction {
                    transaction_type,
                    amount,
                    category,
                    description,
                    date,
                })
            }
            _ => Err(errors),
        }
    }
}

fn check_type(raw: &str, errors: &mut FieldErrors) -> Option<TransactionType> {
    let transaction_type = TransactionType::parse(raw);

    if transaction_type.is_none() {
        errors.add("type", "must be one of 'expense' or 'income'");
    }

    transaction_type
}

fn check_amount(amount: Decimal, errors: &mut FieldErrors) -> Option<Decimal> {
    if amount.scale() > 2 {
        errors.add("amount", "must have no more than 2 decimal places");
        return None;
    }

    // 12 digits in total, of which 2 are reserved for the decimal places.
    if amount.abs() >= Decimal::from(10_000_000_000i64) {
        errors.add("amount", "must have no more than 12 digits in total");
        return None;
    }

    let mut amount = amount;
    amount.rescale(2);

    Some(amount)
}

fn check_category(raw: &str, errors: &mut FieldErrors) -> Option<Category> {
    let category = Category::parse(raw);

    if category.is_none() {
        errors.add("category", "must be one of the known categories");
    }

    category
}

fn check_description(raw: String, errors: &mut FieldErrors) -> Option<String> {
    if raw.chars().count() > 255 {
        errors.add("description", "must be no longer than 255 characters");
        return None;
    }

    Some(raw)
}

fn check_date(raw: &str, errors: &mut FieldErrors) -> Option<Date> {
    match Date::parse(raw, DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(_) => {
            errors.add("date", "must be a date in the format YYYY-MM-DD");
            None
        }
    }
}

/// The query parameters accepted by the transaction list endpoint.
///
/// Unknown filter values are ignored rather than rejected, so a typo in a
/// filter yields an unfiltered (or less filtered) list instead of an error.
#[derive(Debug, Default, Deserialize)]
pub struct TransactionFilterParams {
    /// Only include transactions of this type.
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    /// Only include transactions with this category name.
    pub category: Option<String>,
    /// Only include transactions on or after this date (YYYY-MM-DD).
    pub date_from: Option<String>,
    /// Only include transactions on or before this date (YYYY-MM-DD).
    pub date_to: Option<String>,
}

impl TransactionFilterParams {
    fn into_filter(self) -> TransactionFilter {
        TransactionFilter {
            transaction_type: self
                .transaction_type
                .as_deref()
                .and_then(TransactionType::parse),
            category: self.category.filter(|category| !category.is_empty()),
            date_from: self
                .date_from
                .as_deref()
                .and_then(|raw| Date::parse(raw, DATE_FORMAT).ok()),
            date_to: self
                .date_to
                .as_deref()
                .and_then(|raw| Date::parse(raw, DATE_FORMAT).ok()),
        }
    }
}

/// A route handler for listing the current user's transactions.
///
/// Transactions are returned most recent first and can be narrowed down with
/// the filters in [TransactionFilterParams].
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub async fn get_transactions_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserID>,
    Query(params): Query<TransactionFilterParams>,
) -> impl IntoResponse {
    let connection = state.db_connection.lock().unwrap();

    query_transactions(user_id, params.into_filter(), &connection)
        .map(|transactions| (StatusCode::OK, Json(transactions)))
}

/// A route handler for recording a new transaction for the current user.
///
/// Responds with 201 and the created transaction on success, or 400 with
/// per-field error messages if the form is invalid.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub async fn create_transaction_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserID>,
    Json(data): Json<TransactionForm>,
) -> Response {
    let new_transaction = match data.validate() {
        Ok(new_transaction) => new_transaction,
        Err(errors) => return errors.into_response(),
    };

    let connection = state.db_connection.lock().unwrap();

    match create_transaction(user_id, new_transaction, &connection) {
        Ok(transaction) => (StatusCode::CREATED, Json(transaction)).into_response(),
        Err(error) => error.into_response(),
    }
}

/// A route handler for getting one of the current user's transactions by ID.
///
/// Responds with 404 if the transaction does not exist or belongs to another
/// user.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub async fn get_transaction_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserID>,
    Path(transaction_id): Path<DatabaseID>,
) -> impl IntoResponse {
    let connection = state.db_connection.lock().unwrap();

    get_transaction(transaction_id, user_id, &connection)
        .map(|transaction| (StatusCode::OK, Json(transaction)))
}

/// A route handler for fully replacing one of the current user's transactions.
///
/// All fields are validated as if the transaction were being created anew.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub async fn put_transaction_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserID>,
    Path(transaction_id): Path<DatabaseID>,
    Json(data): Json<TransactionForm>,
) -> Response {
    let new_transaction = match data.validate() {
        Ok(new_transaction) => new_transaction,
        Err(errors) => return errors.into_response(),
    };

    let connection = state.db_connection.lock().unwrap();

    match update_transaction(transaction_id, user_id, new_transaction, &connection) {
        Ok(transaction) => (StatusCode::OK, Json(transaction)).into_response(),
        Err(error) => error.into_response(),
    }
}

/// A route handler for partially updating one of the current user's
/// transactions. Fields absent from the request body keep their current
/// values.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub async fn patch_transaction_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserID>,
    Path(transaction_id): Path<DatabaseID>,
    Json(data): Json<TransactionForm>,
) -> Response {
    let connection = state.db_connection.lock().unwrap();

    let existing = match get_transaction(transaction_id, user_id, &connection) {
        Ok(transaction) => transaction,
        Err(error) => return error.into_response(),
    };

    let new_transaction = match data.validate_partial(&existing) {
        Ok(new_transaction) => new_transaction,
        Err(errors) => return errors.into_response(),
    };

    match update_transaction(transaction_id, user_id, new_transaction, &connection) {
        Ok(transaction) => (StatusCode::OK, Json(transaction)).into_response(),
        Err(error) => error.into_response(),
    }
}

/// A route handler for deleting one of the current user's transactions.
///
/// Responds with 204 on success and 404 if the transaction does not exist or
/// belongs to another user.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub async fn delete_transaction_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserID>,
    Path(transaction_id): Path<DatabaseID>,
) -> impl IntoResponse {
    let connection = state.db_connection.lock().unwrap();

    delete_transaction(transaction_id, user_id, &connection).map(|()| StatusCode::NO_CONTENT)
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

const TRANSACTION_COLUMNS: &str =
    "id, user_id, type, amount, category, description, date, created_at, updated_at";

/// Create the transaction table in the database.
///
/// Transactions belong to a row in the user table and are removed along with
/// their owner.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES user(id) ON DELETE CASCADE,
                type TEXT NOT NULL,
                amount TEXT NOT NULL,
                category TEXT NOT NULL,
                description TEXT NOT NULL,
                date TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

/// Create a new transaction in the database, owned by `user_id`.
///
/// # Errors
/// This function will return an [Error::SqlError] if there is an SQL error.
pub fn create_transaction(
    user_id: UserID,
    new_transaction: NewTransaction,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let now = OffsetDateTime::now_utc();

    let transaction = connection
        .prepare(&format!(
            "INSERT INTO \"transaction\" (user_id, type, amount, category, description, date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             RETURNING {TRANSACTION_COLUMNS}",
        ))?
        .query_row(
            (
                user_id.as_i64(),
                new_transaction.transaction_type,
                new_transaction.amount.to_string(),
                new_transaction.category,
                new_transaction.description,
                new_transaction.date,
                now,
                now,
            ),
            map_transaction_row,
        )?;

    Ok(transaction)
}

/// Retrieve a transaction owned by `user_id` from the database by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a transaction owned by `user_id`,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn get_transaction(
    id: DatabaseID,
    user_id: UserID,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\" WHERE id = :id AND user_id = :user_id",
        ))?
        .query_row(
            &[(":id", &id), (":user_id", &user_id.as_i64())],
            map_transaction_row,
        )?;

    Ok(transaction)
}

/// Replace the fields of a transaction owned by `user_id` and refresh its
/// modification time.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a transaction owned by `user_id`,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn update_transaction(
    id: DatabaseID,
    user_id: UserID,
    new_transaction: NewTransaction,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let now = OffsetDateTime::now_utc();

    let transaction = connection
        .prepare(&format!(
            "UPDATE \"transaction\"
             SET type = ?1, amount = ?2, category = ?3, description = ?4, date = ?5, updated_at = ?6
             WHERE id = ?7 AND user_id = ?8
             RETURNING {TRANSACTION_COLUMNS}",
        ))?
        .query_row(
            (
                new_transaction.transaction_type,
                new_transaction.amount.to_string(),
                new_transaction.category,
                new_transaction.description,
                new_transaction.date,
                now,
                id,
                user_id.as_i64(),
            ),
            map_transaction_row,
        )?;

    Ok(transaction)
}

/// Delete a transaction owned by `user_id` from the database by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a transaction owned by `user_id`,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn delete_transaction(
    id: DatabaseID,
    user_id: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_deleted = connection.execute(
        "DELETE FROM \"transaction\" WHERE id = ?1 AND user_id = ?2",
        (id, user_id.as_i64()),
    )?;

    if rows_deleted == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Defines how transactions should be narrowed down in [query_transactions].
///
/// All filters are optional and combine with AND.
#[derive(Debug, Default)]
pub struct TransactionFilter {
    /// Include only transactions of this type.
    pub transaction_type: Option<TransactionType>,
    /// Include only transactions with this category name. Compared verbatim,
    /// so an unknown name matches nothing.
    pub category: Option<String>,
    /// Include only transactions on or after this date.
    pub date_from: Option<Date>,
    /// Include only transactions on or before this date.
    pub date_to: Option<Date>,
}

/// Query for the transactions owned by `user_id`, most recent first.
///
/// Transactions are ordered by date, then by the time they were recorded, so
/// same-day transactions appear in reverse insertion order.
///
/// # Errors
/// This function will return an [Error::SqlError] if there is an SQL error.
pub fn query_transactions(
    user_id: UserID,
    filter: TransactionFilter,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    let mut where_clause_parts = vec!["user_id = ?1".to_string()];
    let mut query_parameters = vec![Value::Integer(user_id.as_i64())];

    if let Some(transaction_type) = filter.transaction_type {
        where_clause_parts.push(format!("type = ?{}", query_parameters.len() + 1));
        query_parameters.push(Value::Text(transaction_type.as_str().to_owned()));
    }

    if let Some(category) = filter.category {
        where_clause_parts.push(format!("category = ?{}", query_parameters.len() + 1));
        query_parameters.push(Value::Text(category));
    }

    if let Some(date_from) = filter.date_from {
        where_clause_parts.push(format!("date >= ?{}", query_parameters.len() + 1));
        query_parameters.push(Value::Text(date_from.to_string()));
    }

    if let Some(date_to) = filter.date_to {
        where_clause_parts.push(format!("date <= ?{}", query_parameters.len() + 1));
        query_parameters.push(Value::Text(date_to.to_string()));
    }

    let query_string = format!(
        "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\"
         WHERE {}
         ORDER BY date DESC, created_at DESC, id DESC",
        where_clause_parts.join(" AND ")
    );
    let params = params_from_iter(query_parameters.iter());

    connection
        .prepare(&query_string)?
        .query_map(params, map_transaction_row)?
        .map(|transaction_result| transaction_result.map_err(Error::from))
        .collect()
}

/// Map a database row to a [Transaction].
pub(crate) fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let id = row.get(0)?;
    let user_id = UserID::new(row.get(1)?);
    let transaction_type = row.get(2)?;
    let amount_text: String = row.get(3)?;
    let amount = amount_text.parse().map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(error))
    })?;
    let category = row.get(4)?;
    let description = row.get(5)?;
    let date = row.get(6)?;
    let created_at = row.get(7)?;
    let updated_at = row.get(8)?;

    Ok(Transaction {
        id,
        user_id,
        transaction_type,
        amount,
        category,
        description,
        date,
        created_at,
        updated_at,
    })
}

// ============================================================================
// TESTS
// ============================================================================
