//! The API endpoint URIs.

/// The route for creating a new user account.
pub const REGISTER: &str = "/api/register";
/// The route for logging in a user.
pub const LOG_IN: &str = "/api/log_in";
/// The route for the client to log out the current user.
pub const LOG_OUT: &str = "/api/log_out";
/// The route to list and create transactions.
pub const TRANSACTIONS: &str = "/api/transactions";
/// The route to access a single transaction.
pub const TRANSACTION: &str = "/api/transactions/{transaction_id}";
/// The route for the aggregated dashboard summary.
pub const DASHBOARD: &str = "/api/dashboard";

/// Build the detail path for the transaction with `id`.
pub fn transaction_path(id: i64) -> String {
    format!("/api/transactions/{id}")
}
