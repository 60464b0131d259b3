//! Application router configuration with protected and unprotected route definitions.

use axum::{
    Router, middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::{
    AppState, Error,
    auth_middleware::auth_guard,
    dashboard::get_dashboard_endpoint,
    endpoints,
    log_in::post_log_in,
    log_out::post_log_out,
    register::post_register,
    transaction::{
        create_transaction_endpoint, delete_transaction_endpoint, get_transaction_endpoint,
        get_transactions_endpoint, patch_transaction_endpoint, put_transaction_endpoint,
    },
};

/// Return a router with all the app's routes.
///
/// Registration and log-in are open to everyone; every other route requires a
/// valid auth cookie.
pub fn build_router(state: AppState) -> Router {
    let unprotected_routes = Router::new()
        .route(endpoints::REGISTER, post(post_register))
        .route(endpoints::LOG_IN, post(post_log_in));

    let protected_routes = Router::new()
        .route(endpoints::LOG_OUT, post(post_log_out))
        .route(
            endpoints::TRANSACTIONS,
            get(get_transactions_endpoint).post(create_transaction_endpoint),
        )
        .route(
            endpoints::TRANSACTION,
            get(get_transaction_endpoint)
                .put(put_transaction_endpoint)
                .patch(patch_transaction_endpoint)
                .delete(delete_transaction_endpoint),
        )
        .route(endpoints::DASHBOARD, get(get_dashboard_endpoint))
        .layer(middleware::from_fn_with_state(state.clone(), auth_guard));

    protected_routes
        .merge(unprotected_routes)
        .fallback(get_404_not_found)
        .with_state(state)
}

/// Serve a JSON 404 for paths that do not match any route.
async fn get_404_not_found() -> Response {
    Error::NotFound.into_response()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod routing_tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use rusqlite::Connection;
    use serde_json::{Value, json};

    use crate::{AppState, build_router, endpoints};

    fn get_test_server() -> TestServer {
        let connection =
            Connection::open_in_memory().expect("Could not open in-memory SQLite database");
        let state = AppState::new(connection, "42").expect("Could not create app state");

        let mut server =
            TestServer::try_new(build_router(state)).expect("Could not create test server");
        server.save_cookies();

        server
    }

    async fn register_and_log_in(server: &TestServer, username: &str) {
        server
            .post(endpoints::REGISTER)
            .json(&json!({
                "username": username,
                "password": "iamtestingwhethericancreateanewuser",
            }))
            .await
            .assert_status(StatusCode::CREATED);

        server
            .post(endpoints::LOG_IN)
            .json(&json!({
                "username": username,
                "password": "iamtestingwhethericancreateanewuser",
            }))
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn full_workflow_produces_expected_dashboard() {
        let server = get_test_server();
        register_and_log_in(&server, "alice").await;

        for (transaction_type, amount, category) in [
            ("income", 1000.00, "salary"),
            ("expense", 200.00, "food"),
            ("expense", 50.00, "transport"),
        ] {
            server
                .post(endpoints::TRANSACTIONS)
                .json(&json!({
                    "type": transaction_type,
                    "amount": amount,
                    "category": category,
                    "date": "2025-01-15",
                }))
                .await
                .assert_status(StatusCode::CREATED);
        }

        let response = server.get(endpoints::DASHBOARD).await;

        response.assert_status_ok();
        response.assert_json(&json!({
            "total_income": "1000.00",
            "total_expense": "250.00",
            "net_balance": "750.00",
            "category_breakdown": [
                {"category": "food", "total": "200.00"},
                {"category": "transport", "total": "50.00"},
            ],
        }));
    }

    #[tokio::test]
    async fn unauthenticated_requests_are_rejected() {
        let server = get_test_server();

        for response in [
            server.get(endpoints::TRANSACTIONS).await,
            server.post(endpoints::TRANSACTIONS).json(&json!({})).await,
            server.get(&endpoints::transaction_path(1)).await,
            server.get(endpoints::DASHBOARD).await,
            server.post(endpoints::LOG_OUT).await,
        ] {
            response.assert_status_unauthorized();
            response.assert_json(&json!({"error": "authentication required"}));
        }
    }

    #[tokio::test]
    async fn transaction_crud_over_http() {
        let server = get_test_server();
        register_and_log_in(&server, "alice").await;

        let created = server
            .post(endpoints::TRANSACTIONS)
            .json(&json!({
                "type": "expense",
                "amount": "200.00",
                "category": "food",
                "description": "groceries",
                "date": "2025-01-10",
            }))
            .await;
        created.assert_status(StatusCode::CREATED);
        let created: Value = created.json();
        let transaction_id = created["id"].as_i64().expect("response should have an id");
        assert_eq!(created["type"], "expense");
        assert_eq!(created["amount"], "200.00");

        let fetched = server
            .get(&endpoints::transaction_path(transaction_id))
            .await;
        fetched.assert_status_ok();
        fetched.assert_json(&created);

        let replaced = server
            .put(&endpoints::transaction_path(transaction_id))
            .json(&json!({
                "type": "income",
                "amount": "1000.00",
                "category": "salary",
                "description": "January pay",
                "date": "2025-01-15",
            }))
            .await;
        replaced.assert_status_ok();
        let replaced: Value = replaced.json();
        assert_eq!(replaced["type"], "income");
        assert_eq!(replaced["amount"], "1000.00");
        assert_eq!(replaced["category"], "salary");

        let patched = server
            .patch(&endpoints::transaction_path(transaction_id))
            .json(&json!({"amount": "1200.00"}))
            .await;
        patched.assert_status_ok();
        let patched: Value = patched.json();
        assert_eq!(patched["amount"], "1200.00");
        assert_eq!(patched["category"], "salary", "other fields should remain");

        server
            .delete(&endpoints::transaction_path(transaction_id))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .get(&endpoints::transaction_path(transaction_id))
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn invalid_transaction_returns_field_errors() {
        let server = get_test_server();
        register_and_log_in(&server, "alice").await;

        let response = server
            .post(endpoints::TRANSACTIONS)
            .json(&json!({
                "type": "transfer",
                "amount": "1.999",
                "date": "2025-01-15",
            }))
            .await;

        response.assert_status_bad_request();
        response.assert_json(&json!({
            "type": ["must be one of 'expense' or 'income'"],
            "amount": ["must have no more than 2 decimal places"],
        }));
    }

    #[tokio::test]
    async fn list_supports_type_filter() {
        let server = get_test_server();
        register_and_log_in(&server, "alice").await;

        for (transaction_type, category) in [("income", "salary"), ("expense", "food")] {
            server
                .post(endpoints::TRANSACTIONS)
                .json(&json!({
                    "type": transaction_type,
                    "amount": "10.00",
                    "category": category,
                    "date": "2025-01-15",
                }))
                .await
                .assert_status(StatusCode::CREATED);
        }

        let response = server
            .get(endpoints::TRANSACTIONS)
            .add_query_param("type", "income")
            .await;
        response.assert_status_ok();
        let transactions: Vec<Value> = response.json();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0]["type"], "income");

        // An unknown type is ignored rather than rejected.
        let response = server
            .get(endpoints::TRANSACTIONS)
            .add_query_param("type", "transfer")
            .await;
        response.assert_status_ok();
        let transactions: Vec<Value> = response.json();
        assert_eq!(transactions.len(), 2);
    }

    #[tokio::test]
    async fn users_cannot_see_each_others_transactions() {
        let mut server = get_test_server();
        register_and_log_in(&server, "alice").await;

        let created = server
            .post(endpoints::TRANSACTIONS)
            .json(&json!({
                "type": "expense",
                "amount": "200.00",
                "category": "food",
                "date": "2025-01-10",
            }))
            .await;
        created.assert_status(StatusCode::CREATED);
        let created: Value = created.json();
        let transaction_id = created["id"].as_i64().expect("response should have an id");

        server.clear_cookies();
        register_and_log_in(&server, "bob").await;

        server
            .get(&endpoints::transaction_path(transaction_id))
            .await
            .assert_status_not_found();
        server
            .delete(&endpoints::transaction_path(transaction_id))
            .await
            .assert_status_not_found();

        let listed = server.get(endpoints::TRANSACTIONS).await;
        listed.assert_status_ok();
        let transactions: Vec<Value> = listed.json();
        assert_eq!(transactions.len(), 0);
    }

    #[tokio::test]
    async fn log_out_ends_the_session() {
        let server = get_test_server();
        register_and_log_in(&server, "alice").await;
        server.get(endpoints::TRANSACTIONS).await.assert_status_ok();

        server.post(endpoints::LOG_OUT).await.assert_status_ok();

        server
            .get(endpoints::TRANSACTIONS)
            .await
            .assert_status_unauthorized();
    }

    #[tokio::test]
    async fn unknown_route_returns_json_404() {
        let server = get_test_server();

        let response = server.get("/api/does_not_exist").await;

        response.assert_status_not_found();
        response.assert_json(&json!({"error": "not found"}));
    }
}
