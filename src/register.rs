//! The registration endpoint for creating a new user account.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;

use crate::{
    AppState, Error, PasswordHash, ValidatedPassword, user::create_user, validation::FieldErrors,
};

/// The state needed for creating a new user.
#[derive(Debug, Clone)]
pub struct RegistrationState {
    /// The database connection for creating users.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for RegistrationState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The request body for registering a new account.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterForm {
    /// The name the new user will log in with.
    pub username: Option<String>,
    /// The new user's password in plain text.
    pub password: Option<String>,
}

/// A route handler for registering a new user account.
///
/// Responds with 201 on success, or 400 with per-field error messages if the
/// username is taken or invalid, or the password is too easy to guess.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub async fn post_register(
    State(state): State<RegistrationState>,
    Json(data): Json<RegisterForm>,
) -> Response {
    let mut errors = FieldErrors::new();

    let username = match data.username.as_deref() {
        Some(username) if !username.is_empty() => {
            if username.chars().count() > 150 {
                errors.add("username", "must be no longer than 150 characters");
                None
            } else {
                Some(username)
            }
        }
        _ => {
            errors.add("username", "this field is required");
            None
        }
    };

    let validated_password = match data.password.as_deref() {
        Some(password) if !password.is_empty() => match ValidatedPassword::new(password) {
            Ok(validated_password) => Some(validated_password),
            Err(error) => {
                errors.add("password", error.to_string());
                None
            }
        },
        _ => {
            errors.add("password", "this field is required");
            None
        }
    };

    let (username, validated_password) = match (username, validated_password) {
        (Some(username), Some(validated_password)) if errors.is_empty() => {
            (username, validated_password)
        }
        _ => return errors.into_response(),
    };

    let password_hash = match PasswordHash::new(validated_password, PasswordHash::DEFAULT_COST) {
        Ok(password_hash) => password_hash,
        Err(error) => {
            tracing::error!("an error occurred while hashing a password: {error}");
            return error.into_response();
        }
    };

    let connection = state.db_connection.lock().unwrap();

    match create_user(username, password_hash, &connection) {
        Ok(user) => {
            tracing::info!("registered new user {}", user.username);

            (
                StatusCode::CREATED,
                Json(json!({
                    "message": "Account created successfully. You can now log in."
                })),
            )
                .into_response()
        }
        Err(Error::DuplicateUsername) => {
            errors.add("username", "a user with that username already exists");
            errors.into_response()
        }
        Err(error) => error.into_response(),
    }
}

#[cfg(test)]
mod register_tests {
    use std::sync::{Arc, Mutex};

    use axum::{Router, routing::post};
    use axum_test::TestServer;
    use rusqlite::Connection;
    use serde_json::json;

    use crate::{PasswordHash, db::initialize, endpoints, user::create_user};

    use super::{RegistrationState, post_register};

    fn get_test_server() -> TestServer {
        let connection =
            Connection::open_in_memory().expect("Could not open in-memory SQLite database");
        initialize(&connection).expect("Could not initialize database");

        let state = RegistrationState {
            db_connection: Arc::new(Mutex::new(connection)),
        };
        let app = Router::new()
            .route(endpoints::REGISTER, post(post_register))
            .with_state(state);

        TestServer::try_new(app).expect("Could not create test server")
    }

    #[tokio::test]
    async fn register_succeeds() {
        let server = get_test_server();

        let response = server
            .post(endpoints::REGISTER)
            .json(&json!({
                "username": "alice",
                "password": "iamtestingwhethericancreateanewuser",
            }))
            .await;

        response.assert_status(axum::http::StatusCode::CREATED);
        response.assert_json(&json!({
            "message": "Account created successfully. You can now log in."
        }));
    }

    #[tokio::test]
    async fn register_fails_with_weak_password() {
        let server = get_test_server();

        let response = server
            .post(endpoints::REGISTER)
            .json(&json!({
                "username": "alice",
                "password": "password123",
            }))
            .await;

        response.assert_status_bad_request();
        let errors: serde_json::Value = response.json();
        assert!(
            errors.get("password").is_some(),
            "want an error for the password field, got {errors}"
        );
    }

    #[tokio::test]
    async fn register_fails_with_missing_fields() {
        let server = get_test_server();

        let response = server.post(endpoints::REGISTER).json(&json!({})).await;

        response.assert_status_bad_request();
        response.assert_json(&json!({
            "username": ["this field is required"],
            "password": ["this field is required"],
        }));
    }

    #[tokio::test]
    async fn register_fails_with_overlong_username() {
        let server = get_test_server();

        let response = server
            .post(endpoints::REGISTER)
            .json(&json!({
                "username": "a".repeat(151),
                "password": "iamtestingwhethericancreateanewuser",
            }))
            .await;

        response.assert_status_bad_request();
        response.assert_json(&json!({
            "username": ["must be no longer than 150 characters"],
        }));
    }

    #[tokio::test]
    async fn register_fails_with_duplicate_username() {
        let connection =
            Connection::open_in_memory().expect("Could not open in-memory SQLite database");
        initialize(&connection).expect("Could not initialize database");
        create_user("alice", PasswordHash::new_unchecked("hash"), &connection)
            .expect("Could not create test user");

        let state = RegistrationState {
            db_connection: Arc::new(Mutex::new(connection)),
        };
        let app = Router::new()
            .route(endpoints::REGISTER, post(post_register))
            .with_state(state);
        let server = TestServer::try_new(app).expect("Could not create test server");

        let response = server
            .post(endpoints::REGISTER)
            .json(&json!({
                "username": "alice",
                "password": "iamtestingwhethericancreateanewuser",
            }))
            .await;

        response.assert_status_bad_request();
        response.assert_json(&json!({
            "username": ["a user with that username already exists"],
        }));
    }
}
