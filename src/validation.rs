//! Structured per-field validation errors for JSON request bodies.

use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// A collection of validation error messages keyed by field name.
///
/// Rendered to the client as `400 {"field": ["message", ...]}`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<&'static str, Vec<String>>);

impl FieldErrors {
    /// Create an empty error collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error message against `field`.
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    /// Whether no errors have been recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The messages recorded against `field`, if any.
    #[cfg(test)]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }
}

impl IntoResponse for FieldErrors {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(self.0)).into_response()
    }
}

#[cfg(test)]
mod field_errors_tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use super::FieldErrors;

    #[test]
    fn new_collection_is_empty() {
        assert!(FieldErrors::new().is_empty());
    }

    #[test]
    fn add_records_messages_per_field() {
        let mut errors = FieldErrors::new();

        errors.add("username", "cannot be blank");
        errors.add("username", "is already taken");
        errors.add("password", "is too weak");

        assert!(!errors.is_empty());
        assert_eq!(
            errors.get("username"),
            Some(
                &[
                    "cannot be blank".to_owned(),
                    "is already taken".to_owned()
                ][..]
            )
        );
        assert_eq!(errors.get("password"), Some(&["is too weak".to_owned()][..]));
        assert_eq!(errors.get("amount"), None);
    }

    #[tokio::test]
    async fn renders_as_bad_request_json() {
        let mut errors = FieldErrors::new();
        errors.add("type", "must be one of 'expense' or 'income'");

        let response = errors.into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": ["must be one of 'expense' or 'income'"]})
        );
    }
}
