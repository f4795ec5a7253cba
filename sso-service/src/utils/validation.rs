use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use validator::ValidationErrors;

use crate::dtos::ApiResponse;

/// JSON body extractor answering decode failures in the API error envelope.
///
/// Field validation is left to the service layer so it runs before any side
/// effect regardless of the caller.
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to read request body");
            reject("failed to read request")
        })?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            tracing::warn!("Request body is empty");
            return Err(reject("empty request"));
        }

        let value = serde_json::from_slice(&bytes).map_err(|e| {
            tracing::warn!(error = %e, "Failed to decode request body");
            reject("failed to decode request")
        })?;

        Ok(JsonBody(value))
    }
}

fn reject(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::error(message))).into_response()
}

/// Renders validation failures one field at a time, e.g.
/// `field email is not a valid email, field password must be ...`.
pub fn describe_validation_errors(errors: &ValidationErrors) -> String {
    let by_field: BTreeMap<String, Vec<String>> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("is not valid ({})", e.code))
                })
                .collect();
            (field.to_string(), messages)
        })
        .collect();

    by_field
        .into_iter()
        .flat_map(|(field, messages)| {
            messages
                .into_iter()
                .map(move |m| format!("field {} {}", field, m))
        })
        .collect::<Vec<_>>()
        .join(", ")
}
