/**
 * Error Conversion
 *
 * `IntoResponse` for `CollabError`, so the collaboration endpoint can
 * refuse an upgrade with a regular HTTP error.
 *
 * # Response Format
 *
 * ```json
 * {
 *   "error": "Error message",
 *   "status": 403
 * }
 * ```
 */

use axum::{
    response::{IntoResponse, Response},
    Json,
};

use crate::backend::error::types::CollabError;

impl IntoResponse for CollabError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "error": self.message(),
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
