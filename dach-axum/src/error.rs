use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dach_connect::HandshakeError;
use dach_core::errors::DachError;

#[derive(Debug)]
pub struct DachAxumError(pub anyhow::Error);

impl From<anyhow::Error> for DachAxumError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl From<DachError> for DachAxumError {
    fn from(e: DachError) -> Self {
        Self(e.into_anyhow())
    }
}

impl From<HandshakeError> for DachAxumError {
    fn from(e: HandshakeError) -> Self {
        DachError::from(e).into()
    }
}

impl IntoResponse for DachAxumError {
    fn into_response(self) -> Response {
        // If it's a DachError (even if wrapped by anyhow contexts), preserve its fields
        if let Some(dach) = self.0.chain().find_map(|e| e.downcast_ref::<DachError>()) {
            let safe = dach.sanitize_for_client();
            let status = StatusCode::from_u16(safe.code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return (status, Json(safe.to_json())).into_response();
        }

        // Fallback: wrap any non-DachError as a DachError::GeneralError
        let dach = DachError::normalize(self.0).sanitize_for_client();
        let status = StatusCode::from_u16(dach.code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(dach.to_json())).into_response()
    }
}
