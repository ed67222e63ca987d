use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use sea_orm::DbErr;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum CallFlowError {
    #[error("missing callback parameter {0}")]
    MissingParameter(&'static str),
    #[error("dialed-party callback without a parent call sid")]
    MissingParentCall,
    /// The externally managed schedule has overlapping messages.
    #[error("more than one active message at {at}: {ids:?}")]
    ScheduleConflict { at: DateTime<Utc>, ids: Vec<i64> },
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type Result<T, E = CallFlowError> = std::result::Result<T, E>;

impl CallFlowError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CallFlowError::MissingParameter(_) | CallFlowError::MissingParentCall => {
                StatusCode::BAD_REQUEST
            }
            CallFlowError::ScheduleConflict { .. }
            | CallFlowError::Database(_)
            | CallFlowError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CallFlowError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "callback failed");
        } else {
            warn!(error = %self, "callback rejected");
        }
        (status, self.to_string()).into_response()
    }
}
