//! Ticket API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use pflow_core::{Ticket, TicketStatus};

use super::submissions::{api_error, ApiError, DataResponse};
use crate::state::AppState;

/// Response for ticket operations
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketResponse {
    pub id: String,
    pub title: String,
    pub status: TicketStatus,
    pub form_id: String,
    pub assignee_id: Option<String>,
    pub priority: String,
    pub metadata: Map<String, Value>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
}

impl From<Ticket> for TicketResponse {
    fn from(ticket: Ticket) -> Self {
        Self {
            id: ticket.id,
            title: ticket.title,
            status: ticket.status,
            form_id: ticket.form_id,
            assignee_id: ticket.assignee_id,
            priority: ticket.priority,
            metadata: ticket.metadata,
            created_at: ticket.created_at.to_rfc3339(),
            updated_at: ticket.updated_at.to_rfc3339(),
            resolved_at: ticket.resolved_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Get a ticket by ID
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<TicketResponse>>, ApiError> {
    match state.ticket_store().get(&id) {
        Ok(Some(ticket)) => Ok(Json(DataResponse {
            data: TicketResponse::from(ticket),
        })),
        Ok(None) => Err(api_error(StatusCode::NOT_FOUND, "ticket not found")),
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}
