//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;

use crate::common::time::millis_to_rfc3339;
use crate::domain::{Envelope, RoomName};
use crate::ui::state::AppState;

/// One room in the room list.
#[derive(Debug, Serialize)]
pub struct RoomSummaryDto {
    pub name: String,
    pub members: usize,
    pub created_at: String,
}

/// One member in the room detail.
#[derive(Debug, Serialize)]
pub struct MemberDto {
    pub uid: String,
    pub nick: String,
    pub connected_at: String,
}

/// Full room detail: members plus the bounded broadcast history.
#[derive(Debug, Serialize)]
pub struct RoomDetailDto {
    pub name: String,
    pub created_at: String,
    pub members: Vec<MemberDto>,
    pub history: Vec<Envelope>,
}

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Get list of live rooms
pub async fn get_rooms(State(state): State<Arc<AppState>>) -> Json<Vec<RoomSummaryDto>> {
    let overview = state.group.rooms_overview().await;
    let rooms = overview
        .into_iter()
        .map(|(name, members, created_at)| RoomSummaryDto {
            name: name.into_string(),
            members,
            created_at: millis_to_rfc3339(created_at.value()),
        })
        .collect();
    Json(rooms)
}

/// Get room detail by name
pub async fn get_room_detail(
    State(state): State<Arc<AppState>>,
    Path(room): Path<String>,
) -> Result<Json<RoomDetailDto>, StatusCode> {
    let name = RoomName::new(room).map_err(|_| StatusCode::NOT_FOUND)?;
    let room = state
        .group
        .lookup(&name)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    let members = room
        .members()
        .await
        .iter()
        .map(|member| MemberDto {
            uid: member.uid.to_string(),
            nick: member.nick.as_str().to_string(),
            connected_at: millis_to_rfc3339(member.connected_at.value()),
        })
        .collect();

    Ok(Json(RoomDetailDto {
        name: name.into_string(),
        created_at: millis_to_rfc3339(room.created_at().value()),
        members,
        history: room.history().await,
    }))
}
