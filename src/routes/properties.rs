use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};

use crate::{
    access::{assert_house_owner, require_role, unknown_user},
    auth::require_actor,
    error::AppResult,
    models::{NewHouse, NewRoom, Role},
    schemas::{validate_input, CreateHouseInput, CreateRoomInput, HousePath, RoomPath},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/houses", axum::routing::post(create_house))
        .route(
            "/houses/{house_id}/rooms",
            axum::routing::post(create_room),
        )
        .route("/rooms/{room_id}", axum::routing::get(get_room))
}

async fn create_house(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateHouseInput>,
) -> AppResult<impl IntoResponse> {
    let actor = require_actor(&state.config, &headers)?;
    require_role(&actor, &[Role::Owner])?;
    validate_input(&payload)?;
    let owner = state.store.get_user(actor.id).await.map_err(unknown_user)?;

    let mut tx = state.store.begin().await?;
    let house = tx
        .insert_house(&NewHouse {
            owner_id: owner.id,
            address: payload.address.trim().to_string(),
            city: payload.city,
            latitude: payload.latitude,
            longitude: payload.longitude,
            description: payload.description,
        })
        .await?;
    tx.commit().await?;

    tracing::info!(house_id = %house.id, owner_id = %owner.id, "House created");
    Ok((StatusCode::CREATED, Json(json!({ "data": house }))))
}

async fn create_room(
    State(state): State<AppState>,
    Path(path): Path<HousePath>,
    headers: HeaderMap,
    Json(payload): Json<CreateRoomInput>,
) -> AppResult<impl IntoResponse> {
    let actor = require_actor(&state.config, &headers)?;
    validate_input(&payload)?;

    let mut tx = state.store.begin().await?;
    let house = tx.house(path.house_id).await?;
    assert_house_owner(&actor, &house)?;
    let room = tx
        .insert_room(&NewRoom {
            house_id: house.id,
            title: payload.title.trim().to_string(),
            description: payload.description,
            size: payload.size,
            room_type: payload.room_type,
            furnished: payload.furnished,
            private_bathroom: payload.private_bathroom,
            monthly_price: payload.monthly_price,
        })
        .await?;
    tx.commit().await?;

    tracing::info!(room_id = %room.id, house_id = %house.id, "Room created");
    Ok((StatusCode::CREATED, Json(json!({ "data": room }))))
}

async fn get_room(
    State(state): State<AppState>,
    Path(path): Path<RoomPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_actor(&state.config, &headers)?;
    let room = state.store.get_room(path.room_id).await?;
    let house = state.store.get_house(room.house_id).await?;
    let media = state.store.list_media(room.id).await?;
    Ok(Json(json!({
        "data": room,
        "house": house,
        "media": media,
    })))
}
