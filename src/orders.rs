use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Html,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::app::AppState;
use crate::catalog::{CanteenQuery, canteen_options};
use crate::error::AppError;
use crate::models::{Canteen, Order, Principal};
use crate::store::Database;
use crate::token;

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub canteen: String,
    pub item_id: String,
}

/// Buy one unit of an item for `principal`
///
/// Draws a token, then bumps the item's sold counter and appends the order
/// record in a single store mutation. Nothing is retried.
///
/// # Errors
/// * `AppError::NotFound` if the item isn't in the canteen's catalog
/// * `AppError::Store` if the mutation could not be persisted
pub fn place_order(
    db: &Database,
    principal: &Principal,
    canteen: Canteen,
    item_id: &str,
) -> Result<Order, AppError> {
    let token = token::generate();

    match db.place_order(canteen, item_id, &principal.username, token, Utc::now()) {
        Ok(order) => {
            info!(
                username = %order.username,
                %canteen,
                item = %order.item_name,
                token = %order.token,
                "Order placed"
            );
            Ok(order)
        }
        Err(e) => {
            error!(username = %principal.username, %canteen, item_id, error = %e, "Order failed");
            Err(e.into())
        }
    }
}

pub async fn handle_place_order(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let canteen: Canteen = req.canteen.parse()?;
    let order = place_order(&state.db, &principal, canteen, &req.item_id)?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list_my_orders(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(state.db.orders_for_user(&principal.username)?))
}

pub async fn serve_orders_page(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<CanteenQuery>,
) -> Result<Html<String>, AppError> {
    let canteen = query.canteen()?;
    let items = state.db.list_items(canteen)?;

    state.pages.render(
        "orders",
        &json!({
            "username": principal.username,
            "canteen": canteen,
            "canteens": canteen_options(canteen),
            "items": items,
        }),
    )
}

pub async fn serve_history_page(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Html<String>, AppError> {
    let orders = state.db.orders_for_user(&principal.username)?;
    let orders: Vec<_> = orders
        .into_iter()
        .map(|order| {
            json!({
                "token": order.token,
                "item_name": order.item_name,
                "cost": order.cost,
                "canteen": order.canteen,
                "timestamp": order.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            })
        })
        .collect();

    state.pages.render(
        "history",
        &json!({ "username": principal.username, "orders": orders }),
    )
}

/// Admin view of one canteen's orders
pub async fn list_canteen_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CanteenQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    let canteen = query.canteen()?;
    Ok(Json(state.db.orders_for_canteen(canteen)?))
}

pub async fn handle_delete_order(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let order = state.db.delete_order(&id)?;
    info!(admin = %principal.username, token = %order.token, canteen = %order.canteen, "Order deleted");
    Ok(StatusCode::NO_CONTENT)
}
