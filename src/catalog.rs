use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Html,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

use crate::app::AppState;
use crate::error::AppError;
use crate::models::{Canteen, Item, Principal};

pub const MAX_ITEM_NAME_LEN: usize = 100;

/// `?canteen=` on page routes; missing means the default canteen
#[derive(Debug, Default, Deserialize)]
pub struct CanteenQuery {
    pub canteen: Option<String>,
}

impl CanteenQuery {
    pub fn canteen(&self) -> Result<Canteen, AppError> {
        let canteen = self.canteen.as_deref().map(str::parse::<Canteen>).transpose()?;
        Ok(canteen.unwrap_or_default())
    }
}

/// Admin item form: name and cost, the sold counter is not editable
#[derive(Debug, Deserialize)]
pub struct ItemForm {
    pub name: String,
    pub cost: u32,
}

impl ItemForm {
    fn validated_name(&self) -> Result<&str, AppError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("item name cannot be empty".to_string()));
        }
        if name.chars().count() > MAX_ITEM_NAME_LEN {
            return Err(AppError::Validation(format!(
                "item name must be at most {MAX_ITEM_NAME_LEN} characters"
            )));
        }
        Ok(name)
    }
}

/// Dropdown entries for the canteen selector
pub fn canteen_options(selected: Canteen) -> Vec<Value> {
    Canteen::ALL
        .into_iter()
        .map(|canteen| json!({ "label": canteen.label(), "selected": canteen == selected }))
        .collect()
}

pub async fn serve_home(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CanteenQuery>,
) -> Result<Html<String>, AppError> {
    let canteen = query.canteen()?;
    let items = state.db.list_items(canteen)?;

    state.pages.render(
        "home",
        &json!({
            "canteen": canteen,
            "canteens": canteen_options(canteen),
            "items": items,
        }),
    )
}

pub async fn list_canteens() -> Json<Vec<&'static str>> {
    Json(Canteen::ALL.into_iter().map(Canteen::label).collect())
}

pub async fn list_items(
    State(state): State<Arc<AppState>>,
    Path(canteen): Path<String>,
) -> Result<Json<Vec<Item>>, AppError> {
    let canteen: Canteen = canteen.parse()?;
    Ok(Json(state.db.list_items(canteen)?))
}

pub async fn serve_admin_page(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<CanteenQuery>,
) -> Result<Html<String>, AppError> {
    let canteen = query.canteen()?;
    let items = state.db.list_items(canteen)?;
    let orders = state.db.orders_for_canteen(canteen)?;

    state.pages.render(
        "admin",
        &json!({
            "username": principal.username,
            "canteen": canteen,
            "canteens": canteen_options(canteen),
            "items": items,
            "orders": orders,
        }),
    )
}

pub async fn handle_create_item(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(canteen): Path<String>,
    Json(form): Json<ItemForm>,
) -> Result<(StatusCode, Json<Item>), AppError> {
    let canteen: Canteen = canteen.parse()?;
    let item = state.db.create_item(canteen, form.validated_name()?, form.cost)?;

    info!(admin = %principal.username, %canteen, item = %item.name, cost = item.cost, "Item created");
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn handle_update_item(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path((canteen, id)): Path<(String, String)>,
    Json(form): Json<ItemForm>,
) -> Result<Json<Item>, AppError> {
    let canteen: Canteen = canteen.parse()?;
    let item = state
        .db
        .update_item(canteen, &id, form.validated_name()?, form.cost)?;

    info!(admin = %principal.username, %canteen, item = %item.name, cost = item.cost, "Item updated");
    Ok(Json(item))
}

pub async fn handle_delete_item(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path((canteen, id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let canteen: Canteen = canteen.parse()?;
    let item = state.db.delete_item(canteen, &id)?;

    info!(admin = %principal.username, %canteen, item = %item.name, "Item deleted");
    Ok(StatusCode::NO_CONTENT)
}
