use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::dates::format_rfc3339;
use crate::engine::EngineError;
use crate::model::{Car, CarPatch, NewCar};

use super::auth::AdminClaims;
use super::{parse_date, parse_id, required, ApiError, ApiResult, AppState};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_cars).post(create_car))
        .route("/available", get(available_cars))
        .route("/:id", get(get_car).put(update_car).delete(delete_car))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CarResponse {
    id: String,
    name: String,
    model: String,
    price: f64,
    available: bool,
    image_url: String,
    description: String,
    created_at: String,
    updated_at: String,
}

impl From<Car> for CarResponse {
    fn from(car: Car) -> Self {
        Self {
            id: car.id.to_string(),
            name: car.name,
            model: car.model,
            price: car.daily_price,
            available: car.available,
            image_url: car.image_url,
            description: car.description,
            created_at: format_rfc3339(car.created_at),
            updated_at: format_rfc3339(car.updated_at),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CarBody {
    name: Option<String>,
    model: Option<String>,
    price: Option<f64>,
    available: Option<bool>,
    image_url: Option<String>,
    description: Option<String>,
}

/// Empty strings count as absent, so `imageUrl: ""` falls back to the placeholder.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[derive(Debug, Deserialize)]
pub(super) struct AvailabilityParams {
    start: Option<String>,
    end: Option<String>,
}

async fn list_cars(State(state): State<AppState>) -> Json<Vec<CarResponse>> {
    let cars = state.engine.list_cars().await;
    Json(cars.into_iter().map(CarResponse::from).collect())
}

async fn available_cars(
    State(state): State<AppState>,
    params: Result<Query<AvailabilityParams>, QueryRejection>,
) -> ApiResult<Json<Vec<CarResponse>>> {
    let Query(params) = params?;
    let (Some(start), Some(end)) = (params.start, params.end) else {
        return Err(ApiError(EngineError::validation("Please provide start and end dates")));
    };
    let cars = state
        .engine
        .available_cars(parse_date(&start)?, parse_date(&end)?)
        .await?;
    Ok(Json(cars.into_iter().map(CarResponse::from).collect()))
}

async fn get_car(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<CarResponse>> {
    let car = state.engine.get_car(parse_id(&id)?).await?;
    Ok(Json(car.into()))
}

async fn create_car(
    State(state): State<AppState>,
    _admin: AdminClaims,
    body: Result<Json<CarBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CarResponse>)> {
    let Json(body) = body?;
    let input = NewCar {
        name: required(non_empty(body.name))?,
        model: required(non_empty(body.model))?,
        daily_price: required(body.price)?,
        available: body.available,
        image_url: non_empty(body.image_url),
        description: required(non_empty(body.description))?,
    };
    let car = state.engine.create_car(input).await?;
    Ok((StatusCode::CREATED, Json(car.into())))
}

async fn update_car(
    State(state): State<AppState>,
    _admin: AdminClaims,
    Path(id): Path<String>,
    body: Result<Json<CarBody>, JsonRejection>,
) -> ApiResult<Json<CarResponse>> {
    let id = parse_id(&id)?;
    let Json(body) = body?;
    let patch = CarPatch {
        name: body.name,
        model: body.model,
        daily_price: body.price,
        available: body.available,
        image_url: body.image_url,
        description: body.description,
    };
    let car = state.engine.update_car(id, patch).await?;
    Ok(Json(car.into()))
}

async fn delete_car(
    State(state): State<AppState>,
    _admin: AdminClaims,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let id = parse_id(&id)?;
    state.engine.delete_car(id).await?;
    Ok(Json(serde_json::json!({ "id": id.to_string() })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures;

    #[test]
    fn car_json_shape() {
        let mut car = fixtures::car("Golf", 49.5);
        car.created_at = 1_704_412_800_000;
        let json = serde_json::to_value(CarResponse::from(car.clone())).unwrap();

        assert_eq!(json["id"], car.id.to_string());
        assert_eq!(json["price"], 49.5);
        assert_eq!(json["imageUrl"], car.image_url);
        assert_eq!(json["createdAt"], "2024-01-05T00:00:00.000Z");
        assert!(json.get("dailyPrice").is_none());
    }

    #[test]
    fn blank_strings_are_absent() {
        assert_eq!(non_empty(Some("  ".into())), None);
        assert_eq!(non_empty(Some("x".into())), Some("x".into()));
        assert_eq!(non_empty(None), None);
    }
}
