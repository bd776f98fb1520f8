use std::collections::HashMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::dates::format_rfc3339;
use crate::engine::EngineError;
use crate::model::{Car, DateRange, NewReservation, Reservation, ReservationStatus};

use super::auth::AdminClaims;
use super::{parse_date, parse_id, required, ApiError, ApiResult, AppState};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_reservations).post(create_reservation))
        .route("/:id", get(get_reservation).put(update_status))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CarSummary {
    id: String,
    name: String,
    model: String,
    image_url: String,
}

impl From<&Car> for CarSummary {
    fn from(car: &Car) -> Self {
        Self {
            id: car.id.to_string(),
            name: car.name.clone(),
            model: car.model.clone(),
            image_url: car.image_url.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ReservationResponse {
    id: String,
    customer_name: String,
    customer_email: String,
    car_id: String,
    start_date: String,
    end_date: String,
    total_price: f64,
    status: ReservationStatus,
    created_at: String,
    updated_at: String,
    /// Absent once the car has been deleted.
    #[serde(skip_serializing_if = "Option::is_none")]
    car: Option<CarSummary>,
}

impl ReservationResponse {
    fn new(r: Reservation, car: Option<&Car>) -> Self {
        Self {
            id: r.id.to_string(),
            customer_name: r.customer_name,
            customer_email: r.customer_email,
            car_id: r.car_id.to_string(),
            start_date: format_rfc3339(r.range.start),
            end_date: format_rfc3339(r.range.end),
            total_price: r.total_price,
            status: r.status,
            created_at: format_rfc3339(r.created_at),
            updated_at: format_rfc3339(r.updated_at),
            car: car.map(CarSummary::from),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ReservationBody {
    customer_name: Option<String>,
    customer_email: Option<String>,
    car_id: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StatusBody {
    status: Option<String>,
}

async fn create_reservation(
    State(state): State<AppState>,
    body: Result<Json<ReservationBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ReservationResponse>)> {
    let Json(body) = body?;
    let customer_name = required(body.customer_name)?;
    let customer_email = required(body.customer_email)?;
    let car_id = required(body.car_id)?;
    let start = required(body.start_date)?;
    let end = required(body.end_date)?;

    let input = NewReservation {
        customer_name,
        customer_email,
        car_id: parse_id(&car_id)?,
        range: DateRange::new(parse_date(&start)?, parse_date(&end)?),
    };
    let reservation = state.engine.create_reservation(input).await?;
    Ok((StatusCode::CREATED, Json(ReservationResponse::new(reservation, None))))
}

async fn list_reservations(
    State(state): State<AppState>,
    _admin: AdminClaims,
) -> Json<Vec<ReservationResponse>> {
    let cars: HashMap<Ulid, Car> = state
        .engine
        .list_cars()
        .await
        .into_iter()
        .map(|c| (c.id, c))
        .collect();
    let reservations = state.engine.list_reservations().await;
    Json(
        reservations
            .into_iter()
            .map(|r| {
                let car = cars.get(&r.car_id);
                ReservationResponse::new(r, car)
            })
            .collect(),
    )
}

async fn get_reservation(
    State(state): State<AppState>,
    _admin: AdminClaims,
    Path(id): Path<String>,
) -> ApiResult<Json<ReservationResponse>> {
    let reservation = state.engine.get_reservation(parse_id(&id)?).await?;
    let car = state.engine.get_car(reservation.car_id).await.ok();
    Ok(Json(ReservationResponse::new(reservation, car.as_ref())))
}

async fn update_status(
    State(state): State<AppState>,
    _admin: AdminClaims,
    Path(id): Path<String>,
    body: Result<Json<StatusBody>, JsonRejection>,
) -> ApiResult<Json<ReservationResponse>> {
    let id = parse_id(&id)?;
    let Json(body) = body?;
    let status = body
        .status
        .as_deref()
        .and_then(ReservationStatus::parse)
        .ok_or_else(|| ApiError(EngineError::validation("Please provide a valid status")))?;

    let reservation = state.engine.update_reservation_status(id, status).await?;
    let car = state.engine.get_car(reservation.car_id).await.ok();
    Ok(Json(ReservationResponse::new(reservation, car.as_ref())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures;

    #[test]
    fn reservation_json_shape() {
        let car = fixtures::car("Golf", 50.0);
        let r = fixtures::reservation(car.id, 1_704_067_200_000, 1_704_240_000_000, ReservationStatus::Pending);

        let json = serde_json::to_value(ReservationResponse::new(r.clone(), Some(&car))).unwrap();
        assert_eq!(json["customerName"], "Ada");
        assert_eq!(json["carId"], car.id.to_string());
        assert_eq!(json["startDate"], "2024-01-01T00:00:00.000Z");
        assert_eq!(json["endDate"], "2024-01-03T00:00:00.000Z");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["car"]["name"], "Golf");
        assert_eq!(json["car"]["imageUrl"], car.image_url);

        let detached = serde_json::to_value(ReservationResponse::new(r, None)).unwrap();
        assert!(detached.get("car").is_none());
    }
}
