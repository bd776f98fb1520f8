use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use tracing::info;
use ulid::Ulid;

use crate::dates::now_ms;
use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{check_no_conflict, validate_range};
use super::lifecycle::check_transition;
use super::pricing::total_price;
use super::{admin_key, validate, Engine, EngineError, WalCommand};

impl Engine {
    pub async fn create_car(&self, input: NewCar) -> Result<Car, EngineError> {
        let input = validate::new_car(input)?;
        let gate = self.enter_gate().await;
        if self.cars.len() >= MAX_CARS {
            return Err(EngineError::LimitExceeded("too many cars"));
        }

        let now = now_ms();
        let car = Car {
            id: Ulid::new(),
            name: input.name,
            model: input.model,
            daily_price: input.daily_price,
            available: input.available.unwrap_or(true),
            image_url: input.image_url.unwrap_or_else(|| DEFAULT_IMAGE_URL.to_string()),
            description: input.description,
            created_at: now,
            updated_at: now,
        };

        let event = Event::CarCreated { car: car.clone() };
        let cars = self.cars.clone();
        let state = CarState::new(car.clone());
        self.commit(event, gate, move |_gate| {
            cars.insert(state.car.id, Arc::new(RwLock::new(state)));
            metrics::gauge!(observability::CARS_TOTAL).set(cars.len() as f64);
        })
        .await?;
        info!("car {} created ({} {})", car.id, car.name, car.model);
        Ok(car)
    }

    pub async fn update_car(&self, id: Ulid, patch: CarPatch) -> Result<Car, EngineError> {
        let patch = validate::car_patch(patch)?;
        let gate = self.enter_gate().await;
        let guard = self.lock_car(id).await?;

        let car = patch.apply(&guard.car, now_ms());
        let event = Event::CarUpdated { car: car.clone() };
        self.persist_and_apply(gate, guard, event).await?;
        info!("car {id} updated");
        Ok(car)
    }

    /// Delete a car. Refused while any pending or confirmed reservation
    /// references it; its inactive reservations are kept as detached history.
    pub async fn delete_car(&self, id: Ulid) -> Result<(), EngineError> {
        let gate = self.enter_gate().await;
        let guard = self.lock_car(id).await?;
        if guard.has_active_reservations() {
            return Err(EngineError::CarHasActiveReservations(id));
        }

        let cars = self.cars.clone();
        let index = self.reservation_to_car.clone();
        let detached = self.detached.clone();
        self.commit(Event::CarDeleted { id }, (gate, guard), move |(_gate, mut guard)| {
            // Into the detached set before leaving the index, so a concurrent
            // lookup always finds the reservation in one of them.
            for r in guard.reservations.drain(..) {
                let rid = r.id;
                detached.insert(rid, r);
                index.remove(&rid);
            }
            // Removed while still holding the lock: anyone queued on it sees
            // the car gone once they get in.
            cars.remove(&id);
            metrics::gauge!(observability::CARS_TOTAL).set(cars.len() as f64);
        })
        .await?;
        info!("car {id} deleted");
        Ok(())
    }

    /// Book a car for `range`. The overlap check, pricing and WAL append all
    /// run under the car's write lock, so of several concurrent overlapping
    /// requests exactly one is accepted.
    pub async fn create_reservation(&self, input: NewReservation) -> Result<Reservation, EngineError> {
        let customer_name = validate::required_text(
            "customerName",
            &input.customer_name,
            MAX_CUSTOMER_FIELD_LEN,
        )?;
        let customer_email = validate::email(&input.customer_email)?;
        let range = validate_range(input.range.start, input.range.end, MAX_RENTAL_MS)?;

        let gate = self.enter_gate().await;
        let guard = self.lock_car(input.car_id).await?;
        if !guard.car.available {
            return Err(EngineError::validation("This car is not available for rent"));
        }
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_CAR {
            return Err(EngineError::LimitExceeded("too many reservations on car"));
        }
        if let Err(e) = check_no_conflict(&guard, &range) {
            metrics::counter!(observability::RESERVATION_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let now = now_ms();
        let reservation = Reservation {
            id: Ulid::new(),
            customer_name,
            customer_email,
            car_id: input.car_id,
            range,
            total_price: total_price(&range, guard.car.daily_price),
            status: ReservationStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        let event = Event::ReservationCreated {
            reservation: reservation.clone(),
        };
        drop(self.persist_and_apply(gate, guard, event).await?);
        metrics::counter!(observability::RESERVATIONS_CREATED_TOTAL).increment(1);
        info!(
            "reservation {} created for car {} ({} days, total {:.2})",
            reservation.id,
            reservation.car_id,
            super::billable_days(&range),
            reservation.total_price
        );
        Ok(reservation)
    }

    pub async fn update_reservation_status(
        &self,
        id: Ulid,
        status: ReservationStatus,
    ) -> Result<Reservation, EngineError> {
        let gate = self.enter_gate().await;
        if let Some(car_id) = self.get_car_for_reservation(&id) {
            match self.lock_car(car_id).await {
                Ok(mut guard) => {
                    let current = guard
                        .reservation_mut(id)
                        .map(|r| r.status)
                        .ok_or(EngineError::ReservationNotFound(id))?;
                    check_transition(current, status)?;

                    let event = Event::ReservationStatusChanged {
                        id,
                        car_id,
                        status,
                        at: now_ms(),
                    };
                    let mut guard = self.persist_and_apply(gate, guard, event).await?;
                    info!("reservation {id}: {current} -> {status}");
                    return guard
                        .reservation_mut(id)
                        .cloned()
                        .ok_or(EngineError::ReservationNotFound(id));
                }
                // Car deleted while we waited: the reservation is now detached.
                Err(EngineError::CarNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        // Detached reservations only exist in terminal states.
        let current = self
            .detached
            .get(&id)
            .map(|r| r.status)
            .ok_or(EngineError::ReservationNotFound(id))?;
        Err(EngineError::InvalidTransition {
            from: current,
            to: status,
        })
    }

    /// Store a new admin. With `require_empty`, only succeeds while no admin
    /// exists yet (first-run bootstrap).
    pub async fn register_admin(
        &self,
        name: &str,
        email: &str,
        password_hash: String,
        require_empty: bool,
    ) -> Result<Admin, EngineError> {
        let name = validate::required_text("name", name, MAX_CUSTOMER_FIELD_LEN)?;
        let email = validate::email(email)?;

        let gate = self.enter_gate().await;
        let serial = self.admin_lock.clone().lock_owned().await;
        if require_empty && !self.admins.is_empty() {
            return Err(EngineError::Unauthorized("admin token required"));
        }
        let key = admin_key(&email);
        if self.admins.contains_key(&key) {
            return Err(EngineError::AdminExists(email));
        }

        let admin = Admin {
            id: Ulid::new(),
            name,
            email,
            password_hash,
            created_at: now_ms(),
        };
        let event = Event::AdminRegistered {
            admin: admin.clone(),
        };
        let admins = self.admins.clone();
        let stored = admin.clone();
        self.commit(event, (gate, serial), move |_held| {
            admins.insert(key, stored);
        })
        .await?;
        info!("admin {} registered", admin.id);
        Ok(admin)
    }

    /// Rewrite the WAL as the minimal event list that recreates current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.write().await;
        let mut events = Vec::new();

        for entry in self.admins.iter() {
            events.push(Event::AdminRegistered {
                admin: entry.value().clone(),
            });
        }

        let mut car_ids: Vec<Ulid> = self.cars.iter().map(|e| *e.key()).collect();
        car_ids.sort();
        for id in car_ids {
            let Some(rs) = self.get_car_state(&id) else {
                continue;
            };
            let guard = rs.read().await;
            events.push(Event::CarCreated {
                car: guard.car.clone(),
            });
            for r in &guard.reservations {
                events.push(Event::ReservationCreated {
                    reservation: r.clone(),
                });
            }
        }

        // Their car is gone, so replay routes them back to the detached set.
        for entry in self.detached.iter() {
            events.push(Event::ReservationCreated {
                reservation: entry.value().clone(),
            });
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        info!("WAL compacted to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
