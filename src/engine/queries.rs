use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::available_cars;
use super::conflict::validate_range;
use super::{admin_key, Engine, EngineError, SharedCarState};

impl Engine {
    /// Snapshot of every car lock, ordered by id (= creation order).
    fn sorted_car_states(&self) -> Vec<SharedCarState> {
        let mut states: Vec<(Ulid, SharedCarState)> = self
            .cars
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        states.sort_by_key(|(id, _)| *id);
        states.into_iter().map(|(_, rs)| rs).collect()
    }

    #[cfg(test)]
    pub(crate) fn car_count(&self) -> usize {
        self.cars.len()
    }

    pub async fn list_cars(&self) -> Vec<Car> {
        let mut cars = Vec::with_capacity(self.cars.len());
        for rs in self.sorted_car_states() {
            cars.push(rs.read().await.car.clone());
        }
        cars
    }

    pub async fn get_car(&self, id: Ulid) -> Result<Car, EngineError> {
        let rs = self.get_car_state(&id).ok_or(EngineError::CarNotFound(id))?;
        let guard = rs.read().await;
        Ok(guard.car.clone())
    }

    /// Cars flagged available with no pending/confirmed reservation touching
    /// `[start, end]`. All car read locks are held together so the answer is
    /// a single consistent snapshot.
    pub async fn available_cars(&self, start: Ms, end: Ms) -> Result<Vec<Car>, EngineError> {
        let query = validate_range(start, end, MAX_QUERY_WINDOW_MS)?;

        let mut guards = Vec::with_capacity(self.cars.len());
        for rs in self.sorted_car_states() {
            guards.push(rs.read_owned().await);
        }
        let fleet: Vec<&CarState> = guards.iter().map(|g| &**g).collect();
        Ok(available_cars(&fleet, &query))
    }

    /// Every reservation, including those of deleted cars, oldest first.
    pub async fn list_reservations(&self) -> Vec<Reservation> {
        let mut all = Vec::new();
        for rs in self.sorted_car_states() {
            all.extend(rs.read().await.reservations.iter().cloned());
        }
        // Cars first: a car deleted meanwhile has moved its history here.
        all.extend(self.detached.iter().map(|e| e.value().clone()));
        all.sort_by_key(|r| r.id);
        all.dedup_by_key(|r| r.id);
        all
    }

    pub async fn reservations_for_car(&self, car_id: Ulid) -> Result<Vec<Reservation>, EngineError> {
        let rs = self
            .get_car_state(&car_id)
            .ok_or(EngineError::CarNotFound(car_id))?;
        let guard = rs.read().await;
        Ok(guard.reservations.clone())
    }

    pub async fn get_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        if let Some(car_id) = self.get_car_for_reservation(&id)
            && let Some(rs) = self.get_car_state(&car_id)
        {
            let guard = rs.read().await;
            if let Some(r) = guard.reservations.iter().find(|r| r.id == id) {
                return Ok(r.clone());
            }
        }
        self.detached
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::ReservationNotFound(id))
    }

    pub fn find_admin(&self, email: &str) -> Option<Admin> {
        self.admins.get(&admin_key(email)).map(|e| e.value().clone())
    }

    pub fn admin_count(&self) -> usize {
        self.admins.len()
    }
}
