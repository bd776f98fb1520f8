use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

pub const DEFAULT_IMAGE_URL: &str = "https://via.placeholder.com/350x150";

/// True iff the closed intervals `[start_a, end_a]` and `[start_b, end_b]` share
/// at least one instant. Both intervals must already satisfy `start <= end`.
pub fn overlaps(start_a: Ms, end_a: Ms, start_b: Ms, end_b: Ms) -> bool {
    start_a <= end_b && end_a >= start_b
}

/// Closed interval `[start, end]` of a rental.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Ms,
    pub end: Ms,
}

impl DateRange {
    /// Unchecked; the engine validates ranges before using them.
    pub fn new(start: Ms, end: Ms) -> Self {
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl ReservationStatus {
    /// Pending and confirmed reservations hold the car; the rest are history.
    pub fn is_active(self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Completed => "completed",
            ReservationStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReservationStatus::Pending),
            "confirmed" => Some(ReservationStatus::Confirmed),
            "completed" => Some(ReservationStatus::Completed),
            "cancelled" => Some(ReservationStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Car {
    pub id: Ulid,
    pub name: String,
    pub model: String,
    pub daily_price: f64,
    pub available: bool,
    pub image_url: String,
    pub description: String,
    pub created_at: Ms,
    pub updated_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub customer_name: String,
    pub customer_email: String,
    pub car_id: Ulid,
    pub range: DateRange,
    pub total_price: f64,
    pub status: ReservationStatus,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admin {
    pub id: Ulid,
    pub name: String,
    pub email: String,
    /// PHC-formatted argon2 hash.
    pub password_hash: String,
    pub created_at: Ms,
}

/// A car plus every reservation that references it.
#[derive(Debug, Clone)]
pub struct CarState {
    pub car: Car,
    /// Sorted by `range.start`.
    pub reservations: Vec<Reservation>,
}

impl CarState {
    pub fn new(car: Car) -> Self {
        Self {
            car,
            reservations: Vec::new(),
        }
    }

    /// Insert reservation maintaining sort order by range.start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.range.start <= reservation.range.start);
        self.reservations.insert(pos, reservation);
    }

    pub fn reservation_mut(&mut self, id: Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Reservations (any status) whose closed range intersects `query`.
    /// Binary search skips everything starting after `query.end`.
    pub fn overlapping(&self, query: &DateRange) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.range.start <= query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.range.end >= query.start)
    }

    pub fn has_active_reservations(&self) -> bool {
        self.reservations.iter().any(Reservation::is_active)
    }
}

// ── Inputs ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct NewCar {
    pub name: String,
    pub model: String,
    pub daily_price: f64,
    pub available: Option<bool>,
    pub image_url: Option<String>,
    pub description: String,
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CarPatch {
    pub name: Option<String>,
    pub model: Option<String>,
    pub daily_price: Option<f64>,
    pub available: Option<bool>,
    pub image_url: Option<String>,
    pub description: Option<String>,
}

impl CarPatch {
    pub fn apply(&self, car: &Car, now: Ms) -> Car {
        Car {
            id: car.id,
            name: self.name.clone().unwrap_or_else(|| car.name.clone()),
            model: self.model.clone().unwrap_or_else(|| car.model.clone()),
            daily_price: self.daily_price.unwrap_or(car.daily_price),
            available: self.available.unwrap_or(car.available),
            image_url: self.image_url.clone().unwrap_or_else(|| car.image_url.clone()),
            description: self
                .description
                .clone()
                .unwrap_or_else(|| car.description.clone()),
            created_at: car.created_at,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReservation {
    pub customer_name: String,
    pub customer_email: String,
    pub car_id: Ulid,
    pub range: DateRange,
}

/// The event types. This is the WAL record format; records are embedded whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    CarCreated {
        car: Car,
    },
    CarUpdated {
        car: Car,
    },
    CarDeleted {
        id: Ulid,
    },
    ReservationCreated {
        reservation: Reservation,
    },
    ReservationStatusChanged {
        id: Ulid,
        car_id: Ulid,
        status: ReservationStatus,
        at: Ms,
    },
    AdminRegistered {
        admin: Admin,
    },
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn overlap_is_symmetric() {
        let cases = [
            ((0, 10), (5, 15)),
            ((0, 10), (10, 20)),
            ((0, 10), (11, 20)),
            ((5, 6), (0, 100)),
            ((3, 3), (3, 3)),
        ];
        for ((a0, a1), (b0, b1)) in cases {
            assert_eq!(overlaps(a0, a1, b0, b1), overlaps(b0, b1, a0, a1));
        }
    }

    #[test]
    fn overlap_with_self() {
        let a = DateRange::new(100, 200);
        assert!(a.overlaps(&a));
        let instant = DateRange::new(7, 7);
        assert!(instant.overlaps(&instant));
    }

    #[test]
    fn disjoint_ranges_do_not_overlap() {
        let a = DateRange::new(100, 200);
        let b = DateRange::new(201, 300);
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn shared_endpoint_overlaps() {
        // Closed intervals: touching at one instant counts.
        let a = DateRange::new(100, 200);
        let b = DateRange::new(200, 300);
        assert!(a.overlaps(&b));
    }

    #[test]
    fn containment_overlaps() {
        let outer = DateRange::new(0, 1000);
        let inner = DateRange::new(400, 500);
        assert!(outer.overlaps(&inner));
        assert!(inner.overlaps(&outer));
    }

    #[test]
    fn status_activity() {
        assert!(ReservationStatus::Pending.is_active());
        assert!(ReservationStatus::Confirmed.is_active());
        assert!(!ReservationStatus::Completed.is_active());
        assert!(!ReservationStatus::Cancelled.is_active());
    }

    #[test]
    fn status_parse() {
        for s in [
            ReservationStatus::Pending,
            ReservationStatus::Confirmed,
            ReservationStatus::Completed,
            ReservationStatus::Cancelled,
        ] {
            assert_eq!(ReservationStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(ReservationStatus::parse("Pending"), None);
        assert_eq!(ReservationStatus::parse(""), None);
    }

    #[test]
    fn reservations_kept_sorted() {
        let c = car("Golf", 40.0);
        let mut cs = CarState::new(c.clone());
        cs.insert_reservation(reservation(c.id, 300, 400, ReservationStatus::Pending));
        cs.insert_reservation(reservation(c.id, 100, 200, ReservationStatus::Pending));
        cs.insert_reservation(reservation(c.id, 200, 250, ReservationStatus::Cancelled));
        let starts: Vec<Ms> = cs.reservations.iter().map(|r| r.range.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let c = car("Golf", 40.0);
        let mut cs = CarState::new(c.clone());
        cs.insert_reservation(reservation(c.id, 100, 200, ReservationStatus::Pending));
        cs.insert_reservation(reservation(c.id, 450, 600, ReservationStatus::Pending));
        cs.insert_reservation(reservation(c.id, 1000, 1100, ReservationStatus::Pending));

        let query = DateRange::new(500, 800);
        let hits: Vec<_> = cs.overlapping(&query).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].range, DateRange::new(450, 600));
    }

    #[test]
    fn overlapping_includes_touching_endpoints() {
        let c = car("Golf", 40.0);
        let mut cs = CarState::new(c.clone());
        cs.insert_reservation(reservation(c.id, 100, 200, ReservationStatus::Pending));
        cs.insert_reservation(reservation(c.id, 800, 900, ReservationStatus::Pending));
        let query = DateRange::new(200, 800);
        assert_eq!(cs.overlapping(&query).count(), 2);
    }

    #[test]
    fn overlapping_large_reservation_spanning_query() {
        let c = car("Golf", 40.0);
        let mut cs = CarState::new(c.clone());
        cs.insert_reservation(reservation(c.id, 0, 10_000, ReservationStatus::Confirmed));
        let query = DateRange::new(500, 600);
        assert_eq!(cs.overlapping(&query).count(), 1);
    }

    #[test]
    fn active_reservation_detection() {
        let c = car("Golf", 40.0);
        let mut cs = CarState::new(c.clone());
        assert!(!cs.has_active_reservations());
        cs.insert_reservation(reservation(c.id, 0, 10, ReservationStatus::Cancelled));
        cs.insert_reservation(reservation(c.id, 20, 30, ReservationStatus::Completed));
        assert!(!cs.has_active_reservations());
        cs.insert_reservation(reservation(c.id, 40, 50, ReservationStatus::Confirmed));
        assert!(cs.has_active_reservations());
    }

    #[test]
    fn patch_keeps_untouched_fields() {
        let c = car("Golf", 40.0);
        let patch = CarPatch {
            daily_price: Some(55.0),
            available: Some(false),
            ..CarPatch::default()
        };
        let updated = patch.apply(&c, 99);
        assert_eq!(updated.name, c.name);
        assert_eq!(updated.daily_price, 55.0);
        assert!(!updated.available);
        assert_eq!(updated.created_at, c.created_at);
        assert_eq!(updated.updated_at, 99);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ReservationCreated {
            reservation: reservation(Ulid::new(), 0, 1000, ReservationStatus::Pending),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
