use std::collections::HashSet;

use ulid::Ulid;

use crate::model::*;

// ── Availability filter ──────────────────────────────────────────

/// Ids of every car holding an active reservation that intersects `query`.
pub fn reserved_car_ids<'a>(
    fleet: impl IntoIterator<Item = &'a CarState>,
    query: &DateRange,
) -> HashSet<Ulid> {
    let mut reserved = HashSet::new();
    for cs in fleet {
        if cs.overlapping(query).any(Reservation::is_active) {
            reserved.insert(cs.car.id);
        }
    }
    reserved
}

/// Cars flagged available with no active reservation intersecting `query`,
/// in fleet order.
pub fn available_cars<'a>(fleet: &[&'a CarState], query: &DateRange) -> Vec<Car> {
    let reserved = reserved_car_ids(fleet.iter().copied(), query);
    fleet
        .iter()
        .filter(|cs| cs.car.available && !reserved.contains(&cs.car.id))
        .map(|cs| cs.car.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::parse_instant;
    use crate::model::fixtures::{car, reservation};

    fn day(s: &str) -> Ms {
        parse_instant(s).unwrap()
    }

    fn state(name: &str) -> CarState {
        CarState::new(car(name, 30.0))
    }

    fn book(cs: &mut CarState, start: &str, end: &str, status: ReservationStatus) {
        let r = reservation(cs.car.id, day(start), day(end), status);
        cs.insert_reservation(r);
    }

    fn feb_window() -> DateRange {
        DateRange::new(day("2024-02-01"), day("2024-02-05"))
    }

    #[test]
    fn excludes_car_with_overlapping_reservation() {
        let a = state("A");
        let mut x = state("X");
        let c = state("C");
        book(&mut x, "2024-02-03", "2024-02-08", ReservationStatus::Pending);

        let fleet = [&a, &x, &c];
        let free = available_cars(&fleet, &feb_window());
        let ids: Vec<Ulid> = free.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![a.car.id, c.car.id]);
    }

    #[test]
    fn excludes_unavailable_cars() {
        let a = state("A");
        let mut b = state("B");
        b.car.available = false;

        let fleet = [&a, &b];
        let free = available_cars(&fleet, &feb_window());
        assert_eq!(free.len(), 1);
        assert_eq!(free[0].id, a.car.id);
    }

    #[test]
    fn inactive_reservations_do_not_block() {
        let mut a = state("A");
        book(&mut a, "2024-02-01", "2024-02-05", ReservationStatus::Cancelled);
        book(&mut a, "2024-02-02", "2024-02-03", ReservationStatus::Completed);

        let fleet = [&a];
        assert_eq!(available_cars(&fleet, &feb_window()).len(), 1);
    }

    #[test]
    fn reservation_covering_whole_window_blocks() {
        let mut a = state("A");
        book(&mut a, "2024-01-20", "2024-03-01", ReservationStatus::Confirmed);

        let fleet = [&a];
        assert!(available_cars(&fleet, &feb_window()).is_empty());
    }

    #[test]
    fn reservation_touching_window_edge_blocks() {
        let mut a = state("A");
        let mut b = state("B");
        book(&mut a, "2024-01-25", "2024-02-01", ReservationStatus::Pending);
        book(&mut b, "2024-02-05", "2024-02-09", ReservationStatus::Pending);

        let fleet = [&a, &b];
        let reserved = reserved_car_ids(fleet.iter().copied(), &feb_window());
        assert!(reserved.contains(&a.car.id));
        assert!(reserved.contains(&b.car.id));
    }

    #[test]
    fn reservations_outside_window_ignored() {
        let mut a = state("A");
        book(&mut a, "2024-01-01", "2024-01-31", ReservationStatus::Confirmed);
        book(&mut a, "2024-02-06", "2024-02-10", ReservationStatus::Pending);

        let fleet = [&a];
        assert_eq!(available_cars(&fleet, &feb_window()).len(), 1);
    }

    #[test]
    fn empty_fleet() {
        assert!(available_cars(&[], &feb_window()).is_empty());
    }
}
