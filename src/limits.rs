use crate::model::Ms;

pub const DAY_MS: Ms = 86_400_000;

pub const MAX_NAME_LEN: usize = 128;
pub const MAX_DESCRIPTION_LEN: usize = 4096;
pub const MAX_IMAGE_URL_LEN: usize = 2048;
pub const MAX_CUSTOMER_FIELD_LEN: usize = 256;
pub const MAX_PASSWORD_LEN: usize = 1024;

/// Keeps `days * price` well inside f64's exact range.
pub const MAX_DAILY_PRICE: f64 = 1_000_000.0;

pub const MAX_CARS: usize = 10_000;
pub const MAX_RESERVATIONS_PER_CAR: usize = 100_000;

/// 1970-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 9999-12-31T23:59:59.999Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;

pub const MAX_RENTAL_MS: Ms = 366 * DAY_MS;
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * DAY_MS;
