use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Trimmed, non-empty, bounded text field.
pub(crate) fn required_text(field: &str, value: &str, max_len: usize) -> Result<String, EngineError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::validation(format!("{field} is required")));
    }
    if trimmed.len() > max_len {
        return Err(EngineError::LimitExceeded("field too long"));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn daily_price(value: f64) -> Result<f64, EngineError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(EngineError::validation("price must be a positive number"));
    }
    if value > MAX_DAILY_PRICE {
        return Err(EngineError::LimitExceeded("daily price too high"));
    }
    Ok(value)
}

/// Shallow address check: one `@`, non-empty local part, dotted domain.
pub(crate) fn email(value: &str) -> Result<String, EngineError> {
    let email = required_text("email", value, MAX_CUSTOMER_FIELD_LEN)?;
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && !email.contains(char::is_whitespace)
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
        }
        None => false,
    };
    if !valid {
        return Err(EngineError::validation("Please enter a valid email"));
    }
    Ok(email)
}

pub(crate) fn new_car(input: NewCar) -> Result<NewCar, EngineError> {
    Ok(NewCar {
        name: required_text("name", &input.name, MAX_NAME_LEN)?,
        model: required_text("model", &input.model, MAX_NAME_LEN)?,
        daily_price: daily_price(input.daily_price)?,
        available: input.available,
        image_url: input
            .image_url
            .map(|url| required_text("imageUrl", &url, MAX_IMAGE_URL_LEN))
            .transpose()?,
        description: required_text("description", &input.description, MAX_DESCRIPTION_LEN)?,
    })
}

pub(crate) fn car_patch(patch: CarPatch) -> Result<CarPatch, EngineError> {
    Ok(CarPatch {
        name: patch
            .name
            .map(|v| required_text("name", &v, MAX_NAME_LEN))
            .transpose()?,
        model: patch
            .model
            .map(|v| required_text("model", &v, MAX_NAME_LEN))
            .transpose()?,
        daily_price: patch.daily_price.map(daily_price).transpose()?,
        available: patch.available,
        image_url: patch
            .image_url
            .map(|v| required_text("imageUrl", &v, MAX_IMAGE_URL_LEN))
            .transpose()?,
        description: patch
            .description
            .map(|v| required_text("description", &v, MAX_DESCRIPTION_LEN))
            .transpose()?,
    })
}
