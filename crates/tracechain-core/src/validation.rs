//! Input validation: structural checks run before anything is hashed.

use crate::batch::ProductDescriptor;
use crate::error::ValidationError;
use crate::event::{EventPayload, MAX_ATTACHMENTS};

/// Validate a product descriptor and the quantity it is registered with.
///
/// This performs:
/// - Non-empty name and unit
/// - Finite, positive quantity
/// - Finite coordinates when an origin is given
pub fn validate_product(product: &ProductDescriptor, quantity: f64) -> Result<(), ValidationError> {
    if product.name.trim().is_empty() {
        return Err(ValidationError::MissingField("product.name"));
    }
    if product.unit.trim().is_empty() {
        return Err(ValidationError::MissingField("product.unit"));
    }
    validate_quantity(quantity)?;

    if let Some(coords) = product.origin.as_ref().and_then(|o| o.coordinates) {
        check_finite("origin.coordinates.lat", Some(coords.lat))?;
        check_finite("origin.coordinates.lng", Some(coords.lng))?;
    }

    Ok(())
}

/// Quantities must be finite and strictly positive.
pub fn validate_quantity(quantity: f64) -> Result<(), ValidationError> {
    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(ValidationError::InvalidQuantity(quantity));
    }
    Ok(())
}

/// Validate an event payload and the number of attachments going with it.
pub fn validate_event_payload(
    payload: &EventPayload,
    attachment_count: usize,
) -> Result<(), ValidationError> {
    if payload.actor.trim().is_empty() {
        return Err(ValidationError::MissingField("actor"));
    }
    check_finite("temperature", payload.temperature)?;
    check_finite("humidity", payload.humidity)?;

    if attachment_count > MAX_ATTACHMENTS {
        return Err(ValidationError::TooManyAttachments {
            count: attachment_count,
            max: MAX_ATTACHMENTS,
        });
    }

    Ok(())
}

/// Validate split portions against the parent quantity.
///
/// Every portion must be a valid quantity and together they may not exceed
/// what the parent holds. A remainder is allowed (waste, samples).
pub fn validate_split(parent_quantity: f64, portions: &[f64]) -> Result<(), ValidationError> {
    if portions.is_empty() {
        return Err(ValidationError::InvalidSplit("no portions given".into()));
    }
    for (i, &q) in portions.iter().enumerate() {
        validate_quantity(q)
            .map_err(|_| ValidationError::InvalidSplit(format!("portion {} has quantity {}", i, q)))?;
    }

    let total: f64 = portions.iter().sum();
    if total > parent_quantity {
        return Err(ValidationError::InvalidSplit(format!(
            "portions total {} exceeds parent quantity {}",
            total, parent_quantity
        )));
    }

    Ok(())
}

fn check_finite(field: &'static str, value: Option<f64>) -> Result<(), ValidationError> {
    match value {
        Some(v) if !v.is_finite() => Err(ValidationError::NonFiniteMeasurement { field }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{Coordinates, Origin};
    use crate::event::EventType;

    #[test]
    fn test_product_requires_name_and_unit() {
        let ok = ProductDescriptor::new("Coffee", "kg");
        assert!(validate_product(&ok, 1.0).is_ok());

        let no_name = ProductDescriptor::new("  ", "kg");
        assert!(matches!(
            validate_product(&no_name, 1.0),
            Err(ValidationError::MissingField("product.name"))
        ));

        let no_unit = ProductDescriptor::new("Coffee", "");
        assert!(matches!(
            validate_product(&no_unit, 1.0),
            Err(ValidationError::MissingField("product.unit"))
        ));
    }

    #[test]
    fn test_quantity_must_be_finite_and_positive() {
        let product = ProductDescriptor::new("Coffee", "kg");
        for bad in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                validate_product(&product, bad),
                Err(ValidationError::InvalidQuantity(_))
            ));
        }
    }

    #[test]
    fn test_non_finite_coordinates_rejected() {
        let product = ProductDescriptor::new("Coffee", "kg").origin(Origin {
            farm: "Finca Alta".into(),
            location: "Huila".into(),
            coordinates: Some(Coordinates {
                lat: f64::NAN,
                lng: -75.5,
            }),
        });
        assert!(matches!(
            validate_product(&product, 1.0),
            Err(ValidationError::NonFiniteMeasurement { .. })
        ));
    }

    #[test]
    fn test_event_payload_rules() {
        let ok = EventPayload::new(EventType::Stored, "Cold Store 3").temperature(2.0);
        assert!(validate_event_payload(&ok, 0).is_ok());

        let anonymous = EventPayload::new(EventType::Stored, "");
        assert!(matches!(
            validate_event_payload(&anonymous, 0),
            Err(ValidationError::MissingField("actor"))
        ));

        let nan = EventPayload::new(EventType::Stored, "x").humidity(f64::NAN);
        assert!(matches!(
            validate_event_payload(&nan, 0),
            Err(ValidationError::NonFiniteMeasurement { field: "humidity" })
        ));

        assert!(matches!(
            validate_event_payload(&ok, MAX_ATTACHMENTS + 1),
            Err(ValidationError::TooManyAttachments { .. })
        ));
        assert!(validate_event_payload(&ok, MAX_ATTACHMENTS).is_ok());
    }

    #[test]
    fn test_split_portions() {
        assert!(validate_split(100.0, &[40.0, 60.0]).is_ok());
        assert!(validate_split(100.0, &[40.0, 50.0]).is_ok());
        assert!(validate_split(100.0, &[]).is_err());
        assert!(validate_split(100.0, &[60.0, 60.0]).is_err());
        assert!(validate_split(100.0, &[0.0, 10.0]).is_err());
    }
}
