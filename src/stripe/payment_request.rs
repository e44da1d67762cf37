// Client-submitted payment request and its field-level validation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::{Validate, ValidationError, ValidationErrors};

/// Body of `POST /Payment/CreatePaymentIntent`. Fields are optional so a
/// missing field is reported next to every other invalid one instead of
/// failing deserialization on its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct PaymentRequest {
    #[serde(rename = "paymentMethodId", default)]
    #[validate(
        required(message = "The paymentMethodId field is required."),
        custom(
            function = "not_blank",
            message = "The paymentMethodId field must not be empty."
        )
    )]
    pub payment_method_id: Option<String>,

    /// Smallest currency unit (cents).
    #[serde(default)]
    #[validate(
        required(message = "The amount field is required."),
        range(min = 1, message = "The amount field must be a positive integer.")
    )]
    pub amount: Option<i64>,
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidPaymentRequest {
    pub payment_method_id: String,
    pub amount: i64,
}

/// Every invalid field, keyed by its JSON name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldErrors {
    pub errors: BTreeMap<String, Vec<String>>,
}

impl PaymentRequest {
    pub fn into_valid(self) -> Result<ValidPaymentRequest, FieldErrors> {
        self.validate().map_err(FieldErrors::from)?;
        match (self.payment_method_id, self.amount) {
            (Some(payment_method_id), Some(amount)) => Ok(ValidPaymentRequest {
                payment_method_id,
                amount,
            }),
            // `required` already rejected both of these
            (pm, amount) => Err(FieldErrors::missing(pm.is_none(), amount.is_none())),
        }
    }
}

impl FieldErrors {
    fn missing(payment_method_id: bool, amount: bool) -> Self {
        let mut errors = BTreeMap::new();
        if payment_method_id {
            errors.insert(
                "paymentMethodId".to_string(),
                vec!["The paymentMethodId field is required.".to_string()],
            );
        }
        if amount {
            errors.insert(
                "amount".to_string(),
                vec!["The amount field is required.".to_string()],
            );
        }
        Self { errors }
    }

    /// Body-level error for a request that is not JSON at all.
    pub fn unreadable_body(message: String) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert("$".to_string(), vec![message]);
        Self { errors }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }
}

impl From<ValidationErrors> for FieldErrors {
    fn from(errs: ValidationErrors) -> Self {
        let errors = errs
            .field_errors()
            .into_iter()
            .map(|(field, list)| {
                let messages = list
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                    })
                    .collect();
                (json_field_name(&field), messages)
            })
            .collect();
        Self { errors }
    }
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

fn json_field_name(field: &str) -> String {
    match field {
        "payment_method_id" => "paymentMethodId".to_string(),
        other => other.to_string(),
    }
}
