use serde::{Deserialize, Serialize};

use crate::Id;

/// A persisted shipping address attached to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: Id,
    pub street: String,
    pub locality: String,
    pub region: String,
}

/// Address validation errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address field '{0}' must not be empty")]
    MissingField(&'static str),
}

/// An address submission from the checkout form, pre-validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressForm {
    pub street: String,
    pub locality: String,
    pub region: String,
}

impl AddressForm {
    /// Validate and normalize: every field must be non-empty after trimming.
    /// Returns the trimmed form.
    pub fn validate(&self) -> Result<AddressForm, AddressError> {
        let street = self.street.trim();
        let locality = self.locality.trim();
        let region = self.region.trim();

        if street.is_empty() {
            return Err(AddressError::MissingField("street"));
        }
        if locality.is_empty() {
            return Err(AddressError::MissingField("locality"));
        }
        if region.is_empty() {
            return Err(AddressError::MissingField("region"));
        }

        Ok(AddressForm {
            street: street.to_string(),
            locality: locality.to_string(),
            region: region.to_string(),
        })
    }

    /// True when the shopper left the whole form blank, as opposed to
    /// submitting a partially filled one.
    pub fn is_blank(&self) -> bool {
        self.street.trim().is_empty()
            && self.locality.trim().is_empty()
            && self.region.trim().is_empty()
    }
}
