use serde::{Deserialize, Serialize};

use crate::{Id, Money};

/// A catalog product as the checkout pipeline sees it.
///
/// The full catalog entity (description, images, categories) belongs to the
/// catalog collaborator; checkout only needs the price/name snapshot source
/// and the mutable stock counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: Id,
    pub name: String,
    pub price: Money,
    pub stock: i64,
}

impl Product {
    pub fn new(id: Id, name: impl Into<String>, price: Money, stock: i64) -> Self {
        Self {
            id,
            name: name.into(),
            price,
            stock,
        }
    }
}
