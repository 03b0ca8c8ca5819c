//! Error types for packing operations.

use thiserror::Error;

use crate::model::{Item, ValidationError};
use crate::types::Dimensional;

/// Result type alias for packing operations.
pub type Result<T> = std::result::Result<T, PackingError>;

/// Errors that can occur while preparing or running a pack.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PackingError {
    /// No box type in the catalog can take the largest remaining item.
    #[error("Item {} ({}) is too large to fit into any box", .item.description(), describe_dims(.item))]
    ItemTooLarge { item: Item },

    /// The item set was replaced with something that is neither an item list nor a
    /// sequence of items.
    #[error("Invalid item input: {0}")]
    InvalidItemInput(String),

    /// Item or box data failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl PackingError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            PackingError::ItemTooLarge { .. } => "item_too_large",
            PackingError::InvalidItemInput(_) => "invalid_item_input",
            PackingError::Validation(_) => "invalid_input",
        }
    }
}

fn describe_dims(item: &Item) -> String {
    let dims = item.dimensions();
    format!("{}×{}×{}", dims.width, dims.length, dims.depth)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_too_large_message_names_the_item() {
        let item = Item::new("Anvil", (50.0, 40.0, 30.0), 80.0).unwrap();
        let err = PackingError::ItemTooLarge { item };
        assert_eq!(
            err.to_string(),
            "Item Anvil (50×40×30) is too large to fit into any box"
        );
        assert_eq!(err.code(), "item_too_large");
    }

    #[test]
    fn validation_errors_convert() {
        let err: PackingError = ValidationError::InvalidWeight("x".into()).into();
        assert_eq!(err.code(), "invalid_input");
        assert_eq!(err.to_string(), "Invalid weight: x");
    }
}
