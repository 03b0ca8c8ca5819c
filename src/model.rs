//! Data models for box packing.
//!
//! This module defines the value types the packer works with:
//! - `Item`: an object to be packed with dimensions, weight and a description
//! - `BoxType`: a container definition from the catalog
//! - `PackedBox`: one box type together with the items assigned to it

use thiserror::Error;

use crate::collections::ItemList;
use crate::types::{Dimensional, Dims, Weighted};

/// Validation error for item and box data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),
    #[error("Invalid weight: {0}")]
    InvalidWeight(String),
}

fn validate_dimension(value: f64, name: &str) -> Result<(), ValidationError> {
    if value <= 0.0 || value.is_nan() || value.is_infinite() {
        return Err(ValidationError::InvalidDimension(format!(
            "{} must be positive, got: {}",
            name, value
        )));
    }
    Ok(())
}

fn validate_weight_value(value: f64, name: &str) -> Result<(), ValidationError> {
    if value <= 0.0 || value.is_nan() || value.is_infinite() {
        return Err(ValidationError::InvalidWeight(format!(
            "{} must be positive, got: {}",
            name, value
        )));
    }
    Ok(())
}

fn validate_dims(dims: Dims, prefix: &str) -> Result<(), ValidationError> {
    if dims.is_valid_dimension() {
        return Ok(());
    }
    validate_dimension(dims.width, &format!("{prefix}width"))?;
    validate_dimension(dims.length, &format!("{prefix}length"))?;
    validate_dimension(dims.depth, &format!("{prefix}depth"))?;
    Ok(())
}

/// An item to be packed.
///
/// Items carry no identity: two items with the same values are interchangeable, and
/// a quantity is expressed by inserting the same item several times.
#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    description: String,
    dims: Dims,
    weight: f64,
}

impl Item {
    /// Creates a new item with validation.
    ///
    /// # Examples
    /// ```
    /// use box_packer::model::Item;
    ///
    /// let mug = Item::new("Mug", (10.0, 12.0, 9.0), 0.4);
    /// assert!(mug.is_ok());
    ///
    /// let broken = Item::new("Broken", (-10.0, 12.0, 9.0), 0.4);
    /// assert!(broken.is_err());
    /// ```
    pub fn new(
        description: impl Into<String>,
        dims: impl Into<Dims>,
        weight: f64,
    ) -> Result<Self, ValidationError> {
        let dims = dims.into();
        validate_dims(dims, "Item ")?;
        validate_weight_value(weight, "Item weight")?;
        Ok(Self {
            description: description.into(),
            dims,
            weight,
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn width(&self) -> f64 {
        self.dims.width
    }

    pub fn length(&self) -> f64 {
        self.dims.length
    }

    pub fn depth(&self) -> f64 {
        self.dims.depth
    }
}

impl Dimensional for Item {
    fn dimensions(&self) -> Dims {
        self.dims
    }
}

impl Weighted for Item {
    fn weight(&self) -> f64 {
        self.weight
    }
}

/// A box type from the catalog.
///
/// # Fields
/// * `reference` - Label identifying the box type
/// * `inner_dims` - Interior dimensions available to items
/// * `max_weight` - Maximum total weight including the empty box
/// * `empty_weight` - Tare weight of the empty box
#[derive(Clone, Debug, PartialEq)]
pub struct BoxType {
    reference: String,
    inner_dims: Dims,
    max_weight: f64,
    empty_weight: f64,
}

impl BoxType {
    /// Creates a new box type after validating the parameters.
    ///
    /// The usable payload (`max_weight - empty_weight`) must be positive.
    pub fn new(
        reference: impl Into<String>,
        inner_dims: impl Into<Dims>,
        max_weight: f64,
        empty_weight: f64,
    ) -> Result<Self, ValidationError> {
        let inner_dims = inner_dims.into();
        validate_dims(inner_dims, "Box inner ")?;
        validate_weight_value(max_weight, "Box max weight")?;
        if empty_weight < 0.0 || !empty_weight.is_finite() {
            return Err(ValidationError::InvalidWeight(format!(
                "Box empty weight must not be negative, got: {}",
                empty_weight
            )));
        }
        validate_weight_value(max_weight - empty_weight, "Box payload weight")?;
        Ok(Self {
            reference: reference.into(),
            inner_dims,
            max_weight,
            empty_weight,
        })
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn inner_dims(&self) -> Dims {
        self.inner_dims
    }

    pub fn max_weight(&self) -> f64 {
        self.max_weight
    }

    pub fn empty_weight(&self) -> f64 {
        self.empty_weight
    }

    /// Weight the box can carry on top of its own tare.
    pub fn payload_weight(&self) -> f64 {
        self.max_weight - self.empty_weight
    }
}

impl Dimensional for BoxType {
    fn dimensions(&self) -> Dims {
        self.inner_dims
    }
}

/// A box type together with the items assigned to it.
#[derive(Clone, Debug, PartialEq)]
pub struct PackedBox {
    box_type: BoxType,
    items: ItemList,
}

impl PackedBox {
    pub fn new(box_type: BoxType, items: ItemList) -> Self {
        Self { box_type, items }
    }

    pub fn box_type(&self) -> &BoxType {
        &self.box_type
    }

    /// Items in this box, largest first (the order they were placed in).
    pub fn items(&self) -> &ItemList {
        &self.items
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Sum of the item weights, excluding the tare.
    pub fn items_weight(&self) -> f64 {
        self.items.iter().map(Weighted::weight).sum()
    }

    /// Remaining payload that could still be added.
    pub fn remaining_weight(&self) -> f64 {
        self.box_type.payload_weight() - self.items_weight()
    }

    /// Sum of the volumes of all items.
    pub fn used_volume(&self) -> f64 {
        self.items.iter().map(Dimensional::volume).sum()
    }

    /// Percentage of the interior volume occupied by items (0.0 to 100.0).
    pub fn volume_utilisation(&self) -> f64 {
        let total = self.box_type.volume();
        if total <= 0.0 {
            return 0.0;
        }
        (self.used_volume() / total) * 100.0
    }

    pub fn into_parts(self) -> (BoxType, ItemList) {
        (self.box_type, self.items)
    }
}

impl Weighted for PackedBox {
    /// Gross weight: tare plus items.
    fn weight(&self) -> f64 {
        self.box_type.empty_weight + self.items_weight()
    }
}
