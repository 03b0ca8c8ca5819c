//! Top-level packing entry point.
//!
//! [`Packer`] owns the item multiset and the box catalog. Packing runs the volume packer
//! and, when enabled and more than one box was needed, rebalances the box weights.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::collections::{BoxList, ItemList, PackedBoxList};
use crate::error::{PackingError, Result};
use crate::model::{BoxType, Item, ValidationError};
use crate::optimizer::{PackEvent, PackingConfig, pack_by_volume};
use crate::redistribute::redistribute_weight;

/// One line of a JSON item list.
#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct ItemEntry {
    pub description: String,
    #[schema(value_type = [f64; 3], example = json!([30.0, 40.0, 20.0]))]
    pub dims: (f64, f64, f64),
    pub weight: f64,
    #[serde(default = "default_quantity")]
    #[schema(default = 1)]
    pub quantity: usize,
}

fn default_quantity() -> usize {
    1
}

impl ItemEntry {
    /// Expands the entry into `quantity` identical items.
    pub fn into_items(self) -> std::result::Result<Vec<Item>, ValidationError> {
        let item = Item::new(self.description, self.dims, self.weight)?;
        Ok(vec![item; self.quantity])
    }
}

/// Anything that can replace the packer's item set.
#[derive(Clone, Debug, PartialEq)]
pub enum ItemInput {
    List(ItemList),
    Sequence(Vec<Item>),
}

impl From<ItemList> for ItemInput {
    fn from(items: ItemList) -> Self {
        ItemInput::List(items)
    }
}

impl From<Vec<Item>> for ItemInput {
    fn from(items: Vec<Item>) -> Self {
        ItemInput::Sequence(items)
    }
}

impl From<ItemInput> for ItemList {
    fn from(input: ItemInput) -> Self {
        match input {
            ItemInput::List(items) => items,
            ItemInput::Sequence(items) => items.into(),
        }
    }
}

impl TryFrom<Value> for ItemInput {
    type Error = PackingError;

    /// Accepts `[{description, dims, weight, quantity?}, ...]` or `{"items": [...]}`.
    fn try_from(value: Value) -> Result<Self> {
        let raw_entries = match value {
            Value::Array(_) => value,
            Value::Object(mut map) => match map.remove("items") {
                Some(items @ Value::Array(_)) => items,
                _ => {
                    return Err(PackingError::InvalidItemInput(
                        "object must contain an \"items\" array".to_string(),
                    ));
                }
            },
            other => {
                return Err(PackingError::InvalidItemInput(format!(
                    "expected an array of items or an object with \"items\", got {}",
                    json_kind(&other)
                )));
            }
        };

        let entries: Vec<ItemEntry> = serde_json::from_value(raw_entries)
            .map_err(|err| PackingError::InvalidItemInput(err.to_string()))?;

        let mut items = Vec::new();
        for entry in entries {
            items.extend(entry.into_items()?);
        }
        Ok(ItemInput::Sequence(items))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Packs a multiset of items into boxes from a catalog.
///
/// # Examples
/// ```
/// use box_packer::model::{BoxType, Item};
/// use box_packer::packer::Packer;
///
/// let mut packer = Packer::new();
/// packer.add_box(BoxType::new("Small", (30.0, 30.0, 30.0), 20.0, 0.5).unwrap());
/// packer.add_item(Item::new("Mug", (10.0, 10.0, 12.0), 0.4).unwrap(), 4);
///
/// let boxes = packer.pack().unwrap();
/// assert_eq!(boxes.len(), 1);
/// assert_eq!(boxes.item_count(), 4);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Packer {
    items: ItemList,
    boxes: BoxList,
    config: PackingConfig,
}

impl Packer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PackingConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &PackingConfig {
        &self.config
    }

    pub fn items(&self) -> &ItemList {
        &self.items
    }

    pub fn boxes(&self) -> &BoxList {
        &self.boxes
    }

    /// Adds `quantity` copies of `item`.
    pub fn add_item(&mut self, item: Item, quantity: usize) {
        for _ in 0..quantity {
            self.items.insert(item.clone());
        }
    }

    /// Replaces the whole item set.
    pub fn set_items(&mut self, items: impl Into<ItemInput>) {
        self.items = ItemList::from(items.into());
    }

    /// Replaces the item set from JSON, see [`ItemInput`].
    ///
    /// # Errors
    /// [`PackingError::InvalidItemInput`] for JSON of the wrong shape,
    /// [`PackingError::Validation`] for non-positive dimensions or weights.
    /// The current items are kept on error.
    pub fn set_items_json(&mut self, value: Value) -> Result<()> {
        let input = ItemInput::try_from(value)?;
        self.set_items(input);
        Ok(())
    }

    pub fn add_box(&mut self, box_type: BoxType) {
        self.boxes.insert(box_type);
    }

    pub fn set_boxes(&mut self, boxes: BoxList) {
        self.boxes = boxes;
    }

    /// Packs all items, see [`Packer::pack_with_progress`].
    pub fn pack(&self) -> Result<PackedBoxList> {
        self.pack_with_progress(|_| {})
    }

    /// Packs all items and reports progress to `on_event`.
    ///
    /// The last event is always [`PackEvent::Finished`] or [`PackEvent::Failed`].
    ///
    /// # Errors
    /// [`PackingError::ItemTooLarge`] if an item fits no box type. No partial solution
    /// is returned.
    pub fn pack_with_progress(
        &self,
        mut on_event: impl FnMut(&PackEvent),
    ) -> Result<PackedBoxList> {
        let outcome = self.run(&mut on_event);

        match &outcome {
            Ok(solution) => {
                info!(
                    boxes = solution.len(),
                    items = solution.item_count(),
                    mean_weight = solution.mean_weight(),
                    "packing finished"
                );
                on_event(&PackEvent::Finished {
                    boxes: solution.len(),
                    items: solution.item_count(),
                    mean_weight: solution.mean_weight(),
                    weight_variance: solution.weight_variance(),
                });
            }
            Err(err) => {
                info!(error = %err, "packing failed");
                on_event(&PackEvent::Failed {
                    code: err.code().to_string(),
                    message: err.to_string(),
                });
            }
        }

        outcome
    }

    fn run(&self, on_event: &mut dyn FnMut(&PackEvent)) -> Result<PackedBoxList> {
        debug!(
            items = self.items.len(),
            box_types = self.boxes.len(),
            "packing by volume"
        );
        let solution = pack_by_volume(self.items.clone(), &self.boxes, &self.config, on_event)?;

        if !self.config.should_redistribute(solution.len()) {
            return Ok(solution);
        }
        Ok(redistribute_weight(
            solution,
            &self.boxes,
            &self.config,
            on_event,
        ))
    }
}
