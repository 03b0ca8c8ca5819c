//! Layer-based box packing with weight rebalancing.
//!
//! Items are packed largest first into the box type that takes the most of them,
//! one box at a time. The resulting boxes can then be rebalanced so their gross
//! weights move towards the mean.

pub mod api;
pub mod collections;
pub mod config;
pub mod error;
pub mod model;
pub mod optimizer;
pub mod packer;
pub mod redistribute;
pub mod types;

pub use collections::{BoxList, ItemList, PackedBoxList};
pub use error::{PackingError, Result};
pub use model::{BoxType, Item, PackedBox, ValidationError};
pub use optimizer::{PackEvent, PackingConfig, pack_box, pack_by_volume};
pub use packer::{ItemEntry, ItemInput, Packer};
pub use redistribute::redistribute_weight;
