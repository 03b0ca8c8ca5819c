//! Packing logic for fitting items into boxes.
//!
//! Two heuristics live here:
//! - [`pack_box`] fills a single box type layer by layer, largest items first
//! - [`pack_by_volume`] repeatedly picks the box type that takes the most of the
//!   remaining items until every item has a box
//!
//! Both report progress through an observer callback that never influences the outcome.

use serde::Serialize;
use tracing::{debug, trace};

use crate::collections::{BoxList, ItemList, PackedBoxList};
use crate::error::{PackingError, Result};
use crate::model::{BoxType, PackedBox};
use crate::types::{Dimensional, EPSILON_GENERAL, Weighted};

/// Configuration for the packing algorithms.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PackingConfig {
    /// General numerical tolerance for gap, depth and weight comparisons
    pub general_epsilon: f64,
    /// Whether `Packer::pack` rebalances box weights after volume packing
    pub redistribute_weight: bool,
    /// Upper bound on accepted moves during weight redistribution
    pub max_redistribution_moves: usize,
    /// Skip redistribution when the solution uses more boxes than this
    pub max_boxes_to_balance_weight: Option<usize>,
}

impl PackingConfig {
    pub const DEFAULT_GENERAL_EPSILON: f64 = EPSILON_GENERAL;
    pub const DEFAULT_REDISTRIBUTE_WEIGHT: bool = true;
    pub const DEFAULT_MAX_REDISTRIBUTION_MOVES: usize = 10_000;

    /// Creates a builder for a custom configuration.
    pub fn builder() -> PackingConfigBuilder {
        PackingConfigBuilder::default()
    }

    /// Whether a solution with `box_count` boxes should be rebalanced.
    pub fn should_redistribute(&self, box_count: usize) -> bool {
        self.redistribute_weight
            && box_count > 1
            && self
                .max_boxes_to_balance_weight
                .is_none_or(|limit| box_count <= limit)
    }
}

impl Default for PackingConfig {
    fn default() -> Self {
        Self {
            general_epsilon: Self::DEFAULT_GENERAL_EPSILON,
            redistribute_weight: Self::DEFAULT_REDISTRIBUTE_WEIGHT,
            max_redistribution_moves: Self::DEFAULT_MAX_REDISTRIBUTION_MOVES,
            max_boxes_to_balance_weight: None,
        }
    }
}

/// Builder for PackingConfig.
#[derive(Clone, Debug, Default)]
pub struct PackingConfigBuilder {
    config: PackingConfig,
}

impl PackingConfigBuilder {
    /// Sets the general tolerance.
    pub fn general_epsilon(mut self, epsilon: f64) -> Self {
        self.config.general_epsilon = epsilon;
        self
    }

    /// Enables or disables weight redistribution.
    pub fn redistribute_weight(mut self, enabled: bool) -> Self {
        self.config.redistribute_weight = enabled;
        self
    }

    /// Sets the cap on accepted redistribution moves.
    pub fn max_redistribution_moves(mut self, moves: usize) -> Self {
        self.config.max_redistribution_moves = moves;
        self
    }

    /// Sets the largest solution size that is still rebalanced.
    pub fn max_boxes_to_balance_weight(mut self, limit: Option<usize>) -> Self {
        self.config.max_boxes_to_balance_weight = limit;
        self
    }

    /// Creates the final configuration.
    pub fn build(self) -> PackingConfig {
        self.config
    }
}

/// Events emitted while packing, suitable for live visualisation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum PackEvent {
    /// An item was placed into the box currently being filled.
    ItemPlaced {
        box_reference: String,
        layer: usize,
        description: String,
        /// Footprint as placed (width, length) plus depth
        dims: (f64, f64, f64),
        weight: f64,
        rotated: bool,
    },
    /// The current layer was full and a new one was started above it.
    LayerClosed {
        box_reference: String,
        layer: usize,
        /// Summed extents of the items placed in the layer
        layer_width: f64,
        layer_length: f64,
        layer_depth: f64,
        remaining_depth: f64,
    },
    /// A box type was tried against the remaining items.
    BoxEvaluated {
        box_reference: String,
        packed_items: usize,
        remaining_items: usize,
    },
    /// A box type won a round of volume packing.
    BoxSelected {
        box_reference: String,
        items: usize,
        weight: f64,
    },
    /// An item was moved from a heavier box into a lighter one.
    MoveAccepted {
        description: String,
        from_reference: String,
        to_reference: String,
        weight_variance: f64,
    },
    /// A candidate move was tried and discarded.
    MoveRejected {
        description: String,
        from_reference: String,
        reason: String,
    },
    /// Packing finished.
    Finished {
        boxes: usize,
        items: usize,
        mean_weight: f64,
        weight_variance: f64,
    },
    /// Packing failed.
    Failed { code: String, message: String },
}

/// Result of filling one box type.
#[derive(Clone, Debug)]
pub struct BoxFill {
    /// The box with the items that fit, in placement order
    pub packed: PackedBox,
    /// Items that were not placed
    pub remaining: ItemList,
}

/// Fit of an item footprint into the open area of the current layer.
#[derive(Clone, Copy, Debug)]
struct Fit {
    width: f64,
    length: f64,
    gap_width: f64,
    gap_length: f64,
    fits: bool,
}

impl Fit {
    fn evaluate(
        remaining_width: f64,
        remaining_length: f64,
        width: f64,
        length: f64,
        epsilon: f64,
    ) -> Self {
        let gap_width = remaining_width - width;
        let gap_length = remaining_length - length;
        Self {
            width,
            length,
            gap_width,
            gap_length,
            fits: gap_width >= -epsilon && gap_length >= -epsilon,
        }
    }

    fn min_gap(&self) -> f64 {
        self.gap_width.min(self.gap_length)
    }
}

/// Picks the orientation with the tighter fit, preferring the unrotated one on ties.
///
/// Returns `None` if neither orientation fits, otherwise the fit and whether it is rotated.
fn choose_orientation(same: Fit, rotated: Fit) -> Option<(Fit, bool)> {
    match (same.fits, rotated.fits) {
        (false, false) => None,
        (true, false) => Some((same, false)),
        (false, true) => Some((rotated, true)),
        (true, true) if same.min_gap() <= rotated.min_gap() => Some((same, false)),
        (true, true) => Some((rotated, true)),
    }
}

/// Open area and extent of the layer currently being filled.
#[derive(Clone, Copy, Debug)]
struct Layer {
    remaining_width: f64,
    remaining_length: f64,
    width: f64,
    length: f64,
    depth: f64,
    placed: usize,
}

impl Layer {
    fn open(width: f64, length: f64) -> Self {
        Self {
            remaining_width: width,
            remaining_length: length,
            width: 0.0,
            length: 0.0,
            depth: 0.0,
            placed: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.placed == 0
    }

    /// Takes the item's extent from the axis with the smaller leftover gap.
    fn place(&mut self, fit: Fit, depth: f64) {
        if fit.gap_width < fit.gap_length {
            self.remaining_width = (self.remaining_width - fit.width).max(0.0);
        } else {
            self.remaining_length = (self.remaining_length - fit.length).max(0.0);
        }
        self.width += fit.width;
        self.length += fit.length;
        self.depth = self.depth.max(depth);
        self.placed += 1;
    }
}

/// Fills one box type with as many of `items` as the layer heuristic allows.
///
/// Items are taken largest first. Each is put into the current layer in whichever of
/// its two horizontal orientations leaves the smaller gap; when nothing fits, the layer
/// is closed and a new one starts on top. Packing stops at the first item that exceeds
/// the remaining depth or weight, or that does not fit an empty layer.
///
/// # Parameters
/// * `box_type` - The box to fill (never modified)
/// * `items` - Candidate items; the ones not placed are returned in `BoxFill::remaining`
/// * `config` - Tolerances
/// * `on_event` - Progress observer
pub fn pack_box(
    box_type: &BoxType,
    mut items: ItemList,
    config: &PackingConfig,
    on_event: &mut dyn FnMut(&PackEvent),
) -> BoxFill {
    let eps = config.general_epsilon;
    let inner = box_type.inner_dims();
    let (box_width, box_length) = inner.normalized_footprint();

    let mut remaining_depth = inner.depth;
    let mut remaining_weight = box_type.payload_weight();
    let mut layer = Layer::open(box_width, box_length);
    let mut layer_index = 0usize;
    let mut packed = ItemList::new();

    while let Some(candidate) = items.peek() {
        let depth = candidate.depth();
        let weight = candidate.weight();

        if depth > remaining_depth + eps || weight > remaining_weight + eps {
            trace!(
                box_reference = box_type.reference(),
                item = candidate.description(),
                remaining_depth,
                remaining_weight,
                "depth or weight exhausted"
            );
            break;
        }

        let (item_width, item_length) = candidate.dimensions().normalized_footprint();
        let same = Fit::evaluate(
            layer.remaining_width,
            layer.remaining_length,
            item_width,
            item_length,
            eps,
        );
        let rotated = Fit::evaluate(
            layer.remaining_width,
            layer.remaining_length,
            item_length,
            item_width,
            eps,
        );

        let Some((fit, is_rotated)) = choose_orientation(same, rotated) else {
            if layer.is_empty() {
                trace!(
                    box_reference = box_type.reference(),
                    item = candidate.description(),
                    "item does not fit an empty layer"
                );
                break;
            }

            remaining_depth -= layer.depth;
            on_event(&PackEvent::LayerClosed {
                box_reference: box_type.reference().to_string(),
                layer: layer_index,
                layer_width: layer.width,
                layer_length: layer.length,
                layer_depth: layer.depth,
                remaining_depth,
            });
            layer = Layer::open(box_width, box_length);
            layer_index += 1;
            continue;
        };

        let Some(item) = items.pop() else {
            break;
        };
        remaining_weight -= weight;
        layer.place(fit, depth);

        on_event(&PackEvent::ItemPlaced {
            box_reference: box_type.reference().to_string(),
            layer: layer_index,
            description: item.description().to_string(),
            dims: (fit.width, fit.length, depth),
            weight,
            rotated: is_rotated,
        });
        packed.insert(item);
    }

    debug!(
        box_reference = box_type.reference(),
        packed = packed.len(),
        remaining = items.len(),
        layers = layer_index + usize::from(!layer.is_empty()),
        "box filled"
    );

    BoxFill {
        packed: PackedBox::new(box_type.clone(), packed),
        remaining: items,
    }
}

/// Checks whether the layer heuristic places every one of `items` into `box_type`.
pub fn fits_in_box(box_type: &BoxType, items: &ItemList, config: &PackingConfig) -> bool {
    let fill = pack_box(box_type, items.clone(), config, &mut |_| {});
    fill.remaining.is_empty()
}

/// Packs all items into boxes from the catalog, one box at a time.
///
/// Each round tries every box type (smallest first) against a copy of the unpacked
/// items and keeps the one that took the most items; a smaller box wins ties. A round
/// ends early once a box takes everything that is left.
///
/// # Errors
/// [`PackingError::ItemTooLarge`] if in some round no box type takes even one item.
pub fn pack_by_volume(
    items: ItemList,
    boxes: &BoxList,
    config: &PackingConfig,
    on_event: &mut dyn FnMut(&PackEvent),
) -> Result<PackedBoxList> {
    let mut remaining = items;
    let mut solution = PackedBoxList::new();

    while let Some(largest) = remaining.peek().cloned() {
        let mut candidates = PackedBoxList::new();

        for box_type in boxes.iter() {
            let fill = pack_box(box_type, remaining.clone(), config, on_event);
            let packed_items = fill.packed.item_count();
            on_event(&PackEvent::BoxEvaluated {
                box_reference: box_type.reference().to_string(),
                packed_items,
                remaining_items: fill.remaining.len(),
            });

            if packed_items == 0 {
                continue;
            }
            candidates.insert(fill.packed);
            if packed_items == remaining.len() {
                break;
            }
        }

        let Some(best) = candidates.pop_best() else {
            debug!(item = largest.description(), "no box type takes the item");
            return Err(PackingError::ItemTooLarge { item: largest });
        };

        for item in best.items().iter() {
            remaining.remove(item);
        }

        debug!(
            box_reference = best.box_type().reference(),
            items = best.item_count(),
            remaining = remaining.len(),
            "box selected"
        );
        on_event(&PackEvent::BoxSelected {
            box_reference: best.box_type().reference().to_string(),
            items: best.item_count(),
            weight: best.weight(),
        });
        solution.insert(best);
    }

    Ok(solution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Item;

    fn item(description: &str, dims: (f64, f64, f64), weight: f64) -> Item {
        Item::new(description, dims, weight).unwrap()
    }

    fn repeated(description: &str, dims: (f64, f64, f64), weight: f64, qty: usize) -> ItemList {
        (0..qty).map(|_| item(description, dims, weight)).collect()
    }

    fn box_type(reference: &str, dims: (f64, f64, f64), max_weight: f64) -> BoxType {
        BoxType::new(reference, dims, max_weight, 0.0).unwrap()
    }

    fn collect_events(run: impl FnOnce(&mut dyn FnMut(&PackEvent))) -> Vec<PackEvent> {
        let mut events = Vec::new();
        run(&mut |event: &PackEvent| events.push(event.clone()));
        events
    }

    #[test]
    fn single_item_fits_into_box() {
        let config = PackingConfig::default();
        let fill = pack_box(
            &box_type("A", (10.0, 10.0, 10.0), 50.0),
            repeated("cube", (5.0, 5.0, 5.0), 4.0, 1),
            &config,
            &mut |_| {},
        );
        assert_eq!(fill.packed.item_count(), 1);
        assert!(fill.remaining.is_empty());
    }

    #[test]
    fn layers_close_and_depth_runs_out() {
        let config = PackingConfig::default();
        let events = collect_events(|on_event| {
            let fill = pack_box(
                &box_type("A", (10.0, 10.0, 10.0), 100.0),
                repeated("slab", (10.0, 10.0, 5.0), 1.0, 3),
                &config,
                on_event,
            );
            assert_eq!(fill.packed.item_count(), 2);
            assert_eq!(fill.remaining.len(), 1);
        });

        let closed: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                PackEvent::LayerClosed {
                    remaining_depth, ..
                } => Some(*remaining_depth),
                _ => None,
            })
            .collect();
        assert_eq!(closed.len(), 2);
        assert!((closed[0] - 5.0).abs() < EPSILON_GENERAL);
        assert!(closed[1].abs() < EPSILON_GENERAL);
    }

    #[test]
    fn shelf_fills_one_strip_per_layer() {
        let config = PackingConfig::default();
        let fill = pack_box(
            &box_type("A", (10.0, 10.0, 10.0), 50.0),
            repeated("cube", (5.0, 5.0, 5.0), 4.0, 12),
            &config,
            &mut |_| {},
        );
        // Two cubes per layer strip, two layers of depth 5.
        assert_eq!(fill.packed.item_count(), 4);
        assert_eq!(fill.remaining.len(), 8);
    }

    #[test]
    fn rotates_item_when_it_leaves_a_tighter_gap() {
        let config = PackingConfig::default();
        let events = collect_events(|on_event| {
            let fill = pack_box(
                &box_type("A", (10.0, 20.0, 10.0), 50.0),
                repeated("plank", (6.0, 9.0, 2.0), 1.0, 1),
                &config,
                on_event,
            );
            assert_eq!(fill.packed.item_count(), 1);
        });

        let placed = events
            .iter()
            .find_map(|e| match e {
                PackEvent::ItemPlaced { dims, rotated, .. } => Some((*dims, *rotated)),
                _ => None,
            })
            .expect("item placement event missing");
        assert!(placed.1);
        assert_eq!(placed.0, (9.0, 6.0, 2.0));
    }

    #[test]
    fn box_given_wider_than_long_still_packs() {
        let config = PackingConfig::default();
        let fill = pack_box(
            &box_type("A", (20.0, 10.0, 10.0), 50.0),
            repeated("plank", (18.0, 9.0, 2.0), 1.0, 1),
            &config,
            &mut |_| {},
        );
        assert_eq!(fill.packed.item_count(), 1);
    }

    #[test]
    fn stops_when_item_does_not_fit_empty_layer() {
        let config = PackingConfig::default();
        let mut items = repeated("wide", (12.0, 12.0, 1.0), 1.0, 1);
        items.insert(item("tiny", (1.0, 1.0, 1.0), 1.0));

        let fill = pack_box(
            &box_type("A", (10.0, 10.0, 10.0), 50.0),
            items,
            &config,
            &mut |_| {},
        );
        // The smaller item is never reached because the larger one blocks the box.
        assert_eq!(fill.packed.item_count(), 0);
        assert_eq!(fill.remaining.len(), 2);
    }

    #[test]
    fn stops_when_weight_is_exhausted() {
        let config = PackingConfig::default();
        let fill = pack_box(
            &BoxType::new("A", (20.0, 20.0, 20.0), 12.0, 2.0).unwrap(),
            repeated("brick", (5.0, 5.0, 5.0), 4.0, 5),
            &config,
            &mut |_| {},
        );
        assert_eq!(fill.packed.item_count(), 2);
        assert!(fill.packed.items_weight() <= fill.packed.box_type().payload_weight());
    }

    #[test]
    fn volume_packing_uses_one_large_box_for_everything() {
        let config = PackingConfig::default();
        let boxes: BoxList = vec![
            box_type("Box B", (20.0, 20.0, 20.0), 100.0),
            box_type("Box A", (10.0, 10.0, 10.0), 50.0),
        ]
        .into();

        let solution = pack_by_volume(
            repeated("cube", (5.0, 5.0, 5.0), 4.0, 12),
            &boxes,
            &config,
            &mut |_| {},
        )
        .unwrap();

        assert_eq!(solution.len(), 1);
        let packed = solution.iter().next().unwrap();
        assert_eq!(packed.box_type().reference(), "Box B");
        assert_eq!(packed.item_count(), 12);
        assert!((packed.weight() - 48.0).abs() < EPSILON_GENERAL);
    }

    #[test]
    fn volume_packing_evaluates_smallest_box_first_and_stops_early() {
        let config = PackingConfig::default();
        let boxes: BoxList = vec![
            box_type("large", (50.0, 50.0, 50.0), 100.0),
            box_type("small", (10.0, 10.0, 10.0), 100.0),
        ]
        .into();

        let events = collect_events(|on_event| {
            let solution = pack_by_volume(
                repeated("cube", (5.0, 5.0, 5.0), 1.0, 2),
                &boxes,
                &config,
                on_event,
            )
            .unwrap();
            assert_eq!(solution.len(), 1);
            assert_eq!(solution.iter().next().unwrap().box_type().reference(), "small");
        });

        let evaluated: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                PackEvent::BoxEvaluated { box_reference, .. } => Some(box_reference.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(evaluated, vec!["small"]);
    }

    #[test]
    fn volume_packing_splits_by_weight() {
        let config = PackingConfig::default();
        let boxes: BoxList = vec![box_type("crate", (20.0, 20.0, 20.0), 400.0)].into();

        let solution = pack_by_volume(
            repeated("ingot", (10.0, 10.0, 10.0), 300.0, 3),
            &boxes,
            &config,
            &mut |_| {},
        )
        .unwrap();

        assert_eq!(solution.len(), 3);
        assert!(solution.iter().all(|b| b.item_count() == 1));
    }

    #[test]
    fn volume_packing_reports_item_too_large() {
        let config = PackingConfig::default();
        let boxes: BoxList = vec![
            box_type("A", (10.0, 10.0, 10.0), 50.0),
            box_type("B", (20.0, 20.0, 20.0), 100.0),
        ]
        .into();
        let mut items = repeated("cube", (5.0, 5.0, 5.0), 1.0, 2);
        items.insert(item("pole", (2.0, 2.0, 25.0), 1.0));

        let err = pack_by_volume(items, &boxes, &config, &mut |_| {}).unwrap_err();
        match err {
            PackingError::ItemTooLarge { item } => assert_eq!(item.description(), "pole"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn volume_packing_without_boxes_fails() {
        let config = PackingConfig::default();
        let err = pack_by_volume(
            repeated("cube", (1.0, 1.0, 1.0), 1.0, 1),
            &BoxList::new(),
            &config,
            &mut |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, PackingError::ItemTooLarge { .. }));
    }

    #[test]
    fn volume_packing_of_nothing_is_empty() {
        let config = PackingConfig::default();
        let boxes: BoxList = vec![box_type("A", (10.0, 10.0, 10.0), 50.0)].into();
        let solution = pack_by_volume(ItemList::new(), &boxes, &config, &mut |_| {}).unwrap();
        assert!(solution.is_empty());
    }

    #[test]
    fn should_redistribute_respects_limits() {
        let config = PackingConfig::default();
        assert!(!config.should_redistribute(1));
        assert!(config.should_redistribute(2));

        let limited = PackingConfig::builder()
            .max_boxes_to_balance_weight(Some(3))
            .build();
        assert!(limited.should_redistribute(3));
        assert!(!limited.should_redistribute(4));

        let disabled = PackingConfig::builder().redistribute_weight(false).build();
        assert!(!disabled.should_redistribute(5));
    }
}
