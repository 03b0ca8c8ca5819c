//! Weight rebalancing for an already packed solution.
//!
//! Moves single items from boxes heavier than the mean into boxes lighter than the
//! mean, re-solving both affected boxes with the volume packer so that either may
//! change to a different box type. The search is first-improvement: the first move
//! that lowers the weight variance is applied and the scan starts over. When a scan
//! finds nothing, the target is moved to the mean of the current boxes and the search
//! resumes, so the result is stable under a second pass.

use std::cmp::Ordering;

use tracing::{debug, trace, warn};

use crate::collections::{BoxList, ItemList, PackedBoxList, mean_weight_of, weight_variance_of};
use crate::model::{Item, PackedBox};
use crate::optimizer::{PackEvent, PackingConfig, pack_by_volume};
use crate::types::{Weighted, compare_with_epsilon};

/// Boxes split by their weight relative to the target.
#[derive(Debug, Default)]
struct Partition {
    at_target: Vec<PackedBox>,
    overweight: Vec<PackedBox>,
    underweight: Vec<PackedBox>,
}

impl Partition {
    /// Over and under come out sorted by descending weight, ties in input order.
    fn split(boxes: impl IntoIterator<Item = PackedBox>, target: f64, epsilon: f64) -> Self {
        let mut partition = Self::default();
        for packed in boxes {
            match compare_with_epsilon(packed.weight(), target, epsilon) {
                Ordering::Greater => partition.overweight.push(packed),
                Ordering::Less => partition.underweight.push(packed),
                Ordering::Equal => partition.at_target.push(packed),
            }
        }
        sort_by_weight_desc(&mut partition.overweight);
        sort_by_weight_desc(&mut partition.underweight);
        partition
    }

    fn resplit(self, target: f64, epsilon: f64) -> Self {
        let Self {
            at_target,
            overweight,
            underweight,
        } = self;
        Self::split(
            at_target.into_iter().chain(overweight).chain(underweight),
            target,
            epsilon,
        )
    }

    fn all(&self) -> impl Iterator<Item = &PackedBox> + Clone {
        self.at_target
            .iter()
            .chain(self.overweight.iter())
            .chain(self.underweight.iter())
    }

    fn mean_weight(&self) -> f64 {
        mean_weight_of(self.all())
    }

    fn weight_variance(&self) -> f64 {
        weight_variance_of(self.all())
    }

    fn into_solution(self) -> PackedBoxList {
        let mut solution = PackedBoxList::from(self.at_target);
        solution.extend_from_vec(self.overweight);
        solution.extend_from_vec(self.underweight);
        solution
    }
}

/// An accepted item move, ready to be applied.
struct Move {
    underweight_idx: usize,
    overweight_idx: usize,
    lighter: PackedBox,
    /// `None` when the item was the last one in the heavier box
    heavier: Option<PackedBox>,
}

/// Rebalances box weights towards the mean weight of `solution`.
///
/// Never adds boxes and never fails: a move whose sub-solve fails or needs more than
/// one box is simply not taken. At most `config.max_redistribution_moves` moves are
/// applied.
///
/// # Parameters
/// * `solution` - A complete packing produced with `boxes`
/// * `boxes` - The catalog used to re-solve the two boxes touched by a move
/// * `config` - Tolerances and the move cap
/// * `on_event` - Progress observer
pub fn redistribute_weight(
    solution: PackedBoxList,
    boxes: &BoxList,
    config: &PackingConfig,
    on_event: &mut dyn FnMut(&PackEvent),
) -> PackedBoxList {
    if solution.len() < 2 {
        return solution;
    }

    let eps = config.general_epsilon;
    let mut target = solution.mean_weight();
    let mut partition = Partition::split(solution, target, eps);
    let mut moves = 0usize;

    debug!(
        target,
        overweight = partition.overweight.len(),
        underweight = partition.underweight.len(),
        "redistributing weight"
    );

    loop {
        if moves >= config.max_redistribution_moves {
            warn!(moves, "weight redistribution stopped at the move limit");
            break;
        }

        let Some(accepted) = find_improving_move(&partition, target, boxes, config, on_event)
        else {
            // Dropped boxes and tare changes shift the mean. Only a scan against the
            // mean of the current boxes may end the search.
            let mean = partition.mean_weight();
            if mean == target {
                break;
            }
            debug!(from = target, to = mean, "weight target moved");
            target = mean;
            partition = partition.resplit(target, eps);
            continue;
        };
        let Move {
            underweight_idx,
            overweight_idx,
            lighter,
            heavier,
        } = accepted;

        partition.underweight[underweight_idx] = lighter;
        match heavier {
            Some(packed) => partition.overweight[overweight_idx] = packed,
            None => {
                partition.overweight.remove(overweight_idx);
            }
        }
        partition = partition.resplit(target, eps);

        moves += 1;
    }

    debug!(
        moves,
        weight_variance = partition.weight_variance(),
        "weight redistribution finished"
    );
    partition.into_solution()
}

fn sort_by_weight_desc(boxes: &mut [PackedBox]) {
    boxes.sort_by(|a, b| b.weight().total_cmp(&a.weight()));
}

/// Scans (underweight, overweight, item) triples and returns the first move that lowers
/// the weight variance.
fn find_improving_move(
    partition: &Partition,
    target: f64,
    boxes: &BoxList,
    config: &PackingConfig,
    on_event: &mut dyn FnMut(&PackEvent),
) -> Option<Move> {
    let eps = config.general_epsilon;
    let current_variance = partition.weight_variance();

    for (underweight_idx, lighter) in partition.underweight.iter().enumerate() {
        let lighter_weight = lighter.weight();
        let old_distance = (target - lighter_weight).abs();

        for (overweight_idx, heavier) in partition.overweight.iter().enumerate() {
            let mut tried: Vec<&Item> = Vec::new();

            for item in heavier.items().iter() {
                if tried.contains(&item) {
                    continue;
                }
                tried.push(item);

                let new_distance = (target - (lighter_weight + item.weight())).abs();
                if compare_with_epsilon(new_distance, old_distance, eps) == Ordering::Greater {
                    continue;
                }

                match try_move(lighter, heavier, item, boxes, config, on_event) {
                    Ok((new_lighter, new_heavier)) => {
                        let variance = variance_after(
                            partition,
                            (underweight_idx, &new_lighter),
                            (overweight_idx, new_heavier.as_ref()),
                        );
                        if variance + eps < current_variance {
                            debug!(
                                item = item.description(),
                                from = heavier.box_type().reference(),
                                to = new_lighter.box_type().reference(),
                                variance,
                                "move accepted"
                            );
                            on_event(&PackEvent::MoveAccepted {
                                description: item.description().to_string(),
                                from_reference: heavier.box_type().reference().to_string(),
                                to_reference: new_lighter.box_type().reference().to_string(),
                                weight_variance: variance,
                            });
                            return Some(Move {
                                underweight_idx,
                                overweight_idx,
                                lighter: new_lighter,
                                heavier: new_heavier,
                            });
                        }
                        reject(on_event, item, heavier, "weight variance would not decrease");
                    }
                    Err(reason) => reject(on_event, item, heavier, reason),
                }
            }
        }
    }

    None
}

fn reject(
    on_event: &mut dyn FnMut(&PackEvent),
    item: &Item,
    heavier: &PackedBox,
    reason: &'static str,
) {
    trace!(
        item = item.description(),
        from = heavier.box_type().reference(),
        reason,
        "move rejected"
    );
    on_event(&PackEvent::MoveRejected {
        description: item.description().to_string(),
        from_reference: heavier.box_type().reference().to_string(),
        reason: reason.to_string(),
    });
}

/// Re-solves both boxes for moving `item` from `heavier` into `lighter`.
///
/// Each side must still fit into a single box; an emptied heavier box yields `None`.
fn try_move(
    lighter: &PackedBox,
    heavier: &PackedBox,
    item: &Item,
    boxes: &BoxList,
    config: &PackingConfig,
    on_event: &mut dyn FnMut(&PackEvent),
) -> Result<(PackedBox, Option<PackedBox>), &'static str> {
    let mut lighter_items = lighter.items().clone();
    lighter_items.insert(item.clone());
    let new_lighter = resolve_single_box(lighter_items, boxes, config, on_event)?
        .ok_or("lighter box would be empty")?;

    let mut heavier_items = heavier.items().clone();
    if heavier_items.remove(item).is_none() {
        return Err("item is not in the heavier box");
    }
    let new_heavier = resolve_single_box(heavier_items, boxes, config, on_event)?;

    Ok((new_lighter, new_heavier))
}

fn resolve_single_box(
    items: ItemList,
    boxes: &BoxList,
    config: &PackingConfig,
    on_event: &mut dyn FnMut(&PackEvent),
) -> Result<Option<PackedBox>, &'static str> {
    let solution = match pack_by_volume(items, boxes, config, on_event) {
        Ok(solution) => solution,
        Err(err) => {
            // Both boxes came from a solution over the same catalog.
            warn!(%err, "re-solving a box during redistribution failed");
            return Err("re-solving failed");
        }
    };

    if solution.len() > 1 {
        return Err("items do not fit into a single box");
    }
    Ok(solution.into_iter().next())
}

fn variance_after(
    partition: &Partition,
    lighter: (usize, &PackedBox),
    heavier: (usize, Option<&PackedBox>),
) -> f64 {
    let under = partition
        .underweight
        .iter()
        .enumerate()
        .map(|(idx, packed)| if idx == lighter.0 { lighter.1 } else { packed });
    let over = partition
        .overweight
        .iter()
        .enumerate()
        .filter_map(|(idx, packed)| if idx == heavier.0 { heavier.1 } else { Some(packed) });
    weight_variance_of(partition.at_target.iter().chain(over).chain(under))
}
