//! Ordered containers for items, box types and packed boxes.
//!
//! `ItemList` hands out items largest first, `BoxList` hands out box types smallest
//! first. Both break ties by insertion order, so iterating the same input twice always
//! yields the same sequence. `PackedBoxList` is a plain sequence of packed boxes with
//! weight statistics and a "best box" selection used by the volume packer.

use std::cmp::Ordering;

use crate::model::{BoxType, Item, PackedBox};
use crate::types::{Dimensional, Weighted};

/// Sorted storage shared by `ItemList` and `BoxList`.
///
/// The vector is kept in reverse pop order so that popping is `Vec::pop`.
#[derive(Clone, Debug)]
struct Ranked<T> {
    entries: Vec<(u64, T)>,
    next_seq: u64,
    order: fn(&T, &T) -> Ordering,
}

impl<T> Ranked<T> {
    fn new(order: fn(&T, &T) -> Ordering) -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 0,
            order,
        }
    }

    fn pops_before(&self, a: &(u64, T), b: &(u64, T)) -> bool {
        (self.order)(&a.1, &b.1).then(a.0.cmp(&b.0)) == Ordering::Less
    }

    fn insert(&mut self, value: T) {
        let entry = (self.next_seq, value);
        self.next_seq += 1;
        let idx = self
            .entries
            .partition_point(|existing| self.pops_before(&entry, existing));
        self.entries.insert(idx, entry);
    }

    fn pop(&mut self) -> Option<T> {
        self.entries.pop().map(|(_, value)| value)
    }

    fn peek(&self) -> Option<&T> {
        self.entries.last().map(|(_, value)| value)
    }

    fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter().rev().map(|(_, value)| value)
    }

    fn remove_where(&mut self, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        let idx = self.entries.iter().rposition(|(_, value)| predicate(value))?;
        Some(self.entries.remove(idx).1)
    }
}

/// Items pop in this order: larger volume first, then heavier, then earlier inserted.
fn largest_first(a: &Item, b: &Item) -> Ordering {
    b.volume()
        .total_cmp(&a.volume())
        .then_with(|| b.weight().total_cmp(&a.weight()))
}

/// Box types pop in this order: smaller interior volume first, then lower max weight.
fn smallest_first(a: &BoxType, b: &BoxType) -> Ordering {
    a.volume()
        .total_cmp(&b.volume())
        .then_with(|| a.max_weight().total_cmp(&b.max_weight()))
}

/// Multiset of items, iterated and popped largest first.
#[derive(Clone, Debug)]
pub struct ItemList {
    inner: Ranked<Item>,
}

impl ItemList {
    pub fn new() -> Self {
        Self {
            inner: Ranked::new(largest_first),
        }
    }

    pub fn insert(&mut self, item: Item) {
        self.inner.insert(item);
    }

    /// Removes and returns the largest item.
    pub fn pop(&mut self) -> Option<Item> {
        self.inner.pop()
    }

    /// The largest item, without removing it.
    pub fn peek(&self) -> Option<&Item> {
        self.inner.peek()
    }

    /// Removes one item equal to `item`, returning it if present.
    pub fn remove(&mut self, item: &Item) -> Option<Item> {
        self.inner.remove_where(|candidate| candidate == item)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Iterates largest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Item> + ExactSizeIterator {
        self.inner.iter()
    }
}

impl Default for ItemList {
    fn default() -> Self {
        Self::new()
    }
}

/// Two lists are equal when they yield the same items in the same order.
impl PartialEq for ItemList {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl FromIterator<Item> for ItemList {
    fn from_iter<I: IntoIterator<Item = Item>>(iter: I) -> Self {
        let mut list = Self::new();
        list.extend(iter);
        list
    }
}

impl Extend<Item> for ItemList {
    fn extend<I: IntoIterator<Item = Item>>(&mut self, iter: I) {
        for item in iter {
            self.insert(item);
        }
    }
}

impl From<Vec<Item>> for ItemList {
    fn from(items: Vec<Item>) -> Self {
        items.into_iter().collect()
    }
}

impl From<ItemList> for Vec<Item> {
    fn from(list: ItemList) -> Self {
        let mut entries = list.inner.entries;
        entries.reverse();
        entries.into_iter().map(|(_, item)| item).collect()
    }
}

/// Catalog of box types, iterated and popped smallest first.
#[derive(Clone, Debug)]
pub struct BoxList {
    inner: Ranked<BoxType>,
}

impl BoxList {
    pub fn new() -> Self {
        Self {
            inner: Ranked::new(smallest_first),
        }
    }

    pub fn insert(&mut self, box_type: BoxType) {
        self.inner.insert(box_type);
    }

    /// Removes and returns the smallest box type.
    pub fn pop(&mut self) -> Option<BoxType> {
        self.inner.pop()
    }

    pub fn peek(&self) -> Option<&BoxType> {
        self.inner.peek()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Iterates smallest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &BoxType> + ExactSizeIterator {
        self.inner.iter()
    }
}

impl Default for BoxList {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<BoxType> for BoxList {
    fn from_iter<I: IntoIterator<Item = BoxType>>(iter: I) -> Self {
        let mut list = Self::new();
        for box_type in iter {
            list.insert(box_type);
        }
        list
    }
}

impl From<Vec<BoxType>> for BoxList {
    fn from(boxes: Vec<BoxType>) -> Self {
        boxes.into_iter().collect()
    }
}

/// `true` if `a` is a strictly better pick than `b`: more items, or as many items in a
/// smaller box.
fn packs_better(a: &PackedBox, b: &PackedBox) -> bool {
    match a.item_count().cmp(&b.item_count()) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => a.box_type().volume() < b.box_type().volume(),
    }
}

/// A packing solution: a sequence of packed boxes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PackedBoxList {
    boxes: Vec<PackedBox>,
}

impl PackedBoxList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a packed box at the end of the sequence.
    pub fn insert(&mut self, packed: PackedBox) {
        self.boxes.push(packed);
    }

    /// Appends all boxes of `boxes`, keeping their order.
    pub fn extend_from_vec(&mut self, boxes: Vec<PackedBox>) {
        self.boxes.extend(boxes);
    }

    /// Index of the box that packs the most items (ties: smaller box, then earlier).
    fn best_index(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (idx, candidate) in self.boxes.iter().enumerate() {
            match best {
                Some(current) if !packs_better(candidate, &self.boxes[current]) => {}
                _ => best = Some(idx),
            }
        }
        best
    }

    /// Removes and returns the box that packs the most items.
    pub fn pop_best(&mut self) -> Option<PackedBox> {
        self.best_index().map(|idx| self.boxes.remove(idx))
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PackedBox> {
        self.boxes.iter()
    }

    pub fn into_vec(self) -> Vec<PackedBox> {
        self.boxes
    }

    /// Total number of items across all boxes.
    pub fn item_count(&self) -> usize {
        self.boxes.iter().map(PackedBox::item_count).sum()
    }

    /// Mean gross weight per box, `0.0` for an empty list.
    pub fn mean_weight(&self) -> f64 {
        mean_weight_of(&self.boxes)
    }

    /// Population variance of the gross box weights.
    pub fn weight_variance(&self) -> f64 {
        weight_variance_of(&self.boxes)
    }
}

pub(crate) fn mean_weight_of<'a>(boxes: impl IntoIterator<Item = &'a PackedBox>) -> f64 {
    let (sum, count) = boxes
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), b| (sum + b.weight(), count + 1));
    if count == 0 {
        return 0.0;
    }
    sum / count as f64
}

pub(crate) fn weight_variance_of<'a>(
    boxes: impl IntoIterator<Item = &'a PackedBox> + Clone,
) -> f64 {
    let mean = mean_weight_of(boxes.clone());
    let (sum, count) = boxes.into_iter().fold((0.0, 0usize), |(sum, count), b| {
        (sum + (b.weight() - mean).powi(2), count + 1)
    });
    if count == 0 {
        return 0.0;
    }
    sum / count as f64
}

impl From<Vec<PackedBox>> for PackedBoxList {
    fn from(boxes: Vec<PackedBox>) -> Self {
        Self { boxes }
    }
}

impl FromIterator<PackedBox> for PackedBoxList {
    fn from_iter<I: IntoIterator<Item = PackedBox>>(iter: I) -> Self {
        Self {
            boxes: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for PackedBoxList {
    type Item = PackedBox;
    type IntoIter = std::vec::IntoIter<PackedBox>;

    fn into_iter(self) -> Self::IntoIter {
        self.boxes.into_iter()
    }
}

impl<'a> IntoIterator for &'a PackedBoxList {
    type Item = &'a PackedBox;
    type IntoIter = std::slice::Iter<'a, PackedBox>;

    fn into_iter(self) -> Self::IntoIter {
        self.boxes.iter()
    }
}
