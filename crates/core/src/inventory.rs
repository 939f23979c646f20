//! Slot inventory used as the resource pool behind pickups.
//!
//! Stacks merge before empty slots are used; consumption drains slots in order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Item identifier referencing the item catalog.
pub type ItemId = u16;

/// Stack size used for items without an explicit limit.
pub const DEFAULT_STACK_SIZE: u32 = 64;

/// Number of slots in a character inventory.
pub const DEFAULT_SLOT_COUNT: usize = 8;

/// Resource source consumed by reload and pickup flows.
///
/// Implementations are treated as already consistent; operations never fail,
/// they report how much actually moved.
pub trait ResourcePool {
    /// Remove up to `amount` of `item`, returning the amount removed.
    fn consume(&mut self, item: ItemId, amount: u32) -> u32;
    /// Insert `amount` of `item`, returning the amount that did not fit.
    fn add(&mut self, item: ItemId, amount: u32) -> u32;
    /// Total amount of `item` held.
    fn count(&self, item: ItemId) -> u32;
}

/// A stack of identical items in one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    /// Item type identifier.
    pub item_id: ItemId,
    /// Number of items in this stack.
    pub count: u32,
}

impl ItemStack {
    /// Create a new item stack.
    pub fn new(item_id: ItemId, count: u32) -> Self {
        Self { item_id, count }
    }
}

/// Fixed-slot inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    slots: Vec<Option<ItemStack>>,
    stack_limits: BTreeMap<ItemId, u32>,
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new(DEFAULT_SLOT_COUNT)
    }
}

impl Inventory {
    /// Create an empty inventory with `slot_count` slots.
    pub fn new(slot_count: usize) -> Self {
        Self {
            slots: vec![None; slot_count],
            stack_limits: BTreeMap::new(),
        }
    }

    /// Override the stack size for an item (minimum 1).
    pub fn with_stack_limit(mut self, item: ItemId, limit: u32) -> Self {
        self.stack_limits.insert(item, limit.max(1));
        self
    }

    /// Maximum stack size for `item`.
    pub fn stack_limit(&self, item: ItemId) -> u32 {
        self.stack_limits
            .get(&item)
            .copied()
            .unwrap_or(DEFAULT_STACK_SIZE)
    }

    /// Get an item stack from a slot.
    pub fn get(&self, slot: usize) -> Option<&ItemStack> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Number of slots.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Remaining room for `item` across merging stacks and empty slots.
    pub fn space_for(&self, item: ItemId) -> u32 {
        let limit = self.stack_limit(item);
        self.slots
            .iter()
            .map(|slot| match slot {
                Some(stack) if stack.item_id == item => limit.saturating_sub(stack.count),
                Some(_) => 0,
                None => limit,
            })
            .sum()
    }
}

impl ResourcePool for Inventory {
    fn consume(&mut self, item: ItemId, amount: u32) -> u32 {
        let mut remaining = amount;

        for slot in &mut self.slots {
            if remaining == 0 {
                break;
            }
            if let Some(stack) = slot {
                if stack.item_id == item {
                    let removed = stack.count.min(remaining);
                    stack.count -= removed;
                    remaining -= removed;
                    if stack.count == 0 {
                        *slot = None;
                    }
                }
            }
        }

        amount - remaining
    }

    fn add(&mut self, item: ItemId, amount: u32) -> u32 {
        let limit = self.stack_limit(item);
        let mut remaining = amount;

        // Merge into existing stacks first.
        for stack in self.slots.iter_mut().flatten() {
            if remaining == 0 {
                return 0;
            }
            if stack.item_id == item && stack.count < limit {
                let added = remaining.min(limit - stack.count);
                stack.count += added;
                remaining -= added;
            }
        }

        // Then fill empty slots.
        for slot in &mut self.slots {
            if remaining == 0 {
                break;
            }
            if slot.is_none() {
                let added = remaining.min(limit);
                *slot = Some(ItemStack::new(item, added));
                remaining -= added;
            }
        }

        remaining
    }

    fn count(&self, item: ItemId) -> u32 {
        self.slots
            .iter()
            .flatten()
            .filter(|stack| stack.item_id == item)
            .map(|stack| stack.count)
            .sum()
    }
}
