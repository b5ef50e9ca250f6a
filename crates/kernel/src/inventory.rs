use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_INVENTORY_SLOTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl InventoryItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("inventory is full ({max_slots} slots)")]
    Full { max_slots: usize },
    #[error("item '{item_id}' is already held")]
    AlreadyHeld { item_id: String },
}

/// The player's carried items, in pickup order.
#[derive(Debug, Clone)]
pub struct Inventory {
    max_slots: usize,
    items: Vec<InventoryItem>,
}

impl Default for Inventory {
    fn default() -> Self {
        Self::with_slots(DEFAULT_INVENTORY_SLOTS)
    }
}

impl Inventory {
    pub fn with_slots(max_slots: usize) -> Self {
        Self {
            max_slots,
            items: Vec::new(),
        }
    }

    pub fn add_item(&mut self, item: InventoryItem) -> Result<(), InventoryError> {
        if self.items.len() >= self.max_slots {
            warn!(item_id = %item.id, max_slots = self.max_slots, "inventory_full");
            return Err(InventoryError::Full {
                max_slots: self.max_slots,
            });
        }
        if self.has_item(&item.id) {
            warn!(item_id = %item.id, "inventory_duplicate_item");
            return Err(InventoryError::AlreadyHeld { item_id: item.id });
        }
        info!(item_id = %item.id, "inventory_item_added");
        self.items.push(item);
        Ok(())
    }

    pub fn has_item(&self, item_id: &str) -> bool {
        self.items.iter().any(|item| item.id == item_id)
    }

    /// Removes and returns the item, if held.
    pub fn remove_item(&mut self, item_id: &str) -> Option<InventoryItem> {
        let index = self.items.iter().position(|item| item.id == item_id)?;
        info!(item_id, "inventory_item_removed");
        Some(self.items.remove(index))
    }

    pub fn items(&self) -> &[InventoryItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_has_remove() {
        let mut inventory = Inventory::default();
        inventory
            .add_item(InventoryItem::new("DoorKey1", "Rusty key"))
            .expect("add");
        assert!(inventory.has_item("DoorKey1"));

        let removed = inventory.remove_item("DoorKey1").expect("held");
        assert_eq!(removed.name, "Rusty key");
        assert!(!inventory.has_item("DoorKey1"));
        assert!(inventory.remove_item("DoorKey1").is_none());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut inventory = Inventory::default();
        inventory
            .add_item(InventoryItem::new("matches", "Matches"))
            .expect("add");
        assert_eq!(
            inventory.add_item(InventoryItem::new("matches", "More matches")),
            Err(InventoryError::AlreadyHeld {
                item_id: "matches".to_string()
            })
        );
        assert_eq!(inventory.len(), 1);
    }

    #[test]
    fn full_inventory_rejects_new_items() {
        let mut inventory = Inventory::with_slots(2);
        inventory.add_item(InventoryItem::new("a", "A")).expect("a");
        inventory.add_item(InventoryItem::new("b", "B")).expect("b");
        assert_eq!(
            inventory.add_item(InventoryItem::new("c", "C")),
            Err(InventoryError::Full { max_slots: 2 })
        );
    }
}
