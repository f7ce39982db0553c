//! Player state and player name rules.

use crate::connection::ConnectionId;
use log::warn;
use shared::commands::server::{ChangeInventorySlot, CharacterChange, CharacterCreate};
use shared::{CharIndex, Heading, MapId, Position};
use std::collections::HashSet;
use std::path::Path;

pub const INVENTORY_SLOTS: usize = 20;

const DEFAULT_BODY: u16 = 1;
const DEFAULT_HEAD: u16 = 1;
const NICK_COLOR_CITIZEN: u8 = 2;

/// Items every new character starts with: (slot, item id, amount).
const STARTING_ITEMS: [(usize, u16, u16); 3] = [(1, 1, 100), (2, 460, 1), (3, 38, 1)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventorySlot {
    pub item_id: u16,
    pub amount: u16,
    pub equipped: bool,
}

/// A logged-in character.
///
/// `map` is `None` only while the player is being moved between maps or has
/// not joined its first map yet. While it is `Some`, the map's occupancy
/// grid holds this player's index at `pos` and nowhere else.
#[derive(Debug, Clone)]
pub struct Player {
    pub name: String,
    pub char_index: CharIndex,
    pub connection: ConnectionId,
    pub map: Option<MapId>,
    pub pos: Position,
    pub heading: Heading,
    pub body: u16,
    pub head: u16,
    /// Slots are 1-based on the wire; index 0 here is slot 1.
    pub inventory: [Option<InventorySlot>; INVENTORY_SLOTS],
    /// Set when teardown starts so the player is destroyed once.
    pub closing: bool,
}

impl Player {
    /// A fresh character. The character index is assigned on registration.
    pub fn new(name: impl Into<String>, connection: ConnectionId, pos: Position) -> Self {
        let mut inventory = [None; INVENTORY_SLOTS];
        for (slot, item_id, amount) in STARTING_ITEMS {
            inventory[slot - 1] = Some(InventorySlot {
                item_id,
                amount,
                equipped: false,
            });
        }

        Self {
            name: name.into(),
            char_index: 0,
            connection,
            map: None,
            pos,
            heading: Heading::South,
            body: DEFAULT_BODY,
            head: DEFAULT_HEAD,
            inventory,
            closing: false,
        }
    }

    pub fn slot(&self, slot: u8) -> Option<&InventorySlot> {
        let index = usize::from(slot).checked_sub(1)?;
        self.inventory.get(index)?.as_ref()
    }

    /// Flips the equipped flag of an occupied slot and returns the new state.
    pub fn toggle_equipped(&mut self, slot: u8) -> Option<InventorySlot> {
        let index = usize::from(slot).checked_sub(1)?;
        let item = self.inventory.get_mut(index)?.as_mut()?;
        item.equipped = !item.equipped;
        Some(*item)
    }

    pub fn character_create(&self) -> CharacterCreate {
        CharacterCreate {
            char_index: self.char_index,
            body: self.body,
            head: self.head,
            heading: self.heading,
            x: self.pos.x,
            y: self.pos.y,
            weapon: 0,
            shield: 0,
            helmet: 0,
            fx: 0,
            fx_loops: 0,
            name: self.name.clone(),
            nick_color: NICK_COLOR_CITIZEN,
            privileges: 0,
        }
    }

    pub fn character_change(&self) -> CharacterChange {
        CharacterChange {
            char_index: self.char_index,
            body: self.body,
            head: self.head,
            heading: self.heading,
            weapon: 0,
            shield: 0,
            helmet: 0,
            fx: 0,
            fx_loops: 0,
        }
    }

    pub fn inventory_slot_update(&self, slot: u8) -> ChangeInventorySlot {
        let item = self.slot(slot).copied().unwrap_or(InventorySlot {
            item_id: 0,
            amount: 0,
            equipped: false,
        });
        ChangeInventorySlot {
            slot,
            item_id: item.item_id,
            amount: item.amount,
            equipped: item.equipped,
        }
    }
}

/// Why a requested name cannot be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameRejection {
    Length,
    Characters,
    Spacing,
    Forbidden,
}

impl std::fmt::Display for NameRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            NameRejection::Length => "names must be between 3 and 32 characters",
            NameRejection::Characters => "names may only contain letters and spaces",
            NameRejection::Spacing => "names cannot start, end or repeat spaces",
            NameRejection::Forbidden => "that name is not allowed",
        };
        f.write_str(reason)
    }
}

/// Name validation plus the configured list of forbidden names.
#[derive(Debug, Clone, Default)]
pub struct NameRules {
    forbidden: HashSet<String>,
}

impl NameRules {
    pub fn new<I, S>(forbidden: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            forbidden: forbidden
                .into_iter()
                .map(|name| name.as_ref().trim().to_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }

    /// Reads one forbidden name per line. A missing file means no
    /// forbidden names.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::new(text.lines()),
            Err(e) => {
                warn!("Cannot read forbidden names from {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn check(&self, name: &str) -> Result<(), NameRejection> {
        let len = name.chars().count();
        if !(3..=32).contains(&len) {
            return Err(NameRejection::Length);
        }
        if !name.chars().all(|c| c.is_ascii_alphabetic() || c == ' ') {
            return Err(NameRejection::Characters);
        }
        if name.starts_with(' ') || name.ends_with(' ') || name.contains("  ") {
            return Err(NameRejection::Spacing);
        }
        if self.forbidden.contains(&name.to_lowercase()) {
            return Err(NameRejection::Forbidden);
        }
        Ok(())
    }

    pub fn forbidden_count(&self) -> usize {
        self.forbidden.len()
    }
}
