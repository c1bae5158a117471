//! Display units: the recorded entries of the display list.
//!
//! Every streamed command becomes a [`DisplayUnit`] — either a style
//! attribute (mutates the current-style table) or a drawable (paints
//! pixels). Units live in an insertion-ordered arena addressed by stable
//! [`UnitId`]s. Ids are handed out by [`DisplayList::reserve`] before the
//! unit is constructed, so expensive builds (text layout, image decoding)
//! run without holding the list lock; a slot map resolves id to position
//! because pushes may complete out of reservation order. Units with an
//! indirect [`UnitKey`] are additionally indexed in a key map so
//! `update_by_key` finds them in O(1) and mutates in place instead of
//! appending. Units are never removed individually — only a full clear
//! drops them.

use std::sync::Arc;

use hashbrown::HashMap;

use crate::drawable::{DrawKind, Drawable};
use crate::style::StyleAttr;

/// Stable arena index of a display unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId(pub u32);

/// Client-chosen lookup key for indirect updates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnitKey {
    Str(String),
    Int(u64),
}

impl From<&str> for UnitKey {
    fn from(s: &str) -> Self {
        UnitKey::Str(s.to_owned())
    }
}

impl From<String> for UnitKey {
    fn from(s: String) -> Self {
        UnitKey::Str(s)
    }
}

impl From<u64> for UnitKey {
    fn from(n: u64) -> Self {
        UnitKey::Int(n)
    }
}

/// One streamed command, before it becomes a display unit.
#[derive(Debug, Clone)]
pub enum Command {
    /// Install a style attribute into the current-style table.
    Style(StyleAttr),
    /// Construct a drawable from the current style snapshot.
    Draw(DrawKind),
}

impl From<StyleAttr> for Command {
    fn from(attr: StyleAttr) -> Self {
        Command::Style(attr)
    }
}

impl From<DrawKind> for Command {
    fn from(kind: DrawKind) -> Self {
        Command::Draw(kind)
    }
}

/// A recorded style attribute entry.
#[derive(Debug, Clone)]
pub struct StyleUnit {
    pub id: UnitId,
    pub key: Option<UnitKey>,
    pub attr: StyleAttr,
}

/// One recorded display-list entry.
///
/// Closed over the two unit capabilities: configures-state (style) and
/// produces-pixels (drawable). Dispatch is by pattern match.
#[derive(Debug, Clone)]
pub enum DisplayUnit {
    Style(StyleUnit),
    Drawable(Arc<Drawable>),
}

impl DisplayUnit {
    pub fn id(&self) -> UnitId {
        match self {
            DisplayUnit::Style(s) => s.id,
            DisplayUnit::Drawable(d) => d.id(),
        }
    }

    pub fn key(&self) -> Option<&UnitKey> {
        match self {
            DisplayUnit::Style(s) => s.key.as_ref(),
            DisplayUnit::Drawable(d) => d.key(),
        }
    }
}

/// Ordered arena of display units plus the indirect-key index.
#[derive(Debug, Default)]
pub struct DisplayList {
    units: Vec<DisplayUnit>,
    slots: HashMap<UnitId, usize>,
    keys: HashMap<UnitKey, UnitId>,
    next: u32,
}

impl DisplayList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out the next id. Callers construct the unit afterwards,
    /// outside the list lock, and [`push`](Self::push) it when ready.
    pub fn reserve(&mut self) -> UnitId {
        let id = UnitId(self.next);
        self.next += 1;
        id
    }

    /// Appends a unit under its reserved id and indexes its key when
    /// present.
    pub fn push(&mut self, unit: DisplayUnit) -> UnitId {
        let id = unit.id();
        debug_assert!(!self.slots.contains_key(&id));
        if let Some(key) = unit.key() {
            self.keys.insert(key.clone(), id);
        }
        self.slots.insert(id, self.units.len());
        self.units.push(unit);
        id
    }

    pub fn get(&self, id: UnitId) -> Option<&DisplayUnit> {
        self.units.get(*self.slots.get(&id)?)
    }

    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut DisplayUnit> {
        let slot = *self.slots.get(&id)?;
        self.units.get_mut(slot)
    }

    /// O(1) lookup via the indirect key.
    pub fn lookup(&self, key: &UnitKey) -> Option<UnitId> {
        self.keys.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DisplayUnit> {
        self.units.iter()
    }

    /// Drops every unit and key. Only a full context clear calls this.
    pub fn clear(&mut self) {
        self.units.clear();
        self.slots.clear();
        self.keys.clear();
        self.next = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::style::{Brush, Color};

    fn style_unit(id: UnitId, key: Option<UnitKey>) -> DisplayUnit {
        DisplayUnit::Style(StyleUnit {
            id,
            key,
            attr: StyleAttr::Coordinates(Rect::new(0, 0, 10, 10)),
        })
    }

    fn append(list: &mut DisplayList, key: Option<UnitKey>) -> UnitId {
        let id = list.reserve();
        list.push(style_unit(id, key))
    }

    #[test]
    fn reserve_hands_out_sequential_ids() {
        let mut list = DisplayList::new();
        let a = append(&mut list, None);
        let b = append(&mut list, None);
        assert_eq!(a, UnitId(0));
        assert_eq!(b, UnitId(1));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn out_of_order_pushes_stay_addressable() {
        let mut list = DisplayList::new();
        let a = list.reserve();
        let b = list.reserve();
        // b finishes building first
        list.push(style_unit(b, Some("late".into())));
        list.push(style_unit(a, None));

        assert_eq!(list.get(a).map(DisplayUnit::id), Some(a));
        assert_eq!(list.get(b).map(DisplayUnit::id), Some(b));
        assert_eq!(list.lookup(&"late".into()), Some(b));
        // paint order is push order, not id order
        let order: Vec<UnitId> = list.iter().map(DisplayUnit::id).collect();
        assert_eq!(order, vec![b, a]);
    }

    #[test]
    fn keyed_units_are_found_in_the_index() {
        let mut list = DisplayList::new();
        append(&mut list, None);
        let id = append(&mut list, Some("box".into()));

        assert_eq!(list.lookup(&"box".into()), Some(id));
        assert_eq!(list.lookup(&"missing".into()), None);
    }

    #[test]
    fn integer_and_string_keys_coexist() {
        let mut list = DisplayList::new();
        let a = append(&mut list, Some(7u64.into()));
        let b = append(&mut list, Some("7".into()));
        assert_ne!(a, b);
        assert_eq!(list.lookup(&7u64.into()), Some(a));
        assert_eq!(list.lookup(&"7".into()), Some(b));
    }

    #[test]
    fn clear_drops_units_and_keys() {
        let mut list = DisplayList::new();
        append(&mut list, Some("box".into()));
        list.clear();

        assert!(list.is_empty());
        assert_eq!(list.lookup(&"box".into()), None);
        // ids restart from zero after a clear
        assert_eq!(list.reserve(), UnitId(0));
    }

    #[test]
    fn commands_convert_from_attrs() {
        let cmd: Command = StyleAttr::Fill(Brush::Solid(Color::BLACK)).into();
        assert!(matches!(cmd, Command::Style(_)));
    }
}
