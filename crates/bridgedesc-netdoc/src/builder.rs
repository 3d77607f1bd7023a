//! The descriptor builder: an append-only text assembler that supports
//! inline placeholders filled in once dependent information (a scrubbed
//! address, say, which needs the fingerprint that appears later in the
//! document) becomes available.

use std::cell::RefCell;
use std::rc::Rc;

/// A handle to a placeholder slot inside a [`DocBuilder`].
///
/// Cloning a `Slot` gives another handle to the same underlying cell; filling
/// it through any handle updates what the builder serializes. An unfilled
/// slot serializes as an empty string.
#[derive(Clone, Debug)]
pub struct Slot(Rc<RefCell<String>>);

impl Slot {
    /// Fill this slot with its final value.
    pub fn fill(&self, value: impl Into<String>) {
        *self.0.borrow_mut() = value.into();
    }
}

impl From<&Slot> for Fragment {
    fn from(slot: &Slot) -> Self {
        Fragment::Slot(Rc::clone(&slot.0))
    }
}

/// One piece of a document under construction.
#[derive(Clone, Debug)]
enum Fragment {
    /// Fixed text, known at the time it was appended.
    Literal(String),
    /// A placeholder to be filled later.
    Slot(Rc<RefCell<String>>),
}

/// An append-only text assembler for sanitized documents.
///
/// Fragments and filled placeholders concatenate in insertion order when
/// [`to_bytes`](Self::to_bytes) is called.
#[derive(Default, Debug)]
pub struct DocBuilder {
    /// Fragments in insertion order.
    fragments: Vec<Fragment>,
}

impl DocBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        DocBuilder::default()
    }

    /// Append literal text.
    pub fn append(&mut self, text: impl AsRef<str>) -> &mut Self {
        self.fragments.push(Fragment::Literal(text.as_ref().to_string()));
        self
    }

    /// Append a single space.
    pub fn space(&mut self) -> &mut Self {
        self.append(" ")
    }

    /// Append a line terminator (`LF`).
    pub fn new_line(&mut self) -> &mut Self {
        self.append("\n")
    }

    /// Insert a new placeholder slot at the current position and return a
    /// handle to it. The caller fills the handle once the dependent value is
    /// known; if it's never filled, the slot serializes as empty text.
    pub fn append_slot(&mut self) -> Slot {
        let cell = Rc::new(RefCell::new(String::new()));
        self.fragments.push(Fragment::Slot(Rc::clone(&cell)));
        Slot(cell)
    }

    /// Insert an existing [`Slot`] handle at the current position: filling
    /// it (through any handle) updates every position it was inserted at.
    /// Used when the same dependent value must appear at two places in a
    /// document, e.g. a bridge's own scrubbed address repeated in a
    /// self-`reject` line.
    pub fn append_existing_slot(&mut self, slot: &Slot) -> &mut Self {
        self.fragments.push(Fragment::from(slot));
        self
    }

    /// Whether anything has been appended yet.
    pub fn has_content(&self) -> bool {
        !self.fragments.is_empty()
    }

    /// Serialize all fragments (including filled placeholders) in insertion
    /// order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for frag in &self.fragments {
            match frag {
                Fragment::Literal(s) => out.extend_from_slice(s.as_bytes()),
                Fragment::Slot(cell) => out.extend_from_slice(cell.borrow().as_bytes()),
            }
        }
        out
    }

    /// Serialize to a `String`. Panics if the accumulated bytes are not
    /// valid UTF-8, which cannot happen given this builder only ever
    /// receives `&str` input.
    pub fn to_string_lossless(&self) -> String {
        String::from_utf8(self.to_bytes()).expect("DocBuilder fragments are always valid UTF-8")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unfilled_slot_is_empty() {
        let mut b = DocBuilder::new();
        b.append("router ").append_slot();
        b.append(" 9001");
        assert_eq!(b.to_string_lossless(), "router  9001");
    }

    #[test]
    fn filled_slot_appears_in_place() {
        let mut b = DocBuilder::new();
        b.append("router ");
        let slot = b.append_slot();
        b.append(" 9001");
        slot.fill("10.1.2.3");
        assert_eq!(b.to_string_lossless(), "router 10.1.2.3 9001");
    }

    #[test]
    fn cloned_handle_fills_same_slot() {
        let mut b = DocBuilder::new();
        let slot = b.append_slot();
        let clone = slot.clone();
        clone.fill("x");
        assert_eq!(b.to_string_lossless(), "x");
    }

    #[test]
    fn existing_slot_reused_at_second_position() {
        let mut b = DocBuilder::new();
        let slot = b.append_slot();
        b.append(" / ");
        b.append_existing_slot(&slot);
        slot.fill("X");
        assert_eq!(b.to_string_lossless(), "X / X");
    }

    #[test]
    fn has_content_tracks_appends() {
        let b = DocBuilder::new();
        assert!(!b.has_content());
        let mut b = DocBuilder::new();
        b.new_line();
        assert!(b.has_content());
    }
}
