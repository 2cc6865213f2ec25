//! Logical positions
//!
//! An [`Anchor`] wraps a yrs `StickyIndex`: a position encoded against the
//! document structure instead of a numeric offset, so it keeps pointing at
//! the same character while other peers edit around it.
//!
//! Absolute positions follow the structural convention used by the editor:
//! entering an element counts one, every text unit counts one, leaving an
//! element counts one. Children of the root start at zero.
//!
//! ```text
//!   0   1 2 3 4 5 6   7
//!   <p>  H e l l o  </p>
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use yrs::branch::{Branch, BranchID};
use yrs::types::xml::XmlOut;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{
    Assoc, IndexedSequence, ReadTxn, StickyIndex, Text, XmlElementRef, XmlFragment,
    XmlFragmentRef, XmlTextRef,
};

use crate::shared::document::ReplicatedDocument;
use crate::shared::error::DocumentError;

/// A stable logical position in a replicated document
#[derive(Debug, Clone)]
pub struct Anchor {
    index: StickyIndex,
}

/// Where an absolute position lands in the tree
enum Location {
    Text(XmlTextRef, u32),
    Root(u32),
    Element(XmlElementRef, u32),
}

impl Anchor {
    /// Anchor the given absolute position
    ///
    /// `Assoc::After` sticks to the character following the position,
    /// `Assoc::Before` to the one preceding it. Range starts usually use
    /// `After` and range ends `Before`, so text typed at either edge stays
    /// outside the range.
    ///
    /// At the end of a container nothing follows the position, so an
    /// `After` anchor there sticks to the preceding character instead, or
    /// to the end of the document at the root.
    pub fn at(document: &ReplicatedDocument, position: u32, assoc: Assoc) -> Result<Self, DocumentError> {
        let txn = document.transact();
        let location = locate(&txn, document.root(), position)?;

        let index = match &location {
            Location::Text(run, offset) => run.sticky_index(&txn, *offset, assoc),
            Location::Root(index) => document.root().sticky_index(&txn, *index, assoc),
            Location::Element(element, index) => element.sticky_index(&txn, *index, assoc),
        };

        // Nothing follows the position inside its container
        let index = index.or_else(|| match &location {
            Location::Root(_) => Some(StickyIndex::from_type(&txn, document.root(), Assoc::After)),
            Location::Text(run, offset) => run.sticky_index(&txn, *offset, Assoc::Before),
            Location::Element(element, index) => element.sticky_index(&txn, *index, Assoc::Before),
        });

        index
            .map(|index| Self { index })
            .ok_or_else(|| DocumentError::stale_anchor(format!("cannot anchor position {}", position)))
    }

    /// Resolve this anchor to a current absolute position
    ///
    /// Fails when the anchored character was deleted or the node holding it
    /// is no longer part of the document. A failed resolution is never
    /// clamped to a neighbouring position.
    pub fn resolve(&self, document: &ReplicatedDocument) -> Result<u32, DocumentError> {
        let txn = document.transact();

        if let Some(id) = self.index.id() {
            if txn.snapshot().delete_set.is_deleted(id) {
                return Err(DocumentError::stale_anchor(format!(
                    "anchored content {:?} was deleted",
                    id
                )));
            }
        }

        let offset = self
            .index
            .get_offset(&txn)
            .ok_or_else(|| DocumentError::stale_anchor("anchor no longer resolves"))?;

        let target = offset.branch.id();
        absolute_position(&txn, document.root(), &target, offset.index)
            .ok_or_else(|| DocumentError::stale_anchor("anchored node was removed from the document"))
    }

    /// Binary form exchanged with clients
    pub fn encode(&self) -> Vec<u8> {
        self.index.encode_v1()
    }

    /// Decode an anchor produced by [`Anchor::encode`] or by a client
    pub fn decode(bytes: &[u8]) -> Result<Self, DocumentError> {
        let index = StickyIndex::decode_v1(bytes).map_err(|e| DocumentError::decode(e.to_string()))?;
        Ok(Self { index })
    }
}

impl Serialize for Anchor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.encode().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Anchor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        Anchor::decode(&bytes).map_err(serde::de::Error::custom)
    }
}

/// A pair of anchors delimiting a span, end exclusive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorRange {
    pub start: Anchor,
    pub end: Anchor,
}

impl AnchorRange {
    /// Anchor `[from, to)` so the range neither grows nor shrinks when text
    /// is typed at its edges
    pub fn between(document: &ReplicatedDocument, from: u32, to: u32) -> Result<Self, DocumentError> {
        Ok(Self {
            start: Anchor::at(document, from, Assoc::After)?,
            end: Anchor::at(document, to, Assoc::Before)?,
        })
    }

    /// Resolve both ends; a reversed range is an error
    pub fn resolve(&self, document: &ReplicatedDocument) -> Result<(u32, u32), DocumentError> {
        let start = self.start.resolve(document)?;
        let end = self.end.resolve(document)?;
        if start > end {
            return Err(DocumentError::InvalidRange { start, end });
        }
        Ok((start, end))
    }
}

/// Structural size of an element: open + content + close
pub(crate) fn node_size<T: ReadTxn>(txn: &T, element: &XmlElementRef) -> u32 {
    2 + content_size(txn, element)
}

/// Structural size of a container's children
pub(crate) fn content_size<T: ReadTxn, F: XmlFragment>(txn: &T, parent: &F) -> u32 {
    parent
        .children(txn)
        .map(|child| match child {
            XmlOut::Text(run) => run.len(txn),
            XmlOut::Element(element) => node_size(txn, &element),
            XmlOut::Fragment(_) => 0,
        })
        .sum()
}

fn locate<T: ReadTxn>(txn: &T, root: &XmlFragmentRef, position: u32) -> Result<Location, DocumentError> {
    match locate_in(txn, root, position)? {
        Found::Text(run, offset) => Ok(Location::Text(run, offset)),
        Found::Child(None, index) => Ok(Location::Root(index)),
        Found::Child(Some(element), index) => Ok(Location::Element(element, index)),
    }
}

enum Found {
    Text(XmlTextRef, u32),
    Child(Option<XmlElementRef>, u32),
}

fn locate_in<T: ReadTxn, F: XmlFragment>(txn: &T, parent: &F, position: u32) -> Result<Found, DocumentError> {
    let mut remaining = position;
    let children: Vec<XmlOut> = parent.children(txn).collect();
    let count = children.len() as u32;

    for (index, child) in children.into_iter().enumerate() {
        let is_last = index as u32 + 1 == count;
        match child {
            XmlOut::Text(run) => {
                let len = run.len(txn);
                // The end of a run followed by a sibling is the slot before that sibling
                if remaining < len || (remaining == len && is_last) {
                    return Ok(Found::Text(run, remaining));
                }
                remaining -= len;
            }
            XmlOut::Element(element) => {
                if remaining == 0 {
                    return Ok(Found::Child(None, index as u32));
                }
                let size = node_size(txn, &element);
                if remaining < size {
                    return match locate_in(txn, &element, remaining - 1)? {
                        Found::Child(None, child_index) => Ok(Found::Child(Some(element), child_index)),
                        found => Ok(found),
                    };
                }
                remaining -= size;
            }
            XmlOut::Fragment(_) => {}
        }
    }

    if remaining == 0 {
        Ok(Found::Child(None, count))
    } else {
        Err(DocumentError::InvalidRange {
            start: position,
            end: position - remaining,
        })
    }
}

fn absolute_position<T: ReadTxn>(
    txn: &T,
    root: &XmlFragmentRef,
    target: &BranchID,
    index: u32,
) -> Option<u32> {
    if &AsRef::<Branch>::as_ref(root).id() == target {
        return Some(child_offset(txn, root, index));
    }
    position_within(txn, root, target, index, 0)
}

fn position_within<T: ReadTxn, F: XmlFragment>(
    txn: &T,
    parent: &F,
    target: &BranchID,
    index: u32,
    base: u32,
) -> Option<u32> {
    let mut position = base;
    for child in parent.children(txn) {
        match child {
            XmlOut::Text(run) => {
                let len = run.len(txn);
                if &AsRef::<Branch>::as_ref(&run).id() == target {
                    return (index <= len).then_some(position + index);
                }
                position += len;
            }
            XmlOut::Element(element) => {
                if &AsRef::<Branch>::as_ref(&element).id() == target {
                    return Some(position + 1 + child_offset(txn, &element, index));
                }
                if let Some(found) = position_within(txn, &element, target, index, position + 1) {
                    return Some(found);
                }
                position += node_size(txn, &element);
            }
            XmlOut::Fragment(_) => {}
        }
    }
    None
}

/// Structural offset of the `index`-th child within its parent's content
fn child_offset<T: ReadTxn, F: XmlFragment>(txn: &T, parent: &F, index: u32) -> u32 {
    parent
        .children(txn)
        .take(index as usize)
        .map(|child| match child {
            XmlOut::Text(run) => run.len(txn),
            XmlOut::Element(element) => node_size(txn, &element),
            XmlOut::Fragment(_) => 0,
        })
        .sum()
}
