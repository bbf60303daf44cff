//! Reachability analysis.
//!
//! Objects are live when a chain of references leads to them from the trailer or from a number
//! the caller asked to retain. Object types are never inspected, so page tree nodes without a
//! `/Type` survive like any other reachable object.

use std::collections::BTreeSet;

use log::debug;

use crate::{Document, Object, ObjectId};

/// Object numbers the caller wants kept even when nothing references them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RetainSet(BTreeSet<u32>);

impl RetainSet {
    pub fn new() -> RetainSet {
        RetainSet::default()
    }

    pub fn insert(&mut self, number: u32) -> bool {
        self.0.insert(number)
    }

    pub fn contains(&self, number: u32) -> bool {
        self.0.contains(&number)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<u32> for RetainSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        RetainSet(iter.into_iter().collect())
    }
}

/// The identifiers found reachable, in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSet(BTreeSet<ObjectId>);

impl LiveSet {
    pub fn contains(&self, id: ObjectId) -> bool {
        self.0.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.0.iter().copied()
    }
}

/// Collect every reference held directly by `object`, descending into arrays, dictionaries and
/// stream dictionaries but not through other references.
fn collect_references(object: &Object, references: &mut Vec<ObjectId>) {
    let mut pending = vec![object];
    while let Some(object) = pending.pop() {
        match object {
            Object::Reference(id) => references.push(*id),
            Object::Array(array) => pending.extend(array.iter().rev()),
            Object::Dictionary(dict) => pending.extend(dict.iter().map(|(_, value)| value)),
            Object::Stream(stream) => pending.extend(stream.dict.iter().map(|(_, value)| value)),
            _ => {}
        }
    }
}

/// Compute the live set of `document`.
///
/// Roots are the trailer's `/Root` and `/Info` entries, the only references a compacted trailer
/// carries, plus every retained number present in the document. References resolve leniently
/// through [`Document::resolve_id`]; dangling references are skipped. Streams recorded as
/// unreadable are marked live when referenced so that the rewriter can report them.
pub fn live_objects(document: &Document, retain: &RetainSet) -> LiveSet {
    let mut pending = Vec::new();
    for key in [&b"Root"[..], b"Info"] {
        if let Ok(value) = document.trailer.get(key) {
            collect_references(value, &mut pending);
        }
    }
    for number in retain.iter() {
        let found = document
            .objects
            .range((number, 0)..=(number, u16::MAX))
            .next()
            .map(|(id, _)| *id)
            .or_else(|| {
                document
                    .unreadable_streams
                    .range((number, 0)..=(number, u16::MAX))
                    .next()
                    .map(|(id, _)| *id)
            });
        match found {
            Some(id) => pending.push(id),
            None => debug!("retained object {number} is not in the document"),
        }
    }

    let mut live = BTreeSet::new();
    let mut references = Vec::new();
    while let Some(id) = pending.pop() {
        let Some(id) = resolve(document, id) else {
            debug!("dangling reference to {} {}", id.0, id.1);
            continue;
        };
        if !live.insert(id) {
            continue;
        }
        if let Some(object) = document.objects.get(&id) {
            collect_references(object, &mut references);
            pending.append(&mut references);
        }
    }
    LiveSet(live)
}

fn resolve(document: &Document, id: ObjectId) -> Option<ObjectId> {
    document.resolve_id(id).or_else(|| {
        if document.unreadable_streams.contains_key(&id) {
            return Some(id);
        }
        document
            .unreadable_streams
            .range((id.0, 0)..=(id.0, u16::MAX))
            .next()
            .map(|(id, _)| *id)
    })
}
