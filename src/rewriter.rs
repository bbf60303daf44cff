//! Dense renumbering and stream re-encoding of the live objects.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::analyzer::LiveSet;
use crate::budget::MemoryBudget;
use crate::filters;
use crate::options::{CleanOptions, StreamPolicy};
use crate::xref::{Xref, XrefType};
use crate::{Dictionary, Document, Error, Object, ObjectId, Result, Stream};

/// Old identifier to new identifier. New numbers run from 1 in ascending order of the old
/// numbers, all with generation 0.
#[derive(Debug, Clone, Default)]
pub struct RewriteMap(BTreeMap<ObjectId, ObjectId>);

impl RewriteMap {
    pub fn new(live: &LiveSet) -> RewriteMap {
        RewriteMap(live.iter().zip(1..).map(|(old, number)| (old, (number, 0))).collect())
    }

    pub fn get(&self, old: ObjectId) -> Option<ObjectId> {
        self.0.get(&old).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, ObjectId)> + '_ {
        self.0.iter().map(|(old, new)| (*old, *new))
    }
}

/// Replace every reference in `object` by its renumbered target, or by `null` when the target
/// did not survive.
fn rewrite_references(object: &mut Object, document: &Document, map: &RewriteMap) {
    match object {
        Object::Reference(id) => {
            let mapped = document.resolve_id(*id).and_then(|id| map.get(id));
            *object = mapped.map_or(Object::Null, Object::Reference);
        }
        Object::Array(array) => {
            for item in array {
                rewrite_references(item, document, map);
            }
        }
        Object::Dictionary(dict) => rewrite_dictionary(dict, document, map),
        Object::Stream(stream) => rewrite_dictionary(&mut stream.dict, document, map),
        _ => {}
    }
}

fn rewrite_dictionary(dict: &mut Dictionary, document: &Document, map: &RewriteMap) {
    for (_, value) in dict.iter_mut() {
        rewrite_references(value, document, map);
    }
}

/// Apply the stream policy. Payloads whose filters cannot all be decoded pass through untouched.
fn reencode_stream(stream: &mut Stream, policy: StreamPolicy, budget: &MemoryBudget) -> Result<()> {
    if policy == StreamPolicy::Passthrough {
        return Ok(());
    }
    if stream.dict.has_type(b"Metadata") {
        stream.allows_compression = false;
    }

    let decodable = match stream.filters() {
        Ok(names) => names.iter().all(|name| filters::is_supported(name)),
        Err(err) => {
            debug!("stream filter chain unreadable: {err}");
            false
        }
    };
    if !decodable {
        return Ok(());
    }
    if stream.is_compressed() {
        match stream.decompressed_content() {
            Ok(data) => {
                budget.charge(data.len())?;
                stream.set_plain_content(data);
            }
            Err(err) => {
                debug!("stream passed through: {err}");
                return Ok(());
            }
        }
    }
    if policy == StreamPolicy::Compress {
        stream.compress()?;
    }
    Ok(())
}

/// Build the compacted document holding only the live objects of `document`, densely
/// renumbered, with streams re-encoded per `options`.
///
/// Fails when a live object is a stream whose payload could not be read.
pub fn compact(document: &Document, live: &LiveSet, options: &CleanOptions) -> Result<Document> {
    if let Some((&id, &offset)) = document
        .unreadable_streams
        .iter()
        .find(|(id, _)| live.contains(**id))
    {
        return Err(Error::UnreadableStream { id, offset });
    }

    let map = RewriteMap::new(live);
    let policy = options.stream_policy();
    let budget = Arc::clone(&document.budget);

    let rewrite = |(old, new): (ObjectId, ObjectId)| -> Result<(ObjectId, Object)> {
        let mut object = document.objects.get(&old).cloned().ok_or(Error::ObjectNotFound(old))?;
        rewrite_references(&mut object, document, &map);
        if let Object::Stream(stream) = &mut object {
            reencode_stream(stream, policy, &budget)?;
        }
        Ok((new, object))
    };
    let pairs: Vec<_> = map.iter().collect();
    #[cfg(feature = "rayon")]
    let objects: BTreeMap<ObjectId, Object> = pairs.into_par_iter().map(rewrite).collect::<Result<_>>()?;
    #[cfg(not(feature = "rayon"))]
    let objects: BTreeMap<ObjectId, Object> = pairs.into_iter().map(rewrite).collect::<Result<_>>()?;

    let mut trailer = Dictionary::new();
    for key in [&b"Root"[..], b"Info", b"ID"] {
        let Ok(value) = document.trailer.get(key) else {
            continue;
        };
        let mut value = value.clone();
        rewrite_references(&mut value, document, &map);
        if !value.is_null() {
            trailer.set(key, value);
        }
    }

    debug!("compacted {} objects into {}", document.objects.len(), objects.len());
    Ok(Document {
        version: document.version.clone(),
        binary_mark: document.binary_mark.clone(),
        trailer,
        reference_table: Xref::new(0, XrefType::CrossReferenceTable),
        max_id: map.len() as u32,
        objects,
        encryption_state: None,
        unreadable_streams: BTreeMap::new(),
        budget,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{RetainSet, live_objects};
    use crate::dictionary;

    fn ten_objects() -> Document {
        let mut doc = Document::new();
        doc.objects.insert((1, 0), dictionary! { "Type" => "Catalog", "Pages" => (2, 0) }.into());
        doc.objects.insert((2, 0), dictionary! { "Type" => "Pages", "Kids" => vec![Object::Reference((3, 0))], "Count" => 1 }.into());
        doc.objects.insert((3, 0), dictionary! { "Type" => "Page", "Parent" => (2, 0) }.into());
        for number in 4..=10 {
            doc.objects.insert((number, 0), Object::Integer(i64::from(number)));
        }
        doc.objects.insert((7, 0), dictionary! { "Extra" => (2, 0), "Gone" => (42, 0) }.into());
        doc.trailer.set("Root", (1, 0));
        doc
    }

    #[test]
    fn retained_object_is_renumbered_densely() {
        let doc = ten_objects();
        let retain: RetainSet = [7].into_iter().collect();
        let live = live_objects(&doc, &retain);
        let compacted = compact(&doc, &live, &CleanOptions::default()).unwrap();

        let ids: Vec<_> = compacted.objects.keys().copied().collect();
        assert_eq!(ids, vec![(1, 0), (2, 0), (3, 0), (4, 0)]);
        assert_eq!(compacted.max_id, 4);
        assert_eq!(compacted.trailer.get(b"Root").unwrap().as_reference().unwrap(), (1, 0));

        // Old object 7 keeps its reference to the page tree; the dangling one becomes null.
        let extra = compacted.objects[&(4, 0)].as_dict().unwrap();
        assert_eq!(extra.get(b"Extra").unwrap().as_reference().unwrap(), (2, 0));
        assert!(extra.get(b"Gone").unwrap().is_null());
    }

    #[test]
    fn renumbering_follows_original_order() {
        let mut doc = Document::new();
        doc.objects.insert((12, 0), dictionary! { "Type" => "Catalog", "Next" => (30, 0) }.into());
        doc.objects.insert((30, 0), dictionary! { "Back" => (12, 0) }.into());
        doc.trailer.set("Root", (12, 0));
        let live = live_objects(&doc, &RetainSet::new());
        let map = RewriteMap::new(&live);
        assert_eq!(map.get((12, 0)), Some((1, 0)));
        assert_eq!(map.get((30, 0)), Some((2, 0)));
    }

    #[test]
    fn compress_policy_reencodes_with_flate() {
        let mut doc = Document::new();
        let text = b"0 0 m 100 100 l S\n".repeat(50);
        let hex: Vec<u8> = text.iter().flat_map(|b| format!("{b:02x}").into_bytes()).collect();
        doc.objects.insert((1, 0), dictionary! { "Type" => "Catalog", "C" => (2, 0), "M" => (3, 0) }.into());
        doc.objects.insert(
            (2, 0),
            Stream::new(dictionary! { "Filter" => "ASCIIHexDecode" }, hex).into(),
        );
        doc.objects.insert(
            (3, 0),
            Stream::new(dictionary! { "Type" => "Metadata", "Subtype" => "XML" }, text.clone()).into(),
        );
        doc.trailer.set("Root", (1, 0));

        let live = live_objects(&doc, &RetainSet::new());
        let options = CleanOptions::builder().compress_streams(true).build();
        let compacted = compact(&doc, &live, &options).unwrap();

        let content = compacted.objects[&(2, 0)].as_stream().unwrap();
        assert_eq!(content.filters().unwrap(), vec![&b"FlateDecode"[..]]);
        assert_eq!(content.decompressed_content().unwrap(), text);
        let metadata = compacted.objects[&(3, 0)].as_stream().unwrap();
        assert!(!metadata.is_compressed());
    }

    #[test]
    fn unsupported_filters_pass_through() {
        let mut doc = Document::new();
        doc.objects.insert((1, 0), dictionary! { "Type" => "Catalog", "Image" => (2, 0) }.into());
        doc.objects.insert(
            (2, 0),
            Stream::new(dictionary! { "Filter" => "DCTDecode" }, b"\xff\xd8\xff".to_vec()).into(),
        );
        doc.trailer.set("Root", (1, 0));
        let live = live_objects(&doc, &RetainSet::new());
        let options = CleanOptions::builder().decompress_streams(true).build();
        let compacted = compact(&doc, &live, &options).unwrap();
        assert_eq!(compacted.objects[&(2, 0)], doc.objects[&(2, 0)]);
    }

    #[test]
    fn live_unreadable_stream_fails() {
        let mut doc = Document::new();
        doc.objects.insert((1, 0), dictionary! { "Type" => "Catalog", "C" => (2, 0) }.into());
        doc.unreadable_streams.insert((2, 0), 57);
        doc.trailer.set("Root", (1, 0));
        let live = live_objects(&doc, &RetainSet::new());
        let err = compact(&doc, &live, &CleanOptions::default()).unwrap_err();
        assert!(matches!(err, Error::UnreadableStream { id: (2, 0), offset: 57 }));
    }

    #[test]
    fn dangling_info_is_dropped_from_trailer() {
        let mut doc = Document::new();
        doc.objects.insert((1, 0), dictionary! { "Type" => "Catalog" }.into());
        doc.trailer.set("Root", (1, 0));
        doc.trailer.set("Info", (8, 0));
        let live = live_objects(&doc, &RetainSet::new());
        let compacted = compact(&doc, &live, &CleanOptions::default()).unwrap();
        assert!(!compacted.trailer.has(b"Info"));
    }
}
