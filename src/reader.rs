use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, OnceLock};

use log::{debug, warn};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::budget::MemoryBudget;
use crate::encryption::{self, EncryptionState};
use crate::error::{ParseError, XrefError};
use crate::object_stream::ObjectStream;
use crate::parser::{self, ParserInput};
use crate::xref::{Xref, XrefEntry, XrefType};
use crate::{Dictionary, Document, Error, Object, ObjectId, Result};

/// Trailer keys that describe a cross-reference section rather than the document.
const SECTION_KEYS: [&[u8]; 10] = [
    b"Prev",
    b"XRefStm",
    b"Type",
    b"W",
    b"Index",
    b"Length",
    b"Filter",
    b"DecodeParms",
    b"DL",
    b"Size",
];

/// Object number to the (generation, offset) of its last `N G obj` header in the file.
type ScanTable = BTreeMap<u32, (u16, usize)>;

enum Loaded {
    Object(ObjectId, Object),
    Unreadable(ObjectId, usize),
    Missing,
}

/// Turns the bytes of a file into a [`Document`].
///
/// Cross-reference data is tried first. When it is unusable the file is scanned for object
/// headers and the document rebuilt from what the scan finds.
pub struct Reader<'a> {
    buffer: &'a [u8],
    password: &'a str,
    budget: Arc<MemoryBudget>,
    xref: Xref,
    scan: OnceLock<ScanTable>,
}

impl<'a> Reader<'a> {
    pub fn new(buffer: &'a [u8], password: &'a str, budget: Arc<MemoryBudget>) -> Reader<'a> {
        Reader {
            buffer,
            password,
            budget,
            xref: Xref::new(0, XrefType::CrossReferenceTable),
            scan: OnceLock::new(),
        }
    }

    /// Read the whole document.
    pub fn read(mut self) -> Result<Document> {
        let offset = find(self.buffer, b"%PDF-").ok_or(ParseError::InvalidFileHeader)?;
        self.buffer = &self.buffer[offset..];

        let version = parser::header(self.input()).ok_or(ParseError::InvalidFileHeader)?;
        check_version(&version)?;

        let charged = self.budget.used();
        let loaded = self.read_xref_chain().and_then(|(xref, trailer)| {
            self.xref = xref;
            self.load(Some(trailer))
        });
        let mut document = match loaded {
            Ok(document) => document,
            Err(err) if triggers_rebuild(&err) => {
                warn!("cross-reference data unusable ({err}), rebuilding from a full scan");
                self.budget.release(self.budget.used().saturating_sub(charged));
                self.xref = self.scan_xref();
                self.load(None)?
            }
            Err(err) => return Err(err),
        };

        document.version = version;
        if let Some(mark) = self.binary_mark() {
            document.binary_mark = mark;
        }
        Ok(document)
    }

    fn input(&self) -> ParserInput<'a> {
        ParserInput::new_extra(self.buffer, "document")
    }

    fn binary_mark(&self) -> Option<Vec<u8>> {
        let line_end = self.buffer.iter().position(|&c| c == b'\n' || c == b'\r')?;
        let rest = &self.buffer[line_end..];
        let rest = rest.strip_prefix(b"\r\n").or_else(|| rest.get(1..))?;
        parser::binary_mark(ParserInput::new_extra(rest, "binary mark"))
            .filter(|mark| mark.len() >= 4 && mark.iter().take(4).all(|&c| c >= 128))
    }

    fn xref_start(&self) -> Result<usize> {
        let position = self
            .buffer
            .windows(b"startxref".len())
            .rposition(|window| window == b"startxref")
            .ok_or(XrefError::Start)?;
        let start = parser::xref_start(ParserInput::new_extra(&self.buffer[position..], "startxref"))
            .and_then(|start| usize::try_from(start).ok())
            .ok_or(XrefError::Start)?;
        if start >= self.buffer.len() {
            return Err(XrefError::Start.into());
        }
        Ok(start)
    }

    /// Read the newest cross-reference section and every section its `/Prev` chain reaches.
    fn read_xref_chain(&self) -> Result<(Xref, Dictionary)> {
        let start = self.xref_start()?;
        let (mut xref, mut trailer) = self.read_section(start)?;

        let mut already_seen = HashSet::from([start]);
        let mut prev = trailer.get(b"Prev").and_then(Object::as_i64).ok();
        while let Some(offset) = prev {
            let offset = usize::try_from(offset).map_err(|_| XrefError::PrevStart)?;
            if !already_seen.insert(offset) {
                warn!("cross-reference chain loops back to byte offset {offset}");
                break;
            }
            let (older, older_trailer) = self.read_section(offset).map_err(|err| {
                debug!("previous section at byte offset {offset}: {err}");
                XrefError::PrevStart
            })?;
            xref.merge(older);
            for (key, value) in &older_trailer {
                if !trailer.has(key) {
                    trailer.set(key.clone(), value.clone());
                }
            }
            prev = older_trailer.get(b"Prev").and_then(Object::as_i64).ok();
        }

        let entry_count = xref.max_id().checked_add(1).ok_or(ParseError::InvalidXref)?;
        if xref.size != entry_count {
            debug!("trailer /Size is {}, the merged table needs {entry_count}", xref.size);
            xref.size = entry_count;
        }
        Ok((xref, trailer))
    }

    /// Read one section, folding in the `/XRefStm` of a hybrid file.
    fn read_section(&self, offset: usize) -> Result<(Xref, Dictionary)> {
        let (mut xref, trailer) = parser::xref_and_trailer(self.input(), offset, self)?;
        if let Ok(stream_offset) = trailer.get(b"XRefStm").and_then(Object::as_i64) {
            let stream_offset = usize::try_from(stream_offset).map_err(|_| XrefError::StreamStart)?;
            let (stream_xref, _) = parser::xref_and_trailer(self.input(), stream_offset, self)?;
            xref.merge_hybrid(stream_xref);
        }
        Ok((xref, trailer))
    }

    fn scan_table(&self) -> &ScanTable {
        self.scan.get_or_init(|| scan_objects(self.buffer))
    }

    fn scan_xref(&self) -> Xref {
        let mut xref = Xref::new(0, XrefType::CrossReferenceTable);
        for (&number, &(generation, offset)) in self.scan_table() {
            if let Ok(offset) = u32::try_from(offset) {
                xref.insert(number, XrefEntry::Normal { offset, generation });
            }
        }
        xref.size = xref.max_id().saturating_add(1);
        xref
    }

    /// Load every object of the current table. `trailer` is `None` when rebuilding.
    fn load(&self, trailer: Option<Dictionary>) -> Result<Document> {
        let rebuild = trailer.is_none();
        let mut document = Document {
            budget: Arc::clone(&self.budget),
            reference_table: self.xref.clone(),
            ..Document::new()
        };

        for loaded in self.load_objects()? {
            match loaded {
                Loaded::Object(id, object) => {
                    document.objects.insert(id, object);
                }
                Loaded::Unreadable(id, offset) => {
                    warn!("object {} {} at byte offset {offset} has an unterminated stream", id.0, id.1);
                    document.unreadable_streams.insert(id, offset);
                }
                Loaded::Missing => {}
            }
        }

        document.trailer = match trailer {
            Some(trailer) => trailer,
            None => self.recovered_trailer(&document.objects),
        };

        self.decrypt(&mut document)?;
        self.expand_object_streams(&mut document, rebuild)?;

        if rebuild && document.catalog().is_err() {
            let catalog = document
                .objects
                .iter()
                .rev()
                .find(|(_, object)| object.as_dict().is_ok_and(|dict| dict.has_type(b"Catalog")))
                .map(|(id, _)| *id);
            if let Some(id) = catalog {
                debug!("using object {} {} as the catalog", id.0, id.1);
                document.trailer.set("Root", id);
            }
        }

        document.objects.retain(|_, object| !is_structural(object));
        for key in SECTION_KEYS {
            document.trailer.remove(key);
        }
        document.adjust_max_id();

        document.catalog()?;
        Ok(document)
    }

    fn load_objects(&self) -> Result<Vec<Loaded>> {
        let load_entry = |(&number, entry): (&u32, &XrefEntry)| -> Result<Loaded> {
            let XrefEntry::Normal { offset, generation } = *entry else {
                return Ok(Loaded::Missing);
            };
            let loaded = self.load_entry((number, generation), offset as usize);
            if let Loaded::Object(_, Object::Stream(stream)) = &loaded {
                self.budget.charge(stream.content.len())?;
            }
            Ok(loaded)
        };

        #[cfg(feature = "rayon")]
        let loaded = self.xref.entries.par_iter().map(load_entry).collect();
        #[cfg(not(feature = "rayon"))]
        let loaded = self.xref.entries.iter().map(load_entry).collect();
        loaded
    }

    fn load_entry(&self, id: ObjectId, offset: usize) -> Loaded {
        let err = match self.read_object(offset, Some(id)) {
            Ok((id, object)) => return Loaded::Object(id, object),
            Err(Error::TruncatedStream { offset }) => return Loaded::Unreadable(id, offset),
            Err(err) => err,
        };

        // The table points somewhere else; use the header the scan found for this number.
        match self.scan_table().get(&id.0) {
            Some(&(generation, scanned)) if scanned != offset => {
                debug!("object {} {} is not at byte offset {offset} ({err}), found it at {scanned}", id.0, id.1);
                match self.read_object(scanned, Some((id.0, generation))) {
                    Ok((id, object)) => Loaded::Object(id, object),
                    Err(Error::TruncatedStream { offset }) => Loaded::Unreadable((id.0, generation), offset),
                    Err(err) => {
                        warn!("object {} {} is unreadable: {err}", id.0, generation);
                        Loaded::Missing
                    }
                }
            }
            _ => {
                warn!("object {} {} is unreadable: {err}", id.0, id.1);
                Loaded::Missing
            }
        }
    }

    fn read_object(&self, offset: usize, expected_id: Option<ObjectId>) -> Result<(ObjectId, Object)> {
        self.read_object_seen(offset, expected_id, &mut HashSet::new())
    }

    fn read_object_seen(
        &self, offset: usize, expected_id: Option<ObjectId>, already_seen: &mut HashSet<ObjectId>,
    ) -> Result<(ObjectId, Object)> {
        parser::indirect_object(self.input(), offset, expected_id, Some(self), already_seen)
    }

    /// Read an object directly from the file. Used to resolve indirect stream lengths while the
    /// document is still being loaded.
    pub fn get_object(&self, id: ObjectId, already_seen: &mut HashSet<ObjectId>) -> Result<Object> {
        if !already_seen.insert(id) {
            warn!("reference cycle detected resolving object {} {}", id.0, id.1);
            return Err(Error::ReferenceCycle(id));
        }
        let from_table = match self.xref.get(id.0) {
            Some(XrefEntry::Normal { offset, .. }) => self.read_object_seen(*offset as usize, Some(id), already_seen),
            _ => Err(Error::ObjectNotFound(id)),
        };
        match from_table {
            Ok((_, object)) => Ok(object),
            Err(err) => {
                let &(_, offset) = self.scan_table().get(&id.0).ok_or(err)?;
                self.read_object_seen(offset, None, already_seen).map(|(_, object)| object)
            }
        }
    }

    /// Merge every `trailer` dictionary and cross-reference stream dictionary in file order.
    fn recovered_trailer(&self, objects: &BTreeMap<ObjectId, Object>) -> Dictionary {
        let mut sections: Vec<(usize, &Dictionary)> = Vec::new();
        let mut found_trailers = Vec::new();
        let mut position = 0;
        while let Some(found) = find(&self.buffer[position..], b"trailer") {
            let at = position + found;
            position = at + b"trailer".len();
            if let Some(dict) = parser::trailer_dictionary(ParserInput::new_extra(&self.buffer[at..], "trailer")) {
                found_trailers.push((at, dict));
            }
        }
        sections.extend(found_trailers.iter().map(|(at, dict)| (*at, dict)));

        for (id, object) in objects {
            let Ok(stream) = object.as_stream() else {
                continue;
            };
            if stream.dict.has_type(b"XRef") {
                if let Some(&(_, offset)) = self.scan_table().get(&id.0) {
                    sections.push((offset, &stream.dict));
                }
            }
        }
        sections.sort_by_key(|(offset, _)| *offset);

        let mut trailer = Dictionary::new();
        for (_, dict) in sections {
            for (key, value) in dict {
                trailer.set(key.clone(), value.clone());
            }
        }
        trailer
    }

    fn decrypt(&self, document: &mut Document) -> Result<()> {
        let Ok(encrypt) = document.trailer.get(b"Encrypt") else {
            return Ok(());
        };
        let encrypt_id = match encrypt {
            Object::Reference(id) => document.resolve_id(*id),
            _ => None,
        };
        let dict = document.dereference(encrypt)?.as_dict()?.clone();
        let file_id = document
            .trailer
            .get(b"ID")
            .and_then(Object::as_array)
            .ok()
            .and_then(|ids| ids.first())
            .and_then(|id| id.as_str().ok())
            .unwrap_or_default()
            .to_vec();

        let state = EncryptionState::decode(&dict, &file_id, self.password)?;
        debug!("decrypting with the standard security handler, V{}", state.version);

        let decrypt_entry = |(&id, object): (&ObjectId, &mut Object)| {
            if Some(id) == encrypt_id {
                return;
            }
            let original = object.clone();
            if let Err(err) = encryption::decrypt_object(&state, id, object) {
                warn!("object {} {} kept as stored: {err}", id.0, id.1);
                *object = original;
            }
        };
        #[cfg(feature = "rayon")]
        document.objects.par_iter_mut().for_each(decrypt_entry);
        #[cfg(not(feature = "rayon"))]
        document.objects.iter_mut().for_each(decrypt_entry);

        document.trailer.remove(b"Encrypt");
        if let Some(id) = encrypt_id {
            document.objects.remove(&id);
        }
        document.encryption_state = Some(state);
        Ok(())
    }

    /// Take the objects the table assigns to each object stream. When rebuilding there is no
    /// assignment, so every packed object not defined directly is taken.
    fn expand_object_streams(&self, document: &mut Document, rebuild: bool) -> Result<()> {
        let containers: Vec<ObjectId> = document
            .objects
            .iter()
            .filter(|(_, object)| object.as_stream().is_ok_and(|stream| stream.dict.has_type(b"ObjStm")))
            .map(|(id, _)| *id)
            .collect();

        for container in containers {
            let Some(Object::Stream(stream)) = document.objects.get(&container) else {
                continue;
            };
            let object_stream = match ObjectStream::new(stream, &self.budget) {
                Ok(object_stream) => object_stream,
                Err(err @ Error::MemoryLimit { .. }) => return Err(err),
                Err(err) => {
                    warn!("object stream {} {} is unreadable: {err}", container.0, container.1);
                    continue;
                }
            };

            for (id, (index, object)) in object_stream.objects {
                let assigned = match self.xref.get(id.0) {
                    Some(&XrefEntry::Compressed {
                        container: assigned,
                        index: listed,
                    }) if assigned == container.0 => {
                        if listed != index {
                            debug!("object {} listed at index {listed} of its stream but found at {index}", id.0);
                        }
                        true
                    }
                    _ => rebuild,
                };
                if assigned {
                    document.objects.entry(id).or_insert(object);
                }
            }
        }
        Ok(())
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

fn check_version(version: &str) -> Result<()> {
    let major = version.split('.').next().and_then(|major| major.trim().parse::<u32>().ok());
    match major {
        Some(major) if major > 2 => Err(Error::UnsupportedVersion(version.to_string())),
        _ => Ok(()),
    }
}

/// Errors that say nothing about whether the file can be read another way.
fn triggers_rebuild(err: &Error) -> bool {
    !matches!(
        err,
        Error::Decryption(_)
            | Error::MemoryLimit { .. }
            | Error::UnsupportedSecurityHandler(_)
            | Error::UnsupportedVersion(_)
            | Error::IO(_)
    )
}

/// Containers and section dictionaries the writer produces afresh.
fn is_structural(object: &Object) -> bool {
    match object {
        Object::Stream(stream) => stream.dict.has_type(b"ObjStm") || stream.dict.has_type(b"XRef"),
        Object::Dictionary(dict) => dict.has(b"Linearized"),
        _ => false,
    }
}

fn skip_back(buffer: &[u8], mut position: usize, predicate: impl Fn(u8) -> bool) -> usize {
    while position > 0 && predicate(buffer[position - 1]) {
        position -= 1;
    }
    position
}

/// Find the start of the `N G` pair in front of the `obj` keyword at `keyword`.
fn object_header_start(buffer: &[u8], keyword: usize) -> Option<usize> {
    let generation_end = skip_back(buffer, keyword, parser::is_whitespace);
    let generation_start = skip_back(buffer, generation_end, |c| c.is_ascii_digit());
    if generation_start == generation_end {
        return None;
    }
    let number_end = skip_back(buffer, generation_start, parser::is_whitespace);
    if number_end == generation_start {
        return None;
    }
    let number_start = skip_back(buffer, number_end, |c| c.is_ascii_digit());
    if number_start == number_end || (number_start > 0 && parser::is_regular(buffer[number_start - 1])) {
        return None;
    }
    Some(number_start)
}

/// Scan the whole file for `N G obj` headers. Later definitions of a number replace earlier ones.
fn scan_objects(buffer: &[u8]) -> ScanTable {
    let mut table = ScanTable::new();
    let mut position = 0;
    while let Some(found) = find(&buffer[position..], b"obj") {
        let keyword = position + found;
        position = keyword + 3;
        if buffer.get(position).is_some_and(|&c| parser::is_regular(c)) {
            continue;
        }
        let Some(start) = object_header_start(buffer, keyword) else {
            continue;
        };
        if let Some((number, generation)) = parser::object_header(ParserInput::new_extra(&buffer[start..], "scan")) {
            table.insert(number, (generation, start));
        }
    }
    table
}
