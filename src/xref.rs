use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use crate::error::ParseError;
use crate::{Dictionary, Object, Result, Stream};

#[derive(Debug, Clone)]
pub struct Xref {
    /// Entries for indirect object.
    pub entries: BTreeMap<u32, XrefEntry>,

    /// Total number of entries (including free entries), equal to the highest object number plus 1.
    pub size: u32,

    /// The kind of section this table was read from.
    pub xref_type: XrefType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefType {
    /// Represents PDF 1.5+ cross-reference streams.
    CrossReferenceStream,
    /// Represents classic xref tables.
    CrossReferenceTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    Free { next: u32, generation: u16 },
    Normal { offset: u32, generation: u16 },
    Compressed { container: u32, index: u16 },
}

impl Xref {
    pub fn new(size: u32, xref_type: XrefType) -> Xref {
        Xref {
            entries: BTreeMap::new(),
            size,
            xref_type,
        }
    }

    pub fn get(&self, id: u32) -> Option<&XrefEntry> {
        self.entries.get(&id)
    }

    pub fn insert(&mut self, id: u32, entry: XrefEntry) {
        self.entries.insert(id, entry);
    }

    /// Fold in an older section. Entries already present shadow the older ones, free
    /// entries included.
    pub fn merge(&mut self, older: Xref) {
        for (id, entry) in older.entries {
            self.entries.entry(id).or_insert(entry);
        }
    }

    /// Fold in the `/XRefStm` stream of a hybrid section. The stream describes objects the
    /// table lists as free for the benefit of older readers, so it wins over free entries.
    pub fn merge_hybrid(&mut self, stream: Xref) {
        for (id, entry) in stream.entries {
            match self.entries.get(&id) {
                None | Some(XrefEntry::Free { .. }) => {
                    self.entries.insert(id, entry);
                }
                _ => {}
            }
        }
    }

    pub fn max_id(&self) -> u32 {
        self.entries.keys().next_back().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl XrefEntry {
    pub fn is_normal(&self) -> bool {
        matches!(*self, XrefEntry::Normal { .. })
    }

    pub fn is_compressed(&self) -> bool {
        matches!(*self, XrefEntry::Compressed { .. })
    }

    pub fn is_free(&self) -> bool {
        matches!(*self, XrefEntry::Free { .. })
    }
}

/// Decode a cross-reference stream into its entries and the trailer part of its dictionary.
pub fn decode_xref_stream(mut stream: Stream) -> Result<(Xref, Dictionary)> {
    if stream.is_compressed() {
        stream.decompress()?;
    }
    let mut dict = stream.dict;
    let mut reader = Cursor::new(stream.content);
    let size = dict
        .get(b"Size")
        .and_then(Object::as_i64)
        .map_err(|_| ParseError::InvalidXref)?;
    if !(0..=i64::from(u32::MAX)).contains(&size) {
        return Err(ParseError::InvalidXref.into());
    }
    let mut xref = Xref::new(size as u32, XrefType::CrossReferenceStream);

    let section_indice = dict
        .get(b"Index")
        .and_then(parse_integer_array)
        .unwrap_or_else(|_| vec![0, size]);
    let field_widths = dict
        .get(b"W")
        .and_then(parse_integer_array)
        .map_err(|_| ParseError::InvalidXref)?;

    if field_widths.len() < 3 || field_widths.iter().any(|w| !(0..=8).contains(w)) {
        return Err(ParseError::InvalidXref.into());
    }

    let mut bytes1 = vec![0_u8; field_widths[0] as usize];
    let mut bytes2 = vec![0_u8; field_widths[1] as usize];
    let mut bytes3 = vec![0_u8; field_widths[2] as usize];

    'sections: for pair in section_indice.chunks_exact(2) {
        let (start, count) = (pair[0], pair[1]);
        if start < 0 || count < 0 {
            return Err(ParseError::InvalidXref.into());
        }

        for j in 0..count {
            let Ok(id) = u32::try_from(start + j) else {
                break 'sections;
            };
            let entry_type = if !bytes1.is_empty() {
                match read_big_endian_integer(&mut reader, &mut bytes1) {
                    Ok(value) => value,
                    // Truncated stream data: keep what was decoded.
                    Err(_) => break 'sections,
                }
            } else {
                1
            };
            let (Ok(field2), Ok(field3)) = (
                read_big_endian_integer(&mut reader, &mut bytes2),
                read_big_endian_integer(&mut reader, &mut bytes3),
            ) else {
                break 'sections;
            };
            match entry_type {
                0 => {
                    let generation = u16::try_from(field3).unwrap_or(u16::MAX);
                    xref.insert(id, XrefEntry::Free { next: field2 as u32, generation });
                }
                1 => {
                    let generation = if bytes3.is_empty() { 0 } else { field3 };
                    if let (Ok(offset), Ok(generation)) = (u32::try_from(field2), u16::try_from(generation)) {
                        xref.insert(id, XrefEntry::Normal { offset, generation });
                    }
                }
                2 => {
                    if let (Ok(container), Ok(index)) = (u32::try_from(field2), u16::try_from(field3)) {
                        xref.insert(id, XrefEntry::Compressed { container, index });
                    }
                }
                // Unknown types are treated as references to the null object.
                _ => {}
            }
        }
    }

    dict.remove(b"Length");
    dict.remove(b"W");
    dict.remove(b"Index");
    Ok((xref, dict))
}

fn read_big_endian_integer(reader: &mut Cursor<Vec<u8>>, buffer: &mut [u8]) -> Result<u64> {
    reader.read_exact(buffer)?;
    let mut value = 0;
    for &mut byte in buffer {
        value = (value << 8) + u64::from(byte);
    }
    Ok(value)
}

fn parse_integer_array(array: &Object) -> Result<Vec<i64>> {
    array.as_array()?.iter().map(Object::as_i64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary;

    #[test]
    fn newer_entries_shadow_older_ones() {
        let mut newer = Xref::new(4, XrefType::CrossReferenceTable);
        newer.insert(2, XrefEntry::Free { next: 0, generation: 1 });
        newer.insert(3, XrefEntry::Normal { offset: 300, generation: 0 });

        let mut older = Xref::new(3, XrefType::CrossReferenceTable);
        older.insert(1, XrefEntry::Normal { offset: 10, generation: 0 });
        older.insert(2, XrefEntry::Normal { offset: 20, generation: 0 });

        newer.merge(older);
        assert_eq!(newer.get(1), Some(&XrefEntry::Normal { offset: 10, generation: 0 }));
        assert!(newer.get(2).unwrap().is_free());
        assert_eq!(newer.max_id(), 3);
    }

    #[test]
    fn hybrid_stream_replaces_free_entries() {
        let mut table = Xref::new(3, XrefType::CrossReferenceTable);
        table.insert(1, XrefEntry::Normal { offset: 15, generation: 0 });
        table.insert(2, XrefEntry::Free { next: 0, generation: 0 });

        let mut stream = Xref::new(3, XrefType::CrossReferenceStream);
        stream.insert(1, XrefEntry::Normal { offset: 99, generation: 0 });
        stream.insert(2, XrefEntry::Compressed { container: 5, index: 0 });

        table.merge_hybrid(stream);
        assert_eq!(table.get(1), Some(&XrefEntry::Normal { offset: 15, generation: 0 }));
        assert_eq!(table.get(2), Some(&XrefEntry::Compressed { container: 5, index: 0 }));
    }

    #[test]
    fn decode_uncompressed_xref_stream() {
        let content = vec![
            0, 0, 0, 255, //
            1, 0, 15, 0, //
            2, 0, 5, 1,
        ];
        let stream = Stream::new(
            dictionary! {
                "Type" => "XRef",
                "Size" => 3,
                "W" => vec![1.into(), 2.into(), 1.into()],
            },
            content,
        );
        let (xref, dict) = decode_xref_stream(stream).unwrap();
        assert_eq!(xref.size, 3);
        assert_eq!(xref.get(0), Some(&XrefEntry::Free { next: 0, generation: 255 }));
        assert_eq!(xref.get(1), Some(&XrefEntry::Normal { offset: 15, generation: 0 }));
        assert_eq!(xref.get(2), Some(&XrefEntry::Compressed { container: 5, index: 1 }));
        assert!(!dict.has(b"W"));
        assert!(dict.has(b"Size"));
    }
}
