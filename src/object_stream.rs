use std::collections::BTreeMap;
use std::str::FromStr;

use log::warn;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::budget::MemoryBudget;
use crate::parser::{self, ParserInput};
use crate::{Error, Object, ObjectId, Result, Stream};

/// The objects packed in a `/Type /ObjStm` container, keyed by identifier (generation is always 0)
/// and tagged with their index inside the container.
#[derive(Debug)]
pub struct ObjectStream {
    pub objects: BTreeMap<ObjectId, (u16, Object)>,
}

impl ObjectStream {
    /// Decode the container and parse every object listed in its header.
    pub fn new(stream: &Stream, budget: &MemoryBudget) -> Result<ObjectStream> {
        let content = if stream.is_compressed() {
            stream.decompressed_content()?
        } else {
            stream.content.clone()
        };
        budget.charge(content.len())?;

        if content.is_empty() {
            return Ok(ObjectStream {
                objects: BTreeMap::new(),
            });
        }

        let first_offset = stream
            .dict
            .get(b"First")
            .and_then(Object::as_i64)
            .ok()
            .and_then(|first| usize::try_from(first).ok())
            .ok_or_else(|| Error::InvalidObjectStream("missing or negative /First".to_string()))?;
        let index_block = content
            .get(..first_offset)
            .ok_or_else(|| Error::InvalidObjectStream(format!("/First {first_offset} is past the end")))?;

        let numbers: Vec<_> = String::from_utf8_lossy(index_block)
            .split_whitespace()
            .map(|number| usize::from_str(number).ok())
            .collect();
        let len = numbers.len() / 2 * 2;

        if let Ok(n) = stream.dict.get(b"N").and_then(Object::as_i64) {
            if Some(n) != i64::try_from(numbers.len() / 2).ok() {
                warn!("object stream header lists {} objects but /N is {n}", numbers.len() / 2);
            }
        }

        let chunks_filter_map = |(index, chunk): (usize, &[Option<usize>])| {
            let id = u32::try_from(chunk[0]?).ok()?;
            let offset = first_offset.checked_add(chunk[1]?)?;
            let index = u16::try_from(index).ok()?;

            if offset >= content.len() {
                warn!("object {id} lies outside its object stream");
                return None;
            }
            let object = parser::direct_object(ParserInput::new_extra(&content[offset..], "object stream"))?;
            Some(((id, 0), (index, object)))
        };
        #[cfg(feature = "rayon")]
        let objects = numbers[..len]
            .par_chunks(2)
            .enumerate()
            .filter_map(chunks_filter_map)
            .collect();
        #[cfg(not(feature = "rayon"))]
        let objects = numbers[..len]
            .chunks(2)
            .enumerate()
            .filter_map(chunks_filter_map)
            .collect();

        Ok(ObjectStream { objects })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary;

    #[test]
    fn parses_listed_objects_with_their_index() {
        let content = b"11 0 12 11 << /A 1 >> [ 1 2 ]".to_vec();
        let stream = Stream::new(dictionary! { "Type" => "ObjStm", "N" => 2, "First" => 11 }, content);
        let budget = MemoryBudget::unlimited();
        let objects = ObjectStream::new(&stream, &budget).unwrap().objects;

        assert_eq!(objects.len(), 2);
        let (index, object) = &objects[&(11, 0)];
        assert_eq!(*index, 0);
        assert_eq!(object.as_dict().unwrap().get(b"A").unwrap().as_i64().unwrap(), 1);
        let (index, object) = &objects[&(12, 0)];
        assert_eq!(*index, 1);
        assert_eq!(object.as_array().unwrap().len(), 2);
        assert_eq!(budget.used(), 29);
    }

    #[test]
    fn out_of_range_first_is_an_error() {
        let stream = Stream::new(dictionary! { "N" => 1, "First" => 400 }, b"1 0 null".to_vec());
        let err = ObjectStream::new(&stream, &MemoryBudget::unlimited()).unwrap_err();
        assert!(matches!(err, Error::InvalidObjectStream(_)));
    }
}
