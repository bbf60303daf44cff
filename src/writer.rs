use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::debug;
use rand::Rng as _;

use crate::encryption::{self, EncryptionSpec, EncryptionState};
use crate::xref::{Xref, XrefEntry, XrefType};
use crate::{Dictionary, Document, Object, ObjectId, Result, Stream, StringFormat, dictionary, filters};

impl Document {
    /// Save the document to a file with a classic cross-reference table.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = BufWriter::new(File::create(path)?);
        self.save_to(&mut file)?;
        file.flush()?;
        Ok(())
    }

    /// Save the document to an arbitrary target with a classic cross-reference table.
    pub fn save_to<W: Write>(&self, target: &mut W) -> Result<()> {
        Writer::new(self).write(target)?;
        Ok(())
    }
}

/// Serializes a [`Document`].
///
/// Objects are written in ascending number order, followed by the cross-reference section and
/// the trailer. When encrypting, the fresh encryption dictionary is the last numbered object.
pub struct Writer<'a> {
    document: &'a Document,
    use_xref_streams: bool,
    encryption: Option<&'a EncryptionSpec>,
}

/// Where everything landed in the serialized output.
#[derive(Debug, Clone)]
pub struct WriteSummary {
    /// Every entry from 0 to `/Size - 1`, free entries included.
    pub xref: Xref,
    /// The trailer as written.
    pub trailer: Dictionary,
    /// Byte offset of the cross-reference section.
    pub xref_start: usize,
}

impl<'a> Writer<'a> {
    pub fn new(document: &'a Document) -> Writer<'a> {
        Writer {
            document,
            use_xref_streams: false,
            encryption: None,
        }
    }

    pub fn xref_streams(mut self, value: bool) -> Self {
        self.use_xref_streams = value;
        self
    }

    pub fn encryption(mut self, spec: Option<&'a EncryptionSpec>) -> Self {
        self.encryption = spec;
        self
    }

    pub fn write<W: Write>(&self, target: &mut W) -> Result<WriteSummary> {
        let document = self.document;
        let mut version = document.version.clone();
        let mut next_number = document.objects.keys().next_back().map_or(1, |id| id.0 + 1);

        let mut trailer = Dictionary::new();
        if let Ok(root) = document.trailer.get(b"Root") {
            trailer.set("Root", root.clone());
        }
        if let Ok(info) = document.trailer.get(b"Info") {
            trailer.set("Info", info.clone());
        }
        let mut file_id = document.trailer.get(b"ID").ok().cloned();

        let mut encryption: Option<(ObjectId, Dictionary, EncryptionState)> = None;
        if let Some(spec) = self.encryption {
            let first_id = match file_id.as_ref().and_then(first_file_id) {
                Some(id) => id.to_vec(),
                None => {
                    let mut id = vec![0u8; 16];
                    rand::rng().fill(&mut id[..]);
                    let entry = Object::String(id.clone(), StringFormat::Hexadecimal);
                    file_id = Some(Object::Array(vec![entry.clone(), entry]));
                    id
                }
            };
            let (dict, state) = spec.build(&first_id)?;
            let encrypt_id = (next_number, 0);
            next_number += 1;
            trailer.set("Encrypt", encrypt_id);
            raise_version(&mut version, spec.algorithm.min_version());
            debug!("encrypting output with {:?} as object {}", spec.algorithm, encrypt_id.0);
            encryption = Some((encrypt_id, dict, state));
        }
        if let Some(file_id) = file_id {
            trailer.set("ID", file_id);
        }
        if self.use_xref_streams {
            raise_version(&mut version, "1.5");
        }

        let mut target = CountingWrite {
            inner: target,
            bytes_written: 0,
        };
        let xref_type = if self.use_xref_streams {
            XrefType::CrossReferenceStream
        } else {
            XrefType::CrossReferenceTable
        };
        let mut xref = Xref::new(0, xref_type);

        writeln!(target, "%PDF-{version}")?;
        target.write_all(b"%")?;
        target.write_all(&document.binary_mark)?;
        target.write_all(b"\n")?;

        for (&id, object) in &document.objects {
            match &encryption {
                Some((_, _, state)) => {
                    let mut object = object.clone();
                    encryption::encrypt_object(state, id, &mut object)?;
                    write_indirect_object(&mut target, id, &object, &mut xref)?;
                }
                None => write_indirect_object(&mut target, id, object, &mut xref)?,
            }
        }
        if let Some((id, dict, _)) = encryption {
            write_indirect_object(&mut target, id, &Object::Dictionary(dict), &mut xref)?;
        }

        let xref_start = target.bytes_written;
        if self.use_xref_streams {
            let stream_id = (next_number, 0);
            xref.insert(
                stream_id.0,
                XrefEntry::Normal {
                    offset: offset_u32(xref_start)?,
                    generation: 0,
                },
            );
            fill_free_entries(&mut xref, stream_id.0 + 1);
            trailer.set("Size", i64::from(xref.size));
            let stream = xref_stream(&xref, &trailer)?;
            write_indirect_object(&mut target, stream_id, &Object::Stream(stream), &mut Xref::new(0, xref_type))?;
        } else {
            fill_free_entries(&mut xref, next_number);
            trailer.set("Size", i64::from(xref.size));
            write_xref_table(&mut target, &xref)?;
            target.write_all(b"trailer\n")?;
            write_trailer(&mut target, &trailer)?;
            target.write_all(b"\n")?;
        }
        write!(target, "startxref\n{xref_start}\n%%EOF\n")?;

        Ok(WriteSummary {
            xref,
            trailer,
            xref_start,
        })
    }
}

fn first_file_id(id: &Object) -> Option<&[u8]> {
    id.as_array().ok()?.first()?.as_str().ok()
}

fn parse_version(version: &str) -> (u32, u32) {
    let mut parts = version.split('.').map(|part| part.trim().parse().unwrap_or(0));
    (parts.next().unwrap_or(0), parts.next().unwrap_or(0))
}

/// Raise `version` to at least `minimum`.
fn raise_version(version: &mut String, minimum: &str) {
    if parse_version(version) < parse_version(minimum) {
        debug!("raising output version from {version} to {minimum}");
        *version = minimum.to_string();
    }
}

fn offset_u32(offset: usize) -> Result<u32> {
    u32::try_from(offset).map_err(|_| crate::Error::InvalidOffset(offset))
}

/// Number every unused object below `size` as free, chained in ascending order from object 0
/// and back to it.
fn fill_free_entries(xref: &mut Xref, size: u32) {
    let free: Vec<u32> = (1..size).filter(|number| xref.get(*number).is_none()).collect();
    let mut next = 0;
    for &number in free.iter().rev() {
        xref.insert(number, XrefEntry::Free { next, generation: 1 });
        next = number;
    }
    xref.insert(0, XrefEntry::Free { next, generation: 65535 });
    xref.size = size;
}

fn write_xref_table(file: &mut dyn Write, xref: &Xref) -> Result<()> {
    writeln!(file, "xref\n0 {}", xref.size)?;
    for number in 0..xref.size {
        let (field, generation, kind) = match xref.get(number) {
            Some(XrefEntry::Normal { offset, generation }) => (*offset, *generation, 'n'),
            Some(XrefEntry::Free { next, generation }) => (*next, *generation, 'f'),
            // Tables cannot express compressed entries.
            Some(XrefEntry::Compressed { .. }) | None => (0, 65535, 'f'),
        };
        write!(file, "{field:010} {generation:05} {kind} \n")?;
    }
    Ok(())
}

/// Smallest number of bytes that can hold `value`.
fn byte_width(value: u64) -> usize {
    (8 - value.leading_zeros() as usize / 8).max(1)
}

fn xref_stream(xref: &Xref, trailer: &Dictionary) -> Result<Stream> {
    let max_field = xref
        .entries
        .values()
        .map(|entry| match *entry {
            XrefEntry::Normal { offset, .. } => u64::from(offset),
            XrefEntry::Free { next, .. } => u64::from(next),
            XrefEntry::Compressed { container, .. } => u64::from(container),
        })
        .max()
        .unwrap_or(0);
    let width = byte_width(max_field);

    let mut content = Vec::with_capacity(xref.entries.len() * (width + 3));
    for number in 0..xref.size {
        let (kind, field, generation) = match xref.get(number) {
            Some(XrefEntry::Free { next, generation }) => (0u8, u64::from(*next), *generation),
            Some(XrefEntry::Normal { offset, generation }) => (1, u64::from(*offset), *generation),
            Some(XrefEntry::Compressed { container, index }) => (2, u64::from(*container), *index),
            None => (0, 0, 65535),
        };
        content.push(kind);
        content.extend_from_slice(&field.to_be_bytes()[8 - width..]);
        content.extend_from_slice(&generation.to_be_bytes());
    }

    let mut dict = dictionary! {
        "Type" => "XRef",
        "W" => vec![1.into(), Object::from(width), 2.into()],
        "Filter" => "FlateDecode",
    };
    for (key, value) in trailer {
        dict.set(key.clone(), value.clone());
    }
    Ok(Stream::new(dict, filters::flate_encode(&content)?).with_compression(false))
}

fn write_trailer(file: &mut dyn Write, trailer: &Dictionary) -> Result<()> {
    let mut ordered = Dictionary::new();
    for key in [&b"Size"[..], b"Root", b"Info", b"Encrypt", b"ID"] {
        if let Ok(value) = trailer.get(key) {
            ordered.set(key, value.clone());
        }
    }
    write_dictionary(file, &ordered)?;
    Ok(())
}

fn write_indirect_object<W: Write>(
    file: &mut CountingWrite<&mut W>, id: ObjectId, object: &Object, xref: &mut Xref,
) -> Result<()> {
    let offset = offset_u32(file.bytes_written)?;
    xref.insert(id.0, XrefEntry::Normal { offset, generation: id.1 });
    write!(file, "{} {} obj\n", id.0, id.1)?;
    write_object(file, object)?;
    file.write_all(b"\nendobj\n")?;
    Ok(())
}

fn need_separator(object: &Object) -> bool {
    matches!(
        object,
        Object::Null | Object::Boolean(_) | Object::Integer(_) | Object::Real(_) | Object::Reference(_)
    )
}

pub fn write_object(file: &mut dyn Write, object: &Object) -> std::io::Result<()> {
    match object {
        Object::Null => file.write_all(b"null"),
        Object::Boolean(value) => file.write_all(if *value { b"true" } else { b"false" }),
        Object::Integer(value) => {
            let mut buffer = itoa::Buffer::new();
            file.write_all(buffer.format(*value).as_bytes())
        }
        Object::Real(value) => write_real(file, *value),
        Object::Name(name) => write_name(file, name),
        Object::String(text, format) => write_string(file, text, *format),
        Object::Array(array) => write_array(file, array),
        Object::Dictionary(dict) => write_dictionary(file, dict),
        Object::Stream(stream) => write_stream(file, stream),
        Object::Reference(id) => write!(file, "{} {} R", id.0, id.1),
    }
}

fn write_real(file: &mut dyn Write, value: f32) -> std::io::Result<()> {
    if !value.is_finite() {
        return file.write_all(b"0");
    }
    // Display gives the shortest text that reads back as the same f32, never in exponent form.
    let text = value.to_string();
    file.write_all(text.as_bytes())?;
    if !text.contains('.') {
        file.write_all(b".0")?;
    }
    Ok(())
}

fn write_name(file: &mut dyn Write, name: &[u8]) -> std::io::Result<()> {
    file.write_all(b"/")?;
    for &byte in name {
        // White-space, delimiters and bytes outside 33..=126 are written as #xx.
        if b" \t\n\r\x0C()<>[]{}/%#".contains(&byte) || !(33..=126).contains(&byte) {
            write!(file, "#{byte:02X}")?;
        } else {
            file.write_all(&[byte])?;
        }
    }
    Ok(())
}

fn write_string(file: &mut dyn Write, text: &[u8], format: StringFormat) -> std::io::Result<()> {
    match format {
        StringFormat::Literal => {
            let mut escaped = Vec::with_capacity(text.len() + 2);
            escaped.push(b'(');
            for &byte in text {
                match byte {
                    b'(' | b')' | b'\\' => escaped.extend_from_slice(&[b'\\', byte]),
                    // A bare carriage return would read back as a line feed.
                    b'\r' => escaped.extend_from_slice(b"\\r"),
                    _ => escaped.push(byte),
                }
            }
            escaped.push(b')');
            file.write_all(&escaped)
        }
        StringFormat::Hexadecimal => {
            file.write_all(b"<")?;
            for &byte in text {
                write!(file, "{byte:02X}")?;
            }
            file.write_all(b">")
        }
    }
}

fn write_array(file: &mut dyn Write, array: &[Object]) -> std::io::Result<()> {
    file.write_all(b"[")?;
    let mut first = true;
    for object in array {
        if first {
            first = false;
        } else if need_separator(object) || matches!(object, Object::Name(_)) {
            file.write_all(b" ")?;
        }
        write_object(file, object)?;
    }
    file.write_all(b"]")
}

fn write_dictionary(file: &mut dyn Write, dictionary: &Dictionary) -> std::io::Result<()> {
    file.write_all(b"<<")?;
    for (key, value) in dictionary {
        write_name(file, key)?;
        if need_separator(value) {
            file.write_all(b" ")?;
        }
        write_object(file, value)?;
    }
    file.write_all(b">>")
}

fn write_stream(file: &mut dyn Write, stream: &Stream) -> std::io::Result<()> {
    // The payload may have been recovered with a length other than the declared one.
    let length = stream.content.len() as i64;
    if stream.dict.get(b"Length").and_then(Object::as_i64).ok() == Some(length) {
        write_dictionary(file, &stream.dict)?;
    } else {
        let mut dict = stream.dict.clone();
        dict.set("Length", length);
        write_dictionary(file, &dict)?;
    }
    file.write_all(b"\nstream\n")?;
    file.write_all(&stream.content)?;
    file.write_all(b"\nendstream")
}

pub struct CountingWrite<W: Write> {
    inner: W,
    bytes_written: usize,
}

impl<W: Write> Write for CountingWrite<W> {
    #[inline]
    fn write(&mut self, buffer: &[u8]) -> std::io::Result<usize> {
        let result = self.inner.write(buffer);
        if let Ok(bytes) = result {
            self.bytes_written += bytes;
        }
        result
    }

    #[inline]
    fn write_all(&mut self, buffer: &[u8]) -> std::io::Result<()> {
        self.bytes_written += buffer.len();
        // On error the whole output is abandoned, so the count no longer matters.
        self.inner.write_all(buffer)
    }

    #[inline]
    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
