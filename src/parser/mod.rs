use std::collections::HashSet;
use std::str::{self, FromStr};

use log::warn;
use nom::branch::alt;
use nom::bytes::complete::{tag, take, take_while, take_while1, take_while_m_n};
use nom::character::complete::{digit0, digit1, one_of, space0, space1};
use nom::combinator::{map, map_opt, map_res, opt, verify};
use nom::error::{ErrorKind, ParseError as _};
use nom::multi::{fold_many0, fold_many1, many0, many0_count};
use nom::sequence::{delimited, pair, preceded, separated_pair, terminated};
use nom::{AsBytes, AsChar, IResult, Input, Parser};
use nom_locate::LocatedSpan;

use crate::error::ParseError;
use crate::reader::Reader;
use crate::xref::{Xref, XrefEntry, XrefType, decode_xref_stream};
use crate::{Dictionary, Error, Object, ObjectId, Stream, StringFormat};

pub(crate) type ParserInput<'a> = LocatedSpan<&'a [u8], &'a str>;
pub(crate) type NomError<'a> = nom::error::Error<ParserInput<'a>>;
pub(crate) type NomResult<'a, O, E = NomError<'a>> = IResult<ParserInput<'a>, O, E>;

/// Maximum allowed embedding of literal strings.
pub const MAX_BRACKET: usize = 100;

#[inline]
fn strip_nom<O>(r: NomResult<O>) -> Option<O> {
    r.ok().map(|(_, o)| o)
}

#[inline]
fn convert_result<O, E>(result: Result<O, E>, input: ParserInput, error_kind: ErrorKind) -> NomResult<O> {
    result
        .map(|o| (input, o))
        .map_err(|_| nom::Err::Error(NomError::from_error_kind(input, error_kind)))
}

pub(crate) fn eol(input: ParserInput) -> NomResult<ParserInput> {
    alt((tag(&b"\r\n"[..]), tag(&b"\n"[..]), tag(&b"\r"[..]))).parse(input)
}

pub(crate) fn comment(input: ParserInput) -> NomResult<()> {
    map(
        (tag(&b"%"[..]), take_while(|c: u8| !b"\r\n".contains(&c)), opt(eol)),
        |_| (),
    )
    .parse(input)
}

#[inline]
pub(crate) fn is_whitespace(c: u8) -> bool {
    b" \t\n\r\0\x0C".contains(&c)
}

#[inline]
fn is_delimiter(c: u8) -> bool {
    b"()<>[]{}/%".contains(&c)
}

#[inline]
pub(crate) fn is_regular(c: u8) -> bool {
    !is_whitespace(c) && !is_delimiter(c)
}

#[inline]
fn is_direct_literal_string(c: u8) -> bool {
    !b"()\\\r\n".contains(&c)
}

fn white_space(input: ParserInput) -> NomResult<()> {
    map(take_while(is_whitespace), |_| ()).parse(input)
}

fn space(input: ParserInput) -> NomResult<()> {
    fold_many0(
        alt((map(take_while1(is_whitespace), |_| ()), comment)),
        || {},
        |_, _| (),
    )
    .parse(input)
}

fn integer(input: ParserInput) -> NomResult<i64> {
    let (i, _) = pair(opt(one_of("+-")), digit1).parse(input)?;

    let int_input = &input[..input.len() - i.len()];
    let parsed = str::from_utf8(int_input).map_err(|_| ()).and_then(|s| i64::from_str(s).map_err(|_| ()));
    convert_result(parsed, i, ErrorKind::Digit)
}

fn real(input: ParserInput) -> NomResult<f32> {
    let (i, _) = pair(
        opt(one_of("+-")),
        alt((
            map((digit1, tag(&b"."[..]), digit0), |_| ()),
            map(pair(tag(&b"."[..]), digit1), |_| ()),
        )),
    )
    .parse(input)?;

    let float_input = &input[..input.len() - i.len()];
    let parsed = str::from_utf8(float_input).map_err(|_| ()).and_then(|s| f32::from_str(s).map_err(|_| ()));
    convert_result(parsed, i, ErrorKind::Digit)
}

fn hex_char(input: ParserInput) -> NomResult<u8> {
    map_opt(
        verify(take(2usize), |h: &ParserInput| {
            h.as_bytes().iter().copied().all(AsChar::is_hex_digit)
        }),
        |x: ParserInput| str::from_utf8(&x).ok().and_then(|s| u8::from_str_radix(s, 16).ok()),
    )
    .parse(input)
}

fn oct_char(input: ParserInput) -> NomResult<u8> {
    map_opt(take_while_m_n(1, 3, AsChar::is_oct_digit), |x: ParserInput| {
        // Overflowing octal escapes keep their low-order byte.
        str::from_utf8(&x).ok().and_then(|s| u16::from_str_radix(s, 8).ok()).map(|o| o as u8)
    })
    .parse(input)
}

pub(crate) fn name(input: ParserInput) -> NomResult<Vec<u8>> {
    preceded(
        tag(&b"/"[..]),
        many0(alt((
            preceded(tag(&b"#"[..]), hex_char),
            map_opt(take(1usize), |c: ParserInput| {
                if is_regular(c[0]) { Some(c[0]) } else { None }
            }),
        ))),
    )
    .parse(input)
}

fn escape_sequence(input: ParserInput) -> NomResult<Option<u8>> {
    preceded(
        tag(&b"\\"[..]),
        alt((
            map(oct_char, Some),
            map(eol, |_| None),
            map(tag(&b"n"[..]), |_| Some(b'\n')),
            map(tag(&b"r"[..]), |_| Some(b'\r')),
            map(tag(&b"t"[..]), |_| Some(b'\t')),
            map(tag(&b"b"[..]), |_| Some(b'\x08')),
            map(tag(&b"f"[..]), |_| Some(b'\x0C')),
            map(take(1usize), |c: ParserInput| Some(c[0])),
        )),
    )
    .parse(input)
}

enum InnerLiteralString<'a> {
    Direct(ParserInput<'a>),
    Escape(Option<u8>),
    Eol,
    Nested(Vec<u8>),
}

impl InnerLiteralString<'_> {
    fn push(&self, output: &mut Vec<u8>) {
        match self {
            InnerLiteralString::Direct(s) => output.extend_from_slice(s),
            InnerLiteralString::Escape(e) => output.extend(e),
            // An unescaped end-of-line of any kind reads as a single line feed.
            InnerLiteralString::Eol => output.push(b'\n'),
            InnerLiteralString::Nested(n) => output.extend_from_slice(n),
        }
    }
}

fn inner_literal_string(depth: usize) -> impl Fn(ParserInput) -> NomResult<Vec<u8>> {
    move |input| {
        fold_many0(
            alt((
                map(take_while1(is_direct_literal_string), InnerLiteralString::Direct),
                map(escape_sequence, InnerLiteralString::Escape),
                map(eol, |_| InnerLiteralString::Eol),
                map(nested_literal_string(depth), InnerLiteralString::Nested),
            )),
            Vec::new,
            |mut out: Vec<u8>, value| {
                value.push(&mut out);
                out
            },
        )
        .parse(input)
    }
}

fn nested_literal_string(depth: usize) -> impl Fn(ParserInput) -> NomResult<Vec<u8>> {
    move |input| {
        if depth == 0 {
            Err(nom::Err::Error(NomError::from_error_kind(input, ErrorKind::TooLarge)))
        } else {
            map(
                delimited(tag(&b"("[..]), inner_literal_string(depth - 1), tag(&b")"[..])),
                |mut content| {
                    content.insert(0, b'(');
                    content.push(b')');
                    content
                },
            )
            .parse(input)
        }
    }
}

fn literal_string(input: ParserInput) -> NomResult<Vec<u8>> {
    delimited(tag(&b"("[..]), inner_literal_string(MAX_BRACKET), tag(&b")"[..])).parse(input)
}

#[inline]
fn hex_digit(input: ParserInput) -> NomResult<u8> {
    map_opt(take(1usize), |c: ParserInput| (c[0] as char).to_digit(16).map(|d| d as u8)).parse(input)
}

fn hexadecimal_string(input: ParserInput) -> NomResult<Object> {
    map(
        delimited(
            tag(&b"<"[..]),
            terminated(
                fold_many0(
                    preceded(white_space, hex_digit),
                    || -> (Vec<u8>, bool) { (Vec::new(), false) },
                    |state, c| match state {
                        (mut out, false) => {
                            out.push(c << 4);
                            (out, true)
                        }
                        (mut out, true) => {
                            if let Some(last) = out.last_mut() {
                                *last |= c;
                            }
                            (out, false)
                        }
                    },
                ),
                white_space,
            ),
            tag(&b">"[..]),
        ),
        |(bytes, _)| Object::String(bytes, StringFormat::Hexadecimal),
    )
    .parse(input)
}

fn boolean(input: ParserInput) -> NomResult<Object> {
    alt((
        map(tag(&b"true"[..]), |_| Object::Boolean(true)),
        map(tag(&b"false"[..]), |_| Object::Boolean(false)),
    ))
    .parse(input)
}

fn null(input: ParserInput) -> NomResult<Object> {
    map(tag(&b"null"[..]), |_| Object::Null).parse(input)
}

fn array(input: ParserInput) -> NomResult<Vec<Object>> {
    delimited(pair(tag(&b"["[..]), space), many0(_direct_object), tag(&b"]"[..])).parse(input)
}

pub(crate) fn dictionary(input: ParserInput) -> NomResult<Dictionary> {
    delimited(pair(tag(&b"<<"[..]), space), inner_dictionary, tag(&b">>"[..])).parse(input)
}

fn inner_dictionary(input: ParserInput) -> NomResult<Dictionary> {
    fold_many0(
        pair(terminated(name, space), _direct_object),
        Dictionary::new,
        |mut dict, (key, value)| {
            dict.set(key, value);
            dict
        },
    )
    .parse(input)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

fn trim_trailing_eol(data: &[u8]) -> &[u8] {
    data.strip_suffix(b"\r\n")
        .or_else(|| data.strip_suffix(b"\n"))
        .or_else(|| data.strip_suffix(b"\r"))
        .unwrap_or(data)
}

/// Resolve the declared `/Length` of a stream, following an indirect reference through the reader.
fn declared_length(dict: &Dictionary, reader: Option<&Reader>, already_seen: &mut HashSet<ObjectId>) -> Option<i64> {
    let value = dict.get(b"Length").ok()?;
    match value.as_reference() {
        Ok(id) => reader?.get_object(id, already_seen).ok()?.as_i64().ok(),
        Err(_) => value.as_i64().ok(),
    }
}

fn stream<'a>(
    input: ParserInput<'a>, reader: Option<&Reader>, already_seen: &mut HashSet<ObjectId>,
) -> NomResult<'a, Object> {
    let (i, dict) = terminated(dictionary, (space, tag(&b"stream"[..]), space0, eol)).parse(input)?;
    let start = i.location_offset();

    if let Some(length) = declared_length(&dict, reader, already_seen) {
        if let Ok(length) = usize::try_from(length) {
            let parsed: NomResult<ParserInput> =
                terminated(take(length), (opt(eol), space, tag(&b"endstream"[..]))).parse(i);
            if let Ok((rest, data)) = parsed {
                let stream = Stream::new(dict, data.to_vec()).with_position(start);
                return Ok((rest, Object::Stream(stream)));
            }
        }
        warn!("stream at byte offset {start} does not end after its declared length {length}");
    }

    // Delimit the payload by the `endstream` keyword instead.
    let data = i.fragment();
    match find(data, b"endstream") {
        Some(end) if find(&data[..end], b"endobj").is_none() => {
            let content = trim_trailing_eol(&data[..end]).to_vec();
            let taken: NomResult<ParserInput> = take(end + b"endstream".len()).parse(i);
            let (rest, _) = taken?;
            Ok((rest, Object::Stream(Stream::new(dict, content).with_position(start))))
        }
        // The payload runs into the next object or the end of the file.
        _ => Err(nom::Err::Failure(NomError::from_error_kind(i, ErrorKind::LengthValue))),
    }
}

fn unsigned_int<I: FromStr>(input: ParserInput) -> NomResult<I> {
    map_res(digit1, |digits: ParserInput| {
        str::from_utf8(&digits).map_err(|_| ()).and_then(|s| I::from_str(s).map_err(|_| ()))
    })
    .parse(input)
}

fn object_id(input: ParserInput) -> NomResult<ObjectId> {
    pair(terminated(unsigned_int, space), terminated(unsigned_int, space)).parse(input)
}

fn reference(input: ParserInput) -> NomResult<Object> {
    map(terminated(object_id, tag(&b"R"[..])), Object::Reference).parse(input)
}

fn _direct_objects(input: ParserInput) -> NomResult<Object> {
    alt((
        null,
        boolean,
        reference,
        map(real, Object::Real),
        map(integer, Object::Integer),
        map(name, Object::Name),
        map(literal_string, Object::string_literal),
        hexadecimal_string,
        map(array, Object::Array),
        map(dictionary, Object::Dictionary),
    ))
    .parse(input)
}

fn _direct_object(input: ParserInput) -> NomResult<Object> {
    terminated(_direct_objects, space).parse(input)
}

/// Parse a single direct object, as stored inside an object stream.
pub fn direct_object(input: ParserInput) -> Option<Object> {
    strip_nom(preceded(space, _direct_object).parse(input))
}

fn object<'a>(
    input: ParserInput<'a>, reader: Option<&Reader>, already_seen: &mut HashSet<ObjectId>,
) -> NomResult<'a, Object> {
    terminated(
        alt((|input| stream(input, reader, already_seen), _direct_objects)),
        space,
    )
    .parse(input)
}

/// Parse the indirect object starting at `offset`. `input` spans the whole file so that
/// stream positions stay absolute.
pub fn indirect_object<'a>(
    input: ParserInput<'a>, offset: usize, expected_id: Option<ObjectId>, reader: Option<&Reader>,
    already_seen: &mut HashSet<ObjectId>,
) -> crate::Result<(ObjectId, Object)> {
    if offset > input.len() {
        return Err(Error::InvalidOffset(offset));
    }
    let input = input.take_from(offset);

    let (i, (_, object_id)) = terminated((space, object_id), pair(tag(&b"obj"[..]), space))
        .parse(input)
        .map_err(|_| Error::IndirectObject { offset })?;
    if let Some(expected) = expected_id {
        if object_id != expected {
            return Err(Error::ObjectIdMismatch {
                expected,
                found: object_id,
            });
        }
    }

    let parsed = terminated(
        |i: ParserInput<'a>| object(i, reader, already_seen),
        (space, opt(tag(&b"endobj"[..]))),
    )
    .parse(i);
    match parsed {
        Ok((_, object)) => Ok((object_id, object)),
        Err(nom::Err::Failure(err)) if err.code == ErrorKind::LengthValue => Err(Error::TruncatedStream { offset }),
        // `N G obj endobj` declares an empty object, which reads as null.
        Err(_) if i.fragment().starts_with(b"endobj") => Ok((object_id, Object::Null)),
        Err(_) => Err(Error::IndirectObject { offset }),
    }
}

/// Parse an `N G obj` header, returning the identifier.
pub fn object_header(input: ParserInput) -> Option<ObjectId> {
    strip_nom(terminated(object_id, tag(&b"obj"[..])).parse(input))
}

pub fn header(input: ParserInput) -> Option<String> {
    strip_nom(map_res(
        delimited(
            tag(&b"%PDF-"[..]),
            take_while(|c: u8| !b"\r\n".contains(&c)),
            pair(eol, many0_count(comment)),
        ),
        |v: ParserInput| str::from_utf8(&v).map(|v| v.trim().to_string()),
    )
    .parse(input))
}

pub fn binary_mark(input: ParserInput) -> Option<Vec<u8>> {
    strip_nom(map(
        delimited(tag(&b"%"[..]), take_while(|c: u8| !b"\r\n".contains(&c)), eol),
        |v: ParserInput| v.to_vec(),
    )
    .parse(input))
}

fn xref_eol(input: ParserInput) -> NomResult<()> {
    map(pair(space0, eol), |_| ()).parse(input)
}

type XrefLine = ((u32, u32), bool);

fn xref_entry(input: ParserInput) -> NomResult<XrefLine> {
    pair(
        separated_pair(unsigned_int, space1, unsigned_int),
        delimited(space1, map(one_of("nf"), |k| k == 'n'), xref_eol),
    )
    .parse(input)
}

fn xref_section(input: ParserInput) -> NomResult<((u32, u32), Vec<XrefLine>)> {
    pair(
        separated_pair(unsigned_int, space1, unsigned_int),
        preceded(xref_eol, many0(xref_entry)),
    )
    .parse(input)
}

/// Decode a classic cross-reference table.
fn xref(input: ParserInput) -> NomResult<Xref> {
    delimited(
        pair(tag(&b"xref"[..]), xref_eol),
        fold_many1(
            xref_section,
            || Xref::new(0, XrefType::CrossReferenceTable),
            |mut xref, ((mut start, _count), entries)| {
                // Some writers number the first subsection from 1 while listing object 0.
                if start == 1 && entries.first() == Some(&((0, 65535), false)) {
                    start = 0;
                }
                for (index, ((offset, generation), is_normal)) in entries.into_iter().enumerate() {
                    let Some(id) = start.checked_add(index as u32) else {
                        break;
                    };
                    let Ok(generation) = u16::try_from(generation) else {
                        continue;
                    };
                    let entry = if is_normal {
                        XrefEntry::Normal { offset, generation }
                    } else {
                        XrefEntry::Free {
                            next: offset,
                            generation,
                        }
                    };
                    xref.insert(id, entry);
                }
                xref
            },
        ),
        space,
    )
    .parse(input)
}

fn trailer(input: ParserInput) -> NomResult<Dictionary> {
    delimited(pair(tag(&b"trailer"[..]), space), dictionary, space).parse(input)
}

/// Parse the dictionary following a `trailer` keyword.
pub fn trailer_dictionary(input: ParserInput) -> Option<Dictionary> {
    strip_nom(trailer(input))
}

/// Parse the cross-reference section starting at `offset`: either a classic table followed by its
/// trailer, or a cross-reference stream.
pub fn xref_and_trailer(input: ParserInput, offset: usize, reader: &Reader) -> crate::Result<(Xref, Dictionary)> {
    if offset > input.len() {
        return Err(Error::InvalidOffset(offset));
    }
    let section = input.take_from(offset);
    if let Ok((_, (mut xref, trailer))) = pair(preceded(space, xref), trailer).parse(section) {
        xref.size = match trailer.get(b"Size").and_then(Object::as_i64) {
            Ok(size) => u32::try_from(size).map_err(|_| ParseError::InvalidTrailer)?,
            Err(_) => xref.max_id().saturating_add(1),
        };
        return Ok((xref, trailer));
    }

    match indirect_object(input, offset, None, Some(reader), &mut HashSet::new()) {
        Ok((_, Object::Stream(stream))) => decode_xref_stream(stream),
        Ok(_) => Err(ParseError::InvalidXref.into()),
        Err(_) => Err(ParseError::InvalidTrailer.into()),
    }
}

/// Parse the offset following a `startxref` keyword.
pub fn xref_start(input: ParserInput) -> Option<i64> {
    strip_nom(preceded(pair(tag(&b"startxref"[..]), space), integer).parse(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_span(s: &'_ [u8]) -> ParserInput<'_> {
        LocatedSpan::new_extra(s, "test")
    }

    fn tstrip<O>(r: NomResult<O>) -> Option<O> {
        r.ok().and_then(|(i, o)| if !i.is_empty() { None } else { Some(o) })
    }

    #[test]
    fn parse_real_number() {
        let real = |i| tstrip(real(i));

        assert_eq!(real(test_span(b"0.12")), Some(0.12));
        assert_eq!(real(test_span(b"-.12")), Some(-0.12));
        assert_eq!(real(test_span(b"10.")), Some(10.0));
    }

    #[test]
    fn parse_string() {
        let literal_string = |i| tstrip(literal_string(i));

        let data = vec![
            ("()", ""),
            ("(text())", "text()"),
            ("(text\r\n\\\\(nested\\t\\b\\f))", "text\n\\(nested\t\x08\x0C)"),
            ("(text\\0\\53\\053\\0053)", "text\0++\x053"),
            ("(text line\\\n())", "text line()"),
        ];

        for (input, expected) in data {
            assert_eq!(
                literal_string(test_span(input.as_bytes())),
                Some(expected.as_bytes().to_vec()),
                "input: {:?} output: {:?}",
                input,
                expected,
            );
        }
    }

    #[test]
    fn too_deep_literal_string_is_rejected() {
        let text: Vec<u8> = std::iter::repeat_n(b'(', MAX_BRACKET + 2)
            .chain(std::iter::repeat_n(b')', MAX_BRACKET + 2))
            .collect();
        assert_eq!(tstrip(literal_string(test_span(&text))), None);
    }

    #[test]
    fn parse_name() {
        let result = tstrip(name(test_span(b"/ABC#5f")));
        assert_eq!(result, Some(b"ABC\x5F".to_vec()));

        let result = tstrip(name(test_span(b"/#cb#ce#cc#e5")));
        assert_eq!(result, Some(b"\xcb\xce\xcc\xe5".to_vec()));
    }

    #[test]
    fn hex_partial() {
        match tstrip(hexadecimal_string(test_span(b"<9 01F A>"))) {
            Some(Object::String(s, _)) => assert_eq!(s, b"\x90\x1F\xA0".to_vec()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn stream_with_wrong_length_is_delimited_by_endstream() {
        let input = b"1 0 obj\n<< /Length 99 >>\nstream\nBT ET\nendstream\nendobj\n";
        let (id, object) = indirect_object(test_span(input), 0, Some((1, 0)), None, &mut HashSet::new()).unwrap();
        assert_eq!(id, (1, 0));
        let stream = object.as_stream().unwrap();
        assert_eq!(stream.content, b"BT ET");
        assert_eq!(stream.dict.get(b"Length").unwrap().as_i64().unwrap(), 5);
        assert_eq!(stream.start_position, Some(32));
    }

    #[test]
    fn stream_without_endstream_is_truncated() {
        let input = b"%PDF-1.4\n4 0 obj\n<< /Length 500 >>\nstream\nBT ET\nendobj\n5 0 obj\n1\nendobj\n";
        let err = indirect_object(test_span(input), 9, None, None, &mut HashSet::new()).unwrap_err();
        assert!(matches!(err, Error::TruncatedStream { offset: 9 }));
    }

    #[test]
    fn empty_indirect_object_is_null() {
        let (_, object) = indirect_object(test_span(b"3 0 obj\nendobj"), 0, None, None, &mut HashSet::new()).unwrap();
        assert_eq!(object, Object::Null);
    }

    #[test]
    fn mismatched_object_id_is_reported() {
        let err = indirect_object(test_span(b"3 0 obj 1 endobj"), 0, Some((4, 0)), None, &mut HashSet::new())
            .unwrap_err();
        assert!(matches!(err, Error::ObjectIdMismatch { expected: (4, 0), found: (3, 0) }));
    }

    #[test]
    fn big_generation_value() {
        let input = b"xref
0 1
0000000000 65536 f
0 4
0000000000 65535 f
0000153238 00000 n
0000000019 00000 n
0000000313 00000 n
trailer
<</Size 4/Root 3 0 R>>
";
        let (_, table) = xref(test_span(input)).unwrap();
        assert_eq!(table.entries.len(), 4);
        assert_eq!(table.get(0), Some(&XrefEntry::Free { next: 0, generation: 65535 }));
    }

    #[test]
    fn xref_tolerates_eol_variants_and_first_subsection_defect() {
        let input = b"xref\r1 3\r0000000000 65535 f\r\n0000000017 00000 n\n0000000081 00001 n \r";
        let (_, table) = xref(test_span(input)).unwrap();
        assert_eq!(table.get(0), Some(&XrefEntry::Free { next: 0, generation: 65535 }));
        assert_eq!(table.get(1), Some(&XrefEntry::Normal { offset: 17, generation: 0 }));
        assert_eq!(table.get(2), Some(&XrefEntry::Normal { offset: 81, generation: 1 }));
        assert_eq!(table.get(3), None);
    }

    #[test]
    fn space_in_startxref_number() {
        let input = b"startxref\n  153804 \n%%EOF\n";
        assert_eq!(xref_start(test_span(input)), Some(153804));
    }

    #[test]
    fn header_is_trimmed() {
        assert_eq!(header(test_span(b"%PDF-1.7 \r\n%\xe2\xe3\xcf\xd3\n")), Some("1.7".to_string()));
    }

    #[test]
    fn object_header_reads_identifier() {
        assert_eq!(object_header(test_span(b"12 3 obj")), Some((12, 3)));
        assert_eq!(object_header(test_span(b"12 R")), None);
    }
}
