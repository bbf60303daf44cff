//! Stream filter codecs.
//!
//! Decoding covers the lossless filters a rewrite can re-encode. Image codecs (DCT, JPX,
//! CCITTFax, JBIG2) are reported as unsupported so their payloads pass through untouched.

pub mod png;

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use log::warn;
use weezl::BitOrder;
use weezl::decode::Decoder as LzwDecoder;

use crate::error::DecompressError;
use crate::{Dictionary, Object, Result};

/// Decode `data` with the filter called `name`.
pub fn decode(name: &[u8], data: &[u8], params: Option<&Dictionary>) -> Result<Vec<u8>> {
    let output = match name {
        b"FlateDecode" | b"Fl" => apply_predictor(flate_decode(data)?, params)?,
        b"LZWDecode" | b"LZW" => apply_predictor(lzw_decode(data, params)?, params)?,
        b"ASCIIHexDecode" | b"AHx" => ascii_hex_decode(data)?,
        b"ASCII85Decode" | b"A85" => ascii85_decode(data)?,
        b"RunLengthDecode" | b"RL" => run_length_decode(data)?,
        other => {
            return Err(DecompressError::UnsupportedFilter(String::from_utf8_lossy(other).into_owned()).into());
        }
    };
    Ok(output)
}

/// Whether [`decode`] knows the filter called `name`.
pub fn is_supported(name: &[u8]) -> bool {
    matches!(
        name,
        b"FlateDecode"
            | b"Fl"
            | b"LZWDecode"
            | b"LZW"
            | b"ASCIIHexDecode"
            | b"AHx"
            | b"ASCII85Decode"
            | b"A85"
            | b"RunLengthDecode"
            | b"RL"
    )
}

pub fn flate_encode(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub fn flate_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len() * 2);
    if data.is_empty() {
        return Ok(output);
    }
    let mut decoder = ZlibDecoder::new(data);
    match decoder.read_to_end(&mut output) {
        Ok(_) => Ok(output),
        // Damaged tails are common; keep what was inflated.
        Err(err) if !output.is_empty() => {
            warn!("flate stream decoded partially: {err}");
            Ok(output)
        }
        Err(err) => Err(DecompressError::Flate(err).into()),
    }
}

fn lzw_decode(data: &[u8], params: Option<&Dictionary>) -> Result<Vec<u8>> {
    let early_change = params
        .and_then(|p| p.get(b"EarlyChange").ok())
        .and_then(|p| p.as_i64().ok())
        .map(|v| v != 0)
        .unwrap_or(true);

    let mut decoder = if early_change {
        LzwDecoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        LzwDecoder::new(BitOrder::Msb, 8)
    };
    decoder
        .decode(data)
        .map_err(|err| DecompressError::Lzw(err.to_string()).into())
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn is_whitespace(c: u8) -> bool {
    b" \t\n\r\0\x0C".contains(&c)
}

fn ascii_hex_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len() / 2);
    let mut high = None;
    for &c in data {
        if c == b'>' {
            break;
        }
        if is_whitespace(c) {
            continue;
        }
        let value = hex_value(c).ok_or(DecompressError::AsciiHex("invalid hex digit"))?;
        match high.take() {
            Some(h) => output.push(h << 4 | value),
            None => high = Some(value),
        }
    }
    // An odd final digit is followed by an implied zero.
    if let Some(h) = high {
        output.push(h << 4);
    }
    Ok(output)
}

fn ascii85_decode(data: &[u8]) -> Result<Vec<u8>> {
    let data = data.strip_prefix(b"<~").unwrap_or(data);
    let mut output = Vec::with_capacity(data.len() * 4 / 5);
    let mut group = [0_u8; 5];
    let mut count = 0;

    let mut iter = data.iter().copied().peekable();
    while let Some(c) = iter.next() {
        match c {
            b'~' => {
                if iter.peek() == Some(&b'>') {
                    break;
                }
                return Err(DecompressError::Ascii85("stray '~'").into());
            }
            b'z' if count == 0 => output.extend_from_slice(&[0; 4]),
            b'z' => return Err(DecompressError::Ascii85("'z' inside a group").into()),
            b'!'..=b'u' => {
                group[count] = c - b'!';
                count += 1;
                if count == 5 {
                    output.extend_from_slice(&ascii85_group(&group)?);
                    count = 0;
                }
            }
            c if is_whitespace(c) => {}
            _ => return Err(DecompressError::Ascii85("invalid character").into()),
        }
    }

    match count {
        0 => {}
        1 => return Err(DecompressError::Ascii85("final group of one character").into()),
        _ => {
            group[count..].fill(b'u' - b'!');
            let bytes = ascii85_group(&group)?;
            output.extend_from_slice(&bytes[..count - 1]);
        }
    }
    Ok(output)
}

fn ascii85_group(group: &[u8; 5]) -> Result<[u8; 4]> {
    let value = group
        .iter()
        .fold(0_u64, |acc, &digit| acc * 85 + u64::from(digit));
    let value = u32::try_from(value).map_err(|_| DecompressError::Ascii85("group overflow"))?;
    Ok(value.to_be_bytes())
}

fn run_length_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len() * 2);
    let mut pos = 0;
    while pos < data.len() {
        let length = data[pos];
        pos += 1;
        match length {
            128 => break,
            0..=127 => {
                let end = pos + usize::from(length) + 1;
                let run = data.get(pos..end).ok_or(DecompressError::RunLength)?;
                output.extend_from_slice(run);
                pos = end;
            }
            _ => {
                let byte = *data.get(pos).ok_or(DecompressError::RunLength)?;
                output.extend(std::iter::repeat_n(byte, 257 - usize::from(length)));
                pos += 1;
            }
        }
    }
    Ok(output)
}

fn apply_predictor(data: Vec<u8>, params: Option<&Dictionary>) -> Result<Vec<u8>> {
    let Some(params) = params else {
        return Ok(data);
    };
    let int_param = |key: &[u8], default: i64| params.get(key).and_then(Object::as_i64).unwrap_or(default);

    let predictor = int_param(b"Predictor", 1);
    let columns = int_param(b"Columns", 1).max(1) as usize;
    let colors = int_param(b"Colors", 1).max(1) as usize;
    let bits = int_param(b"BitsPerComponent", 8).max(1) as usize;
    let bytes_per_pixel = (colors * bits).div_ceil(8);
    let bytes_per_row = (colors * bits * columns).div_ceil(8);

    match predictor {
        1 => Ok(data),
        2 => tiff_predictor(data, colors, bits, bytes_per_row),
        10..=15 => Ok(png::decode_frame(&data, bytes_per_pixel, bytes_per_row)?),
        other => Err(DecompressError::Predictor(format!("unknown predictor {other}")).into()),
    }
}

fn tiff_predictor(mut data: Vec<u8>, colors: usize, bits: usize, bytes_per_row: usize) -> Result<Vec<u8>> {
    if bits != 8 {
        return Err(DecompressError::Predictor(format!("TIFF predictor with {bits} bits per component")).into());
    }
    for row in data.chunks_mut(bytes_per_row) {
        for i in colors..row.len() {
            row[i] = row[i].wrapping_add(row[i - colors]);
        }
    }
    Ok(data)
}
