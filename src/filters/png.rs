use crate::error::DecompressError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    None,
    Sub,
    Up,
    Avg,
    Paeth,
}

impl TryFrom<u8> for FilterType {
    type Error = DecompressError;

    fn try_from(n: u8) -> Result<FilterType, DecompressError> {
        match n {
            0 => Ok(FilterType::None),
            1 => Ok(FilterType::Sub),
            2 => Ok(FilterType::Up),
            3 => Ok(FilterType::Avg),
            4 => Ok(FilterType::Paeth),
            _ => Err(DecompressError::Predictor(format!("invalid PNG filter type ({n})"))),
        }
    }
}

fn paeth_predict(left: u8, above: u8, upperleft: u8) -> u8 {
    let expand_left = i16::from(left);
    let expand_above = i16::from(above);
    let expand_upperleft = i16::from(upperleft);

    let initial_estimate = expand_left + expand_above - expand_upperleft;

    let dist_left = (initial_estimate - expand_left).abs();
    let dist_above = (initial_estimate - expand_above).abs();
    let dist_upperleft = (initial_estimate - expand_upperleft).abs();

    if dist_left <= dist_above && dist_left <= dist_upperleft {
        left
    } else if dist_above <= dist_upperleft {
        above
    } else {
        upperleft
    }
}

/// Undo the filter of one row in place.
pub fn decode_row(filter: FilterType, bpp: usize, previous: &[u8], current: &mut [u8]) {
    use self::FilterType::*;
    let len = current.len();
    let bpp = bpp.min(len);

    match filter {
        None => (),
        Sub => {
            for i in bpp..len {
                current[i] = current[i].wrapping_add(current[i - bpp]);
            }
        }
        Up => {
            for i in 0..len {
                current[i] = current[i].wrapping_add(previous[i]);
            }
        }
        Avg => {
            for i in 0..bpp {
                current[i] = current[i].wrapping_add(previous[i] / 2);
            }
            for i in bpp..len {
                let average = (u16::from(current[i - bpp]) + u16::from(previous[i])) / 2;
                current[i] = current[i].wrapping_add(average as u8);
            }
        }
        Paeth => {
            for i in 0..bpp {
                current[i] = current[i].wrapping_add(paeth_predict(0, previous[i], 0));
            }
            for i in bpp..len {
                current[i] = current[i].wrapping_add(paeth_predict(current[i - bpp], previous[i], previous[i - bpp]));
            }
        }
    }
}

/// Reverse PNG row prediction. Every row carries its own filter type byte.
///
/// A short final row is padded with zeros, as readers commonly do for truncated image data.
pub fn decode_frame(content: &[u8], bytes_per_pixel: usize, bytes_per_row: usize) -> Result<Vec<u8>, DecompressError> {
    if bytes_per_row == 0 {
        return Err(DecompressError::Predictor("zero row width".into()));
    }
    let mut previous = vec![0_u8; bytes_per_row];
    let mut current = vec![0_u8; bytes_per_row];
    let mut decoded = Vec::with_capacity(content.len());

    for row in content.chunks(bytes_per_row + 1) {
        let filter = FilterType::try_from(row[0])?;
        let data = &row[1..];
        current[..data.len()].copy_from_slice(data);
        current[data.len()..].fill(0);

        decode_row(filter, bytes_per_pixel, &previous, &mut current);
        decoded.extend_from_slice(&current);
        std::mem::swap(&mut previous, &mut current);
    }
    Ok(decoded)
}
