//! Compression utilities and stream filters

use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object};

/// Stream filters this crate can undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    FlateDecode,
    ASCIIHexDecode,
    ASCII85Decode,
}

impl Filter {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "FlateDecode" | "Fl" => Some(Filter::FlateDecode),
            "ASCIIHexDecode" | "AHx" => Some(Filter::ASCIIHexDecode),
            "ASCII85Decode" | "A85" => Some(Filter::ASCII85Decode),
            _ => None,
        }
    }
}

/// Compress data using Flate/Zlib compression
#[cfg(feature = "compression")]
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(PdfError::Io)?;
    encoder.finish().map_err(PdfError::Io)
}

/// Decompress data using Flate/Zlib decompression
#[cfg(feature = "compression")]
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    let mut decoder = ZlibDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| PdfError::CompressionError(format!("Flate decode error: {e}")))?;
    Ok(decompressed)
}

#[cfg(not(feature = "compression"))]
pub fn decompress(_data: &[u8]) -> Result<Vec<u8>> {
    Err(PdfError::CompressionError(
        "FlateDecode requires 'compression' feature".to_string(),
    ))
}

/// Undo every filter named by the stream dictionary, in order.
pub fn decode_stream(data: &[u8], dict: &Dictionary) -> Result<Vec<u8>> {
    let filters: Vec<&Object> = match dict.get("Filter") {
        None | Some(Object::Null) => return Ok(data.to_vec()),
        Some(Object::Array(array)) => array.iter().collect(),
        Some(other) => vec![other],
    };
    let params: Vec<Option<&Dictionary>> = match dict.get("DecodeParms") {
        Some(Object::Array(array)) => array.iter().map(|p| p.as_dict()).collect(),
        Some(Object::Dictionary(params)) => vec![Some(params)],
        _ => Vec::new(),
    };

    let mut result = data.to_vec();
    for (index, filter) in filters.into_iter().enumerate() {
        let name = filter
            .as_name()
            .and_then(|n| n.as_str())
            .ok_or_else(|| PdfError::CompressionError("Invalid Filter entry".to_string()))?;
        let filter = Filter::from_name(name)
            .ok_or_else(|| PdfError::CompressionError(format!("Unsupported filter: {name}")))?;

        result = match filter {
            Filter::FlateDecode => {
                let inflated = decompress(&result)?;
                match params.get(index).copied().flatten() {
                    Some(parms) => apply_predictor(inflated, parms)?,
                    None => inflated,
                }
            }
            Filter::ASCIIHexDecode => decode_ascii_hex(&result)?,
            Filter::ASCII85Decode => decode_ascii85(&result)?,
        };
    }

    Ok(result)
}

/// PNG row predictors (`/Predictor` 10-15). TIFF predictor 2 is not supported.
fn apply_predictor(data: Vec<u8>, parms: &Dictionary) -> Result<Vec<u8>> {
    let predictor = parms.get_integer("Predictor").unwrap_or(1);
    if predictor == 1 {
        return Ok(data);
    }
    if predictor < 10 {
        return Err(PdfError::CompressionError(format!(
            "Unsupported predictor: {predictor}"
        )));
    }

    let colors = parms.get_integer("Colors").unwrap_or(1).max(1) as usize;
    let bits = parms.get_integer("BitsPerComponent").unwrap_or(8).max(1) as usize;
    let columns = parms.get_integer("Columns").unwrap_or(1).max(1) as usize;
    let bytes_per_pixel = (colors * bits).div_ceil(8);
    let row_len = (colors * bits * columns).div_ceil(8);

    let mut output = Vec::with_capacity(data.len());
    let mut previous = vec![0u8; row_len];
    for chunk in data.chunks(row_len + 1) {
        let (tag, row) = match chunk.split_first() {
            Some((tag, row)) => (*tag, row),
            None => break,
        };
        let mut current = row.to_vec();
        current.resize(row_len, 0);
        for i in 0..row_len {
            let left = if i >= bytes_per_pixel { current[i - bytes_per_pixel] } else { 0 };
            let up = previous[i];
            let upper_left = if i >= bytes_per_pixel { previous[i - bytes_per_pixel] } else { 0 };
            current[i] = match tag {
                0 => current[i],
                1 => current[i].wrapping_add(left),
                2 => current[i].wrapping_add(up),
                3 => current[i].wrapping_add(((left as u16 + up as u16) / 2) as u8),
                4 => current[i].wrapping_add(paeth(left, up, upper_left)),
                other => {
                    return Err(PdfError::CompressionError(format!(
                        "Invalid PNG row filter: {other}"
                    )))
                }
            };
        }
        output.extend_from_slice(&current);
        previous = current;
    }
    Ok(output)
}

fn paeth(left: u8, up: u8, upper_left: u8) -> u8 {
    let p = left as i16 + up as i16 - upper_left as i16;
    let pa = (p - left as i16).abs();
    let pb = (p - up as i16).abs();
    let pc = (p - upper_left as i16).abs();
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        up
    } else {
        upper_left
    }
}

fn decode_ascii_hex(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::new();
    let mut pending: Option<u8> = None;

    for &byte in data.iter().filter(|b| !b.is_ascii_whitespace()) {
        if byte == b'>' {
            break;
        }
        let value = hex_digit_value(byte).ok_or_else(|| {
            PdfError::CompressionError(format!("Invalid hex digit: {}", byte as char))
        })?;
        match pending.take() {
            Some(high) => result.push((high << 4) | value),
            None => pending = Some(value),
        }
    }
    // An odd trailing digit is padded with 0
    if let Some(high) = pending {
        result.push(high << 4);
    }

    Ok(result)
}

fn hex_digit_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        _ => None,
    }
}

fn decode_ascii85(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::new();
    let mut group: Vec<u8> = Vec::with_capacity(5);
    let body = data.strip_prefix(b"<~").unwrap_or(data);
    let mut chars = body.iter().copied().filter(|b| !b.is_ascii_whitespace());

    while let Some(c) = chars.next() {
        match c {
            b'~' => {
                if chars.next() == Some(b'>') {
                    break;
                }
                return Err(PdfError::CompressionError(
                    "Invalid ASCII85 end marker".to_string(),
                ));
            }
            b'z' if group.is_empty() => result.extend_from_slice(&[0, 0, 0, 0]),
            b'!'..=b'u' => {
                group.push(c);
                if group.len() == 5 {
                    result.extend_from_slice(&ascii85_group_value(&group)?.to_be_bytes());
                    group.clear();
                }
            }
            _ => {
                return Err(PdfError::CompressionError(format!(
                    "Invalid ASCII85 character: {}",
                    c as char
                )));
            }
        }
    }

    if !group.is_empty() {
        let original_len = group.len();
        if original_len == 1 {
            return Err(PdfError::CompressionError(
                "Truncated ASCII85 group".to_string(),
            ));
        }
        group.resize(5, b'u');
        let bytes = ascii85_group_value(&group)?.to_be_bytes();
        result.extend_from_slice(&bytes[..original_len - 1]);
    }

    Ok(result)
}

fn ascii85_group_value(group: &[u8]) -> Result<u32> {
    let value = group
        .iter()
        .fold(0u64, |acc, &ch| acc * 85 + (ch - b'!') as u64);
    u32::try_from(value)
        .map_err(|_| PdfError::CompressionError("ASCII85 group out of range".to_string()))
}
