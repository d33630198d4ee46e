//! Packed-buffer codec for the multi and packed data-plane operations.
//!
//! A batch of `N` byte strings travels in one contiguous buffer:
//!
//! ```text
//! ┌─────────────────────────────┬──────────────────────────────────┐
//! │ size[0] .. size[N-1]        │ payload[0] payload[1] .. [N-1]   │
//! │ (N × u64, little-endian)    │ (concatenated, no padding)       │
//! └─────────────────────────────┴──────────────────────────────────┘
//! ```
//!
//! `put_packed` carries keys and values in a single buffer:
//!
//! ```text
//! ┌──────────────┬──────────────┬───────────────┬─────────────────┐
//! │ key sizes ×N │ val sizes ×N │ keys packed   │ values packed   │
//! └──────────────┴──────────────┴───────────────┴─────────────────┘
//! ```
//!
//! Buffers arrive from remote peers, so every decode path bounds-checks;
//! a sizes/payload mismatch is `InvalidArg`, never a panic.

use crate::error::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};

/// Width in bytes of one size entry.
pub const SIZE_WIDTH: usize = 8;

/// Byte length of the sizes region for a batch of `count` entries.
pub const fn sizes_region(count: usize) -> usize {
    count * SIZE_WIDTH
}

/// Read `count` little-endian u64 sizes from the front of `buf`.
pub fn read_sizes(buf: &[u8], count: usize) -> Result<Vec<u64>> {
    let region = sizes_region(count);
    if buf.len() < region {
        return Err(Error::InvalidArg(format!(
            "sizes region needs {} bytes, buffer has {}",
            region,
            buf.len()
        )));
    }
    let mut sizes = Vec::with_capacity(count);
    for i in 0..count {
        sizes.push(LittleEndian::read_u64(&buf[i * SIZE_WIDTH..]));
    }
    Ok(sizes)
}

/// Write `sizes` as little-endian u64 into the front of `buf`.
pub fn write_sizes(buf: &mut [u8], sizes: &[u64]) -> Result<()> {
    let region = sizes_region(sizes.len());
    if buf.len() < region {
        return Err(Error::InvalidArg(format!(
            "sizes region needs {} bytes, buffer has {}",
            region,
            buf.len()
        )));
    }
    for (i, size) in sizes.iter().enumerate() {
        LittleEndian::write_u64(&mut buf[i * SIZE_WIDTH..(i + 1) * SIZE_WIDTH], *size);
    }
    Ok(())
}

/// Encode a batch of segments as `[sizes | payloads]`.
pub fn encode_segments<T: AsRef<[u8]>>(segments: &[T]) -> Vec<u8> {
    let payload: usize = segments.iter().map(|s| s.as_ref().len()).sum();
    let mut buf = Vec::with_capacity(sizes_region(segments.len()) + payload);
    for segment in segments {
        let mut size = [0u8; SIZE_WIDTH];
        LittleEndian::write_u64(&mut size, segment.as_ref().len() as u64);
        buf.extend_from_slice(&size);
    }
    for segment in segments {
        buf.extend_from_slice(segment.as_ref());
    }
    buf
}

/// Decode a `[sizes | payloads]` buffer of `count` segments.
///
/// Trailing bytes past the last payload are tolerated (callers may hand in
/// a region larger than the batch); truncated payloads are not.
pub fn decode_segments(buf: &[u8], count: usize) -> Result<Vec<Vec<u8>>> {
    let sizes = read_sizes(buf, count)?;
    let mut offset = sizes_region(count) as u64;
    let mut segments = Vec::with_capacity(count);
    for size in sizes {
        let end = offset
            .checked_add(size)
            .ok_or_else(|| Error::InvalidArg("segment size overflow".to_string()))?;
        if end > buf.len() as u64 {
            return Err(Error::InvalidArg(format!(
                "segment ends at {} but buffer has {} bytes",
                end,
                buf.len()
            )));
        }
        segments.push(buf[offset as usize..end as usize].to_vec());
        offset = end;
    }
    Ok(segments)
}

/// Encode key/value pairs in the single-buffer `put_packed` layout.
pub fn encode_pairs<K: AsRef<[u8]>, V: AsRef<[u8]>>(pairs: &[(K, V)]) -> Vec<u8> {
    let payload: usize = pairs
        .iter()
        .map(|(k, v)| k.as_ref().len() + v.as_ref().len())
        .sum();
    let mut buf = Vec::with_capacity(2 * sizes_region(pairs.len()) + payload);
    let mut size = [0u8; SIZE_WIDTH];
    for (key, _) in pairs {
        LittleEndian::write_u64(&mut size, key.as_ref().len() as u64);
        buf.extend_from_slice(&size);
    }
    for (_, value) in pairs {
        LittleEndian::write_u64(&mut size, value.as_ref().len() as u64);
        buf.extend_from_slice(&size);
    }
    for (key, _) in pairs {
        buf.extend_from_slice(key.as_ref());
    }
    for (_, value) in pairs {
        buf.extend_from_slice(value.as_ref());
    }
    buf
}

/// Decode a single-buffer `put_packed` payload of `count` pairs.
pub fn decode_pairs(buf: &[u8], count: usize) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let key_sizes = read_sizes(buf, count)?;
    let val_region = &buf[sizes_region(count)..];
    let val_sizes = read_sizes(val_region, count)?;

    let mut offset = 2 * sizes_region(count) as u64;
    let mut take = |size: u64| -> Result<Vec<u8>> {
        let end = offset
            .checked_add(size)
            .ok_or_else(|| Error::InvalidArg("segment size overflow".to_string()))?;
        if end > buf.len() as u64 {
            return Err(Error::InvalidArg(format!(
                "segment ends at {} but buffer has {} bytes",
                end,
                buf.len()
            )));
        }
        let bytes = buf[offset as usize..end as usize].to_vec();
        offset = end;
        Ok(bytes)
    };

    let mut keys = Vec::with_capacity(count);
    for size in &key_sizes {
        keys.push(take(*size)?);
    }
    let mut pairs = Vec::with_capacity(count);
    for (key, size) in keys.into_iter().zip(val_sizes) {
        pairs.push((key, take(size)?));
    }
    Ok(pairs)
}
