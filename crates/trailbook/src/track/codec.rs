//! Versioned binary codec for track point sequences.
//!
//! Blob layout, little endian:
//!
//! ```text
//! magic "TBTK" | version u8 | flags u8 | point_count u32
//! | min_lat i32 | min_lon i32 | max_lat i32 | max_lon i32
//! | payload_len u32 | payload | checksum [u8; 8]
//! ```
//!
//! The checksum is the leading 8 bytes of the BLAKE3 hash of everything before
//! it. Coordinates are quantized to a fixed step and every value is stored as a
//! zigzag LEB128 delta from the previous point.
//!
//! Version 1 (1e-5 degree coordinates, mandatory decimeter elevation, no
//! timestamps) is still decoded. Version 2 adds a per-point presence byte for
//! optional elevation and millisecond timestamps, and is what the encoder
//! writes.

use chrono::DateTime;
use tracing::{debug, trace};

use super::{BoundingBox, TrackPoint};
use crate::error::CodecError;

const MAGIC: [u8; 4] = *b"TBTK";
const HEADER_LEN: usize = 30;
const CHECKSUM_LEN: usize = 8;

/// Legacy format with 1e-5 degree coordinates and no timestamps.
pub const VERSION_V1: u8 = 1;
/// Current format with optional elevation and timestamps per point.
pub const VERSION_V2: u8 = 2;
/// Version written by [`TrackCodec::compress`].
pub const CURRENT_VERSION: u8 = VERSION_V2;

const V1_COORD_SCALE: f64 = 1e5;
const V2_COORD_SCALE: f64 = 1e6;
const ELEVATION_SCALE: f64 = 10.0;

/// Largest positional error per coordinate introduced by the current format,
/// in degrees (about 5.6 cm of latitude).
pub const COORDINATE_TOLERANCE_DEG: f64 = 0.5 / V2_COORD_SCALE;
/// Largest elevation error introduced by quantization, in meters.
pub const ELEVATION_TOLERANCE_M: f64 = 0.5 / ELEVATION_SCALE;

/// Elevations beyond this magnitude are rejected by the encoder.
const MAX_ABS_ELEVATION_M: f64 = 1.0e6;

const FLAG_ELEVATION: u8 = 0b01;
const FLAG_TIME: u8 = 0b10;

/// A track in its compact persisted form.
///
/// Produced once by [`TrackCodec::compress`] and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedTrack {
    version: u8,
    flags: u8,
    point_count: u32,
    bounds_q: [i32; 4],
    payload: Vec<u8>,
}

impl CompressedTrack {
    /// Format version tag of this track.
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Number of points encoded in the payload.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.point_count as usize
    }

    /// Whether the track encodes no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    /// Whether any point carries an elevation.
    #[must_use]
    pub fn has_elevation(&self) -> bool {
        self.flags & FLAG_ELEVATION != 0
    }

    /// Whether any point carries a timestamp.
    #[must_use]
    pub fn has_timestamps(&self) -> bool {
        self.flags & FLAG_TIME != 0
    }

    /// Geographic bounds of the encoded points, at the format's precision.
    #[must_use]
    pub fn bounds(&self) -> BoundingBox {
        let scale = coord_scale(self.version);
        BoundingBox {
            min_lat: f64::from(self.bounds_q[0]) / scale,
            min_lon: f64::from(self.bounds_q[1]) / scale,
            max_lat: f64::from(self.bounds_q[2]) / scale,
            max_lon: f64::from(self.bounds_q[3]) / scale,
        }
    }

    /// The opaque delta-encoded payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Size of the serialized blob in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len() + CHECKSUM_LEN
    }

    /// Serialize into the self-describing blob stored on disk.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&MAGIC);
        out.push(self.version);
        out.push(self.flags);
        out.extend_from_slice(&self.point_count.to_le_bytes());
        for q in self.bounds_q {
            out.extend_from_slice(&q.to_le_bytes());
        }
        #[allow(clippy::cast_possible_truncation)]
        let payload_len = self.payload.len() as u32;
        out.extend_from_slice(&payload_len.to_le_bytes());
        out.extend_from_slice(&self.payload);
        let checksum = checksum(&out);
        out.extend_from_slice(&checksum);
        out
    }

    /// Parse and verify a blob without decoding its points.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Corrupt`] if the blob is truncated, has a bad magic
    /// number, a length mismatch or a failing checksum, and
    /// [`CodecError::UnsupportedVersion`] for unknown version tags.
    pub fn from_bytes(blob: &[u8]) -> Result<Self, CodecError> {
        if blob.len() < MAGIC.len() + 1 {
            return Err(CodecError::corrupt(format!(
                "blob is {} bytes, shorter than the header",
                blob.len()
            )));
        }
        if blob[..4] != MAGIC {
            return Err(CodecError::corrupt("bad magic number"));
        }
        let version = blob[4];
        if !matches!(version, VERSION_V1 | VERSION_V2) {
            return Err(CodecError::UnsupportedVersion { version });
        }
        if blob.len() < HEADER_LEN + CHECKSUM_LEN {
            return Err(CodecError::corrupt(format!(
                "blob is {} bytes, shorter than the header",
                blob.len()
            )));
        }

        let flags = blob[5];
        let point_count = read_u32(blob, 6);
        let mut bounds_q = [0_i32; 4];
        for (i, q) in bounds_q.iter_mut().enumerate() {
            *q = read_i32(blob, 10 + i * 4);
        }
        let payload_len = read_u32(blob, 26) as usize;

        let expected_len = HEADER_LEN + payload_len + CHECKSUM_LEN;
        if blob.len() != expected_len {
            return Err(CodecError::corrupt(format!(
                "length mismatch: header declares {expected_len} bytes, blob has {}",
                blob.len()
            )));
        }

        let (body, stored) = blob.split_at(HEADER_LEN + payload_len);
        if checksum(body) != stored {
            return Err(CodecError::corrupt("checksum mismatch"));
        }

        Ok(Self {
            version,
            flags,
            point_count,
            bounds_q,
            payload: body[HEADER_LEN..].to_vec(),
        })
    }
}

/// Compressor and decompressor for track point sequences.
///
/// Stateless; safe to call from any number of threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackCodec;

impl TrackCodec {
    /// Compress an ordered point sequence into the current format.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidPoint`] for non-finite or out-of-range
    /// values, or when the sequence is too long for the format.
    #[allow(clippy::cast_possible_truncation)]
    pub fn compress(points: &[TrackPoint]) -> Result<CompressedTrack, CodecError> {
        let point_count = u32::try_from(points.len()).map_err(|_| CodecError::InvalidPoint {
            index: points.len(),
            reason: "too many points for the track format".to_string(),
        })?;

        let mut payload = Vec::with_capacity(points.len() * 6);
        let mut flags = 0_u8;
        let mut prev_lat = 0_i64;
        let mut prev_lon = 0_i64;
        let mut prev_ele = 0_i64;
        let mut prev_time = 0_i64;
        let mut bounds_q = [i32::MAX, i32::MAX, i32::MIN, i32::MIN];

        for (index, point) in points.iter().enumerate() {
            let (lat, lon) = quantize_position(index, point)?;

            let mut presence = 0_u8;
            let ele = match point.elevation {
                Some(e) => {
                    presence |= FLAG_ELEVATION;
                    Some(quantize_elevation(index, e)?)
                }
                None => None,
            };
            let time = point.timestamp.map(|t| {
                presence |= FLAG_TIME;
                t.timestamp_millis()
            });
            flags |= presence;

            payload.push(presence);
            write_signed(&mut payload, lat - prev_lat);
            write_signed(&mut payload, lon - prev_lon);
            if let Some(ele) = ele {
                write_signed(&mut payload, ele - prev_ele);
                prev_ele = ele;
            }
            if let Some(time) = time {
                write_signed(&mut payload, time.wrapping_sub(prev_time));
                prev_time = time;
            }
            prev_lat = lat;
            prev_lon = lon;

            bounds_q[0] = bounds_q[0].min(lat as i32);
            bounds_q[1] = bounds_q[1].min(lon as i32);
            bounds_q[2] = bounds_q[2].max(lat as i32);
            bounds_q[3] = bounds_q[3].max(lon as i32);
        }

        if points.is_empty() {
            bounds_q = [0; 4];
        }
        if u32::try_from(payload.len()).is_err() {
            return Err(CodecError::InvalidPoint {
                index: points.len(),
                reason: "encoded track exceeds the format size limit".to_string(),
            });
        }

        debug!(
            points = points.len(),
            bytes = payload.len(),
            "Compressed track"
        );
        Ok(CompressedTrack {
            version: CURRENT_VERSION,
            flags,
            point_count,
            bounds_q,
            payload,
        })
    }

    /// Decode a serialized blob into its point sequence.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Corrupt`] or [`CodecError::UnsupportedVersion`];
    /// on error no points are returned.
    pub fn decompress(blob: &[u8]) -> Result<Vec<TrackPoint>, CodecError> {
        let track = CompressedTrack::from_bytes(blob)?;
        Self::decode(&track)
    }

    /// Decode an already parsed track.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Corrupt`] if the payload is inconsistent with the
    /// header, and [`CodecError::UnsupportedVersion`] for unknown versions.
    pub fn decode(track: &CompressedTrack) -> Result<Vec<TrackPoint>, CodecError> {
        let points = match track.version {
            VERSION_V1 => decode_v1(track)?,
            VERSION_V2 => decode_v2(track)?,
            version => return Err(CodecError::UnsupportedVersion { version }),
        };
        trace!(
            version = track.version,
            points = points.len(),
            "Decoded track"
        );
        Ok(points)
    }
}

fn coord_scale(version: u8) -> f64 {
    if version == VERSION_V1 {
        V1_COORD_SCALE
    } else {
        V2_COORD_SCALE
    }
}

#[allow(clippy::cast_possible_truncation)]
fn quantize_position(index: usize, point: &TrackPoint) -> Result<(i64, i64), CodecError> {
    let invalid = |reason: String| CodecError::InvalidPoint { index, reason };
    if !point.latitude.is_finite() || !(-90.0..=90.0).contains(&point.latitude) {
        return Err(invalid(format!("latitude {} out of range", point.latitude)));
    }
    if !point.longitude.is_finite() || !(-180.0..=180.0).contains(&point.longitude) {
        return Err(invalid(format!("longitude {} out of range", point.longitude)));
    }
    Ok((
        (point.latitude * V2_COORD_SCALE).round() as i64,
        (point.longitude * V2_COORD_SCALE).round() as i64,
    ))
}

#[allow(clippy::cast_possible_truncation)]
fn quantize_elevation(index: usize, elevation: f64) -> Result<i64, CodecError> {
    if !elevation.is_finite() || elevation.abs() > MAX_ABS_ELEVATION_M {
        return Err(CodecError::InvalidPoint {
            index,
            reason: format!("elevation {elevation} out of range"),
        });
    }
    Ok((elevation * ELEVATION_SCALE).round() as i64)
}

fn decode_v1(track: &CompressedTrack) -> Result<Vec<TrackPoint>, CodecError> {
    let mut reader = Reader::new(&track.payload);
    let mut points = Vec::with_capacity(track.point_count());
    let (mut lat, mut lon, mut ele) = (0_i64, 0_i64, 0_i64);

    for _ in 0..track.point_count {
        lat = accumulate(lat, reader.signed()?)?;
        lon = accumulate(lon, reader.signed()?)?;
        ele = accumulate(ele, reader.signed()?)?;
        points.push(position(track, lat, lon)?.with_elevation(dequantize_elevation(ele)));
    }
    reader.finish()?;
    Ok(points)
}

fn decode_v2(track: &CompressedTrack) -> Result<Vec<TrackPoint>, CodecError> {
    let mut reader = Reader::new(&track.payload);
    let mut points = Vec::with_capacity(track.point_count());
    let (mut lat, mut lon, mut ele, mut time) = (0_i64, 0_i64, 0_i64, 0_i64);

    for index in 0..track.point_count {
        let presence = reader.byte()?;
        if presence & !track.flags != 0 {
            return Err(CodecError::corrupt(format!(
                "point {index} has presence bits {presence:#04b} not declared in header"
            )));
        }
        lat = accumulate(lat, reader.signed()?)?;
        lon = accumulate(lon, reader.signed()?)?;
        let mut point = position(track, lat, lon)?;

        if presence & FLAG_ELEVATION != 0 {
            ele = accumulate(ele, reader.signed()?)?;
            point.elevation = Some(dequantize_elevation(ele));
        }
        if presence & FLAG_TIME != 0 {
            time = time.wrapping_add(reader.signed()?);
            let ts = DateTime::from_timestamp_millis(time).ok_or_else(|| {
                CodecError::corrupt(format!("point {index} has an invalid timestamp"))
            })?;
            point.timestamp = Some(ts);
        }
        points.push(point);
    }
    reader.finish()?;
    Ok(points)
}

#[allow(clippy::cast_precision_loss)]
fn position(track: &CompressedTrack, lat: i64, lon: i64) -> Result<TrackPoint, CodecError> {
    let [min_lat, min_lon, max_lat, max_lon] = track.bounds_q.map(i64::from);
    if !(min_lat..=max_lat).contains(&lat) || !(min_lon..=max_lon).contains(&lon) {
        return Err(CodecError::corrupt("decoded point lies outside the header bounds"));
    }
    let scale = coord_scale(track.version);
    Ok(TrackPoint::new(lat as f64 / scale, lon as f64 / scale))
}

#[allow(clippy::cast_precision_loss)]
fn dequantize_elevation(q: i64) -> f64 {
    q as f64 / ELEVATION_SCALE
}

fn accumulate(value: i64, delta: i64) -> Result<i64, CodecError> {
    value
        .checked_add(delta)
        .ok_or_else(|| CodecError::corrupt("delta overflow"))
}

fn checksum(data: &[u8]) -> [u8; CHECKSUM_LEN] {
    let hash = blake3::hash(data);
    let mut out = [0_u8; CHECKSUM_LEN];
    out.copy_from_slice(&hash.as_bytes()[..CHECKSUM_LEN]);
    out
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn read_i32(buf: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[allow(clippy::cast_sign_loss)]
fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[allow(clippy::cast_possible_wrap)]
fn unzigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

fn write_signed(out: &mut Vec<u8>, value: i64) {
    let mut v = zigzag(value);
    loop {
        #[allow(clippy::cast_possible_truncation)]
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Cursor over a payload that reports truncation as corruption.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn byte(&mut self) -> Result<u8, CodecError> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| CodecError::corrupt("payload truncated"))?;
        self.pos += 1;
        Ok(b)
    }

    fn signed(&mut self) -> Result<i64, CodecError> {
        let mut value = 0_u64;
        for shift in (0..64).step_by(7) {
            let b = self.byte()?;
            let bits = u64::from(b & 0x7f);
            if shift == 63 && bits > 1 {
                return Err(CodecError::corrupt("varint overflow"));
            }
            value |= bits << shift;
            if b & 0x80 == 0 {
                return Ok(unzigzag(value));
            }
        }
        Err(CodecError::corrupt("varint overflow"))
    }

    fn finish(&self) -> Result<(), CodecError> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(CodecError::corrupt(format!(
                "{} trailing payload bytes",
                self.buf.len() - self.pos
            )))
        }
    }
}

/// Encode a blob in the legacy version 1 layout.
#[cfg(test)]
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn encode_v1(points: &[TrackPoint]) -> Vec<u8> {
    let mut payload = Vec::new();
    let (mut prev_lat, mut prev_lon, mut prev_ele) = (0_i64, 0_i64, 0_i64);
    let mut bounds_q = [i32::MAX, i32::MAX, i32::MIN, i32::MIN];
    for p in points {
        let (lat, lon, ele) = (
            (p.latitude * V1_COORD_SCALE).round() as i64,
            (p.longitude * V1_COORD_SCALE).round() as i64,
            (p.elevation.unwrap_or(0.0) * ELEVATION_SCALE).round() as i64,
        );
        write_signed(&mut payload, lat - prev_lat);
        write_signed(&mut payload, lon - prev_lon);
        write_signed(&mut payload, ele - prev_ele);
        (prev_lat, prev_lon, prev_ele) = (lat, lon, ele);
        bounds_q[0] = bounds_q[0].min(lat as i32);
        bounds_q[1] = bounds_q[1].min(lon as i32);
        bounds_q[2] = bounds_q[2].max(lat as i32);
        bounds_q[3] = bounds_q[3].max(lon as i32);
    }
    if points.is_empty() {
        bounds_q = [0; 4];
    }
    CompressedTrack {
        version: VERSION_V1,
        flags: FLAG_ELEVATION,
        point_count: points.len() as u32,
        bounds_q,
        payload,
    }
    .to_bytes()
}
