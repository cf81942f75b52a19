//! Protocol definitions shared between the simulation server and its clients.
//!
//! Everything on the wire is a fixed binary layout: integers travel in
//! network byte order, `f64` values in host byte order (kept for
//! compatibility with existing visualiser and controller builds).

use thiserror::Error;

// Simulation tuning constants
pub const NUMBER_OF_CHECKS: u32 = 3;
pub const DIVIDING_LEVEL: u32 = 3;
pub const NO_COLLISION: f64 = -10_000.0;
pub const INF_COLLISION: f64 = 1_000_000.0;
pub const EPS: f64 = 1e-4;

pub const DEFAULT_SIMULATION_STEP: f64 = 0.04;
pub const DEFAULT_SIMULATION_DELAY_MS: u64 = 40;

// Shape ids as they appear in the first byte of an entity record
pub const SHAPE_RECTANGLE: u8 = 0;
pub const SHAPE_CIRCLE: u8 = 1;
pub const SHAPE_KHEPERA_ROBOT: u8 = 2;

// Client-type tags sent as the first handshake byte
pub const CLIENT_TYPE_VISUALISER: u8 = 1;
pub const CLIENT_TYPE_CONTROLLER: u8 = 2;

// Controller command ids
pub const CMD_SINGLE_MOTOR_SPEED_CHANGE: u8 = 0;
pub const CMD_MOTORS_SPEED_CHANGE: u8 = 1;

// Motor selector values for the single-motor command payload
pub const MOTOR_LEFT: u8 = 0;
pub const MOTOR_RIGHT: u8 = 1;

/// A point in the 2-D world. No identity, copied freely.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Moves the point by the given delta, in place.
    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.y += dy;
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Errors produced while decoding wire or snapshot data.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("record truncated: needed {needed} more bytes, {remaining} available")]
    Truncated { needed: usize, remaining: usize },
    #[error("malformed field: {0}")]
    Malformed(String),
}

/// Append-only encoder for the fixed binary layout.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Floats stay in host byte order on the wire.
    pub fn put_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_ne_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor-style decoder matching [`WireWriter`].
#[derive(Debug)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < len {
            return Err(WireError::Truncated {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn take_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    pub fn take_u16(&mut self) -> Result<u16, WireError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn take_u32(&mut self) -> Result<u32, WireError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn take_f64(&mut self) -> Result<f64, WireError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_ne_bytes(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_point_translate() {
        let mut p = Point::new(1.0, 2.0);
        p.translate(0.5, -1.0);
        assert_approx_eq!(p.x, 1.5);
        assert_approx_eq!(p.y, 1.0);
    }

    #[test]
    fn test_point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert_approx_eq!(a.distance(&b), 5.0);
        assert_approx_eq!(b.distance(&a), 5.0);
        assert_approx_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn test_writer_reader_roundtrip() {
        let mut writer = WireWriter::new();
        writer.put_u8(7);
        writer.put_u16(1025);
        writer.put_u32(99_999);
        writer.put_f64(-12.375);

        let bytes = writer.into_bytes();
        assert_eq!(bytes.len(), 1 + 2 + 4 + 8);

        let mut reader = WireReader::new(&bytes);
        assert_eq!(reader.take_u8().unwrap(), 7);
        assert_eq!(reader.take_u16().unwrap(), 1025);
        assert_eq!(reader.take_u32().unwrap(), 99_999);
        assert_eq!(reader.take_f64().unwrap(), -12.375);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_integers_are_network_byte_order() {
        let mut writer = WireWriter::new();
        writer.put_u16(0x0102);
        writer.put_u32(0x0304_0506);

        let bytes = writer.into_bytes();
        assert_eq!(&bytes[..2], &[0x01, 0x02]);
        assert_eq!(&bytes[2..], &[0x03, 0x04, 0x05, 0x06]);
    }

    #[test]
    fn test_reader_reports_truncation() {
        let bytes = [0x01, 0x02, 0x03];
        let mut reader = WireReader::new(&bytes);
        assert_eq!(reader.take_u16().unwrap(), 0x0102);

        match reader.take_u32() {
            Err(WireError::Truncated { needed, remaining }) => {
                assert_eq!(needed, 4);
                assert_eq!(remaining, 1);
            }
            other => panic!("expected truncation error, got {:?}", other),
        }
    }
}
