//! # Packet
//!
//! The wire message: a 6-byte header (16-bit message id, 32-bit body length,
//! both little-endian) followed by the body. Header and body live in one
//! pool-backed buffer so [`Packet::data`] hands the transport a single
//! contiguous slice.
//!
//! Bodies are built with typed `append_*` operations and consumed with typed
//! `read_*` operations through a sequential cursor. All multi-byte fields are
//! fixed-width little-endian; floats travel as their IEEE-754 bit patterns.
//! Variable-length fields carry a `u32` length prefix.
//!
//! ## Ownership
//! A packet has exactly one owner. Slices returned by `read_*` borrow the
//! packet and cannot outlive it. On drop the buffer returns to its size
//! class, on every exit path.
//!
//! ## Panics
//! Reading past the written body length panics. That is a decoding-logic bug
//! in the caller, not a remote-input condition: the codec only ever produces
//! packets whose declared and actual lengths agree, so a cursor overrun means
//! the message schema in code disagrees with the message that code itself
//! accepted. Malformed *remote* input must be handled by checking
//! [`Packet::remaining`] before reading, as the control-message decoder does.

use std::fmt;

use crate::core::pool::BufferPool;

/// Bytes of header preceding every body: 2-byte id + 4-byte length.
pub const HEADER_LEN: usize = 6;

/// Initial body capacity for packets built from scratch. Below the minimum
/// pool class on purpose: tiny packets skip the pool entirely.
const SMALL_BODY_CAPACITY: usize = 32;

/// A mutable binary wire message.
pub struct Packet {
    /// Header + body. `buf.len()` is always `HEADER_LEN + body_len`.
    buf: Vec<u8>,
    /// Body bytes consumed by `read_*` so far.
    cursor: usize,
}

impl Packet {
    /// New empty packet with the header pre-written and body length 0.
    pub fn new(id: u16) -> Self {
        Self::with_capacity(id, SMALL_BODY_CAPACITY)
    }

    /// New empty packet with room for `body_capacity` bytes, pool-sourced
    /// when the capacity lands in a pool class.
    pub fn with_capacity(id: u16, body_capacity: usize) -> Self {
        let mut buf = BufferPool::global().acquire(body_capacity);
        buf.extend_from_slice(&id.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        Self { buf, cursor: 0 }
    }

    /// Message id from the header.
    pub fn id(&self) -> u16 {
        u16::from_le_bytes([self.buf[0], self.buf[1]])
    }

    /// Rewrite the message id in place.
    pub fn set_id(&mut self, id: u16) {
        self.buf[0..2].copy_from_slice(&id.to_le_bytes());
    }

    /// Number of valid body bytes written so far.
    pub fn body_len(&self) -> usize {
        self.buf.len() - HEADER_LEN
    }

    /// The body bytes.
    pub fn body(&self) -> &[u8] {
        &self.buf[HEADER_LEN..]
    }

    /// Header + body, ready for transmission.
    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    /// Body bytes not yet consumed by the read cursor.
    pub fn remaining(&self) -> usize {
        self.body_len() - self.cursor
    }

    /// Rewind the read cursor to the start of the body.
    pub fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    /// Keep the length field in the header in sync with the written body.
    fn sync_len_header(&mut self) {
        let body_len = self.body_len() as u32;
        self.buf[2..6].copy_from_slice(&body_len.to_le_bytes());
    }

    /// Grow through the pool when the current buffer cannot hold `additional`
    /// more bytes: acquire the next class, copy valid bytes, release the old
    /// buffer to its class.
    fn ensure_capacity(&mut self, additional: usize) {
        if self.buf.len() + additional <= self.buf.capacity() {
            return;
        }
        // At least double so repeated small appends stay amortized.
        let need = (self.body_len() + additional).max(self.body_len() * 2);
        let pool = BufferPool::global();
        let mut grown = pool.acquire(need);
        grown.extend_from_slice(&self.buf);
        let old = std::mem::replace(&mut self.buf, grown);
        pool.release(old);
    }

    // --- append operations ------------------------------------------------

    /// Append raw bytes with no length prefix.
    pub fn append_raw(&mut self, bytes: &[u8]) {
        self.ensure_capacity(bytes.len());
        self.buf.extend_from_slice(bytes);
        self.sync_len_header();
    }

    pub fn append_u8(&mut self, v: u8) {
        self.append_raw(&[v]);
    }

    pub fn append_bool(&mut self, v: bool) {
        self.append_u8(u8::from(v));
    }

    pub fn append_u16(&mut self, v: u16) {
        self.append_raw(&v.to_le_bytes());
    }

    pub fn append_u32(&mut self, v: u32) {
        self.append_raw(&v.to_le_bytes());
    }

    pub fn append_u64(&mut self, v: u64) {
        self.append_raw(&v.to_le_bytes());
    }

    /// IEEE-754 bits, little-endian.
    pub fn append_f32(&mut self, v: f32) {
        self.append_u32(v.to_bits());
    }

    /// IEEE-754 bits, little-endian.
    pub fn append_f64(&mut self, v: f64) {
        self.append_u64(v.to_bits());
    }

    /// Append a `u32`-length-prefixed byte blob.
    pub fn append_bytes(&mut self, bytes: &[u8]) {
        self.append_u32(bytes.len() as u32);
        self.append_raw(bytes);
    }

    /// Append a `u32`-length-prefixed UTF-8 string.
    pub fn append_str(&mut self, s: &str) {
        self.append_bytes(s.as_bytes());
    }

    // --- read operations --------------------------------------------------

    /// Consume `n` body bytes at the cursor.
    ///
    /// # Panics
    /// Panics when fewer than `n` bytes remain; see the module docs.
    pub fn read_raw(&mut self, n: usize) -> &[u8] {
        assert!(
            self.cursor + n <= self.body_len(),
            "packet read past written body: id={}, cursor={}, want={}, body_len={}",
            self.id(),
            self.cursor,
            n,
            self.body_len()
        );
        let start = HEADER_LEN + self.cursor;
        self.cursor += n;
        &self.buf[start..start + n]
    }

    pub fn read_u8(&mut self) -> u8 {
        self.read_raw(1)[0]
    }

    pub fn read_bool(&mut self) -> bool {
        self.read_u8() != 0
    }

    pub fn read_u16(&mut self) -> u16 {
        let mut raw = [0u8; 2];
        raw.copy_from_slice(self.read_raw(2));
        u16::from_le_bytes(raw)
    }

    pub fn read_u32(&mut self) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.read_raw(4));
        u32::from_le_bytes(raw)
    }

    pub fn read_u64(&mut self) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.read_raw(8));
        u64::from_le_bytes(raw)
    }

    pub fn read_f32(&mut self) -> f32 {
        f32::from_bits(self.read_u32())
    }

    pub fn read_f64(&mut self) -> f64 {
        f64::from_bits(self.read_u64())
    }

    /// Consume a `u32`-length-prefixed byte blob.
    pub fn read_bytes(&mut self) -> &[u8] {
        let n = self.read_u32() as usize;
        self.read_raw(n)
    }

    /// Consume a `u32`-length-prefixed UTF-8 string.
    ///
    /// Invalid UTF-8 is a data error, not a cursor error, so it reports
    /// rather than panics.
    pub fn read_str(&mut self) -> crate::error::Result<&str> {
        let bytes = self.read_bytes();
        std::str::from_utf8(bytes)
            .map_err(|e| crate::error::GateError::MalformedBody(format!("invalid utf-8: {e}")))
    }
}

impl Drop for Packet {
    fn drop(&mut self) {
        BufferPool::global().release(std::mem::take(&mut self.buf));
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("id", &self.id())
            .field("body_len", &self.body_len())
            .field("cursor", &self.cursor)
            .finish()
    }
}
