//! Connection handle allocation
//!
//! Handles are derived from the request sequence number so that a driver can
//! predict them: the n-th attempt (0-based) gets `(n + 0x10) % 0xe00`.
//! Arithmetic is 32-bit wrapping, matching controllers that keep the counter
//! in a `u32`.

/// Added to the sequence number before reduction
pub const HANDLE_OFFSET: u32 = 0x10;

/// Size of the handle space
pub const HANDLE_SPACE: u32 = 0xe00;

/// Handle reported in failed connection events
pub const FAILED_CONNECTION_HANDLE: u16 = 0;

/// Map a request sequence number to its connection handle
pub fn to_handle(seq: u32) -> u16 {
    (seq.wrapping_add(HANDLE_OFFSET) % HANDLE_SPACE) as u16
}
