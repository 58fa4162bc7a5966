//! Wire framing for the printable-count protocol.
//!
//! A connection carries exactly two integers, both unsigned 32-bit in
//! network byte order:
//!
//! ```text
//! client -> server: N (payload length), followed by N raw bytes
//! server -> client: C (number of printable bytes in the payload)
//! ```
//!
//! No result is sent back when N is zero.

use bytes::{Buf, BufMut};

/// Width in bytes of every integer on the wire.
pub const FRAME_LEN: usize = 4;

/// Encode a value as 4 bytes in network byte order.
pub fn encode_u32(value: u32) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    (&mut frame[..]).put_u32(value);
    frame
}

/// Decode 4 bytes in network byte order.
pub fn decode_u32(frame: [u8; FRAME_LEN]) -> u32 {
    (&frame[..]).get_u32()
}
