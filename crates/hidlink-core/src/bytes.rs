//! Fixed-width integer encodings used inside message payloads.
//!
//! Microcontroller firmware on the other end of the link picks its own byte
//! order per field, so both orders are provided. Results never depend on the
//! host's native endianness.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use thiserror::Error;

/// Width of every integer handled here.
pub const INT_WIDTH: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Encode `value` with the most significant byte first.
pub fn int_to_big_endian(value: i32) -> [u8; INT_WIDTH] {
    let mut buf = [0u8; INT_WIDTH];
    BigEndian::write_i32(&mut buf, value);
    buf
}

/// Encode `value` with the least significant byte first.
pub fn int_to_little_endian(value: i32) -> [u8; INT_WIDTH] {
    let mut buf = [0u8; INT_WIDTH];
    LittleEndian::write_i32(&mut buf, value);
    buf
}

/// Decode a big-endian integer. `bytes` must be exactly four bytes long.
pub fn big_endian_to_int(bytes: &[u8]) -> Result<i32, CodecError> {
    check_width(bytes)?;
    Ok(BigEndian::read_i32(bytes))
}

/// Decode a little-endian integer. `bytes` must be exactly four bytes long.
pub fn little_endian_to_int(bytes: &[u8]) -> Result<i32, CodecError> {
    check_width(bytes)?;
    Ok(LittleEndian::read_i32(bytes))
}

fn check_width(bytes: &[u8]) -> Result<(), CodecError> {
    if bytes.len() != INT_WIDTH {
        return Err(CodecError::InvalidLength {
            expected: INT_WIDTH,
            actual: bytes.len(),
        });
    }
    Ok(())
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_big_endian_round_trip(value in any::<i32>()) {
            prop_assert_eq!(big_endian_to_int(&int_to_big_endian(value)), Ok(value));
        }

        #[test]
        fn prop_little_endian_round_trip(value in any::<i32>()) {
            let bytes = int_to_little_endian(value);
            prop_assert_eq!(little_endian_to_int(&bytes), Ok(value));
        }

        /// The two orders are byte reversals of each other.
        #[test]
        fn prop_orders_are_reversed(value in any::<i32>()) {
            let mut reversed = int_to_big_endian(value);
            reversed.reverse();
            prop_assert_eq!(reversed, int_to_little_endian(value));
        }

        #[test]
        fn prop_wrong_width_rejected(bytes in proptest::collection::vec(any::<u8>(), 0..16)) {
            prop_assume!(bytes.len() != INT_WIDTH);
            prop_assert!(big_endian_to_int(&bytes).is_err());
            prop_assert!(little_endian_to_int(&bytes).is_err());
        }
    }
}
