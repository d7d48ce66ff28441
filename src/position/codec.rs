// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Fixed-width digit strings over a 64-symbol, order-preserving alphabet.
//!
//! A magnitude `n` in `0..64^width` is written most-significant digit first, each digit being the
//! symbol at that index of [`ALPHABET`]. The alphabet is sorted by code point, so for two digit
//! strings of the same width byte-wise comparison agrees with numeric comparison.
use super::PositionError;

/// The digit symbols, in increasing digit value (and increasing code point).
///
/// Digits, the two punctuation symbols that immediately follow `9` in ASCII, then the upper and
/// lower case latin alphabet.
pub const ALPHABET: &[u8; 64] = b"0123456789:;ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Number of bits encoded by a single digit.
const DIGIT_BITS: u32 = 6;

/// The widest supported digit string; `64^10` is the largest power of 64 that fits a `u64`.
pub const MAX_WIDTH: usize = 10;

/// Checks that `width` is within `1..=MAX_WIDTH`.
pub(crate) fn check_width(width: usize) -> Result<(), PositionError> {
    if (1..=MAX_WIDTH).contains(&width) {
        Ok(())
    } else {
        Err(PositionError::InvalidWidth(width))
    }
}

/// Returns the largest magnitude representable with `width` digits, ie `64^width - 1`.
///
/// `width` must already have been validated with [`check_width`].
pub(crate) fn max_magnitude(width: usize) -> u64 {
    debug_assert!((1..=MAX_WIDTH).contains(&width));
    (1u64 << (DIGIT_BITS as usize * width)) - 1
}

/// Returns the digit value of `symbol`, if it is part of [`ALPHABET`].
fn digit_value(symbol: u8) -> Option<u64> {
    let value = match symbol {
        b'0'..=b';' => symbol - b'0',
        b'A'..=b'Z' => symbol - b'A' + 12,
        b'a'..=b'z' => symbol - b'a' + 38,
        _ => return None,
    };
    Some(u64::from(value))
}

/// Encodes `n` as a digit string of exactly `width` symbols.
///
/// ```rust
/// # use convergent::position::codec;
/// assert_eq!(codec::encode(0, 4).unwrap(), "0000");
/// assert_eq!(codec::encode(63, 2).unwrap(), "0z");
/// assert!(codec::encode(64, 1).is_err());
/// ```
pub fn encode(n: u64, width: usize) -> Result<String, PositionError> {
    check_width(width)?;
    if n > max_magnitude(width) {
        return Err(PositionError::MagnitudeOutOfRange {
            magnitude: n,
            width,
        });
    }
    let mut out = String::with_capacity(width);
    push_digits(&mut out, n, width);
    Ok(out)
}

/// Appends the `width`-digit representation of `n` to `out`.
///
/// Callers guarantee that `n` fits in `width` digits.
pub(crate) fn push_digits(out: &mut String, n: u64, width: usize) {
    out.extend(digits(n, width).map(char::from));
}

/// Decodes a digit string back into its magnitude.
///
/// The width of the string is implied by its length, which must be within `1..=MAX_WIDTH`.
pub fn decode(s: &str) -> Result<u64, PositionError> {
    check_width(s.len())?;
    s.bytes().try_fold(0u64, |acc, symbol| {
        let digit = digit_value(symbol).ok_or_else(|| {
            // the string may hold multi-byte chars; report the char rather than a byte of it
            let c = s
                .chars()
                .find(|c| !c.is_ascii() || digit_value(*c as u8).is_none())
                .unwrap_or(char::from(symbol));
            PositionError::InvalidDigit(c)
        })?;
        Ok((acc << DIGIT_BITS) | digit)
    })
}

/// Yields the symbols of the digit string of `n`, most significant first.
pub(crate) fn digits(n: u64, width: usize) -> impl Iterator<Item = u8> {
    (0..width).rev().map(move |i| ALPHABET[((n >> (DIGIT_BITS as usize * i)) & 0x3f) as usize])
}
