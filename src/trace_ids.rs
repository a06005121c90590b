use std::fmt;
use std::num::ParseIntError;
use std::ops::{BitAnd, BitOr, Not};

/// Flags that can be set on a [`SpanContext`](crate::trace::SpanContext).
///
/// Only the low `sampled` bit has cross-format meaning; the remaining bits
/// are carried opaquely so format-specific flags survive a round trip.
#[derive(Clone, Debug, Default, PartialEq, Eq, Copy, Hash)]
pub struct TraceFlags(u8);

impl TraceFlags {
    /// Trace flags with the `sampled` flag cleared.
    pub const NOT_SAMPLED: TraceFlags = TraceFlags(0x00);

    /// Trace flags with the `sampled` flag set.
    ///
    /// Spans that are not sampled will be ignored by most tracing backends.
    pub const SAMPLED: TraceFlags = TraceFlags(0x01);

    /// Construct new trace flags from a raw byte.
    pub const fn new(flags: u8) -> Self {
        TraceFlags(flags)
    }

    /// Returns `true` if the `sampled` flag is set.
    pub fn is_sampled(&self) -> bool {
        (*self & TraceFlags::SAMPLED) == TraceFlags::SAMPLED
    }

    /// Returns a copy of these flags with the `sampled` flag set or cleared.
    pub fn with_sampled(&self, sampled: bool) -> Self {
        if sampled {
            *self | TraceFlags::SAMPLED
        } else {
            *self & !TraceFlags::SAMPLED
        }
    }

    /// Returns the flags as a raw byte.
    pub fn to_u8(self) -> u8 {
        self.0
    }
}

impl BitAnd for TraceFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl BitOr for TraceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl Not for TraceFlags {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self(!self.0)
    }
}

impl fmt::LowerHex for TraceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// A 16-byte value identifying a trace.
///
/// The id is valid if it contains at least one non-zero byte.
#[derive(Clone, PartialEq, Eq, Copy, Hash)]
pub struct TraceId(u128);

impl TraceId {
    /// The invalid (all-zero) trace id.
    pub const INVALID: TraceId = TraceId(0);

    /// Create a trace id from its representation as a byte array.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        TraceId(u128::from_be_bytes(bytes))
    }

    /// Return the representation of this trace id as a byte array.
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Converts a base-16 string into a trace id.
    ///
    /// Inputs shorter than 32 hex characters are interpreted as if left-padded
    /// with zeros, which is what the B3 and Jaeger wire formats require of
    /// short ids. Character-set restrictions (for example, lowercase-only
    /// hex) are the caller's concern.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u128::from_str_radix(hex, 16).map(TraceId)
    }
}

impl From<u128> for TraceId {
    fn from(value: u128) -> Self {
        TraceId(value)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:032x}", self.0))
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:032x}", self.0))
    }
}

impl fmt::LowerHex for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// An 8-byte value identifying a span.
///
/// The id is valid if it contains at least one non-zero byte.
#[derive(Clone, PartialEq, Eq, Copy, Hash)]
pub struct SpanId(u64);

impl SpanId {
    /// The invalid (all-zero) span id.
    pub const INVALID: SpanId = SpanId(0);

    /// Create a span id from its representation as a byte array.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        SpanId(u64::from_be_bytes(bytes))
    }

    /// Return the representation of this span id as a byte array.
    pub const fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Converts a base-16 string into a span id.
    ///
    /// Short inputs are interpreted as left-zero-padded, as with
    /// [`TraceId::from_hex`].
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u64::from_str_radix(hex, 16).map(SpanId)
    }
}

impl From<u64> for SpanId {
    fn from(value: u64) -> Self {
        SpanId(value)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}

impl fmt::LowerHex for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    fn trace_id_test_data() -> Vec<(TraceId, &'static str, [u8; 16])> {
        vec![
            (TraceId(0), "00000000000000000000000000000000", [0; 16]),
            (TraceId(42), "0000000000000000000000000000002a", [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 42]),
            (TraceId(0x5f46_7fe7_bf42_676c_05e2_0ba4_a90e_448e), "5f467fe7bf42676c05e20ba4a90e448e", [95, 70, 127, 231, 191, 66, 103, 108, 5, 226, 11, 164, 169, 14, 68, 142]),
        ]
    }

    #[rustfmt::skip]
    fn span_id_test_data() -> Vec<(SpanId, &'static str, [u8; 8])> {
        vec![
            (SpanId(0), "0000000000000000", [0; 8]),
            (SpanId(42), "000000000000002a", [0, 0, 0, 0, 0, 0, 0, 42]),
            (SpanId(0x4c72_1bf3_3e3c_af8f), "4c721bf33e3caf8f", [76, 114, 27, 243, 62, 60, 175, 143]),
        ]
    }

    #[test]
    fn trace_id_formats_and_parses() {
        for (id, hex, bytes) in trace_id_test_data() {
            assert_eq!(format!("{}", id), hex);
            assert_eq!(id.to_bytes(), bytes);
            assert_eq!(id, TraceId::from_hex(hex).unwrap());
            assert_eq!(id, TraceId::from_bytes(bytes));
        }
    }

    #[test]
    fn span_id_formats_and_parses() {
        for (id, hex, bytes) in span_id_test_data() {
            assert_eq!(format!("{}", id), hex);
            assert_eq!(id.to_bytes(), bytes);
            assert_eq!(id, SpanId::from_hex(hex).unwrap());
            assert_eq!(id, SpanId::from_bytes(bytes));
        }
    }

    #[test]
    fn short_hex_is_left_padded() {
        assert_eq!(
            TraceId::from_hex("80f198ee56343ba8").unwrap(),
            TraceId::from_hex("000000000000000080f198ee56343ba8").unwrap(),
        );
        assert_eq!(SpanId::from_hex("2a").unwrap(), SpanId(42));
    }

    #[test]
    fn sampled_flag_round_trip() {
        assert!(TraceFlags::SAMPLED.is_sampled());
        assert!(!TraceFlags::NOT_SAMPLED.is_sampled());
        assert!(TraceFlags::new(0xff).is_sampled());
        assert!(!TraceFlags::new(0xfe).is_sampled());
        assert_eq!(TraceFlags::new(0x05).with_sampled(false).to_u8(), 0x04);
        assert_eq!(TraceFlags::NOT_SAMPLED.with_sampled(true), TraceFlags::SAMPLED);
    }
}
