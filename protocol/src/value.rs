//! Decoded field values and the temporal types with their validity ranges.
//! Grounded on `connection::conn::query_result`'s text-protocol value
//! parsing, generalized to also cover the binary protocol's typed encoding
//! and to carry temporal fields as structured values instead of strings.

use common::err::decode_error::ReError;
use common::err::CResult;

/// A single decoded field value, independent of wire protocol (text vs
/// binary) and of whether it came from a dynamic or statically-typed sink.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Null,
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    String(Vec<u8>),
    Blob(Vec<u8>),
    Date(Date),
    DateTime(DateTime),
    Time(Time),
}

/// A calendar date. The all-zero value (`0000-00-00`) is a valid MySQL
/// sentinel meaning "no date" and is represented, not rejected, at this
/// layer; range validation only rejects out-of-domain values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Date {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl Date {
    pub fn zero() -> Self {
        Date::default()
    }

    pub fn is_zero(&self) -> bool {
        self.year == 0 && self.month == 0 && self.day == 0
    }

    /// Checks the value is either the zero sentinel or within the ranges
    /// the wire format can encode: year 0-9999, month 0-12, day 0-31.
    pub fn is_valid(&self) -> bool {
        self.year <= 9999 && self.month <= 12 && self.day <= 31
    }
}

/// A calendar date-time with microsecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateTime {
    pub date: Date,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub microsecond: u32,
}

impl DateTime {
    pub fn is_valid(&self) -> bool {
        self.date.is_valid()
            && self.hour <= 23
            && self.minute <= 59
            && self.second <= 59
            && self.microsecond <= 999_999
    }
}

/// A duration or time-of-day value. MySQL's `TIME` ranges over roughly
/// ±839 hours, so it is represented as signed days/hours rather than
/// clamped to a 24-hour clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Time {
    pub negative: bool,
    pub days: u32,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub microsecond: u32,
}

impl Time {
    /// `TIME` is specified over `-838:59:59` to `838:59:59`; `days` folds
    /// the hour count above 24, so a 34-day span covers the full range
    /// (34 * 24 = 816 hours, plus the `hours` field's own 0-23).
    pub fn is_valid(&self) -> bool {
        self.days <= 34
            && self.hours <= 23
            && self.minutes <= 59
            && self.seconds <= 59
            && self.microsecond <= 999_999
    }

    pub fn total_hours(&self) -> i64 {
        let magnitude = self.days as i64 * 24 + self.hours as i64;
        if self.negative {
            -magnitude
        } else {
            magnitude
        }
    }
}

impl Field {
    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }

    /// Narrows to `i64`, following MySQL's own lossless-conversion rule:
    /// an unsigned value is only representable if it fits below `i64::MAX`.
    pub fn as_i64(&self) -> CResult<i64> {
        match self {
            Field::Int(v) => Ok(*v),
            Field::UInt(v) if *v <= i64::MAX as u64 => Ok(*v as i64),
            Field::UInt(v) => Err(ReError::ProtocolValue(format!(
                "unsigned value {v} does not fit in i64"
            ))),
            other => Err(ReError::ProtocolValue(format!(
                "expected an integer field, got {other:?}"
            ))),
        }
    }

    pub fn as_bytes(&self) -> CResult<&[u8]> {
        match self {
            Field::String(b) | Field::Blob(b) => Ok(b),
            other => Err(ReError::ProtocolValue(format!(
                "expected a string/blob field, got {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_date_is_valid_sentinel() {
        let d = Date::zero();
        assert!(d.is_zero());
        assert!(d.is_valid());
    }

    #[test]
    fn date_rejects_out_of_domain_month() {
        let d = Date { year: 2024, month: 13, day: 1 };
        assert!(!d.is_valid());
    }

    #[test]
    fn time_range_boundaries() {
        let max = Time { negative: false, days: 34, hours: 22, minutes: 59, seconds: 59, microsecond: 999_999 };
        assert!(max.is_valid());
        let over = Time { negative: false, days: 35, hours: 0, minutes: 0, seconds: 0, microsecond: 0 };
        assert!(!over.is_valid());
    }

    #[test]
    fn as_i64_rejects_unrepresentable_unsigned() {
        let huge = Field::UInt(u64::MAX);
        assert!(huge.as_i64().is_err());
        assert_eq!(Field::UInt(41).as_i64().unwrap(), 41);
    }
}
