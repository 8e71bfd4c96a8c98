//! PostgreSQL binary COPY encoding.
//!
//! Produces a complete `COPY ... FROM STDIN WITH (FORMAT BINARY)` payload:
//! the 19-byte header, one tuple per row and the `-1` trailer. Each value is
//! encoded in the server's binary send format for the field's declared type,
//! so the record's field types must match the column types.

use bytes::{BufMut, BytesMut};
use chrono::{Datelike, Timelike};
use rust_decimal::Decimal;

use crate::core::value::{Row, SqlValue};

/// Binary COPY signature.
const COPY_SIGNATURE: &[u8] = b"PGCOPY\n\xff\r\n\0";

/// 2000-01-01T00:00:00Z as microseconds since the Unix epoch.
const PG_EPOCH_UNIX_MICROS: i64 = 946_684_800_000_000;

/// 2000-01-01 as days since 0001-01-01 (chrono's `num_days_from_ce`).
const PG_EPOCH_DAYS_FROM_CE: i32 = 730_120;

const NUMERIC_POS: i16 = 0x0000;
const NUMERIC_NEG: i16 = 0x4000;

/// Encode `rows` as one binary COPY payload.
pub fn encode_copy_rows(rows: &[Row]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(rows.len() * 128 + 32);

    buf.put_slice(COPY_SIGNATURE);
    buf.put_i32(0); // flags
    buf.put_i32(0); // header extension length

    for row in rows {
        buf.put_i16(row.len() as i16);
        for value in row {
            write_binary_value(&mut buf, value);
        }
    }

    buf.put_i16(-1);
    buf
}

/// Write one length-prefixed field.
fn write_binary_value(buf: &mut BytesMut, value: &SqlValue<'_>) {
    match value {
        SqlValue::Null(_) => buf.put_i32(-1),
        SqlValue::Bool(b) => {
            buf.put_i32(1);
            buf.put_u8(u8::from(*b));
        }
        SqlValue::I16(i) => {
            buf.put_i32(2);
            buf.put_i16(*i);
        }
        SqlValue::I32(i) => {
            buf.put_i32(4);
            buf.put_i32(*i);
        }
        SqlValue::I64(i) => {
            buf.put_i32(8);
            buf.put_i64(*i);
        }
        SqlValue::F32(f) => {
            buf.put_i32(4);
            buf.put_f32(*f);
        }
        SqlValue::F64(f) => {
            buf.put_i32(8);
            buf.put_f64(*f);
        }
        SqlValue::Text(s) => {
            buf.put_i32(s.len() as i32);
            buf.put_slice(s.as_bytes());
        }
        SqlValue::Bytes(b) => {
            buf.put_i32(b.len() as i32);
            buf.put_slice(b);
        }
        SqlValue::Uuid(u) => {
            buf.put_i32(16);
            buf.put_slice(u.as_bytes());
        }
        SqlValue::Decimal(d) => encode_numeric(buf, d),
        SqlValue::DateTime(dt) => {
            buf.put_i32(8);
            buf.put_i64(dt.and_utc().timestamp_micros() - PG_EPOCH_UNIX_MICROS);
        }
        SqlValue::DateTimeOffset(dto) => {
            // timestamptz travels as UTC
            buf.put_i32(8);
            buf.put_i64(dto.timestamp_micros() - PG_EPOCH_UNIX_MICROS);
        }
        SqlValue::Date(d) => {
            buf.put_i32(4);
            buf.put_i32(d.num_days_from_ce() - PG_EPOCH_DAYS_FROM_CE);
        }
        SqlValue::Time(t) => {
            let micros =
                t.num_seconds_from_midnight() as i64 * 1_000_000 + (t.nanosecond() / 1000) as i64;
            buf.put_i32(8);
            buf.put_i64(micros);
        }
    }
}

/// Encode a Decimal in NUMERIC binary format.
///
/// Layout: ndigits, weight, sign and dscale (all i16), then `ndigits`
/// base-10000 digits, most significant first. `weight` is the power of 10000
/// of the first digit.
fn encode_numeric(buf: &mut BytesMut, d: &Decimal) {
    let scale = d.scale();

    if d.is_zero() {
        buf.put_i32(8);
        buf.put_i16(0);
        buf.put_i16(0);
        buf.put_i16(NUMERIC_POS);
        buf.put_i16(scale as i16);
        return;
    }

    // Align the fraction to whole base-10000 groups
    let pad = (4 - scale % 4) % 4;
    let mut mantissa = d.mantissa().unsigned_abs() * 10u128.pow(pad);
    let frac_groups = ((scale + pad) / 4) as i16;

    // Least significant group first
    let mut groups: Vec<i16> = Vec::new();
    while mantissa > 0 {
        groups.push((mantissa % 10_000) as i16);
        mantissa /= 10_000;
    }
    let weight = groups.len() as i16 - 1 - frac_groups;

    // Trailing zero groups carry no information
    let first_nonzero = groups.iter().position(|&g| g != 0).unwrap_or(0);
    let digits: Vec<i16> = groups[first_nonzero..].iter().rev().copied().collect();

    let sign = if d.is_sign_negative() {
        NUMERIC_NEG
    } else {
        NUMERIC_POS
    };

    buf.put_i32(8 + digits.len() as i32 * 2);
    buf.put_i16(digits.len() as i16);
    buf.put_i16(weight);
    buf.put_i16(sign);
    buf.put_i16(scale as i16);
    for digit in digits {
        buf.put_i16(digit);
    }
}
