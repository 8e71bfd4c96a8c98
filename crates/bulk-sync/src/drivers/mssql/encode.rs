//! TDS bulk-load row encoding.
//!
//! Converts [`SqlValue`]s into tiberius `ColumnData` and lines rows up with
//! the column order the server announces for `INSERT BULK`.

use std::borrow::Cow;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use tiberius::time::{Date, DateTime2, DateTimeOffset, Time};
use tiberius::{ColumnData, TokenRow};

use crate::core::value::{SqlNullType, SqlValue};

/// Fractional-second digits for `time`, `datetime2` and `datetimeoffset`.
const TIME_SCALE: u8 = 7;

/// Build a bulk-load row from values in column order.
///
/// Fails with the reason for the first value SQL Server cannot store.
pub fn token_row(values: &[SqlValue<'_>]) -> Result<TokenRow<'static>, String> {
    let mut row = TokenRow::with_capacity(values.len());
    for value in values {
        row.push(to_column_data(value)?);
    }
    Ok(row)
}

/// Convert one value. NULLs keep their declared type.
///
/// SQL Server has no NaN or infinity and no dates before 0001-01-01; those
/// values are rejected rather than written as NULL.
pub fn to_column_data(value: &SqlValue<'_>) -> Result<ColumnData<'static>, String> {
    let data = match value {
        SqlValue::Null(null_type) => null_column(*null_type),
        SqlValue::Bool(b) => ColumnData::Bit(Some(*b)),
        SqlValue::I16(i) => ColumnData::I16(Some(*i)),
        SqlValue::I32(i) => ColumnData::I32(Some(*i)),
        SqlValue::I64(i) => ColumnData::I64(Some(*i)),
        SqlValue::F32(f) => ColumnData::F32(Some(finite(*f as f64, "real").map(|_| *f)?)),
        SqlValue::F64(f) => ColumnData::F64(Some(finite(*f, "float")?)),
        SqlValue::Text(s) => ColumnData::String(Some(Cow::Owned(s.to_string()))),
        SqlValue::Bytes(b) => ColumnData::Binary(Some(Cow::Owned(b.to_vec()))),
        SqlValue::Uuid(u) => ColumnData::Guid(Some(*u)),
        SqlValue::Decimal(d) => ColumnData::Numeric(Some(
            tiberius::numeric::Numeric::new_with_scale(d.mantissa(), d.scale() as u8),
        )),
        SqlValue::DateTime(dt) => ColumnData::DateTime2(Some(DateTime2::new(
            checked_date(dt.date())?,
            tds_time(dt.time()),
        ))),
        SqlValue::DateTimeOffset(dto) => {
            let utc = dto.naive_utc();
            let offset_minutes = (dto.offset().local_minus_utc() / 60) as i16;
            ColumnData::DateTimeOffset(Some(DateTimeOffset::new(
                DateTime2::new(checked_date(utc.date())?, tds_time(utc.time())),
                offset_minutes,
            )))
        }
        SqlValue::Date(d) => ColumnData::Date(Some(checked_date(*d)?)),
        SqlValue::Time(t) => ColumnData::Time(Some(tds_time(*t))),
    };
    Ok(data)
}

fn finite(value: f64, type_name: &str) -> Result<f64, String> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(format!("{} value {} cannot be stored by SQL Server", type_name, value))
    }
}

fn checked_date(date: NaiveDate) -> Result<Date, String> {
    tds_date(date).ok_or_else(|| format!("date {} is before 0001-01-01", date))
}

fn null_column(null_type: SqlNullType) -> ColumnData<'static> {
    match null_type {
        SqlNullType::Bool => ColumnData::Bit(None),
        SqlNullType::I16 => ColumnData::I16(None),
        SqlNullType::I32 => ColumnData::I32(None),
        SqlNullType::I64 => ColumnData::I64(None),
        SqlNullType::F32 => ColumnData::F32(None),
        SqlNullType::F64 => ColumnData::F64(None),
        SqlNullType::String => ColumnData::String(None),
        SqlNullType::Bytes => ColumnData::Binary(None),
        SqlNullType::Uuid => ColumnData::Guid(None),
        SqlNullType::Decimal => ColumnData::Numeric(None),
        SqlNullType::DateTime => ColumnData::DateTime2(None),
        SqlNullType::DateTimeOffset => ColumnData::DateTimeOffset(None),
        SqlNullType::Date => ColumnData::Date(None),
        SqlNullType::Time => ColumnData::Time(None),
    }
}

/// Days since 0001-01-01; `None` for dates before it.
fn tds_date(date: NaiveDate) -> Option<Date> {
    u32::try_from(date.num_days_from_ce() - 1).ok().map(Date::new)
}

/// 100ns increments since midnight.
fn tds_time(time: NaiveTime) -> Time {
    let nanos = time.num_seconds_from_midnight() as u64 * 1_000_000_000 + time.nanosecond() as u64;
    Time::new(nanos / 100, TIME_SCALE)
}

/// Outcome of matching request columns against the server's insertable columns.
#[derive(Debug, PartialEq, Eq)]
pub struct ColumnOrder {
    /// For each server column, the index of its value in the request row.
    pub positions: Vec<usize>,
    /// Request columns the server does not accept (identity, computed, rowversion).
    pub ignored: Vec<String>,
}

/// Align `request` columns to `server` order, case-insensitively.
///
/// Fails with the server columns the request does not supply: `INSERT BULK`
/// expects a value for every insertable column.
pub fn column_order(
    request: &[String],
    server: &[String],
) -> std::result::Result<ColumnOrder, Vec<String>> {
    let mut positions = Vec::with_capacity(server.len());
    let mut missing = Vec::new();

    for column in server {
        match request.iter().position(|c| c.eq_ignore_ascii_case(column)) {
            Some(idx) => positions.push(idx),
            None => missing.push(column.clone()),
        }
    }

    if !missing.is_empty() {
        return Err(missing);
    }

    let ignored = request
        .iter()
        .filter(|c| !server.iter().any(|s| s.eq_ignore_ascii_case(c)))
        .cloned()
        .collect();

    Ok(ColumnOrder { positions, ignored })
}
