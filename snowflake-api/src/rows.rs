use std::io::Cursor;

use arrow::array::{Array, ArrayRef, AsArray, StructArray};
use arrow::datatypes::{DataType, Int16Type, Int32Type, Int64Type, Int8Type};
use arrow::error::ArrowError;
use arrow::ipc::reader::StreamReader;
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use chrono::{DateTime, FixedOffset, NaiveTime};
use thiserror::Error;

use crate::responses::{ExecResponseRowType, SnowflakeType};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("row {0} is not an array of cells: `{1}`")]
    MalformedRow(usize, String),

    #[error("row {row} has {found} cells, expected {expected}")]
    ColumnCountMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error(transparent)]
    ArrowError(#[from] ArrowError),
}

/// Per-column hints taken from the response `rowtype`
#[derive(Debug, Clone, Copy)]
struct ColumnFormat {
    type_: SnowflakeType,
    scale: u32,
}

impl From<&ExecResponseRowType> for ColumnFormat {
    fn from(rt: &ExecResponseRowType) -> Self {
        ColumnFormat {
            type_: rt.type_,
            scale: rt.scale.unwrap_or_default().clamp(0, 18) as u32,
        }
    }
}

enum RowSource {
    Empty,
    Json(std::vec::IntoIter<serde_json::Value>),
    Arrow(ArrowCursor),
}

struct ArrowCursor {
    reader: StreamReader<Cursor<Vec<u8>>>,
    batch: Option<RecordBatch>,
    row: usize,
}

/// Result set of a single statement.
///
/// Rows are decoded and stringified one at a time as the iterator advances, so a
/// malformed row surfaces as an error at its position. NULL cells become empty strings.
/// The iterator can't be rewound.
pub struct Rows {
    columns: Vec<String>,
    formats: Vec<ColumnFormat>,
    source: RowSource,
    position: usize,
}

impl Rows {
    fn new(rowtype: &[ExecResponseRowType], source: RowSource) -> Self {
        Rows {
            columns: rowtype.iter().map(|rt| rt.name.clone()).collect(),
            formats: rowtype.iter().map(ColumnFormat::from).collect(),
            source,
            position: 0,
        }
    }

    pub(crate) fn empty(rowtype: &[ExecResponseRowType]) -> Self {
        Self::new(rowtype, RowSource::Empty)
    }

    pub(crate) fn json(rowtype: &[ExecResponseRowType], rowset: Vec<serde_json::Value>) -> Self {
        Self::new(rowtype, RowSource::Json(rowset.into_iter()))
    }

    /// `ipc` is a decoded Arrow IPC stream; batches are read lazily.
    pub(crate) fn arrow(rowtype: &[ExecResponseRowType], ipc: Vec<u8>) -> Result<Self, ArrowError> {
        let reader = StreamReader::try_new_unbuffered(Cursor::new(ipc), None)?;

        Ok(Self::new(
            rowtype,
            RowSource::Arrow(ArrowCursor {
                reader,
                batch: None,
                row: 0,
            }),
        ))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn json_row(&self, row: serde_json::Value) -> Result<Vec<String>, ScanError> {
        let cells = match row {
            serde_json::Value::Array(cells) => cells,
            other => return Err(ScanError::MalformedRow(self.position, other.to_string())),
        };
        self.check_width(cells.len())?;

        Ok(cells
            .into_iter()
            .zip(&self.formats)
            .map(|(cell, format)| match cell {
                serde_json::Value::Null => String::new(),
                serde_json::Value::String(s) => json_cell(s, *format),
                other => other.to_string(),
            })
            .collect())
    }

    fn check_width(&self, found: usize) -> Result<(), ScanError> {
        if found != self.columns.len() {
            return Err(ScanError::ColumnCountMismatch {
                row: self.position,
                expected: self.columns.len(),
                found,
            });
        }
        Ok(())
    }
}

impl Iterator for Rows {
    type Item = Result<Vec<String>, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = loop {
            match &mut self.source {
                RowSource::Empty => return None,
                RowSource::Json(rows) => {
                    let row = rows.next()?;
                    break self.json_row(row);
                }
                RowSource::Arrow(cursor) => {
                    if let Some(batch) = &cursor.batch {
                        if cursor.row < batch.num_rows() {
                            let row = cursor.row;
                            cursor.row += 1;
                            break arrow_row(batch, row, &self.formats);
                        }
                    }

                    match cursor.reader.next()? {
                        Ok(batch) => {
                            if batch.num_columns() != self.columns.len() {
                                break Err(ScanError::ColumnCountMismatch {
                                    row: self.position,
                                    expected: self.columns.len(),
                                    found: batch.num_columns(),
                                });
                            }
                            cursor.batch = Some(batch);
                            cursor.row = 0;
                        }
                        Err(e) => break Err(e.into()),
                    }
                }
            }
        };

        self.position += 1;
        Some(item)
    }
}

fn arrow_row(
    batch: &RecordBatch,
    row: usize,
    formats: &[ColumnFormat],
) -> Result<Vec<String>, ScanError> {
    batch
        .columns()
        .iter()
        .zip(formats)
        .map(|(array, format)| arrow_cell(array, row, *format))
        .collect()
}

fn arrow_cell(array: &ArrayRef, row: usize, format: ColumnFormat) -> Result<String, ScanError> {
    if array.is_null(row) {
        return Ok(String::new());
    }

    match format.type_ {
        SnowflakeType::Time
        | SnowflakeType::TimestampNtz
        | SnowflakeType::TimestampLtz
        | SnowflakeType::TimestampTz => {
            if let Some(rendered) =
                arrow_temporal(array.as_ref(), row, format.scale).and_then(|t| t.render(format))
            {
                return Ok(rendered);
            }
        }
        SnowflakeType::Fixed if format.scale > 0 => {
            if let Some(v) = integer_value(array.as_ref(), row) {
                return Ok(format_scaled(v, format.scale));
            }
        }
        _ => {}
    }

    Ok(array_value_to_string(array, row)?)
}

/// JSON result sets carry dates as days and times as seconds since the epoch.
/// Anything that doesn't parse is passed through as is.
fn json_cell(raw: String, format: ColumnFormat) -> String {
    let rendered = match format.type_ {
        SnowflakeType::Date => raw.parse().ok().and_then(format_date),
        SnowflakeType::Time
        | SnowflakeType::TimestampNtz
        | SnowflakeType::TimestampLtz
        | SnowflakeType::TimestampTz => Temporal::parse(&raw).and_then(|t| t.render(format)),
        _ => None,
    };

    rendered.unwrap_or(raw)
}

fn integer_value(array: &dyn Array, row: usize) -> Option<i64> {
    match array.data_type() {
        DataType::Int8 => Some(array.as_primitive::<Int8Type>().value(row) as i64),
        DataType::Int16 => Some(array.as_primitive::<Int16Type>().value(row) as i64),
        DataType::Int32 => Some(array.as_primitive::<Int32Type>().value(row) as i64),
        DataType::Int64 => Some(array.as_primitive::<Int64Type>().value(row)),
        _ => None,
    }
}

/// Arrow cells hold either a scaled integer or, for wide timestamps,
/// an `{epoch, fraction[, timezone]}` struct
fn arrow_temporal(array: &dyn Array, row: usize, scale: u32) -> Option<Temporal> {
    if let Some(value) = integer_value(array, row) {
        return Some(Temporal::from_scaled(value, scale));
    }

    let DataType::Struct(_) = array.data_type() else {
        return None;
    };
    let array: &StructArray = array.as_struct();
    let field = |name: &str| {
        array
            .column_by_name(name)
            .and_then(|c| integer_value(c.as_ref(), row))
    };

    let epoch = field("epoch")?;
    let mut temporal = match field("fraction") {
        // epoch in seconds, fraction in nanoseconds
        Some(fraction) => Temporal {
            secs: epoch,
            nanos: u32::try_from(fraction).ok()?,
            timezone: None,
        },
        None => Temporal::from_scaled(epoch, scale),
    };
    temporal.timezone = field("timezone");

    Some(temporal)
}

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// Seconds since the epoch (since midnight for TIME) as sent by the server.
/// `timezone` is the TIMESTAMP_TZ offset in minutes, shifted up by a day.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Temporal {
    secs: i64,
    nanos: u32,
    timezone: Option<i64>,
}

impl Temporal {
    fn from_scaled(value: i64, scale: u32) -> Self {
        let scale = scale.min(9);
        let divisor = 10i64.pow(scale);

        Temporal {
            secs: value.div_euclid(divisor),
            nanos: (value.rem_euclid(divisor) * 10i64.pow(9 - scale)) as u32,
            timezone: None,
        }
    }

    /// `1700000000.123000000`, with a trailing ` 1500` for TIMESTAMP_TZ
    fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split_whitespace();
        let decimal = parts.next()?;
        let timezone = match parts.next() {
            Some(tz) => Some(tz.parse().ok()?),
            None => None,
        };
        if parts.next().is_some() {
            return None;
        }

        let (negative, digits) = match decimal.strip_prefix('-') {
            Some(digits) => (true, digits),
            None => (false, decimal),
        };
        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        if fraction.len() > 9 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let whole: i128 = whole.parse().ok()?;
        let fraction: i128 = format!("{fraction:0<9}").parse().ok()?;

        let mut total = whole * NANOS_PER_SEC + fraction;
        if negative {
            total = -total;
        }

        Some(Temporal {
            secs: i64::try_from(total.div_euclid(NANOS_PER_SEC)).ok()?,
            nanos: total.rem_euclid(NANOS_PER_SEC) as u32,
            timezone,
        })
    }

    /// `HH:MM:SS` for TIME, `YYYY-MM-DD HH:MM:SS` for timestamps, with `scale`
    /// fractional digits. LTZ is shown in UTC, TZ in its own offset.
    fn render(self, format: ColumnFormat) -> Option<String> {
        let fraction = fraction_digits(self.nanos, format.scale);

        match format.type_ {
            SnowflakeType::Time => {
                let secs = u32::try_from(self.secs).ok()?;
                let time = NaiveTime::from_num_seconds_from_midnight_opt(secs, self.nanos)?;
                Some(format!("{}{}", time.format("%H:%M:%S"), fraction))
            }
            SnowflakeType::TimestampNtz => {
                let ts = DateTime::from_timestamp(self.secs, self.nanos)?;
                Some(format!("{}{}", ts.format("%Y-%m-%d %H:%M:%S"), fraction))
            }
            SnowflakeType::TimestampLtz => {
                let ts = DateTime::from_timestamp(self.secs, self.nanos)?;
                Some(format!("{}{} +00:00", ts.format("%Y-%m-%d %H:%M:%S"), fraction))
            }
            SnowflakeType::TimestampTz => {
                let minutes = i32::try_from(self.timezone? - 1440).ok()?;
                let offset = FixedOffset::east_opt(minutes.checked_mul(60)?)?;
                let ts = DateTime::from_timestamp(self.secs, self.nanos)?.with_timezone(&offset);
                Some(format!(
                    "{}{} {}",
                    ts.format("%Y-%m-%d %H:%M:%S"),
                    fraction,
                    offset
                ))
            }
            _ => None,
        }
    }
}

fn fraction_digits(nanos: u32, scale: u32) -> String {
    if scale == 0 {
        return String::new();
    }
    let nanos = format!("{:09}", nanos);
    format!(".{}", &nanos[..(scale as usize).min(9)])
}

fn format_date(days: i64) -> Option<String> {
    let ts = DateTime::from_timestamp(days.checked_mul(86_400)?, 0)?;
    Some(ts.date_naive().format("%Y-%m-%d").to_string())
}

/// Render an integer holding a fixed-point number with `scale` fractional digits
fn format_scaled(value: i64, scale: u32) -> String {
    if scale == 0 {
        return value.to_string();
    }

    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    let divisor = 10u64.pow(scale);

    format!(
        "{}{}.{:0width$}",
        sign,
        abs / divisor,
        abs % divisor,
        width = scale as usize
    )
}
