use std::io::Write;

use snowflake_api::{ScanError, SnowflakeApi, SnowflakeApiError};
use tokio_util::sync::CancellationToken;

use crate::csv::CsvWriter;
use crate::Error;

/// Run `sql` and write the result as CSV to `out`, returns the number of data rows written.
pub async fn run_query<W: Write>(
    api: &mut SnowflakeApi,
    sql: &str,
    cancel: &CancellationToken,
    out: W,
) -> Result<usize, Error> {
    tracing::info!(query = sql, "Querying snowflake");

    let rows = api.query(sql, cancel).await.map_err(|e| match e {
        SnowflakeApiError::Cancelled => Error::Cancelled,
        e => Error::Query(e),
    })?;
    let columns = rows.columns().to_vec();

    let count = write_rows(&columns, rows, out, cancel)?;
    tracing::info!(rows = count, "Successfully pulled results from snowflake");

    Ok(count)
}

/// Header first, then one line per row. Stops with [`Error::Cancelled`] before the next
/// row once `cancel` fires. Whatever was written before a failure is still flushed to `out`.
pub fn write_rows<W, I>(
    columns: &[String],
    rows: I,
    out: W,
    cancel: &CancellationToken,
) -> Result<usize, Error>
where
    W: Write,
    I: IntoIterator<Item = Result<Vec<String>, ScanError>>,
{
    let mut writer = CsvWriter::new(out);

    let written = write_all(&mut writer, columns, rows, cancel);
    let flushed = writer.flush().map_err(Error::Write);

    let count = written?;
    flushed?;
    Ok(count)
}

fn write_all<W, I>(
    writer: &mut CsvWriter<W>,
    columns: &[String],
    rows: I,
    cancel: &CancellationToken,
) -> Result<usize, Error>
where
    W: Write,
    I: IntoIterator<Item = Result<Vec<String>, ScanError>>,
{
    writer.write_record(columns).map_err(Error::Write)?;

    let mut count = 0;
    for row in rows {
        if cancel.is_cancelled() {
            tracing::warn!(rows = count, "Interrupted while writing results");
            return Err(Error::Cancelled);
        }
        let row = row?;
        writer.write_record(&row).map_err(Error::Write)?;
        count += 1;
    }

    Ok(count)
}
