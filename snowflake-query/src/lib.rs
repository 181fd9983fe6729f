//! Run one statement against Snowflake and print the result as CSV.
//!
//! The flow is: [`credentials::validate`] the arguments, build a driver config with
//! [`connect::connection_config`], open a session, then [`runner::run_query`] writes
//! the header and rows to the output. A [`CancellationToken`] shared with
//! [`interrupt::InterruptListener`] aborts whichever network step is in flight.

use std::io::{self, Write};

use snowflake_api::{ScanError, SnowflakeApiError};
use snowflake_jwt::JwtError;
use thiserror::Error;
use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::sync::CancellationToken;

pub mod args;
pub mod connect;
pub mod credentials;
pub mod csv;
pub mod interrupt;
pub mod runner;

use crate::args::Args;
use crate::credentials::ConfigurationError;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Unable to read private key: {0}")]
    KeyDecode(#[from] JwtError),

    #[error("Unable to connect to snowflake: {0}")]
    Connection(SnowflakeApiError),

    #[error("Unable to query snowflake: {0}")]
    Query(SnowflakeApiError),

    #[error("Interrupted")]
    Cancelled,

    #[error("Unable to read result row: {0}")]
    Scan(#[from] ScanError),

    #[error("Unable to write output: {0}")]
    Write(io::Error),
}

/// Validate `args`, connect, run the query and write CSV to `out`.
/// Returns the number of data rows written.
///
/// Nothing is sent over the network unless validation and key decoding succeed.
/// Once `cancel` fires the result is [`Error::Cancelled`], whatever stage was running.
pub async fn run<W: Write>(
    args: &Args,
    out: W,
    cancel: &CancellationToken,
) -> Result<usize, Error> {
    run_with_input(args, BufReader::new(tokio::io::stdin()), out, cancel).await
}

/// [`run`] with the browser sign-in redirect URL read from `input` instead of stdin.
pub async fn run_with_input<R, W>(
    args: &Args,
    input: R,
    out: W,
    cancel: &CancellationToken,
) -> Result<usize, Error>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let validated = credentials::validate(args)?;
    let config = connect::connection_config(validated)?;

    let mut api = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        api = connect::connect(config, input) => api?,
    };

    let result = runner::run_query(&mut api, &args.query, cancel, out).await;

    // interrupted sessions are left to expire server side
    if !cancel.is_cancelled() {
        if let Err(e) = api.close_session().await {
            tracing::warn!(error = %e, "Unable to close session");
        }
    }

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    result
}
