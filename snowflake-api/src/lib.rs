#![doc(
    issue_tracker_base_url = "https://github.com/mycelial/snowflake-rs/issues",
    test(no_crate_inject)
)]
//! Minimal Snowflake driver: log in with one of the supported authenticators, run a
//! statement and stream back its rows as strings.

use base64::Engine;
use thiserror::Error;
use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::connection::{Connection, ConnectionError, QueryType};
use crate::requests::{AbortRequest, ExecRequest};
use crate::responses::{EmptyResponse, ExecResponse, QueryExecResponse};
use session::{AuthError, Session};

pub use config::{AuthType, ConnectionConfig, InvalidProtocol, Protocol, DEFAULT_PORT};
pub use rows::{Rows, ScanError};
#[cfg(feature = "cert-auth")]
pub use snowflake_jwt::{JwtError, PrivateKeyMaterial};

mod config;
pub mod connection;
mod requests;
mod responses;
mod rows;
mod session;

#[derive(Error, Debug)]
pub enum SnowflakeApiError {
    #[error(transparent)]
    RequestError(#[from] ConnectionError),

    #[error(transparent)]
    AuthError(#[from] AuthError),

    #[error(transparent)]
    ResponseDeserializationError(#[from] base64::DecodeError),

    #[error(transparent)]
    ArrowError(#[from] arrow::error::ArrowError),

    #[error("Snowflake API error. Code: `{0}`. Message: `{1}`")]
    ApiError(String, String),

    #[error("No usable rowsets were included in the response")]
    BrokenResponse,

    #[error("Following feature is not implemented yet: {0}")]
    Unimplemented(String),

    #[error("Query was cancelled")]
    Cancelled,
}

/// Snowflake API, keeps connection pool and the logged-in session
pub struct SnowflakeApi {
    connection: Connection,
    session: Session,
    sequence_id: u64,
}

impl SnowflakeApi {
    /// Open the HTTP connection and log in. Fails if the endpoint can't be reached
    /// or the credentials are rejected.
    pub async fn connect(config: ConnectionConfig) -> Result<Self, SnowflakeApiError> {
        Self::connect_with_input(config, BufReader::new(tokio::io::stdin())).await
    }

    /// Same as [`SnowflakeApi::connect`], external browser authentication reads the
    /// redirect URL from `input` instead of stdin.
    pub async fn connect_with_input<R>(
        config: ConnectionConfig,
        input: R,
    ) -> Result<Self, SnowflakeApiError>
    where
        R: AsyncBufRead + Unpin,
    {
        let connection = Connection::new(&config)?;
        let session = Session::login(&connection, config, input).await?;

        Ok(SnowflakeApi {
            connection,
            session,
            sequence_id: 0,
        })
    }

    /// Closes the current session, this is necessary to clean up temporary objects (tables, functions, etc)
    /// which are Snowflake session dependent.
    pub async fn close_session(self) -> Result<(), SnowflakeApiError> {
        self.session.close(&self.connection).await?;
        Ok(())
    }

    /// Execute a single statement and return its rows.
    ///
    /// If `cancel` fires while the statement runs, an abort request is sent for it and
    /// [`SnowflakeApiError::Cancelled`] is returned.
    pub async fn query(
        &mut self,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Result<Rows, SnowflakeApiError> {
        let request_id = Uuid::new_v4();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            resp = self.run_sql::<ExecResponse>(sql, request_id, QueryType::ArrowQuery) => Some(resp),
        };

        match outcome {
            Some(resp) => self.rows(resp?),
            None => {
                if let Err(e) = self.abort(sql, request_id).await {
                    log::warn!("Failed to abort query {}: {}", request_id, e);
                }
                Err(SnowflakeApiError::Cancelled)
            }
        }
    }

    fn rows(&self, resp: ExecResponse) -> Result<Rows, SnowflakeApiError> {
        log::debug!("Got query response: {:?}", resp);

        let resp: QueryExecResponse = match resp {
            // processable response
            ExecResponse::Query(qr) => qr,
            ExecResponse::Error(e) => {
                return Err(SnowflakeApiError::ApiError(
                    e.error_code(),
                    e.message.unwrap_or_default(),
                ));
            }
        };
        let data = resp.data;

        if !data.chunks.is_empty() {
            return Err(SnowflakeApiError::Unimplemented(format!(
                "downloading chunked result sets, query {} returned {} chunks",
                data.query_id,
                data.chunks.len()
            )));
        }

        // if response was empty, base64 data is empty string
        if data.returned == 0 {
            log::info!("Got response with 0 rows");

            Ok(Rows::empty(&data.rowtype))
        } else if let Some(json) = data.rowset {
            log::info!("Got JSON response");

            match json {
                serde_json::Value::Array(rowset) => Ok(Rows::json(&data.rowtype, rowset)),
                _ => Err(SnowflakeApiError::BrokenResponse),
            }
        } else if let Some(base64) = data.rowset_base64 {
            log::info!("Got base64 encoded response");
            let bytes = base64::engine::general_purpose::STANDARD.decode(base64)?;

            Ok(Rows::arrow(&data.rowtype, bytes)?)
        } else {
            Err(SnowflakeApiError::BrokenResponse)
        }
    }

    /// Ask the server to stop the statement sent with `request_id`
    async fn abort(&self, sql: &str, request_id: Uuid) -> Result<(), SnowflakeApiError> {
        log::info!("Aborting query {}", request_id);

        let body = AbortRequest {
            sql_text: sql.to_string(),
            request_id: request_id.to_string(),
        };
        let resp = self
            .connection
            .request::<EmptyResponse>(
                QueryType::AbortQuery,
                Uuid::new_v4(),
                &[],
                Some(&self.session.token().auth_header()),
                body,
            )
            .await?;

        if resp.success {
            Ok(())
        } else {
            let (code, message) = resp.error_parts();
            Err(SnowflakeApiError::ApiError(code, message))
        }
    }

    async fn run_sql<R: serde::de::DeserializeOwned>(
        &mut self,
        sql_text: &str,
        request_id: Uuid,
        query_type: QueryType,
    ) -> Result<R, SnowflakeApiError> {
        log::debug!("Executing: {}", sql_text);

        // expected by snowflake api for all requests within session to follow sequence id
        self.sequence_id += 1;

        let body = ExecRequest {
            sql_text: sql_text.to_string(),
            async_exec: false,
            sequence_id: self.sequence_id,
            is_internal: false,
        };

        let resp = self
            .connection
            .request::<R>(
                query_type,
                request_id,
                &[],
                Some(&self.session.token().auth_header()),
                body,
            )
            .await?;

        Ok(resp)
    }
}
