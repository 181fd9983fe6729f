use reqwest::header;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::config::ConnectionConfig;

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error(transparent)]
    RequestMiddlewareError(#[from] reqwest_middleware::Error),

    #[error(transparent)]
    UrlParsing(#[from] url::ParseError),

    #[error(transparent)]
    Deserialization(#[from] serde_json::Error),

    #[error(transparent)]
    InvalidHeader(#[from] header::InvalidHeaderValue),
}

/// Container for query parameters
/// This API has different endpoints and MIME types for different requests
struct QueryContext {
    path: &'static str,
    accept_mime: &'static str,
}

pub enum QueryType {
    LoginRequest,
    AuthenticatorRequest,
    CloseSession,
    ArrowQuery,
    AbortQuery,
}

impl QueryType {
    fn query_context(&self) -> QueryContext {
        match self {
            QueryType::LoginRequest => QueryContext {
                path: "session/v1/login-request",
                accept_mime: "application/json",
            },
            QueryType::AuthenticatorRequest => QueryContext {
                path: "session/authenticator-request",
                accept_mime: "application/json",
            },
            QueryType::CloseSession => QueryContext {
                path: "session",
                accept_mime: "application/json",
            },
            QueryType::ArrowQuery => QueryContext {
                path: "queries/v1/query-request",
                accept_mime: "application/snowflake",
            },
            QueryType::AbortQuery => QueryContext {
                path: "queries/v1/abort-request",
                accept_mime: "application/json",
            },
        }
    }
}

/// Connection pool
/// Minimal session will have at least 2 requests - login and query
pub struct Connection {
    // no need for Arc as it's already inside the reqwest client
    client: ClientWithMiddleware,
    base_url: Url,
}

impl Connection {
    pub fn new(config: &ConnectionConfig) -> Result<Self, ConnectionError> {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.retries());

        // use builder to fail safely, unlike client new
        let client = reqwest::ClientBuilder::new()
            .user_agent(concat!("snowflake-api/", env!("CARGO_PKG_VERSION")))
            .referer(false);

        #[cfg(debug_assertions)]
        let client = client.connection_verbose(true);

        let client = client.build()?;

        let client = reqwest_middleware::ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        let base_url = Url::parse(&format!(
            "{}://{}:{}/",
            config.protocol,
            config.host(),
            config.port
        ))?;

        Ok(Connection { client, base_url })
    }

    /// Perform request of given query type with extra body or parameters.
    /// `request_id` identifies the request for the server, abort requests refer to it.
    pub async fn request<R: serde::de::DeserializeOwned>(
        &self,
        query_type: QueryType,
        request_id: Uuid,
        extra_get_params: &[(&str, &str)],
        auth: Option<&str>,
        body: impl serde::Serialize,
    ) -> Result<R, ConnectionError> {
        let context = query_type.query_context();

        let request_guid = Uuid::new_v4();
        let client_start_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let mut url = self.base_url.join(context.path)?;
        url.query_pairs_mut()
            .append_pair("clientStartTime", &client_start_time.to_string())
            .append_pair("requestId", &request_id.to_string())
            .append_pair("request_guid", &request_guid.to_string())
            .extend_pairs(extra_get_params);

        let mut headers = HeaderMap::new();

        headers.append(
            header::ACCEPT,
            HeaderValue::from_static(context.accept_mime),
        );
        if let Some(auth) = auth {
            let mut auth_val = HeaderValue::from_str(auth)?;
            auth_val.set_sensitive(true);
            headers.append(header::AUTHORIZATION, auth_val);
        }

        let resp = self
            .client
            .post(url)
            .headers(headers)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        Ok(resp.json::<R>().await?)
    }
}
