use std::fmt;
use std::str::FromStr;

#[cfg(feature = "cert-auth")]
use snowflake_jwt::PrivateKeyMaterial;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 443;
/// Retries used when `max_retry_count` is left at 0
pub const DEFAULT_MAX_RETRY_COUNT: u32 = 7;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Protocol must be either 'http' or 'https', got `{0}`")]
pub struct InvalidProtocol(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    Http,
    #[default]
    Https,
}

impl FromStr for Protocol {
    type Err = InvalidProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            other => Err(InvalidProtocol(other.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => f.write_str("http"),
            Protocol::Https => f.write_str("https"),
        }
    }
}

/// How the session proves the user's identity
pub enum AuthType {
    Password(String),
    /// Key-pair authentication, the key signs a short-lived JWT during login
    #[cfg(feature = "cert-auth")]
    KeyPair(PrivateKeyMaterial),
    /// SSO through the user's browser, the redirect URL is pasted back on stdin
    ExternalBrowser,
}

impl AuthType {
    /// Authenticator name as understood by the login endpoint
    pub fn authenticator(&self) -> &'static str {
        match self {
            AuthType::Password(_) => "SNOWFLAKE",
            #[cfg(feature = "cert-auth")]
            AuthType::KeyPair(_) => "SNOWFLAKE_JWT",
            AuthType::ExternalBrowser => "EXTERNALBROWSER",
        }
    }
}

impl fmt::Debug for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthType::Password(_) => f.write_str("Password(<redacted>)"),
            #[cfg(feature = "cert-auth")]
            AuthType::KeyPair(_) => f.write_str("KeyPair(<redacted>)"),
            AuthType::ExternalBrowser => f.write_str("ExternalBrowser"),
        }
    }
}

/// Everything needed to open a session, the Rust equivalent of a DSN.
#[derive(Debug)]
pub struct ConnectionConfig {
    pub account: String,
    pub user: String,
    /// Defaults to `<account>.snowflakecomputing.com`
    pub host: Option<String>,
    pub port: u16,
    pub protocol: Protocol,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub role: Option<String>,
    pub auth: AuthType,
    /// -1 disables retries, 0 picks the default
    pub max_retry_count: i32,
}

impl ConnectionConfig {
    pub fn new(account: &str, user: &str, auth: AuthType) -> Self {
        ConnectionConfig {
            account: account.to_string(),
            user: user.to_string(),
            host: None,
            port: DEFAULT_PORT,
            protocol: Protocol::default(),
            warehouse: None,
            database: None,
            schema: None,
            role: None,
            auth,
            max_retry_count: 0,
        }
    }

    pub fn host(&self) -> String {
        match &self.host {
            Some(host) => host.clone(),
            None => format!("{}.snowflakecomputing.com", self.account),
        }
    }

    /// Account name without region or cloud suffix, uppercase. Used for login and JWT claims.
    pub fn account_name(&self) -> String {
        self.account
            .split('.')
            .next()
            .unwrap_or_default()
            .to_uppercase()
    }

    pub fn retries(&self) -> u32 {
        match self.max_retry_count {
            n if n < 0 => 0,
            0 => DEFAULT_MAX_RETRY_COUNT,
            n => n as u32,
        }
    }

    /// DSN-style rendering of the descriptor with the secret masked, safe to log.
    pub fn dsn(&self) -> String {
        let mut params = url::form_urlencoded::Serializer::new(String::new());
        params.append_pair("account", &self.account);
        params.append_pair("authenticator", &self.auth.authenticator().to_lowercase());
        if let Some(warehouse) = &self.warehouse {
            params.append_pair("warehouse", warehouse);
        }
        if let Some(database) = &self.database {
            params.append_pair("database", database);
        }
        if let Some(schema) = &self.schema {
            params.append_pair("schema", schema);
        }
        if let Some(role) = &self.role {
            params.append_pair("role", role);
        }
        params.append_pair("protocol", &self.protocol.to_string());
        params.append_pair("maxRetryCount", &self.max_retry_count.to_string());

        let secret = match self.auth {
            AuthType::Password(_) => ":****",
            _ => "",
        };

        format!(
            "{}{}@{}:{}?{}",
            self.user,
            secret,
            self.host(),
            self.port,
            params.finish()
        )
    }
}
