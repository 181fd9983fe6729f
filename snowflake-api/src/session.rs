use std::fmt;

#[cfg(feature = "cert-auth")]
use snowflake_jwt::generate_jwt_token;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use url::Url;
use uuid::Uuid;

use crate::config::{AuthType, ConnectionConfig};
use crate::connection;
use crate::connection::{Connection, QueryType};
use crate::requests::{
    AuthenticatorLoginRequest, AuthenticatorRequestData, ClientEnvironment,
    ExternalBrowserLoginRequest, ExternalBrowserRequestData, LoginRequest, LoginRequestCommon,
    PasswordLoginRequest, PasswordRequestData, SessionParameters,
};
#[cfg(feature = "cert-auth")]
use crate::requests::{CertLoginRequest, CertRequestData};
use crate::responses::{AuthResponse, EmptyResponse};

/// Port the identity provider is told to redirect to. Nothing listens there,
/// the user copies the resulting URL back instead.
const BROWSER_REDIRECT_PORT: u16 = 3037;

#[derive(Error, Debug)]
pub enum AuthError {
    #[cfg(feature = "cert-auth")]
    #[error(transparent)]
    JwtError(#[from] snowflake_jwt::JwtError),

    #[error(transparent)]
    RequestError(#[from] connection::ConnectionError),

    #[error("Unexpected API response")]
    UnexpectedResponse,

    #[error("Failed to authenticate. Error code: {0}. Message: {1}")]
    AuthFailed(String, String),

    #[error("Unable to read the browser redirect URL: {0}")]
    BrowserRedirect(String),
}

#[derive(Clone)]
pub struct AuthToken {
    pub session_token: String,
}

impl AuthToken {
    pub fn auth_header(&self) -> String {
        format!("Snowflake Token=\"{}\"", &self.session_token)
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

/// Logged-in Snowflake session.
/// Session persists the configuration state and temporary objects (tables, procedures, etc)
/// until it's closed or expires.
#[derive(Debug)]
pub struct Session {
    token: AuthToken,
}

impl Session {
    /// Log in with whatever `config.auth` holds. Credentials are consumed here,
    /// a key pair is dropped as soon as the JWT is signed.
    /// `input` is only read by external browser authentication.
    pub async fn login<R: AsyncBufRead + Unpin>(
        connection: &Connection,
        config: ConnectionConfig,
        input: R,
    ) -> Result<Session, AuthError> {
        let login = Login::new(&config);

        let token = match config.auth {
            AuthType::Password(password) => {
                log::info!("Starting session with password authentication");
                login.token_request(connection, login.passwd_request_body(password)).await
            }
            #[cfg(feature = "cert-auth")]
            AuthType::KeyPair(private_key) => {
                log::info!("Starting session with certificate authentication");
                let body = login.cert_request_body(&private_key)?;
                drop(private_key);
                login.token_request(connection, body).await
            }
            AuthType::ExternalBrowser => {
                log::info!("Starting session with external browser authentication");
                let body = login.browser_request_body(connection, input).await?;
                login.token_request(connection, body).await
            }
        }?;

        Ok(Session { token })
    }

    pub fn token(&self) -> &AuthToken {
        &self.token
    }

    /// Closes the session, this is necessary to clean up temporary objects (tables, functions, etc)
    /// which are Snowflake session dependent.
    pub async fn close(self, connection: &Connection) -> Result<(), AuthError> {
        let resp = connection
            .request::<EmptyResponse>(
                QueryType::CloseSession,
                Uuid::new_v4(),
                &[("delete", "true")],
                Some(&self.token.auth_header()),
                serde_json::Value::default(),
            )
            .await?;

        if resp.success {
            Ok(())
        } else {
            let (code, message) = resp.error_parts();
            Err(AuthError::AuthFailed(code, message))
        }
    }
}

/// Login request parameters derived from the connection config
struct Login {
    account_name: String,
    username: String,
    warehouse: Option<String>,
    database: Option<String>,
    schema: Option<String>,
    role: Option<String>,
}

impl Login {
    fn new(config: &ConnectionConfig) -> Self {
        Login {
            account_name: config.account_name(),
            username: config.user.clone(),
            warehouse: config.warehouse.clone(),
            database: config.database.clone(),
            schema: config.schema.clone(),
            role: config.role.clone(),
        }
    }

    fn login_request_common(&self) -> LoginRequestCommon {
        LoginRequestCommon {
            // the server only accepts known client application ids
            client_app_id: "Go".to_string(),
            client_app_version: "1.6.22".to_string(),
            svn_revision: "".to_string(),
            account_name: self.account_name.clone(),
            login_name: self.username.clone(),
            session_parameters: SessionParameters {
                client_validate_default_parameters: true,
            },
            client_environment: ClientEnvironment {
                application: "Rust".to_string(),
                os: std::env::consts::OS.to_string(),
                os_version: os_version(),
                ocsp_mode: "FAIL_OPEN".to_string(),
            },
        }
    }

    fn passwd_request_body(&self, password: String) -> PasswordLoginRequest {
        PasswordLoginRequest {
            data: PasswordRequestData {
                login_request_common: self.login_request_common(),
                password,
            },
        }
    }

    #[cfg(feature = "cert-auth")]
    fn cert_request_body(
        &self,
        private_key: &snowflake_jwt::PrivateKeyMaterial,
    ) -> Result<CertLoginRequest, AuthError> {
        let full_identifier = format!("{}.{}", &self.account_name, self.username.to_uppercase());
        let jwt_token = generate_jwt_token(private_key, &full_identifier)?;

        Ok(CertLoginRequest {
            data: CertRequestData {
                login_request_common: self.login_request_common(),
                authenticator: "SNOWFLAKE_JWT".to_string(),
                token: jwt_token,
            },
        })
    }

    /// Browser SSO without a local callback listener: ask for the SSO URL, let the user
    /// authenticate and paste the URL the browser ended up on.
    async fn browser_request_body<R: AsyncBufRead + Unpin>(
        &self,
        connection: &Connection,
        mut input: R,
    ) -> Result<ExternalBrowserLoginRequest, AuthError> {
        let body = AuthenticatorLoginRequest {
            data: AuthenticatorRequestData {
                login_request_common: self.login_request_common(),
                authenticator: "EXTERNALBROWSER".to_string(),
                browser_mode_redirect_port: BROWSER_REDIRECT_PORT.to_string(),
            },
        };

        let resp = connection
            .request::<AuthResponse>(
                QueryType::AuthenticatorRequest,
                Uuid::new_v4(),
                &[],
                None,
                body,
            )
            .await?;

        let sso = match resp {
            AuthResponse::Authenticator(ar) => ar.data,
            AuthResponse::Error(e) => {
                let (code, message) = e.error_parts();
                return Err(AuthError::AuthFailed(code, message));
            }
            AuthResponse::Login(_) => return Err(AuthError::UnexpectedResponse),
        };

        log::warn!(
            "Open the following URL in a browser to authenticate, then paste the address it redirects to: {}",
            sso.sso_url
        );

        let mut line = String::new();
        input
            .read_line(&mut line)
            .await
            .map_err(|e| AuthError::BrowserRedirect(e.to_string()))?;
        let token = redirect_token(&line)?;

        Ok(ExternalBrowserLoginRequest {
            data: ExternalBrowserRequestData {
                login_request_common: self.login_request_common(),
                authenticator: "EXTERNALBROWSER".to_string(),
                token,
                proof_key: sso.proof_key,
            },
        })
    }

    async fn token_request<T: serde::ser::Serialize>(
        &self,
        connection: &Connection,
        body: LoginRequest<T>,
    ) -> Result<AuthToken, AuthError> {
        let mut get_params = Vec::new();

        if let Some(warehouse) = &self.warehouse {
            get_params.push(("warehouse", warehouse.as_str()));
        }

        if let Some(database) = &self.database {
            get_params.push(("databaseName", database.as_str()));
        }

        if let Some(schema) = &self.schema {
            get_params.push(("schemaName", schema.as_str()));
        }

        if let Some(role) = &self.role {
            get_params.push(("roleName", role.as_str()))
        }

        let resp = connection
            .request::<AuthResponse>(
                QueryType::LoginRequest,
                Uuid::new_v4(),
                &get_params,
                None,
                body,
            )
            .await?;

        match resp {
            AuthResponse::Login(lr) => {
                log::debug!(
                    "Logged in, session id: {:?}, server version: {:?}",
                    lr.data.session_id,
                    lr.data.server_version
                );
                Ok(AuthToken {
                    session_token: lr.data.token,
                })
            }
            AuthResponse::Error(e) => {
                let (code, message) = e.error_parts();
                Err(AuthError::AuthFailed(code, message))
            }
            AuthResponse::Authenticator(_) => Err(AuthError::UnexpectedResponse),
        }
    }
}

/// Pull the `token` query parameter out of the pasted redirect URL
/// Release of the running OS, e.g. `14.4.1` on macOS or `22.04` on Ubuntu
fn os_version() -> String {
    sysinfo::System::os_version().unwrap_or_else(|| "unknown".to_string())
}

fn redirect_token(redirect: &str) -> Result<String, AuthError> {
    let url = Url::parse(redirect.trim()).map_err(|e| AuthError::BrowserRedirect(e.to_string()))?;

    url.query_pairs()
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::BrowserRedirect("no `token` parameter in URL".to_string()))
}
