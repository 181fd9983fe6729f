use serde::Serialize;

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ExecRequest {
    pub sql_text: String,
    pub async_exec: bool,
    pub sequence_id: u64,
    pub is_internal: bool,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AbortRequest {
    pub sql_text: String,
    pub request_id: String,
}

#[derive(Serialize, Debug)]
pub struct LoginRequest<T> {
    pub data: T,
}

pub type PasswordLoginRequest = LoginRequest<PasswordRequestData>;
#[cfg(feature = "cert-auth")]
pub type CertLoginRequest = LoginRequest<CertRequestData>;
pub type AuthenticatorLoginRequest = LoginRequest<AuthenticatorRequestData>;
pub type ExternalBrowserLoginRequest = LoginRequest<ExternalBrowserRequestData>;

#[derive(Serialize, Debug)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct LoginRequestCommon {
    pub client_app_id: String,
    pub client_app_version: String,
    pub svn_revision: String,
    pub account_name: String,
    pub login_name: String,
    pub session_parameters: SessionParameters,
    pub client_environment: ClientEnvironment,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SessionParameters {
    pub client_validate_default_parameters: bool,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ClientEnvironment {
    pub application: String,
    pub os: String,
    pub os_version: String,
    pub ocsp_mode: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PasswordRequestData {
    #[serde(flatten)]
    pub login_request_common: LoginRequestCommon,
    pub password: String,
}

#[cfg(feature = "cert-auth")]
#[derive(Serialize, Debug)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct CertRequestData {
    #[serde(flatten)]
    pub login_request_common: LoginRequestCommon,
    pub authenticator: String,
    pub token: String,
}

/// First leg of browser SSO, asks for the identity provider URL
#[derive(Serialize, Debug)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AuthenticatorRequestData {
    #[serde(flatten)]
    pub login_request_common: LoginRequestCommon,
    pub authenticator: String,
    pub browser_mode_redirect_port: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ExternalBrowserRequestData {
    #[serde(flatten)]
    pub login_request_common: LoginRequestCommon,
    pub authenticator: String,
    pub token: String,
    pub proof_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_login_is_flattened() {
        let body = PasswordLoginRequest {
            data: PasswordRequestData {
                login_request_common: LoginRequestCommon {
                    client_app_id: "Go".to_string(),
                    client_app_version: "1.6.22".to_string(),
                    svn_revision: String::new(),
                    account_name: "ACC".to_string(),
                    login_name: "bob".to_string(),
                    session_parameters: SessionParameters {
                        client_validate_default_parameters: true,
                    },
                    client_environment: ClientEnvironment {
                        application: "Rust".to_string(),
                        os: "linux".to_string(),
                        os_version: "x86_64".to_string(),
                        ocsp_mode: "FAIL_OPEN".to_string(),
                    },
                },
                password: "hunter2".to_string(),
            },
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["data"]["ACCOUNT_NAME"], "ACC");
        assert_eq!(json["data"]["LOGIN_NAME"], "bob");
        assert_eq!(json["data"]["PASSWORD"], "hunter2");
        assert_eq!(
            json["data"]["SESSION_PARAMETERS"]["CLIENT_VALIDATE_DEFAULT_PARAMETERS"],
            true
        );
        assert_eq!(json["data"]["CLIENT_ENVIRONMENT"]["OCSP_MODE"], "FAIL_OPEN");
    }

    #[test]
    fn exec_request_is_camel_case() {
        let body = ExecRequest {
            sql_text: "select 1".to_string(),
            async_exec: false,
            sequence_id: 1,
            is_internal: false,
        };

        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"sqlText":"select 1","asyncExec":false,"sequenceId":1,"isInternal":false}"#
        );
    }
}
