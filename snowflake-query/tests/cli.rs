mod common;

use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use common::{MockSnowflake, Reply, ABORT, AUTHENTICATOR, CLOSE, LOGIN, QUERY};
use snowflake_query::args::Args;
use snowflake_query::credentials::ConfigurationError;
use snowflake_query::Error;

fn fixture(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../jwt/tests/fixtures")
        .join(name)
        .display()
        .to_string()
}

async fn run(argv: Vec<String>, cancel: &CancellationToken) -> (Result<usize, Error>, String) {
    let args = Args::try_parse_from(argv).unwrap();
    let mut out = Vec::new();
    let result = snowflake_query::run(&args, &mut out, cancel).await;
    (result, String::from_utf8(out).unwrap())
}

fn happy_path(path: &str) -> Reply {
    match path {
        LOGIN => common::login_ok(),
        QUERY => common::json_rows(&["1"], serde_json::json!([["1"]])),
        _ => common::empty_ok(),
    }
}

#[tokio::test]
async fn password_query_prints_csv() {
    let server = MockSnowflake::start(happy_path).await;

    let (result, out) = run(
        server.args(&["--snowflake.password", "hunter2", "--query", "select 1"]),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(result.unwrap(), 1);
    assert_eq!(out, "1\n1\n");
    assert_eq!(server.paths(), vec![LOGIN, QUERY, CLOSE]);

    let recorded = server.recorded();
    let login: serde_json::Value = serde_json::from_str(&recorded[0].body).unwrap();
    assert_eq!(login["data"]["LOGIN_NAME"], "bob");
    assert_eq!(login["data"]["PASSWORD"], "hunter2");

    let query: serde_json::Value = serde_json::from_str(&recorded[1].body).unwrap();
    assert_eq!(query["sqlText"], "select 1");
    assert!(recorded[2].query.contains("delete=true"));
}

#[tokio::test]
async fn nulls_and_special_characters() {
    let server = MockSnowflake::start(|path: &str| match path {
        LOGIN => common::login_ok(),
        QUERY => common::json_rows(
            &["ID", "NOTE"],
            serde_json::json!([["1", "hello, world"], ["2", null], ["3", "quote \"test\""]]),
        ),
        _ => common::empty_ok(),
    })
    .await;

    let (result, out) = run(
        server.args(&["--snowflake.password", "hunter2"]),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(result.unwrap(), 3);
    assert_eq!(
        out,
        "ID,NOTE\n1,\"hello, world\"\n2,\n3,\"quote \"\"test\"\"\"\n"
    );
}

#[tokio::test]
async fn key_pair_login_sends_jwt() {
    let server = MockSnowflake::start(happy_path).await;
    let key = fixture("rsa_key_encrypted.p8");

    let (result, out) = run(
        server.args(&[
            "--snowflake.private.key.file",
            &key,
            "--snowflake.private.key.passcode",
            "correct-horse",
        ]),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(result.unwrap(), 1);
    assert_eq!(out, "1\n1\n");

    let login: serde_json::Value = serde_json::from_str(&server.recorded()[0].body).unwrap();
    assert_eq!(login["data"]["AUTHENTICATOR"], "SNOWFLAKE_JWT");
    assert_eq!(
        login["data"]["TOKEN"].as_str().map(|t| t.split('.').count()),
        Some(3)
    );
}

#[tokio::test]
async fn external_browser_login_uses_pasted_redirect() {
    let server = MockSnowflake::start(|path: &str| match path {
        AUTHENTICATOR => common::sso_ok("https://idp.example.com/sso?request=1", "proof-123"),
        LOGIN => common::login_ok(),
        QUERY => common::json_rows(&["1"], serde_json::json!([["1"]])),
        _ => common::empty_ok(),
    })
    .await;
    let args = Args::try_parse_from(server.args(&[
        "--snowflake.authenticator",
        "externalbrowser",
        "--query",
        "select 1",
    ]))
    .unwrap();

    let pasted: &[u8] = b"http://localhost:3037/?token=sso-token-xyz&confirm=true\n";
    let mut out = Vec::new();
    let count =
        snowflake_query::run_with_input(&args, pasted, &mut out, &CancellationToken::new())
            .await
            .unwrap();

    assert_eq!(count, 1);
    assert_eq!(String::from_utf8(out).unwrap(), "1\n1\n");
    assert_eq!(server.paths(), vec![AUTHENTICATOR, LOGIN, QUERY, CLOSE]);

    let recorded = server.recorded();
    let sso: serde_json::Value = serde_json::from_str(&recorded[0].body).unwrap();
    assert_eq!(sso["data"]["AUTHENTICATOR"], "EXTERNALBROWSER");
    assert_eq!(sso["data"]["BROWSER_MODE_REDIRECT_PORT"], "3037");

    let login: serde_json::Value = serde_json::from_str(&recorded[1].body).unwrap();
    assert_eq!(login["data"]["AUTHENTICATOR"], "EXTERNALBROWSER");
    assert_eq!(login["data"]["TOKEN"], "sso-token-xyz");
    assert_eq!(login["data"]["PROOF_KEY"], "proof-123");
    assert_eq!(login["data"]["LOGIN_NAME"], "bob");
}

#[tokio::test]
async fn external_browser_login_without_token_fails() {
    let server = MockSnowflake::start(|path: &str| match path {
        AUTHENTICATOR => common::sso_ok("https://idp.example.com/sso", "proof-123"),
        _ => common::empty_ok(),
    })
    .await;
    let args = Args::try_parse_from(
        server.args(&["--snowflake.authenticator", "externalbrowser"]),
    )
    .unwrap();

    let pasted: &[u8] = b"http://localhost:3037/?confirm=true\n";
    let mut out = Vec::new();
    let err = snowflake_query::run_with_input(&args, pasted, &mut out, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Connection(_)), "{err:?}");
    assert!(out.is_empty());
    assert_eq!(server.paths(), vec![AUTHENTICATOR]);
}

#[tokio::test]
async fn wrong_passphrase_never_connects() {
    let server = MockSnowflake::start(happy_path).await;
    let key = fixture("rsa_key_encrypted.p8");

    let (result, out) = run(
        server.args(&[
            "--snowflake.private.key.file",
            &key,
            "--snowflake.private.key.passcode",
            "battery-staple",
        ]),
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(result, Err(Error::KeyDecode(_))), "{result:?}");
    assert!(out.is_empty());
    assert!(server.paths().is_empty());
}

#[tokio::test]
async fn conflicting_credentials_never_connect() {
    let server = MockSnowflake::start(happy_path).await;

    let (result, _) = run(
        server.args(&[
            "--snowflake.password",
            "hunter2",
            "--snowflake.authenticator",
            "externalbrowser",
        ]),
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(
        result,
        Err(Error::Configuration(
            ConfigurationError::ConflictingAuthentication { .. }
        ))
    ));
    assert!(server.paths().is_empty());
}

#[tokio::test]
async fn rejected_login_is_a_connection_error() {
    let server = MockSnowflake::start(|path: &str| match path {
        LOGIN => common::error("390100", "Incorrect username or password was specified."),
        _ => common::empty_ok(),
    })
    .await;

    let (result, out) = run(
        server.args(&["--snowflake.password", "wrong"]),
        &CancellationToken::new(),
    )
    .await;

    let err = result.unwrap_err();
    assert!(matches!(err, Error::Connection(_)), "{err:?}");
    assert!(err.to_string().contains("Incorrect username or password"));
    assert!(out.is_empty());
    assert_eq!(server.paths(), vec![LOGIN]);
}

#[tokio::test]
async fn failed_query_still_closes_session() {
    let server = MockSnowflake::start(|path: &str| match path {
        LOGIN => common::login_ok(),
        QUERY => common::error("002003", "SQL compilation error: Object 'NOPE' does not exist"),
        _ => common::empty_ok(),
    })
    .await;

    let (result, out) = run(
        server.args(&["--snowflake.password", "hunter2", "--query", "select * from nope"]),
        &CancellationToken::new(),
    )
    .await;

    let err = result.unwrap_err();
    assert!(matches!(err, Error::Query(_)), "{err:?}");
    assert!(err.to_string().contains("002003"));
    assert!(out.is_empty());
    assert_eq!(server.paths(), vec![LOGIN, QUERY, CLOSE]);
}

#[tokio::test]
async fn interrupt_during_query_sends_abort() {
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    let server = MockSnowflake::start(move |path: &str| match path {
        LOGIN => common::login_ok(),
        QUERY => {
            interrupt.cancel();
            Reply::Hang
        }
        _ => common::empty_ok(),
    })
    .await;

    let (result, out) = run(server.args(&["--snowflake.password", "hunter2"]), &cancel).await;

    assert!(matches!(result, Err(Error::Cancelled)), "{result:?}");
    assert!(out.is_empty());
    assert_eq!(server.paths(), vec![LOGIN, QUERY, ABORT]);

    let abort: serde_json::Value = serde_json::from_str(&server.recorded()[2].body).unwrap();
    assert_eq!(abort["sqlText"], snowflake_query::args::DEFAULT_QUERY);
    let query_request_id = server.recorded()[1]
        .query
        .split('&')
        .find_map(|pair| pair.strip_prefix("requestId="))
        .map(str::to_string);
    assert_eq!(abort["requestId"].as_str().map(str::to_string), query_request_id);
}

#[tokio::test]
async fn interrupt_during_login_stops_before_query() {
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    let server = MockSnowflake::start(move |path: &str| match path {
        LOGIN => {
            interrupt.cancel();
            Reply::Hang
        }
        _ => common::empty_ok(),
    })
    .await;

    let (result, _) = run(server.args(&["--snowflake.password", "hunter2"]), &cancel).await;

    assert!(matches!(result, Err(Error::Cancelled)), "{result:?}");
    assert_eq!(server.paths(), vec![LOGIN]);
}
