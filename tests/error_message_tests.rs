#![allow(clippy::unwrap_used)]

use reqwest::StatusCode;
use url::Url;
use verifier::address::{AddressError, ContractAddress};
use verifier::api::ApiClientError;
use verifier::compiler::{CompileError, HttpCompiler};
use verifier::errors::{ErrorCode, RequestFailure};
use verifier::registry::RegistryError;
use verifier::resolver;
use verifier::version::IndexError;
use verifier::workflow::{Step, WorkflowError};

#[test]
fn test_request_failure_error_with_status_specific_suggestions() {
    let url = Url::parse("https://server-verify.hashscan.io/session/input-files").unwrap();

    let not_found = RequestFailure::new(url.clone(), StatusCode::NOT_FOUND, "Not found");
    let not_found_message = format!("{not_found}");
    assert!(not_found_message.contains("[E001]"));
    assert!(not_found_message.contains("Check that the URL is correct"));
    assert!(not_found_message.contains("session/input-files"));

    let too_large = RequestFailure::new(url.clone(), StatusCode::PAYLOAD_TOO_LARGE, "too big");
    let too_large_message = format!("{too_large}");
    assert!(too_large_message.contains("Submit fewer source files"));

    let rate_limited = RequestFailure::new(url, StatusCode::TOO_MANY_REQUESTS, "Rate limited");
    let rate_limit_message = format!("{rate_limited}");
    assert!(rate_limit_message.contains("Wait a moment before retrying"));
    assert!(rate_limit_message.contains("reducing request frequency"));
}

#[test]
fn test_request_failure_codes() {
    let url = Url::parse("https://server-verify.hashscan.io/verify").unwrap();
    let client = RequestFailure::new(url.clone(), StatusCode::BAD_REQUEST, "bad");
    let server = RequestFailure::new(url, StatusCode::SERVICE_UNAVAILABLE, "down");

    assert_eq!(client.error_code(), ErrorCode::E001);
    assert_eq!(server.error_code(), ErrorCode::E002);

    let index_error = IndexError::from(RequestFailure::new(
        Url::parse("https://binaries.soliditylang.org/bin/list.json").unwrap(),
        StatusCode::NOT_FOUND,
        "gone",
    ));
    assert_eq!(index_error.error_code(), "E001");

    let compile_error = CompileError::from(RequestFailure::new(
        Url::parse("https://compiler.example.com/compile").unwrap(),
        StatusCode::INTERNAL_SERVER_ERROR,
        "crashed",
    ));
    assert_eq!(compile_error.error_code(), "E002");

    let api_error = ApiClientError::from(server);
    assert_eq!(api_error.error_code(), "E002");
    assert!(format!("{api_error}").contains("try again later"));
}

#[test]
fn test_address_error_with_format_info() {
    let error = ContractAddress::new("0x04e2").unwrap_err();
    let error_message = format!("{error}");

    assert!(error_message.contains("[E010]"));
    assert!(error_message.contains("exactly 40 hexadecimal digits"));
    assert_eq!(error.error_code(), "E010");
    assert!(matches!(error, AddressError::Match(raw) if raw == "0x04e2"));
}

#[test]
fn test_api_client_error_messages() {
    let cannot_be_base = ApiClientError::CannotBeBase(Url::parse("mailto:a@b.c").unwrap());
    let message = format!("{cannot_be_base}");
    assert!(message.contains("[E006]"));
    assert!(message.contains("Provide a valid HTTP or HTTPS URL"));

    let payload = ApiClientError::Payload {
        url: Url::parse("https://server-verify.hashscan.io/session/data").unwrap(),
        error: serde_json::from_str::<serde_json::Value>("<html>").unwrap_err(),
    };
    assert_eq!(payload.error_code(), "E007");
    assert!(format!("{payload}").contains("points at a verification server"));
}

#[test]
fn test_compile_error_messages() {
    let error = HttpCompiler::new(Url::parse("data:text/plain,solc").unwrap()).unwrap_err();
    assert!(matches!(error, CompileError::CannotBeBase(_)));
    assert_eq!(error.error_code(), "E003");

    let rejected = CompileError::Rejected("unsupported version".to_owned());
    assert_eq!(rejected.error_code(), "E004");
    assert!(format!("{rejected}").contains("Compilation failed: unsupported version"));
}

#[test]
fn test_resolver_error_with_suggestions() {
    let error = resolver::Error::IoError {
        path: "contracts/Token.sol".to_owned(),
        error: "permission denied".to_owned(),
    };
    let error_message = format!("{error}");

    assert!(error_message.contains("[E026]"));
    assert!(error_message.contains("contracts/Token.sol"));
    assert!(error_message.contains("Verify file permissions"));
}

#[test]
fn test_workflow_error_codes() {
    assert_eq!(WorkflowError::Busy.error_code(), "E040");
    assert_eq!(
        WorkflowError::NotReady(Step::ImportResolution).error_code(),
        "E041"
    );
    assert!(format!("{}", WorkflowError::CannotGoBack(Step::Register)).contains("step 5"));
    assert_eq!(WorkflowError::Disposed.error_code(), "E044");
    assert!(format!("{}", WorkflowError::Disposed).contains("[E044]"));

    let registry = WorkflowError::from(RegistryError::Rejected("duplicate".to_owned()));
    assert_eq!(registry.error_code(), "E033");
}

#[test]
fn test_error_message_structure() {
    let error = ContractAddress::new("not-an-address").unwrap_err();
    let error_message = format!("{error}");

    assert!(error_message.contains("[E"));
    assert!(error_message.contains("Suggestions:"));
    assert!(error_message.contains("•"));
}
