use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Status a verify-check reports for a contract that verified.
pub const STATUS_OK: &str = "ok";

#[derive(Debug, Deserialize)]
pub struct Error {
    pub error: String,
}

/// A contract the server found among the uploaded files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDescriptor {
    #[serde(default)]
    pub verification_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub compiled_path: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub chain_id: Option<String>,
}

impl ContractDescriptor {
    pub fn is_ok(&self) -> bool {
        self.status.as_deref() == Some(STATUS_OK)
    }
}

/// Server side view of a session; returned by every session endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub unused: Vec<String>,
    #[serde(default)]
    pub contracts: Vec<ContractDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCheckRequest {
    pub address: String,
    pub chain_id: String,
    pub verification_id: String,
    pub creator_tx_hash: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct VerifyCheckBody<'a> {
    pub contracts: &'a [VerifyCheckRequest],
}

#[derive(Debug, Serialize)]
pub(crate) struct InputFilesBody<'a> {
    pub files: &'a BTreeMap<String, String>,
}

/// One-shot verification of a set of files against a deployed address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub address: String,
    pub chain: String,
    pub files: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiler_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResult {
    pub address: String,
    pub chain_id: String,
    pub status: String,
    #[serde(default)]
    pub library: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifyResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub result: Vec<VerifyResult>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_data_defaults() {
        let data: SessionData = serde_json::from_value(json!({"contracts": [
            {"verificationId": "0x1f", "name": "Token", "compiledPath": "Token.sol", "status": "ok"}
        ]}))
        .unwrap();
        assert!(data.files.is_empty());
        assert!(data.contracts[0].is_ok());
        assert_eq!(data.contracts[0].verification_id.as_deref(), Some("0x1f"));
    }

    #[test]
    fn test_verify_check_body_shape() {
        let contracts = [VerifyCheckRequest {
            address: "0x00000000000000000000000000000000000004e2".to_owned(),
            chain_id: "296".to_owned(),
            verification_id: "0x1f".to_owned(),
            creator_tx_hash: None,
        }];
        let body = serde_json::to_value(VerifyCheckBody {
            contracts: &contracts,
        })
        .unwrap();
        assert_eq!(body["contracts"][0]["chainId"], "296");
        assert_eq!(body["contracts"][0]["verificationId"], "0x1f");
        assert!(body["contracts"][0]["creatorTxHash"].is_null());
    }

    #[test]
    fn test_verify_request_omits_unset_options() {
        let request = VerifyRequest {
            address: "0x00000000000000000000000000000000000004e2".to_owned(),
            chain: "296".to_owned(),
            files: BTreeMap::from([("Token.sol".to_owned(), "contract Token {}".to_owned())]),
            compiler_version: None,
            contract_name: Some("Token".to_owned()),
        };
        let body = serde_json::to_value(&request).unwrap();
        assert!(body.get("compilerVersion").is_none());
        assert_eq!(body["contractName"], "Token");
        assert_eq!(body["files"]["Token.sol"], "contract Token {}");
    }

    #[test]
    fn test_verify_response_with_error() {
        let response: VerifyResponse =
            serde_json::from_value(json!({"error": "Contract name not found"})).unwrap();
        assert_eq!(response.error.as_deref(), Some("Contract name not found"));
        assert!(response.result.is_empty());
    }
}
