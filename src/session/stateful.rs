use std::collections::BTreeMap;
use std::sync::Mutex;

use log::{debug, info, warn};

use crate::{
    api::{ContractDescriptor, SessionData, VerificationServer, VerifyCheckRequest},
    busy::{lock, Busy, BusyGuard},
};

use super::{
    begin_round, dispose, finish_round, is_current, ContractTarget, Guarded, RoundOutcome,
    SessionFailure, SessionState,
};

/// Client view of a server side verification session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteSessionState {
    pub busy: bool,
    pub failure: Option<SessionFailure>,
    pub uploaded_files: Vec<String>,
    pub unused_files: Vec<String>,
    pub verify_responses: Vec<SessionData>,
}

/// The first contract any verify-check reported as verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMatch {
    pub contract: ContractDescriptor,
    pub response: SessionData,
}

impl ResolvedMatch {
    pub fn contract_name(&self) -> &str {
        self.contract.name.as_deref().unwrap_or_default()
    }
}

impl RemoteSessionState {
    /// Scans the verify-check responses in order and returns the first
    /// contract with an `ok` status.
    pub fn resolved_match(&self) -> Option<ResolvedMatch> {
        self.verify_responses.iter().find_map(|response| {
            response
                .contracts
                .iter()
                .find(|contract| contract.is_ok())
                .map(|contract| ResolvedMatch {
                    contract: contract.clone(),
                    response: response.clone(),
                })
        })
    }

    /// Status of the matched contract, or of the first contract the latest
    /// verify-check reported on.
    pub fn status(&self) -> Option<String> {
        if let Some(resolved) = self.resolved_match() {
            return resolved.contract.status;
        }
        self.verify_responses
            .last()
            .and_then(|response| response.contracts.first())
            .and_then(|contract| contract.status.clone())
    }

    pub fn item_count(&self) -> usize {
        self.uploaded_files.len()
    }

    fn replace(&mut self, data: SessionData, verify_responses: Vec<SessionData>) {
        self.failure = None;
        self.uploaded_files = data.files;
        self.unused_files = data.unused;
        self.verify_responses = verify_responses;
    }
}

impl Busy for RemoteSessionState {
    fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }
}

impl SessionState for RemoteSessionState {
    fn is_busy(&self) -> bool {
        self.busy
    }
}

/// Drives the stateful verification protocol: files are uploaded into a
/// cookie-bound server session, then each contract the server found is
/// checked against the target address.
pub struct RemoteVerificationSession<S> {
    server: S,
    target: Option<ContractTarget>,
    inner: Mutex<Guarded<RemoteSessionState>>,
}

impl<S: VerificationServer> RemoteVerificationSession<S> {
    pub fn new(server: S, target: Option<ContractTarget>) -> Self {
        Self {
            server,
            target,
            inner: Mutex::new(Guarded::new(RemoteSessionState::default())),
        }
    }

    pub const fn target(&self) -> Option<&ContractTarget> {
        self.target.as_ref()
    }

    pub fn state(&self) -> RemoteSessionState {
        lock(&self.inner).state.clone()
    }

    pub fn resolved_match(&self) -> Option<ResolvedMatch> {
        lock(&self.inner).state.resolved_match()
    }

    pub fn status(&self) -> Option<String> {
        lock(&self.inner).state.status()
    }

    /// Loads the server session for the target contract. Without a target
    /// nothing is fetched.
    pub async fn mount(&self) -> RoundOutcome {
        if self.target.is_none() {
            debug!("No contract selected, not fetching session data");
            return RoundOutcome::Skipped;
        }
        self.fetch_session_data().await
    }

    pub async fn fetch_session_data(&self) -> RoundOutcome {
        let generation = match begin_round(&self.inner) {
            Ok(generation) => generation,
            Err(outcome) => return outcome,
        };
        let _busy = BusyGuard::new(&self.inner);

        let result = self.server.session_data().await;
        finish_round(&self.inner, generation, |state| match result {
            Ok(data) => {
                state.replace(data, Vec::new());
                RoundOutcome::Applied
            }
            Err(e) => {
                warn!("Fetching session data failed: {e}");
                state.failure = Some(SessionFailure::from(&e));
                RoundOutcome::Failed
            }
        })
    }

    pub async fn clear_session(&self) -> RoundOutcome {
        let generation = match begin_round(&self.inner) {
            Ok(generation) => generation,
            Err(outcome) => return outcome,
        };
        let _busy = BusyGuard::new(&self.inner);

        let result = self.server.clear_session().await;
        finish_round(&self.inner, generation, |state| match result {
            Ok(message) => {
                debug!("Session cleared: {message}");
                state.replace(SessionData::default(), Vec::new());
                RoundOutcome::Applied
            }
            Err(e) => {
                warn!("Clearing the session failed: {e}");
                state.failure = Some(SessionFailure::from(&e));
                RoundOutcome::Failed
            }
        })
    }

    /// Uploads `files` and checks every contract the server reports back.
    ///
    /// Checks run one at a time in the order the server listed the
    /// contracts. A check that fails is logged and left out of the
    /// responses; it does not fail the round.
    pub async fn upload_files(&self, files: &BTreeMap<String, String>) -> RoundOutcome {
        let generation = match begin_round(&self.inner) {
            Ok(generation) => generation,
            Err(outcome) => return outcome,
        };
        let _busy = BusyGuard::new(&self.inner);

        let uploaded = match self.server.upload_files(files).await {
            Ok(data) => data,
            Err(e) => {
                warn!("Uploading {} files failed: {e}", files.len());
                return finish_round(&self.inner, generation, |state| {
                    state.failure = Some(SessionFailure::from(&e));
                    RoundOutcome::Failed
                });
            }
        };
        info!(
            "Uploaded {} files, server found {} contracts",
            uploaded.files.len(),
            uploaded.contracts.len()
        );

        let responses = self.check_contracts(generation, &uploaded.contracts).await;
        finish_round(&self.inner, generation, |state| {
            state.replace(uploaded, responses);
            RoundOutcome::Applied
        })
    }

    async fn check_contracts(
        &self,
        generation: u64,
        contracts: &[ContractDescriptor],
    ) -> Vec<SessionData> {
        let Some(target) = &self.target else {
            debug!("No contract selected, skipping verify checks");
            return Vec::new();
        };

        let mut responses = Vec::with_capacity(contracts.len());
        for contract in contracts {
            if !is_current(&self.inner, generation) {
                debug!("Session moved on, stopping verify checks");
                break;
            }
            let name = contract.name.as_deref().unwrap_or("<unnamed>");
            let Some(verification_id) = &contract.verification_id else {
                warn!("Contract {name} has no verification id, skipping");
                continue;
            };
            let request = VerifyCheckRequest {
                address: target.address.to_string(),
                chain_id: target.chain_id.clone(),
                verification_id: verification_id.clone(),
                creator_tx_hash: None,
            };
            match self.server.verify_checked(std::slice::from_ref(&request)).await {
                Ok(response) => responses.push(response),
                Err(e) => warn!("Verify check of {name} failed, skipping: {e}"),
            }
        }
        responses
    }

    /// Stops the session from accepting further results. Rounds still in
    /// flight finish but their answers are dropped.
    pub fn dispose(&self) {
        dispose(&self.inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_contract(name: &str) -> ContractDescriptor {
        ContractDescriptor {
            name: Some(name.to_owned()),
            status: Some("ok".to_owned()),
            ..ContractDescriptor::default()
        }
    }

    fn pending_contract(name: &str) -> ContractDescriptor {
        ContractDescriptor {
            name: Some(name.to_owned()),
            status: Some("error".to_owned()),
            ..ContractDescriptor::default()
        }
    }

    #[test]
    fn test_no_responses_no_match() {
        let state = RemoteSessionState::default();
        assert!(state.resolved_match().is_none());
        assert!(state.status().is_none());
    }

    #[test]
    fn test_first_ok_contract_wins() {
        let first = SessionData {
            contracts: vec![pending_contract("Lib")],
            ..SessionData::default()
        };
        let second = SessionData {
            contracts: vec![pending_contract("Other"), ok_contract("Token")],
            ..SessionData::default()
        };
        let third = SessionData {
            contracts: vec![ok_contract("Later")],
            ..SessionData::default()
        };
        let state = RemoteSessionState {
            verify_responses: vec![first, second.clone(), third],
            ..RemoteSessionState::default()
        };

        let resolved = state.resolved_match().unwrap();
        assert_eq!(resolved.contract_name(), "Token");
        assert_eq!(resolved.response, second);
        assert_eq!(state.status().as_deref(), Some("ok"));
    }

    #[test]
    fn test_status_without_match_reports_latest_check() {
        let state = RemoteSessionState {
            verify_responses: vec![SessionData {
                contracts: vec![pending_contract("Token")],
                ..SessionData::default()
            }],
            ..RemoteSessionState::default()
        };
        assert!(state.resolved_match().is_none());
        assert_eq!(state.status().as_deref(), Some("error"));
    }
}
