use std::collections::BTreeMap;
use std::sync::Mutex;

use log::{debug, info, warn};

use crate::{
    api::{VerificationServer, VerifyRequest, VerifyResponse},
    busy::{lock, Busy, BusyGuard},
};

use super::{
    begin_round, dispose, finish_round, ContractTarget, Guarded, RoundOutcome, SessionFailure,
    SessionState,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatelessState {
    pub busy: bool,
    pub failure: Option<SessionFailure>,
    pub response: Option<VerifyResponse>,
}

impl StatelessState {
    /// Status the server reported for the first result of the last call.
    pub fn status(&self) -> Option<&str> {
        self.response
            .as_ref()
            .and_then(|response| response.result.first())
            .map(|result| result.status.as_str())
    }
}

impl Busy for StatelessState {
    fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }
}

impl SessionState for StatelessState {
    fn is_busy(&self) -> bool {
        self.busy
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Inputs {
    target: Option<ContractTarget>,
    files: BTreeMap<String, String>,
    compiler_version: Option<String>,
    contract_name: Option<String>,
}

impl Inputs {
    fn request(&self) -> Option<VerifyRequest> {
        let target = self.target.as_ref()?;
        if self.files.is_empty() {
            return None;
        }
        Some(VerifyRequest {
            address: target.address.to_string(),
            chain: target.chain_id.clone(),
            files: self.files.clone(),
            compiler_version: self.compiler_version.clone(),
            contract_name: self.contract_name.clone(),
        })
    }
}

/// One-shot verification: every change of contract or files posts the
/// whole file set to the server again.
pub struct StatelessVerification<S> {
    server: S,
    inputs: Mutex<Inputs>,
    inner: Mutex<Guarded<StatelessState>>,
}

impl<S: VerificationServer> StatelessVerification<S> {
    pub fn new(server: S) -> Self {
        Self {
            server,
            inputs: Mutex::new(Inputs::default()),
            inner: Mutex::new(Guarded::new(StatelessState::default())),
        }
    }

    /// Pins the compiler version and contract name sent with each request.
    pub fn with_options(
        self,
        compiler_version: Option<String>,
        contract_name: Option<String>,
    ) -> Self {
        {
            let mut inputs = lock(&self.inputs);
            inputs.compiler_version = compiler_version;
            inputs.contract_name = contract_name;
        }
        self
    }

    pub fn state(&self) -> StatelessState {
        lock(&self.inner).state.clone()
    }

    pub fn status(&self) -> Option<String> {
        lock(&self.inner).state.status().map(str::to_owned)
    }

    /// Records new inputs and verifies them.
    ///
    /// Unchanged inputs are not sent again. If a call is already in flight
    /// its answer is dropped in favour of the new inputs, but no second
    /// call is started; `verify` has to be called again once the session is
    /// idle.
    pub async fn update(
        &self,
        target: Option<ContractTarget>,
        files: BTreeMap<String, String>,
    ) -> RoundOutcome {
        {
            let mut inputs = lock(&self.inputs);
            if inputs.target == target && inputs.files == files {
                debug!("Inputs unchanged, not verifying again");
                return RoundOutcome::Skipped;
            }
            inputs.target = target;
            inputs.files = files;
        }
        lock(&self.inner).generation += 1;
        self.verify().await
    }

    /// Posts the current inputs to the server and stores the raw response.
    pub async fn verify(&self) -> RoundOutcome {
        let request = lock(&self.inputs).request();
        let Some(request) = request else {
            debug!("No contract or no files, nothing to verify");
            return RoundOutcome::Skipped;
        };
        let generation = match begin_round(&self.inner) {
            Ok(generation) => generation,
            Err(outcome) => return outcome,
        };
        let _busy = BusyGuard::new(&self.inner);

        info!(
            "Verifying {} files against {} on chain {}",
            request.files.len(),
            request.address,
            request.chain
        );
        let result = self.server.verify(&request).await;
        finish_round(&self.inner, generation, |state| match result {
            Ok(response) => {
                if let Some(error) = &response.error {
                    warn!("Server rejected verification: {error}");
                }
                state.failure = None;
                state.response = Some(response);
                RoundOutcome::Applied
            }
            Err(e) => {
                warn!("Verification request failed: {e}");
                state.failure = Some(SessionFailure::from(&e));
                RoundOutcome::Failed
            }
        })
    }

    pub fn dispose(&self) {
        dispose(&self.inner);
    }
}
