//! The five step local verification flow.
//!
//! 1. source entry, 2. compiler selection, 3. import resolution,
//! 4. compile and compare, 5. register.
//!
//! Every input change is an explicit call that re-derives what depends on
//! it; nothing recomputes behind the caller's back.

use std::{
    fmt,
    sync::{Arc, Mutex},
};

use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::{
    busy::{lock, Busy, BusyGuard},
    bytecode::{strip_hex_prefix, MatchKind},
    compiler::{CompileOutput, CompileRequest, CompilerInput, CompilerService},
    matcher::find_matching_contract,
    registry::{ContractRegistry, Registration, RegistryError},
    resolver::{self, ImportResolver, ImportSpec},
    version::{resolve_version, CompilerIndex},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Step {
    SourceEntry,
    CompilerSelection,
    ImportResolution,
    CompileAndCompare,
    Register,
}

impl Step {
    pub const fn number(self) -> u8 {
        match self {
            Self::SourceEntry => 1,
            Self::CompilerSelection => 2,
            Self::ImportResolution => 3,
            Self::CompileAndCompare => 4,
            Self::Register => 5,
        }
    }

    pub const fn next(self) -> Option<Self> {
        match self {
            Self::SourceEntry => Some(Self::CompilerSelection),
            Self::CompilerSelection => Some(Self::ImportResolution),
            Self::ImportResolution => Some(Self::CompileAndCompare),
            Self::CompileAndCompare => Some(Self::Register),
            Self::Register => None,
        }
    }

    /// Step `back` returns to. The first and last steps have none.
    pub const fn previous(self) -> Option<Self> {
        match self {
            Self::CompilerSelection => Some(Self::SourceEntry),
            Self::ImportResolution => Some(Self::CompilerSelection),
            Self::CompileAndCompare => Some(Self::ImportResolution),
            Self::SourceEntry | Self::Register => None,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SourceEntry => "source entry",
            Self::CompilerSelection => "compiler selection",
            Self::ImportResolution => "import resolution",
            Self::CompileAndCompare => "compile and compare",
            Self::Register => "register",
        };
        write!(f, "{} ({name})", self.number())
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("[E040] A compilation or registration is still running\n\nSuggestions:\n  • Wait for it to finish before changing steps")]
    Busy,

    #[error("[E041] Step {0} is not complete")]
    NotReady(Step),

    #[error("[E042] Can't go back from step {0}")]
    CannotGoBack(Step),

    #[error("[E043] Verification already reached its last step")]
    Finished,

    #[error("[E044] Verification was closed\n\nSuggestions:\n  • Start a new verification")]
    Disposed,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl WorkflowError {
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Busy => "E040",
            Self::NotReady(_) => "E041",
            Self::CannotGoBack(_) => "E042",
            Self::Finished => "E043",
            Self::Disposed => "E044",
            Self::Registry(e) => e.error_code(),
        }
    }
}

/// Point in time view of a workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationState {
    pub current_step: Step,
    pub busy: bool,
    pub source_file_name: String,
    pub source: Option<String>,
    pub compiler_version: Option<String>,
    pub import_specs: Vec<ImportSpec>,
    pub compile_output: Option<Arc<CompileOutput>>,
}

impl VerificationState {
    pub fn unresolved_count(&self) -> usize {
        resolver::unresolved_count(&self.import_specs)
    }
}

impl Busy for Inner {
    fn set_busy(&mut self, busy: bool) {
        self.state.busy = busy;
    }
}

struct Inner {
    state: VerificationState,
    generation: u64,
    disposed: bool,
}

/// External call a step transition waits on, tagged with its generation.
enum Round {
    Compile(u64, CompilerInput),
    Register(u64, Registration),
}

/// Name and kind of the contract that matched the deployed bytecode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSummary {
    pub contract_name: String,
    pub kind: MatchKind,
}

pub struct VerificationWorkflow<C, R> {
    compiler: C,
    registry: R,
    index: Arc<CompilerIndex>,
    resolver: ImportResolver,
    contract_id: Option<String>,
    deployed_bytecode: String,
    inner: Mutex<Inner>,
}

impl<C: CompilerService, R: ContractRegistry> VerificationWorkflow<C, R> {
    pub fn new(
        compiler: C,
        registry: R,
        index: Arc<CompilerIndex>,
        resolver: ImportResolver,
        contract_id: Option<String>,
        deployed_bytecode: &str,
    ) -> Self {
        Self {
            compiler,
            registry,
            index,
            resolver,
            contract_id,
            deployed_bytecode: strip_hex_prefix(deployed_bytecode).to_owned(),
            inner: Mutex::new(Inner {
                state: VerificationState {
                    current_step: Step::SourceEntry,
                    busy: false,
                    source_file_name: String::new(),
                    source: None,
                    compiler_version: None,
                    import_specs: Vec::new(),
                    compile_output: None,
                },
                generation: 0,
                disposed: false,
            }),
        }
    }

    pub fn snapshot(&self) -> VerificationState {
        lock(&self.inner).state.clone()
    }

    pub fn current_step(&self) -> Step {
        lock(&self.inner).state.current_step
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.inner).state.busy
    }

    pub fn deployed_bytecode(&self) -> &str {
        &self.deployed_bytecode
    }

    /// Replaces the source. The compiler guess and import list are derived
    /// again from it and any compile output is dropped, all under one lock.
    pub fn set_source(&self, source_file_name: impl Into<String>, source: Option<String>) {
        let compiler_version = source
            .as_deref()
            .and_then(|s| resolve_version(s, &self.index));
        let import_specs = source
            .as_deref()
            .map(|s| {
                self.resolver
                    .resolve_to_fixed_point(&self.resolver.seed(s))
            })
            .unwrap_or_default();

        let mut inner = lock(&self.inner);
        debug!(
            "Source changed: compiler guess {compiler_version:?}, {} imports",
            import_specs.len()
        );
        inner.state.source_file_name = source_file_name.into();
        inner.state.source = source;
        inner.state.compiler_version = compiler_version;
        inner.state.import_specs = import_specs;
        inner.state.compile_output = None;
        inner.generation += 1;
    }

    pub fn set_compiler_version(&self, version: Option<String>) {
        lock(&self.inner).state.compiler_version = version;
    }

    /// Fills in one import and scans it for further imports.
    pub fn supply_import(&self, path: &str, source: String, source_file_name: Option<String>) {
        let mut inner = lock(&self.inner);
        let specs = resolver::supply_source(&inner.state.import_specs, path, source, source_file_name);
        inner.state.import_specs = self.resolver.resolve_to_fixed_point(&specs);
    }

    /// Replaces the import list, then scans it to its fixed point.
    pub fn replace_imports(&self, specs: &[ImportSpec]) {
        let specs = self.resolver.resolve_to_fixed_point(specs);
        lock(&self.inner).state.import_specs = specs;
    }

    pub fn unresolved_count(&self) -> usize {
        lock(&self.inner).state.unresolved_count()
    }

    /// The contract of the entry source matching the deployed bytecode.
    pub fn matched_contract(&self) -> Option<MatchSummary> {
        let inner = lock(&self.inner);
        self.summarize(&inner.state)
    }

    pub fn match_kind(&self) -> MatchKind {
        self.matched_contract()
            .map_or(MatchKind::Mismatch, |found| found.kind)
    }

    fn summarize(&self, state: &VerificationState) -> Option<MatchSummary> {
        let output = state.compile_output.as_deref()?;
        find_matching_contract(&state.source_file_name, &self.deployed_bytecode, output).map(
            |found| MatchSummary {
                contract_name: found.name().to_owned(),
                kind: found.kind,
            },
        )
    }

    fn is_ready(&self, state: &VerificationState) -> bool {
        match state.current_step {
            Step::SourceEntry => state.source.is_some(),
            Step::CompilerSelection => state.compiler_version.is_some(),
            Step::ImportResolution => {
                state.compiler_version.is_some() && state.unresolved_count() == 0
            }
            Step::CompileAndCompare => self
                .summarize(state)
                .is_some_and(|found| found.kind.is_match()),
            Step::Register => false,
        }
    }

    pub fn can_next(&self) -> bool {
        let inner = lock(&self.inner);
        !inner.state.busy && self.is_ready(&inner.state)
    }

    pub fn can_back(&self) -> bool {
        let inner = lock(&self.inner);
        !inner.state.busy && inner.state.current_step.previous().is_some()
    }

    /// Moves back one step.
    ///
    /// # Errors
    ///
    /// Will return `Err` while busy, or on the first and last steps.
    pub fn back(&self) -> Result<Step, WorkflowError> {
        let mut inner = lock(&self.inner);
        if inner.state.busy {
            return Err(WorkflowError::Busy);
        }
        let step = inner.state.current_step;
        let previous = step.previous().ok_or(WorkflowError::CannotGoBack(step))?;
        inner.state.current_step = previous;
        Ok(previous)
    }

    /// Advances one step. Entering step 4 compiles, entering step 5
    /// registers the matched contract.
    ///
    /// Returns the step the workflow is on once the round settles. That is
    /// still step 4 when the source changed while a call was in flight.
    ///
    /// # Errors
    ///
    /// Will return `Err` while busy, when the current step isn't complete,
    /// when registration fails, or once the workflow is disposed.
    pub async fn next(&self) -> Result<Step, WorkflowError> {
        let round = {
            let mut inner = lock(&self.inner);
            if inner.disposed {
                return Err(WorkflowError::Disposed);
            }
            if inner.state.busy {
                return Err(WorkflowError::Busy);
            }
            let step = inner.state.current_step;
            let target = step.next().ok_or(WorkflowError::Finished)?;
            if !self.is_ready(&inner.state) {
                return Err(WorkflowError::NotReady(step));
            }
            match target {
                Step::CompileAndCompare => self.begin_compile(&mut inner)?,
                Step::Register => match self.registration(&inner.state)? {
                    Some(registration) => {
                        inner.state.busy = true;
                        Round::Register(inner.generation, registration)
                    }
                    None => {
                        warn!("No contract id, skipping registration");
                        inner.state.current_step = target;
                        return Ok(target);
                    }
                },
                _ => {
                    inner.state.current_step = target;
                    return Ok(target);
                }
            }
        };

        let busy = BusyGuard::new(&self.inner);
        let applied = match round {
            Round::Compile(generation, input) => self.compile(generation, &input).await,
            Round::Register(generation, registration) => {
                self.register(generation, &registration).await?
            }
        };
        drop(busy);

        let inner = lock(&self.inner);
        if inner.disposed {
            return Err(WorkflowError::Disposed);
        }
        if !applied {
            debug!("Round superseded, staying on step {}", inner.state.current_step);
        }
        Ok(inner.state.current_step)
    }

    /// Enters step 4 and builds the compiler input, all under the caller's lock.
    fn begin_compile(&self, inner: &mut Inner) -> Result<Round, WorkflowError> {
        let state = &inner.state;
        let version = state
            .compiler_version
            .clone()
            .ok_or(WorkflowError::NotReady(Step::ImportResolution))?;
        let request = CompileRequest::new(
            state.source_file_name.clone(),
            state.source.clone().unwrap_or_default(),
            &state.import_specs,
            version,
        );
        let input = CompilerInput::new(&request, &self.index);
        inner.state.current_step = Step::CompileAndCompare;
        inner.state.busy = true;
        inner.generation += 1;
        Ok(Round::Compile(inner.generation, input))
    }

    /// Returns whether the output was stored.
    async fn compile(&self, generation: u64, input: &CompilerInput) -> bool {
        info!(
            "Compiling {} with {}",
            input.entry_file_name, input.version
        );
        let result = self.compiler.compile(input).await;

        let mut inner = lock(&self.inner);
        if inner.disposed || inner.generation != generation {
            debug!("Discarding compile output of generation {generation}");
            return false;
        }
        inner.state.compile_output = match result {
            Ok(output) => {
                for message in output.errors() {
                    debug!("solc {:?}: {}", message.severity, message.message);
                }
                Some(Arc::new(output))
            }
            Err(e) => {
                warn!("Compilation failed, treating as no match: {e}");
                None
            }
        };
        true
    }

    /// `None` when there is no contract id to register under.
    fn registration(&self, state: &VerificationState) -> Result<Option<Registration>, WorkflowError> {
        let found = self
            .summarize(state)
            .ok_or(WorkflowError::NotReady(Step::CompileAndCompare))?;
        let abi = state
            .compile_output
            .as_deref()
            .and_then(|output| output.contract(&state.source_file_name, &found.contract_name))
            .map(|contract| contract.abi().clone())
            .unwrap_or_default();

        Ok(self.contract_id.as_ref().map(|contract_id| Registration {
            contract_id: contract_id.clone(),
            contract_name: found.contract_name,
            compiler_version: state.compiler_version.clone().unwrap_or_default(),
            source_file_name: state.source_file_name.clone(),
            match_kind: found.kind,
            abi,
            timestamp: Utc::now(),
        }))
    }

    /// Returns whether the workflow moved on to step 5.
    async fn register(
        &self,
        generation: u64,
        registration: &Registration,
    ) -> Result<bool, WorkflowError> {
        self.registry.register(registration).await?;

        let mut inner = lock(&self.inner);
        if inner.disposed || inner.generation != generation {
            debug!("Source changed during registration, staying on step 4");
            return Ok(false);
        }
        inner.state.current_step = Step::Register;
        Ok(true)
    }

    /// Stops the workflow from applying results of calls still in flight.
    pub fn dispose(&self) {
        let mut inner = lock(&self.inner);
        inner.disposed = true;
        inner.generation += 1;
    }
}
