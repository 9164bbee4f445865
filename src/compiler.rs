use std::collections::BTreeMap;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use url::Url;

use crate::{errors::RequestFailure, resolver::ImportSpec, version::CompilerIndex};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("[E003] Invalid compiler URL: {0}\n\nSuggestions:\n  • Provide a valid HTTP or HTTPS URL\n  • Ensure the URL includes the protocol (http:// or https://)")]
    CannotBeBase(Url),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Failure(#[from] RequestFailure),

    #[error("[E004] Compiler output is not standard JSON: {0}")]
    Output(#[from] serde_json::Error),

    #[error("[E004] Compilation failed: {0}")]
    Rejected(String),
}

impl CompileError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::CannotBeBase(_) => "E003",
            Self::Reqwest(_) => "E999",
            Self::Failure(f) => f.error_code().as_str(),
            Self::Output(_) | Self::Rejected(_) => "E004",
        }
    }
}

/// Everything needed to compile one entry source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
    pub source_file_name: String,
    pub source: String,
    pub import_sources: BTreeMap<String, String>,
    pub compiler_version: String,
}

impl CompileRequest {
    /// Resolved imports are keyed by their import path and by their bare
    /// file name, since sources may refer to them either way.
    pub fn new(
        source_file_name: impl Into<String>,
        source: impl Into<String>,
        imports: &[ImportSpec],
        compiler_version: impl Into<String>,
    ) -> Self {
        let mut import_sources = BTreeMap::new();
        for spec in imports {
            if let Some(content) = &spec.source {
                import_sources.insert(spec.path.clone(), content.clone());
                import_sources.insert(spec.file_name().to_owned(), content.clone());
            }
        }

        Self {
            source_file_name: source_file_name.into(),
            source: source.into(),
            import_sources,
            compiler_version: compiler_version.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceContent {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StandardJsonInput {
    pub language: String,
    pub sources: BTreeMap<String, SourceContent>,
    pub settings: Value,
}

/// Body sent to the compiler service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerInput {
    pub version: String,
    pub standard_json_input: StandardJsonInput,
    pub entry_file_name: String,
}

impl CompilerInput {
    /// The compiler is addressed as `v<longVersion>`; a version missing from
    /// the index is sent as given.
    pub fn new(request: &CompileRequest, index: &CompilerIndex) -> Self {
        let long_version = index
            .long_version(&request.compiler_version)
            .unwrap_or(&request.compiler_version);

        let mut sources = BTreeMap::new();
        sources.insert(
            request.source_file_name.clone(),
            SourceContent {
                content: request.source.clone(),
            },
        );
        for (name, content) in &request.import_sources {
            sources.insert(
                name.clone(),
                SourceContent {
                    content: content.clone(),
                },
            );
        }

        Self {
            version: format!("v{long_version}"),
            standard_json_input: StandardJsonInput {
                language: "Solidity".to_owned(),
                sources,
                settings: json!({
                    "outputSelection": {
                        "*": { "*": ["abi", "evm.deployedBytecode.object"] }
                    }
                }),
            },
            entry_file_name: request.source_file_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerMessage {
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub formatted_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledContract {
    name: String,
    abi: Value,
    deployed_bytecode: String,
}

impl CompiledContract {
    pub fn new(name: impl Into<String>, abi: Value, deployed_bytecode: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            abi,
            deployed_bytecode: deployed_bytecode.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn abi(&self) -> &Value {
        &self.abi
    }

    /// Runtime bytecode without `0x`.
    pub fn deployed_bytecode(&self) -> &str {
        &self.deployed_bytecode
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSource {
    file_name: String,
    contracts: Vec<CompiledContract>,
}

impl CompiledSource {
    pub fn new(file_name: impl Into<String>, contracts: Vec<CompiledContract>) -> Self {
        Self {
            file_name: file_name.into(),
            contracts,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn contracts(&self) -> &[CompiledContract] {
        &self.contracts
    }
}

/// Result of one compilation. Fields are read-only once built; sources and
/// contracts keep the order the compiler emitted them in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompileOutput {
    errors: Vec<CompilerMessage>,
    sources: Vec<CompiledSource>,
}

#[derive(Deserialize)]
struct RawOutput {
    #[serde(default)]
    errors: Vec<CompilerMessage>,
    #[serde(default)]
    contracts: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawContract {
    #[serde(default)]
    abi: Value,
    #[serde(default)]
    evm: RawEvm,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvm {
    #[serde(default)]
    deployed_bytecode: RawBytecode,
}

#[derive(Default, Deserialize)]
struct RawBytecode {
    #[serde(default)]
    object: String,
}

impl CompileOutput {
    pub fn new(errors: Vec<CompilerMessage>, sources: Vec<CompiledSource>) -> Self {
        Self { errors, sources }
    }

    /// # Errors
    ///
    /// Will return `Err` if `value` doesn't have the standard JSON output shape.
    pub fn from_standard_json(value: Value) -> Result<Self, serde_json::Error> {
        let raw: RawOutput = serde_json::from_value(value)?;

        let sources = raw
            .contracts
            .into_iter()
            .map(|(file_name, contracts)| {
                let contracts: Map<String, Value> = serde_json::from_value(contracts)?;
                let contracts = contracts
                    .into_iter()
                    .map(|(name, contract)| {
                        let contract: RawContract = serde_json::from_value(contract)?;
                        Ok(CompiledContract {
                            name,
                            abi: contract.abi,
                            deployed_bytecode: contract.evm.deployed_bytecode.object,
                        })
                    })
                    .collect::<Result<Vec<_>, serde_json::Error>>()?;
                Ok(CompiledSource {
                    file_name,
                    contracts,
                })
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()?;

        Ok(Self {
            errors: raw.errors,
            sources,
        })
    }

    pub fn errors(&self) -> &[CompilerMessage] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(|e| e.severity == Severity::Error)
    }

    pub fn sources(&self) -> &[CompiledSource] {
        &self.sources
    }

    /// Contracts compiled from `file_name`, in compiler order.
    pub fn contracts_of(&self, file_name: &str) -> Option<&[CompiledContract]> {
        self.sources
            .iter()
            .find(|source| source.file_name == file_name)
            .map(CompiledSource::contracts)
    }

    pub fn contract(&self, file_name: &str, name: &str) -> Option<&CompiledContract> {
        self.contracts_of(file_name)?
            .iter()
            .find(|contract| contract.name == name)
    }
}

/// Something that turns standard JSON input into compiler output.
#[async_trait]
pub trait CompilerService: Send + Sync {
    async fn compile(&self, input: &CompilerInput) -> Result<CompileOutput, CompileError>;
}

/// Compiler service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCompiler {
    url: Url,
    client: Client,
}

impl HttpCompiler {
    /// # Errors
    ///
    /// Fails if `url` cannot be a base.
    pub fn new(url: Url) -> Result<Self, CompileError> {
        if url.cannot_be_a_base() {
            Err(CompileError::CannotBeBase(url))
        } else {
            Ok(Self {
                url,
                client: Client::new(),
            })
        }
    }
}

#[async_trait]
impl CompilerService for HttpCompiler {
    async fn compile(&self, input: &CompilerInput) -> Result<CompileOutput, CompileError> {
        debug!(
            "Compiling {} with solc {} ({} sources)",
            input.entry_file_name,
            input.version,
            input.standard_json_input.sources.len()
        );

        let response = self
            .client
            .post(self.url.clone())
            .json(input)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => (),
            status_code => {
                return Err(CompileError::from(RequestFailure::new(
                    self.url.clone(),
                    status_code,
                    response.text().await?,
                )));
            }
        }

        let value: Value = response.json().await?;
        Ok(CompileOutput::from_standard_json(value)?)
    }
}
