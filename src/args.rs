use camino::Utf8PathBuf;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Url;
use std::fs;
use verifier::{address::ContractAddress, api::DEFAULT_SERVER_URL, version::DEFAULT_INDEX_URL};

fn get_name_validation_regex() -> Result<&'static Regex, String> {
    lazy_static! {
        static ref VALID_NAME_REGEX: Result<Regex, regex::Error> =
            Regex::new(r"^[a-zA-Z_$][a-zA-Z0-9_$]*$");
    }

    match VALID_NAME_REGEX.as_ref() {
        Ok(regex) => Ok(regex),
        Err(_) => Err("Internal regex compilation error".to_string()),
    }
}

#[derive(clap::Parser)]
#[command(name = "hashscan-verify")]
#[command(version)]
#[command(about = "Verify deployed Solidity contracts against their source code")]
#[command(long_about = "
A command-line tool for verifying deployed Solidity contracts.

The verify command compiles the sources locally and compares the result with
the deployed bytecode. The session and check commands hand the sources to a
remote verification server instead.

Examples:
  # Compile and compare locally
  hashscan-verify verify --source contracts/Token.sol \\
    --bytecode @Token.bin --contract-id 0.0.1234 \\
    --compiler-url https://compiler.example.com/compile

  # Verify through a server session on testnet
  hashscan-verify session --network testnet \\
    --address 0x00000000000000000000000000000000000004e2 contracts/

  # One-shot verification with a pinned compiler
  hashscan-verify check --network mainnet \\
    --address 0x00000000000000000000000000000000000004e2 \\
    --compiler-version 0.8.18 contracts/Token.sol
")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand)]
#[allow(clippy::large_enum_variant)]
pub enum Commands {
    /// Compile a source file and compare it with deployed bytecode
    ///
    /// Walks the five verification steps: source entry, compiler selection,
    /// import resolution, compile and compare, and registration.
    Verify(VerifyArgs),

    /// Verify through a stateful server session
    ///
    /// Uploads the files into a session on the verification server, then
    /// checks every contract the server found against the address.
    Session(SessionArgs),

    /// Verify in a single request
    ///
    /// Posts all files to the server's verify endpoint and prints the
    /// reported status.
    Check(CheckArgs),
}

/// Reads bytecode either inline or, when prefixed with `@`, from a file.
fn bytecode_value_parser(raw: &str) -> Result<String, String> {
    let bytecode = match raw.strip_prefix('@') {
        Some(path) => fs::read_to_string(path)
            .map_err(|e| format!("Couldn't read bytecode from {path}: {e}"))?,
        None => raw.to_string(),
    };
    let bytecode = bytecode.trim();
    if bytecode.is_empty() {
        return Err("Bytecode cannot be empty".to_string());
    }
    Ok(bytecode.to_string())
}

fn contract_name_value_parser(name: &str) -> Result<String, String> {
    if name.is_empty() {
        return Err("Contract name cannot be empty".to_string());
    }

    let regex = get_name_validation_regex()?;
    if !regex.is_match(name) {
        return Err("Contract name must be a Solidity identifier".to_string());
    }

    Ok(name.to_string())
}

#[derive(clap::Args)]
pub struct VerifyArgs {
    /// Solidity file holding the contract
    #[arg(long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub source: Utf8PathBuf,

    /// Directory searched for imported sources (default: the source's directory)
    #[arg(long, value_name = "DIR", value_hint = clap::ValueHint::DirPath)]
    pub imports: Option<Utf8PathBuf>,

    /// Deployed bytecode as hex, or @FILE to read it from a file
    #[arg(long, value_name = "HEX|@FILE", value_parser = bytecode_value_parser)]
    pub bytecode: String,

    /// Identifier the verified contract is registered under
    #[arg(long = "contract-id", value_name = "ID")]
    pub contract_id: Option<String>,

    /// Compiler version to use instead of the one derived from the pragma
    #[arg(long = "compiler-version", value_name = "VERSION")]
    pub compiler_version: Option<String>,

    /// Endpoint of the compile service
    #[arg(long = "compiler-url", value_name = "URL", value_hint = clap::ValueHint::Url)]
    pub compiler_url: Url,

    /// Compiler release index
    #[arg(
        long = "index-url",
        value_name = "URL",
        value_hint = clap::ValueHint::Url,
        default_value = DEFAULT_INDEX_URL
    )]
    pub index_url: Url,

    /// File recording verified contracts (default: ~/.hashscan-verifier/verified.json)
    #[arg(long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub registry: Option<Utf8PathBuf>,
}

#[derive(clap::Args)]
pub struct SessionArgs {
    #[command(flatten)]
    pub remote: Remote,

    /// Clear the server session before uploading
    #[arg(long, default_value_t = false)]
    pub clear: bool,

    /// Source files or directories to upload
    #[arg(value_name = "PATH", value_hint = clap::ValueHint::AnyPath)]
    pub paths: Vec<Utf8PathBuf>,
}

#[derive(clap::Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub remote: Remote,

    /// Compiler version the server should use
    #[arg(long = "compiler-version", value_name = "VERSION")]
    pub compiler_version: Option<String>,

    /// Contract to verify when the files declare several
    #[arg(
        long = "contract-name",
        value_name = "NAME",
        value_parser = contract_name_value_parser
    )]
    pub contract_name: Option<String>,

    /// Source files or directories to submit
    #[arg(value_name = "PATH", value_hint = clap::ValueHint::AnyPath, required = true)]
    pub paths: Vec<Utf8PathBuf>,
}

#[derive(clap::Args)]
pub struct Remote {
    /// Verification server URL
    #[arg(
        long,
        value_name = "URL",
        value_hint = clap::ValueHint::Url,
        default_value = DEFAULT_SERVER_URL
    )]
    pub server: Url,

    /// Network the contract is deployed on. If not specified, --chain-id is required
    #[arg(long, value_enum)]
    #[allow(dead_code)]
    pub network: Option<NetworkKind>,

    #[command(flatten)]
    pub chain: Chain,

    /// Address of the deployed contract
    #[arg(long, value_name = "ADDRESS", value_parser = ContractAddress::new)]
    pub address: ContractAddress,
}

#[derive(clap::ValueEnum, Clone)]
pub enum NetworkKind {
    /// Target the Mainnet
    Mainnet,

    /// Target the Testnet
    Testnet,

    /// Target the Previewnet
    Previewnet,
}

#[derive(Clone)]
pub struct Chain {
    /// Chain id sent to the verification server
    pub id: String,
}

fn chain_id_value_parser(raw: &str) -> Result<String, String> {
    raw.parse::<u64>()
        .map(|id| id.to_string())
        .map_err(|_| format!("Chain id must be a number, got {raw}"))
}

fn chain_id_arg() -> clap::Arg {
    clap::Arg::new("chain-id")
        .long("chain-id")
        .value_name("N")
        .help("Chain id of the network (required when --network is not specified)")
        .value_parser(chain_id_value_parser)
        .default_value_ifs([
            ("network", "mainnet", "295"),
            ("network", "testnet", "296"),
            ("network", "previewnet", "297"),
        ])
        .required_unless_present("network")
}

fn chain_id_from(matches: &clap::ArgMatches) -> Result<String, clap::Error> {
    matches
        .get_one::<String>("chain-id")
        .cloned()
        .ok_or_else(|| {
            clap::Error::raw(
                clap::error::ErrorKind::MissingRequiredArgument,
                "Chain id is required when not using predefined networks",
            )
        })
}

impl clap::FromArgMatches for Chain {
    fn from_arg_matches(matches: &clap::ArgMatches) -> Result<Self, clap::Error> {
        Ok(Self {
            id: chain_id_from(matches)?,
        })
    }

    fn update_from_arg_matches(&mut self, matches: &clap::ArgMatches) -> Result<(), clap::Error> {
        self.id = chain_id_from(matches)?;
        Ok(())
    }
}

// Can't derive the default value logic, hence hand rolled instance
impl clap::Args for Chain {
    fn augment_args(cmd: clap::Command) -> clap::Command {
        cmd.arg(chain_id_arg())
    }

    fn augment_args_for_update(cmd: clap::Command) -> clap::Command {
        cmd.arg(chain_id_arg())
    }
}
