//! # Solidity Contract Verifier
//!
//! A Rust library for verifying deployed Solidity contracts against their
//! source code. It drives the local verification workflow (compile the
//! sources with the right compiler and compare the result with the
//! on-chain bytecode) and the clients for a remote verification server.
//!
//! ## Features
//!
//! - **Compiler Selection**: Resolve `pragma solidity` ranges against the compiler release index
//! - **Import Resolution**: Track which imports still need their source supplied
//! - **Bytecode Comparison**: Full and partial matches, ignoring the metadata hash trailer
//! - **Guided Workflow**: Five step verification state machine with back/next rules
//! - **Remote Sessions**: Stateful and stateless verification server protocols
//! - **Error Handling**: Error types with codes and actionable suggestions
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use verifier::{bytecode::compare, version::{resolve_version, CompilerIndex}};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = reqwest::Client::new();
//! let index_url = url::Url::parse(verifier::version::DEFAULT_INDEX_URL)?;
//! let index = CompilerIndex::fetch(&client, &index_url).await?;
//!
//! let source = "pragma solidity ^0.8.0;\ncontract Token {}";
//! println!("compiler: {:?}", resolve_version(source, &index));
//! println!("match: {}", compare("0x6080", "6080"));
//! # Ok(())
//! # }
//! ```

/// Contract addresses and their validation
pub mod address;

/// Client for the remote verification server
pub mod api;

mod busy;

/// Deployed versus compiled bytecode comparison
pub mod bytecode;

/// Compilation requests, compiler output and the compile service
pub mod compiler;

/// Error types shared by the HTTP clients
pub mod errors;

/// Locating the contract that matches the deployed bytecode
pub mod matcher;

/// Registration of verified contracts
pub mod registry;

/// Import discovery and source resolution
pub mod resolver;

/// Stateful and stateless remote verification sessions
pub mod session;

/// Compiler version selection from `pragma solidity`
pub mod version;

/// The five step local verification workflow
pub mod workflow;
