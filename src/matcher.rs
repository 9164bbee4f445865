use log::debug;

use crate::{
    bytecode::{self, MatchKind},
    compiler::{CompileOutput, CompiledContract},
};

/// A compiled contract whose bytecode matches the deployed one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContractMatch<'a> {
    pub contract: &'a CompiledContract,
    pub kind: MatchKind,
}

impl ContractMatch<'_> {
    pub fn name(&self) -> &str {
        self.contract.name()
    }
}

/// First contract compiled from `source_file_name` whose bytecode matches
/// `deployed_bytecode`, in compiler order. Later candidates are not looked at.
pub fn find_matching_contract<'a>(
    source_file_name: &str,
    deployed_bytecode: &str,
    output: &'a CompileOutput,
) -> Option<ContractMatch<'a>> {
    output
        .contracts_of(source_file_name)?
        .iter()
        .find_map(|contract| {
            let kind = bytecode::compare(deployed_bytecode, contract.deployed_bytecode());
            debug!("{source_file_name}:{} -> {kind}", contract.name());
            kind.is_match().then_some(ContractMatch { contract, kind })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bytecode::HASH_HEX_LEN, compiler::CompiledSource};
    use serde_json::Value;

    fn runtime(body: &str, trailer: char) -> String {
        format!("{body}{}", trailer.to_string().repeat(HASH_HEX_LEN))
    }

    fn output(contracts: &[(&str, String)]) -> CompileOutput {
        CompileOutput::new(
            vec![],
            vec![CompiledSource::new(
                "Token.sol",
                contracts
                    .iter()
                    .map(|(name, code)| CompiledContract::new(*name, Value::Null, code.clone()))
                    .collect(),
            )],
        )
    }

    #[test]
    fn test_first_match_wins() {
        let deployed = runtime("6080", 'a');
        let output = output(&[
            ("Ownable", runtime("6081", 'a')),
            ("Token", runtime("6080", 'b')),
            ("TokenCopy", deployed.clone()),
        ]);

        let found = find_matching_contract("Token.sol", &deployed, &output).unwrap();
        assert_eq!(found.name(), "Token");
        assert_eq!(found.kind, MatchKind::PartialMatch);
    }

    #[test]
    fn test_full_match() {
        let deployed = runtime("6080", 'a');
        let output = output(&[("Token", deployed.clone())]);
        let found = find_matching_contract("Token.sol", &deployed, &output).unwrap();
        assert_eq!(found.kind, MatchKind::FullMatch);
    }

    #[test]
    fn test_no_match() {
        let output = output(&[("Token", runtime("6081", 'a'))]);
        assert!(find_matching_contract("Token.sol", &runtime("6080", 'a'), &output).is_none());
    }

    #[test]
    fn test_unknown_source_file() {
        let deployed = runtime("6080", 'a');
        let output = output(&[("Token", deployed.clone())]);
        assert!(find_matching_contract("Other.sol", &deployed, &output).is_none());
        assert!(
            find_matching_contract("Token.sol", &deployed, &CompileOutput::default()).is_none()
        );
    }
}
