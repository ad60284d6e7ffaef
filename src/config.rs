//! Declarative execution-model configuration: the YAML loader spec.md §6
//! describes, resolving `dispatch_path` entries to function views and
//! execution-model groups to [`GroupTransaction`]s.
//!
//! Loading is deliberately two-step rather than one self-contained
//! function: [`load`] deserializes and [`compile_contracts`] produces the
//! owned [`Contract`]s the caller holds for the run's lifetime, and only
//! then does [`resolve_groups`] borrow from them to build
//! [`GroupTransaction`] values — a [`GroupTransaction`] can't outlive the
//! contracts its `Function` views point into, so those contracts must
//! already live somewhere stable before the groups borrow from them.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::block::BlockId;
use crate::contract::{Contract, ExecutionMode, Function};
use crate::error::{AnalyzerError, ConfigError};
use crate::execution_model::{GroupTransaction, Transaction, TransactionKind};

/// Top-level configuration document: `name`, `contracts`, `groups`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub contracts: Vec<ContractConfig>,
    pub groups: Vec<GroupConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ContractKind {
    LogicSig,
    ApprovalProgram,
    ClearStateProgram,
}

impl ContractKind {
    fn execution_mode(self) -> ExecutionMode {
        match self {
            ContractKind::LogicSig => ExecutionMode::LogicSignature,
            ContractKind::ApprovalProgram | ContractKind::ClearStateProgram => ExecutionMode::Application,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractConfig {
    pub name: String,
    pub file_path: String,
    #[serde(rename = "type")]
    pub kind: ContractKind,
    pub version: u8,
    #[serde(default)]
    pub subroutines: Vec<String>,
    #[serde(default)]
    pub functions: Vec<FunctionConfig>,
}

/// A named method entry point, located by the block-id path a dispatcher
/// walks to reach it (spec.md §4.8): `["B0", "B3", "B7"]` — the loader
/// resolves every id and roots the function view at the last one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionConfig {
    pub name: String,
    pub dispatch_path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub operation: String,
    pub transactions: Vec<TransactionConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionConfig {
    pub txn_id: String,
    pub txn_type: String,
    #[serde(default)]
    pub application: Option<BindingConfig>,
    #[serde(default)]
    pub logic_sig: Option<BindingConfig>,
    #[serde(default)]
    pub has_logic_sig: Option<bool>,
    #[serde(default)]
    pub absolute_index: Option<usize>,
    #[serde(default)]
    pub relative_indexes: Vec<RelativeIndexConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingConfig {
    pub contract: String,
    pub function: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelativeIndexConfig {
    pub other_txn_id: String,
    pub offset: i64,
}

/// Parses a configuration document. Does not touch the filesystem or
/// compile anything — `file_path`s are resolved relative to the config's
/// own location by [`compile_contracts`].
pub fn load(yaml: &str) -> Result<ModelConfig, ConfigError> {
    serde_yaml::from_str(yaml).map_err(ConfigError::InvalidYaml)
}

/// One compiled contract plus its named function views, resolved from
/// `functions[].dispatch_path`.
pub struct CompiledContract {
    pub contract: Contract,
    pub functions: HashMap<String, BlockId>,
}

/// Compiles every contract the configuration names, reading each
/// `file_path` relative to `base_dir` (the config file's own directory),
/// and resolves its declared function dispatch paths to concrete blocks.
pub fn compile_contracts(base_dir: &Path, config: &ModelConfig) -> Result<HashMap<String, CompiledContract>, AnalyzerError> {
    let mut out = HashMap::new();
    for c in &config.contracts {
        let full_path = base_dir.join(&c.file_path);
        let source = std::fs::read_to_string(&full_path).map_err(|e| {
            AnalyzerError::Config(ConfigError::UnreadableFile {
                path: c.name.clone(),
                file_path: full_path.display().to_string(),
                source: e,
            })
        })?;
        let contract = Contract::compile(c.name.clone(), &source, c.kind.execution_mode())?;

        let mut functions = HashMap::new();
        for f in &c.functions {
            let entry = resolve_dispatch_path(&c.name, &contract, &f.dispatch_path)?;
            functions.insert(f.name.clone(), entry);
        }
        out.insert(c.name.clone(), CompiledContract { contract, functions });
    }
    Ok(out)
}

/// Resolves a dispatch path (`["B0", "B3", ...]`) to the final block in
/// the list, validating every id names a real block in `contract` along
/// the way — a typo anywhere in the path is as much a configuration
/// error as one in the final entry itself.
fn resolve_dispatch_path(contract_path: &str, contract: &Contract, path: &[String]) -> Result<BlockId, ConfigError> {
    if path.is_empty() {
        return Err(ConfigError::MissingField {
            path: contract_path.to_string(),
            field: "dispatch_path".to_string(),
        });
    }
    let mut last = None;
    for raw in path {
        let id = parse_block_id(raw).ok_or_else(|| ConfigError::UnknownDispatchBlock {
            path: contract_path.to_string(),
            block: raw.clone(),
        })?;
        if id.0 >= contract.blocks().len() {
            return Err(ConfigError::UnknownDispatchBlock {
                path: contract_path.to_string(),
                block: raw.clone(),
            });
        }
        last = Some(id);
    }
    Ok(last.unwrap())
}

fn parse_block_id(raw: &str) -> Option<BlockId> {
    let digits = raw.strip_prefix('B')?;
    digits.parse::<usize>().ok().map(BlockId)
}

fn parse_txn_type(path: &str, raw: &str) -> Result<TransactionKind, ConfigError> {
    Ok(match raw {
        "pay" => TransactionKind::Pay,
        "keyreg" => TransactionKind::KeyReg,
        "acfg" => TransactionKind::Acfg,
        "axfer" => TransactionKind::Axfer,
        "afrz" => TransactionKind::Afrz,
        "appl" => TransactionKind::Appl,
        "txn" => TransactionKind::Unspecified,
        other => {
            return Err(ConfigError::UnknownTransactionType {
                path: path.to_string(),
                kind: other.to_string(),
            })
        }
    })
}

fn resolve_binding<'a>(
    group_op: &str,
    txn_id: &str,
    binding: &BindingConfig,
    contracts: &'a HashMap<String, CompiledContract>,
) -> Result<Function<'a>, ConfigError> {
    let compiled = contracts.get(&binding.contract).ok_or_else(|| ConfigError::UnknownReference {
        path: format!("{group_op}/{txn_id}"),
        name: binding.contract.clone(),
    })?;
    let entry = compiled.functions.get(&binding.function).ok_or_else(|| ConfigError::UnknownReference {
        path: format!("{group_op}/{txn_id}"),
        name: binding.function.clone(),
    })?;
    Ok(compiled.contract.function_at(binding.function.clone(), *entry))
}

/// Builds every group transaction declared in the configuration, with
/// `logic_sig`/`application` bindings resolved into [`Function`] views
/// over `contracts`. Explicit `relative_indexes` entries are merged into
/// each `GroupTransaction`'s lookup table alongside the ones
/// [`GroupTransaction::new`] derives from absolute indices, since the
/// configuration format allows declaring an offset to a peer whose own
/// absolute position is never stated.
pub fn resolve_groups<'a>(
    config: &ModelConfig,
    contracts: &'a HashMap<String, CompiledContract>,
) -> Result<Vec<GroupTransaction<'a>>, ConfigError> {
    let mut groups = Vec::with_capacity(config.groups.len());
    for g in &config.groups {
        let mut txn_id_to_pos = HashMap::new();
        for (pos, t) in g.transactions.iter().enumerate() {
            txn_id_to_pos.insert(t.txn_id.clone(), pos);
        }

        let mut transactions = Vec::with_capacity(g.transactions.len());
        for t in &g.transactions {
            let kind = parse_txn_type(&g.operation, &t.txn_type)?;
            let mut txn = Transaction::new(t.txn_id.clone(), kind);
            if let Some(a) = t.absolute_index {
                txn = txn.with_absolute_index(a);
            }
            if let Some(binding) = &t.logic_sig {
                txn = txn.with_logic_sig(resolve_binding(&g.operation, &t.txn_id, binding, contracts)?);
            }
            if let Some(binding) = &t.application {
                txn = txn.with_application(resolve_binding(&g.operation, &t.txn_id, binding, contracts)?);
            }
            txn.has_logic_sig = t.has_logic_sig.unwrap_or(txn.logic_sig.is_some());
            transactions.push(txn);
        }

        let mut group = GroupTransaction::new(g.operation.clone(), transactions);

        for (pos, t) in g.transactions.iter().enumerate() {
            for rel in &t.relative_indexes {
                let other_pos = *txn_id_to_pos.get(&rel.other_txn_id).ok_or_else(|| ConfigError::UnknownReference {
                    path: format!("{}/{}", g.operation, t.txn_id),
                    name: rel.other_txn_id.clone(),
                })?;
                group.group_relative_indexes.insert((pos, other_pos), rel.offset);
            }
        }

        groups.push(group);
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        "
name: two-txn-transfer
contracts:
  - name: approval
    file_path: approval.teal
    type: ApprovalProgram
    version: 6
    functions:
      - name: main
        dispatch_path: [B0]
groups:
  - operation: transfer
    transactions:
      - txn_id: T0
        txn_type: appl
        absolute_index: 0
        application:
          contract: approval
          function: main
      - txn_id: T1
        txn_type: pay
        absolute_index: 1
        relative_indexes:
          - other_txn_id: T0
            offset: -1
"
    }

    #[test]
    fn loads_a_well_formed_document() {
        let config = load(sample_yaml()).unwrap();
        assert_eq!(config.name, "two-txn-transfer");
        assert_eq!(config.contracts.len(), 1);
        assert_eq!(config.groups[0].transactions.len(), 2);
        assert_eq!(config.groups[0].transactions[1].relative_indexes[0].offset, -1);
    }

    #[test]
    fn serializing_then_reparsing_recovers_an_equal_structure() {
        let config = load(sample_yaml()).unwrap();
        let rendered = serde_yaml::to_string(&config).unwrap();
        let reparsed = load(&rendered).unwrap();
        assert_eq!(config, reparsed);
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let err = load("name: [unterminated").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidYaml(_)));
    }

    #[test]
    fn dispatch_path_naming_an_out_of_range_block_is_rejected() {
        let contract = Contract::compile(
            "approval",
            "#pragma version 6\nint 1\nreturn\n",
            ExecutionMode::Application,
        )
        .unwrap();
        let err = resolve_dispatch_path("approval", &contract, &["B99".to_string()]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDispatchBlock { .. }));
    }

    #[test]
    fn dispatch_path_with_a_malformed_block_id_is_rejected() {
        let contract = Contract::compile(
            "approval",
            "#pragma version 6\nint 1\nreturn\n",
            ExecutionMode::Application,
        )
        .unwrap();
        let err = resolve_dispatch_path("approval", &contract, &["not-a-block".to_string()]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDispatchBlock { .. }));
    }
}
