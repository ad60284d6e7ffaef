//! Compiled contract: parsed instructions plus the CFG and subroutine
//! catalog built over them, the unit every other module operates on.

use crate::block::{BasicBlock, BlockId};
use crate::cfg::{self, Cfg};
use crate::error::AnalyzerError;
use crate::parser::{self, ParsedProgram};
use crate::subroutine::{Subroutine, SubroutineId};

/// Whether a contract runs as a stateful application call or a stateless
/// logic signature — affects which detectors apply (e.g. `is_updatable`
/// only makes sense for `Application`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Application,
    LogicSignature,
}

pub struct Contract {
    pub name: String,
    pub version: u8,
    pub mode: ExecutionMode,
    pub cfg: Cfg,
}

impl Contract {
    pub fn compile(name: impl Into<String>, source: &str, mode: ExecutionMode) -> Result<Self, AnalyzerError> {
        let name = name.into();
        let ParsedProgram {
            version,
            instructions,
        } = parser::parse(source).map_err(|e| AnalyzerError::Parse {
            file: name.clone(),
            source: e,
        })?;
        let cfg = cfg::build(instructions).map_err(|e| AnalyzerError::Structural {
            file: name.clone(),
            source: e,
        })?;
        Ok(Contract {
            name,
            version,
            mode,
            cfg,
        })
    }

    pub fn entry_block(&self) -> BlockId {
        self.cfg.entry
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        self.cfg.block(id)
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.cfg.blocks
    }

    pub fn subroutine(&self, id: SubroutineId) -> &Subroutine {
        &self.cfg.subroutines[&id]
    }

    pub fn subroutines(&self) -> impl Iterator<Item = &Subroutine> {
        self.cfg.subroutines.values()
    }

    /// A view over one subroutine (or `__main__`) rooted at its own
    /// entry block, the unit the detector driver and `ExecutionPaths`
    /// output operate over.
    pub fn function(&self, id: SubroutineId) -> Function<'_> {
        let sub = self.subroutine(id);
        Function {
            contract: self,
            name: sub.id.to_string(),
            entry: sub.entry,
        }
    }

    /// A view rooted at an arbitrary block, used for the dispatch-path
    /// method entry points a configuration declares (spec.md §4.8): a
    /// named function that begins partway into a contract's handler
    /// dispatch tree rather than at a subroutine's own entry.
    pub fn function_at(&self, name: impl Into<String>, entry: BlockId) -> Function<'_> {
        Function {
            contract: self,
            name: name.into(),
            entry,
        }
    }
}

/// A named entry point into a contract's global CFG: the unit every
/// detector and transaction-context table operates over. Two function
/// views over the same contract never share a transaction-context table
/// even if they happen to cover overlapping blocks, since each is
/// analyzed independently (spec.md §4.8: "For each function view, the
/// core builds a dedicated transaction-context table").
#[derive(Clone)]
pub struct Function<'a> {
    pub contract: &'a Contract,
    pub name: String,
    pub entry: BlockId,
}

impl<'a> Function<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    /// Every block reachable from this function's entry by following the
    /// global CFG (including inter-procedural callsub/retsub edges),
    /// computed once per call since function views are built at
    /// execution-model load time, not on every query.
    pub fn blocks(&self) -> Vec<&'a BasicBlock> {
        let mut seen = vec![self.entry];
        let mut stack = vec![self.entry];
        while let Some(b) = stack.pop() {
            for &succ in &self.contract.block(b).successors {
                if !seen.contains(&succ) {
                    seen.push(succ);
                    stack.push(succ);
                }
            }
        }
        seen.into_iter().map(|b| self.contract.block(b)).collect()
    }

    pub fn leaf_blocks(&self) -> Vec<BlockId> {
        self.blocks().into_iter().filter(|b| b.is_leaf).map(|b| b.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subroutine::SubroutineId;

    #[test]
    fn compile_rejects_source_with_no_version_pragma() {
        let err = Contract::compile("c", "int 1\nreturn\n", ExecutionMode::Application).unwrap_err();
        assert!(matches!(err, AnalyzerError::Parse { .. }));
    }

    #[test]
    fn compile_rejects_a_branch_to_an_undefined_label() {
        let err = Contract::compile("c", "#pragma version 6\nbz nowhere\nint 1\nreturn\n", ExecutionMode::Application)
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::Structural { .. }));
    }

    #[test]
    fn function_blocks_reaches_every_block_over_a_branch() {
        let contract = Contract::compile(
            "c",
            "#pragma version 6\nint 1\nbnz skip\nint 2\nskip:\nint 3\nreturn\n",
            ExecutionMode::Application,
        )
        .unwrap();
        let main = contract.function(SubroutineId::Main);
        assert_eq!(main.blocks().len(), contract.blocks().len());
        assert_eq!(main.leaf_blocks().len(), 1);
    }

    #[test]
    fn function_at_roots_a_view_at_an_arbitrary_block_rather_than_a_subroutine_entry() {
        let contract = Contract::compile(
            "c",
            "#pragma version 6\nint 1\nbnz skip\nint 2\nskip:\nint 3\nreturn\n",
            ExecutionMode::Application,
        )
        .unwrap();
        let skip_block = contract.entry_block();
        let skip_block = contract.block(skip_block).successors[0];
        let narrowed = contract.function_at("skip", skip_block);
        assert!(narrowed.blocks().len() < contract.blocks().len());
    }
}
