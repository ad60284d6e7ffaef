//! Static transaction-context dataflow analyzer for TEAL smart contracts.
//!
//! The pipeline, leaves first: [`parser`] turns source text into a flat
//! instruction list; [`cfg`] (backed by [`block`] and [`subroutine`])
//! partitions that list into basic blocks, subroutines, and a global
//! inter-procedural CFG; [`stack_ast`] reconstructs, per block, the
//! expression tree each instruction consumed; [`dataflow`] runs the
//! transaction-context framework — one instantiation per tracked field —
//! over that CFG and stack AST, with results aggregated per block by
//! [`context`]; [`detector`] walks the global CFG to enumerate execution
//! paths on which a field is never adequately constrained, both for a
//! single function and, group-aware, across an [`execution_model`].
//! [`config`] loads the declarative YAML description of how contracts are
//! deployed together; [`output`] renders detector results to DOT/JSON.

pub mod block;
pub mod cfg;
pub mod config;
pub mod consts;
pub mod context;
pub mod contract;
pub mod dataflow;
pub mod detector;
pub mod error;
pub mod execution_model;
pub mod instruction;
pub mod output;
pub mod parser;
pub mod stack_ast;
pub mod subroutine;

pub mod prelude {
    pub use crate::contract::{Contract, ExecutionMode, Function};
    pub use crate::context::{QueryIndex, TransactionContext};
    pub use crate::detector::{
        can_close_account, can_close_asset, detect_group_vulnerability, detect_missing, fee_check, groupsize,
        is_deletable, is_updatable, rekeyto, BoundContext, Detector, DetectorMode, ExecutionPaths,
        GroupTransactionOutput, VulnerablePath, VulnerableTransaction,
    };
    pub use crate::error::{AnalyzerError, ConfigError, ParseError, StructuralError};
    pub use crate::execution_model::{GroupTransaction, Transaction, TransactionKind};
}
