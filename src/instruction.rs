//! Typed instruction representation.
//!
//! Mirrors the teacher's `Opcode` design (`fuel-asm`): a single tagged enum
//! carries one variant per opcode *family* relevant to the analyses, with a
//! generic fallback variant for opcodes whose only interesting property is
//! their stack arity. Each instruction is immutable once parsed and carries
//! its source line, computed pop/push counts, and a back-reference to the
//! basic block that contains it (set by the CFG builder).

use std::fmt;

use crate::block::BlockId;

/// 1-based source line an instruction was parsed from.
pub type Line = usize;

/// A transaction field accessed by `txn`/`gtxn`/`gtxns`.
///
/// Fields the dataflow framework tracks get a dedicated variant; everything
/// else collapses into `Other`, since the framework never needs to
/// special-case them (it only needs to tell whether a read is or isn't a
/// read of the field a given analysis key is tracking).
#[derive(Debug, Clone, PartialEq, Eq, Hash, strum::Display)]
pub enum TxnField {
    Sender,
    Fee,
    RekeyTo,
    CloseRemainderTo,
    AssetCloseTo,
    TypeEnum,
    GroupIndex,
    ApplicationID,
    OnCompletion,
    /// Any transaction field not otherwise tracked by name (e.g. `Amount`,
    /// `Receiver`, `Note`, ...).
    Other(String),
}

/// A global field accessed by `global`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, strum::Display)]
pub enum GlobalField {
    GroupSize,
    ZeroAddress,
    CreatorAddress,
    MinTxnFee,
    Other(String),
}

/// The 13 transaction-type tags the `TransactionType` analysis distinguishes,
/// per spec.md §3 and §4.4 (completion-action variants plus the 6 raw
/// `TypeEnum` values and the creation/call split of application calls).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display, strum::EnumIter)]
pub enum TxnTypeTag {
    Pay,
    KeyReg,
    Acfg,
    Axfer,
    Afrz,
    Appl,
    ApplNoOp,
    ApplOptIn,
    ApplCloseOut,
    ApplClearState,
    ApplUpdateApplication,
    ApplDeleteApplication,
    ApplCreation,
}

/// The index of which transaction in the group an instruction reads,
/// as encoded syntactically by `txn`/`gtxn N`/`gtxns`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSyntax {
    /// `txn F` — the currently executing transaction.
    SelfTxn,
    /// `gtxn N F` — immediate operand `N`.
    Absolute(u8),
    /// `gtxns F` — index resolved from the stack at analysis time.
    Stack,
}

/// A single parsed instruction.
///
/// Pop/push arity is computed once at construction (`Instruction::new`) and
/// never recomputed; `line` and `block` let detectors and output rendering
/// point back at source text without re-walking the instruction list.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub line: Line,
    pub kind: InstructionKind,
    pub block: Option<BlockId>,
}

/// Opaque, stable identity for an instruction within its contract.
///
/// Used as the basis for the `SOME_ADDRESS_<n>` symbolic-address scheme
/// (see DESIGN.md): two reads of an address-producing instruction at
/// different source lines are always distinct, and two reads of *the same*
/// instruction are always the same symbolic address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstructionId(pub Line);

impl Instruction {
    pub fn id(&self) -> InstructionId {
        InstructionId(self.line)
    }

    /// Number of stack values this instruction pops.
    pub fn pop_arity(&self) -> usize {
        self.kind.pop_arity()
    }

    /// Number of stack values this instruction pushes.
    pub fn push_arity(&self) -> usize {
        self.kind.push_arity()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.line, self.kind)
    }
}

/// The opcode family. Variants used by the dataflow/detector layer are
/// fully typed; every other opcode in the TEAL v1-8 surface is represented
/// by [`InstructionKind::Generic`], which records only what stack emulation
/// and CFG building need: a name (for display) and arity.
#[derive(Debug, Clone, PartialEq, strum::Display)]
pub enum InstructionKind {
    // --- literals ---
    Int(u64),
    PushInt(u64),
    Byte(Vec<u8>),
    PushBytes(Vec<u8>),
    Addr(String),
    IntcBlock(Vec<u64>),
    Intc(u8),
    BytecBlock(Vec<Vec<u8>>),
    Bytec(u8),

    // --- field reads ---
    Txn(TxnField),
    Gtxn { idx: u8, field: TxnField },
    Gtxns(TxnField),
    Global(GlobalField),

    // --- comparisons / connectives (stack AST needs these by name) ---
    Eq,
    Neq,
    Less,
    LessE,
    Greater,
    GreaterE,
    Not,
    And,
    Or,

    // --- arithmetic used by index-resolution patterns ---
    Add,
    Sub,

    // --- control flow ---
    B(String),
    Bz(String),
    Bnz(String),
    Callsub(String),
    Retsub,
    Return,
    Err,
    Assert,

    /// Any opcode not given a dedicated variant: stack manipulation,
    /// remaining arithmetic/bitwise/crypto ops, state/asset/app/box access,
    /// inner-transaction construction, logging, and array-indexed field
    /// reads (`txna`/`gtxna`/...). Carries the opcode mnemonic plus the
    /// pop/push arity computed by the parser's opcode table.
    Generic {
        mnemonic: String,
        pops: u8,
        pushes: u8,
    },
}

impl InstructionKind {
    pub fn pop_arity(&self) -> usize {
        use InstructionKind::*;
        match self {
            Int(_) | PushInt(_) | Byte(_) | PushBytes(_) | Addr(_) | IntcBlock(_) | Intc(_)
            | BytecBlock(_) | Bytec(_) | Txn(_) | Gtxn { .. } | Global(_) | B(_) | Callsub(_)
            | Retsub => 0,
            Gtxns(_) => 1,
            Eq | Neq | Less | LessE | Greater | GreaterE | And | Or | Add | Sub => 2,
            Not | Bz(_) | Bnz(_) | Return | Assert => 1,
            Err => 0,
            Generic { pops, .. } => *pops as usize,
        }
    }

    pub fn push_arity(&self) -> usize {
        use InstructionKind::*;
        match self {
            Int(_) | PushInt(_) | Byte(_) | PushBytes(_) | Addr(_) | Intc(_) | Bytec(_)
            | Txn(_) | Gtxn { .. } | Gtxns(_) | Global(_) | Eq | Neq | Less | LessE | Greater
            | GreaterE | Not | And | Or | Add | Sub => 1,
            IntcBlock(_) | BytecBlock(_) | B(_) | Bz(_) | Bnz(_) | Callsub(_) | Retsub | Return
            | Err | Assert => 0,
            Generic { pushes, .. } => *pushes as usize,
        }
    }

    /// True for the unconditional transfers that end a basic block and have
    /// no "falls through to the next instruction" successor.
    pub fn is_unconditional_transfer(&self) -> bool {
        matches!(
            self,
            InstructionKind::B(_)
                | InstructionKind::Err
                | InstructionKind::Return
                | InstructionKind::Callsub(_)
                | InstructionKind::Retsub
        )
    }

    /// True for instructions with more than one statically-known successor.
    pub fn is_conditional_branch(&self) -> bool {
        matches!(self, InstructionKind::Bz(_) | InstructionKind::Bnz(_))
    }

    pub fn branch_target(&self) -> Option<&str> {
        match self {
            InstructionKind::B(l) | InstructionKind::Bz(l) | InstructionKind::Bnz(l)
            | InstructionKind::Callsub(l) => Some(l),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eq_pops_two_and_pushes_one() {
        assert_eq!(InstructionKind::Eq.pop_arity(), 2);
        assert_eq!(InstructionKind::Eq.push_arity(), 1);
    }

    #[test]
    fn generic_arity_comes_from_its_own_fields() {
        let kind = InstructionKind::Generic { mnemonic: "box_get".to_string(), pops: 1, pushes: 2 };
        assert_eq!(kind.pop_arity(), 1);
        assert_eq!(kind.push_arity(), 2);
    }

    #[test]
    fn callsub_and_retsub_end_a_block_but_are_not_conditional() {
        assert!(InstructionKind::Callsub("sub".to_string()).is_unconditional_transfer());
        assert!(InstructionKind::Retsub.is_unconditional_transfer());
        assert!(!InstructionKind::Callsub("sub".to_string()).is_conditional_branch());
    }

    #[test]
    fn bz_and_bnz_are_conditional_and_name_their_target() {
        assert!(InstructionKind::Bz("l".to_string()).is_conditional_branch());
        assert_eq!(InstructionKind::Bnz("l".to_string()).branch_target(), Some("l"));
    }

    #[test]
    fn instruction_id_is_keyed_on_source_line() {
        let a = Instruction { line: 4, kind: InstructionKind::Int(1), block: None };
        let b = Instruction { line: 4, kind: InstructionKind::Int(2), block: None };
        assert_eq!(a.id(), b.id());
    }
}
