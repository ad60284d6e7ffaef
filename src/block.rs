//! Basic blocks: the CFG's nodes.
//!
//! A block is a maximal run of instructions with a single entry and a
//! single exit; branching only ever happens at a block's last
//! instruction. Blocks additionally carry the handful of boolean/optional
//! tags the detector driver and dataflow engine need to special-case
//! subroutine boundaries without re-deriving them from the instruction
//! stream on every traversal.

use std::fmt;

use crate::instruction::Instruction;
use crate::subroutine::SubroutineId;

/// Stable identity for a block within its contract. Assigned in source
/// order by the CFG builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// A maximal straight-line run of instructions.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub instructions: Vec<Instruction>,
    /// Blocks that can transfer control here.
    pub predecessors: Vec<BlockId>,
    /// Blocks this block can transfer control to (0, 1, or 2 entries;
    /// `callsub` blocks list the callee's entry rather than the
    /// fall-through instruction).
    pub successors: Vec<BlockId>,
    /// Which subroutine this block belongs to.
    pub subroutine: SubroutineId,
    /// Set when this block's last instruction is `callsub`; holds the id
    /// of the block immediately following the `callsub` in program order,
    /// i.e. where execution resumes after the callee's `retsub`.
    pub sub_return_point: Option<BlockId>,
    /// Set on the block that is the target of some `callsub`: the entry
    /// block of the callee subroutine.
    pub is_callsub_entry: bool,
    /// Set on a sub-return-point block: the callsub block it resumes
    /// after. Lets the dataflow framework and detector driver walk from a
    /// return point back to its callsite without a reverse scan.
    pub callsub_block: Option<BlockId>,
    /// True if this block's last instruction is `retsub`.
    pub is_retsub: bool,
    /// True if this block has no successors (ends in `return`, `err`, or
    /// falls off the end of the program).
    pub is_leaf: bool,
}

impl BasicBlock {
    pub fn new(id: BlockId, instructions: Vec<Instruction>, subroutine: SubroutineId) -> Self {
        BasicBlock {
            id,
            instructions,
            predecessors: Vec::new(),
            successors: Vec::new(),
            subroutine,
            sub_return_point: None,
            is_callsub_entry: false,
            callsub_block: None,
            is_retsub: false,
            is_leaf: false,
        }
    }

    pub fn entry_instruction(&self) -> &Instruction {
        self.instructions
            .first()
            .expect("a basic block always has at least one instruction")
    }

    pub fn exit_instruction(&self) -> &Instruction {
        self.instructions
            .last()
            .expect("a basic block always has at least one instruction")
    }

    pub fn contains_line(&self, line: usize) -> bool {
        self.instructions.iter().any(|i| i.line == line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::InstructionKind;

    fn instr(line: usize, kind: InstructionKind) -> Instruction {
        Instruction { line, kind, block: None }
    }

    #[test]
    fn entry_and_exit_instruction_are_the_first_and_last() {
        let block = BasicBlock::new(
            BlockId(0),
            vec![instr(1, InstructionKind::Int(1)), instr(2, InstructionKind::Return)],
            SubroutineId::Main,
        );
        assert_eq!(block.entry_instruction().line, 1);
        assert_eq!(block.exit_instruction().line, 2);
    }

    #[test]
    fn contains_line_checks_every_instruction_in_the_block() {
        let block = BasicBlock::new(
            BlockId(0),
            vec![instr(5, InstructionKind::Int(1)), instr(6, InstructionKind::Return)],
            SubroutineId::Main,
        );
        assert!(block.contains_line(5));
        assert!(block.contains_line(6));
        assert!(!block.contains_line(7));
    }

    #[test]
    fn block_id_displays_with_a_b_prefix() {
        assert_eq!(BlockId(7).to_string(), "B7");
    }
}
