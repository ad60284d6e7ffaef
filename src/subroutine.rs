//! Subroutine catalog.
//!
//! TEAL has no lexical function scoping: a "subroutine" is whatever set of
//! blocks is reachable from a `callsub` target before control returns via
//! `retsub`. The CFG builder discovers subroutines by forward traversal
//! from every `callsub` target; anything never reached that way belongs to
//! the implicit `__main__` subroutine that begins at program entry.

use std::fmt;

use crate::block::BlockId;

/// Stable identity for a subroutine. `MAIN` is the implicit top-level
/// entry point; named subroutines are numbered in the order their entry
/// `callsub` targets are first discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubroutineId {
    Main,
    Named(usize),
}

impl fmt::Display for SubroutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubroutineId::Main => write!(f, "__main__"),
            SubroutineId::Named(n) => write!(f, "sub_{n}"),
        }
    }
}

/// A subroutine's block membership and the blocks that let callers and
/// the dataflow engine reason about it without re-scanning the CFG.
#[derive(Debug, Clone)]
pub struct Subroutine {
    pub id: SubroutineId,
    pub entry: BlockId,
    pub blocks: Vec<BlockId>,
    /// Blocks within this subroutine whose last instruction is `retsub`.
    pub retsub_blocks: Vec<BlockId>,
    /// Blocks within this subroutine with no successors.
    pub exit_blocks: Vec<BlockId>,
    /// Blocks (anywhere in the contract) whose last instruction is a
    /// `callsub` targeting this subroutine's entry.
    pub callers: Vec<BlockId>,
}

impl Subroutine {
    pub fn new(id: SubroutineId, entry: BlockId) -> Self {
        Subroutine {
            id,
            entry,
            blocks: vec![entry],
            retsub_blocks: Vec::new(),
            exit_blocks: Vec::new(),
            callers: Vec::new(),
        }
    }

    pub fn is_main(&self) -> bool {
        matches!(self.id, SubroutineId::Main)
    }

    /// A subroutine with at least one `retsub` block can be returned from
    /// normally; one with none only ever diverges (`err`/`return`/loop).
    pub fn can_return(&self) -> bool {
        !self.retsub_blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_is_only_the_main_variant() {
        assert!(Subroutine::new(SubroutineId::Main, BlockId(0)).is_main());
        assert!(!Subroutine::new(SubroutineId::Named(0), BlockId(0)).is_main());
    }

    #[test]
    fn can_return_tracks_whether_any_retsub_block_was_recorded() {
        let mut sub = Subroutine::new(SubroutineId::Named(0), BlockId(1));
        assert!(!sub.can_return());
        sub.retsub_blocks.push(BlockId(3));
        assert!(sub.can_return());
    }

    #[test]
    fn display_renders_main_and_named_ids() {
        assert_eq!(SubroutineId::Main.to_string(), "__main__");
        assert_eq!(SubroutineId::Named(2).to_string(), "sub_2");
    }
}
