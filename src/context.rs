//! Transaction-context aggregate: the converged result of every field
//! analysis, queryable per block and per transaction index.

use std::collections::HashMap;

use crate::block::BlockId;
use crate::consts::MAX_GROUP_SIZE;
use crate::contract::Contract;
use crate::dataflow::address::{AddressFieldAnalysis, AddressLattice};
use crate::dataflow::fee::{FeeFieldAnalysis, FeeLattice};
use crate::dataflow::group::{self, GroupIndexAnalysis, GroupSizeAnalysis, IntSet};
use crate::dataflow::txntype::{TransactionTypeAnalysis, TypeSet};
use crate::dataflow::{self, AnalysisResult};
use crate::instruction::TxnField;

pub struct TransactionContext {
    pub rekey_to: AnalysisResult<AddressLattice>,
    pub close_remainder_to: AnalysisResult<AddressLattice>,
    pub asset_close_to: AnalysisResult<AddressLattice>,
    pub sender: AnalysisResult<AddressLattice>,
    pub fee: AnalysisResult<FeeLattice>,
    pub group_size: AnalysisResult<IntSet>,
    pub group_index: AnalysisResult<IntSet>,
    pub transaction_type: AnalysisResult<TypeSet>,
}

impl TransactionContext {
    /// Runs every field analysis over `contract` and clamps the
    /// group-index results down to what group-size analysis proved
    /// possible, per the framework's post-analysis tightening.
    pub fn build(contract: &Contract) -> Self {
        tracing::debug!(contract = %contract.name, "running transaction-context dataflow");

        let mut rekey_to = dataflow::run(contract, &AddressFieldAnalysis::new(TxnField::RekeyTo));
        let mut close_remainder_to = dataflow::run(contract, &AddressFieldAnalysis::new(TxnField::CloseRemainderTo));
        let mut asset_close_to = dataflow::run(contract, &AddressFieldAnalysis::new(TxnField::AssetCloseTo));
        let mut sender = dataflow::run(contract, &AddressFieldAnalysis::new(TxnField::Sender));
        let mut fee = dataflow::run(contract, &FeeFieldAnalysis);
        let group_size = dataflow::run(contract, &GroupSizeAnalysis);
        let mut group_index = dataflow::run(contract, &GroupIndexAnalysis);
        let mut transaction_type = dataflow::run(contract, &TransactionTypeAnalysis);

        clamp_group_index(&mut group_index, &group_size);

        // Phase D: every other field's absolute-index context is zeroed on
        // indices the (now-clamped) group-index analysis has proven
        // unreachable at that block — the framework's ordering requirement
        // that KEYS_WITH_GTXN analyses run after group-index/group-size.
        zero_unreachable_gtxn(&mut rekey_to, &group_index, AddressLattice::None);
        zero_unreachable_gtxn(&mut close_remainder_to, &group_index, AddressLattice::None);
        zero_unreachable_gtxn(&mut asset_close_to, &group_index, AddressLattice::None);
        zero_unreachable_gtxn(&mut sender, &group_index, AddressLattice::None);
        zero_unreachable_gtxn(&mut fee, &group_index, FeeLattice::Bounded(0));
        zero_unreachable_gtxn(&mut transaction_type, &group_index, TypeSet::new());

        TransactionContext {
            rekey_to,
            close_remainder_to,
            asset_close_to,
            sender,
            fee,
            group_size,
            group_index,
            transaction_type,
        }
    }

    pub fn rekey_to_at(&self, block: BlockId, index: QueryIndex) -> AddressLattice {
        query(&self.rekey_to, block, index)
    }

    pub fn close_remainder_to_at(&self, block: BlockId, index: QueryIndex) -> AddressLattice {
        query(&self.close_remainder_to, block, index)
    }

    pub fn asset_close_to_at(&self, block: BlockId, index: QueryIndex) -> AddressLattice {
        query(&self.asset_close_to, block, index)
    }

    pub fn sender_at(&self, block: BlockId, index: QueryIndex) -> AddressLattice {
        query(&self.sender, block, index)
    }

    pub fn fee_at(&self, block: BlockId, index: QueryIndex) -> FeeLattice {
        query(&self.fee, block, index)
    }

    pub fn group_size_at(&self, block: BlockId, index: QueryIndex) -> IntSet {
        query(&self.group_size, block, index)
    }

    pub fn group_index_at(&self, block: BlockId, index: QueryIndex) -> IntSet {
        query(&self.group_index, block, index)
    }

    pub fn transaction_type_at(&self, block: BlockId, index: QueryIndex) -> TypeSet {
        query(&self.transaction_type, block, index)
    }

    pub fn rekey_to_relative(&self, block: BlockId, offset: i64) -> AddressLattice {
        query_relative(&self.rekey_to, block, offset)
    }

    pub fn close_remainder_to_relative(&self, block: BlockId, offset: i64) -> AddressLattice {
        query_relative(&self.close_remainder_to, block, offset)
    }

    pub fn asset_close_to_relative(&self, block: BlockId, offset: i64) -> AddressLattice {
        query_relative(&self.asset_close_to, block, offset)
    }

    pub fn sender_relative(&self, block: BlockId, offset: i64) -> AddressLattice {
        query_relative(&self.sender, block, offset)
    }

    pub fn fee_relative(&self, block: BlockId, offset: i64) -> FeeLattice {
        query_relative(&self.fee, block, offset)
    }

    pub fn transaction_type_relative(&self, block: BlockId, offset: i64) -> TypeSet {
        query_relative(&self.transaction_type, block, offset)
    }
}

fn query_relative<V: Clone + DefaultUniversal>(result: &AnalysisResult<V>, block: BlockId, offset: i64) -> V {
    result
        .relative_ctx
        .get(&offset)
        .and_then(|m| m.get(&block))
        .cloned()
        .unwrap_or_else(V::default_universal)
}

/// Zero out a field's absolute-index context on indices the group-index
/// analysis has proven unreachable at that block (phase D's consistency
/// invariant: `i ∉ group_indices[B] ⟹ gtxn_context(i)[B] = null`).
fn zero_unreachable_gtxn<V: Clone>(result: &mut AnalysisResult<V>, group_index: &AnalysisResult<IntSet>, null_value: V) {
    for i in 0..result.gtxn_ctx.len() {
        let blocks: Vec<BlockId> = result.gtxn_ctx[i].keys().copied().collect();
        for block in blocks {
            let reachable = group_index.self_ctx.get(&block).map(|s| s.contains(&(i as u64))).unwrap_or(true);
            if !reachable {
                result.gtxn_ctx[i].insert(block, null_value.clone());
            }
        }
    }
}

/// Which transaction, relative to the block's own contract, a query asks
/// about: the executing transaction itself, an absolute peer index, or a
/// peer at a fixed relative offset (resolved against a concrete group
/// composition by the caller — see `execution_model.rs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryIndex {
    SelfTxn,
    Absolute(usize),
    Relative(i64),
}

fn query<V: Clone>(result: &AnalysisResult<V>, block: BlockId, index: QueryIndex) -> V
where
    V: DefaultUniversal,
{
    match index {
        QueryIndex::SelfTxn => result
            .self_ctx
            .get(&block)
            .cloned()
            .unwrap_or_else(V::default_universal),
        QueryIndex::Absolute(i) if i < MAX_GROUP_SIZE => result.gtxn_ctx[i]
            .get(&block)
            .cloned()
            .unwrap_or_else(V::default_universal),
        QueryIndex::Absolute(_) => V::default_universal(),
        QueryIndex::Relative(offset) => query_relative(result, block, offset),
    }
}

/// Every lattice value type needs a "no info" fallback for blocks a
/// particular analysis never visited (dead/unreachable code).
pub trait DefaultUniversal {
    fn default_universal() -> Self;
}

impl DefaultUniversal for AddressLattice {
    fn default_universal() -> Self {
        AddressLattice::Any
    }
}

impl DefaultUniversal for FeeLattice {
    fn default_universal() -> Self {
        FeeLattice::Unknown
    }
}

impl DefaultUniversal for IntSet {
    fn default_universal() -> Self {
        (0..=MAX_GROUP_SIZE as u64).collect()
    }
}

impl DefaultUniversal for TypeSet {
    fn default_universal() -> Self {
        crate::dataflow::txntype::universe()
    }
}

fn clamp_group_index(group_index: &mut AnalysisResult<IntSet>, group_size: &AnalysisResult<IntSet>) {
    for (block, value) in group_index.self_ctx.iter_mut() {
        if let Some(sizes) = group_size.self_ctx.get(block) {
            *value = group::clamp_to_group_sizes(value, sizes);
        }
    }
    for i in 0..group_index.gtxn_ctx.len() {
        let blocks: Vec<BlockId> = group_index.gtxn_ctx[i].keys().copied().collect();
        for block in blocks {
            if let Some(sizes) = group_size.gtxn_ctx[i].get(&block) {
                let sizes = sizes.clone();
                let entry = group_index.gtxn_ctx[i].get_mut(&block).unwrap();
                *entry = group::clamp_to_group_sizes(entry, &sizes);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ExecutionMode;

    fn build(src: &str) -> Contract {
        Contract::compile("ctx-test", src, ExecutionMode::Application).unwrap()
    }

    #[test]
    fn a_query_for_an_unvisited_block_falls_back_to_default_universal() {
        let contract = build("#pragma version 6\nint 1\nreturn\n");
        let ctx = TransactionContext::build(&contract);
        // No assertion anywhere pins group size, so every view defaults open.
        let sizes = ctx.group_size_at(contract.entry_block(), QueryIndex::SelfTxn);
        assert_eq!(sizes, (1..=crate::consts::MAX_GROUP_SIZE as u64).collect::<IntSet>());
    }

    #[test]
    fn absolute_query_out_of_group_range_returns_the_default_rather_than_panicking() {
        let contract = build("#pragma version 6\nint 1\nreturn\n");
        let ctx = TransactionContext::build(&contract);
        let value = ctx.fee_at(contract.entry_block(), QueryIndex::Absolute(999));
        assert_eq!(value, FeeLattice::Unknown);
    }

    #[test]
    fn group_index_pinned_to_zero_zeroes_out_the_rekey_context_at_every_other_absolute_index() {
        let contract = build(
            "#pragma version 6\n\
             global GroupSize\n\
             int 1\n\
             ==\n\
             assert\n\
             txn RekeyTo\n\
             global ZeroAddress\n\
             ==\n\
             assert\n\
             int 1\n\
             return\n",
        );
        let ctx = TransactionContext::build(&contract);
        let entry = contract.entry_block();
        // GroupSize == 1 forces GroupIndex == 0 everywhere downstream, so
        // every other absolute-index view of this block is unreachable and
        // phase D zeroes its rekey context to `None`.
        assert_eq!(ctx.rekey_to_at(entry, QueryIndex::Absolute(5)), AddressLattice::None);
    }
}
