//! Declarative execution model: how one or more compiled contracts are
//! deployed together as a group of transactions.
//!
//! Mirrors `execution_context/transactions.py` and
//! `group_config/group_config.py`: a [`GroupTransaction`] is an ordered
//! list of [`Transaction`]s, each optionally bound to a logic-sig and/or
//! application function view, plus whatever index information the
//! configuration author knew at authoring time (absolute position,
//! offsets to named peers). [`GroupTransaction::new`] precomputes the two
//! lookup tables every group-aware detector needs: index -> transaction,
//! and (transaction, transaction) -> relative offset.

use std::collections::HashMap;

use crate::contract::Function;

/// The 6 transaction types an execution-model entry can declare, plus the
/// bare `txn` escape hatch for a type the analyses don't otherwise
/// distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum TransactionKind {
    Pay,
    KeyReg,
    Acfg,
    Axfer,
    Afrz,
    Appl,
    /// No declared type; group-aware detectors that filter by type skip
    /// transactions of this kind rather than assuming a match.
    Unspecified,
}

/// One transaction within a group, with its declared type and contract
/// bindings.
pub struct Transaction<'a> {
    pub txn_id: String,
    pub kind: TransactionKind,
    pub has_logic_sig: bool,
    pub logic_sig: Option<Function<'a>>,
    pub application: Option<Function<'a>>,
    pub absolute_index: Option<usize>,
}

impl<'a> Transaction<'a> {
    pub fn new(txn_id: impl Into<String>, kind: TransactionKind) -> Self {
        Transaction {
            txn_id: txn_id.into(),
            kind,
            has_logic_sig: false,
            logic_sig: None,
            application: None,
            absolute_index: None,
        }
    }

    pub fn with_logic_sig(mut self, f: Function<'a>) -> Self {
        self.has_logic_sig = true;
        self.logic_sig = Some(f);
        self
    }

    pub fn with_application(mut self, f: Function<'a>) -> Self {
        self.application = Some(f);
        self
    }

    pub fn with_absolute_index(mut self, idx: usize) -> Self {
        self.absolute_index = Some(idx);
        self
    }
}

/// An ordered group of transactions executed atomically, plus the
/// lookup tables derived from whatever index information each
/// transaction declares.
pub struct GroupTransaction<'a> {
    pub operation: String,
    pub transactions: Vec<Transaction<'a>>,
    /// Absolute index -> position in `transactions`, for every
    /// transaction with a known `absolute_index`.
    pub absolute_indexes: HashMap<usize, usize>,
    /// `(t1, t2)` positions in `transactions` -> `t2.idx - t1.idx`, for
    /// every pair whose absolute indices are both known.
    pub group_relative_indexes: HashMap<(usize, usize), i64>,
}

impl<'a> GroupTransaction<'a> {
    pub fn new(operation: impl Into<String>, transactions: Vec<Transaction<'a>>) -> Self {
        let mut absolute_indexes = HashMap::new();
        for (pos, t) in transactions.iter().enumerate() {
            if let Some(idx) = t.absolute_index {
                absolute_indexes.insert(idx, pos);
            }
        }

        let mut group_relative_indexes = HashMap::new();
        for (i, ti) in transactions.iter().enumerate() {
            for (j, tj) in transactions.iter().enumerate() {
                if i == j {
                    continue;
                }
                if let (Some(a), Some(b)) = (ti.absolute_index, tj.absolute_index) {
                    group_relative_indexes.insert((i, j), b as i64 - a as i64);
                }
            }
        }

        GroupTransaction {
            operation: operation.into(),
            transactions,
            absolute_indexes,
            group_relative_indexes,
        }
    }

    pub fn transaction_at_absolute(&self, idx: usize) -> Option<&Transaction<'a>> {
        self.absolute_indexes.get(&idx).map(|&pos| &self.transactions[pos])
    }

    /// Every other transaction whose offset from `pos` is known, as
    /// `(position, offset)` pairs.
    pub fn relative_peers(&self, pos: usize) -> impl Iterator<Item = (usize, i64)> + '_ {
        self.group_relative_indexes
            .iter()
            .filter_map(move |(&(from, to), &offset)| (from == pos).then_some((to, offset)))
    }

    pub fn group_size(&self) -> usize {
        self.transactions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{Contract, ExecutionMode};

    fn dummy_function(contract: &Contract) -> Function<'_> {
        contract.function_at("main", contract.entry_block())
    }

    #[test]
    fn absolute_indexes_and_relative_offsets_are_precomputed_for_every_known_pair() {
        let contract = Contract::compile("c", "#pragma version 6\nint 1\nreturn\n", ExecutionMode::Application).unwrap();
        let t0 = Transaction::new("T0", TransactionKind::Appl)
            .with_application(dummy_function(&contract))
            .with_absolute_index(0);
        let t1 = Transaction::new("T1", TransactionKind::Pay).with_absolute_index(1);
        let t2 = Transaction::new("T2", TransactionKind::Pay);
        let group = GroupTransaction::new("op", vec![t0, t1, t2]);

        assert_eq!(group.transaction_at_absolute(0).unwrap().txn_id, "T0");
        assert_eq!(group.transaction_at_absolute(1).unwrap().txn_id, "T1");
        assert!(group.transaction_at_absolute(2).is_none(), "T2 has no known absolute index");

        let peers: Vec<(usize, i64)> = group.relative_peers(0).collect();
        assert_eq!(peers, vec![(1, 1)]);
        assert_eq!(group.group_size(), 3);
    }

    #[test]
    fn a_transaction_with_no_known_index_has_no_relative_peers() {
        let t0 = Transaction::new("T0", TransactionKind::Pay);
        let t1 = Transaction::new("T1", TransactionKind::Pay).with_absolute_index(1);
        let group = GroupTransaction::new("op", vec![t0, t1]);
        assert_eq!(group.relative_peers(0).count(), 0);
    }
}
