//! Transaction-type lattice: a finite subset of [`TxnTypeTag`].
//!
//! `TypeEnum` only discriminates at the coarse level — a bare `appl`
//! match narrows to the whole application-call family, since
//! `OnCompletion`/`ApplicationID` are what further split that family into
//! its seven refinements.

use std::collections::BTreeSet;
use std::rc::Rc;

use crate::instruction::{InstructionKind, TxnField, TxnTypeTag};
use crate::stack_ast::StackValue;

use super::index_resolution::{resolve_field_read, TransactionIndex};
use super::FieldAnalysis;

pub type TypeSet = BTreeSet<TxnTypeTag>;

pub fn universe() -> TypeSet {
    use TxnTypeTag::*;
    [
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
    ]
    .into_iter()
    .collect()
}

fn appl_family() -> TypeSet {
    use TxnTypeTag::*;
    [
        Appl,
        ApplNoOp,
        ApplOptIn,
        ApplCloseOut,
        ApplClearState,
        ApplUpdateApplication,
        ApplDeleteApplication,
        ApplCreation,
    ]
    .into_iter()
    .collect()
}

/// `teal_enums.py`'s `APPLICATION_TRANSACTION_TYPES`: the seven refined
/// appl-call tags `ApplicationID`/`OnCompletion` assertions discriminate
/// among. The complement base for those two fields — never the generic
/// `Appl` tag, which only `TypeEnum` produces.
fn application_family() -> TypeSet {
    use TxnTypeTag::*;
    [
        ApplNoOp,
        ApplOptIn,
        ApplCloseOut,
        ApplClearState,
        ApplUpdateApplication,
        ApplDeleteApplication,
        ApplCreation,
    ]
    .into_iter()
    .collect()
}

/// `teal_enums.py`'s `TYPEENUM_TRANSACTION_TYPES`: the six tags
/// `TypeEnum` distinguishes between — the five non-appl kinds plus the
/// single coarse `Appl` tag (`TypeEnum` never resolves a refinement).
fn typeenum_family() -> TypeSet {
    use TxnTypeTag::*;
    [Pay, KeyReg, Acfg, Axfer, Afrz, Appl].into_iter().collect()
}

fn type_enum_set(value: u64) -> Option<TypeSet> {
    use TxnTypeTag::*;
    Some(match value {
        1 => [Pay].into_iter().collect(),
        2 => [KeyReg].into_iter().collect(),
        3 => [Acfg].into_iter().collect(),
        4 => [Axfer].into_iter().collect(),
        5 => [Afrz].into_iter().collect(),
        6 => appl_family(),
        _ => return None,
    })
}

fn on_completion_tag(value: u64) -> Option<TxnTypeTag> {
    use TxnTypeTag::*;
    Some(match value {
        0 => ApplNoOp,
        1 => ApplOptIn,
        2 => ApplCloseOut,
        3 => ApplClearState,
        4 => ApplUpdateApplication,
        5 => ApplDeleteApplication,
        _ => return None,
    })
}

fn literal(value: &Rc<StackValue>) -> Option<u64> {
    match value.kind()? {
        InstructionKind::Int(n) | InstructionKind::PushInt(n) => Some(*n),
        _ => None,
    }
}

pub struct TransactionTypeAnalysis;

impl TransactionTypeAnalysis {
    fn field_read<'a>(
        &self,
        value: &'a Rc<StackValue>,
        for_index: TransactionIndex,
    ) -> Option<&'a TxnField> {
        match resolve_field_read(value) {
            Some((idx, field @ (TxnField::TypeEnum | TxnField::OnCompletion | TxnField::ApplicationID)))
                if idx.index_type == for_index.index_type && idx.value == for_index.value =>
            {
                Some(field)
            }
            _ => None,
        }
    }

    fn asserted_eq(
        &self,
        lhs: &Rc<StackValue>,
        rhs: &Rc<StackValue>,
        for_index: TransactionIndex,
    ) -> Option<(TypeSet, TypeSet)> {
        if let Some(field) = self.field_read(lhs, for_index) {
            if let Some(c) = literal(rhs) {
                return self.asserted_for_field(field, c);
            }
        } else if let Some(field) = self.field_read(rhs, for_index) {
            if let Some(c) = literal(lhs) {
                return self.asserted_for_field(field, c);
            }
        }
        None
    }

    fn asserted_for_field(&self, field: &TxnField, c: u64) -> Option<(TypeSet, TypeSet)> {
        let (true_set, family): (TypeSet, TypeSet) = match field {
            TxnField::TypeEnum => (type_enum_set(c)?, typeenum_family()),
            TxnField::OnCompletion => ([on_completion_tag(c)?].into_iter().collect(), application_family()),
            TxnField::ApplicationID => {
                if c == 0 {
                    ([TxnTypeTag::ApplCreation].into_iter().collect(), application_family())
                } else {
                    return None;
                }
            }
            _ => return None,
        };
        let false_set: TypeSet = family.difference(&true_set).copied().collect();
        Some((true_set, false_set))
    }
}

impl FieldAnalysis for TransactionTypeAnalysis {
    type Value = TypeSet;

    fn universal() -> Self::Value {
        universe()
    }

    fn null() -> Self::Value {
        TypeSet::new()
    }

    fn union(a: &Self::Value, b: &Self::Value) -> Self::Value {
        a.union(b).copied().collect()
    }

    fn intersect(a: &Self::Value, b: &Self::Value) -> Self::Value {
        a.intersection(b).copied().collect()
    }

    fn asserted(&self, value: &Rc<StackValue>, for_index: TransactionIndex) -> Option<(Self::Value, Self::Value)> {
        match value.kind()? {
            InstructionKind::Eq => self.asserted_eq(&value.arg(0), &value.arg(1), for_index),
            InstructionKind::Neq => {
                let (t, f) = self.asserted_eq(&value.arg(0), &value.arg(1), for_index)?;
                Some((f, t))
            }
            // A bare `txn ApplicationID` (or `gtxn N ApplicationID`) used
            // directly as a boolean condition reads as "!= 0": nonzero
            // means an existing application call, zero means creation.
            _ if self.field_read(value, for_index) == Some(&TxnField::ApplicationID) => {
                let (t, f) = self.asserted_for_field(&TxnField::ApplicationID, 0)?;
                Some((f, t))
            }
            _ => None,
        }
    }
}
