//! Algorand/TEAL protocol constants used by the dataflow engine.

/// Maximum number of transactions in an atomic group.
pub const MAX_GROUP_SIZE: usize = 16;

/// Minimum per-transaction fee, in microAlgos.
pub const MIN_ALGORAND_FEE: u64 = 1_000;

/// The all-zero Algorand address, used as the "cleared" rekey/close target.
pub const ZERO_ADDRESS: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAEVAL4QAJS7JHB4";

/// Largest value representable by a TEAL `uint64`.
pub const MAX_UINT64: u64 = u64::MAX;

/// Maximum number of inner transactions a single group can spawn.
pub const MAX_NUM_INNER_TXN: u64 = 256;

/// Conservative upper bound on total fee cost across a group with the
/// maximum number of inner transactions, each paying the minimum fee.
pub const MAX_TRANSACTION_COST: u64 = (MAX_GROUP_SIZE as u64 + MAX_NUM_INNER_TXN) * MIN_ALGORAND_FEE;
