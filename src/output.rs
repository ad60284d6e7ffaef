//! Rendering detector results to DOT and JSON.
//!
//! A collaborator, not part of the core analyses (spec.md §1/§6): the
//! shapes here are exactly `ExecutionPaths`'s and `GroupTransactionOutput`'s
//! JSON forms, plus a small DOT renderer in the style of the original's
//! `printers/function_cfg.py` (one node per block, vulnerable blocks
//! highlighted, edges following CFG successors).

use itertools::Itertools;
use serde::Serialize;

use crate::block::BlockId;
use crate::contract::Contract;
use crate::detector::{ExecutionPaths, GroupTransactionOutput, VulnerablePath};

/// JSON form of one path: the `"B0 -> B3 -> ..."` short form plus every
/// block's instructions rendered as `"n: instr"` lines, per spec.md §6.
#[derive(Debug, Serialize)]
pub struct PathJson {
    pub short: String,
    pub blocks: Vec<Vec<String>>,
}

/// JSON form of `ExecutionPaths`: `{check, description, help, paths}`.
#[derive(Debug, Serialize)]
pub struct ExecutionPathsJson {
    pub check: String,
    pub description: String,
    pub help: String,
    pub paths: Vec<PathJson>,
}

fn path_to_json(contract: &Contract, path: &VulnerablePath) -> PathJson {
    let blocks = path
        .blocks
        .iter()
        .map(|&id| {
            contract
                .block(id)
                .instructions
                .iter()
                .map(|i| i.to_string())
                .collect()
        })
        .collect();
    PathJson {
        short: path.short(),
        blocks,
    }
}

/// Renders a single function's detector run to its JSON summary.
pub fn execution_paths_to_json(contract: &Contract, paths: &ExecutionPaths) -> ExecutionPathsJson {
    ExecutionPathsJson {
        check: paths.check.clone(),
        description: paths.description.clone(),
        help: paths.help.clone(),
        paths: paths.paths.iter().map(|p| path_to_json(contract, p)).collect(),
    }
}

/// JSON form of `GroupTransactionOutput`: operation name plus every
/// vulnerable transaction and the contracts it ran through.
#[derive(Debug, Serialize)]
pub struct VulnerableTransactionJson {
    pub txn_id: String,
    pub contracts: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct GroupTransactionOutputJson {
    pub operation: String,
    pub vulnerable_transactions: Vec<VulnerableTransactionJson>,
}

pub fn group_output_to_json(output: &GroupTransactionOutput) -> GroupTransactionOutputJson {
    GroupTransactionOutputJson {
        operation: output.operation.clone(),
        vulnerable_transactions: output
            .vulnerable
            .iter()
            .map(|v| VulnerableTransactionJson {
                txn_id: v.txn_id.clone(),
                contracts: v.contracts.clone(),
            })
            .collect(),
    }
}

/// Renders one path as a standalone DOT graph: every block on the path is
/// a node (vulnerable path blocks highlighted in red), edges follow CFG
/// successors restricted to the path itself, matching the "vulnerable
/// blocks highlighted" shape spec.md §6 describes.
pub fn path_to_dot(contract: &Contract, path: &VulnerablePath) -> String {
    let mut dot = String::from("digraph CFG {\n");
    for &id in &path.blocks {
        let block = contract.block(id);
        let label = block.instructions.iter().map(|i| i.to_string()).join("\\l");
        dot.push_str(&format!(
            "  {} [label=\"{}\\l\", shape=box, style=filled, fillcolor=\"#f8d7da\"];\n",
            node_name(id),
            escape(&label)
        ));
    }
    for w in path.blocks.windows(2) {
        dot.push_str(&format!("  {} -> {};\n", node_name(w[0]), node_name(w[1])));
    }
    dot.push_str("}\n");
    dot
}

/// Renders a whole function's CFG (every reachable block, not just a
/// vulnerable path), matching `printers/full_cfg.py`'s whole-graph export.
pub fn function_cfg_to_dot(contract: &Contract, blocks: &[BlockId]) -> String {
    let mut dot = String::from("digraph CFG {\n");
    for &id in blocks {
        let block = contract.block(id);
        let label = block.instructions.iter().map(|i| i.to_string()).join("\\l");
        dot.push_str(&format!(
            "  {} [label=\"{}\\l\", shape=box];\n",
            node_name(id),
            escape(&label)
        ));
        for &succ in &block.successors {
            dot.push_str(&format!("  {} -> {};\n", node_name(id), node_name(succ)));
        }
    }
    dot.push_str("}\n");
    dot
}

fn node_name(id: BlockId) -> String {
    format!("block_{}", id.0)
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
