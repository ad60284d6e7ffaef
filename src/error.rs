//! Error types for every fatal failure class the analyzer can hit.
//!
//! Analysis precision losses (ambiguous stack values, unresolved indices) are
//! never represented here: they degrade silently to `Unknown` and widen the
//! affected lattice, as described in the framework design.

use thiserror::Error;

/// A source location a parse or structural error can be pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLine(pub usize);

impl std::fmt::Display for SourceLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}", self.0)
    }
}

/// Parse-time failures: malformed source text.
#[derive(Debug, Error)]
pub enum ParseError {
    /// An opcode mnemonic that isn't recognized for the declared TEAL version.
    #[error("{line}: unknown opcode `{opcode}`")]
    UnknownOpcode { line: SourceLine, opcode: String },

    /// An immediate operand couldn't be parsed as the type the opcode expects.
    #[error("{line}: malformed immediate operand: {detail}")]
    MalformedImmediate { line: SourceLine, detail: String },

    /// A string or byte literal was never closed.
    #[error("{0}: unterminated literal")]
    UnterminatedLiteral(SourceLine),

    /// The `#pragma version` directive is missing, duplicated, or out of place.
    #[error("{line}: invalid version pragma: {detail}")]
    InvalidVersionPragma { line: SourceLine, detail: String },
}

/// Failures in building the control-flow graph or subroutine catalog.
#[derive(Debug, Error)]
pub enum StructuralError {
    /// A branch instruction names a label with no matching definition.
    #[error("{line}: undefined label `{label}`")]
    UndefinedLabel { line: SourceLine, label: String },

    /// A `retsub` was reached with no enclosing `callsub` in scope.
    #[error("{0}: retsub with no callsub in scope")]
    UnscopedRetsub(SourceLine),

    /// Two labels with the same name were both defined.
    #[error("{line}: label `{label}` redefined")]
    DuplicateLabel { line: SourceLine, label: String },
}

/// Failures in loading or resolving a declarative execution-model configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The YAML document is not well-formed or fails schema validation.
    #[error("invalid configuration YAML: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),

    /// A required field was absent from a configuration entry.
    #[error("{path}: missing required field `{field}`")]
    MissingField { path: String, field: String },

    /// A `dispatch_path` named a block id that doesn't exist in the compiled contract.
    #[error("{path}: dispatch path references unknown block `{block}`")]
    UnknownDispatchBlock { path: String, block: String },

    /// A transaction type string didn't match any known variant.
    #[error("{path}: unknown transaction type `{kind}`")]
    UnknownTransactionType { path: String, kind: String },

    /// A contract or function name referenced in a group was never declared.
    #[error("{path}: unknown reference `{name}`")]
    UnknownReference { path: String, name: String },

    /// A contract's `file_path` couldn't be read from disk.
    #[error("{path}: couldn't read `{file_path}`: {source}")]
    UnreadableFile {
        path: String,
        file_path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level error type covering every fatal failure in the analyzer.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// Failed while parsing TEAL source into instructions.
    #[error("parse error in {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: ParseError,
    },

    /// Failed while building the control-flow graph or subroutine catalog.
    #[error("structural error in {file}: {source}")]
    Structural {
        file: String,
        #[source]
        source: StructuralError,
    },

    /// Failed while loading or resolving the execution-model configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = AnalyzerError> = std::result::Result<T, E>;
