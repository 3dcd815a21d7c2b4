//! HypercutError: unified error type for hypercut public APIs
//!
//! Every fallible public operation returns this type. Configuration and
//! input errors are reported before any state is mutated; internal
//! invariant violations are reserved for debug/strict builds.

use thiserror::Error;

/// Unified error type for hypercut operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HypercutError {
    /// Number of blocks must be at least two.
    #[error("invalid number of blocks {0} (k must be >= 2)")]
    InvalidBlockCount(u32),
    /// Imbalance tolerance must be strictly positive.
    #[error("invalid imbalance tolerance (epsilon must be > 0)")]
    InvalidEpsilon,
    /// Unknown objective or other enum-valued parameter.
    #[error("invalid value `{value}` for parameter `{name}`")]
    InvalidEnumValue { name: &'static str, value: String },
    /// A numeric parameter did not parse.
    #[error("cannot parse `{value}` as integer for parameter `{name}`")]
    IntParse { name: &'static str, value: String },
    /// A parameter name was not recognized.
    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),
    /// Unknown key in a configuration file.
    #[error("unknown configuration key `{key}` (line {line})")]
    UnknownConfigKey { key: String, line: usize },
    /// Malformed configuration file line.
    #[error("malformed configuration line {line}: `{content}`")]
    MalformedConfigLine { line: usize, content: String },
    /// Input file could not be read.
    #[error("cannot read `{path}`: {reason}")]
    FileRead { path: String, reason: String },
    /// Output file could not be written.
    #[error("cannot write `{path}`: {reason}")]
    FileWrite { path: String, reason: String },
    /// Malformed hypergraph file.
    #[error("malformed hypergraph file `{path}` at line {line}: {reason}")]
    MalformedInput {
        path: String,
        line: usize,
        reason: String,
    },
    /// A vertex or edge weight was zero or negative.
    #[error("nonpositive weight for {entity} {id}")]
    NonpositiveWeight { entity: &'static str, id: u64 },
    /// Pin index out of range or offsets not monotone.
    #[error("inconsistent incidence structure: {0}")]
    InconsistentIncidence(String),
    /// The initial partitioner exhausted its retry budget without
    /// producing a balanced partition of the coarsest hypergraph.
    #[error("no balanced initial partition found after {attempts} attempts")]
    InitialPartitionInfeasible { attempts: usize },
    /// Thread-pool construction failed.
    #[error("thread pool initialization failed: {0}")]
    ThreadPool(String),
    /// An internal invariant was violated. Only produced by validation
    /// routines in debug or `strict-invariants` builds.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl HypercutError {
    /// Stable numeric code for parameter-setting errors, mirroring the
    /// C-style contract: 0 success, 1 unknown parameter, 2 integer parse
    /// error, 3 invalid enum value.
    pub fn parameter_code(&self) -> i32 {
        match self {
            HypercutError::UnknownParameter(_) => 1,
            HypercutError::IntParse { .. } => 2,
            HypercutError::InvalidEnumValue { .. } => 3,
            _ => -1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_codes_are_stable() {
        assert_eq!(
            HypercutError::UnknownParameter("foo".into()).parameter_code(),
            1
        );
        assert_eq!(
            HypercutError::IntParse {
                name: "k",
                value: "x".into()
            }
            .parameter_code(),
            2
        );
        assert_eq!(
            HypercutError::InvalidEnumValue {
                name: "objective",
                value: "modularity".into()
            }
            .parameter_code(),
            3
        );
    }

    #[test]
    fn error_messages_name_the_offender() {
        let e = HypercutError::UnknownConfigKey {
            key: "i-refinement-fm-seed".into(),
            line: 12,
        };
        assert!(e.to_string().contains("i-refinement-fm-seed"));
        assert!(e.to_string().contains("12"));
    }
}
