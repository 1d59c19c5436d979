//! Typed failures raised by the model, the sampler and the file layer.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = ChainError> = std::result::Result<T, E>;

#[derive( Debug, Error )]
pub enum ChainError {
    /// A configuration value is out of range.
    #[error( "invalid configuration: {0}" )]
    InvalidConfig( String ),
    /// A context tuple does not match the chain's order.
    #[error( "context for chain {chain} has length {found}, expected {expected}" )]
    ContextLength { chain: String, expected: usize, found: usize },
    /// The context was never observed while fitting.
    #[error( "context {context} is not keyed in chain data for {chain} chain" )]
    ContextNotFound { chain: String, context: String },
    /// A required column is absent from the training data.
    #[error( "missing column: {0}" )]
    MissingColumn( String ),
    /// A feature weight refers to a feature without a chain.
    #[error( "unknown feature: {0}" )]
    UnknownFeature( String ),
    #[error( "summary function unknown ({0}), please use one of (simple_weighted_avg, sum_weighted_log_odds, rescaled_power_weight)" )]
    UnknownSummaryFunction( String ),
    /// No candidate survived scoring. Expected for tightly constrained weights.
    #[error( "no feasible candidate at step {step}" )]
    ExhaustedCandidates { step: usize },
    /// The final distribution could not be sampled from.
    #[error( "cannot sample: {0}" )]
    Sampling( String ),
    #[error( "parse error on line {line}: {message}" )]
    Parse { line: usize, message: String },
    #[error( "io error while processing {path:?}: {source}" )]
    Io { source: std::io::Error, path: Option<PathBuf> },
    #[error( "serialization error: {0}" )]
    Serialization( String ),
}

impl ChainError {
    pub fn io( source: std::io::Error, path: Option<PathBuf> ) -> ChainError {
	ChainError::Io { source, path }
    }

    /// Only an exhausted candidate pool is worth another attempt.
    pub fn is_retryable( &self ) -> bool {
	matches!( self, ChainError::ExhaustedCandidates { .. } )
    }
}

impl From<serde_json::Error> for ChainError {
    fn from( err: serde_json::Error ) -> Self {
	ChainError::Serialization( err.to_string() )
    }
}
