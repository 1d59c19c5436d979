use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::*;

mod chain;
mod ensemble;

pub use chain::{CategoricalChain, Distribution, ChainFormatter};
pub use ensemble::ChainEnsemble;

/// Fitting parameters of a single chain.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct ChainConfig {
    /// Markov order, the number of preceding symbols in a context
    pub state_size: usize,
    /// fold rare values into a single symbol
    pub cull: bool,
    /// below 1 a share of all values, otherwise an absolute count
    pub cull_threshold: f64,
}

/// Per-feature deviations from the base config.
#[derive( Debug, Clone, Default, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct ChainOverride {
    pub state_size: Option<usize>,
    pub cull: Option<bool>,
    pub cull_threshold: Option<f64>,
}

/// Describes which features to model and how.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct EnsembleConfig {
    pub base: ChainConfig,
    /// Features to model. Empty means every column of the training table.
    pub chains: BTreeMap<String, ChainOverride>,
    /// Fit on reversed sequences, shared by every chain.
    pub train_backwards: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
	ChainConfig {
	    state_size: 1,
	    cull: true,
	    cull_threshold: 0.01,
	}
    }
}

impl ChainConfig {

    pub fn validate( &self ) -> Result<()> {
	if self.state_size == 0 {
	    return Err( ChainError::InvalidConfig( "state_size should be >= 1".into() ));
	}
	if self.cull && !( self.cull_threshold >= 0.0 ) {
	    return Err( ChainError::InvalidConfig( "cull_threshold should be >= 0".into() ));
	}
	Ok( () )
    }

    /// Returns a copy with every field set in the override replaced
    pub fn merged( &self, overrides: &ChainOverride ) -> ChainConfig {
	ChainConfig {
	    state_size: overrides.state_size.unwrap_or( self.state_size ),
	    cull: overrides.cull.unwrap_or( self.cull ),
	    cull_threshold: overrides.cull_threshold.unwrap_or( self.cull_threshold ),
	}
    }
}

impl Default for EnsembleConfig {
    fn default() -> Self {
	EnsembleConfig {
	    base: ChainConfig::default(),
	    chains: BTreeMap::new(),
	    train_backwards: true,
	}
    }
}

impl EnsembleConfig {

    pub fn new( base: ChainConfig, train_backwards: bool ) -> EnsembleConfig {
	EnsembleConfig { base, chains: BTreeMap::new(), train_backwards }
    }

    /// Adds a feature with its own settings
    pub fn with_chain<S: Into<String>>( mut self, feature: S, overrides: ChainOverride ) -> EnsembleConfig {
	self.chains.insert( feature.into(), overrides );
	self
    }

    /// Resolves the final config of every modeled feature, ordered by feature name.
    pub fn resolve( &self, columns: &[String] ) -> Vec<(String, ChainConfig)> {
	if self.chains.is_empty() {
	    let mut features: Vec<String> = columns.to_vec();
	    features.sort();
	    features.dedup();
	    features.into_iter().map( |f| (f, self.base.clone()) ).collect()
	} else {
	    self.chains.iter()
		.map( |(feature, overrides)| (feature.clone(), self.base.merged( overrides )) )
		.collect()
	}
    }
}
