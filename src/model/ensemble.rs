
use rayon::prelude::*;
use serde::{Serialize, Deserialize};

use crate::*;

use super::{CategoricalChain, ChainConfig, EnsembleConfig};

#[derive( Debug, Clone, Serialize, Deserialize )]
/// One chain per modeled feature, all fit in the same direction over the same sequences.
/// Keeps the training table so generation sessions can derive their candidate pool from it.
pub struct ChainEnsemble {
    /// ordered by feature name
    chains: Vec<CategoricalChain>,
    train_backwards: bool,
    table: TrainingTable,
}

impl ChainEnsemble {

    /// Fits every configured feature's chain. The fits are independent and run in parallel.
    pub fn fit( table: TrainingTable, config: &EnsembleConfig ) -> Result<ChainEnsemble> {
	let _span = info_span!( "fit_ensemble", rows = table.len() ).entered();

	let features = config.resolve( table.columns() );
	let jobs = locate_features( &table, features )?;
	let train_backwards = config.train_backwards;

	let chains: Vec<CategoricalChain> = jobs.par_iter()
	    .map( |(feature, column, chain_config)| {
		let sequences = table.project( *column );
		let chain = CategoricalChain::fit( feature, &sequences, chain_config, train_backwards )?;
		chain.log( "fitted", Level::DEBUG );
		Ok( chain )
	    })
	    .collect::<Result<Vec<CategoricalChain>>>()?;

	info!( "fit {} chains over {} sequences", chains.len(), table.number_sequences() );
	Ok( ChainEnsemble { chains, train_backwards, table } )
    }

    pub fn train_backwards( &self ) -> bool {
	self.train_backwards
    }

    pub fn table( &self ) -> &TrainingTable {
	&self.table
    }

    pub fn chains( &self ) -> &[CategoricalChain] {
	&self.chains
    }

    pub fn len( &self ) -> usize {
	self.chains.len()
    }

    pub fn is_empty( &self ) -> bool {
	self.chains.is_empty()
    }

    pub fn feature_index( &self, feature: &str ) -> Option<usize> {
	self.chains.iter().position( |c| c.name() == feature )
    }

    pub fn chain( &self, feature: &str ) -> Option<&CategoricalChain> {
	self.chains.iter().find( |c| c.name() == feature )
    }

    pub fn iterate_features<'a>( &'a self ) -> Box<dyn Iterator<Item = &'a str> + 'a> {
	Box::new( self.chains.iter().map( |c| c.name() ))
    }
}

/// Checks the table against the features and pairs every feature with its column
fn locate_features( table: &TrainingTable, features: Vec<(String, ChainConfig)> ) -> Result<Vec<(String, usize, ChainConfig)>> {
    if table.is_empty() {
	return Err( ChainError::InvalidConfig( "training table has no rows".into() ));
    }
    if features.is_empty() {
	return Err( ChainError::InvalidConfig( "no features to model".into() ));
    }
    features.into_iter()
	.map( |(feature, chain_config)| {
	    chain_config.validate()?;
	    let column = table.column_index( &feature ).ok_or_else( || ChainError::MissingColumn( feature.clone() ))?;
	    Ok( (feature, column, chain_config) )
	})
	.collect()
}
