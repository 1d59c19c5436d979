
use std::sync::Arc;

use bit_set::BitSet;
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};

use crate::*;

/// Outcome of one sampling step
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash )]
pub enum Draw {
    Item( ItemId ),
    /// the synthetic row that ends a program
    Break,
}

#[derive( Debug )]
struct Candidate {
    draw: Draw,
    weight: f64,
    /// chain-transformed values, one per chain of the ensemble
    features: Vec<Symbol>,
}

#[derive( Debug )]
/// Candidate pool shared by all sessions of one trained ensemble.
/// Holds one row per distinct item plus the break row, with minor values already folded.
pub struct SessionTemplate {
    ensemble: Arc<ChainEnsemble>,
    candidates: Vec<Candidate>,
    break_index: usize,
    intermission_index: Option<usize>,
}

#[derive( Debug, Clone )]
/// Mutable state of one generation: which candidates are left and what each chain is conditioned on.
/// Cloning copies only this state; the pool itself stays shared.
pub struct GenerationSession {
    template: Arc<SessionTemplate>,
    /// indices of candidates not drawn yet
    live: BitSet,
    /// last state_size symbols per chain
    state: Vec<Vec<Symbol>>,
    break_weight: f64,
    steps: usize,
}

impl SessionTemplate {

    pub fn new( ensemble: Arc<ChainEnsemble> ) -> Result<SessionTemplate> {
	let table = ensemble.table();
	let columns: Vec<usize> = ensemble.chains().iter()
	    .map( |chain| table.column_index( chain.name() ).ok_or_else( || ChainError::MissingColumn( chain.name().to_string() )))
	    .collect::<Result<Vec<usize>>>()?;
	// the last column marks the intermission row
	let marker_column = table.columns().len().checked_sub( 1 );

	let mut candidates: Vec<Candidate> = Vec::new();
	let mut intermission_index = None;
	for row in table.collapse() {
	    if intermission_index.is_none() && marker_column.map_or( false, |c| row.values[ c ] == INTERMISSION ) {
		intermission_index = Some( candidates.len() );
	    }
	    let features = ensemble.chains().iter().zip( columns.iter() )
		.map( |(chain, column)| {
		    chain.transform_value( &Symbol::value( row.values[ *column ].as_str() ))
		}).collect();
	    candidates.push( Candidate { draw: Draw::Item( row.item_id ), weight: row.weight, features } );
	}

	let break_index = candidates.len();
	candidates.push( Candidate {
	    draw: Draw::Break,
	    weight: 1.0,
	    features: vec![ Symbol::Break; ensemble.len() ],
	});

	if intermission_index.is_none() {
	    debug!( "no intermission row in the candidate pool" );
	}
	debug!( "candidate pool holds {} items", break_index );

	Ok( SessionTemplate { ensemble, candidates, break_index, intermission_index } )
    }

    pub fn ensemble( &self ) -> &Arc<ChainEnsemble> {
	&self.ensemble
    }

    /// Number of candidates including the break row
    pub fn len( &self ) -> usize {
	self.candidates.len()
    }

    pub fn is_empty( &self ) -> bool {
	self.candidates.is_empty()
    }

    pub fn intermission( &self ) -> Option<Draw> {
	self.intermission_index.map( |i| self.candidates[ i ].draw )
    }

    /// Transformed feature values of a candidate, in chain order
    pub fn features( &self, draw: Draw ) -> Option<&[Symbol]> {
	self.candidates.iter()
	    .find( |c| c.draw == draw )
	    .map( |c| c.features.as_slice() )
    }
}

impl GenerationSession {

    /// Starts a clean session. The break row and the intermission row both get `break_weight`.
    pub fn new( template: Arc<SessionTemplate>, break_weight: f64 ) -> Result<GenerationSession> {
	if !break_weight.is_finite() || break_weight < 0.0 {
	    return Err( ChainError::InvalidConfig( format!( "break_weight must be >= 0, got {break_weight}" )));
	}
	let mut live = BitSet::with_capacity( template.len() );
	for index in 0 .. template.len() {
	    live.insert( index );
	}
	let state = template.ensemble.chains().iter().map( |c| c.initial_context() ).collect();
	Ok( GenerationSession { template, live, state, break_weight, steps: 0 } )
    }

    /// Candidates not drawn yet, including the break row
    pub fn remaining( &self ) -> usize {
	self.live.len()
    }

    pub fn steps( &self ) -> usize {
	self.steps
    }

    pub fn is_live( &self, draw: Draw ) -> bool {
	self.live.iter().any( |i| self.template.candidates[ i ].draw == draw )
    }

    /// Current conditioning context of a feature's chain
    pub fn state( &self, feature: &str ) -> Option<&[Symbol]> {
	self.template.ensemble.feature_index( feature ).map( |i| self.state[ i ].as_slice() )
    }

    /// Sampling weight of a candidate before exponents are applied
    pub fn weight( &self, draw: Draw ) -> Option<f64> {
	self.template.candidates.iter()
	    .position( |c| c.draw == draw )
	    .map( |i| self.candidate_weight( i ))
    }

    fn candidate_weight( &self, index: usize ) -> f64 {
	if index == self.template.break_index || Some( index ) == self.template.intermission_index {
	    self.break_weight
	} else {
	    self.template.candidates[ index ].weight
	}
    }

    /// Final sampling distribution over the live candidates under the current state.
    /// Only candidates that every weighted feature scores above 0 are included.
    pub fn distribution( &self, options: &GenerationOptions ) -> Result<Vec<(Draw, f64)>> {
	let scored = self.score_candidates( options )?;
	Ok( scored.into_iter().map( |(i, p)| (self.template.candidates[ i ].draw, p) ).collect() )
    }

    /// Draws the next candidate, advances every chain's context and removes the candidate from the pool.
    pub fn step<R: Rng + ?Sized>( &mut self, options: &GenerationOptions, rng: &mut R ) -> Result<Draw> {
	let scored = self.score_candidates( options )?;
	let sampler = WeightedIndex::new( scored.iter().map( |(_, p)| *p ))
	    .map_err( |e| ChainError::Sampling( e.to_string() ))?;
	let (chosen, probability) = scored[ sampler.sample( rng ) ];

	let candidate = &self.template.candidates[ chosen ];
	for (context, symbol) in self.state.iter_mut().zip( candidate.features.iter() ) {
	    context.remove( 0 );
	    context.push( symbol.clone() );
	}
	self.live.remove( chosen );
	self.steps += 1;

	trace!( "step {}: drew {:?} with probability {probability:.4} out of {} survivors", self.steps, candidate.draw, scored.len() );
	Ok( candidate.draw )
    }

    /// Indices of the surviving candidates paired with their normalized sampling probability
    fn score_candidates( &self, options: &GenerationOptions ) -> Result<Vec<(usize, f64)>> {
	let active = self.active_features( options )?;
	let chains = self.template.ensemble.chains();
	let live: Vec<usize> = self.live.iter().collect();

	// one column of scores per weighted feature
	let mut columns: Vec<Vec<f64>> = Vec::with_capacity( active.len() );
	for (feature, _) in &active {
	    let values = live.iter().map( |i| &self.template.candidates[ *i ].features[ *feature ] );
	    columns.push( chains[ *feature ].score( values, &self.state[ *feature ] )? );
	}
	let weights: Vec<f64> = active.iter().map( |(_, w)| *w ).collect();

	let mut scored: Vec<(usize, f64)> = Vec::new();
	let mut row = vec![ 0.0; active.len() ];
	for (position, index) in live.iter().enumerate() {
	    for (cell, column) in row.iter_mut().zip( columns.iter() ) {
		*cell = column[ position ];
	    }
	    // implausible under any weighted feature rules a candidate out
	    if row.iter().any( |p| *p == 0.0 ) {
		continue;
	    }
	    let combined = options.summary.combine( &row, &weights );
	    let score = combined.powf( options.weighted_average_exponent )
		* self.candidate_weight( *index ).powf( options.case_weight_exponent );
	    scored.push( (*index, score) );
	}

	if scored.is_empty() {
	    return Err( ChainError::ExhaustedCandidates { step: self.steps } );
	}
	let total: f64 = scored.iter().map( |(_, s)| *s ).sum();
	if total.is_nan() || total.is_infinite() {
	    return Err( ChainError::Sampling( format!( "scores sum to {total}" )));
	}
	if total <= 0.0 {
	    return Err( ChainError::ExhaustedCandidates { step: self.steps } );
	}
	for (_, score) in scored.iter_mut() {
	    *score /= total;
	}
	Ok( scored )
    }

    /// Chain indices and weights of the features with a positive weight
    fn active_features( &self, options: &GenerationOptions ) -> Result<Vec<(usize, f64)>> {
	let ensemble = &self.template.ensemble;
	let mut active = Vec::with_capacity( options.feature_weights.len() );
	for (feature, weight) in options.feature_weights.iter().filter( |(_, w)| **w > 0.0 ) {
	    let index = ensemble.feature_index( feature ).ok_or_else( || ChainError::UnknownFeature( feature.clone() ))?;
	    active.push( (index, *weight) );
	}
	if active.is_empty() {
	    return Err( ChainError::InvalidConfig( "at least one feature weight must be positive".into() ));
	}
	Ok( active )
    }
}

impl Loggable for GenerationSession {
    fn log( &self, message: &str, level: tracing::Level ) {
	let contexts: Vec<String> = self.template.ensemble.iterate_features()
	    .zip( self.state.iter() )
	    .map( |(feature, context)| format!( "{feature}={}", data::format_context( context )))
	    .collect();
	emit( level, &format!( "{message}: {} candidates left after {} steps, state {}", self.live.len(), self.steps, contexts.join( " " )));
    }
}
