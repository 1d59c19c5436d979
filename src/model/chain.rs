mod serialize; // serialization and pretty printing of chains

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Serialize, Deserialize};

use crate::*;
use crate::data::{format_context, Count};

use super::ChainConfig;

pub use serialize::ChainFormatter;

/// Probability of every symbol observed after one context
pub type Distribution = FxHashMap<Symbol, f64>;
type Context = Vec<Symbol>;

static MINOR: Symbol = Symbol::Minor;

#[derive( Debug, Clone, Serialize, Deserialize )]
#[serde( into = "serialize::ChainRecord", from = "serialize::ChainRecord" )]
/// Variable-order Markov chain over one categorical feature with rare values folded into `Symbol::Minor`.
/// Immutable once fit.
pub struct CategoricalChain {
    name: String,
    state_size: usize,
    train_backwards: bool,
    /// values whose frequency fell below the cull threshold
    minor_values: FxHashSet<Symbol>,
    /// context of exactly state_size symbols -> next symbol probabilities
    transitions: FxHashMap<Context, Distribution>,
}

impl CategoricalChain {

    /// Fits a chain to a corpus of independent sequences.
    /// Sequences are joined with runs of `state_size` breaks so contexts never span two sequences.
    pub fn fit<S: AsRef<[Symbol]>>( name: &str, sequences: &[S], config: &ChainConfig, train_backwards: bool ) -> Result<CategoricalChain> {
	config.validate()?;
	let state_size = config.state_size;

	let mut flat = pad_sequences( sequences, state_size );
	let minor_values = if config.cull {
	    find_minor_values( &flat, config.cull_threshold )
	} else {
	    FxHashSet::default()
	};
	for symbol in flat.iter_mut() {
	    if minor_values.contains( symbol ) {
		*symbol = Symbol::Minor;
	    }
	}
	if train_backwards {
	    flat.reverse();
	}

	let transitions = count_transitions( &flat, state_size ).into_iter()
	    .map( |(context, counts)| (context, counts_to_probabilities( counts )) )
	    .collect();

	Ok( CategoricalChain {
	    name: name.to_string(),
	    state_size,
	    train_backwards,
	    minor_values,
	    transitions,
	})
    }

    pub fn name( &self ) -> &str {
	&self.name
    }

    pub fn state_size( &self ) -> usize {
	self.state_size
    }

    pub fn train_backwards( &self ) -> bool {
	self.train_backwards
    }

    pub fn is_minor( &self, symbol: &Symbol ) -> bool {
	self.minor_values.contains( symbol )
    }

    pub fn iterate_minor_values<'a>( &'a self ) -> Box<dyn Iterator<Item = &'a Symbol> + 'a> {
	Box::new( self.minor_values.iter() )
    }

    pub fn number_contexts( &self ) -> usize {
	self.transitions.len()
    }

    pub fn iterate_transitions<'a>( &'a self ) -> Box<dyn Iterator<Item = (&'a [Symbol], &'a Distribution)> + 'a> {
	Box::new( self.transitions.iter().map( |(context, distribution)| (context.as_slice(), distribution) ))
    }

    /// The context every generation starts from
    pub fn initial_context( &self ) -> Vec<Symbol> {
	vec![ Symbol::Break; self.state_size ]
    }

    /// Fetches the next-symbol probabilities for a context of raw values.
    pub fn get_probabilities( &self, context: &[Symbol] ) -> Result<&Distribution> {
	if context.len() != self.state_size {
	    return Err( ChainError::ContextLength {
		chain: self.name.clone(),
		expected: self.state_size,
		found: context.len(),
	    });
	}
	let key: Context = context.iter().map( |s| self.canonical( s ).clone() ).collect();
	self.transitions.get( &key ).ok_or_else( || ChainError::ContextNotFound {
	    chain: self.name.clone(),
	    context: format_context( &key ),
	})
    }

    pub fn transform_value( &self, value: &Symbol ) -> Symbol {
	self.canonical( value ).clone()
    }

    /// Replaces culled values with `Symbol::Minor`
    pub fn transform_for_scoring<'a, I>( &self, values: I ) -> Vec<Symbol> where I: IntoIterator<Item = &'a Symbol> {
	values.into_iter().map( |s| self.canonical( s ).clone() ).collect()
    }

    /// Scores every candidate against a context.
    /// A symbol's probability is split evenly among the candidates that share it, so the scores of those
    /// candidates add up to the transition probability. Symbols the context never led to score 0.
    pub fn score<'a, I>( &self, candidates: I, context: &[Symbol] ) -> Result<Vec<f64>> where I: IntoIterator<Item = &'a Symbol> {
	let probabilities = self.get_probabilities( context )?;
	let symbols: Vec<&Symbol> = candidates.into_iter().map( |s| self.canonical( s )).collect();

	let mut shares: FxHashMap<&Symbol, Count> = FxHashMap::default();
	for symbol in &symbols {
	    *shares.entry( *symbol ).or_insert( 0 ) += 1;
	}

	let scores = symbols.iter()
	    .map( |symbol| match probabilities.get( *symbol ) {
		Some( p ) => *p / shares[ symbol ] as f64,
		None => 0.0,
	    }).collect();
	Ok( scores )
    }

    fn canonical<'a>( &self, symbol: &'a Symbol ) -> &'a Symbol {
	if self.minor_values.contains( symbol ) { &MINOR } else { symbol }
    }
}

impl Loggable for CategoricalChain {
    fn log( &self, message: &str, level: tracing::Level ) {
	let direction = if self.train_backwards { "backward" } else { "forward" };
	emit( level, &format!(
	    "{message}: chain {} (order {}, {direction}) has {} contexts and {} minor values",
	    self.name, self.state_size, self.transitions.len(), self.minor_values.len() ));
    }
}

/// Joins the sequences into one list, with `state_size` breaks before, between and after them
fn pad_sequences<S: AsRef<[Symbol]>>( sequences: &[S], state_size: usize ) -> Vec<Symbol> {
    let total: usize = sequences.iter().map( |s| s.as_ref().len() + state_size ).sum();
    let mut flat: Vec<Symbol> = Vec::with_capacity( total + state_size );
    flat.extend( std::iter::repeat( Symbol::Break ).take( state_size ));
    for sequence in sequences {
	flat.extend( sequence.as_ref().iter().cloned() );
	flat.extend( std::iter::repeat( Symbol::Break ).take( state_size ));
    }
    flat
}

/// Collects the values occurring less often than the threshold. Breaks are never culled.
/// A threshold below 1 is a share of all values, otherwise a count.
fn find_minor_values( flat: &[Symbol], threshold: f64 ) -> FxHashSet<Symbol> {
    let mut frequencies: FxHashMap<&Symbol, Count> = FxHashMap::default();
    for symbol in flat.iter().filter( |s| !s.is_break() ) {
	*frequencies.entry( symbol ).or_insert( 0 ) += 1;
    }
    let total: Count = frequencies.values().sum();
    if total == 0 {
	return FxHashSet::default();
    }

    frequencies.into_iter()
	.filter( |(_, count)| {
	    if threshold < 1.0 {
		( *count as f64 / total as f64 ) < threshold
	    } else {
		( *count as f64 ) < threshold
	    }
	})
	.map( |(symbol, _)| symbol.clone() )
	.collect()
}

/// Counts how often each symbol follows each window of `state_size` symbols
fn count_transitions( flat: &[Symbol], state_size: usize ) -> FxHashMap<Context, FxHashMap<Symbol, Count>> {
    let mut lookup: FxHashMap<Context, FxHashMap<Symbol, Count>> = FxHashMap::default();
    for window in flat.windows( state_size + 1 ) {
	let (context, outcome) = window.split_at( state_size );
	let outcome = &outcome[0];
	match lookup.get_mut( context ) {
	    Some( counts ) => { *counts.entry( outcome.clone() ).or_insert( 0 ) += 1; },
	    None => {
		let mut counts = FxHashMap::default();
		counts.insert( outcome.clone(), 1 );
		lookup.insert( context.to_vec(), counts );
	    }
	}
    }
    lookup
}

fn counts_to_probabilities( counts: FxHashMap<Symbol, Count> ) -> Distribution {
    let total: Count = counts.values().sum();
    counts.into_iter()
	.map( |(symbol, count)| (symbol, count as f64 / total as f64) )
	.collect()
}
