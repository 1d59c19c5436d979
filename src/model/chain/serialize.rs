
use serde::{Serialize, Deserialize};

use crate::*;
use crate::data::format_context;
use crate::io::PrettyFormatter;

use super::{CategoricalChain, Distribution};

/// Flat form of a chain. Context tuples cannot be JSON keys, so transitions are listed.
#[derive( Debug, Serialize, Deserialize )]
pub struct ChainRecord {
    name: String,
    state_size: usize,
    train_backwards: bool,
    minor_values: Vec<Symbol>,
    transitions: Vec<TransitionRecord>,
}

#[derive( Debug, Serialize, Deserialize )]
struct TransitionRecord {
    context: Vec<Symbol>,
    outcomes: Vec<(Symbol, f64)>,
}

impl From<CategoricalChain> for ChainRecord {
    fn from( chain: CategoricalChain ) -> Self {
	let mut minor_values: Vec<Symbol> = chain.minor_values.into_iter().collect();
	minor_values.sort();
	let mut transitions: Vec<TransitionRecord> = chain.transitions.into_iter()
	    .map( |(context, distribution)| {
		let mut outcomes: Vec<(Symbol, f64)> = distribution.into_iter().collect();
		outcomes.sort_by( |left, right| left.0.cmp( &right.0 ));
		TransitionRecord { context, outcomes }
	    }).collect();
	// stable output for diffing model files
	transitions.sort_by( |left, right| left.context.cmp( &right.context ));
	ChainRecord {
	    name: chain.name,
	    state_size: chain.state_size,
	    train_backwards: chain.train_backwards,
	    minor_values,
	    transitions,
	}
    }
}

impl From<ChainRecord> for CategoricalChain {
    fn from( record: ChainRecord ) -> Self {
	CategoricalChain {
	    name: record.name,
	    state_size: record.state_size,
	    train_backwards: record.train_backwards,
	    minor_values: record.minor_values.into_iter().collect(),
	    transitions: record.transitions.into_iter()
		.map( |t| (t.context, t.outcomes.into_iter().collect::<Distribution>()) )
		.collect(),
	}
    }
}

/// Renders a chain's minor values and its most likely transitions
pub struct ChainFormatter {
    show_minor: bool,
    top_outcomes: usize,
}

impl PrettyFormatter<CategoricalChain> for ChainFormatter {

    fn format_pretty( &self, chain: &CategoricalChain ) -> String {
	let mut output = String::new();
	output.push( '\n' ); // so output begins on a new line
	output.push_str( &format!( "{} (order {}, {} contexts)\n", chain.name, chain.state_size, chain.transitions.len() ));

	if self.show_minor {
	    let mut minor: Vec<String> = chain.minor_values.iter().map( |s| s.to_string() ).collect();
	    minor.sort();
	    output = join_lines( output, format!( "minor: {}", minor.join( " | " )));
	}

	let mut contexts: Vec<&Vec<Symbol>> = chain.transitions.keys().collect();
	contexts.sort();
	for context in contexts {
	    let distribution = &chain.transitions[ context ];
	    let mut outcomes: Vec<(&Symbol, &f64)> = distribution.iter().collect();
	    outcomes.sort_by( |left, right| right.1.total_cmp( left.1 ).then_with( || left.0.cmp( right.0 )));
	    let listed: Vec<String> = outcomes.iter()
		.take( self.top_outcomes )
		.map( |(symbol, p)| format!( "{symbol} {p:.3}" ))
		.collect();
	    output = join_lines( output, format!( "{} -> {}", format_context( context ), listed.join( ", " )));
	}
	output
    }
}

fn join_lines( mut accumulator: String, addition: String ) -> String {
    accumulator.push_str( addition.as_str() );
    accumulator.push( '\n' );
    accumulator
}

impl ChainFormatter {
    pub fn new( top_outcomes: usize ) -> ChainFormatter {
	ChainFormatter {
	    show_minor: false,
	    top_outcomes,
	}
    }

    pub fn show_minor( &mut self ) { self.show_minor = true; }
}
