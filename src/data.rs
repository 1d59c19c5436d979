
use std::fmt;
use std::collections::BTreeMap;

use rustc_hash::FxHashSet;
use serde::{Serialize, Deserialize};

use crate::*;

pub type SequenceId = u64;
pub type ItemId = u64;
pub type Count = u64;

/// Raw value marking the intermission row of the training data
pub const INTERMISSION: &str = "___INTERMISSION__";

const BREAK_LABEL: &str = "___BREAK__";
const MINOR_LABEL: &str = "___MINOR__";

/// A categorical value as seen by a chain.
#[derive( Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize )]
pub enum Symbol {
    /// synthetic marker delimiting sequences
    Break,
    /// stands in for every culled value
    Minor,
    Value( String ),
}

impl Symbol {
    pub fn value<S: Into<String>>( raw: S ) -> Symbol {
	Symbol::Value( raw.into() )
    }

    pub fn is_break( &self ) -> bool {
	matches!( self, Symbol::Break )
    }
}

impl From<&str> for Symbol {
    fn from( raw: &str ) -> Self {
	Symbol::Value( raw.to_string() )
    }
}

impl fmt::Display for Symbol {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
	match self {
	    Symbol::Break => write!( f, "{BREAK_LABEL}" ),
	    Symbol::Minor => write!( f, "{MINOR_LABEL}" ),
	    Symbol::Value( raw ) => write!( f, "{raw}" ),
	}
    }
}

/// Formats a context tuple for messages, e.g. `(a, ___BREAK__)`
pub fn format_context( context: &[Symbol] ) -> String {
    let labels: Vec<String> = context.iter().map( |s| s.to_string() ).collect();
    format!( "({})", labels.join( ", " ))
}

/// One performed item of one sequence.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
pub struct TrainingRow {
    pub sequence_id: SequenceId,
    pub item_id: ItemId,
    /// popularity of the item, e.g. how often it was performed
    pub weight: f64,
    /// raw feature values in column order
    pub values: Vec<String>,
}

/// Wide table keyed by (sequence, item) with one column per categorical feature.
/// Rows of a sequence are kept in the order they were added.
#[derive( Debug, Clone, Default, Serialize, Deserialize )]
pub struct TrainingTable {
    columns: Vec<String>,
    rows: Vec<TrainingRow>,
}

impl TrainingTable {

    pub fn new<I, S>( columns: I ) -> TrainingTable where
	I: IntoIterator<Item = S>,
	S: Into<String>,
    {
	TrainingTable {
	    columns: columns.into_iter().map( |c| c.into() ).collect(),
	    rows: Vec::new(),
	}
    }

    /// Appends a row. Fails if the row does not fit the columns or the weight is not a non-negative number.
    pub fn push( &mut self, sequence_id: SequenceId, item_id: ItemId, weight: f64, values: Vec<String> ) -> Result<()> {
	if values.len() != self.columns.len() {
	    return Err( ChainError::InvalidConfig( format!(
		"row for item {item_id} has {} values, table has {} columns", values.len(), self.columns.len() )));
	}
	if !weight.is_finite() || weight < 0.0 {
	    return Err( ChainError::InvalidConfig( format!( "weight of item {item_id} must be >= 0, got {weight}" )));
	}
	self.rows.push( TrainingRow { sequence_id, item_id, weight, values } );
	Ok( () )
    }

    pub fn columns( &self ) -> &[String] {
	&self.columns
    }

    pub fn rows( &self ) -> &[TrainingRow] {
	&self.rows
    }

    pub fn len( &self ) -> usize {
	self.rows.len()
    }

    pub fn is_empty( &self ) -> bool {
	self.rows.is_empty()
    }

    pub fn column_index( &self, name: &str ) -> Option<usize> {
	self.columns.iter().position( |c| c == name )
    }

    /// Projects one column into one symbol sequence per sequence id, ordered by sequence id.
    pub fn project( &self, column: usize ) -> Vec<Vec<Symbol>> {
	let mut sequences: BTreeMap<SequenceId, Vec<Symbol>> = BTreeMap::new();
	for row in &self.rows {
	    sequences.entry( row.sequence_id )
		.or_default()
		.push( Symbol::value( row.values[ column ].as_str() ));
	}
	sequences.into_values().collect()
    }

    /// Returns one row per distinct item. The first occurrence of an item wins.
    pub fn collapse( &self ) -> Vec<&TrainingRow> {
	let mut seen: FxHashSet<ItemId> = FxHashSet::default();
	self.rows.iter()
	    .filter( |row| seen.insert( row.item_id ))
	    .collect()
    }

    pub fn number_sequences( &self ) -> usize {
	let sequences: FxHashSet<SequenceId> = self.rows.iter().map( |row| row.sequence_id ).collect();
	sequences.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn strings( values: &[&str] ) -> Vec<String> {
	values.iter().map( |v| v.to_string() ).collect()
    }

    fn sample_table() -> TrainingTable {
	let mut table = TrainingTable::new( ["work_type", "composer_country"] );
	table.push( 2, 10, 3.0, strings( &["overture", "DE"] )).unwrap();
	table.push( 1, 11, 1.0, strings( &["concerto", "AT"] )).unwrap();
	table.push( 2, 12, 5.0, strings( &["symphony", "AT"] )).unwrap();
	table.push( 1, 10, 9.0, strings( &["suite", "FR"] )).unwrap();
	table
    }

    #[test]
    /// Sequences come out ordered by id, items in insertion order
    fn test_project() {
	let table = sample_table();
	let column = table.column_index( "work_type" ).unwrap();
	let projected = table.project( column );
	assert_eq!( projected, vec!(
	    vec!( Symbol::from( "concerto" ), Symbol::from( "suite" )),
	    vec!( Symbol::from( "overture" ), Symbol::from( "symphony" )),
	));
	assert_eq!( table.number_sequences(), 2 );
    }

    #[test]
    fn test_collapse_first_seen_wins() {
	let table = sample_table();
	let collapsed = table.collapse();
	let ids: Vec<ItemId> = collapsed.iter().map( |row| row.item_id ).collect();
	assert_eq!( ids, vec!( 10, 11, 12 ));
	assert_eq!( collapsed[0].weight, 3.0 );
	assert_eq!( collapsed[0].values[0], "overture" );
    }

    #[test]
    fn test_push_rejects_bad_rows() {
	let mut table = TrainingTable::new( ["work_type"] );
	assert!( table.push( 1, 1, 1.0, strings( &["a", "b"] )).is_err() );
	assert!( table.push( 1, 1, -1.0, strings( &["a"] )).is_err() );
	assert!( table.push( 1, 1, f64::NAN, strings( &["a"] )).is_err() );
	assert!( table.is_empty() );
    }

    #[test]
    fn test_symbol_display() {
	assert_eq!( Symbol::Break.to_string(), "___BREAK__" );
	assert_eq!( Symbol::Minor.to_string(), "___MINOR__" );
	assert_eq!( format_context( &[Symbol::from( "a" ), Symbol::Break] ), "(a, ___BREAK__)" );
    }
}
