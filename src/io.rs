use std::path::{Path, PathBuf};
use std::fs::File;
use std::io::{BufReader, BufRead, BufWriter, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::*;

/// Column holding the sequence (concert) identifier
pub const SEQUENCE_COLUMN: &str = "concert_id";
/// Column holding the item (selection) identifier
pub const ITEM_COLUMN: &str = "selection_id";
pub const WEIGHT_COLUMN: &str = "weight";
/// Path that reads the training export from stdin
pub const STDIN_PATH: &str = "-";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Converts a structure into a string
pub trait PrettyFormatter<T> {
    fn format_pretty( &self, object: &T ) -> String;
}

/// Reads a tab separated training export into a table.
/// Every column besides the sequence, item and weight columns becomes a feature column.
/// The export must be plain text; `-` reads from stdin, so a compressed export can be piped through `zcat`.
pub fn read_training_table( path: &str ) -> Result<TrainingTable> {
    let table = if path == STDIN_PATH {
	parse_training_table( std::io::stdin().lock() )?
    } else {
	let file = File::open( Path::new( path ) ).map_err( |e| ChainError::io( e, Some( PathBuf::from( path ))))?;
	parse_training_table( BufReader::new( file ))?
    };
    info!( "read {} rows in {} sequences from {path}", table.len(), table.number_sequences() );
    Ok( table )
}

pub fn parse_training_table<R: BufRead>( mut reader: R ) -> Result<TrainingTable> {
    if reader.fill_buf().map_err( |e| ChainError::io( e, None ))?.starts_with( &GZIP_MAGIC ) {
	return Err( ChainError::Parse { line: 1, message: "input is gzip compressed, decompress it first (e.g. zcat export.txt.gz | progchain train --data -)".into() } );
    }
    let mut lines = reader.lines().enumerate();
    let header = match lines.next() {
	Some( (_, line) ) => line.map_err( |e| ChainError::io( e, None ))?,
	None => return Err( ChainError::Parse { line: 1, message: "missing header".into() } ),
    };
    let header: Vec<&str> = header.trim_end_matches( '\r' ).split( '\t' ).collect();

    let locate = |name: &str| header.iter().position( |c| *c == name ).ok_or_else( || ChainError::MissingColumn( name.to_string() ));
    let sequence_index = locate( SEQUENCE_COLUMN )?;
    let item_index = locate( ITEM_COLUMN )?;
    let weight_index = locate( WEIGHT_COLUMN )?;
    let feature_indices: Vec<usize> = ( 0 .. header.len() )
	.filter( |i| *i != sequence_index && *i != item_index && *i != weight_index )
	.collect();

    let mut table = TrainingTable::new( feature_indices.iter().map( |i| header[ *i ] ));
    for (index, line) in lines {
	let line_number = index + 1;
	let line = line.map_err( |e| ChainError::io( e, None ))?;
	let line = line.trim_end_matches( '\r' );
	if line.is_empty() {
	    continue;
	}
	let fields: Vec<&str> = line.split( '\t' ).collect();
	if fields.len() != header.len() {
	    return Err( ChainError::Parse { line: line_number, message: format!( "expected {} fields, found {}", header.len(), fields.len() ) } );
	}

	let parse_error = |message: String| ChainError::Parse { line: line_number, message };
	let sequence_id: SequenceId = fields[ sequence_index ].parse()
	    .map_err( |_| parse_error( format!( "bad {SEQUENCE_COLUMN} '{}'", fields[ sequence_index ] )))?;
	let item_id: ItemId = fields[ item_index ].parse()
	    .map_err( |_| parse_error( format!( "bad {ITEM_COLUMN} '{}'", fields[ item_index ] )))?;
	let weight: f64 = fields[ weight_index ].parse()
	    .map_err( |_| parse_error( format!( "bad {WEIGHT_COLUMN} '{}'", fields[ weight_index ] )))?;
	let values: Vec<String> = feature_indices.iter().map( |i| fields[ *i ].to_string() ).collect();

	table.push( sequence_id, item_id, weight, values )
	    .map_err( |e| parse_error( e.to_string() ))?;
    }
    Ok( table )
}

/// Writes a serializeable model to a file
pub fn write_model<M: Serialize>( model: &M, path: &str ) -> Result<()> {
    let file = File::create( Path::new( path )).map_err( |e| ChainError::io( e, Some( PathBuf::from( path ))))?;
    let mut writer = BufWriter::new( file );
    serde_json::to_writer( &mut writer, model )?;
    writer.flush().map_err( |e| ChainError::io( e, Some( PathBuf::from( path ))))
}

/// Reads a model or configuration from a JSON file
pub fn read_model<M: DeserializeOwned>( path: &str ) -> Result<M> {
    let file = File::open( Path::new( path )).map_err( |e| ChainError::io( e, Some( PathBuf::from( path ))))?;
    let model = serde_json::from_reader( BufReader::new( file ))?;
    Ok( model )
}

#[cfg(test)]
mod test {
    use super::*;

    const EXPORT: &str = "concert_id\tselection_id\tweight\twork_type\tcomposer_country\n\
			  1\t10\t4\toverture\tDE\n\
			  1\t4\t80\t___INTERMISSION__\t___INTERMISSION__\n\
			  1\t11\t2.5\tsymphony\tAT\n\
			  \n\
			  2\t12\t1\tconcerto\tRU\n";

    #[test]
    fn test_parse_export() {
	let table = parse_training_table( EXPORT.as_bytes() ).unwrap();
	assert_eq!( table.columns(), &["work_type".to_string(), "composer_country".to_string()] );
	assert_eq!( table.len(), 4 );
	assert_eq!( table.number_sequences(), 2 );
	let row = &table.rows()[2];
	assert_eq!( (row.sequence_id, row.item_id), (1, 11) );
	assert_eq!( row.weight, 2.5 );
	assert_eq!( row.values, vec!( "symphony".to_string(), "AT".to_string() ));
    }

    #[test]
    fn test_missing_weight_column() {
	let text = "concert_id\tselection_id\twork_type\n1\t2\tsuite\n";
	let result = parse_training_table( text.as_bytes() );
	assert!( matches!( result, Err( ChainError::MissingColumn( ref c ) ) if c == "weight" ));
    }

    #[test]
    fn test_parse_errors_name_line() {
	let text = "concert_id\tselection_id\tweight\twork_type\n1\t2\t1\tsuite\nx\t3\t1\tmarch\n";
	match parse_training_table( text.as_bytes() ) {
	    Err( ChainError::Parse { line, .. } ) => assert_eq!( line, 3 ),
	    other => panic!( "expected parse error, got {other:?}" ),
	}
	let text = "concert_id\tselection_id\tweight\twork_type\n1\t2\t1\n";
	assert!( matches!( parse_training_table( text.as_bytes() ), Err( ChainError::Parse { line: 2, .. } )));
	assert!( parse_training_table( "".as_bytes() ).is_err() );
    }

    #[test]
    /// Compressed exports are refused with a hint instead of a decoding error
    fn test_gzip_export_is_named() {
	let compressed: &[u8] = &[0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff];
	match parse_training_table( compressed ) {
	    Err( ChainError::Parse { line, message } ) => {
		assert_eq!( line, 1 );
		assert!( message.contains( "gzip" ));
	    },
	    other => panic!( "expected parse error, got {other:?}" ),
	}
    }
}
