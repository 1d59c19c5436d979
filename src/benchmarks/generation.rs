use std::sync::Arc;
use std::time::*;

use tracing::{info, debug};
use tracing_subscriber;

use rand::prelude::*;
use rand::rngs::StdRng;
use statrs::distribution::DiscreteUniform;

use progchain::*;

const WORK_TYPES: [&str; 5] = ["overture", "concerto", "symphony", "suite", "tone poem"];
const SOLOISTS: [&str; 4] = ["none", "piano", "violin", "cello"];
const ERAS: [&str; 4] = ["baroque", "classical", "romantic", "modern"];

fn main() -> Result<()> {
    prepare_logging();

    let number_concerts = 2000;
    let table = synthetic_table( number_concerts, 7 )?;
    info!( "Synthetic corpus: {} rows in {} concerts", table.len(), table.number_sequences() );

    for state_size in 1 ..= 3 {
	benchmark_generation( &table, state_size, 200 )?;
    }
    Ok( () )
}

fn benchmark_generation( table: &TrainingTable, state_size: usize, number_programs: usize ) -> Result<()> {
    let base = ChainConfig { state_size, ..Default::default() };
    let config = EnsembleConfig::new( base, true );

    let start = Instant::now();
    let ensemble = ChainEnsemble::fit( table.clone(), &config )?;
    info!( "state size {state_size}: fitting took {}ms", start.elapsed().as_millis() );

    let generator = ProgramGenerator::new( Arc::new( ensemble ))?;
    let options = GenerationOptions::new( [("work_type", 2.0), ("soloist", 1.0), ("era", 1.0)] )
	.with_seed( 17 );

    let start = Instant::now();
    let programs = generator.generate_batch( &options, number_programs );
    let time_spent = start.elapsed();

    let failures = programs.iter().filter( |p| p.is_err() ).count();
    let lengths: Vec<usize> = programs.iter().filter_map( |p| p.as_ref().ok() ).map( |p| p.len() ).collect();
    let mean_length = lengths.iter().sum::<usize>() as f64 / lengths.len().max( 1 ) as f64;
    info!( "state size {state_size}: {number_programs} programs took {}ms, {failures} failed, mean length {mean_length:.2}",
	   time_spent.as_millis() );
    Ok( () )
}

/// Concerts are an opening piece, a middle block, an optional intermission and a closing symphony.
fn synthetic_table( number_concerts: u64, seed: u64 ) -> Result<TrainingTable> {
    let mut gen = StdRng::seed_from_u64( seed );
    let middle_length = DiscreteUniform::new( 1, 3 ).map_err( |e| ChainError::InvalidConfig( e.to_string() ))?;
    let pick_type = DiscreteUniform::new( 0, WORK_TYPES.len() as i64 - 1 ).map_err( |e| ChainError::InvalidConfig( e.to_string() ))?;
    let pick_soloist = DiscreteUniform::new( 0, SOLOISTS.len() as i64 - 1 ).map_err( |e| ChainError::InvalidConfig( e.to_string() ))?;
    let pick_era = DiscreteUniform::new( 0, ERAS.len() as i64 - 1 ).map_err( |e| ChainError::InvalidConfig( e.to_string() ))?;

    let mut table = TrainingTable::new( ["work_type", "soloist", "era"] );
    for concert in 0 .. number_concerts {
	let mut program: Vec<[&str; 3]> = vec![ ["overture", "none", ERAS[pick_era.sample( &mut gen ) as usize]] ];
	let length = middle_length.sample( &mut gen ) as usize;
	for _ in 0 .. length {
	    let work_type = WORK_TYPES[pick_type.sample( &mut gen ) as usize];
	    let soloist = if work_type == "concerto" { SOLOISTS[pick_soloist.sample( &mut gen ) as usize] } else { "none" };
	    program.push( [work_type, soloist, ERAS[pick_era.sample( &mut gen ) as usize]] );
	}
	if gen.gen_bool( 0.7 ) {
	    program.push( [INTERMISSION, INTERMISSION, INTERMISSION] );
	}
	program.push( ["symphony", "none", ERAS[pick_era.sample( &mut gen ) as usize]] );

	debug!( "concert {concert}: {program:?}" );
	for (position, values) in program.iter().enumerate() {
	    // a few hundred distinct works, popular ones are repeated
	    let selection = 1 + ( concert * 7 + position as u64 * 13 ) % 400;
	    let weight = 1.0 + ( selection % 10 ) as f64;
	    table.push( concert, selection, weight, values.iter().map( |v| v.to_string() ).collect() )?;
	}
    }
    Ok( table )
}

fn prepare_logging() {
    let tracer = tracing_subscriber::fmt::fmt()
        .with_max_level( tracing_subscriber::filter::LevelFilter::INFO )
        .finish();
    if tracing::subscriber::set_global_default( tracer ).is_err() {
	eprintln!( "logging was already initialized" );
    }
}
