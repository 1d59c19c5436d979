
use std::collections::BTreeMap;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Serialize, Deserialize};

use crate::*;

#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
/// Knobs of one generation.
pub struct GenerationOptions {
    /// relative influence per feature, 0 disables a feature
    pub feature_weights: BTreeMap<String, f64>,
    /// above 1 sharpens the combined score toward the mode, below 1 flattens it
    pub weighted_average_exponent: f64,
    /// above 1 sharpens the popularity weights, below 1 flattens them
    pub case_weight_exponent: f64,
    /// weight of the break row and the intermission row
    pub break_weight: f64,
    pub summary: SummaryFunction,
    pub random_seed: Option<u64>,
    /// restarts allowed when the candidate pool runs dry
    pub max_attempts: usize,
}

impl Default for GenerationOptions {
    fn default() -> Self {
	GenerationOptions {
	    feature_weights: BTreeMap::new(),
	    weighted_average_exponent: 1.0,
	    case_weight_exponent: 1.0,
	    break_weight: 1.0,
	    summary: SummaryFunction::default(),
	    random_seed: None,
	    max_attempts: 3,
	}
    }
}

impl GenerationOptions {

    pub fn new<I, S>( feature_weights: I ) -> GenerationOptions where
	I: IntoIterator<Item = (S, f64)>,
	S: Into<String>,
    {
	GenerationOptions {
	    feature_weights: feature_weights.into_iter().map( |(f, w)| (f.into(), w) ).collect(),
	    ..Default::default()
	}
    }

    pub fn with_seed( mut self, seed: u64 ) -> GenerationOptions {
	self.random_seed = Some( seed );
	self
    }

    pub fn validate( &self ) -> Result<()> {
	if let Some( (feature, weight) ) = self.feature_weights.iter().find( |(_, w)| w.is_infinite() || w.is_nan() ) {
	    return Err( ChainError::InvalidConfig( format!( "weight of {feature} must be finite, got {weight}" )));
	}
	if !self.weighted_average_exponent.is_finite() || !self.case_weight_exponent.is_finite() {
	    return Err( ChainError::InvalidConfig( "exponents must be finite".into() ));
	}
	if self.max_attempts == 0 {
	    return Err( ChainError::InvalidConfig( "max_attempts should be >= 1".into() ));
	}
	Ok( () )
    }
}

/// Samples whole programs from a trained ensemble.
/// The ensemble and the candidate pool are shared; every generation gets a fresh session.
pub struct ProgramGenerator {
    template: Arc<SessionTemplate>,
}

impl ProgramGenerator {

    pub fn new( ensemble: Arc<ChainEnsemble> ) -> Result<ProgramGenerator> {
	let template = SessionTemplate::new( ensemble )?;
	Ok( ProgramGenerator { template: Arc::new( template ) } )
    }

    pub fn ensemble( &self ) -> &ChainEnsemble {
	self.template.ensemble()
    }

    /// A clean session for stepping through a generation by hand
    pub fn session( &self, break_weight: f64 ) -> Result<GenerationSession> {
	GenerationSession::new( self.template.clone(), break_weight )
    }

    /// Generates one program in performance order. Reproducible when a seed is given.
    pub fn generate( &self, options: &GenerationOptions ) -> Result<Vec<ItemId>> {
	let mut rng = match options.random_seed {
	    Some( seed ) => StdRng::seed_from_u64( seed ),
	    None => StdRng::from_entropy(),
	};
	self.generate_with_rng( options, &mut rng )
    }

    /// Generates one program, restarting from scratch up to `max_attempts` times when the pool runs dry.
    /// Retries keep drawing from the same random stream.
    pub fn generate_with_rng<R: Rng + ?Sized>( &self, options: &GenerationOptions, rng: &mut R ) -> Result<Vec<ItemId>> {
	options.validate()?;
	let mut attempt = 0;
	loop {
	    attempt += 1;
	    let _span = info_span!( "generate", attempt ).entered();
	    match self.attempt( options, rng ) {
		Ok( program ) => {
		    debug!( "generated {} items", program.len() );
		    return Ok( program );
		},
		Err( err ) if err.is_retryable() && attempt < options.max_attempts => {
		    warn!( "attempt {attempt} of {} failed: {err}", options.max_attempts );
		},
		Err( err ) => return Err( err ),
	    }
	}
    }

    /// Generates `count` independent programs in parallel. Program i uses seed `random_seed + i`.
    pub fn generate_batch( &self, options: &GenerationOptions, count: usize ) -> Vec<Result<Vec<ItemId>>> {
	( 0 .. count ).into_par_iter()
	    .map( |i| {
		let mut local = options.clone();
		local.random_seed = options.random_seed.map( |seed| seed.wrapping_add( i as u64 ));
		self.generate( &local )
	    })
	    .collect()
    }

    fn attempt<R: Rng + ?Sized>( &self, options: &GenerationOptions, rng: &mut R ) -> Result<Vec<ItemId>> {
	let mut session = GenerationSession::new( self.template.clone(), options.break_weight )?;
	let mut program: Vec<ItemId> = Vec::new();

	// every step removes a candidate, so the break row comes up within the pool size
	for _ in 0 .. self.template.len() {
	    match session.step( options, rng )? {
		Draw::Item( item ) => program.push( item ),
		Draw::Break => {
		    session.log( "reached break", Level::TRACE );
		    // a backward model generates from the end toward the start
		    if self.ensemble().train_backwards() {
			program.reverse();
		    }
		    return Ok( program );
		},
	    }
	}
	Err( ChainError::ExhaustedCandidates { step: session.steps() } )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rustc_hash::FxHashSet;
    use crate::model::ChainOverride;

    fn concerts() -> TrainingTable {
	let mut table = TrainingTable::new( ["work_type", "soloist_type"] );
	let rows: [(SequenceId, ItemId, f64, &str, &str); 8] = [
	    (1, 10, 5.0, "overture", "none"),
	    (1, 11, 2.0, "concerto", "piano"),
	    (1, 4, 50.0, INTERMISSION, INTERMISSION),
	    (1, 12, 7.0, "symphony", "none"),
	    (2, 13, 1.0, "overture", "none"),
	    (2, 11, 2.0, "concerto", "piano"),
	    (2, 4, 50.0, INTERMISSION, INTERMISSION),
	    (2, 14, 3.0, "symphony", "none"),
	];
	for (concert, selection, weight, work_type, soloist) in rows {
	    table.push( concert, selection, weight, vec!( work_type.to_string(), soloist.to_string() )).unwrap();
	}
	table
    }

    fn generator( table: TrainingTable, train_backwards: bool ) -> ProgramGenerator {
	let config = EnsembleConfig::new( ChainConfig { state_size: 1, cull: false, cull_threshold: 0.0 }, train_backwards )
	    .with_chain( "work_type", ChainOverride { state_size: Some( 2 ), ..Default::default() } )
	    .with_chain( "soloist_type", ChainOverride::default() );
	let ensemble = ChainEnsemble::fit( table, &config ).unwrap();
	ProgramGenerator::new( Arc::new( ensemble )).unwrap()
    }

    fn single_feature( rows: &[(ItemId, f64, &str)], train_backwards: bool ) -> ProgramGenerator {
	let mut table = TrainingTable::new( ["work_type"] );
	for (item, weight, work_type) in rows {
	    table.push( 1, *item, *weight, vec!( work_type.to_string() )).unwrap();
	}
	let config = EnsembleConfig::new( ChainConfig { state_size: 1, cull: false, cull_threshold: 0.0 }, train_backwards );
	ProgramGenerator::new( Arc::new( ChainEnsemble::fit( table, &config ).unwrap() )).unwrap()
    }

    fn options() -> GenerationOptions {
	GenerationOptions::new( [("work_type", 2.0), ("soloist_type", 1.0)] )
    }

    #[test]
    /// A backward model's output is flipped into performance order
    fn test_backward_program_order() {
	let generator = generator( concerts(), true );
	for seed in 0 .. 10 {
	    let program = generator.generate( &options().with_seed( seed )).unwrap();
	    assert_eq!( program.len(), 4 );
	    assert!( program[0] == 10 || program[0] == 13 );
	    assert_eq!( &program[1 .. 3], &[11, 4] );
	    assert!( program[3] == 12 || program[3] == 14 );
	}
    }

    #[test]
    fn test_forward_program_order() {
	let generator = single_feature( &[(1, 1.0, "a"), (2, 1.0, "b"), (3, 1.0, "c")], false );
	let program = generator.generate( &GenerationOptions::new( [("work_type", 1.0)] )).unwrap();
	assert_eq!( program, vec!( 1, 2, 3 ));
	let generator = single_feature( &[(1, 1.0, "a"), (2, 1.0, "b"), (3, 1.0, "c")], true );
	let program = generator.generate( &GenerationOptions::new( [("work_type", 1.0)] )).unwrap();
	assert_eq!( program, vec!( 1, 2, 3 ));
    }

    #[test]
    fn test_seed_determinism() {
	let generator = generator( concerts(), true );
	for seed in [1, 7, 42] {
	    let first = generator.generate( &options().with_seed( seed )).unwrap();
	    let second = generator.generate( &options().with_seed( seed )).unwrap();
	    assert_eq!( first, second );
	}
    }

    #[test]
    /// Programs only hold known items, once each, and end within the pool size
    fn test_end_to_end() {
	let table = concerts();
	let known: FxHashSet<ItemId> = table.rows().iter().map( |r| r.item_id ).collect();
	let generator = generator( table, true );
	for summary in SummaryFunction::ALL {
	    let mut opts = options().with_seed( 5 );
	    opts.summary = summary;
	    opts.case_weight_exponent = 0.8;
	    opts.break_weight = 60.0;
	    for result in generator.generate_batch( &opts, 16 ) {
		let program = result.unwrap();
		let distinct: FxHashSet<ItemId> = program.iter().copied().collect();
		assert_eq!( distinct.len(), program.len() );
		assert!( program.iter().all( |item| known.contains( item )));
		assert!( program.len() < known.len() + 1 );
	    }
	}
    }

    #[test]
    fn test_batch_matches_single_runs() {
	let generator = generator( concerts(), true );
	let opts = options().with_seed( 100 );
	let batch = generator.generate_batch( &opts, 4 );
	for (i, result) in batch.into_iter().enumerate() {
	    let single = generator.generate( &options().with_seed( 100 + i as u64 )).unwrap();
	    assert_eq!( result.unwrap(), single );
	}
    }

    #[test]
    /// Item 2 leads to a state only the already drawn item 1 can follow
    fn test_exhaustion_surfaces_after_retries() {
	let generator = single_feature( &[(1, 1.0, "x"), (2, 1.0, "y"), (1, 1.0, "x"), (3, 0.0, "z")], false );
	let mut opts = GenerationOptions::new( [("work_type", 1.0)] ).with_seed( 9 );
	opts.max_attempts = 3;
	let result = generator.generate( &opts );
	assert!( matches!( result, Err( ChainError::ExhaustedCandidates { step: 2 } )));
    }

    #[test]
    /// A failing generation runs its whole attempt budget, each attempt drawing from the same stream
    fn test_retries_use_whole_budget() {
	let generator = single_feature( &[(1, 1.0, "x"), (2, 1.0, "y"), (1, 1.0, "x"), (3, 0.0, "z")], false );
	let mut once = GenerationOptions::new( [("work_type", 1.0)] );
	once.max_attempts = 1;
	let mut thrice = once.clone();
	thrice.max_attempts = 3;

	let mut stepwise = StdRng::seed_from_u64( 5 );
	for _ in 0 .. 3 {
	    assert!( generator.generate_with_rng( &once, &mut stepwise ).is_err() );
	}
	let mut retried = StdRng::seed_from_u64( 5 );
	assert!( generator.generate_with_rng( &thrice, &mut retried ).is_err() );
	assert_eq!( stepwise.gen::<u64>(), retried.gen::<u64>() );

	// a single attempt leaves the stream at a different position
	let mut single = StdRng::seed_from_u64( 5 );
	assert!( generator.generate_with_rng( &once, &mut single ).is_err() );
	let mut reference = StdRng::seed_from_u64( 5 );
	assert!( generator.generate_with_rng( &thrice, &mut reference ).is_err() );
	assert_ne!( single.gen::<u64>(), reference.gen::<u64>() );
    }

    #[test]
    /// Half the attempts run dry, so a single attempt fails for some seeds while retries recover
    fn test_retry_recovers() {
	let generator = single_feature( &[(1, 1.0, "x"), (2, 1.0, "y"), (1, 1.0, "x"), (3, 1.0, "z")], false );
	let mut single = GenerationOptions::new( [("work_type", 1.0)] );
	single.max_attempts = 1;
	let failures = ( 0 .. 40 )
	    .filter( |seed| generator.generate( &single.clone().with_seed( *seed )).is_err() )
	    .count();
	assert!( failures > 0 );

	let mut patient = single.clone();
	patient.max_attempts = 30;
	for seed in 0 .. 40 {
	    assert_eq!( generator.generate( &patient.clone().with_seed( seed )).unwrap(), vec!( 1, 3 ));
	}
    }

    #[test]
    fn test_invalid_options() {
	let generator = generator( concerts(), true );
	let mut opts = options();
	opts.max_attempts = 0;
	assert!( matches!( generator.generate( &opts ), Err( ChainError::InvalidConfig( _ ))));
	let opts = GenerationOptions::new( [("work_type", f64::INFINITY)] );
	assert!( matches!( generator.generate( &opts ), Err( ChainError::InvalidConfig( _ ))));
	let mut opts = options();
	opts.break_weight = -3.0;
	assert!( matches!( generator.generate( &opts ), Err( ChainError::InvalidConfig( _ ))));
	// unknown features are not retried
	let opts = GenerationOptions::new( [("tempo", 1.0)] );
	assert!( matches!( generator.generate( &opts ), Err( ChainError::UnknownFeature( _ ))));
    }

    #[test]
    fn test_options_from_json() {
	let json = r#"{ "feature_weights": { "work_type": 2.0 }, "break_weight": 60, "summary": "simple_weighted_avg" }"#;
	let opts: GenerationOptions = serde_json::from_str( json ).unwrap();
	assert_eq!( opts.feature_weights["work_type"], 2.0 );
	assert_eq!( opts.break_weight, 60.0 );
	assert_eq!( opts.summary, SummaryFunction::SimpleWeightedAvg );
	assert_eq!( opts.max_attempts, 3 );
	assert_eq!( opts.case_weight_exponent, 1.0 );
    }
}
