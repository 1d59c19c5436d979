use std::sync::Arc;

use clap::{Parser, Subcommand, Args};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;

use progchain::*;
use progchain::io::{self, PrettyFormatter};
use progchain::model::ChainFormatter;

#[derive( Parser )]
#[command( name = "progchain", about = "Learn how concert programs are ordered and sample new ones" )]
struct Cli {
    /// more output per occurrence
    #[arg( short, long, action = clap::ArgAction::Count, global = true )]
    verbose: u8,
    #[command( subcommand )]
    command: Command,
}

#[derive( Subcommand )]
enum Command {
    /// Fit an ensemble to a training export and store it
    Train( TrainArgs ),
    /// Sample programs from a stored ensemble
    Generate( GenerateArgs ),
    /// Print the transitions of one chain
    Inspect( InspectArgs ),
}

#[derive( Args )]
struct TrainArgs {
    /// plain text, tab separated export with concert_id, selection_id, weight and feature columns;
    /// `-` reads stdin, e.g. `zcat train_export.txt.gz | progchain train --data -`
    #[arg( long )]
    data: String,
    /// JSON ensemble configuration
    #[arg( long )]
    config: Option<String>,
    #[arg( long )]
    output: String,
    /// overrides the base Markov order
    #[arg( long )]
    state_size: Option<usize>,
    /// overrides the base cull threshold
    #[arg( long )]
    cull_threshold: Option<f64>,
    /// fit in program order instead of reversed
    #[arg( long )]
    forward: bool,
}

#[derive( Args )]
struct GenerateArgs {
    #[arg( long )]
    model: String,
    /// JSON generation options
    #[arg( long )]
    options: Option<String>,
    /// feature=weight, repeatable
    #[arg( long = "weight", value_parser = parse_weight )]
    weights: Vec<(String, f64)>,
    #[arg( long )]
    break_weight: Option<f64>,
    #[arg( long )]
    weighted_average_exponent: Option<f64>,
    #[arg( long )]
    case_weight_exponent: Option<f64>,
    /// simple_weighted_avg, sum_weighted_log_odds or rescaled_power_weight
    #[arg( long )]
    summary: Option<SummaryFunction>,
    #[arg( long )]
    seed: Option<u64>,
    #[arg( long )]
    attempts: Option<usize>,
    /// number of programs
    #[arg( long, default_value_t = 1 )]
    count: usize,
}

#[derive( Args )]
struct InspectArgs {
    #[arg( long )]
    model: String,
    #[arg( long )]
    feature: String,
    /// outcomes listed per context
    #[arg( long, default_value_t = 5 )]
    top: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    prepare_logging( cli.verbose );

    match cli.command {
	Command::Train( args ) => train( args ),
	Command::Generate( args ) => generate( args ),
	Command::Inspect( args ) => inspect( args ),
    }
}

fn train( args: TrainArgs ) -> Result<()> {
    let mut config: EnsembleConfig = match &args.config {
	Some( path ) => io::read_model( path )?,
	None => EnsembleConfig::default(),
    };
    if let Some( state_size ) = args.state_size {
	config.base.state_size = state_size;
    }
    if let Some( threshold ) = args.cull_threshold {
	config.base.cull_threshold = threshold;
    }
    if args.forward {
	config.train_backwards = false;
    }

    let table = io::read_training_table( &args.data )?;
    let ensemble = ChainEnsemble::fit( table, &config )?;
    io::write_model( &ensemble, &args.output )?;
    info!( "wrote ensemble of {} chains to {}", ensemble.len(), args.output );
    Ok( () )
}

fn generate( args: GenerateArgs ) -> Result<()> {
    let ensemble: ChainEnsemble = io::read_model( &args.model )?;
    let mut options: GenerationOptions = match &args.options {
	Some( path ) => io::read_model( path )?,
	None => GenerationOptions::default(),
    };
    options.feature_weights.extend( args.weights );
    if options.feature_weights.is_empty() {
	// every feature counts the same
	options.feature_weights = ensemble.iterate_features().map( |f| (f.to_string(), 1.0) ).collect();
    }
    if let Some( w ) = args.break_weight { options.break_weight = w; }
    if let Some( e ) = args.weighted_average_exponent { options.weighted_average_exponent = e; }
    if let Some( e ) = args.case_weight_exponent { options.case_weight_exponent = e; }
    if let Some( s ) = args.summary { options.summary = s; }
    if let Some( s ) = args.seed { options.random_seed = Some( s ); }
    if let Some( a ) = args.attempts { options.max_attempts = a; }

    let generator = ProgramGenerator::new( Arc::new( ensemble ))?;
    for program in generator.generate_batch( &options, args.count ) {
	println!( "{}", serde_json::to_string( &program? )? );
    }
    Ok( () )
}

fn inspect( args: InspectArgs ) -> Result<()> {
    let ensemble: ChainEnsemble = io::read_model( &args.model )?;
    let chain = ensemble.chain( &args.feature ).ok_or_else( || ChainError::UnknownFeature( args.feature.clone() ))?;
    let mut formatter = ChainFormatter::new( args.top );
    formatter.show_minor();
    println!( "{}", formatter.format_pretty( chain ));
    Ok( () )
}

fn parse_weight( text: &str ) -> std::result::Result<(String, f64), String> {
    let (feature, weight) = text.split_once( '=' ).ok_or_else( || format!( "expected feature=weight, got '{text}'" ))?;
    let weight: f64 = weight.parse().map_err( |_| format!( "bad weight '{weight}'" ))?;
    Ok( (feature.to_string(), weight) )
}

fn prepare_logging( verbose: u8 ) {
    let level = match verbose {
	0 => LevelFilter::INFO,
	1 => LevelFilter::DEBUG,
	_ => LevelFilter::TRACE,
    };
    let tracer = tracing_subscriber::fmt::fmt()
	.with_max_level( level )
	.with_writer( std::io::stderr )
	.finish();
    if tracing::subscriber::set_global_default( tracer ).is_err() {
	eprintln!( "logging was already initialized" );
    }
}
