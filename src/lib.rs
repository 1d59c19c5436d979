
#[cfg(test)]
macro_rules! assert_approx {
    ($real:expr, $expected:expr, $delta:expr) => {
	if $real < $expected - $delta || $real > $expected + $delta {
	    panic!( "Violate {:.4} == {:.4} (+-{:.4})", $real, $expected, $delta );
	}
    }
}

pub mod error;
pub mod data;
pub mod model;
pub mod summary;
pub mod session;
pub mod generator;
pub mod io;

use tracing::*;

pub use error::{ChainError, Result};
pub use data::{Symbol, SequenceId, ItemId, TrainingTable, TrainingRow, INTERMISSION};
pub use model::{CategoricalChain, ChainEnsemble, ChainConfig, ChainOverride, EnsembleConfig};
pub use summary::SummaryFunction;
pub use session::{SessionTemplate, GenerationSession, Draw};
pub use generator::{ProgramGenerator, GenerationOptions};

/// Objects that can be recorded in the log
pub trait Loggable {
    fn log( &self, message: &str, level: tracing::Level );
}

/// Emits a message at a level only known at runtime
pub(crate) fn emit( level: Level, message: &str ) {
    match level {
	Level::ERROR => error!( "{message}" ),
	Level::WARN => warn!( "{message}" ),
	Level::INFO => info!( "{message}" ),
	Level::DEBUG => debug!( "{message}" ),
	_ => trace!( "{message}" ),
    }
}
