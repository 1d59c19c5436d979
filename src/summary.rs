//! Ways to fold one candidate's per-feature scores into a single sampling score.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Deserialize};
use statrs::function::logistic::{logistic, logit};

use crate::*;

#[derive( Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize )]
#[serde( rename_all = "snake_case" )]
pub enum SummaryFunction {
    /// sum(p * w) / sum(w)
    SimpleWeightedAvg,
    /// weighted mean in log-odds space, mapped back to a probability
    SumWeightedLogOdds,
    /// (prod p^w)^(1 / sum(w))
    #[default]
    RescaledPowerWeight,
}

impl SummaryFunction {

    pub const ALL: [SummaryFunction; 3] = [
	SummaryFunction::SimpleWeightedAvg,
	SummaryFunction::SumWeightedLogOdds,
	SummaryFunction::RescaledPowerWeight,
    ];

    pub fn name( &self ) -> &'static str {
	match self {
	    SummaryFunction::SimpleWeightedAvg => "simple_weighted_avg",
	    SummaryFunction::SumWeightedLogOdds => "sum_weighted_log_odds",
	    SummaryFunction::RescaledPowerWeight => "rescaled_power_weight",
	}
    }

    /// Combines the scores of one candidate. Scores and weights are paired by position.
    /// Pre: the weights sum to a positive number
    pub fn combine( &self, scores: &[f64], weights: &[f64] ) -> f64 {
	debug_assert_eq!( scores.len(), weights.len() );
	let weight_sum: f64 = weights.iter().sum();
	let pairs = scores.iter().zip( weights.iter() );
	match self {
	    SummaryFunction::SimpleWeightedAvg => {
		pairs.map( |(p, w)| p * w ).sum::<f64>() / weight_sum
	    },
	    SummaryFunction::SumWeightedLogOdds => {
		let log_odds: f64 = pairs.map( |(p, w)| logit( p.clamp( 0.0, 1.0 )) * w ).sum();
		logistic( log_odds / weight_sum )
	    },
	    SummaryFunction::RescaledPowerWeight => {
		// geometric mean taken in log space
		let log_product: f64 = pairs.map( |(p, w)| p.ln() * w ).sum();
		( log_product / weight_sum ).exp()
	    },
	}
    }
}

impl FromStr for SummaryFunction {
    type Err = ChainError;

    fn from_str( name: &str ) -> Result<Self> {
	SummaryFunction::ALL.iter()
	    .find( |f| f.name() == name )
	    .copied()
	    .ok_or_else( || ChainError::UnknownSummaryFunction( name.to_string() ))
    }
}

impl fmt::Display for SummaryFunction {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
	write!( f, "{}", self.name() )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_simple_weighted_avg() {
	let combined = SummaryFunction::SimpleWeightedAvg.combine( &[0.2, 0.6], &[1.0, 3.0] );
	assert_approx!( combined, ( 0.2 + 1.8 ) / 4.0, 1e-12 );
    }

    #[test]
    fn test_sum_weighted_log_odds() {
	// equal odds stay put
	let combined = SummaryFunction::SumWeightedLogOdds.combine( &[0.25, 0.25], &[2.0, 5.0] );
	assert_approx!( combined, 0.25, 1e-12 );
	// odds 1/3 and 3 average to 1 in log space
	let combined = SummaryFunction::SumWeightedLogOdds.combine( &[0.25, 0.75], &[1.0, 1.0] );
	assert_approx!( combined, 0.5, 1e-12 );
	// certainty wins
	let combined = SummaryFunction::SumWeightedLogOdds.combine( &[1.0, 0.1], &[1.0, 1.0] );
	assert_approx!( combined, 1.0, 1e-12 );
    }

    #[test]
    fn test_rescaled_power_weight() {
	let combined = SummaryFunction::RescaledPowerWeight.combine( &[0.5, 0.125], &[2.0, 1.0] );
	let expected = ( 0.5_f64.powf( 2.0 ) * 0.125 ).powf( 1.0 / 3.0 );
	assert_approx!( combined, expected, 1e-12 );
	assert_approx!( SummaryFunction::RescaledPowerWeight.combine( &[0.3], &[7.0] ), 0.3, 1e-12 );
	assert_eq!( SummaryFunction::RescaledPowerWeight.combine( &[0.0, 0.5], &[1.0, 1.0] ), 0.0 );
    }

    #[test]
    fn test_select_by_name() {
	for function in SummaryFunction::ALL {
	    assert_eq!( function.name().parse::<SummaryFunction>().unwrap(), function );
	}
	assert!( matches!( "rpw".parse::<SummaryFunction>(), Err( ChainError::UnknownSummaryFunction( _ ))));
	assert_eq!( SummaryFunction::default(), SummaryFunction::RescaledPowerWeight );
	let parsed: SummaryFunction = serde_json::from_str( "\"sum_weighted_log_odds\"" ).unwrap();
	assert_eq!( parsed, SummaryFunction::SumWeightedLogOdds );
    }
}
