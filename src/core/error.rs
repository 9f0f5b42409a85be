use thiserror::Error;

/// Errors that abort a projection or simulation run.
///
/// Every variant is a configuration problem: the engine refuses to produce a
/// number rather than clamp the input. Numeric degeneracies that have a defined
/// fallback (an empty portfolio during the drift check, a zero standard
/// deviation in a ratio) never surface here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("retirement age {retirement_age} must be greater than current age {current_age}")]
    InvalidAgeRange {
        current_age: u32,
        retirement_age: u32,
    },

    #[error("{name} must be between 0 and 1, got {value}")]
    RatioOutOfRange { name: &'static str, value: f64 },

    #[error("invalid tax bracket table: {reason}")]
    InvalidBracketTable { reason: String },

    #[error("income must be positive to derive a tax rate, got {income}")]
    NonPositiveIncome { income: f64 },

    #[error("annual contribution {contribution:.2} exceeds the statutory limit {limit:.2} at age {age}")]
    ContributionAboveLimit {
        contribution: f64,
        limit: f64,
        age: u32,
    },

    #[error("{name} must be a finite number, got {value}")]
    NonFiniteParameter { name: &'static str, value: f64 },

    #[error("{name} must be between 0 and 100, got {value}")]
    InvalidPercent { name: &'static str, value: f64 },

    #[error("invalid distribution parameters: {0}")]
    InvalidDistribution(String),

    #[error("invalid simulation settings: {0}")]
    InvalidSimulationSettings(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

pub(crate) fn ensure_finite(name: &'static str, value: f64) -> EngineResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(EngineError::NonFiniteParameter { name, value })
    }
}

pub(crate) fn ensure_ratio(name: &'static str, value: f64) -> EngineResult<()> {
    ensure_finite(name, value)?;
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(EngineError::RatioOutOfRange { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_ratio_accepts_bounds_and_rejects_outside() {
        assert!(ensure_ratio("passive_ratio", 0.0).is_ok());
        assert!(ensure_ratio("passive_ratio", 1.0).is_ok());
        assert_eq!(
            ensure_ratio("passive_ratio", 1.2),
            Err(EngineError::RatioOutOfRange {
                name: "passive_ratio",
                value: 1.2
            })
        );
    }

    #[test]
    fn ensure_finite_rejects_nan() {
        let err = ensure_finite("inflation_rate", f64::NAN).expect_err("nan must fail");
        assert!(err.to_string().contains("inflation_rate"));
    }

    #[test]
    fn messages_name_the_offending_input() {
        let err = EngineError::InvalidAgeRange {
            current_age: 65,
            retirement_age: 60,
        };
        assert_eq!(
            err.to_string(),
            "retirement age 60 must be greater than current age 65"
        );
    }
}
