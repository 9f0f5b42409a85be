use serde::{Deserialize, Serialize};

use super::error::{EngineError, EngineResult};

/// One band of a progressive schedule. `upper` is `f64::INFINITY` for the top band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaxBracket {
    pub lower: f64,
    pub upper: f64,
    pub rate: f64,
}

impl TaxBracket {
    pub const fn new(lower: f64, upper: f64, rate: f64) -> Self {
        Self { lower, upper, rate }
    }

    fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// 2023 federal ordinary-income brackets, single filer.
pub fn federal_brackets_2023() -> Vec<TaxBracket> {
    vec![
        TaxBracket::new(0.0, 11_000.0, 0.10),
        TaxBracket::new(11_000.0, 44_725.0, 0.12),
        TaxBracket::new(44_725.0, 95_375.0, 0.22),
        TaxBracket::new(95_375.0, 182_100.0, 0.24),
        TaxBracket::new(182_100.0, 231_250.0, 0.32),
        TaxBracket::new(231_250.0, 578_125.0, 0.35),
        TaxBracket::new(578_125.0, f64::INFINITY, 0.37),
    ]
}

/// 2023 long-term capital-gains brackets, single filer.
pub fn capital_gains_brackets_2023() -> Vec<TaxBracket> {
    vec![
        TaxBracket::new(0.0, 44_625.0, 0.0),
        TaxBracket::new(44_625.0, 492_300.0, 0.15),
        TaxBracket::new(492_300.0, f64::INFINITY, 0.20),
    ]
}

pub const NET_INVESTMENT_INCOME_SURTAX: f64 = 0.038;
pub const NET_INVESTMENT_INCOME_THRESHOLD: f64 = 200_000.0;

/// Progressive tax over a validated bracket table.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressiveTaxCalculator {
    brackets: Vec<TaxBracket>,
}

impl ProgressiveTaxCalculator {
    /// Brackets must start at 0, be contiguous and ascending, end at infinity,
    /// and carry non-decreasing rates in `[0, 1]`.
    pub fn new(brackets: Vec<TaxBracket>) -> EngineResult<Self> {
        validate_brackets(&brackets)?;
        Ok(Self { brackets })
    }

    pub fn brackets(&self) -> &[TaxBracket] {
        &self.brackets
    }

    pub fn total_tax(&self, income: f64) -> f64 {
        let mut remaining = income.max(0.0);
        let mut tax = 0.0;
        for bracket in &self.brackets {
            if remaining <= 0.0 {
                break;
            }
            let taxable = bracket.width().min(remaining);
            tax += taxable * bracket.rate;
            remaining -= taxable;
        }
        tax
    }

    pub fn effective_rate(&self, income: f64) -> EngineResult<f64> {
        if income <= 0.0 || income.is_nan() {
            return Err(EngineError::NonPositiveIncome { income });
        }
        Ok(self.total_tax(income) / income)
    }

    /// Statutory rate of the bracket containing `income`.
    pub fn marginal_rate(&self, income: f64) -> f64 {
        let income = income.max(0.0);
        self.brackets
            .iter()
            .find(|b| income >= b.lower && income < b.upper)
            .or(self.brackets.last())
            .map(|b| b.rate)
            .unwrap_or(0.0)
    }

    /// Average rate paid on the block of income stacked on top of
    /// `base_income`. A non-positive block degenerates to the bracket rate at
    /// `base_income`, which is the limit of the block rate as it shrinks.
    pub fn true_marginal_rate(&self, base_income: f64, contribution_amount: f64) -> f64 {
        if contribution_amount <= 0.0 {
            return self.marginal_rate(base_income);
        }
        let base = base_income.max(0.0);
        (self.total_tax(base + contribution_amount) - self.total_tax(base)) / contribution_amount
    }
}

fn validate_brackets(brackets: &[TaxBracket]) -> EngineResult<()> {
    let invalid = |reason: String| Err(EngineError::InvalidBracketTable { reason });

    let Some(first) = brackets.first() else {
        return invalid("table is empty".to_string());
    };
    if first.lower != 0.0 {
        return invalid(format!("first bracket must start at 0, starts at {}", first.lower));
    }

    for (idx, bracket) in brackets.iter().enumerate() {
        if !bracket.rate.is_finite() || !(0.0..=1.0).contains(&bracket.rate) {
            return invalid(format!("bracket {idx} rate {} is outside [0, 1]", bracket.rate));
        }
        if bracket.lower.is_nan() || bracket.upper.is_nan() || bracket.upper <= bracket.lower {
            return invalid(format!(
                "bracket {idx} upper bound {} must exceed lower bound {}",
                bracket.upper, bracket.lower
            ));
        }
        if let Some(next) = brackets.get(idx + 1) {
            if next.lower != bracket.upper {
                return invalid(format!(
                    "bracket {} starts at {} but bracket {idx} ends at {}",
                    idx + 1,
                    next.lower,
                    bracket.upper
                ));
            }
            if next.rate < bracket.rate {
                return invalid(format!(
                    "bracket {} rate {} is lower than bracket {idx} rate {}",
                    idx + 1,
                    next.rate,
                    bracket.rate
                ));
            }
        } else if bracket.upper != f64::INFINITY {
            return invalid(format!("last bracket must end at infinity, ends at {}", bracket.upper));
        }
    }

    Ok(())
}

/// Long-term gains schedule with a flat surtax above an income threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct CapitalGainsSchedule {
    brackets: ProgressiveTaxCalculator,
    surtax_rate: f64,
    surtax_threshold: f64,
}

impl CapitalGainsSchedule {
    pub fn new(
        brackets: Vec<TaxBracket>,
        surtax_rate: f64,
        surtax_threshold: f64,
    ) -> EngineResult<Self> {
        super::error::ensure_ratio("surtax_rate", surtax_rate)?;
        super::error::ensure_finite("surtax_threshold", surtax_threshold)?;
        Ok(Self {
            brackets: ProgressiveTaxCalculator::new(brackets)?,
            surtax_rate,
            surtax_threshold,
        })
    }

    pub fn us_2023() -> Self {
        Self {
            brackets: ProgressiveTaxCalculator {
                brackets: capital_gains_brackets_2023(),
            },
            surtax_rate: NET_INVESTMENT_INCOME_SURTAX,
            surtax_threshold: NET_INVESTMENT_INCOME_THRESHOLD,
        }
    }

    /// Bracket rate at `income` plus the surtax once income passes the threshold.
    pub fn rate_for_income(&self, income: f64) -> f64 {
        let surtax = if income > self.surtax_threshold {
            self.surtax_rate
        } else {
            0.0
        };
        self.brackets.marginal_rate(income) + surtax
    }
}

impl Default for CapitalGainsSchedule {
    fn default() -> Self {
        Self::us_2023()
    }
}
