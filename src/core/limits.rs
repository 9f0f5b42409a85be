use serde::{Deserialize, Serialize};

/// Extra deferral allowed for savers whose age falls in `[min_age, max_age]`.
/// When bands overlap, the largest applicable amount wins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatchUpBand {
    pub min_age: u32,
    pub max_age: Option<u32>,
    pub amount: f64,
}

impl CatchUpBand {
    fn applies_to(&self, age: u32) -> bool {
        age >= self.min_age && self.max_age.is_none_or(|max| age <= max)
    }
}

/// Statutory employee deferral limits for one plan year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionLimitPolicy {
    pub plan_year: u16,
    pub base_limit: f64,
    pub catch_up: Vec<CatchUpBand>,
}

impl ContributionLimitPolicy {
    pub fn plan_year_2024() -> Self {
        Self {
            plan_year: 2024,
            base_limit: 23_000.0,
            catch_up: vec![CatchUpBand {
                min_age: 50,
                max_age: None,
                amount: 7_500.0,
            }],
        }
    }

    pub fn plan_year_2025() -> Self {
        Self {
            plan_year: 2025,
            base_limit: 23_500.0,
            catch_up: vec![
                CatchUpBand {
                    min_age: 50,
                    max_age: None,
                    amount: 7_500.0,
                },
                CatchUpBand {
                    min_age: 60,
                    max_age: Some(63),
                    amount: 11_250.0,
                },
            ],
        }
    }

    pub fn for_plan_year(year: u16) -> Option<Self> {
        match year {
            2024 => Some(Self::plan_year_2024()),
            2025 => Some(Self::plan_year_2025()),
            _ => None,
        }
    }

    pub fn limit_for_age(&self, age: u32) -> f64 {
        let catch_up = self
            .catch_up
            .iter()
            .filter(|band| band.applies_to(age))
            .map(|band| band.amount)
            .fold(0.0, f64::max);
        self.base_limit + catch_up
    }
}

impl Default for ContributionLimitPolicy {
    fn default() -> Self {
        Self::plan_year_2024()
    }
}
