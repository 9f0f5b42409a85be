use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTaxInfo {
    pub has_income_tax: bool,
    pub max_rate: f64,
    pub num_brackets: u32,
    pub standard_deduction: f64,
}

impl StateTaxInfo {
    /// Flat rate layered on top of the federal schedule.
    pub fn overlay_rate(&self) -> f64 {
        if self.has_income_tax {
            self.max_rate.max(0.0)
        } else {
            0.0
        }
    }
}

/// Region-keyed state tax lookup supplied by the caller.
pub trait StateTaxProvider {
    fn lookup(&self, region: &str) -> Option<StateTaxInfo>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStateTaxTable {
    entries: HashMap<String, StateTaxInfo>,
}

impl InMemoryStateTaxTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, region: &str, info: StateTaxInfo) {
        self.entries.insert(normalize(region), info);
    }

    /// Parses a JSON object of `{"Region": {hasIncomeTax, maxRate, ...}}`.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let raw: HashMap<String, StateTaxInfo> = serde_json::from_str(json)?;
        let mut table = Self::new();
        for (region, info) in raw {
            table.insert(&region, info);
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StateTaxProvider for InMemoryStateTaxTable {
    fn lookup(&self, region: &str) -> Option<StateTaxInfo> {
        self.entries.get(&normalize(region)).copied()
    }
}

fn normalize(region: &str) -> String {
    region.trim().to_ascii_lowercase()
}
