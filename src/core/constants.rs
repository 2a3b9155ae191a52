//! Versioned reference values shared by every calculator.
//!
//! The compiled-in table follows the 2026 Ministry of Justice child-support
//! scale and the 2026 poverty threshold. A replacement table can be loaded
//! from TOML at start-up; any key left out keeps its default.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use super::types::CustodyMode;

/// Highest child count with its own rate; larger families use this column.
pub const MAX_RATED_CHILDREN: u32 = 3;

/// Field names are the TOML keys, in snake_case; the JSON view served by
/// the API uses the same keys so a served table can be saved as a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstantsTable {
    pub version: String,
    /// Monthly amount under which the disposable income is flagged.
    pub poverty_threshold: f64,
    /// Minimum-income floor (RSA) removed from the debtor income.
    pub minimum_income_floor: f64,
    pub older_age_coefficient: f64,
    pub pilote_band: f64,
    pub standard_of_living_years: f64,
    pub age_brackets: Vec<AgeBracket>,
    pub standard_of_living: CoefficientRange,
    pub support_equivalence: CoefficientRange,
    pub custody_rates: CustodyRateTable,
    pub capital: CapitalConstants,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgeBracket {
    pub up_to_age: f64,
    pub inclusive: bool,
    pub coefficient: f64,
}

impl AgeBracket {
    fn contains(&self, age: f64) -> bool {
        age < self.up_to_age || (self.inclusive && age == self.up_to_age)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoefficientRange {
    pub min: f64,
    pub central: f64,
    pub max: f64,
}

impl CoefficientRange {
    fn is_ordered(&self) -> bool {
        0.0 <= self.min && self.min <= self.central && self.central <= self.max
    }
}

/// Rates per child for 1, 2 and 3+ children.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CustodyRateTable {
    pub classic: [f64; 3],
    pub alternating: [f64; 3],
    pub reduced: [f64; 3],
}

impl Default for CustodyRateTable {
    fn default() -> Self {
        Self {
            classic: [0.135, 0.115, 0.10],
            alternating: [0.09, 0.078, 0.067],
            reduced: [0.18, 0.155, 0.133],
        }
    }
}

impl CustodyRateTable {
    fn row(&self, mode: CustodyMode) -> &[f64; 3] {
        match mode {
            CustodyMode::Classic => &self.classic,
            CustodyMode::Alternating => &self.alternating,
            CustodyMode::Reduced => &self.reduced,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapitalConstants {
    pub horizon_years: u32,
    pub default_property_yield_percent: f64,
    pub full_weight_duration_years: f64,
    pub debtor_savings_rate: f64,
    pub retirement_accrual_rate: f64,
    pub retirement_repair_years: f64,
    pub band: f64,
}

impl Default for CapitalConstants {
    fn default() -> Self {
        Self {
            horizon_years: 8,
            default_property_yield_percent: 3.0,
            full_weight_duration_years: 20.0,
            debtor_savings_rate: 0.30,
            retirement_accrual_rate: 0.02,
            retirement_repair_years: 8.0,
            band: 0.10,
        }
    }
}

impl Default for ConstantsTable {
    fn default() -> Self {
        Self {
            version: "2026".to_string(),
            poverty_threshold: 1216.0,
            minimum_income_floor: 645.5,
            age_brackets: vec![
                AgeBracket {
                    up_to_age: 45.0,
                    inclusive: false,
                    coefficient: 1.0,
                },
                AgeBracket {
                    up_to_age: 55.0,
                    inclusive: true,
                    coefficient: 1.2,
                },
            ],
            older_age_coefficient: 1.5,
            pilote_band: 0.10,
            standard_of_living: CoefficientRange {
                min: 0.15,
                central: 0.20,
                max: 0.25,
            },
            standard_of_living_years: 8.0,
            support_equivalence: CoefficientRange {
                min: 6.0,
                central: 8.0,
                max: 10.0,
            },
            custody_rates: CustodyRateTable::default(),
            capital: CapitalConstants::default(),
        }
    }
}

impl ConstantsTable {
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        table.validate()?;
        Ok(table)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version.trim().is_empty() {
            return Err(ConfigError::Invalid("version must not be empty".to_string()));
        }

        for (name, value) in [
            ("poverty_threshold", self.poverty_threshold),
            ("minimum_income_floor", self.minimum_income_floor),
            ("standard_of_living_years", self.standard_of_living_years),
            ("older_age_coefficient", self.older_age_coefficient),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!("{name} must be >= 0")));
            }
        }

        for (name, band) in [
            ("pilote_band", self.pilote_band),
            ("capital.band", self.capital.band),
        ] {
            if !(0.0..=1.0).contains(&band) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be between 0 and 1"
                )));
            }
        }

        let mut previous = f64::NEG_INFINITY;
        for bracket in &self.age_brackets {
            if !bracket.up_to_age.is_finite() || bracket.up_to_age <= previous {
                return Err(ConfigError::Invalid(
                    "age_brackets must have strictly ascending up_to_age".to_string(),
                ));
            }
            if !bracket.coefficient.is_finite() || bracket.coefficient <= 0.0 {
                return Err(ConfigError::Invalid(
                    "age bracket coefficients must be > 0".to_string(),
                ));
            }
            previous = bracket.up_to_age;
        }

        if !self.standard_of_living.is_ordered() {
            return Err(ConfigError::Invalid(
                "standard_of_living must satisfy 0 <= min <= central <= max".to_string(),
            ));
        }
        if !self.support_equivalence.is_ordered() {
            return Err(ConfigError::Invalid(
                "support_equivalence must satisfy 0 <= min <= central <= max".to_string(),
            ));
        }

        for mode in CustodyMode::ALL {
            if self
                .custody_rates
                .row(mode)
                .iter()
                .any(|rate| !(0.0..=1.0).contains(rate))
            {
                return Err(ConfigError::Invalid(format!(
                    "custody_rates.{} must be between 0 and 1",
                    mode.label()
                )));
            }
        }

        let capital = &self.capital;
        if capital.horizon_years == 0 {
            return Err(ConfigError::Invalid(
                "capital.horizon_years must be > 0".to_string(),
            ));
        }
        if capital.full_weight_duration_years <= 0.0 {
            return Err(ConfigError::Invalid(
                "capital.full_weight_duration_years must be > 0".to_string(),
            ));
        }
        for (name, value) in [
            ("capital.default_property_yield_percent", capital.default_property_yield_percent),
            ("capital.debtor_savings_rate", capital.debtor_savings_rate),
            ("capital.retirement_accrual_rate", capital.retirement_accrual_rate),
            ("capital.retirement_repair_years", capital.retirement_repair_years),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!("{name} must be >= 0")));
            }
        }

        Ok(())
    }

    pub fn age_coefficient(&self, age: f64) -> f64 {
        self.age_brackets
            .iter()
            .find(|bracket| bracket.contains(age))
            .map(|bracket| bracket.coefficient)
            .unwrap_or(self.older_age_coefficient)
    }

    /// Per-child rate; zero children yields a zero rate.
    pub fn custody_rate(&self, mode: CustodyMode, children: u32) -> f64 {
        if children == 0 {
            return 0.0;
        }
        let column = children.clamp(1, MAX_RATED_CHILDREN) as usize - 1;
        self.custody_rates.row(mode)[column]
    }
}
