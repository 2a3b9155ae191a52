//! Which calculations and methods a caller asked for, and the headline
//! compensatory value derived from them.
//!
//! Both renderers read [`CompensatoryResult::headline`]; the mean of active
//! methods is computed here and nowhere else.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;

use super::engine::round_currency;
use super::error::EngineError;
use super::types::{CompensatoryEstimates, CompensatoryResult};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub enum CalculationCategory {
    #[serde(rename = "prestationCompensatoire")]
    CompensatoryAllowance,
    #[serde(rename = "pensionAlimentaire")]
    ChildSupport,
    #[serde(rename = "liquidation")]
    Liquidation,
    #[serde(rename = "resteAVivre")]
    DisposableIncome,
}

impl CalculationCategory {
    pub const ALL: [CalculationCategory; 4] = [
        CalculationCategory::CompensatoryAllowance,
        CalculationCategory::ChildSupport,
        CalculationCategory::Liquidation,
        CalculationCategory::DisposableIncome,
    ];

    pub fn from_id(raw: &str) -> Option<Self> {
        match raw.trim() {
            "prestationCompensatoire" | "compensatoryAllowance" => {
                Some(CalculationCategory::CompensatoryAllowance)
            }
            "pensionAlimentaire" | "childSupport" => Some(CalculationCategory::ChildSupport),
            "liquidation" => Some(CalculationCategory::Liquidation),
            "resteAVivre" | "disposableIncome" => Some(CalculationCategory::DisposableIncome),
            _ => None,
        }
    }

    pub fn method_ids(self) -> &'static [&'static str] {
        match self {
            CalculationCategory::CompensatoryAllowance => &["axelDepondt", "pilote", "insee", "paBased"],
            CalculationCategory::ChildSupport => &["baremeMJ"],
            CalculationCategory::Liquidation => &["communaute", "separation"],
            CalculationCategory::DisposableIncome => &["budget"],
        }
    }

    fn known_method(self, raw: &str) -> Option<&'static str> {
        self.method_ids().iter().copied().find(|id| *id == raw.trim())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub enum CompensatoryMethod {
    #[serde(rename = "axelDepondt")]
    AxelDepondt,
    #[serde(rename = "pilote")]
    Pilote,
    #[serde(rename = "insee")]
    Insee,
    #[serde(rename = "paBased")]
    PaBased,
}

impl CompensatoryMethod {
    pub const ALL: [CompensatoryMethod; 4] = [
        CompensatoryMethod::AxelDepondt,
        CompensatoryMethod::Pilote,
        CompensatoryMethod::Insee,
        CompensatoryMethod::PaBased,
    ];

    /// Used for the headline when no selected method produced a value.
    pub const DEFAULT: CompensatoryMethod = CompensatoryMethod::Pilote;

    pub fn id(self) -> &'static str {
        match self {
            CompensatoryMethod::AxelDepondt => "axelDepondt",
            CompensatoryMethod::Pilote => "pilote",
            CompensatoryMethod::Insee => "insee",
            CompensatoryMethod::PaBased => "paBased",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SelectionPreset {
    Express,
    Standard,
    PcPrecision,
    Complete,
}

/// Categories to run and, per category, the enabled methods.
///
/// A category without a method entry has all of its methods enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationSelection {
    selected_calcs: BTreeSet<CalculationCategory>,
    selected_methods: BTreeMap<CalculationCategory, BTreeSet<&'static str>>,
}

impl Default for CalculationSelection {
    fn default() -> Self {
        Self::all()
    }
}

impl CalculationSelection {
    pub fn all() -> Self {
        Self {
            selected_calcs: CalculationCategory::ALL.into_iter().collect(),
            selected_methods: BTreeMap::new(),
        }
    }

    pub fn empty() -> Self {
        Self {
            selected_calcs: BTreeSet::new(),
            selected_methods: BTreeMap::new(),
        }
    }

    pub fn with_category(mut self, category: CalculationCategory) -> Self {
        self.selected_calcs.insert(category);
        self
    }

    /// Enables `category` restricted to `methods`; unknown ids are dropped.
    pub fn with_methods(mut self, category: CalculationCategory, methods: &[&str]) -> Self {
        self.selected_calcs.insert(category);
        let known = methods
            .iter()
            .filter_map(|raw| category.known_method(raw))
            .collect();
        self.selected_methods.insert(category, known);
        self
    }

    pub fn preset(preset: SelectionPreset) -> Self {
        use CalculationCategory::*;
        match preset {
            SelectionPreset::Express => {
                Self::empty().with_methods(CompensatoryAllowance, &["pilote", "insee"])
            }
            SelectionPreset::Standard => Self::empty()
                .with_methods(CompensatoryAllowance, &["pilote", "insee", "paBased"])
                .with_methods(ChildSupport, &["baremeMJ"]),
            SelectionPreset::PcPrecision => Self::empty()
                .with_methods(
                    CompensatoryAllowance,
                    &["axelDepondt", "pilote", "insee", "paBased"],
                )
                .with_methods(ChildSupport, &["baremeMJ"]),
            SelectionPreset::Complete => Self::all(),
        }
    }

    /// Reads a stored selection. `None`, `null` and `{}` mean "everything".
    pub fn from_value(raw: Option<&Value>) -> Result<Self, EngineError> {
        let map = match raw {
            None | Some(Value::Null) => return Ok(Self::all()),
            Some(Value::Object(map)) => map,
            Some(other) => return Err(EngineError::not_a_record("selection", other)),
        };
        if map.is_empty() {
            return Ok(Self::all());
        }

        let methods_by_category = map.get("selectedMethods").and_then(Value::as_object);

        let mut selection = Self::empty();
        match map.get("selectedCalcs").and_then(Value::as_array) {
            Some(calcs) => {
                for raw_calc in calcs {
                    let Some(label) = raw_calc.as_str() else {
                        continue;
                    };
                    match CalculationCategory::from_id(label) {
                        Some(category) => {
                            selection.selected_calcs.insert(category);
                        }
                        None => tracing::warn!(category = %label, "ignoring unknown calculation"),
                    }
                }
            }
            None => {
                if let Some(methods) = methods_by_category {
                    selection
                        .selected_calcs
                        .extend(methods.keys().filter_map(|k| CalculationCategory::from_id(k)));
                }
            }
        }

        if let Some(methods) = methods_by_category {
            for (key, ids) in methods {
                let Some(category) = CalculationCategory::from_id(key) else {
                    continue;
                };
                let Some(ids) = ids.as_array() else {
                    continue;
                };
                let known = ids
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|id| {
                        let known = category.known_method(id);
                        if known.is_none() {
                            tracing::warn!(category = %key, method = %id, "ignoring unknown method");
                        }
                        known
                    })
                    .collect();
                selection.selected_methods.insert(category, known);
            }
        }

        Ok(selection)
    }

    pub fn is_enabled(&self, category: CalculationCategory) -> bool {
        self.selected_calcs.contains(&category)
    }

    pub fn is_method_enabled(&self, category: CalculationCategory, method: &str) -> bool {
        if !self.is_enabled(category) {
            return false;
        }
        match self.selected_methods.get(&category) {
            Some(methods) => methods.contains(method.trim()),
            None => category.known_method(method).is_some(),
        }
    }

    /// Enabled compensatory methods in canonical order.
    pub fn active_compensatory_methods(&self) -> Vec<CompensatoryMethod> {
        CompensatoryMethod::ALL
            .into_iter()
            .filter(|m| self.is_method_enabled(CalculationCategory::CompensatoryAllowance, m.id()))
            .collect()
    }
}

/// Rounded mean of the active methods that produced an estimate, or the
/// default method's value when there are none.
pub fn headline(estimates: &CompensatoryEstimates, active: &[CompensatoryMethod]) -> f64 {
    let values: Vec<f64> = active
        .iter()
        .filter_map(|method| estimates.get(*method))
        .map(|estimate| estimate.value)
        .collect();
    if values.is_empty() {
        return estimates.pilote.value;
    }
    round_currency(values.iter().sum::<f64>() / values.len() as f64)
}

/// Filters the computed estimates down to what `selection` exposes.
pub fn expose_compensatory(
    estimates: &CompensatoryEstimates,
    selection: &CalculationSelection,
) -> Option<CompensatoryResult> {
    if !selection.is_enabled(CalculationCategory::CompensatoryAllowance) {
        return None;
    }

    let active: Vec<CompensatoryMethod> = selection
        .active_compensatory_methods()
        .into_iter()
        .filter(|method| estimates.get(*method).is_some())
        .collect();
    let fallback_method = active.is_empty().then_some(CompensatoryMethod::DEFAULT);
    let shown = |method: CompensatoryMethod| {
        active.contains(&method) || fallback_method == Some(method)
    };

    Some(CompensatoryResult {
        receiver: estimates.receiver,
        delta_annual_income: estimates.delta_annual_income,
        age_coefficient: estimates.age_coefficient,
        headline: headline(estimates, &active),
        pilote: shown(CompensatoryMethod::Pilote).then_some(estimates.pilote),
        insee: shown(CompensatoryMethod::Insee).then_some(estimates.insee),
        pa_based: shown(CompensatoryMethod::PaBased).then_some(estimates.pa_based),
        axel_depondt: if shown(CompensatoryMethod::AxelDepondt) {
            estimates.axel_depondt
        } else {
            None
        },
        active_methods: active,
        fallback_method,
    })
}
