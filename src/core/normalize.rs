//! Entry point from raw JSON payloads into [`FinancialFacts`].
//!
//! Only the shape of the record is checked. Field content is always coerced:
//! unreadable numbers become zero, unreadable dates become absent and
//! unrecognized labels fall back to their defaults.

use chrono::NaiveDate;
use serde_json::{Map, Value};

use super::error::EngineError;
use super::types::{
    CustodyMode, FieldPresence, FinancialFacts, IncomeMode, MatrimonialRegime, Party,
    PartyProjection,
};

pub fn normalize(raw: &Value) -> Result<FinancialFacts, EngineError> {
    let Value::Object(record) = raw else {
        return Err(EngineError::not_a_record("financial facts", raw));
    };
    let fields = Fields(record);

    let children_ages = match record.get("childrenAges") {
        Some(Value::Array(ages)) => ages.iter().map(|age| sanitize(read_number(age))).collect(),
        _ => Vec::new(),
    };

    Ok(FinancialFacts {
        my_income: fields.amount(&["myIncome"]),
        spouse_income: fields.amount(&["spouseIncome"]),
        my_charges: fields.amount(&["myCharges"]),
        my_taxes: fields.amount(&["myTaxes"]),
        my_rent: fields.amount(&["myRent"]),
        marriage_duration: fields.amount(&["marriageDuration"]),
        marriage_date: fields.date(&["marriageDate"]),
        divorce_date: fields.date(&["divorceDate"]),
        my_age: fields.amount(&["myAge"]),
        spouse_age: fields.amount(&["spouseAge"]),
        my_birth_date: fields.date(&["myBirthDate"]),
        spouse_birth_date: fields.date(&["spouseBirthDate"]),
        children_count: fields.count(&["childrenCount"]),
        children_ages,
        custody_type: fields.label("custodyType", CustodyMode::from_label),
        assets_value: fields.amount(&["assetsValue"]),
        assets_crd: fields.amount(ASSETS_CRD),
        matrimonial_regime: fields.label("matrimonialRegime", MatrimonialRegime::from_label),
        rewards_self: fields.amount(&["rewardsSelf", "rewardsAlice"]),
        rewards_spouse: fields.amount(&["rewardsSpouse", "rewardsBob"]),
        support_debtor: fields.optional_label("supportDebtor", Party::from_label),
        debtor: fields.projection("debtor"),
        creditor: fields.projection("creditor"),
        creditor_retirement_gap_years: fields.amount(&["creditorRetirementGapYears"]),
        creditor_pre_retirement_income: fields.amount(&["creditorPreRetirementIncome"]),
        presence: FieldPresence {
            assets_value: fields.is_present(&["assetsValue"]),
            assets_crd: fields.is_present(ASSETS_CRD),
            debtor_gross_income: fields.is_present(&["debtorGrossIncome"]),
            creditor_gross_income: fields.is_present(&["creditorGrossIncome"]),
        },
    })
}

const ASSETS_CRD: &[&str] = &["assetsCRD", "assetsCrd"];

struct Fields<'a>(&'a Map<String, Value>);

impl Fields<'_> {
    /// First alias holding a non-null value.
    fn lookup(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter()
            .filter_map(|key| self.0.get(*key))
            .find(|value| !value.is_null())
    }

    fn number(&self, keys: &[&str]) -> Option<f64> {
        self.lookup(keys).and_then(read_number)
    }

    fn amount(&self, keys: &[&str]) -> f64 {
        sanitize(self.number(keys))
    }

    fn count(&self, keys: &[&str]) -> u32 {
        let value = self.amount(keys).floor();
        if value >= u32::MAX as f64 {
            u32::MAX
        } else {
            value as u32
        }
    }

    fn is_present(&self, keys: &[&str]) -> bool {
        self.number(keys).is_some_and(f64::is_finite)
    }

    fn date(&self, keys: &[&str]) -> Option<NaiveDate> {
        self.lookup(keys).and_then(Value::as_str).and_then(parse_date)
    }

    fn label<T: Default>(&self, key: &str, parse: impl Fn(&str) -> Option<T>) -> T {
        self.optional_label(key, parse).unwrap_or_default()
    }

    /// `None` when absent or unrecognized.
    fn optional_label<T>(&self, key: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let value = self.lookup(&[key])?;
        let parsed = value.as_str().and_then(&parse);
        if parsed.is_none() {
            tracing::warn!(field = key, value = %value, "unrecognized label, using default");
        }
        parsed
    }

    fn projection(&self, role: &str) -> PartyProjection {
        let key = |suffix: &str| format!("{role}{suffix}");
        PartyProjection {
            gross_income: self.amount(&[key("GrossIncome").as_str()]),
            income_mode: self.label(&key("IncomeMode"), IncomeMode::from_label),
            child_contribution: self.amount(&[key("ChildContribution").as_str()]),
            future_income: self.amount(&[key("FutureIncome").as_str()]),
            future_child_contribution: self.amount(&[key("FutureChildContribution").as_str()]),
            change_date: self.date(&[key("ChangeDate").as_str()]),
            property_value: self.amount(&[key("PropertyValue").as_str()]),
            property_yield: self.amount(&[key("PropertyYield").as_str()]),
        }
    }
}

fn read_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn sanitize(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => v,
        _ => 0.0,
    }
}

/// `YYYY-MM-DD`, optionally followed by an RFC 3339 time part.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let day = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}
