use chrono::NaiveDate;
use serde::Serialize;

use super::selection::{CalculationSelection, CompensatoryMethod};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Party {
    User,
    /// Fallback debtor when neither a configured debtor nor a higher earner exists.
    #[default]
    Spouse,
}

impl Party {
    pub fn from_label(raw: &str) -> Option<Self> {
        match normalize_label(raw).as_str() {
            "user" | "self" | "me" | "my" => Some(Party::User),
            "spouse" | "partner" | "conjoint" => Some(Party::Spouse),
            _ => None,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Party::User => Party::Spouse,
            Party::Spouse => Party::User,
        }
    }

    /// `None` when both incomes are equal.
    pub fn higher_income(my_income: f64, spouse_income: f64) -> Option<Self> {
        if my_income > spouse_income {
            Some(Party::User)
        } else if spouse_income > my_income {
            Some(Party::Spouse)
        } else {
            None
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CustodyMode {
    #[default]
    Classic,
    Alternating,
    Reduced,
}

impl CustodyMode {
    pub const ALL: [CustodyMode; 3] = [
        CustodyMode::Classic,
        CustodyMode::Alternating,
        CustodyMode::Reduced,
    ];

    pub fn from_label(raw: &str) -> Option<Self> {
        match normalize_label(raw).as_str() {
            "classic" | "classique" => Some(CustodyMode::Classic),
            "alternating" | "alternee" | "alternate" => Some(CustodyMode::Alternating),
            "reduced" | "reduite" => Some(CustodyMode::Reduced),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CustodyMode::Classic => "classic",
            CustodyMode::Alternating => "alternating",
            CustodyMode::Reduced => "reduced",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MatrimonialRegime {
    #[default]
    Community,
    Separation,
}

impl MatrimonialRegime {
    pub fn from_label(raw: &str) -> Option<Self> {
        match normalize_label(raw).as_str() {
            "community" | "communaute" => Some(MatrimonialRegime::Community),
            "separation" => Some(MatrimonialRegime::Separation),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IncomeMode {
    #[default]
    Monthly,
    Annual,
}

impl IncomeMode {
    pub fn from_label(raw: &str) -> Option<Self> {
        match normalize_label(raw).as_str() {
            "monthly" | "mensuel" => Some(IncomeMode::Monthly),
            "annual" | "yearly" | "annuel" => Some(IncomeMode::Annual),
            _ => None,
        }
    }

    pub fn annualize(self, amount: f64) -> f64 {
        match self {
            IncomeMode::Monthly => amount * 12.0,
            IncomeMode::Annual => amount,
        }
    }
}

/// Lower-cases and strips separators and French accents so that
/// `"Alternée"`, `"alternating"` and `"ALTERNATING"` compare alike.
fn normalize_label(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .map(|c| match c {
            'é' | 'è' | 'ê' | 'É' | 'È' | 'Ê' => 'e',
            'à' | 'â' | 'À' | 'Â' => 'a',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

/// Income projection used by the capital-equivalence method.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyProjection {
    pub gross_income: f64,
    pub income_mode: IncomeMode,
    pub child_contribution: f64,
    pub future_income: f64,
    pub future_child_contribution: f64,
    pub change_date: Option<NaiveDate>,
    pub property_value: f64,
    /// Percent per year; zero means "use the table default".
    pub property_yield: f64,
}

/// Which optional inputs were actually supplied, as opposed to defaulted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPresence {
    pub assets_value: bool,
    pub assets_crd: bool,
    pub debtor_gross_income: bool,
    pub creditor_gross_income: bool,
}

impl FieldPresence {
    pub fn liquidation_inputs(&self) -> bool {
        self.assets_value && self.assets_crd
    }

    pub fn capital_inputs(&self) -> bool {
        self.debtor_gross_income && self.creditor_gross_income
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialFacts {
    pub my_income: f64,
    pub spouse_income: f64,
    pub my_charges: f64,
    pub my_taxes: f64,
    pub my_rent: f64,
    pub marriage_duration: f64,
    pub marriage_date: Option<NaiveDate>,
    pub divorce_date: Option<NaiveDate>,
    pub my_age: f64,
    pub spouse_age: f64,
    pub my_birth_date: Option<NaiveDate>,
    pub spouse_birth_date: Option<NaiveDate>,
    pub children_count: u32,
    pub children_ages: Vec<f64>,
    pub custody_type: CustodyMode,
    pub assets_value: f64,
    pub assets_crd: f64,
    pub matrimonial_regime: MatrimonialRegime,
    pub rewards_self: f64,
    pub rewards_spouse: f64,
    /// Configured child-support formula debtor, if any.
    pub support_debtor: Option<Party>,
    pub debtor: PartyProjection,
    pub creditor: PartyProjection,
    pub creditor_retirement_gap_years: f64,
    pub creditor_pre_retirement_income: f64,
    pub presence: FieldPresence,
}

impl FinancialFacts {
    pub fn income_of(&self, party: Party) -> f64 {
        match party {
            Party::User => self.my_income,
            Party::Spouse => self.spouse_income,
        }
    }

    /// The configured debtor, else the higher earner, else the spouse.
    pub fn formula_debtor(&self) -> Party {
        self.support_debtor
            .or_else(|| Party::higher_income(self.my_income, self.spouse_income))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MethodEstimate {
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapitalEstimate {
    #[serde(flatten)]
    pub estimate: MethodEstimate,
    pub raw_capital: f64,
    pub monthly_over_8_years: f64,
    pub debtor_max_savings_capital: f64,
    pub debtor_total: f64,
    pub creditor_total: f64,
    pub retirement_repair: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensatoryResult {
    pub receiver: Party,
    pub delta_annual_income: f64,
    pub age_coefficient: f64,
    pub active_methods: Vec<CompensatoryMethod>,
    /// Set when no selected method produced an estimate.
    pub fallback_method: Option<CompensatoryMethod>,
    pub headline: f64,
    pub pilote: Option<MethodEstimate>,
    pub insee: Option<MethodEstimate>,
    pub pa_based: Option<MethodEstimate>,
    pub axel_depondt: Option<CapitalEstimate>,
}

impl CompensatoryResult {
    pub fn estimate(&self, method: CompensatoryMethod) -> Option<&MethodEstimate> {
        match method {
            CompensatoryMethod::AxelDepondt => self.axel_depondt.as_ref().map(|c| &c.estimate),
            CompensatoryMethod::Pilote => self.pilote.as_ref(),
            CompensatoryMethod::Insee => self.insee.as_ref(),
            CompensatoryMethod::PaBased => self.pa_based.as_ref(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SupportDirection {
    ToPay,
    ToReceive,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildSupportResult {
    pub children_count: u32,
    pub custody: CustodyMode,
    pub rate: f64,
    pub reference_income: f64,
    pub per_child: f64,
    pub total: f64,
    pub formula_debtor: Party,
    pub higher_income_party: Option<Party>,
    pub direction: SupportDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidationResult {
    pub regime: MatrimonialRegime,
    pub asset_value: f64,
    pub remaining_principal: f64,
    pub net_asset: f64,
    pub rewards_difference: f64,
    pub settlement_amount: f64,
    pub rewards_displayed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetBreakdown {
    pub total_income: f64,
    pub total_charges: f64,
    pub taxes: f64,
    pub rent: f64,
    pub fixed_charges: f64,
    pub support_paid: f64,
    pub support_received: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisposableIncomeResult {
    pub budget: BudgetBreakdown,
    pub net: f64,
    pub poverty_threshold: f64,
    pub below_poverty_threshold: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub constants_version: String,
    pub selection: CalculationSelection,
    pub marriage_duration_used: f64,
    pub custody_type_used: CustodyMode,
    pub compensatory: Option<CompensatoryResult>,
    pub child_support: Option<ChildSupportResult>,
    pub liquidation: Option<LiquidationResult>,
    pub disposable_income: Option<DisposableIncomeResult>,
}

/// Every compensatory method computed for one call, before selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompensatoryEstimates {
    pub receiver: Party,
    pub delta_annual_income: f64,
    pub age_coefficient: f64,
    pub pilote: MethodEstimate,
    pub insee: MethodEstimate,
    pub pa_based: MethodEstimate,
    /// `None` when the gross incomes it needs were not supplied.
    pub axel_depondt: Option<CapitalEstimate>,
}

impl CompensatoryEstimates {
    pub fn get(&self, method: CompensatoryMethod) -> Option<&MethodEstimate> {
        match method {
            CompensatoryMethod::AxelDepondt => self.axel_depondt.as_ref().map(|c| &c.estimate),
            CompensatoryMethod::Pilote => Some(&self.pilote),
            CompensatoryMethod::Insee => Some(&self.insee),
            CompensatoryMethod::PaBased => Some(&self.pa_based),
        }
    }
}
