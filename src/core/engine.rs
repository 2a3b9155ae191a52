use chrono::{Local, NaiveDate};
use serde_json::Value;

use super::constants::{CoefficientRange, ConstantsTable};
use super::error::EngineError;
use super::normalize::normalize;
use super::selection::{CalculationCategory, CalculationSelection, expose_compensatory};
use super::types::{
    BudgetBreakdown, CapitalEstimate, ChildSupportResult, CompensatoryEstimates,
    DisposableIncomeResult, FinancialFacts, LiquidationResult, MatrimonialRegime,
    MethodEstimate, Party, PartyProjection, SimulationResult, SupportDirection,
};

/// Everything a calculation needs besides the facts themselves.
#[derive(Debug, Clone, Copy)]
pub struct EngineContext<'a> {
    pub constants: &'a ConstantsTable,
    /// "Today" for date-derived inputs (open marriage, ages, income changes).
    pub reference_date: NaiveDate,
}

impl<'a> EngineContext<'a> {
    pub fn new(constants: &'a ConstantsTable, reference_date: NaiveDate) -> Self {
        Self {
            constants,
            reference_date,
        }
    }

    pub fn today(constants: &'a ConstantsTable) -> Self {
        Self::new(constants, Local::now().date_naive())
    }
}

/// Half-up rounding to the currency unit (`-2.5` rounds to `-2`).
pub fn round_currency(value: f64) -> f64 {
    (value + 0.5).floor()
}

pub fn simulate(
    raw_facts: &Value,
    raw_selection: Option<&Value>,
    ctx: &EngineContext<'_>,
) -> Result<SimulationResult, EngineError> {
    let facts = normalize(raw_facts)?;
    let selection = CalculationSelection::from_value(raw_selection)?;
    Ok(simulate_facts(&facts, selection, ctx))
}

pub fn simulate_facts(
    facts: &FinancialFacts,
    selection: CalculationSelection,
    ctx: &EngineContext<'_>,
) -> SimulationResult {
    let duration = resolve_marriage_duration(facts, ctx.reference_date);
    let support = child_support(facts, ctx.constants);
    let estimates = compensatory_estimates(facts, duration, support.total, ctx);
    let compensatory = expose_compensatory(&estimates, &selection);

    let child_support = selection
        .is_method_enabled(CalculationCategory::ChildSupport, "baremeMJ")
        .then(|| support.clone());
    let liquidation = if selection.is_method_enabled(
        CalculationCategory::Liquidation,
        regime_method_id(facts.matrimonial_regime),
    ) {
        liquidation(facts)
    } else {
        None
    };
    let disposable_income = selection
        .is_method_enabled(CalculationCategory::DisposableIncome, "budget")
        .then(|| disposable_income(facts, &support, ctx.constants));

    tracing::debug!(
        duration,
        headline = compensatory.as_ref().map(|c| c.headline),
        child_support_total = support.total,
        liquidation = liquidation.as_ref().map(|l| l.settlement_amount),
        disposable_net = disposable_income.as_ref().map(|d| d.net),
        "simulation computed"
    );

    SimulationResult {
        constants_version: ctx.constants.version.clone(),
        selection,
        marriage_duration_used: duration,
        custody_type_used: facts.custody_type,
        compensatory,
        child_support,
        liquidation,
        disposable_income,
    }
}

fn regime_method_id(regime: MatrimonialRegime) -> &'static str {
    match regime {
        MatrimonialRegime::Community => "communaute",
        MatrimonialRegime::Separation => "separation",
    }
}

/// Years between the marriage date and the divorce date (or the reference
/// date), falling back to the declared duration when that is not positive.
pub fn resolve_marriage_duration(facts: &FinancialFacts, reference_date: NaiveDate) -> f64 {
    if let Some(start) = facts.marriage_date {
        let end = facts.divorce_date.unwrap_or(reference_date);
        let years = round_currency((end - start).num_days() as f64 / 365.25);
        if years > 0.0 {
            return years;
        }
    }
    facts.marriage_duration
}

/// Declared age, or the age derived from the birth date when none was given.
pub fn resolve_age(facts: &FinancialFacts, party: Party, reference_date: NaiveDate) -> f64 {
    let (age, birth_date) = match party {
        Party::User => (facts.my_age, facts.my_birth_date),
        Party::Spouse => (facts.spouse_age, facts.spouse_birth_date),
    };
    if age > 0.0 {
        return age;
    }
    birth_date
        .and_then(|birth| reference_date.years_since(birth))
        .map(f64::from)
        .unwrap_or(0.0)
}

/// Lower net income receives the allowance; on a tie, the spouse.
pub fn receiver_party(facts: &FinancialFacts) -> Party {
    if facts.my_income < facts.spouse_income {
        Party::User
    } else {
        Party::Spouse
    }
}

pub fn compensatory_estimates(
    facts: &FinancialFacts,
    duration: f64,
    child_support_total: f64,
    ctx: &EngineContext<'_>,
) -> CompensatoryEstimates {
    let constants = ctx.constants;
    let receiver = receiver_party(facts);
    let delta_annual_income = (facts.spouse_income - facts.my_income).abs() * 12.0;
    let age_coefficient =
        constants.age_coefficient(resolve_age(facts, receiver, ctx.reference_date));

    CompensatoryEstimates {
        receiver,
        delta_annual_income,
        age_coefficient,
        pilote: disparity_method(delta_annual_income, duration, age_coefficient, constants),
        insee: standard_of_living_method(delta_annual_income, constants),
        pa_based: support_equivalence_method(child_support_total, constants),
        axel_depondt: capital_method(facts, duration, ctx),
    }
}

fn banded(value: f64, band: f64) -> MethodEstimate {
    MethodEstimate {
        value: round_currency(value),
        min: round_currency(value * (1.0 - band)),
        max: round_currency(value * (1.0 + band)),
    }
}

fn ranged(base: f64, range: &CoefficientRange) -> MethodEstimate {
    MethodEstimate {
        value: round_currency(base * range.central),
        min: round_currency(base * range.min),
        max: round_currency(base * range.max),
    }
}

pub fn disparity_method(
    delta_annual_income: f64,
    duration: f64,
    age_coefficient: f64,
    constants: &ConstantsTable,
) -> MethodEstimate {
    let value = delta_annual_income * (duration / 2.0) * age_coefficient;
    banded(value, constants.pilote_band)
}

pub fn standard_of_living_method(
    delta_annual_income: f64,
    constants: &ConstantsTable,
) -> MethodEstimate {
    ranged(
        delta_annual_income * constants.standard_of_living_years,
        &constants.standard_of_living,
    )
}

/// Monthly child support capitalized over the equivalence horizon.
pub fn support_equivalence_method(
    child_support_total: f64,
    constants: &ConstantsTable,
) -> MethodEstimate {
    ranged(child_support_total * 12.0, &constants.support_equivalence)
}

/// Capital-equivalence estimate; `None` unless both gross incomes were given.
pub fn capital_method(
    facts: &FinancialFacts,
    duration: f64,
    ctx: &EngineContext<'_>,
) -> Option<CapitalEstimate> {
    if !facts.presence.capital_inputs() {
        return None;
    }
    let constants = ctx.constants;
    let capital = &constants.capital;

    let debtor_total = horizon_total(&facts.debtor, ctx);
    let creditor_total = horizon_total(&facts.creditor, ctx);
    let retirement_repair = facts.creditor_retirement_gap_years
        * facts.creditor_pre_retirement_income
        * 12.0
        * capital.retirement_accrual_rate
        * capital.retirement_repair_years;

    let disparity = (debtor_total - creditor_total).max(0.0);
    let duration_factor = (duration / capital.full_weight_duration_years).min(1.0);
    let creditor = facts.formula_debtor().other();
    let age_coefficient =
        constants.age_coefficient(resolve_age(facts, creditor, ctx.reference_date));
    let raw_capital = disparity / 2.0 * duration_factor * age_coefficient + retirement_repair;

    let debtor_max_savings_capital =
        facts.debtor.property_value + debtor_total.max(0.0) * capital.debtor_savings_rate;
    let value = raw_capital.min(debtor_max_savings_capital);
    let months = f64::from(capital.horizon_years) * 12.0;

    Some(CapitalEstimate {
        estimate: banded(value, capital.band),
        raw_capital: round_currency(raw_capital),
        monthly_over_8_years: round_currency(value / months),
        debtor_max_savings_capital: round_currency(debtor_max_savings_capital),
        debtor_total: round_currency(debtor_total),
        creditor_total: round_currency(creditor_total),
        retirement_repair: round_currency(retirement_repair),
    })
}

/// Sum over the horizon of annual income net of child contributions, plus
/// the notional yield of non-productive property.
fn horizon_total(party: &PartyProjection, ctx: &EngineContext<'_>) -> f64 {
    let capital = &ctx.constants.capital;
    let horizon = capital.horizon_years;
    let current_income = party.income_mode.annualize(party.gross_income);
    let future_income = party.income_mode.annualize(party.future_income);

    let change_year = party
        .change_date
        .filter(|_| party.future_income > 0.0)
        .map(|date| {
            date.years_since(ctx.reference_date)
                .unwrap_or(0)
                .min(horizon)
        });

    let yield_percent = if party.property_yield > 0.0 {
        party.property_yield
    } else {
        capital.default_property_yield_percent
    };
    let property_income = party.property_value * yield_percent / 100.0;

    (0..horizon)
        .map(|year| {
            let changed = change_year.is_some_and(|change| year >= change);
            let (income, contribution) = if changed {
                (future_income, party.future_child_contribution)
            } else {
                (current_income, party.child_contribution)
            };
            income - contribution * 12.0 + property_income
        })
        .sum()
}

pub fn child_support(facts: &FinancialFacts, constants: &ConstantsTable) -> ChildSupportResult {
    let children_count = facts.children_count;
    let custody = facts.custody_type;
    let rate = constants.custody_rate(custody, children_count);
    let formula_debtor = facts.formula_debtor();
    let reference_income =
        (facts.income_of(formula_debtor) - constants.minimum_income_floor).max(0.0);

    let per_child = if children_count == 0 {
        0.0
    } else {
        round_currency(reference_income * rate)
    };
    let total = per_child * f64::from(children_count);

    let higher_income_party = Party::higher_income(facts.my_income, facts.spouse_income);
    let direction = match higher_income_party {
        _ if total <= 0.0 => SupportDirection::None,
        Some(Party::User) => SupportDirection::ToPay,
        Some(Party::Spouse) => SupportDirection::ToReceive,
        None => SupportDirection::None,
    };

    ChildSupportResult {
        children_count,
        custody,
        rate,
        reference_income,
        per_child,
        total,
        formula_debtor,
        higher_income_party,
        direction,
    }
}

/// Settlement owed for the shared asset; `None` unless both the value and
/// the remaining principal were supplied.
pub fn liquidation(facts: &FinancialFacts) -> Option<LiquidationResult> {
    if !facts.presence.liquidation_inputs() {
        return None;
    }
    let net_asset = facts.assets_value - facts.assets_crd;
    let rewards_difference = facts.rewards_spouse - facts.rewards_self;

    Some(LiquidationResult {
        regime: facts.matrimonial_regime,
        asset_value: facts.assets_value,
        remaining_principal: facts.assets_crd,
        net_asset,
        rewards_difference,
        settlement_amount: round_currency(net_asset / 2.0 + rewards_difference),
        rewards_displayed: facts.matrimonial_regime == MatrimonialRegime::Community,
    })
}

pub fn disposable_income(
    facts: &FinancialFacts,
    support: &ChildSupportResult,
    constants: &ConstantsTable,
) -> DisposableIncomeResult {
    let (support_paid, support_received) = match support.higher_income_party {
        Some(Party::User) => (support.total, 0.0),
        Some(Party::Spouse) => (0.0, support.total),
        // Equal incomes: no flow either way. The web app this models booked
        // the amount as received in that case.
        None => (0.0, 0.0),
    };

    let budget = BudgetBreakdown {
        total_income: facts.my_income + support_received,
        total_charges: facts.my_taxes + facts.my_rent + facts.my_charges + support_paid,
        taxes: facts.my_taxes,
        rent: facts.my_rent,
        fixed_charges: facts.my_charges,
        support_paid,
        support_received,
    };
    let net = budget.total_income - budget.total_charges;

    DisposableIncomeResult {
        budget,
        net,
        poverty_threshold: constants.poverty_threshold,
        below_poverty_threshold: net < constants.poverty_threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::selection::{CompensatoryMethod, SelectionPreset};
    use crate::core::types::{CustodyMode, FieldPresence, IncomeMode};
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};
    use serde_json::json;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn ctx(constants: &ConstantsTable) -> EngineContext<'_> {
        EngineContext::new(constants, date(2026, 1, 1))
    }

    fn sample_facts() -> FinancialFacts {
        FinancialFacts {
            my_income: 3000.0,
            spouse_income: 1500.0,
            marriage_duration: 10.0,
            my_age: 52.0,
            spouse_age: 50.0,
            ..FinancialFacts::default()
        }
    }

    fn capital_facts() -> FinancialFacts {
        FinancialFacts {
            my_age: 50.0,
            debtor: PartyProjection {
                gross_income: 5000.0,
                ..PartyProjection::default()
            },
            creditor: PartyProjection {
                gross_income: 2000.0,
                ..PartyProjection::default()
            },
            presence: FieldPresence {
                debtor_gross_income: true,
                creditor_gross_income: true,
                ..FieldPresence::default()
            },
            ..FinancialFacts::default()
        }
    }

    fn assert_ordered(estimate: &MethodEstimate) {
        assert!(
            estimate.min <= estimate.value && estimate.value <= estimate.max,
            "unordered estimate {estimate:?}"
        );
    }

    #[test]
    fn round_currency_rounds_half_up() {
        assert_eq!(round_currency(155.7675), 156.0);
        assert_eq!(round_currency(2.5), 3.0);
        assert_eq!(round_currency(2.4999), 2.0);
        assert_eq!(round_currency(-2.5), -2.0);
        assert_eq!(round_currency(-2.6), -3.0);
    }

    #[test]
    fn disparity_and_standard_of_living_match_worked_example() {
        let constants = ConstantsTable::default();
        let estimates = compensatory_estimates(&sample_facts(), 10.0, 0.0, &ctx(&constants));

        assert_eq!(estimates.receiver, Party::Spouse);
        assert_approx(estimates.delta_annual_income, 18_000.0);
        assert_approx(estimates.age_coefficient, 1.2);
        assert_approx(estimates.pilote.value, 108_000.0);
        assert_approx(estimates.pilote.min, 97_200.0);
        assert_approx(estimates.pilote.max, 118_800.0);
        assert_approx(estimates.insee.value, 28_800.0);
        assert_approx(estimates.insee.min, 21_600.0);
        assert_approx(estimates.insee.max, 36_000.0);
        assert!(estimates.axel_depondt.is_none());
    }

    #[test]
    fn express_selection_headline_is_mean_of_two_methods() {
        let constants = ConstantsTable::default();
        let result = simulate_facts(
            &sample_facts(),
            CalculationSelection::preset(SelectionPreset::Express),
            &ctx(&constants),
        );
        let compensatory = result.compensatory.expect("compensatory selected");
        assert_approx(compensatory.headline, 68_400.0);
        assert_eq!(
            compensatory.active_methods,
            vec![CompensatoryMethod::Pilote, CompensatoryMethod::Insee]
        );
        assert!(result.child_support.is_none());
        assert!(result.liquidation.is_none());
        assert!(result.disposable_income.is_none());
    }

    #[test]
    fn headline_changes_with_active_set() {
        let constants = ConstantsTable::default();
        let facts = FinancialFacts {
            children_count: 2,
            ..sample_facts()
        };
        let standard = simulate_facts(
            &facts,
            CalculationSelection::preset(SelectionPreset::Standard),
            &ctx(&constants),
        );
        let express = simulate_facts(
            &facts,
            CalculationSelection::preset(SelectionPreset::Express),
            &ctx(&constants),
        );
        let standard = standard.compensatory.expect("selected");
        let express = express.compensatory.expect("selected");
        let pa_based = standard.pa_based.expect("paBased active").value;

        assert_approx(express.headline, 68_400.0);
        assert_approx(
            standard.headline,
            round_currency((108_000.0 + 28_800.0 + pa_based) / 3.0),
        );
    }

    #[test]
    fn age_brackets_pick_receiver_coefficient() {
        let constants = ConstantsTable::default();
        for (age, expected) in [(30.0, 1.0), (45.0, 1.2), (55.0, 1.2), (56.0, 1.5)] {
            let facts = FinancialFacts {
                spouse_age: age,
                ..sample_facts()
            };
            let estimates = compensatory_estimates(&facts, 10.0, 0.0, &ctx(&constants));
            assert_approx(estimates.age_coefficient, expected);
        }
    }

    #[test]
    fn equal_incomes_make_the_spouse_receiver() {
        let facts = FinancialFacts {
            my_income: 2000.0,
            spouse_income: 2000.0,
            ..FinancialFacts::default()
        };
        assert_eq!(receiver_party(&facts), Party::Spouse);
        let low_user = FinancialFacts {
            my_income: 1000.0,
            ..facts
        };
        assert_eq!(receiver_party(&low_user), Party::User);
    }

    #[test]
    fn child_support_matches_worked_example() {
        let constants = ConstantsTable::default();
        let facts = FinancialFacts {
            my_income: 1500.0,
            spouse_income: 2000.0,
            children_count: 2,
            custody_type: CustodyMode::Classic,
            ..FinancialFacts::default()
        };
        let support = child_support(&facts, &constants);

        assert_approx(support.reference_income, 1354.5);
        assert_approx(support.rate, 0.115);
        assert_approx(support.per_child, 156.0);
        assert_approx(support.total, 312.0);
        assert_eq!(support.formula_debtor, Party::Spouse);
        assert_eq!(support.higher_income_party, Some(Party::Spouse));
        assert_eq!(support.direction, SupportDirection::ToReceive);

        let pa_based = support_equivalence_method(support.total, &constants);
        assert_approx(pa_based.value, 29_952.0);
        assert_approx(pa_based.min, 22_464.0);
        assert_approx(pa_based.max, 37_440.0);
    }

    #[test]
    fn formula_debtor_is_kept_apart_from_higher_income_party() {
        let constants = ConstantsTable::default();
        let facts = FinancialFacts {
            my_income: 4000.0,
            spouse_income: 2000.0,
            children_count: 1,
            ..FinancialFacts::default()
        };
        let configured = FinancialFacts {
            support_debtor: Some(Party::Spouse),
            ..facts.clone()
        };
        let support = child_support(&configured, &constants);
        assert_eq!(support.formula_debtor, Party::Spouse);
        assert_eq!(support.higher_income_party, Some(Party::User));
        assert_eq!(support.direction, SupportDirection::ToPay);
        assert_approx(support.per_child, round_currency(1354.5 * 0.135));

        let user_pays = FinancialFacts {
            support_debtor: Some(Party::User),
            ..facts
        };
        let support = child_support(&user_pays, &constants);
        assert_approx(support.reference_income, 4000.0 - 645.5);
    }

    #[test]
    fn higher_earner_is_formula_debtor_when_none_is_configured() {
        let constants = ConstantsTable::default();
        let facts = FinancialFacts {
            my_income: 4000.0,
            spouse_income: 1000.0,
            children_count: 1,
            ..FinancialFacts::default()
        };
        let support = child_support(&facts, &constants);
        assert_eq!(support.formula_debtor, Party::User);
        assert_approx(support.reference_income, 3354.5);
        assert_approx(support.per_child, 453.0);
        assert_eq!(support.direction, SupportDirection::ToPay);

        let budget = disposable_income(&facts, &support, &constants);
        assert_approx(budget.budget.support_paid, 453.0);

        let tie = FinancialFacts {
            spouse_income: 4000.0,
            ..facts
        };
        assert_eq!(child_support(&tie, &constants).formula_debtor, Party::Spouse);
    }

    #[test]
    fn child_support_is_zero_without_children_or_on_tie() {
        let constants = ConstantsTable::default();
        let facts = FinancialFacts {
            spouse_income: 2500.0,
            ..FinancialFacts::default()
        };
        let support = child_support(&facts, &constants);
        assert_eq!(support.rate, 0.0);
        assert_eq!(support.total, 0.0);
        assert_eq!(support.direction, SupportDirection::None);

        let tie = FinancialFacts {
            my_income: 2500.0,
            children_count: 1,
            ..facts
        };
        let support = child_support(&tie, &constants);
        assert!(support.total > 0.0);
        assert_eq!(support.higher_income_party, None);
        assert_eq!(support.direction, SupportDirection::None);

        let budget = disposable_income(&tie, &support, &constants).budget;
        assert_eq!(budget.support_received, 0.0);
        assert_eq!(budget.support_paid, 0.0);
    }

    #[test]
    fn large_families_use_three_child_rate() {
        let constants = ConstantsTable::default();
        for custody in CustodyMode::ALL {
            let base = FinancialFacts {
                spouse_income: 3000.0,
                custody_type: custody,
                children_count: 3,
                ..FinancialFacts::default()
            };
            let three = child_support(&base, &constants);
            for children in 4..8 {
                let bigger = child_support(
                    &FinancialFacts {
                        children_count: children,
                        ..base.clone()
                    },
                    &constants,
                );
                assert_eq!(bigger.rate, three.rate);
                assert_approx(bigger.per_child, three.per_child);
                assert_approx(bigger.total, three.per_child * f64::from(children));
            }
        }
    }

    #[test]
    fn liquidation_requires_both_asset_inputs() {
        let mut facts = FinancialFacts {
            assets_value: 300_000.0,
            ..FinancialFacts::default()
        };
        facts.presence.assets_value = true;
        assert!(liquidation(&facts).is_none());

        facts.presence.assets_crd = true;
        facts.assets_crd = 100_000.0;
        let result = liquidation(&facts).expect("both inputs present");
        assert_approx(result.net_asset, 200_000.0);
        assert_approx(result.settlement_amount, 100_000.0);
        assert!(result.rewards_displayed);
    }

    #[test]
    fn settlement_sign_follows_rewards_when_net_asset_is_zero() {
        let mut facts = FinancialFacts {
            assets_value: 150_000.0,
            assets_crd: 150_000.0,
            rewards_spouse: 1000.0,
            ..FinancialFacts::default()
        };
        facts.presence.assets_value = true;
        facts.presence.assets_crd = true;
        let owed_by_user = liquidation(&facts).expect("present");
        assert_approx(owed_by_user.settlement_amount, 1000.0);

        facts.rewards_spouse = 0.0;
        facts.rewards_self = 1000.0;
        let owed_to_user = liquidation(&facts).expect("present");
        assert_approx(owed_to_user.settlement_amount, -1000.0);
    }

    #[test]
    fn separation_keeps_formula_but_hides_rewards() {
        let mut facts = FinancialFacts {
            assets_value: 100_000.0,
            assets_crd: 120_000.0,
            rewards_self: 3000.0,
            matrimonial_regime: MatrimonialRegime::Separation,
            ..FinancialFacts::default()
        };
        facts.presence.assets_value = true;
        facts.presence.assets_crd = true;
        let result = liquidation(&facts).expect("present");
        assert_approx(result.net_asset, -20_000.0);
        assert_approx(result.settlement_amount, -13_000.0);
        assert!(!result.rewards_displayed);
    }

    #[test]
    fn disposable_income_counts_received_support() {
        let constants = ConstantsTable::default();
        let facts = FinancialFacts {
            my_income: 1500.0,
            spouse_income: 2000.0,
            my_taxes: 100.0,
            my_rent: 600.0,
            my_charges: 200.0,
            children_count: 2,
            ..FinancialFacts::default()
        };
        let support = child_support(&facts, &constants);
        let result = disposable_income(&facts, &support, &constants);

        assert_approx(result.budget.support_received, 312.0);
        assert_approx(result.budget.support_paid, 0.0);
        assert_approx(result.budget.total_income, 1812.0);
        assert_approx(result.budget.total_charges, 900.0);
        assert_approx(result.net, 912.0);
        assert!(result.below_poverty_threshold);
    }

    #[test]
    fn disposable_income_counts_paid_support() {
        let constants = ConstantsTable::default();
        let facts = FinancialFacts {
            my_income: 4000.0,
            spouse_income: 2000.0,
            my_rent: 800.0,
            children_count: 1,
            ..FinancialFacts::default()
        };
        let support = child_support(&facts, &constants);
        let result = disposable_income(&facts, &support, &constants);

        assert_approx(result.budget.support_paid, support.total);
        assert_approx(result.net, 4000.0 - 800.0 - support.total);
        assert!(!result.below_poverty_threshold);

        let at_threshold = FinancialFacts {
            my_income: 1216.0,
            spouse_income: 1216.0,
            ..FinancialFacts::default()
        };
        let support = child_support(&at_threshold, &constants);
        assert!(!disposable_income(&at_threshold, &support, &constants).below_poverty_threshold);
    }

    #[test]
    fn marriage_duration_prefers_dates() {
        let mut facts = FinancialFacts {
            marriage_duration: 4.0,
            marriage_date: Some(date(2010, 6, 1)),
            divorce_date: Some(date(2020, 6, 1)),
            ..FinancialFacts::default()
        };
        assert_approx(resolve_marriage_duration(&facts, date(2026, 1, 1)), 10.0);

        facts.divorce_date = None;
        assert_approx(resolve_marriage_duration(&facts, date(2026, 1, 1)), 16.0);

        facts.marriage_date = Some(date(2027, 1, 1));
        assert_approx(resolve_marriage_duration(&facts, date(2026, 1, 1)), 4.0);
    }

    #[test]
    fn ages_fall_back_to_birth_dates() {
        let facts = FinancialFacts {
            my_age: 40.0,
            my_birth_date: Some(date(1950, 1, 1)),
            spouse_birth_date: Some(date(1970, 6, 15)),
            ..FinancialFacts::default()
        };
        let today = date(2026, 1, 1);
        assert_approx(resolve_age(&facts, Party::User, today), 40.0);
        assert_approx(resolve_age(&facts, Party::Spouse, today), 55.0);
        assert_approx(
            resolve_age(&FinancialFacts::default(), Party::Spouse, today),
            0.0,
        );
    }

    #[test]
    fn capital_method_is_gated_on_gross_incomes() {
        let constants = ConstantsTable::default();
        let mut facts = capital_facts();
        facts.presence.creditor_gross_income = false;
        assert!(capital_method(&facts, 10.0, &ctx(&constants)).is_none());
    }

    #[test]
    fn capital_method_weights_disparity_by_duration_and_age() {
        let constants = ConstantsTable::default();
        let estimate =
            capital_method(&capital_facts(), 10.0, &ctx(&constants)).expect("inputs present");

        assert_approx(estimate.debtor_total, 480_000.0);
        assert_approx(estimate.creditor_total, 192_000.0);
        assert_approx(estimate.raw_capital, 86_400.0);
        assert_approx(estimate.debtor_max_savings_capital, 144_000.0);
        assert_approx(estimate.estimate.value, 86_400.0);
        assert_approx(estimate.estimate.min, 77_760.0);
        assert_approx(estimate.estimate.max, 95_040.0);
        assert_approx(estimate.monthly_over_8_years, 900.0);
    }

    #[test]
    fn capital_method_is_capped_by_debtor_savings() {
        let constants = ConstantsTable::default();
        let facts = FinancialFacts {
            my_age: 60.0,
            ..capital_facts()
        };
        let estimate = capital_method(&facts, 25.0, &ctx(&constants)).expect("inputs present");
        assert_approx(estimate.raw_capital, 216_000.0);
        assert_approx(estimate.estimate.value, 144_000.0);
        assert_approx(estimate.monthly_over_8_years, 1500.0);
    }

    #[test]
    fn capital_method_applies_income_change_property_and_repair() {
        let constants = ConstantsTable::default();
        let mut facts = capital_facts();
        facts.debtor.future_income = 3000.0;
        facts.debtor.change_date = Some(date(2029, 1, 1));
        facts.creditor.property_value = 100_000.0;
        facts.creditor.income_mode = IncomeMode::Annual;
        facts.creditor.gross_income = 24_000.0;
        facts.creditor_retirement_gap_years = 5.0;
        facts.creditor_pre_retirement_income = 2000.0;

        let estimate = capital_method(&facts, 20.0, &ctx(&constants)).expect("inputs present");
        assert_approx(estimate.debtor_total, 3.0 * 60_000.0 + 5.0 * 36_000.0);
        assert_approx(estimate.creditor_total, 192_000.0 + 8.0 * 3000.0);
        assert_approx(estimate.retirement_repair, 19_200.0);
        // (360000 - 216000) / 2 * 1.0 * 1.2 + 19200
        assert_approx(estimate.raw_capital, 105_600.0);
        assert_approx(estimate.estimate.value, 105_600.0);
    }

    #[test]
    fn capital_method_ignores_past_changes_without_future_income() {
        let constants = ConstantsTable::default();
        let mut facts = capital_facts();
        facts.debtor.change_date = Some(date(2020, 1, 1));
        let estimate = capital_method(&facts, 10.0, &ctx(&constants)).expect("inputs present");
        assert_approx(estimate.debtor_total, 480_000.0);

        facts.debtor.future_income = 4000.0;
        facts.debtor.child_contribution = 100.0;
        facts.debtor.future_child_contribution = 200.0;
        let estimate = capital_method(&facts, 10.0, &ctx(&constants)).expect("inputs present");
        assert_approx(estimate.debtor_total, 8.0 * (48_000.0 - 2400.0));
    }

    #[test]
    fn simulate_rejects_non_record_payloads() {
        let constants = ConstantsTable::default();
        let err = simulate(&json!([1, 2, 3]), None, &ctx(&constants))
            .expect_err("arrays are not facts");
        assert!(matches!(err, EngineError::InvalidInput(_)));

        let err = simulate(&json!({}), Some(&json!("all")), &ctx(&constants))
            .expect_err("strings are not selections");
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn simulate_runs_every_section_by_default() {
        let constants = ConstantsTable::default();
        let raw = json!({
            "myIncome": 3000,
            "spouseIncome": "1500",
            "marriageDuration": 10,
            "spouseAge": 50,
            "childrenCount": 1,
            "custodyType": "alternating",
            "assetsValue": 250000,
            "assetsCRD": 50000,
            "debtorGrossIncome": 4200,
            "creditorGrossIncome": 2100
        });
        let result = simulate(&raw, None, &ctx(&constants)).expect("valid payload");

        assert_eq!(result.constants_version, "2026");
        assert_eq!(result.custody_type_used, CustodyMode::Alternating);
        assert_approx(result.marriage_duration_used, 10.0);
        let compensatory = result.compensatory.expect("all sections on");
        assert_eq!(compensatory.active_methods, CompensatoryMethod::ALL.to_vec());
        assert!(compensatory.axel_depondt.is_some());
        assert!(result.child_support.is_some());
        assert_approx(
            result.liquidation.expect("assets supplied").settlement_amount,
            100_000.0,
        );
        assert!(result.disposable_income.is_some());
    }

    #[test]
    fn liquidation_method_must_match_regime() {
        let constants = ConstantsTable::default();
        let raw = json!({
            "assetsValue": 100000,
            "assetsCRD": 0,
            "matrimonialRegime": "separation"
        });
        let selection = json!({
            "selectedCalcs": ["liquidation"],
            "selectedMethods": { "liquidation": ["communaute"] }
        });
        let result = simulate(&raw, Some(&selection), &ctx(&constants)).expect("valid");
        assert!(result.liquidation.is_none());

        let selection = json!({ "selectedCalcs": ["liquidation"] });
        let result = simulate(&raw, Some(&selection), &ctx(&constants)).expect("valid");
        assert!(result.liquidation.is_some());
        assert!(result.compensatory.is_none());
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_every_estimate_is_ordered_and_non_negative(
            my_income in 0u32..20_000,
            spouse_income in 0u32..20_000,
            duration in 0u32..50,
            my_age in 18u32..90,
            spouse_age in 18u32..90,
            children in 0u32..8,
            debtor_gross in 0u32..15_000,
            creditor_gross in 0u32..15_000,
            property in 0u32..500_000,
            gap_years in 0u32..20
        ) {
            let constants = ConstantsTable::default();
            let mut facts = capital_facts();
            facts.my_income = my_income as f64;
            facts.spouse_income = spouse_income as f64;
            facts.my_age = my_age as f64;
            facts.spouse_age = spouse_age as f64;
            facts.children_count = children;
            facts.debtor.gross_income = debtor_gross as f64;
            facts.creditor.gross_income = creditor_gross as f64;
            facts.debtor.property_value = property as f64;
            facts.creditor_retirement_gap_years = gap_years as f64;
            facts.creditor_pre_retirement_income = creditor_gross as f64;

            let support = child_support(&facts, &constants);
            let estimates =
                compensatory_estimates(&facts, duration as f64, support.total, &ctx(&constants));
            let capital = estimates.axel_depondt.expect("inputs present");

            for estimate in [estimates.pilote, estimates.insee, estimates.pa_based, capital.estimate] {
                assert_ordered(&estimate);
                prop_assert!(estimate.min >= 0.0);
            }
            prop_assert!(capital.estimate.value <= capital.debtor_max_savings_capital + 1.0);
            prop_assert_eq!(support.total == 0.0, children == 0 || support.reference_income * support.rate < 0.5);
        }
    }
}
