//! Renderers for a [`SimulationResult`]: the dashboard view and the text
//! report. Both read the aggregated figures as they are; nothing here
//! recomputes the headline.

use std::fmt::{self, Write as _};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::Serialize;
use thiserror::Error;

use crate::core::{
    CalculationCategory, CompensatoryMethod, CompensatoryResult, ConstantsTable, CustodyMode,
    DisposableIncomeResult, EngineContext, FinancialFacts, MatrimonialRegime, MethodEstimate,
    SimulationResult, SupportDirection,
};

/// Shown to the user whatever the underlying failure was.
pub const REPORT_FAILURE_MESSAGE: &str =
    "Échec de la génération du rapport. Veuillez réessayer.";

const BAR_WIDTH: usize = 30;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to render report: {0}")]
    Render(#[from] fmt::Error),

    #[error("failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ReportError {
    pub fn user_message(&self) -> &'static str {
        REPORT_FAILURE_MESSAGE
    }
}

/// Random 24-bit identifier printed in the report header and file name.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SessionId(u32);

impl SessionId {
    pub fn new(raw: u32) -> Self {
        Self(raw & 0x00FF_FFFF)
    }

    pub fn random() -> Self {
        Self(rand::thread_rng().gen_range(0..=0x00FF_FFFF))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06X}", self.0)
    }
}

/// Denominator for proportional bars; never zero.
pub fn chart_scale<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let max = values
        .into_iter()
        .map(f64::abs)
        .filter(|v| v.is_finite())
        .fold(0.0, f64::max);
    if max > 0.0 { max } else { 1.0 }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartBar {
    pub label: &'static str,
    pub amount: f64,
}

/// Income first, outgoings as negative amounts, remainder last.
pub fn budget_bars(disposable: &DisposableIncomeResult) -> Vec<ChartBar> {
    let budget = &disposable.budget;
    vec![
        ChartBar {
            label: "Revenu net",
            amount: budget.total_income,
        },
        ChartBar {
            label: "Impôts",
            amount: -budget.taxes,
        },
        ChartBar {
            label: "Loyer/Crédit",
            amount: -budget.rent,
        },
        ChartBar {
            label: "Charges fixes",
            amount: -budget.fixed_charges,
        },
        ChartBar {
            label: "PA versée",
            amount: -budget.support_paid,
        },
        ChartBar {
            label: "Reste",
            amount: disposable.net,
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodLine {
    pub method: CompensatoryMethod,
    #[serde(flatten)]
    pub estimate: MethodEstimate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub constants_version: String,
    pub headline: Option<f64>,
    pub fallback_method: Option<CompensatoryMethod>,
    pub methods: Vec<MethodLine>,
    pub child_support_total: Option<f64>,
    pub child_support_per_child: Option<f64>,
    pub child_support_direction: Option<SupportDirection>,
    pub settlement_amount: Option<f64>,
    pub disposable_net: Option<f64>,
    pub below_poverty_threshold: bool,
    pub budget_chart: Vec<ChartBar>,
    pub chart_scale: f64,
}

pub fn dashboard_view(result: &SimulationResult) -> DashboardView {
    let compensatory = result.compensatory.as_ref();
    let budget_chart = result
        .disposable_income
        .as_ref()
        .map(budget_bars)
        .unwrap_or_default();

    DashboardView {
        constants_version: result.constants_version.clone(),
        headline: compensatory.map(|c| c.headline),
        fallback_method: compensatory.and_then(|c| c.fallback_method),
        methods: compensatory.map(method_lines).unwrap_or_default(),
        child_support_total: result.child_support.as_ref().map(|s| s.total),
        child_support_per_child: result.child_support.as_ref().map(|s| s.per_child),
        child_support_direction: result.child_support.as_ref().map(|s| s.direction),
        settlement_amount: result.liquidation.as_ref().map(|l| l.settlement_amount),
        disposable_net: result.disposable_income.as_ref().map(|d| d.net),
        below_poverty_threshold: result
            .disposable_income
            .as_ref()
            .is_some_and(|d| d.below_poverty_threshold),
        chart_scale: chart_scale(budget_chart.iter().map(|bar| bar.amount)),
        budget_chart,
    }
}

fn method_lines(compensatory: &CompensatoryResult) -> Vec<MethodLine> {
    CompensatoryMethod::ALL
        .into_iter()
        .filter_map(|method| {
            compensatory.estimate(method).map(|estimate| MethodLine {
                method,
                estimate: *estimate,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub session_id: SessionId,
    pub file_name: String,
    pub body: String,
}

pub fn report_file_name(session: SessionId) -> String {
    format!("simulation-divorce-{session}.txt")
}

pub fn render_report(
    facts: &FinancialFacts,
    result: &SimulationResult,
    session: SessionId,
    ctx: &EngineContext<'_>,
) -> Result<Report, ReportError> {
    let mut out = String::new();
    writeln!(out, "DivorceDoc - SIMULATION DU DIVORCE")?;
    writeln!(
        out,
        "ID: #{session} | {} | Aucune donnée conservée sur serveur",
        ctx.reference_date.format("%d/%m/%Y")
    )?;
    writeln!(out, "Barème : {}", result.constants_version)?;

    let mut sections = SectionCounter::default();
    write_methodology(&mut out, &mut sections, result, ctx.constants)?;
    write_declared_data(&mut out, &mut sections, facts, result)?;

    if let Some(compensatory) = &result.compensatory {
        write_compensatory(&mut out, &mut sections, compensatory)?;
    }
    if let Some(support) = &result.child_support {
        sections.open(&mut out, "Pension alimentaire")?;
        let direction = match support.direction {
            SupportDirection::ToPay => "à verser",
            SupportDirection::ToReceive => "à recevoir",
            SupportDirection::None => "aucun flux",
        };
        writeln!(
            out,
            "Pension alimentaire ({direction}) : {} / mois",
            format_amount(support.total)
        )?;
        writeln!(out, "Type de garde : {}", custody_label(support.custody))?;
        writeln!(out, "Nombre d'enfants : {}", support.children_count)?;
        if support.per_child > 0.0 {
            writeln!(out, "{} / enfant", format_amount(support.per_child))?;
        }
        writeln!(
            out,
            "Base : {} x taux {:.1} %",
            format_amount(support.reference_income),
            support.rate * 100.0
        )?;
    }
    if let Some(liquidation) = &result.liquidation {
        sections.open(&mut out, "Liquidation & soulte")?;
        let direction = match liquidation.settlement_amount {
            amount if amount > 0.0 => "à verser",
            amount if amount < 0.0 => "à recevoir",
            _ => "aucun flux",
        };
        writeln!(
            out,
            "Soulte ({direction}) : {}",
            format_amount(liquidation.settlement_amount.abs())
        )?;
        writeln!(
            out,
            "Valeur vénale du/des bien(s) : {}",
            format_amount(liquidation.asset_value)
        )?;
        writeln!(
            out,
            "Capital restant dû : {}",
            format_amount(liquidation.remaining_principal)
        )?;
        writeln!(out, "Patrimoine net : {}", format_amount(liquidation.net_asset))?;
        if liquidation.rewards_displayed {
            writeln!(
                out,
                "Récompense utilisateur : {}",
                format_amount(facts.rewards_self)
            )?;
            writeln!(out, "Récompense époux : {}", format_amount(facts.rewards_spouse))?;
        }
    }
    if let Some(disposable) = &result.disposable_income {
        write_disposable_income(&mut out, &mut sections, disposable)?;
    }

    writeln!(out)?;
    writeln!(out, "AVERTISSEMENT LÉGAL")?;
    writeln!(
        out,
        "1. Ce document est une estimation mathématique et ne remplace pas un avocat."
    )?;
    writeln!(
        out,
        "2. Seul un Juge aux Affaires Familiales peut fixer les montants définitifs."
    )?;
    writeln!(
        out,
        "3. Les données sont déclaratives et n'ont pas été certifiées."
    )?;

    Ok(Report {
        session_id: session,
        file_name: report_file_name(session),
        body: out,
    })
}

/// Writes the report into `dir` and returns the created path.
pub fn write_report(report: &Report, dir: &Path) -> Result<PathBuf, ReportError> {
    let path = dir.join(&report.file_name);
    fs::write(&path, &report.body).map_err(|source| ReportError::Write {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

#[derive(Default)]
struct SectionCounter(u32);

impl SectionCounter {
    fn open(&mut self, out: &mut String, title: &str) -> fmt::Result {
        self.0 += 1;
        writeln!(out)?;
        writeln!(out, "{}. {}", self.0, title.to_uppercase())
    }
}

fn write_methodology(
    out: &mut String,
    sections: &mut SectionCounter,
    result: &SimulationResult,
    constants: &ConstantsTable,
) -> fmt::Result {
    sections.open(out, "Méthodologies & calculs utilisés")?;
    let selection = &result.selection;

    if let Some(compensatory) = &result.compensatory {
        writeln!(out, "Prestation compensatoire")?;
        for method in CompensatoryMethod::ALL {
            if compensatory.estimate(method).is_none() {
                continue;
            }
            let formula = match method {
                CompensatoryMethod::Pilote => format!(
                    "Pilote : Delta_Annuel x (Durée_Mariage / 2) x Coeff_Age, fourchette +/- {} %",
                    percent(constants.pilote_band)
                ),
                CompensatoryMethod::Insee => {
                    let rates = &constants.standard_of_living;
                    format!(
                        "INSEE : Delta_Annuel x {} ans x Taux ({} % min / {} % moy / {} % max)",
                        plain(constants.standard_of_living_years),
                        percent(rates.min),
                        percent(rates.central),
                        percent(rates.max)
                    )
                }
                CompensatoryMethod::PaBased => {
                    let years = &constants.support_equivalence;
                    format!(
                        "PA : PA_totale x 12 x {} ans ({} min / {} max)",
                        plain(years.central),
                        plain(years.min),
                        plain(years.max)
                    )
                }
                CompensatoryMethod::AxelDepondt => format!(
                    "Calcul PC : (Revenus_{years}ans_Débiteur - Revenus_{years}ans_Créancier) / 2 x Durée x Coeff_Age, plafonné à l'épargne du débiteur",
                    years = constants.capital.horizon_years
                ),
            };
            writeln!(out, "  {formula}")?;
        }
        writeln!(out, "  Résultat final : moyenne des méthodes retenues")?;
    }
    if result.child_support.is_some() {
        writeln!(out, "Pension alimentaire")?;
        writeln!(out, "  Base = Revenu_Débiteur - RSA_Socle")?;
        writeln!(out, "  PA_totale = Base x Taux_Barème x Nb_Enfants")?;
    }
    if selection.is_enabled(CalculationCategory::Liquidation) {
        writeln!(out, "Liquidation & soulte")?;
        writeln!(out, "  Patrimoine_Net = Valeur_Vénale - Capital_Restant_Dû")?;
        writeln!(
            out,
            "  Soulte = Patrimoine_Net / 2 + (Récompense_Époux - Récompense_Utilisateur)"
        )?;
    }
    if let Some(disposable) = &result.disposable_income {
        writeln!(out, "Reste à vivre")?;
        writeln!(out, "  Revenus = Revenu_Net + PA_Reçue")?;
        writeln!(out, "  Charges = Impôts + Loyer_Crédit + Charges_Fixes + PA_Versée")?;
        writeln!(
            out,
            "  Seuil de pauvreté : {} / mois",
            format_amount(disposable.poverty_threshold)
        )?;
    }
    Ok(())
}

fn write_declared_data(
    out: &mut String,
    sections: &mut SectionCounter,
    facts: &FinancialFacts,
    result: &SimulationResult,
) -> fmt::Result {
    sections.open(out, "Données saisies par l'utilisateur")?;
    writeln!(out, "Situation personnelle")?;
    writeln!(out, "  - Âge de l'utilisateur : {} ans", facts.my_age)?;
    writeln!(out, "  - Âge du conjoint : {} ans", facts.spouse_age)?;
    writeln!(
        out,
        "  - Durée du mariage : {} ans",
        result.marriage_duration_used
    )?;
    if let Some(date) = facts.marriage_date {
        writeln!(out, "  - Date de mariage : {}", date.format("%d/%m/%Y"))?;
    }
    writeln!(out, "  - Nombre d'enfants : {}", facts.children_count)?;
    writeln!(
        out,
        "  - Type de garde : {}",
        custody_label(result.custody_type_used)
    )?;
    let regime = match facts.matrimonial_regime {
        MatrimonialRegime::Community => "Communauté",
        MatrimonialRegime::Separation => "Séparation de biens",
    };
    writeln!(out, "  - Régime matrimonial : {regime}")?;

    writeln!(out, "Revenus & charges mensuelles")?;
    for (label, amount) in [
        ("Revenu net (utilisateur)", facts.my_income),
        ("Revenu net (conjoint)", facts.spouse_income),
        ("Impôts mensuels", facts.my_taxes),
        ("Loyer / Crédit immobilier", facts.my_rent),
        ("Charges fixes", facts.my_charges),
    ] {
        writeln!(out, "  - {label} : {}", format_amount(amount))?;
    }

    if facts.presence.assets_value || facts.presence.assets_crd {
        writeln!(out, "Patrimoine immobilier")?;
        writeln!(
            out,
            "  - Valeur vénale du/des bien(s) : {}",
            format_amount(facts.assets_value)
        )?;
        writeln!(
            out,
            "  - Capital restant dû (CRD) : {}",
            format_amount(facts.assets_crd)
        )?;
    }
    Ok(())
}

fn write_compensatory(
    out: &mut String,
    sections: &mut SectionCounter,
    compensatory: &CompensatoryResult,
) -> fmt::Result {
    sections.open(out, "Prestation compensatoire")?;
    for line in method_lines(compensatory) {
        writeln!(
            out,
            "{} : {} (min {} / max {})",
            method_label(line.method),
            format_amount(line.estimate.value),
            format_amount(line.estimate.min),
            format_amount(line.estimate.max)
        )?;
    }
    if let Some(capital) = &compensatory.axel_depondt {
        writeln!(out, "  Capital brut : {}", format_amount(capital.raw_capital))?;
        writeln!(
            out,
            "  Plafond d'épargne du débiteur : {}",
            format_amount(capital.debtor_max_savings_capital)
        )?;
        writeln!(
            out,
            "  Mensualisé sur 8 ans : {}",
            format_amount(capital.monthly_over_8_years)
        )?;
        if capital.retirement_repair > 0.0 {
            writeln!(
                out,
                "  Réparation retraite : {}",
                format_amount(capital.retirement_repair)
            )?;
        }
    }
    match compensatory.fallback_method {
        Some(method) => writeln!(
            out,
            "Montant retenu ({} par défaut) : {}",
            method_label(method),
            format_amount(compensatory.headline)
        ),
        None => writeln!(
            out,
            "Moyenne estimée : {}",
            format_amount(compensatory.headline)
        ),
    }
}

fn write_disposable_income(
    out: &mut String,
    sections: &mut SectionCounter,
    disposable: &DisposableIncomeResult,
) -> fmt::Result {
    sections.open(out, "Reste à vivre")?;
    writeln!(
        out,
        "Reste à vivre : {} / mois",
        format_amount(disposable.net)
    )?;
    if disposable.below_poverty_threshold {
        writeln!(
            out,
            "Alerte budget : inférieur au seuil de pauvreté ({})",
            format_amount(disposable.poverty_threshold)
        )?;
    }

    let bars = budget_bars(disposable);
    let scale = chart_scale(bars.iter().map(|bar| bar.amount));
    for bar in &bars {
        let filled = ((bar.amount.abs() / scale) * BAR_WIDTH as f64).round() as usize;
        writeln!(
            out,
            "  {:<14} {:<width$} {}",
            bar.label,
            "#".repeat(filled.min(BAR_WIDTH)),
            format_amount(bar.amount),
            width = BAR_WIDTH
        )?;
    }
    Ok(())
}

fn method_label(method: CompensatoryMethod) -> &'static str {
    match method {
        CompensatoryMethod::AxelDepondt => "Calcul PC (capital)",
        CompensatoryMethod::Pilote => "Méthode Pilote",
        CompensatoryMethod::Insee => "Méthode INSEE",
        CompensatoryMethod::PaBased => "Méthode PA",
    }
}

fn custody_label(custody: CustodyMode) -> &'static str {
    match custody {
        CustodyMode::Classic => "Classique",
        CustodyMode::Alternating => "Alternée",
        CustodyMode::Reduced => "Réduite",
    }
}

/// Rate as a percentage, at most one decimal.
fn percent(rate: f64) -> String {
    plain(rate * 100.0)
}

fn plain(value: f64) -> String {
    format!("{}", (value * 10.0).round() / 10.0)
}

/// Whole euros with a space every three digits: `-1 234 €`.
pub fn format_amount(amount: f64) -> String {
    let rounded = amount.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    let sign = if rounded < 0.0 { "-" } else { "" };
    format!("{sign}{grouped} €")
}
