mod constants;
mod engine;
mod error;
mod normalize;
mod selection;
mod types;

pub use constants::{
    AgeBracket, CapitalConstants, CoefficientRange, ConstantsTable, CustodyRateTable,
    MAX_RATED_CHILDREN,
};
pub use engine::{
    EngineContext, child_support, disposable_income, liquidation, resolve_marriage_duration,
    round_currency, simulate, simulate_facts,
};
pub use error::{ConfigError, EngineError};
pub use normalize::normalize;
pub use selection::{
    CalculationCategory, CalculationSelection, CompensatoryMethod, SelectionPreset,
    expose_compensatory, headline,
};
pub use types::{
    BudgetBreakdown, CapitalEstimate, ChildSupportResult, CompensatoryEstimates,
    CompensatoryResult, CustodyMode, DisposableIncomeResult, FieldPresence, FinancialFacts,
    IncomeMode, LiquidationResult, MatrimonialRegime, MethodEstimate, Party, PartyProjection,
    SimulationResult, SupportDirection,
};
