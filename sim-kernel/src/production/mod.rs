pub mod building;
pub mod engine;
pub mod recipe;

pub use building::{
    Building, BuildingDef, BuildingDefId, BuildingStatus, CYCLE_WINDOW, building_def,
    default_building_defs,
};
pub use engine::{
    BuildingDelta, CycleCompletion, Multipliers, ProductionEngine, ProductionParams,
    ResearchEffects, ShortageReport, StepOutput,
};
pub use recipe::{Method, MethodId, default_methods, method, scaled_amount};
