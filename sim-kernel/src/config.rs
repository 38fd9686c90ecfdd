// Simulation configuration: every tunable knob, all defaulted, plus the
// world-content tables so tests can build small deterministic worlds.

use serde::{Deserialize, Serialize};

use crate::competitor::{CompetitorParams, Persona};
use crate::pricing::PriceParams;
use crate::production::{
    BuildingDef, BuildingDefId, MethodId, Method, ProductionParams, default_building_defs,
    default_methods,
};
use crate::types::{
    CommodityCategory, CommodityDef, CommodityId, EntityKind, Money, Price, Quantity, Tick,
    default_commodities,
};

// === WORLD CONTENT ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingSpec {
    pub definition: BuildingDefId,
    /// Defaults to the definition's first method.
    pub method: Option<MethodId>,
    pub aggregation: u32,
}

impl BuildingSpec {
    pub fn new(definition: BuildingDefId) -> Self {
        Self {
            definition,
            method: None,
            aggregation: 1,
        }
    }

    pub fn with_aggregation(mut self, factor: u32) -> Self {
        self.aggregation = factor.max(1);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySpec {
    pub name: String,
    pub kind: EntityKind,
    pub cash: Money,
    pub persona: Option<Persona>,
    /// (commodity, quantity, unit cost) seeded into the ledger.
    pub stocks: Vec<(CommodityId, Quantity, Price)>,
    /// Seeded buildings start in `Running` state.
    pub buildings: Vec<BuildingSpec>,
}

impl EntitySpec {
    pub fn new(name: impl Into<String>, kind: EntityKind, cash: Money) -> Self {
        Self {
            name: name.into(),
            kind,
            cash,
            persona: None,
            stocks: Vec::new(),
            buildings: Vec::new(),
        }
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = Some(persona);
        self
    }

    pub fn with_stock(mut self, commodity: CommodityId, qty: Quantity, unit_cost: Price) -> Self {
        self.stocks.push((commodity, qty, unit_cost));
        self
    }

    pub fn with_building(mut self, spec: BuildingSpec) -> Self {
        self.buildings.push(spec);
        self
    }
}

// === CONFIG ===

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub rng_seed: u64,

    // scheduling
    pub base_tick_ms: u64,
    pub full_snapshot_interval: Tick,

    // books & matching
    pub max_orders_per_entity_per_commodity: usize,
    pub max_orders_per_commodity: usize,
    pub default_order_validity_ticks: Tick,
    pub expiry_sweep_interval: Tick,
    pub matching_max_pairs_per_commodity: usize,
    pub matching_full_sweep_interval: Tick,
    pub order_archive_retention_ticks: Tick,
    pub archive_sweep_interval: Tick,

    // price discovery
    pub price_history_capacity: usize,
    pub price_min_multiplier: f64,
    pub price_max_multiplier: f64,
    pub price_imbalance_threshold: f64,
    pub price_adjustment_rate: f64,
    pub supply_demand_decay: f64,

    // consumer demand
    pub demand_cycle_length: u64,
    pub demand_amplitude: f64,

    // production
    pub cash_protection_threshold: Money,
    pub auto_purchase_max_spend_ratio: f64,
    pub auto_purchase_validity_ticks: Tick,

    // competitors
    pub max_competitor_decisions_per_tick: usize,
    pub decision_interval_min: u32,
    pub decision_interval_max: u32,
    pub plan_refresh_interval: Tick,
    pub plan_request_timeout_ticks: Tick,
    pub bailout_base: Money,
    pub bailout_per_building: Money,
    pub bailout_per_aggregation_level: Money,
    pub bailout_cap: Money,

    // diagnostics
    pub profiler_capacity: usize,
    pub slow_tick_warn_us: u64,
    pub diagnostics_interval: Tick,

    // world content
    pub commodities: Vec<CommodityDef>,
    pub building_defs: Vec<BuildingDef>,
    pub methods: Vec<Method>,
    pub entities: Vec<EntitySpec>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            rng_seed: 0,
            base_tick_ms: 200,
            full_snapshot_interval: 50,
            max_orders_per_entity_per_commodity: 3,
            max_orders_per_commodity: 100,
            default_order_validity_ticks: 24,
            expiry_sweep_interval: 10,
            matching_max_pairs_per_commodity: 100,
            matching_full_sweep_interval: 5,
            order_archive_retention_ticks: 500,
            archive_sweep_interval: 100,
            price_history_capacity: 3650,
            price_min_multiplier: 0.2,
            price_max_multiplier: 5.0,
            price_imbalance_threshold: 0.05,
            price_adjustment_rate: 0.02,
            supply_demand_decay: 0.995,
            demand_cycle_length: 30,
            demand_amplitude: 0.3,
            cash_protection_threshold: 1_000_000,
            auto_purchase_max_spend_ratio: 0.30,
            auto_purchase_validity_ticks: 20,
            max_competitor_decisions_per_tick: 2,
            decision_interval_min: 15,
            decision_interval_max: 35,
            plan_refresh_interval: 120,
            plan_request_timeout_ticks: 100,
            bailout_base: 100_000_000,
            bailout_per_building: 20_000_000,
            bailout_per_aggregation_level: 30_000_000,
            bailout_cap: 300_000_000,
            profiler_capacity: 1000,
            slow_tick_warn_us: 50_000,
            diagnostics_interval: 200,
            commodities: default_commodities(),
            building_defs: default_building_defs(),
            methods: default_methods(),
            entities: default_entities(),
        }
    }
}

impl SimConfig {
    /// Default knobs with caller-provided world content.
    pub fn with_entities(entities: Vec<EntitySpec>) -> Self {
        Self {
            entities,
            ..Self::default()
        }
    }

    pub fn price_params(&self) -> PriceParams {
        PriceParams {
            min_multiplier: self.price_min_multiplier,
            max_multiplier: self.price_max_multiplier,
            imbalance_threshold: self.price_imbalance_threshold,
            adjustment_rate: self.price_adjustment_rate,
            decay: self.supply_demand_decay,
        }
    }

    pub fn production_params(&self) -> ProductionParams {
        ProductionParams {
            cash_protection_threshold: self.cash_protection_threshold,
            auto_purchase_max_spend_ratio: self.auto_purchase_max_spend_ratio,
            auto_purchase_validity_ticks: self.auto_purchase_validity_ticks,
        }
    }

    pub fn competitor_params(&self) -> CompetitorParams {
        CompetitorParams {
            max_decisions_per_tick: self.max_competitor_decisions_per_tick,
            decision_interval_min: self.decision_interval_min,
            decision_interval_max: self.decision_interval_max,
            plan_refresh_interval: self.plan_refresh_interval,
            order_validity_ticks: self.default_order_validity_ticks,
            bailout_base: self.bailout_base,
            bailout_per_building: self.bailout_per_building,
            bailout_per_aggregation_level: self.bailout_per_aggregation_level,
            bailout_cap: self.bailout_cap,
        }
    }
}

/// Default world: one player with a modest industrial start and three
/// competitors with distinct temperaments and scale.
fn default_entities() -> Vec<EntitySpec> {
    use crate::production::building_def::*;
    use crate::types::commodity::*;

    vec![
        EntitySpec::new("Player Industries", EntityKind::Player, 500_000_000)
            .with_stock(STEEL, 50, 8_000)
            .with_stock(MACHINERY, 5, 60_000)
            .with_building(BuildingSpec::new(FARM))
            .with_building(BuildingSpec::new(STEEL_MILL)),
        EntitySpec::new("Vulcan Heavy", EntityKind::Competitor, 800_000_000)
            .with_persona(
                Persona::new(0.85, 0.7)
                    .with_industry(CommodityCategory::Intermediate)
                    .with_industry(CommodityCategory::RawMaterial),
            )
            .with_stock(IRON_ORE, 400, 2_000)
            .with_stock(COAL, 300, 1_500)
            .with_building(BuildingSpec::new(IRON_MINE).with_aggregation(3))
            .with_building(BuildingSpec::new(STEEL_MILL).with_aggregation(2)),
        EntitySpec::new("Harvest Group", EntityKind::Competitor, 600_000_000)
            .with_persona(
                Persona::new(0.3, 0.4)
                    .with_industry(CommodityCategory::Staple),
            )
            .with_stock(GRAIN, 500, 1_200)
            .with_building(BuildingSpec::new(FARM).with_aggregation(4))
            .with_building(BuildingSpec::new(FOOD_PLANT).with_aggregation(2)),
        EntitySpec::new("Nova Systems", EntityKind::Competitor, 1_000_000_000)
            .with_persona(
                Persona::new(0.55, 0.8)
                    .with_industry(CommodityCategory::Industrial)
                    .with_industry(CommodityCategory::Luxury),
            )
            .with_stock(COPPER, 200, 4_500)
            .with_stock(STEEL, 100, 8_000)
            .with_building(BuildingSpec::new(COPPER_MINE).with_aggregation(2))
            .with_building(BuildingSpec::new(ELECTRONICS_FACTORY).with_aggregation(2)),
    ]
}
