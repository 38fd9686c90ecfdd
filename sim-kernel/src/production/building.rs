// Building definitions (content) and building instances (simulation state)

use serde::{Deserialize, Serialize};

use crate::ring::RingBuffer;
use crate::types::{CommodityCategory, CommodityId, EntityId, Money, Quantity};

use super::recipe::{MethodId, method};

// === BUILDING DEFINITION (CONTENT) ===

pub type BuildingDefId = u16;

/// Immutable definition of a building type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingDef {
    pub id: BuildingDefId,
    pub name: String,
    /// Industry tag used by competitor industry preferences.
    pub category: CommodityCategory,
    /// Charged up front on purchase.
    pub labor_cost: Money,
    pub construction_ticks: u32,
    pub construction_materials: Vec<(CommodityId, Quantity)>,
    pub monthly_maintenance: Money,
    /// Methods runnable in this building; the first is the default.
    pub methods: Vec<MethodId>,
}

impl BuildingDef {
    pub fn new(id: BuildingDefId, name: impl Into<String>, labor_cost: Money) -> Self {
        Self {
            id,
            name: name.into(),
            category: CommodityCategory::RawMaterial,
            labor_cost,
            construction_ticks: 10,
            construction_materials: Vec::new(),
            monthly_maintenance: 30_000,
            methods: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: CommodityCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_construction(mut self, ticks: u32) -> Self {
        self.construction_ticks = ticks;
        self
    }

    pub fn with_material(mut self, commodity: CommodityId, qty: Quantity) -> Self {
        self.construction_materials.push((commodity, qty));
        self
    }

    pub fn with_maintenance(mut self, monthly: Money) -> Self {
        self.monthly_maintenance = monthly;
        self
    }

    pub fn with_method(mut self, method: MethodId) -> Self {
        self.methods.push(method);
        self
    }

    pub fn default_method(&self) -> Option<MethodId> {
        self.methods.first().copied()
    }
}

/// Well-known building def ids for the default world.
pub mod building_def {
    use super::BuildingDefId;

    pub const FARM: BuildingDefId = 0;
    pub const IRON_MINE: BuildingDefId = 1;
    pub const COAL_MINE: BuildingDefId = 2;
    pub const COPPER_MINE: BuildingDefId = 3;
    pub const STEEL_MILL: BuildingDefId = 4;
    pub const FOOD_PLANT: BuildingDefId = 5;
    pub const REFINERY: BuildingDefId = 6;
    pub const ELECTRONICS_FACTORY: BuildingDefId = 7;
    pub const MACHINERY_WORKS: BuildingDefId = 8;
    pub const CONSUMER_GOODS_FACTORY: BuildingDefId = 9;
}

/// Default building catalog. Id must equal the index in the returned table.
pub fn default_building_defs() -> Vec<BuildingDef> {
    use CommodityCategory::*;
    use crate::types::commodity::*;
    use building_def::*;

    vec![
        BuildingDef::new(FARM, "Farm", 2_000_000)
            .with_category(Staple)
            .with_construction(8)
            .with_material(MACHINERY, 1)
            .with_maintenance(20_000)
            .with_method(method::GROW_GRAIN),
        BuildingDef::new(IRON_MINE, "Iron Mine", 5_000_000)
            .with_category(RawMaterial)
            .with_construction(12)
            .with_material(MACHINERY, 2)
            .with_material(STEEL, 10)
            .with_maintenance(45_000)
            .with_method(method::MINE_IRON),
        BuildingDef::new(COAL_MINE, "Coal Mine", 4_500_000)
            .with_category(RawMaterial)
            .with_construction(12)
            .with_material(MACHINERY, 2)
            .with_material(STEEL, 8)
            .with_maintenance(40_000)
            .with_method(method::MINE_COAL),
        BuildingDef::new(COPPER_MINE, "Copper Mine", 5_500_000)
            .with_category(RawMaterial)
            .with_construction(12)
            .with_material(MACHINERY, 2)
            .with_material(STEEL, 10)
            .with_maintenance(48_000)
            .with_method(method::MINE_COPPER),
        BuildingDef::new(STEEL_MILL, "Steel Mill", 9_000_000)
            .with_category(Intermediate)
            .with_construction(16)
            .with_material(MACHINERY, 3)
            .with_material(STEEL, 20)
            .with_maintenance(80_000)
            .with_method(method::SMELT_STEEL),
        BuildingDef::new(FOOD_PLANT, "Food Plant", 3_500_000)
            .with_category(Staple)
            .with_construction(10)
            .with_material(MACHINERY, 2)
            .with_maintenance(30_000)
            .with_method(method::PROCESS_FOOD),
        BuildingDef::new(REFINERY, "Refinery", 7_000_000)
            .with_category(Intermediate)
            .with_construction(14)
            .with_material(MACHINERY, 2)
            .with_material(STEEL, 15)
            .with_maintenance(60_000)
            .with_method(method::REFINE_FUEL),
        BuildingDef::new(ELECTRONICS_FACTORY, "Electronics Factory", 12_000_000)
            .with_category(Industrial)
            .with_construction(18)
            .with_material(MACHINERY, 4)
            .with_material(STEEL, 25)
            .with_maintenance(100_000)
            .with_method(method::ASSEMBLE_ELECTRONICS),
        BuildingDef::new(MACHINERY_WORKS, "Machinery Works", 15_000_000)
            .with_category(Industrial)
            .with_construction(20)
            .with_material(STEEL, 40)
            .with_maintenance(120_000)
            .with_method(method::BUILD_MACHINERY),
        BuildingDef::new(CONSUMER_GOODS_FACTORY, "Consumer Goods Factory", 10_000_000)
            .with_category(Luxury)
            .with_construction(16)
            .with_material(MACHINERY, 3)
            .with_material(STEEL, 20)
            .with_maintenance(90_000)
            .with_method(method::MAKE_CONSUMER_GOODS),
    ]
}

// === BUILDING INSTANCE (SIMULATION STATE) ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildingStatus {
    UnderConstruction,
    WaitingMaterials,
    Running,
    Paused,
    NoInput,
    NoPower,
}

impl BuildingStatus {
    /// Maintenance cost scaling by operational state.
    pub fn maintenance_multiplier(self) -> f64 {
        match self {
            BuildingStatus::Running => 1.0,
            BuildingStatus::NoInput | BuildingStatus::NoPower => 0.5,
            BuildingStatus::Paused
            | BuildingStatus::WaitingMaterials
            | BuildingStatus::UnderConstruction => 0.25,
        }
    }
}

/// How many production cycles feed the rolling profit figure in the
/// per-tick financial summary.
pub const CYCLE_WINDOW: usize = 5;

#[derive(Debug, Clone)]
pub struct Building {
    pub def: BuildingDefId,
    pub owner: EntityId,
    pub status: BuildingStatus,
    pub method: MethodId,
    /// Fractional ticks accumulated toward the current cycle.
    pub progress: f64,
    /// Each instance stands for this many equivalent plants (>= 1).
    pub aggregation_factor: u32,
    pub efficiency: f64,
    pub utilization: f64,
    pub construction_progress: u32,
    pub construction_ticks_required: u32,
    /// Construction materials still to be consumed.
    pub pending_materials: Vec<(CommodityId, Quantity)>,
    /// Inputs for the current cycle are held under a production reservation.
    pub inputs_reserved: bool,
    /// Net result of recent completed cycles.
    pub recent_cycles: RingBuffer<Money>,
}

impl Building {
    pub fn new(def: &BuildingDef, owner: EntityId, method: MethodId) -> Self {
        Self {
            def: def.id,
            owner,
            status: BuildingStatus::UnderConstruction,
            method,
            progress: 0.0,
            aggregation_factor: 1,
            efficiency: 1.0,
            utilization: 0.5,
            construction_progress: 0,
            construction_ticks_required: def.construction_ticks,
            pending_materials: Vec::new(),
            inputs_reserved: false,
            recent_cycles: RingBuffer::with_capacity(CYCLE_WINDOW)
                .expect("CYCLE_WINDOW is nonzero"),
        }
    }

    pub fn with_aggregation(mut self, factor: u32) -> Self {
        self.aggregation_factor = factor.max(1);
        self
    }

    pub fn with_status(mut self, status: BuildingStatus) -> Self {
        self.status = status;
        self
    }

    /// Average net over the recent cycle window, if any cycles completed.
    pub fn rolling_cycle_net(&self) -> Option<Money> {
        if self.recent_cycles.is_empty() {
            return None;
        }
        let sum: Money = self.recent_cycles.iter().sum();
        Some(sum / self.recent_cycles.len() as Money)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Entity, Ledger};
    use crate::types::EntityKind;

    #[test]
    fn catalog_ids_match_indices() {
        for (i, def) in default_building_defs().iter().enumerate() {
            assert_eq!(def.id as usize, i, "{} id out of place", def.name);
        }
    }

    #[test]
    fn every_def_has_a_default_method() {
        for def in default_building_defs() {
            assert!(def.default_method().is_some(), "{} has no method", def.name);
        }
    }

    #[test]
    fn maintenance_multipliers() {
        assert_eq!(BuildingStatus::Running.maintenance_multiplier(), 1.0);
        assert_eq!(BuildingStatus::NoInput.maintenance_multiplier(), 0.5);
        assert_eq!(BuildingStatus::Paused.maintenance_multiplier(), 0.25);
        assert_eq!(
            BuildingStatus::WaitingMaterials.maintenance_multiplier(),
            0.25
        );
    }

    #[test]
    fn rolling_cycle_net_averages_the_window() {
        let mut ledger = Ledger::new();
        let owner = ledger.add_entity(Entity::new("A", EntityKind::Player, 0));
        let defs = default_building_defs();
        let mut b = Building::new(&defs[0], owner, method::GROW_GRAIN);

        assert_eq!(b.rolling_cycle_net(), None);
        for net in [100, 200, 300, 400, 500, 600] {
            b.recent_cycles.push(net);
        }
        // window of 5: 200..=600
        assert_eq!(b.rolling_cycle_net(), Some(400));
    }
}
