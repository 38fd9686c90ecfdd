// Production methods for the industrial chains

use serde::{Deserialize, Serialize};

use crate::types::{CommodityId, Quantity};

// === METHOD ID ===

pub type MethodId = u16;

// === METHOD ===

/// A production method converts input commodities into outputs over a number
/// of ticks. Effective amounts scale with research multipliers and the
/// building's aggregation factor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Method {
    pub id: MethodId,
    pub name: String,
    /// Consumed per cycle, per aggregated plant.
    pub inputs: Vec<(CommodityId, Quantity)>,
    /// Emitted per cycle, per aggregated plant.
    pub outputs: Vec<(CommodityId, Quantity)>,
    pub ticks_required: u32,
}

impl Method {
    pub fn new(id: MethodId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            ticks_required: 1,
        }
    }

    pub fn with_input(mut self, commodity: CommodityId, qty: Quantity) -> Self {
        self.inputs.push((commodity, qty));
        self
    }

    pub fn with_output(mut self, commodity: CommodityId, qty: Quantity) -> Self {
        self.outputs.push((commodity, qty));
        self
    }

    pub fn with_ticks(mut self, ticks: u32) -> Self {
        self.ticks_required = ticks.max(1);
        self
    }
}

/// Effective per-cycle amount: `amount × multiplier × aggregation_factor`,
/// rounded to whole units.
pub fn scaled_amount(amount: Quantity, multiplier: f64, aggregation: u32) -> Quantity {
    (amount as f64 * multiplier * aggregation as f64).round() as Quantity
}

/// Well-known method ids for the default world.
pub mod method {
    use super::MethodId;

    pub const GROW_GRAIN: MethodId = 0;
    pub const MINE_IRON: MethodId = 1;
    pub const MINE_COAL: MethodId = 2;
    pub const MINE_COPPER: MethodId = 3;
    pub const SMELT_STEEL: MethodId = 4;
    pub const PROCESS_FOOD: MethodId = 5;
    pub const REFINE_FUEL: MethodId = 6;
    pub const ASSEMBLE_ELECTRONICS: MethodId = 7;
    pub const BUILD_MACHINERY: MethodId = 8;
    pub const MAKE_CONSUMER_GOODS: MethodId = 9;
}

/// Default method catalog. Id must equal the index in the returned table.
pub fn default_methods() -> Vec<Method> {
    use crate::types::commodity::*;
    use method::*;

    vec![
        Method::new(GROW_GRAIN, "Grow Grain")
            .with_output(GRAIN, 6)
            .with_ticks(2),
        Method::new(MINE_IRON, "Mine Iron Ore")
            .with_output(IRON_ORE, 4)
            .with_ticks(2),
        Method::new(MINE_COAL, "Mine Coal")
            .with_output(COAL, 4)
            .with_ticks(2),
        Method::new(MINE_COPPER, "Mine Copper")
            .with_output(COPPER, 3)
            .with_ticks(2),
        Method::new(SMELT_STEEL, "Smelt Steel")
            .with_input(IRON_ORE, 2)
            .with_input(COAL, 1)
            .with_output(STEEL, 1)
            .with_ticks(3),
        Method::new(PROCESS_FOOD, "Process Food")
            .with_input(GRAIN, 3)
            .with_output(FOOD, 2)
            .with_ticks(2),
        Method::new(REFINE_FUEL, "Refine Fuel")
            .with_input(COAL, 2)
            .with_output(FUEL, 2)
            .with_ticks(2),
        Method::new(ASSEMBLE_ELECTRONICS, "Assemble Electronics")
            .with_input(COPPER, 2)
            .with_input(STEEL, 1)
            .with_output(ELECTRONICS, 1)
            .with_ticks(4),
        Method::new(BUILD_MACHINERY, "Build Machinery")
            .with_input(STEEL, 3)
            .with_input(ELECTRONICS, 1)
            .with_output(MACHINERY, 1)
            .with_ticks(6),
        Method::new(MAKE_CONSUMER_GOODS, "Make Consumer Goods")
            .with_input(ELECTRONICS, 1)
            .with_input(FOOD, 1)
            .with_output(CONSUMER_GOODS, 1)
            .with_ticks(3),
    ]
}
