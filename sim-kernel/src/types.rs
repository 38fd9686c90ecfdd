use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

// ============================================================================
// Scalar aliases - money is integer minor units, never floats
// ============================================================================

/// One discrete simulation step (one simulated day).
pub type Tick = u64;
/// Cash amount in integer minor units.
pub type Money = i64;
/// Unit price in integer minor units.
pub type Price = i64;
/// Goods quantity.
pub type Quantity = u32;
/// Dense index into the commodity table.
pub type CommodityId = u16;
/// Monotonically unique within a run.
pub type OrderId = u64;
pub type TradeId = u64;

// ============================================================================
// IDs - slotmap generational keys for arena-stored state
// ============================================================================

new_key_type! {
    pub struct EntityId;
    pub struct BuildingId;
}

/// Stable numeric form of an arena key, for hashing and external records.
pub trait KeyToU64 {
    fn to_u64(self) -> u64;
}

impl KeyToU64 for EntityId {
    fn to_u64(self) -> u64 {
        self.0.as_ffi()
    }
}

impl KeyToU64 for BuildingId {
    fn to_u64(self) -> u64 {
        self.0.as_ffi()
    }
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Player,
    Competitor,
}

// ============================================================================
// Commodities - the goods that flow through the economy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommodityCategory {
    /// Everyday consumables; highest background demand.
    Staple,
    /// Raw extraction outputs.
    RawMaterial,
    /// Intermediate processed goods.
    Intermediate,
    /// Finished industrial goods.
    Industrial,
    /// Low-volume, high-margin goods.
    Luxury,
}

impl CommodityCategory {
    /// Baseline consumer demand per tick for goods of this category.
    pub fn base_demand_rate(&self) -> f64 {
        match self {
            CommodityCategory::Staple => 120.0,
            CommodityCategory::RawMaterial => 40.0,
            CommodityCategory::Intermediate => 25.0,
            CommodityCategory::Industrial => 15.0,
            CommodityCategory::Luxury => 6.0,
        }
    }

    pub fn all() -> impl Iterator<Item = CommodityCategory> {
        [
            CommodityCategory::Staple,
            CommodityCategory::RawMaterial,
            CommodityCategory::Intermediate,
            CommodityCategory::Industrial,
            CommodityCategory::Luxury,
        ]
        .into_iter()
    }
}

/// Immutable definition of a tradable commodity.
/// This is content/configuration, not simulation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommodityDef {
    pub id: CommodityId,
    pub name: String,
    /// Anchor price in minor units; price discovery clamps around it.
    pub base_price: Price,
    pub category: CommodityCategory,
    /// Per-tick background consumer demand. 0 means "use the category rate".
    pub consumer_rate: f64,
}

impl CommodityDef {
    pub fn new(id: CommodityId, name: impl Into<String>, base_price: Price) -> Self {
        Self {
            id,
            name: name.into(),
            base_price,
            category: CommodityCategory::RawMaterial,
            consumer_rate: 0.0,
        }
    }

    pub fn with_category(mut self, category: CommodityCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_consumer_rate(mut self, rate: f64) -> Self {
        self.consumer_rate = rate;
        self
    }

    /// Effective background demand rate, falling back to the category rate.
    pub fn demand_rate(&self) -> f64 {
        if self.consumer_rate > 0.0 {
            self.consumer_rate
        } else {
            self.category.base_demand_rate()
        }
    }
}

/// Well-known commodity ids for the default world.
pub mod commodity {
    use super::CommodityId;

    pub const GRAIN: CommodityId = 0;
    pub const FOOD: CommodityId = 1;
    pub const IRON_ORE: CommodityId = 2;
    pub const COAL: CommodityId = 3;
    pub const STEEL: CommodityId = 4;
    pub const COPPER: CommodityId = 5;
    pub const ELECTRONICS: CommodityId = 6;
    pub const MACHINERY: CommodityId = 7;
    pub const FUEL: CommodityId = 8;
    pub const CONSUMER_GOODS: CommodityId = 9;
}

/// Default commodity catalog. Id must equal the index in the returned table.
pub fn default_commodities() -> Vec<CommodityDef> {
    use CommodityCategory::*;
    use commodity::*;

    vec![
        CommodityDef::new(GRAIN, "Grain", 1_200).with_category(Staple),
        CommodityDef::new(FOOD, "Food", 3_500).with_category(Staple),
        CommodityDef::new(IRON_ORE, "Iron Ore", 2_000).with_category(RawMaterial),
        CommodityDef::new(COAL, "Coal", 1_500).with_category(RawMaterial),
        CommodityDef::new(STEEL, "Steel", 8_000).with_category(Intermediate),
        CommodityDef::new(COPPER, "Copper", 4_500).with_category(RawMaterial),
        CommodityDef::new(ELECTRONICS, "Electronics", 25_000).with_category(Industrial),
        CommodityDef::new(MACHINERY, "Machinery", 60_000).with_category(Industrial),
        CommodityDef::new(FUEL, "Fuel", 2_800).with_category(Intermediate),
        CommodityDef::new(CONSUMER_GOODS, "Consumer Goods", 15_000).with_category(Luxury),
    ]
}
