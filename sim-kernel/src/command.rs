// Inbound command surface and the outbound per-tick update record.
// Commands queue up and are applied at the start of the next tick, never
// mid-tick.

use serde::{Deserialize, Serialize};

use crate::market::{Side, TickVolume, Trade};
use crate::pricing::PriceChange;
use crate::production::{BuildingDelta, ShortageReport};
use crate::scheduler::Speed;
use crate::types::{
    BuildingId, CommodityId, EntityId, Money, OrderId, Price, Quantity, Tick,
};

// === COMMANDS ===

#[derive(Debug, Clone)]
pub enum Command {
    Pause,
    Resume,
    SetSpeed(Speed),
    Reset,
    PurchaseBuilding {
        entity: EntityId,
        definition: u16,
    },
    SubmitOrder {
        entity: EntityId,
        commodity: CommodityId,
        side: Side,
        qty: Quantity,
        unit_price: Price,
        validity_ticks: Tick,
    },
    CancelOrder {
        entity: EntityId,
        order_id: OrderId,
    },
    SwitchMethod {
        entity: EntityId,
        building: BuildingId,
        method: u16,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    InsufficientCash,
    InsufficientReserved,
    UnknownEntity,
    UnknownCommodity,
    UnknownDefinition,
    UnknownOrder,
    UnknownBuilding,
    UnknownMethod,
    InvalidQuantity,
    InvalidPrice,
    NotOwner,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandOutcome {
    Accepted,
    OrderAccepted {
        order_id: OrderId,
    },
    BuildingAccepted {
        building_id: BuildingId,
        labor_cost_charged: Money,
        missing_materials: Vec<(CommodityId, Quantity)>,
    },
    Rejected {
        reason: RejectReason,
    },
}

// === TICK UPDATE ===

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub income: Money,
    pub input_cost: Money,
    pub maintenance: Money,
    pub net: Money,
    /// Rolling average net over the last 5 production cycles, per player
    /// building that has completed at least one cycle.
    pub building_cycle_avg: Vec<(BuildingId, Money)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketChange {
    pub commodity: CommodityId,
    pub old: Price,
    pub new: Price,
}

impl From<PriceChange> for MarketChange {
    fn from(c: PriceChange) -> Self {
        Self {
            commodity: c.commodity,
            old: c.old,
            new: c.new,
        }
    }
}

/// Full snapshot every `full_snapshot_interval` ticks, deltas in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PriceSnapshot {
    Full(Vec<(CommodityId, Price)>),
    Delta(Vec<(CommodityId, Price)>),
}

/// Everything the outside world learns about one tick. Delivery channel is
/// out of scope; the kernel only builds the record and hands it to the
/// persistence sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickUpdate {
    pub tick: Tick,
    pub wall_ms: u64,
    pub player_cash: Money,
    pub building_count: usize,
    pub financial: FinancialSummary,
    pub market_changes: Vec<MarketChange>,
    pub prices: PriceSnapshot,
    pub trades: Vec<Trade>,
    /// Only commodities that actually traded this tick.
    pub volumes: Vec<(CommodityId, TickVolume)>,
    pub building_deltas: Vec<BuildingDelta>,
    pub shortages: Vec<ShortageReport>,
    /// Competitors bailed out this tick and the transfer amounts.
    pub bailouts: Vec<(EntityId, Money)>,
}
