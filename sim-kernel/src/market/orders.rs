use serde::{Deserialize, Serialize};

use crate::types::{CommodityId, EntityId, Money, OrderId, Price, Quantity, Tick, TradeId};

// === ORDERS ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Partial,
    Filled,
    Cancelled,
    Expired,
}

impl OrderStatus {
    pub fn is_active(self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::Partial)
    }
}

/// A resting limit order. Owned by its book while active, by the archive once
/// terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub owner: EntityId,
    pub commodity: CommodityId,
    pub side: Side,
    pub quantity: Quantity,
    pub remaining: Quantity,
    pub unit_price: Price,
    pub status: OrderStatus,
    pub created_tick: Tick,
    pub expiry_tick: Tick,
    pub updated_tick: Tick,
}

impl Order {
    pub fn filled_quantity(&self) -> Quantity {
        self.quantity - self.remaining
    }
}

// === TRADES ===

/// Append-only trade log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub commodity: CommodityId,
    pub buyer: EntityId,
    pub seller: EntityId,
    pub buy_order: OrderId,
    pub sell_order: OrderId,
    pub quantity: Quantity,
    pub unit_price: Price,
    pub total: Money,
    pub tick: Tick,
}

/// Per-commodity traded volume within one tick. `buy`/`sell` attribute the
/// player's side; `total` counts every trade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickVolume {
    pub total: Quantity,
    pub buy: Quantity,
    pub sell: Quantity,
}

impl TickVolume {
    pub fn is_zero(&self) -> bool {
        self.total == 0
    }
}
