use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::competitor::Persona;
use crate::error::{SimError, SimResult};
use crate::types::{CommodityId, EntityId, EntityKind, Money, Price, Quantity, Tick, TradeId};

// === STOCK ===

/// Per-entity holding of one commodity.
///
/// Invariant at tick boundaries:
/// `reserved_for_sale + reserved_for_production <= quantity`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Stock {
    pub quantity: Quantity,
    /// Earmarked by resting sell orders.
    pub reserved_for_sale: Quantity,
    /// Earmarked by pending recipe cycles.
    pub reserved_for_production: Quantity,
    /// Quantity-weighted mean cost of inbound lots. Advisory: feeds production
    /// output cost basis, never trade validation.
    pub avg_cost: f64,
}

impl Stock {
    /// Quantity not earmarked for either purpose.
    pub fn available(&self) -> Quantity {
        self.quantity
            .saturating_sub(self.reserved_for_sale)
            .saturating_sub(self.reserved_for_production)
    }
}

// === ENTITY ===

/// An economic actor: the player or an autonomous competitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub kind: EntityKind,
    /// Minor units. May dip negative only on the maintenance/bailout path.
    pub cash: Money,
    /// BTreeMap so snapshot iteration is deterministic.
    pub stocks: BTreeMap<CommodityId, Stock>,
    pub persona: Option<Persona>,
}

impl Entity {
    pub fn new(name: impl Into<String>, kind: EntityKind, cash: Money) -> Self {
        Self {
            name: name.into(),
            kind,
            cash,
            stocks: BTreeMap::new(),
            persona: None,
        }
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = Some(persona);
        self
    }

    pub fn stock(&self, commodity: CommodityId) -> Stock {
        self.stocks.get(&commodity).copied().unwrap_or_default()
    }
}

// === LEDGER ===

/// Authoritative store of entity cash and goods balances.
///
/// Every operation is all-or-nothing: on failure the ledger is unchanged and
/// the caller receives a typed error. Nothing in here is silently corrective.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    entities: SlotMap<EntityId, Entity>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entity(&mut self, entity: Entity) -> EntityId {
        self.entities.insert(entity)
    }

    pub fn get(&self, id: EntityId) -> SimResult<&Entity> {
        self.entities.get(id).ok_or(SimError::UnknownEntity)
    }

    pub fn get_mut(&mut self, id: EntityId) -> SimResult<&mut Entity> {
        self.entities.get_mut(id).ok_or(SimError::UnknownEntity)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(id)
    }

    /// Deterministic (slot-order) iteration.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn cash(&self, id: EntityId) -> SimResult<Money> {
        Ok(self.get(id)?.cash)
    }

    pub fn available_quantity(&self, id: EntityId, commodity: CommodityId) -> SimResult<Quantity> {
        Ok(self.get(id)?.stock(commodity).available())
    }

    // === GOODS ===

    /// Credit goods, blending `unit_cost` into the weighted average cost.
    pub fn add_goods(
        &mut self,
        id: EntityId,
        commodity: CommodityId,
        qty: Quantity,
        unit_cost: Price,
        tick: Tick,
        reason: &str,
    ) -> SimResult<()> {
        if qty == 0 {
            return Err(SimError::InvalidQuantity(qty));
        }
        let entity = self.get_mut(id)?;
        let stock = entity.stocks.entry(commodity).or_default();
        let old_qty = stock.quantity as f64;
        let new_qty = old_qty + qty as f64;
        stock.avg_cost = (old_qty * stock.avg_cost + qty as f64 * unit_cost as f64) / new_qty;
        stock.quantity += qty;

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "ledger_goods",
            tick = tick,
            commodity = commodity,
            qty = qty,
            unit_cost = unit_cost,
            direction = "in",
            reason = reason,
        );
        let _ = (tick, reason);
        Ok(())
    }

    /// Debit goods. Draws on the entity's own production reservation first;
    /// sale-reserved stock is untouchable.
    pub fn consume_goods(
        &mut self,
        id: EntityId,
        commodity: CommodityId,
        qty: Quantity,
        tick: Tick,
        reason: &str,
    ) -> SimResult<()> {
        if qty == 0 {
            return Err(SimError::InvalidQuantity(qty));
        }
        let entity = self.get_mut(id)?;
        let stock = entity.stocks.entry(commodity).or_default();
        let consumable = stock.quantity.saturating_sub(stock.reserved_for_sale);
        if qty > consumable {
            return Err(SimError::InsufficientStock {
                commodity,
                needed: qty,
                available: consumable,
            });
        }
        stock.quantity -= qty;
        let from_reservation = stock.reserved_for_production.min(qty);
        stock.reserved_for_production -= from_reservation;

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "ledger_goods",
            tick = tick,
            commodity = commodity,
            qty = qty,
            direction = "out",
            reason = reason,
        );
        let _ = (tick, reason);
        Ok(())
    }

    // === RESERVATIONS ===

    pub fn reserve_for_sale(
        &mut self,
        id: EntityId,
        commodity: CommodityId,
        qty: Quantity,
        _tick: Tick,
    ) -> SimResult<()> {
        let entity = self.get_mut(id)?;
        let stock = entity.stocks.entry(commodity).or_default();
        let free = stock.available();
        if qty > free {
            return Err(SimError::InsufficientFree {
                commodity,
                needed: qty,
                free,
            });
        }
        stock.reserved_for_sale += qty;
        Ok(())
    }

    pub fn release_sale_reservation(
        &mut self,
        id: EntityId,
        commodity: CommodityId,
        qty: Quantity,
        _tick: Tick,
    ) -> SimResult<()> {
        let entity = self.get_mut(id)?;
        let stock = entity.stocks.entry(commodity).or_default();
        if qty > stock.reserved_for_sale {
            return Err(SimError::InsufficientReserved {
                commodity,
                needed: qty,
                reserved: stock.reserved_for_sale,
            });
        }
        stock.reserved_for_sale -= qty;
        Ok(())
    }

    pub fn reserve_for_production(
        &mut self,
        id: EntityId,
        commodity: CommodityId,
        qty: Quantity,
        _tick: Tick,
    ) -> SimResult<()> {
        let entity = self.get_mut(id)?;
        let stock = entity.stocks.entry(commodity).or_default();
        let free = stock.available();
        if qty > free {
            return Err(SimError::InsufficientFree {
                commodity,
                needed: qty,
                free,
            });
        }
        stock.reserved_for_production += qty;
        Ok(())
    }

    pub fn release_production_reservation(
        &mut self,
        id: EntityId,
        commodity: CommodityId,
        qty: Quantity,
        _tick: Tick,
    ) -> SimResult<()> {
        let entity = self.get_mut(id)?;
        let stock = entity.stocks.entry(commodity).or_default();
        if qty > stock.reserved_for_production {
            return Err(SimError::InsufficientReserved {
                commodity,
                needed: qty,
                reserved: stock.reserved_for_production,
            });
        }
        stock.reserved_for_production -= qty;
        Ok(())
    }

    // === CASH ===

    pub fn add_cash(&mut self, id: EntityId, amount: Money) -> SimResult<()> {
        self.get_mut(id)?.cash += amount;
        Ok(())
    }

    /// Fails rather than letting the balance go negative.
    pub fn deduct_cash(&mut self, id: EntityId, amount: Money) -> SimResult<()> {
        let entity = self.get_mut(id)?;
        if entity.cash < amount {
            return Err(SimError::InsufficientCash {
                needed: amount,
                available: entity.cash,
            });
        }
        entity.cash -= amount;
        Ok(())
    }

    /// Maintenance/bailout pathway: may push the balance negative. The bailout
    /// rule restores competitors on the same tick.
    pub fn charge_cash(&mut self, id: EntityId, amount: Money) -> SimResult<()> {
        self.get_mut(id)?.cash -= amount;
        Ok(())
    }

    // === TRADE SETTLEMENT ===

    /// Buyer leg of a trade: debit cash, credit goods at the trade price.
    pub fn complete_purchase(
        &mut self,
        buyer: EntityId,
        commodity: CommodityId,
        qty: Quantity,
        unit_price: Price,
        tick: Tick,
        trade_id: TradeId,
    ) -> SimResult<()> {
        let total = qty as Money * unit_price;
        self.deduct_cash(buyer, total)?;
        // add_goods cannot fail after the cash check (qty validated by caller),
        // but restore the debit if it ever does so the op stays atomic.
        if let Err(e) = self.add_goods(buyer, commodity, qty, unit_price, tick, "trade") {
            self.add_cash(buyer, total)?;
            return Err(e);
        }

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "settlement",
            tick = tick,
            trade_id = trade_id,
            commodity = commodity,
            qty = qty,
            unit_price = unit_price,
            leg = "purchase",
        );
        let _ = trade_id;
        Ok(())
    }

    /// Seller leg of a trade: consume from the sale reservation, credit cash.
    pub fn complete_sale(
        &mut self,
        seller: EntityId,
        commodity: CommodityId,
        qty: Quantity,
        unit_price: Price,
        tick: Tick,
        trade_id: TradeId,
    ) -> SimResult<()> {
        let entity = self.get_mut(seller)?;
        let stock = entity.stocks.entry(commodity).or_default();
        if qty > stock.reserved_for_sale {
            return Err(SimError::InsufficientReserved {
                commodity,
                needed: qty,
                reserved: stock.reserved_for_sale,
            });
        }
        stock.reserved_for_sale -= qty;
        stock.quantity -= qty;
        entity.cash += qty as Money * unit_price;

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "settlement",
            tick = tick,
            trade_id = trade_id,
            commodity = commodity,
            qty = qty,
            unit_price = unit_price,
            leg = "sale",
        );
        let _ = (tick, trade_id);
        Ok(())
    }

    /// Undo a `complete_purchase` whose matching sale leg failed: credit the
    /// cash back and remove the goods. The avg_cost blend is left as-is
    /// (advisory figure).
    pub fn rollback_purchase(
        &mut self,
        buyer: EntityId,
        commodity: CommodityId,
        qty: Quantity,
        unit_price: Price,
    ) -> SimResult<()> {
        let entity = self.get_mut(buyer)?;
        let stock = entity.stocks.entry(commodity).or_default();
        if stock.quantity < qty {
            return Err(SimError::InvariantViolation(format!(
                "rollback of {qty} units of commodity {commodity} exceeds holding {}",
                stock.quantity
            )));
        }
        stock.quantity -= qty;
        entity.cash += qty as Money * unit_price;
        Ok(())
    }
}
