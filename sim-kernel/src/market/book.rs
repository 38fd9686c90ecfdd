use std::collections::{BTreeSet, HashMap};

use crate::error::{SimError, SimResult};
use crate::types::{CommodityId, EntityId, OrderId, Price, Quantity, Tick};

use super::orders::{Order, OrderStatus, Side};

// === DEPTH VIEW ===

#[derive(Debug, Clone, PartialEq)]
pub struct DepthLevel {
    pub price: Price,
    pub quantity: Quantity,
    pub orders: usize,
}

/// Active remaining quantity grouped by price, best levels first.
#[derive(Debug, Clone, Default)]
pub struct DepthView {
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

// === ORDER BOOK ===

/// Per-commodity double-auction book.
///
/// `buys` is sorted non-increasing by price, `sells` non-decreasing; orders at
/// the same price keep submission order. The id→(side, index) map gives O(1)
/// cancel location; it is updated incrementally for the tail affected by each
/// insert or removal. Terminal orders never stay in the book.
#[derive(Debug, Clone)]
pub struct OrderBook {
    commodity: CommodityId,
    buys: Vec<Order>,
    sells: Vec<Order>,
    index: HashMap<OrderId, (Side, usize)>,
    best_bid: Option<Price>,
    best_ask: Option<Price>,
}

impl OrderBook {
    pub fn new(commodity: CommodityId) -> Self {
        Self {
            commodity,
            buys: Vec::new(),
            sells: Vec::new(),
            index: HashMap::new(),
            best_bid: None,
            best_ask: None,
        }
    }

    pub fn commodity(&self) -> CommodityId {
        self.commodity
    }

    pub fn active_buys(&self) -> usize {
        self.buys.len()
    }

    pub fn active_sells(&self) -> usize {
        self.sells.len()
    }

    pub fn active_total(&self) -> usize {
        self.buys.len() + self.sells.len()
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.best_bid
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.best_ask
    }

    pub fn spread(&self) -> Option<Price> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    fn side_vec(&self, side: Side) -> &Vec<Order> {
        match side {
            Side::Buy => &self.buys,
            Side::Sell => &self.sells,
        }
    }

    pub fn order_at(&self, side: Side, idx: usize) -> Option<&Order> {
        self.side_vec(side).get(idx)
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        let (side, idx) = *self.index.get(&id)?;
        self.side_vec(side).get(idx)
    }

    pub fn contains(&self, id: OrderId) -> bool {
        self.index.contains_key(&id)
    }

    /// Heads are authoritative after any mutation.
    fn refresh_best(&mut self) {
        self.best_bid = self.buys.first().map(|o| o.unit_price);
        self.best_ask = self.sells.first().map(|o| o.unit_price);
    }

    fn reindex_from(&mut self, side: Side, start: usize) {
        let orders = match side {
            Side::Buy => &self.buys,
            Side::Sell => &self.sells,
        };
        for (offset, order) in orders[start..].iter().enumerate() {
            self.index.insert(order.id, (side, start + offset));
        }
    }

    /// Binary-search insert preserving sort and same-price submission order.
    pub(crate) fn insert(&mut self, order: Order) {
        let side = order.side;
        let price = order.unit_price;
        let pos = match side {
            Side::Buy => self.buys.partition_point(|o| o.unit_price >= price),
            Side::Sell => self.sells.partition_point(|o| o.unit_price <= price),
        };
        match side {
            Side::Buy => self.buys.insert(pos, order),
            Side::Sell => self.sells.insert(pos, order),
        }
        self.reindex_from(side, pos);
        self.refresh_best();
    }

    fn remove_at(&mut self, side: Side, idx: usize) -> Order {
        let order = match side {
            Side::Buy => self.buys.remove(idx),
            Side::Sell => self.sells.remove(idx),
        };
        self.index.remove(&order.id);
        self.reindex_from(side, idx);
        self.refresh_best();
        order
    }

    /// Cancel an active order. Returns the removed order, or `None` if it is
    /// unknown here or no longer open/partial.
    pub(crate) fn cancel(&mut self, id: OrderId, tick: Tick) -> Option<Order> {
        let (side, idx) = *self.index.get(&id)?;
        let mut order = self.remove_at(side, idx);
        order.status = OrderStatus::Cancelled;
        order.updated_tick = tick;
        Some(order)
    }

    /// Decrement `remaining` after a trade. A fully filled order is removed
    /// and returned.
    pub(crate) fn update_after_trade(
        &mut self,
        id: OrderId,
        traded: Quantity,
        tick: Tick,
    ) -> SimResult<Option<Order>> {
        let (side, idx) = *self.index.get(&id).ok_or(SimError::UnknownOrder(id))?;
        let order = match side {
            Side::Buy => &mut self.buys[idx],
            Side::Sell => &mut self.sells[idx],
        };
        if traded > order.remaining {
            return Err(SimError::InvariantViolation(format!(
                "trade of {traded} exceeds remaining {} on order {id}",
                order.remaining
            )));
        }
        order.remaining -= traded;
        order.updated_tick = tick;
        if order.remaining == 0 {
            let mut filled = self.remove_at(side, idx);
            filled.status = OrderStatus::Filled;
            filled.updated_tick = tick;
            Ok(Some(filled))
        } else {
            order.status = OrderStatus::Partial;
            Ok(None)
        }
    }

    /// Remove every active order with `expiry_tick <= tick`.
    pub(crate) fn sweep_expired(&mut self, tick: Tick) -> Vec<Order> {
        let mut expired = Vec::new();
        for side in [Side::Buy, Side::Sell] {
            loop {
                let found = self
                    .side_vec(side)
                    .iter()
                    .position(|o| o.expiry_tick <= tick);
                match found {
                    Some(idx) => {
                        let mut order = self.remove_at(side, idx);
                        order.status = OrderStatus::Expired;
                        order.updated_tick = tick;
                        expired.push(order);
                    }
                    None => break,
                }
            }
        }
        expired
    }

    pub fn count_active_for(&self, owner: EntityId) -> usize {
        self.buys.iter().filter(|o| o.owner == owner).count()
            + self.sells.iter().filter(|o| o.owner == owner).count()
    }

    /// Oldest active order of `owner` on this book (earliest created tick,
    /// then lowest id).
    fn oldest_order_of(&self, owner: EntityId) -> Option<OrderId> {
        self.buys
            .iter()
            .chain(self.sells.iter())
            .filter(|o| o.owner == owner)
            .min_by_key(|o| (o.created_tick, o.id))
            .map(|o| o.id)
    }

    /// Worst-priced active order on `side` (the tail of the sorted vec).
    fn tail_of(&self, side: Side) -> Option<OrderId> {
        self.side_vec(side).last().map(|o| o.id)
    }

    pub fn depth(&self, levels: usize) -> DepthView {
        fn aggregate(orders: &[Order], levels: usize) -> Vec<DepthLevel> {
            let mut out: Vec<DepthLevel> = Vec::new();
            for order in orders {
                match out.last_mut() {
                    Some(level) if level.price == order.unit_price => {
                        level.quantity += order.remaining;
                        level.orders += 1;
                    }
                    _ => {
                        if out.len() == levels {
                            break;
                        }
                        out.push(DepthLevel {
                            price: order.unit_price,
                            quantity: order.remaining,
                            orders: 1,
                        });
                    }
                }
            }
            out
        }
        DepthView {
            bids: aggregate(&self.buys, levels),
            asks: aggregate(&self.sells, levels),
        }
    }

    /// Structural self-check used by tests and debug assertions.
    pub fn check_consistency(&self) -> SimResult<()> {
        for pair in self.buys.windows(2) {
            if pair[0].unit_price < pair[1].unit_price {
                return Err(SimError::InvariantViolation(format!(
                    "buy side of commodity {} not sorted descending",
                    self.commodity
                )));
            }
        }
        for pair in self.sells.windows(2) {
            if pair[0].unit_price > pair[1].unit_price {
                return Err(SimError::InvariantViolation(format!(
                    "sell side of commodity {} not sorted ascending",
                    self.commodity
                )));
            }
        }
        if self.index.len() != self.active_total() {
            return Err(SimError::InvariantViolation(format!(
                "index size {} != active orders {}",
                self.index.len(),
                self.active_total()
            )));
        }
        for (&id, &(side, idx)) in &self.index {
            let order = self
                .side_vec(side)
                .get(idx)
                .ok_or_else(|| SimError::InvariantViolation(format!("index out of range for order {id}")))?;
            if order.id != id || !order.status.is_active() {
                return Err(SimError::InvariantViolation(format!(
                    "index desync on order {id}"
                )));
            }
        }
        Ok(())
    }
}

// === MARKETS ===

/// Outcome of a submit: the new order's id plus any resting orders that were
/// cancelled to enforce the caps (the caller must release their holds).
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    pub order_id: OrderId,
    pub displaced: Vec<Order>,
}

/// One book per commodity, plus run-unique order ids, the dirty-commodity set
/// feeding incremental matching, and the terminal-order archive.
#[derive(Debug, Clone)]
pub struct Markets {
    books: Vec<OrderBook>,
    next_order_id: OrderId,
    dirty: BTreeSet<CommodityId>,
    archive: HashMap<OrderId, Order>,
    max_per_entity: usize,
    max_per_commodity: usize,
}

impl Markets {
    pub fn new(commodities: usize, max_per_entity: usize, max_per_commodity: usize) -> Self {
        Self {
            books: (0..commodities)
                .map(|c| OrderBook::new(c as CommodityId))
                .collect(),
            next_order_id: 1,
            dirty: BTreeSet::new(),
            archive: HashMap::new(),
            max_per_entity,
            max_per_commodity,
        }
    }

    pub fn commodity_count(&self) -> usize {
        self.books.len()
    }

    pub fn book(&self, commodity: CommodityId) -> SimResult<&OrderBook> {
        self.books
            .get(commodity as usize)
            .ok_or(SimError::UnknownCommodity(commodity))
    }

    fn book_mut(&mut self, commodity: CommodityId) -> SimResult<&mut OrderBook> {
        self.books
            .get_mut(commodity as usize)
            .ok_or(SimError::UnknownCommodity(commodity))
    }

    /// Active order lookup across all books, falling back to the archive.
    pub fn get_order(&self, id: OrderId) -> Option<&Order> {
        self.books
            .iter()
            .find_map(|b| b.get(id))
            .or_else(|| self.archive.get(&id))
    }

    /// Commodities with new orders since the last drain, ascending.
    pub fn take_dirty(&mut self) -> Vec<CommodityId> {
        let dirty: Vec<_> = self.dirty.iter().copied().collect();
        self.dirty.clear();
        dirty
    }

    /// Validate, enforce both caps, and insert. The per-(entity, commodity)
    /// cap cancels the owner's oldest resting order on this book; the
    /// per-commodity cap drops the worst-priced tail of the submitted side.
    pub fn submit(
        &mut self,
        owner: EntityId,
        commodity: CommodityId,
        side: Side,
        qty: Quantity,
        unit_price: Price,
        tick: Tick,
        validity_ticks: Tick,
    ) -> SimResult<SubmitReceipt> {
        if qty == 0 {
            return Err(SimError::InvalidQuantity(qty));
        }
        if unit_price <= 0 {
            return Err(SimError::InvalidPrice(unit_price));
        }
        let max_per_entity = self.max_per_entity;
        let max_per_commodity = self.max_per_commodity;
        let book = self.book_mut(commodity)?;

        let mut displaced = Vec::new();
        if book.count_active_for(owner) >= max_per_entity
            && let Some(oldest) = book.oldest_order_of(owner)
            && let Some(cancelled) = book.cancel(oldest, tick)
        {
            displaced.push(cancelled);
        }

        let id = self.next_order_id;
        self.next_order_id += 1;
        let order = Order {
            id,
            owner,
            commodity,
            side,
            quantity: qty,
            remaining: qty,
            unit_price,
            status: OrderStatus::Open,
            created_tick: tick,
            expiry_tick: tick + validity_ticks,
            updated_tick: tick,
        };

        let book = self.book_mut(commodity)?;
        book.insert(order);

        if book.active_total() > max_per_commodity
            && let Some(tail) = book.tail_of(side)
            && let Some(dropped) = book.cancel(tail, tick)
        {
            displaced.push(dropped);
        }

        #[cfg(feature = "instrument")]
        {
            let side_str = match side {
                Side::Buy => "buy",
                Side::Sell => "sell",
            };
            tracing::info!(
                target: "order",
                tick = tick,
                order_id = id,
                commodity = commodity,
                side = side_str,
                qty = qty,
                unit_price = unit_price,
            );
        }

        for order in &displaced {
            self.archive.insert(order.id, order.clone());
        }
        self.dirty.insert(commodity);
        Ok(SubmitReceipt {
            order_id: id,
            displaced,
        })
    }

    /// Cancel an order anywhere. Returns the removed order, `None` if it is
    /// unknown or already terminal.
    pub fn cancel(&mut self, id: OrderId, tick: Tick) -> Option<Order> {
        let book = self.books.iter_mut().find(|b| b.contains(id))?;
        let cancelled = book.cancel(id, tick)?;
        self.archive.insert(id, cancelled.clone());
        Some(cancelled)
    }

    /// Apply a fill to a resting order; archives it when fully filled.
    pub fn apply_fill(
        &mut self,
        commodity: CommodityId,
        id: OrderId,
        traded: Quantity,
        tick: Tick,
    ) -> SimResult<()> {
        let filled = self.book_mut(commodity)?.update_after_trade(id, traded, tick)?;
        if let Some(filled) = filled {
            self.archive.insert(filled.id, filled);
        }
        Ok(())
    }

    /// Expire overdue orders on every book. The caller throttles the cadence
    /// and releases holds on the returned orders.
    pub fn sweep_expired(&mut self, tick: Tick) -> Vec<Order> {
        let mut expired = Vec::new();
        for book in &mut self.books {
            expired.extend(book.sweep_expired(tick));
        }
        for order in &expired {
            self.archive.insert(order.id, order.clone());
        }
        expired
    }

    /// Drop archived terminal orders older than the retention window.
    pub fn sweep_archive(&mut self, tick: Tick, retention: Tick) {
        self.archive
            .retain(|_, o| o.updated_tick + retention >= tick);
    }

    pub fn archived_count(&self) -> usize {
        self.archive.len()
    }

    pub fn next_order_id(&self) -> OrderId {
        self.next_order_id
    }

    pub fn books(&self) -> impl Iterator<Item = &OrderBook> {
        self.books.iter()
    }

    pub fn clear_all(&mut self) {
        for book in &mut self.books {
            *book = OrderBook::new(book.commodity());
        }
        self.dirty.clear();
        self.archive.clear();
        self.next_order_id = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Entity, Ledger};
    use crate::types::EntityKind;

    const W: CommodityId = 0;

    fn two_entities() -> (EntityId, EntityId) {
        let mut ledger = Ledger::new();
        let a = ledger.add_entity(Entity::new("A", EntityKind::Player, 0));
        let b = ledger.add_entity(Entity::new("B", EntityKind::Competitor, 0));
        (a, b)
    }

    fn markets() -> Markets {
        Markets::new(2, 3, 100)
    }

    #[test]
    fn buys_sorted_descending_sells_ascending() {
        let mut m = markets();
        let (a, _) = two_entities();
        for price in [500, 300, 700, 300] {
            m.submit(a, W, Side::Sell, 1, price, 1, 10).unwrap();
        }
        // per-entity cap is 3: the first 500 order was displaced
        let book = m.book(W).unwrap();
        let asks: Vec<_> = (0..book.active_sells())
            .map(|i| book.order_at(Side::Sell, i).unwrap().unit_price)
            .collect();
        assert_eq!(asks, vec![300, 300, 700]);
        book.check_consistency().unwrap();
    }

    #[test]
    fn same_price_keeps_submission_order() {
        let mut m = markets();
        let (a, b) = two_entities();
        let first = m.submit(a, W, Side::Buy, 1, 400, 1, 10).unwrap().order_id;
        let second = m.submit(b, W, Side::Buy, 1, 400, 2, 10).unwrap().order_id;
        let book = m.book(W).unwrap();
        assert_eq!(book.order_at(Side::Buy, 0).unwrap().id, first);
        assert_eq!(book.order_at(Side::Buy, 1).unwrap().id, second);
    }

    #[test]
    fn per_entity_cap_cancels_oldest() {
        let mut m = markets();
        let (c, _) = two_entities();
        let first = m.submit(c, W, Side::Buy, 1, 100, 1, 50).unwrap().order_id;
        m.submit(c, W, Side::Buy, 1, 110, 2, 50).unwrap();
        m.submit(c, W, Side::Buy, 1, 120, 3, 50).unwrap();

        let receipt = m.submit(c, W, Side::Buy, 1, 130, 4, 50).unwrap();
        assert_eq!(receipt.displaced.len(), 1);
        assert_eq!(receipt.displaced[0].id, first);
        assert_eq!(receipt.displaced[0].status, OrderStatus::Cancelled);
        assert_eq!(m.book(W).unwrap().count_active_for(c), 3);
        // the cancelled order stays queryable in the archive
        assert_eq!(m.get_order(first).unwrap().status, OrderStatus::Cancelled);
    }

    #[test]
    fn per_commodity_cap_drops_worst_tail() {
        let mut m = Markets::new(1, 100, 4);
        let mut ledger = Ledger::new();
        let owners: Vec<_> = (0..5)
            .map(|i| ledger.add_entity(Entity::new(format!("E{i}"), EntityKind::Competitor, 0)))
            .collect();
        for (i, &owner) in owners.iter().enumerate().take(4) {
            m.submit(owner, W, Side::Buy, 1, 100 + i as Price, 1, 50).unwrap();
        }
        // fifth order exceeds the cap; the lowest bid (100) is the tail
        let receipt = m.submit(owners[4], W, Side::Buy, 1, 200, 2, 50).unwrap();
        assert_eq!(receipt.displaced.len(), 1);
        assert_eq!(receipt.displaced[0].unit_price, 100);
        assert_eq!(m.book(W).unwrap().active_total(), 4);
    }

    #[test]
    fn cancel_unknown_or_terminal_returns_none() {
        let mut m = markets();
        let (a, _) = two_entities();
        assert!(m.cancel(999, 1).is_none());

        let id = m.submit(a, W, Side::Buy, 1, 100, 1, 10).unwrap().order_id;
        assert!(m.cancel(id, 2).is_some());
        assert!(m.cancel(id, 3).is_none());
    }

    #[test]
    fn fill_transitions_partial_then_filled() {
        let mut m = markets();
        let (a, _) = two_entities();
        let id = m.submit(a, W, Side::Sell, 10, 100, 1, 10).unwrap().order_id;

        m.apply_fill(W, id, 4, 2).unwrap();
        let order = m.book(W).unwrap().get(id).unwrap();
        assert_eq!(order.status, OrderStatus::Partial);
        assert_eq!(order.remaining, 6);

        m.apply_fill(W, id, 6, 3).unwrap();
        assert!(!m.book(W).unwrap().contains(id));
        let archived = m.get_order(id).unwrap();
        assert_eq!(archived.status, OrderStatus::Filled);
        assert_eq!(archived.remaining, 0);
    }

    #[test]
    fn sweep_expired_removes_overdue_only() {
        let mut m = markets();
        let (a, b) = two_entities();
        let short = m.submit(a, W, Side::Buy, 1, 100, 1, 5).unwrap().order_id;
        let long = m.submit(b, W, Side::Sell, 1, 900, 1, 50).unwrap().order_id;

        let expired = m.sweep_expired(6);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, short);
        assert_eq!(expired[0].status, OrderStatus::Expired);
        assert!(m.book(W).unwrap().contains(long));
    }

    #[test]
    fn best_and_spread_follow_heads() {
        let mut m = markets();
        let (a, b) = two_entities();
        m.submit(a, W, Side::Buy, 1, 400, 1, 10).unwrap();
        m.submit(b, W, Side::Sell, 1, 600, 1, 10).unwrap();
        let bid_id = m.submit(a, W, Side::Buy, 1, 450, 2, 10).unwrap().order_id;

        let book = m.book(W).unwrap();
        assert_eq!(book.best_bid(), Some(450));
        assert_eq!(book.best_ask(), Some(600));
        assert_eq!(book.spread(), Some(150));

        m.cancel(bid_id, 3);
        assert_eq!(m.book(W).unwrap().best_bid(), Some(400));
    }

    #[test]
    fn depth_aggregates_by_price() {
        let mut m = markets();
        let (a, b) = two_entities();
        m.submit(a, W, Side::Sell, 5, 100, 1, 10).unwrap();
        m.submit(b, W, Side::Sell, 3, 100, 1, 10).unwrap();
        m.submit(a, W, Side::Sell, 2, 120, 1, 10).unwrap();

        let depth = m.book(W).unwrap().depth(5);
        assert_eq!(
            depth.asks,
            vec![
                DepthLevel { price: 100, quantity: 8, orders: 2 },
                DepthLevel { price: 120, quantity: 2, orders: 1 },
            ]
        );
        assert!(depth.bids.is_empty());
    }

    #[test]
    fn dirty_set_tracks_new_orders() {
        let mut m = markets();
        let (a, _) = two_entities();
        m.submit(a, 1, Side::Buy, 1, 100, 1, 10).unwrap();
        m.submit(a, 0, Side::Buy, 1, 100, 1, 10).unwrap();
        assert_eq!(m.take_dirty(), vec![0, 1]);
        assert!(m.take_dirty().is_empty());
    }

    #[test]
    fn archive_retention_sweep() {
        let mut m = markets();
        let (a, _) = two_entities();
        let id = m.submit(a, W, Side::Buy, 1, 100, 1, 10).unwrap().order_id;
        m.cancel(id, 2);
        assert_eq!(m.archived_count(), 1);

        m.sweep_archive(500, 100);
        assert_eq!(m.archived_count(), 0);
        assert!(m.get_order(id).is_none());
    }

    #[test]
    fn zero_qty_and_nonpositive_price_rejected() {
        let mut m = markets();
        let (a, _) = two_entities();
        assert_eq!(
            m.submit(a, W, Side::Buy, 0, 100, 1, 10).unwrap_err(),
            SimError::InvalidQuantity(0)
        );
        assert_eq!(
            m.submit(a, W, Side::Buy, 1, 0, 1, 10).unwrap_err(),
            SimError::InvalidPrice(0)
        );
        assert_eq!(
            m.submit(a, 7, Side::Buy, 1, 100, 1, 10).unwrap_err(),
            SimError::UnknownCommodity(7)
        );
    }
}
