use crate::error::{SimError, SimResult};
use crate::ledger::Ledger;
use crate::types::{CommodityId, EntityId, Money, OrderId, Price, Quantity, Tick, TradeId};

use super::book::Markets;
use super::orders::{Side, TickVolume, Trade};

/// Pairs crossed buy/sell orders, settles them against the ledger, and keeps
/// the append-only trade log plus per-tick volume aggregates.
///
/// A pass over one commodity walks the buy side head to tail; for each buy the
/// sell side is walked until the first ask above the bid (sorted invariant: no
/// later sell can match). Trades execute at the resting sell order's price.
/// Per-pair settlement failures skip or roll back, never abort the tick.
#[derive(Debug, Clone)]
pub struct MatchingEngine {
    player: EntityId,
    max_pairs_per_commodity: usize,
    next_trade_id: TradeId,
    trades: Vec<Trade>,
    /// Index of the first trade belonging to the current tick.
    tick_start: usize,
    volumes: Vec<TickVolume>,
}

impl MatchingEngine {
    pub fn new(player: EntityId, commodities: usize, max_pairs_per_commodity: usize) -> Self {
        Self {
            player,
            max_pairs_per_commodity,
            next_trade_id: 1,
            trades: Vec::new(),
            tick_start: 0,
            volumes: vec![TickVolume::default(); commodities],
        }
    }

    /// Reset the per-tick trade window and volume aggregates.
    pub fn begin_tick(&mut self) {
        self.tick_start = self.trades.len();
        self.volumes.fill(TickVolume::default());
    }

    /// Full trade log, oldest first.
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Trades executed since `begin_tick`.
    pub fn tick_trades(&self) -> &[Trade] {
        &self.trades[self.tick_start..]
    }

    /// Per-commodity volume for the current tick, indexed by commodity id.
    pub fn volumes(&self) -> &[TickVolume] {
        &self.volumes
    }

    pub fn clear(&mut self) {
        self.trades.clear();
        self.tick_start = 0;
        self.next_trade_id = 1;
        self.volumes.fill(TickVolume::default());
    }

    /// Match every commodity in `commodities`. Returns trades executed.
    pub fn run_pass(
        &mut self,
        markets: &mut Markets,
        ledger: &mut Ledger,
        commodities: &[CommodityId],
        tick: Tick,
    ) -> SimResult<usize> {
        let mut executed = 0;
        for &commodity in commodities {
            executed += self.match_commodity(markets, ledger, commodity, tick)?;
        }
        Ok(executed)
    }

    fn match_commodity(
        &mut self,
        markets: &mut Markets,
        ledger: &mut Ledger,
        commodity: CommodityId,
        tick: Tick,
    ) -> SimResult<usize> {
        {
            let book = markets.book(commodity)?;
            if book.active_buys() == 0 || book.active_sells() == 0 {
                return Ok(0);
            }
            match (book.best_bid(), book.best_ask()) {
                (Some(bid), Some(ask)) if bid >= ask => {}
                _ => return Ok(0),
            }
        }

        let mut executed = 0usize;
        let mut bi = 0usize;
        'buys: while executed < self.max_pairs_per_commodity {
            let Some(buy) = markets.book(commodity)?.order_at(Side::Buy, bi) else {
                break;
            };
            let buy_id = buy.id;
            let buy_owner = buy.owner;
            let buy_price = buy.unit_price;

            let mut buy_alive = true;
            let mut si = 0usize;
            while executed < self.max_pairs_per_commodity {
                let book = markets.book(commodity)?;
                let Some(sell) = book.order_at(Side::Sell, si) else {
                    break;
                };
                if sell.unit_price > buy_price {
                    break;
                }
                if sell.owner == buy_owner {
                    // no self-trade; both orders rest
                    si += 1;
                    continue;
                }
                let sell_id = sell.id;
                let sell_owner = sell.owner;
                let sell_price = sell.unit_price;
                let sell_remaining = sell.remaining;
                let buy_remaining = match book.get(buy_id) {
                    Some(o) => o.remaining,
                    None => {
                        buy_alive = false;
                        break;
                    }
                };

                let qty = buy_remaining.min(sell_remaining);
                let trade_id = self.next_trade_id;

                match ledger.complete_purchase(buy_owner, commodity, qty, sell_price, tick, trade_id)
                {
                    Ok(()) => {}
                    Err(SimError::InsufficientCash { .. }) => {
                        // a later, smaller ask may still be affordable
                        si += 1;
                        continue;
                    }
                    Err(e) => return Err(e),
                }
                if ledger
                    .complete_sale(sell_owner, commodity, qty, sell_price, tick, trade_id)
                    .is_err()
                {
                    let rolled = ledger.rollback_purchase(buy_owner, commodity, qty, sell_price);
                    debug_assert!(rolled.is_ok(), "purchase rollback failed");
                    si += 1;
                    continue;
                }

                markets.apply_fill(commodity, buy_id, qty, tick)?;
                markets.apply_fill(commodity, sell_id, qty, tick)?;
                self.record_trade(
                    commodity, buy_owner, sell_owner, buy_id, sell_id, qty, sell_price, tick,
                );
                executed += 1;

                if !markets.book(commodity)?.contains(buy_id) {
                    buy_alive = false;
                    break;
                }
                // buy partially filled: the sell at `si` was removed, so the
                // next candidate already sits at `si`
            }

            if !buy_alive {
                // removal shifted the next buy into position `bi`
                continue 'buys;
            }
            bi += 1;
            if bi >= markets.book(commodity)?.active_buys() {
                break;
            }
        }
        Ok(executed)
    }

    #[allow(clippy::too_many_arguments)]
    fn record_trade(
        &mut self,
        commodity: CommodityId,
        buyer: EntityId,
        seller: EntityId,
        buy_order: OrderId,
        sell_order: OrderId,
        qty: Quantity,
        unit_price: Price,
        tick: Tick,
    ) {
        let id = self.next_trade_id;
        self.next_trade_id += 1;

        let volume = &mut self.volumes[commodity as usize];
        volume.total += qty;
        if buyer == self.player {
            volume.buy += qty;
        }
        if seller == self.player {
            volume.sell += qty;
        }

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "trade",
            tick = tick,
            trade_id = id,
            commodity = commodity,
            qty = qty,
            unit_price = unit_price,
        );

        self.trades.push(Trade {
            id,
            commodity,
            buyer,
            seller,
            buy_order,
            sell_order,
            quantity: qty,
            unit_price,
            total: qty as Money * unit_price,
            tick,
        });
    }
}
