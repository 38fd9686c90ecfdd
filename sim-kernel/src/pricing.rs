use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::SimResult;
use crate::market::TickVolume;
use crate::ring::RingBuffer;
use crate::types::{CommodityDef, CommodityId, Price, Quantity, Tick};

// === SUPPLY / DEMAND STATE ===

/// Both sides are floored at this value so the ratio stays defined and a dead
/// market drifts back to equilibrium instead of exploding.
pub const SUPPLY_DEMAND_FLOOR: f64 = 100.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SupplyDemand {
    pub supply: f64,
    pub demand: f64,
    pub last_trade_price: Option<Price>,
    /// Momentum term blended into each adjustment.
    pub velocity: f64,
}

impl Default for SupplyDemand {
    fn default() -> Self {
        Self {
            supply: SUPPLY_DEMAND_FLOOR,
            demand: SUPPLY_DEMAND_FLOOR,
            last_trade_price: None,
            velocity: 0.0,
        }
    }
}

// === PRICE HISTORY ===

/// One tick of price history: open = previous close, close = the tick's new
/// price, volumes from the matching engine's aggregator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    pub tick: Tick,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Quantity,
    pub buy_volume: Quantity,
    pub sell_volume: Quantity,
}

// === TRACKER ===

#[derive(Debug, Clone, Copy)]
pub struct PriceParams {
    pub min_multiplier: f64,
    pub max_multiplier: f64,
    pub imbalance_threshold: f64,
    pub adjustment_rate: f64,
    pub decay: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceChange {
    pub commodity: CommodityId,
    pub old: Price,
    pub new: Price,
}

/// Per-commodity rolling supply/demand state and the price adjustment rule.
#[derive(Debug, Clone)]
pub struct PriceTracker {
    base_prices: Vec<Price>,
    prices: Vec<Price>,
    state: Vec<SupplyDemand>,
    history: Vec<RingBuffer<Candle>>,
    params: PriceParams,
}

impl PriceTracker {
    pub fn new(
        commodities: &[CommodityDef],
        history_capacity: usize,
        params: PriceParams,
    ) -> SimResult<Self> {
        let mut history = Vec::with_capacity(commodities.len());
        for def in commodities {
            let mut ring = RingBuffer::with_capacity(history_capacity)?;
            ring.push(Candle {
                tick: 0,
                open: def.base_price,
                high: def.base_price,
                low: def.base_price,
                close: def.base_price,
                volume: 0,
                buy_volume: 0,
                sell_volume: 0,
            });
            history.push(ring);
        }
        Ok(Self {
            base_prices: commodities.iter().map(|d| d.base_price).collect(),
            prices: commodities.iter().map(|d| d.base_price).collect(),
            state: vec![SupplyDemand::default(); commodities.len()],
            history,
            params,
        })
    }

    pub fn price(&self, commodity: CommodityId) -> Price {
        self.prices[commodity as usize]
    }

    pub fn prices(&self) -> &[Price] {
        &self.prices
    }

    pub fn state(&self, commodity: CommodityId) -> &SupplyDemand {
        &self.state[commodity as usize]
    }

    pub fn history(&self, commodity: CommodityId) -> &RingBuffer<Candle> {
        &self.history[commodity as usize]
    }

    /// Production output entering the market. Unknown commodities are ignored
    /// rather than corrupting a neighbor's state.
    pub fn record_supply(&mut self, commodity: CommodityId, qty: f64) {
        if let Some(sd) = self.state.get_mut(commodity as usize) {
            sd.supply += qty.max(0.0);
        }
    }

    /// Consumption (recipe inputs, background consumers) drawing on the market.
    pub fn record_demand(&mut self, commodity: CommodityId, qty: f64) {
        if let Some(sd) = self.state.get_mut(commodity as usize) {
            sd.demand += qty.max(0.0);
        }
    }

    /// Matching feeds every executed trade through here.
    pub fn observe_trade(&mut self, commodity: CommodityId, price: Price) {
        if let Some(sd) = self.state.get_mut(commodity as usize) {
            sd.last_trade_price = Some(price);
        }
    }

    /// Narrative shock: multiply the current price by `1 + pct`, clamped.
    pub fn apply_price_shock(&mut self, commodity: CommodityId, pct: f64) {
        let idx = commodity as usize;
        let shocked = (self.prices[idx] as f64 * (1.0 + pct)).round();
        self.prices[idx] = self.clamp_price(idx, shocked);
    }

    /// Narrative shock: scale the supply side by `1 + pct`, floored.
    pub fn apply_supply_shock(&mut self, commodity: CommodityId, pct: f64) {
        let sd = &mut self.state[commodity as usize];
        sd.supply = (sd.supply * (1.0 + pct)).max(SUPPLY_DEMAND_FLOOR);
    }

    fn clamp_price(&self, idx: usize, raw: f64) -> Price {
        let base = self.base_prices[idx] as f64;
        let lo = (base * self.params.min_multiplier).round().max(1.0);
        let hi = (base * self.params.max_multiplier).round();
        raw.clamp(lo, hi) as Price
    }

    /// Run the per-tick adjustment for every commodity and append candles.
    /// Returns the commodities whose price changed.
    pub fn update_prices<R: Rng>(
        &mut self,
        tick: Tick,
        volumes: &[TickVolume],
        rng: &mut R,
    ) -> Vec<PriceChange> {
        let mut changes = Vec::new();
        for idx in 0..self.prices.len() {
            let old = self.prices[idx];
            let base = self.base_prices[idx] as f64;
            let sd = &mut self.state[idx];

            let ratio = sd.demand / sd.supply;
            let imbalance = ratio - 1.0;
            let mut price = old as f64;
            if imbalance.abs() > self.params.imbalance_threshold {
                sd.velocity = 0.9 * sd.velocity + 0.1 * (imbalance * self.params.adjustment_rate);
                price *= 1.0 + sd.velocity;
            } else {
                sd.velocity *= 0.95;
                price += (base - price) * 0.001;
            }
            price *= 1.0 + (rng.random::<f64>() - 0.5) * 0.01;

            sd.supply = (sd.supply * self.params.decay).max(SUPPLY_DEMAND_FLOOR);
            sd.demand = (sd.demand * self.params.decay).max(SUPPLY_DEMAND_FLOOR);

            let new = self.clamp_price(idx, price.round());
            self.prices[idx] = new;

            let volume = volumes
                .get(idx)
                .copied()
                .unwrap_or_default();
            self.history[idx].push(Candle {
                tick,
                open: old,
                high: old.max(new),
                low: old.min(new),
                close: new,
                volume: volume.total,
                buy_volume: volume.buy,
                sell_volume: volume.sell,
            });

            if new != old {
                changes.push(PriceChange {
                    commodity: idx as CommodityId,
                    old,
                    new,
                });

                #[cfg(feature = "instrument")]
                tracing::info!(
                    target: "price",
                    tick = tick,
                    commodity = idx as u16,
                    old = old,
                    new = new,
                );
            }
        }
        changes
    }

    /// Rebuild to the initial state (same base prices, history = seed candle).
    pub fn reset(&mut self, commodities: &[CommodityDef], history_capacity: usize) -> SimResult<()> {
        *self = Self::new(commodities, history_capacity, self.params)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CommodityCategory, CommodityDef};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn defs() -> Vec<CommodityDef> {
        vec![
            CommodityDef::new(0, "Y", 1_000).with_category(CommodityCategory::RawMaterial),
        ]
    }

    fn params() -> PriceParams {
        PriceParams {
            min_multiplier: 0.2,
            max_multiplier: 5.0,
            imbalance_threshold: 0.05,
            adjustment_rate: 0.02,
            decay: 0.995,
        }
    }

    fn tracker() -> PriceTracker {
        PriceTracker::new(&defs(), 128, params()).unwrap()
    }

    #[test]
    fn history_starts_with_base_price_candle() {
        let t = tracker();
        let first = *t.history(0).first().unwrap();
        assert_eq!(first.tick, 0);
        assert_eq!(first.close, 1_000);
        assert_eq!(first.volume, 0);
    }

    #[test]
    fn sustained_excess_demand_hits_the_ceiling_and_stays() {
        let mut t = tracker();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let volumes = [TickVolume::default()];
        for tick in 1..=500 {
            t.record_demand(0, 1_000_000.0);
            t.record_supply(0, 100.0);
            t.update_prices(tick, &volumes, &mut rng);
        }
        assert_eq!(t.price(0), 5_000);
        // clamp holds under continued pressure
        for tick in 501..=520 {
            t.record_demand(0, 1_000_000.0);
            t.update_prices(tick, &volumes, &mut rng);
            assert_eq!(t.price(0), 5_000);
        }
    }

    #[test]
    fn excess_supply_pushes_toward_the_floor() {
        let mut t = tracker();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let volumes = [TickVolume::default()];
        for tick in 1..=800 {
            t.record_supply(0, 500_000.0);
            t.update_prices(tick, &volumes, &mut rng);
        }
        assert_eq!(t.price(0), 200);
    }

    #[test]
    fn balanced_market_relaxes_toward_base() {
        let mut t = tracker();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let volumes = [TickVolume::default()];
        // shock the price away from base, then leave supply == demand
        t.apply_price_shock(0, 1.5);
        let shocked = t.price(0);
        assert_eq!(shocked, 2_500);
        for tick in 1..=2_000 {
            t.update_prices(tick, &volumes, &mut rng);
        }
        let drift_to_base = (t.price(0) - 1_000).abs();
        assert!(
            drift_to_base < (shocked - 1_000).abs(),
            "price {} did not relax toward base",
            t.price(0)
        );
    }

    #[test]
    fn supply_and_demand_decay_to_floor() {
        let mut t = tracker();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let volumes = [TickVolume::default()];
        t.record_supply(0, 10_000.0);
        t.record_demand(0, 10_000.0);
        for tick in 1..=5_000 {
            t.update_prices(tick, &volumes, &mut rng);
        }
        assert_eq!(t.state(0).supply, SUPPLY_DEMAND_FLOOR);
        assert_eq!(t.state(0).demand, SUPPLY_DEMAND_FLOOR);
    }

    #[test]
    fn candle_open_is_previous_close() {
        let mut t = tracker();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let volumes = [TickVolume { total: 12, buy: 4, sell: 0 }];
        t.record_demand(0, 50_000.0);
        t.update_prices(1, &volumes, &mut rng);
        t.record_demand(0, 50_000.0);
        t.update_prices(2, &volumes, &mut rng);

        let candles = t.history(0).to_vec();
        let prev = candles[candles.len() - 2];
        let last = candles[candles.len() - 1];
        assert_eq!(last.open, prev.close);
        assert_eq!(last.volume, 12);
        assert!(last.high >= last.low);
    }

    #[test]
    fn supply_shock_respects_floor() {
        let mut t = tracker();
        t.apply_supply_shock(0, -0.99);
        assert_eq!(t.state(0).supply, SUPPLY_DEMAND_FLOOR);
        t.record_supply(0, 900.0);
        t.apply_supply_shock(0, 1.0);
        assert_eq!(t.state(0).supply, 2_000.0);
    }
}
