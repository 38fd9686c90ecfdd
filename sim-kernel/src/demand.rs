use rand::Rng;

use crate::types::{CommodityDef, CommodityId, Tick};

/// Cyclic amplitude of the background demand wave.
pub const DEFAULT_AMPLITUDE: f64 = 0.3;
/// Cycle length in ticks.
pub const DEFAULT_CYCLE_LENGTH: u64 = 30;

/// Flat per-commodity rate used when the configured table carries no demand
/// at all, so the market never goes fully dead.
const LEGACY_FALLBACK_RATE: f64 = 20.0;

/// Synthesizes per-commodity background consumer demand each tick:
/// a category-derived base rate modulated by a staggered sine cycle and
/// uniform noise.
#[derive(Debug, Clone)]
pub struct ConsumerDemand {
    rates: Vec<f64>,
    /// Per-commodity phase offset so demand peaks are staggered.
    phases: Vec<u64>,
    amplitude: f64,
    cycle_length: u64,
}

impl ConsumerDemand {
    /// Derive rates from the commodity table (explicit rate, else category).
    pub fn new(commodities: &[CommodityDef], amplitude: f64, cycle_length: u64) -> Self {
        Self::from_rates(
            commodities.iter().map(|d| d.demand_rate()).collect(),
            amplitude,
            cycle_length,
        )
    }

    /// Build from an explicit rate table. An empty or all-zero table falls
    /// back to the legacy flat rate.
    pub fn from_rates(mut rates: Vec<f64>, amplitude: f64, cycle_length: u64) -> Self {
        if rates.iter().all(|&r| r <= 0.0) {
            rates = vec![LEGACY_FALLBACK_RATE; rates.len().max(1)];
        }
        let cycle_length = cycle_length.max(1);
        let phases = (0..rates.len() as u64).map(|i| (i * 7) % cycle_length).collect();
        Self {
            rates,
            phases,
            amplitude,
            cycle_length,
        }
    }

    pub fn rate(&self, commodity: CommodityId) -> f64 {
        self.rates[commodity as usize]
    }

    pub fn phase(&self, commodity: CommodityId) -> u64 {
        self.phases[commodity as usize]
    }

    /// Demand for one commodity at `tick`, before noise.
    fn cyclic(&self, idx: usize, tick: Tick) -> f64 {
        let phase = self.phases[idx];
        let angle =
            2.0 * std::f64::consts::PI * ((tick + phase) as f64) / (self.cycle_length as f64);
        self.rates[idx] * (1.0 + self.amplitude * angle.sin())
    }

    /// Per-commodity demand for this tick: `base × cycle × (0.9 + 0.2·U)`.
    pub fn inject<R: Rng>(&self, tick: Tick, rng: &mut R) -> Vec<(CommodityId, f64)> {
        (0..self.rates.len())
            .map(|idx| {
                let noise = 0.9 + 0.2 * rng.random::<f64>();
                (idx as CommodityId, self.cyclic(idx, tick) * noise)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CommodityCategory, default_commodities};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn staples_generate_more_demand_than_luxuries() {
        let defs = default_commodities();
        let demand = ConsumerDemand::new(&defs, DEFAULT_AMPLITUDE, DEFAULT_CYCLE_LENGTH);
        let staple = defs
            .iter()
            .find(|d| d.category == CommodityCategory::Staple)
            .unwrap();
        let luxury = defs
            .iter()
            .find(|d| d.category == CommodityCategory::Luxury)
            .unwrap();
        assert!(demand.rate(staple.id) > demand.rate(luxury.id));
    }

    #[test]
    fn injection_stays_within_the_noise_envelope() {
        let defs = default_commodities();
        let demand = ConsumerDemand::new(&defs, DEFAULT_AMPLITUDE, DEFAULT_CYCLE_LENGTH);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for tick in 0..200 {
            for (commodity, qty) in demand.inject(tick, &mut rng) {
                let base = demand.rate(commodity);
                let hi = base * (1.0 + DEFAULT_AMPLITUDE) * 1.1;
                let lo = base * (1.0 - DEFAULT_AMPLITUDE) * 0.9;
                assert!(qty >= lo && qty <= hi, "demand {qty} outside [{lo}, {hi}]");
            }
        }
    }

    #[test]
    fn phases_stagger_peaks() {
        let defs = default_commodities();
        let demand = ConsumerDemand::new(&defs, DEFAULT_AMPLITUDE, DEFAULT_CYCLE_LENGTH);
        assert_ne!(demand.phase(0), demand.phase(1));
    }

    #[test]
    fn empty_or_zero_table_falls_back_to_legacy_rate() {
        let demand = ConsumerDemand::from_rates(vec![0.0, 0.0], DEFAULT_AMPLITUDE, 30);
        assert_eq!(demand.rate(0), LEGACY_FALLBACK_RATE);
        assert_eq!(demand.rate(1), LEGACY_FALLBACK_RATE);

        let demand = ConsumerDemand::from_rates(Vec::new(), DEFAULT_AMPLITUDE, 30);
        assert_eq!(demand.rate(0), LEGACY_FALLBACK_RATE);
    }

    #[test]
    fn cycle_modulates_demand_over_time() {
        let demand = ConsumerDemand::from_rates(vec![100.0], DEFAULT_AMPLITUDE, 30);
        // peak near a quarter cycle, trough near three quarters
        let peak = demand.cyclic(0, 7);
        let trough = demand.cyclic(0, 22);
        assert!(peak > 120.0, "peak {peak}");
        assert!(trough < 80.0, "trough {trough}");
    }
}
