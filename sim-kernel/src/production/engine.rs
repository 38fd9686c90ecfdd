// Building lifecycle and recipe execution

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::error::SimResult;
use crate::ledger::Ledger;
use crate::market::{Markets, Order, Side};
use crate::pricing::PriceTracker;
use crate::types::{BuildingId, CommodityId, EntityId, Money, OrderId, Price, Quantity, Tick};

use super::building::{Building, BuildingDef, BuildingStatus};
use super::recipe::{Method, scaled_amount};

// === RESEARCH EFFECTS ===

/// Active research multipliers applied to recipe math and maintenance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Multipliers {
    pub input: f64,
    pub output: f64,
    pub efficiency: f64,
    pub cost: f64,
}

impl Default for Multipliers {
    fn default() -> Self {
        Self {
            input: 1.0,
            output: 1.0,
            efficiency: 1.0,
            cost: 1.0,
        }
    }
}

/// Per-entity research effect store. Entities without entries run at 1.0.
#[derive(Debug, Clone, Default)]
pub struct ResearchEffects {
    by_entity: HashMap<EntityId, Multipliers>,
}

impl ResearchEffects {
    pub fn for_entity(&self, entity: EntityId) -> Multipliers {
        self.by_entity.get(&entity).copied().unwrap_or_default()
    }

    pub fn set(&mut self, entity: EntityId, multipliers: Multipliers) {
        self.by_entity.insert(entity, multipliers);
    }

    pub fn clear(&mut self) {
        self.by_entity.clear();
    }
}

// === STEP OUTPUT ===

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortageReport {
    pub building: BuildingId,
    pub commodity: CommodityId,
    pub needed: Quantity,
    pub available: Quantity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingDelta {
    pub building: BuildingId,
    pub status: BuildingStatus,
    pub construction_progress: u32,
    pub construction_required: u32,
}

#[derive(Debug, Clone)]
pub struct CycleCompletion {
    pub building: BuildingId,
    pub owner: EntityId,
    pub output_value: Money,
    pub input_cost: Money,
}

/// Everything one production pass produced, for the kernel to fold into the
/// tick update and the financial summary.
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    pub shortages: Vec<ShortageReport>,
    pub deltas: Vec<BuildingDelta>,
    pub maintenance: Vec<(EntityId, Money)>,
    pub cycles: Vec<CycleCompletion>,
    /// Resting orders displaced by auto-purchase submissions; the kernel
    /// releases their holds.
    pub displaced: Vec<Order>,
}

// === ENGINE ===

#[derive(Debug, Clone, Copy)]
pub struct ProductionParams {
    /// No auto-purchase below this cash level.
    pub cash_protection_threshold: Money,
    /// No single auto order spends more than this share of current cash.
    pub auto_purchase_max_spend_ratio: f64,
    pub auto_purchase_validity_ticks: Tick,
}

/// Drives every building through construction, material gathering and recipe
/// execution. Auto-purchase orders are throttled to one pending order per
/// (building, commodity); stale entries are cleared and retried.
#[derive(Debug, Clone, Default)]
pub struct ProductionEngine {
    pending_orders: HashMap<(BuildingId, CommodityId), OrderId>,
}

impl ProductionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.pending_orders.clear();
    }

    #[allow(clippy::too_many_arguments)]
    pub fn step_all(
        &mut self,
        buildings: &mut SlotMap<BuildingId, Building>,
        defs: &[BuildingDef],
        methods: &[Method],
        research: &ResearchEffects,
        ledger: &mut Ledger,
        markets: &mut Markets,
        pricing: &mut PriceTracker,
        params: &ProductionParams,
        tick: Tick,
    ) -> SimResult<StepOutput> {
        let mut out = StepOutput::default();
        let ids: Vec<BuildingId> = buildings.keys().collect();
        for id in ids {
            let Some(building) = buildings.get_mut(id) else {
                continue;
            };
            let before = (building.status, building.construction_progress);

            self.step_one(
                id, building, defs, methods, research, ledger, markets, pricing, params, tick,
                &mut out,
            )?;

            let building = &buildings[id];
            if (building.status, building.construction_progress) != before {
                out.deltas.push(BuildingDelta {
                    building: id,
                    status: building.status,
                    construction_progress: building.construction_progress,
                    construction_required: building.construction_ticks_required,
                });
            }
        }
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn step_one(
        &mut self,
        id: BuildingId,
        building: &mut Building,
        defs: &[BuildingDef],
        methods: &[Method],
        research: &ResearchEffects,
        ledger: &mut Ledger,
        markets: &mut Markets,
        pricing: &mut PriceTracker,
        params: &ProductionParams,
        tick: Tick,
        out: &mut StepOutput,
    ) -> SimResult<()> {
        let def = &defs[building.def as usize];
        let mult = research.for_entity(building.owner);

        // 1. status handling
        match building.status {
            BuildingStatus::UnderConstruction => {
                self.gather_pending_materials(
                    id, building, ledger, markets, pricing, params, tick, out,
                )?;
                if building.construction_progress < building.construction_ticks_required {
                    building.construction_progress += 1;
                }
                if building.construction_progress >= building.construction_ticks_required
                    && building.pending_materials.is_empty()
                {
                    building.status = BuildingStatus::Running;
                    building.construction_progress = 0;
                    building.construction_ticks_required = 0;

                    #[cfg(feature = "instrument")]
                    tracing::info!(
                        target: "building",
                        tick = tick,
                        owner = ?building.owner,
                        def = building.def,
                        event = "construction_complete",
                    );
                }
            }
            BuildingStatus::WaitingMaterials => {
                let all_present = building.pending_materials.iter().all(|&(c, need)| {
                    ledger
                        .available_quantity(building.owner, c)
                        .map(|have| have >= need)
                        .unwrap_or(false)
                });
                if all_present {
                    for &(c, need) in &building.pending_materials {
                        ledger.consume_goods(building.owner, c, need, tick, "construction")?;
                        pricing.record_demand(c, need as f64);
                    }
                    building.pending_materials.clear();
                    building.status = BuildingStatus::UnderConstruction;
                } else {
                    let gaps: Vec<(CommodityId, Quantity)> = building
                        .pending_materials
                        .iter()
                        .filter_map(|&(c, need)| {
                            let have = ledger.available_quantity(building.owner, c).unwrap_or(0);
                            (have < need).then_some((c, need - have))
                        })
                        .collect();
                    for (c, shortfall) in gaps {
                        self.auto_purchase(
                            id,
                            building.owner,
                            c,
                            shortfall,
                            ledger,
                            markets,
                            pricing,
                            params,
                            tick,
                            out,
                        )?;
                    }
                }
            }
            BuildingStatus::Paused | BuildingStatus::NoPower => {}
            BuildingStatus::NoInput | BuildingStatus::Running => {}
        }

        // 2. maintenance
        let maintenance = (def.monthly_maintenance as f64 * mult.cost
            * building.status.maintenance_multiplier()
            * building.aggregation_factor as f64
            / 30.0)
            .round() as Money;
        if maintenance > 0 {
            ledger.charge_cash(building.owner, maintenance)?;
            out.maintenance.push((building.owner, maintenance));
        }

        // 3. recipe execution
        if matches!(
            building.status,
            BuildingStatus::Running | BuildingStatus::NoInput
        ) {
            self.run_recipe(
                id, building, methods, mult, ledger, markets, pricing, params, tick, out,
            )?;
        }
        Ok(())
    }

    /// Consume pending construction materials as they become available;
    /// auto-buy the rest.
    #[allow(clippy::too_many_arguments)]
    fn gather_pending_materials(
        &mut self,
        id: BuildingId,
        building: &mut Building,
        ledger: &mut Ledger,
        markets: &mut Markets,
        pricing: &mut PriceTracker,
        params: &ProductionParams,
        tick: Tick,
        out: &mut StepOutput,
    ) -> SimResult<()> {
        let mut still_pending = Vec::new();
        let pending = std::mem::take(&mut building.pending_materials);
        for (c, need) in pending {
            let have = ledger.available_quantity(building.owner, c)?;
            if have >= need {
                ledger.consume_goods(building.owner, c, need, tick, "construction")?;
                pricing.record_demand(c, need as f64);
            } else {
                self.auto_purchase(
                    id,
                    building.owner,
                    c,
                    need - have,
                    ledger,
                    markets,
                    pricing,
                    params,
                    tick,
                    out,
                )?;
                still_pending.push((c, need));
            }
        }
        building.pending_materials = still_pending;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn run_recipe(
        &mut self,
        id: BuildingId,
        building: &mut Building,
        methods: &[Method],
        mult: Multipliers,
        ledger: &mut Ledger,
        markets: &mut Markets,
        pricing: &mut PriceTracker,
        params: &ProductionParams,
        tick: Tick,
        out: &mut StepOutput,
    ) -> SimResult<()> {
        let method = &methods[building.method as usize];
        let owner = building.owner;
        let aggregation = building.aggregation_factor;

        // (a) hold the cycle's inputs under a production reservation
        if !building.inputs_reserved {
            let mut shortfalls = Vec::new();
            for &(c, amount) in &method.inputs {
                let need = scaled_amount(amount, mult.input, aggregation);
                let have = ledger.available_quantity(owner, c)?;
                if have < need {
                    shortfalls.push((c, need, have));
                }
            }
            if !shortfalls.is_empty() {
                // (b) input scarcity is a status transition, not an error
                building.status = BuildingStatus::NoInput;
                for (c, need, have) in shortfalls {
                    out.shortages.push(ShortageReport {
                        building: id,
                        commodity: c,
                        needed: need,
                        available: have,
                    });
                    self.auto_purchase(
                        id,
                        owner,
                        c,
                        need - have,
                        ledger,
                        markets,
                        pricing,
                        params,
                        tick,
                        out,
                    )?;
                }
                return Ok(());
            }
            for &(c, amount) in &method.inputs {
                let need = scaled_amount(amount, mult.input, aggregation);
                if need > 0 {
                    ledger.reserve_for_production(owner, c, need, tick)?;
                }
            }
            building.inputs_reserved = true;
            building.status = BuildingStatus::Running;
        }

        // (c) advance progress
        building.progress += building.efficiency * building.utilization * mult.efficiency;

        // (d) complete at most one cycle, carrying fractional overflow
        if building.progress >= method.ticks_required as f64 {
            building.progress -= method.ticks_required as f64;

            let mut input_cost = 0.0f64;
            for &(c, amount) in &method.inputs {
                let need = scaled_amount(amount, mult.input, aggregation);
                if need == 0 {
                    continue;
                }
                let avg = ledger.get(owner)?.stock(c).avg_cost;
                if let Err(_e) = ledger.consume_goods(owner, c, need, tick, "production") {
                    // Inputs vanished between reserve and consume. Single
                    // threaded, so this cannot happen unless a collaborator
                    // mutated mid-tick.
                    debug_assert!(false, "reserved production inputs disappeared");
                    building.status = BuildingStatus::NoInput;
                    building.inputs_reserved = false;
                    return Ok(());
                }
                input_cost += need as f64 * avg;
                pricing.record_demand(c, need as f64);
            }

            let total_output: Quantity = method
                .outputs
                .iter()
                .map(|&(_, amount)| scaled_amount(amount, mult.output, aggregation))
                .sum();
            let unit_cost: Price = if total_output > 0 {
                (input_cost / total_output as f64).round() as Price
            } else {
                0
            };

            let mut output_value: Money = 0;
            for &(c, amount) in &method.outputs {
                let qty = scaled_amount(amount, mult.output, aggregation);
                if qty == 0 {
                    continue;
                }
                ledger.add_goods(owner, c, qty, unit_cost, tick, "production")?;
                pricing.record_supply(c, qty as f64);
                output_value += qty as Money * pricing.price(c);
            }

            building.inputs_reserved = false;
            building.utilization = (building.utilization + 0.05).min(1.0);

            let input_cost = input_cost.round() as Money;
            building.recent_cycles.push(output_value - input_cost);
            out.cycles.push(CycleCompletion {
                building: id,
                owner,
                output_value,
                input_cost,
            });

            #[cfg(feature = "instrument")]
            tracing::info!(
                target: "production",
                tick = tick,
                def = building.def,
                method = method.id,
                aggregation = aggregation,
                output_value = output_value,
                input_cost = input_cost,
            );
        }
        Ok(())
    }

    /// Submit a limit buy for a shortfall, throttled to one live order per
    /// (building, commodity) and bounded by the cash-protection rules.
    #[allow(clippy::too_many_arguments)]
    fn auto_purchase(
        &mut self,
        building: BuildingId,
        owner: EntityId,
        commodity: CommodityId,
        shortfall: Quantity,
        ledger: &mut Ledger,
        markets: &mut Markets,
        pricing: &PriceTracker,
        params: &ProductionParams,
        tick: Tick,
        out: &mut StepOutput,
    ) -> SimResult<()> {
        if shortfall == 0 {
            return Ok(());
        }
        if let Some(&existing) = self.pending_orders.get(&(building, commodity)) {
            let live = markets
                .get_order(existing)
                .map(|o| o.status.is_active())
                .unwrap_or(false);
            if live {
                return Ok(());
            }
            self.pending_orders.remove(&(building, commodity));
        }

        let cash = ledger.cash(owner)?;
        if cash < params.cash_protection_threshold {
            return Ok(());
        }
        // small premium over market so the order is crossable
        let price = ((pricing.price(commodity) as f64) * 1.02).round().max(1.0) as Price;
        let max_spend = (cash as f64 * params.auto_purchase_max_spend_ratio) as Money;
        let affordable = (max_spend / price).max(0) as Quantity;
        let qty = shortfall.min(affordable);
        if qty == 0 {
            return Ok(());
        }

        let receipt = markets.submit(
            owner,
            commodity,
            Side::Buy,
            qty,
            price,
            tick,
            params.auto_purchase_validity_ticks,
        )?;
        out.displaced.extend(receipt.displaced);
        self.pending_orders
            .insert((building, commodity), receipt.order_id);

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "auto_purchase",
            tick = tick,
            commodity = commodity,
            qty = qty,
            unit_price = price,
        );
        Ok(())
    }
}
