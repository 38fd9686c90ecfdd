// The owning simulation kernel: one struct, no globals. Components are
// fields; collaborators are injected traits; commands queue and apply at tick
// boundaries. One tick runs to completion before the next begins.

use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use slotmap::SlotMap;

use crate::command::{
    Command, CommandOutcome, FinancialSummary, MarketChange, PriceSnapshot, RejectReason,
    TickUpdate,
};
use crate::competitor::{Action, ActionRequest, CompetitorRuntime};
use crate::config::SimConfig;
use crate::demand::ConsumerDemand;
use crate::diagnostics::{DiagnosticsReport, Phase, TickProfiler};
use crate::error::{SimError, SimResult};
use crate::external::{NarrativeEvent, PlanRequest, Providers};
use crate::ledger::{Entity, Ledger};
use crate::market::{Markets, MatchingEngine, Order, Side};
use crate::pricing::PriceTracker;
use crate::production::{
    Building, BuildingStatus, ProductionEngine, ResearchEffects,
};
use crate::scheduler::{Speed, TickTimer};
use crate::types::{
    BuildingId, CommodityCategory, CommodityId, EntityId, EntityKind, Money, OrderId, Price,
    Quantity, Tick,
};

/// The deterministic simulation kernel. Owns the ledger, books, trade log,
/// price tracker, building set and competitor state; advances them one tick
/// at a time in a fixed phase order.
pub struct SimulationKernel {
    cfg: SimConfig,
    tick: Tick,
    rng: ChaCha8Rng,

    ledger: Ledger,
    player: EntityId,
    buildings: SlotMap<BuildingId, Building>,
    markets: Markets,
    matching: MatchingEngine,
    pricing: PriceTracker,
    demand: ConsumerDemand,
    production: ProductionEngine,
    competitors: CompetitorRuntime,
    research: ResearchEffects,

    timer: TickTimer,
    profiler: TickProfiler,
    providers: Providers,

    pending_plan_requests: Vec<(EntityId, Tick)>,
    scheduled_events: Vec<(Tick, NarrativeEvent)>,
    command_queue: Vec<Command>,
    responses: Vec<CommandOutcome>,
    last_diagnostics: Option<DiagnosticsReport>,
}

struct WorldState {
    ledger: Ledger,
    player: EntityId,
    buildings: SlotMap<BuildingId, Building>,
    markets: Markets,
    matching: MatchingEngine,
    pricing: PriceTracker,
    demand: ConsumerDemand,
    competitors: CompetitorRuntime,
}

impl SimulationKernel {
    pub fn new(cfg: SimConfig, providers: Providers) -> SimResult<Self> {
        let world = build_world(&cfg)?;
        let timer = TickTimer::new(cfg.base_tick_ms);
        let profiler = TickProfiler::new(cfg.profiler_capacity);
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(cfg.rng_seed),
            tick: 0,
            ledger: world.ledger,
            player: world.player,
            buildings: world.buildings,
            markets: world.markets,
            matching: world.matching,
            pricing: world.pricing,
            demand: world.demand,
            production: ProductionEngine::new(),
            competitors: world.competitors,
            research: ResearchEffects::default(),
            timer,
            profiler,
            providers,
            pending_plan_requests: Vec::new(),
            scheduled_events: Vec::new(),
            command_queue: Vec::new(),
            responses: Vec::new(),
            last_diagnostics: None,
            cfg,
        })
    }

    /// Rebuild every component to its initial state. The entity set, commodity
    /// definitions and seeded stocks come back exactly as `new` produced them;
    /// books empty, price history reset to the seed candle, rng reseeded.
    pub fn reset(&mut self) -> SimResult<()> {
        let world = build_world(&self.cfg)?;
        self.ledger = world.ledger;
        self.player = world.player;
        self.buildings = world.buildings;
        self.markets = world.markets;
        self.matching = world.matching;
        self.pricing = world.pricing;
        self.demand = world.demand;
        self.competitors = world.competitors;
        self.production.clear();
        self.research.clear();
        self.rng = ChaCha8Rng::seed_from_u64(self.cfg.rng_seed);
        self.tick = 0;
        self.timer = TickTimer::new(self.cfg.base_tick_ms);
        self.profiler.clear();
        self.pending_plan_requests.clear();
        self.scheduled_events.clear();
        self.command_queue.clear();
        self.last_diagnostics = None;
        self.providers.plans.cancel_pending();
        Ok(())
    }

    // === EXTERNAL CONTROL ===

    /// Queue a command for application at the start of the next tick.
    pub fn push_command(&mut self, command: Command) {
        self.command_queue.push(command);
    }

    /// Outcomes of commands applied so far, in application order.
    pub fn drain_responses(&mut self) -> Vec<CommandOutcome> {
        std::mem::take(&mut self.responses)
    }

    // === ACCESSORS ===

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn player(&self) -> EntityId {
        self.player
    }

    pub fn config(&self) -> &SimConfig {
        &self.cfg
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn markets(&self) -> &Markets {
        &self.markets
    }

    pub fn pricing(&self) -> &PriceTracker {
        &self.pricing
    }

    pub fn buildings(&self) -> &SlotMap<BuildingId, Building> {
        &self.buildings
    }

    pub fn competitors(&self) -> &CompetitorRuntime {
        &self.competitors
    }

    pub fn profiler(&self) -> &TickProfiler {
        &self.profiler
    }

    /// Most recent periodic diagnostics report, if one has been generated.
    pub fn diagnostics(&self) -> Option<&DiagnosticsReport> {
        self.last_diagnostics.as_ref()
    }

    pub fn timer(&self) -> &TickTimer {
        &self.timer
    }

    pub fn trades(&self) -> &[crate::market::Trade] {
        self.matching.trades()
    }

    pub fn research_mut(&mut self) -> &mut ResearchEffects {
        &mut self.research
    }

    // === TICK ===

    /// Advance one tick. `now_ms` is the wall timestamp stamped onto the
    /// update record (injected so runs stay reproducible).
    ///
    /// Phase order is fixed: external events, consumer demand, matching,
    /// price discovery, production, competitor policy, throttled expiry
    /// sweep, snapshot emission.
    pub fn step(&mut self, now_ms: u64) -> SimResult<TickUpdate> {
        let tick_start = Instant::now();
        self.tick += 1;
        let tick = self.tick;
        self.profiler.begin_tick(tick);
        self.matching.begin_tick();

        let mut financial = FinancialSummary::default();

        // (1) external-event application
        let phase_start = Instant::now();
        if self.apply_commands(tick)? {
            // a reset ran; this tick did not happen
            return Ok(self.reset_update(now_ms));
        }
        self.poll_plan_responses(tick);
        self.poll_narrative_events(tick);
        self.apply_due_events(tick);
        self.profiler
            .record_phase(Phase::ExternalEvents, phase_start.elapsed());

        // (2) consumer-demand injection
        let phase_start = Instant::now();
        for (commodity, qty) in self.demand.inject(tick, &mut self.rng) {
            self.pricing.record_demand(commodity, qty);
        }
        self.profiler
            .record_phase(Phase::DemandInjection, phase_start.elapsed());

        // (3) order matching: commodities with new orders, plus a periodic
        // full sweep to catch books made matchable by expiry or shocks
        let phase_start = Instant::now();
        let targets: Vec<CommodityId> =
            if self.cfg.matching_full_sweep_interval > 0
                && tick % self.cfg.matching_full_sweep_interval == 0
            {
                self.markets.take_dirty();
                (0..self.markets.commodity_count() as CommodityId).collect()
            } else {
                self.markets.take_dirty()
            };
        self.matching
            .run_pass(&mut self.markets, &mut self.ledger, &targets, tick)?;
        for trade in self.matching.tick_trades() {
            self.pricing.observe_trade(trade.commodity, trade.unit_price);
            if trade.buyer == self.player {
                financial.input_cost += trade.total;
            }
            if trade.seller == self.player {
                financial.income += trade.total;
            }
        }
        self.profiler
            .record_phase(Phase::Matching, phase_start.elapsed());

        // (4) price discovery
        let phase_start = Instant::now();
        let changes = self
            .pricing
            .update_prices(tick, self.matching.volumes(), &mut self.rng);
        self.profiler
            .record_phase(Phase::PriceDiscovery, phase_start.elapsed());

        // (5) production
        let phase_start = Instant::now();
        let production_out = self.production.step_all(
            &mut self.buildings,
            &self.cfg.building_defs,
            &self.cfg.methods,
            &self.research,
            &mut self.ledger,
            &mut self.markets,
            &mut self.pricing,
            &self.cfg.production_params(),
            tick,
        )?;
        self.release_holds(&production_out.displaced);
        for &(owner, amount) in &production_out.maintenance {
            if owner == self.player {
                financial.maintenance += amount;
            }
        }
        self.profiler
            .record_phase(Phase::Production, phase_start.elapsed());

        // (6) competitor policy
        let phase_start = Instant::now();
        let actions = self.competitors.decide(
            tick,
            &self.ledger,
            &self.buildings,
            &self.cfg.building_defs,
            &self.cfg.methods,
            &self.pricing,
            self.player,
            &mut self.rng,
        );
        for request in actions {
            self.execute_competitor_action(request, tick);
        }
        let bailouts = self
            .competitors
            .apply_bailouts(&mut self.ledger, &self.buildings, tick);
        self.request_plan_refresh(tick);
        self.profiler
            .record_phase(Phase::CompetitorDecision, phase_start.elapsed());

        // (7) throttled expiry sweep and archive retention
        let phase_start = Instant::now();
        if self.cfg.expiry_sweep_interval > 0 && tick % self.cfg.expiry_sweep_interval == 0 {
            let expired = self.markets.sweep_expired(tick);
            self.release_holds(&expired);
        }
        if self.cfg.archive_sweep_interval > 0 && tick % self.cfg.archive_sweep_interval == 0 {
            self.markets
                .sweep_archive(tick, self.cfg.order_archive_retention_ticks);
        }
        if self.cfg.diagnostics_interval > 0 && tick % self.cfg.diagnostics_interval == 0 {
            self.last_diagnostics = Some(self.profiler.generate_report(
                self.cfg.diagnostics_interval as usize,
                self.cfg.slow_tick_warn_us,
            ));
        }
        self.profiler
            .record_phase(Phase::ExpirySweep, phase_start.elapsed());

        // (8) snapshot emission
        let phase_start = Instant::now();
        financial.net = financial.income - financial.input_cost - financial.maintenance;
        financial.building_cycle_avg = self
            .buildings
            .iter()
            .filter(|(_, b)| b.owner == self.player)
            .filter_map(|(id, b)| b.rolling_cycle_net().map(|net| (id, net)))
            .collect();
        let update = self.build_update(
            tick,
            now_ms,
            financial,
            changes.into_iter().map(MarketChange::from).collect(),
            production_out.deltas,
            production_out.shortages,
            bailouts,
        );
        self.providers.persistence.record(&update);
        self.profiler
            .record_phase(Phase::SnapshotEmit, phase_start.elapsed());

        let elapsed = tick_start.elapsed();
        let slow = self.timer.is_slow(elapsed);
        self.profiler.end_tick(elapsed, slow);
        Ok(update)
    }

    // === COMMAND APPLICATION ===

    /// Apply every queued command. Returns true if a reset ran (the caller
    /// must abandon the tick).
    fn apply_commands(&mut self, tick: Tick) -> SimResult<bool> {
        let queue = std::mem::take(&mut self.command_queue);
        for command in queue {
            if matches!(command, Command::Reset) {
                self.reset()?;
                self.responses.push(CommandOutcome::Accepted);
                return Ok(true);
            }
            let outcome = self.apply_command(command, tick);
            self.responses.push(outcome);
        }
        Ok(false)
    }

    fn apply_command(&mut self, command: Command, tick: Tick) -> CommandOutcome {
        match command {
            Command::Pause => {
                self.timer.set_speed(Speed::Paused);
                CommandOutcome::Accepted
            }
            Command::Resume => {
                if self.timer.is_paused() {
                    self.timer.set_speed(Speed::X1);
                }
                CommandOutcome::Accepted
            }
            Command::SetSpeed(speed) => {
                self.timer.set_speed(speed);
                CommandOutcome::Accepted
            }
            Command::Reset => unreachable!("reset handled in apply_commands"),
            Command::PurchaseBuilding { entity, definition } => {
                self.purchase_building(entity, definition, false, tick)
            }
            Command::SubmitOrder {
                entity,
                commodity,
                side,
                qty,
                unit_price,
                validity_ticks,
            } => {
                let validity = if validity_ticks == 0 {
                    self.cfg.default_order_validity_ticks
                } else {
                    validity_ticks
                };
                match self.submit_order(entity, commodity, side, qty, unit_price, validity, tick) {
                    Ok(order_id) => CommandOutcome::OrderAccepted { order_id },
                    Err(e) => CommandOutcome::Rejected { reason: reject(e) },
                }
            }
            Command::CancelOrder { entity, order_id } => {
                let owns = self
                    .markets
                    .get_order(order_id)
                    .map(|o| o.owner == entity && o.status.is_active())
                    .unwrap_or(false);
                if !owns {
                    return CommandOutcome::Rejected {
                        reason: RejectReason::UnknownOrder,
                    };
                }
                match self.markets.cancel(order_id, tick) {
                    Some(order) => {
                        self.release_holds(std::slice::from_ref(&order));
                        CommandOutcome::Accepted
                    }
                    None => CommandOutcome::Rejected {
                        reason: RejectReason::UnknownOrder,
                    },
                }
            }
            Command::SwitchMethod {
                entity,
                building,
                method,
            } => self.switch_method(entity, building, method, tick),
        }
    }

    fn purchase_building(
        &mut self,
        entity: EntityId,
        definition: u16,
        lenient: bool,
        tick: Tick,
    ) -> CommandOutcome {
        if !self.ledger.contains(entity) {
            return CommandOutcome::Rejected {
                reason: RejectReason::UnknownEntity,
            };
        }
        let Some(def) = self.cfg.building_defs.get(definition as usize).cloned() else {
            return CommandOutcome::Rejected {
                reason: RejectReason::UnknownDefinition,
            };
        };
        if self.ledger.deduct_cash(entity, def.labor_cost).is_err() {
            return CommandOutcome::Rejected {
                reason: RejectReason::InsufficientCash,
            };
        }
        let method = def.default_method().unwrap_or(0);
        let mut building = Building::new(&def, entity, method);

        let mut missing = Vec::new();
        let mut have_half_of_each = true;
        for &(commodity, need) in &def.construction_materials {
            let have = self
                .ledger
                .available_quantity(entity, commodity)
                .unwrap_or(0);
            if have < need {
                missing.push((commodity, need - have));
            }
            if have * 2 < need {
                have_half_of_each = false;
            }
        }

        if missing.is_empty() {
            for &(commodity, need) in &def.construction_materials {
                let _ = self
                    .ledger
                    .consume_goods(entity, commodity, need, tick, "construction");
                self.pricing.record_demand(commodity, need as f64);
            }
        } else if lenient && have_half_of_each {
            // begin with half on hand; buy the rest while building, 50% slower
            for &(commodity, need) in &def.construction_materials {
                let have = self
                    .ledger
                    .available_quantity(entity, commodity)
                    .unwrap_or(0);
                let take = have.min(need);
                if take > 0 {
                    let _ = self
                        .ledger
                        .consume_goods(entity, commodity, take, tick, "construction");
                    self.pricing.record_demand(commodity, take as f64);
                }
                if take < need {
                    building.pending_materials.push((commodity, need - take));
                }
            }
            building.construction_ticks_required = def.construction_ticks.div_ceil(2) * 3;
        } else {
            building.status = BuildingStatus::WaitingMaterials;
            building.pending_materials = def.construction_materials.clone();
        }

        let building_id = self.buildings.insert(building);

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "building",
            tick = tick,
            def = definition,
            labor_cost = def.labor_cost,
            event = "purchased",
        );

        CommandOutcome::BuildingAccepted {
            building_id,
            labor_cost_charged: def.labor_cost,
            missing_materials: missing,
        }
    }

    /// Validate and place an order, holding seller goods under a sale
    /// reservation. Buy orders must be covered by cash at submission time.
    #[allow(clippy::too_many_arguments)]
    fn submit_order(
        &mut self,
        entity: EntityId,
        commodity: CommodityId,
        side: Side,
        qty: Quantity,
        unit_price: Price,
        validity: Tick,
        tick: Tick,
    ) -> SimResult<OrderId> {
        if !self.ledger.contains(entity) {
            return Err(SimError::UnknownEntity);
        }
        if (commodity as usize) >= self.markets.commodity_count() {
            return Err(SimError::UnknownCommodity(commodity));
        }
        if qty == 0 {
            return Err(SimError::InvalidQuantity(qty));
        }
        if unit_price <= 0 {
            return Err(SimError::InvalidPrice(unit_price));
        }
        match side {
            Side::Buy => {
                let total = qty as Money * unit_price;
                let cash = self.ledger.cash(entity)?;
                if cash < total {
                    return Err(SimError::InsufficientCash {
                        needed: total,
                        available: cash,
                    });
                }
            }
            Side::Sell => {
                self.ledger.reserve_for_sale(entity, commodity, qty, tick)?;
            }
        }
        let receipt = self
            .markets
            .submit(entity, commodity, side, qty, unit_price, tick, validity)?;
        self.release_holds(&receipt.displaced);
        Ok(receipt.order_id)
    }

    fn switch_method(
        &mut self,
        entity: EntityId,
        building_id: BuildingId,
        method: u16,
        tick: Tick,
    ) -> CommandOutcome {
        let Some(building) = self.buildings.get(building_id) else {
            return CommandOutcome::Rejected {
                reason: RejectReason::UnknownBuilding,
            };
        };
        if building.owner != entity {
            return CommandOutcome::Rejected {
                reason: RejectReason::NotOwner,
            };
        }
        let def = &self.cfg.building_defs[building.def as usize];
        if !def.methods.contains(&method) {
            return CommandOutcome::Rejected {
                reason: RejectReason::UnknownMethod,
            };
        }
        // release the current cycle's input holds before the switch
        let (old_method, aggregation, reserved) = {
            let b = &self.buildings[building_id];
            (b.method, b.aggregation_factor, b.inputs_reserved)
        };
        if reserved {
            let mult = self.research.for_entity(entity);
            let inputs = self.cfg.methods[old_method as usize].inputs.clone();
            for (commodity, amount) in inputs {
                let computed =
                    crate::production::scaled_amount(amount, mult.input, aggregation);
                let held = self
                    .ledger
                    .get(entity)
                    .map(|e| e.stock(commodity).reserved_for_production)
                    .unwrap_or(0);
                let release = computed.min(held);
                if release > 0 {
                    let _ = self
                        .ledger
                        .release_production_reservation(entity, commodity, release, tick);
                }
            }
        }
        let building = &mut self.buildings[building_id];
        building.method = method;
        building.progress = 0.0;
        building.inputs_reserved = false;
        CommandOutcome::Accepted
    }

    // === COMPETITOR EXECUTION ===

    fn execute_competitor_action(&mut self, request: ActionRequest, tick: Tick) {
        match request.action {
            Action::PurchaseBuilding { def } => {
                // lenient material rules for autonomous expansion
                let _ = self.purchase_building(request.entity, def, true, tick);
            }
            Action::SwitchMethod { building, method } => {
                let _ = self.switch_method(request.entity, building, method, tick);
            }
            Action::SubmitOrder {
                commodity,
                side,
                qty,
                unit_price,
            } => {
                let validity = self.competitors.order_validity();
                let _ = self.submit_order(
                    request.entity,
                    commodity,
                    side,
                    qty,
                    unit_price,
                    validity,
                    tick,
                );
            }
        }
    }

    // === EXTERNAL COLLABORATORS ===

    fn poll_plan_responses(&mut self, tick: Tick) {
        for response in self.providers.plans.poll() {
            let pending = self
                .pending_plan_requests
                .iter()
                .position(|&(entity, _)| entity == response.entity);
            if let Some(idx) = pending {
                self.pending_plan_requests.remove(idx);
                self.competitors.apply_plan(response.entity, response.plan, tick);
            }
            // responses with no pending request were expired; never merged
        }
        let timeout = self.cfg.plan_request_timeout_ticks;
        self.pending_plan_requests
            .retain(|&(_, issued)| issued + timeout > tick);
    }

    fn poll_narrative_events(&mut self, tick: Tick) {
        for event in self.providers.events.poll() {
            let offset: Tick = self.rng.random_range(10..=210);
            self.scheduled_events.push((tick + offset, event));
        }
    }

    fn apply_due_events(&mut self, tick: Tick) {
        let mut due = Vec::new();
        self.scheduled_events.retain(|(at, event)| {
            if *at <= tick {
                due.push(event.clone());
                false
            } else {
                true
            }
        });
        for event in due {
            for &(commodity, pct) in &event.price_changes {
                if (commodity as usize) < self.markets.commodity_count() {
                    self.pricing.apply_price_shock(commodity, pct);
                }
            }
            for &(commodity, pct) in &event.supply_changes {
                if (commodity as usize) < self.markets.commodity_count() {
                    self.pricing.apply_supply_shock(commodity, pct);
                }
            }

            #[cfg(feature = "instrument")]
            tracing::info!(
                target: "narrative_event",
                tick = tick,
                kind = event.kind.as_str(),
                title = event.title.as_str(),
            );
        }
    }

    fn request_plan_refresh(&mut self, tick: Tick) {
        let in_flight: Vec<EntityId> = self
            .pending_plan_requests
            .iter()
            .map(|&(entity, _)| entity)
            .collect();
        let Some(entity) = self.competitors.plan_refresh_candidate(tick, &in_flight) else {
            return;
        };
        let Ok(agent) = self.ledger.get(entity) else {
            return;
        };
        let industries = self.industries_of(entity);
        let player_industries = self.industries_of(self.player);
        let rivalry = self
            .competitors
            .state_of(entity)
            .map(|s| s.rivalry)
            .unwrap_or(0.0);
        let request = PlanRequest {
            entity,
            tick,
            cash: agent.cash,
            building_count: self
                .buildings
                .values()
                .filter(|b| b.owner == entity)
                .count(),
            industries,
            player_industries,
            prices: self
                .pricing
                .prices()
                .iter()
                .enumerate()
                .map(|(i, &p)| (i as CommodityId, p))
                .collect(),
            rivalry,
        };
        self.providers.plans.request_plan(request);
        self.pending_plan_requests.push((entity, tick));
    }

    fn industries_of(&self, entity: EntityId) -> Vec<CommodityCategory> {
        let mut industries: Vec<CommodityCategory> = self
            .buildings
            .values()
            .filter(|b| b.owner == entity)
            .map(|b| self.cfg.building_defs[b.def as usize].category)
            .collect();
        industries.dedup();
        industries
    }

    // === HOLD MANAGEMENT ===

    /// Sale reservations follow their orders; whenever a sell order leaves the
    /// book without filling (cancel, displacement, expiry) its remaining hold
    /// is released.
    fn release_holds(&mut self, orders: &[Order]) {
        for order in orders {
            if order.side == Side::Sell && order.remaining > 0 {
                let released = self.ledger.release_sale_reservation(
                    order.owner,
                    order.commodity,
                    order.remaining,
                    order.updated_tick,
                );
                debug_assert!(released.is_ok(), "dangling sale reservation");
            }
        }
    }

    // === UPDATE RECORDS ===

    #[allow(clippy::too_many_arguments)]
    fn build_update(
        &mut self,
        tick: Tick,
        now_ms: u64,
        financial: FinancialSummary,
        market_changes: Vec<MarketChange>,
        building_deltas: Vec<crate::production::BuildingDelta>,
        shortages: Vec<crate::production::ShortageReport>,
        bailouts: Vec<(EntityId, Money)>,
    ) -> TickUpdate {
        let prices = if self.cfg.full_snapshot_interval > 0
            && tick % self.cfg.full_snapshot_interval == 0
        {
            PriceSnapshot::Full(
                self.pricing
                    .prices()
                    .iter()
                    .enumerate()
                    .map(|(i, &p)| (i as CommodityId, p))
                    .collect(),
            )
        } else {
            PriceSnapshot::Delta(
                market_changes
                    .iter()
                    .map(|c| (c.commodity, c.new))
                    .collect(),
            )
        };
        TickUpdate {
            tick,
            wall_ms: now_ms,
            player_cash: self.ledger.cash(self.player).unwrap_or(0),
            building_count: self
                .buildings
                .values()
                .filter(|b| b.owner == self.player)
                .count(),
            financial,
            market_changes,
            prices,
            trades: self.matching.tick_trades().to_vec(),
            volumes: self
                .matching
                .volumes()
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.is_zero())
                .map(|(i, &v)| (i as CommodityId, v))
                .collect(),
            building_deltas,
            shortages,
            bailouts,
        }
    }

    fn reset_update(&mut self, now_ms: u64) -> TickUpdate {
        TickUpdate {
            tick: 0,
            wall_ms: now_ms,
            player_cash: self.ledger.cash(self.player).unwrap_or(0),
            building_count: self
                .buildings
                .values()
                .filter(|b| b.owner == self.player)
                .count(),
            financial: FinancialSummary::default(),
            market_changes: Vec::new(),
            prices: PriceSnapshot::Full(
                self.pricing
                    .prices()
                    .iter()
                    .enumerate()
                    .map(|(i, &p)| (i as CommodityId, p))
                    .collect(),
            ),
            trades: Vec::new(),
            volumes: Vec::new(),
            building_deltas: Vec::new(),
            shortages: Vec::new(),
            bailouts: Vec::new(),
        }
    }

    // === INVARIANTS ===

    /// Tick-boundary structural checks used by tests and debug sweeps.
    pub fn check_invariants(&self) -> SimResult<()> {
        for (_, entity) in self.ledger.iter() {
            for (&commodity, stock) in &entity.stocks {
                if stock.reserved_for_sale + stock.reserved_for_production > stock.quantity {
                    return Err(SimError::InvariantViolation(format!(
                        "over-reserved stock of commodity {commodity} in {}",
                        entity.name
                    )));
                }
            }
        }
        for book in self.markets.books() {
            book.check_consistency()?;
        }
        for (idx, &price) in self.pricing.prices().iter().enumerate() {
            let base = self.cfg.commodities[idx].base_price as f64;
            let lo = (base * self.cfg.price_min_multiplier).round().max(1.0) as Price;
            let hi = (base * self.cfg.price_max_multiplier).round() as Price;
            if price < lo || price > hi {
                return Err(SimError::InvariantViolation(format!(
                    "price {price} of commodity {idx} outside clamp [{lo}, {hi}]"
                )));
            }
        }
        Ok(())
    }
}

fn reject(e: SimError) -> RejectReason {
    match e {
        SimError::InsufficientCash { .. } => RejectReason::InsufficientCash,
        SimError::InsufficientReserved { .. } | SimError::InsufficientFree { .. } => {
            RejectReason::InsufficientReserved
        }
        SimError::UnknownEntity => RejectReason::UnknownEntity,
        SimError::UnknownCommodity(_) => RejectReason::UnknownCommodity,
        SimError::UnknownOrder(_) => RejectReason::UnknownOrder,
        SimError::UnknownBuilding => RejectReason::UnknownBuilding,
        SimError::InvalidQuantity(_) => RejectReason::InvalidQuantity,
        _ => RejectReason::InvalidPrice,
    }
}

fn build_world(cfg: &SimConfig) -> SimResult<WorldState> {
    let mut ledger = Ledger::new();
    let mut buildings: SlotMap<BuildingId, Building> = SlotMap::with_key();
    let mut player = None;
    let mut competitor_ids = Vec::new();

    for spec in &cfg.entities {
        let mut entity = Entity::new(spec.name.clone(), spec.kind, spec.cash);
        entity.persona = spec.persona.clone();
        let id = ledger.add_entity(entity);
        match spec.kind {
            EntityKind::Player => player = Some(id),
            EntityKind::Competitor => competitor_ids.push(id),
        }
        for &(commodity, qty, unit_cost) in &spec.stocks {
            if qty > 0 {
                ledger.add_goods(id, commodity, qty, unit_cost, 0, "seed")?;
            }
        }
        for building_spec in &spec.buildings {
            let def = cfg
                .building_defs
                .get(building_spec.definition as usize)
                .ok_or(SimError::UnknownBuilding)?;
            let method = building_spec
                .method
                .or_else(|| def.default_method())
                .unwrap_or(0);
            let mut building = Building::new(def, id, method)
                .with_aggregation(building_spec.aggregation)
                .with_status(BuildingStatus::Running);
            // established plants start at full utilization; new constructions
            // ramp up from 0.5
            building.utilization = 1.0;
            buildings.insert(building);
        }
    }

    // a world always has a player entity, even if the config omits one
    let player = player
        .unwrap_or_else(|| ledger.add_entity(Entity::new("Player", EntityKind::Player, 0)));

    let markets = Markets::new(
        cfg.commodities.len(),
        cfg.max_orders_per_entity_per_commodity,
        cfg.max_orders_per_commodity,
    );
    let matching = MatchingEngine::new(
        player,
        cfg.commodities.len(),
        cfg.matching_max_pairs_per_commodity,
    );
    let pricing = PriceTracker::new(
        &cfg.commodities,
        cfg.price_history_capacity,
        cfg.price_params(),
    )?;
    let demand = ConsumerDemand::new(&cfg.commodities, cfg.demand_amplitude, cfg.demand_cycle_length);
    let competitors = CompetitorRuntime::new(&competitor_ids, cfg.competitor_params());

    Ok(WorldState {
        ledger,
        player,
        buildings,
        markets,
        matching,
        pricing,
        demand,
        competitors,
    })
}

/// Drive a kernel with real wall-clock pacing until `stop` returns true.
/// Intended for embedding; tests call `step` directly with synthetic
/// timestamps instead.
pub fn run_blocking<F>(kernel: &mut SimulationKernel, mut stop: F) -> SimResult<()>
where
    F: FnMut(&TickUpdate) -> bool,
{
    loop {
        let started = Instant::now();
        let now_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let update = kernel.step(now_ms)?;
        if stop(&update) {
            return Ok(());
        }
        match kernel.timer().next_delay(started.elapsed()) {
            Some(delay) => std::thread::sleep(delay),
            // paused: idle at the base period until external control resumes
            None => std::thread::sleep(std::time::Duration::from_millis(
                kernel.config().base_tick_ms,
            )),
        }
    }
}
