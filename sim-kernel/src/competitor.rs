// Competitor policy runtime: personas, strategic plans, throttled decisions

use rand::Rng;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::ledger::Ledger;
use crate::market::Side;
use crate::pricing::PriceTracker;
use crate::production::{Building, BuildingDef, BuildingDefId, Method, MethodId};
use crate::types::{
    BuildingId, CommodityCategory, CommodityId, EntityId, KeyToU64, Money, Price, Quantity, Tick,
};

// === PERSONA ===

/// Fixed temperament of a competitor. Drives pricing, goal weights and the
/// decision cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    /// 0 = passive, 1 = ruthless.
    pub aggressiveness: f64,
    /// 0 = hoards cash, 1 = spends freely.
    pub risk_tolerance: f64,
    /// Preferred decision cadence hint, in ticks.
    pub decision_interval: u32,
    pub preferred_industries: Vec<CommodityCategory>,
}

impl Persona {
    pub fn new(aggressiveness: f64, risk_tolerance: f64) -> Self {
        Self {
            aggressiveness: aggressiveness.clamp(0.0, 1.0),
            risk_tolerance: risk_tolerance.clamp(0.0, 1.0),
            decision_interval: 25,
            preferred_industries: Vec::new(),
        }
    }

    pub fn with_interval(mut self, ticks: u32) -> Self {
        self.decision_interval = ticks;
        self
    }

    pub fn with_industry(mut self, industry: CommodityCategory) -> Self {
        self.preferred_industries.push(industry);
        self
    }
}

// === STRATEGIC PLAN ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketStance {
    Aggressive,
    Defensive,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvestmentFocus {
    Expansion,
    Efficiency,
    MarketShare,
}

/// A competitor's cached high-level stance. Produced externally; the runtime
/// only consumes it and falls back to a persona default when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategicPlan {
    pub priority_industry: CommodityCategory,
    pub secondary_industry: Option<CommodityCategory>,
    pub stance: MarketStance,
    pub target_player: bool,
    pub investment_focus: InvestmentFocus,
    pub risk_level: f64,
    pub reasoning: String,
}

impl StrategicPlan {
    /// Persona-driven default used until the external provider answers.
    pub fn fallback(persona: &Persona) -> Self {
        let stance = if persona.aggressiveness > 0.66 {
            MarketStance::Aggressive
        } else if persona.aggressiveness < 0.33 {
            MarketStance::Defensive
        } else {
            MarketStance::Neutral
        };
        Self {
            priority_industry: persona
                .preferred_industries
                .first()
                .copied()
                .unwrap_or(CommodityCategory::RawMaterial),
            secondary_industry: persona.preferred_industries.get(1).copied(),
            stance,
            target_player: persona.aggressiveness > 0.8,
            investment_focus: if persona.risk_tolerance > 0.5 {
                InvestmentFocus::Expansion
            } else {
                InvestmentFocus::Efficiency
            },
            risk_level: persona.risk_tolerance,
            reasoning: String::new(),
        }
    }
}

// === GOALS & ACTIONS ===

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Goal {
    Expand,
    IncreaseMarketShare,
    Attack,
    Defend,
    ReduceCost,
}

/// One concrete action per decision; the kernel executes it.
#[derive(Debug, Clone)]
pub enum Action {
    PurchaseBuilding {
        def: BuildingDefId,
    },
    SwitchMethod {
        building: BuildingId,
        method: MethodId,
    },
    SubmitOrder {
        commodity: CommodityId,
        side: Side,
        qty: Quantity,
        unit_price: Price,
    },
}

#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub entity: EntityId,
    pub action: Action,
}

// === ORDER PRICING ===

/// Buy band `market × (1.00 … 1.08)`: always at or above market so books stay
/// crossable.
pub fn buy_price(market: Price, aggressiveness: f64) -> Price {
    ((market as f64) * (1.0 + 0.08 * aggressiveness.clamp(0.0, 1.0))).round() as Price
}

/// Sell band `market × (0.93 … 1.02)`: more aggressive personas undercut
/// deeper.
pub fn sell_price(market: Price, aggressiveness: f64) -> Price {
    ((market as f64) * (1.02 - 0.09 * aggressiveness.clamp(0.0, 1.0))).round() as Price
}

/// Price-war sells may punish a rival down to `market × 0.92`.
pub fn war_sell_price(market: Price) -> Price {
    ((market as f64) * 0.92).round() as Price
}

// === RUNTIME ===

#[derive(Debug, Clone, Copy)]
pub struct CompetitorParams {
    pub max_decisions_per_tick: usize,
    pub decision_interval_min: u32,
    pub decision_interval_max: u32,
    /// Plans older than this want a refresh.
    pub plan_refresh_interval: Tick,
    pub order_validity_ticks: Tick,
    pub bailout_base: Money,
    pub bailout_per_building: Money,
    pub bailout_per_aggregation_level: Money,
    pub bailout_cap: Money,
}

#[derive(Debug, Clone)]
pub struct CompetitorState {
    pub entity: EntityId,
    pub plan: Option<StrategicPlan>,
    pub plan_tick: Tick,
    pub next_decision_tick: Tick,
    /// Hostility toward the player, raised by squeezes and price wars.
    pub rivalry: f64,
    /// Price-war mode active until this tick (0 = off).
    pub price_war_until: Tick,
}

#[derive(Debug, Clone)]
pub struct CompetitorRuntime {
    states: Vec<CompetitorState>,
    params: CompetitorParams,
}

impl CompetitorRuntime {
    pub fn new(competitors: &[EntityId], params: CompetitorParams) -> Self {
        let spread = params.decision_interval_max.max(1) as u64;
        let states = competitors
            .iter()
            .map(|&entity| CompetitorState {
                entity,
                plan: None,
                plan_tick: 0,
                // hashed offset so competitors never all wake on the same tick
                next_decision_tick: entity.to_u64() % spread,
                rivalry: 0.0,
                price_war_until: 0,
            })
            .collect();
        Self { states, params }
    }

    pub fn states(&self) -> &[CompetitorState] {
        &self.states
    }

    pub fn state_of(&self, entity: EntityId) -> Option<&CompetitorState> {
        self.states.iter().find(|s| s.entity == entity)
    }

    fn state_mut(&mut self, entity: EntityId) -> Option<&mut CompetitorState> {
        self.states.iter_mut().find(|s| s.entity == entity)
    }

    /// At most one strategy refresh is initiated per tick across all
    /// competitors: the one with the stalest plan that is due and not already
    /// in flight.
    pub fn plan_refresh_candidate(
        &self,
        tick: Tick,
        in_flight: &[EntityId],
    ) -> Option<EntityId> {
        self.states
            .iter()
            .filter(|s| !in_flight.contains(&s.entity))
            .filter(|s| s.plan.is_none() || s.plan_tick + self.params.plan_refresh_interval <= tick)
            .min_by_key(|s| (s.plan_tick, s.entity.to_u64()))
            .map(|s| s.entity)
    }

    pub fn apply_plan(&mut self, entity: EntityId, plan: StrategicPlan, tick: Tick) {
        if let Some(state) = self.state_mut(entity) {
            state.plan = Some(plan);
            state.plan_tick = tick;
        }
    }

    pub fn note_squeeze(&mut self, entity: EntityId, tick: Tick) {
        if let Some(state) = self.state_mut(entity) {
            state.rivalry = (state.rivalry + 0.1).min(1.0);
            state.price_war_until = tick + 30;
        }
    }

    /// Pick due competitors (bounded per tick) and derive one action each.
    #[allow(clippy::too_many_arguments)]
    pub fn decide<R: Rng>(
        &mut self,
        tick: Tick,
        ledger: &Ledger,
        buildings: &SlotMap<BuildingId, Building>,
        defs: &[BuildingDef],
        methods: &[Method],
        pricing: &PriceTracker,
        player: EntityId,
        rng: &mut R,
    ) -> Vec<ActionRequest> {
        let mut actions = Vec::new();
        let due: Vec<EntityId> = self
            .states
            .iter()
            .filter(|s| s.next_decision_tick <= tick)
            .map(|s| s.entity)
            .take(self.params.max_decisions_per_tick)
            .collect();

        for entity in due {
            let interval = rng.random_range(
                self.params.decision_interval_min..=self.params.decision_interval_max,
            );
            let Some(state) = self.state_mut(entity) else {
                continue;
            };
            state.next_decision_tick = tick + interval as Tick;

            let Ok(agent) = ledger.get(entity) else {
                continue;
            };
            let persona = agent.persona.clone().unwrap_or_else(|| Persona::new(0.5, 0.5));
            let plan = state
                .plan
                .clone()
                .unwrap_or_else(|| StrategicPlan::fallback(&persona));
            let war_active = state.price_war_until > tick;

            let goal = pick_goal(&plan, &persona, war_active, rng);

            #[cfg(feature = "instrument")]
            tracing::info!(
                target: "competitor_decision",
                tick = tick,
                goal = ?goal,
                stance = ?plan.stance,
            );

            let action = match goal {
                Goal::Expand => {
                    expand_action(entity, &plan, &persona, ledger, defs)
                }
                Goal::Attack => attack_action(
                    entity, ledger, buildings, defs, methods, pricing, player, war_active,
                ),
                Goal::Defend => defend_action(entity, buildings, defs, methods, pricing, &persona),
                Goal::ReduceCost => reduce_cost_action(entity, buildings, defs, methods, pricing),
                Goal::IncreaseMarketShare => {
                    market_share_action(entity, ledger, buildings, defs, methods, pricing, &persona)
                }
            };
            // fall back to an operational order rather than doing nothing
            let action = action.or_else(|| {
                market_share_action(entity, ledger, buildings, defs, methods, pricing, &persona)
            });

            if let Some(action) = action {
                if let Action::SubmitOrder {
                    side: Side::Sell,
                    unit_price,
                    commodity,
                    ..
                } = &action
                    && *unit_price < sell_price(pricing.price(*commodity), 1.0)
                {
                    // undercutting below the normal band = price-war squeeze
                    self.note_squeeze(entity, tick);
                }
                actions.push(ActionRequest { entity, action });
            }
        }
        actions
    }

    /// Credit any competitor pushed negative by maintenance. Returns the
    /// transfers made.
    pub fn apply_bailouts(
        &mut self,
        ledger: &mut Ledger,
        buildings: &SlotMap<BuildingId, Building>,
        tick: Tick,
    ) -> Vec<(EntityId, Money)> {
        let mut transfers = Vec::new();
        for state in &self.states {
            let Ok(agent) = ledger.get(state.entity) else {
                continue;
            };
            if agent.cash >= 0 {
                continue;
            }
            let owned: Vec<&Building> = buildings
                .values()
                .filter(|b| b.owner == state.entity)
                .collect();
            let max_aggregation = owned
                .iter()
                .map(|b| b.aggregation_factor)
                .max()
                .unwrap_or(1);
            let transfer = (self.params.bailout_base
                + self.params.bailout_per_building * owned.len() as Money
                + self.params.bailout_per_aggregation_level * (max_aggregation as Money - 1))
                .min(self.params.bailout_cap);
            if ledger.add_cash(state.entity, transfer).is_err() {
                continue;
            }
            transfers.push((state.entity, transfer));

            #[cfg(feature = "instrument")]
            tracing::info!(
                target: "bailout",
                tick = tick,
                transfer = transfer,
                buildings = owned.len(),
            );
        }
        let _ = tick;
        transfers
    }

    pub fn order_validity(&self) -> Tick {
        self.params.order_validity_ticks
    }
}

fn pick_goal<R: Rng>(
    plan: &StrategicPlan,
    persona: &Persona,
    war_active: bool,
    rng: &mut R,
) -> Goal {
    let roll: f64 = rng.random();
    if war_active {
        return Goal::Attack;
    }
    match plan.stance {
        MarketStance::Aggressive => {
            if plan.target_player && roll < 0.3 + 0.5 * persona.aggressiveness {
                Goal::Attack
            } else if roll < 0.6 {
                Goal::Expand
            } else {
                Goal::IncreaseMarketShare
            }
        }
        MarketStance::Defensive => {
            if roll < 0.4 {
                Goal::Defend
            } else if roll < 0.7 {
                Goal::ReduceCost
            } else {
                Goal::IncreaseMarketShare
            }
        }
        MarketStance::Neutral => {
            if roll < 0.3 + 0.3 * persona.risk_tolerance {
                Goal::Expand
            } else if roll < 0.8 {
                Goal::IncreaseMarketShare
            } else {
                Goal::ReduceCost
            }
        }
    }
}

/// Cheapest affordable building in the plan's priority industry. Affordability
/// carries a risk margin: cautious personas keep a deeper cash buffer.
fn expand_action(
    entity: EntityId,
    plan: &StrategicPlan,
    persona: &Persona,
    ledger: &Ledger,
    defs: &[BuildingDef],
) -> Option<Action> {
    let cash = ledger.get(entity).ok()?.cash;
    let margin = 2.0 - persona.risk_tolerance;
    let mut candidates: Vec<&BuildingDef> = defs
        .iter()
        .filter(|d| d.category == plan.priority_industry)
        .collect();
    if candidates.is_empty() {
        candidates = defs.iter().collect();
    }
    candidates
        .into_iter()
        .filter(|d| (d.labor_cost as f64 * margin) <= cash as f64)
        .min_by_key(|d| d.labor_cost)
        .map(|d| Action::PurchaseBuilding { def: d.id })
}

/// Undercut a commodity the player produces; without stock, deny the player an
/// input instead.
#[allow(clippy::too_many_arguments)]
fn attack_action(
    entity: EntityId,
    ledger: &Ledger,
    buildings: &SlotMap<BuildingId, Building>,
    defs: &[BuildingDef],
    methods: &[Method],
    pricing: &PriceTracker,
    player: EntityId,
    war_active: bool,
) -> Option<Action> {
    let _ = defs;
    let player_outputs: Vec<CommodityId> = buildings
        .values()
        .filter(|b| b.owner == player)
        .flat_map(|b| methods[b.method as usize].outputs.iter().map(|&(c, _)| c))
        .collect();
    let agent = ledger.get(entity).ok()?;

    // prefer undercutting something we hold stock of
    for &c in &player_outputs {
        let free = agent.stock(c).available();
        if free >= 5 {
            let market = pricing.price(c);
            let price = if war_active {
                war_sell_price(market)
            } else {
                ((market as f64) * 0.93).round() as Price
            };
            return Some(Action::SubmitOrder {
                commodity: c,
                side: Side::Sell,
                qty: free / 2,
                unit_price: price.max(1),
            });
        }
    }
    // otherwise bid the player's inputs away
    let player_inputs: Vec<CommodityId> = buildings
        .values()
        .filter(|b| b.owner == player)
        .flat_map(|b| methods[b.method as usize].inputs.iter().map(|&(c, _)| c))
        .collect();
    player_inputs.first().map(|&c| Action::SubmitOrder {
        commodity: c,
        side: Side::Buy,
        qty: 10,
        unit_price: buy_price(pricing.price(c), 1.0),
    })
}

/// Prop up the price of our own primary output with a bid just above market.
fn defend_action(
    entity: EntityId,
    buildings: &SlotMap<BuildingId, Building>,
    defs: &[BuildingDef],
    methods: &[Method],
    pricing: &PriceTracker,
    persona: &Persona,
) -> Option<Action> {
    let _ = defs;
    let own_output = buildings
        .values()
        .filter(|b| b.owner == entity)
        .flat_map(|b| methods[b.method as usize].outputs.iter().map(|&(c, _)| c))
        .next()?;
    Some(Action::SubmitOrder {
        commodity: own_output,
        side: Side::Buy,
        qty: 5,
        unit_price: buy_price(pricing.price(own_output), persona.aggressiveness * 0.4),
    })
}

/// Switch a building to the method with the cheapest input bill at current
/// prices.
fn reduce_cost_action(
    entity: EntityId,
    buildings: &SlotMap<BuildingId, Building>,
    defs: &[BuildingDef],
    methods: &[Method],
    pricing: &PriceTracker,
) -> Option<Action> {
    let input_bill = |m: &Method| -> Money {
        m.inputs
            .iter()
            .map(|&(c, q)| q as Money * pricing.price(c))
            .sum()
    };
    for (id, b) in buildings {
        if b.owner != entity {
            continue;
        }
        let def = &defs[b.def as usize];
        let current = input_bill(&methods[b.method as usize]);
        if let Some(&cheaper) = def
            .methods
            .iter()
            .filter(|&&m| m != b.method)
            .min_by_key(|&&m| input_bill(&methods[m as usize]))
            .filter(|&&m| input_bill(&methods[m as usize]) < current)
        {
            return Some(Action::SwitchMethod {
                building: id,
                method: cheaper,
            });
        }
    }
    None
}

/// Purely operational: sell surplus output, or restock a missing input.
fn market_share_action(
    entity: EntityId,
    ledger: &Ledger,
    buildings: &SlotMap<BuildingId, Building>,
    defs: &[BuildingDef],
    methods: &[Method],
    pricing: &PriceTracker,
    persona: &Persona,
) -> Option<Action> {
    let _ = defs;
    let agent = ledger.get(entity).ok()?;

    // sell surplus above a small working buffer
    for (&c, stock) in &agent.stocks {
        let free = stock.available();
        if free > 20 {
            return Some(Action::SubmitOrder {
                commodity: c,
                side: Side::Sell,
                qty: free - 10,
                unit_price: sell_price(pricing.price(c), persona.aggressiveness).max(1),
            });
        }
    }
    // restock the first input our buildings are missing
    for b in buildings.values().filter(|b| b.owner == entity) {
        for &(c, amount) in &methods[b.method as usize].inputs {
            let need = amount * b.aggregation_factor;
            if agent.stock(c).available() < need {
                return Some(Action::SubmitOrder {
                    commodity: c,
                    side: Side::Buy,
                    qty: need.max(5),
                    unit_price: buy_price(pricing.price(c), persona.aggressiveness),
                });
            }
        }
    }
    None
}
