// Boundary to external collaborators: strategy generation, narrative events,
// persistence. The kernel fires requests and polls results at tick boundaries
// only; nothing here runs mid-tick.

use serde::{Deserialize, Serialize};

use crate::command::TickUpdate;
use crate::competitor::StrategicPlan;
use crate::types::{CommodityCategory, CommodityId, EntityId, Money, Price, Tick};

// === STRATEGIC PLANS ===

/// Snapshot handed to the plan provider when a competitor wants a refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    pub entity: EntityId,
    pub tick: Tick,
    pub cash: Money,
    pub building_count: usize,
    pub industries: Vec<CommodityCategory>,
    pub player_industries: Vec<CommodityCategory>,
    /// Current market price slice.
    pub prices: Vec<(CommodityId, Price)>,
    /// Hostility toward the player, 0..1.
    pub rivalry: f64,
}

#[derive(Debug, Clone)]
pub struct PlanResponse {
    pub entity: EntityId,
    pub plan: StrategicPlan,
}

/// Fire-and-forget strategy generation. Responses surface via `poll` at a
/// later tick boundary; a provider that fails simply never answers and the
/// competitor keeps its existing plan.
pub trait StrategicPlanProvider {
    fn request_plan(&mut self, request: PlanRequest);
    fn poll(&mut self) -> Vec<PlanResponse>;
    /// Drop any in-flight requests (required on kernel reset).
    fn cancel_pending(&mut self) {}
}

// === NARRATIVE EVENTS ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSeverity {
    Minor,
    Moderate,
    Major,
}

/// Flavor event with mechanical price/supply consequences. The kernel
/// schedules each at `tick + random offset in [10, 210]` and applies the
/// deltas at the scheduled tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeEvent {
    pub kind: String,
    pub severity: EventSeverity,
    pub title: String,
    pub description: String,
    /// Fractional price deltas per commodity (0.1 = +10%).
    pub price_changes: Vec<(CommodityId, f64)>,
    /// Fractional supply deltas per commodity.
    pub supply_changes: Vec<(CommodityId, f64)>,
}

pub trait NarrativeEventProvider {
    fn poll(&mut self) -> Vec<NarrativeEvent>;
}

// === PERSISTENCE ===

/// Records per-tick updates. Not required for determinism within a run.
pub trait PersistenceSink {
    fn record(&mut self, update: &TickUpdate);
}

// === NULL IMPLEMENTATIONS ===

/// Provider that never answers; competitors run on persona fallback plans.
#[derive(Debug, Default)]
pub struct NullPlanProvider;

impl StrategicPlanProvider for NullPlanProvider {
    fn request_plan(&mut self, _request: PlanRequest) {}

    fn poll(&mut self) -> Vec<PlanResponse> {
        Vec::new()
    }
}

#[derive(Debug, Default)]
pub struct NullEventProvider;

impl NarrativeEventProvider for NullEventProvider {
    fn poll(&mut self) -> Vec<NarrativeEvent> {
        Vec::new()
    }
}

#[derive(Debug, Default)]
pub struct NullPersistence;

impl PersistenceSink for NullPersistence {
    fn record(&mut self, _update: &TickUpdate) {}
}

/// Bundle of collaborator handles injected into the kernel at construction.
pub struct Providers {
    pub plans: Box<dyn StrategicPlanProvider>,
    pub events: Box<dyn NarrativeEventProvider>,
    pub persistence: Box<dyn PersistenceSink>,
}

impl Default for Providers {
    fn default() -> Self {
        Self {
            plans: Box::new(NullPlanProvider),
            events: Box::new(NullEventProvider),
            persistence: Box::new(NullPersistence),
        }
    }
}
