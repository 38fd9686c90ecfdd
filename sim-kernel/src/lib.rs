//! Deterministic industrial-economy simulation kernel
//!
//! This crate implements a tick-driven industrial economy: entities (the
//! player and autonomous competitors) own buildings that consume inputs and
//! emit outputs, trade through a continuous double-auction order book per
//! commodity, and discover prices from supply, demand and realized trades.
//!
//! ## Entities & the ledger
//!
//! An **Entity** holds cash (integer minor units) and per-commodity stocks
//! with two reservation buckets: goods earmarked for resting sell orders and
//! goods earmarked for pending production cycles. The [`ledger::Ledger`] is
//! the single authority over balances; every mutation is all-or-nothing and
//! every failure is a typed error.
//!
//! ## Markets
//!
//! Each commodity has its own order book with price-sorted sides, partial
//! fills, per-entity and per-book caps and throttled expiry. The matching
//! engine pairs crossed orders head-to-tail, settles against the ledger
//! (rolling back half-settled pairs), and appends to a run-long trade log.
//! Trades execute at the resting sell order's price.
//!
//! ## Production
//!
//! Buildings move through construction, material gathering and running
//! states. A running building executes its production method: inputs are
//! reserved, progress accumulates by efficiency × utilization, and each
//! completed cycle consumes inputs and emits outputs scaled by the
//! aggregation factor (one instance standing for that many plants).
//! Shortfalls become status transitions and throttled market buys, never
//! errors.
//!
//! ## Competitors
//!
//! Competitors carry personas (aggressiveness, risk tolerance, preferred
//! industries) and externally generated strategic plans. Decisions are
//! throttled and bounded per tick; each decision executes one action:
//! build, switch method, squeeze a rival, or place an operational order.
//! A bailout rule keeps the simulation solvent.
//!
//! ## Determinism
//!
//! The kernel is single-threaded and cooperative: one tick runs to
//! completion in a fixed phase order, all randomness flows from one seeded
//! generator, and external collaborators are polled only at tick
//! boundaries. Two runs with the same seed and command trace produce
//! identical update streams.
//!
//! ## Module Structure
//!
//! - `types`       Core ids, scalar aliases, commodity catalog
//! - `error`       Kernel error kinds
//! - `config`      All tunables plus world-content tables
//! - `ring`        Bounded ring buffer for time series
//! - `ledger`      Entities, stocks, cash; atomic operations
//! - `market`      Order books, matching engine, trades
//! - `pricing`     Supply/demand tracker and price discovery
//! - `demand`      Background consumer demand generator
//! - `production`  Building lifecycle and recipe execution
//! - `competitor`  Persona-driven competitor policy runtime
//! - `external`    Collaborator traits (plans, events, persistence)
//! - `command`     Inbound commands and the per-tick update record
//! - `scheduler`   Tick timing policy and speed control
//! - `diagnostics` Phase profiler and percentile reports
//! - `kernel`      The owning simulation kernel

pub mod command;
pub mod competitor;
pub mod config;
pub mod demand;
pub mod diagnostics;
pub mod error;
pub mod external;
#[cfg(feature = "instrument")]
pub use instrument;
pub mod kernel;
pub mod ledger;
pub mod market;
pub mod pricing;
pub mod production;
pub mod ring;
pub mod scheduler;
pub mod types;

// Re-export commonly used types at the crate root

// Core types
pub use types::{
    BuildingId, CommodityCategory, CommodityDef, CommodityId, EntityId, EntityKind, KeyToU64,
    Money, OrderId, Price, Quantity, Tick, TradeId, default_commodities,
};

// Errors
pub use error::{SimError, SimResult};

// Config
pub use config::{BuildingSpec, EntitySpec, SimConfig};

// Ledger
pub use ledger::{Entity, Ledger, Stock};

// Market
pub use market::{
    DepthLevel, DepthView, Markets, MatchingEngine, Order, OrderBook, OrderStatus, Side,
    TickVolume, Trade,
};

// Pricing
pub use pricing::{Candle, PriceChange, PriceTracker, SupplyDemand};

// Demand
pub use demand::ConsumerDemand;

// Production
pub use production::{
    Building, BuildingDef, BuildingDefId, BuildingDelta, BuildingStatus, Method, MethodId,
    Multipliers, ProductionEngine, ResearchEffects, ShortageReport, default_building_defs,
    default_methods,
};

// Competitors
pub use competitor::{
    CompetitorRuntime, Goal, InvestmentFocus, MarketStance, Persona, StrategicPlan,
};

// External collaborators
pub use external::{
    NarrativeEvent, NarrativeEventProvider, PersistenceSink, PlanRequest, PlanResponse,
    Providers, StrategicPlanProvider,
};

// Commands & updates
pub use command::{
    Command, CommandOutcome, FinancialSummary, MarketChange, PriceSnapshot, RejectReason,
    TickUpdate,
};

// Scheduler
pub use scheduler::{Speed, TickTimer};

// Diagnostics
pub use diagnostics::{DiagnosticsReport, Phase, TickProfiler};

// Kernel
pub use kernel::{SimulationKernel, run_blocking};

// Ring buffer
pub use ring::RingBuffer;
