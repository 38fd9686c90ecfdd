//! End-to-end scenarios over the assembled kernel, with literal expected
//! values: crossed matches, price clamps, self-trade prevention, production
//! cycles, order caps and reset idempotence.

use sim_kernel::{
    BuildingSpec, Command, CommandOutcome, CommodityDef, EntityKind, EntitySpec, Method,
    OrderStatus, PriceSnapshot, Providers, Side, SimConfig, SimulationKernel,
    production::BuildingDef,
};

// === TEST FIXTURES ===

const X: u16 = 0;

/// One near-inert commodity so scenario outcomes are not disturbed by
/// background demand.
fn one_commodity(base_price: i64) -> Vec<CommodityDef> {
    vec![CommodityDef::new(X, "X", base_price).with_consumer_rate(0.001)]
}

fn kernel_with(cfg: SimConfig) -> SimulationKernel {
    SimulationKernel::new(cfg, Providers::default()).unwrap()
}

fn entity_by_name(kernel: &SimulationKernel, name: &str) -> sim_kernel::EntityId {
    kernel
        .ledger()
        .iter()
        .find(|(_, e)| e.name == name)
        .map(|(id, _)| id)
        .unwrap()
}

// === S1: SIMPLE CROSSED MATCH ===

#[test]
fn s1_crossed_match_settles_at_sell_price() {
    let mut cfg = SimConfig::with_entities(vec![
        EntitySpec::new("A", EntityKind::Player, 10_000),
        EntitySpec::new("B", EntityKind::Competitor, 0).with_stock(X, 10, 100),
    ]);
    cfg.commodities = one_commodity(100);
    let mut kernel = kernel_with(cfg);
    let a = entity_by_name(&kernel, "A");
    let b = entity_by_name(&kernel, "B");

    kernel.push_command(Command::SubmitOrder {
        entity: a,
        commodity: X,
        side: Side::Buy,
        qty: 5,
        unit_price: 200,
        validity_ticks: 0,
    });
    kernel.push_command(Command::SubmitOrder {
        entity: b,
        commodity: X,
        side: Side::Sell,
        qty: 5,
        unit_price: 150,
        validity_ticks: 0,
    });

    let update = kernel.step(200).unwrap();

    // exactly one trade at the sell order's price
    assert_eq!(update.trades.len(), 1);
    let trade = &update.trades[0];
    assert_eq!(trade.quantity, 5);
    assert_eq!(trade.unit_price, 150);
    assert_eq!(trade.buyer, a);
    assert_eq!(trade.seller, b);
    assert_eq!(trade.total, 750);

    // ledger: buyer paid 750 for 5 units, seller's reservation consumed
    assert_eq!(kernel.ledger().cash(a).unwrap(), 9_250);
    assert_eq!(kernel.ledger().get(a).unwrap().stock(X).quantity, 5);
    assert_eq!(kernel.ledger().cash(b).unwrap(), 750);
    let b_stock = kernel.ledger().get(b).unwrap().stock(X);
    assert_eq!(b_stock.quantity, 5);
    assert_eq!(b_stock.reserved_for_sale, 0);

    // both orders filled and removed from the book
    assert_eq!(kernel.markets().book(X).unwrap().active_total(), 0);
    assert_eq!(
        kernel.markets().get_order(trade.buy_order).unwrap().status,
        OrderStatus::Filled
    );
    assert_eq!(
        kernel.markets().get_order(trade.sell_order).unwrap().status,
        OrderStatus::Filled
    );

    // the player bought: volume attributed to the buy side
    let (_, volume) = update.volumes[0];
    assert_eq!(volume.total, 5);
    assert_eq!(volume.buy, 5);
    assert_eq!(volume.sell, 0);
}

// === S2: PRICE CEILING ===

#[test]
fn s2_sustained_demand_pins_price_at_the_ceiling() {
    let mut cfg = SimConfig::with_entities(vec![EntitySpec::new(
        "Solo",
        EntityKind::Player,
        1_000_000,
    )]);
    // massive background demand against the floor supply of 100
    cfg.commodities = vec![CommodityDef::new(X, "Y", 1_000).with_consumer_rate(1_000_000.0)];
    let mut kernel = kernel_with(cfg);

    for tick in 1..=500u64 {
        kernel.step(tick * 200).unwrap();
    }
    assert_eq!(kernel.pricing().price(X), 5_000);

    // the clamp holds under continued pressure
    for tick in 501..=520u64 {
        kernel.step(tick * 200).unwrap();
        assert_eq!(kernel.pricing().price(X), 5_000);
    }
}

// === S3: SELF-TRADE PREVENTION ===

#[test]
fn s3_no_self_trade_and_both_orders_rest() {
    let mut cfg = SimConfig::with_entities(vec![
        EntitySpec::new("C", EntityKind::Player, 10_000).with_stock(X, 10, 100),
    ]);
    cfg.commodities = one_commodity(250);
    let mut kernel = kernel_with(cfg);
    let c = kernel.player();

    kernel.push_command(Command::SubmitOrder {
        entity: c,
        commodity: X,
        side: Side::Buy,
        qty: 10,
        unit_price: 300,
        validity_ticks: 50,
    });
    kernel.push_command(Command::SubmitOrder {
        entity: c,
        commodity: X,
        side: Side::Sell,
        qty: 10,
        unit_price: 200,
        validity_ticks: 50,
    });

    let update = kernel.step(200).unwrap();
    assert!(update.trades.is_empty());

    // book is crossed but both orders still rest
    let book = kernel.markets().book(X).unwrap();
    assert_eq!(book.active_total(), 2);
    assert_eq!(book.best_bid(), Some(300));
    assert_eq!(book.best_ask(), Some(200));

    // a few more ticks change nothing
    for tick in 2..=5u64 {
        let update = kernel.step(tick * 200).unwrap();
        assert!(update.trades.is_empty());
    }
    assert_eq!(kernel.markets().book(X).unwrap().active_total(), 2);
}

// === S4: PRODUCTION CYCLE ===

#[test]
fn s4_three_tick_cycle_with_aggregation_two() {
    const ORE: u16 = 0;
    const STEEL: u16 = 1;

    let mut cfg = SimConfig::with_entities(vec![
        EntitySpec::new("Owner", EntityKind::Player, 100_000_000)
            .with_stock(ORE, 100, 100)
            .with_building(BuildingSpec::new(0).with_aggregation(2)),
    ]);
    cfg.commodities = vec![
        CommodityDef::new(ORE, "Iron Ore", 100).with_consumer_rate(0.001),
        CommodityDef::new(STEEL, "Steel", 500).with_consumer_rate(0.001),
    ];
    cfg.methods = vec![
        Method::new(0, "Smelt")
            .with_input(ORE, 1)
            .with_output(STEEL, 1)
            .with_ticks(3),
    ];
    cfg.building_defs = vec![
        BuildingDef::new(0, "Mill", 1_000_000)
            .with_maintenance(30_000)
            .with_method(0),
    ];
    let mut kernel = kernel_with(cfg);
    let owner = kernel.player();

    for tick in 1..=3u64 {
        kernel.step(tick * 200).unwrap();
    }

    // one cycle: 2 ore consumed, 2 steel emitted
    let ore = kernel.ledger().get(owner).unwrap().stock(ORE);
    let steel = kernel.ledger().get(owner).unwrap().stock(STEEL);
    assert_eq!(ore.quantity, 98);
    assert_eq!(ore.reserved_for_production, 0);
    assert_eq!(steel.quantity, 2);
    // output cost basis = input cost / output quantity = 100
    assert_eq!(steel.avg_cost, 100.0);

    // tracker recorded +2 steel supply and +2 ore demand
    assert_eq!(kernel.pricing().state(STEEL).supply, 102.0);
    let ore_demand = kernel.pricing().state(ORE).demand;
    assert!(
        (ore_demand - 102.0).abs() < 0.1,
        "ore demand {ore_demand} not within noise of 102"
    );
}

// === S5: ORDER CAP ENFORCEMENT ===

#[test]
fn s5_fourth_order_cancels_the_oldest() {
    let mut cfg = SimConfig::with_entities(vec![
        EntitySpec::new("C", EntityKind::Player, 10_000_000),
    ]);
    cfg.commodities = one_commodity(100);
    let mut kernel = kernel_with(cfg);
    let c = kernel.player();

    let mut order_ids = Vec::new();
    for (tick, price) in [(1u64, 100i64), (2, 110), (3, 120), (4, 130)] {
        kernel.push_command(Command::SubmitOrder {
            entity: c,
            commodity: X,
            side: Side::Buy,
            qty: 1,
            unit_price: price,
            validity_ticks: 100,
        });
        kernel.step(tick * 200).unwrap();
        match kernel.drain_responses().pop().unwrap() {
            CommandOutcome::OrderAccepted { order_id } => order_ids.push(order_id),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    // active count stays at the cap of 3, the oldest was cancelled
    let book = kernel.markets().book(X).unwrap();
    assert_eq!(book.count_active_for(c), 3);
    assert_eq!(
        kernel.markets().get_order(order_ids[0]).unwrap().status,
        OrderStatus::Cancelled
    );
    for &id in &order_ids[1..] {
        assert!(book.contains(id), "order {id} should still rest");
    }
}

// === S6: RESET IDEMPOTENCE ===

fn observable_state(kernel: &SimulationKernel) -> String {
    let entities: Vec<_> = kernel
        .ledger()
        .iter()
        .map(|(_, e)| (e.name.clone(), e.kind, e.cash, e.stocks.clone()))
        .collect();
    let prices = kernel.pricing().prices().to_vec();
    let history: Vec<_> = (0..kernel.markets().commodity_count())
        .map(|c| kernel.pricing().history(c as u16).to_vec())
        .collect();
    let books: Vec<_> = kernel
        .markets()
        .books()
        .map(|b| (b.commodity(), b.active_total()))
        .collect();
    serde_json::to_string(&(
        kernel.tick(),
        entities,
        prices,
        history,
        books,
        kernel.markets().next_order_id(),
    ))
    .unwrap()
}

#[test]
fn s6_reset_restores_the_initial_state() {
    let mut cfg = SimConfig::default();
    cfg.rng_seed = 42;
    let mut kernel = kernel_with(cfg.clone());
    let player = kernel.player();

    // run a while with some commands mixed in
    kernel.push_command(Command::SubmitOrder {
        entity: player,
        commodity: 4,
        side: Side::Buy,
        qty: 10,
        unit_price: 9_000,
        validity_ticks: 0,
    });
    for tick in 1..=30u64 {
        kernel.step(tick * 200).unwrap();
    }
    kernel.push_command(Command::Reset);
    let reset_update = kernel.step(31 * 200).unwrap();
    assert_eq!(reset_update.tick, 0);
    assert!(matches!(reset_update.prices, PriceSnapshot::Full(_)));

    // identical to a freshly constructed kernel
    let fresh = kernel_with(cfg);
    assert_eq!(observable_state(&kernel), observable_state(&fresh));
    assert_eq!(kernel.tick(), 0);

    // every price history is back to the single seed candle at base price
    for (idx, def) in kernel.config().commodities.iter().enumerate() {
        let history = kernel.pricing().history(idx as u16);
        assert_eq!(history.len(), 1);
        assert_eq!(history.first().unwrap().close, def.base_price);
        assert_eq!(history.first().unwrap().tick, 0);
    }

    // and the two kernels keep producing identical updates
    let mut fresh = fresh;
    for tick in 1..=10u64 {
        let a = kernel.step(tick * 200).unwrap();
        let b = fresh.step(tick * 200).unwrap();
        assert_eq!(a, b, "divergence at tick {tick}");
    }
}
