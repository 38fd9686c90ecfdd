//! Same seed + same command trace ⇒ identical tick-update streams.

use sim_kernel::{
    Command, Providers, Side, SimConfig, SimulationKernel, Speed, TickUpdate,
};

fn kernel(seed: u64) -> SimulationKernel {
    let mut cfg = SimConfig::default();
    cfg.rng_seed = seed;
    SimulationKernel::new(cfg, Providers::default()).unwrap()
}

/// The shared command trace: orders, a cancel, speed changes, a purchase.
fn drive(kernel: &mut SimulationKernel, ticks: u64) -> Vec<TickUpdate> {
    let player = kernel.player();
    let mut updates = Vec::new();
    let mut submitted_order = None;

    for tick in 1..=ticks {
        match tick {
            3 => kernel.push_command(Command::SubmitOrder {
                entity: player,
                commodity: 4,
                side: Side::Buy,
                qty: 20,
                unit_price: 8_500,
                validity_ticks: 40,
            }),
            5 => kernel.push_command(Command::SetSpeed(Speed::X2)),
            8 => kernel.push_command(Command::SubmitOrder {
                entity: player,
                commodity: 4,
                side: Side::Sell,
                qty: 10,
                unit_price: 8_200,
                validity_ticks: 40,
            }),
            12 => {
                if let Some(order_id) = submitted_order {
                    kernel.push_command(Command::CancelOrder {
                        entity: player,
                        order_id,
                    });
                }
            }
            20 => kernel.push_command(Command::PurchaseBuilding {
                entity: player,
                definition: 0,
            }),
            _ => {}
        }
        updates.push(kernel.step(tick * 200).unwrap());
        for outcome in kernel.drain_responses() {
            if let sim_kernel::CommandOutcome::OrderAccepted { order_id } = outcome
                && submitted_order.is_none()
            {
                submitted_order = Some(order_id);
            }
        }
    }
    updates
}

#[test]
fn identical_seeds_produce_identical_update_streams() {
    let mut a = kernel(1234);
    let mut b = kernel(1234);

    let stream_a = drive(&mut a, 80);
    let stream_b = drive(&mut b, 80);

    assert_eq!(stream_a.len(), stream_b.len());
    for (tick, (ua, ub)) in stream_a.iter().zip(&stream_b).enumerate() {
        assert_eq!(ua, ub, "streams diverged at tick {}", tick + 1);
    }
}

#[test]
fn different_seeds_diverge() {
    let mut a = kernel(1);
    let mut b = kernel(2);

    // compare raw price vectors; the multiplicative noise makes identical
    // 20-tick sequences across different seeds effectively impossible
    let mut diverged = false;
    for tick in 1..=20u64 {
        a.step(tick * 200).unwrap();
        b.step(tick * 200).unwrap();
        if a.pricing().prices() != b.pricing().prices() {
            diverged = true;
            break;
        }
    }
    assert!(diverged, "two different seeds tracked identical prices");
}

#[test]
fn trade_and_order_ids_are_monotone_within_a_run() {
    let mut kernel = kernel(9);
    let mut last_order_count = 0;
    for tick in 1..=60u64 {
        kernel.step(tick * 200).unwrap();
        let next = kernel.markets().next_order_id();
        assert!(next >= last_order_count, "order id counter went backwards");
        last_order_count = next;
    }
    let mut last = 0;
    for trade in kernel.trades() {
        assert!(trade.id > last);
        last = trade.id;
    }
}
