use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use resinstock_core::{Actor, LocationCode, ProductId, UserId};
use resinstock_events::{EventEnvelope, InMemoryEventBus, ProjectionRunner};
use resinstock_infra::projections::ProductionLossProjection;
use resinstock_infra::{
    InMemoryCatalog, InMemoryLedgerStore, LedgerConfig, LedgerContext, MovementEnvelope,
    StockLedger, TransferWorkflow,
};
use resinstock_inventory::{
    BalanceKey, Location, Movement, MovementReference, MovementType, Product, ProductionUsage,
    StockLevel, StockUnit, TransferLine,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

type Ctx = LedgerContext<
    Arc<InMemoryLedgerStore>,
    Arc<InMemoryCatalog>,
    Arc<InMemoryEventBus<MovementEnvelope>>,
>;

fn setup(products: usize) -> (Ctx, Vec<Product>, Actor) {
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.insert_location(Location::new("CD", "Central warehouse")).unwrap();
    catalog.insert_location(Location::new("PCP", "Production planning")).unwrap();
    let products: Vec<Product> = (0..products)
        .map(|i| Product::sealed_bag(ProductId::new(), format!("Resin {i}"), dec!(25)))
        .collect();
    for p in &products {
        catalog.insert_product(p.clone()).unwrap();
    }
    let ctx = LedgerContext::new(
        Arc::new(InMemoryLedgerStore::new()),
        catalog,
        Arc::new(InMemoryEventBus::new()),
        LedgerConfig::default(),
    );
    (ctx, products, Actor::new(UserId::new(), "bench"))
}

fn bench_receive_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("receive_latency");
    group.sample_size(1000);

    group.bench_function("receive_bags", |b| {
        let (ctx, products, actor) = setup(1);
        let ledger = StockLedger::new(ctx);
        let location = LocationCode::from("CD");
        b.iter(|| {
            ledger
                .receive(&products[0].id, &location, black_box(dec!(4)), StockUnit::Bag, None, &actor)
                .unwrap();
        });
    });

    group.finish();
}

fn bench_transfer_confirmation(c: &mut Criterion) {
    let mut group = c.benchmark_group("transfer_confirmation");

    for lines in [1usize, 10, 50].iter() {
        group.throughput(Throughput::Elements(*lines as u64));
        group.bench_with_input(BenchmarkId::new("create_and_confirm", lines), lines, |b, &lines| {
            let (ctx, products, actor) = setup(lines);
            let ledger = StockLedger::new(ctx.clone());
            let transfers = TransferWorkflow::new(ctx);
            let (cd, pcp) = (LocationCode::from("CD"), LocationCode::from("PCP"));
            for p in &products {
                ledger
                    .receive(&p.id, &cd, dec!(1_000_000_000_000), StockUnit::Kg, None, &actor)
                    .unwrap();
            }
            let request: Vec<TransferLine> = products
                .iter()
                .map(|p| TransferLine::new(p.id, dec!(2), StockUnit::Bag))
                .collect();

            b.iter(|| {
                let t = transfers.create(&cd, &pcp, black_box(&request), &actor).unwrap();
                black_box(transfers.confirm(&t.id, &[], &actor).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_loss_projection_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("loss_projection_rebuild");

    for count in [100u64, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*count));
        group.bench_with_input(BenchmarkId::new("rebuild_from_movements", count), count, |b, &count| {
            let actor = Actor::new(UserId::new(), "bench");
            let product = Product::sealed_bag(ProductId::new(), "Resin", dec!(25));
            let key = BalanceKey::new(product.id, "PCP");
            let sent = StockLevel::from_quantity(dec!(10), StockUnit::Bag, &product);

            let envelopes: Vec<EventEnvelope<Movement>> = (1..=count)
                .map(|seq| {
                    let movement = Movement::outbound(
                        MovementType::ProductionOut,
                        &key,
                        &sent,
                        MovementReference::production_order(resinstock_core::ProductionOrderId::new()),
                        &actor,
                        chrono::Utc::now(),
                    )
                    .with_production_usage(ProductionUsage {
                        ideal_kg: dec!(237),
                        sent_kg: sent.total_kg,
                    });
                    EventEnvelope::for_event(uuid::Uuid::now_v7(), seq, movement)
                })
                .collect();

            b.iter(|| {
                let runner =
                    ProjectionRunner::rebuild_from_scratch(ProductionLossProjection::new, black_box(&envelopes))
                        .unwrap();
                let total: Decimal = runner.into_projection().total_loss_kg();
                black_box(total);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_receive_latency,
    bench_transfer_confirmation,
    bench_loss_projection_rebuild
);
criterion_main!(benches);
