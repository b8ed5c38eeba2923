use checkout::{OrderLine, OrderWorkflow, PlaceOrder};
use common::Money;
use criterion::{Criterion, criterion_group, criterion_main};
use ledger::{InMemoryLedger, ProductRepository, UserRepository};
use lock::InMemoryLockClient;

fn bench_place_order_single_line(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("checkout/place_order_single_line", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryLedger::new();
                let user = store.insert_user(Money::from_cents(10_000)).await.unwrap();
                let product = store
                    .insert_product("Widget", Money::from_cents(500), 100)
                    .await
                    .unwrap();
                let workflow = OrderWorkflow::new(InMemoryLockClient::new(), store);
                workflow
                    .place_order(PlaceOrder {
                        user_id: user.id,
                        lines: vec![OrderLine::new(product.id, 1)],
                        coupon_id: None,
                    })
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_place_order_five_lines(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("checkout/place_order_five_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryLedger::new();
                let user = store.insert_user(Money::from_cents(100_000)).await.unwrap();
                let mut lines = Vec::new();
                for _ in 0..5 {
                    let product = store
                        .insert_product("Widget", Money::from_cents(500), 100)
                        .await
                        .unwrap();
                    lines.push(OrderLine::new(product.id, 2));
                }
                let workflow = OrderWorkflow::new(InMemoryLockClient::new(), store);
                workflow
                    .place_order(PlaceOrder {
                        user_id: user.id,
                        lines,
                        coupon_id: None,
                    })
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_place_order_single_line,
    bench_place_order_five_lines
);
criterion_main!(benches);
