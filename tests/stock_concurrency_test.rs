mod common;

use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use storefront_api::{entities::Product, services::orders::OrderLineInput};

/// Twenty concurrent single-unit orders race on a product with ten units
/// in stock. The guarded decrement must let exactly ten through and leave
/// the stock at zero — never negative — regardless of interleaving.
#[tokio::test]
async fn concurrent_orders_never_oversell() {
    let app = TestApp::new().await;
    let user = app.register_user("alice").await;
    let category = app.seed_category("books").await;
    let product = app.seed_product(category, "paperback", dec!(10.00), 10).await;

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let orders = app.state.services.orders.clone();
        let user = user.clone();
        let product_id = product.id;
        tasks.push(tokio::spawn(async move {
            orders
                .place_order(
                    &user,
                    vec![OrderLineInput {
                        product_id,
                        quantity: 1,
                    }],
                )
                .await
                .is_ok()
        }));
    }

    let mut successes = 0;
    for task in tasks {
        if task.await.unwrap_or(false) {
            successes += 1;
        }
    }

    assert_eq!(
        successes, 10,
        "exactly 10 single-unit orders should succeed; got {}",
        successes
    );

    let remaining = Product::find_by_id(product.id)
        .one(&*app.state.db)
        .await
        .expect("query product")
        .expect("product exists")
        .stock_quantity;
    assert_eq!(remaining, 0, "stock must land at exactly zero");
    assert!(remaining >= 0, "stock must never go negative");

    let placed = app
        .state
        .services
        .orders
        .get_orders_for_user(&user)
        .await
        .expect("list orders");
    assert_eq!(placed.len(), 10);
}

/// Two buyers race on the last units with multi-line orders; whichever
/// loses must leave no partial effects behind.
#[tokio::test]
async fn racing_multi_line_orders_stay_atomic() {
    let app = TestApp::new().await;
    let alice = app.register_user("alice").await;
    let bob = app.register_user("bob").await;
    let category = app.seed_category("books").await;
    let common_product = app.seed_product(category, "contested", dec!(5.00), 1).await;
    let filler = app.seed_product(category, "filler", dec!(2.00), 100).await;

    let orders_a = app.state.services.orders.clone();
    let orders_b = app.state.services.orders.clone();
    let lines_a = vec![
        OrderLineInput {
            product_id: filler.id,
            quantity: 10,
        },
        OrderLineInput {
            product_id: common_product.id,
            quantity: 1,
        },
    ];
    let lines_b = lines_a.clone();
    let alice2 = alice.clone();
    let bob2 = bob.clone();

    let (a, b) = tokio::join!(
        tokio::spawn(async move { orders_a.place_order(&alice2, lines_a).await.is_ok() }),
        tokio::spawn(async move { orders_b.place_order(&bob2, lines_b).await.is_ok() }),
    );
    let a = a.unwrap_or(false);
    let b = b.unwrap_or(false);

    assert!(
        a ^ b,
        "exactly one of the two racing orders must win (alice: {}, bob: {})",
        a,
        b
    );

    // The loser's filler decrement must have rolled back with the order.
    let filler_stock = Product::find_by_id(filler.id)
        .one(&*app.state.db)
        .await
        .expect("query filler")
        .expect("filler exists")
        .stock_quantity;
    assert_eq!(filler_stock, 90);

    let contested_stock = Product::find_by_id(common_product.id)
        .one(&*app.state.db)
        .await
        .expect("query contested")
        .expect("contested exists")
        .stock_quantity;
    assert_eq!(contested_stock, 0);
}
