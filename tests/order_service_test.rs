mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use storefront_api::{
    entities::{product, OrderStatus, Product},
    errors::ServiceError,
    services::{carts::AddItemInput, orders::OrderLineInput},
};
use uuid::Uuid;

async fn stock_of(app: &TestApp, product_id: Uuid) -> i32 {
    Product::find_by_id(product_id)
        .one(&*app.state.db)
        .await
        .expect("query product")
        .expect("product exists")
        .stock_quantity
}

#[tokio::test]
async fn placing_an_order_commits_stock_and_freezes_the_total() {
    let app = TestApp::new().await;
    let user = app.register_user("alice").await;
    let category = app.seed_category("books").await;
    let product = app.seed_product(category, "paperback", dec!(12.00), 5).await;
    let orders = &app.state.services.orders;

    let view = orders
        .place_order(
            &user,
            vec![OrderLineInput {
                product_id: product.id,
                quantity: 3,
            }],
        )
        .await
        .expect("place order");

    assert_eq!(view.status, OrderStatus::Pending);
    assert_eq!(view.total_amount, dec!(36.00));
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 3);
    assert_eq!(view.items[0].price_at_purchase, dec!(12.00));
    assert_eq!(view.items[0].subtotal, dec!(36.00));
    assert_eq!(view.username, "alice");
    assert_eq!(stock_of(&app, product.id).await, 2);

    // A second order for 3 units must fail and leave stock untouched.
    let err = orders
        .place_order(
            &user,
            vec![OrderLineInput {
                product_id: product.id,
                quantity: 3,
            }],
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));
    assert_eq!(stock_of(&app, product.id).await, 2);
}

#[tokio::test]
async fn order_rejects_empty_and_non_positive_lines() {
    let app = TestApp::new().await;
    let user = app.register_user("alice").await;
    let orders = &app.state.services.orders;

    let err = orders.place_order(&user, vec![]).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidInput(_));

    let category = app.seed_category("books").await;
    let product = app.seed_product(category, "paperback", dec!(12.00), 5).await;

    for quantity in [0, -2] {
        let err = orders
            .place_order(
                &user,
                vec![OrderLineInput {
                    product_id: product.id,
                    quantity,
                }],
            )
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidInput(_));
    }
    assert_eq!(stock_of(&app, product.id).await, 5);
}

#[tokio::test]
async fn order_rejects_unknown_products() {
    let app = TestApp::new().await;
    let user = app.register_user("alice").await;
    let orders = &app.state.services.orders;

    let err = orders
        .place_order(
            &user,
            vec![OrderLineInput {
                product_id: Uuid::new_v4(),
                quantity: 1,
            }],
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn failing_line_rolls_back_every_earlier_decrement() {
    let app = TestApp::new().await;
    let user = app.register_user("alice").await;
    let category = app.seed_category("books").await;
    let plentiful = app.seed_product(category, "plentiful", dec!(5.00), 5).await;
    let scarce = app.seed_product(category, "scarce", dec!(7.00), 1).await;
    let orders = &app.state.services.orders;

    let err = orders
        .place_order(
            &user,
            vec![
                OrderLineInput {
                    product_id: plentiful.id,
                    quantity: 2,
                },
                OrderLineInput {
                    product_id: scarce.id,
                    quantity: 3,
                },
            ],
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    // The first line's decrement must have been rolled back, and no order
    // row may exist.
    assert_eq!(stock_of(&app, plentiful.id).await, 5);
    assert_eq!(stock_of(&app, scarce.id).await, 1);
    let views = orders.get_orders_for_user(&user).await.expect("list");
    assert!(views.is_empty(), "partial orders must never exist");
}

#[tokio::test]
async fn price_snapshot_survives_later_price_changes() {
    let app = TestApp::new().await;
    let user = app.register_user("alice").await;
    let category = app.seed_category("books").await;
    let seeded = app.seed_product(category, "paperback", dec!(10.00), 10).await;
    let orders = &app.state.services.orders;
    let carts = &app.state.services.carts;

    let placed = orders
        .place_order(
            &user,
            vec![OrderLineInput {
                product_id: seeded.id,
                quantity: 2,
            }],
        )
        .await
        .expect("place order");

    // Keep one unit in the cart to contrast live vs frozen pricing.
    carts
        .add_item(
            &user,
            AddItemInput {
                product_id: seeded.id,
                quantity: 1,
            },
        )
        .await
        .expect("add to cart");

    let mut update: product::ActiveModel = Product::find_by_id(seeded.id)
        .one(&*app.state.db)
        .await
        .expect("query")
        .expect("exists")
        .into();
    update.price = Set(dec!(99.99));
    update.update(&*app.state.db).await.expect("price change");

    let reread = orders
        .get_order_for_user(&user, placed.id)
        .await
        .expect("reread order");
    assert_eq!(reread.items[0].price_at_purchase, dec!(10.00));
    assert_eq!(reread.total_amount, dec!(20.00));

    let cart = carts.view_cart(&user).await.expect("view cart");
    assert_eq!(cart.items[0].unit_price, dec!(99.99));
}

#[tokio::test]
async fn orders_are_owner_isolated() {
    let app = TestApp::new().await;
    let alice = app.register_user("alice").await;
    let mallory = app.register_user("mallory").await;
    let category = app.seed_category("books").await;
    let product = app.seed_product(category, "paperback", dec!(10.00), 10).await;
    let orders = &app.state.services.orders;

    let placed = orders
        .place_order(
            &alice,
            vec![OrderLineInput {
                product_id: product.id,
                quantity: 1,
            }],
        )
        .await
        .expect("place order");

    let err = orders
        .get_order_for_user(&mallory, placed.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let err = orders
        .get_order_for_user(&alice, Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    assert!(orders
        .get_orders_for_user(&mallory)
        .await
        .expect("list")
        .is_empty());
}

#[tokio::test]
async fn user_orders_come_back_newest_first() {
    let app = TestApp::new().await;
    let user = app.register_user("alice").await;
    let category = app.seed_category("books").await;
    let product = app.seed_product(category, "paperback", dec!(10.00), 10).await;
    let orders = &app.state.services.orders;

    let first = orders
        .place_order(
            &user,
            vec![OrderLineInput {
                product_id: product.id,
                quantity: 1,
            }],
        )
        .await
        .expect("first order");
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    let second = orders
        .place_order(
            &user,
            vec![OrderLineInput {
                product_id: product.id,
                quantity: 2,
            }],
        )
        .await
        .expect("second order");

    let views = orders.get_orders_for_user(&user).await.expect("list");
    assert_eq!(views.len(), 2);
    assert_eq!(views[0].id, second.id);
    assert_eq!(views[1].id, first.id);
}

#[tokio::test]
async fn admin_status_updates_parse_labels_and_log_transitions() {
    let app = TestApp::new().await;
    let user = app.register_user("alice").await;
    let category = app.seed_category("books").await;
    let product = app.seed_product(category, "paperback", dec!(10.00), 10).await;
    let orders = &app.state.services.orders;

    let placed = orders
        .place_order(
            &user,
            vec![OrderLineInput {
                product_id: product.id,
                quantity: 1,
            }],
        )
        .await
        .expect("place order");

    let shipped = orders
        .update_status(placed.id, "SHIPPED")
        .await
        .expect("ship");
    assert_eq!(shipped.status, OrderStatus::Shipped);

    // Transitions are unrestricted by design: even going backwards works.
    let pending_again = orders
        .update_status(placed.id, "PENDING")
        .await
        .expect("back to pending");
    assert_eq!(pending_again.status, OrderStatus::Pending);

    let err = orders
        .update_status(placed.id, "RETURNED")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidInput(_));

    let err = orders
        .update_status(Uuid::new_v4(), "SHIPPED")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn cancelling_is_a_status_change_not_a_deletion() {
    let app = TestApp::new().await;
    let user = app.register_user("alice").await;
    let category = app.seed_category("books").await;
    let product = app.seed_product(category, "paperback", dec!(10.00), 10).await;
    let orders = &app.state.services.orders;

    let placed = orders
        .place_order(
            &user,
            vec![OrderLineInput {
                product_id: product.id,
                quantity: 1,
            }],
        )
        .await
        .expect("place order");

    let cancelled = orders
        .update_status(placed.id, "CANCELLED")
        .await
        .expect("cancel");
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    // The order is still there, and its snapshot is intact.
    let reread = orders
        .get_order_for_user(&user, placed.id)
        .await
        .expect("reread");
    assert_eq!(reread.total_amount, placed.total_amount);
}

#[tokio::test]
async fn order_from_cart_consumes_the_cart_atomically() {
    let app = TestApp::new().await;
    let user = app.register_user("alice").await;
    let category = app.seed_category("books").await;
    let paperback = app.seed_product(category, "paperback", dec!(10.00), 10).await;
    let hardcover = app.seed_product(category, "hardcover", dec!(25.00), 4).await;
    let orders = &app.state.services.orders;
    let carts = &app.state.services.carts;

    carts
        .add_item(
            &user,
            AddItemInput {
                product_id: paperback.id,
                quantity: 2,
            },
        )
        .await
        .expect("add paperback");
    carts
        .add_item(
            &user,
            AddItemInput {
                product_id: hardcover.id,
                quantity: 1,
            },
        )
        .await
        .expect("add hardcover");

    let view = orders
        .place_order_from_cart(&user)
        .await
        .expect("order from cart");
    assert_eq!(view.items.len(), 2);
    assert_eq!(view.total_amount, dec!(45.00));
    assert_eq!(stock_of(&app, paperback.id).await, 8);
    assert_eq!(stock_of(&app, hardcover.id).await, 3);

    // The cart converted into the order: its lines are gone, the row stays.
    let cart = carts.view_cart(&user).await.expect("view cart");
    assert_eq!(cart.items.len(), 0);

    // A now-empty cart cannot be ordered again.
    let err = orders.place_order_from_cart(&user).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidInput(_));
}

#[tokio::test]
async fn order_from_cart_fails_whole_when_stock_ran_out() {
    let app = TestApp::new().await;
    let alice = app.register_user("alice").await;
    let bob = app.register_user("bob").await;
    let category = app.seed_category("books").await;
    let product = app.seed_product(category, "paperback", dec!(10.00), 3).await;
    let orders = &app.state.services.orders;
    let carts = &app.state.services.carts;

    // Alice carts 3 units (all the stock) but does not order yet: the cart
    // check is advisory and reserves nothing.
    carts
        .add_item(
            &alice,
            AddItemInput {
                product_id: product.id,
                quantity: 3,
            },
        )
        .await
        .expect("alice carts the stock");

    // Bob buys 2 directly; the later commitment invalidates Alice's cart.
    orders
        .place_order(
            &bob,
            vec![OrderLineInput {
                product_id: product.id,
                quantity: 2,
            }],
        )
        .await
        .expect("bob orders");

    let err = orders.place_order_from_cart(&alice).await.unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    // Alice's cart still holds its lines; stock reflects only Bob's order.
    assert_eq!(stock_of(&app, product.id).await, 1);
    let cart = carts.view_cart(&alice).await.expect("view cart");
    assert_eq!(cart.items[0].quantity, 3);
}

#[tokio::test]
async fn admin_listing_sees_every_owner() {
    let app = TestApp::new().await;
    let alice = app.register_user("alice").await;
    let bob = app.register_user("bob").await;
    let category = app.seed_category("books").await;
    let product = app.seed_product(category, "paperback", dec!(10.00), 10).await;
    let orders = &app.state.services.orders;

    orders
        .place_order(
            &alice,
            vec![OrderLineInput {
                product_id: product.id,
                quantity: 1,
            }],
        )
        .await
        .expect("alice order");
    orders
        .place_order(
            &bob,
            vec![OrderLineInput {
                product_id: product.id,
                quantity: 1,
            }],
        )
        .await
        .expect("bob order");

    let (views, total) = orders.list_orders(1, 20).await.expect("admin list");
    assert_eq!(total, 2);
    let mut usernames: Vec<&str> = views.iter().map(|v| v.username.as_str()).collect();
    usernames.sort_unstable();
    assert_eq!(usernames, ["alice", "bob"]);

    let one = orders.get_order(views[0].id).await.expect("admin get");
    assert_eq!(one.id, views[0].id);
}
