mod common;

use actix_web::http::StatusCode;
use actix_web::test::TestRequest;
use serde_json::{json, Value};

use common::{bearer, decimal, money, send, Fixture};
use rust_decimal::Decimal;
use shopfront_api::models::{OrderStatus, Role, MAX_LINE_QUANTITY};
use shopfront_api::store::{FailPoint, Store};

async fn add_to_cart<S, B>(app: &S, token: &str, product_id: i64, quantity: i64) -> (StatusCode, Value)
where
    S: actix_web::dev::Service<
        actix_http::Request,
        Response = actix_web::dev::ServiceResponse<B>,
        Error = actix_web::Error,
    >,
    B: actix_web::body::MessageBody,
{
    let req = TestRequest::post()
        .uri("/api/cart/items")
        .insert_header(bearer(token))
        .set_json(json!({ "product_id": product_id, "quantity": quantity }))
        .to_request();
    send(app, req).await
}

#[actix_web::test]
async fn adding_the_same_product_twice_accumulates() {
    let fx = Fixture::new();
    let app = fx.app().await;
    let (_, token) = fx.user("u@example.com", Role::User).await;
    let product = fx.product("Mug", money(800)).await;

    let (status, first) = add_to_cart(&app, &token, product.id, 1).await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) = add_to_cart(&app, &token, product.id, 2).await;
    assert_eq!(first["id"], second["id"]);
    assert_eq!(second["quantity"], 3);

    let req = TestRequest::get()
        .uri("/api/cart")
        .insert_header(bearer(&token))
        .to_request();
    let (status, cart) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    let items = cart["cart_items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["product"]["name"], "Mug");
}

#[actix_web::test]
async fn cart_item_input_is_validated() {
    let fx = Fixture::new();
    let app = fx.app().await;
    let (_, token) = fx.user("u@example.com", Role::User).await;
    let product = fx.product("Mug", money(800)).await;

    let (status, body) = add_to_cart(&app, &token, product.id, 0).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid product_id or quantity");

    let (status, _) = add_to_cart(&app, &token, 999, 1).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn line_quantity_is_capped() {
    let fx = Fixture::new();
    let app = fx.app().await;
    let (user, token) = fx.user("u@example.com", Role::User).await;
    let product = fx.product("Mug", money(800)).await;

    let (status, _) = add_to_cart(&app, &token, product.id, i64::MAX).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = add_to_cart(&app, &token, product.id, MAX_LINE_QUANTITY).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = add_to_cart(&app, &token, product.id, 1).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], format!("Quantity must not exceed {MAX_LINE_QUANTITY}"));

    let cart = fx.store.find_cart(user.id).await.unwrap().unwrap();
    let items = fx.store.cart_items(cart.id).await.unwrap();
    assert_eq!(items[0].quantity, MAX_LINE_QUANTITY);

    let req = TestRequest::put()
        .uri(&format!("/api/cart/items/{}", items[0].id))
        .insert_header(bearer(&token))
        .set_json(json!({ "quantity": i64::MAX }))
        .to_request();
    assert_eq!(send(&app, req).await.0, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn overflowing_order_total_fails_cleanly() {
    let fx = Fixture::new();
    let app = fx.app().await;
    let (user, token) = fx.user("u@example.com", Role::User).await;
    let product = fx.product("Yacht", Decimal::MAX).await;
    add_to_cart(&app, &token, product.id, 2).await;

    let req = TestRequest::post()
        .uri("/api/order")
        .insert_header(bearer(&token))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to create order");

    assert!(fx.store.list_orders(Some(user.id)).await.unwrap().is_empty());
    let cart = fx.store.find_cart(user.id).await.unwrap().unwrap();
    assert_eq!(fx.store.cart_items(cart.id).await.unwrap().len(), 1);
}

#[actix_web::test]
async fn placing_an_order_freezes_prices_and_empties_the_cart() {
    let fx = Fixture::new();
    let app = fx.app().await;
    let (user, token) = fx.user("buyer@example.com", Role::User).await;
    let book = fx.product("Book", money(1000)).await;
    let pen = fx.product("Pen", money(500)).await;

    add_to_cart(&app, &token, book.id, 2).await;
    add_to_cart(&app, &token, pen.id, 1).await;

    let req = TestRequest::post()
        .uri("/api/order")
        .insert_header(bearer(&token))
        .to_request();
    let (status, order) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["status"], "pending");
    assert_eq!(order["user_id"], user.id);
    assert_eq!(decimal(&order["total_amount"]), money(2500));

    let items = order["order_items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    let book_line = items.iter().find(|i| i["product_id"] == book.id).unwrap();
    assert_eq!(book_line["quantity"], 2);
    assert_eq!(decimal(&book_line["price"]), money(1000));

    let cart = fx.store.find_cart(user.id).await.unwrap().unwrap();
    assert!(fx.store.cart_items(cart.id).await.unwrap().is_empty());

    // later price changes do not touch the placed order
    let (_, admin) = fx.user("admin@example.com", Role::Admin).await;
    let req = TestRequest::put()
        .uri(&format!("/api/product/{}", book.id))
        .insert_header(bearer(&admin))
        .set_json(json!({ "name": "Book", "price": "99.00", "stock": 5 }))
        .to_request();
    assert_eq!(send(&app, req).await.0, StatusCode::OK);

    let req = TestRequest::get()
        .uri(&format!("/api/order/{}", order["id"]))
        .insert_header(bearer(&token))
        .to_request();
    let (_, fetched) = send(&app, req).await;
    assert_eq!(decimal(&fetched["total_amount"]), money(2500));
}

#[actix_web::test]
async fn empty_cart_cannot_be_ordered() {
    let fx = Fixture::new();
    let app = fx.app().await;
    let (_, token) = fx.user("u@example.com", Role::User).await;

    let req = TestRequest::post()
        .uri("/api/order")
        .insert_header(bearer(&token))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Cart is empty");
    assert!(fx.store.list_orders(None).await.unwrap().is_empty());
}

#[actix_web::test]
async fn failed_placement_leaves_no_trace() {
    for point in [
        FailPoint::InsertOrder,
        FailPoint::InsertOrderItems,
        FailPoint::ClearCart,
    ] {
        let fx = Fixture::new();
        let app = fx.app().await;
        let (user, token) = fx.user("u@example.com", Role::User).await;
        let product = fx.product("Lamp", money(4200)).await;
        add_to_cart(&app, &token, product.id, 1).await;

        fx.store.fail_next_order_at(point).await;
        let req = TestRequest::post()
            .uri("/api/order")
            .insert_header(bearer(&token))
            .to_request();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{point:?}");
        assert_eq!(body["error"], "Failed to create order");

        assert!(fx.store.list_orders(Some(user.id)).await.unwrap().is_empty());
        let cart = fx.store.find_cart(user.id).await.unwrap().unwrap();
        assert_eq!(fx.store.cart_items(cart.id).await.unwrap().len(), 1);
    }
}

#[actix_web::test]
async fn another_users_cart_item_is_forbidden() {
    let fx = Fixture::new();
    let app = fx.app().await;
    let (_, owner) = fx.user("owner@example.com", Role::User).await;
    let (_, other) = fx.user("other@example.com", Role::User).await;
    let product = fx.product("Cup", money(300)).await;

    let (_, item) = add_to_cart(&app, &owner, product.id, 1).await;
    let uri = format!("/api/cart/items/{}", item["id"]);

    let req = TestRequest::put()
        .uri(&uri)
        .insert_header(bearer(&other))
        .set_json(json!({ "quantity": 5 }))
        .to_request();
    assert_eq!(send(&app, req).await.0, StatusCode::FORBIDDEN);

    let req = TestRequest::delete()
        .uri(&uri)
        .insert_header(bearer(&other))
        .to_request();
    assert_eq!(send(&app, req).await.0, StatusCode::FORBIDDEN);

    let req = TestRequest::delete()
        .uri("/api/cart/items/4242")
        .insert_header(bearer(&other))
        .to_request();
    assert_eq!(send(&app, req).await.0, StatusCode::NOT_FOUND);

    let req = TestRequest::put()
        .uri(&uri)
        .insert_header(bearer(&owner))
        .set_json(json!({ "quantity": 4 }))
        .to_request();
    let (status, updated) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["quantity"], 4);
}

#[actix_web::test]
async fn clearing_a_cart_that_never_existed_is_404() {
    let fx = Fixture::new();
    let app = fx.app().await;
    let (_, token) = fx.user("u@example.com", Role::User).await;

    let req = TestRequest::delete()
        .uri("/api/cart")
        .insert_header(bearer(&token))
        .to_request();
    assert_eq!(send(&app, req).await.0, StatusCode::NOT_FOUND);

    let req = TestRequest::get()
        .uri("/api/cart/items")
        .insert_header(bearer(&token))
        .to_request();
    let (status, items) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(items, json!([]));
}

async fn placed_order(fx: &Fixture, token: &str) -> i64 {
    let app = fx.app().await;
    let product = fx.product("Widget", money(1500)).await;
    add_to_cart(&app, token, product.id, 1).await;
    let req = TestRequest::post()
        .uri("/api/order")
        .insert_header(bearer(token))
        .to_request();
    let (status, order) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED);
    order["id"].as_i64().unwrap()
}

#[actix_web::test]
async fn owner_cancels_pending_but_not_completed_orders() {
    let fx = Fixture::new();
    let app = fx.app().await;
    let (_, token) = fx.user("u@example.com", Role::User).await;
    let (_, admin) = fx.user("admin@example.com", Role::Admin).await;

    let pending = placed_order(&fx, &token).await;
    let req = TestRequest::delete()
        .uri(&format!("/api/order/{pending}"))
        .insert_header(bearer(&token))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["status"], "cancelled");

    let completed = placed_order(&fx, &token).await;
    let req = TestRequest::put()
        .uri(&format!("/api/order/{completed}"))
        .insert_header(bearer(&admin))
        .set_json(json!({ "status": "COMPLETED" }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");

    let req = TestRequest::delete()
        .uri(&format!("/api/order/{completed}"))
        .insert_header(bearer(&token))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Can only cancel pending orders");
    let order = fx.store.find_order(completed).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
}

#[actix_web::test]
async fn status_updates_are_admin_only_and_validated() {
    let fx = Fixture::new();
    let app = fx.app().await;
    let (_, token) = fx.user("u@example.com", Role::User).await;
    let (_, admin) = fx.user("admin@example.com", Role::Admin).await;
    let order_id = placed_order(&fx, &token).await;
    let uri = format!("/api/order/{order_id}");

    let req = TestRequest::put()
        .uri(&uri)
        .insert_header(bearer(&token))
        .set_json(json!({ "status": "completed" }))
        .to_request();
    assert_eq!(send(&app, req).await.0, StatusCode::FORBIDDEN);

    let req = TestRequest::put()
        .uri(&uri)
        .insert_header(bearer(&admin))
        .set_json(json!({ "status": "shipped" }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid status");

    let req = TestRequest::put()
        .uri("/api/order/9999")
        .insert_header(bearer(&admin))
        .set_json(json!({ "status": "completed" }))
        .to_request();
    assert_eq!(send(&app, req).await.0, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn orders_are_visible_to_owner_and_admin_only() {
    let fx = Fixture::new();
    let app = fx.app().await;
    let (_, alice) = fx.user("alice@example.com", Role::User).await;
    let (_, bob) = fx.user("bob@example.com", Role::User).await;
    let (_, admin) = fx.user("admin@example.com", Role::Admin).await;

    let first = placed_order(&fx, &alice).await;
    let second = placed_order(&fx, &alice).await;
    placed_order(&fx, &bob).await;

    let req = TestRequest::get()
        .uri("/api/order")
        .insert_header(bearer(&alice))
        .to_request();
    let (_, mine) = send(&app, req).await;
    let ids: Vec<i64> = mine
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![second, first]);

    let req = TestRequest::get()
        .uri("/api/order")
        .insert_header(bearer(&admin))
        .to_request();
    let (_, all) = send(&app, req).await;
    assert_eq!(all.as_array().unwrap().len(), 3);

    let req = TestRequest::get()
        .uri(&format!("/api/order/{first}"))
        .insert_header(bearer(&bob))
        .to_request();
    assert_eq!(send(&app, req).await.0, StatusCode::FORBIDDEN);

    let req = TestRequest::get()
        .uri("/api/order/9999")
        .insert_header(bearer(&bob))
        .to_request();
    assert_eq!(send(&app, req).await.0, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn admin_delete_removes_the_order_and_its_items() {
    let fx = Fixture::new();
    let app = fx.app().await;
    let (_, token) = fx.user("u@example.com", Role::User).await;
    let (_, admin) = fx.user("admin@example.com", Role::Admin).await;
    let order_id = placed_order(&fx, &token).await;

    let req = TestRequest::delete()
        .uri(&format!("/api/order/{order_id}"))
        .insert_header(bearer(&admin))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Order deleted successfully");
    assert!(fx.store.find_order(order_id).await.unwrap().is_none());
    assert!(fx.store.order_items(order_id).await.unwrap().is_empty());
}
