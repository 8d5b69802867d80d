mod common;

use actix_web::http::StatusCode;
use actix_web::test::TestRequest;
use serde_json::{json, Value};

use common::{bearer, send, Fixture};
use shopfront_api::models::Role;

fn home() -> Value {
    json!({
        "address": "1 Main St",
        "city": "Springfield",
        "state": "IL",
        "zip": "62701",
        "country": "US",
    })
}

#[actix_web::test]
async fn owner_manages_their_addresses() {
    let fx = Fixture::new();
    let app = fx.app().await;
    let (me, token) = fx.user("me@example.com", Role::User).await;
    let base = format!("/api/user/{}/addresses", me.id);

    let req = TestRequest::post()
        .uri(&base)
        .insert_header(bearer(&token))
        .set_json(home())
        .to_request();
    let (status, first) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["user_id"], me.id);

    let mut second = home();
    second["city"] = json!("Shelbyville");
    let req = TestRequest::post()
        .uri(&base)
        .insert_header(bearer(&token))
        .set_json(second)
        .to_request();
    let (_, second) = send(&app, req).await;

    let req = TestRequest::get().uri(&base).insert_header(bearer(&token)).to_request();
    let (status, list) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list[0]["id"], second["id"]);
    assert_eq!(list[1]["id"], first["id"]);

    let one = format!("{base}/{}", first["id"]);
    let req = TestRequest::put()
        .uri(&one)
        .insert_header(bearer(&token))
        .set_json(json!({ "zip": "62704", "city": "" }))
        .to_request();
    let (status, updated) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["zip"], "62704");
    assert_eq!(updated["city"], "Springfield");

    let req = TestRequest::delete().uri(&one).insert_header(bearer(&token)).to_request();
    assert_eq!(send(&app, req).await.0, StatusCode::OK);
    let req = TestRequest::get().uri(&one).insert_header(bearer(&token)).to_request();
    assert_eq!(send(&app, req).await.0, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn incomplete_address_is_rejected() {
    let fx = Fixture::new();
    let app = fx.app().await;
    let (me, token) = fx.user("me@example.com", Role::User).await;

    let mut body = home();
    body["country"] = json!(" ");
    let req = TestRequest::post()
        .uri(&format!("/api/user/{}/addresses", me.id))
        .insert_header(bearer(&token))
        .set_json(body)
        .to_request();
    let (status, err) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "All address fields are required");
}

#[actix_web::test]
async fn other_users_addresses_are_off_limits() {
    let fx = Fixture::new();
    let app = fx.app().await;
    let (me, token) = fx.user("me@example.com", Role::User).await;
    let (_, other) = fx.user("other@example.com", Role::User).await;
    let (_, admin) = fx.user("admin@example.com", Role::Admin).await;
    let base = format!("/api/user/{}/addresses", me.id);

    let req = TestRequest::post()
        .uri(&base)
        .insert_header(bearer(&token))
        .set_json(home())
        .to_request();
    send(&app, req).await;

    let req = TestRequest::get().uri(&base).insert_header(bearer(&other)).to_request();
    let (status, err) = send(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(err["error"], "Unauthorized - Cannot access other user addresses");

    let req = TestRequest::post()
        .uri(&base)
        .insert_header(bearer(&other))
        .set_json(home())
        .to_request();
    assert_eq!(send(&app, req).await.0, StatusCode::FORBIDDEN);

    let req = TestRequest::get().uri(&base).insert_header(bearer(&admin)).to_request();
    let (status, list) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn address_must_belong_to_the_path_user() {
    let fx = Fixture::new();
    let app = fx.app().await;
    let (me, _) = fx.user("me@example.com", Role::User).await;
    let (you, _) = fx.user("you@example.com", Role::User).await;
    let (_, admin) = fx.user("admin@example.com", Role::Admin).await;

    let req = TestRequest::post()
        .uri(&format!("/api/user/{}/addresses", you.id))
        .insert_header(bearer(&admin))
        .set_json(home())
        .to_request();
    let (_, theirs) = send(&app, req).await;

    let req = TestRequest::get()
        .uri(&format!("/api/user/{}/addresses/{}", me.id, theirs["id"]))
        .insert_header(bearer(&admin))
        .to_request();
    let (status, err) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "Address does not belong to this user");

    let req = TestRequest::get()
        .uri("/api/user/9999/addresses")
        .insert_header(bearer(&admin))
        .to_request();
    assert_eq!(send(&app, req).await.0, StatusCode::NOT_FOUND);
}
