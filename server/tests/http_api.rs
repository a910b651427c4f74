//! HTTP surface: JSON API status codes and LNURL error bodies
//!
//! Run with: cargo test -p tipme-server --test http_api

mod common;

use actix_web::{test, web, App};
use serde_json::{json, Value};

use common::{eventually, Harness};
use server::lnurl::{decode_lnurl, LinkKind};
use server::middleware::RequestIdMiddleware;
use server::models::creation_request::CreationStatus;

macro_rules! app {
    ($h:expr) => {
        test::init_service(
            App::new()
                .wrap(RequestIdMiddleware)
                .app_data(web::Data::new($h.creation.clone()))
                .app_data(web::Data::new($h.funding.clone()))
                .app_data(web::Data::new($h.withdrawals.clone()))
                .app_data(web::Data::new($h.store.clone()))
                .app_data(web::Data::new($h.links.clone()))
                .configure(server::configure_routes),
        )
        .await
    };
}

macro_rules! get_json {
    ($app:expr, $uri:expr) => {{
        let resp = test::call_service(&$app, test::TestRequest::get().uri($uri).to_request()).await;
        let status = resp.status().as_u16();
        let body: Value = test::read_body_json(resp).await;
        (status, body)
    }};
}

#[actix_web::test]
async fn test_create_and_poll_batch() {
    let h = Harness::new();
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri("/api/vouchers/invoice")
        .set_json(json!({"lightning_address": "alice@example.com", "count": 2, "expiry_seconds": 600}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["fee_sats"], 20);
    assert_eq!(body["invoice"], "lnbcmock1");
    let hash = body["payment_hash"].as_str().unwrap().to_string();

    let (status, body) = get_json!(app, &format!("/api/vouchers/status/{}", hash));
    assert_eq!(status, 200);
    assert_eq!(body, json!({"status": "pending"}));

    h.gateway.settle(&hash);
    let done = eventually(|| async {
        let (req, _) = h.creation.status(&hash).await.unwrap();
        req.status() == CreationStatus::Complete
    })
    .await;
    assert!(done);

    let (status, body) = get_json!(app, &format!("/api/vouchers/status/{}", hash));
    assert_eq!(status, 200);
    assert_eq!(body["status"], "complete");
    let vouchers = body["vouchers"].as_array().unwrap();
    assert_eq!(vouchers.len(), 2);

    let first = &vouchers[0];
    assert_eq!(first["lightning_address"], "alice@example.com");
    assert_eq!(first["relative_expiry_seconds"], 600);
    assert!(first["absolute_expiry"].as_str().unwrap().ends_with('Z'));

    let pay_url = decode_lnurl(first["lnurl_pay"].as_str().unwrap()).unwrap();
    assert!(pay_url.starts_with("https://tips.example.com/pay/"));
    let withdraw_url = decode_lnurl(first["lnurl_withdraw"].as_str().unwrap()).unwrap();
    assert!(withdraw_url.starts_with("https://tips.example.com/withdraw/"));
    assert_eq!(
        first["pay_info_url"],
        format!(
            "https://tips.example.com/api/vouchers/info?lightning={}",
            first["lnurl_pay"].as_str().unwrap()
        )
    );
}

#[actix_web::test]
async fn test_json_api_errors() {
    let h = Harness::new();
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri("/api/vouchers/invoice")
        .set_json(json!({"lightning_address": "nope", "count": 1}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "invalid lightning address");

    let req = test::TestRequest::post()
        .uri("/api/vouchers/invoice")
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().starts_with("invalid request body"));

    let (status, body) = get_json!(app, "/api/vouchers/status/unknown");
    assert_eq!(status, 404);
    assert_eq!(body["error"], "voucher not found");
}

#[actix_web::test]
async fn test_voucher_info() {
    let h = Harness::new();
    let app = app!(h);
    let voucher = h.seed_vouchers(1, 3600).await.remove(0);
    h.fund(&voucher.pay_id, 48_000).await;

    let lnurl = h.links.lnurl(LinkKind::Pay, &voucher.pay_id).unwrap();
    let (status, body) = get_json!(app, &format!("/api/vouchers/info?lightning={}", lnurl));
    assert_eq!(status, 200);
    assert_eq!(body["kind"], "pay");
    assert_eq!(body["active"], true);
    assert_eq!(body["balance_sats"], 48);
    assert!(body["expires_at"].is_string());
    assert_eq!(body["funding_history"].as_array().unwrap().len(), 1);
    assert_eq!(body["funding_history"][0]["credited_sats"], 48);

    let lnurl = h.links.lnurl(LinkKind::Withdraw, &voucher.withdraw_id).unwrap();
    let (status, body) = get_json!(app, &format!("/api/vouchers/info?lightning={}", lnurl));
    assert_eq!(status, 200);
    assert_eq!(body["kind"], "withdraw");
    assert!(body["funding_history"].as_array().unwrap().is_empty());

    let (status, _) = get_json!(app, "/api/vouchers/info?lightning=LNURL1QQQQ");
    assert_eq!(status, 400);
    let (status, _) = get_json!(app, "/api/vouchers/info");
    assert_eq!(status, 400);

    let unknown = h.links.lnurl(LinkKind::Pay, "no-such-voucher").unwrap();
    let (status, _) = get_json!(app, &format!("/api/vouchers/info?lightning={}", unknown));
    assert_eq!(status, 404);
}

#[actix_web::test]
async fn test_lnurl_errors_are_http_200() {
    let h = Harness::new();
    let app = app!(h);
    let voucher = h.seed_vouchers(1, 3600).await.remove(0);

    let cases = [
        "/pay/missing".to_string(),
        format!("/pay/{}/callback", voucher.pay_id),
        format!("/pay/{}/callback?amount=abc", voucher.pay_id),
        format!("/pay/{}/callback?amount=-1", voucher.pay_id),
        format!("/withdraw/{}", voucher.withdraw_id),
        format!("/withdraw/{}/callback?k1=abc", voucher.withdraw_id),
        format!("/withdraw/{}/callback?k1=abc&pr=lnbc1", voucher.withdraw_id),
    ];
    for uri in &cases {
        let (status, body) = get_json!(app, uri);
        assert_eq!(status, 200, "{}", uri);
        assert_eq!(body["status"], "ERROR", "{}", uri);
        assert!(body["reason"].is_string(), "{}", uri);
    }

    let (_, body) = get_json!(app, "/pay/missing");
    assert_eq!(body["reason"], "voucher not found");
    let (_, body) = get_json!(app, &format!("/withdraw/{}", voucher.withdraw_id));
    assert_eq!(body["reason"], "voucher has no balance");
}

#[actix_web::test]
async fn test_lnurl_pay_and_withdraw_round_trip() {
    let h = Harness::new();
    let app = app!(h);
    let voucher = h.seed_vouchers(1, 3600).await.remove(0);

    let (status, body) = get_json!(app, &format!("/pay/{}", voucher.pay_id));
    assert_eq!(status, 200);
    assert_eq!(body["tag"], "payRequest");
    assert_eq!(body["metadata"], r#"[["text/plain","Tip via TipMe"]]"#);
    assert!(body["minSendable"].is_i64());

    let (_, body) = get_json!(app, &format!("/pay/{}/callback?amount=50000", voucher.pay_id));
    assert_eq!(body["pr"], "lnbcmock1");
    assert_eq!(body["routes"], json!([]));

    h.gateway.settle(&format!("{:064x}", 1));
    let funded = eventually(|| async { h.voucher(&voucher.pay_id).await.total_paid_msats == 48_000 }).await;
    assert!(funded);

    let (_, body) = get_json!(app, &format!("/withdraw/{}", voucher.withdraw_id));
    assert_eq!(body["tag"], "withdrawRequest");
    assert_eq!(body["defaultDescription"], "TipMe withdrawal");
    assert_eq!(body["maxWithdrawable"], 48_000);
    let k1 = body["k1"].as_str().unwrap().to_string();

    let uri = format!(
        "/withdraw/{}/callback?k1={}&pr=lnbc480n1pwithdrawtest",
        voucher.withdraw_id, k1
    );
    let (_, body) = get_json!(app, &uri);
    assert_eq!(body, json!({"status": "OK"}));

    let (_, body) = get_json!(app, &uri);
    assert_eq!(body["status"], "ERROR");
    assert_eq!(body["reason"], "invalid or already-used k1");
}

#[actix_web::test]
async fn test_health() {
    let h = Harness::new();
    let app = app!(h);

    let (status, body) = get_json!(app, "/health");
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
}
