use axum::http::StatusCode;
use paysettle::api::{self, AppState};
use paysettle::db::init_db;
use paysettle::dispatch::RecordingEventSink;
use paysettle::domain::{CoProducer, CoProducerStatus, Coupon, DiscountType, Product};
use paysettle::engine::FeeSchedule;
use paysettle::{Config, Decimal, Repository};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

async fn setup_test_app() -> (axum::Router, Arc<Repository>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    let config = Config {
        port: 0,
        database_path: db_path,
        dispatch_url: None,
        fees: FeeSchedule::default(),
        anticipation: Default::default(),
        withdrawal: Default::default(),
        otp: Default::default(),
    };
    let state = AppState::new(repo.clone(), config, Arc::new(RecordingEventSink::new()));

    (api::create_router(state), repo, temp_dir)
}

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

async fn seed(repo: &Repository) {
    for (id, owner) in [("p-alice", "alice"), ("p-bob", "bob")] {
        repo.upsert_product(&Product {
            id: id.to_string(),
            owner_user_id: owner.to_string(),
            name: format!("{}'s course", owner),
            has_member_area: true,
        })
        .await
        .unwrap();
    }
    for (id, code, creator, product) in [
        ("c1", "ALICE10", "alice", Some("p-alice")),
        ("c2", "BOB10", "bob", None),
    ] {
        repo.insert_coupon(&Coupon {
            id: id.to_string(),
            code: code.to_string(),
            created_by: creator.to_string(),
            product_id: product.map(str::to_string),
            discount_type: DiscountType::Percentage,
            discount_value: d("10"),
            active: true,
            max_uses: None,
            uses_count: 0,
            expires_at: None,
            min_purchase_amount: None,
        })
        .await
        .unwrap();
    }
}

async fn validate(app: &axum::Router, body: Value) -> (StatusCode, Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/v1/coupons/validate")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap();

    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_owner_coupon_validates() {
    let (app, repo, _temp) = setup_test_app().await;
    seed(&repo).await;

    let (status, body) = validate(
        &app,
        json!({
            "coupon_code": "alice10",
            "product_id": "p-alice",
            "amount": 100.0,
            "order_bumps_total": 47.0,
            "quantity": 1
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["code"], "ALICE10");
    assert_eq!(body["discount"], 14.7);
    assert_eq!(body["final_amount"], 132.3);
}

#[tokio::test]
async fn test_coupon_from_unrelated_seller_is_invalid() {
    let (app, repo, _temp) = setup_test_app().await;
    seed(&repo).await;

    // Bob owns a product, just not this one.
    let (status, body) = validate(
        &app,
        json!({"coupon_code": "BOB10", "product_id": "p-alice", "amount": 100.0}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);
    assert!(body.get("discount").is_none());

    let (_, unknown) = validate(
        &app,
        json!({"coupon_code": "NOPE", "product_id": "p-alice", "amount": 100.0}),
    )
    .await;
    assert_eq!(unknown["valid"], false);
    assert_eq!(body["message"], unknown["message"]);
}

#[tokio::test]
async fn test_active_coproducer_coupon_validates() {
    let (app, repo, _temp) = setup_test_app().await;
    seed(&repo).await;
    let mut coproducer = CoProducer {
        product_id: "p-alice".to_string(),
        user_id: "bob".to_string(),
        commission_percentage: d("30"),
        status: CoProducerStatus::Active,
    };
    repo.upsert_coproducer(&coproducer).await.unwrap();

    let body = json!({"coupon_code": "BOB10", "product_id": "p-alice", "amount": 100.0});
    let (_, result) = validate(&app, body.clone()).await;
    assert_eq!(result["valid"], true);
    assert_eq!(result["discount"], 10.0);

    coproducer.status = CoProducerStatus::Inactive;
    repo.upsert_coproducer(&coproducer).await.unwrap();
    let (_, result) = validate(&app, body).await;
    assert_eq!(result["valid"], false);
}
