use axum::http::StatusCode;
use paysettle::api::{self, AppState};
use paysettle::db::init_db;
use paysettle::dispatch::RecordingEventSink;
use paysettle::domain::{
    BankAccount, BankAccountStatus, PaymentMethod, Product, Sale, SaleStatus, TimeMs,
};
use paysettle::engine::FeeSchedule;
use paysettle::{Config, Decimal, OutboundEvent, Repository};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

struct TestApp {
    app: axum::Router,
    state: AppState,
    sink: Arc<RecordingEventSink>,
    _temp: TempDir,
}

async fn setup_test_app() -> TestApp {
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
    let sink = Arc::new(RecordingEventSink::new());
    let state = AppState::new(repo, config, sink.clone());

    TestApp {
        app: api::create_router(state.clone()),
        state,
        sink,
        _temp: temp_dir,
    }
}

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Seller "seller" with `net` approved and two bank accounts: "mine" and
/// "theirs" (owned by someone else).
async fn seed_wallet(repo: &Repository, net: &str) {
    repo.upsert_product(&Product {
        id: "p1".to_string(),
        owner_user_id: "seller".to_string(),
        name: "Course".to_string(),
        has_member_area: false,
    })
    .await
    .unwrap();
    repo.insert_sale(&Sale {
        id: "s1".to_string(),
        product_id: "p1".to_string(),
        seller_user_id: "seller".to_string(),
        buyer_email: "buyer@example.com".to_string(),
        buyer_name: None,
        amount: d(net) + d("10"),
        payment_method: PaymentMethod::Pix,
        payment_fee: d("10"),
        platform_fee: Decimal::zero(),
        affiliate_user_id: None,
        affiliate_percentage: Decimal::zero(),
        commission_amount: Decimal::zero(),
        coproducer_amount: Decimal::zero(),
        net_amount: d(net),
        status: SaleStatus::Pending,
        transaction_id: None,
        created_at: TimeMs::new(1_000),
        updated_at: TimeMs::new(1_000),
    })
    .await
    .unwrap();
    repo.apply_status_transition("s1", SaleStatus::Pending, SaleStatus::Approved, "tx-1", TimeMs::new(2_000))
        .await
        .unwrap();

    for (id, owner) in [("mine", "seller"), ("theirs", "other")] {
        repo.upsert_bank_account(&BankAccount {
            id: id.to_string(),
            user_id: owner.to_string(),
            bank_name: "Banco Exemplo".to_string(),
            status: BankAccountStatus::Approved,
        })
        .await
        .unwrap();
    }
}

async fn post(app: &axum::Router, uri: &str, user: &str, body: Value) -> (StatusCode, Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-user-id", user)
        .body(axum::body::Body::from(body.to_string()))
        .unwrap();

    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// Request a code over the API and read it back from the delivery sink.
async fn issue_code(test_app: &TestApp, user: &str) -> String {
    let (status, body) = post(&test_app.app, "/v1/withdrawals/otp", user, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    test_app
        .sink
        .events()
        .into_iter()
        .rev()
        .find_map(|event| match event {
            OutboundEvent::WithdrawalOtpIssued { user_id, code, .. } if user_id == user => Some(code),
            _ => None,
        })
        .unwrap()
}

#[tokio::test]
async fn test_withdrawal_net_of_fixed_fee() {
    let test_app = setup_test_app().await;
    seed_wallet(&test_app.state.repo, "1000").await;
    let code = issue_code(&test_app, "seller").await;

    let (status, body) = post(
        &test_app.app,
        "/v1/withdrawals",
        "seller",
        json!({"amount": 500.0, "bank_account_id": "mine", "otp_code": code}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let withdrawal = &body["withdrawal"];
    assert_eq!(withdrawal["amount"], 500.0);
    assert_eq!(withdrawal["fee"], 4.9);
    assert_eq!(withdrawal["net_amount"], 495.1);
    assert_eq!(withdrawal["status"], "pending");
    assert_eq!(withdrawal["bank_name"], "Banco Exemplo");

    let kinds = test_app.sink.kinds();
    assert!(kinds.contains(&"withdrawal_requested"));
    assert!(kinds.contains(&"admin_withdrawal_pending"));
}

#[tokio::test]
async fn test_insufficient_balance_rejected_without_row() {
    let test_app = setup_test_app().await;
    seed_wallet(&test_app.state.repo, "400").await;
    let code = issue_code(&test_app, "seller").await;

    let (status, body) = post(
        &test_app.app,
        "/v1/withdrawals",
        "seller",
        json!({"amount": 500.0, "bank_account_id": "mine", "otp_code": code}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("insufficient"));
    assert!(test_app
        .state
        .repo
        .list_withdrawals("seller")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_otp_failures_are_unauthorized() {
    let test_app = setup_test_app().await;
    seed_wallet(&test_app.state.repo, "1000").await;

    let (status, _) = post(
        &test_app.app,
        "/v1/withdrawals",
        "seller",
        json!({"amount": 100.0, "bank_account_id": "mine"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let code = issue_code(&test_app, "seller").await;
    let wrong = if code == "111111" { "222222" } else { "111111" };
    let (status, body) = post(
        &test_app.app,
        "/v1/withdrawals",
        "seller",
        json!({"amount": 100.0, "bank_account_id": "mine", "otp_code": wrong}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    // A code issued to someone else does not work either.
    let other_code = issue_code(&test_app, "other").await;
    assert_ne!(other_code, code);
    let (status, _) = post(
        &test_app.app,
        "/v1/withdrawals",
        "seller",
        json!({"amount": 100.0, "bank_account_id": "mine", "otp_code": other_code}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_foreign_bank_account_is_forbidden() {
    let test_app = setup_test_app().await;
    seed_wallet(&test_app.state.repo, "1000").await;

    let code = issue_code(&test_app, "seller").await;
    let (status, foreign) = post(
        &test_app.app,
        "/v1/withdrawals",
        "seller",
        json!({"amount": 100.0, "bank_account_id": "theirs", "otp_code": code}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let code = issue_code(&test_app, "seller").await;
    let (status, missing) = post(
        &test_app.app,
        "/v1/withdrawals",
        "seller",
        json!({"amount": 100.0, "bank_account_id": "nowhere", "otp_code": code}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    // Same message whether the account is foreign or absent.
    assert_eq!(foreign["error"], missing["error"]);
}

#[tokio::test]
async fn test_cooldown_between_withdrawals() {
    let test_app = setup_test_app().await;
    seed_wallet(&test_app.state.repo, "1000").await;

    let code = issue_code(&test_app, "seller").await;
    let (status, _) = post(
        &test_app.app,
        "/v1/withdrawals",
        "seller",
        json!({"amount": 100.0, "bank_account_id": "mine", "otp_code": code}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let code = issue_code(&test_app, "seller").await;
    let (status, _) = post(
        &test_app.app,
        "/v1/withdrawals",
        "seller",
        json!({"amount": 100.0, "bank_account_id": "mine", "otp_code": code}),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_otp_requests_are_rate_limited() {
    let test_app = setup_test_app().await;
    for _ in 0..3 {
        issue_code(&test_app, "seller").await;
    }
    let (status, body) = post(&test_app.app, "/v1/withdrawals/otp", "seller", json!({})).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].is_string());
}
