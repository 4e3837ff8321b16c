//! Properties of the settlement pipeline that must hold for every input,
//! checked over deterministic grids rather than single examples.

use paysettle::db::init_db;
use paysettle::dispatch::RecordingEventSink;
use paysettle::domain::{
    CoProducer, CoProducerStatus, PaymentMethod, Product, Sale, SaleStatus, TimeMs,
};
use paysettle::engine::{can_transition, map_status, priority, FeeCalculator, FeeError};
use paysettle::orchestration::settlement::plan_commissions;
use paysettle::orchestration::{GatewayEvent, WebhookAction, WebhookProcessor};
use paysettle::{Decimal, Repository};
use std::str::FromStr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn cents(n: i64) -> Decimal {
    Decimal::from_parts(n, 2)
}

#[test]
fn fee_breakdown_always_sums_to_gross() {
    let calc = FeeCalculator::default();
    let affiliate_options = [None, Some(d("0")), Some(d("12.5")), Some(d("33.33")), Some(d("50"))];

    let mut checked = 0;
    for step in 0..400i64 {
        let gross = cents(5_000 + step * 737);
        for method in PaymentMethod::ALL {
            for pct in affiliate_options {
                let result = assert_ok!(calc.calculate(gross, method, pct));
                assert_eq!(
                    result.net_amount + result.payment_fee + result.platform_fee + result.affiliate_commission,
                    result.gross,
                    "gross {} method {} affiliate {:?}",
                    gross,
                    method,
                    pct
                );
                assert!(result.net_amount.is_positive());
                assert_eq!(result.payment_fee, result.payment_fee.round2());
                checked += 1;
            }
        }
    }
    assert_eq!(checked, 400 * 4 * 5);
}

#[test]
fn fee_validity_boundary() {
    let calc = FeeCalculator::default();
    for method in PaymentMethod::ALL {
        assert_err!(calc.calculate(Decimal::zero(), method, None));
        assert_err!(calc.calculate(d("-1"), method, None));
        assert_err!(calc.calculate(d("100"), method, Some(d("100.01"))));
    }

    // Walk up from one cent: once a gross is accepted every larger one is too.
    let mut first_valid = None;
    for n in 1..1_000 {
        match calc.calculate(cents(n), PaymentMethod::Boleto, None) {
            Ok(_) => {
                first_valid.get_or_insert(n);
            }
            Err(FeeError::FeesExceedGross { .. }) => {
                assert!(first_valid.is_none(), "{} rejected after a smaller gross passed", n)
            }
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }
    assert!(first_valid.is_some());
}

#[test]
fn status_priority_is_monotonic() {
    for current in SaleStatus::ALL {
        assert!(can_transition(current, current));
        for next in SaleStatus::ALL {
            assert_eq!(
                can_transition(current, next),
                priority(next) >= priority(current),
                "{} -> {}",
                current,
                next
            );
        }
        if current != SaleStatus::Pending {
            assert!(!can_transition(current, SaleStatus::Pending));
        }
    }
    assert!(!can_transition(SaleStatus::Chargeback, SaleStatus::Approved));
    assert_eq!(map_status("something_new"), SaleStatus::Pending);
}

fn approved_sale(net: &str, affiliate: Option<(&str, &str)>) -> Sale {
    let (affiliate_user_id, commission) = match affiliate {
        Some((user, amount)) => (Some(user.to_string()), d(amount)),
        None => (None, Decimal::zero()),
    };
    Sale {
        id: "s1".to_string(),
        product_id: "p1".to_string(),
        seller_user_id: "seller".to_string(),
        buyer_email: "buyer@example.com".to_string(),
        buyer_name: None,
        amount: d(net) + d("10") + commission,
        payment_method: PaymentMethod::Pix,
        payment_fee: d("10"),
        platform_fee: Decimal::zero(),
        affiliate_user_id,
        affiliate_percentage: Decimal::zero(),
        commission_amount: commission,
        coproducer_amount: Decimal::zero(),
        net_amount: d(net),
        status: SaleStatus::Approved,
        transaction_id: None,
        created_at: TimeMs::new(0),
        updated_at: TimeMs::new(0),
    }
}

#[test]
fn commission_plan_accounts_for_every_cent() {
    let coproducer_sets: [&[(&str, &str)]; 4] = [
        &[],
        &[("co1", "30")],
        &[("co1", "33.33"), ("co2", "33.33")],
        &[("co1", "10"), ("co2", "15.5"), ("seller", "50")],
    ];

    for net in ["0.01", "99.99", "280.69", "1234.57"] {
        for set in coproducer_sets {
            let coproducers: Vec<CoProducer> = set
                .iter()
                .map(|(user, pct)| CoProducer {
                    product_id: "p1".to_string(),
                    user_id: user.to_string(),
                    commission_percentage: d(pct),
                    status: CoProducerStatus::Active,
                })
                .collect();
            let sale = approved_sale(net, Some(("aff", "20")));
            let plan = assert_ok!(plan_commissions(&sale, &coproducers));

            let non_affiliate: Decimal = plan
                .rows
                .iter()
                .filter(|row| row.user_id != "aff")
                .map(|row| row.commission_amount)
                .sum();
            assert_eq!(non_affiliate, sale.net_amount, "net {} set {:?}", net, set);
            assert_eq!(plan.producer_net + plan.coproducer_total, sale.net_amount);
            assert!(!plan.producer_net.is_negative());
            assert!(plan.rows.iter().all(|row| row.user_id != "seller" || row.commission_amount == plan.producer_net));
        }
    }
}

async fn setup_repo() -> (Arc<Repository>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    (Arc::new(Repository::new(pool)), temp_dir)
}

fn approval(sale_id: &str, tx: &str) -> GatewayEvent {
    GatewayEvent {
        signal: Some("approved".to_string()),
        transaction_id: Some(tx.to_string()),
        sale_id: Some(sale_id.to_string()),
    }
}

#[test]
fn repeated_approvals_grant_access_once() {
    tokio_test::block_on(async {
        let (repo, _temp) = setup_repo().await;
        repo.upsert_product(&Product {
            id: "p1".to_string(),
            owner_user_id: "seller".to_string(),
            name: "Course".to_string(),
            has_member_area: true,
        })
        .await
        .unwrap();
        let mut sale = approved_sale("280.69", None);
        sale.status = SaleStatus::Pending;
        repo.insert_sale(&sale).await.unwrap();

        let processor = WebhookProcessor::new(repo.clone(), Arc::new(RecordingEventSink::new()));
        let mut actions = Vec::new();
        for tx in ["tx-a", "tx-b", "tx-a"] {
            let outcome = processor.process(&approval("s1", tx)).await.unwrap();
            actions.push(outcome.action);
        }
        assert_eq!(
            actions,
            vec![
                WebhookAction::Updated,
                WebhookAction::IdempotentSkip,
                WebhookAction::IdempotentSkip
            ]
        );

        assert_eq!(repo.count_courses("p1").await.unwrap(), 1);
        let student = repo
            .find_student("buyer@example.com", "p1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(repo.count_enrollments_for_student(&student.id).await.unwrap(), 1);
        assert_eq!(repo.list_commissions_for_sale("s1").await.unwrap().len(), 1);
    });
}
