//! Domain types for the settlement pipeline.
//!
//! This module provides:
//! - Lossless numeric handling via Decimal wrapper with 2dp half-up rounding
//! - Primitives: TimeMs, PaymentMethod, row identifiers
//! - Sale, commission, enrollment, withdrawal and coupon records

pub mod commission;
pub mod coupon;
pub mod decimal;
pub mod enrollment;
pub mod primitives;
pub mod sale;
pub mod withdrawal;

pub use commission::{
    AnticipationDebt, AnticipationItem, Commission, CommissionAnticipation, CommissionRole,
    CommissionStatus, DebtStatus, LedgerEntry, LedgerEntryKind, NewCommission,
};
pub use coupon::{Coupon, DiscountType};
pub use decimal::Decimal;
pub use enrollment::{Course, Enrollment, EnrollmentStatus, Student, StudentStatus};
pub use primitives::{new_id, PaymentMethod, TimeMs, UnknownPaymentMethod};
pub use sale::{CoProducer, CoProducerStatus, Product, Sale, SaleStatus};
pub use withdrawal::{BankAccount, BankAccountStatus, Withdrawal, WithdrawalOtp, WithdrawalStatus};
