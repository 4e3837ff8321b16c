pub mod api;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::Config;
pub use db::{init_db, Repository};
pub use dispatch::{EventSink, OutboundEvent};
pub use domain::{Decimal, PaymentMethod, Sale, SaleStatus, TimeMs};
pub use error::AppError;
