use crate::domain::{Decimal, PaymentMethod};
use crate::engine::{FeeRate, FeeSchedule};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub dispatch_url: Option<String>,
    pub fees: FeeSchedule,
    pub anticipation: AnticipationConfig,
    pub withdrawal: WithdrawalConfig,
    pub otp: OtpConfig,
}

/// Server-side anticipation terms. Clients never supply these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnticipationConfig {
    pub fee_percentage: Decimal,
    pub min_amount: Decimal,
}

impl Default for AnticipationConfig {
    fn default() -> Self {
        Self {
            fee_percentage: Decimal::from_parts(155, 1),
            min_amount: Decimal::from(50),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalConfig {
    pub fee: FeeRate,
    pub min_amount: Decimal,
    pub auto_approve: bool,
    pub cooldown_minutes: i64,
}

impl Default for WithdrawalConfig {
    fn default() -> Self {
        Self {
            fee: FeeRate::new(Decimal::zero(), Decimal::from_parts(490, 2)),
            min_amount: Decimal::from(10),
            auto_approve: false,
            cooldown_minutes: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpConfig {
    pub ttl_minutes: i64,
    pub max_attempts: i64,
    pub requests_per_window: i64,
    pub window_minutes: i64,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: 10,
            max_attempts: 5,
            requests_per_window: 3,
            window_minutes: 10,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let dispatch_url = env_map
            .get("DISPATCH_URL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let defaults = FeeSchedule::default();
        let fees = FeeSchedule {
            pix: fee_rate(&env_map, PaymentMethod::Pix, defaults.pix)?,
            credit_card: fee_rate(&env_map, PaymentMethod::CreditCard, defaults.credit_card)?,
            debit_card: fee_rate(&env_map, PaymentMethod::DebitCard, defaults.debit_card)?,
            boleto: fee_rate(&env_map, PaymentMethod::Boleto, defaults.boleto)?,
            platform_percentage: percentage(
                &env_map,
                "PLATFORM_FEE_PERCENT",
                defaults.platform_percentage,
            )?,
        };

        let anticipation_defaults = AnticipationConfig::default();
        let anticipation = AnticipationConfig {
            fee_percentage: percentage(
                &env_map,
                "ANTICIPATION_FEE_PERCENT",
                anticipation_defaults.fee_percentage,
            )?,
            min_amount: amount(
                &env_map,
                "ANTICIPATION_MIN_AMOUNT",
                anticipation_defaults.min_amount,
            )?,
        };

        let withdrawal_defaults = WithdrawalConfig::default();
        let withdrawal = WithdrawalConfig {
            fee: FeeRate::new(
                percentage(
                    &env_map,
                    "WITHDRAWAL_FEE_PERCENT",
                    withdrawal_defaults.fee.percentage,
                )?,
                amount(
                    &env_map,
                    "WITHDRAWAL_FIXED_FEE",
                    withdrawal_defaults.fee.flat_fee,
                )?,
            ),
            min_amount: amount(
                &env_map,
                "WITHDRAWAL_MIN_AMOUNT",
                withdrawal_defaults.min_amount,
            )?,
            auto_approve: flag(
                &env_map,
                "WITHDRAWAL_AUTO_APPROVE",
                withdrawal_defaults.auto_approve,
            )?,
            cooldown_minutes: minutes(
                &env_map,
                "WITHDRAWAL_COOLDOWN_MINUTES",
                withdrawal_defaults.cooldown_minutes,
            )?,
        };

        let otp_defaults = OtpConfig::default();
        let otp = OtpConfig {
            ttl_minutes: minutes(&env_map, "OTP_TTL_MINUTES", otp_defaults.ttl_minutes)?,
            max_attempts: count(&env_map, "OTP_MAX_ATTEMPTS", otp_defaults.max_attempts)?,
            requests_per_window: count(
                &env_map,
                "OTP_REQUESTS_PER_WINDOW",
                otp_defaults.requests_per_window,
            )?,
            window_minutes: minutes(&env_map, "OTP_WINDOW_MINUTES", otp_defaults.window_minutes)?,
        };

        Ok(Config {
            port,
            database_path,
            dispatch_url,
            fees,
            anticipation,
            withdrawal,
            otp,
        })
    }
}

fn fee_rate(
    env_map: &HashMap<String, String>,
    method: PaymentMethod,
    default: FeeRate,
) -> Result<FeeRate, ConfigError> {
    let prefix = format!("FEE_{}", method.as_str().to_uppercase());
    Ok(FeeRate::new(
        percentage(env_map, &format!("{}_PERCENT", prefix), default.percentage)?,
        amount(env_map, &format!("{}_FIXED", prefix), default.flat_fee)?,
    ))
}

fn decimal(
    env_map: &HashMap<String, String>,
    key: &str,
    default: Decimal,
) -> Result<Decimal, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => Decimal::from_str_canonical(raw).map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), format!("not a decimal: {}", raw))
        }),
    }
}

/// Decimal in `[0, 100]`.
fn percentage(
    env_map: &HashMap<String, String>,
    key: &str,
    default: Decimal,
) -> Result<Decimal, ConfigError> {
    let value = decimal(env_map, key, default)?;
    if value.is_negative() || value > Decimal::hundred() {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be within [0, 100]".to_string(),
        ));
    }
    Ok(value)
}

/// Non-negative decimal.
fn amount(
    env_map: &HashMap<String, String>,
    key: &str,
    default: Decimal,
) -> Result<Decimal, ConfigError> {
    let value = decimal(env_map, key, default)?;
    if value.is_negative() {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must not be negative".to_string(),
        ));
    }
    Ok(value)
}

fn flag(env_map: &HashMap<String, String>, key: &str, default: bool) -> Result<bool, ConfigError> {
    match env_map.get(key).map(|s| s.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(ConfigError::InvalidValue(
                key.to_string(),
                format!("must be true or false, got {}", other),
            )),
        },
    }
}

fn positive_int(
    env_map: &HashMap<String, String>,
    key: &str,
    default: i64,
    unit: &str,
) -> Result<i64, ConfigError> {
    let value = match env_map.get(key) {
        None => default,
        Some(raw) => raw.trim().parse::<i64>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), format!("must be a whole number of {}", unit))
        })?,
    };
    if value <= 0 {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be positive".to_string(),
        ));
    }
    Ok(value)
}

fn minutes(env_map: &HashMap<String, String>, key: &str, default: i64) -> Result<i64, ConfigError> {
    positive_int(env_map, key, default, "minutes")
}

fn count(env_map: &HashMap<String, String>, key: &str, default: i64) -> Result<i64, ConfigError> {
    positive_int(env_map, key, default, "attempts")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.dispatch_url.is_none());
        assert_eq!(config.fees, FeeSchedule::default());
        assert_eq!(config.fees.pix.percentage, d("4.99"));
        assert_eq!(config.anticipation.fee_percentage, d("15.5"));
        assert_eq!(config.anticipation.min_amount, d("50"));
        assert_eq!(config.withdrawal.fee.flat_fee, d("4.90"));
        assert_eq!(config.withdrawal.cooldown_minutes, 15);
        assert!(!config.withdrawal.auto_approve);
        assert_eq!(config.otp, OtpConfig::default());
    }

    #[test]
    fn test_missing_database_path() {
        let result = Config::from_env_map(HashMap::new());
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_fee_overrides_per_method() {
        let mut env_map = setup_required_env();
        env_map.insert("FEE_CREDIT_CARD_PERCENT".to_string(), "5".to_string());
        env_map.insert("FEE_CREDIT_CARD_FIXED".to_string(), "0.99".to_string());
        env_map.insert("PLATFORM_FEE_PERCENT".to_string(), "1.5".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.fees.credit_card, FeeRate::new(d("5"), d("0.99")));
        assert_eq!(config.fees.platform_percentage, d("1.5"));
        assert_eq!(config.fees.pix, FeeSchedule::default().pix);
    }

    #[test]
    fn test_percentage_out_of_range() {
        let mut env_map = setup_required_env();
        env_map.insert("ANTICIPATION_FEE_PERCENT".to_string(), "120".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "ANTICIPATION_FEE_PERCENT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_auto_approve_flag() {
        let mut env_map = setup_required_env();
        env_map.insert("WITHDRAWAL_AUTO_APPROVE".to_string(), "maybe".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "WITHDRAWAL_AUTO_APPROVE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_zero_cooldown_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("WITHDRAWAL_COOLDOWN_MINUTES".to_string(), "0".to_string());
        assert!(Config::from_env_map(env_map).is_err());
    }
}
