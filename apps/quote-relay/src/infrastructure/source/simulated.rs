//! Simulated Quote Source
//!
//! Generates plausible prices around a fixed base per instrument: a slow
//! sine drift plus two Gaussian noise terms scaled by the instrument's
//! volatility. Used as the demo fallback and for local development.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;

use crate::application::ports::{ConnectError, FetchError, FetchStrategy, QuoteSession, QuoteSource};
use crate::domain::quote::now_secs;

/// Base price and volatility per normalized instrument name.
const INSTRUMENTS: &[(&str, f64, f64)] = &[
    // majors
    ("EURUSD", 1.0850, 0.0001),
    ("GBPUSD", 1.2750, 0.0002),
    ("USDJPY", 149.50, 0.01),
    ("AUDUSD", 0.6650, 0.0002),
    ("USDCAD", 1.3580, 0.0001),
    ("USDCHF", 0.9120, 0.0001),
    ("NZDUSD", 0.6120, 0.0002),
    // crosses
    ("EURGBP", 0.8510, 0.0001),
    ("EURJPY", 162.20, 0.01),
    ("GBPJPY", 190.60, 0.015),
    ("AUDJPY", 99.40, 0.01),
    ("EURAUD", 1.6310, 0.0002),
    ("EURCAD", 1.4730, 0.0002),
    ("EURCHF", 0.9890, 0.0001),
    ("GBPAUD", 1.9170, 0.0003),
    ("GBPCAD", 1.7310, 0.0002),
    ("GBPCHF", 1.1630, 0.0002),
    ("AUDCAD", 0.9030, 0.0001),
    ("AUDCHF", 0.6060, 0.0001),
    ("CADJPY", 110.10, 0.01),
    ("CHFJPY", 163.90, 0.01),
    ("NZDJPY", 91.50, 0.01),
    // exotics
    ("USDTRY", 32.150, 0.005),
    ("USDZAR", 18.650, 0.003),
    ("USDMXN", 17.050, 0.002),
    ("USDSGD", 1.3450, 0.0001),
    ("USDHKD", 7.8150, 0.0002),
    ("USDNOK", 10.620, 0.002),
    ("USDSEK", 10.450, 0.002),
    ("EURTRY", 34.880, 0.005),
    // metals and energy
    ("XAUUSD", 2035.50, 0.5),
    ("GOLD", 2035.50, 0.5),
    ("XAGUSD", 23.150, 0.01),
    ("SILVER", 23.150, 0.01),
    ("XPTUSD", 915.00, 0.3),
    ("USOUSD", 78.40, 0.05),
    ("USOIL", 78.40, 0.05),
    ("UKOUSD", 82.90, 0.05),
    ("UKOIL", 82.90, 0.05),
    // crypto
    ("BTCUSD", 43_250.0, 25.0),
    ("ETHUSD", 2_280.0, 2.0),
    ("LTCUSD", 72.50, 0.1),
    ("XRPUSD", 0.6150, 0.0005),
    ("BCHUSD", 245.00, 0.3),
    ("SOLUSD", 98.50, 0.15),
    ("ADAUSD", 0.5250, 0.0005),
];

/// Strip OTC markers so `EURUSD-OTC` and `EURUSD_otc` share a base price.
fn normalize(identifier: &str) -> String {
    let upper = identifier.to_ascii_uppercase();
    upper
        .strip_suffix("-OTC")
        .or_else(|| upper.strip_suffix("_OTC"))
        .unwrap_or(&upper)
        .to_string()
}

fn lookup(identifier: &str) -> Option<(f64, f64)> {
    let name = normalize(identifier);
    INSTRUMENTS
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|&(_, base, vol)| (base, vol))
}

/// Standard normal sample via Box-Muller.
fn gaussian<R: Rng>(rng: &mut R, std_dev: f64) -> f64 {
    let u1: f64 = rng.random_range(f64::EPSILON..1.0);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos() * std_dev
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Generate one price for `identifier` at time `t` (seconds).
///
/// JPY pairs are rounded to 2 decimals, everything else to 5.
#[must_use]
pub fn simulated_price(identifier: &str, t: f64) -> Option<f64> {
    let (base, vol) = lookup(identifier)?;
    let mut rng = rand::rng();

    let trend = (t * 0.01).sin() * vol * 5.0;
    let noise = gaussian(&mut rng, vol);
    let micro = gaussian(&mut rng, vol * 0.3);
    let decimals = if identifier.to_ascii_uppercase().contains("JPY") {
        2
    } else {
        5
    };

    Some(round_to(base + trend + noise + micro, decimals))
}

/// Quote source that always connects and serves generated prices.
#[derive(Debug, Clone, Default)]
pub struct SimulatedQuoteSource;

impl SimulatedQuoteSource {
    /// Create a simulated source.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl QuoteSource for SimulatedQuoteSource {
    fn name(&self) -> String {
        "simulated".to_string()
    }

    async fn connect(&self) -> Result<Arc<dyn QuoteSession>, ConnectError> {
        Ok(Arc::new(SimulatedSession))
    }
}

#[derive(Debug)]
struct SimulatedSession;

#[async_trait]
impl QuoteSession for SimulatedSession {
    async fn fetch_price(
        &self,
        identifier: &str,
        _strategy: FetchStrategy,
    ) -> Result<f64, FetchError> {
        simulated_price(identifier, now_secs())
            .ok_or_else(|| FetchError::SymbolUnavailable(identifier.to_string()))
    }
}
