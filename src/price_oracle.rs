//! # Price Oracle
//!
//! USD price resolution against the Binance spot ticker, with a stablecoin
//! short-circuit and a bounded retry budget. Wrapped-token prefixes are
//! stripped before the symbol hits the wire (`WETH` quotes as `ETH`).

use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::PriceError;
use crate::tokens::TokenSymbol;

const RETRY_ATTEMPTS: u32 = 5;
const RETRY_PAUSE: std::time::Duration = std::time::Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct TickerPayload {
    price: String,
}

#[derive(Debug, Clone)]
pub struct PriceOracle {
    http: reqwest::Client,
    base_url: String,
}

impl Default for PriceOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceOracle {
    pub fn new() -> Self {
        Self::with_base_url("https://api.binance.com".to_string())
    }

    /// Test seam: points the oracle at a different ticker host.
    pub fn with_base_url(base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self { http, base_url }
    }

    /// USD price of `symbol`. Stablecoins resolve to 1.0 without I/O.
    pub async fn usd_price(&self, symbol: TokenSymbol) -> Result<f64, PriceError> {
        if symbol.is_stable() {
            return Ok(1.0);
        }
        let ticker = symbol.ticker();

        // Direct pair first, inverse pair as fallback (inverted).
        match self.spot(&format!("{ticker}USDT")).await {
            Ok(price) => return Ok(price),
            Err(e) => {
                debug!(target: "price", symbol = ticker, error = %e, "direct pair failed; trying inverse");
            }
        }
        match self.spot(&format!("USDT{ticker}")).await {
            Ok(price) if price > 0.0 => Ok(1.0 / price),
            _ => Err(PriceError::PriceUnavailable {
                symbol: ticker.to_string(),
                attempts: RETRY_ATTEMPTS * 2,
            }),
        }
    }

    /// `price(from) / price(to)`.
    pub async fn price_ratio(
        &self,
        from: TokenSymbol,
        to: TokenSymbol,
    ) -> Result<f64, PriceError> {
        let from_price = self.usd_price(from).await?;
        let to_price = self.usd_price(to).await?;
        if to_price <= 0.0 {
            return Err(PriceError::BadPayload(format!(
                "non-positive price for {to}"
            )));
        }
        Ok(from_price / to_price)
    }

    async fn spot(&self, pair: &str) -> Result<f64, PriceError> {
        let url = format!("{}/api/v3/ticker/price?symbol={pair}", self.base_url);
        let mut last_err = None;
        for attempt in 1..=RETRY_ATTEMPTS {
            match self.fetch(&url).await {
                Ok(price) => return Ok(price),
                Err(e) => {
                    warn!(
                        target: "price",
                        pair,
                        attempt,
                        error = %e,
                        "ticker fetch failed"
                    );
                    last_err = Some(e);
                    if attempt < RETRY_ATTEMPTS {
                        tokio::time::sleep(RETRY_PAUSE).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or(PriceError::PriceUnavailable {
            symbol: pair.to_string(),
            attempts: RETRY_ATTEMPTS,
        }))
    }

    async fn fetch(&self, url: &str) -> Result<f64, PriceError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| PriceError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| PriceError::Http(e.to_string()))?;
        let payload: TickerPayload = resp
            .json()
            .await
            .map_err(|e| PriceError::BadPayload(e.to_string()))?;
        payload
            .price
            .parse::<f64>()
            .map_err(|e| PriceError::BadPayload(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stablecoins_short_circuit_without_io() {
        // Unroutable base URL: any network attempt would error immediately.
        let oracle = PriceOracle::with_base_url("http://127.0.0.1:1".to_string());
        for symbol in [
            TokenSymbol::Usdt,
            TokenSymbol::Usdc,
            TokenSymbol::UsdcE,
            TokenSymbol::Usdv,
        ] {
            assert_eq!(oracle.usd_price(symbol).await.unwrap(), 1.0);
        }
    }

    #[tokio::test]
    async fn stable_ratio_is_unity() {
        let oracle = PriceOracle::with_base_url("http://127.0.0.1:1".to_string());
        let ratio = oracle
            .price_ratio(TokenSymbol::Usdc, TokenSymbol::Usdt)
            .await
            .unwrap();
        assert_eq!(ratio, 1.0);
    }
}
