use alloy_primitives::U256;
use alloy_primitives::utils::format_units;

/// Token amount in whole units as a float, for display-grade arithmetic only.
pub fn to_token_units(value: U256, decimals: u8) -> f64 {
    format_units(value, decimals)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}

pub fn share_percent(balance: f64, total_supply: f64) -> f64 {
    if total_supply == 0.0 {
        return 0.0;
    }
    balance / total_supply * 100.0
}

pub fn share_value(balance: f64, total_supply: f64, treasury_value: f64) -> f64 {
    if total_supply == 0.0 {
        return 0.0;
    }
    treasury_value * (balance / total_supply)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuyInTerms {
    /// Tokens received per 1 ETH.
    pub rate: f64,
    /// USD price of 1 ETH at buy-in.
    pub eth_price: f64,
}

impl BuyInTerms {
    pub fn eth_paid(&self, tokens: f64) -> f64 {
        if self.rate == 0.0 {
            return 0.0;
        }
        tokens / self.rate
    }

    pub fn usd_paid(&self, tokens: f64) -> f64 {
        self.eth_paid(tokens) * self.eth_price
    }
}

pub fn change_percent(current_value: f64, buy_in_value: f64) -> f64 {
    if buy_in_value == 0.0 {
        return 0.0;
    }
    (current_value - buy_in_value) / buy_in_value * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_token_units() {
        let value = U256::from(1_500_000_000_000_000_000u128);
        assert_eq!(to_token_units(value, 18), 1.5);
        assert_eq!(to_token_units(U256::from(250u64), 0), 250.0);
    }

    #[test]
    fn test_share_math() {
        assert_eq!(share_percent(5_000_000.0, 20_000_000.0), 25.0);
        assert_eq!(share_percent(1.0, 0.0), 0.0);
        assert_eq!(share_value(5_000_000.0, 20_000_000.0, 400_000.0), 100_000.0);
        assert_eq!(share_value(1.0, 0.0, 400_000.0), 0.0);
    }

    #[test]
    fn test_buy_in_terms() {
        let terms = BuyInTerms {
            rate: 1_000_000.0,
            eth_price: 2600.0,
        };
        assert_eq!(terms.eth_paid(2_000_000.0), 2.0);
        assert_eq!(terms.usd_paid(2_000_000.0), 5200.0);
    }

    #[test]
    fn test_change_percent() {
        assert_eq!(change_percent(150.0, 100.0), 50.0);
        assert_eq!(change_percent(50.0, 100.0), -50.0);
        assert_eq!(change_percent(10.0, 0.0), 0.0);
    }
}
