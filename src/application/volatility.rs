use statrs::statistics::{Data, Distribution};

/// Realized volatility over a candle window, as a percentage.
///
/// Standard deviation of log returns across the window, scaled to percent
/// of price. Computed once per cycle from the snapshot's candles; the
/// volatility guard and the sizer both consume this same value, so their
/// thresholds are always expressed against the same window.
pub fn realized_volatility_pct(prices: &[f64]) -> Option<f64> {
    if prices.len() < 2 {
        return None;
    }

    let returns: Vec<f64> = prices
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect();

    if returns.is_empty() {
        return None;
    }

    let data = Data::new(returns);
    data.std_dev().map(|sd| sd * 100.0)
}
