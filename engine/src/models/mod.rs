//! Domain value types: orders, message payloads, holdings, log records.
//!
//! CRITICAL: all money values are i64 cents. Floating point may appear only
//! in stochastic-model internals and is rounded explicitly at every boundary
//! back into cents.

pub mod event;
pub mod holdings;
pub mod message;
pub mod order;

pub use event::{AgentLog, LoggedEvent};
pub use holdings::Holdings;
pub use message::{MarketMsg, Message};
pub use order::{Order, Side, Symbol};

/// Render an integer-cents amount as dollars for logs and displays.
///
/// # Example
/// ```
/// use market_simulator_core_rs::models::dollarize;
///
/// assert_eq!(dollarize(1_000_000), "$10000.00");
/// assert_eq!(dollarize(-150), "$-1.50");
/// ```
pub fn dollarize(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    format!("${}{}.{:02}", sign, cents / 100, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dollarize() {
        assert_eq!(dollarize(0), "$0.00");
        assert_eq!(dollarize(9), "$0.09");
        assert_eq!(dollarize(10_150), "$101.50");
        assert_eq!(dollarize(-50), "$-0.50");
    }
}
