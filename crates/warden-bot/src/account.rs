//! Paper account.
//!
//! Tracks equity, peak-to-trough drawdown, daily PnL and the loss streak for
//! the replay loop, and turns them into a `RiskContext` each cycle.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use warden_core::{Direction, RiskContext, WitnessHealth};

// ============================================================================
// Trades
// ============================================================================

/// An open paper position.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenTrade {
    /// Witness whose claim opened the trade.
    pub witness_id: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    /// Notional at entry, in account currency.
    pub notional: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl OpenTrade {
    /// Profit or loss if closed at `price`.
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        let change = (price - self.entry_price) / self.entry_price;
        match self.direction {
            Direction::Long => self.notional * change,
            Direction::Short => -self.notional * change,
        }
    }
}

/// A closed paper position.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub witness_id: String,
    pub pnl: Decimal,
    pub is_win: bool,
}

// ============================================================================
// PaperAccount
// ============================================================================

#[derive(Debug, Clone)]
pub struct PaperAccount {
    initial_equity: Decimal,
    equity: Decimal,
    peak_equity: Decimal,
    daily_pnl: Decimal,
    day: Option<NaiveDate>,
    consecutive_losses: u32,
    open: Option<OpenTrade>,
}

impl PaperAccount {
    pub fn new(initial_equity: Decimal) -> Self {
        Self {
            initial_equity,
            equity: initial_equity,
            peak_equity: initial_equity,
            daily_pnl: Decimal::ZERO,
            day: None,
            consecutive_losses: 0,
            open: None,
        }
    }

    pub fn equity(&self) -> Decimal {
        self.equity
    }

    pub fn daily_pnl(&self) -> Decimal {
        self.daily_pnl
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.consecutive_losses
    }

    pub fn open_trade(&self) -> Option<&OpenTrade> {
        self.open.as_ref()
    }

    /// Reset daily PnL when `now` falls on a new UTC day.
    pub fn roll_day(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if self.day != Some(today) {
            self.day = Some(today);
            self.daily_pnl = Decimal::ZERO;
        }
    }

    /// Open a position sized as `fraction` of current equity. Ignored when a
    /// position is already open.
    pub fn open(
        &mut self,
        witness_id: &str,
        direction: Direction,
        price: Decimal,
        fraction: Decimal,
        now: DateTime<Utc>,
    ) -> Option<&OpenTrade> {
        if self.open.is_some() {
            return None;
        }
        self.open = Some(OpenTrade {
            witness_id: witness_id.to_string(),
            direction,
            entry_price: price,
            notional: self.equity * fraction,
            opened_at: now,
        });
        self.open.as_ref()
    }

    /// Close the open position at `price` and book the result.
    pub fn close(&mut self, price: Decimal) -> Option<ClosedTrade> {
        let trade = self.open.take()?;
        let pnl = trade.pnl_at(price);

        self.equity = (self.equity + pnl).max(Decimal::ZERO);
        self.peak_equity = self.peak_equity.max(self.equity);
        self.daily_pnl += pnl;
        let is_win = pnl > Decimal::ZERO;
        if is_win {
            self.consecutive_losses = 0;
        } else {
            self.consecutive_losses += 1;
        }

        Some(ClosedTrade {
            witness_id: trade.witness_id,
            pnl,
            is_win,
        })
    }

    /// Equity including the open position marked at `price`.
    pub fn marked_equity(&self, price: Decimal) -> Decimal {
        let unrealized = self
            .open
            .as_ref()
            .map(|t| t.pnl_at(price))
            .unwrap_or(Decimal::ZERO);
        (self.equity + unrealized).max(Decimal::ZERO)
    }

    /// Risk context for a cycle marked at `price`.
    ///
    /// Drawdown is measured from the equity peak, not from initial equity.
    pub fn risk_context(
        &self,
        price: Decimal,
        requested_position: Decimal,
        health: Vec<WitnessHealth>,
    ) -> warden_core::Result<RiskContext> {
        let equity = self.marked_equity(price);
        let peak = self.peak_equity.max(equity);
        let drawdown = if peak.is_zero() {
            Decimal::ONE
        } else {
            (peak - equity) / peak
        };
        let unrealized = equity - self.equity;

        RiskContext::new(equity, self.initial_equity)?
            .with_drawdown(drawdown)?
            .with_daily_pnl(self.daily_pnl + unrealized)
            .with_consecutive_losses(self.consecutive_losses)
            .with_requested_position(requested_position)
            .map(|ctx| ctx.with_witness_health(health))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_long_and_short_pnl() {
        let mut account = PaperAccount::new(dec!(100000));
        account.open("m", Direction::Long, dec!(100), dec!(0.1), at(0));
        let closed = account.close(dec!(102)).unwrap();
        assert_eq!(closed.pnl, dec!(200));
        assert!(closed.is_win);

        account.open("m", Direction::Short, dec!(100), dec!(0.1), at(60));
        let closed = account.close(dec!(102)).unwrap();
        assert!(!closed.is_win);
        assert_eq!(account.consecutive_losses(), 1);
    }

    #[test]
    fn test_single_open_position() {
        let mut account = PaperAccount::new(dec!(1000));
        assert!(account.open("a", Direction::Long, dec!(10), dec!(0.1), at(0)).is_some());
        assert!(account.open("b", Direction::Long, dec!(10), dec!(0.1), at(1)).is_none());
        assert_eq!(account.open_trade().unwrap().witness_id, "a");
    }

    #[test]
    fn test_daily_pnl_rolls_over() {
        let mut account = PaperAccount::new(dec!(1000));
        account.roll_day(at(0));
        account.open("a", Direction::Long, dec!(10), dec!(0.5), at(0));
        account.close(dec!(9));
        assert_eq!(account.daily_pnl(), dec!(-50));

        account.roll_day(at(86_400));
        assert_eq!(account.daily_pnl(), Decimal::ZERO);
        assert_eq!(account.equity(), dec!(950));
    }

    #[test]
    fn test_risk_context_uses_peak_drawdown() {
        let mut account = PaperAccount::new(dec!(1000));
        account.open("a", Direction::Long, dec!(10), dec!(1), at(0));
        account.close(dec!(12)); // equity 1200, peak 1200
        account.open("a", Direction::Long, dec!(10), dec!(0.5), at(60));

        // marked: 1200 - 600 * 0.1 = 1140
        let ctx = account
            .risk_context(dec!(9), dec!(0.05), Vec::new())
            .unwrap();
        assert_eq!(ctx.equity(), dec!(1140));
        assert_eq!(ctx.drawdown(), dec!(0.05));
        assert_eq!(ctx.requested_position(), dec!(0.05));
    }
}
