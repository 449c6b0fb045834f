use rust_decimal::Decimal;
use serde::Serialize;

use crate::exchange::Exchange;
use crate::models::{AccountSnapshot, OpenOrder, Order, OrderAck, OrderType, Position, PositionSide, Side};
use crate::oracle::{PlanAction, TradePlan};
use crate::persistence::{LastTrade, TradeMemory, TradeResult};
use crate::risk::{normalize_price, position_size, RiskParams};

/// Prefix of notes reporting a position without a protective stop
pub const UNPROTECTED: &str = "UNPROTECTED";
/// Prefix of notes reporting an aborted action chain that left state to reconcile
pub const INCONSISTENT: &str = "INCONSISTENT";
/// Prefix of notes reporting a recommendation the core refused or repaired
pub const ANOMALY: &str = "ANOMALY";
/// Prefix of notes reporting an exchange rejection
pub const REJECTED: &str = "REJECTED";

/// Where the instrument stands relative to our orders.
///
/// Derived from exchange reads at the start of every cycle; the transient
/// `EntrySubmitted`, `ExitSubmitted` and `AdjustingStop` states only appear while an
/// action chain is in flight or when a limit entry is still resting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    NoPosition,
    EntrySubmitted,
    PositionOpenUnprotected,
    PositionOpenProtected,
    ExitSubmitted,
    AdjustingStop,
}

impl LifecycleState {
    pub fn derive(snapshot: &AccountSnapshot) -> Self {
        match (&snapshot.position, &snapshot.protective_order) {
            (Some(_), Some(_)) => Self::PositionOpenProtected,
            (Some(_), None) => Self::PositionOpenUnprotected,
            (None, _) if snapshot.pending_entries().next().is_some() => Self::EntrySubmitted,
            (None, _) => Self::NoPosition,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub symbol: String,
    pub risk: RiskParams,
    pub tick_size: f64,
}

/// What one pass of the state machine did
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleOutcome {
    pub initial_state: LifecycleState,
    pub final_state: LifecycleState,
    pub submitted: Vec<OrderAck>,
    pub cancelled: Vec<String>,
    pub notes: Vec<String>,
}

impl LifecycleOutcome {
    fn new(state: LifecycleState) -> Self {
        Self {
            initial_state: state,
            final_state: state,
            submitted: Vec::new(),
            cancelled: Vec::new(),
            notes: Vec::new(),
        }
    }

    fn transition(&mut self, to: LifecycleState) {
        if self.final_state != to {
            tracing::debug!("Lifecycle {:?} -> {:?}", self.final_state, to);
            self.final_state = to;
        }
    }

    fn note(&mut self, kind: &str, message: String) {
        match kind {
            UNPROTECTED | INCONSISTENT => tracing::error!("{}: {}", kind, message),
            ANOMALY | REJECTED => tracing::warn!("{}: {}", kind, message),
            _ => tracing::info!("{}: {}", kind, message),
        }
        self.notes.push(format!("{}: {}", kind, message));
    }

    pub fn is_degraded(&self) -> bool {
        self.notes
            .iter()
            .any(|n| n.starts_with(UNPROTECTED) || n.starts_with(INCONSISTENT))
    }
}

/// Drives entry, protective stop, exit and stop adjustment against the exchange.
///
/// Exchange calls are never retried inside a pass: the first failure ends the
/// action chain and the next cycle starts again from fresh reads.
pub struct OrderLifecycleManager<'a, E: Exchange + ?Sized> {
    exchange: &'a E,
    settings: &'a LifecycleSettings,
}

impl<'a, E: Exchange + ?Sized> OrderLifecycleManager<'a, E> {
    pub fn new(exchange: &'a E, settings: &'a LifecycleSettings) -> Self {
        Self { exchange, settings }
    }

    pub async fn execute(
        &self,
        plan: &TradePlan,
        snapshot: &AccountSnapshot,
        current_price: f64,
        memory: &mut TradeMemory,
    ) -> LifecycleOutcome {
        let mut outcome = LifecycleOutcome::new(LifecycleState::derive(snapshot));
        let mut protective = snapshot.protective_order.clone();

        if outcome.final_state == LifecycleState::PositionOpenUnprotected
            && plan.action() != PlanAction::ExitPosition
        {
            if let Some(position) = &snapshot.position {
                protective = self
                    .repair_stop(position, snapshot, current_price, &mut outcome)
                    .await;
            }
        }

        match plan {
            TradePlan::Hold { .. } => {}
            TradePlan::EnterLong {
                limit_price,
                rationale,
            } => {
                self.enter(PositionSide::Long, *limit_price, rationale, snapshot, current_price, memory, &mut outcome)
                    .await
            }
            TradePlan::EnterShort {
                limit_price,
                rationale,
            } => {
                self.enter(PositionSide::Short, *limit_price, rationale, snapshot, current_price, memory, &mut outcome)
                    .await
            }
            TradePlan::ExitPosition { rationale } => {
                self.exit(rationale, snapshot, protective.as_ref(), current_price, memory, &mut outcome)
                    .await
            }
            TradePlan::AdjustStop {
                stop_price,
                rationale,
            } => {
                self.adjust_stop(*stop_price, rationale, snapshot, protective.as_ref(), current_price, memory, &mut outcome)
                    .await
            }
        }

        outcome
    }

    /// Stop-limit order on `side` triggering at `trigger`, resting one tick beyond it
    fn stop_order(&self, side: Side, size: Decimal, trigger: f64) -> Order {
        let tick = self.settings.tick_size;
        let trigger = normalize_price(trigger, tick);
        let limit = match side {
            Side::Sell => trigger - tick,
            Side::Buy => trigger + tick,
        };
        Order::stop(&self.settings.symbol, side, size, trigger, normalize_price(limit, tick))
    }

    /// Protective stop `stop_loss_percent` away from `reference` in the adverse direction
    fn protective_stop(&self, direction: PositionSide, size: Decimal, reference: f64) -> Order {
        let offset = self.settings.risk.stop_loss_percent / 100.0;
        let trigger = match direction {
            PositionSide::Long => reference * (1.0 - offset),
            PositionSide::Short => reference * (1.0 + offset),
        };
        self.stop_order(direction.closing_side(), size, trigger)
    }

    async fn submit(&self, order: Order, outcome: &mut LifecycleOutcome) -> Result<(OrderAck, Order), String> {
        match self.exchange.submit_order(&order).await {
            Ok(ack) => {
                tracing::info!("✓ {:?} order {} {}", order.order_type, ack.order_id, ack.status);
                outcome.submitted.push(ack.clone());
                Ok((ack, order))
            }
            Err(e) => Err(e.to_string()),
        }
    }

    async fn cancel(&self, order_id: &str, outcome: &mut LifecycleOutcome) -> Result<(), String> {
        match self.exchange.cancel_order(order_id).await {
            Ok(ack) => {
                tracing::info!("✓ Cancelled {} ({})", ack.order_id, ack.status);
                outcome.cancelled.push(ack.order_id);
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    /// Whether a stop on `side` at `trigger` would fire at `current_price`
    fn through_market(side: Side, trigger: f64, current_price: f64) -> bool {
        match side {
            Side::Sell => trigger >= current_price,
            Side::Buy => trigger <= current_price,
        }
    }

    fn resting_stop(ack: &OrderAck, order: &Order) -> OpenOrder {
        OpenOrder {
            order_id: ack.order_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            order_type: OrderType::Stop,
            size: order.size,
            limit_price: order.limit_price,
            stop_price: order.stop_price,
        }
    }

    /// Place the stop a previous cycle failed to place.
    ///
    /// Nothing is submitted while a closing order already rests on the book (a
    /// triggered stop-limit leaves one behind) or when the stop level has already
    /// been crossed; the position stays flagged instead.
    async fn repair_stop(
        &self,
        position: &Position,
        snapshot: &AccountSnapshot,
        current_price: f64,
        outcome: &mut LifecycleOutcome,
    ) -> Option<OpenOrder> {
        let closing = position.side.closing_side();
        if let Some(resting) = snapshot.pending_entries().find(|o| o.side == closing) {
            outcome.note(
                INCONSISTENT,
                format!(
                    "closing {:?} order {} already resting at {:?}, stop not re-placed",
                    resting.order_type, resting.order_id, resting.limit_price
                ),
            );
            return None;
        }

        let stop = self.protective_stop(position.side, position.size, position.entry_price);
        let trigger = stop.stop_price.unwrap_or(position.entry_price);
        if Self::through_market(stop.side, trigger, current_price) {
            outcome.note(
                UNPROTECTED,
                format!(
                    "stop level {:.2} already crossed at {:.2}, position left without a stop",
                    trigger, current_price
                ),
            );
            return None;
        }

        match self.submit(stop, outcome).await {
            Ok((ack, order)) => {
                outcome.note(
                    "REPAIRED",
                    format!("placed missing protective stop at {:?}", order.stop_price),
                );
                outcome.transition(LifecycleState::PositionOpenProtected);
                Some(Self::resting_stop(&ack, &order))
            }
            Err(e) => {
                outcome.note(UNPROTECTED, format!("position still has no stop, repair failed: {}", e));
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn enter(
        &self,
        direction: PositionSide,
        limit_price: Option<f64>,
        rationale: &str,
        snapshot: &AccountSnapshot,
        current_price: f64,
        memory: &mut TradeMemory,
        outcome: &mut LifecycleOutcome,
    ) {
        let action = match direction {
            PositionSide::Long => PlanAction::EnterLong,
            PositionSide::Short => PlanAction::EnterShort,
        };

        if snapshot.has_open_position() {
            outcome.note(ANOMALY, format!("{:?} refused, a position is already open", action));
            return;
        }
        if let Some(pending) = snapshot.pending_entries().next() {
            outcome.note(
                ANOMALY,
                format!("{:?} refused, entry order {} is still pending", action, pending.order_id),
            );
            return;
        }

        for orphan in snapshot.stop_orders() {
            if let Err(e) = self.cancel(&orphan.order_id, outcome).await {
                outcome.note(
                    INCONSISTENT,
                    format!("entry skipped, could not cancel orphaned stop {}: {}", orphan.order_id, e),
                );
                return;
            }
        }

        let limit_price = limit_price.map(|p| normalize_price(p, self.settings.tick_size));
        let reference = limit_price.unwrap_or(current_price);
        let size = position_size(snapshot.available_margin, reference, &self.settings.risk);
        if size.is_zero() {
            outcome.note(
                "NO_TRADE",
                format!(
                    "{:?} skipped, no viable size for margin {:.2} at {:.2}",
                    action, snapshot.available_margin, reference
                ),
            );
            return;
        }

        let entry_side = match direction {
            PositionSide::Long => Side::Buy,
            PositionSide::Short => Side::Sell,
        };
        let entry = match limit_price {
            Some(price) => Order::limit(&self.settings.symbol, entry_side, size, price),
            None => Order::market(&self.settings.symbol, entry_side, size),
        };

        outcome.transition(LifecycleState::EntrySubmitted);
        let entry_price = match self.submit(entry, outcome).await {
            Ok((ack, _)) => ack.fill_price.unwrap_or(reference),
            Err(e) => {
                outcome.note(REJECTED, format!("{:?} entry rejected: {}", action, e));
                outcome.transition(LifecycleState::NoPosition);
                memory.last_trade = LastTrade {
                    action,
                    result: TradeResult::None,
                    rationale: format!("{} (entry rejected: {})", rationale, e),
                    entry_price: None,
                    exit_price: None,
                };
                return;
            }
        };

        outcome.transition(LifecycleState::PositionOpenUnprotected);
        memory.last_trade = LastTrade {
            action,
            result: TradeResult::Open,
            rationale: rationale.to_string(),
            entry_price: Some(entry_price),
            exit_price: None,
        };

        let stop = self.protective_stop(direction, size, entry_price);
        match self.submit(stop, outcome).await {
            Ok(_) => outcome.transition(LifecycleState::PositionOpenProtected),
            Err(e) => outcome.note(
                UNPROTECTED,
                format!("{:?} filled at {:.2} but the protective stop was rejected: {}", action, entry_price, e),
            ),
        }
    }

    async fn exit(
        &self,
        rationale: &str,
        snapshot: &AccountSnapshot,
        protective: Option<&OpenOrder>,
        current_price: f64,
        memory: &mut TradeMemory,
        outcome: &mut LifecycleOutcome,
    ) {
        // Resting non-stop orders go first: an unfilled limit entry, or the closing
        // limit a triggered stop left behind
        for resting in snapshot.pending_entries() {
            if let Err(e) = self.cancel(&resting.order_id, outcome).await {
                outcome.note(
                    INCONSISTENT,
                    format!("exit aborted, could not cancel resting order {}: {}", resting.order_id, e),
                );
                return;
            }
        }

        let Some(position) = &snapshot.position else {
            if outcome.cancelled.is_empty() {
                tracing::info!("EXIT_POSITION with no open position, nothing to do");
            }
            outcome.transition(LifecycleState::NoPosition);
            return;
        };

        outcome.transition(LifecycleState::ExitSubmitted);
        if let Some(stop) = protective {
            if let Err(e) = self.cancel(&stop.order_id, outcome).await {
                outcome.note(
                    INCONSISTENT,
                    format!("exit aborted, could not cancel stop {}: {}", stop.order_id, e),
                );
                outcome.transition(LifecycleState::PositionOpenProtected);
                return;
            }
        }

        let close = Order::market(&self.settings.symbol, position.side.closing_side(), position.size);
        match self.submit(close, outcome).await {
            Ok((ack, _)) => {
                let exit_price = ack.fill_price.unwrap_or(current_price);
                outcome.transition(LifecycleState::NoPosition);
                memory.last_trade = LastTrade {
                    action: PlanAction::ExitPosition,
                    result: TradeResult::Closed,
                    rationale: rationale.to_string(),
                    entry_price: Some(position.entry_price),
                    exit_price: Some(exit_price),
                };
            }
            Err(e) => {
                outcome.note(REJECTED, format!("exit order rejected: {}", e));
                outcome.transition(LifecycleState::PositionOpenUnprotected);
                if let Some(stop) = protective {
                    self.restore_stop(stop, outcome).await;
                } else {
                    outcome.note(UNPROTECTED, "position remains open without a stop".to_string());
                }
            }
        }
    }

    /// Put back a stop that was cancelled for an action that then failed
    async fn restore_stop(&self, previous: &OpenOrder, outcome: &mut LifecycleOutcome) {
        let Some(trigger) = previous.stop_price else {
            outcome.note(UNPROTECTED, format!("cancelled stop {} had no trigger to restore", previous.order_id));
            return;
        };
        let stop = self.stop_order(previous.side, previous.size, trigger);
        match self.submit(stop, outcome).await {
            Ok(_) => outcome.transition(LifecycleState::PositionOpenProtected),
            Err(e) => outcome.note(UNPROTECTED, format!("could not restore stop at {:.2}: {}", trigger, e)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn adjust_stop(
        &self,
        stop_price: Option<f64>,
        rationale: &str,
        snapshot: &AccountSnapshot,
        protective: Option<&OpenOrder>,
        current_price: f64,
        memory: &mut TradeMemory,
        outcome: &mut LifecycleOutcome,
    ) {
        let (Some(position), Some(stop)) = (&snapshot.position, protective) else {
            tracing::info!("ADJUST_STOP with no protected position, nothing to do");
            return;
        };
        let Some(requested) = stop_price else {
            outcome.note(ANOMALY, "ADJUST_STOP without a stop price ignored".to_string());
            return;
        };

        let replacement = self.stop_order(stop.side, stop.size, requested);
        let trigger = replacement.stop_price.unwrap_or(requested);
        if Self::through_market(stop.side, trigger, current_price) {
            outcome.note(
                ANOMALY,
                format!("ADJUST_STOP to {:.2} ignored, it is through the market at {:.2}", trigger, current_price),
            );
            return;
        }

        outcome.transition(LifecycleState::AdjustingStop);
        if let Err(e) = self.cancel(&stop.order_id, outcome).await {
            outcome.note(
                INCONSISTENT,
                format!("stop adjustment aborted, could not cancel stop {}: {}", stop.order_id, e),
            );
            outcome.transition(LifecycleState::PositionOpenProtected);
            return;
        }

        match self.submit(replacement, outcome).await {
            Ok(_) => {
                outcome.transition(LifecycleState::PositionOpenProtected);
                outcome.note(
                    "STOP_MOVED",
                    format!("stop moved from {:?} to {:.2}", stop.stop_price, trigger),
                );
                memory.last_trade = LastTrade {
                    action: PlanAction::AdjustStop,
                    result: TradeResult::Open,
                    rationale: rationale.to_string(),
                    entry_price: Some(position.entry_price),
                    exit_price: None,
                };
            }
            Err(e) => {
                outcome.transition(LifecycleState::PositionOpenUnprotected);
                outcome.note(
                    UNPROTECTED,
                    format!("old stop cancelled but replacement at {:.2} was rejected: {}", trigger, e),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(side: PositionSide) -> Position {
        Position {
            symbol: "PF_XBTUSD".to_string(),
            side,
            size: dec!(0.01),
            entry_price: 50_000.0,
        }
    }

    fn order(order_type: OrderType, side: Side) -> OpenOrder {
        OpenOrder {
            order_id: "o-1".to_string(),
            symbol: "PF_XBTUSD".to_string(),
            side,
            order_type,
            size: dec!(0.01),
            limit_price: Some(49_000.0),
            stop_price: None,
        }
    }

    #[test]
    fn test_state_derivation() {
        let flat = AccountSnapshot::from_reads("PF_XBTUSD", 1000.0, vec![], vec![]);
        assert_eq!(LifecycleState::derive(&flat), LifecycleState::NoPosition);

        let resting = AccountSnapshot::from_reads(
            "PF_XBTUSD",
            1000.0,
            vec![],
            vec![order(OrderType::Limit, Side::Buy)],
        );
        assert_eq!(LifecycleState::derive(&resting), LifecycleState::EntrySubmitted);

        let orphan_stop = AccountSnapshot::from_reads(
            "PF_XBTUSD",
            1000.0,
            vec![],
            vec![order(OrderType::Stop, Side::Sell)],
        );
        assert_eq!(LifecycleState::derive(&orphan_stop), LifecycleState::NoPosition);

        let naked = AccountSnapshot::from_reads("PF_XBTUSD", 1000.0, vec![position(PositionSide::Long)], vec![]);
        assert_eq!(LifecycleState::derive(&naked), LifecycleState::PositionOpenUnprotected);

        let protected = AccountSnapshot::from_reads(
            "PF_XBTUSD",
            1000.0,
            vec![position(PositionSide::Short)],
            vec![order(OrderType::Stop, Side::Buy)],
        );
        assert_eq!(LifecycleState::derive(&protected), LifecycleState::PositionOpenProtected);
    }

    #[test]
    fn test_degraded_detection() {
        let mut outcome = LifecycleOutcome::new(LifecycleState::NoPosition);
        outcome.note(ANOMALY, "entry refused".to_string());
        assert!(!outcome.is_degraded());
        outcome.note(UNPROTECTED, "stop rejected".to_string());
        assert!(outcome.is_degraded());
    }
}
