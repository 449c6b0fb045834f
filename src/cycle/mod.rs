// One decision cycle: read, ask the oracle, act, remember
use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;
use uuid::Uuid;

use crate::error::{ExchangeError, OracleError};
use crate::exchange::Exchange;
use crate::execution::{LifecycleOutcome, LifecycleSettings, OrderLifecycleManager, ANOMALY};
use crate::indicators::Indicators;
use crate::models::AccountSnapshot;
use crate::oracle::{parse_recommendation, MarketContext, Oracle, ParsedRecommendation, PlanAction, TradePlan};
use crate::persistence::{MemoryStore, TradeMemory};
use crate::settings::AppConfig;

/// Prefix of notes reporting that the cycle could not act at all
pub const NO_ACTION: &str = "NO_ACTION";

#[derive(Debug, Clone)]
pub struct CycleOptions {
    pub trading_symbol: String,
    pub pricing_symbol: String,
    pub candle_interval_minutes: u32,
    pub oracle_timeout: Duration,
    pub lifecycle: LifecycleSettings,
}

impl CycleOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            trading_symbol: config.exchange.trading_symbol.clone(),
            pricing_symbol: config.exchange.pricing_symbol.clone(),
            candle_interval_minutes: config.exchange.candle_interval_minutes,
            oracle_timeout: Duration::from_secs(config.oracle.timeout_secs),
            lifecycle: LifecycleSettings {
                symbol: config.exchange.trading_symbol.clone(),
                risk: config.risk.clone(),
                tick_size: config.exchange.tick_size,
            },
        }
    }
}

/// Summary of a finished cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub id: Uuid,
    pub action: PlanAction,
    /// None when the cycle stopped before reaching the lifecycle manager
    pub outcome: Option<LifecycleOutcome>,
    pub notes: Vec<String>,
    pub memory_saved: bool,
}

impl CycleReport {
    pub fn is_degraded(&self) -> bool {
        self.outcome.as_ref().is_some_and(|o| o.is_degraded())
    }
}

pub struct TradingCycle {
    exchange: Arc<dyn Exchange>,
    oracle: Arc<dyn Oracle>,
    store: MemoryStore,
    options: CycleOptions,
}

impl TradingCycle {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        oracle: Arc<dyn Oracle>,
        store: MemoryStore,
        options: CycleOptions,
    ) -> Self {
        Self {
            exchange,
            oracle,
            store,
            options,
        }
    }

    /// Run exactly one cycle. Failures end up in the report, never as an error.
    pub async fn run_once(&self) -> CycleReport {
        let id = Uuid::new_v4();
        self.run(id)
            .instrument(tracing::info_span!("cycle", id = %id))
            .await
    }

    async fn run(&self, id: Uuid) -> CycleReport {
        tracing::info!("🔄 Cycle starting for {}", self.options.trading_symbol);

        let mut notes = Vec::new();
        let mut memory = match self.store.load().await {
            Ok(memory) => memory,
            Err(e) => {
                tracing::warn!("Trade memory unreadable ({}), continuing from empty memory", e);
                TradeMemory::default()
            }
        };

        let (margin, positions, orders, candles) = tokio::join!(
            self.exchange.fetch_available_margin(),
            self.exchange.fetch_positions(),
            self.exchange.fetch_open_orders(),
            self.exchange
                .fetch_candles(&self.options.pricing_symbol, self.options.candle_interval_minutes),
        );

        let reads = (|| -> Result<_, ExchangeError> { Ok((margin?, positions?, orders?, candles?)) })();
        let (margin, positions, orders, candles) = match reads {
            Ok(reads) => reads,
            Err(e) => {
                notes.push(format!("{}: exchange read failed: {}", NO_ACTION, e));
                return self.finish(id, PlanAction::Hold, None, None, notes, memory).await;
            }
        };

        let Some(indicators) = Indicators::from_candles(&candles) else {
            notes.push(format!(
                "{}: no candles returned for {}",
                NO_ACTION, self.options.pricing_symbol
            ));
            return self.finish(id, PlanAction::Hold, None, None, notes, memory).await;
        };
        let current_price = indicators.last_price;
        tracing::info!(
            "📊 {} price {:.2}, RSI {:?}, SMA {:?}",
            self.options.pricing_symbol,
            current_price,
            indicators.rsi,
            indicators.sma
        );

        let snapshot = AccountSnapshot::from_reads(&self.options.trading_symbol, margin, positions, orders);
        let context = MarketContext::new(
            &self.options.trading_symbol,
            &self.options.pricing_symbol,
            indicators,
            &candles,
            &snapshot,
            &memory,
        );

        let recommendation = self.consult_oracle(&context).await;
        if let Some(anomaly) = &recommendation.anomaly {
            notes.push(format!("{}: {}", ANOMALY, anomaly));
        }
        let plan = recommendation.plan;
        tracing::info!("🧭 Plan {:?}: {}", plan.action(), plan.rationale());

        let manager = OrderLifecycleManager::new(self.exchange.as_ref(), &self.options.lifecycle);
        let outcome = manager
            .execute(&plan, &snapshot, current_price, &mut memory)
            .await;
        notes.extend(outcome.notes.iter().cloned());
        tracing::info!(
            "Lifecycle {:?} -> {:?} ({} submitted, {} cancelled)",
            outcome.initial_state,
            outcome.final_state,
            outcome.submitted.len(),
            outcome.cancelled.len()
        );

        self.finish(id, plan.action(), Some(outcome), recommendation.notes, notes, memory)
            .await
    }

    /// Ask the oracle under the configured timeout; any failure becomes HOLD
    async fn consult_oracle(&self, context: &MarketContext) -> ParsedRecommendation {
        let timeout = self.options.oracle_timeout;
        let failure = match tokio::time::timeout(timeout, self.oracle.recommend(context)).await {
            Ok(Ok(text)) => return parse_recommendation(&text),
            Ok(Err(e)) => e.to_string(),
            Err(_) => OracleError::Timeout(timeout).to_string(),
        };

        tracing::warn!("Oracle unavailable: {}", failure);
        ParsedRecommendation {
            plan: TradePlan::hold("oracle unavailable"),
            notes: None,
            anomaly: Some(failure),
        }
    }

    async fn finish(
        &self,
        id: Uuid,
        action: PlanAction,
        outcome: Option<LifecycleOutcome>,
        oracle_notes: Option<String>,
        notes: Vec<String>,
        mut memory: TradeMemory,
    ) -> CycleReport {
        for note in notes.iter().filter(|n| n.starts_with(NO_ACTION)) {
            tracing::warn!("{}", note);
        }

        memory.record_observations(oracle_notes.as_deref(), &notes);
        let memory_saved = match self.store.save(&memory).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to save trade memory to {}: {}", self.store.path().display(), e);
                false
            }
        };

        tracing::info!("✅ Cycle finished with {} note(s)", notes.len());
        CycleReport {
            id,
            action,
            outcome,
            notes,
            memory_saved,
        }
    }
}
