//! Trading loop
//!
//! One cycle: manage open positions (trailing stops, stop-loss, take-profit),
//! then analyze every symbol of the universe and act on actionable signals.
//! `run` repeats the cycle every `interval_secs` until ctrl-c or the stop
//! file shows up, and serves Telegram commands in between.

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Timelike};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::{wrappers::IntervalStream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, Credentials};
use crate::execution::{ExecutionMode, Executor, IolExecutor, PaperTradingEngine, SellOutcome};
use crate::features::FeatureEngine;
use crate::filters::{FilterDecision, TraderFilters};
use crate::iol::IolClient;
use crate::learning::LearningSystem;
use crate::market_data::{FallbackDataService, MarketDataProvider};
use crate::notify::{html_escape, BotCommand, Notifier, Priority, HELP_TEXT};
use crate::persistence::{AnalysisRecord, BalanceRecord, CsvPersistence, TradeRecord, WinLossRecord};
use crate::risk::{CommissionModel, RiskManager, TrailingStopBook, TrailingUpdate};
use crate::scoring::{Analysis, ScoreInputs, Scorer, Thresholds};
use crate::strategies::{
    MacroService, RegimeDetector, SentimentAnalyzer, StrategyContext, StrategySet, TrendPredictor,
};
use crate::types::{
    local_now, Action, Candle, ExitReason, OrderResult, OrderSide, Position, Timeframe, TradePlan,
};
use crate::yahoo::YahooClient;

/// What one cycle did
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub analyzed: usize,
    pub signals: usize,
    pub orders: usize,
    pub closed: usize,
    pub errors: usize,
}

pub struct TradingBot {
    config: AppConfig,
    data: Arc<FallbackDataService>,
    executor: Arc<dyn Executor>,
    paper: Option<Arc<PaperTradingEngine>>,
    notifier: Arc<Notifier>,
    persistence: Option<CsvPersistence>,
    feature_engine: FeatureEngine,
    strategies: StrategySet,
    regime: RegimeDetector,
    predictor: TrendPredictor,
    sentiment: SentimentAnalyzer,
    macro_ctx: Option<MacroService>,
    scorer: Scorer,
    filters: TraderFilters,
    risk: RiskManager,
    commissions: CommissionModel,
    trailing: TrailingStopBook,
    learning: LearningSystem,
    last_analyses: HashMap<String, Analysis>,
    /// Daily closes of the last analysis, for the correlation filter
    closes: HashMap<String, Vec<f64>>,
    paused: bool,
    last_summary: Option<NaiveDate>,
}

impl TradingBot {
    /// Wire the bot around a data service and an executor. State files live
    /// in `persistence.data_dir`.
    pub fn from_parts(
        config: AppConfig,
        data: Arc<FallbackDataService>,
        executor: Arc<dyn Executor>,
    ) -> Result<Self> {
        let data_dir = Path::new(&config.persistence.data_dir).to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;

        let persistence = if config.persistence.csv_enabled {
            Some(CsvPersistence::new(&data_dir)?)
        } else {
            None
        };
        let base = Thresholds {
            buy: config.scoring.buy_threshold,
            sell: config.scoring.sell_threshold,
        };
        let learning = LearningSystem::open(config.learning.clone(), base, &data_dir)?;
        let trailing = TrailingStopBook::open(config.trailing.clone(), &data_dir)?;
        let sentiment = SentimentAnalyzer::open(&data_dir)?;

        Ok(Self {
            data,
            executor,
            paper: None,
            notifier: Arc::new(Notifier::disabled()),
            persistence,
            feature_engine: FeatureEngine::new(),
            strategies: StrategySet::from_config(&config.strategies),
            regime: RegimeDetector::new(),
            predictor: TrendPredictor::default(),
            sentiment,
            macro_ctx: None,
            scorer: Scorer::new(&config.scoring),
            filters: TraderFilters::new(config.filters.clone()),
            risk: RiskManager::new(config.risk.clone()),
            commissions: CommissionModel::new(config.commissions.clone()),
            trailing,
            learning,
            last_analyses: HashMap::new(),
            closes: HashMap::new(),
            paused: false,
            last_summary: None,
            config,
        })
    }

    /// Production wiring: IOL then Yahoo for data, paper engine or IOL
    /// orders for execution, Telegram and macro context when configured.
    pub fn build(config: AppConfig, creds: &Credentials, mode: ExecutionMode) -> Result<Self> {
        let data_dir = Path::new(&config.persistence.data_dir).to_path_buf();
        let commissions = CommissionModel::new(config.commissions.clone());

        let iol = if creds.has_iol() {
            Some(Arc::new(IolClient::new(config.iol.clone(), creds)?))
        } else {
            warn!("⚠️ Sin credenciales IOL, datos solo desde Yahoo Finance");
            None
        };

        let data = data_service(&config, iol.as_ref())?;

        let mut paper = None;
        let executor: Arc<dyn Executor> = match mode {
            ExecutionMode::Live => {
                let client = iol.ok_or_else(|| anyhow!("Live mode requires IOL_USERNAME / IOL_PASSWORD"))?;
                Arc::new(IolExecutor::new(client, commissions).with_data_dir(&data_dir)?)
            }
            ExecutionMode::Paper => {
                let engine = Arc::new(
                    PaperTradingEngine::new(config.paper_trading.clone(), commissions)
                        .with_state_file(data_dir.join("paper_state.json")),
                );
                engine.load_state()?;
                paper = Some(engine.clone());
                engine
            }
        };

        let notifier = Arc::new(Notifier::new(&config.telegram, creds)?);
        let macro_ctx = MacroService::new(config.macro_ctx.clone())?;

        let mut bot = Self::from_parts(config, Arc::new(data), executor)?
            .with_notifier(notifier)
            .with_macro(macro_ctx);
        bot.paper = paper;
        Ok(bot)
    }

    pub fn with_notifier(mut self, notifier: Arc<Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_macro(mut self, service: MacroService) -> Self {
        self.macro_ctx = Some(service);
        self
    }

    pub fn with_strategies(mut self, strategies: StrategySet) -> Self {
        self.strategies = strategies;
        self
    }

    /// Attach the paper engine for the periodic dashboard
    pub fn with_paper_engine(mut self, engine: Arc<PaperTradingEngine>) -> Self {
        self.paper = Some(engine);
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.executor.mode()
    }

    pub fn notifier(&self) -> Arc<Notifier> {
        self.notifier.clone()
    }

    pub fn sentiment(&self) -> &SentimentAnalyzer {
        &self.sentiment
    }

    pub fn learning(&self) -> &LearningSystem {
        &self.learning
    }

    pub fn trailing(&self) -> &TrailingStopBook {
        &self.trailing
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn last_analysis(&self, symbol: &str) -> Option<&Analysis> {
        self.last_analyses.get(symbol)
    }

    fn thresholds(&self) -> Thresholds {
        if self.config.scoring.use_adaptive_thresholds && self.learning.is_enabled() {
            self.learning.thresholds()
        } else {
            Thresholds {
                buy: self.config.scoring.buy_threshold,
                sell: self.config.scoring.sell_threshold,
            }
        }
    }

    async fn intraday(&self, symbol: &str) -> HashMap<Timeframe, Vec<Candle>> {
        let mut series = HashMap::new();
        if !self.config.strategies.intraday_enabled {
            return series;
        }
        let range = self.config.yahoo.intraday_range.as_str();
        for (tf, range) in [
            (Timeframe::Hour1, range),
            (Timeframe::Hour4, range),
            (Timeframe::Min15, "5d"),
        ] {
            match self.data.get_history(symbol, range, tf).await {
                Ok(candles) => {
                    series.insert(tf, candles);
                }
                Err(e) => debug!(symbol, timeframe = %tf, error = %e, "Intraday history unavailable"),
            }
        }
        series
    }

    /// Full analysis of one symbol. Filters are applied and the result journaled.
    pub async fn analyze_symbol(&mut self, symbol: &str) -> Result<Analysis> {
        let quote = self
            .data
            .get_quote(symbol)
            .await
            .with_context(|| format!("Quote failed for {}", symbol))?;
        let daily = self
            .data
            .get_history(symbol, &self.config.yahoo.history_range, Timeframe::Day1)
            .await
            .with_context(|| format!("History failed for {}", symbol))?;
        let features = self
            .feature_engine
            .compute(&daily)
            .ok_or_else(|| anyhow!("No candles for {}", symbol))?;
        let intraday = self.intraday(symbol).await;

        let now = local_now();
        let ctx = StrategyContext::new(symbol, &daily)
            .with_intraday(&intraday)
            .with_quote(&quote)
            .at(now);
        let strategy_scores = self.strategies.evaluate_all(&ctx);
        let regime = self.regime.detect(&daily);
        let prediction = self.predictor.predict(&daily);
        let sentiment = self.sentiment.summary(symbol);
        let macro_score = match &self.macro_ctx {
            Some(service) => Some(service.score().await),
            None => None,
        };

        let inputs = ScoreInputs {
            features: &features,
            prediction: prediction.as_ref(),
            sentiment: Some(&sentiment),
            strategy_scores: &strategy_scores,
            regime: &regime,
            macro_score: macro_score.as_ref(),
        };
        let mut analysis = self.scorer.score(
            symbol,
            quote.price,
            &inputs,
            self.thresholds(),
            &self.learning.calibration(),
        );

        let candidate: Vec<f64> = daily.iter().map(|c| c.close).collect();
        let open: Vec<(String, Vec<f64>)> = self
            .executor
            .positions()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|p| p.symbol != symbol)
            .filter_map(|p| self.closes.get(&p.symbol).map(|c| (p.symbol, c.clone())))
            .collect();
        if let FilterDecision::Reject(reason) = self.filters.apply(&mut analysis, now, &candidate, &open) {
            info!(symbol, reason = %reason, "🚫 Señal de compra filtrada");
        }
        self.closes.insert(symbol.to_string(), candidate);

        info!(
            symbol,
            price = %format!("${:.2}", analysis.price),
            score = analysis.score,
            action = %analysis.action,
            confidence = %analysis.confidence,
            regime = %analysis.regime,
            "📊 Análisis"
        );

        if let Some(journal) = &self.persistence {
            if let Err(e) = journal
                .save_analysis(AnalysisRecord::from_analysis(&analysis, &self.config.bot.tag))
                .await
            {
                warn!(symbol, error = %e, "⚠️ No se pudo guardar el análisis");
            }
        }
        self.last_analyses.insert(symbol.to_string(), analysis.clone());
        Ok(analysis)
    }

    /// Act on an analysis. BUY opens a sized position, SELL only closes an
    /// existing one. `None` when nothing was sent.
    pub async fn execute_trade(&mut self, analysis: &Analysis) -> Result<Option<OrderResult>> {
        match analysis.action {
            Action::Hold => Ok(None),
            Action::Buy => self.open_trade(analysis).await,
            Action::Sell => {
                let positions = self.executor.positions().await?;
                let Some(position) = positions.into_iter().find(|p| p.symbol == analysis.symbol) else {
                    debug!(symbol = %analysis.symbol, "SELL sin posición abierta, se ignora");
                    return Ok(None);
                };
                let outcome = self
                    .close_position(&position, analysis.price, ExitReason::Signal)
                    .await?;
                Ok(Some(outcome.order))
            }
        }
    }

    async fn open_trade(&mut self, analysis: &Analysis) -> Result<Option<OrderResult>> {
        let symbol = analysis.symbol.as_str();
        let price = analysis.price;
        let positions = self.executor.positions().await?;
        if positions.iter().any(|p| p.symbol == symbol) {
            debug!(symbol, "Ya hay posición abierta, BUY ignorado");
            return Ok(None);
        }

        let balance = self.executor.available_balance().await?;
        let stop = self.risk.stop_loss(price, analysis.atr);
        let take_profit = self.risk.take_profit(price, stop);
        let multiplier = analysis.size_multiplier * self.learning.size_factor(analysis.confidence);
        let quantity = self.risk.position_size(balance, price, stop, multiplier);
        if quantity == 0 {
            info!(symbol, balance, price, "⏭️ Tamaño de posición 0, sin orden");
            return Ok(None);
        }

        let check = self.commissions.should_execute(symbol, price, take_profit, quantity);
        if !check.should_execute {
            info!(symbol, reason = %check.reason, "⏭️ Operación no rentable tras comisiones");
            return Ok(None);
        }

        let equity = balance + positions.iter().map(|p| p.market_value()).sum::<f64>();
        let new_risk = (price - stop) * quantity as f64;
        if let Err(reason) = self.risk.can_open(symbol, &positions, equity, new_risk) {
            info!(symbol, reason = %reason, "🛡️ Riesgo: entrada rechazada");
            return Ok(None);
        }

        let plan = TradePlan {
            stop_loss: stop,
            take_profit,
            score: analysis.score,
            supporting_strategies: analysis.supporting_strategies(),
        };
        let order = self.executor.buy(symbol, quantity, price, &plan).await?;
        if !order.success {
            warn!(symbol, message = %order.message, "❌ Orden de compra rechazada");
            self.notifier
                .error(&format!("Compra {}", symbol), &order.message)
                .await;
            return Ok(Some(order));
        }

        let fill = if order.fill_price > 0.0 { order.fill_price } else { price };
        self.risk.record_entry(fill * order.quantity as f64);
        // from here on the order exists: bookkeeping failures are logged, not returned
        if self.trailing.is_enabled() {
            if let Err(e) = self.trailing.add(symbol, fill, order.quantity, stop) {
                warn!(symbol, error = %e, "⚠️ No se pudo guardar el trailing stop");
            }
        }
        info!(
            symbol,
            quantity = order.quantity,
            price = %format!("${:.2}", fill),
            stop = %format!("${:.2}", stop),
            take_profit = %format!("${:.2}", take_profit),
            mode = %self.mode(),
            "🟢 Compra ejecutada"
        );
        self.notifier
            .trade_opened(symbol, order.quantity, fill, &plan, self.mode())
            .await;
        if let Some(journal) = &self.persistence {
            let record = TradeRecord::from_order(symbol, OrderSide::Buy, &order, self.mode(), Some(analysis.score));
            if let Err(e) = journal.save_trade(record).await {
                warn!(symbol, error = %e, "⚠️ No se pudo guardar la operación");
            }
        }
        Ok(Some(order))
    }

    /// Sell the whole position and record the round trip everywhere
    async fn close_position(&mut self, position: &Position, price: f64, reason: ExitReason) -> Result<SellOutcome> {
        let symbol = position.symbol.as_str();
        let outcome = self
            .executor
            .sell(symbol, position.quantity, price, reason)
            .await?;
        if !outcome.order.success {
            warn!(symbol, reason = %reason, message = %outcome.order.message, "❌ Orden de venta rechazada");
            self.notifier
                .error(&format!("Venta {}", symbol), &outcome.order.message)
                .await;
            return Ok(outcome);
        }
        if let Err(e) = self.trailing.remove(symbol) {
            warn!(symbol, error = %e, "⚠️ No se pudo guardar el trailing stop");
        }

        let mut record = TradeRecord::from_order(symbol, OrderSide::Sell, &outcome.order, self.mode(), None);
        if let Some(trade) = &outcome.closed {
            record = record.with_close(trade);
            self.risk.record_exit(trade.pnl);
            if !trade.is_win() {
                self.filters.record_loss(symbol, local_now());
            }
            info!(
                symbol,
                reason = %reason,
                pnl = %format!("${:+.2}", trade.pnl),
                pnl_pct = %format!("{:+.2}%", trade.pnl_pct * 100.0),
                "🔴 Posición cerrada"
            );

            match self.learning.learn_from_trade(trade) {
                Ok(changes) if !changes.is_empty() => {
                    let body = changes.join("\n");
                    self.notifier
                        .send(&format!("🧠 <b>Estrategia adaptada</b>\n{}", html_escape(&body)), Priority::Medium)
                        .await;
                }
                Ok(_) => {}
                Err(e) => warn!(symbol, error = %e, "⚠️ Aprendizaje falló"),
            }

            self.notifier.trade_closed(trade, self.mode()).await;
            if let Some(journal) = &self.persistence {
                if let Err(e) = journal.save_winloss(WinLossRecord::from(trade)).await {
                    warn!(symbol, error = %e, "⚠️ No se pudo guardar win/loss");
                }
            }
        }
        if let Some(journal) = &self.persistence {
            if let Err(e) = journal.save_trade(record).await {
                warn!(symbol, error = %e, "⚠️ No se pudo guardar la operación");
            }
        }
        Ok(outcome)
    }

    /// Mark open positions, run trailing stops and stop / take-profit exits.
    /// Returns how many positions were closed.
    pub async fn monitor_open_positions(&mut self) -> Result<usize> {
        let positions = self.executor.positions().await?;
        let mut closed = 0;
        for mut position in positions {
            let symbol = position.symbol.clone();
            let price = match self.data.get_quote(&symbol).await {
                Ok(q) => q.price,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "⚠️ Sin precio para posición abierta");
                    continue;
                }
            };
            self.executor.mark_price(&symbol, price).await?;
            position.current_price = price;

            // the plan's stop / take-profit first, then the trailing stop
            let reason = match self.risk.should_close(&position, price) {
                Some(reason) => Some(reason),
                None => match self.trailing.update(&symbol, price) {
                    TrailingUpdate::Activated { stop } => {
                        self.notifier.trailing_activated(&symbol, stop).await;
                        None
                    }
                    TrailingUpdate::Hit { stop, price, .. } => {
                        self.notifier.trailing_hit(&symbol, stop, price).await;
                        Some(ExitReason::TrailingStop)
                    }
                    TrailingUpdate::Raised { from, to } => {
                        debug!(symbol = %symbol, from, to, "Trailing stop raised");
                        None
                    }
                    TrailingUpdate::Unchanged | TrailingUpdate::Untracked => None,
                },
            };
            let Some(reason) = reason else {
                continue;
            };

            info!(symbol = %symbol, reason = %reason, price, "🚪 Cerrando posición");
            match self.close_position(&position, price, reason).await {
                Ok(outcome) if outcome.order.success => closed += 1,
                Ok(_) => {}
                Err(e) => {
                    error!(symbol = %symbol, error = %e, "Failed to close position");
                    self.notifier.error(&format!("Cierre {}", symbol), &e.to_string()).await;
                }
            }
        }
        Ok(closed)
    }

    async fn journal_balance(&self) {
        let Some(journal) = &self.persistence else {
            return;
        };
        let (cash, positions) = match (self.executor.available_balance().await, self.executor.positions().await) {
            (Ok(cash), Ok(positions)) => (cash, positions),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "⚠️ Balance no disponible para el journal");
                return;
            }
        };
        if let Err(e) = journal
            .save_balance(BalanceRecord::snapshot(self.mode(), cash, &positions))
            .await
        {
            warn!(error = %e, "⚠️ No se pudo guardar el balance");
        }
    }

    /// One full cycle over the universe
    pub async fn run_once(&mut self) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        match self.monitor_open_positions().await {
            Ok(n) => report.closed += n,
            Err(e) => {
                report.errors += 1;
                error!(error = %e, "Position monitoring failed");
            }
        }

        let symbols = self.config.bot.symbols.clone();
        for symbol in &symbols {
            let analysis = match self.analyze_symbol(symbol).await {
                Ok(a) => a,
                Err(e) => {
                    report.errors += 1;
                    warn!(symbol = %symbol, error = %e, "⚠️ Análisis falló");
                    continue;
                }
            };
            report.analyzed += 1;
            if !analysis.is_actionable() {
                continue;
            }
            report.signals += 1;
            self.notifier.signal(&analysis).await;
            match self.execute_trade(&analysis).await {
                Ok(Some(order)) if order.success => report.orders += 1,
                Ok(_) => {}
                Err(e) => {
                    report.errors += 1;
                    error!(symbol = %symbol, error = %e, "Trade execution failed");
                    self.notifier.error(&format!("Ejecución {}", symbol), &e.to_string()).await;
                }
            }
        }

        self.journal_balance().await;
        info!(
            analyzed = report.analyzed,
            signals = report.signals,
            orders = report.orders,
            closed = report.closed,
            errors = report.errors,
            "🔁 Ciclo completado"
        );
        Ok(report)
    }

    async fn status_text(&self) -> String {
        let summary = self
            .executor
            .summary()
            .await
            .unwrap_or_else(|e| format!("sin datos ({})", e));
        let t = self.thresholds();
        let recent: Vec<String> = self
            .notifier
            .recent(5)
            .iter()
            .map(|n| {
                let first = n.text.lines().next().unwrap_or_default();
                format!("{} [{}] {}", n.timestamp.format("%H:%M"), n.priority, first)
            })
            .collect();
        let mut text = format!(
            "🤖 <b>IOL Bot</b> [{}]{}\n\n{}\nUmbrales: {}/{}\n{}\nTrailing stops: {}",
            self.mode(),
            if self.paused { " ⏸️ PAUSADO" } else { "" },
            html_escape(&summary),
            t.buy,
            t.sell,
            html_escape(&self.learning.summary()),
            self.trailing.len()
        );
        if !recent.is_empty() {
            text.push_str("\n\nÚltimas notificaciones:\n");
            text.push_str(&recent.join("\n"));
        }
        text
    }

    /// Answer a Telegram command
    pub async fn handle_command(&mut self, command: BotCommand) -> String {
        let text = match command {
            BotCommand::Status => self.status_text().await,
            BotCommand::Balance => match self.executor.available_balance().await {
                Ok(balance) => format!("💰 Saldo disponible: <code>${:.2}</code>", balance),
                Err(e) => format!("❌ Saldo no disponible: {}", html_escape(&e.to_string())),
            },
            BotCommand::Positions => match self.executor.positions().await {
                Ok(positions) if positions.is_empty() => "📭 Sin posiciones abiertas".to_string(),
                Ok(positions) => {
                    let lines: Vec<String> = positions
                        .iter()
                        .map(|p| {
                            format!(
                                "• {} x{} @ ${:.2} → ${:.2} ({:+.2}%)",
                                html_escape(&p.symbol),
                                p.quantity,
                                p.entry_price,
                                p.current_price,
                                p.unrealized_pnl_pct() * 100.0
                            )
                        })
                        .collect();
                    format!("📂 <b>Posiciones</b>\n{}", lines.join("\n"))
                }
                Err(e) => format!("❌ Posiciones no disponibles: {}", html_escape(&e.to_string())),
            },
            BotCommand::Scores => {
                if self.last_analyses.is_empty() {
                    "Sin análisis todavía".to_string()
                } else {
                    let mut rows: Vec<&Analysis> = self.last_analyses.values().collect();
                    rows.sort_by(|a, b| b.score.cmp(&a.score));
                    let lines: Vec<String> = rows
                        .iter()
                        .map(|a| format!("• {} {:+} {} ({})", html_escape(&a.symbol), a.score, a.action, a.confidence))
                        .collect();
                    format!("📊 <b>Scores</b>\n{}", lines.join("\n"))
                }
            }
            BotCommand::Pause => {
                self.paused = true;
                info!("⏸️ Bot pausado por Telegram");
                "⏸️ Operaciones pausadas".to_string()
            }
            BotCommand::Resume => {
                self.paused = false;
                info!("▶️ Bot reanudado por Telegram");
                "▶️ Operaciones reanudadas".to_string()
            }
            BotCommand::Help => HELP_TEXT.to_string(),
        };
        self.notifier.send(&text, Priority::Low).await;
        text
    }

    async fn maybe_daily_summary(&mut self) {
        let now = local_now();
        let today = now.date_naive();
        if now.hour() < self.config.bot.daily_summary_hour || self.last_summary == Some(today) {
            return;
        }
        self.last_summary = Some(today);

        let mut lines = vec![self
            .executor
            .summary()
            .await
            .unwrap_or_else(|e| format!("Resumen no disponible: {}", e))];
        if let Some(stats) = self.risk.today_stats() {
            lines.push(format!(
                "Hoy: {} operaciones | {}W/{}L | P&L ${:+.2}",
                stats.trades, stats.wins, stats.losses, stats.pnl
            ));
        }
        if let Some(journal) = &self.persistence {
            match journal.calculate_performance(30) {
                Ok(perf) if perf.total_trades > 0 => lines.push(format!(
                    "30 días: {} trades | WR {:.1}% | P&L ${:+.2}",
                    perf.total_trades,
                    perf.win_rate * 100.0,
                    perf.total_pnl
                )),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "⚠️ Performance no disponible"),
            }
        }
        lines.push(self.learning.summary());
        let body = lines.join("\n");
        info!("📊 Resumen diario\n{}", body);
        self.notifier.daily_summary(&body).await;
    }

    fn stop_requested(&self) -> bool {
        Path::new(&self.config.bot.stop_file).exists()
    }

    /// Main loop. Ends on ctrl-c or when the stop file appears.
    pub async fn run(&mut self, mut commands: Option<mpsc::Receiver<BotCommand>>) -> Result<()> {
        let stop_file = Path::new(&self.config.bot.stop_file).to_path_buf();
        if stop_file.exists() {
            warn!(path = %stop_file.display(), "⚠️ Archivo STOP previo eliminado");
            std::fs::remove_file(&stop_file)
                .with_context(|| format!("Failed to remove {}", stop_file.display()))?;
        }

        info!(
            mode = %self.mode(),
            symbols = ?self.config.bot.symbols,
            interval_secs = self.config.bot.interval_secs,
            strategies = ?self.strategies.names(),
            "🚀 IOL bot iniciado"
        );
        self.notifier
            .send(
                &format!("🚀 <b>IOL Bot iniciado</b> [{}]\n{} símbolos", self.mode(), self.config.bot.symbols.len()),
                Priority::Medium,
            )
            .await;

        let mut ticks = IntervalStream::new(tokio::time::interval(Duration::from_secs(
            self.config.bot.interval_secs.max(1),
        )));
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("🛑 Ctrl-C recibido, deteniendo");
                    break;
                }
                cmd = next_command(&mut commands) => match cmd {
                    Some(cmd) => {
                        self.handle_command(cmd).await;
                    }
                    None => commands = None,
                },
                tick = ticks.next() => {
                    if tick.is_none() {
                        break;
                    }
                    if self.stop_requested() {
                        info!(path = %stop_file.display(), "🛑 Archivo STOP detectado, deteniendo");
                        break;
                    }
                    if self.paused {
                        info!("⏸️ Pausado, ciclo omitido");
                        continue;
                    }
                    if self.config.bot.respect_market_hours && !self.filters.is_market_open(local_now()) {
                        debug!("Mercado cerrado, ciclo omitido");
                    } else if let Err(e) = self.run_once().await {
                        error!(error = %e, "Cycle failed");
                        self.notifier.error("Ciclo", &e.to_string()).await;
                    }
                    if let Some(paper) = &self.paper {
                        paper.maybe_print_dashboard();
                    }
                    self.maybe_daily_summary().await;
                }
            }
        }

        if let Some(paper) = &self.paper {
            paper.print_dashboard();
            paper.save_state()?;
        }
        self.notifier.send("🛑 <b>IOL Bot detenido</b>", Priority::Medium).await;
        info!("👋 IOL bot detenido");
        Ok(())
    }
}

/// IOL first (when logged in), Yahoo Finance as fallback
pub fn data_service(config: &AppConfig, iol: Option<&Arc<IolClient>>) -> Result<FallbackDataService> {
    let mut data = FallbackDataService::new(Duration::from_secs(config.yahoo.cache_ttl_secs));
    if let Some(client) = iol {
        data = data.with_provider(client.clone() as Arc<dyn MarketDataProvider>);
    }
    if config.yahoo.enabled {
        let yahoo = YahooClient::new(config.yahoo.clone())?;
        data = data.with_provider(Arc::new(yahoo));
    }
    if data.provider_names().is_empty() {
        return Err(anyhow!("No market data provider available (IOL credentials or Yahoo)"));
    }
    info!(providers = ?data.provider_names(), "📡 Proveedores de datos");
    Ok(data)
}

async fn next_command(commands: &mut Option<mpsc::Receiver<BotCommand>>) -> Option<BotCommand> {
    match commands {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
