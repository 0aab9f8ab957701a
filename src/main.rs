//! IOL Trading Bot
//!
//! Multi-strategy scoring, risk management and paper/live execution for
//! the InvertirOnline broker.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use iolbot::{
    backtesting::{BacktestConfig, Backtester},
    bot::{data_service, TradingBot},
    config::{AppConfig, Credentials},
    execution::ExecutionMode,
    iol::IolClient,
    notify::TelegramCommands,
    persistence::CsvPersistence,
    strategies::SentimentAnalyzer,
    types::{normalize_symbol, Timeframe},
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "iolbot")]
#[command(about = "Multi-strategy trading bot for InvertirOnline (IOL)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Extra config file layered over config/default and config/local
    #[arg(short, long)]
    config: Option<String>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading loop
    Run {
        /// Send real orders to IOL
        #[arg(long)]
        live: bool,
        /// Single cycle, then exit
        #[arg(long)]
        once: bool,
    },
    /// Analyze one symbol and print the score breakdown
    Analyze {
        symbol: String,
    },
    /// Account, positions and learning state
    Status,
    /// Replay the scoring stack over daily history
    Backtest {
        symbol: String,
        /// History range (1y, 2y, 6mo...)
        #[arg(long, default_value = "2y")]
        period: String,
        /// Write the trades CSV here
        #[arg(long)]
        csv: Option<String>,
    },
    /// Score a news text and store it in the sentiment history
    Sentiment {
        symbol: String,
        text: String,
    },
    /// Ask a running bot to stop (creates the stop file)
    Stop,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = AppConfig::load_from(cli.config.as_deref())?;
    info!(config = %config, "⚙️ Configuración cargada");

    match cli.command {
        Commands::Run { live, once } => run_bot(config, live, once).await,
        Commands::Analyze { symbol } => analyze(config, &symbol).await,
        Commands::Status => status(config).await,
        Commands::Backtest { symbol, period, csv } => backtest(config, &symbol, &period, csv).await,
        Commands::Sentiment { symbol, text } => sentiment(config, &symbol, &text),
        Commands::Stop => stop(config),
    }
}

async fn run_bot(config: AppConfig, live: bool, once: bool) -> Result<()> {
    let live = live || config.bot.live;
    config.validate_env(live)?;
    let creds = Credentials::from_env();
    let mode = if live {
        warn!("⚠️ MODO LIVE: se enviarán órdenes reales a IOL");
        ExecutionMode::Live
    } else {
        info!("📝 Modo paper trading");
        ExecutionMode::Paper
    };

    let (command_tx, command_rx) = mpsc::channel(32);
    let commands = match TelegramCommands::new(&config.telegram, &creds, command_tx)? {
        Some(listener) => {
            tokio::spawn(listener.start_polling());
            Some(command_rx)
        }
        None => None,
    };

    let mut bot = TradingBot::build(config, &creds, mode)?;
    if once {
        let report = bot.run_once().await?;
        info!(?report, "✅ Ciclo único completado");
        return Ok(());
    }
    bot.run(commands).await
}

async fn analyze(config: AppConfig, symbol: &str) -> Result<()> {
    let creds = Credentials::from_env();
    let symbol = normalize_symbol(symbol);
    let mut bot = TradingBot::build(config, &creds, ExecutionMode::Paper)?;
    let analysis = bot.analyze_symbol(&symbol).await?;

    println!("\n📊 {} @ ${:.2}", analysis.symbol, analysis.price);
    println!(
        "Score: {:+}  →  {} ({})  | régimen {} | umbrales {}/{}",
        analysis.score,
        analysis.action,
        analysis.confidence,
        analysis.regime,
        analysis.thresholds.buy,
        analysis.thresholds.sell
    );
    if let Some(reason) = &analysis.blocked_by {
        println!("🚫 Bloqueada: {}", reason);
    }
    println!("\n🟢 Factores de compra:");
    for f in &analysis.buy_factors {
        println!("  + {}", f);
    }
    println!("\n🔴 Factores de venta:");
    for f in &analysis.sell_factors {
        println!("  - {}", f);
    }
    println!("\nEstrategias:");
    for (name, score) in &analysis.strategy_scores {
        println!("  {:<16} {:+}", name, score);
    }
    Ok(())
}

async fn status(config: AppConfig) -> Result<()> {
    let creds = Credentials::from_env();
    let mode = if config.bot.live && creds.has_iol() {
        ExecutionMode::Live
    } else {
        ExecutionMode::Paper
    };
    let data_dir = config.persistence.data_dir.clone();
    let mut bot = TradingBot::build(config, &creds, mode)?;

    println!("{}", bot.handle_command(iolbot::notify::BotCommand::Status).await);
    println!("{}", bot.handle_command(iolbot::notify::BotCommand::Positions).await);

    let journal = CsvPersistence::new(&data_dir)?;
    let perf = journal.calculate_performance(30)?;
    println!(
        "\n30 días: {} trades | {} ganadores | WR {:.1}% | P&L ${:+.2} | promedio ${:+.2}",
        perf.total_trades,
        perf.winning_trades,
        perf.win_rate * 100.0,
        perf.total_pnl,
        perf.avg_pnl
    );
    for s in bot.learning().calibrator().top_performers(5) {
        println!(
            "  {:<16} {}W/{}L  WR {:.0}%  peso {:.2}",
            s.name,
            s.wins,
            s.losses,
            s.win_rate * 100.0,
            s.calibrated_weight
        );
    }
    Ok(())
}

async fn backtest(config: AppConfig, symbol: &str, period: &str, csv: Option<String>) -> Result<()> {
    let creds = Credentials::from_env();
    let symbol = normalize_symbol(symbol);
    let iol = if creds.has_iol() {
        Some(Arc::new(IolClient::new(config.iol.clone(), &creds)?))
    } else {
        None
    };
    let data = data_service(&config, iol.as_ref())?;
    let candles = data
        .get_history(&symbol, period, Timeframe::Day1)
        .await
        .with_context(|| format!("No history for {}", symbol))?;
    info!(symbol = %symbol, bars = candles.len(), period, "📈 Backtest");

    let mut backtester = Backtester::new(&symbol, BacktestConfig::from_app(&config), &config);
    backtester.load_data(candles);
    backtester.run();
    println!("{}", backtester.report().to_yaml()?);

    if let Some(path) = csv {
        std::fs::write(&path, backtester.export_trades_csv()?)
            .with_context(|| format!("Failed to write {}", path))?;
        info!(path = %path, "💾 Trades exportados");
    }
    Ok(())
}

fn sentiment(config: AppConfig, symbol: &str, text: &str) -> Result<()> {
    let symbol = normalize_symbol(symbol);
    let analyzer = SentimentAnalyzer::open(&config.persistence.data_dir)?;
    let entry = analyzer.analyze_text(&symbol, text)?;
    let summary = analyzer.summary(&symbol);
    println!(
        "{}: {} ({:+.2}) [+{} / -{}]",
        symbol, entry.sentiment, entry.score, entry.positive_words, entry.negative_words
    );
    println!(
        "7 días: {} ({:+.2}, n={})",
        summary.label, summary.score, summary.sample_size
    );
    Ok(())
}

fn stop(config: AppConfig) -> Result<()> {
    let path = Path::new(&config.bot.stop_file);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, chrono::Utc::now().to_rfc3339())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("🛑 Stop solicitado ({})", path.display());
    Ok(())
}
