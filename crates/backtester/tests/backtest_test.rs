use backtester::BacktestDriver;
use chrono::{Duration, TimeZone, Utc};
use configuration::{Config, SlippageMode};
use core_types::{Bar, Side};
use execution::synthetic::{generate_bars, SyntheticConfig};

fn synthetic_series(seed: u64, bars: usize) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();
    generate_bars(&SyntheticConfig::new(start, bars, seed))
}

fn default_test_config() -> Config {
    let mut config = Config::default();
    config.strategy.min_volume = 0;
    config
}

#[tokio::test]
async fn identical_inputs_give_byte_identical_results() {
    let bars = synthetic_series(42, 2000);
    let driver = BacktestDriver::new(default_test_config());

    let first = driver.run(&bars).await.unwrap();
    let second = driver.run(&bars).await.unwrap();

    assert_eq!(first.trades, second.trades);
    assert_eq!(first.equity_curve, second.equity_curve);
    assert_eq!(first.report, second.report);
}

#[tokio::test]
async fn replay_produces_trades_on_mean_reverting_data() {
    // The synthetic generator reverts hard toward its base price, so a
    // 2-sigma entry threshold trades on a few thousand bars.
    let bars = synthetic_series(7, 4000);
    let driver = BacktestDriver::new(default_test_config());
    let result = driver.run(&bars).await.unwrap();

    assert!(
        result.report.total_trades > 0,
        "expected at least one round trip"
    );
    assert_eq!(
        result.report.total_trades,
        result.report.winning_trades + result.report.losing_trades
    );
    assert_eq!(result.equity_curve.len(), result.trades.len());
    // The curve's final point is the total P&L.
    let last = result.equity_curve.last().unwrap().1;
    assert!((last - result.report.total_pnl).abs() < 1e-9);
}

#[tokio::test]
async fn ping_pong_break_enters_long_below_two_sigma() {
    // Alternate 6000.00 / 6000.25 for a full window, break to 5998 (the
    // entry), then recover (the exit). The entry Z must clear -2.
    let start = Utc.with_ymd_and_hms(2024, 3, 5, 14, 0, 0).unwrap();
    let mut closes: Vec<f64> = (0..20)
        .map(|i| if i % 2 == 0 { 6000.00 } else { 6000.25 })
        .collect();
    closes.push(5998.00);
    closes.push(6000.25);

    let bars: Vec<Bar> = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            timestamp: start + Duration::minutes(5 * i as i64),
            open: close,
            high: close + 0.25,
            low: close - 0.25,
            close,
            volume: 500,
        })
        .collect();

    let mut config = default_test_config();
    config.backtest.slippage_mode = SlippageMode::None;
    let driver = BacktestDriver::new(config);
    let result = driver.run(&bars).await.unwrap();

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.side, Side::Long);
    assert_eq!(trade.entry_price, 5998.00);
    assert!(
        trade.z_on_entry < -2.0,
        "entry z was {}",
        trade.z_on_entry
    );
    assert!(trade.realized_pnl > 0.0);
}

#[tokio::test]
async fn slippage_mode_worsens_market_fills() {
    // One long round trip, dip to 95 and back to 100. Frictionless nets
    // (100 - 95) * 5 = 25; two ticks of slippage per side (0.50 points at a
    // 0.25 tick) costs 0.50 on entry and 0.50 on exit: 20.
    let start = Utc.with_ymd_and_hms(2024, 3, 5, 14, 0, 0).unwrap();
    let closes = [100.0, 100.0, 100.0, 100.0, 95.0, 100.0];
    let bars: Vec<Bar> = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            timestamp: start + Duration::minutes(5 * i as i64),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 500,
        })
        .collect();

    let mut base = default_test_config();
    base.strategy.lookback = 3;
    base.strategy.z_entry = 1.0;

    let mut frictionless = base.clone();
    frictionless.backtest.slippage_mode = SlippageMode::None;
    let clean = BacktestDriver::new(frictionless).run(&bars).await.unwrap();
    assert_eq!(clean.trades.len(), 1);
    assert_eq!(clean.report.total_pnl, 25.0);

    let mut costly = base;
    costly.backtest.slippage_mode = SlippageMode::PerSide;
    costly.execution.slippage_ticks = 2.0;
    let slipped = BacktestDriver::new(costly).run(&bars).await.unwrap();
    assert_eq!(slipped.trades.len(), 1);
    assert_eq!(slipped.trades[0].entry_price, 95.5);
    assert_eq!(slipped.trades[0].exit_price, 99.5);
    assert_eq!(slipped.report.total_pnl, 20.0);
}

#[tokio::test]
async fn seeded_run_trades_from_the_first_test_bar() {
    // Without seeding, the first `lookback` bars only warm the window.
    // With seeding, the window is live immediately: a dip on the very
    // first test bar can enter.
    let start = Utc.with_ymd_and_hms(2024, 3, 5, 14, 0, 0).unwrap();
    let make_bar = |i: i64, close: f64| Bar {
        timestamp: start + Duration::minutes(5 * i),
        open: close,
        high: close + 0.5,
        low: close - 0.5,
        close,
        volume: 500,
    };

    let mut config = default_test_config();
    config.strategy.lookback = 3;
    config.strategy.z_entry = 1.0;
    config.backtest.slippage_mode = SlippageMode::None;

    let warmup: Vec<Bar> = (0..3).map(|i| make_bar(i, 100.0)).collect();
    let test: Vec<Bar> = vec![make_bar(3, 95.0), make_bar(4, 100.0)];

    let driver = BacktestDriver::new(config);
    let seeded = driver.run_seeded(&warmup, &test).await.unwrap();
    assert_eq!(seeded.trades.len(), 1);
    assert_eq!(seeded.trades[0].entry_price, 95.0);

    let cold = driver.run(&test).await.unwrap();
    assert!(cold.trades.is_empty());
}

#[tokio::test]
async fn empty_input_is_an_error() {
    let driver = BacktestDriver::new(default_test_config());
    assert!(driver.run(&[]).await.is_err());
}
