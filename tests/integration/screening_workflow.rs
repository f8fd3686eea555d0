//! End-to-end season and momentum screens on a seeded database

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use std::collections::HashSet;

use crate::common::test_data::{date, symbols};
use crate::common::{init_fresh_test_database, logging, SymbolSeed, TestDatabase};
use earnings_screener::analysis::filters::FilterReason;
use earnings_screener::analysis::snapshot::{SkipReason, SnapshotOutcome};
use earnings_screener::analysis::{ScreeningEngine, SnapshotLoader, TraceLog};
use earnings_screener::models::{EarningsRecord, PriceBar, Thresholds};

/// Earnings on 2024-02-01 (100) and 2024-05-01 (110), latest close on 2024-07-19
fn pullback(symbol: &'static str, latest: f64) -> SymbolSeed {
    SymbolSeed::new(symbol)
        .earnings(date(2024, 2, 1), 100.0, 1.0)
        .earnings(date(2024, 5, 1), 110.0, 3.0)
        .bar(date(2024, 7, 19), latest, 2_000_000)
}

async fn seeded_season_db() -> TestDatabase {
    let test_db = init_fresh_test_database().await.unwrap();
    let db = &test_db.db;

    pullback("DROP", 95.0).insert(db).await.unwrap();
    pullback("BLACK", 95.0).insert(db).await.unwrap();
    pullback("NOPE", 95.0).pe("--").insert(db).await.unwrap();
    pullback("NOTREL", 95.0).insert(db).await.unwrap();
    pullback("FLAT", 108.0).insert(db).await.unwrap();
    SymbolSeed::new("NEGEARN")
        .earnings(date(2024, 4, 1), 100.0, 2.0)
        .earnings(date(2024, 7, 1), 110.0, -5.0)
        .bar(date(2024, 7, 19), 95.0, 2_000_000)
        .insert(db)
        .await
        .unwrap();
    SymbolSeed::new("THIN")
        .earnings(date(2024, 5, 1), 110.0, 3.0)
        .bar(date(2024, 7, 19), 95.0, 2_000_000)
        .insert(db)
        .await
        .unwrap();

    test_db
}

fn as_of() -> NaiveDate {
    date(2024, 7, 19)
}

#[test_log::test(tokio::test)]
async fn test_season_screen_end_to_end() {
    logging::init_test_logging();
    logging::log_test_step("Running the season screen on seeded data");

    let result = tokio::time::timeout(std::time::Duration::from_secs(60), async {
        let test_db = seeded_season_db().await;
        let thresholds = Thresholds::default();
        let blacklist: HashSet<String> = ["BLACK".to_string()].into_iter().collect();
        let engine = ScreeningEngine::new(&test_db.db, &thresholds).with_blacklist(blacklist);

        let release = symbols(&["drop", "BLACK", "NOPE", "FLAT", "NEGEARN", "THIN", "GHOST"]);
        let trace = TraceLog::new(Some("NEGEARN".to_string()));
        let report = engine.run_season(&release, as_of(), &trace).await.unwrap();
        logging::log_test_data("next week", &report.next_week);
        logging::log_test_data("notification", &report.notification);

        assert_eq!(report.next_week.kept, symbols(&["DROP"]));
        assert_eq!(report.next_week.dropped["BLACK"], FilterReason::Blacklisted);
        assert_eq!(report.next_week.dropped["NEGEARN"], FilterReason::RecentNegativeEarnings);
        assert_eq!(report.next_week.dropped["NOPE"], FilterReason::InvalidPe(Some("--".to_string())));

        // NOTREL is not on a release list, so it only reaches the notification list
        assert_eq!(report.notification.kept, symbols(&["DROP", "NOTREL"]));

        assert_eq!(
            report.skipped["THIN"],
            SkipReason::NotEnoughEarnings { found: 1, required: 2 }
        );
        assert!(report.skipped.contains_key("GHOST"));

        let below_all = report.hits.iter().find(|h| h.strategy == "below_all_earnings").unwrap();
        assert_eq!(below_all.symbols, symbols(&["BLACK", "DROP", "NEGEARN", "NOPE"]));

        assert!(!report.trace.is_empty());
        assert!(report.trace.iter().all(|line| line.starts_with("[NEGEARN]")));
    })
    .await;

    assert!(result.is_ok(), "season screen timed out");
}

#[test_log::test(tokio::test)]
async fn test_season_replay_ignores_later_data() {
    let test_db = seeded_season_db().await;
    let thresholds = Thresholds::default();
    let engine = ScreeningEngine::new(&test_db.db, &thresholds);

    // On 2024-06-01 the latest bar is the 2024-05-01 earnings close itself
    let report = engine
        .run_season(&symbols(&["DROP"]), date(2024, 6, 1), &TraceLog::disabled())
        .await
        .unwrap();
    assert!(report.next_week.kept.is_empty());
    assert!(report.notification.kept.is_empty());
    // the 2024-07-01 report is in the future, leaving one earnings date
    assert_eq!(
        report.skipped["NEGEARN"],
        SkipReason::NotEnoughEarnings { found: 1, required: 2 }
    );
}

#[test_log::test(tokio::test)]
async fn test_momentum_screen_end_to_end() {
    logging::log_test_step("Running the momentum screen on seeded data");

    let test_db = init_fresh_test_database().await.unwrap();
    let db = &test_db.db;
    pullback("MOMO", 100.0).insert(db).await.unwrap();
    pullback("LISTED", 100.0).insert(db).await.unwrap();
    pullback("ILLIQ", 100.0)
        .bar(date(2024, 7, 19), 100.0, 100)
        .insert(db)
        .await
        .unwrap();
    pullback("NOSECT", 100.0).sector(None).insert(db).await.unwrap();
    pullback("HIGH", 106.0).insert(db).await.unwrap();

    let thresholds = Thresholds::default();
    let engine = ScreeningEngine::new(db, &thresholds);
    let excluded: HashSet<String> = ["LISTED".to_string()].into_iter().collect();

    let report = engine
        .run_momentum(as_of(), &excluded, &TraceLog::disabled())
        .await
        .unwrap();

    assert_eq!(report.universe_size, 4);
    assert_eq!(report.hits[0].symbols, symbols(&["LISTED", "MOMO"]));
    assert_eq!(report.earning_filter.kept, symbols(&["MOMO"]));
    assert_eq!(report.earning_filter.dropped["LISTED"], FilterReason::AlreadyListed);
}

#[test_log::test(tokio::test)]
async fn test_snapshot_skips_missing_earnings_close_and_volume() {
    let test_db = init_fresh_test_database().await.unwrap();
    let db = &test_db.db;

    // NOCLOSE has no bar on its latest earnings date
    db.upsert_earnings(&[
        EarningsRecord {
            symbol: "NOCLOSE".to_string(),
            date: date(2024, 2, 1),
            change_pct: Some(1.0),
        },
        EarningsRecord {
            symbol: "NOCLOSE".to_string(),
            date: date(2024, 5, 1),
            change_pct: Some(2.0),
        },
    ])
    .await
    .unwrap();
    db.upsert_price_bars(&[
        PriceBar {
            symbol: "NOCLOSE".to_string(),
            date: date(2024, 2, 1),
            close: 100.0,
            volume: Some(2_000_000),
        },
        PriceBar {
            symbol: "NOCLOSE".to_string(),
            date: date(2024, 7, 19),
            close: 95.0,
            volume: Some(2_000_000),
        },
    ])
    .await
    .unwrap();

    // NOVOL's latest bar is stored without a volume
    pullback("NOVOL", 95.0).insert(db).await.unwrap();
    db.upsert_price_bars(&[PriceBar {
        symbol: "NOVOL".to_string(),
        date: date(2024, 7, 19),
        close: 95.0,
        volume: None,
    }])
    .await
    .unwrap();

    let thresholds = Thresholds::default();
    let loader = SnapshotLoader::new(db, &thresholds);
    let trace = TraceLog::disabled();

    assert_eq!(
        loader.load("NOCLOSE", as_of(), &trace).await.unwrap(),
        SnapshotOutcome::Skipped(SkipReason::MissingEarningsClose(date(2024, 5, 1)))
    );
    assert_eq!(
        loader.load("NOVOL", as_of(), &trace).await.unwrap(),
        SnapshotOutcome::Skipped(SkipReason::NoLatestVolume)
    );

    let engine = ScreeningEngine::new(db, &thresholds);
    let report = engine
        .run_season(&symbols(&["NOCLOSE", "NOVOL"]), as_of(), &trace)
        .await
        .unwrap();
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(report.skipped["NOVOL"], SkipReason::NoLatestVolume);
}

/// Reports on 2024-04-01 (100) and 2024-07-10 (110), then `peaks` on the two
/// days after the report and a latest close of 112 on 2024-07-17
fn fade(symbol: &'static str, peaks: (f64, f64)) -> SymbolSeed {
    SymbolSeed::new(symbol)
        .earnings(date(2024, 4, 1), 100.0, 1.0)
        .earnings(date(2024, 7, 10), 110.0, 3.0)
        .bar(date(2024, 7, 11), peaks.0, 2_000_000)
        .bar(date(2024, 7, 12), peaks.1, 2_000_000)
        .bar(date(2024, 7, 17), 112.0, 2_000_000)
}

#[test_log::test(tokio::test)]
async fn test_peak_near_earnings_is_bounded_by_as_of() {
    let test_db = init_fresh_test_database().await.unwrap();
    let db = &test_db.db;
    fade("FADE", (125.0, 130.0)).insert(db).await.unwrap();

    let thresholds = Thresholds::default();
    let loader = SnapshotLoader::new(db, &thresholds);
    let trace = TraceLog::disabled();

    let SnapshotOutcome::Loaded(snap) = loader.load("FADE", date(2024, 7, 17), &trace).await.unwrap() else {
        panic!("FADE should load");
    };
    assert_eq!(snap.peak_close_near_earnings, Some(130.0));

    // on 2024-07-11 the 130 close of the next day is not known yet
    let SnapshotOutcome::Loaded(snap) = loader.load("FADE", date(2024, 7, 11), &trace).await.unwrap() else {
        panic!("FADE should load");
    };
    assert_eq!(snap.peak_close_near_earnings, Some(125.0));
    assert_eq!(snap.latest.date, date(2024, 7, 11));
}

#[test_log::test(tokio::test)]
async fn test_post_earnings_fade_from_stored_peak() {
    let test_db = init_fresh_test_database().await.unwrap();
    let db = &test_db.db;
    // 112 is more than 7% under a 125 peak but not under 115
    fade("FADE", (125.0, 120.0)).insert(db).await.unwrap();
    fade("HOLD", (115.0, 114.0)).insert(db).await.unwrap();

    let thresholds = Thresholds::default();
    let engine = ScreeningEngine::new(db, &thresholds);
    let report = engine
        .run_season(&[], date(2024, 7, 17), &TraceLog::disabled())
        .await
        .unwrap();

    let fade_hits = report.hits.iter().find(|h| h.strategy == "post_earnings_fade").unwrap();
    assert_eq!(fade_hits.symbols, symbols(&["FADE"]));
    assert!(report.notification.kept.contains(&"FADE".to_string()));
}
