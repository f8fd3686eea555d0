//! Unit tests for database operations

use pretty_assertions::assert_eq;

use crate::common::test_data::{date, symbols};
use crate::common::{init_fresh_test_database, logging, SymbolSeed};
use earnings_screener::database::MarketDataSource;

#[test_log::test(tokio::test)]
async fn test_recent_earnings_newest_first_and_bounded() {
    logging::init_test_logging();
    logging::log_test_step("Testing earnings reads");

    let test_db = init_fresh_test_database().await.unwrap();
    let db = &test_db.db;
    SymbolSeed::new("ACME")
        .earnings(date(2023, 11, 1), 90.0, 1.0)
        .earnings(date(2024, 2, 1), 100.0, -2.0)
        .earnings(date(2024, 5, 1), 110.0, 3.0)
        .insert(db)
        .await
        .unwrap();

    let records = db.recent_earnings("ACME", 4, date(2024, 4, 1)).await.unwrap();
    let dates: Vec<_> = records.iter().map(|r| r.date).collect();
    assert_eq!(dates, vec![date(2024, 2, 1), date(2023, 11, 1)]);
    assert_eq!(records[0].change_pct, Some(-2.0));

    let limited = db.recent_earnings("ACME", 1, date(2024, 6, 1)).await.unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].date, date(2024, 5, 1));

    assert_eq!(db.close_on("ACME", date(2024, 2, 1)).await.unwrap(), Some(100.0));
    assert_eq!(db.close_on("ACME", date(2024, 2, 2)).await.unwrap(), None);
}

#[test_log::test(tokio::test)]
async fn test_earnings_symbols_and_negative_reactions() {
    let test_db = init_fresh_test_database().await.unwrap();
    let db = &test_db.db;
    SymbolSeed::new("OLD").earnings(date(2024, 1, 10), 50.0, -4.0).insert(db).await.unwrap();
    SymbolSeed::new("NEG").earnings(date(2024, 7, 1), 50.0, -1.5).insert(db).await.unwrap();
    SymbolSeed::new("POS").earnings(date(2024, 7, 2), 50.0, 2.0).insert(db).await.unwrap();
    SymbolSeed::new("LATE").earnings(date(2024, 8, 1), 50.0, -3.0).insert(db).await.unwrap();

    assert_eq!(
        db.earnings_symbols(date(2024, 7, 19)).await.unwrap(),
        symbols(&["NEG", "OLD", "POS"])
    );

    let negative = db
        .negative_earnings_since(date(2024, 6, 19), date(2024, 7, 19))
        .await
        .unwrap();
    assert_eq!(negative.len(), 1);
    assert!(negative.contains("NEG"));
}

#[test_log::test(tokio::test)]
async fn test_stats_and_symbol_listing() {
    let test_db = init_fresh_test_database().await.unwrap();
    let db = &test_db.db;
    SymbolSeed::new("AAA")
        .earnings(date(2024, 5, 1), 10.0, 1.0)
        .bar(date(2024, 5, 2), 10.5, 1_000)
        .insert(db)
        .await
        .unwrap();
    SymbolSeed::new("BBB")
        .sector(None)
        .bar(date(2024, 5, 3), 20.0, 1_000)
        .insert(db)
        .await
        .unwrap();

    let stats = db.get_stats().await.unwrap();
    logging::log_test_data("stats", &stats);
    assert_eq!(stats.total_symbols, 2);
    assert_eq!(stats.total_price_bars, 3);
    assert_eq!(stats.total_earnings, 1);
    assert_eq!(stats.latest_price_date, Some(date(2024, 5, 3)));

    assert_eq!(db.all_symbols().await.unwrap(), symbols(&["AAA", "BBB"]));
    assert_eq!(
        db.symbols_in_sectors(&symbols(&["Technology", "Energy"])).await.unwrap(),
        symbols(&["AAA"])
    );
}
