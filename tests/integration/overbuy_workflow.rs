//! Overbuy screen on seeded price paths, through to the panel file

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;

use crate::common::test_data::{create_bar_series, date, symbols};
use crate::common::{init_fresh_test_database, logging, SymbolSeed};
use earnings_screener::analysis::{OverbuyScreen, OverbuySignal, TagFilter, TraceLog};
use earnings_screener::models::Thresholds;
use earnings_screener::watchlist::{read_symbol_list, write_symbol_list, OutputPaths, Panel, TagIndex};

#[test_log::test(tokio::test)]
async fn test_overbuy_screen_classifies_reversals() {
    logging::init_test_logging();
    logging::log_test_step("Running the overbuy screen");

    let test_db = init_fresh_test_database().await.unwrap();
    let db = &test_db.db;
    let start = date(2024, 6, 3);

    let paths: Vec<(&'static str, Vec<f64>)> = vec![
        // left top 150, valley 138, right top 149 yesterday
        (
            "RUNUP",
            vec![
                100.0, 105.0, 110.0, 115.0, 120.0, 125.0, 130.0, 135.0, 140.0, 145.0, 150.0, 144.0, 140.0, 138.0,
                142.0, 146.0, 149.0, 145.0,
            ],
        ),
        ("PEAK", vec![100.0, 110.0, 120.0, 130.0, 135.0, 132.0]),
        ("CALM", vec![100.0, 110.0, 120.0, 130.0, 140.0]),
        ("SMALL", vec![100.0, 105.0, 110.0]),
        ("GOLD", vec![100.0, 110.0, 120.0, 130.0, 135.0, 132.0]),
    ];
    for (symbol, closes) in &paths {
        SymbolSeed::new(*symbol).earnings(start, 100.0, 4.0).insert(db).await.unwrap();
        db.upsert_price_bars(&create_bar_series(symbol, start, closes)).await.unwrap();
    }

    let tags = TagIndex::from_json(r#"{"stocks": [{"symbol": "GOLD", "tag": ["gold"]}], "etfs": []}"#).unwrap();
    let filter = TagFilter {
        whitelist: vec![],
        blacklist: vec!["gold".to_string()],
    };
    let thresholds = Thresholds::default();
    let universe: Vec<String> = paths.iter().map(|(s, _)| s.to_string()).collect();

    let report = OverbuyScreen::new(db, &thresholds)
        .run(&universe, date(2024, 7, 19), &tags, &filter, &TraceLog::disabled())
        .await
        .unwrap();
    logging::log_test_data("overbuy rows", &report.rows);

    assert_eq!(report.rows.len(), 3);
    assert_eq!(report.short(), symbols(&["PEAK"]));
    assert_eq!(report.short_shift(), symbols(&["RUNUP"]));

    let runup = report.rows.iter().find(|r| r.symbol == "RUNUP").unwrap();
    assert_matches!(&runup.signal, OverbuySignal::ShortShift(top) if top.left_close == 150.0 && top.right_close == 149.0);
    assert!((runup.gain_pct - 45.0).abs() < 1e-9);

    let calm = report.rows.iter().find(|r| r.symbol == "CALM").unwrap();
    assert_eq!(calm.signal, OverbuySignal::Candidate);

    let lines = report.lines();
    assert!(lines[0].contains("RUNUP"));
    assert!(lines[1].contains("CALM"));
    assert!(lines[2].contains("PEAK"));

    // publish the way the binary does
    let out = OutputPaths::new(test_db.dir.path());
    write_symbol_list(&out.overbuy(), &lines).unwrap();
    assert_eq!(read_symbol_list(&out.overbuy()).unwrap().len(), 3);

    let panel_path = test_db.dir.path().join("Sectors_panel.json");
    let mut panel = Panel::load(&panel_path).unwrap();
    panel.set_group("Short", &report.short());
    panel.set_group("Short_Shift", &report.short_shift());
    panel.save(&panel_path).unwrap();
    assert_eq!(Panel::load(&panel_path).unwrap().group_members("Short_Shift"), symbols(&["RUNUP"]));
}

#[test_log::test(tokio::test)]
async fn test_overbuy_whitelist_overrides_blacklist() {
    let test_db = init_fresh_test_database().await.unwrap();
    let db = &test_db.db;
    let start = date(2024, 6, 3);
    for symbol in ["GOLD", "PEAK"] {
        SymbolSeed::new(symbol).earnings(start, 100.0, 4.0).insert(db).await.unwrap();
        db.upsert_price_bars(&create_bar_series(symbol, start, &[100.0, 120.0, 135.0, 132.0]))
            .await
            .unwrap();
    }

    let tags = TagIndex::from_json(r#"{"stocks": [{"symbol": "GOLD", "tag": ["gold"]}]}"#).unwrap();
    let filter = TagFilter {
        whitelist: vec!["gold".to_string()],
        blacklist: vec!["gold".to_string()],
    };
    let thresholds = Thresholds::default();
    let report = OverbuyScreen::new(db, &thresholds)
        .run(&symbols(&["GOLD", "PEAK"]), date(2024, 7, 19), &tags, &filter, &TraceLog::disabled())
        .await
        .unwrap();

    assert_eq!(report.rows.len(), 1);
    assert_eq!(report.rows[0].symbol, "GOLD");
    assert_eq!(report.short(), symbols(&["GOLD"]));
}

#[test_log::test(tokio::test)]
async fn test_single_peak_uses_full_calendar_window() {
    let test_db = init_fresh_test_database().await.unwrap();
    let db = &test_db.db;
    let start = date(2024, 6, 3);

    let old_peak = vec![
        100.0, 110.0, 120.0, 130.0, 140.0, 150.0, 160.0, 170.0, 180.0, 200.0, // high 20 days before the latest bar
        195.0, 190.0, 185.0, 180.0, 175.0, 170.0, 165.0, 160.0, 155.0, 150.0, 140.0, // slide
        141.0, 142.0, 143.0, 144.0, 145.0, 146.0, 147.0, 150.0, 148.0,
    ];
    let paths: Vec<(&'static str, Vec<f64>)> = vec![
        ("OLDPEAK", old_peak),
        ("FRESH", vec![100.0, 110.0, 120.0, 130.0, 135.0, 132.0]),
    ];
    for (symbol, closes) in &paths {
        SymbolSeed::new(*symbol).earnings(start, 100.0, 4.0).insert(db).await.unwrap();
        db.upsert_price_bars(&create_bar_series(symbol, start, closes)).await.unwrap();
    }

    // a short double-top lookback must not shrink the single-peak window
    let thresholds = Thresholds {
        double_top_lookback: 10,
        ..Thresholds::default()
    };
    let report = OverbuyScreen::new(db, &thresholds)
        .run(
            &symbols(&["OLDPEAK", "FRESH"]),
            date(2024, 7, 19),
            &TagIndex::default(),
            &TagFilter::default(),
            &TraceLog::disabled(),
        )
        .await
        .unwrap();

    assert_eq!(report.rows.len(), 2);
    assert_eq!(report.short(), symbols(&["FRESH"]));
    let old = report.rows.iter().find(|r| r.symbol == "OLDPEAK").unwrap();
    assert_eq!(old.signal, OverbuySignal::Candidate);
}
