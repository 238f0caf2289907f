#![forbid(unsafe_code)]

//! Browser front end for the live question index.
//!
//! This crate provides [`QuestionsToc`], a `wasm-bindgen`-exported struct
//! that wraps a `qtoc_core::TocSession` over the page DOM and exposes it to
//! JavaScript for host-driven execution. The host owns the panel markup and
//! the animation loop; the engine owns discovery, dedup, filtering and
//! scroll reconciliation.

#[cfg(target_arch = "wasm32")]
mod wasm;

#[cfg(target_arch = "wasm32")]
mod web_dom;

#[cfg(target_arch = "wasm32")]
pub use wasm::QuestionsToc;

// Runner core is used by the wasm module and by native tests.
#[cfg(any(target_arch = "wasm32", test))]
mod runner_core;

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use qtoc_core::ConfigError;
    use qtoc_core::headless::HeadlessDocument;

    use crate::runner_core::{RunnerCore, StepSummary};

    fn transcript(questions: &[&str]) -> HeadlessDocument {
        let (mut doc, main) = HeadlessDocument::with_scroller(800.0);
        for (i, q) in questions.iter().enumerate() {
            let top = i as f64 * 420.0;
            doc.append_turn(main, "user", q, top, 120.0);
            doc.append_turn(main, "assistant", "Answer.", top + 120.0, 300.0);
        }
        doc
    }

    fn core(questions: &[&str]) -> RunnerCore<HeadlessDocument> {
        RunnerCore::new(transcript(questions), None).expect("default config")
    }

    #[test]
    fn runner_core_accepts_partial_config() {
        let core = RunnerCore::new(transcript(&[]), Some(r#"{ "debounce_ms": 50 }"#))
            .expect("partial config");
        assert_eq!(core.session().config().debounce_ms, 50);
        assert_eq!(core.session().config().settle_ms, 450);
    }

    #[test]
    fn runner_core_blank_config_means_defaults() {
        let core = RunnerCore::new(transcript(&[]), Some("  ")).expect("blank config");
        assert_eq!(core.session().config().debounce_ms, 400);
    }

    #[test]
    fn runner_core_rejects_bad_config() {
        let err = RunnerCore::new(transcript(&[]), Some("not json")).err();
        assert!(matches!(err, Some(ConfigError::Json(_))));

        let err = RunnerCore::new(transcript(&[]), Some(r#"{ "anchor_ratio": 2.0 }"#)).err();
        assert_eq!(
            err,
            Some(ConfigError::OutOfRange {
                field: "anchor_ratio",
                value: 2.0
            })
        );
    }

    #[test]
    fn runner_core_push_encoded_signal() {
        let mut core = core(&["How do traits work?"]);
        assert!(core.push_encoded_signal(r#"{"kind":"mutation"}"#));
        let summary = core.step(0.0);
        assert_eq!(summary.signals_processed, 1);
        assert_eq!(summary.rebuilt, None);

        let summary = core.step(400.0);
        assert_eq!(summary.rebuilt, Some("debounce"));
        assert_eq!(core.count(), 1);
    }

    #[test]
    fn runner_core_malformed_signal_returns_false() {
        let mut core = core(&[]);
        assert!(!core.push_encoded_signal("not json"));
        assert!(!core.push_encoded_signal(r#"{"kind":"resize"}"#));
        assert_eq!(core.step(0.0).signals_processed, 0);
    }

    #[test]
    fn runner_core_refresh_signal_rebuilds_in_step() {
        let mut core = core(&["one", "two"]);
        assert!(core.push_encoded_signal(r#"{"kind":"refresh"}"#));
        let summary = core.step(5.0);
        assert_eq!(
            summary,
            StepSummary {
                signals_processed: 1,
                rebuilt: Some("forced"),
                query_applied: false,
                navigation: None,
                rows_version: 1,
            }
        );
    }

    #[test]
    fn runner_core_rows_json() {
        let mut core = core(&["Why <b> is escaped?"]);
        core.refresh();
        let rows: serde_json::Value = serde_json::from_str(&core.rows_json()).expect("json");
        let row = &rows[0];
        assert_eq!(row["identity"], "q-1");
        assert_eq!(row["ordinal"], 1);
        assert_eq!(row["label"], "1. Why <b> is escaped?");
        assert_eq!(row["visible"], true);
        assert_eq!(row["markup"], "1. Why &lt;b&gt; is escaped?");
    }

    #[test]
    fn runner_core_query_is_debounced() {
        let mut core = core(&["Sort a list", "Parse a date"]);
        core.refresh();
        core.step(0.0);
        core.set_query("date");
        assert!(!core.step(50.0).query_applied);
        assert!(core.step(120.0).query_applied);
        assert_eq!(core.visible_count(), 1);

        core.clear_query();
        assert_eq!(core.visible_count(), 2);
    }

    #[test]
    fn runner_core_navigate() {
        let questions: Vec<String> = (0..12).map(|i| format!("Question {i}")).collect();
        let refs: Vec<&str> = questions.iter().map(String::as_str).collect();
        let mut core = core(&refs);
        core.refresh();
        core.step(0.0);

        assert!(!core.navigate_to("q-999"));
        let id = core.rows()[8].identity.clone();
        assert!(core.navigate_to(&id));
        assert_eq!(core.step(450.0).navigation, Some("settled"));
        assert_eq!(core.step(1350.0).navigation, Some("finished"));
    }

    #[test]
    fn runner_core_clock_ignores_garbage() {
        let mut core = core(&["one"]);
        core.step(f64::NAN);
        core.step(-5.0);
        assert_eq!(core.session().now(), std::time::Duration::ZERO);
        core.step(500.0);
        assert_eq!(core.session().now(), std::time::Duration::from_millis(500));
    }
}
