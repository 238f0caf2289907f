#![forbid(unsafe_code)]

//! Session configuration.
//!
//! [`TocConfig`] is plain data with serde defaults, so a host can pass a
//! partial JSON object and get defaults for everything it omits:
//!
//! ```
//! use qtoc_core::config::TocConfig;
//!
//! let cfg = TocConfig::from_json(r#"{ "debounce_ms": 250 }"#).unwrap();
//! assert_eq!(cfg.debounce_ms, 250);
//! assert_eq!(cfg.settle_ms, 450);
//! ```
//!
//! [`TocConfig::compile`] validates the values and parses the selector
//! strings once into [`CompiledSelectors`].

use core::fmt;
use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::selector::{Selector, SelectorError};

/// Configuration errors. The only errors a host ever sees from the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The JSON document could not be decoded.
    Json(String),
    /// A duration that must be positive is zero.
    ZeroDuration(&'static str),
    /// A numeric field is outside its allowed range.
    OutOfRange { field: &'static str, value: f64 },
    /// A selector string failed to parse.
    Selector {
        field: &'static str,
        source: SelectorError,
    },
    /// A class name is empty or contains whitespace.
    InvalidClass(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(msg) => write!(f, "invalid configuration JSON: {msg}"),
            Self::ZeroDuration(field) => write!(f, "{field} must be greater than zero"),
            Self::OutOfRange { field, value } => write!(f, "{field} is out of range: {value}"),
            Self::Selector { field, source } => write!(f, "invalid selector in {field}: {source}"),
            Self::InvalidClass(field) => {
                write!(f, "{field} must be a single non-empty class name")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Selector { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Selector strings describing the host's transcript markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// One user-authored entry container.
    pub entry: String,
    /// Text container patterns inside an entry, in preference order.
    pub text_candidates: Vec<String>,
    /// Tags whose subtrees never contribute text.
    pub exclude_tags: Vec<String>,
    /// Root of the application, used to scope host observers.
    pub app_root: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            entry: concat!(
                r#"article[data-message-author-role="user"], "#,
                r#"div[data-message-author-role="user"], "#,
                r#"[data-testid="conversation-turn-User"]"#
            )
            .to_owned(),
            text_candidates: [
                r#"[data-message-author-role="user"] .markdown"#,
                r#"[data-message-author-role="user"] .prose"#,
                r#"[data-message-author-role="user"]"#,
                ".whitespace-pre-wrap",
                ".break-words",
                "p, li",
            ]
            .map(str::to_owned)
            .to_vec(),
            exclude_tags: ["pre", "code", "nav", "button", "svg", "style", "script"]
                .map(str::to_owned)
                .to_vec(),
            app_root: "main, #__next, #root, body".to_owned(),
        }
    }
}

/// Tunables for one session. Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TocConfig {
    /// Quiet period after the last mutation before a rebuild.
    pub debounce_ms: u64,
    /// Periodic rescan interval, in case mutation signals are missed.
    pub fallback_scan_ms: u64,
    /// How long the navigation highlight stays on.
    pub highlight_ms: u64,
    /// Label length cap, in grapheme clusters.
    pub max_label_chars: usize,
    /// Delay between the jump and the verification pass.
    pub settle_ms: u64,
    /// Allowed deviation from the target position before correcting.
    pub center_tolerance_px: f64,
    /// Target position of the anchor as a fraction of the container height.
    pub anchor_ratio: f64,
    /// Manual scroll ends after this much scroll silence.
    pub scroll_idle_ms: u64,
    /// Delay of the forced refresh after a route change.
    pub route_settle_ms: u64,
    /// Query input debounce.
    pub filter_debounce_ms: u64,
    /// Class applied to an anchor while highlighted.
    pub flash_class: String,
    /// Class of the highlight markers in rendered labels.
    pub mark_class: String,
    pub selectors: SelectorConfig,
}

impl Default for TocConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 400,
            fallback_scan_ms: 8000,
            highlight_ms: 900,
            max_label_chars: 110,
            settle_ms: 450,
            center_tolerance_px: 24.0,
            anchor_ratio: 0.35,
            scroll_idle_ms: 600,
            route_settle_ms: 150,
            filter_debounce_ms: 120,
            flash_class: "qtoc__flash".to_owned(),
            mark_class: "qtoc__mark".to_owned(),
            selectors: SelectorConfig::default(),
        }
    }
}

impl TocConfig {
    /// Decode a (possibly partial) JSON object and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(json).map_err(|e| ConfigError::Json(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check value ranges. Selector syntax is checked by [`Self::compile`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fallback_scan_ms == 0 {
            return Err(ConfigError::ZeroDuration("fallback_scan_ms"));
        }
        if self.max_label_chars == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_label_chars",
                value: 0.0,
            });
        }
        if !(0.0..=1.0).contains(&self.anchor_ratio) {
            return Err(ConfigError::OutOfRange {
                field: "anchor_ratio",
                value: self.anchor_ratio,
            });
        }
        if !self.center_tolerance_px.is_finite() || self.center_tolerance_px < 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "center_tolerance_px",
                value: self.center_tolerance_px,
            });
        }
        check_class("flash_class", &self.flash_class)?;
        check_class("mark_class", &self.mark_class)?;
        Ok(())
    }

    /// Validate and parse every selector.
    pub fn compile(&self) -> Result<CompiledSelectors, ConfigError> {
        self.validate()?;
        let sel = &self.selectors;
        let parse = |field: &'static str, css: &str| {
            Selector::parse(css).map_err(|source| ConfigError::Selector { field, source })
        };
        let text_candidates = sel
            .text_candidates
            .iter()
            .map(|css| parse("selectors.text_candidates", css))
            .collect::<Result<Vec<_>, _>>()?;
        let exclude_tags = sel
            .exclude_tags
            .iter()
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Ok(CompiledSelectors {
            entry: parse("selectors.entry", &sel.entry)?,
            text_candidates,
            exclude_tags,
            app_root: parse("selectors.app_root", &sel.app_root)?,
        })
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[must_use]
    pub fn fallback_scan(&self) -> Duration {
        Duration::from_millis(self.fallback_scan_ms)
    }

    #[must_use]
    pub fn highlight(&self) -> Duration {
        Duration::from_millis(self.highlight_ms)
    }

    #[must_use]
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    #[must_use]
    pub fn scroll_idle(&self) -> Duration {
        Duration::from_millis(self.scroll_idle_ms)
    }

    #[must_use]
    pub fn route_settle(&self) -> Duration {
        Duration::from_millis(self.route_settle_ms)
    }

    #[must_use]
    pub fn filter_debounce(&self) -> Duration {
        Duration::from_millis(self.filter_debounce_ms)
    }
}

fn check_class(field: &'static str, class: &str) -> Result<(), ConfigError> {
    if class.is_empty() || class.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidClass(field));
    }
    Ok(())
}

/// Parsed selectors, shared by discovery, extraction and indexing.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSelectors {
    pub entry: Selector,
    pub text_candidates: Vec<Selector>,
    /// Lowercase tag names.
    pub exclude_tags: Vec<String>,
    pub app_root: Selector,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_compile() {
        let cfg = TocConfig::default();
        let compiled = cfg.compile().unwrap();
        assert_eq!(compiled.text_candidates.len(), 6);
        assert_eq!(
            compiled.exclude_tags,
            vec!["pre", "code", "nav", "button", "svg", "style", "script"]
        );
        assert_eq!(cfg.debounce(), Duration::from_millis(400));
        assert_eq!(cfg.fallback_scan(), Duration::from_secs(8));
        assert_eq!(cfg.highlight(), Duration::from_millis(900));
        assert_eq!(cfg.max_label_chars, 110);
        assert_eq!(cfg.center_tolerance_px, 24.0);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = TocConfig::from_json(
            r#"{ "settle_ms": 300, "selectors": { "exclude_tags": ["pre"] } }"#,
        )
        .unwrap();
        assert_eq!(cfg.settle_ms, 300);
        assert_eq!(cfg.debounce_ms, 400);
        assert_eq!(cfg.selectors.exclude_tags, vec!["pre".to_owned()]);
        assert_eq!(cfg.selectors.entry, SelectorConfig::default().entry);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            TocConfig::from_json("{ not json"),
            Err(ConfigError::Json(_))
        ));
        assert_eq!(
            TocConfig::from_json(r#"{ "fallback_scan_ms": 0 }"#),
            Err(ConfigError::ZeroDuration("fallback_scan_ms"))
        );
        assert_eq!(
            TocConfig::from_json(r#"{ "anchor_ratio": 1.5 }"#),
            Err(ConfigError::OutOfRange {
                field: "anchor_ratio",
                value: 1.5
            })
        );
        assert_eq!(
            TocConfig::from_json(r#"{ "flash_class": "two words" }"#),
            Err(ConfigError::InvalidClass("flash_class"))
        );
    }

    #[test]
    fn rejects_bad_selector_at_compile() {
        let mut cfg = TocConfig::default();
        cfg.selectors.entry = "article[data-role".to_owned();
        let err = cfg.compile().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Selector {
                field: "selectors.entry",
                ..
            }
        ));
        assert!(err.to_string().contains("selectors.entry"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn serializes_round_trip_shape() {
        let json = serde_json::to_value(TocConfig::default()).unwrap();
        assert_eq!(json["debounce_ms"], 400);
        assert_eq!(json["flash_class"], "qtoc__flash");
        assert!(json["selectors"]["text_candidates"].is_array());
    }
}
