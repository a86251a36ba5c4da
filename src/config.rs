//! Runtime settings shared by every action in a registry.
//!
//! All fields have defaults, so a host can deserialize a partial document:
//!
//! ```rust
//! use lanyard::LanyardConfig;
//!
//! let cfg: LanyardConfig = serde_json::from_str(r#"{"default_per_page": 50}"#).unwrap();
//! assert_eq!(cfg.default_per_page, 50);
//! assert_eq!(cfg.full_param, "_full");
//! ```

use serde::{Deserialize, Serialize};

/// Fallback page size when a collection declares none.
pub const DEFAULT_PER_PAGE: usize = 30;

/// Names of reserved client parameters and pagination defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanyardConfig {
    /// Client toggle for full-detail projections.
    pub full_param: String,
    /// Client toggle or name list for expansions.
    pub expansions_param: String,
    /// Requested page number.
    pub page_param: String,
    /// Requested page size.
    pub per_page_param: String,
    /// Client filter object.
    pub filters_param: String,
    /// Page size used when the collection has no default of its own.
    pub default_per_page: usize,
}

impl Default for LanyardConfig {
    fn default() -> Self {
        Self {
            full_param: "_full".into(),
            expansions_param: "_expansions".into(),
            page_param: "page".into(),
            per_page_param: "per_page".into(),
            filters_param: "filters".into(),
            default_per_page: DEFAULT_PER_PAGE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_documents_keep_defaults() {
        let cfg: LanyardConfig =
            serde_json::from_str(r#"{"expansions_param": "expand"}"#).expect("valid config");
        assert_eq!(cfg.expansions_param, "expand");
        assert_eq!(cfg.per_page_param, "per_page");
        assert_eq!(cfg.default_per_page, DEFAULT_PER_PAGE);
    }
}
