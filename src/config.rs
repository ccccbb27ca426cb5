//! Runtime configuration.
//!
//! Settings come from environment variables (a `.env` file is loaded by the
//! binary first). Backend-specific variables are read by the row source
//! constructors themselves.

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::render::RenderOptions;
use crate::source::{RowSource, SheetRowSource, SourceKind, SupabaseRowSource};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Settings for the demo server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: String,
    pub source: SourceKind,
    /// Defaults for both renderers; individual requests may override them.
    pub render: RenderOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            source: SourceKind::Supabase,
            render: RenderOptions::default(),
        }
    }
}

impl AppConfig {
    /// Read `BIND_ADDR`, `TREE_SOURCE` and `TREE_EMPTY_MSG`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = lookup("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(kind) = lookup("TREE_SOURCE") {
            config.source = kind
                .parse()
                .map_err(|e: String| anyhow!(e))
                .context("Invalid TREE_SOURCE")?;
        }
        if let Some(msg) = lookup("TREE_EMPTY_MSG") {
            config.render.empty_tree_msg = msg;
        }

        Ok(config)
    }

    /// Construct the configured row source from its environment variables.
    pub fn row_source(&self) -> Result<Box<dyn RowSource>> {
        let source: Box<dyn RowSource> = match self.source {
            SourceKind::Supabase => Box::new(
                SupabaseRowSource::from_env().context("Failed to configure Supabase source")?,
            ),
            SourceKind::Sheet => Box::new(
                SheetRowSource::from_env().context("Failed to configure sheet source")?,
            ),
        };
        info!("Row source: {:?} ({})", self.source, source.name());
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AppConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.render.empty_tree_msg, "Empty tree");
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("TREE_SOURCE", "sheet"),
            ("TREE_EMPTY_MSG", "No categories"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.source, SourceKind::Sheet);
        assert_eq!(config.render.empty_tree_msg, "No categories");
    }

    #[test]
    fn test_invalid_source_kind() {
        let result = AppConfig::from_lookup(lookup_from(&[("TREE_SOURCE", "ldap")]));
        assert!(result.is_err());
    }
}
