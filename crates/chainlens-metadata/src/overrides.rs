//! The operator's metadata override tree.
//!
//! A four-level configuration tree shadowing the physical schema. Every
//! field is optional: an override wins where present, the physical schema
//! supplies the rest. The tree is loaded once at startup and never mutated
//! afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::schema::DataType;

/// Root of the override tree: platform name → overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataOverrides {
    #[serde(default)]
    pub platforms: HashMap<String, PlatformOverride>,
}

impl MetadataOverrides {
    pub fn platform(&self, name: &str) -> Option<&PlatformOverride> {
        self.platforms.get(name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformOverride {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub visible: Option<bool>,
    #[serde(default)]
    pub networks: HashMap<String, NetworkOverride>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkOverride {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub visible: Option<bool>,
    #[serde(default)]
    pub entities: HashMap<String, EntityOverride>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityOverride {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub visible: Option<bool>,
    #[serde(default)]
    pub attributes: HashMap<String, AttributeOverride>,
}

/// Attribute-level presentation and caching overrides.
///
/// `data_type` rewrites the user-facing label only — the query engine always
/// validates operands against the physical column type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeOverride {
    pub display_name: Option<String>,
    pub visible: Option<bool>,
    pub description: Option<String>,
    pub placeholder: Option<String>,
    pub scale: Option<i32>,
    pub data_type: Option<DataType>,
    pub data_format: Option<String>,
    pub value_map: Option<HashMap<String, String>>,
    pub reference: Option<Reference>,
    pub display_priority: Option<i32>,
    pub display_order: Option<i32>,
    pub currency_symbol: Option<String>,
    pub currency_symbol_code: Option<i32>,
    pub cache_config: Option<CacheConfig>,
}

/// A pointer to another entity's key, for UI linking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub entity: String,
    pub key: String,
}

/// Per-attribute value-cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    pub cached: bool,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_ttl_secs() -> u64 {
    900
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_tree_parses_from_toml() {
        let overrides: MetadataOverrides = toml::from_str(
            r#"
            [platforms.tezos]
            visible = true
            displayName = "Tezos"

            [platforms.tezos.networks.mainnet.entities.blocks.attributes.hash]
            dataType = "Hash"
            currencySymbol = "XTZ"
            currencySymbolCode = 42793
            scale = 6

            [platforms.tezos.networks.mainnet.entities.blocks.attributes.baker]
            cacheConfig = { cached = true, ttlSecs = 60 }
            "#,
        )
        .unwrap();

        let platform = overrides.platform("tezos").unwrap();
        assert_eq!(platform.visible, Some(true));
        assert_eq!(platform.display_name.as_deref(), Some("Tezos"));

        let attrs = &platform.networks["mainnet"].entities["blocks"].attributes;
        let hash = &attrs["hash"];
        assert_eq!(hash.data_type, Some(DataType::Hash));
        assert_eq!(hash.currency_symbol.as_deref(), Some("XTZ"));
        assert_eq!(hash.currency_symbol_code, Some(42793));
        assert_eq!(hash.scale, Some(6));

        let cache = attrs["baker"].cache_config.as_ref().unwrap();
        assert!(cache.cached);
        assert_eq!(cache.ttl_secs, 60);
    }

    #[test]
    fn cache_config_ttl_defaults() {
        let cfg: CacheConfig = toml::from_str("cached = true").unwrap();
        assert_eq!(cfg.ttl_secs, 900);
    }
}
