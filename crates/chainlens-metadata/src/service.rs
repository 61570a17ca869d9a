//! The metadata discovery service.
//!
//! Projects the physical schema through the override tree. Merging is a
//! pure function: override wins field-by-field where present, the physical
//! description supplies the rest, and `displayName` falls back to the
//! title-cased identifier.
//!
//! Visibility cascade: a platform is visible only when explicitly enabled;
//! networks, entities, and attributes inherit their parent's visibility
//! unless their own override turns them off. A hidden or unknown path
//! resolves to the same `NotFound` — callers cannot tell the two apart.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::AttributeValueCache;
use crate::error::MetadataError;
use crate::overrides::{
    AttributeOverride, CacheConfig, EntityOverride, MetadataOverrides, NetworkOverride,
    PlatformOverride, Reference,
};
use crate::schema::{DataType, KeyType, PhysicalAttribute, PhysicalEntity, PhysicalPlatform};
use crate::source::DataSource;

/// Hard cap on values materialized per cached attribute.
const CACHE_VALUE_LIMIT: usize = 10_000;
/// Cap on values returned by an uncached prefix lookup.
const LOOKUP_VALUE_LIMIT: usize = 100;
/// TTL for attributes cached because the physical schema marks them
/// cardinality-capped, without an explicit cacheConfig.
const DEFAULT_CACHE_TTL_SECS: u64 = 900;

// ─── Merged projection types ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Platform {
    pub name: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub name: String,
    pub display_name: String,
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub name: String,
    pub display_name: String,
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub name: String,
    pub display_name: String,
    pub data_type: DataType,
    pub key_type: KeyType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<u64>,
    pub entity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_map: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_priority: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_order: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_symbol_code: Option<i32>,
}

/// Title-case an identifier: `token_transfers` → `Token Transfers`.
pub fn title_case(name: &str) -> String {
    name.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ─── Visibility ──────────────────────────────────────────────────────────────

fn platform_visible(ov: Option<&PlatformOverride>) -> bool {
    ov.and_then(|o| o.visible) == Some(true)
}

/// Non-root levels inherit the (already verified) parent visibility unless
/// their own override turns them off.
fn child_visible(own: Option<bool>) -> bool {
    own != Some(false)
}

// ─── The service ─────────────────────────────────────────────────────────────

pub struct MetadataService {
    physical: Vec<PhysicalPlatform>,
    overrides: MetadataOverrides,
    source: Arc<dyn DataSource>,
    cache: Arc<AttributeValueCache>,
}

impl MetadataService {
    pub fn new(
        physical: Vec<PhysicalPlatform>,
        overrides: MetadataOverrides,
        source: Arc<dyn DataSource>,
    ) -> Self {
        Self {
            physical,
            overrides,
            source,
            cache: Arc::new(AttributeValueCache::new()),
        }
    }

    pub fn cache(&self) -> &Arc<AttributeValueCache> {
        &self.cache
    }

    // ── Path resolution ──

    fn resolve_platform(
        &self,
        platform: &str,
    ) -> Result<(&PhysicalPlatform, Option<&PlatformOverride>), MetadataError> {
        let physical = self
            .physical
            .iter()
            .find(|p| p.name == platform)
            .ok_or(MetadataError::NotFound)?;
        let ov = self.overrides.platform(platform);
        if !platform_visible(ov) {
            return Err(MetadataError::NotFound);
        }
        Ok((physical, ov))
    }

    fn resolve_network(
        &self,
        platform: &str,
        network: &str,
    ) -> Result<(&crate::schema::PhysicalNetwork, Option<&NetworkOverride>), MetadataError> {
        let (physical, pov) = self.resolve_platform(platform)?;
        let net = physical.network(network).ok_or(MetadataError::NotFound)?;
        let nov = pov.and_then(|o| o.networks.get(network));
        if !child_visible(nov.and_then(|o| o.visible)) {
            return Err(MetadataError::NotFound);
        }
        Ok((net, nov))
    }

    fn resolve_entity(
        &self,
        platform: &str,
        network: &str,
        entity: &str,
    ) -> Result<(&PhysicalEntity, Option<&EntityOverride>), MetadataError> {
        let (net, nov) = self.resolve_network(platform, network)?;
        let ent = net.entity(entity).ok_or(MetadataError::NotFound)?;
        let eov = nov.and_then(|o| o.entities.get(entity));
        if !child_visible(eov.and_then(|o| o.visible)) {
            return Err(MetadataError::NotFound);
        }
        Ok((ent, eov))
    }

    /// The physical entity behind a visible path. The query engine reads
    /// its identifier whitelist from here.
    pub fn physical_entity(
        &self,
        platform: &str,
        network: &str,
        entity: &str,
    ) -> Result<&PhysicalEntity, MetadataError> {
        self.resolve_entity(platform, network, entity).map(|(e, _)| e)
    }

    /// Resolve one attribute on a visible path. Hidden attributes resolve to
    /// `NotFound`, exactly like unknown ones.
    pub fn resolve_attribute(
        &self,
        platform: &str,
        network: &str,
        entity: &str,
        attribute: &str,
    ) -> Result<(&PhysicalAttribute, Option<&AttributeOverride>), MetadataError> {
        let (ent, eov) = self.resolve_entity(platform, network, entity)?;
        let attr = ent.attribute(attribute).ok_or(MetadataError::NotFound)?;
        let aov = eov.and_then(|o| o.attributes.get(attribute));
        if !child_visible(aov.and_then(|o| o.visible)) {
            return Err(MetadataError::NotFound);
        }
        Ok((attr, aov))
    }

    // ── Discovery ──

    pub fn list_platforms(&self) -> Vec<Platform> {
        self.physical
            .iter()
            .filter(|p| platform_visible(self.overrides.platform(&p.name)))
            .map(|p| {
                let ov = self.overrides.platform(&p.name);
                Platform {
                    name: p.name.clone(),
                    display_name: ov
                        .and_then(|o| o.display_name.clone())
                        .unwrap_or_else(|| title_case(&p.name)),
                    description: ov.and_then(|o| o.description.clone()),
                }
            })
            .collect()
    }

    pub fn list_networks(&self, platform: &str) -> Result<Vec<Network>, MetadataError> {
        let (physical, pov) = self.resolve_platform(platform)?;
        Ok(physical
            .networks
            .iter()
            .filter(|n| {
                let nov = pov.and_then(|o| o.networks.get(&n.name));
                child_visible(nov.and_then(|o| o.visible))
            })
            .map(|n| {
                let nov = pov.and_then(|o| o.networks.get(&n.name));
                Network {
                    name: n.name.clone(),
                    display_name: nov
                        .and_then(|o| o.display_name.clone())
                        .unwrap_or_else(|| title_case(&n.name)),
                    platform: platform.to_string(),
                    description: nov.and_then(|o| o.description.clone()),
                }
            })
            .collect())
    }

    pub async fn list_entities(
        &self,
        platform: &str,
        network: &str,
    ) -> Result<Vec<Entity>, MetadataError> {
        let (net, nov) = self.resolve_network(platform, network)?;
        let mut out = Vec::new();
        for ent in &net.entities {
            let eov = nov.and_then(|o| o.entities.get(ent.name));
            if !child_visible(eov.and_then(|o| o.visible)) {
                continue;
            }
            let count = self.source.count_rows(ent.name).await?;
            out.push(Entity {
                name: ent.name.to_string(),
                display_name: eov
                    .and_then(|o| o.display_name.clone())
                    .unwrap_or_else(|| title_case(ent.name)),
                count,
                description: eov.and_then(|o| o.description.clone()),
            });
        }
        Ok(out)
    }

    pub async fn list_attributes(
        &self,
        platform: &str,
        network: &str,
        entity: &str,
    ) -> Result<Vec<Attribute>, MetadataError> {
        let (ent, eov) = self.resolve_entity(platform, network, entity)?;
        let mut out = Vec::new();
        for attr in &ent.attributes {
            let aov = eov.and_then(|o| o.attributes.get(attr.name));
            if !child_visible(aov.and_then(|o| o.visible)) {
                continue;
            }
            let cardinality = self
                .cache
                .get(&value_cache_key(network, ent.name, attr.name))
                .await
                .map(|entry| entry.values.len() as u64);
            out.push(merge_attribute(attr, aov, ent.name, cardinality));
        }
        Ok(out)
    }

    // ── Attribute values ──

    /// Distinct values of one attribute, optionally bounded to a prefix.
    /// Cached attributes serve from the value cache (stale entries keep
    /// serving while a single background refresh runs); everything else
    /// falls back to a prefix-bounded lookup against the live table.
    pub async fn attribute_values(
        &self,
        platform: &str,
        network: &str,
        entity: &str,
        attribute: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<String>, MetadataError> {
        // Resolve through the physical description so the table and column
        // identifiers below never originate from the request path.
        let table = self.physical_entity(platform, network, entity)?.name;
        let (attr, aov) = self.resolve_attribute(platform, network, entity, attribute)?;
        if !attr.data_type.is_textual() {
            return Err(MetadataError::QueryValidation(format!(
                "attribute '{attribute}' does not support value listing"
            )));
        }

        let cache_cfg = effective_cache_config(attr, aov);
        let Some(cfg) = cache_cfg else {
            return self
                .source
                .distinct_values(table, attr.name, prefix, LOOKUP_VALUE_LIMIT)
                .await;
        };

        let key = value_cache_key(network, table, attr.name);
        let ttl = Duration::from_secs(cfg.ttl_secs);

        if let Some(entry) = self.cache.get(&key).await {
            if entry.is_stale(chrono::Utc::now()) && self.cache.try_begin_refresh(&key) {
                self.spawn_refresh(key.clone(), table.to_string(), attr.name.to_string(), ttl);
            }
            return Ok(filter_prefix(&entry.values, prefix));
        }

        // Cold cache: load synchronously so the first caller sees data.
        let values = self
            .source
            .distinct_values(table, attr.name, None, CACHE_VALUE_LIMIT)
            .await?;
        self.cache.insert(&key, values.clone(), ttl).await;
        Ok(filter_prefix(&values, prefix))
    }

    fn spawn_refresh(&self, key: String, table: String, column: String, ttl: Duration) {
        let source = Arc::clone(&self.source);
        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            match source
                .distinct_values(&table, &column, None, CACHE_VALUE_LIMIT)
                .await
            {
                Ok(values) => {
                    debug!(key, count = values.len(), "attribute value cache refreshed");
                    cache.insert(&key, values, ttl).await;
                }
                Err(e) => {
                    warn!(key, error = %e, "attribute value cache refresh failed");
                    cache.end_refresh(&key);
                }
            }
        });
    }

    /// Background refresher: periodically re-walks every held cache entry and
    /// refreshes the stale ones. Runs until the handle is dropped/aborted.
    pub fn spawn_cache_refresher(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                let now = chrono::Utc::now();
                for key in service.cache.keys().await {
                    let Some(entry) = service.cache.get(&key).await else {
                        continue;
                    };
                    if !entry.is_stale(now) || !service.cache.try_begin_refresh(&key) {
                        continue;
                    }
                    let Some((_, table, column)) = split_cache_key(&key) else {
                        service.cache.end_refresh(&key);
                        continue;
                    };
                    service.spawn_refresh(key.clone(), table, column, entry.ttl);
                }
            }
        })
    }
}

fn value_cache_key(network: &str, entity: &str, attribute: &str) -> String {
    format!("{network}.{entity}.{attribute}")
}

fn split_cache_key(key: &str) -> Option<(String, String, String)> {
    let mut parts = key.splitn(3, '.');
    Some((
        parts.next()?.to_string(),
        parts.next()?.to_string(),
        parts.next()?.to_string(),
    ))
}

fn effective_cache_config(
    attr: &PhysicalAttribute,
    ov: Option<&AttributeOverride>,
) -> Option<CacheConfig> {
    match ov.and_then(|o| o.cache_config.clone()) {
        Some(cfg) if cfg.cached => Some(cfg),
        Some(_) => None,
        None if attr.cardinality_capped => Some(CacheConfig {
            cached: true,
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }),
        None => None,
    }
}

fn filter_prefix(values: &[String], prefix: Option<&str>) -> Vec<String> {
    match prefix {
        Some(p) => values.iter().filter(|v| v.starts_with(p)).cloned().collect(),
        None => values.to_vec(),
    }
}

/// Field-by-field merge: override wins where present.
fn merge_attribute(
    attr: &PhysicalAttribute,
    ov: Option<&AttributeOverride>,
    entity: &str,
    cardinality: Option<u64>,
) -> Attribute {
    Attribute {
        name: attr.name.to_string(),
        display_name: ov
            .and_then(|o| o.display_name.clone())
            .unwrap_or_else(|| title_case(attr.name)),
        data_type: ov.and_then(|o| o.data_type).unwrap_or(attr.data_type),
        key_type: attr.key_type,
        cardinality,
        entity: entity.to_string(),
        description: ov.and_then(|o| o.description.clone()),
        placeholder: ov.and_then(|o| o.placeholder.clone()),
        scale: ov.and_then(|o| o.scale),
        data_format: ov.and_then(|o| o.data_format.clone()),
        value_map: ov.and_then(|o| o.value_map.clone()),
        reference: ov.and_then(|o| o.reference.clone()),
        display_priority: ov.and_then(|o| o.display_priority),
        display_order: ov.and_then(|o| o.display_order),
        currency_symbol: ov.and_then(|o| o.currency_symbol.clone()),
        currency_symbol_code: ov.and_then(|o| o.currency_symbol_code),
    }
}
