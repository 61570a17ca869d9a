//! The physical schema description.
//!
//! A static description of what the indexer persists: platforms contain
//! networks, networks contain entities (tables), entities contain attributes
//! (typed columns). The metadata service projects this through the override
//! tree; the query engine uses it as the identifier whitelist — user input
//! is only ever a lookup key into these structures, never spliced into SQL.

use serde::{Deserialize, Serialize};

/// User-facing data type of an attribute. Serialized PascalCase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Int,
    String,
    Hash,
    Decimal,
    Boolean,
    DateTime,
    AccountAddress,
    Currency,
}

impl DataType {
    /// Whether the type is textual for query purposes (LIKE and friends).
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            Self::String | Self::Hash | Self::AccountAddress | Self::Currency
        )
    }

    /// Whether the type has a meaningful ordering for range predicates.
    pub fn is_ordered(&self) -> bool {
        matches!(self, Self::Int | Self::Decimal | Self::DateTime)
    }
}

/// Whether the attribute participates in the entity's key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    UniqueKey,
    NonKey,
}

/// A typed column of an indexed table.
#[derive(Debug, Clone)]
pub struct PhysicalAttribute {
    /// Attribute name — also the column name.
    pub name: &'static str,
    pub data_type: DataType,
    pub key_type: KeyType,
    /// Low-cardinality columns safe to materialize in the value cache.
    pub cardinality_capped: bool,
}

impl PhysicalAttribute {
    const fn key(name: &'static str, data_type: DataType) -> Self {
        Self {
            name,
            data_type,
            key_type: KeyType::UniqueKey,
            cardinality_capped: false,
        }
    }

    const fn col(name: &'static str, data_type: DataType) -> Self {
        Self {
            name,
            data_type,
            key_type: KeyType::NonKey,
            cardinality_capped: false,
        }
    }

    const fn capped(name: &'static str, data_type: DataType) -> Self {
        Self {
            name,
            data_type,
            key_type: KeyType::NonKey,
            cardinality_capped: true,
        }
    }
}

/// An indexed table.
#[derive(Debug, Clone)]
pub struct PhysicalEntity {
    /// Entity name — also the table name.
    pub name: &'static str,
    pub attributes: Vec<PhysicalAttribute>,
}

impl PhysicalEntity {
    pub fn attribute(&self, name: &str) -> Option<&PhysicalAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// A network of one platform, exposing the indexed entities.
#[derive(Debug, Clone)]
pub struct PhysicalNetwork {
    pub name: String,
    pub entities: Vec<PhysicalEntity>,
}

impl PhysicalNetwork {
    pub fn entity(&self, name: &str) -> Option<&PhysicalEntity> {
        self.entities.iter().find(|e| e.name == name)
    }
}

/// The root of the physical description.
#[derive(Debug, Clone)]
pub struct PhysicalPlatform {
    pub name: String,
    pub networks: Vec<PhysicalNetwork>,
}

impl PhysicalPlatform {
    pub fn network(&self, name: &str) -> Option<&PhysicalNetwork> {
        self.networks.iter().find(|n| n.name == name)
    }
}

fn indexed_entities() -> Vec<PhysicalEntity> {
    use DataType::*;
    vec![
        PhysicalEntity {
            name: "blocks",
            attributes: vec![
                PhysicalAttribute::key("hash", Hash),
                PhysicalAttribute::col("level", Int),
                PhysicalAttribute::col("predecessor", Hash),
                PhysicalAttribute::col("timestamp", DateTime),
                PhysicalAttribute::capped("protocol", String),
                PhysicalAttribute::capped("baker", AccountAddress),
            ],
        },
        PhysicalEntity {
            name: "operations",
            attributes: vec![
                PhysicalAttribute::key("block_hash", Hash),
                PhysicalAttribute::key("op_index", Int),
                PhysicalAttribute::col("block_level", Int),
                PhysicalAttribute::col("group_hash", Hash),
                PhysicalAttribute::capped("kind", String),
                PhysicalAttribute::col("source", AccountAddress),
                PhysicalAttribute::col("destination", AccountAddress),
                PhysicalAttribute::col("delegate", AccountAddress),
                PhysicalAttribute::col("fee", Currency),
                PhysicalAttribute::col("amount", Currency),
                PhysicalAttribute::col("counter", Int),
            ],
        },
        PhysicalEntity {
            name: "accounts",
            attributes: vec![
                PhysicalAttribute::key("account_id", AccountAddress),
                PhysicalAttribute::key("block_level", Int),
                PhysicalAttribute::col("balance", Currency),
                PhysicalAttribute::col("delegate", AccountAddress),
                PhysicalAttribute::col("counter", Int),
                PhysicalAttribute::col("is_baker", Boolean),
            ],
        },
        PhysicalEntity {
            name: "bakers",
            attributes: vec![
                PhysicalAttribute::key("delegate", AccountAddress),
                PhysicalAttribute::key("block_level", Int),
                PhysicalAttribute::col("staking_balance", Currency),
                PhysicalAttribute::col("delegated_balance", Currency),
                PhysicalAttribute::col("deactivated", Boolean),
            ],
        },
        PhysicalEntity {
            name: "rights",
            attributes: vec![
                PhysicalAttribute::key("level", Int),
                PhysicalAttribute::key("delegate", AccountAddress),
                PhysicalAttribute::key("slot", Int),
                PhysicalAttribute::capped("kind", String),
                PhysicalAttribute::col("cycle", Int),
                PhysicalAttribute::col("estimated_time", DateTime),
            ],
        },
        PhysicalEntity {
            name: "fees",
            attributes: vec![
                PhysicalAttribute::capped("kind", String),
                PhysicalAttribute::col("low", Currency),
                PhysicalAttribute::col("mean", Currency),
                PhysicalAttribute::col("high", Currency),
                PhysicalAttribute::col("timestamp", DateTime),
            ],
        },
        PhysicalEntity {
            name: "token_transfers",
            attributes: vec![
                PhysicalAttribute::key("block_level", Int),
                PhysicalAttribute::key("op_index", Int),
                PhysicalAttribute::capped("contract", AccountAddress),
                PhysicalAttribute::col("from_address", AccountAddress),
                PhysicalAttribute::col("to_address", AccountAddress),
                PhysicalAttribute::col("amount", Currency),
            ],
        },
        PhysicalEntity {
            name: "token_balances",
            attributes: vec![
                PhysicalAttribute::key("block_level", Int),
                PhysicalAttribute::key("contract", AccountAddress),
                PhysicalAttribute::key("holder", AccountAddress),
                PhysicalAttribute::col("balance", Currency),
            ],
        },
        PhysicalEntity {
            name: "tns_entries",
            attributes: vec![
                PhysicalAttribute::key("name", String),
                PhysicalAttribute::col("address", AccountAddress),
                PhysicalAttribute::col("registered_at_level", Int),
            ],
        },
    ]
}

/// Build the physical description for one platform and its networks. Every
/// network exposes the same set of indexed entities.
pub fn indexed_schema(platform: &str, networks: &[String]) -> PhysicalPlatform {
    PhysicalPlatform {
        name: platform.to_string(),
        networks: networks
            .iter()
            .map(|n| PhysicalNetwork {
                name: n.clone(),
                entities: indexed_entities(),
            })
            .collect(),
    }
}
