//! Typed views of the game packets the fusion workflow reads and emits.
//!
//! Only the fields the workflow uses are modelled; everything else the host
//! decodes is ignored on deserialisation.

use crate::{
    deserialize_opt_u64_lenient, deserialize_u64_lenient, CatalogId, Dbid, GameId, ItemRef,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InboundKind {
    ItemList,
    ContractOpened,
    RegisterAck,
    EvolutionResult,
}

impl InboundKind {
    pub const ALL: [InboundKind; 4] = [
        InboundKind::ItemList,
        InboundKind::ContractOpened,
        InboundKind::RegisterAck,
        InboundKind::EvolutionResult,
    ];

    pub fn packet_name(self) -> &'static str {
        match self {
            InboundKind::ItemList => "S_ITEMLIST",
            InboundKind::ContractOpened => "S_REQUEST_CONTRACT",
            InboundKind::RegisterAck => "S_REGISTER_EVOLUTION_ITEM",
            InboundKind::EvolutionResult => "S_RESULT_EVOLUTION",
        }
    }

    /// Definition version the host must decode the packet with.
    pub fn version(self) -> u32 {
        match self {
            InboundKind::ItemList => 4,
            InboundKind::ContractOpened => 1,
            InboundKind::RegisterAck => 3,
            InboundKind::EvolutionResult => 999,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data")]
pub enum InboundPacket {
    #[serde(rename = "S_ITEMLIST")]
    ItemList(ItemListEvent),
    #[serde(rename = "S_REQUEST_CONTRACT")]
    ContractOpened(ContractOpenedEvent),
    #[serde(rename = "S_REGISTER_EVOLUTION_ITEM")]
    RegisterAck(RegisterAckEvent),
    #[serde(rename = "S_RESULT_EVOLUTION")]
    EvolutionResult(EvolutionResultEvent),
}

impl InboundPacket {
    pub fn kind(&self) -> InboundKind {
        match self {
            InboundPacket::ItemList(_) => InboundKind::ItemList,
            InboundPacket::ContractOpened(_) => InboundKind::ContractOpened,
            InboundPacket::RegisterAck(_) => InboundKind::RegisterAck,
            InboundPacket::EvolutionResult(_) => InboundKind::EvolutionResult,
        }
    }
}

/// One page of the player's inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemListEvent {
    #[serde(rename = "gameId", deserialize_with = "deserialize_u64_lenient")]
    pub game_id: GameId,
    #[serde(deserialize_with = "deserialize_u64_lenient")]
    pub money: u64,
    #[serde(default, deserialize_with = "deserialize_stacks")]
    pub items: Vec<ItemStack>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub id: CatalogId,
    pub dbid: Dbid,
    #[serde(default, rename = "amount", skip_serializing_if = "Option::is_none")]
    pub raw_amount: Option<u64>,
}

impl ItemStack {
    pub fn new(dbid: u64, id: u32, amount: u64) -> Self {
        Self {
            id: CatalogId(id),
            dbid: Dbid(dbid),
            raw_amount: Some(amount),
        }
    }

    /// Stack size; a missing or zero amount counts as a single item.
    pub fn amount(&self) -> u64 {
        self.raw_amount.filter(|amount| *amount > 0).unwrap_or(1)
    }

    pub fn item_ref(&self) -> ItemRef {
        ItemRef {
            dbid: self.dbid,
            id: self.id,
            amount: self.amount(),
        }
    }
}

/// Hosts deliver the item collection either as an array or as an object keyed
/// by slot; null slots are skipped.
fn deserialize_stacks<'de, D>(deserializer: D) -> Result<Vec<ItemStack>, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Value = Value::deserialize(deserializer)?;
    let entries: Vec<Value> = match val {
        Value::Null => Vec::new(),
        Value::Array(entries) => entries,
        Value::Object(map) => map.into_iter().map(|(_, entry)| entry).collect(),
        _ => {
            return Err(serde::de::Error::custom(
                "expected array or object for items",
            ))
        }
    };
    entries
        .into_iter()
        .filter(|entry| !entry.is_null())
        .map(|entry| serde_json::from_value(entry).map_err(serde::de::Error::custom))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractOpenedEvent {
    #[serde(rename = "type")]
    pub contract_type: u32,
    #[serde(deserialize_with = "deserialize_u64_lenient")]
    pub id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegisterAckEvent {
    #[serde(default, deserialize_with = "deserialize_opt_u64_lenient")]
    pub price: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolutionResultEvent {
    #[serde(deserialize_with = "deserialize_u64_lenient")]
    pub contract: u64,
    pub dbid: Dbid,
    pub result: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolutionItem {
    pub contract: u64,
    pub dbid: Dbid,
    pub id: CatalogId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data")]
pub enum OutboundPacket {
    #[serde(rename = "C_REQUEST_CONTRACT")]
    RequestContract {
        #[serde(rename = "type")]
        contract_type: u32,
    },
    #[serde(rename = "C_CANCEL_CONTRACT")]
    CancelContract {
        #[serde(rename = "type")]
        contract_type: u32,
    },
    #[serde(rename = "C_REGISTER_EVOLUTION_ITEM")]
    RegisterEvolutionItem(EvolutionItem),
    #[serde(rename = "C_REQUEST_EVOLUTION")]
    RequestEvolution(EvolutionItem),
    #[serde(rename = "C_START_EVOLUTION")]
    StartEvolution { contract: u64 },
}

impl OutboundPacket {
    pub fn packet_name(&self) -> &'static str {
        match self {
            OutboundPacket::RequestContract { .. } => "C_REQUEST_CONTRACT",
            OutboundPacket::CancelContract { .. } => "C_CANCEL_CONTRACT",
            OutboundPacket::RegisterEvolutionItem(_) => "C_REGISTER_EVOLUTION_ITEM",
            OutboundPacket::RequestEvolution(_) => "C_REQUEST_EVOLUTION",
            OutboundPacket::StartEvolution { .. } => "C_START_EVOLUTION",
        }
    }

    pub fn version(&self) -> u32 {
        1
    }
}
