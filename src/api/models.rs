//! Response records for the statistics API
//!
//! Only two fields matter to the crawl: the arena id of each battle-list item
//! and the participant player ids of each battle detail. Everything else is
//! kept verbatim in flattened maps so exports carry the full record.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Battle list for one player (most recent battles first)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BattleList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<BattleSummary>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of a battle list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BattleSummary {
    /// Arena id, string-encoded by the API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arena_id: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Full record of one played battle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BattleDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub general: Option<Value>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub players: Vec<BattlePlayer>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One participant of a battle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BattlePlayer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Overall statistics for one player, kept as returned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerDetail(pub Value);

impl BattleList {
    /// Arena ids in list order, skipping missing or malformed entries
    pub fn arena_ids(&self) -> Vec<u64> {
        self.data
            .iter()
            .filter_map(|battle| battle.arena_id.as_ref().and_then(parse_id))
            .collect()
    }
}

impl BattleDetail {
    /// Participant player ids in roster order
    pub fn player_ids(&self) -> Vec<u64> {
        self.players
            .iter()
            .filter_map(|p| p.player_id.as_ref().and_then(parse_id))
            .collect()
    }
}

/// Reads an id that may be encoded as a JSON number or a decimal string
pub fn parse_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
