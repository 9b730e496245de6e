//! JSON wire protocol: inbound envelopes, the route table, payload shapes,
//! and outbound message encoding.
//!
//! Every frame in either direction is a JSON object of the form
//! `{event, type, client_id, username, data}`; `event` is the namespace
//! (`handshake`, `game`, `server`) and `type` the operation within it.

use anyhow::{Context, Result};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use digsite_engine::ids::ShortId;
use digsite_engine::world::position::Position;
use digsite_engine::world::tiles::TileId;

use crate::broadcast::Outbound;

pub const HANDSHAKE: &str = "handshake";
pub const GAME: &str = "game";
pub const SERVER: &str = "server";

pub const STATUS_OK: &str = "OK";
pub const STATUS_UNSUPPORTED_GAME_VERSION: &str = "UNSUPPORTED_GAME_VERSION";

// ── Inbound ──────────────────────────────────────────────────────────────

/// One decoded client frame. Missing header fields decode as empty; the
/// handshake-only fields sit at the top level next to `data`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub event: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub game_version: Option<String>,
    #[serde(default)]
    pub os_uid: Option<String>,
}

impl Envelope {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("decoding envelope")
    }

    pub fn client_id(&self) -> &str {
        self.client_id.as_deref().unwrap_or_default()
    }

    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or_default()
    }

    /// Decode `data` into the payload shape of this envelope's route.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.data)
            .with_context(|| format!("decoding {}/{} payload", self.event, self.kind))
    }
}

// ── Route table ──────────────────────────────────────────────────────────

/// Every operation the server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    RequestId,
    RequestConnect,
    RequestMapData,
    RequestMapTiles,
    RequestMapDroppedItems,
    RequestClients,
    RequestPlayerSpawnPoint,
    RequestPlayerInventory,
    RequestPlayerData,
    PlayerPosition,
    PlayerHandRotation,
    UpdatePlayerData,
    SetTile,
    DropItem,
    RemoveDroppedItem,
    AddInventoryItem,
    RequestMapPlacedItems,
    AddMapPlacedItem,
    RemoveMapPlacedItem,
    AddChestItem,
}

/// `(event, type)` → route. Pairs not listed here are ignored without a
/// reply so that older and newer clients can talk to this server.
const ROUTES: &[(&str, &str, Route)] = &[
    (HANDSHAKE, "requestid", Route::RequestId),
    (HANDSHAKE, "requestconnect", Route::RequestConnect),
    (GAME, "requestmapdata", Route::RequestMapData),
    (GAME, "requestmaptiles", Route::RequestMapTiles),
    (GAME, "requestmapdroppeditems", Route::RequestMapDroppedItems),
    (GAME, "requestclients", Route::RequestClients),
    (GAME, "requestplayerspawnpoint", Route::RequestPlayerSpawnPoint),
    (GAME, "requestplayerinventory", Route::RequestPlayerInventory),
    (GAME, "requestplayerdata", Route::RequestPlayerData),
    (GAME, "playerposition", Route::PlayerPosition),
    (GAME, "playerhandrotation", Route::PlayerHandRotation),
    (GAME, "updateplayerdata", Route::UpdatePlayerData),
    (GAME, "settile", Route::SetTile),
    (GAME, "dropitem", Route::DropItem),
    (GAME, "removedroppeditem", Route::RemoveDroppedItem),
    (GAME, "addinventoryitem", Route::AddInventoryItem),
    (GAME, "requestmapplaceditems", Route::RequestMapPlacedItems),
    (GAME, "addmapplaceditem", Route::AddMapPlacedItem),
    (GAME, "removemapplaceditem", Route::RemoveMapPlacedItem),
    (GAME, "addchestitem", Route::AddChestItem),
];

impl Route {
    pub fn lookup(event: &str, kind: &str) -> Option<Route> {
        ROUTES
            .iter()
            .find(|(e, k, _)| *e == event && *k == kind)
            .map(|&(_, _, route)| route)
    }

    /// Game operations need a registered session; handshake ones do not.
    pub fn requires_session(self) -> bool {
        !matches!(self, Route::RequestId | Route::RequestConnect)
    }
}

// ── Payloads ─────────────────────────────────────────────────────────────

/// An item id as the client sent it: a JSON number or string.
///
/// Inventories key on its string form; echoes send it back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemKey(Value);

impl ItemKey {
    pub fn as_key(&self) -> String {
        match &self.0 {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl<'de> Deserialize<'de> for ItemKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            value @ (Value::String(_) | Value::Number(_)) => Ok(Self(value)),
            other => Err(D::Error::custom(format!(
                "item id must be a number or string, got {other}"
            ))),
        }
    }
}

impl Serialize for ItemKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DropItemPayload {
    pub x: f64,
    pub y: f64,
    pub id: TileId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoveDroppedItemPayload {
    pub uid: ShortId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryItemPayload {
    pub block_id: ItemKey,
    pub count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlacedItemPayload {
    pub x: f64,
    pub y: f64,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChestItemPayload {
    pub chest_id: ShortId,
    pub block_id: ItemKey,
    pub count: i64,
}

/// Scalar fields rebroadcast to peers after `updateplayerdata`. Money is
/// left out on purpose: peers never see another player's balance.
#[derive(Debug, Clone, Serialize)]
pub struct PublicPlayerData<'a> {
    pub has_flashlight: bool,
    pub holding_item: &'a str,
    pub current_drill_level: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RosterEntry {
    pub username: String,
    pub position: Position,
}

// ── Outbound ─────────────────────────────────────────────────────────────

/// A server → client frame under construction.
#[derive(Debug, Serialize)]
pub struct Message<'a> {
    event: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl<'a> Message<'a> {
    pub fn new(event: &'a str, kind: &'a str) -> Self {
        Self {
            event,
            kind,
            client_id: None,
            username: None,
            data: None,
        }
    }

    /// A `game` namespace message attributed to the session that caused it.
    pub fn game(kind: &'a str, client_id: &'a str) -> Self {
        Self::new(GAME, kind).client_id(client_id)
    }

    pub fn client_id(mut self, client_id: &'a str) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn username(mut self, username: &'a str) -> Self {
        self.username = Some(username);
        self
    }

    pub fn data(mut self, data: impl Serialize) -> Result<Self> {
        self.data = Some(serde_json::to_value(data).context("encoding message data")?);
        Ok(self)
    }

    pub fn encode(&self) -> Result<Outbound> {
        let bytes = serde_json::to_vec(self)
            .with_context(|| format!("encoding {}/{} message", self.event, self.kind))?;
        Ok(bytes.into())
    }
}

#[derive(Debug, Serialize)]
struct TimeData {
    time: f64,
}

/// `server/synctime` push. Note the wire key is `clientid`, always 0.
#[derive(Debug, Serialize)]
struct SyncTime {
    event: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    clientid: u8,
    data: TimeData,
}

pub fn sync_time(time: f64) -> Result<Outbound> {
    let msg = SyncTime {
        event: SERVER,
        kind: "synctime",
        clientid: 0,
        data: TimeData { time },
    };
    Ok(serde_json::to_vec(&msg).context("encoding synctime")?.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode_value(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn envelope_tolerates_missing_header_fields() {
        let env = Envelope::decode(br#"{"event": "game"}"#).unwrap();
        assert_eq!(env.event, "game");
        assert_eq!(env.kind, "");
        assert_eq!(env.client_id(), "");
        assert!(env.data.is_null());
    }

    #[test]
    fn envelope_reads_handshake_fields() {
        let env = Envelope::decode(
            br#"{"event":"handshake","type":"requestconnect","client_id":"ABC123",
                "username":"digger","game_version":"v1.9","os_uid":"device-1"}"#,
        )
        .unwrap();
        assert_eq!(Route::lookup(&env.event, &env.kind), Some(Route::RequestConnect));
        assert_eq!(env.game_version.as_deref(), Some("v1.9"));
        assert_eq!(env.os_uid.as_deref(), Some("device-1"));
        assert_eq!(env.username(), "digger");
    }

    #[test]
    fn non_object_frame_is_an_error() {
        assert!(Envelope::decode(b"[1,2,3]").is_err());
        assert!(Envelope::decode(b"not json").is_err());
    }

    #[test]
    fn unknown_routes_are_not_in_the_table() {
        assert_eq!(Route::lookup("game", "teleport"), None);
        assert_eq!(Route::lookup("handshake", "settile"), None);
        assert_eq!(Route::lookup("game", "settile"), Some(Route::SetTile));
    }

    #[test]
    fn only_handshake_routes_skip_the_session_gate() {
        assert!(!Route::RequestId.requires_session());
        assert!(!Route::RequestConnect.requires_session());
        assert!(Route::SetTile.requires_session());
        assert!(Route::RequestMapData.requires_session());
    }

    #[test]
    fn item_key_accepts_numbers_and_strings() {
        let payload: InventoryItemPayload =
            serde_json::from_value(json!({"block_id": 5, "count": 2})).unwrap();
        assert_eq!(payload.block_id.as_key(), "5");
        let payload: InventoryItemPayload =
            serde_json::from_value(json!({"block_id": "5", "count": 2})).unwrap();
        assert_eq!(payload.block_id.as_key(), "5");
        assert!(serde_json::from_value::<InventoryItemPayload>(
            json!({"block_id": [5], "count": 2})
        )
        .is_err());
    }

    #[test]
    fn chest_echo_keeps_item_id_as_sent() {
        let payload: ChestItemPayload =
            serde_json::from_value(json!({"chest_id": "ABCDEF", "block_id": 7, "count": 1}))
                .unwrap();
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"chest_id": "ABCDEF", "block_id": 7, "count": 1})
        );
    }

    #[test]
    fn payload_error_names_the_route() {
        let env = Envelope {
            event: "game".into(),
            kind: "dropitem".into(),
            data: json!({"x": 1.0}),
            ..Default::default()
        };
        let err = env.payload::<DropItemPayload>().unwrap_err();
        assert!(format!("{err:#}").contains("game/dropitem"));
    }

    #[test]
    fn message_omits_absent_fields() {
        let bytes = Message::new(HANDSHAKE, "responseid")
            .data("ABC123")
            .unwrap()
            .encode()
            .unwrap();
        assert_eq!(
            decode_value(&bytes),
            json!({"event": "handshake", "type": "responseid", "data": "ABC123"})
        );

        let bytes = Message::game("connected", "ABC123")
            .username("digger")
            .encode()
            .unwrap();
        assert_eq!(
            decode_value(&bytes),
            json!({"event": "game", "type": "connected", "client_id": "ABC123", "username": "digger"})
        );
    }

    #[test]
    fn sync_time_uses_clientid_key() {
        let bytes = sync_time(12.5).unwrap();
        assert_eq!(
            decode_value(&bytes),
            json!({"event": "server", "type": "synctime", "clientid": 0, "data": {"time": 12.5}})
        );
    }
}
