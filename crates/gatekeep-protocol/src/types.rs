//! Core types: identities, positions, notices, and the wire envelope.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The canonical, case-insensitive name of a connected identity.
///
/// Every lookup in Gatekeep goes through this type, so "Bob", "BOB" and
/// "bob" all address the same credential record. The constructor is the
/// only way in, and it lowercases, so an `IdentityKey` is always canonical.
///
/// Serde goes through `String` in both directions (`from`/`into`), which
/// means a name arriving over the wire is normalized on decode too.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Canonicalizes a display name into a lookup key.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().to_lowercase())
    }

    /// Returns the canonical (lowercase) name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for IdentityKey {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<&str> for IdentityKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<IdentityKey> for String {
    fn from(key: IdentityKey) -> Self {
        key.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// The integer cell a position falls in.
///
/// Movement rules work on cells rather than exact coordinates: turning your
/// head or shuffling inside the same cell is not "moving".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl BlockPos {
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A full location: which world, where in it, and which way the identity
/// is facing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub yaw: f32,
    #[serde(default)]
    pub pitch: f32,
}

impl Position {
    /// A position with neutral facing.
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    /// The lowest corner of `block` inside `world`.
    pub fn at_block(world: impl Into<String>, block: BlockPos) -> Self {
        Self::new(world, block.x as f64, block.y as f64, block.z as f64)
    }

    /// Returns a copy facing a different direction.
    pub fn looking(mut self, yaw: f32, pitch: f32) -> Self {
        self.yaw = yaw;
        self.pitch = pitch;
        self
    }

    /// The integer cell this position falls in (floored, so -0.5 is -1).
    pub fn block(&self) -> BlockPos {
        BlockPos {
            x: self.x.floor() as i64,
            y: self.y.floor() as i64,
            z: self.z.floor() as i64,
        }
    }

    /// `true` if both positions are in the same world and the same cell.
    pub fn same_block(&self, other: &Position) -> bool {
        self.world == other.world && self.block() == other.block()
    }
}

// ---------------------------------------------------------------------------
// Notices
// ---------------------------------------------------------------------------

/// The color a notice is shown in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    /// Green: something went right.
    Success,
    /// Red: a prompt or a rejection.
    Alert,
}

impl Tone {
    /// The legacy section-sign color code hosts prefix the line with.
    pub fn color_code(self) -> &'static str {
        match self {
            Self::Success => "\u{a7}a",
            Self::Alert => "\u{a7}c",
        }
    }
}

/// A one-line colored message sent to a single identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub tone: Tone,
    pub text: String,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            tone: Tone::Success,
            text: text.into(),
        }
    }

    pub fn alert(text: impl Into<String>) -> Self {
        Self {
            tone: Tone::Alert,
            text: text.into(),
        }
    }
}

/// Renders with the color code prefix, ready for a chat line.
impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.tone.color_code(), self.text)
    }
}

// ---------------------------------------------------------------------------
// Wire messages
// ---------------------------------------------------------------------------

/// Messages a host connection sends to the Gatekeep server.
///
/// Internally tagged: `{ "type": "Move", "from": {...}, "to": {...} }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// First message on every connection. `name` is the display name; the
    /// server canonicalizes it. `position` is where the identity spawned.
    Hello {
        version: u32,
        name: String,
        position: Position,
    },

    /// The identity wants to move. The server answers with `MoveRejected`
    /// when the move is vetoed and stays silent otherwise.
    Move { from: Position, to: Position },

    /// A slash command without the slash: `{ "verb": "login", "args": ["pw"] }`.
    Command { verb: String, args: Vec<String> },

    /// Keep-alive.
    Heartbeat { client_time: u64 },

    /// The identity is leaving.
    Bye { reason: String },
}

/// Messages the Gatekeep server sends back to a host connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Handshake accepted. `identity` is the canonical key.
    Welcome {
        identity: IdentityKey,
        server_time: u64,
    },

    /// A line of text for the identity's chat.
    Notice { tone: Tone, text: String },

    /// Move the identity to `position` now.
    Teleport { position: Position },

    /// The last `Move` was vetoed; the identity stays at `position`.
    MoveRejected { position: Position },

    /// The server is closing this connection.
    Kicked { reason: String },

    /// Reply to `Heartbeat`.
    HeartbeatAck { client_time: u64, server_time: u64 },

    /// Protocol-level failure. `code` follows HTTP conventions
    /// (400 bad request, 409 conflict).
    Error { code: u16, message: String },
}

impl From<Notice> for ServerMessage {
    fn from(notice: Notice) -> Self {
        Self::Notice {
            tone: notice.tone,
            text: notice.text,
        }
    }
}

/// Which direction an envelope travels.
///
/// Adjacently tagged: `{ "type": "Client", "data": { "type": "Bye", ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    Client(ClientMessage),
    Server(ServerMessage),
}

/// The top-level wire frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-sender sequence number, starting at 0 for the handshake.
    pub seq: u64,

    /// Milliseconds since the sender's connection started.
    pub timestamp: u64,

    pub payload: Payload,
}

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // IdentityKey
    // =====================================================================

    #[test]
    fn test_identity_key_new_lowercases() {
        assert_eq!(IdentityKey::new("Bob").as_str(), "bob");
        assert_eq!(IdentityKey::new("BOB"), IdentityKey::new("bob"));
    }

    #[test]
    fn test_identity_key_deserialize_normalizes_case() {
        let key: IdentityKey = serde_json::from_str("\"NotchFan\"").unwrap();
        assert_eq!(key.as_str(), "notchfan");
    }

    #[test]
    fn test_identity_key_serializes_as_plain_string() {
        let json = serde_json::to_string(&IdentityKey::new("Alice")).unwrap();
        assert_eq!(json, "\"alice\"");
    }

    // =====================================================================
    // Position
    // =====================================================================

    #[test]
    fn test_position_block_floors_negative_coordinates() {
        let pos = Position::new("world", -0.5, 64.9, 10.0);
        assert_eq!(pos.block(), BlockPos::new(-1, 64, 10));
    }

    #[test]
    fn test_position_same_block_ignores_facing_and_fraction() {
        let a = Position::new("world", 0.2, 100.0, 0.7);
        let b = Position::new("world", 0.9, 100.4, 0.1).looking(90.0, 45.0);
        assert!(a.same_block(&b));
    }

    #[test]
    fn test_position_same_block_different_world_is_false() {
        let a = Position::new("world", 0.0, 100.0, 0.0);
        let b = Position::new("world_nether", 0.0, 100.0, 0.0);
        assert!(!a.same_block(&b));
    }

    #[test]
    fn test_position_deserialize_defaults_facing() {
        let pos: Position =
            serde_json::from_str(r#"{"world":"w","x":1.0,"y":2.0,"z":3.0}"#).unwrap();
        assert_eq!(pos.yaw, 0.0);
        assert_eq!(pos.pitch, 0.0);
    }

    // =====================================================================
    // Notice
    // =====================================================================

    #[test]
    fn test_notice_display_prefixes_color_code() {
        assert_eq!(Notice::success("ok").to_string(), "\u{a7}aok");
        assert_eq!(Notice::alert("no").to_string(), "\u{a7}cno");
    }

    #[test]
    fn test_notice_into_server_message_keeps_tone() {
        let msg: ServerMessage = Notice::alert("Wrong password.").into();
        assert_eq!(
            msg,
            ServerMessage::Notice {
                tone: Tone::Alert,
                text: "Wrong password.".into(),
            }
        );
    }

    // =====================================================================
    // Wire shapes
    // =====================================================================

    #[test]
    fn test_client_message_command_json_format() {
        let msg = ClientMessage::Command {
            verb: "register".into(),
            args: vec!["secretA".into()],
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "Command");
        assert_eq!(json["verb"], "register");
        assert_eq!(json["args"][0], "secretA");
    }

    #[test]
    fn test_payload_is_adjacently_tagged() {
        let payload = Payload::Server(ServerMessage::Kicked {
            reason: "bye".into(),
        });
        let json: serde_json::Value = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["type"], "Server");
        assert_eq!(json["data"]["type"], "Kicked");
        assert_eq!(json["data"]["reason"], "bye");
    }

    #[test]
    fn test_tone_serializes_snake_case() {
        let json = serde_json::to_string(&Tone::Success).unwrap();
        assert_eq!(json, "\"success\"");
    }
}
