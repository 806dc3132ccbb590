//! Command line parsing

use serde_json::{json, Value};

/// Room category for create and list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomKind {
    Group,
    Guild,
}

impl RoomKind {
    /// Parse `group`/`guild`, singular or plural
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "group" | "groups" => Some(RoomKind::Group),
            "guild" | "guilds" => Some(RoomKind::Guild),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoomKind::Group => "group",
            RoomKind::Guild => "guild",
        }
    }
}

impl std::fmt::Display for RoomKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed user command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Global(String),
    Group { group_id: String, message: String },
    Guild { guild_id: String, message: String },
    Private { user_id: String, message: String },
    CreateRoom { kind: RoomKind, name: String },
    JoinRoom(String),
    ListRooms(RoomKind),
    Ping,
    Heartbeat,
    TestEvent,
    Username(String),
    Stats,
    Debug,
    Errors,
    ForceReconnect,
    Help,
    Quit,
}

/// Why a line could not become a [`Command`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Blank line
    Empty,
    /// Missing arguments; carries the usage line
    Usage(&'static str),
    /// Room type other than group or guild
    RoomKind(String),
    /// Unrecognized `/command`
    Unknown(String),
}

pub const USAGE_GLOBAL: &str = "Usage: /global <message>";
pub const USAGE_GROUP: &str = "Usage: /group <group_id> <message>";
pub const USAGE_GUILD: &str = "Usage: /guild <guild_id> <message>";
pub const USAGE_PRIVATE: &str = "Usage: /private <user_id> <message>";
pub const USAGE_CREATE: &str = "Usage: /create <group|guild> <name>";
pub const USAGE_JOIN: &str = "Usage: /join <room_id>";
pub const USAGE_LIST: &str = "Usage: /list <group|guild>";
pub const USAGE_USERNAME: &str = "Usage: /username <new_name>";

/// Command tokens that need a live session
const SEND_TOKENS: &[&str] = &[
    "/global", "/group", "/guild", "/private", "/msg", "/create", "/join", "/list", "/ping", "/heartbeat", "/test",
];

impl Command {
    /// Parse one input line. Non-command text is an implicit global send.
    pub fn parse(line: &str) -> Result<Command, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::Empty);
        }
        if !line.starts_with('/') {
            return Ok(Command::Global(line.to_string()));
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let token = parts[0].to_lowercase();
        let args = &parts[1..];
        let rest = |from: usize| args[from..].join(" ");

        let command = match token.as_str() {
            "/global" => {
                if args.is_empty() {
                    return Err(ParseError::Usage(USAGE_GLOBAL));
                }
                Command::Global(rest(0))
            }
            "/group" => {
                if args.len() < 2 {
                    return Err(ParseError::Usage(USAGE_GROUP));
                }
                Command::Group {
                    group_id: args[0].to_string(),
                    message: rest(1),
                }
            }
            "/guild" => {
                if args.len() < 2 {
                    return Err(ParseError::Usage(USAGE_GUILD));
                }
                Command::Guild {
                    guild_id: args[0].to_string(),
                    message: rest(1),
                }
            }
            "/private" | "/msg" => {
                if args.len() < 2 {
                    return Err(ParseError::Usage(USAGE_PRIVATE));
                }
                Command::Private {
                    user_id: args[0].to_string(),
                    message: rest(1),
                }
            }
            "/create" => {
                if args.len() < 2 {
                    return Err(ParseError::Usage(USAGE_CREATE));
                }
                let kind = RoomKind::parse(args[0]).ok_or_else(|| ParseError::RoomKind(args[0].to_string()))?;
                Command::CreateRoom { kind, name: rest(1) }
            }
            "/join" => match args.first() {
                Some(room) => Command::JoinRoom(room.to_string()),
                None => return Err(ParseError::Usage(USAGE_JOIN)),
            },
            "/list" => match args.first() {
                Some(kind) => Command::ListRooms(RoomKind::parse(kind).ok_or_else(|| ParseError::RoomKind(kind.to_string()))?),
                None => return Err(ParseError::Usage(USAGE_LIST)),
            },
            "/ping" => Command::Ping,
            "/heartbeat" => Command::Heartbeat,
            "/test" => Command::TestEvent,
            "/username" => match args.first() {
                Some(name) => Command::Username(name.to_string()),
                None => return Err(ParseError::Usage(USAGE_USERNAME)),
            },
            "/stats" => Command::Stats,
            "/debug" => Command::Debug,
            "/errors" => Command::Errors,
            "/forcereconnect" => Command::ForceReconnect,
            "/help" => Command::Help,
            "/quit" | "/exit" => Command::Quit,
            _ => return Err(ParseError::Unknown(parts[0].to_string())),
        };

        Ok(command)
    }

    /// Outbound event for send-type commands, built for `username`
    pub fn outbound(&self, username: &str) -> Option<(&'static str, Value)> {
        let event = match self {
            Command::Global(message) => ("global_message", json!(message)),
            Command::Group { group_id, message } => {
                ("group_message", json!({ "groupId": group_id, "message": message }))
            }
            Command::Guild { guild_id, message } => {
                ("guild_message", json!({ "guildId": guild_id, "message": message }))
            }
            Command::Private { user_id, message } => {
                ("private_message", json!({ "userId": user_id, "message": message }))
            }
            Command::CreateRoom { kind, name } => ("create_room", json!({ "type": kind.as_str(), "name": name })),
            Command::JoinRoom(room) => ("join_room", json!(room)),
            Command::ListRooms(kind) => ("get_rooms", json!(kind.as_str())),
            Command::Ping => ("ping", json!(format!("Ping from {}", username))),
            Command::TestEvent => ("test_event", json!(format!("Test event from {}", username))),
            _ => return None,
        };
        Some(event)
    }
}

/// Whether the line's command token (or implicit send) needs a live session,
/// judged before argument validation
pub fn line_requires_connection(line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return false;
    }
    if !line.starts_with('/') {
        return true;
    }
    let token = line.split_whitespace().next().unwrap_or_default().to_lowercase();
    SEND_TOKENS.contains(&token.as_str())
}

/// Usernames are 3 to 20 characters of letters, digits, `_` or `-`
pub fn validate_username(name: &str) -> std::result::Result<(), String> {
    let len = name.chars().count();
    if !(3..=20).contains(&len) {
        return Err(format!("Username must be 3-20 characters long (got {})", len));
    }
    if let Some(bad) = name.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-')) {
        return Err(format!("Username contains invalid character '{}'", bad));
    }
    Ok(())
}
