//! Command reference shown by `/help`

pub const HELP_TEXT: &str = "\
==== Chat Commands ====
/global <message>              - Send a message to global chat
/group <group_id> <message>    - Send a message to a group
/guild <guild_id> <message>    - Send a message to a guild
/private <user_id> <message>   - Send a private message (alias: /msg)
/create <group|guild> <name>   - Create a new room
/join <room_id>                - Join a room
/list <group|guild>            - List available rooms
/ping                          - Send a ping to test the connection
/test                          - Send a test event
/heartbeat                     - Send a manual heartbeat
/username <new_name>           - Change your username
/stats                         - Show connection statistics
/debug                         - Show connection debugging information
/errors                        - Show connection error history
/forcereconnect                - Close the session and connect again
/help                          - Show this help
/quit                          - Disconnect and exit (alias: /exit)
Any other text is sent to global chat.
=======================";

/// Hint printed for unrecognized commands
pub fn unknown_command_hint(token: &str) -> String {
    format!("Unknown command: {}. Type /help for a list of commands", token)
}
