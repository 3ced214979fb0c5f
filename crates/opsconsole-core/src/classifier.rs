//! Advisory read-only detection for proposed shell commands.
//!
//! A negative answer only adds a warning banner to the action card; it never
//! blocks execution.

/// Known non-mutating commands, matched as prefixes in this order. Entries
/// with a trailing space only match when arguments follow.
pub const READ_ONLY_PREFIXES: &[&str] = &[
    "ls",
    "pwd",
    "whoami",
    "id",
    "uname",
    "date",
    "uptime",
    "df",
    "du",
    "free",
    "ip a",
    "ip route",
    "ss ",
    "netstat ",
    "ping",
    "curl ",
    "wget ",
    "cat ",
    "tail ",
    "head ",
    "grep ",
    "journalctl ",
    "systemctl status",
    "docker ps",
    "docker logs",
    "docker inspect",
    "docker compose ps",
];

pub fn is_read_only(command: &str) -> bool {
    let cmd = command.trim();
    READ_ONLY_PREFIXES
        .iter()
        .any(|prefix| matches_prefix(cmd, prefix))
}

fn matches_prefix(cmd: &str, prefix: &str) -> bool {
    if cmd == prefix.trim() {
        return true;
    }
    if prefix.ends_with(' ') {
        return cmd.starts_with(prefix);
    }
    // `ls` must not claim `lsof`
    match cmd.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with(' '),
        None => false,
    }
}
