fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use xpanel_protocol::{Inbound, NotificationLevel, Outbound};

    /// Frames captured from the panel server, one per file.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn load_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    fn decode(name: &str) -> Inbound {
        Inbound::decode(&load_fixture(name))
            .unwrap_or_else(|e| panic!("failed to decode {name}: {e}"))
    }

    /// Encodes an outbound frame and compares it with a fixture as JSON
    /// values (key order independent).
    fn assert_encodes_as(frame: &Outbound, name: &str) {
        let encoded: serde_json::Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        let fixture: serde_json::Value = serde_json::from_str(&load_fixture(name)).unwrap();
        assert_eq!(encoded, fixture, "encoding mismatch for {name}");
    }

    // --- Server to client ---

    #[test]
    fn fixture_server_stats_ignores_extra_fields() {
        let Inbound::ServerStats(stats) = decode("server_stats.json") else {
            panic!("expected server_stats");
        };
        assert_eq!(stats.server_id, "a1b2c3d4");
        let s = stats.stats;
        assert_eq!(s.timestamp.as_deref(), Some("2026-10-16T10:42:07.513224"));
        assert_eq!(s.cpu.as_ref().unwrap().cores, 8);
        assert_eq!(s.memory.as_ref().unwrap().percent, 42.4);
        assert_eq!(s.disk.as_ref().unwrap().used, 53_687_091_200);
        assert_eq!(s.network.as_ref().unwrap().bytes_recv, 7_340_032);
    }

    #[test]
    fn fixture_system_stats_without_network() {
        let Inbound::SystemStats(stats) = decode("system_stats.json") else {
            panic!("expected system_stats");
        };
        assert_eq!(stats.cpu.unwrap().usage, 3.1);
        assert!(stats.network.is_none());
    }

    #[test]
    fn fixture_terminal_output() {
        let Inbound::TerminalOutput(out) = decode("terminal_output.json") else {
            panic!("expected terminal_output");
        };
        assert_eq!(out.command.as_deref(), Some("uptime"));
        assert!(out.output.ends_with('\n'));
    }

    #[test]
    fn fixture_file_update() {
        let Inbound::FileUpdate(update) = decode("file_update.json") else {
            panic!("expected file_update");
        };
        assert_eq!(update.path, "/var/www/html/index.html");
        assert_eq!(update.action.as_deref(), Some("modified"));
    }

    #[test]
    fn fixture_notification() {
        let Inbound::Notification(n) = decode("notification.json") else {
            panic!("expected notification");
        };
        assert_eq!(n.level, NotificationLevel::Warning);
        assert_eq!(n.title, "Server offline");
    }

    // --- Client to server ---

    #[test]
    fn fixture_join_server_room() {
        assert_encodes_as(&Outbound::join("a1b2c3d4"), "join_server_room.json");
    }

    #[test]
    fn fixture_leave_server_room() {
        assert_encodes_as(&Outbound::leave("a1b2c3d4"), "leave_server_room.json");
    }

    #[test]
    fn fixture_terminal_command() {
        assert_encodes_as(
            &Outbound::command("a1b2c3d4", "df -h"),
            "terminal_command.json",
        );
    }

    #[test]
    fn client_frames_are_not_inbound() {
        assert!(Inbound::decode(&load_fixture("join_server_room.json")).is_err());
        assert!(Inbound::decode(&load_fixture("leave_server_room.json")).is_err());
    }
}
