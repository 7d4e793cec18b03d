// src/transport/framing.rs - Line termination and reply completion rules

/// Real-time bytes are acted on by the controller as soon as they arrive.
pub const STATUS_QUERY: char = '?';
pub const FEED_HOLD: char = '!';
pub const CYCLE_START: char = '~';
pub const SOFT_RESET: char = '\x18';

/// How a command is framed on the wire and how its reply ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandDialect {
    /// Single byte, no terminator.
    Realtime,
    /// `$`, `G` or `M` command, `\n` terminated, answered by `ok`/`error:`/`ALARM:`.
    Protocol,
    /// Anything else, `\r` terminated, answered by a line or `OK`.
    Legacy,
}

impl CommandDialect {
    /// The first byte decides. Legacy EBB commands that begin with `M`
    /// (`MR`, `MW`) are framed as protocol commands; only the GRBL dialect
    /// is driven, so none of them are ever sent.
    pub fn classify(command: &str) -> Self {
        let mut chars = command.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if matches!(c, STATUS_QUERY | FEED_HOLD | CYCLE_START | SOFT_RESET) {
                return CommandDialect::Realtime;
            }
        }
        if command.starts_with(['$', 'G', 'M']) {
            CommandDialect::Protocol
        } else {
            CommandDialect::Legacy
        }
    }
}

/// Bytes to write for `command`.
pub fn encode(command: &str) -> Vec<u8> {
    let body = command.trim_end_matches(['\r', '\n']);
    let mut out = body.as_bytes().to_vec();
    match CommandDialect::classify(body) {
        CommandDialect::Realtime => {}
        CommandDialect::Protocol => out.push(b'\n'),
        CommandDialect::Legacy => out.push(b'\r'),
    }
    out
}

/// True once `buffer` holds the whole reply to `command`.
pub fn is_complete(command: &str, buffer: &str) -> bool {
    match CommandDialect::classify(command) {
        CommandDialect::Realtime if command == "?" => buffer.trim_end().ends_with('>'),
        CommandDialect::Realtime => buffer.ends_with('\n'),
        CommandDialect::Protocol => terminated_lines(buffer).any(is_final_line),
        CommandDialect::Legacy => buffer.ends_with("\r\n") || buffer.contains("OK\r\n"),
    }
}

/// `ok`, `error:<n>` or `ALARM:<n>`.
pub fn is_final_line(line: &str) -> bool {
    line == "ok" || line.starts_with("error:") || line.starts_with("ALARM:")
}

/// Lines followed by `\n`, trimmed. A trailing partial line is excluded.
fn terminated_lines(buffer: &str) -> impl Iterator<Item = &str> {
    let end = buffer.rfind('\n').map(|i| i + 1).unwrap_or(0);
    buffer[..end].lines().map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_termination() {
        assert_eq!(encode("?"), b"?");
        assert_eq!(encode("\x18"), vec![0x18]);
        assert_eq!(encode("G00 X1.000 Y2.000"), b"G00 X1.000 Y2.000\n");
        assert_eq!(encode("$H"), b"$H\n");
        assert_eq!(encode("M18"), b"M18\n");
        assert_eq!(encode("V"), b"V\r");
        assert_eq!(encode("SP,1"), b"SP,1\r");
    }

    #[test]
    fn test_classify_by_first_byte() {
        assert_eq!(CommandDialect::classify("MR"), CommandDialect::Protocol);
        assert_eq!(CommandDialect::classify("M18"), CommandDialect::Protocol);
        assert_eq!(CommandDialect::classify("SM,100,10,0"), CommandDialect::Legacy);
        assert_eq!(CommandDialect::classify("??"), CommandDialect::Legacy);
    }

    #[test]
    fn test_existing_terminator_is_not_doubled() {
        assert_eq!(encode("G21\n"), b"G21\n");
    }

    #[test]
    fn test_protocol_completion_needs_whole_line() {
        assert!(!is_complete("G21", "o"));
        assert!(!is_complete("G21", "ok"));
        assert!(is_complete("G21", "ok\r\n"));
        assert!(is_complete("$I", "[VER:1.1h.20190825:]\r\n[OPT:V,15,128]\r\nok\r\n"));
        assert!(!is_complete("$I", "[VER:1.1h.20190825:]\r\n"));
        assert!(is_complete("G01 X500", "error:15\r\n"));
        assert!(is_complete("$H", "ALARM:9\r\n"));
    }

    #[test]
    fn test_status_completion() {
        assert!(!is_complete("?", "<Idle|MPos:0.000,0.000"));
        assert!(is_complete("?", "<Idle|MPos:0.000,0.000,0.000|FS:0,0>\r\n"));
    }

    #[test]
    fn test_legacy_completion() {
        assert!(!is_complete("V", "EBBv13_and_above"));
        assert!(is_complete("V", "EBBv13_and_above EB Firmware Version 2.8.1\r\n"));
        assert!(is_complete("SM,100,10,10", "OK\r\n"));
    }
}
