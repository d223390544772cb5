/// Convert a string to a null-terminated UTF-16 vector suitable for Windows API calls.
pub fn to_utf16(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Blank out `PASSWORD=...` tokens before a command line reaches the log.
/// Handles both bare tokens and the quoted form `Command`'s Debug output uses.
pub fn redact_secrets(command_line: &str) -> String {
    command_line
        .split(' ')
        .map(|tok| {
            let bare = tok.trim_start_matches('"');
            if bare
                .get(..9)
                .is_some_and(|p| p.eq_ignore_ascii_case("PASSWORD="))
            {
                "PASSWORD=***"
            } else {
                tok
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
