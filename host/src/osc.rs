//! OSC escape sequence extraction (§4.3 PTY output path): OSC 0/2 sets the session title,
//! OSC 9 raises a notification. Both are stripped from the byte stream handed to viewers —
//! a passthrough terminal has no use for them once captured.

/// One escape sequence pulled out of a PTY output chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OscEvent {
    Title(String),
    Notification(String),
}

/// Scan `input` for complete `ESC ] (0|2|9) ; <text> (BEL | ESC \)` sequences, returning
/// the events found and the bytes with those sequences removed. A sequence that starts but
/// isn't terminated within `input` is left untouched and re-scanned on the next call — the
/// caller is expected to accumulate output across reads the way the ring buffer does.
pub fn extract(input: &[u8]) -> (Vec<OscEvent>, Vec<u8>) {
    let mut events = Vec::new();
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        if input[i] == 0x1b && input.get(i + 1) == Some(&b']') {
            if let Some((kind, text, consumed)) = parse_osc(&input[i..]) {
                match kind {
                    0 | 2 => events.push(OscEvent::Title(text)),
                    9 => events.push(OscEvent::Notification(text)),
                    _ => {}
                }
                i += consumed;
                continue;
            }
        }
        out.push(input[i]);
        i += 1;
    }

    (events, out)
}

/// Parse one OSC sequence starting at `buf[0] == ESC`. Returns `(code, text, bytes_consumed)`
/// on a fully-terminated sequence, `None` if unterminated or malformed.
fn parse_osc(buf: &[u8]) -> Option<(u32, String, usize)> {
    debug_assert_eq!(buf[0], 0x1b);
    debug_assert_eq!(buf.get(1), Some(&b']'));

    let mut j = 2;
    let code_start = j;
    while buf.get(j).is_some_and(u8::is_ascii_digit) {
        j += 1;
    }
    if j == code_start || buf.get(j) != Some(&b';') {
        return None;
    }
    let code: u32 = std::str::from_utf8(&buf[code_start..j]).ok()?.parse().ok()?;
    j += 1; // skip ';'

    let text_start = j;
    while j < buf.len() {
        if buf[j] == 0x07 {
            let text = String::from_utf8_lossy(&buf[text_start..j]).into_owned();
            return Some((code, text, j + 1));
        }
        if buf[j] == 0x1b && buf.get(j + 1) == Some(&b'\\') {
            let text = String::from_utf8_lossy(&buf[text_start..j]).into_owned();
            return Some((code, text, j + 2));
        }
        j += 1;
    }
    None
}
