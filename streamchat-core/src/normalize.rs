use unicode_normalization::UnicodeNormalization;

/// Maximum title length shown in conversation lists before truncation.
const TITLE_DISPLAY_MAX: usize = 40;

/// Clean an outgoing user message: Unicode NFC normalization + BOM strip +
/// CRLF -> LF + trim. An empty result means there is nothing to send.
pub fn clean_message(s: &str) -> String {
    let mut t = s.nfc().collect::<String>();
    if t.starts_with('\u{FEFF}') {
        // Byte Order Mark
        t.remove(0);
    }
    if t.contains("\r\n") {
        t = t.replace("\r\n", "\n");
    }
    t.trim().to_string()
}

/// Shorten a conversation title for list display. Cuts on a char boundary,
/// never mid-codepoint.
pub fn display_title(title: &str) -> String {
    if title.chars().count() <= TITLE_DISPLAY_MAX {
        return title.to_string();
    }
    let mut short: String = title.chars().take(TITLE_DISPLAY_MAX).collect();
    short.push_str("...");
    short
}
