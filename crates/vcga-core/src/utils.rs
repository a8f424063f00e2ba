use std::sync::OnceLock;

use regex::Regex;

// ============== Log Sanitizing ==============

fn unsafe_log_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s\-.,:;!?/$]").expect("valid regex"))
}

/// Strip emojis and decorative symbols from user-provided text before it hits the logs.
///
/// Word characters (accented letters included), whitespace and basic punctuation survive.
pub fn clean_for_log(text: &str) -> String {
    unsafe_log_chars().replace_all(text, "").trim().to_string()
}

/// Shorten a log field to at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_for_log_drops_emojis_keeps_accents() {
        assert_eq!(clean_for_log("👤 João da Silva 🌜"), "João da Silva");
        assert_eq!(clean_for_log("/Y21C000000"), "/Y21C000000");
        assert_eq!(clean_for_log("bom dia!"), "bom dia!");
    }

    #[test]
    fn truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("ação", 10), "ação");
        assert_eq!(truncate_chars("ação", 2), "aç…");
    }
}
