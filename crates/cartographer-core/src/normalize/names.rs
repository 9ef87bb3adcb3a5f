//! Folder names for generated maps

use regex::Regex;
use std::sync::OnceLock;

const GENERATOR_PREFIX: &str = "Beat Sage_";

struct Patterns {
    trailing_parens: Regex,
    audio_extension: Regex,
    bracket_tag: Regex,
    wrapping_parens: Regex,
    repeated_space: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        trailing_parens: Regex::new(r"\s*\([^()]*\)$").expect("valid regex"),
        audio_extension: Regex::new(r"(?i)\.(m4a|mp3|wav|ogg|flac|aac)\b").expect("valid regex"),
        bracket_tag: Regex::new(r"\s*\[[^\]]*\]").expect("valid regex"),
        wrapping_parens: Regex::new(r"\(([^()]+)\)").expect("valid regex"),
        repeated_space: Regex::new(r"\s{2,}").expect("valid regex"),
    })
}

/// Turn a generated archive name into a clean `Title - Artist` folder name.
///
/// - drops the `Beat Sage_` prefix
/// - drops a trailing `(...)` block with generation settings
/// - drops audio extensions embedded in the name
/// - drops bracketed tags such as `[Official Audio]`
/// - unwraps `(Title)` groups
/// - rewrites `Artist - Title - Artist` as `Title - Artist`
pub fn clean_name(name: &str) -> String {
    let p = patterns();

    let mut name = name.to_string();
    if let Some(rest) = name.strip_prefix(GENERATOR_PREFIX) {
        name = rest.trim().to_string();
    }

    let name = p.trailing_parens.replace(&name, "").trim().to_string();
    let name = p.audio_extension.replace_all(&name, "").to_string();
    let name = p.bracket_tag.replace_all(&name, "").trim().to_string();
    let name = p.wrapping_parens.replace_all(&name, "$1").to_string();

    let parts: Vec<&str> = name
        .split(" - ")
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    let name = if parts.len() == 3 && parts[0].to_lowercase() == parts[2].to_lowercase() {
        format!("{} - {}", parts[1], parts[0])
    } else {
        parts.join(" - ")
    };

    p.repeated_space.replace_all(&name, " ").trim().to_string()
}
