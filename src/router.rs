//! Target-language resolution.
//!
//! Group-chat messages are frequently short, ambiguous, or script-free
//! (numbers, stray punctuation), so routing layers several fallbacks on top
//! of plain script detection: sticky per-chat modes, reply-context
//! inference, and a static default.

use crate::config::RoutingConfig;
use crate::script::{Script, detect_script, is_hangul};

/// Per-chat sticky override selecting a fixed translation pair instead of
/// full auto-detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageMode {
    Khmer,
    Vietnamese,
}

impl LanguageMode {
    /// The mode's foreign language, used as its sticky default target.
    fn language(self) -> &'static str {
        match self {
            LanguageMode::Khmer => "Khmer",
            LanguageMode::Vietnamese => "Vietnamese",
        }
    }
}

/// Resolve the translation target for `text`.
///
/// Precedence, highest first:
/// 1. auto-translation off: the static `target_language`;
/// 2. a sticky chat mode: home script goes to the mode's language, the
///    mode's script goes back home, anything else still goes to the mode's
///    language;
/// 3. auto detection: each script maps to its configured opposite;
/// 4. unresolved script with reply context: assume the current message
///    complements the reply's language;
/// 5. the static `target_language`.
pub fn pick_target_language(
    cfg: &RoutingConfig,
    text: &str,
    reply_text: Option<&str>,
    mode: Option<LanguageMode>,
) -> String {
    if !cfg.auto_translate {
        return cfg.target_language.clone();
    }

    let assume_latin = cfg.assume_latin_is_vietnamese;
    let script = detect_script(text, assume_latin);

    if let Some(mode) = mode {
        return match (mode, script) {
            (LanguageMode::Khmer, Script::Hangul) => mode.language().to_string(),
            (LanguageMode::Khmer, Script::Khmer) => cfg.khmer_to.clone(),
            (LanguageMode::Vietnamese, Script::Hangul) => mode.language().to_string(),
            (LanguageMode::Vietnamese, Script::Vietnamese) => cfg.vietnamese_to.clone(),
            // Forced modes stay sticky toward their own language.
            _ => mode.language().to_string(),
        };
    }

    match script {
        Script::Hangul => return cfg.korean_to.clone(),
        Script::Vietnamese => return cfg.vietnamese_to.clone(),
        Script::Khmer => return cfg.khmer_to.clone(),
        Script::Mixed | Script::Unknown => {}
    }

    // The current message is inconclusive. A reply target is the cheapest
    // available disambiguator: infer the current message's language as the
    // complement of the reply's.
    if let Some(reply) = reply_text.filter(|r| !r.trim().is_empty()) {
        match detect_script(reply, assume_latin) {
            // Reply in Hangul: the current message is probably foreign.
            Script::Hangul => return cfg.vietnamese_to.clone(),
            // Reply in a foreign script: the current message is probably Hangul.
            Script::Vietnamese => return cfg.korean_to.clone(),
            Script::Khmer => return cfg.korean_to.clone(),
            _ => {
                // A short all-Hangul reply ("네", "응?") is a weak signal for
                // the same inference even when detection was inconclusive.
                if reply.chars().count() <= 10
                    && reply.chars().all(|c| is_hangul(c) || c.is_whitespace())
                {
                    return cfg.vietnamese_to.clone();
                }
            }
        }
    }

    cfg.target_language.clone()
}
