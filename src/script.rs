//! Unicode-range script heuristics.
//!
//! The relay only needs to tell three writing systems apart (Hangul, Khmer,
//! Vietnamese-diacritic Latin), so classification is a handful of code-point
//! range tests rather than a statistical language model.

/// Writing system heuristically assigned to a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Hangul,
    Khmer,
    Vietnamese,
    Mixed,
    Unknown,
}

/// Precomposed Vietnamese vowels and đ/Đ. Bare ASCII Latin is handled
/// separately via `assume_latin_is_vietnamese`.
const VIETNAMESE_DIACRITICS: &str = "\
àáạảãâầấậẩẫăằắặẳẵèéẹẻẽêềếệểễìíịỉĩòóọỏõôồốộổỗơờớợởỡùúụủũưừứựửữỳýỵỷỹđ\
ÀÁẠẢÃÂẦẤẬẨẪĂẰẮẶẲẴÈÉẸẺẼÊỀẾỆỂỄÌÍỊỈĨÒÓỌỎÕÔỒỐỘỔỖƠỜỚỢỞỠÙÚỤỦŨƯỪỨỰỬỮỲÝỴỶỸĐ";

pub fn is_hangul(c: char) -> bool {
    ('\u{AC00}'..='\u{D7A3}').contains(&c)
}

pub fn is_khmer(c: char) -> bool {
    ('\u{1780}'..='\u{17FF}').contains(&c)
}

pub fn is_vietnamese_diacritic(c: char) -> bool {
    VIETNAMESE_DIACRITICS.contains(c)
}

fn is_emoji(c: char) -> bool {
    matches!(c,
        '\u{1F300}'..='\u{1F9FF}'
        | '\u{2600}'..='\u{26FF}'
        | '\u{2700}'..='\u{27BF}'
        | '\u{1FA00}'..='\u{1FAFF}')
}

/// Variation selectors and the zero-width joiner used in emoji sequences.
fn is_emoji_modifier(c: char) -> bool {
    matches!(c, '\u{FE00}'..='\u{FE0F}' | '\u{200D}')
}

/// Punctuation-ish characters ignored by both predicates: ASCII punctuation
/// plus the General Punctuation block (quotes, dashes, ellipsis).
fn is_punctuation_like(c: char) -> bool {
    c.is_ascii_punctuation() || ('\u{2000}'..='\u{206F}').contains(&c)
}

fn is_ignorable(c: char) -> bool {
    c.is_whitespace() || is_punctuation_like(c) || is_emoji(c) || is_emoji_modifier(c)
}

/// Classify `text` into one of the supported scripts.
///
/// Precedence (first match wins): Vietnamese diacritics anywhere, Hangul
/// and Khmer together, Khmer, Hangul, bare Latin (when
/// `assume_latin_is_vietnamese` is set), unknown. A single diacritic is
/// decisive even in mixed text; Mixed is reserved for Hangul+Khmer.
pub fn detect_script(text: &str, assume_latin_is_vietnamese: bool) -> Script {
    if text.chars().all(is_ignorable) {
        return Script::Unknown;
    }

    let has_hangul = text.chars().any(is_hangul);
    let has_khmer = text.chars().any(is_khmer);
    let has_vietnamese = text.chars().any(is_vietnamese_diacritic);
    let has_latin = text.chars().any(|c| c.is_ascii_alphabetic());

    if has_vietnamese {
        Script::Vietnamese
    } else if has_hangul && has_khmer {
        Script::Mixed
    } else if has_khmer {
        Script::Khmer
    } else if has_hangul {
        Script::Hangul
    } else if assume_latin_is_vietnamese && has_latin {
        Script::Vietnamese
    } else {
        Script::Unknown
    }
}

/// True iff the message is purely decorative: non-empty after trimming,
/// contains no letter of a supported script and no digit, and consists only
/// of emoji, emoji modifiers, whitespace, and punctuation.
pub fn is_emoji_only(text: &str) -> bool {
    if text.trim().is_empty() {
        return false;
    }
    let has_normal = text.chars().any(|c| {
        is_hangul(c) || is_khmer(c) || is_vietnamese_diacritic(c) || c.is_ascii_alphanumeric()
    });
    if has_normal {
        return false;
    }
    text.chars().all(is_ignorable)
}
