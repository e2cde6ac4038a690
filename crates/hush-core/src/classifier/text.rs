//! Text scanning helpers shared by the classifier and the learner.

/// Acknowledgement tokens that never warrant a notification on their own.
pub const ACKNOWLEDGEMENTS: &[&str] = &[
    "ok", "okay", "k", "kk", "thanks", "thank you", "thx", "ty", "lol", "haha", "np", "cool",
    "nice", "yep", "yup", "sure", "got it",
];

/// Tokens that address the reader directly.
const SECOND_PERSON: &[&str] = &[
    "you", "your", "yours", "you're", "youre", "you've", "you'll", "you'd", "u", "ur", "yall",
    "y'all",
];

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Lowercased tokens with punctuation trimmed from their edges.
pub fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_lowercase()
        })
        .filter(|word| !word.is_empty())
}

/// Case-insensitive match of `needle` in `text` at word boundaries.
pub fn contains_word(text: &str, needle: &str) -> bool {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return false;
    }
    let text = text.to_lowercase();

    text.match_indices(&needle).any(|(start, m)| {
        let before = text[..start].chars().next_back();
        let after = text[start + m.len()..].chars().next();
        !before.map_or(false, is_word_char) && !after.map_or(false, is_word_char)
    })
}

/// Find the first keyword present in `text`. Single-word keywords match whole
/// tokens; multi-word keywords match as a phrase.
pub fn find_keyword<'a>(text: &str, keywords: &'a [String]) -> Option<&'a str> {
    let words: Vec<String> = tokens(text).collect();
    keywords.iter().map(String::as_str).find(|keyword| {
        if keyword.contains(char::is_whitespace) {
            contains_word(text, keyword)
        } else {
            words.iter().any(|w| w == keyword)
        }
    })
}

/// Whether the text addresses the reader in second person.
pub fn has_second_person(text: &str) -> bool {
    tokens(text).any(|t| SECOND_PERSON.contains(&t.as_str()))
}

/// Text with surrounding whitespace and punctuation removed.
pub fn trim_noise(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
}

pub fn is_acknowledgement(text: &str) -> bool {
    let trimmed = trim_noise(text).to_lowercase();
    ACKNOWLEDGEMENTS.contains(&trimmed.as_str())
}

fn is_emoji_char(c: char) -> bool {
    matches!(
        c as u32,
        0x1F000..=0x1FAFF      // pictographs, emoticons, transport, symbols
            | 0x2600..=0x27BF  // misc symbols and dingbats
            | 0x2B00..=0x2BFF  // arrows, stars
            | 0xFE0F           // variation selector
            | 0x200D           // zero width joiner
            | 0x20E3           // keycap
    )
}

/// Non-empty text made only of emoji and whitespace.
pub fn is_emoji_only(text: &str) -> bool {
    let mut any = false;
    for c in text.chars() {
        if c.is_whitespace() {
            continue;
        }
        if !is_emoji_char(c) {
            return false;
        }
        any = true;
    }
    any
}

/// Shorten text for display, cutting on a char boundary.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", cut.trim_end())
}
