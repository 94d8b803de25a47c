//! Static word tables used by keyword normalization.

/// Words that models tend to echo back from the instruction text.
pub const DEFAULT_BANNED_WORDS: &[&str] = &[
    "no",
    "unspecified",
    "unknown",
    "standard",
    "unidentified",
    "time",
    "category",
    "actions",
    "setting",
    "objects",
    "visual",
    "elements",
    "activities",
    "appearance",
    "professions",
    "relationships",
    "identify",
    "photography",
    "photographic",
    "topiary",
];

/// Three-word "A and B" / "A or B" phrases kept intact instead of being
/// split into their outer words.
pub const AND_EXCEPTIONS: &[&str] = &[
    "black and white",
    "rock and roll",
    "salt and pepper",
    "fish and chips",
    "arts and crafts",
    "hide and seek",
    "bed and breakfast",
    "trial and error",
    "law and order",
    "bread and butter",
    "rise and shine",
    "cause and effect",
    "now or never",
    "trick or treat",
    "more or less",
];

pub fn is_and_exception(phrase: &str) -> bool {
    AND_EXCEPTIONS.contains(&phrase)
}
