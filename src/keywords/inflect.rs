//! Plural-to-singular reduction for English keywords.

/// Irregular plurals and plurals the suffix rules would get wrong.
const IRREGULAR: &[(&str, &str)] = &[
    ("children", "child"),
    ("people", "person"),
    ("men", "man"),
    ("women", "woman"),
    ("mice", "mouse"),
    ("geese", "goose"),
    ("teeth", "tooth"),
    ("feet", "foot"),
    ("oxen", "ox"),
    ("leaves", "leaf"),
    ("knives", "knife"),
    ("wives", "wife"),
    ("lives", "life"),
    ("wolves", "wolf"),
    ("halves", "half"),
    ("shelves", "shelf"),
    ("loaves", "loaf"),
    ("calves", "calf"),
    ("scarves", "scarf"),
    ("movies", "movie"),
    ("cookies", "cookie"),
    ("shoes", "shoe"),
    ("toes", "toe"),
    ("canoes", "canoe"),
    ("oboes", "oboe"),
    ("floes", "floe"),
    ("caches", "cache"),
    ("niches", "niche"),
    ("cliches", "cliche"),
    ("quiches", "quiche"),
    ("avalanches", "avalanche"),
    ("headaches", "headache"),
    ("moustaches", "moustache"),
    ("mustaches", "mustache"),
    ("horses", "horse"),
    ("houses", "house"),
    ("clouds", "cloud"),
];

/// Words ending in `s` that are already singular or have no singular form.
const INVARIANT: &[&str] = &[
    "news",
    "series",
    "species",
    "gas",
    "lens",
    "chaos",
    "jeans",
    "pants",
    "shorts",
    "scissors",
    "clothes",
    "sunglasses",
    "physics",
    "mathematics",
    "athletics",
    "aerobics",
    "gymnastics",
    "electronics",
    "graphics",
    "politics",
    "economics",
    "christmas",
    "texas",
    "canvas",
    "atlas",
    "bias",
];

/// Reduces a single lowercase word to its singular form.
///
/// Words of three characters or fewer are returned unchanged, as are words
/// ending in `ss`, `us` or `is` (grass, cactus, analysis).
pub fn depluralize(word: &str) -> String {
    if word.chars().count() <= 3 || INVARIANT.contains(&word) {
        return word.to_string();
    }

    if let Some((_, singular)) = IRREGULAR.iter().find(|(plural, _)| *plural == word) {
        return (*singular).to_string();
    }

    if word.ends_with("ss") || word.ends_with("us") || word.ends_with("is") {
        return word.to_string();
    }

    if let Some(stem) = word.strip_suffix("ies")
        && stem.chars().count() > 1
    {
        return format!("{stem}y");
    }

    for suffix in ["sses", "ches", "shes", "xes", "zes", "oes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }

    match word.strip_suffix('s') {
        Some(stem) => stem.to_string(),
        None => word.to_string(),
    }
}
