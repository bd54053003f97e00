//! Naming helpers for resource identifiers
//!
//! Resource names are snake_case singular nouns (`article`, `blog_post`).
//! Plural names default to English pluralization; display names are humanized.

/// Pluralize the last word of a snake_case resource name
///
/// ```
/// use resource::core::naming::pluralize;
///
/// assert_eq!(pluralize("article"), "articles");
/// assert_eq!(pluralize("category"), "categories");
/// assert_eq!(pluralize("blog_post"), "blog_posts");
/// assert_eq!(pluralize("address"), "addresses");
/// ```
pub fn pluralize(singular: &str) -> String {
    if singular.is_empty() {
        return String::new();
    }

    let (head, word) = match singular.rfind('_') {
        Some(idx) => singular.split_at(idx + 1),
        None => ("", singular),
    };

    let plural = match word {
        "person" => "people".to_string(),
        "child" => "children".to_string(),
        w if w.ends_with('y') && w.len() > 1 && !ends_with_vowel_y(w) => {
            format!("{}ies", &w[..w.len() - 1])
        }
        w if ["s", "sh", "ch", "x", "z"].iter().any(|s| w.ends_with(s)) => format!("{}es", w),
        w if w.ends_with("fe") && w.len() > 2 => format!("{}ves", &w[..w.len() - 2]),
        w => format!("{}s", w),
    };

    format!("{}{}", head, plural)
}

fn ends_with_vowel_y(word: &str) -> bool {
    ["ay", "ey", "iy", "oy", "uy"]
        .iter()
        .any(|suffix| word.ends_with(suffix))
}

/// Turn a snake_case name into a capitalized display name (`blog_post` -> `Blog post`)
pub fn humanize(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
