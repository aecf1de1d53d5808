//! Static lookup tables behind category merging and entity classification.

pub const CODING: &str = "coding";
pub const BROWSING: &str = "browsing";
pub const DEBUGGING: &str = "debugging";
pub const COMMUNICATING: &str = "communicating";
pub const DESIGNING: &str = "designing";

/// Categories shown on the overview, in display order, with their titles.
pub const DISPLAY_CATEGORIES: [(&str, &str); 4] = [
    (CODING, "Coding"),
    (COMMUNICATING, "Communicating"),
    (BROWSING, "Browsing"),
    (DESIGNING, "Designing"),
];

/// Category labels clients send that mean the same thing as another label.
const CATEGORY_SYNONYMS: &[(&str, &str)] = &[("communication", COMMUNICATING)];

/// Reading the key category also counts the minutes of the listed ones. Storage keeps them
/// apart.
const CATEGORY_FOLDS: &[(&str, &[&str])] = &[(CODING, &[DEBUGGING])];

pub const SOCIAL_MEDIA_SITES: &[&str] = &[
    "facebook",
    "instagram",
    "twitter",
    "linkedin",
    "tiktok",
    "snapchat",
    "youtube",
    "twitch",
    "pinterest",
];

pub const GROWTH_SITES: &[&str] = &[
    "mozilla",
    "stackoverflow",
    "devdocs",
    "coursera",
    "udemy",
    "codeacademy",
    "theodinproject",
    "freecodecamp",
    "daily.dev",
    "dev.to",
    "hackernews",
    "leetcode",
    "hackerank",
];

/// Sites the repository reports activity windows for.
pub const TRACKED_SITES: &[&str] = &[
    "github",
    "gitlab",
    "stackoverflow",
    "chatgpt",
    "claude",
    "google",
    "youtube",
    "reddit",
    "linkedin",
    "twitter",
    "figma",
    "notion",
    "slack",
];

pub fn canonical_category(category: &str) -> &str {
    CATEGORY_SYNONYMS
        .iter()
        .find(|(synonym, _)| *synonym == category)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(category)
}

/// Categories whose minutes are added when reading `category`.
pub fn folded_categories(category: &str) -> &'static [&'static str] {
    CATEGORY_FOLDS
        .iter()
        .find(|(target, _)| *target == category)
        .map(|(_, folded)| *folded)
        .unwrap_or(&[])
}

/// Case-insensitive substring match of `entity` against a site list.
pub fn matches_any(entity: &str, sites: &[&str]) -> bool {
    let entity = entity.to_lowercase();
    sites.iter().any(|site| entity.contains(site))
}

#[cfg(test)]
mod tests {
    use super::{
        canonical_category, folded_categories, matches_any, GROWTH_SITES, SOCIAL_MEDIA_SITES,
    };

    #[test]
    fn test_canonical_category() {
        assert_eq!(canonical_category("communication"), "communicating");
        assert_eq!(canonical_category("communicating"), "communicating");
        assert_eq!(canonical_category("coding"), "coding");
        assert_eq!(canonical_category(""), "");
    }

    #[test]
    fn test_folds() {
        assert_eq!(folded_categories("coding"), &["debugging"]);
        assert!(folded_categories("debugging").is_empty());
    }

    #[test]
    fn test_site_matching() {
        assert!(matches_any("https://www.YouTube.com/watch?v=1", SOCIAL_MEDIA_SITES));
        assert!(!matches_any("https://docs.rs/chrono", SOCIAL_MEDIA_SITES));
        assert!(matches_any("https://developer.mozilla.org/en-US/", GROWTH_SITES));
        assert!(matches_any("https://LeetCode.com/problems", GROWTH_SITES));
    }
}
