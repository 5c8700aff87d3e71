// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 stagewire contributors

//! Identifier normalization
//!
//! Turns display names into identifiers the host accepts: latin letters and
//! digits only, each word capitalized, starting with a letter.
//! `"Build - Mac OS X"` becomes `BuildMacOsX`, `"JDK_18"` becomes `Jdk18`.

/// Normalize a display name into an identifier.
///
/// Returns an empty string when the name has no usable characters.
pub fn to_id(name: &str) -> String {
    // Identifiers must start with a letter
    capitalize_words(name.trim_start_matches(|c: char| !c.is_ascii_alphabetic()))
}

/// Identifier with a fixed prefix, e.g. `Stage_` for stage gates.
///
/// The prefix is used as given and the name is normalized without dropping
/// its leading digits, so `"2024"` becomes `Stage_2024`. Only the combined
/// identifier is required to start with a letter.
pub fn to_prefixed_id(prefix: &str, name: &str) -> String {
    let words = capitalize_words(name);
    if words.is_empty() {
        return words;
    }
    format!("{prefix}{words}")
        .trim_start_matches(|c: char| !c.is_ascii_alphabetic())
        .to_string()
}

/// Latin letters and digits of `name`, each word capitalized
fn capitalize_words(name: &str) -> String {
    let mut id = String::with_capacity(name.len());

    for word in name.split(|c: char| !c.is_ascii_alphanumeric()) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            id.push(first.to_ascii_uppercase());
            id.extend(chars.map(|c| c.to_ascii_lowercase()));
        }
    }

    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_whitespace_and_punctuation() {
        assert_eq!(to_id("Build - Linux"), "BuildLinux");
        assert_eq!(to_id("Build - Mac OS X"), "BuildMacOsX");
        assert_eq!(to_id("Build - Linux - JDK_18"), "BuildLinuxJdk18");
        assert_eq!(to_id("Stage One"), "StageOne");
    }

    #[test]
    fn test_keeps_simple_names() {
        assert_eq!(to_id("Build1"), "Build1");
        assert_eq!(to_id("Compile"), "Compile");
    }

    #[test]
    fn test_leading_digits_dropped() {
        assert_eq!(to_id("1st build"), "StBuild");
        assert_eq!(to_id("2024"), "");
        assert_eq!(to_id(" -- "), "");
    }

    #[test]
    fn test_prefixed_id() {
        assert_eq!(to_prefixed_id("Stage_", "Stage1"), "Stage_Stage1");
        assert_eq!(to_prefixed_id("Stage_", "Stage One"), "Stage_StageOne");
        assert_eq!(to_prefixed_id("Stage_", "!!"), "");
    }

    #[test]
    fn test_prefixed_id_keeps_leading_digits() {
        assert_eq!(to_prefixed_id("Stage_", "2024"), "Stage_2024");
        assert_eq!(to_prefixed_id("Stage_", "1 Build"), "Stage_1Build");
        assert_eq!(to_prefixed_id("Stage_", "2 Build"), "Stage_2Build");
    }

    #[test]
    fn test_prefixed_id_still_starts_with_a_letter() {
        assert_eq!(to_prefixed_id("", "2024 Release"), "Release");
        assert_eq!(to_prefixed_id("", "2024"), "");
        assert_eq!(to_prefixed_id("_", "Build"), "Build");
    }
}
