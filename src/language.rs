use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DubberError;

/// Languages the dubbing vendor can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    English,
    Spanish,
    French,
    German,
    Hindi,
    Japanese,
    Korean,
    Chinese,
}

impl Language {
    pub const ALL: [Language; 8] = [
        Language::English,
        Language::Spanish,
        Language::French,
        Language::German,
        Language::Hindi,
        Language::Japanese,
        Language::Korean,
        Language::Chinese,
    ];

    /// Human-readable name used in replies and prompts
    pub fn name(&self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Spanish => "Spanish",
            Self::French => "French",
            Self::German => "German",
            Self::Hindi => "Hindi",
            Self::Japanese => "Japanese",
            Self::Korean => "Korean",
            Self::Chinese => "Chinese",
        }
    }

    /// ISO 639-1 code
    pub fn code(&self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Spanish => "es",
            Self::French => "fr",
            Self::German => "de",
            Self::Hindi => "hi",
            Self::Japanese => "ja",
            Self::Korean => "ko",
            Self::Chinese => "zh",
        }
    }

    /// Vendor locale code sent as `target_locales`
    pub fn locale_code(&self) -> &'static str {
        match self {
            Self::English => "en_US",
            Self::Spanish => "es_ES",
            Self::French => "fr_FR",
            Self::German => "de_DE",
            Self::Hindi => "hi_IN",
            Self::Japanese => "ja_JP",
            Self::Korean => "ko_KR",
            Self::Chinese => "zh_CN",
        }
    }

    pub fn supported_names() -> Vec<&'static str> {
        Self::ALL.iter().map(|l| l.name()).collect()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Language {
    type Err = DubberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize_language(s).ok_or_else(|| DubberError::UnsupportedLanguage(s.trim().to_string()))
    }
}

/// Map a language name, two-letter code or locale code onto a supported
/// language. Matching ignores case and surrounding whitespace; `pt-BR` style
/// locales are accepted alongside the vendor's `pt_BR` form.
pub fn normalize_language(input: &str) -> Option<Language> {
    let needle = input.trim().to_lowercase().replace('-', "_");
    if needle.is_empty() {
        return None;
    }

    Language::ALL.iter().copied().find(|lang| {
        needle == lang.name().to_lowercase()
            || needle == lang.code()
            || needle == lang.locale_code().to_lowercase()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_name_and_code_normalizes() {
        for lang in Language::ALL {
            assert_eq!(normalize_language(lang.name()), Some(lang));
            assert_eq!(normalize_language(lang.code()), Some(lang));
            assert_eq!(normalize_language(lang.locale_code()), Some(lang));
        }
    }

    #[test]
    fn test_normalize_is_case_and_separator_insensitive() {
        assert_eq!(normalize_language("  korean "), Some(Language::Korean));
        assert_eq!(normalize_language("KO"), Some(Language::Korean));
        assert_eq!(normalize_language("ja-JP"), Some(Language::Japanese));
    }

    #[test]
    fn test_unknown_languages_are_rejected() {
        assert_eq!(normalize_language(""), None);
        assert_eq!(normalize_language("Klingon"), None);
        assert_eq!(normalize_language("pt"), None);

        let err = "Klingon".parse::<Language>().unwrap_err();
        assert!(matches!(err, DubberError::UnsupportedLanguage(ref l) if l == "Klingon"));
    }

    #[test]
    fn test_locale_table() {
        assert_eq!(Language::English.locale_code(), "en_US");
        assert_eq!(Language::Hindi.locale_code(), "hi_IN");
        assert_eq!(Language::Chinese.locale_code(), "zh_CN");
        assert_eq!(Language::supported_names().len(), 8);
    }
}
