// crates/core/src/catalog.rs
//! Static speaker and language catalog for the preset-voice model.

use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct SpeakerInfo {
    pub name: &'static str,
    pub languages: &'static [&'static str],
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct LanguageInfo {
    pub code: &'static str,
    pub name: &'static str,
}

pub const LANGUAGES: &[LanguageInfo] = &[
    LanguageInfo { code: "zh", name: "Chinese" },
    LanguageInfo { code: "en", name: "English" },
    LanguageInfo { code: "ja", name: "Japanese" },
    LanguageInfo { code: "ko", name: "Korean" },
    LanguageInfo { code: "de", name: "German" },
    LanguageInfo { code: "fr", name: "French" },
    LanguageInfo { code: "ru", name: "Russian" },
    LanguageInfo { code: "pt", name: "Portuguese" },
    LanguageInfo { code: "es", name: "Spanish" },
    LanguageInfo { code: "it", name: "Italian" },
];

pub const SPEAKERS: &[SpeakerInfo] = &[
    SpeakerInfo {
        name: "Vivian",
        languages: &["Chinese", "English"],
        description: "Female, warm and expressive. Native Chinese, fluent English.",
    },
    SpeakerInfo {
        name: "Ryan",
        languages: &["English", "Chinese"],
        description: "Male, clear and confident voice. Native English speaker.",
    },
    SpeakerInfo {
        name: "Aria",
        languages: &["English"],
        description: "Female, professional and calm tone. Great for narration.",
    },
    SpeakerInfo {
        name: "Oliver",
        languages: &["English"],
        description: "Male, friendly and conversational voice.",
    },
    SpeakerInfo {
        name: "Bella",
        languages: &["Chinese"],
        description: "Female, youthful and energetic voice. Native Chinese speaker.",
    },
    SpeakerInfo {
        name: "Ethan",
        languages: &["Chinese", "English"],
        description: "Male, deep and authoritative voice.",
    },
    SpeakerInfo {
        name: "Claire",
        languages: &["English", "French"],
        description: "Female, elegant and articulate voice.",
    },
    SpeakerInfo {
        name: "Lucas",
        languages: &["English", "German"],
        description: "Male, warm and steady voice.",
    },
    SpeakerInfo {
        name: "Sophia",
        languages: &["Japanese", "English"],
        description: "Female, gentle and melodic voice.",
    },
    SpeakerInfo {
        name: "Leo",
        languages: &["Korean", "English"],
        description: "Male, dynamic and expressive voice.",
    },
];

/// Speaker used by the streaming endpoint when a preset-voice request names none.
pub const DEFAULT_SPEAKER: &str = "Vivian";

pub fn find_speaker(name: &str) -> Option<&'static SpeakerInfo> {
    SPEAKERS.iter().find(|s| s.name.eq_ignore_ascii_case(name))
}
