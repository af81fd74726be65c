use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Language {
    pub value: &'static str,
    pub label: &'static str,
}

const fn lang(value: &'static str, label: &'static str) -> Language {
    Language { value, label }
}

/// Languages offered by the language selector. `value` is what gets sent
/// to the model, `label` is what gets shown.
pub const LANGUAGES: &[Language] = &[
    lang("English", "English"),
    lang("Spanish", "Español"),
    lang("French", "Français"),
    lang("German", "Deutsch"),
    lang("Italian", "Italiano"),
    lang("Portuguese", "Português"),
    lang("Dutch", "Nederlands"),
    lang("Polish", "Polski"),
    lang("Swedish", "Svenska"),
    lang("Norwegian", "Norsk"),
    lang("Danish", "Dansk"),
    lang("Finnish", "Suomi"),
    lang("Czech", "Čeština"),
    lang("Greek", "Ελληνικά"),
    lang("Turkish", "Türkçe"),
    lang("Russian", "Русский"),
    lang("Ukrainian", "Українська"),
    lang("Arabic", "العربية"),
    lang("Hebrew", "עברית"),
    lang("Hindi", "हिन्दी"),
    lang("Bengali", "বাংলা"),
    lang("Japanese", "日本語"),
    lang("Korean", "한국어"),
    lang("Chinese (Simplified)", "简体中文"),
    lang("Chinese (Traditional)", "繁體中文"),
    lang("Vietnamese", "Tiếng Việt"),
    lang("Thai", "ไทย"),
    lang("Indonesian", "Bahasa Indonesia"),
];

pub fn find_language(name: &str) -> Option<&'static Language> {
    let name = name.trim();
    LANGUAGES
        .iter()
        .find(|l| l.value.eq_ignore_ascii_case(name) || l.label.eq_ignore_ascii_case(name))
}
