pub mod languages;
pub mod prompt;
