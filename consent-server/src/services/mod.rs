pub mod consent;
pub mod templates;
