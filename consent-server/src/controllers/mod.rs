pub mod consent;
pub mod grants;
