pub mod inventory;
pub mod prompt;
