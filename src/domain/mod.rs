// Domain layer - Pure data models and key derivation
pub mod event;
pub mod row_key;
pub mod wide_row;
