// Application layer - Use cases and repository traits
pub mod event_service;
pub mod event_warehouse;
pub mod reading_service;
pub mod wide_column_store;
