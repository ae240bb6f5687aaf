// Infrastructure layer - External dependencies and adapters
pub mod auth;
pub mod bigquery_repository;
pub mod bigtable_repository;
pub mod config;
