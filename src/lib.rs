pub mod ad_script;
pub mod api;
pub mod assembler;
pub mod catalog;
pub mod config;
pub mod data_models;
pub mod db;
pub mod error;
pub mod index_query;
pub mod normalizer;
pub mod query_engine;
pub mod search_index;
pub mod sql_query;
