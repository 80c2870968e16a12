pub mod config;
pub mod db;
pub mod environment;
pub mod errors;
pub mod io;
pub mod normalization;
pub mod pagination;
pub mod recipe;
pub mod routes;
pub mod store;
pub mod urls;
pub mod user;
