pub mod clients;
pub mod config;
pub mod core;
pub mod db;
pub mod signals;
