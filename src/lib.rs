pub mod auth;
pub mod campaigns;
pub mod comms;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod reminders;
pub mod routes;
pub mod store;

#[cfg(test)]
mod test_support;
