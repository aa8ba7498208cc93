pub mod auction;
pub mod bidding;
pub mod cache;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod controller;
pub mod database;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod locks;
pub mod message_broker;
pub mod notify;
pub mod scheduler;
pub mod settlement;
pub mod store;
