pub mod auth;
pub mod balance;
pub mod config;
pub mod controller;
pub mod db;
pub mod fraud;
pub mod invoice;
pub mod model;
pub mod stats;
pub mod status_queue;
pub mod steadfast;
pub mod sync;
pub mod validation;
pub mod view;
