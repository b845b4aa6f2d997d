pub mod bots;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod field;
pub mod game;
pub mod geometry;
pub mod invoke;
pub mod log;
pub mod player;
pub mod proxy;
pub mod round;
pub mod server;
pub mod state;
