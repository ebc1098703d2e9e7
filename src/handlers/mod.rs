//! HTTP handlers

pub mod catalog;
pub mod detection;
pub mod health;
pub mod zombies;
