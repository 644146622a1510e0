//! Plate Sync - Real-time synchronization core for a shared kanban workspace
//!
//! Clients hold one persistent connection each, authenticate once, subscribe
//! to boards, teams, and linked chat/mail accounts, and receive every state
//! change made by anyone else on those entities.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
