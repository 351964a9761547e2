// ABOUTME: Library crate for statepool exposing the pool, its sessions and configuration

#![allow(missing_docs)]

pub mod config;
pub mod state_pool;
