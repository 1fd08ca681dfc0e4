//! Nightwatch - session supervisor and stealth auto-reply dispatch engine
//! for fleets of externally linked chat accounts.

pub mod activity;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod expiry;
pub mod identity;
pub mod service;
pub mod session;
pub mod settings;
pub mod supervisor;
pub mod transport;
