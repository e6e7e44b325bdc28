//! # Todoke Channels
//! Delivery channel adapters.
//!
//! Each adapter performs exactly one delivery attempt and reports
//! success/failure; the reconciliation engine owns the delivered-state
//! commit.

pub mod email;
pub mod line;
pub mod template;

pub use email::EmailSender;
pub use line::LineSender;
