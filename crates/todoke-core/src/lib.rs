//! # Todoke Core
//!
//! Shared foundation for the Todoke delivery scheduler: domain types
//! (campaigns, submissions, form data), configuration, the error taxonomy,
//! JST time handling, and the sender trait seam.

pub mod config;
pub mod error;
pub mod jst;
pub mod traits;
pub mod types;

pub use config::TodokeConfig;
pub use error::{Result, TodokeError};
pub use traits::DeliverySender;
pub use types::{Campaign, DeliveryChannel, DeliveryType, FormData, FormValue, Submission};
