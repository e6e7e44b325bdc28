//! # Todoke Scheduler
//!
//! The reconciliation core: a pure decision engine that determines whether
//! a submission is due now (and via which channel), and the periodic loop
//! that fans out decide → send → commit pipelines per submission.
//!
//! ## Architecture
//! ```text
//! spawn_scheduler (tokio interval)          Manual trigger (gateway)
//!          └──────────────┬──────────────────────────┘
//!                 ReconcileEngine::run
//!                   ├── Store: campaigns with delivery policy
//!                   ├── Store: pending submissions per campaign
//!                   └── per submission (bounded fan-out):
//!                         decision::evaluate
//!                           └── Deliver → sender.send (timeout-bounded)
//!                                 └── Store::mark_delivered (conditional)
//! ```
//!
//! The engine is stateless between runs — continuity lives entirely in the
//! store, so overlapping runs and the manual trigger share one code path
//! and one idempotence mechanism (the delivered-flag gate plus the
//! conditional commit).

pub mod decision;
pub mod engine;

pub use decision::{Decision, SkipReason};
pub use engine::{ReconcileEngine, RunSummary, spawn_scheduler};
