//! Pipeline stages for invoice field extraction.
//!
//! Each submodule implements exactly one step of a single document's
//! processing. Keeping stages separate makes each independently testable and
//! lets the orchestrator in [`crate::extract`] stay a thin sequence of calls.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ submit ──▶ retry(invoke ──▶ sanitize ──▶ normalize)
//! (bytes)   (upload    (rate-limit   (model      (JSON      (typed
//!            + poll)    cooldown)     answer)     object)    fields)
//! ```
//!
//! 1. [`input`]     — the in-memory document and how paths become one
//! 2. [`submit`]    — upload, then poll until the service reports READY
//! 3. [`invoke`]    — one generation request; the only stage besides
//!    `submit` with network I/O
//! 4. [`sanitize`]  — recover a JSON object from free-form model output
//! 5. [`normalize`] — dates, amounts and placeholders into typed fields
//! 6. [`retry`]     — fixed-cooldown retry on rate-limit-class failures
//!
//! [`clock`] abstracts every wait so tests run without real delays.

pub mod clock;
pub mod input;
pub mod invoke;
pub mod normalize;
pub mod retry;
pub mod sanitize;
pub mod submit;
