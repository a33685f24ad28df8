//! Receipt ingestion pipeline stages.
//!
//! ```text
//! acquire ──▶ segment ──▶ extract (generate + json) ──▶ validate
//!  (ocr/pdf)                                            (then store)
//! ```
//!
//! * [`acquire`]: document → raw text, confidence, optional per-page blocks
//! * [`segment`]: raw text → ordered page texts
//! * [`extract`]: page text → candidates, via [`generate`] and [`json`]
//! * [`validate`]: candidates → records ready for the store
//!
//! [`ocr`] and [`pdf`] wrap the external engines behind traits so the
//! stages can be driven by fakes in tests.

pub mod acquire;
pub mod extract;
pub mod generate;
pub mod json;
pub mod ocr;
pub mod pdf;
pub mod segment;
pub mod validate;
