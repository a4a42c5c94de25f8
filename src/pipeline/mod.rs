//! Pipeline stages for insurance-card processing.
//!
//! Each submodule implements exactly one transformation step and is
//! testable on its own. Stages that touch pixels are synchronous and run in
//! `spawn_blocking` from [`crate::scan`]; the network calls live behind the
//! traits in [`crate::services`].
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ orient ──▶ compress ──▶ encode ──▶ (OCR) ──▶ extract ──▶ assemble
//! (stage)   (EXIF)     (≤ 2 MB)     (base64)            (LLM+parse)  (PDF)
//! ```
//!
//! 1. [`input`]    validate the two uploads and save them to a scratch dir
//! 2. [`orient`]   bake the EXIF rotation into the pixels
//! 3. [`compress`] bound dimensions and step JPEG quality down to a size ceiling
//! 4. [`encode`]   base64 + MIME type for the OCR request
//! 5. [`extract`]  ask the LLM for the card fields and parse its answer,
//!    after [`postprocess`] has stripped markdown decoration
//! 6. [`assemble`] write the front and back as a two-page PDF

pub mod assemble;
pub mod compress;
pub mod encode;
pub mod extract;
pub mod input;
pub mod orient;
pub mod postprocess;
