//! Pipeline stages from uploaded file to scoring payload.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and swapped (e.g. a different vision backend) without
//! touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ enhance ──▶ encode ──▶ vision ─┐
//! (kind)    (temp png)  (base64)   (VLM)   ├──▶ normalize ──▶ payload
//!       └──▶ pdf text layer / text / html ─┘     (cleanup)     (request)
//! ```
//!
//! 1. [`input`]:     check the path and classify the document kind
//! 2. [`enhance`]:   contrast/sharpen pass on images, written to a scoped temp PNG
//! 3. [`encode`]:    base64-wrap (transcoding BMP/TIFF) for the multimodal request
//! 4. [`vision`]:    one VLM call per image; the only network I/O in this module
//! 5. [`normalize`]: deterministic text cleanup rules
//! 6. [`extract`]:   the dispatcher that ties 1–5 together
//! 7. [`payload`]:   assemble the [`crate::output::ScoringRequest`]

pub mod encode;
pub mod enhance;
pub mod extract;
pub mod input;
pub mod normalize;
pub mod payload;
pub mod vision;
