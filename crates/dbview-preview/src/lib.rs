//! Link previews for URL cells.
//!
//! Previews are decoration: a failed fetch degrades to
//! [`PreviewState::Unavailable`] and is never reported to the user. Each
//! fetch is tagged with the render generation of the page that requested it,
//! and results for an older generation are discarded on arrival.

mod board;
mod fetch;
mod html;

pub use board::{PreviewBoard, PreviewState};
pub use dbview_storage::viewer::is_link;
pub use fetch::{fetch_preview, PreviewError, MAX_PREVIEW_BODY_BYTES};
pub use html::{fallback_favicon, parse_preview, LinkPreview};
