//! HTML rewriting for builds served under a nested mount path.
//!
//! Both filters are plain text substitutions over `.html` files:
//!
//! 1. `href="/`  →  `href="/builds/preview/<key>/`
//! 2. `</body>`  →  `<script>`  +  `</body>`
//!
//! They run in this order.

use super::{PreviewKey, mount_path};
use crate::pipeline::Replace;

const HTML_EXTENSION: &str = "html";
const LINK_MARKER: &str = "href=\"/";
const BODY_CLOSE: &str = "</body>";

/// Link rewriter followed by script injector for preview `key`.
pub fn rewriters(key: &PreviewKey, script: &str) -> Result<[Replace; 2], regex::Error> {
    let links = Replace::literal(
        LINK_MARKER,
        &format!("href=\"{}/", mount_path(key)),
        HTML_EXTENSION,
    )?;
    let script = Replace::literal(BODY_CLOSE, &format!("{script}{BODY_CLOSE}"), HTML_EXTENSION)?;

    Ok([links, script])
}
