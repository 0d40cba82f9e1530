//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// Caption generator prompt
pub const CAPTION: &str = include_str!("../../prompts/caption.pmt");

/// Hashtag generator prompt
pub const HASHTAGS: &str = include_str!("../../prompts/hashtags.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "caption" => Some(CAPTION),
        "hashtags" => Some(HASHTAGS),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}
