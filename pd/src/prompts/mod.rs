//! Prompt templates
//!
//! `.pmt` files rendered with Handlebars. A template named `{name}` is read
//! from `{prompts-dir}/{name}.pmt` when that file exists, otherwise the copy
//! compiled into the binary is used.

pub mod embedded;
mod loader;

pub use loader::{CaptionPromptContext, HashtagPromptContext, PromptLoader};
