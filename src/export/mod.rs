//! Deck serialisation.
//!
//! | Format     | Module        | Notes                                   |
//! |------------|---------------|-----------------------------------------|
//! | PPTX       | [`pptx`]      | Office Open XML, figures as PNG parts   |
//! | JSON       | `serde_json`  | Full deck, media bytes base64-encoded   |
//! | Markdown   | [`markdown`]  | Outline, `---` between slides           |
//!
//! All three are pure functions of the deck: the same deck always yields
//! the same bytes.

pub mod markdown;
pub mod pptx;

use crate::config::OutputFormat;
use crate::error::SlideGenError;
use crate::model::SlideDeck;

/// Serialise `deck` in `format`.
pub fn render(deck: &SlideDeck, format: OutputFormat) -> Result<Vec<u8>, SlideGenError> {
    match format {
        OutputFormat::Pptx => pptx::write_pptx(deck),
        OutputFormat::Json => {
            serde_json::to_vec_pretty(deck).map_err(|e| SlideGenError::SerializationFailed {
                format: "json".to_string(),
                detail: e.to_string(),
            })
        }
        OutputFormat::Markdown => Ok(markdown::render_markdown(deck).into_bytes()),
    }
}
