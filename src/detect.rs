//! Turn a fetched page into a [`Signal`].
//!
//! All strategies are pure functions of the body and the [`Detection`]
//! settings, so calling [`detect`] twice on the same input always gives the
//! same answer.
//!
//! | Strategy | Reads | `active` when |
//! |----------|-------|---------------|
//! | [`Detection::MarkerCount`] | lower-cased markup | marker count ≥ threshold |
//! | [`Detection::MarkerPresence`] | lower-cased markup | marker found |
//! | [`Detection::PhraseAbsence`] | visible text | phrase not found |

use crate::models::{Detection, Signal};
use crate::utils::collapse_whitespace;
use scraper::Html;

/// Elements whose text never reaches the reader.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Apply `detection` to `body`.
pub fn detect(body: &str, detection: &Detection) -> Signal {
    match detection {
        Detection::MarkerCount { marker, threshold } => {
            let count = count_markers(body, marker);
            Signal {
                active: count >= *threshold,
                count,
            }
        }
        Detection::MarkerPresence { marker } => {
            let found = body.to_lowercase().contains(&marker.to_lowercase());
            Signal {
                active: found,
                count: u32::from(found),
            }
        }
        Detection::PhraseAbsence { phrase } => {
            // Compared in the same normal form as the page text.
            let phrase = collapse_whitespace(phrase);
            let absent = !visible_text(body).contains(phrase.as_str());
            Signal {
                active: absent,
                count: u32::from(absent),
            }
        }
    }
}

/// Count non-overlapping, case-insensitive occurrences of `marker`.
fn count_markers(body: &str, marker: &str) -> u32 {
    let needle = marker.to_lowercase();
    if needle.is_empty() {
        return 0;
    }
    let n = body.to_lowercase().matches(needle.as_str()).count();
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Text a browser would render, with whitespace runs collapsed.
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|parent| {
            parent
                .value()
                .as_element()
                .is_some_and(|el| HIDDEN_ELEMENTS.contains(&el.name()))
        });
        if !hidden {
            raw.push_str(text);
            raw.push(' ');
        }
    }

    collapse_whitespace(&raw)
}
