//! Lightweight keyword pre-filter, secondary to the hierarchical planner.
//!
//! Assigns a coarse label by keyword match, the way a routing layer might
//! tag an event before deeper processing. Never itself produces the final
//! dispatch decision; it only short-circuits the obvious cases (a bare
//! greeting) before paying for a manager LLM call.

use crate::types::Intent;

/// A coarse guess at the inbound message's intent from keyword matching
/// alone. `None` means "no obvious match, let the manager LLM decide."
#[must_use]
pub fn guess_intent(inbound_text: &str) -> Option<Intent> {
    let normalized = inbound_text.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }

    const GREETINGS: &[&str] = &[
        "hola", "buenas", "buen dia", "buen día", "buenos dias", "buenos días", "hello", "hi",
    ];
    if GREETINGS.iter().any(|g| normalized == *g || normalized.starts_with(&format!("{g} "))) {
        return Some(Intent::Greeting);
    }

    None
}
