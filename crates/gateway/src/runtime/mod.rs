//! Core runtime — the orchestrator that ties conversation loading, LLM
//! streaming, tool dispatch with context injection, and persistence into
//! one deterministic loop.
//!
//! Entry point: [`run_turn`] takes a turn input and returns a channel of
//! [`TurnEvent`]s the socket handler forwards to the client.

pub mod agents;
pub mod cancel;
pub mod conversation_lock;
pub mod quota;
pub mod turn;

pub use turn::{run_turn, TurnEvent, TurnInput};

/// Truncate on a char boundary with an ellipsis, for event previews.
pub(crate) fn truncate_str(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_owned();
    }
    let mut end = max;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_within_limit() {
        assert_eq!(truncate_str("short", 10), "short");
    }

    #[test]
    fn truncate_over_limit() {
        assert_eq!(truncate_str("hello world", 5), "hello...");
    }

    #[test]
    fn truncate_multibyte_boundary() {
        let out = truncate_str("h\u{00e9}llo", 2);
        assert_eq!(out, "h...");
    }
}
