//! History projection between the text and multimodal endpoints
//!
//! The multimodal endpoint keeps no multi-turn state, so its calls always start
//! from an empty history. Text calls reuse the session's turns with every image
//! part removed. Turns left without parts are kept so role alternation stays
//! aligned with the original turn indices.

use super::types::{ConversationHistory, ConversationTurn, Endpoint, Part};

/// Reconciles session history with the endpoint a call targets
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryAdapter;

impl HistoryAdapter {
    /// Project `history` for a call to `target`
    #[must_use]
    pub fn project(history: &ConversationHistory, target: Endpoint) -> ConversationHistory {
        match target {
            Endpoint::Multimodal => ConversationHistory::new(),
            Endpoint::Text => history.iter().map(text_only).collect(),
        }
    }
}

fn text_only(turn: &ConversationTurn) -> ConversationTurn {
    let parts = turn
        .parts
        .iter()
        .filter(|part| matches!(part, Part::Text(_)))
        .cloned()
        .collect();
    ConversationTurn::new(turn.role, parts)
}
