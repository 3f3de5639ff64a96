//! Conversation history — append-only log of completed turns

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// AI replies longer than this are truncated in the summary dump.
const SUMMARY_REPLY_CHARS: usize = 100;

/// One completed exchange. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user_text: String,
    pub ai_text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(user_text: impl Into<String>, ai_text: impl Into<String>) -> Self {
        Self {
            user_text: user_text.into(),
            ai_text: ai_text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Ordered, append-only record of the conversation. Lives as long as the
/// orchestrator; nothing is ever removed.
#[derive(Debug, Default)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Chronological dump of the conversation for the end-of-run summary.
    pub fn summary(&self) -> String {
        if self.turns.is_empty() {
            return "No conversation history to display.".to_string();
        }

        let mut out = format!("Conversation summary ({} exchanges):\n", self.turns.len());
        for (i, turn) in self.turns.iter().enumerate() {
            out.push_str(&format!("\nTurn {}:\n", i + 1));
            out.push_str(&format!("  You: {}\n", turn.user_text));
            out.push_str(&format!("  AI: {}\n", truncate(&turn.ai_text, SUMMARY_REPLY_CHARS)));
        }
        out
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_preserves_insertion_order() {
        let mut history = ConversationHistory::new();
        history.push(ConversationTurn::new("first", "reply one"));
        history.push(ConversationTurn::new("second", "reply two"));

        assert_eq!(history.len(), 2);
        assert_eq!(history.turns()[0].user_text, "first");
        assert_eq!(history.turns()[1].user_text, "second");
    }

    #[test]
    fn summary_counts_turns() {
        let mut history = ConversationHistory::new();
        assert!(history.summary().contains("No conversation history"));

        history.push(ConversationTurn::new("hello", "hi there"));
        let summary = history.summary();
        assert!(summary.contains("1 exchanges"));
        assert!(summary.contains("You: hello"));
        assert!(summary.contains("AI: hi there"));
    }

    #[test]
    fn long_replies_are_truncated_in_summary() {
        let long_reply = "x".repeat(250);
        let mut history = ConversationHistory::new();
        history.push(ConversationTurn::new("q", long_reply));

        let summary = history.summary();
        assert!(summary.contains(&format!("{}...", "x".repeat(100))));
        assert!(!summary.contains(&"x".repeat(101)));
    }
}
