use std::collections::HashMap;

use econ_chat_storage::TurnId;

/// Receives thumbs up or down verdicts on bot turns.
pub trait FeedbackSink {
    fn record_feedback(&mut self, turn_id: TurnId, is_positive: bool);
}

/// In-memory feedback store. Recording again for the same turn replaces the verdict.
#[derive(Debug, Default, Clone)]
pub struct FeedbackLedger {
    verdicts: HashMap<TurnId, bool>,
}

impl FeedbackLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verdict(&self, turn_id: TurnId) -> Option<bool> {
        self.verdicts.get(&turn_id).copied()
    }

    pub fn len(&self) -> usize {
        self.verdicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }
}

impl FeedbackSink for FeedbackLedger {
    fn record_feedback(&mut self, turn_id: TurnId, is_positive: bool) {
        let previous = self.verdicts.insert(turn_id, is_positive);
        tracing::debug!(
            turn_id = %turn_id,
            is_positive,
            replaced = previous.is_some(),
            "recorded feedback"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_verdict_wins() {
        let mut ledger = FeedbackLedger::new();
        let turn = TurnId::new_v4();
        let other = TurnId::new_v4();

        ledger.record_feedback(turn, true);
        ledger.record_feedback(turn, false);
        ledger.record_feedback(other, true);

        assert_eq!(ledger.verdict(turn), Some(false));
        assert_eq!(ledger.verdict(other), Some(true));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.verdict(TurnId::new_v4()), None);
    }
}
