use serde::Serialize;

use crate::config::CostConfig;
use crate::models::ConversationTurn;
use crate::rates::RateCache;

/// Usage totals derived from a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UsageSummary {
    pub turn_count: usize,
    pub total_tokens: u64,
    pub total_response_seconds: u64,
    pub longest_response_seconds: Option<f64>,
    pub average_response_seconds: Option<f64>,
}

impl UsageSummary {
    pub fn from_turns(turns: &[ConversationTurn]) -> Self {
        let total_tokens = turns.iter().map(|t| t.total_tokens).sum();
        let total_response_seconds: u64 = turns.iter().map(|t| t.response_time_seconds).sum();
        let longest = turns.iter().map(|t| t.response_time_seconds).max();

        Self {
            turn_count: turns.len(),
            total_tokens,
            total_response_seconds,
            longest_response_seconds: longest.map(|s| s as f64),
            average_response_seconds: (!turns.is_empty())
                .then(|| total_response_seconds as f64 / turns.len() as f64),
        }
    }

    /// Warehouse credits consumed according to the cost heuristic
    pub fn credits_spent(&self, cost: &CostConfig) -> f64 {
        cost.credits_per_token * self.total_tokens as f64
            + cost.credits_per_second * self.total_response_seconds as f64
    }
}

/// Stats panel figures, amounts in the local currency.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    #[serde(flatten)]
    pub usage: UsageSummary,
    pub credits_spent: f64,
    pub conversation_cost: f64,
    pub remaining_balance: f64,
    pub panel: StatsPanel,
}

/// Display strings for the stats panel.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatsPanel {
    pub remaining_balance: String,
    pub conversation_cost: String,
    pub longest_response_time: String,
    pub average_response_time: String,
    pub total_tokens: String,
}

impl SessionStats {
    pub async fn compute(
        turns: &[ConversationTurn],
        remaining_balance_usd: f64,
        cost: &CostConfig,
        rates: &RateCache,
        symbol: &str,
    ) -> Self {
        let usage = UsageSummary::from_turns(turns);
        let credits_spent = usage.credits_spent(cost);
        let conversation_cost = credits_spent * rates.get_usd_to_local(cost.usd_per_credit).await;
        let remaining_balance = rates.get_usd_to_local(1.0).await * remaining_balance_usd;

        let panel = StatsPanel {
            remaining_balance: format!("{symbol}{:.1}k", remaining_balance / 1000.0),
            conversation_cost: if usage.turn_count == 0 {
                format!("{symbol}0.00")
            } else {
                format!("{symbol}{conversation_cost:.2}")
            },
            longest_response_time: seconds_label(usage.longest_response_seconds),
            average_response_time: seconds_label(usage.average_response_seconds),
            total_tokens: group_thousands(usage.total_tokens),
        };

        Self {
            usage,
            credits_spent,
            conversation_cost,
            remaining_balance,
            panel,
        }
    }
}

fn seconds_label(value: Option<f64>) -> String {
    match value {
        Some(secs) => format!("{secs:.2} seconds"),
        None => "n/a".to_string(),
    }
}

/// `1234567` -> `1,234,567`
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
