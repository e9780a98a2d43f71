//! Turn history with lossy compression.
//!
//! A session keeps every turn it ever had, but only the recent ones stay
//! verbatim. Once the count crosses the configured threshold the oldest
//! turns are folded into a narrative summary by the summarization
//! collaborator and their text is blanked. Anything that must survive
//! compression exactly (counts, dates, amounts) belongs in the session's
//! constraints map, not in prose.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use cs_collab::{SummaryRequest, Summarizer};
use cs_domain::config::HistoryConfig;
use cs_domain::trace::TraceEvent;

use crate::state::Turn;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn history
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnHistory {
    turns: Vec<Turn>,
    /// Narrative covering every compressed turn. Replaced wholesale on
    /// each compression; the request carries the prior version so the
    /// summarizer can extend it.
    #[serde(default)]
    summary: String,
}

/// What a compression pass did. A skipped cycle is an outcome, not an
/// error; the next turn simply tries again.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompressReport {
    pub ran: bool,
    pub folded_turns: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

impl TurnHistory {
    /// Append a turn. Always succeeds.
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// Turns still carrying verbatim text.
    pub fn active_turn_count(&self) -> usize {
        self.turns.iter().filter(|t| !t.compressed).count()
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    fn should_compress(&self, cfg: &HistoryConfig) -> bool {
        cfg.auto && self.active_turn_count() > cfg.compress_after_turns
    }

    /// Indexes of the uncompressed turns to fold, oldest first, leaving
    /// the newest `keep_recent` untouched.
    fn fold_candidates(&self, keep_recent: usize) -> Vec<usize> {
        let uncompressed: Vec<usize> = self
            .turns
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.compressed)
            .map(|(i, _)| i)
            .collect();
        if uncompressed.len() <= keep_recent {
            return Vec::new();
        }
        uncompressed[..uncompressed.len() - keep_recent].to_vec()
    }

    /// Fold old turns into the summary when the threshold is crossed.
    ///
    /// Summarizer failure skips the cycle with a warning; the verbatim
    /// turns stay and a later turn retries. Below threshold this is a
    /// no-op, so calling it every turn is safe.
    pub async fn compress_if_needed(
        &mut self,
        session_id: &str,
        summarizer: &dyn Summarizer,
        cfg: &HistoryConfig,
    ) -> CompressReport {
        if !self.should_compress(cfg) {
            return CompressReport::default();
        }
        let candidates = self.fold_candidates(cfg.keep_recent);
        if candidates.is_empty() {
            return CompressReport::default();
        }

        let chunk: Vec<&Turn> = candidates.iter().map(|&i| &self.turns[i]).collect();
        let text = transcript_text(&chunk, cfg.summary_input_max_chars);
        let req = SummaryRequest {
            session_id: session_id.to_owned(),
            text,
            prior_summary: if self.summary.is_empty() {
                None
            } else {
                Some(self.summary.clone())
            },
        };

        let start = Instant::now();
        match summarizer.summarize(req).await {
            Ok(new_summary) => {
                self.summary = new_summary;
                for &i in &candidates {
                    let turn = &mut self.turns[i];
                    turn.user_text = String::new();
                    turn.assistant_text = String::new();
                    turn.step_results.clear();
                    turn.compressed = true;
                }
                TraceEvent::HistoryCompressed {
                    session_id: session_id.to_owned(),
                    folded_turns: candidates.len(),
                    summary_chars: self.summary.len(),
                    duration_ms: start.elapsed().as_millis() as u64,
                }
                .emit();
                CompressReport {
                    ran: true,
                    folded_turns: candidates.len(),
                    skipped: None,
                }
            }
            Err(e) => {
                tracing::warn!(
                    session_id,
                    error = %e,
                    "summarizer unavailable; keeping verbatim history this cycle"
                );
                TraceEvent::HistoryCompressionSkipped {
                    session_id: session_id.to_owned(),
                    reason: e.to_string(),
                }
                .emit();
                CompressReport {
                    ran: false,
                    folded_turns: 0,
                    skipped: Some(e.to_string()),
                }
            }
        }
    }

    /// Render the history for the reasoning collaborator: the summary
    /// block, then the newest `full_detail_turns` verbatim.
    pub fn format_for_reasoning(&self, full_detail_turns: usize) -> String {
        let mut out = String::new();
        if !self.summary.is_empty() {
            out.push_str("## Conversation summary\n\n");
            out.push_str(&self.summary);
            out.push_str("\n\n");
        }

        let recent: Vec<&Turn> = self
            .turns
            .iter()
            .filter(|t| !t.compressed)
            .collect();
        let start = recent.len().saturating_sub(full_detail_turns);
        if start < recent.len() {
            out.push_str("## Recent turns\n\n");
            for turn in &recent[start..] {
                out.push_str(&format!(
                    "Turn {}\nUser: {}\nAssistant: {}\n\n",
                    turn.index, turn.user_text, turn.assistant_text
                ));
            }
        }
        out
    }
}

/// Flatten turns into summarizer input, truncating oversized texts and
/// capping the whole chunk.
fn transcript_text(turns: &[&Turn], max_chars: usize) -> String {
    let mut buf = String::new();
    for turn in turns {
        push_clipped(&mut buf, &format!("User: {}", turn.user_text));
        push_clipped(&mut buf, &format!("Assistant: {}", turn.assistant_text));
        if buf.len() >= max_chars {
            let end = boundary_floor(&buf, max_chars);
            buf.truncate(end);
            break;
        }
    }
    buf
}

fn push_clipped(buf: &mut String, text: &str) {
    if text.len() > 2000 {
        buf.push_str(&text[..boundary_floor(text, 1000)]);
        buf.push_str(" [...] ");
        let mut start = text.len() - 500;
        while !text.is_char_boundary(start) {
            start += 1;
        }
        buf.push_str(&text[start..]);
    } else {
        buf.push_str(text);
    }
    buf.push('\n');
}

/// Largest index `<= max` that is a char boundary of `s`.
fn boundary_floor(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cs_collab::DecisionKind;
    use cs_domain::error::{Error, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSummarizer {
        calls: AtomicUsize,
    }

    impl FixedSummarizer {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Summarizer for FixedSummarizer {
        async fn summarize(&self, req: SummaryRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let prior = req.prior_summary.unwrap_or_default();
            Ok(format!("{prior}[folded chunk]"))
        }
    }

    struct DownSummarizer;

    #[async_trait]
    impl Summarizer for DownSummarizer {
        async fn summarize(&self, _req: SummaryRequest) -> Result<String> {
            Err(Error::SummarizerUnavailable("connection refused".into()))
        }
    }

    fn history_with_turns(n: usize) -> TurnHistory {
        let mut h = TurnHistory::default();
        for i in 1..=n {
            h.append(Turn::new(
                i as u32,
                format!("question {i}"),
                format!("answer {i}"),
                DecisionKind::Execute,
            ));
        }
        h
    }

    fn cfg(threshold: usize, keep: usize) -> HistoryConfig {
        HistoryConfig {
            auto: true,
            compress_after_turns: threshold,
            keep_recent: keep,
            summary_input_max_chars: 24_000,
        }
    }

    #[tokio::test]
    async fn below_threshold_is_a_no_op() {
        let mut h = history_with_turns(5);
        let s = FixedSummarizer::new();
        let report = h.compress_if_needed("s1", &s, &cfg(10, 2)).await;
        assert!(!report.ran);
        assert_eq!(s.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.active_turn_count(), 5);
    }

    #[tokio::test]
    async fn compression_folds_all_but_recent() {
        let mut h = history_with_turns(12);
        let s = FixedSummarizer::new();
        let report = h.compress_if_needed("s1", &s, &cfg(10, 4)).await;
        assert!(report.ran);
        assert_eq!(report.folded_turns, 8);
        assert_eq!(h.active_turn_count(), 4);
        assert_eq!(h.turn_count(), 12);
        assert_eq!(h.summary(), "[folded chunk]");
        // Folded turns lose their text but keep their index.
        assert!(h.turns()[0].compressed);
        assert!(h.turns()[0].user_text.is_empty());
        assert_eq!(h.turns()[0].index, 1);
    }

    #[tokio::test]
    async fn rerun_below_threshold_after_compression_is_a_no_op() {
        let mut h = history_with_turns(12);
        let s = FixedSummarizer::new();
        h.compress_if_needed("s1", &s, &cfg(10, 4)).await;
        let report = h.compress_if_needed("s1", &s, &cfg(10, 4)).await;
        assert!(!report.ran);
        assert_eq!(s.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.summary(), "[folded chunk]");
    }

    #[tokio::test]
    async fn summarizer_failure_skips_without_losing_turns() {
        let mut h = history_with_turns(12);
        let report = h.compress_if_needed("s1", &DownSummarizer, &cfg(10, 4)).await;
        assert!(!report.ran);
        assert!(report.skipped.is_some());
        assert_eq!(h.active_turn_count(), 12);
        assert!(h.summary().is_empty());

        // Service back up: the next cycle succeeds.
        let s = FixedSummarizer::new();
        let report = h.compress_if_needed("s1", &s, &cfg(10, 4)).await;
        assert!(report.ran);
        assert_eq!(h.active_turn_count(), 4);
    }

    #[tokio::test]
    async fn second_compression_extends_the_summary() {
        let mut h = history_with_turns(12);
        let s = FixedSummarizer::new();
        h.compress_if_needed("s1", &s, &cfg(10, 4)).await;
        for i in 13..=22 {
            h.append(Turn::new(
                i,
                format!("question {i}"),
                format!("answer {i}"),
                DecisionKind::Execute,
            ));
        }
        let report = h.compress_if_needed("s1", &s, &cfg(10, 4)).await;
        assert!(report.ran);
        assert_eq!(h.summary(), "[folded chunk][folded chunk]");
    }

    #[test]
    fn format_for_reasoning_has_summary_then_recent() {
        let mut h = history_with_turns(3);
        h.summary = "earlier: planned a dinner party".into();
        let text = h.format_for_reasoning(2);
        assert!(text.starts_with("## Conversation summary"));
        assert!(text.contains("earlier: planned a dinner party"));
        assert!(text.contains("Turn 2"));
        assert!(text.contains("Turn 3"));
        assert!(!text.contains("Turn 1\n"));
    }

    #[test]
    fn format_for_reasoning_without_summary_skips_the_block() {
        let h = history_with_turns(2);
        let text = h.format_for_reasoning(5);
        assert!(!text.contains("## Conversation summary"));
        assert!(text.contains("Turn 1"));
    }

    #[test]
    fn oversized_turn_text_is_clipped_for_the_summarizer() {
        let long = "x".repeat(5000);
        let turn = Turn::new(1, long, "short", DecisionKind::Execute);
        let turns = vec![&turn];
        let text = transcript_text(&turns, 24_000);
        assert!(text.len() < 2000);
        assert!(text.contains(" [...] "));
    }

    #[test]
    fn clipping_lands_on_char_boundaries() {
        // 3-byte chars put the clip offsets mid-char.
        let long = "€".repeat(3000);
        let turn = Turn::new(1, long, "short", DecisionKind::Execute);
        let turns = vec![&turn];
        let text = transcript_text(&turns, 24_000);
        assert!(text.contains(" [...] "));
    }
}
