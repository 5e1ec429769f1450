//! Turn history with an LLM-maintained running summary.

use std::fmt::Write as _;
use std::sync::Arc;

use repoqa_llm::retry::with_retry;
use repoqa_llm::{LlmError, LlmProvider, Message, RetryPolicy};

const DEFAULT_FALLBACK_TURNS: usize = 4;

#[derive(Debug, thiserror::Error)]
#[error("conversation summary failed: {0}")]
pub struct SummaryError(#[from] pub LlmError);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
}

fn build_summary_prompt(turns: &[ConversationTurn]) -> String {
    let mut prompt = String::from(
        "Summarize the following conversation about a code repository concisely. \
         Preserve the questions asked, key facts from the answers, and any names \
         of files, functions or classes that were mentioned. Be brief.\n\n\
         Conversation:\n",
    );

    for turn in turns {
        let _ = writeln!(prompt, "Human: {}", turn.question);
        let _ = writeln!(prompt, "Assistant: {}", turn.answer);
    }

    prompt.push_str("\nSummary:");
    prompt
}

pub struct ConversationMemory<P: LlmProvider> {
    provider: Arc<P>,
    retry: RetryPolicy,
    turns: Vec<ConversationTurn>,
    summary: String,
    summary_stale: bool,
    fallback_turns: usize,
}

impl<P: LlmProvider> ConversationMemory<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, retry: RetryPolicy) -> Self {
        Self {
            provider,
            retry,
            turns: Vec::new(),
            summary: String::new(),
            summary_stale: false,
            fallback_turns: DEFAULT_FALLBACK_TURNS,
        }
    }

    /// Number of raw turns rendered by [`Self::prompt_context`] while the summary is stale.
    #[must_use]
    pub fn with_fallback_turns(mut self, n: usize) -> Self {
        self.fallback_turns = n;
        self
    }

    /// Append a turn and regenerate the summary over the whole history.
    ///
    /// # Errors
    ///
    /// Returns `SummaryError` if the model call fails or returns nothing. The
    /// turn is kept and the previous summary is marked stale.
    pub async fn record(
        &mut self,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) -> Result<(), SummaryError> {
        self.turns.push(ConversationTurn {
            question: question.into(),
            answer: answer.into(),
        });

        let messages = [Message::user(build_summary_prompt(&self.turns))];
        let result = with_retry(&self.retry, "summarize", || {
            self.provider.chat(&messages)
        })
        .await
        .and_then(|text| {
            let text = text.trim();
            if text.is_empty() {
                Err(LlmError::EmptyResponse {
                    provider: "summary",
                })
            } else {
                Ok(text.to_owned())
            }
        });

        match result {
            Ok(summary) => {
                tracing::debug!(
                    turns = self.turns.len(),
                    tokens = crate::estimate_tokens(&summary),
                    "conversation summary updated"
                );
                self.summary = summary;
                self.summary_stale = false;
                Ok(())
            }
            Err(e) => {
                self.summary_stale = true;
                Err(SummaryError(e))
            }
        }
    }

    /// The latest summary; empty before the first successful summarization.
    #[must_use]
    pub fn get_context(&self) -> &str {
        &self.summary
    }

    #[must_use]
    pub fn is_summary_stale(&self) -> bool {
        self.summary_stale
    }

    /// Context to feed the next prompt.
    ///
    /// Returns the summary while it is current. After a failed summarization
    /// the most recent turns are rendered verbatim instead.
    #[must_use]
    pub fn prompt_context(&self) -> String {
        if !self.summary_stale {
            return self.summary.clone();
        }
        let skip = self.turns.len().saturating_sub(self.fallback_turns);
        let mut out = String::new();
        for turn in &self.turns[skip..] {
            let _ = writeln!(out, "Human: {}", turn.question);
            let _ = writeln!(out, "Assistant: {}", turn.answer);
        }
        out
    }

    #[must_use]
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.summary.clear();
        self.summary_stale = false;
    }
}
