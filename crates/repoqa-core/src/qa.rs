//! Retrieval-augmented question answering over an indexed repository.

use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use repoqa_llm::retry::with_retry;
use repoqa_llm::{LlmError, LlmProvider, Message, RetryPolicy};
use repoqa_memory::{
    ConversationMemory, ConversationTurn, EmbeddingClient, ScoredChunk, SearchMode, VectorIndex,
};
use tokio::sync::Mutex;

use crate::error::QaError;

const SYSTEM_PROMPT: &str = "You are an assistant answering questions about a source code \
repository. Use the retrieved code in <code_context> and the conversation so far to answer. \
Name the files you relied on. If the context does not contain the answer, say that you \
don't know instead of guessing.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QaState {
    Idle,
    AnsweringQuestion,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    /// Chunks retrieved per question.
    pub k: usize,
    pub mode: SearchMode,
    /// Rewrite follow-up questions into standalone ones before retrieval.
    pub condense_question: bool,
    pub fallback_turns: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            k: 8,
            mode: SearchMode::default(),
            condense_question: false,
            fallback_turns: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    /// Retrieved chunks the answer was conditioned on, in retrieval order.
    pub sources: Vec<ScoredChunk>,
}

impl Answer {
    /// Distinct source files, in first-seen order.
    #[must_use]
    pub fn source_files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = Vec::new();
        for hit in &self.sources {
            let source = hit.chunk.source();
            if !files.contains(&source) {
                files.push(source);
            }
        }
        files
    }
}

/// Marks the session busy for as long as it lives.
struct Answering<'a>(&'a AtomicBool);

impl<'a> Answering<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for Answering<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct QaSession<P: LlmProvider> {
    provider: Arc<P>,
    embedder: EmbeddingClient<P>,
    index: Arc<VectorIndex>,
    memory: Mutex<ConversationMemory<P>>,
    options: SessionOptions,
    chat_retry: RetryPolicy,
    answering: AtomicBool,
}

impl<P: LlmProvider> QaSession<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, index: Arc<VectorIndex>, options: SessionOptions) -> Self {
        let chat_retry = RetryPolicy::default();
        Self {
            embedder: EmbeddingClient::new(Arc::clone(&provider), RetryPolicy::default()),
            memory: Mutex::new(
                ConversationMemory::new(Arc::clone(&provider), chat_retry)
                    .with_fallback_turns(options.fallback_turns),
            ),
            provider,
            index,
            options,
            chat_retry,
            answering: AtomicBool::new(false),
        }
    }

    /// Replace the retry policies for chat (answers and summaries) and embedding calls.
    #[must_use]
    pub fn with_retry(mut self, chat: RetryPolicy, embedding: RetryPolicy) -> Self {
        self.chat_retry = chat;
        self.embedder = EmbeddingClient::new(Arc::clone(&self.provider), embedding);
        self.memory = Mutex::new(
            ConversationMemory::new(Arc::clone(&self.provider), chat)
                .with_fallback_turns(self.options.fallback_turns),
        );
        self
    }

    #[must_use]
    pub fn state(&self) -> QaState {
        if self.answering.load(Ordering::SeqCst) {
            QaState::AnsweringQuestion
        } else {
            QaState::Idle
        }
    }

    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    #[must_use]
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Answer `question` from the index and the conversation so far.
    ///
    /// Concurrent calls are served one at a time in arrival order.
    ///
    /// # Errors
    ///
    /// Returns `QaError::Embedding` or `QaError::Index` if retrieval fails and
    /// `QaError::Generation` if the model call fails or returns an empty
    /// answer. Conversation memory is left untouched on error.
    pub async fn ask(&self, question: &str) -> Result<Answer, QaError> {
        let mut memory = self.memory.lock().await;
        let _answering = Answering::enter(&self.answering);

        let context = memory.prompt_context();
        let search_query = if self.options.condense_question && !memory.is_empty() {
            self.condense(&context, question).await
        } else {
            question.to_owned()
        };

        let query_vector = self.embedder.embed(&search_query).await?;
        let sources = self
            .index
            .query(&query_vector, self.options.k, self.options.mode)?;
        tracing::debug!(
            hits = sources.len(),
            top_score = sources.first().map(|s| s.score),
            "retrieved context"
        );

        let messages = build_messages(&context, &sources, question);
        let text = with_retry(&self.chat_retry, "chat", || self.provider.chat(&messages))
            .await
            .map_err(QaError::Generation)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(QaError::Generation(LlmError::EmptyResponse {
                provider: "chat",
            }));
        }
        let text = text.to_owned();

        if let Err(e) = memory.record(question, text.as_str()).await {
            tracing::warn!("conversation summary unavailable, using recent turns: {e}");
        }

        tracing::info!(
            sources = sources.len(),
            turns = memory.turns().len(),
            "question answered"
        );
        Ok(Answer { text, sources })
    }

    /// Rewrite a follow-up into a standalone question; the raw question on failure.
    async fn condense(&self, context: &str, question: &str) -> String {
        let messages = [Message::user(build_condense_prompt(context, question))];
        match with_retry(&self.chat_retry, "condense", || self.provider.chat(&messages)).await {
            Ok(text) if !text.trim().is_empty() => {
                let condensed = text.trim().to_owned();
                tracing::debug!(%condensed, "condensed follow-up question");
                condensed
            }
            Ok(_) => question.to_owned(),
            Err(e) => {
                tracing::warn!("question condensing failed, using raw question: {e}");
                question.to_owned()
            }
        }
    }

    pub async fn history(&self) -> Vec<ConversationTurn> {
        self.memory.lock().await.turns().to_vec()
    }

    pub async fn summary(&self) -> String {
        self.memory.lock().await.get_context().to_owned()
    }

    /// Forget the conversation; the index is kept.
    pub async fn reset(&self) {
        self.memory.lock().await.clear();
    }
}

/// Format retrieved chunks with their source attribution.
#[must_use]
pub fn format_context(sources: &[ScoredChunk]) -> String {
    if sources.is_empty() {
        return String::new();
    }

    let mut out = String::from("<code_context>\n");
    for hit in sources {
        let _ = writeln!(
            out,
            "  <chunk file=\"{}\" index=\"{}\" score=\"{:.2}\">",
            hit.chunk.source(),
            hit.chunk.chunk_index,
            hit.score,
        );
        out.push_str(&hit.chunk.content);
        out.push_str("\n  </chunk>\n");
    }
    out.push_str("</code_context>");
    out
}

fn build_messages(context: &str, sources: &[ScoredChunk], question: &str) -> Vec<Message> {
    let mut prompt = String::new();
    if !context.trim().is_empty() {
        let _ = writeln!(prompt, "<conversation>\n{}\n</conversation>\n", context.trim());
    }
    let code = format_context(sources);
    if code.is_empty() {
        prompt.push_str("<code_context>\n</code_context>\n\n");
    } else {
        prompt.push_str(&code);
        prompt.push_str("\n\n");
    }
    let _ = write!(prompt, "Question: {question}");

    vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)]
}

fn build_condense_prompt(context: &str, question: &str) -> String {
    format!(
        "Given the following conversation and a follow up question, rephrase the follow up \
         question to be a standalone question. Reply with the question only.\n\n\
         Chat History:\n{}\n\nFollow Up Input: {question}\nStandalone question:",
        context.trim()
    )
}
