use crate::{
    embedder::EmbeddingProvider,
    error::{Error, Result},
    index::{QueryMatch, QueryRequest, VectorIndex},
    llm::LanguageModel,
};

pub const DEFAULT_TOP_K: usize = 5;

/// Upper bounds on what is fed to the language model. Unset means no limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContextBudget {
    pub max_passages: Option<usize>,
    pub max_chars: Option<usize>,
}

impl ContextBudget {
    pub fn unbounded() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnswerOutcome {
    Answered {
        answer: String,
        /// The matches the answer was grounded in, most similar first.
        matches: Vec<QueryMatch>,
    },
    /// The index returned nothing, so the model was never asked.
    NoMatches,
}

fn passage(m: &QueryMatch) -> &str {
    m.metadata.as_ref().map_or("", |meta| meta.text.as_str())
}

/// Join match texts with single spaces, in the order given.
///
/// Matches past the budget are dropped from the end of the list, but the
/// first match is always kept even if it alone exceeds `max_chars`.
///
/// # Examples
///
/// ```
/// use docrag::answer::{assemble_context, ContextBudget};
/// use docrag::index::{QueryMatch, RecordMetadata};
///
/// let hit = |text: &str| QueryMatch {
///     id: text.into(),
///     score: 1.0,
///     values: Vec::new(),
///     metadata: Some(RecordMetadata {
///         text: text.into(),
///         ..Default::default()
///     }),
/// };
/// let matches = vec![hit("alpha"), hit("beta"), hit("gamma")];
///
/// let everything = ContextBudget::unbounded();
/// assert_eq!(assemble_context(&matches, &everything), "alpha beta gamma");
///
/// let budget = ContextBudget { max_passages: Some(2), max_chars: None };
/// assert_eq!(assemble_context(&matches, &budget), "alpha beta");
/// ```
pub fn assemble_context(
    matches: &[QueryMatch],
    budget: &ContextBudget,
) -> String {
    let limit = budget.max_passages.unwrap_or(usize::MAX);
    let mut context = String::new();
    let mut used_chars = 0;

    for (i, m) in matches.iter().take(limit).enumerate() {
        let text = passage(m);
        let added = text.chars().count() + usize::from(i > 0);
        if i > 0
            && let Some(max_chars) = budget.max_chars
            && used_chars + added > max_chars
        {
            tracing::debug!(
                kept = i,
                dropped = matches.len().min(limit) - i,
                "context budget reached"
            );
            break;
        }
        if i > 0 {
            context.push(' ');
        }
        context.push_str(text);
        used_chars += added;
    }
    context
}

/// Answer `question` from the `top_k` passages most similar to it.
pub async fn answer<E, V, L>(
    question: &str,
    top_k: usize,
    embedder: &E,
    index: &V,
    index_name: &str,
    llm: &L,
    budget: &ContextBudget,
) -> Result<AnswerOutcome>
where
    E: EmbeddingProvider,
    V: VectorIndex,
    L: LanguageModel,
{
    let vector = embedder.embed_one(question).await?;

    let request = QueryRequest {
        vector,
        top_k,
        include_values: true,
        include_metadata: true,
    };
    let matches = index
        .query(index_name, &request)
        .await
        .map_err(|e| Error::Query(e.to_string()))?;

    tracing::info!(matches = matches.len(), "query returned");
    let Some(top) = matches.first() else {
        tracing::info!("no matches found, skipping completion");
        return Ok(AnswerOutcome::NoMatches);
    };
    tracing::debug!(
        id = %top.id,
        score = top.score,
        source = top.metadata.as_ref().map_or("", |m| m.source.as_str()),
        "top match"
    );

    let context = assemble_context(&matches, budget);
    tracing::debug!(chars = context.chars().count(), "assembled context");

    let answer = llm.complete(&context, question).await?;
    Ok(AnswerOutcome::Answered { answer, matches })
}
