//! Question answering and summaries over an ingestion run.
//!
//! [`ask`] and [`summarize`] ingest, keep only readable documents as
//! `(title, text)` chunks and hand them to an [`Answerer`]. Placeholders are
//! filtered here; the extractor never filters its own output.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::config::Config;
use crate::error::IngestResult;
use crate::ingest::{self, Ingestor, ProviderSelection};
use crate::models::{ExtractedDocument, Provider};

/// Sources listed in an outcome, at most.
pub const MAX_SOURCES: usize = 10;
/// Documents handed to a summary, at most.
pub const MAX_SUMMARY_DOCS: usize = 10;

/// Turns document chunks into prose.
#[async_trait]
pub trait Answerer: Send + Sync {
    async fn answer(&self, question: &str, chunks: &[(String, String)]) -> Result<String>;

    /// Overview of `chunks`, already capped at [`MAX_SUMMARY_DOCS`].
    async fn summarize(&self, chunks: &[(String, String)]) -> Result<String>;
}

/// Which documents a run covers.
#[derive(Debug, Clone)]
pub struct Scope {
    pub user: String,
    pub selection: ProviderSelection,
    pub locator: Option<String>,
    pub max_per_provider: usize,
}

#[derive(Debug, Clone)]
pub struct AskRequest {
    pub question: String,
    pub scope: Scope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub provider: Provider,
    pub title: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskOutcome {
    pub ok: bool,
    pub answer: String,
    pub sources: Vec<Source>,
    pub doc_count: usize,
    pub readable_count: usize,
}

impl AskOutcome {
    fn failed(answer: &str) -> Self {
        Self {
            ok: false,
            answer: answer.to_string(),
            sources: Vec::new(),
            doc_count: 0,
            readable_count: 0,
        }
    }
}

/// `(title, text)` pairs for documents that carry real text.
pub fn readable_chunks(docs: &[ExtractedDocument]) -> Vec<(String, String)> {
    docs.iter()
        .filter_map(|d| {
            d.content
                .as_text()
                .filter(|t| !t.is_empty())
                .map(|t| (d.doc.title.clone(), t.to_string()))
        })
        .collect()
}

/// Readable material of one run, or the outcome to report when there is
/// nothing for the answerer to work on.
struct Gathered {
    sources: Vec<Source>,
    doc_count: usize,
    chunks: Vec<(String, String)>,
}

async fn gather(
    ingestor: &Ingestor,
    scope: &Scope,
) -> IngestResult<Result<Gathered, AskOutcome>> {
    let report = ingestor
        .ingest(
            &scope.user,
            &scope.selection,
            scope.locator.as_deref(),
            scope.max_per_provider,
        )
        .await?;

    if report.outcomes.is_empty() {
        return Ok(Err(AskOutcome::failed("no connected providers")));
    }
    if report.documents.is_empty() {
        return Ok(Err(AskOutcome::failed("no documents found")));
    }

    let sources: Vec<Source> = report
        .documents
        .iter()
        .take(MAX_SOURCES)
        .map(|d| Source {
            provider: d.provider,
            title: d.doc.title.clone(),
            id: d.doc.id.clone(),
        })
        .collect();
    let doc_count = report.documents.len();
    let chunks = readable_chunks(&report.documents);

    if chunks.is_empty() {
        return Ok(Err(AskOutcome {
            ok: true,
            answer: format!("found {} documents but none could be read", doc_count),
            sources,
            doc_count,
            readable_count: 0,
        }));
    }
    Ok(Ok(Gathered {
        sources,
        doc_count,
        chunks,
    }))
}

/// Answer `request.question` from the readable documents in scope.
pub async fn ask(
    ingestor: &Ingestor,
    answerer: &dyn Answerer,
    request: &AskRequest,
) -> IngestResult<AskOutcome> {
    let g = match gather(ingestor, &request.scope).await? {
        Ok(g) => g,
        Err(outcome) => return Ok(outcome),
    };

    let answer = match answerer.answer(&request.question, &g.chunks).await {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(error = %e, "answerer failed");
            format!("answer generation failed: {}", e)
        }
    };

    Ok(AskOutcome {
        ok: true,
        answer,
        sources: g.sources,
        doc_count: g.doc_count,
        readable_count: g.chunks.len(),
    })
}

/// Summarize the readable documents in scope. `readable_count` reports every
/// readable document, even past the [`MAX_SUMMARY_DOCS`] handed on.
pub async fn summarize(
    ingestor: &Ingestor,
    answerer: &dyn Answerer,
    scope: &Scope,
) -> IngestResult<AskOutcome> {
    let g = match gather(ingestor, scope).await? {
        Ok(g) => g,
        Err(outcome) => return Ok(outcome),
    };

    let head = &g.chunks[..g.chunks.len().min(MAX_SUMMARY_DOCS)];
    let summary = match answerer.summarize(head).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "summarizer failed");
            format!("summary generation failed: {}", e)
        }
    };

    Ok(AskOutcome {
        ok: true,
        answer: summary,
        sources: g.sources,
        doc_count: g.doc_count,
        readable_count: g.chunks.len(),
    })
}

// ============ Offline answerer ============

/// Answers by quoting the chunks that share the most words with the
/// question. Needs no model.
pub struct ExcerptAnswerer {
    pub top_k: usize,
    pub excerpt_chars: usize,
}

impl Default for ExcerptAnswerer {
    fn default() -> Self {
        Self {
            top_k: 3,
            excerpt_chars: 240,
        }
    }
}

fn terms(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl Answerer for ExcerptAnswerer {
    async fn answer(&self, question: &str, chunks: &[(String, String)]) -> Result<String> {
        let wanted = terms(question);
        let mut scored: Vec<(usize, usize)> = chunks
            .iter()
            .enumerate()
            .map(|(i, (title, text))| {
                let have = terms(&format!("{} {}", title, text));
                (wanted.iter().filter(|w| have.contains(w)).count(), i)
            })
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        if scored.is_empty() {
            return Ok("The connected documents do not mention this.".to_string());
        }

        let lines: Vec<String> = scored
            .iter()
            .take(self.top_k.max(1))
            .map(|&(_, i)| {
                let (title, text) = &chunks[i];
                let (excerpt, _) = crate::extract::truncate_chars(text, self.excerpt_chars);
                format!("- {}: {}", title, excerpt)
            })
            .collect();
        Ok(lines.join("\n"))
    }

    async fn summarize(&self, chunks: &[(String, String)]) -> Result<String> {
        let mut out = format!("{} readable documents:", chunks.len());
        for (title, text) in chunks {
            let (excerpt, _) = crate::extract::truncate_chars(text, self.excerpt_chars);
            out.push_str(&format!("\n- {}: {}", title, excerpt));
        }
        Ok(out)
    }
}

/// `dh ask`: ingest and answer with the offline [`ExcerptAnswerer`].
pub async fn run_ask(config: &Config, request: &AskRequest, json: bool) -> anyhow::Result<()> {
    let (store, ingestor) = ingest::open_pipeline(config).await?;
    let outcome = ask(&ingestor, &ExcerptAnswerer::default(), request).await?;
    print_outcome(&outcome, json)?;
    store.close().await;
    Ok(())
}

/// `dh summarize`: ingest and summarize with the offline [`ExcerptAnswerer`].
pub async fn run_summarize(config: &Config, scope: &Scope, json: bool) -> anyhow::Result<()> {
    let (store, ingestor) = ingest::open_pipeline(config).await?;
    let outcome = summarize(&ingestor, &ExcerptAnswerer::default(), scope).await?;
    print_outcome(&outcome, json)?;
    store.close().await;
    Ok(())
}

fn print_outcome(outcome: &AskOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome.answer);
        if !outcome.sources.is_empty() {
            println!();
            println!(
                "Sources ({} of {} documents readable):",
                outcome.readable_count, outcome.doc_count
            );
            for s in &outcome.sources {
                println!("  [{}] {}", s.provider, s.title);
            }
        }
    }
    Ok(())
}
