//! The think-act-observe agent loop.
//!
//! A question enters [`answer_question`], which checks the answer cache
//! and then cycles: send the transcript to the model, parse its reply as
//! either a final answer or a tool directive, run the tool, truncate the
//! result, and feed it back as an observation. The loop ends when the
//! model emits the terminal marker or the step budget runs out; either
//! way the answer is cached before returning.
//!
//! Tool failures become observation strings and the loop continues.
//! Model-call failures end the flow immediately with a user-visible
//! error string; they are not retried and not cached.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use std::sync::{Arc, RwLock};

use crate::cache::{normalize_question, AnswerCache};
use crate::config::Config;
use crate::graph::DependencyGraph;
use crate::llm::{LlmClient, OBSERVATION_MARKER};
use crate::models::ChatMessage;
use crate::rerank::Reranker;
use crate::retrieval;
use crate::truncate::truncate_middle;

/// Marker the model emits to end the session; everything after it is the
/// answer.
pub const FINAL_ANSWER_MARKER: &str = "Final Answer:";

/// Tool names the dispatcher accepts. Must stay in sync with the system
/// prompt below.
pub const TOOL_NAMES: [&str; 4] = ["search", "read", "get_dependencies", "get_dependents"];

const SYSTEM_PROMPT: &str = r#"You are a precise assistant that answers questions about one ingested code repository.

PRINCIPLES:
1. Answer only from evidence gathered with your tools. Never guess.
2. If the evidence is insufficient, say exactly what is missing.
3. Cite file paths in your answer when relevant (e.g. "In `backend/main.py`, ...").
4. Be concise and direct.

On each turn, either take exactly one action or finish.

To take an action, reply with a single line of the form:
  tool: argument

Available tools:
  search: <query>            - semantic search over the indexed source code
  read: <relative path>      - read a file from the repository
  get_dependencies: <path>   - list what a file imports
  get_dependents: <path>     - list what imports a file

After each action you will receive a line starting with "Observation:".

To finish, reply with:
  Final Answer: <your answer>
"#;

/// Everything the agent loop needs, passed explicitly so tests can swap
/// in fakes. Shared across concurrent flows.
pub struct AgentContext {
    pub config: Config,
    pub pool: SqlitePool,
    pub graph: Arc<RwLock<DependencyGraph>>,
    pub cache: Arc<AnswerCache>,
    pub llm: Arc<dyn LlmClient>,
    pub reranker: Arc<dyn Reranker>,
}

/// Outcome of parsing one model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// The model finished; the payload is the answer text.
    FinalAnswer(String),
    /// The model requested a tool call.
    Action { tool: String, argument: String },
    /// The reply matched neither form.
    Unparseable,
}

/// Parse a model reply into a [`Directive`].
///
/// Grammar for actions: a bare identifier, a colon, then free text to the
/// end of the line. Surrounding quotes or brackets on the argument are
/// stripped. The first line that parses wins; the terminal marker takes
/// precedence wherever it appears.
pub fn parse_directive(response: &str) -> Directive {
    if let Some(idx) = response.find(FINAL_ANSWER_MARKER) {
        let answer = response[idx + FINAL_ANSWER_MARKER.len()..].trim();
        return Directive::FinalAnswer(answer.to_string());
    }

    for line in response.lines() {
        let line = line.trim();
        let Some((head, tail)) = line.split_once(':') else {
            continue;
        };
        let tool = head.trim();
        if tool.is_empty()
            || !tool
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            continue;
        }
        let argument = strip_wrapping(tail.trim());
        if argument.is_empty() {
            continue;
        }
        return Directive::Action {
            tool: tool.to_string(),
            argument,
        };
    }

    Directive::Unparseable
}

fn strip_wrapping(arg: &str) -> String {
    let mut s = arg.trim();
    loop {
        let stripped = s
            .strip_prefix('"')
            .and_then(|r| r.strip_suffix('"'))
            .or_else(|| s.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')))
            .or_else(|| s.strip_prefix('`').and_then(|r| r.strip_suffix('`')))
            .or_else(|| s.strip_prefix('[').and_then(|r| r.strip_suffix(']')))
            .or_else(|| s.strip_prefix('(').and_then(|r| r.strip_suffix(')')));
        match stripped {
            Some(inner) if !inner.is_empty() => s = inner.trim(),
            _ => break,
        }
    }
    s.to_string()
}

/// Answer a question about the ingested repository.
///
/// Returns the answer text. A cache hit returns immediately with zero
/// model calls; otherwise the loop runs until a final answer or the step
/// budget is exhausted, and the result is cached best-effort.
pub async fn answer_question(ctx: &AgentContext, question: &str) -> Result<String> {
    let key = normalize_question(question);
    if key.is_empty() {
        return Ok("Please provide a question.".to_string());
    }

    if let Some(answer) = ctx.cache.get(&key) {
        return Ok(answer);
    }

    let mut transcript = vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(question.trim()),
    ];

    let agent_cfg = &ctx.config.agent;
    let mut last_reply = String::new();

    for _step in 0..agent_cfg.max_steps {
        let reply = match ctx.llm.complete(&transcript).await {
            Ok(reply) => reply,
            Err(e) => return Ok(format!("Error calling the language model: {}", e)),
        };
        transcript.push(ChatMessage::assistant(reply.clone()));
        last_reply = reply.clone();

        match parse_directive(&reply) {
            Directive::FinalAnswer(answer) => {
                ctx.cache.put(&key, &answer);
                return Ok(answer);
            }
            Directive::Action { tool, argument } => {
                let observation = dispatch_tool(ctx, &tool, &argument).await;
                push_observation(&mut transcript, agent_cfg.observation_max_chars, &observation);
            }
            Directive::Unparseable => {
                push_observation(
                    &mut transcript,
                    agent_cfg.observation_max_chars,
                    "Could not parse your reply. Take one action as `tool: argument` \
                     or finish with `Final Answer: ...`.",
                );
            }
        }

        compact_transcript(
            &mut transcript,
            agent_cfg.compact_after_turns,
            agent_cfg.keep_recent_turns,
        );
    }

    // Budget exhausted: best-effort answer from the last model output.
    let answer = best_effort_answer(&last_reply);
    ctx.cache.put(&key, &answer);
    Ok(answer)
}

/// Run one tool call. Failures surface as observation text, never errors.
async fn dispatch_tool(ctx: &AgentContext, tool: &str, argument: &str) -> String {
    match tool {
        "search" => {
            match retrieval::build_context(
                &ctx.pool,
                &ctx.config.embedding,
                &ctx.config.retrieval,
                ctx.reranker.as_ref(),
                argument,
            )
            .await
            {
                Ok(context) => context,
                Err(e) => format!("Search failed: {}", e),
            }
        }
        "read" => match read_repo_file(ctx, argument).await {
            Ok(Some(content)) => content,
            Ok(None) => format!("File not found: {}", argument),
            Err(e) => format!("Could not read {}: {}", argument, e),
        },
        "get_dependencies" => match ctx.graph.read() {
            Ok(graph) => {
                let deps = graph.get_dependencies(argument);
                if deps.is_empty() {
                    format!("No dependencies recorded for {}", argument)
                } else {
                    deps.into_iter().collect::<Vec<_>>().join(", ")
                }
            }
            Err(_) => "Dependency graph is unavailable.".to_string(),
        },
        "get_dependents" => match ctx.graph.read() {
            Ok(graph) => {
                let dependents = graph.get_dependents(argument);
                if dependents.is_empty() {
                    format!("No dependents recorded for {}", argument)
                } else {
                    dependents.into_iter().collect::<Vec<_>>().join(", ")
                }
            }
            Err(_) => "Dependency graph is unavailable.".to_string(),
        },
        unknown => format!(
            "Unknown tool `{}`. Valid tools: {}.",
            unknown,
            TOOL_NAMES.join(", ")
        ),
    }
}

/// Locate a repository file by relative-path suffix and return its
/// (truncated) content.
///
/// Exact relative-path matches win; otherwise the lexicographically first
/// path ending in the requested suffix is used. This tie-break is
/// deterministic but cannot distinguish duplicate suffixes — qualify the
/// path further if the wrong file comes back.
async fn read_repo_file(ctx: &AgentContext, path: &str) -> Result<Option<String>> {
    let wanted = path.trim_start_matches('/');

    let exact = sqlx::query("SELECT rel_path, abs_path FROM files WHERE rel_path = ?")
        .bind(wanted)
        .fetch_optional(&ctx.pool)
        .await?;

    // Suffix matching happens in Rust: it is exact and case-sensitive,
    // and the model's argument is never interpreted as a pattern.
    let row = match exact {
        Some(row) => Some(row),
        None => {
            let suffix = format!("/{}", wanted);
            sqlx::query("SELECT rel_path, abs_path FROM files ORDER BY rel_path")
                .fetch_all(&ctx.pool)
                .await?
                .into_iter()
                .find(|row| row.get::<String, _>("rel_path").ends_with(&suffix))
        }
    };

    let Some(row) = row else {
        return Ok(None);
    };

    let rel_path: String = row.get("rel_path");
    let abs_path: String = row.get("abs_path");
    let content = std::fs::read_to_string(&abs_path)?;
    let truncated = truncate_middle(&content, ctx.config.retrieval.max_chunk_chars * 4);
    Ok(Some(format!("[{}]\n{}", rel_path, truncated)))
}

fn push_observation(transcript: &mut Vec<ChatMessage>, max_chars: usize, observation: &str) {
    let truncated = truncate_middle(observation, max_chars);
    transcript.push(ChatMessage::user(format!(
        "{} {}",
        OBSERVATION_MARKER, truncated
    )));
}

/// Sliding-window transcript compaction.
///
/// Once the transcript exceeds `compact_after` turns, only the initial
/// system instruction and the `keep_recent` most recent turns survive.
/// Intentionally lossy; dropped turns are gone.
fn compact_transcript(transcript: &mut Vec<ChatMessage>, compact_after: usize, keep_recent: usize) {
    if transcript.len() <= compact_after || transcript.len() <= keep_recent + 1 {
        return;
    }
    let tail_start = transcript.len() - keep_recent;
    let mut compacted = Vec::with_capacity(keep_recent + 1);
    compacted.push(transcript[0].clone());
    compacted.extend_from_slice(&transcript[tail_start..]);
    *transcript = compacted;
}

fn best_effort_answer(last_reply: &str) -> String {
    let trimmed = last_reply.trim();
    if trimmed.is_empty() {
        "I ran out of reasoning steps before finding an answer.".to_string()
    } else {
        format!(
            "I ran out of reasoning steps. Based on what I gathered so far: {}",
            trimmed
        )
    }
}
