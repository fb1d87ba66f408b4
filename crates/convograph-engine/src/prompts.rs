//! Prompt text for the assistant, research, and memory flows.
//!
//! Prompts are plain functions of their inputs so flows and tests can render
//! them without a model.

use chrono::{Local, Utc};

use crate::types::{MemoryAccessRecord, Message, PageAnalysis, Role};

/// Today's date as "Month Day, Year".
pub fn current_date() -> String {
    Local::now().format("%B %d, %Y").to_string()
}

/// The research topic for a conversation.
///
/// A single message is used as-is; longer histories are rendered as a
/// `User:` / `Assistant:` transcript. System and tool messages are skipped.
pub fn research_topic(messages: &[Message]) -> String {
    if let [only] = messages {
        return only.content.clone();
    }
    let mut topic = String::new();
    for message in messages {
        let speaker = match message.role {
            Role::Human => "User",
            Role::Assistant => "Assistant",
            Role::System | Role::Tool => continue,
        };
        topic.push_str(speaker);
        topic.push_str(": ");
        topic.push_str(&message.content);
        topic.push('\n');
    }
    topic
}

/// Renders the memory access registry one operation per line.
pub fn render_registry(registry: &[MemoryAccessRecord]) -> String {
    if registry.is_empty() {
        return "(no memory operations yet)".to_string();
    }
    registry
        .iter()
        .map(|record| format!("- {}", record.describe()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_knowledge(results: &[String]) -> String {
    if results.is_empty() {
        return "(none collected yet)".to_string();
    }
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[{}] {}", i + 1, r))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_pages(analyses: &[PageAnalysis]) -> String {
    let relevant: Vec<String> = analyses
        .iter()
        .filter(|a| a.is_relevant())
        .map(|a| format!("Source: {}\nQuery: {}\n{}", a.url, a.query, a.analysis))
        .collect();
    if relevant.is_empty() {
        return "(no relevant pages found)".to_string();
    }
    relevant.join("\n\n---\n\n")
}

// ---------------------------------------------------------------------------
// Assistant
// ---------------------------------------------------------------------------

/// Inputs of the query-processing prompt.
pub struct ProcessQueryPrompt<'a> {
    pub assistant_name: &'a str,
    pub date: &'a str,
    pub user: &'a str,
    pub iteration: u32,
    pub max_iterations: u32,
    pub previous_summary: &'a str,
    pub knowledge: &'a [String],
    pub registry: &'a [MemoryAccessRecord],
}

pub fn process_query(p: &ProcessQueryPrompt<'_>) -> String {
    let user = if p.user.is_empty() { "unknown" } else { p.user };
    format!(
        "You are {name}, a conversational assistant. Today is {date}.\n\
         \n\
         Decide how to handle the latest user message. This is processing pass \
         {iteration} of at most {max}.\n\
         \n\
         Answer directly when you can. Request a web search when the message \
         needs current or public information you do not have. Request long-term \
         memory access when the user refers to earlier conversations, personal \
         facts, events, or preferences, or shares something worth remembering. \
         Memory access needs the user's name: set `user` to the name in \
         lowercase if it is known from the conversation, otherwise leave it \
         empty. Do not request knowledge that was already collected below.\n\
         \n\
         Known user: {user}\n\
         \n\
         Summary of previous passes:\n{summary}\n\
         \n\
         Collected knowledge:\n{knowledge}\n\
         \n\
         Memory operations so far:\n{registry}\n\
         \n\
         Reply with a JSON object matching the requested schema.",
        name = p.assistant_name,
        date = p.date,
        iteration = p.iteration,
        max = p.max_iterations,
        user = user,
        summary = if p.previous_summary.is_empty() {
            "(first pass)"
        } else {
            p.previous_summary
        },
        knowledge = render_knowledge(p.knowledge),
        registry = render_registry(p.registry),
    )
}

/// System prompt of the final answer.
pub fn final_answer(
    assistant_name: &str,
    date: &str,
    summary: &str,
    draft: &str,
    knowledge: &[String],
) -> String {
    let mut prompt = format!(
        "You are {assistant_name}, a helpful assistant. Today is {date}.\n\
         Reply in the language of the last user message, or in English if unsure. \
         Keep answers short unless the user asked for detail. Use the available \
         tools when they help; never invent facts. For questions about upcoming \
         events, compare against today's date and never report an event that \
         already happened.\n"
    );
    if !summary.is_empty() {
        prompt.push_str(&format!("\nWhat is known about the request:\n{summary}\n"));
    }
    if !draft.is_empty() {
        prompt.push_str(&format!("\nDraft answer:\n{draft}\n"));
    }
    if !knowledge.is_empty() {
        prompt.push_str(&format!(
            "\nCollected knowledge:\n{}\n",
            render_knowledge(knowledge)
        ));
    }
    prompt
}

// ---------------------------------------------------------------------------
// Research
// ---------------------------------------------------------------------------

pub fn query_writer(topic: &str, date: &str, number_of_queries: usize) -> String {
    format!(
        "Write web search queries for researching the topic below. Today is {date}.\n\
         - Produce at most {number_of_queries} queries; prefer one unless the topic \
         has several distinct aspects.\n\
         - Each query covers one aspect; avoid near-duplicates.\n\
         - Ask for the most recent information when the topic is time sensitive.\n\
         - Give a short rationale for each query.\n\
         \n\
         Topic:\n{topic}"
    )
}

pub fn reflection(topic: &str, date: &str, analyses: &[PageAnalysis]) -> String {
    format!(
        "You are reviewing web research on the topic below. Today is {date}.\n\
         Decide whether the page summaries are enough to answer the topic. If \
         not, describe the missing knowledge and write self-contained follow-up \
         search queries that would fill the gap.\n\
         \n\
         Topic:\n{topic}\n\
         \n\
         Page summaries:\n{pages}",
        pages = render_pages(analyses),
    )
}

pub fn research_answer(topic: &str, date: &str, analyses: &[PageAnalysis]) -> String {
    format!(
        "Write an answer to the topic below using only the page summaries. \
         Today is {date}.\n\
         Cite the source URL of every fact you use. If the summaries do not \
         answer the topic, say so.\n\
         \n\
         Topic:\n{topic}\n\
         \n\
         Page summaries:\n{pages}",
        pages = render_pages(analyses),
    )
}

pub fn page_analysis(query: &str, date: &str, page: &str) -> String {
    format!(
        "Extract from the web page below everything relevant to the search \
         query. Today is {date}.\n\
         Keep facts, figures, and dates exactly as written. If the page has \
         nothing relevant, reply exactly \"{marker}\".\n\
         \n\
         Search query: {query}\n\
         \n\
         Page:\n{page}",
        marker = crate::types::NO_RELEVANT_INFORMATION,
    )
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

pub fn memory_queries(user: &str, instructions: &str, registry: &[MemoryAccessRecord]) -> String {
    let now = Utc::now().to_rfc3339();
    let instructions = if instructions.trim().is_empty() {
        "(none)"
    } else {
        instructions
    };
    format!(
        "You manage the long-term memory of a conversational assistant. The \
         current date and time is {now}.\n\
         Plan memory operations for the conversation:\n\
         - `read` queries look up facts, events, or preferences that help answer \
         the latest message.\n\
         - `write` queries store new lasting information the user shared; the \
         query text is the memory itself, written as a complete sentence.\n\
         - Set `memory_type` to facts, events, or preferences.\n\
         - Do not repeat operations already listed below.\n\
         - Return an empty list when nothing needs to be read or written.\n\
         \n\
         User: {user}\n\
         Instructions: {instructions}\n\
         \n\
         Memory operations so far:\n{registry}",
        registry = render_registry(registry),
    )
}

pub fn memory_analysis(instructions: &str, registry: &[MemoryAccessRecord]) -> String {
    format!(
        "Summarize what the memory operations below revealed about the user, \
         focusing on what matters for these instructions: {instructions}\n\
         Mention stored memories briefly. Say so when nothing relevant was \
         found.\n\
         \n\
         Memory operations:\n{registry}",
        registry = render_registry(registry),
    )
}
