//! Whole-turn tests of the assistant graph against scripted models.
//!
//! Models are registered by name: "openai" handles query processing, memory,
//! and the final answer; "gpt-4o-mini" writes research queries, reflects,
//! and analyzes pages; "gpt-4o" writes the research answer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use convograph_engine::defaults::time_capabilities;
use convograph_engine::flows::assistant::{COLLECT_KNOWLEDGE, MEMORY_SEARCH, WEB_SEARCH};
use convograph_engine::flows::memory::write_memory;
use convograph_engine::types::{AccessType, MemoryAccessQuery, MemoryType, ModelRequest, Namespace};
use convograph_engine::{
    Assistant, ExecutionEvent, InMemoryStore, Message, ModelGateway, Role, RunConfig,
    ScriptedFactory, ScriptedModel, Services, StaticWebFetch, StaticWebSearch, ToolCall,
    ToolRegistry, APOLOGY,
};
use serde_json::json;
use tokio::sync::broadcast::error::TryRecvError;

const PAGE_URL: &str = "https://f1.test/monaco";
const RESEARCH_ANSWER: &str = "Leclerc won in Monaco (https://f1.test/monaco).";
const MEMORY_SUMMARY: &str = "Bob is a Ferrari fan.";

fn system(request: &ModelRequest) -> &str {
    request.system_prompt().unwrap_or_default()
}

fn is_processing(request: &ModelRequest) -> bool {
    system(request).contains("Decide how to handle the latest user message")
}

fn first_prompt(request: &ModelRequest) -> &str {
    request
        .messages
        .first()
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

fn processing_reply(summary: &str, web: bool, memory: bool, user: &str) -> Message {
    Message::assistant(
        json!({
            "summary": summary,
            "requires_web_search": web,
            "requires_long_term_memory_access": memory,
            "instructions_for_web_search": if web { "find the race winner" } else { "" },
            "instructions_for_long_term_memory_access": if memory { "team preferences" } else { "" },
            "user": user,
        })
        .to_string(),
    )
}

/// Research models: one query, one sufficient reflection, a fixed answer.
fn research_models(factory: ScriptedFactory) -> ScriptedFactory {
    let mini = ScriptedModel::new("gpt-4o-mini", |request| {
        let prompt = first_prompt(request);
        if prompt.starts_with("Write web search queries") {
            Message::assistant(
                r#"{"web_research_queries": [{"query": "monaco grand prix winner", "rationale": "race result"}]}"#,
            )
        } else if prompt.starts_with("You are reviewing") {
            Message::assistant(r#"{"is_sufficient": true, "knowledge_gap": "", "follow_up_queries": []}"#)
        } else {
            Message::assistant("Charles Leclerc won the Monaco Grand Prix.")
        }
    });
    let answer = ScriptedModel::new("gpt-4o", |_| Message::assistant(RESEARCH_ANSWER));
    factory
        .with_model("gpt-4o-mini", Arc::new(mini))
        .with_model("gpt-4o", Arc::new(answer))
}

fn services(factory: ScriptedFactory, store: Arc<InMemoryStore>) -> Services {
    Services::builder(Arc::new(ModelGateway::new(Arc::new(factory))))
        .store(store)
        .web_search(Arc::new(
            StaticWebSearch::new().with_hit("monaco grand prix winner", "Monaco GP", PAGE_URL),
        ))
        .web_fetch(Arc::new(
            StaticWebFetch::new().with_page(PAGE_URL, "Charles Leclerc wins the Monaco Grand Prix."),
        ))
        .capabilities(Arc::new(ToolRegistry::from_capabilities(time_capabilities())))
        .build()
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<ExecutionEvent>) -> Vec<ExecutionEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => return events,
        }
    }
}

#[tokio::test]
async fn direct_answer_skips_knowledge_collection() {
    let processed = Arc::new(AtomicUsize::new(0));
    let counter = processed.clone();
    let openai = ScriptedModel::new("openai", move |request| {
        if is_processing(request) {
            counter.fetch_add(1, Ordering::SeqCst);
            processing_reply("greeting", false, false, "")
        } else {
            Message::assistant("Hello! How can I help?")
        }
    });
    let factory = ScriptedFactory::new().with_model("openai", Arc::new(openai));
    let mut assistant =
        Assistant::new(RunConfig::default(), services(factory, Arc::new(InMemoryStore::new()))).unwrap();

    let reply = assistant.try_reply("hi").await.unwrap();
    assert_eq!(reply.content, "Hello! How can I help?");
    assert_eq!(processed.load(Ordering::SeqCst), 1);
    assert_eq!(assistant.history().len(), 2);
    assert!(assistant.registry().is_empty());
}

#[tokio::test]
async fn web_and_memory_branches_feed_the_answer() {
    let openai = Arc::new(ScriptedModel::new("openai", |request| {
        let prompt = system(request);
        if is_processing(request) {
            if prompt.contains("processing pass 1 ") {
                processing_reply("needs race result and preferences", true, true, "Bob")
            } else {
                processing_reply("enough knowledge", false, false, "bob")
            }
        } else if prompt.starts_with("You manage the long-term memory") {
            Message::assistant(
                r#"{"memory_access_queries": [
                    {"query": "Bob supports Ferrari", "memory_type": "preferences", "access_type": "write"},
                    {"query": "Ferrari", "memory_type": "preferences", "access_type": "read"}
                ]}"#,
            )
        } else if first_prompt(request).starts_with("Summarize what the memory operations") {
            Message::assistant(MEMORY_SUMMARY)
        } else {
            Message::assistant("Leclerc won, good news for a Ferrari fan!")
        }
    }));
    let store = Arc::new(InMemoryStore::new());
    let factory = research_models(ScriptedFactory::new().with_model("openai", openai.clone()));
    let mut assistant = Assistant::new(RunConfig::default(), services(factory, store.clone())).unwrap();
    let mut events = assistant.subscribe();

    let reply = assistant.try_reply("Who won in Monaco? I'm Bob.").await.unwrap();
    assert_eq!(reply.content, "Leclerc won, good news for a Ferrari fan!");
    assert_eq!(assistant.user(), "bob");

    // Both branches ran, web first.
    let fan_outs: Vec<Vec<String>> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            ExecutionEvent::FanOutDispatched { from, targets, .. } if from == COLLECT_KNOWLEDGE => Some(targets),
            _ => None,
        })
        .collect();
    assert_eq!(fan_outs, [vec![WEB_SEARCH.to_string(), MEMORY_SEARCH.to_string()]]);

    // Knowledge reached the final answer in dispatch order.
    let final_request = openai
        .requests()
        .into_iter()
        .rev()
        .find(|r| !r.tools.is_empty())
        .unwrap();
    let prompt = system(&final_request);
    assert!(prompt.contains(&format!("[1] {RESEARCH_ANSWER}")));
    assert!(prompt.contains(&format!("[2] {MEMORY_SUMMARY}")));

    // The memory write landed in the user's namespace and was recorded.
    let stored = store.list(&Namespace::new("bob", "preferences")).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].text(), "Bob supports Ferrari");
    let accesses: Vec<AccessType> = assistant
        .registry()
        .iter()
        .map(|r| r.query.access_type)
        .collect();
    assert_eq!(accesses, [AccessType::Write, AccessType::Read]);
}

#[tokio::test]
async fn processing_loop_stops_at_iteration_cap() {
    let processed = Arc::new(AtomicUsize::new(0));
    let counter = processed.clone();
    let openai = Arc::new(ScriptedModel::new("openai", move |request| {
        if is_processing(request) {
            counter.fetch_add(1, Ordering::SeqCst);
            processing_reply("still unsure", true, false, "")
        } else {
            Message::assistant("Best effort answer.")
        }
    }));
    let factory = research_models(ScriptedFactory::new().with_model("openai", openai.clone()));
    let mut assistant =
        Assistant::new(RunConfig::default(), services(factory, Arc::new(InMemoryStore::new()))).unwrap();

    let reply = assistant.try_reply("who won?").await.unwrap();
    assert_eq!(reply.content, "Best effort answer.");
    assert_eq!(processed.load(Ordering::SeqCst), 3);

    // Passes 1 and 2 collected knowledge; pass 3 hit the cap.
    let final_request = openai
        .requests()
        .into_iter()
        .rev()
        .find(|r| !r.tools.is_empty())
        .unwrap();
    let prompt = system(&final_request);
    assert!(prompt.contains("[2] "));
    assert!(!prompt.contains("[3] "));
}

#[tokio::test]
async fn memory_without_user_goes_straight_to_answer() {
    let processed = Arc::new(AtomicUsize::new(0));
    let counter = processed.clone();
    let openai = ScriptedModel::new("openai", move |request| {
        if is_processing(request) {
            counter.fetch_add(1, Ordering::SeqCst);
            processing_reply("asks about past chats", false, true, "")
        } else {
            Message::assistant("Who am I talking to?")
        }
    });
    let factory = ScriptedFactory::new().with_model("openai", Arc::new(openai));
    let mut assistant =
        Assistant::new(RunConfig::default(), services(factory, Arc::new(InMemoryStore::new()))).unwrap();

    let reply = assistant.try_reply("what did I tell you yesterday?").await.unwrap();
    assert_eq!(reply.content, "Who am I talking to?");
    assert_eq!(processed.load(Ordering::SeqCst), 1);
    assert!(assistant.registry().is_empty());
}

#[tokio::test]
async fn final_answer_runs_capability_calls() {
    let openai = ScriptedModel::new("openai", |request| {
        if is_processing(request) {
            return processing_reply("asks for the time", false, false, "");
        }
        match request.messages.last() {
            Some(last) if last.role == Role::Tool => Message::assistant(format!("It is {}.", last.content)),
            _ => Message::assistant_with_calls(
                "",
                vec![ToolCall::new("call-1", "current_utc_time", json!({}))],
            ),
        }
    });
    let factory = ScriptedFactory::new().with_model("openai", Arc::new(openai));
    let mut assistant =
        Assistant::new(RunConfig::default(), services(factory, Arc::new(InMemoryStore::new()))).unwrap();

    let reply = assistant.try_reply("what time is it?").await.unwrap();
    assert!(reply.content.starts_with("It is "));
    assert!(!reply.has_tool_calls());
    assert_eq!(assistant.history().len(), 2);
}

#[tokio::test]
async fn unsupported_research_model_is_a_configuration_failure() {
    let openai = ScriptedModel::new("openai", |request| {
        if is_processing(request) {
            processing_reply("needs the web", true, false, "")
        } else {
            Message::assistant("unused")
        }
    });
    let factory = research_models(ScriptedFactory::new().with_model("openai", Arc::new(openai)));
    let mut config = RunConfig::default();
    config.research.answer_model = "not-a-model".into();
    let mut assistant = Assistant::new(config, services(factory, Arc::new(InMemoryStore::new()))).unwrap();

    let err = assistant.try_reply("who won?").await.unwrap_err();
    assert!(err.is_configuration());

    let reply = assistant.reply("who won?").await;
    assert_eq!(reply.content, APOLOGY);
    assert!(assistant.history().is_empty());
}

#[tokio::test]
async fn writing_a_read_query_is_rejected() {
    let store = InMemoryStore::new();
    let query = MemoryAccessQuery {
        query: "Bob likes tea".into(),
        memory_type: MemoryType::Preferences,
        access_type: AccessType::Read,
        user: Some("bob".into()),
        rationale: String::new(),
    };
    let namespace = Namespace::resolve(query.user.as_deref(), "Preferences", None, "default_user");
    let err = write_memory(&store, &namespace, &query).await.unwrap_err();
    assert!(err.is_contract_violation());
    assert!(store.namespaces().await.is_empty());
}

#[test]
fn namespace_resolution_is_deterministic() {
    let ns = Namespace::resolve(None, "Events", Some("Carol"), "default_user");
    assert_eq!(ns, Namespace::new("carol", "events"));
}
