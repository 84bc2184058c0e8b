use async_trait::async_trait;
use conclave::backend::{ExecutionContext, ExecutionOptions};
use conclave::client_wrapper::{BackendError, ClientWrapper, Message, Role};
use conclave::event::{AgentEvent, EventHandler};
use conclave::history::{ChatMessage, MessageRole};
use conclave::tools::FileSystemTool;
use conclave::{Agent, ConclaveError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct MockClient {
    replies: Mutex<VecDeque<String>>,
    fallback: String,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl MockClient {
    fn new(replies: Vec<String>, fallback: &str) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback: fallback.to_string(),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ClientWrapper for MockClient {
    async fn send_message(&self, messages: &[Message]) -> Result<Message, BackendError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        Ok(Message::new(Role::Assistant, reply))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[derive(Default)]
struct AgentEvents {
    events: Mutex<Vec<AgentEvent>>,
}

#[async_trait]
impl EventHandler for AgentEvents {
    async fn on_agent_event(&self, event: &AgentEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn tool_call(name: &str, parameters: serde_json::Value) -> String {
    serde_json::json!({ "tool_call": { "name": name, "parameters": parameters } }).to_string()
}

fn sandboxed_agent(client: Arc<MockClient>, dir: &TempDir) -> Agent {
    let fs = FileSystemTool::new(dir.path()).unwrap();
    Agent::new("Archivist", "Keeps notes on disk", client)
        .with_tool_protocol("FileSystem", Arc::new(fs))
}

async fn run(
    agent: &Agent,
    history: &[ChatMessage],
    options: &ExecutionOptions,
    events: Option<&Arc<dyn EventHandler>>,
) -> Result<Vec<ChatMessage>, ConclaveError> {
    let cancel = CancellationToken::new();
    let ctx = ExecutionContext {
        conversation: "test",
        options,
        cancel: &cancel,
        events,
    };
    agent.run_turn(history, &ctx).await
}

#[tokio::test]
async fn test_tool_round_trips_are_recorded() {
    let dir = TempDir::new().unwrap();
    let client = MockClient::new(
        vec![
            tool_call(
                "write_file",
                serde_json::json!({ "path": "notes/out.txt", "content": "hello" }),
            ),
            tool_call("read_file", serde_json::json!({ "path": "notes/out.txt" })),
            "The file says hello.".to_string(),
        ],
        "unused",
    );
    let agent = sandboxed_agent(client.clone(), &dir);
    let history = vec![ChatMessage::user("Store 'hello' and read it back")];

    let produced = run(&agent, &history, &ExecutionOptions::default(), None)
        .await
        .unwrap();

    assert_eq!(produced.len(), 5);
    assert_eq!(produced[0].role, MessageRole::Assistant);
    assert_eq!(produced[0].metadata.get("tool_call").map(String::as_str), Some("write_file"));
    assert_eq!(produced[1].role, MessageRole::Tool);
    assert_eq!(produced[1].metadata.get("tool").map(String::as_str), Some("write_file"));
    assert!(!produced[0].metadata.contains_key("tool"));
    assert!(produced[1].content.contains("executed successfully"));
    assert_eq!(produced[3].role, MessageRole::Tool);
    assert!(produced[3].content.ends_with("Result: hello"));
    assert_eq!(&*produced[4].content, "The file says hello.");
    assert!(produced.iter().all(|m| m.speaker == "Archivist"));

    assert_eq!(
        std::fs::read_to_string(dir.path().join("notes/out.txt")).unwrap(),
        "hello"
    );
    assert_eq!(client.calls(), 3);

    // The system prompt advertises the tools and the call format.
    let first = client.requests.lock().unwrap()[0].clone();
    assert_eq!(first[0].role, Role::System);
    assert!(first[0].content.contains("read_file"));
    assert!(first[0].content.contains("\"tool_call\""));
    // The follow-up request carries the tool result.
    let second = client.requests.lock().unwrap()[1].clone();
    assert!(second
        .last()
        .map_or(false, |m| m.role == Role::User && m.content.contains("write_file")));
}

#[tokio::test]
async fn test_tool_errors_become_text() {
    let dir = TempDir::new().unwrap();
    let client = MockClient::new(
        vec![
            tool_call("read_file", serde_json::json!({ "path": "missing.txt" })),
            tool_call("read_file", serde_json::json!({ "path": "/etc/passwd" })),
            tool_call("delete_everything", serde_json::json!({})),
            tool_call("write_file", serde_json::json!({ "path": "x.txt" })),
            "I could not do it.".to_string(),
        ],
        "unused",
    );
    let agent = sandboxed_agent(client, &dir);

    let options = ExecutionOptions::default().with_max_tool_calls_per_turn(10);
    let produced = run(&agent, &[ChatMessage::user("go")], &options, None)
        .await
        .unwrap();

    let results: Vec<&str> = produced
        .iter()
        .filter(|m| m.role == MessageRole::Tool)
        .map(|m| &*m.content)
        .collect();
    assert_eq!(results.len(), 4);
    assert!(results[0].starts_with("Tool 'read_file' failed."));
    assert!(results[0].contains("not found"));
    assert!(results[1].contains("Access to the specified path is denied."));
    assert!(!results[1].contains("root:"));
    assert!(results[2].starts_with("Tool 'delete_everything' failed."));
    assert!(results[3].contains("content"));
    assert_eq!(&*produced.last().unwrap().content, "I could not do it.");
}

#[tokio::test]
async fn test_tool_call_limit_ends_the_turn() {
    let dir = TempDir::new().unwrap();
    let looping = tool_call("list_directory", serde_json::json!({ "path": "." }));
    let client = MockClient::new(vec![], &looping);
    let agent = sandboxed_agent(client.clone(), &dir);
    let events: Arc<AgentEvents> = Arc::new(AgentEvents::default());
    let handler: Arc<dyn EventHandler> = events.clone();

    let options = ExecutionOptions::default().with_max_tool_calls_per_turn(2);
    let produced = run(&agent, &[ChatMessage::user("loop")], &options, Some(&handler))
        .await
        .unwrap();

    assert_eq!(client.calls(), 3);
    assert_eq!(produced.len(), 5);
    let last = produced.last().unwrap();
    assert_eq!(last.role, MessageRole::Assistant);
    assert!(last
        .content
        .ends_with("[Warning: Maximum tool calls per turn reached]"));
    assert!(last.metadata.contains_key("tool_limit_reached"));

    let events = events.events.lock().unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, AgentEvent::ToolCallLimitReached { limit: 2, .. })));
    assert!(matches!(
        events.last(),
        Some(AgentEvent::TurnCompleted {
            tool_calls_made: 2,
            messages_produced: 5,
            ..
        })
    ));
}

#[tokio::test]
async fn test_tool_call_text_without_tools_is_an_answer() {
    let raw = tool_call("read_file", serde_json::json!({ "path": "a.txt" }));
    let client = MockClient::new(vec![raw.clone()], "unused");
    let agent = Agent::new("Plain", "", client.clone());

    let produced = run(
        &agent,
        &[ChatMessage::user("go")],
        &ExecutionOptions::default(),
        None,
    )
    .await
    .unwrap();
    assert_eq!(produced.len(), 1);
    assert_eq!(&*produced[0].content, raw.as_str());
    assert_eq!(client.calls(), 1);
}
