use async_trait::async_trait;
use conclave::backend::{BackendKind, ClientFactory};
use conclave::client_wrapper::{BackendError, ClientWrapper, Message, Role};
use conclave::config::ConclaveConfig;
use conclave::conversation::ConversationState;
use conclave::{Agent, ConclaveError, ScenarioRegistry};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Answers every request with a fixed reply, after an optional delay.
struct CannedClient {
    model: String,
    reply: String,
    delay: Duration,
}

#[async_trait]
impl ClientWrapper for CannedClient {
    async fn send_message(&self, _messages: &[Message]) -> Result<Message, BackendError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(Message::new(Role::Assistant, &self.reply))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Hands out canned clients keyed by model name and remembers which backends were asked for.
#[derive(Default)]
struct MockClientFactory {
    replies: HashMap<String, String>,
    delay: Duration,
    requested: Mutex<Vec<(BackendKind, String)>>,
}

impl MockClientFactory {
    fn new(replies: &[(&str, &str)]) -> Self {
        Self {
            replies: replies
                .iter()
                .map(|(m, r)| (m.to_string(), r.to_string()))
                .collect(),
            ..Default::default()
        }
    }
}

impl ClientFactory for MockClientFactory {
    fn create_client(
        &self,
        kind: BackendKind,
        model: &str,
    ) -> Result<Arc<dyn ClientWrapper>, ConclaveError> {
        self.requested
            .lock()
            .unwrap()
            .push((kind, model.to_string()));
        let reply = self.replies.get(model).cloned().ok_or_else(|| {
            ConclaveError::Configuration(format!("no mock client for model '{}'", model))
        })?;
        Ok(Arc::new(CannedClient {
            model: model.to_string(),
            reply,
            delay: self.delay,
        }))
    }
}

const CONFIG: &str = r#"{
    "agents": [
        { "name": "Writer", "description": "Drafts copy", "backend": "OpenAI", "model": "writer-model",
          "instructions": "Write the draft." },
        { "name": "Critic", "description": "Reviews drafts", "backend": "ollama", "model": "critic-model",
          "instructions": "Reply APPROVED when the draft is good.", "tools": ["Browser"] }
    ],
    "scenarios": [
        { "name": "Review", "agents": ["Writer", "Critic"], "selection": "sequential",
          "termination_agents": ["Critic"], "termination_success": "APPROVED", "max_iterations": 10 },
        { "name": "Moderated", "agents": ["Writer", "Critic"],
          "backend": "AzureOpenAI", "model": "moderator-model",
          "termination_prompt": "Is it done? Say {{$success}}.\n{{$history}}",
          "termination_agents": ["Critic"], "termination_success": "yes", "max_iterations": 4 },
        { "name": "Retired", "agents": ["Writer"], "enabled": false, "termination_success": "x" },
        { "name": "Solo", "agents": ["Writer"], "selection": "sequential",
          "termination_success": "never", "history": "reset", "max_iterations": 2 }
    ]
}"#;

fn factory() -> MockClientFactory {
    MockClientFactory::new(&[
        ("writer-model", "Fresh bread daily."),
        ("critic-model", "APPROVED"),
        ("moderator-model", "Critic"),
    ])
}

fn registry() -> ScenarioRegistry {
    let config = ConclaveConfig::from_json_str(CONFIG).unwrap();
    ScenarioRegistry::from_config(&config, &factory()).unwrap()
}

#[tokio::test]
async fn test_lists_enabled_scenarios_in_order() {
    let scenarios = registry();
    assert_eq!(scenarios.list_scenarios(), vec!["Review", "Moderated", "Solo"]);
    assert!(!scenarios.contains("Retired"));
}

#[tokio::test]
async fn test_unknown_scenario() {
    let scenarios = registry();
    let err = scenarios.execute("Retired", "hello").await.unwrap_err();
    assert_eq!(err, ConclaveError::ScenarioNotFound("Retired".to_string()));
    assert!(matches!(
        scenarios.history("Nope").await,
        Err(ConclaveError::ScenarioNotFound(_))
    ));
}

#[tokio::test]
async fn test_execute_review_scenario() {
    let scenarios = registry();
    let transcript = scenarios
        .execute("Review", "Write a bakery slogan")
        .await
        .unwrap();
    assert!(transcript.is_complete());
    assert_eq!(transcript.iterations, 2);

    let history = scenarios.history("Review").await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(
        scenarios.state("Review").await.unwrap(),
        ConversationState::Terminated
    );

    scenarios.execute("Review", "Another one").await.unwrap();
    assert_eq!(scenarios.history("Review").await.unwrap().len(), 6);

    scenarios.reset("Review").await.unwrap();
    assert!(scenarios.history("Review").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_agent_updates_apply_to_later_executions() {
    let scenarios = registry();
    assert!(scenarios.execute("Review", "first").await.unwrap().is_complete());

    let stricter = Agent::new(
        "Critic",
        "Reviews drafts",
        Arc::new(CannedClient {
            model: "critic-model".to_string(),
            reply: "Needs another pass.".to_string(),
            delay: Duration::ZERO,
        }),
    );
    scenarios.agents().upsert(vec![stricter]).unwrap();
    assert_eq!(scenarios.agents().snapshot().len(), 2);

    let transcript = scenarios.execute("Review", "second").await.unwrap();
    assert!(!transcript.is_complete());
    assert_eq!(transcript.iterations, 10);
    assert!(transcript
        .new_messages()
        .iter()
        .filter(|m| m.speaker == "Critic")
        .all(|m| &*m.content == "Needs another pass."));
}

#[tokio::test]
async fn test_model_driven_scenario() {
    let scenarios = registry();
    let transcript = scenarios
        .execute("Moderated", "Write a bakery slogan")
        .await
        .unwrap();
    // The moderator always picks the Critic; its answer "Critic" never contains "yes".
    assert!(!transcript.is_complete());
    assert_eq!(transcript.iterations, 4);
    assert!(transcript.messages[1..].iter().all(|m| m.speaker == "Critic"));
}

#[tokio::test]
async fn test_reset_mode_and_cancellation() {
    let scenarios = registry();
    scenarios.execute("Solo", "one").await.unwrap();
    let second = scenarios.execute("Solo", "two").await.unwrap();
    assert_eq!(second.new_from, 0);
    assert_eq!(second.messages.len(), 3);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = scenarios
        .execute_with_cancellation("Solo", "three", &cancel)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(
        scenarios.state("Solo").await.unwrap(),
        ConversationState::Failed
    );
    assert!(scenarios.execute("Solo", "four").await.is_ok());
}

#[tokio::test]
async fn test_backend_identifiers_are_resolved() {
    let config = ConclaveConfig::from_json_str(CONFIG).unwrap();
    let clients = factory();
    ScenarioRegistry::from_config(&config, &clients).unwrap();

    let requested = clients.requested.lock().unwrap();
    assert!(requested.contains(&(BackendKind::OpenAI, "writer-model".to_string())));
    assert!(requested.contains(&(BackendKind::Ollama, "critic-model".to_string())));
    assert!(requested.contains(&(BackendKind::AzureOpenAI, "moderator-model".to_string())));
}

#[test]
fn test_configuration_errors() {
    let cases = [
        // unknown backend identifier
        r#"{ "agents": [ { "name": "A", "backend": "Bard", "model": "writer-model" } ] }"#,
        // empty agent subset
        r#"{ "agents": [ { "name": "A", "backend": "openai", "model": "writer-model" } ],
             "scenarios": [ { "name": "S", "agents": [], "termination_success": "x" } ] }"#,
        // absent agent
        r#"{ "agents": [ { "name": "A", "backend": "openai", "model": "writer-model" } ],
             "scenarios": [ { "name": "S", "agents": ["A", "Ghost"], "termination_success": "x" } ] }"#,
        // duplicate agent names
        r#"{ "agents": [ { "name": "A", "backend": "openai", "model": "writer-model" },
                         { "name": "A", "backend": "openai", "model": "writer-model" } ] }"#,
        // termination allow-list outside the scenario
        r#"{ "agents": [ { "name": "A", "backend": "openai", "model": "writer-model" } ],
             "scenarios": [ { "name": "S", "agents": ["A"], "selection": "sequential",
                              "termination_agents": ["B"], "termination_success": "x" } ] }"#,
        // zero iterations
        r#"{ "agents": [ { "name": "A", "backend": "openai", "model": "writer-model" } ],
             "scenarios": [ { "name": "S", "agents": ["A"], "selection": "sequential",
                              "termination_success": "x", "max_iterations": 0 } ] }"#,
        // model-driven selection without a usable strategy backend
        r#"{ "agents": [ { "name": "A", "backend": "openai", "model": "writer-model" } ],
             "scenarios": [ { "name": "S", "agents": ["A"], "termination_success": "x" } ] }"#,
    ];

    for json in cases {
        let config = ConclaveConfig::from_json_str(json).unwrap();
        let result = ScenarioRegistry::from_config(&config, &factory());
        assert!(
            matches!(result, Err(ConclaveError::Configuration(_))),
            "expected a configuration error for {}",
            json
        );
    }
}

#[test]
fn test_filesystem_tool_is_wired_to_agents() {
    let dir = TempDir::new().unwrap();
    let json = format!(
        r#"{{ "tools": [ {{ "name": "FileSystem", "parameters": {{ "basepath": "{}" }} }} ],
             "agents": [ {{ "name": "Archivist", "backend": "openai", "model": "writer-model",
                           "tools": ["FileSystem", "Browser"] }} ] }}"#,
        dir.path().display()
    );
    let config = ConclaveConfig::from_json_str(&json).unwrap();
    let tools = conclave::tool_provider::ToolFactory::from_settings(&config.tools);
    let agents =
        conclave::agent_registry::AgentRegistry::from_settings(&config.agents, &factory(), &tools)
            .unwrap();

    let archivist = agents.get("Archivist").unwrap();
    assert_eq!(archivist.declared_tools(), &["FileSystem".to_string()]);
    assert!(archivist.tools().get_tool("write_file").is_some());
}

#[tokio::test]
async fn test_scenarios_run_concurrently() {
    let config = ConclaveConfig::from_json_str(CONFIG).unwrap();
    let mut clients = factory();
    clients.delay = Duration::from_millis(20);
    let scenarios = ScenarioRegistry::from_config(&config, &clients).unwrap();

    let (review, solo) = futures_util::future::join(
        scenarios.execute("Review", "slogan"),
        scenarios.execute("Solo", "tagline"),
    )
    .await;
    assert!(review.unwrap().is_complete());
    assert_eq!(solo.unwrap().iterations, 2);
}
