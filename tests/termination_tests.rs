use async_trait::async_trait;
use conclave::backend::{ExecutionContext, ExecutionOptions};
use conclave::client_wrapper::{BackendError, ClientWrapper, Message, Role};
use conclave::history::{ChatMessage, History};
use conclave::termination::{
    interpret_termination, KeywordTerminationStrategy, PromptTerminationStrategy,
    TerminationStrategy, TerminationVerdict,
};
use conclave::ConclaveError;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct JudgeClient {
    reply: Result<String, BackendError>,
    seen: Mutex<Vec<String>>,
}

impl JudgeClient {
    fn answering(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn failing(error: BackendError) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(error),
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ClientWrapper for JudgeClient {
    async fn send_message(&self, messages: &[Message]) -> Result<Message, BackendError> {
        for m in messages {
            self.seen.lock().unwrap().push(m.content.to_string());
        }
        self.reply
            .clone()
            .map(|text| Message::new(Role::Assistant, text))
    }

    fn model_name(&self) -> &str {
        "judge"
    }
}

async fn judge(
    strategy: &dyn TerminationStrategy,
    history: &[ChatMessage],
    options: ExecutionOptions,
) -> Result<bool, ConclaveError> {
    let cancel = CancellationToken::new();
    let ctx = ExecutionContext {
        conversation: "test",
        options: &options,
        cancel: &cancel,
        events: None,
    };
    strategy.is_done(history, &ctx).await
}

fn critic_history() -> Vec<ChatMessage> {
    vec![ChatMessage::from_agent("Critic", "The slogan works.")]
}

#[tokio::test]
async fn test_marker_match_is_case_insensitive() {
    for (reply, expected) in [
        ("APPROVED", true),
        ("Verdict: approved.", true),
        ("This is not ApPrOvEd yet? It is.", true),
        ("Rejected", false),
        ("", false),
        ("   ", false),
    ] {
        let client = JudgeClient::answering(reply);
        let strategy = PromptTerminationStrategy::new(client, "", "Approved").unwrap();
        let done = judge(&strategy, &critic_history(), ExecutionOptions::default())
            .await
            .unwrap();
        assert_eq!(done, expected, "reply {:?}", reply);
    }
}

#[tokio::test]
async fn test_prompt_renders_marker_and_restricted_history() {
    let client = JudgeClient::answering("no");
    let strategy = PromptTerminationStrategy::new(
        client.clone(),
        "Say {{$success}} when done:\n{{ $history }}",
        "SHIP",
    )
    .unwrap()
    .with_history_window(Some(1));
    let history = vec![
        ChatMessage::from_agent("Critic", "first note"),
        ChatMessage::from_agent("Critic", "second note"),
    ];

    assert!(!judge(&strategy, &history, ExecutionOptions::default())
        .await
        .unwrap());
    let seen = client.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], "Say SHIP when done:\nCritic: second note");
}

#[tokio::test]
async fn test_backend_failure_is_fatal() {
    let client = JudgeClient::failing(BackendError::Status {
        code: 503,
        body: "overloaded".to_string(),
    });
    let strategy = PromptTerminationStrategy::new(client, "{{$history}}", "APPROVED").unwrap();
    let options = ExecutionOptions::default()
        .with_max_retries(1)
        .with_retry_backoff(Duration::from_millis(1));

    let err = judge(&strategy, &critic_history(), options)
        .await
        .unwrap_err();
    assert!(matches!(err, ConclaveError::BackendUnavailable(_)));
}

#[tokio::test]
async fn test_nothing_to_judge_skips_model_call() {
    let client = JudgeClient::answering("APPROVED");
    let strategy = PromptTerminationStrategy::new(client.clone(), "", "APPROVED").unwrap();
    assert!(!judge(&strategy, &[], ExecutionOptions::default())
        .await
        .unwrap());
    assert!(client.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_keyword_strategy_skips_tool_calls() {
    let strategy = KeywordTerminationStrategy::new("APPROVED").unwrap();
    let history = vec![
        ChatMessage::from_agent("Critic", "APPROVED"),
        ChatMessage::from_agent(
            "Critic",
            r#"{"tool_call": {"name": "read_file", "parameters": {"path": "draft.md"}}}"#,
        )
        .with_metadata("tool_call", "read_file"),
        ChatMessage::tool_result("Critic", "read_file", "Tool 'read_file' executed successfully."),
    ];
    assert!(judge(&strategy, &history, ExecutionOptions::default())
        .await
        .unwrap());
}

#[test]
fn test_restricted_view_keeps_only_allow_listed_speakers() {
    let mut history = History::new();
    history.append(ChatMessage::user("task mentioning APPROVED"));
    history.append(ChatMessage::from_agent("Writer", "APPROVED by me"));
    history.append(ChatMessage::from_agent("Critic", "needs work"));

    let view = history.authored_by(&["Critic".to_string()]);
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].speaker, "Critic");
    assert_eq!(view[0].index, 2);
}

#[test]
fn test_verdict_grammar() {
    assert_eq!(interpret_termination("approved", "APPROVED"), TerminationVerdict::Done);
    assert_eq!(interpret_termination("nope", "APPROVED"), TerminationVerdict::Continue);
    assert_eq!(interpret_termination("", "APPROVED"), TerminationVerdict::Ambiguous);
}
