//! LlmResolver tests against a scripted LlmClient.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use llm_client::LlmClient;
use prompt::{ChatMessage, MessageRole};
use quest_core::{
    Next, PersonaId, ResolveRequest, Resolver, ResolverError, StateName, Turn,
};
use quest_llm::{LlmResolver, StorySuccessors};

struct ScriptedClient {
    reply: Result<String, String>,
    valid: bool,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedClient {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            valid: true,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn failing(valid: bool) -> Arc<Self> {
        Arc::new(Self {
            reply: Err("connection reset".to_string()),
            valid,
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn validate(&self) -> anyhow::Result<()> {
        if self.valid {
            Ok(())
        } else {
            anyhow::bail!("401 API key not valid")
        }
    }

    async fn get_llm_response_with_messages(
        &self,
        messages: Vec<ChatMessage>,
    ) -> anyhow::Result<String> {
        self.seen.lock().unwrap().push(messages);
        self.reply.clone().map_err(|e| anyhow::anyhow!(e))
    }
}

fn successors() -> StorySuccessors {
    let mut s = StorySuccessors::new();
    s.insert(
        PersonaId::new("liza"),
        StateName::new("search"),
        vec![StateName::finish()],
    );
    s
}

fn resolver(client: Arc<ScriptedClient>) -> LlmResolver {
    LlmResolver::new(client, successors())
}

struct Fixture {
    persona: PersonaId,
    state: StateName,
    history: Vec<Turn>,
}

impl Fixture {
    fn new(state: &str) -> Self {
        Self {
            persona: PersonaId::new("liza"),
            state: StateName::new(state),
            history: vec![Turn::user("hi"), Turn::persona("Who is this?")],
        }
    }

    fn request<'a>(&'a self, goal: Option<&'a str>, text: &'a str) -> ResolveRequest<'a> {
        ResolveRequest {
            persona: &self.persona,
            system_prompt: "You are Liza.",
            state: &self.state,
            goal,
            history: &self.history,
            text,
        }
    }
}

#[tokio::test]
async fn reply_without_marker_does_not_advance() {
    let client = ScriptedClient::replying("I can't tell you that.");
    let f = Fixture::new("search");
    let res = resolver(client.clone())
        .resolve(f.request(Some("names the hospital"), "where are you?"))
        .await
        .unwrap();
    assert_eq!(res.reply, "I can't tell you that.");
    assert_eq!(res.advance, None);

    let seen = client.seen.lock().unwrap();
    let roles: Vec<MessageRole> = seen[0].iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            MessageRole::System,
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::User
        ]
    );
    assert!(seen[0][0].content.contains("Goal: names the hospital"));
    assert_eq!(seen[0][3].content, "where are you?");
}

#[tokio::test]
async fn marker_advances_when_goal_present() {
    let f = Fixture::new("search");
    let res = resolver(ScriptedClient::replying("Yes, the hospital! [[NEXT]]"))
        .resolve(f.request(Some("names the hospital"), "the city hospital"))
        .await
        .unwrap();
    assert_eq!(res.reply, "Yes, the hospital!");
    assert_eq!(res.advance, Some(Next::Default));
}

#[tokio::test]
async fn named_marker_is_passed_through() {
    let f = Fixture::new("search");
    let res = resolver(ScriptedClient::replying("Go. [[NEXT:finish]]"))
        .resolve(f.request(Some("names the hospital"), "hospital"))
        .await
        .unwrap();
    assert_eq!(res.advance, Some(Next::Named(StateName::finish())));
}

#[tokio::test]
async fn marker_ignored_without_goal() {
    let f = Fixture::new("start");
    let res = resolver(ScriptedClient::replying("Hello [[NEXT]]"))
        .resolve(f.request(None, "hi"))
        .await
        .unwrap();
    assert_eq!(res.reply, "Hello");
    assert_eq!(res.advance, None);
}

#[tokio::test]
async fn empty_reply_is_an_error() {
    let f = Fixture::new("search");
    let err = resolver(ScriptedClient::replying("  [[NEXT]] "))
        .resolve(f.request(Some("goal"), "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, ResolverError::EmptyReply));
}

#[tokio::test]
async fn client_failures_map_to_resolver_errors() {
    let f = Fixture::new("search");
    let err = resolver(ScriptedClient::failing(true))
        .resolve(f.request(None, "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, ResolverError::Request(ref m) if m.contains("connection reset")));

    let err = resolver(ScriptedClient::failing(false))
        .validate_credentials()
        .await
        .unwrap_err();
    assert!(matches!(err, ResolverError::Request(ref m) if m.contains("401")));
}
