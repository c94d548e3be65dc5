use futures::StreamExt;
use neonops_core::{
    AppConfig, ChatMessage, ConfigError, Conversation, Dispatcher, LlmProviderKind, MessageRole,
    ScriptedReply, ScriptedTransport, TokenEvent, ToolId,
};
use std::io::Write;
use std::sync::Arc;

const GATEWAY_CONFIG: &str = r#"
app:
  provider: claude
  providers:
    claude:
      api_key: sk-ant-file
      base_url: http://127.0.0.1:8787/anthropic/
      model: claude-3-5-haiku-latest
      max_tokens: 200
"#;

#[tokio::test]
async fn file_settings_reach_the_wire() {
    let mut config = AppConfig::from_yaml(GATEWAY_CONFIG).expect("config");
    config.apply_overrides(|_| None).expect("overrides");
    let transport = ScriptedTransport::new().with_reply(ScriptedReply::chunks([
        "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"ok\"}}\n\n",
        "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
    ]));
    let dispatcher = Dispatcher::with_transport(&config, Arc::new(transport.clone()));
    let mut conversation = Conversation::new(ToolId::AirdropChecker);
    conversation
        .push(ChatMessage::new(MessageRole::User, "free mint?"))
        .expect("push");

    let events: Vec<_> = dispatcher
        .run_turn(ToolId::AirdropChecker, config.provider, &conversation)
        .collect()
        .await;

    assert_eq!(events.last(), Some(&TokenEvent::Complete("ok".into())));
    let request = transport.last_request().expect("request");
    assert_eq!(request.url, "http://127.0.0.1:8787/anthropic/v1/messages");
    assert_eq!(request.header_value("x-api-key"), Some("sk-ant-file"));
    assert_eq!(request.body["model"], "claude-3-5-haiku-latest");
    assert_eq!(request.body["max_tokens"], 200);
    assert_eq!(request.body["system"], ToolId::AirdropChecker.persona());
}

#[tokio::test]
async fn environment_rotation_applies_to_next_turn() {
    let mut config = AppConfig::from_yaml("app:\n  provider: openai\n").expect("config");
    config
        .apply_overrides(|name| (name == "OPENAI_API_KEY").then(|| "sk-env".to_string()))
        .expect("overrides");
    let transport = ScriptedTransport::new()
        .with_reply(ScriptedReply::chunks(["data: [DONE]\n\n"]))
        .with_reply(ScriptedReply::chunks(["data: [DONE]\n\n"]));
    let dispatcher = Dispatcher::with_transport(&config, Arc::new(transport.clone()));
    let mut conversation = Conversation::new(ToolId::Chat);
    conversation
        .push(ChatMessage::new(MessageRole::User, "hi"))
        .expect("push");

    let first: Vec<_> = dispatcher
        .run_turn(ToolId::Chat, LlmProviderKind::OpenAi, &conversation)
        .collect()
        .await;
    dispatcher
        .credentials()
        .set(LlmProviderKind::OpenAi, "sk-rotated");
    let second: Vec<_> = dispatcher
        .run_turn(ToolId::Chat, LlmProviderKind::OpenAi, &conversation)
        .collect()
        .await;

    assert_eq!(first, vec![TokenEvent::Complete(String::new())]);
    assert_eq!(second, first);
    let auth: Vec<_> = transport
        .requests()
        .iter()
        .map(|request| request.header_value("authorization").map(str::to_owned))
        .collect();
    assert_eq!(
        auth,
        vec![
            Some("Bearer sk-env".to_string()),
            Some("Bearer sk-rotated".to_string())
        ]
    );
}

#[test]
fn explicit_config_file_is_loaded() {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("temp file");
    file.write_all(b"app:\n  tool: thread-writer\n  switch_policy: clear\n")
        .expect("write");

    let config = AppConfig::load(Some(file.path())).expect("config");
    assert_eq!(config.tool, ToolId::ThreadWriter);
    assert_eq!(config.switch_policy, neonops_core::SwitchPolicy::Clear);
}

#[test]
fn invalid_yaml_has_a_user_message() {
    let err = AppConfig::from_yaml("app: [unterminated").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
    assert!(err.user_message().contains("neonops.yaml"));
}
