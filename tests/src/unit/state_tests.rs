use neonops_core::{
    AppConfig, Dispatcher, LlmProviderKind, MessageRole, ScriptedTransport, SessionStore,
    SwitchPolicy, ToolId, TurnController, TurnOutcome,
};
use std::sync::Arc;

fn test_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

fn offline_controller() -> TurnController {
    let config = AppConfig::default();
    let dispatcher = Dispatcher::with_transport(&config, Arc::new(ScriptedTransport::new()));
    TurnController::new(dispatcher)
}

#[test]
fn session_store_records_messages() {
    let runtime = test_runtime();
    let controller = offline_controller();
    let mut store = SessionStore::new(ToolId::Chat, SwitchPolicy::Keep);

    let outcome = runtime
        .block_on(controller.submit_active(
            &mut store,
            LlmProviderKind::Mock,
            "hello world",
            &mut |_: &str| {},
        ))
        .expect("send message");

    assert!(outcome.is_completed());
    let conversation = store.active_conversation().expect("conversation");
    assert!(conversation
        .messages()
        .iter()
        .any(|msg| msg.role == MessageRole::Assistant));
    assert!(conversation
        .messages()
        .iter()
        .any(|msg| msg.role == MessageRole::User));
}

#[test]
fn every_submission_gets_exactly_one_reply() {
    let runtime = test_runtime();
    let controller = offline_controller();
    let mut store = SessionStore::new(ToolId::Chat, SwitchPolicy::Keep);
    let providers = [
        LlmProviderKind::Mock,
        LlmProviderKind::Claude,
        LlmProviderKind::Mock,
        LlmProviderKind::DeepSeek,
    ];

    for (turn, provider) in providers.into_iter().enumerate() {
        let outcome = runtime
            .block_on(controller.submit_active(
                &mut store,
                provider,
                &format!("turn {turn}"),
                &mut |_: &str| {},
            ))
            .expect("turn");
        assert_eq!(
            matches!(outcome, TurnOutcome::Failed(_)),
            provider != LlmProviderKind::Mock
        );
    }

    let messages = store.active_conversation().expect("conversation").messages();
    assert_eq!(messages.len(), providers.len() * 2);
    for (index, pair) in messages.chunks(2).enumerate() {
        assert_eq!(pair[0].role, MessageRole::User);
        assert_eq!(pair[0].content, format!("turn {index}"));
        assert_eq!(pair[1].role, MessageRole::Assistant);
        assert!(!pair[1].content.is_empty());
    }
}

#[test]
fn tool_conversations_are_independent() {
    let runtime = test_runtime();
    let controller = offline_controller();
    let mut store = SessionStore::new(ToolId::Chat, SwitchPolicy::Keep);

    for tool in [ToolId::ThreadWriter, ToolId::AirdropChecker, ToolId::ThreadWriter] {
        store.activate(tool);
        runtime
            .block_on(controller.submit_active(
                &mut store,
                LlmProviderKind::Mock,
                tool.label(),
                &mut |_: &str| {},
            ))
            .expect("turn");
    }

    let len = |tool| store.conversation(tool).map(|c| c.len()).unwrap_or_default();
    assert_eq!(len(ToolId::ThreadWriter), 4);
    assert_eq!(len(ToolId::AirdropChecker), 2);
    assert_eq!(len(ToolId::Chat), 0);
}
