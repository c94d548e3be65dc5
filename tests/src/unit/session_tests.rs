use futures::StreamExt;
use neonops::{parse_line, run_repl, ChatSession, Interrupts, ReplCommand};
use neonops_core::{
    AppConfig, ChatMessage, Dispatcher, LlmProviderKind, ProviderAdapter, ScriptedReply,
    ScriptedTransport, SwitchPolicy, TokenEvent, TokenStream, ToolId, TurnController,
    TurnOutcome,
};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

fn test_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

fn session(config: &AppConfig, transport: &ScriptedTransport) -> ChatSession {
    let dispatcher = Dispatcher::with_transport(config, Arc::new(transport.clone()));
    ChatSession::new(TurnController::new(dispatcher), config)
}

fn run(
    runtime: &tokio::runtime::Runtime,
    session: &mut ChatSession,
    line: &str,
) -> (bool, String) {
    let mut out = Vec::new();
    let command = parse_line(line).expect("command");
    let keep_going = runtime
        .block_on(session.handle(command, &mut out))
        .expect("handle");
    (keep_going, String::from_utf8(out).expect("utf8"))
}

#[test]
fn streams_reply_to_output() {
    let runtime = test_runtime();
    let transport = ScriptedTransport::new().with_reply(ScriptedReply::chunks([
        "data: {\"choices\":[{\"delta\":{\"content\":\"Looks \"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"risky.\"}}]}\n\ndata: [DONE]\n\n",
    ]));
    let mut config = AppConfig::default();
    config.provider = LlmProviderKind::DeepSeek;
    config
        .apply_overrides(|name| (name == "DEEPSEEK_API_KEY").then(|| "sk-ds".to_string()))
        .expect("overrides");
    let mut session = session(&config, &transport);

    let (keep_going, output) = run(&runtime, &mut session, "is this token legit?");

    assert!(keep_going);
    assert_eq!(output, "Looks risky.\n");
    assert_eq!(transport.call_count(), 1);
    let conversation = session.store().active_conversation().expect("conversation");
    assert_eq!(conversation.len(), 2);
    assert_eq!(conversation.messages()[1].content, "Looks risky.");
}

#[test]
fn missing_credential_prints_diagnostic_without_network() {
    let runtime = test_runtime();
    let transport = ScriptedTransport::new();
    let mut config = AppConfig::default();
    config.provider = LlmProviderKind::Claude;
    let mut session = session(&config, &transport);

    let mut out = Vec::new();
    let outcome = runtime
        .block_on(session.submit("hello", &mut out))
        .expect("submit");

    assert_eq!(
        outcome,
        TurnOutcome::Failed("missing credential for Claude".into())
    );
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "\n⚠ missing credential for Claude\n"
    );
    assert_eq!(transport.call_count(), 0);
    assert_eq!(
        session.store().active_conversation().map(|c| c.len()),
        Some(2)
    );
}

#[test]
fn commands_switch_tool_and_provider() {
    let runtime = test_runtime();
    let transport = ScriptedTransport::new();
    let mut config = AppConfig::default();
    config.switch_policy = SwitchPolicy::Clear;
    let mut session = session(&config, &transport);

    let (_, output) = run(&runtime, &mut session, "/provider mock");
    assert_eq!(output, "Using Mock.\n");
    assert_eq!(session.provider(), LlmProviderKind::Mock);

    run(&runtime, &mut session, "gm");
    let (_, history) = run(&runtime, &mut session, "/history");
    assert!(history.contains("You ·"));
    assert!(history.contains("NeonOps ·"));

    let (_, output) = run(&runtime, &mut session, "/tool tokenomics-review");
    assert_eq!(output, "Switched to Tokenomics Review (0 messages).\n");
    assert_eq!(session.store().active_tool(), ToolId::TokenomicsReview);
    assert!(session
        .store()
        .conversation(ToolId::Chat)
        .expect("chat")
        .is_empty());

    let (keep_going, _) = run(&runtime, &mut session, "/quit");
    assert!(!keep_going);
}

#[test]
fn switching_to_unconfigured_provider_warns() {
    let runtime = test_runtime();
    let mut session = session(&AppConfig::default(), &ScriptedTransport::new());
    let (_, output) = run(&runtime, &mut session, "/provider openai");
    assert!(output.starts_with("⚠ no credential configured for OpenAI"));
    assert!(output.ends_with("Using OpenAI.\n"));
    assert_eq!(parse_line("/help").unwrap(), ReplCommand::Help);
}

/// Streams one delta, then waits forever.
struct StallingAdapter;

impl ProviderAdapter for StallingAdapter {
    fn kind(&self) -> LlmProviderKind {
        LlmProviderKind::DeepSeek
    }

    fn stream(&self, _: &str, _: &[ChatMessage], _: &str) -> TokenStream {
        futures::stream::iter([TokenEvent::TextDelta("thinking".into())])
            .chain(futures::stream::pending())
            .boxed()
    }
}

fn stalling_session() -> ChatSession {
    let mut config = AppConfig::default();
    config.provider = LlmProviderKind::DeepSeek;
    config
        .apply_overrides(|name| (name == "DEEPSEEK_API_KEY").then(|| "sk-ds".to_string()))
        .expect("overrides");
    let mut dispatcher = Dispatcher::with_transport(&config, Arc::new(ScriptedTransport::new()));
    dispatcher.adapters_mut().replace(Arc::new(StallingAdapter));
    ChatSession::new(TurnController::new(dispatcher), &config)
}

#[test]
fn interrupt_cancels_the_streaming_turn_only() {
    let runtime = test_runtime();
    let mut session = stalling_session();
    let (tx, rx) = mpsc::unbounded_channel();
    let mut interrupts = Interrupts::from_channel(rx);
    tx.send(()).expect("queue interrupt");
    let mut out = Vec::new();

    runtime.block_on(async {
        let (mut terminal, input) = tokio::io::duplex(256);
        terminal.write_all(b"hello\n").await.expect("type line");
        drop(terminal);
        run_repl(&mut session, BufReader::new(input), &mut out, &mut interrupts)
            .await
            .expect("repl");
    });

    let output = String::from_utf8(out).expect("utf8");
    assert!(output.contains("thinking\n⚠ cancelled\n"), "{output}");
    let conversation = session.store().active_conversation().expect("conversation");
    assert_eq!(conversation.len(), 2);
    assert!(conversation.messages()[1].diagnostic);
}

#[test]
fn interrupt_at_the_prompt_ends_the_session() {
    let runtime = test_runtime();
    let mut session = stalling_session();
    let (tx, rx) = mpsc::unbounded_channel();
    let mut interrupts = Interrupts::from_channel(rx);
    tx.send(()).expect("queue interrupt");
    let mut out = Vec::new();

    runtime.block_on(async {
        // The terminal stays open but idle, so only the interrupt can end the loop.
        let (_terminal, input) = tokio::io::duplex(256);
        run_repl(&mut session, BufReader::new(input), &mut out, &mut interrupts)
            .await
            .expect("repl");
    });

    assert_eq!(String::from_utf8(out).expect("utf8"), "[chat · deepseek] > \n");
    assert!(session
        .store()
        .active_conversation()
        .expect("conversation")
        .is_empty());
}
