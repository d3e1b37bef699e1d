/*
 * @file assistant.rs
 * @brief Turn-taking loop for JASP
 * @author Kevin Thomas
 * @date 2025
 *
 * MIT License
 *
 * Copyright (c) 2025 Kevin Thomas
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

//! Voice assistant orchestration loop.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::chat::{complete, complete_with_context, ChatBackend};
use crate::commands::{Outcome, Router};
use crate::handlers::{Session, FAREWELL, GREETING};
use crate::listener::{Heard, Listener};
use crate::retrieval::{needs_retrieval, retrieve_or_sentinel, Retriever};

/// Recognized text shorter than this (in characters) is treated as noise.
pub const MIN_UTTERANCE_CHARS: usize = 2;

/// Pause after a failed listen before trying again.
pub const LISTEN_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Operator abort signal; resolves once when the loop should stop.
pub type Interrupt = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Where the loop is in its turn cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    /// Before the first listen.
    Idle,
    /// Waiting for the next utterance.
    Listening,
    /// Matching the utterance against the command table.
    Routing,
    /// Producing and speaking a chat reply.
    Responding,
    /// Farewell and resource release; terminal.
    ShuttingDown,
}

/// Runtime container that owns every collaborator of the turn cycle.
///
/// # Details
/// One turn is strictly listen → route → respond. Speaking blocks, so the
/// next listen never starts while output is still playing. Nothing raised
/// inside a turn ends the loop; only a stop command, a closed input, or the
/// interrupt does.
pub struct Assistant {
    session: Session,
    router: Router<Session>,
    backend: Box<dyn ChatBackend>,
    retriever: Option<Box<dyn Retriever>>,
    listener: Box<dyn Listener>,
    serious_prefix: String,
    state: LoopState,
}

/// Waits [`LISTEN_RETRY_DELAY`] unless the interrupt fires first.
async fn back_off(interrupt: &mut Interrupt) -> Outcome {
    tokio::select! {
        biased;
        () = interrupt => {
            tracing::info!("interrupt received");
            Outcome::Shutdown
        }
        () = tokio::time::sleep(LISTEN_RETRY_DELAY) => Outcome::Continue,
    }
}

impl Assistant {
    /// Creates an idle runtime.
    ///
    /// # Arguments
    /// * `session` - Device link, conversation and speech sink.
    /// * `router` - Local command table.
    /// * `backend` - Chat completion service for unmatched utterances.
    /// * `listener` - Source of recognized utterances.
    pub fn new(
        session: Session,
        router: Router<Session>,
        backend: Box<dyn ChatBackend>,
        listener: Box<dyn Listener>,
    ) -> Self {
        Self {
            session,
            router,
            backend,
            retriever: None,
            listener,
            serious_prefix: String::new(),
            state: LoopState::Idle,
        }
    }

    /// Enables web augmentation for time-sensitive questions.
    pub fn with_retriever(mut self, retriever: Box<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Text spoken before chat answers while serious mode is on.
    pub fn with_serious_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.serious_prefix = prefix.into();
        self
    }

    /// Current position in the turn cycle.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// State shared with the command handlers.
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Runs turns until a stop command, closed input, or `interrupt`.
    ///
    /// # Details
    /// The interrupt is only observed while waiting for speech, never in the
    /// middle of routing or speaking. Always ends with the shutdown sequence.
    pub async fn run(mut self, mut interrupt: Interrupt) {
        self.startup();
        loop {
            self.state = LoopState::Listening;
            let heard = tokio::select! {
                biased;
                () = &mut interrupt => None,
                heard = self.listener.listen() => Some(heard),
            };
            let outcome = match heard {
                None => {
                    tracing::info!("interrupt received");
                    Outcome::Shutdown
                }
                Some(Ok(Heard::Utterance(text))) => self.handle_utterance(&text).await,
                Some(Ok(Heard::Nothing)) => Outcome::Continue,
                Some(Ok(Heard::Closed)) => {
                    tracing::info!("input closed");
                    Outcome::Shutdown
                }
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "listen failed, retrying");
                    back_off(&mut interrupt).await
                }
            };
            if outcome == Outcome::Shutdown {
                break;
            }
        }
        self.shutdown();
    }

    /// Processes one recognized utterance.
    ///
    /// # Details
    /// Short results are dropped as noise. A matching local command handles
    /// (and speaks) the turn itself; anything else goes to the chat backend,
    /// with a web lookup first when the question looks time-sensitive.
    ///
    /// # Returns
    /// * `Outcome::Shutdown` when a stop command matched, else `Outcome::Continue`.
    pub async fn handle_utterance(&mut self, text: &str) -> Outcome {
        let text = text.trim();
        if text.chars().count() < MIN_UTTERANCE_CHARS {
            tracing::debug!(text, "discarding noise");
            self.state = LoopState::Listening;
            return Outcome::Continue;
        }
        println!("Você: {text}");
        tracing::info!(text, "heard");

        self.state = LoopState::Routing;
        if let Some(routed) = self.router.route(&mut self.session, text) {
            if routed.outcome == Outcome::Continue {
                self.state = LoopState::Listening;
            }
            return routed.outcome;
        }

        self.state = LoopState::Responding;
        let reply = self.chat(text).await;
        let reply = self.decorate(reply);
        self.session.say(&reply);
        self.state = LoopState::Listening;
        Outcome::Continue
    }

    async fn chat(&mut self, text: &str) -> String {
        let backend = self.backend.as_ref();
        let context = &mut self.session.context;
        match &self.retriever {
            Some(retriever) if needs_retrieval(text) => {
                tracing::info!("question looks time-sensitive, consulting the web");
                let found = retrieve_or_sentinel(retriever.as_ref(), text).await;
                complete_with_context(backend, context, text, &found).await
            }
            _ => complete(backend, context, text).await,
        }
    }

    /// Applies the serious-mode prefix; consulted on every chat reply.
    fn decorate(&self, reply: String) -> String {
        if self.session.serious_mode && !self.serious_prefix.is_empty() {
            format!("{} {reply}", self.serious_prefix)
        } else {
            reply
        }
    }

    fn startup(&mut self) {
        self.state = LoopState::Idle;
        if !self.session.device.is_connected() {
            tracing::warn!(
                cause = self.session.device.last_error().unwrap_or("not attempted"),
                "controller board unavailable, continuing with voice only"
            );
        }
        self.session.say(GREETING);
    }

    /// Farewell, release the recognizer, release the device, in that order.
    fn shutdown(&mut self) {
        self.state = LoopState::ShuttingDown;
        tracing::info!("shutting down");
        self.session.say(FAREWELL);
        self.listener.stop();
        self.session.device.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{OllamaBackend, APOLOGY, DEFAULT_MODEL};
    use crate::conversation::{ConversationContext, Personalities, PersonalityKind, Role};
    use crate::device::{ConnectionState, DeviceLink};
    use crate::handlers::{build_router, LIGHT_ON_UNAVAILABLE};
    use crate::retrieval::NOTHING_FOUND;
    use crate::test_utils::{
        FakeTransport, RecordingSpeaker, ScriptedListener, StaticBackend, StaticRetriever,
    };
    use std::sync::atomic::Ordering;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        wire: FakeTransport,
        spoken: RecordingSpeaker,
    }

    fn session(connected: bool) -> (Session, Harness) {
        let wire = FakeTransport::new();
        let mut device = DeviceLink::new();
        if connected {
            device.attach("fake0", wire.boxed());
        }
        let spoken = RecordingSpeaker::new();
        let context = ConversationContext::new(Personalities::default().get(PersonalityKind::Normal));
        let session = Session::new(device, context, spoken.boxed());
        (session, Harness { wire, spoken })
    }

    fn assistant(
        session: Session,
        backend: Box<dyn ChatBackend>,
        listener: ScriptedListener,
    ) -> Assistant {
        let router = build_router(&[]).expect("router");
        Assistant::new(session, router, backend, Box::new(listener))
    }

    fn never() -> Interrupt {
        Box::pin(std::future::pending())
    }

    #[tokio::test]
    async fn run_greets_handles_commands_and_shuts_down_in_order() {
        let (session, h) = session(true);
        let listener = ScriptedListener::new(["liga a luz", "parar", "liga a luz"]);
        let stopped = listener.stopped_flag();
        let backend = StaticBackend::replying("não usado");

        assistant(session, Box::new(backend.clone()), listener)
            .run(never())
            .await;

        assert_eq!(h.spoken.lines(), vec![GREETING, "Luz ligada.", FAREWELL]);
        assert_eq!(h.wire.written().len(), 1);
        assert!(stopped.load(Ordering::SeqCst));
        assert!(backend.windows().is_empty());
    }

    #[tokio::test]
    async fn shutdown_closes_device() {
        let (session, h) = session(true);
        let mut assistant = assistant(
            session,
            Box::new(StaticBackend::replying("ok")),
            ScriptedListener::new(Vec::<String>::new()),
        );
        assistant.shutdown();
        assert_eq!(assistant.state(), LoopState::ShuttingDown);
        assert_eq!(assistant.session().device.state(), ConnectionState::Disconnected);
        assert_eq!(h.spoken.lines(), vec![FAREWELL]);
    }

    #[tokio::test]
    async fn interrupt_triggers_farewell_while_listening() {
        let (session, h) = session(false);
        let listener = ScriptedListener::hanging();
        let stopped = listener.stopped_flag();

        assistant(session, Box::new(StaticBackend::replying("ok")), listener)
            .run(Box::pin(async {}))
            .await;

        assert_eq!(h.spoken.lines(), vec![GREETING, FAREWELL]);
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failing_listener_backs_off_until_interrupted() {
        let (session, h) = session(true);
        let listener = ScriptedListener::failing();
        let attempts = listener.attempts();
        let stopped = listener.stopped_flag();

        let run = assistant(session, Box::new(StaticBackend::replying("ok")), listener)
            .run(Box::pin(tokio::time::sleep(Duration::from_millis(200))));
        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("loop should stop on interrupt");

        assert_eq!(h.spoken.lines(), vec![GREETING, FAREWELL]);
        assert!(stopped.load(Ordering::SeqCst));
        let attempts = attempts.load(Ordering::SeqCst);
        assert!((1..=2).contains(&attempts), "attempts: {attempts}");
    }

    #[tokio::test]
    async fn noise_is_ignored() {
        let (session, h) = session(false);
        let backend = StaticBackend::replying("ok");
        let mut assistant = assistant(
            session,
            Box::new(backend.clone()),
            ScriptedListener::new(Vec::<String>::new()),
        );

        assert_eq!(assistant.handle_utterance(" a ").await, Outcome::Continue);
        assert_eq!(assistant.handle_utterance("").await, Outcome::Continue);
        assert_eq!(assistant.state(), LoopState::Listening);
        assert!(backend.windows().is_empty());
        assert!(h.spoken.lines().is_empty());
    }

    #[tokio::test]
    async fn unmatched_utterance_goes_to_chat() {
        let (session, h) = session(false);
        let backend = StaticBackend::replying("Um transistor amplifica sinais.");
        let mut assistant = assistant(
            session,
            Box::new(backend.clone()),
            ScriptedListener::new(Vec::<String>::new()),
        );

        let outcome = assistant.handle_utterance("como funciona um transistor").await;

        assert_eq!(outcome, Outcome::Continue);
        assert_eq!(h.spoken.lines(), vec!["Um transistor amplifica sinais."]);
        let windows = backend.windows();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0][0].role, Role::System);
        assert_eq!(windows[0][1].content, "como funciona um transistor");
        assert_eq!(assistant.session().context.len(), 2);
        assert_eq!(assistant.state(), LoopState::Listening);
    }

    #[tokio::test]
    async fn disconnected_light_command_apologizes_without_chat() {
        let (session, h) = session(false);
        let backend = StaticBackend::replying("ok");
        let mut assistant = assistant(
            session,
            Box::new(backend.clone()),
            ScriptedListener::new(Vec::<String>::new()),
        );

        assistant.handle_utterance("pode ligar a luz geral").await;

        assert_eq!(h.spoken.lines(), vec![LIGHT_ON_UNAVAILABLE]);
        assert_eq!(h.wire.write_attempts(), 0);
        assert!(backend.windows().is_empty());
    }

    #[tokio::test]
    async fn topical_question_uses_retrieved_context() {
        let (session, _h) = session(false);
        let backend = StaticBackend::replying("Sol o dia todo.");
        let mut assistant = assistant(
            session,
            Box::new(backend.clone()),
            ScriptedListener::new(Vec::<String>::new()),
        )
        .with_retriever(Box::new(StaticRetriever(Some("Céu limpo em São Paulo.".into()))));

        assistant.handle_utterance("qual a previsão do tempo hoje").await;

        let windows = backend.windows();
        let sent = &windows[0].last().expect("user message").content;
        assert!(sent.contains("Céu limpo em São Paulo."));
        assert!(sent.contains("qual a previsão do tempo hoje"));
    }

    #[tokio::test]
    async fn empty_lookup_sends_sentinel() {
        let (session, _h) = session(false);
        let backend = StaticBackend::replying("Não sei.");
        let mut assistant = assistant(
            session,
            Box::new(backend.clone()),
            ScriptedListener::new(Vec::<String>::new()),
        )
        .with_retriever(Box::new(StaticRetriever(None)));

        assistant.handle_utterance("alguma notícia agora?").await;

        let windows = backend.windows();
        assert!(windows[0].last().expect("user message").content.contains(NOTHING_FOUND));
    }

    #[tokio::test]
    async fn backend_failure_speaks_apology_and_keeps_listening() {
        let (session, h) = session(false);
        let mut assistant = assistant(
            session,
            Box::new(StaticBackend::failing()),
            ScriptedListener::new(Vec::<String>::new()),
        );

        assert_eq!(assistant.handle_utterance("me explica PWM").await, Outcome::Continue);
        assert_eq!(h.spoken.lines(), vec![APOLOGY]);
        assert_eq!(assistant.state(), LoopState::Listening);
    }

    #[tokio::test]
    async fn backend_timeout_speaks_apology() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;
        let backend = OllamaBackend::new(&server.uri(), DEFAULT_MODEL, 0.7, Duration::from_millis(200))
            .unwrap_or_else(|e| panic!("backend: {e}"));

        let (session, h) = session(false);
        let mut assistant = assistant(
            session,
            Box::new(backend),
            ScriptedListener::new(Vec::<String>::new()),
        );

        assert_eq!(assistant.handle_utterance("me explica PWM").await, Outcome::Continue);
        assert_eq!(h.spoken.lines(), vec![APOLOGY]);
        assert_eq!(assistant.state(), LoopState::Listening);
    }

    #[tokio::test]
    async fn serious_mode_prefixes_chat_replies() {
        let (session, h) = session(false);
        let backend = StaticBackend::replying("Use um resistor de 220 ohms.");
        let mut assistant = assistant(
            session,
            Box::new(backend.clone()),
            ScriptedListener::new(Vec::<String>::new()),
        )
        .with_serious_prefix("Certo.");

        assistant.handle_utterance("ativar modo formal").await;
        assert!(assistant.session().serious_mode);
        assistant.handle_utterance("que resistor uso no led").await;
        assistant.handle_utterance("modo casual").await;
        assistant.handle_utterance("e para dois leds").await;

        let spoken = h.spoken.lines();
        assert_eq!(spoken[1], "Certo. Use um resistor de 220 ohms.");
        assert_eq!(spoken[3], "Use um resistor de 220 ohms.");
    }

    #[tokio::test]
    async fn stop_command_returns_shutdown_outcome() {
        let (session, _h) = session(false);
        let mut assistant = assistant(
            session,
            Box::new(StaticBackend::replying("ok")),
            ScriptedListener::new(Vec::<String>::new()),
        );
        assert_eq!(assistant.handle_utterance("pode parar").await, Outcome::Shutdown);
        assert_eq!(assistant.state(), LoopState::Routing);
    }
}
