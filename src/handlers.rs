/*
 * @file handlers.rs
 * @brief Built-in voice command handlers for JASP
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

//! Built-in voice commands and the session state they act on.

use std::time::Duration;

use regex::RegexBuilder;
use serde_json::Value;

use crate::commands::{Command, Outcome, Router, Rule};
use crate::config::CustomCommand;
use crate::conversation::{ConversationContext, Personalities, PersonalityKind};
use crate::device::{DeviceCommand, DeviceLink};
use crate::error::Result;
use crate::speech::Speaker;

/// Spoken once the loop is ready.
pub const GREETING: &str = "JASP inicializado. Pronto para começar.";

/// Spoken at the start of the shutdown sequence.
pub const FAREWELL: &str = "Até logo!";

/// Apology spoken by the light-on handler when the board is unavailable.
pub const LIGHT_ON_UNAVAILABLE: &str = "Não encontrei o Arduino, não consigo ligar a luz agora.";
/// Apology spoken by the light-off handler when the board is unavailable.
pub const LIGHT_OFF_UNAVAILABLE: &str =
    "Não encontrei o Arduino, não consigo desligar a luz agora.";
/// Apology spoken by the temperature handler when the board is unavailable.
pub const SENSOR_UNAVAILABLE: &str = "Não encontrei o Arduino, não consigo ler o sensor agora.";
/// Spoken when the board took the request but sent no reading in time.
pub const SENSOR_NO_READING: &str = "Não consegui ler o sensor.";
/// Apology spoken by custom device rules when the board is unavailable.
pub const DEVICE_UNAVAILABLE: &str = "Não encontrei o Arduino, não consigo fazer isso agora.";

/// Output pin of the general room light.
pub const PIN_GENERAL: u8 = 13;
/// Output pin of the test bench light.
pub const PIN_TEST: u8 = 12;

/// History entries printed by the show-history command.
const HISTORY_PREVIEW_ENTRIES: usize = 4;
const HISTORY_PREVIEW_CHARS: usize = 60;

/// Default wait for a sensor reading.
pub const SENSOR_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything a command handler may touch during a turn.
///
/// Owned by the loop and lent to one handler at a time.
pub struct Session {
    /// Link to the controller board; checked by every hardware handler.
    pub device: DeviceLink,
    /// History and active personality.
    pub context: ConversationContext,
    /// Prompt catalog used by personality switches.
    pub personalities: Personalities,
    /// Set while the formal personality is active; consulted on every chat reply.
    pub serious_mode: bool,
    /// Longest wait for a sensor reading.
    pub sensor_timeout: Duration,
    speaker: Box<dyn Speaker>,
}

impl Session {
    /// Creates a session in normal (non-serious) mode with the default
    /// personality catalog and sensor timeout.
    ///
    /// # Arguments
    /// * `device` - Link to the controller board, connected or not.
    /// * `context` - Conversation history and active personality.
    /// * `speaker` - Blocking speech sink.
    pub fn new(device: DeviceLink, context: ConversationContext, speaker: Box<dyn Speaker>) -> Self {
        Self {
            device,
            context,
            personalities: Personalities::default(),
            serious_mode: false,
            sensor_timeout: SENSOR_TIMEOUT,
            speaker,
        }
    }

    /// Replaces the prompt catalog used by personality switches.
    pub fn with_personalities(mut self, personalities: Personalities) -> Self {
        self.personalities = personalities;
        self
    }

    /// Overrides how long the temperature handler waits for a reading.
    pub fn with_sensor_timeout(mut self, timeout: Duration) -> Self {
        self.sensor_timeout = timeout;
        self
    }

    /// Sets the initial serious-mode flag.
    pub fn with_serious_mode(mut self, serious: bool) -> Self {
        self.serious_mode = serious;
        self
    }

    /// Speaks `text` to completion, logging (not propagating) speech failures.
    pub fn say(&mut self, text: &str) {
        println!("JASP: {text}");
        tracing::debug!(text, "speaking");
        if let Err(err) = self.speaker.speak(text) {
            tracing::warn!(error = %err, "speech output failed");
        }
    }

    /// Activates `kind`, resetting history and the serious-mode flag together.
    pub fn switch_personality(&mut self, kind: PersonalityKind) {
        self.context.set_personality(self.personalities.get(kind));
        self.serious_mode = kind.is_serious();
    }
}

/// Builds the router: built-in commands first, then `custom` rules.
///
/// # Details
/// Precedence: stop, clear-history, show-history, light-off, light-on,
/// temperature, casual, normal, formal, custom. Clear is ahead of show and
/// off ahead of on because each later pattern also matches the earlier
/// phrase. Invalid custom patterns are logged and skipped.
///
/// # Errors
/// Returns an error only if a built-in pattern fails to compile.
pub fn build_router(custom: &[CustomCommand]) -> Result<Router<Session>> {
    let mut router = Router::new()
        .with_rule(Rule::new(Command::Stop, r"\b(parar|sair|até logo)\b", stop)?)
        .with_rule(Rule::new(Command::ClearHistory, r"(limpar|apagar).*hist[oó]rico", clear_history)?)
        .with_rule(Rule::new(Command::ShowHistory, r"hist[oó]rico", show_history)?)
        .with_rule(Rule::new(Command::LightOff, r"desliga.*luz", light_off)?)
        .with_rule(Rule::new(Command::LightOn, r"liga.*luz", light_on)?)
        .with_rule(Rule::new(Command::ReadTemperature, r"qual.*temperatur", read_temperature)?)
        .with_rule(Rule::new(Command::CasualMode, r"modo (casual|descontra[ií]do)", casual_mode)?)
        .with_rule(Rule::new(Command::NormalMode, r"modo (normal|padr[aã]o)", normal_mode)?)
        .with_rule(Rule::new(Command::FormalMode, r"modo (formal|s[eé]rio)", formal_mode)?);
    for entry in custom {
        match custom_rule(entry) {
            Ok(rule) => router.push(rule),
            Err(err) => tracing::warn!(
                pattern = %entry.pattern,
                error = %err,
                "invalid custom command pattern, skipping"
            ),
        }
    }
    Ok(router)
}

/// Compiles a configured device rule.
///
/// # Details
/// The pattern is compiled case-insensitively exactly as written, so escapes
/// such as `\D` or `\S` keep their meaning.
///
/// # Arguments
/// * `entry` - The rule as read from the configuration file.
///
/// # Errors
/// Returns an error if the pattern is invalid.
pub fn custom_rule(entry: &CustomCommand) -> Result<Rule<Session>> {
    let command = DeviceCommand::new(entry.cmd.clone(), entry.value.clone());
    let reply = entry.reply.clone();
    let pattern = RegexBuilder::new(&entry.pattern)
        .case_insensitive(true)
        .build()?;
    Ok(Rule::from_regex(
        Command::Custom(entry.cmd.clone()),
        pattern,
        move |session: &mut Session, _: &str| {
            send_and_confirm(session, &command, &reply, DEVICE_UNAVAILABLE)
        },
    ))
}

/// Requests the shutdown sequence; the loop speaks the farewell.
///
/// # Returns
/// * `Outcome::Shutdown` - Always.
pub fn stop(_session: &mut Session, _text: &str) -> Outcome {
    Outcome::Shutdown
}

/// Turns on the light of the room named in `text` (general by default).
///
/// # Details
/// Sends `led_on` with the room pin and confirms, or speaks
/// [`LIGHT_ON_UNAVAILABLE`] without writing when the board is unavailable.
pub fn light_on(session: &mut Session, text: &str) -> Outcome {
    let command = DeviceCommand::new("led_on", room_pin(text));
    send_and_confirm(session, &command, "Luz ligada.", LIGHT_ON_UNAVAILABLE)
}

/// Turns off the light of the room named in `text`.
///
/// # Details
/// Sends `led_off` with the room pin and confirms, or speaks
/// [`LIGHT_OFF_UNAVAILABLE`] without writing when the board is unavailable.
pub fn light_off(session: &mut Session, text: &str) -> Outcome {
    let command = DeviceCommand::new("led_off", room_pin(text));
    send_and_confirm(session, &command, "Luz desligada.", LIGHT_OFF_UNAVAILABLE)
}

/// Requests a temperature reading and speaks it.
///
/// # Details
/// Lines the board sent earlier are discarded first so they are not taken
/// for the reading. Waits at most the session's sensor timeout.
pub fn read_temperature(session: &mut Session, _text: &str) -> Outcome {
    if session.device.is_connected() {
        session.device.discard_input();
    }
    if !session.device.is_connected()
        || !session.device.send(&DeviceCommand::new("read_sensor", "temperatura"))
    {
        session.say(SENSOR_UNAVAILABLE);
        return Outcome::Continue;
    }
    let timeout = session.sensor_timeout;
    let reply = match session.device.receive(timeout) {
        Some(response) => format!("A temperatura é {} graus.", spoken_value(response.get("value"))),
        None => SENSOR_NO_READING.to_string(),
    };
    session.say(&reply);
    Outcome::Continue
}

/// Prints the tail of the history and speaks its size.
pub fn show_history(session: &mut Session, _text: &str) -> Outcome {
    let history = session.context.history();
    let total = history.len();
    println!("Histórico ({total} mensagens):");
    let start = total.saturating_sub(HISTORY_PREVIEW_ENTRIES);
    for message in &history[start..] {
        let preview: String = message.content.chars().take(HISTORY_PREVIEW_CHARS).collect();
        println!("  {}: {preview}...", message.role.as_str());
    }
    session.say(&format!("O histórico tem {total} mensagens."));
    Outcome::Continue
}

/// Empties the conversation history, keeping the active personality.
pub fn clear_history(session: &mut Session, _text: &str) -> Outcome {
    session.context.clear();
    session.say("Histórico limpo.");
    Outcome::Continue
}

/// Switches to the casual personality and clears serious mode.
pub fn casual_mode(session: &mut Session, _text: &str) -> Outcome {
    session.switch_personality(PersonalityKind::Casual);
    session.say("Beleza, modo casual ativado.");
    Outcome::Continue
}

/// Switches to the normal personality and clears serious mode.
pub fn normal_mode(session: &mut Session, _text: &str) -> Outcome {
    session.switch_personality(PersonalityKind::Normal);
    session.say("Modo normal ativado.");
    Outcome::Continue
}

/// Switches to the formal personality and turns serious mode on.
pub fn formal_mode(session: &mut Session, _text: &str) -> Outcome {
    session.switch_personality(PersonalityKind::Formal);
    session.say("Modo formal ativado.");
    Outcome::Continue
}

/// Checks the link, sends `command`, and speaks the confirmation or apology.
fn send_and_confirm(
    session: &mut Session,
    command: &DeviceCommand,
    confirmation: &str,
    unavailable: &str,
) -> Outcome {
    if session.device.is_connected() && session.device.send(command) {
        session.say(confirmation);
    } else {
        session.say(unavailable);
    }
    Outcome::Continue
}

/// Maps the room named in the utterance to its light pin.
fn room_pin(text: &str) -> u8 {
    if text.contains("teste") {
        PIN_TEST
    } else {
        PIN_GENERAL
    }
}

fn spoken_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => "desconhecida".to_string(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Routed;
    use crate::conversation::Role;
    use crate::device::ConnectionState;
    use crate::test_utils::{FakeTransport, RecordingSpeaker};
    use serde_json::json;

    struct Fixture {
        session: Session,
        wire: FakeTransport,
        spoken: RecordingSpeaker,
        router: Router<Session>,
    }

    fn fixture(connected: bool) -> Fixture {
        let wire = FakeTransport::new();
        let mut device = DeviceLink::new();
        if connected {
            device.attach("fake0", wire.boxed());
        }
        let spoken = RecordingSpeaker::new();
        let context = ConversationContext::new(Personalities::default().get(PersonalityKind::Normal));
        let session = Session::new(device, context, spoken.boxed())
            .with_sensor_timeout(Duration::from_millis(50));
        let router = build_router(&[]).expect("router");
        Fixture {
            session,
            wire,
            spoken,
            router,
        }
    }

    impl Fixture {
        fn route(&mut self, text: &str) -> Option<Routed> {
            self.router.route(&mut self.session, text)
        }
    }

    #[test]
    fn light_on_sends_pin_frame() {
        let mut f = fixture(true);
        let routed = f.route("pode ligar a luz geral").expect("routed");
        assert_eq!(routed.command, Command::LightOn);
        assert_eq!(f.wire.written(), vec!["{\"cmd\":\"led_on\",\"value\":13}\n"]);
        assert_eq!(f.spoken.lines(), vec!["Luz ligada."]);
    }

    #[test]
    fn light_off_wins_over_light_on() {
        let mut f = fixture(true);
        let routed = f.route("desliga a luz de teste").expect("routed");
        assert_eq!(routed.command, Command::LightOff);
        assert_eq!(f.wire.written(), vec!["{\"cmd\":\"led_off\",\"value\":12}\n"]);
    }

    #[test]
    fn hardware_commands_apologize_when_disconnected() {
        let mut f = fixture(false);
        f.route("pode ligar a luz geral");
        f.route("desliga a luz");
        f.route("qual a temperatura");
        assert_eq!(f.wire.write_attempts(), 0);
        assert_eq!(
            f.spoken.lines(),
            vec![LIGHT_ON_UNAVAILABLE, LIGHT_OFF_UNAVAILABLE, SENSOR_UNAVAILABLE]
        );
    }

    #[test]
    fn lost_link_degrades_following_commands() {
        let mut f = fixture(true);
        f.wire.fail_writes();
        f.route("liga a luz");
        assert_eq!(f.session.device.state(), ConnectionState::Disconnected);
        f.route("liga a luz");
        assert_eq!(f.wire.write_attempts(), 1);
        assert_eq!(f.spoken.lines(), vec![LIGHT_ON_UNAVAILABLE, LIGHT_ON_UNAVAILABLE]);
    }

    #[test]
    fn temperature_reading_is_spoken() {
        let mut f = fixture(true);
        f.wire.reply_on_write("{\"value\": 23.5}");
        let routed = f.route("qual a temperatura").expect("routed");
        assert_eq!(routed.command, Command::ReadTemperature);
        assert_eq!(
            f.wire.written(),
            vec!["{\"cmd\":\"read_sensor\",\"value\":\"temperatura\"}\n"]
        );
        let spoken = f.spoken.lines();
        assert!(spoken[0].contains("23.5"), "spoken: {spoken:?}");
    }

    #[test]
    fn raw_sensor_reply_reads_as_unknown() {
        let mut f = fixture(true);
        f.wire.reply_on_write("sensor offline");
        f.route("qual a temperatura agora");
        assert_eq!(f.spoken.lines(), vec!["A temperatura é desconhecida graus."]);
    }

    #[test]
    fn stale_board_output_is_not_taken_for_the_reading() {
        let mut f = fixture(true);
        f.wire.push_response("JASP firmware pronto");
        f.wire.reply_on_write("{\"value\": 21}");
        f.route("qual a temperatura");
        assert_eq!(f.spoken.lines(), vec!["A temperatura é 21 graus."]);
        assert!(f.session.device.is_connected());
    }

    #[test]
    fn silent_sensor_reports_no_reading() {
        let mut f = fixture(true);
        f.route("qual a temperatura");
        assert_eq!(f.spoken.lines(), vec![SENSOR_NO_READING]);
        assert!(f.session.device.is_connected());
    }

    #[test]
    fn clear_history_empties_and_keeps_personality() {
        let mut f = fixture(false);
        f.session.context.append(Role::User, "oi");
        f.session.context.append(Role::Assistant, "olá");
        let routed = f.route("limpar histórico").expect("routed");
        assert_eq!(routed.command, Command::ClearHistory);
        assert!(f.session.context.is_empty());
        assert_eq!(f.session.context.personality().name, "normal");
        assert_eq!(f.spoken.lines(), vec!["Histórico limpo."]);
    }

    #[test]
    fn show_history_speaks_count() {
        let mut f = fixture(false);
        f.session.context.append(Role::User, "oi");
        f.session.context.append(Role::Assistant, "olá");
        let routed = f.route("mostra o histórico").expect("routed");
        assert_eq!(routed.command, Command::ShowHistory);
        assert_eq!(f.session.context.len(), 2);
        assert_eq!(f.spoken.lines(), vec!["O histórico tem 2 mensagens."]);
    }

    #[test]
    fn personality_switch_resets_history_and_serious_flag() {
        let mut f = fixture(false);
        f.session.context.append(Role::User, "oi");
        f.route("entrar no modo formal");
        assert_eq!(f.session.context.personality().name, "formal");
        assert!(f.session.context.is_empty());
        assert!(f.session.serious_mode);

        f.route("modo casual");
        assert_eq!(f.session.context.personality().name, "casual");
        assert!(!f.session.serious_mode);

        f.route("volta pro modo normal");
        assert_eq!(f.session.context.personality().name, "normal");
    }

    #[test]
    fn stop_phrases_request_shutdown() {
        let mut f = fixture(false);
        for phrase in ["parar", "quero sair", "até logo, jasp"] {
            let routed = f.route(phrase).expect("routed");
            assert_eq!(routed.outcome, Outcome::Shutdown, "phrase: {phrase}");
        }
        assert!(f.spoken.lines().is_empty());
    }

    #[test]
    fn chat_questions_fall_through() {
        let mut f = fixture(true);
        assert!(f.route("como funciona um transistor?").is_none());
        assert!(f.spoken.lines().is_empty());
        assert!(f.wire.written().is_empty());
    }

    #[test]
    fn custom_rules_follow_builtins() {
        let custom = vec![
            CustomCommand {
                pattern: "liga.*ventilador".into(),
                cmd: "fan_on".into(),
                value: json!(5),
                reply: "Ventilador ligado.".into(),
            },
            CustomCommand {
                pattern: "(".into(),
                cmd: "broken".into(),
                value: Value::Null,
                reply: String::new(),
            },
        ];
        let mut f = fixture(true);
        f.router = build_router(&custom).expect("router");
        assert_eq!(f.router.len(), 10);

        let routed = f.route("liga o ventilador").expect("routed");
        assert_eq!(routed.command, Command::Custom("fan_on".into()));
        assert_eq!(f.wire.written(), vec!["{\"cmd\":\"fan_on\",\"value\":5}\n"]);
        assert_eq!(f.spoken.lines(), vec!["Ventilador ligado."]);

        // Built-ins keep precedence over a custom rule matching the same phrase.
        assert_eq!(f.router.match_command("liga a luz do ventilador"), Some(&Command::LightOn));
    }

    #[test]
    fn custom_pattern_keeps_uppercase_escapes() {
        let custom = vec![CustomCommand {
            pattern: r"aciona\D+bomba".into(),
            cmd: "pump_on".into(),
            value: Value::Null,
            reply: "Bomba acionada.".into(),
        }];
        let mut f = fixture(true);
        f.router = build_router(&custom).expect("router");

        assert_eq!(f.router.match_command("aciona 3 bomba"), None);
        let routed = f.route("Aciona a Bomba").expect("routed");
        assert_eq!(routed.command, Command::Custom("pump_on".into()));
        assert_eq!(f.wire.written(), vec!["{\"cmd\":\"pump_on\",\"value\":null}\n"]);
        assert_eq!(f.spoken.lines(), vec!["Bomba acionada."]);
    }

    #[test]
    fn custom_pattern_matches_regardless_of_case() {
        let rule = custom_rule(&CustomCommand {
            pattern: "LIGA.*Ventilador".into(),
            cmd: "fan_on".into(),
            value: Value::Null,
            reply: String::new(),
        })
        .expect("rule");
        assert!(rule.matches("liga o ventilador"));
        assert_eq!(rule.pattern(), "LIGA.*Ventilador");
    }
}
