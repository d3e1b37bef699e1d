/*
 * @file commands.rs
 * @brief Ordered voice command routing for JASP
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

//! Ordered command routing for recognized utterances.

use std::fmt;

use regex::Regex;

use crate::error::Result;

/// Tag identifying which rule handled an utterance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Stop,
    ClearHistory,
    ShowHistory,
    LightOff,
    LightOn,
    ReadTemperature,
    CasualMode,
    NormalMode,
    FormalMode,
    /// A device rule loaded from the configuration file.
    Custom(String),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(name) => write!(f, "custom:{name}"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// What the loop should do after a handler ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Go back to listening.
    Continue,
    /// Enter the shutdown sequence.
    Shutdown,
}

/// Result of a successful [`Router::route`].
///
/// # Details
/// Reports which rule fired and what the loop should do next. The handler
/// has already spoken its own response by the time this is returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Routed {
    /// Tag of the rule that handled the utterance.
    pub command: Command,
    /// Whether the loop continues or shuts down.
    pub outcome: Outcome,
}

/// Side-effecting handler over the router's context `C`.
///
/// Handlers receive the normalized (lower-cased) utterance and speak their
/// own response.
pub type Handler<C> = Box<dyn Fn(&mut C, &str) -> Outcome + Send + Sync>;

/// One tagged pattern → handler mapping.
pub struct Rule<C> {
    command: Command,
    pattern: Regex,
    handler: Handler<C>,
}

impl<C> Rule<C> {
    /// Compiles a rule.
    ///
    /// # Arguments
    /// * `command` - Tag reported when this rule fires.
    /// * `pattern` - Regular expression searched (not fully matched) in the
    ///   lower-cased utterance.
    /// * `handler` - Action to run on match.
    ///
    /// # Errors
    /// Returns an error if `pattern` is not a valid regular expression.
    pub fn new<F>(command: Command, pattern: &str, handler: F) -> Result<Self>
    where
        F: Fn(&mut C, &str) -> Outcome + Send + Sync + 'static,
    {
        Ok(Self::from_regex(command, Regex::new(pattern)?, handler))
    }

    /// Builds a rule from an already compiled expression.
    ///
    /// # Details
    /// Used when the expression needs builder flags, e.g. case-insensitive
    /// matching for patterns written by users.
    ///
    /// # Arguments
    /// * `command` - Tag reported when this rule fires.
    /// * `pattern` - Expression searched in the lower-cased utterance.
    /// * `handler` - Action to run on match.
    pub fn from_regex<F>(command: Command, pattern: Regex, handler: F) -> Self
    where
        F: Fn(&mut C, &str) -> Outcome + Send + Sync + 'static,
    {
        Self {
            command,
            pattern,
            handler: Box::new(handler),
        }
    }

    /// Tag reported when this rule fires.
    ///
    /// # Returns
    /// * `&Command` - The rule's command tag.
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Source text of the rule's expression.
    ///
    /// # Returns
    /// * `&str` - The pattern as compiled.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Partial-containment test against an already normalized utterance.
    pub fn matches(&self, normalized: &str) -> bool {
        self.pattern.is_match(normalized)
    }
}

/// Ordered rule table; the first matching rule wins.
///
/// # Details
/// Patterns may overlap ("desliga a luz" contains "liga a luz"), so table
/// order is the precedence contract. Rules are only ever appended.
pub struct Router<C> {
    rules: Vec<Rule<C>>,
}

impl<C> Default for Router<C> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<C> Router<C> {
    /// Creates an empty table; every utterance falls through until rules are added.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule at the lowest precedence.
    pub fn push(&mut self, rule: Rule<C>) {
        self.rules.push(rule);
    }

    /// Builder form of [`Router::push`].
    pub fn with_rule(mut self, rule: Rule<C>) -> Self {
        self.push(rule);
        self
    }

    /// Number of rules in the table.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule tags in precedence order.
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.rules.iter().map(Rule::command)
    }

    /// Finds the rule that would handle `utterance`, without running it.
    pub fn match_command(&self, utterance: &str) -> Option<&Command> {
        let normalized = normalize(utterance);
        self.find(&normalized).map(Rule::command)
    }

    /// Dispatches `utterance` to the first matching rule.
    ///
    /// # Arguments
    /// * `ctx` - State the handler acts on.
    /// * `utterance` - Raw recognized text.
    ///
    /// # Returns
    /// * `Some(Routed)` - Exactly one handler ran.
    /// * `None` - No rule matched; the caller should fall through to chat.
    pub fn route(&self, ctx: &mut C, utterance: &str) -> Option<Routed> {
        let normalized = normalize(utterance);
        let rule = self.find(&normalized)?;
        tracing::info!(command = %rule.command, "routing to local command");
        let outcome = (rule.handler)(ctx, &normalized);
        Some(Routed {
            command: rule.command.clone(),
            outcome,
        })
    }

    fn find(&self, normalized: &str) -> Option<&Rule<C>> {
        self.rules.iter().find(|rule| rule.matches(normalized))
    }
}

/// Lower-cases and trims an utterance for matching.
pub fn normalize(utterance: &str) -> String {
    utterance.trim().to_lowercase()
}
