//! Persona library: the scripted voice of the relay.
//!
//! A persona carries the system instruction sent to the remote model, the
//! fixed texts shown for commands and notices, and the fallback replies used
//! when the remote model is unavailable. Fallback replies are grouped into
//! keyword topics; the first topic with a matching keyword wins, otherwise a
//! reply is drawn from the generic set.

use crate::error::PersonaError;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Used if a persona somehow reaches selection with nothing to say.
const LAST_RESORT_REPLY: &str = "Small wahala dey here. Try again later.";

/// A group of fallback replies selected by keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    /// Name used in logs.
    pub name: String,
    /// Lowercase keywords. Single words match whole words of the input;
    /// phrases containing a space match as substrings.
    pub keywords: Vec<String>,
    /// Candidate replies.
    pub replies: Vec<String>,
}

impl Topic {
    fn matches(&self, lowered: &str, words: &[&str]) -> bool {
        self.keywords.iter().any(|keyword| {
            let keyword = keyword.trim().to_lowercase();
            if keyword.contains(' ') {
                lowered.contains(&keyword)
            } else {
                words.iter().any(|w| *w == keyword)
            }
        })
    }
}

/// The scripted persona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    /// Display name.
    pub name: String,
    /// Instruction prepended to every remote request.
    pub system_prompt: String,
    /// Sent on `/start`. `{name}` is replaced by the user's first name.
    pub welcome: String,
    /// Sent on `/help`.
    pub help: String,
    /// Sent after `/clear` or `/reset`.
    pub cleared: String,
    /// Sent on `/status`. `{turns}` and `{time}` are substituted.
    pub status: String,
    /// Sent when a user exceeds the rate limit.
    pub rate_limited: String,
    /// Sent when the remote provider reports a billing or credential failure.
    pub service_unavailable: String,
    /// Sent when handling a message failed unexpectedly.
    pub unexpected_error: String,
    /// Keyword topics, checked in order.
    #[serde(default)]
    pub topics: Vec<Topic>,
    /// Replies used when no topic matches.
    pub generic: Vec<String>,
}

impl Persona {
    /// Loads a persona from a JSON file and validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PersonaError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| PersonaError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&raw)
    }

    /// Parses a persona from JSON text and validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid persona.
    pub fn from_json(raw: &str) -> Result<Self, PersonaError> {
        let persona: Self = serde_json::from_str(raw).map_err(|e| PersonaError::ParseFailed {
            reason: e.to_string(),
        })?;
        persona.validate()?;
        Ok(persona)
    }

    /// Checks that every selection path has at least one reply and that no
    /// reply is blank.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` naming the first empty set found.
    pub fn validate(&self) -> Result<(), PersonaError> {
        if self.generic.is_empty() {
            return Err(PersonaError::Invalid {
                reason: "generic reply set is empty".to_string(),
            });
        }
        if self.generic.iter().any(|r| r.trim().is_empty()) {
            return Err(PersonaError::Invalid {
                reason: "generic reply set contains a blank reply".to_string(),
            });
        }
        if self.service_unavailable.trim().is_empty() {
            return Err(PersonaError::Invalid {
                reason: "service_unavailable text is empty".to_string(),
            });
        }
        if let Some(topic) = self.topics.iter().find(|t| t.replies.is_empty()) {
            return Err(PersonaError::Invalid {
                reason: format!("topic '{}' has no replies", topic.name),
            });
        }
        if let Some(topic) = self
            .topics
            .iter()
            .find(|t| t.replies.iter().any(|r| r.trim().is_empty()))
        {
            return Err(PersonaError::Invalid {
                reason: format!("topic '{}' has a blank reply", topic.name),
            });
        }
        Ok(())
    }

    /// Returns the topic whose keywords match the input first, if any.
    #[must_use]
    pub fn match_topic(&self, input: &str) -> Option<&Topic> {
        let lowered = input.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .collect();
        self.topics
            .iter()
            .find(|topic| !topic.replies.is_empty() && topic.matches(&lowered, &words))
    }

    /// Picks a fallback reply for the input using the thread-local RNG.
    #[must_use]
    pub fn pick_reply(&self, input: &str) -> String {
        self.pick_reply_with(input, &mut rand::thread_rng())
    }

    /// Picks a fallback reply for the input using the given RNG.
    ///
    /// Uniform over the first matching topic's replies, else over the
    /// generic set. Never returns an empty string.
    pub fn pick_reply_with<R: Rng + ?Sized>(&self, input: &str, rng: &mut R) -> String {
        let candidates = self
            .match_topic(input)
            .map_or(&self.generic, |topic| &topic.replies);

        candidates
            .choose(rng)
            .filter(|reply| !reply.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| LAST_RESORT_REPLY.to_string())
    }

    /// Renders the welcome text for a user.
    #[must_use]
    pub fn render_welcome(&self, first_name: &str) -> String {
        self.welcome.replace("{name}", first_name)
    }

    /// Renders the status text.
    #[must_use]
    pub fn render_status(&self, turns: usize, time: &str) -> String {
        self.status
            .replace("{turns}", &turns.to_string())
            .replace("{time}", time)
    }

    /// The persona used when no persona file is configured.
    #[must_use]
    pub fn builtin() -> Self {
        fn lines(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| (*s).to_string()).collect()
        }

        Self {
            name: "Uncle Tunde".to_string(),
            system_prompt: "You are Uncle Tunde, a warm and funny old storyteller from a small \
                farming village. You call the user \"bratha\" and speak simple, playful pidgin \
                English. You know about village life, farming, cooking, the weather, family, \
                and the adventures of your stubborn goat. You do not understand computers, \
                programming, or complicated mathematics: when asked about them, admit you are \
                confused and steer the talk back to simple daily things. Keep answers short \
                and kind."
                .to_string(),
            welcome: "Eh {name}! Me be Uncle Tunde from the village. How you dey, bratha?\n\n\
                We fit talk about food, weather, and simple tings. Use /clear if you want make \
                me forget our talk."
                .to_string(),
            help: "Ah bratha, you want help? Make me try explain:\n\n\
                /start - Say hello to me\n\
                /help - You get am now\n\
                /clear - Make me forget wetin we talk before\n\
                /status - Check if me still dey here\n\n\
                Just talk to me like normal person, no need big big grammar!"
                .to_string(),
            cleared: "Ah bratha! Me don forget everything now. We start fresh like new day!"
                .to_string(),
            status: "Bratha, me still dey here and me dey talk with you.\n\
                We don talk {turns} times.\n\
                Time now: {time}"
                .to_string(),
            rate_limited: "Small small, bratha! You dey talk too fast. Wait a moment before \
                you send another message."
                .to_string(),
            service_unavailable: "Ah bratha, me get small wahala with the thinking machine. \
                Maybe the quota don finish or something.\n\n\
                Try again later, no? Sometimes these tech tings just need small time."
                .to_string(),
            unexpected_error: "Eh! Something scatter for my side. Try again later, bratha."
                .to_string(),
            topics: vec![
                Topic {
                    name: "greeting".to_string(),
                    keywords: lines(&["hello", "hi", "hey", "good morning", "good evening", "howdy"]),
                    replies: lines(&[
                        "Eh bratha, welcome! Me dey here, how your side?",
                        "Hello o! My goat greet you too, bratha.",
                        "Ah, na you! Sit down small, make we gist.",
                    ]),
                },
                Topic {
                    name: "farewell".to_string(),
                    keywords: lines(&["bye", "goodbye", "later", "good night", "see you"]),
                    replies: lines(&[
                        "Waka well, bratha! Come back soon.",
                        "Go well o. Greet your people for me.",
                        "Bye bye! Me go tell my goat you say hello.",
                    ]),
                },
                Topic {
                    name: "food".to_string(),
                    keywords: lines(&["food", "eat", "hungry", "cook", "rice", "jollof", "soup"]),
                    replies: lines(&[
                        "Food? Ah, my wife jollof fit make person cry with joy, bratha!",
                        "Me dey hungry too now. Make we talk after me chop small.",
                    ]),
                },
                Topic {
                    name: "technology".to_string(),
                    keywords: lines(&["code", "python", "program", "computer", "javascript", "math"]),
                    replies: lines(&[
                        "Python? Bratha, for my village python na snake for bush! Me no sabi this one.",
                        "Computer tings too hard for my head. Ask me about farming instead!",
                    ]),
                },
            ],
            generic: lines(&[
                "Hey bratha! Brain no dey work good now. Try later, no worries.",
                "Ah bratha, me get small wahala here. Come back soon!",
                "You know, me no too sabi tech tings. Try again later, bratha.",
                "Sorry bratha, something go wrong. Give me small time, I go fix am.",
            ]),
        }
    }
}

impl Default for Persona {
    fn default() -> Self {
        Self::builtin()
    }
}
