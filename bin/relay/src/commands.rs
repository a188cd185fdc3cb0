//! Bot command recognition.

use palaver_integration::BotCommand;

/// A recognised bot command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Reset the session and greet.
    Start,
    /// Forget the conversation (`/clear`, `/reset`).
    Clear,
    /// Show usage.
    Help,
    /// Show session and relay status.
    Status,
    /// Probe the primary provider. Admins only.
    Probe,
}

impl Command {
    /// Parses a command name without its leading slash.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "clear" | "reset" => Some(Self::Clear),
            "help" => Some(Self::Help),
            "status" => Some(Self::Status),
            "probe" => Some(Self::Probe),
            _ => None,
        }
    }

    /// Returns true for commands restricted to admins.
    #[must_use]
    pub fn admin_only(self) -> bool {
        matches!(self, Self::Probe)
    }
}

/// What an inbound text asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound<'a> {
    /// A recognised command.
    Command(Command),
    /// Conversational text, including unknown commands.
    Text(&'a str),
}

/// Classifies inbound text.
///
/// Commands may carry a `@botname` suffix; a suffix naming another bot, or
/// an unknown command name, makes the message conversational text.
#[must_use]
pub fn parse<'a>(text: &'a str, bot_username: Option<&str>) -> Inbound<'a> {
    let Some(rest) = text.trim_start().strip_prefix('/') else {
        return Inbound::Text(text);
    };
    let word = rest.split(char::is_whitespace).next().unwrap_or_default();
    if word.is_empty() {
        return Inbound::Text(text);
    }
    let (name, target) = match word.split_once('@') {
        Some((name, target)) => (name, Some(target)),
        None => (word, None),
    };

    if let (Some(target), Some(me)) = (target, bot_username) {
        if !target.eq_ignore_ascii_case(me.trim_start_matches('@')) {
            return Inbound::Text(text);
        }
    }

    match Command::from_name(name) {
        Some(command) => Inbound::Command(command),
        None => Inbound::Text(text),
    }
}

/// Entries registered in the bot's command menu. `/probe` stays unlisted.
#[must_use]
pub fn menu() -> Vec<BotCommand> {
    vec![
        BotCommand::new("start", "Start a new conversation"),
        BotCommand::new("help", "Show what I can do"),
        BotCommand::new("clear", "Forget our conversation"),
        BotCommand::new("status", "Check that I am still here"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_commands() {
        assert_eq!(parse("/start", None), Inbound::Command(Command::Start));
        assert_eq!(parse("/clear", None), Inbound::Command(Command::Clear));
        assert_eq!(parse("/reset", None), Inbound::Command(Command::Clear));
        assert_eq!(parse("/help", None), Inbound::Command(Command::Help));
        assert_eq!(parse("/status", None), Inbound::Command(Command::Status));
        assert_eq!(parse("/probe", None), Inbound::Command(Command::Probe));
        assert_eq!(parse("  /STATUS now", None), Inbound::Command(Command::Status));
    }

    #[test]
    fn bot_suffix_must_match() {
        assert_eq!(
            parse("/start@palaver_bot", Some("palaver_bot")),
            Inbound::Command(Command::Start)
        );
        assert_eq!(
            parse("/start@Palaver_Bot", Some("@palaver_bot")),
            Inbound::Command(Command::Start)
        );
        assert_eq!(
            parse("/start@other_bot", Some("palaver_bot")),
            Inbound::Text("/start@other_bot")
        );
        assert_eq!(
            parse("/start@anyone", None),
            Inbound::Command(Command::Start)
        );
    }

    #[test]
    fn unknown_commands_are_text() {
        assert_eq!(parse("/weather", None), Inbound::Text("/weather"));
        assert_eq!(parse("/", None), Inbound::Text("/"));
    }

    #[test]
    fn space_after_slash_is_text() {
        assert_eq!(parse("/ help", None), Inbound::Text("/ help"));
        assert_eq!(parse("/", None), Inbound::Text("/"));
        assert_eq!(parse("/help me", None), Inbound::Command(Command::Help));
    }

    #[test]
    fn plain_text_is_text() {
        assert_eq!(parse("hello", None), Inbound::Text("hello"));
        assert_eq!(parse("a/b", None), Inbound::Text("a/b"));
    }

    #[test]
    fn menu_hides_admin_commands() {
        let menu = menu();
        assert!(menu.iter().all(|c| Command::from_name(&c.command).is_some_and(|c| !c.admin_only())));
    }
}
