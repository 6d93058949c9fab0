//! Built-in slash commands available in every scenario.

/// A fixed menu command, resolved before any step action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuCommand {
    /// Go back to the entry step.
    Restart,
    /// Show the chat's referral code.
    Status,
    /// Show the scenario name and description.
    About,
}

impl MenuCommand {
    /// Every built-in command.
    pub const ALL: [MenuCommand; 3] = [Self::Restart, Self::Status, Self::About];

    /// Resolve a `/command` token.  Matching is exact.
    pub fn parse(command: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == command)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Restart => "/restart",
            Self::Status => "/status",
            Self::About => "/about",
        }
    }
}

/// Reply to `/status`.
pub fn status_text(ref_id: Option<&str>) -> String {
    format!("Reference code: *{}*", ref_id.unwrap_or("none"))
}

/// Reply to `/about`.
pub fn about_text(name: &str, description: &str) -> String {
    format!("*{name}*\n\n{description}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_commands() {
        assert_eq!(MenuCommand::parse("/restart"), Some(MenuCommand::Restart));
        assert_eq!(MenuCommand::parse("/status"), Some(MenuCommand::Status));
        assert_eq!(MenuCommand::parse("/about"), Some(MenuCommand::About));
    }

    #[test]
    fn parse_is_exact() {
        assert_eq!(MenuCommand::parse("/Restart"), None);
        assert_eq!(MenuCommand::parse("/restart now"), None);
        assert_eq!(MenuCommand::parse("restart"), None);
        assert_eq!(MenuCommand::parse("/start"), None);
    }

    #[test]
    fn status_falls_back_to_none() {
        assert_eq!(status_text(None), "Reference code: *none*");
        assert_eq!(status_text(Some("promo")), "Reference code: *promo*");
    }

    #[test]
    fn about_formats_name_and_description() {
        assert_eq!(about_text("Bot", "Hello"), "*Bot*\n\nHello");
    }
}
