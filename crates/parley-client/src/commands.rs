use parley_types::events::ChatAction;
use parley_types::models::{Message, UserJson};
use parley_types::{ChannelId, UserId};

/// A line typed at the prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Send { channel_id: ChannelId, content: String, is_action: bool },
    Read { channel_id: ChannelId },
    Part { channel_id: ChannelId },
    Pm { user_id: UserId, name: String },
    Logout,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        match word {
            "send" | "me" => {
                let (channel, content) = rest
                    .split_once(' ')
                    .ok_or_else(|| format!("usage: {} <channel> <text>", word))?;
                let content = content.trim();
                if content.is_empty() {
                    return Err("message is empty".into());
                }
                Ok(Command::Send {
                    channel_id: parse_channel(channel)?,
                    content: content.to_string(),
                    is_action: word == "me",
                })
            }
            "read" => Ok(Command::Read { channel_id: parse_channel(rest)? }),
            "part" => Ok(Command::Part { channel_id: parse_channel(rest)? }),
            "pm" => {
                let (user, name) = rest.split_once(' ').unwrap_or((rest, ""));
                let user_id: UserId = user
                    .parse()
                    .map_err(|_| format!("usage: pm <user_id> <name>, got '{}'", user))?;
                let name = match name.trim() {
                    "" => format!("user {}", user_id),
                    name => name.to_string(),
                };
                Ok(Command::Pm { user_id, name })
            }
            "logout" => Ok(Command::Logout),
            "quit" | "exit" => Ok(Command::Quit),
            "" => Err("empty command".into()),
            other => Err(format!("unknown command '{}'", other)),
        }
    }

    /// The action this command dispatches. `Quit` has none.
    pub fn into_action(self, current_user_id: UserId) -> Option<ChatAction> {
        match self {
            Command::Send { channel_id, content, is_action } => Some(ChatAction::MessageSend {
                message: Message::new_pending(channel_id, current_user_id, content, is_action),
            }),
            Command::Read { channel_id } => Some(ChatAction::ChannelMarkAsRead { channel_id }),
            Command::Part { channel_id } => Some(ChatAction::ChannelPart {
                channel_id,
                should_sync: true,
            }),
            Command::Pm { user_id, name } => Some(ChatAction::PrivateChannelOpen {
                target: UserJson { id: user_id, username: name, avatar_url: None },
                current_user_id,
            }),
            Command::Logout => Some(ChatAction::UserLogout),
            Command::Quit => None,
        }
    }
}

fn parse_channel(raw: &str) -> Result<ChannelId, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("'{}' is not a channel id", raw.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send() {
        assert_eq!(
            Command::parse("send 5 hello there").unwrap(),
            Command::Send { channel_id: 5, content: "hello there".into(), is_action: false }
        );
        assert_eq!(
            Command::parse("me 5 waves").unwrap(),
            Command::Send { channel_id: 5, content: "waves".into(), is_action: true }
        );
        assert!(Command::parse("send 5").is_err());
        assert!(Command::parse("send five hi").is_err());
    }

    #[test]
    fn test_parse_other_commands() {
        assert_eq!(Command::parse("read 3").unwrap(), Command::Read { channel_id: 3 });
        assert_eq!(Command::parse(" part 9 ").unwrap(), Command::Part { channel_id: 9 });
        assert_eq!(Command::parse("logout").unwrap(), Command::Logout);
        assert_eq!(Command::parse("exit").unwrap(), Command::Quit);
        assert!(Command::parse("").is_err());
        assert!(Command::parse("dance").is_err());
    }

    #[test]
    fn test_into_action() {
        let action = Command::parse("send 5 hi").unwrap().into_action(77).unwrap();
        match action {
            ChatAction::MessageSend { message } => {
                assert_eq!(message.sender_id, 77);
                assert_eq!(message.channel_id, 5);
                assert!(message.pending);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            Command::Part { channel_id: 2 }.into_action(1),
            Some(ChatAction::ChannelPart { channel_id: 2, should_sync: true })
        ));
        assert!(Command::Quit.into_action(1).is_none());
    }

    #[test]
    fn test_pm_opens_private_channel() {
        assert_eq!(
            Command::parse("pm 12 peppy").unwrap(),
            Command::Pm { user_id: 12, name: "peppy".into() }
        );
        assert_eq!(
            Command::parse("pm 12").unwrap(),
            Command::Pm { user_id: 12, name: "user 12".into() }
        );
        assert!(Command::parse("pm someone").is_err());

        match Command::parse("pm 12 peppy").unwrap().into_action(3) {
            Some(ChatAction::PrivateChannelOpen { target, current_user_id }) => {
                assert_eq!(target.id, 12);
                assert_eq!(target.username, "peppy");
                assert_eq!(current_user_id, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
