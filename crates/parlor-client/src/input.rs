/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// `/join <channel>`
    Join(String),
    /// `/dm <channel>`
    DirectMessage(String),
    /// `/search [text]`; no text clears the search
    Search(String),
    Leave,
    Quit,
    Help,
    /// Anything that is not a command is posted to the active channel.
    Say(String),
    Empty,
    Unknown(String),
}

pub fn parse(line: &str) -> Input {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Input::Empty;
    }

    let Some(command) = line.strip_prefix('/') else {
        return Input::Say(line.to_string());
    };

    let (name, arg) = match command.split_once(' ') {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };

    match (name, arg) {
        ("join", channel) if !channel.is_empty() => Input::Join(channel.to_string()),
        ("dm", channel) if !channel.is_empty() => Input::DirectMessage(channel.to_string()),
        ("search", text) => Input::Search(text.to_string()),
        ("leave", _) => Input::Leave,
        ("quit" | "exit", _) => Input::Quit,
        ("help", _) => Input::Help,
        _ => Input::Unknown(line.to_string()),
    }
}

pub const HELP: &str = "\
/join <channel>   switch to a public channel
/dm <channel>     switch to a private channel
/search <text>    filter messages (regex, case-insensitive); /search alone clears
/leave            leave the current channel
/quit             exit
anything else     post a message";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands() {
        assert_eq!(parse("/join general"), Input::Join("general".into()));
        assert_eq!(parse("/dm bob\n"), Input::DirectMessage("bob".into()));
        assert_eq!(parse("/search hello world"), Input::Search("hello world".into()));
        assert_eq!(parse("/search"), Input::Search(String::new()));
        assert_eq!(parse("/leave"), Input::Leave);
        assert_eq!(parse("/exit"), Input::Quit);
    }

    #[test]
    fn test_plain_text_is_said() {
        assert_eq!(parse("hi there"), Input::Say("hi there".into()));
        assert_eq!(parse("   "), Input::Empty);
    }

    #[test]
    fn test_unknown_and_missing_args() {
        assert_eq!(parse("/join"), Input::Unknown("/join".into()));
        assert_eq!(parse("/frobnicate"), Input::Unknown("/frobnicate".into()));
    }
}
