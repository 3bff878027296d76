//! Command and start-payload parsing.

/// A prefixed command such as `/ban@mybot 42 spam`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    /// Command name without the prefix and the `@username` suffix.
    pub name: String,
    /// Everything after the first space, untouched.
    pub param: String,
    /// `param` split on whitespace.
    pub params: Vec<String>,
}

impl Command {
    /// Parse `text` if it starts with one of `prefixes`.
    ///
    /// A `@username` suffix on the name is stripped only when it names this
    /// account; commands addressed to other bots are not ours.
    pub fn parse(text: &str, prefixes: &[String], username: Option<&str>) -> Option<Self> {
        let rest = prefixes
            .iter()
            .filter(|p| !p.is_empty())
            .find_map(|p| text.strip_prefix(p.as_str()))?;

        let (head, param) = match rest.split_once(char::is_whitespace) {
            Some((head, param)) => (head, param.trim_start()),
            None => (rest, ""),
        };

        let name = match head.split_once('@') {
            Some((name, target)) => {
                let ours = username.is_some_and(|u| !u.is_empty() && u.eq_ignore_ascii_case(target));
                if !ours {
                    return None;
                }
                name
            }
            None => head,
        };
        if name.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_owned(),
            param: param.to_owned(),
            params: param.split_whitespace().map(str::to_owned).collect(),
        })
    }
}

/// The argument of `/start`, as sent by `t.me/bot?start=<payload>` links.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartPayload {
    /// Text before the first `-`: the registration key.
    pub payload: String,
    /// Whole parameter string.
    pub param: String,
    /// `-`-separated parts after the key.
    pub params: Vec<String>,
}

impl StartPayload {
    /// `None` for a bare `/start`.
    pub fn parse(command: &Command) -> Option<Self> {
        let param = command.param.trim();
        if param.is_empty() {
            return None;
        }
        let mut parts = param.split('-');
        let payload = parts.next().unwrap_or_default().to_owned();
        Some(Self {
            payload,
            param: param.to_owned(),
            params: parts.map(str::to_owned).collect(),
        })
    }
}
