#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerb {
    Setup,
    Route,
    Runner,
    Delegation,
    Number,
    Request,
    Log,
    Notifications,
    Unknown,
}

pub fn parse_cli_verb(input: &str) -> CliVerb {
    match input {
        "setup" => CliVerb::Setup,
        "route" => CliVerb::Route,
        "runner" => CliVerb::Runner,
        "delegation" => CliVerb::Delegation,
        "number" => CliVerb::Number,
        "request" => CliVerb::Request,
        "log" => CliVerb::Log,
        "notifications" => CliVerb::Notifications,
        _ => CliVerb::Unknown,
    }
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Commands:".to_string(),
        "  setup                                        Create config, state root and store"
            .to_string(),
        "  route <tenant> <event>                       Show where an event would be dispatched"
            .to_string(),
        "  runner check                                 Check that the runner answers /healthz"
            .to_string(),
        "  delegation set <tenant> <event> <workflow>   Delegate an event to a runner workflow"
            .to_string(),
        "  delegation disable <tenant> <event>          Retire the active delegation".to_string(),
        "  delegation list <tenant>                     List delegation records".to_string(),
        "  number next <tenant> <kind>                  Preview the next document number"
            .to_string(),
        "  request <METHOD> <path> [options]            Run one API request".to_string(),
        "      --token <token>                          Authenticate as a primary caller"
            .to_string(),
        "      --callback                               Send as a runner callback".to_string(),
        "      --tenant <tenant>                        Callback tenant id".to_string(),
        "      --body <json>                            Request body".to_string(),
        "  log list <tenant> [--entity <id>]            Show outcome log entries".to_string(),
        "  log stats <tenant> [--event <event>]         Count successes and errors".to_string(),
        "  notifications list <tenant> [--unread]       Show failure notifications".to_string(),
        "  notifications read <tenant> <id>             Mark a notification as read".to_string(),
    ]
}

pub(crate) fn help_text() -> String {
    cli_help_lines().join("\n")
}

/// Splits `--flag value` pairs and boolean `--switch`es from positionals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArgs {
    pub positional: Vec<String>,
    pub options: Vec<(String, Option<String>)>,
}

impl ParsedArgs {
    pub fn parse(args: &[String], valued: &[&str], switches: &[&str]) -> Result<Self, String> {
        let mut parsed = Self::default();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if valued.contains(&arg.as_str()) {
                let value = iter
                    .next()
                    .ok_or_else(|| format!("{arg} requires a value"))?;
                parsed.options.push((arg.clone(), Some(value.clone())));
            } else if switches.contains(&arg.as_str()) {
                parsed.options.push((arg.clone(), None));
            } else if arg.starts_with("--") {
                return Err(format!("unknown option `{arg}`"));
            } else {
                parsed.positional.push(arg.clone());
            }
        }
        Ok(parsed)
    }

    pub fn value(&self, flag: &str) -> Option<&str> {
        self.options
            .iter()
            .rev()
            .find(|(name, _)| name == flag)
            .and_then(|(_, value)| value.as_deref())
    }

    pub fn has(&self, flag: &str) -> bool {
        self.options.iter().any(|(name, _)| name == flag)
    }
}
