use crate::app::cli::{help_text, parse_cli_verb, CliVerb};

pub mod delegations;
pub mod records;
pub mod request;
pub mod setup;

pub fn run_cli(args: Vec<String>) -> Result<String, String> {
    if args.is_empty() {
        return Ok(help_text());
    }

    match parse_cli_verb(args[0].as_str()) {
        CliVerb::Setup => setup::cmd_setup(),
        CliVerb::Route => delegations::cmd_route(&args[1..]),
        CliVerb::Runner => delegations::cmd_runner(&args[1..]),
        CliVerb::Delegation => delegations::cmd_delegation(&args[1..]),
        CliVerb::Number => records::cmd_number(&args[1..]),
        CliVerb::Request => request::cmd_request(&args[1..]),
        CliVerb::Log => records::cmd_log(&args[1..]),
        CliVerb::Notifications => records::cmd_notifications(&args[1..]),
        CliVerb::Unknown => Err(format!("unknown command `{}`", args[0])),
    }
}
