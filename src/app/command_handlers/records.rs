use crate::app::cli::ParsedArgs;
use crate::app::command_support::{load_settings, open_store, parse_tenant, required};
use crate::documents::{next_number, DocumentKind};
use crate::store::OutcomeFilter;

pub fn cmd_number(args: &[String]) -> Result<String, String> {
    let usage = "relaydesk number next <tenant> <kind>";
    if args.first().map(String::as_str) != Some("next") {
        return Err(format!("usage: {usage}"));
    }
    let tenant_id = parse_tenant(required(args, 1, usage)?)?;
    let kind = DocumentKind::parse(required(args, 2, usage)?)?;

    let settings = load_settings()?;
    let store = open_store(&settings)?;
    let number = next_number(&store, &tenant_id, kind).map_err(|e| e.to_string())?;
    Ok(format!(
        "kind={}\nprefix={}\nnext_number={number}",
        kind.as_str(),
        kind.number_prefix()
    ))
}

pub fn cmd_log(args: &[String]) -> Result<String, String> {
    match args.first().map(String::as_str) {
        Some("list") => cmd_log_list(&args[1..]),
        Some("stats") => cmd_log_stats(&args[1..]),
        _ => Err("usage: relaydesk log <list|stats> <tenant> ...".to_string()),
    }
}

fn cmd_log_stats(args: &[String]) -> Result<String, String> {
    let parsed = ParsedArgs::parse(args, &["--event"], &[])?;
    let tenant_id = parse_tenant(required(
        &parsed.positional,
        0,
        "relaydesk log stats <tenant> [--event <event>]",
    )?)?;

    let settings = load_settings()?;
    let store = open_store(&settings)?;
    let stats = store
        .outcome_stats(&tenant_id, parsed.value("--event"))
        .map_err(|e| e.to_string())?;
    Ok(format!(
        "total={}\nsuccess={}\nerror={}",
        stats.total, stats.success, stats.error
    ))
}

fn cmd_log_list(args: &[String]) -> Result<String, String> {
    let usage = "relaydesk log list <tenant> [--entity <id>] [--event <event>]";
    let parsed = ParsedArgs::parse(args, &["--entity", "--event"], &[])?;
    let tenant_id = parse_tenant(required(&parsed.positional, 0, usage)?)?;
    let filter = OutcomeFilter {
        entity_id: parsed.value("--entity").map(str::to_string),
        event_type: parsed.value("--event").map(str::to_string),
        outcome: None,
    };

    let settings = load_settings()?;
    let store = open_store(&settings)?;
    let entries = store
        .list_outcomes(&tenant_id, &filter)
        .map_err(|e| e.to_string())?;

    let mut lines = vec![format!("count={}", entries.len())];
    lines.extend(entries.iter().map(|entry| {
        let mut line = format!(
            "outcome={} event={} entity_type={} entity_id={} dispatched={} created_at={}",
            entry.outcome.as_str(),
            entry.event_type,
            entry.entity_type,
            entry.entity_id,
            entry.dispatched,
            entry.created_at
        );
        if let Some(workflow) = &entry.runner_workflow_id {
            line.push_str(&format!(" runner_workflow_id={workflow}"));
        }
        if let Some(error) = &entry.error_message {
            line.push_str(&format!(" error={error:?}"));
        }
        line
    }));
    Ok(lines.join("\n"))
}

pub fn cmd_notifications(args: &[String]) -> Result<String, String> {
    match args.first().map(String::as_str) {
        Some("list") => cmd_notifications_list(&args[1..]),
        Some("read") => cmd_notifications_read(&args[1..]),
        _ => Err("usage: relaydesk notifications <list|read> <tenant> ...".to_string()),
    }
}

fn cmd_notifications_list(args: &[String]) -> Result<String, String> {
    let parsed = ParsedArgs::parse(args, &[], &["--unread"])?;
    let tenant_id = parse_tenant(required(
        &parsed.positional,
        0,
        "relaydesk notifications list <tenant> [--unread]",
    )?)?;

    let settings = load_settings()?;
    let store = open_store(&settings)?;
    let notifications = store
        .list_notifications(&tenant_id, parsed.has("--unread"))
        .map_err(|e| e.to_string())?;

    let mut lines = vec![format!("count={}", notifications.len())];
    lines.extend(notifications.iter().map(|notification| {
        format!(
            "id={} type={} read={} title={:?} message={:?}",
            notification.notification_id,
            notification.kind,
            notification.read,
            notification.title,
            notification.message
        )
    }));
    Ok(lines.join("\n"))
}

fn cmd_notifications_read(args: &[String]) -> Result<String, String> {
    let usage = "relaydesk notifications read <tenant> <id>";
    let tenant_id = parse_tenant(required(args, 0, usage)?)?;
    let notification_id = required(args, 1, usage)?;

    let settings = load_settings()?;
    let store = open_store(&settings)?;
    let updated = store
        .mark_notification_read(&tenant_id, notification_id)
        .map_err(|e| e.to_string())?;
    if !updated {
        return Err(format!("notification `{notification_id}` not found"));
    }
    Ok(format!("notification marked read\nid={notification_id}"))
}
