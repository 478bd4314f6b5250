use crate::app::command_support::{load_settings, open_store, parse_event, parse_tenant, required};
use crate::config::Settings;
use crate::dispatch::{alias, DispatchCore, RoutingResolver, UreqTransport};
use crate::shared::OpsLog;
use std::sync::Arc;

fn dispatch_core(settings: &Settings) -> Result<DispatchCore, String> {
    let store = open_store(settings)?;
    let ops = OpsLog::new(&settings.resolve_state_root().map_err(|e| e.to_string())?);
    let resolver = RoutingResolver::new(Arc::new(store), ops.clone());
    Ok(DispatchCore::new(
        settings.runner_base_url(),
        settings.runner.timeout(),
        Arc::new(UreqTransport),
        resolver,
        ops,
    ))
}

pub fn cmd_runner(args: &[String]) -> Result<String, String> {
    if args.first().map(String::as_str) != Some("check") {
        return Err("usage: relaydesk runner check".to_string());
    }
    let settings = load_settings()?;
    let health = dispatch_core(&settings)?.check_runner();
    let status = health
        .status
        .map(|status| status.to_string())
        .unwrap_or_else(|| "none".to_string());
    let text = format!(
        "reachable={}\nstatus={status}\nmessage={}",
        health.reachable, health.message
    );
    if health.reachable {
        Ok(text)
    } else {
        Err(text)
    }
}

pub fn cmd_route(args: &[String]) -> Result<String, String> {
    let usage = "relaydesk route <tenant> <event>";
    let tenant_id = parse_tenant(required(args, 0, usage)?)?;
    let event = parse_event(required(args, 1, usage)?)?;

    let settings = load_settings()?;
    let core = dispatch_core(&settings)?;
    let route = core.route(&tenant_id, &event).map_err(|e| e.to_string())?;

    let mut lines = vec![
        format!("event={}", route.event),
        format!("webhook_path={}", route.webhook_path),
        format!("source={}", route.source.as_str()),
        format!(
            "runner_workflow_id={}",
            route.runner_workflow_id.as_deref().unwrap_or("none")
        ),
    ];
    match core.webhook_url(&route) {
        Ok(url) => lines.push(format!("url={url}")),
        Err(_) => lines.push("url=unconfigured".to_string()),
    }
    Ok(lines.join("\n"))
}

pub fn cmd_delegation(args: &[String]) -> Result<String, String> {
    match args.first().map(String::as_str) {
        Some("set") => cmd_delegation_set(&args[1..]),
        Some("disable") => cmd_delegation_disable(&args[1..]),
        Some("list") => cmd_delegation_list(&args[1..]),
        _ => Err("usage: relaydesk delegation <set|disable|list> ...".to_string()),
    }
}

fn cmd_delegation_set(args: &[String]) -> Result<String, String> {
    let usage = "relaydesk delegation set <tenant> <event> <workflow-id>";
    let tenant_id = parse_tenant(required(args, 0, usage)?)?;
    let event = parse_event(required(args, 1, usage)?)?;
    let workflow_id = required(args, 2, usage)?.trim();
    if workflow_id.is_empty() {
        return Err("workflow id must be non-empty".to_string());
    }

    let settings = load_settings()?;
    let store = open_store(&settings)?;
    let record = store
        .activate_delegation(&tenant_id, &event.as_string(), workflow_id)
        .map_err(|e| e.to_string())?;

    // A workflow id the alias table does not know still gets stored; routing
    // falls back to the event's default path until the table catches up.
    let webhook_path = alias::resolve(workflow_id).ok();
    Ok(format!(
        "delegation activated\ndelegation_id={}\ntenant_id={}\nevent={}\nrunner_workflow_id={}\nwebhook_path={}",
        record.delegation_id,
        record.tenant_id,
        record.event_type,
        record.runner_workflow_id,
        webhook_path.unwrap_or("unresolved")
    ))
}

fn cmd_delegation_disable(args: &[String]) -> Result<String, String> {
    let usage = "relaydesk delegation disable <tenant> <event>";
    let tenant_id = parse_tenant(required(args, 0, usage)?)?;
    let event = parse_event(required(args, 1, usage)?)?;

    let settings = load_settings()?;
    let store = open_store(&settings)?;
    let retired = store
        .deactivate_delegation(&tenant_id, &event.as_string())
        .map_err(|e| e.to_string())?;
    Ok(format!(
        "delegation disabled\ntenant_id={tenant_id}\nevent={event}\nretired={retired}"
    ))
}

fn cmd_delegation_list(args: &[String]) -> Result<String, String> {
    let tenant_id = parse_tenant(required(args, 0, "relaydesk delegation list <tenant>")?)?;

    let settings = load_settings()?;
    let store = open_store(&settings)?;
    let records = store
        .list_delegations(&tenant_id)
        .map_err(|e| e.to_string())?;

    let mut lines = vec![format!("count={}", records.len())];
    lines.extend(records.iter().map(|record| {
        format!(
            "event={} runner_workflow_id={} status={} delegation_id={}",
            record.event_type,
            record.runner_workflow_id,
            record.status.as_str(),
            record.delegation_id
        )
    }));
    Ok(lines.join("\n"))
}
