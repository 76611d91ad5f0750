//! Plain-text rendering of core reports.

use chrono::Utc;
use console::style;

use nodekeeper_core::diagnose::{RepairPlan, Severity};
use nodekeeper_core::flow::StepLog;
use nodekeeper_core::repair::{Liveness, RepairReport, RepairStep};
use nodekeeper_core::rollout::{Readiness, RolloutReport, RolloutStep};
use nodekeeper_core::status::{Sourced, StatusSnapshot};
use nodekeeper_core::versions::VersionReport;

const UNKNOWN: &str = "unknown";

fn show<T: std::fmt::Display>(value: &Option<Sourced<T>>) -> String {
    match value {
        Some(sourced) => format!("{} ({})", sourced.value, style(sourced.source).dim()),
        None => style(UNKNOWN).dim().to_string(),
    }
}

fn row(label: &str, value: impl std::fmt::Display) {
    println!("  {:<20} {}", label, value);
}

pub fn status(snapshot: &StatusSnapshot) {
    let overview = &snapshot.overview;
    println!("{}", style("Overview").bold());
    row("overall", show(&overview.overall));
    row("participant", show(&overview.participant_address));
    row("public url", show(&overview.public_url));
    row("api version", show(&overview.api_version));
    if let Some(checks) = &overview.checks {
        for check in &checks.value {
            let message = check.message.as_deref().unwrap_or("");
            row(&format!("  {}", check.name), format!("{} {}", check.status, message));
        }
    }

    let chain = &snapshot.blockchain;
    println!("\n{}", style("Blockchain").bold());
    row("block height", show(&chain.block_height));
    row("network height", show(&chain.network_height));
    row(
        "lag",
        chain
            .block_lag()
            .map(|lag| lag.to_string())
            .unwrap_or_else(|| UNKNOWN.to_string()),
    );
    row("catching up", show(&chain.catching_up));
    row(
        "block age",
        chain
            .block_age(Utc::now())
            .map(|age| format!("{}s", age.num_seconds()))
            .unwrap_or_else(|| UNKNOWN.to_string()),
    );
    row("node version", show(&chain.node_version));
    row("consensus", show(&chain.consensus_version));
    row("peers", show(&chain.peers));

    println!("\n{}", style("Epoch").bold());
    row("index", show(&snapshot.epoch.index));
    row("phase", show(&snapshot.epoch.phase));

    let mlnode = &snapshot.mlnode;
    println!("\n{}", style("ML node").bold());
    row("engine healthy", show(&mlnode.engine_healthy));
    row("model loaded", show(&mlnode.model_loaded));
    row("model", show(&mlnode.model));
    if let Some(nodes) = &mlnode.nodes {
        for node in &nodes.value {
            row(
                &format!("  {}", node.id),
                format!(
                    "{} {}",
                    node.host,
                    node.status.as_deref().unwrap_or(UNKNOWN)
                ),
            );
        }
    }

    let security = &snapshot.security;
    println!("\n{}", style("Security").bold());
    row("validator", show(&security.validator_address));
    row(
        "active set",
        match security.in_active_set() {
            Some(true) => format!(
                "yes, voting power {}",
                security.voting_power().unwrap_or_default()
            ),
            Some(false) => "no".to_string(),
            None => UNKNOWN.to_string(),
        },
    );

    println!(
        "\n{} {}",
        style("Containers").bold(),
        style("(inferred from endpoint reachability, not process state)").dim()
    );
    for guess in snapshot.containers_running() {
        let state = match guess.running {
            Some(true) => style("responding").green().to_string(),
            Some(false) => style("not responding").red().to_string(),
            None => style(UNKNOWN).dim().to_string(),
        };
        row(guess.service.compose_name(), state);
    }

    let unreachable = snapshot.unreachable_sources();
    if !unreachable.is_empty() {
        println!("\n{}", style("Unreachable sources").bold());
        for (source, error) in unreachable {
            row(&source.to_string(), style(error).yellow());
        }
    }
}

pub fn plan(plan: &RepairPlan, steps: &[RepairStep]) {
    if plan.is_empty() {
        println!("{} No problems found", style("✓").green());
        return;
    }

    println!("{}", style("Findings").bold());
    for diagnosis in &plan.diagnoses {
        let marker = match diagnosis.severity {
            Severity::Critical => style("✗").red(),
            Severity::Warning => style("⚠").yellow(),
        };
        println!("  {} [{}] {}", marker, diagnosis.id, diagnosis.description);
        println!("      fix: {}", diagnosis.fix);
    }
    if let Some(upgrade) = &plan.upgrade_name {
        row("upgrade", upgrade);
        row("binary needed", plan.needs_binary);
    }

    println!("\n{}", style("Repair steps").bold());
    for (i, step) in steps.iter().enumerate() {
        println!("  {}. {}", i + 1, step);
    }
}

fn warnings<S>(log: &StepLog<S>) {
    for warning in &log.warnings {
        println!("  {} {}", style("⚠").yellow(), warning);
    }
}

pub fn repair(report: &RepairReport) {
    println!("{} Repair finished", style("✓").green());
    for path in &report.installed {
        row("installed", path.display());
    }
    match &report.liveness {
        Some(Liveness::Responding {
            height,
            catching_up,
        }) => row(
            "chain",
            format!("responding at height {} (catching up: {})", height, catching_up),
        ),
        Some(Liveness::TimedOut { waited_secs, last }) => row(
            "chain",
            format!(
                "not responding after {}s (last: {})",
                waited_secs,
                last.as_deref().unwrap_or("-")
            ),
        ),
        Some(Liveness::Cancelled) => row("chain", "wait cancelled"),
        None => {}
    }
    warnings(&report.log);
}

pub fn versions(report: &VersionReport) {
    println!(
        "  {:<12} {:<16} {:<16} {}",
        style("service").bold(),
        style("current").bold(),
        style("latest").bold(),
        style("status").bold()
    );
    for diff in &report.diffs {
        let status = if diff.auto_update && diff.has_update {
            style("auto-update").cyan().to_string()
        } else if diff.has_update {
            style("update available").yellow().to_string()
        } else if diff.current.is_empty() || diff.latest.is_empty() {
            style(UNKNOWN).dim().to_string()
        } else {
            style("up to date").green().to_string()
        };
        let or_unknown = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };
        println!(
            "  {:<12} {:<16} {:<16} {}",
            diff.service.compose_name(),
            or_unknown(&diff.current),
            or_unknown(&diff.latest),
            status
        );
    }
    for warning in &report.warnings {
        println!("  {} {}", style("⚠").yellow(), warning);
    }
}

pub fn rollout_steps(steps: &[RolloutStep]) {
    if steps.is_empty() {
        println!("\n{} Nothing to update", style("✓").green());
        return;
    }
    println!("\n{}", style("Update steps").bold());
    for (i, step) in steps.iter().enumerate() {
        println!("  {}. {}", i + 1, step);
    }
}

pub fn rollout(report: &RolloutReport) {
    println!("{} Update finished", style("✓").green());
    for change in &report.changes {
        row("updated", change);
    }
    if let Some(allocation) = &report.allocation {
        row("allocation before", allocation);
    }
    match &report.readiness {
        Some(Readiness::Loaded { model }) => {
            row("model", model.as_deref().unwrap_or("loaded"))
        }
        Some(Readiness::TimedOut { waited_secs, .. }) => {
            row("model", format!("not loaded after {}s", waited_secs))
        }
        Some(Readiness::Cancelled) => row("model", "wait cancelled"),
        None => {}
    }
    warnings(&report.log);
}
