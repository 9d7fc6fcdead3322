//! Terminal rendering for resolutions, statistics and telemetry

use crate::resolver::{BreakerSnapshot, CircuitState};
use crate::statistics::StatisticsSnapshot;
use crate::telemetry::TelemetryStats;
use crate::types::{ErrorContext, Resolution, Tier};
use colored::Colorize;

/// One-line summary of a resolution
pub fn resolution_headline(resolution: &Resolution) -> String {
    match resolution.tier {
        Tier::Knowledge if resolution.auto_applied => {
            format!("{} - known fix, safe to auto-apply", resolution.tier)
        }
        Tier::Knowledge => format!("{} - known fix, confirm before applying", resolution.tier),
        Tier::Documentation if resolution.auto_applied => {
            format!("{} - documented fix, safe to auto-apply", resolution.tier)
        }
        Tier::Documentation => format!("{} - suggested fix, confirm before applying", resolution.tier),
        Tier::Human => format!("{} - needs a human", resolution.tier),
    }
}

pub fn format_percent(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

pub fn print_resolution(resolution: &Resolution, context: &ErrorContext) {
    let headline = resolution_headline(resolution);
    let headline = match resolution.tier {
        Tier::Knowledge => headline.green().bold(),
        Tier::Documentation if resolution.auto_applied => headline.green().bold(),
        Tier::Documentation => headline.yellow().bold(),
        Tier::Human => headline.red().bold(),
    };
    println!("{}", headline);

    if let Some(solution) = &resolution.solution {
        println!();
        println!("  {}", solution.cyan());
        println!();
        println!("  Source:     {}", resolution.source);
        println!("  Confidence: {}", format_percent(resolution.confidence));
    }

    if let Some(blocked) = &resolution.blocked {
        println!();
        println!(
            "  {} {} ({})",
            "Blocked suggestion:".yellow(),
            blocked.solution.cyan(),
            blocked.reason
        );
        println!("  Confidence: {}", format_percent(blocked.confidence));
    }

    if resolution.is_escalation() {
        println!();
        println!("  Tool:    {}", context.tool);
        if let Some(path) = &context.file_path {
            println!("  File:    {}", path);
        }
        if let Some(command) = &context.command {
            println!("  Command: {}", command);
        }
        println!("  Error:   {}", context.error_message);
        println!();
        println!(
            "  Once fixed, save it: cascadefix save \"<message>\" --solution \"<fix>\""
        );
    }

    println!();
    println!(
        "  {}",
        format!(
            "search {}ms, cost {} units",
            resolution.search_time_ms, resolution.cost_estimate
        )
        .dimmed()
    );
}

pub fn print_statistics(stats: &StatisticsSnapshot, breaker: &BreakerSnapshot, show_history: bool) {
    println!("{}", "Resolution statistics".bold());
    println!("  Attempts:            {}", stats.total_attempts);
    println!("  Tier 1 hits:         {}", stats.tier1_hits);
    println!(
        "  Tier 2 hits:         {} ({} auto-applied, {} confirmed)",
        stats.tier2_hits, stats.tier2_auto_applied, stats.tier2_user_confirmed
    );
    println!("  Tier 3 escalations:  {}", stats.tier3_escalations);
    println!("  Blocked auto-apply:  {}", stats.blocked_auto_applies);
    println!(
        "  Recoveries:          {} succeeded, {} failed",
        stats.successful_recoveries, stats.failed_recoveries
    );
    println!(
        "  Automation rate:     {}",
        format_percent(stats.automation_rate).bold()
    );

    let state = match breaker.state {
        CircuitState::Closed => breaker.state.to_string().green(),
        CircuitState::HalfOpen => breaker.state.to_string().yellow(),
        CircuitState::Open => breaker.state.to_string().red(),
    };
    println!(
        "  Circuit breaker:     {} ({}/{} failures)",
        state, breaker.consecutive_failures, breaker.failure_threshold
    );

    if show_history && !stats.history.is_empty() {
        println!();
        println!("{}", "Recent resolutions".bold());
        for entry in stats.history.iter().rev().take(10) {
            println!(
                "  {} {} [{}] {}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.tier,
                entry.tool,
                entry.error_preview
            );
        }
    }
}

pub fn print_telemetry(stats: &TelemetryStats, hit_rate: f64, average_ms: f64) {
    println!("{}", "Search telemetry".bold());
    println!("  Searches:        {}", stats.searches);
    println!(
        "  Hits:            {} (stage 1: {}, stage 2: {}, stage 3: {})",
        stats.hits, stats.stage1_hits, stats.stage2_hits, stats.stage3_hits
    );
    println!("  Misses:          {}", stats.misses);
    println!("  Hit rate:        {}", format_percent(hit_rate));
    println!("  Average search:  {:.1}ms", average_ms);
    println!(
        "  Stage runs:      {} / {} / {}",
        stats.stage_runs[0], stats.stage_runs[1], stats.stage_runs[2]
    );
    println!("  Over target:     {}", stats.over_target);
    println!("  Stage timeouts:  {}", stats.stage_timeouts);
}
