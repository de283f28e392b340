//! Plain-text rendering of snapshots and switchover reports.

use std::fmt::Write;

use crate::switchover::{Eligibility, SwitchoverReport};
use crate::topology::{NodeRole, TopologySnapshot};

const COLUMNS: [&str; 6] = ["NODE", "ROLE", "STATUS", "GTID", "READ_ONLY", "WARNINGS"];

/// Render a snapshot as an aligned table, primary first.
pub fn render_snapshot(snapshot: &TopologySnapshot) -> String {
    let mut rows: Vec<[String; 6]> = Vec::with_capacity(snapshot.replicas.len() + 1);

    let primary = &snapshot.primary;
    let (gtid, read_only) = match &primary.facts {
        Some(facts) => (
            facts.gtid_binlog_pos.clone().unwrap_or_default(),
            yes_no(facts.read_only),
        ),
        None => (String::new(), String::new()),
    };
    rows.push([
        primary.address.to_string(),
        NodeRole::Primary.to_string(),
        if primary.is_reachable() { "online" } else { "offline" }.to_string(),
        gtid,
        read_only,
        primary.warnings.join("; "),
    ]);

    for entry in &snapshot.replicas {
        let status = match (&entry.health, entry.role()) {
            (Some(health), _) => health.label(),
            (None, NodeRole::Unreachable) => "offline".to_string(),
            (None, _) => "no replication".to_string(),
        };
        let (gtid, read_only) = match entry.facts() {
            Some(facts) => (
                facts.gtid_current_pos.clone().unwrap_or_default(),
                yes_no(facts.read_only),
            ),
            None => (String::new(), String::new()),
        };
        rows.push([
            entry.address.to_string(),
            entry.role().to_string(),
            status,
            gtid,
            read_only,
            entry.warnings.join("; "),
        ]);
    }

    let mut out = format!(
        "Topology of {} at {}\n",
        snapshot.primary_address(),
        snapshot.taken_at.format("%Y-%m-%d %H:%M:%S")
    );
    out.push_str(&table(&rows));
    if snapshot.is_empty() {
        out.push_str("no replicas found\n");
    }
    out
}

/// Render a switchover report for the operator.
pub fn render_report(report: &SwitchoverReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Switchover {} ({} ms)", report.run_id, report.elapsed_ms());
    let _ = writeln!(out, "  status: {}", report.status);
    let _ = writeln!(out, "  stage reached: {}", report.stage_reached);
    if let Some(candidate) = &report.candidate {
        let _ = writeln!(out, "  candidate: {}", candidate);
    }

    if !report.candidates.is_empty() {
        let _ = writeln!(out, "  candidates:");
        for candidate in &report.candidates {
            match &candidate.eligibility {
                Eligibility::Eligible => {
                    let sequence = candidate.sequence().unwrap_or_default();
                    let _ = writeln!(out, "    {} eligible, sequence {}", candidate.address, sequence);
                }
                Eligibility::Ineligible(reason) => {
                    let _ = writeln!(out, "    {} skipped: {}", candidate.address, reason);
                }
            }
        }
    }

    if !report.outcomes.is_empty() {
        let _ = writeln!(out, "  steps:");
        for outcome in &report.outcomes {
            let result = match &outcome.error {
                None => "ok".to_string(),
                Some(e) => format!("FAILED {}", e),
            };
            let marker = if outcome.needs_follow_up { " [follow-up]" } else { "" };
            let _ = writeln!(
                out,
                "    {:<8} {} {}{}",
                outcome.action.as_str(),
                outcome.node,
                result,
                marker
            );
        }
    }
    out
}

fn yes_no(flag: bool) -> String {
    if flag { "yes" } else { "no" }.to_string()
}

fn table(rows: &[[String; 6]]) -> String {
    let mut widths = COLUMNS.map(str::len);
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.len());
        }
    }

    let mut out = String::new();
    let header: Vec<String> = COLUMNS.iter().map(|c| c.to_string()).collect();
    push_row(&mut out, &header, &widths);
    for row in rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row(out: &mut String, cells: &[String], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, w)| format!("{:<width$}", cell, width = *w))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}
