//! Human-readable narrative for a finished run.

use std::fmt::Write as _;

use buyergroup_shared::{CallKind, EngagementStrategy, PipelineReport, Result};

/// Renders a finished report into prose.
pub trait Narrator: Send + Sync {
    fn narrate(&self, report: &PipelineReport) -> Result<String>;
}

/// Deterministic Markdown brief built from the report alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateNarrator;

impl Narrator for TemplateNarrator {
    fn narrate(&self, report: &PipelineReport) -> Result<String> {
        Ok(render(report))
    }
}

fn strategy_line(strategy: EngagementStrategy) -> &'static str {
    match strategy {
        EngagementStrategy::DecisionLed => {
            "Open with the decision-maker and bring the champion in to carry the evaluation."
        }
        EngagementStrategy::ChampionLed => {
            "No decision-maker surfaced; work through the champion to reach budget authority."
        }
        EngagementStrategy::BlockerMitigation => {
            "Only gatekeepers surfaced; address their concerns early and look for a sponsor."
        }
        EngagementStrategy::Exploratory => {
            "No clear authority or sponsor; use introducers to map the organization first."
        }
    }
}

fn render(report: &PipelineReport) -> String {
    let mut md = String::new();
    let facts = &report.intelligence;

    let _ = writeln!(md, "# Buyer group: {}", facts.name);
    md.push('\n');
    let _ = writeln!(md, "- Run: `{}`", report.run_id);
    let _ = writeln!(md, "- Deal band: {}", report.parameters.band);
    if let Some(n) = facts.employee_count {
        let _ = writeln!(md, "- Employees: {n}");
    }
    if let Some(industry) = &facts.industry {
        let _ = writeln!(md, "- Industry: {industry}");
    }
    if report.degraded_context {
        md.push_str("- Company facts unavailable; parameters use defaults\n");
    }
    let _ = writeln!(
        md,
        "- Cohesion: {:.1} ({:?}), priority {:?}",
        report.cohesion.score, report.cohesion.level, report.cohesion.priority
    );

    md.push_str("\n## Strategy\n\n");
    md.push_str(strategy_line(report.cohesion.strategy));
    md.push('\n');

    md.push_str("\n## Members\n\n");
    md.push_str("| # | Name | Title | Department | Role | Influence | Profile |\n");
    md.push_str("|---|------|-------|------------|------|-----------|---------|\n");
    for m in &report.buyer_group {
        let c = m.assignment.candidate();
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} | {} | {:.2} | {} |",
            m.rank,
            c.name,
            c.title,
            c.department,
            m.assignment.role,
            m.assignment.influence(),
            if m.is_enriched() { "full" } else { "preview" }
        );
    }

    if !report.cohesion.notes.is_empty() {
        md.push_str("\n## Notes\n\n");
        for note in &report.cohesion.notes {
            let _ = writeln!(md, "- {note}");
        }
    }

    if !report.flags.is_empty() {
        md.push_str("\n## Run flags\n\n");
        for flag in &report.flags {
            let _ = writeln!(md, "- {flag}");
        }
    }

    md.push_str("\n## Costs\n\n");
    for kind in [
        CallKind::ContextResolution,
        CallKind::DiscoveryPage,
        CallKind::ProfileEnrichment,
    ] {
        let _ = writeln!(
            md,
            "- {}: {} calls, {} credits",
            kind.as_str(),
            report.costs.calls(kind),
            report.costs.total_for(kind)
        );
    }
    let _ = writeln!(md, "- Total: {} credits", report.costs.total());

    md
}
