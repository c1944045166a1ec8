//! End-to-end pipeline runs against the in-process fixture provider.

use std::collections::HashSet;
use std::sync::Arc;

use buyergroup_core::{Narrator, Pipeline};
use buyergroup_providers::{Capability, Collaborators, Fixture, FixtureProvider};
use buyergroup_shared::{
    CallKind, Candidate, CompanyFacts, DealContext, GroupSizing, PipelineSettings, Role,
    RolePriorities, RunFlag, RunStatus, Stage,
};

fn company(employees: u64) -> Option<CompanyFacts> {
    Some(CompanyFacts {
        employee_count: Some(employees),
        domain: Some("acme.io".into()),
        ..CompanyFacts::degraded("Acme")
    })
}

fn build(provider: FixtureProvider) -> (Arc<FixtureProvider>, Pipeline) {
    let provider = Arc::new(provider);
    let pipeline = Pipeline::new(
        Collaborators::from_provider(provider.clone()),
        Capability::anonymous(4),
        PipelineSettings::default(),
    );
    (provider, pipeline)
}

fn sales_deal(deal_size: f64, sizing: GroupSizing) -> DealContext {
    let mut deal = DealContext::new(deal_size, "sales engagement");
    deal.sizing = sizing;
    deal
}

/// A 200-person org: mostly sales reps, some managers, gatekeepers and
/// facilities staff, with three decision-makers planted mid-stream.
fn large_org() -> Vec<Candidate> {
    let mut people: Vec<Candidate> = (0..200)
        .map(|i| match i % 5 {
            0 => Candidate::new(format!("Person {i}"), "Sales Manager", "Sales"),
            1 | 2 => Candidate::new(format!("Person {i}"), "Account Executive", "Sales"),
            3 => Candidate::new(format!("Person {i}"), "Security Lead", "IT"),
            _ => Candidate::new(format!("Person {i}"), "Office Coordinator", "Facilities"),
        })
        .collect();
    people[40] = Candidate::new("Dee Director", "Director of Sales", "Sales");
    people[90] = Candidate::new("Cass Chief", "Chief Revenue Officer", "Executive");
    people[130] = Candidate::new("Val Vice", "VP Sales", "Sales");
    people
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

/// Empty pool: the run fails at scoring and never pays for enrichment.
#[tokio::test]
async fn empty_pool_fails_without_enrichment_cost() {
    let (provider, pipeline) = build(FixtureProvider::new(Fixture {
        company: company(300),
        ..Fixture::default()
    }));

    let failure = pipeline
        .run("acme.io", &DealContext::new(100_000.0, "sales"))
        .await
        .expect_err("empty pool must fail");

    assert_eq!(failure.stage, Stage::Scoring);
    assert_eq!(failure.last_completed, Some(Stage::Discovery));
    assert_eq!(failure.cause.kind(), "empty_group");
    assert_eq!(failure.costs.total_for(CallKind::ProfileEnrichment), 0);
    assert_eq!(provider.enrich_calls(), 0);
    assert_eq!(failure.costs.calls(CallKind::DiscoveryPage), provider.page_calls());
    assert!(failure.partial.facts.is_some());
    assert!(
        failure
            .flags
            .iter()
            .any(|f| matches!(f, RunFlag::NoCandidatesAboveFloor { survivors: 0, .. }))
    );
}

/// Only weak candidates: the failure still hands back what was discovered
/// and how each candidate scored.
#[tokio::test]
async fn empty_group_failure_keeps_scored_candidates() {
    let (_, pipeline) = build(FixtureProvider::new(Fixture {
        company: company(300),
        candidates: vec![
            Candidate::new("Eve", "Software Engineer", "Engineering"),
            Candidate::new("Finn", "QA Engineer", "Engineering"),
        ],
        ..Fixture::default()
    }));

    let failure = pipeline
        .run("acme.io", &DealContext::new(100_000.0, "sales"))
        .await
        .expect_err("no candidate clears the floor");

    assert_eq!(failure.cause.kind(), "empty_group");
    assert_eq!(failure.partial.candidates.len(), 2);
    let scored: Vec<_> = failure.partial.scored.iter().map(|c| c.candidate.name.as_str()).collect();
    assert_eq!(scored, vec!["Eve", "Finn"]);
    assert!(failure.partial.scored.iter().all(|c| c.relevance == 0.0));
}

/// Three decision-makers in a 200-person pool: the strongest leads the group.
#[tokio::test]
async fn highest_influence_decision_maker_leads() {
    let (_, pipeline) = build(FixtureProvider::new(Fixture {
        company: company(2_000),
        candidates: large_org(),
        ..Fixture::default()
    }));
    let deal = sales_deal(500_000.0, GroupSizing::default());

    let report = pipeline.run("acme.io", &deal).await.expect("run completes");

    assert_eq!(report.parameters.target_size, 10);
    assert!(report.buyer_group.len() >= 10 && report.buyer_group.len() <= deal.sizing.max);

    let decisions: Vec<_> = report
        .buyer_group
        .iter()
        .filter(|m| m.assignment.role == Role::Decision)
        .collect();
    assert_eq!(decisions[0].assignment.candidate().name, "Cass Chief");
    assert_eq!(report.buyer_group[0].assignment.candidate().name, "Cass Chief");
    assert!(
        decisions
            .windows(2)
            .all(|w| w[0].assignment.influence() >= w[1].assignment.influence())
    );
}

/// A single-department selection gains a second department by swapping out
/// its weakest member, without losing the decision-maker or champion.
#[tokio::test]
async fn coverage_backfills_second_department() {
    let mut candidates = vec![
        Candidate::new("Vic", "VP Sales", "Sales"),
        Candidate::new("Mia", "Sales Manager", "Sales"),
    ];
    candidates.extend((0..6).map(|i| Candidate::new(format!("Rep {i}"), "Senior Account Executive", "Sales")));
    candidates.push(Candidate::new("Fin", "Sales Finance Analyst", "Finance"));

    let (_, pipeline) = build(FixtureProvider::new(Fixture {
        company: company(300),
        candidates,
        ..Fixture::default()
    }));
    let mut deal = sales_deal(
        100_000.0,
        GroupSizing {
            min: 3,
            ideal: 8,
            max: 8,
        },
    );
    deal.role_priorities = RolePriorities {
        blocker: 0.0,
        introducer: 0.0,
        ..RolePriorities::default()
    };

    let report = pipeline.run("acme.io", &deal).await.expect("run completes");
    let names: Vec<_> = report
        .buyer_group
        .iter()
        .map(|m| m.assignment.candidate().name.as_str())
        .collect();

    assert_eq!(report.buyer_group.len(), 8);
    assert!(names.contains(&"Fin"));
    assert!(!names.contains(&"Rep 5"));
    assert_eq!(report.cohesion.department_counts.len(), 2);
    assert_eq!(report.cohesion.role_counts.get(&Role::Decision), Some(&1));
    assert_eq!(report.cohesion.role_counts.get(&Role::Champion), Some(&1));
    assert!(report.flags.iter().any(|f| matches!(
        f,
        RunFlag::CoverageBackfilled { added, replaced: Some(_), .. } if added == "Fin"
    )));
}

/// One enrichment failure is absorbed; the run still completes.
#[tokio::test]
async fn enrichment_failure_keeps_member() {
    let fixture = Fixture {
        company: company(300),
        candidates: vec![
            Candidate::new("Vera", "VP Sales", "Sales"),
            Candidate::new("Sam", "Sales Manager", "Sales"),
            Candidate::new("Ada", "Account Executive", "Sales"),
            Candidate::new("Ola", "Sales Operations Analyst", "Revenue Operations"),
            Candidate::new("Eve", "Procurement Manager", "Procurement"),
        ],
        ..Fixture::default()
    };
    let (provider, pipeline) = build(FixtureProvider::new(fixture).fail_profile("Eve"));
    let deal = sales_deal(
        100_000.0,
        GroupSizing {
            min: 3,
            ideal: 5,
            max: 5,
        },
    );

    let report = pipeline.run("acme.io", &deal).await.expect("run completes");

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.buyer_group.len(), 5);
    assert_eq!(report.buyer_group.iter().filter(|m| m.is_enriched()).count(), 4);
    let eve = report
        .buyer_group
        .iter()
        .find(|m| m.assignment.candidate().name == "Eve")
        .expect("Eve stays in the group");
    assert!(!eve.is_enriched());
    assert!(eve.profile.is_none());
    assert_eq!(provider.enrich_calls(), 5);
    assert_eq!(report.costs.total_for(CallKind::ProfileEnrichment), 50);
    assert!(report.flags.iter().any(|f| matches!(
        f,
        RunFlag::EnrichmentPartialFailure { member, .. } if member == "Eve"
    )));
    assert!(report.cohesion.notes.iter().any(|n| n.contains("without full profile")));
}

// ---------------------------------------------------------------------------
// Invariants
// ---------------------------------------------------------------------------

#[tokio::test]
async fn group_never_exceeds_max() {
    let (_, pipeline) = build(FixtureProvider::new(Fixture {
        company: company(20_000),
        candidates: large_org(),
        ..Fixture::default()
    }));
    let deal = sales_deal(
        2_000_000.0,
        GroupSizing {
            min: 2,
            ideal: 4,
            max: 6,
        },
    );
    let report = pipeline.run("acme.io", &deal).await.expect("run completes");
    assert!(report.buyer_group.len() <= 6);
    let ranks: Vec<_> = report.buyer_group.iter().map(|m| m.rank).collect();
    assert_eq!(ranks, (1..=report.buyer_group.len()).collect::<Vec<_>>());
}

#[tokio::test]
async fn duplicates_across_pages_are_removed() {
    let mut candidates = large_org();
    // Same person repeated on a later page, once verbatim and once with a
    // different department label.
    candidates.insert(30, Candidate::new("Cass Chief", "Chief Revenue Officer", "Executive"));
    candidates.insert(60, Candidate::new("Cass Chief", "Chief Revenue Officer", "Leadership"));

    let (_, pipeline) = build(FixtureProvider::new(Fixture {
        company: company(2_000),
        candidates,
        page_size: 20,
        ..Fixture::default()
    }));
    let report = pipeline
        .run("acme.io", &sales_deal(500_000.0, GroupSizing::default()))
        .await
        .expect("run completes");

    let mut seen = HashSet::new();
    for m in &report.buyer_group {
        assert!(
            seen.insert(m.assignment.candidate().identity()),
            "duplicate member {}",
            m.assignment.candidate().name
        );
    }
}

#[tokio::test]
async fn ledger_matches_calls_made() {
    let (provider, pipeline) = build(FixtureProvider::new(Fixture {
        company: company(2_000),
        candidates: large_org(),
        ..Fixture::default()
    }));
    let report = pipeline
        .run("acme.io", &sales_deal(500_000.0, GroupSizing::default()))
        .await
        .expect("run completes");

    let costs = PipelineSettings::default().costs;
    assert_eq!(report.costs.calls(CallKind::ContextResolution), provider.resolve_calls());
    assert_eq!(report.costs.calls(CallKind::DiscoveryPage), provider.page_calls());
    assert_eq!(report.costs.calls(CallKind::ProfileEnrichment), provider.enrich_calls());
    assert_eq!(provider.enrich_calls(), report.buyer_group.len());
    assert_eq!(
        report.costs.total(),
        provider.resolve_calls() as u64 * costs.context_resolution
            + provider.page_calls() as u64 * costs.discovery_page
            + provider.enrich_calls() as u64 * costs.profile_enrichment
    );
    let seqs: Vec<_> = report.costs.entries().iter().map(|e| e.seq).collect();
    assert_eq!(seqs, (0..seqs.len()).collect::<Vec<_>>());
}

#[tokio::test]
async fn identical_inputs_give_identical_groups() {
    let run_once = || async {
        let (_, pipeline) = build(FixtureProvider::new(Fixture {
            company: company(2_000),
            candidates: large_org(),
            ..Fixture::default()
        }));
        pipeline
            .run("acme.io", &sales_deal(500_000.0, GroupSizing::default()))
            .await
            .expect("run completes")
    };
    let a = run_once().await;
    let b = run_once().await;

    let members = |r: &buyergroup_shared::PipelineReport| {
        r.buyer_group
            .iter()
            .map(|m| (m.assignment.candidate().name.clone(), m.assignment.role))
            .collect::<Vec<_>>()
    };
    assert_eq!(members(&a), members(&b));
    assert_eq!(a.cohesion, b.cohesion);
    assert_eq!(a.flags, b.flags);
    assert_eq!(a.costs.total(), b.costs.total());
}

#[tokio::test]
async fn failed_page_is_charged_and_absorbed() {
    let (provider, pipeline) = build(
        FixtureProvider::new(Fixture {
            company: company(2_000),
            candidates: large_org(),
            ..Fixture::default()
        })
        .fail_page(2),
    );
    let report = pipeline
        .run("acme.io", &sales_deal(500_000.0, GroupSizing::default()))
        .await
        .expect("run completes");

    assert!(
        report
            .flags
            .iter()
            .any(|f| matches!(f, RunFlag::DiscoveryPageFailed { page: 2, .. }))
    );
    assert_eq!(report.costs.calls(CallKind::DiscoveryPage), provider.page_calls());
    assert!(
        report
            .costs
            .entries()
            .iter()
            .any(|e| e.kind == CallKind::DiscoveryPage && !e.succeeded)
    );
}

#[tokio::test]
async fn unknown_company_runs_degraded() {
    let (_, pipeline) = build(FixtureProvider::new(Fixture {
        company: None,
        candidates: large_org(),
        ..Fixture::default()
    }));
    let report = pipeline
        .run("unknown.example", &sales_deal(100_000.0, GroupSizing::default()))
        .await
        .expect("run completes");

    assert!(report.degraded_context);
    assert_eq!(report.intelligence.name, "unknown.example");
    // Unknown headcount falls back to two pages.
    assert_eq!(report.parameters.max_pages, 2);
    assert!(matches!(
        report.flags.first(),
        Some(RunFlag::ContextNotFound { identifier }) if identifier == "unknown.example"
    ));
}

/// The bundled demo fixture runs through every stage and writes a verifiable bundle.
#[tokio::test]
async fn demo_fixture_produces_verified_bundle() {
    let demos = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../demos");
    let provider = FixtureProvider::from_path(&demos.join("acme.json")).unwrap();
    let deal = DealContext::from_toml(&std::fs::read_to_string(demos.join("deal.toml")).unwrap())
        .unwrap();
    let (provider, pipeline) = build(provider);

    let report = pipeline.run("acme.io", &deal).await.unwrap();
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.intelligence.name, "Acme Robotics");
    assert!((3..=8).contains(&report.buyer_group.len()));
    assert!(
        report
            .buyer_group
            .iter()
            .all(|m| m.assignment.candidate().name != "Jonas Frei")
    );
    assert_eq!(provider.enrich_calls(), report.buyer_group.len());
    assert_eq!(
        report.costs.total_for(CallKind::ProfileEnrichment),
        10 * report.buyer_group.len() as u64
    );

    let narrative = buyergroup_core::TemplateNarrator.narrate(&report).unwrap();
    let out = std::env::temp_dir().join(format!("bg-e2e-{}", uuid::Uuid::now_v7()));
    let bundle = buyergroup_core::write_bundle(&report, &narrative, &out).unwrap();
    let manifest = buyergroup_core::verify_bundle(&bundle.path).unwrap();
    assert_eq!(manifest.members, report.buyer_group.len());
    let _ = std::fs::remove_dir_all(&out);
}
