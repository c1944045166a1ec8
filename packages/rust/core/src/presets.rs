//! Built-in keyword presets keyed by product category.
//!
//! A deal file may leave its keyword and department lists empty; the
//! presets fill them from the product category so a bare
//! `product_category = "security"` still scores sensibly.

use buyergroup_shared::DealContext;
use buyergroup_shared::text::{contains_any, normalize};

/// Keyword sets for one product area.
#[derive(Debug)]
pub struct KeywordPreset {
    pub name: &'static str,
    /// Category words that select this preset.
    triggers: &'static [&'static str],
    primary: &'static [&'static str],
    secondary: &'static [&'static str],
    departments: &'static [&'static str],
}

static PRESETS: &[KeywordPreset] = &[
    KeywordPreset {
        name: "sales",
        triggers: &["sales", "revenue", "crm", "sales engagement", "revops"],
        primary: &["sales", "revenue", "revops", "business development", "account executive"],
        secondary: &["sales operations", "sales enablement", "revenue operations", "partnerships"],
        departments: &["sales", "revenue", "business development", "revenue operations"],
    },
    KeywordPreset {
        name: "marketing",
        triggers: &["marketing", "demand generation", "advertising", "brand"],
        primary: &["marketing", "demand generation", "growth", "brand"],
        secondary: &["communications", "content", "digital", "product marketing"],
        departments: &["marketing", "growth", "communications"],
    },
    KeywordPreset {
        name: "engineering",
        triggers: &["engineering", "developer", "devops", "software", "platform", "infrastructure", "data"],
        primary: &["engineering", "software", "platform", "infrastructure", "devops"],
        secondary: &["architect", "developer", "data", "site reliability", "product"],
        departments: &["engineering", "it", "product", "technology"],
    },
    KeywordPreset {
        name: "security",
        triggers: &["security", "cybersecurity", "identity", "compliance"],
        primary: &["security", "cybersecurity", "information security", "ciso"],
        secondary: &["risk", "compliance", "identity", "infrastructure"],
        departments: &["security", "information security", "it"],
    },
    KeywordPreset {
        name: "finance",
        triggers: &["finance", "accounting", "payments", "billing", "procurement"],
        primary: &["finance", "accounting", "controller", "fp&a"],
        secondary: &["treasury", "billing", "payroll", "procurement"],
        departments: &["finance", "accounting"],
    },
    KeywordPreset {
        name: "people",
        triggers: &["hr", "human resources", "people", "recruiting", "talent", "payroll"],
        primary: &["hr", "human resources", "people", "talent"],
        secondary: &["recruiting", "recruitment", "talent acquisition", "people operations"],
        departments: &["human resources", "hr", "people", "talent"],
    },
    KeywordPreset {
        name: "customer success",
        triggers: &["customer success", "support", "customer experience", "helpdesk"],
        primary: &["customer success", "customer support", "customer experience"],
        secondary: &["account manager", "support", "onboarding", "cx"],
        departments: &["customer success", "support", "customer experience"],
    },
    KeywordPreset {
        name: "operations",
        triggers: &["operations", "logistics", "supply chain", "workflow"],
        primary: &["operations", "business operations", "supply chain"],
        secondary: &["strategy", "logistics", "chief of staff", "program"],
        departments: &["operations", "business operations"],
    },
];

/// Effective keyword lists for scoring and role rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedKeywords {
    pub primary: Vec<String>,
    pub secondary: Vec<String>,
    pub relevant_departments: Vec<String>,
    /// Preset that filled empty lists, if any.
    pub preset: Option<&'static str>,
}

/// Find the first preset whose triggers match the product category.
pub fn preset_for(category: &str) -> Option<&'static KeywordPreset> {
    let category = normalize(category);
    PRESETS.iter().find(|p| contains_any(&category, p.triggers))
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| (*w).to_string()).collect()
}

/// Fill empty keyword lists from presets. Explicit lists always win.
pub fn resolve_keywords(deal: &DealContext) -> ResolvedKeywords {
    let preset = preset_for(&deal.product_category);
    let category_words: Vec<String> = normalize(&deal.product_category)
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();

    let pick = |explicit: &[String], from_preset: Option<&[&str]>, fallback: &[String]| {
        if !explicit.is_empty() {
            explicit.to_vec()
        } else if let Some(words) = from_preset {
            owned(words)
        } else {
            fallback.to_vec()
        }
    };

    ResolvedKeywords {
        primary: pick(&deal.primary_keywords, preset.map(|p| p.primary), &category_words),
        secondary: pick(&deal.secondary_keywords, preset.map(|p| p.secondary), &[]),
        relevant_departments: pick(
            &deal.relevant_departments,
            preset.map(|p| p.departments),
            &category_words,
        ),
        preset: preset.map(|p| p.name),
    }
}
