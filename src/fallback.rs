// src/fallback.rs
//! Clearly-flagged sample postings for the HTTP boundary when every source failed.
//! The engine never calls into this module.

use chrono::{SecondsFormat, Utc};

use crate::protocol::OpportunityOut;

pub const SAMPLE_SOURCE: &str = "Sample";
pub const SAMPLE_MATCH_SCORE: f32 = 70.0;
const DEFAULT_SAMPLE_LOCATION: &str = "Remote / Hybrid / On-site";

const COMPANIES: &[(&str, &str)] = &[
    ("Google", "google.com"),
    ("Microsoft", "microsoft.com"),
    ("Amazon", "amazon.jobs"),
    ("Meta", "meta.com"),
    ("Apple", "apple.com"),
    ("Netflix", "jobs.netflix.com"),
    ("Uber", "uber.com"),
    ("Airbnb", "airbnb.com"),
    ("Stripe", "stripe.com"),
    ("Salesforce", "salesforce.com"),
    ("Adobe", "adobe.com"),
    ("Oracle", "oracle.com"),
    ("IBM", "ibm.com"),
    ("Intel", "intel.com"),
    ("NVIDIA", "nvidia.com"),
    ("Tesla", "tesla.com"),
    ("Spotify", "spotify.com"),
    ("GitHub", "github.com"),
    ("MongoDB", "mongodb.com"),
    ("Databricks", "databricks.com"),
];

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut cs = w.chars();
            match cs.next() {
                Some(f) => f.to_uppercase().chain(cs.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn titles(query: &str) -> Vec<String> {
    let q = query.to_lowercase();
    if q.contains("data") || q.contains("science") {
        [
            "Data Science Intern",
            "Machine Learning Intern",
            "Data Engineering Intern",
            "AI/ML Intern",
            "Analytics Intern",
        ]
        .map(String::from)
        .to_vec()
    } else if q.contains("software") || q.contains("engineer") {
        [
            "Software Engineering Intern",
            "Full Stack Intern",
            "Backend Engineering Intern",
            "Frontend Engineering Intern",
            "DevOps Intern",
        ]
        .map(String::from)
        .to_vec()
    } else {
        let t = title_case(query.trim());
        vec![
            format!("{t} Intern"),
            format!("Summer {t} Intern"),
            format!("{t} Internship Program"),
            format!("Engineering Intern ({})", query.trim()),
        ]
    }
}

fn description(i: usize, company: &str, title: &str) -> String {
    match i % 3 {
        0 => format!(
            "Join {company} as a {title} and work on real projects with experienced engineers."
        ),
        1 => format!("{title} opportunity at {company}, with mentorship and hands-on work."),
        _ => format!("{company} is looking for a {title} to join the team."),
    }
}

/// Deterministic sample set: at most one posting per company in the list.
pub fn sample_internships(query: &str, location: Option<&str>, count: usize) -> Vec<OpportunityOut> {
    let titles = titles(query);
    let location = location
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(DEFAULT_SAMPLE_LOCATION);
    let scraped_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    COMPANIES
        .iter()
        .take(count)
        .enumerate()
        .map(|(i, (company, domain))| {
            let title = titles[i % titles.len()].clone();
            OpportunityOut {
                description: description(i, company, &title),
                title,
                company: company.to_string(),
                location: location.to_string(),
                url: format!("https://{domain}/careers"),
                source: SAMPLE_SOURCE.to_string(),
                match_score: SAMPLE_MATCH_SCORE,
                matched_keywords: Vec::new(),
                scraped_at: scraped_at.clone(),
                tier_used: None,
                sources: vec![SAMPLE_SOURCE.to_string()],
            }
        })
        .collect()
}
