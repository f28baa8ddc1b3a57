//! Synthetic issue payloads for the populate direction.
//!
//! [`TemplateGenerator`] fills incident-style templates with randomized
//! server and database names. Server names are deliberately irregular (mixed
//! casing, an occasional missing dash, sometimes absent) so downstream
//! consumers see realistic noise.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Issue categories and their description templates
///
/// Placeholders: `{server}`, `{server2}`, `{db_name}`.
pub const TECHNOLOGY_TEMPLATES: &[(&str, &[&str])] = &[
    (
        "database",
        &[
            "Database {db_name} on {server} is experiencing slow query performance",
            "{server} PostgreSQL connection pool exhausted",
            "MySQL replication lag on {server} exceeds 10 seconds",
            "Oracle backup failed on {server} - tablespace full",
            "{server} MongoDB replica set member unreachable",
        ],
    ),
    (
        "networking",
        &[
            "Network connectivity issues between {server} and {server2}",
            "{server} experiencing packet loss to gateway",
            "VPN tunnel down affecting {server}",
            "Firewall blocking port 443 on {server}",
            "{server} DNS resolution failures",
        ],
    ),
    (
        "authentication",
        &[
            "LDAP authentication failing on {server}",
            "Users unable to login to {server} - Active Directory timeout",
            "{server} Kerberos ticket expiration issues",
            "SSO integration broken on {server}",
            "Failed login attempts from {server} exceed threshold",
        ],
    ),
    (
        "api",
        &[
            "{server} REST API returning 500 errors",
            "API rate limiting triggered on {server}",
            "{server} GraphQL endpoint timeout",
            "Webhook delivery failures from {server}",
            "{server} API gateway health check failing",
        ],
    ),
    (
        "storage",
        &[
            "Disk space critically low on {server} - 95% full",
            "{server} NFS mount unresponsive",
            "S3 bucket access denied from {server}",
            "{server} RAID array degraded - drive failure",
            "Backup volume on {server} out of space",
        ],
    ),
];

const SERVER_PREFIXES: &[&str] = &["srv-", "SRV-", "Srv-", "sRv-"];

/// One issue-creation request body
///
/// Serializes to the tracker's `fields` shape with the description as a
/// single-paragraph Atlassian document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Issue fields
    pub fields: IssueFields,
}

/// Fields of a created issue
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IssueFields {
    /// Target project
    pub project: ProjectRef,
    /// One-line summary
    pub summary: String,
    /// Rich-text description
    pub description: Document,
    /// Issue type
    #[serde(rename = "issuetype")]
    pub issue_type: IssueTypeRef,
}

/// Project reference by key
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectRef {
    /// Project key
    pub key: String,
}

/// Issue type reference by name
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IssueTypeRef {
    /// Type name
    pub name: String,
}

/// Atlassian document node
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Node type ("doc", "paragraph", "text")
    #[serde(rename = "type")]
    pub kind: String,
    /// Document format version (root node only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// Text (text nodes only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Child nodes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<Document>,
}

impl Document {
    /// A document holding one paragraph of plain text
    pub fn paragraph(text: impl Into<String>) -> Self {
        let text_node = Document {
            kind: "text".into(),
            version: None,
            text: Some(text.into()),
            content: Vec::new(),
        };
        let paragraph = Document {
            kind: "paragraph".into(),
            version: None,
            text: None,
            content: vec![text_node],
        };
        Document {
            kind: "doc".into(),
            version: Some(1),
            text: None,
            content: vec![paragraph],
        }
    }
}

impl Payload {
    /// Build a task payload for `project_key`
    pub fn task(
        project_key: impl Into<String>,
        summary: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            fields: IssueFields {
                project: ProjectRef {
                    key: project_key.into(),
                },
                summary: summary.into(),
                description: Document::paragraph(description),
                issue_type: IssueTypeRef {
                    name: "Task".into(),
                },
            },
        }
    }

    /// Plain description text
    pub fn description_text(&self) -> Option<&str> {
        self.fields
            .description
            .content
            .first()?
            .content
            .first()?
            .text
            .as_deref()
    }
}

/// Supplies payloads for a populate run
pub trait PayloadSource: Send {
    /// Produce the next payload
    fn next_payload(&mut self) -> Payload;
}

/// Generates incident-style payloads from [`TECHNOLOGY_TEMPLATES`]
#[derive(Debug)]
pub struct TemplateGenerator {
    project_key: String,
    rng: StdRng,
}

impl TemplateGenerator {
    /// Generator seeded from system entropy
    pub fn new(project_key: impl Into<String>) -> Self {
        Self {
            project_key: project_key.into(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic generator
    pub fn with_seed(project_key: impl Into<String>, seed: u64) -> Self {
        Self {
            project_key: project_key.into(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Random server name; `None` about 5% of the time
    fn server_name(&mut self) -> Option<String> {
        if self.rng.gen_bool(0.05) {
            return None;
        }
        let number: u32 = self.rng.gen_range(100..=9999);
        if self.rng.gen_bool(0.02) {
            return Some(format!("srv{number}"));
        }
        let prefix = SERVER_PREFIXES.choose(&mut self.rng).copied().unwrap_or("srv-");
        Some(format!("{prefix}{number}"))
    }
}

impl PayloadSource for TemplateGenerator {
    fn next_payload(&mut self) -> Payload {
        let (category, templates) = TECHNOLOGY_TEMPLATES
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(TECHNOLOGY_TEMPLATES[0]);
        let template = templates.choose(&mut self.rng).copied().unwrap_or_default();

        let server = self
            .server_name()
            .unwrap_or_else(|| "unknown-server".to_string());
        let server2 = self.server_name().unwrap_or_else(|| "gateway".to_string());
        let db_name = format!("DB_{}", self.rng.gen_range(1..=100));

        let description = template
            .replace("{server2}", &server2)
            .replace("{server}", &server)
            .replace("{db_name}", &db_name);
        let summary = format!("[{}] Issue detected on {}", category.to_uppercase(), server);

        Payload::task(self.project_key.clone(), summary, description)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_serializes_to_tracker_shape() {
        let payload = Payload::task("OPS", "[API] Issue detected on srv-1", "boom");

        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "fields": {
                    "project": {"key": "OPS"},
                    "summary": "[API] Issue detected on srv-1",
                    "description": {
                        "type": "doc",
                        "version": 1,
                        "content": [{
                            "type": "paragraph",
                            "content": [{"type": "text", "text": "boom"}]
                        }]
                    },
                    "issuetype": {"name": "Task"}
                }
            })
        );
        assert_eq!(payload.description_text(), Some("boom"));
    }

    #[test]
    fn generated_payloads_fill_every_placeholder() {
        let mut generator = TemplateGenerator::with_seed("OPS", 7);

        for _ in 0..500 {
            let payload = generator.next_payload();
            let text = payload.description_text().unwrap();

            assert!(!text.contains('{'), "unfilled placeholder in {text:?}");
            assert_eq!(payload.fields.project.key, "OPS");
            assert!(payload.fields.summary.starts_with('['));
            assert!(payload.fields.summary.contains("] Issue detected on "));
        }
    }

    #[test]
    fn seeded_generators_are_deterministic() {
        let mut a = TemplateGenerator::with_seed("OPS", 42);
        let mut b = TemplateGenerator::with_seed("OPS", 42);

        for _ in 0..20 {
            assert_eq!(a.next_payload(), b.next_payload());
        }
    }

    #[test]
    fn server_names_follow_known_shapes() {
        let mut generator = TemplateGenerator::with_seed("OPS", 3);

        for _ in 0..1000 {
            if let Some(name) = generator.server_name() {
                let lower = name.to_lowercase();
                let digits = lower
                    .strip_prefix("srv-")
                    .or_else(|| lower.strip_prefix("srv"))
                    .unwrap();
                let number: u32 = digits.parse().unwrap();
                assert!((100..=9999).contains(&number), "bad number in {name}");
            }
        }
    }
}
