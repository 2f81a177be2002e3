//! Prompt construction and reply parsing for query generation.

use serde::Deserialize;
use std::collections::HashMap;

/// Tables offered to the generator as likely present in an AKS workspace.
pub const AI_KNOWN_TABLES: &[&str] = &[
    "ContainerLogV2",
    "ContainerLog",
    "KubeEvents",
    "KubePodInventory",
    "KubeNodeInventory",
    "KubeServices",
    "KubePVInventory",
    "ContainerInventory",
    "ContainerImageInventory",
    "ContainerNodeInventory",
    "KubeHealth",
    "InsightsMetrics",
    "Perf",
    "Heartbeat",
    "AKSControlPlane",
    "AKSAudit",
    "AKSAuditAdmin",
    "KubeMonAgentEvents",
    "Syslog",
];

/// Keyword categories and the tables each one points at.
const CATEGORIES: &[(&[&str], &[&str])] = &[
    (
        &[
            "failed", "fail", "error", "crash", "restart", "restarting", "down", "broken",
            "issue", "problem", "why", "what happened", "not working", "stuck",
        ],
        &["ContainerLogV2", "KubeEvents", "KubePodInventory"],
    ),
    (
        &["log", "logs", "message", "output", "stdout", "stderr", "console"],
        &["ContainerLogV2"],
    ),
    (
        &[
            "event", "events", "warning", "backoff", "killing", "created", "started",
            "scheduled",
        ],
        &["KubeEvents"],
    ),
    (
        &[
            "inventory", "status", "state", "running", "pending", "list", "show me", "get",
            "find",
        ],
        &["KubePodInventory", "KubeNodeInventory"],
    ),
    (
        &["metric", "performance", "cpu", "memory", "usage", "resource", "utilization"],
        &["InsightsMetrics", "Perf"],
    ),
    (
        &["node", "nodes", "worker", "master", "cluster"],
        &["KubeNodeInventory"],
    ),
];

const POD_FAILURE_WORDS: &[&str] = &["failed", "error", "crash", "restart", "why", "problem"];

const RESPONSE_SCHEMA: &str = r#"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "type": "object",
  "properties": {
    "kql": {
      "type": "string",
      "description": "The executable KQL query"
    },
    "tables_used": {
      "type": "array",
      "items": {
        "type": "string"
      },
      "description": "List of tables referenced in the query"
    }
  },
  "required": ["kql", "tables_used"],
  "additionalProperties": false
}"#;

const FIX_RESPONSE_SCHEMA: &str = r#"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "type": "object",
  "properties": {
    "kql": {
      "type": "string",
      "description": "The fixed executable KQL query"
    },
    "tables_used": {
      "type": "array",
      "items": {
        "type": "string"
      },
      "description": "List of tables referenced in the query"
    },
    "fix_explanation": {
      "type": "string",
      "description": "Brief explanation of what was fixed"
    }
  },
  "required": ["kql", "tables_used", "fix_explanation"],
  "additionalProperties": false
}"#;

/// Ranks the available tables by keyword matches against the question.
///
/// Returns every table with a positive score, in the order of `available`.
///
/// # Example
///
/// ```
/// use gather::ai::prompt::suggest_tables;
///
/// let available = ["ContainerLogV2", "KubeEvents", "KubePodInventory", "Perf"];
/// let suggested = suggest_tables("why does my pod crash?", &available);
/// assert_eq!(suggested, vec!["ContainerLogV2", "KubeEvents", "KubePodInventory"]);
/// ```
#[must_use]
pub fn suggest_tables<'a, S: AsRef<str>>(question: &str, available: &'a [S]) -> Vec<&'a str> {
    let question = question.to_lowercase();
    let mut scores: HashMap<&str, usize> = HashMap::new();
    let is_available = |table: &str| available.iter().any(|t| t.as_ref() == table);
    let mut bump = |table: &'static str, by: usize| {
        if by > 0 && is_available(table) {
            *scores.entry(table).or_default() += by;
        }
    };

    for (keywords, tables) in CATEGORIES {
        let hits = keywords.iter().filter(|k| question.contains(**k)).count();
        for table in *tables {
            bump(*table, hits);
        }
    }
    if question.contains("pod") {
        bump("KubePodInventory", 2);
        if POD_FAILURE_WORDS.iter().any(|w| question.contains(w)) {
            bump("ContainerLogV2", 3);
        }
    }
    if question.contains("container") {
        bump("ContainerLogV2", 2);
    }

    available
        .iter()
        .map(|t| t.as_ref())
        .filter(|t| scores.get(t).is_some_and(|s| *s > 0))
        .collect()
}

/// Builds the prompt asking for a query that answers `question`.
#[must_use]
pub fn generation_prompt<S: AsRef<str>>(question: &str, available: &[S]) -> String {
    let tables = join(available);
    let suggested = suggest_tables(question, available);
    let guidance = if suggested.is_empty() {
        String::new()
    } else {
        format!(
            "\n\nRECOMMENDED TABLES for this query: {}\nThese tables are likely to contain the most relevant data for your specific query.",
            suggested.join(", ")
        )
    };

    format!(
        r#"You are a KQL (Kusto Query Language) expert helping to generate queries for Azure Log Analytics workspace data related to Kubernetes/AKS clusters.

User Query: "{question}"

Available Tables: {tables}{guidance}

IMPORTANT: Before generating the KQL query, you MUST look at the table schema documentation in @docs/tables/ for any tables you plan to use. Each table has a corresponding .md file with the exact column names and types.

Steps to follow:
1. First, identify which tables you need for the query
2. Look at the corresponding .md files in @docs/tables/ to get the exact schema and column names
3. Generate the KQL query using only the actual column names from the documentation

Generate a KQL query that answers the user's question. The query should:
1. Use appropriate tables from the available list
2. Include proper time filtering (use TimeGenerated column)
3. Be efficient and focused on the user's specific request
4. Include ONLY columns that actually exist in the table schemas (verify from docs/tables/)
5. Use proper KQL syntax and functions
6. Limit results appropriately (use 'take' or 'top' when needed)

CRITICAL: You must respond with a valid JSON object that conforms to this schema:

{RESPONSE_SCHEMA}

Example response:
{{
  "kql": "KubePodInventory | where Namespace == 'default' | project TimeGenerated, Name, PodStatus",
  "tables_used": ["KubePodInventory"]
}}

Return ONLY valid JSON. No other text before or after."#
    )
}

/// Builds the prompt asking to repair a query the server rejected.
#[must_use]
pub fn fix_prompt<S: AsRef<str>>(
    question: &str,
    failed_query: &str,
    error: &str,
    available: &[S],
) -> String {
    let tables = join(available);
    format!(
        r#"You are a KQL expert helping to fix a broken query. The query failed validation with the following error:

ERROR: {error}

Original User Query: "{question}"
Broken KQL Query:
{failed_query}

Available Tables: {tables}

Please fix the KQL query by:
1. Looking at the table schema documentation in @docs/tables/ for any tables you plan to use
2. Correcting syntax errors, invalid column names, or table references
3. Ensuring the query still answers the original user question
4. Using only columns that exist in the table schemas

CRITICAL: You must respond with a valid JSON object that conforms to this schema:

{FIX_RESPONSE_SCHEMA}

Return ONLY valid JSON. No other text before or after."#
    )
}

/// Builds the prompt asking for a summary of the files in `results_dir`.
#[must_use]
pub fn analysis_prompt(question: &str, query: &str, results_dir: &str) -> String {
    format!(
        r#"You are a Kubernetes troubleshooting expert. Analyze the query results in directory {results_dir} to answer this question: "{question}"

The KQL query that was executed:
{query}

Please:
1. Read the JSON files in the directory (especially ai-query-results/table_*.json)
2. Analyze the data to understand what's happening with the Kubernetes resources
3. Provide a clear, actionable summary of your findings
4. Focus on the specific question asked
5. Include relevant timestamps, pod names, error messages, and restart counts
6. Suggest next steps or solutions if applicable

Structure your response with clear headings and bullet points for easy reading."#
    )
}

#[derive(Deserialize)]
struct GeneratedQuery {
    kql: String,
}

/// Pulls the query text out of a generator reply.
///
/// Accepts a bare JSON object with a `kql` field (optionally fenced), a JSON
/// object embedded between other lines, or plain query text. Plain text drops
/// blank lines, `//` comments, brace lines and lines mentioning `json`.
///
/// # Example
///
/// ```
/// use gather::ai::prompt::extract_query;
///
/// let reply = "```json\n{\"kql\": \"KubeEvents | take 10\", \"tables_used\": [\"KubeEvents\"]}\n```";
/// assert_eq!(extract_query(reply), "KubeEvents | take 10");
/// ```
#[must_use]
pub fn extract_query(reply: &str) -> String {
    let mut text = reply.trim();
    for prefix in ["```json", "```kql", "```"] {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest;
            break;
        }
    }
    let text = text.strip_suffix("```").unwrap_or(text).trim();

    if let Ok(parsed) = serde_json::from_str::<GeneratedQuery>(text) {
        return parsed.kql.trim().to_string();
    }

    let mut block = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.starts_with('{') || !block.is_empty() {
            block.push(line);
        }
        if !block.is_empty() && line.ends_with('}') {
            break;
        }
    }
    if !block.is_empty() {
        if let Ok(parsed) = serde_json::from_str::<GeneratedQuery>(&block.join("\n")) {
            return parsed.kql.trim().to_string();
        }
    }

    text.lines()
        .map(str::trim)
        .filter(|l| {
            !l.is_empty()
                && !l.starts_with("//")
                && !l.starts_with('{')
                && !l.starts_with('}')
                && !l.contains("json")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn join<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|t| t.as_ref())
        .collect::<Vec<_>>()
        .join(", ")
}
