//! Pattern-based tag generation from session content.
//!
//! Scores candidate tags against three pattern tables (tools, activities,
//! technologies) plus two fixed-weight metadata tags (project, harness), then
//! returns the top 15 by score, ties broken by first-seen order — matching a
//! stable sort over an insertion-ordered map.

use claude_view_core::types::{Message, Session};
use regex_lite::Regex;
use std::sync::OnceLock;

const MAX_TAGS: usize = 15;
const TOOL_WEIGHT: f64 = 2.0;
const ACTIVITY_WEIGHT: f64 = 1.5;
const TECH_WEIGHT: f64 = 1.0;
const METADATA_WEIGHT: f64 = 0.5;

/// `(pattern, tag or tag template containing "{0}")`.
type PatternTable = &'static [(&'static str, &'static str)];

const TOOL_PATTERNS: PatternTable = &[
    (r"(?i)agent-do\s+(\w+)", "tool:agent-do-{0}"),
    (r"(?i)\bgit\s+(commit|push|pull|rebase|merge|branch|checkout)", "tool:git"),
    (r"(?i)\bnpm\s+(install|run|test|build|start)", "tool:npm"),
    (r"(?i)\bdocker\s+(build|run|compose|push|pull)", "tool:docker"),
    (r"(?i)\bpytest\b", "tool:pytest"),
    (r"(?i)\bpython\s+-m\s+pytest", "tool:pytest"),
    (r"(?i)\brg\b|\bripgrep\b", "tool:ripgrep"),
    (r"(?i)\blsp_\w+", "tool:lsp"),
    (r"(?i)\bast_grep", "tool:ast-grep"),
    (r"(?i)\bgrep\b", "tool:grep"),
    (r"(?i)\bfind\b", "tool:find"),
    (r"(?i)\bls\b", "tool:ls"),
    (r"(?i)\bcat\b", "tool:cat"),
    (r"(?i)\bsed\b", "tool:sed"),
    (r"(?i)\bawk\b", "tool:awk"),
    (r"(?i)\bjq\b", "tool:jq"),
    (r"(?i)\bcurl\b", "tool:curl"),
    (r"(?i)\bwget\b", "tool:wget"),
    (r"(?i)\bvim\b|\bvi\b", "tool:vim"),
    (r"(?i)\btmux\b", "tool:tmux"),
    (r"(?i)\bvscode\b|\bcode\b", "tool:vscode"),
];

const ACTIVITY_PATTERNS: PatternTable = &[
    (r"(?i)\b(fix|debug|troubleshoot|diagnose|trace|profile)\b", "debugging"),
    (r"(?i)\b(implement|add|create|build|write|develop)\b", "implementing"),
    (r"(?i)\b(refactor|restructure|reorganize|rewrite|clean|simplify)\b", "refactoring"),
    (r"(?i)\b(test|spec|coverage|assert|validate|verify)\b", "testing"),
    (r"(?i)\b(document|comment|explain|describe|annotate)\b", "documenting"),
    (r"(?i)\b(review|audit|analyze|inspect|examine)\b", "reviewing"),
    (r"(?i)\b(optimize|improve|enhance|speed|performance)\b", "optimizing"),
    (r"(?i)\b(deploy|release|publish|ship|launch)\b", "deploying"),
    (r"(?i)\b(migrate|upgrade|update|patch|version)\b", "migrating"),
    (r"(?i)\b(integrate|connect|link|bind|wire)\b", "integrating"),
];

const TECH_PATTERNS: PatternTable = &[
    (r"(?i)\breact\b", "react"),
    (r"(?i)\bvue\b", "vue"),
    (r"(?i)\bangular\b", "angular"),
    (r"(?i)\bsvelte\b", "svelte"),
    (r"(?i)\bnext\.?js\b", "nextjs"),
    (r"(?i)\bnuxt\b", "nuxt"),
    (r"(?i)\bast?ro\b", "astro"),
    (r"(?i)\bpython\b", "python"),
    (r"(?i)\bjavascript\b|\bjs\b", "javascript"),
    (r"(?i)\btypescript\b|\bts\b", "typescript"),
    (r"(?i)\bruby\b", "ruby"),
    (r"(?i)\bjava\b", "java"),
    (r"(?i)\bgo\b|\bgolang\b", "go"),
    (r"(?i)\brust\b", "rust"),
    (r"(?i)\bc\+\+\b|\bcpp\b", "cpp"),
    (r"(?i)\bc#\b|\bcsharp\b", "csharp"),
    (r"(?i)\bphp\b", "php"),
    (r"(?i)\bpostgres\b|\bpostgresql\b", "postgres"),
    (r"(?i)\bmysql\b", "mysql"),
    (r"(?i)\bsqlite\b", "sqlite"),
    (r"(?i)\bmongodb\b|\bmongo\b", "mongodb"),
    (r"(?i)\bredis\b", "redis"),
    (r"(?i)\bfirebase\b", "firebase"),
    (r"(?i)\bdynamodb\b", "dynamodb"),
    (r"(?i)\bprisma\b", "prisma"),
    (r"(?i)\bdrizzle\b", "drizzle"),
    (r"(?i)\btypeorm\b", "typeorm"),
    (r"(?i)\bsqlalchemy\b", "sqlalchemy"),
    (r"(?i)\bsequelize\b", "sequelize"),
    (r"(?i)\bjest\b", "jest"),
    (r"(?i)\bvitest\b", "vitest"),
    (r"(?i)\bmocha\b", "mocha"),
    (r"(?i)\brspec\b", "rspec"),
    (r"(?i)\bunittest\b", "unittest"),
    (r"(?i)\bwebpack\b", "webpack"),
    (r"(?i)\bvite\b", "vite"),
    (r"(?i)\besbuild\b", "esbuild"),
    (r"(?i)\brollup\b", "rollup"),
    (r"(?i)\bpnpm\b", "pnpm"),
    (r"(?i)\byarn\b", "yarn"),
    (r"(?i)\bcloudflare\b", "cloudflare"),
    (r"(?i)\baws\b", "aws"),
    (r"(?i)\bazure\b", "azure"),
    (r"(?i)\bgcp\b|\bgoogle\s+cloud\b", "gcp"),
    (r"(?i)\bvercel\b", "vercel"),
    (r"(?i)\bnetlify\b", "netlify"),
    (r"(?i)\bheroku\b", "heroku"),
    (r"(?i)\bdocker\b", "docker"),
    (r"(?i)\bkubernetes\b|\bk8s\b", "kubernetes"),
    (r"(?i)\bexpress\b", "express"),
    (r"(?i)\bfastapi\b", "fastapi"),
    (r"(?i)\bdjango\b", "django"),
    (r"(?i)\brails\b", "rails"),
    (r"(?i)\bflask\b", "flask"),
    (r"(?i)\bhono\b", "hono"),
    (r"(?i)\bfastify\b", "fastify"),
    (r"(?i)\bgraphql\b", "graphql"),
    (r"(?i)\brest\b", "rest"),
    (r"(?i)\bgit\b", "git"),
    (r"(?i)\bai\b|\bllm\b|\bgpt\b", "ai"),
    (r"(?i)\bapi\b", "api"),
    (r"(?i)\bauth\b|\bauthentication\b", "auth"),
    (r"(?i)\bcache\b|\bcaching\b", "caching"),
    (r"(?i)\bsearch\b", "search"),
    (r"(?i)\bindex\b|\bindexing\b", "indexing"),
];

fn build(table: PatternTable) -> Vec<(Regex, &'static str)> {
    table
        .iter()
        .map(|(pattern, tag)| (Regex::new(pattern).expect("static pattern is valid"), *tag))
        .collect()
}

fn tool_patterns() -> &'static Vec<(Regex, &'static str)> {
    static TOOLS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    TOOLS.get_or_init(|| build(TOOL_PATTERNS))
}

fn activity_patterns() -> &'static Vec<(Regex, &'static str)> {
    static ACTIVITIES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    ACTIVITIES.get_or_init(|| build(ACTIVITY_PATTERNS))
}

fn tech_patterns() -> &'static Vec<(Regex, &'static str)> {
    static TECH: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    TECH.get_or_init(|| build(TECH_PATTERNS))
}

/// Insertion-ordered tag -> score accumulator. A plain `Vec` plus an index
/// map keeps the first-seen order needed for a stable tiebreak.
struct TagScores {
    order: Vec<String>,
    scores: std::collections::HashMap<String, f64>,
}

impl TagScores {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            scores: std::collections::HashMap::new(),
        }
    }

    fn add(&mut self, tag: String, weight: f64) {
        if let Some(score) = self.scores.get_mut(&tag) {
            *score += weight;
        } else {
            self.scores.insert(tag.clone(), weight);
            self.order.push(tag);
        }
    }

    /// Top `limit` tags, highest score first, ties broken by first-seen order.
    fn top(self, limit: usize) -> Vec<String> {
        let mut indexed: Vec<(usize, String, f64)> = self
            .order
            .into_iter()
            .enumerate()
            .map(|(i, tag)| {
                let score = self.scores[&tag];
                (i, tag, score)
            })
            .collect();
        indexed.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap().then(a.0.cmp(&b.0)));
        indexed.into_iter().take(limit).map(|(_, tag, _)| tag).collect()
    }
}

fn expand_template(template: &str, captured: Option<&str>) -> String {
    if let Some(value) = captured {
        template.replace("{0}", &value.to_lowercase())
    } else {
        template.to_string()
    }
}

/// Derive up to 15 tags from a session's metadata and message content.
pub fn generate_tags(session: &Session, messages: &[Message]) -> Vec<String> {
    let mut text_parts: Vec<&str> = Vec::new();
    if !session.title.is_empty() {
        text_parts.push(&session.title);
    }
    if !session.first_prompt.is_empty() {
        text_parts.push(&session.first_prompt);
    }
    if !session.last_prompt.is_empty() {
        text_parts.push(&session.last_prompt);
    }
    if !session.last_response.is_empty() {
        text_parts.push(&session.last_response);
    }
    for msg in messages {
        if !msg.content.is_empty() {
            text_parts.push(&msg.content);
        }
    }
    let full_text = text_parts.join(" ");

    let mut scores = TagScores::new();

    for (regex, template) in tool_patterns() {
        for caps in regex.captures_iter(&full_text) {
            let captured = caps.get(1).map(|m| m.as_str());
            scores.add(expand_template(template, captured), TOOL_WEIGHT);
        }
    }

    for (regex, tag) in activity_patterns() {
        if regex.is_match(&full_text) {
            scores.add(tag.to_string(), ACTIVITY_WEIGHT);
        }
    }

    for (regex, tag) in tech_patterns() {
        for _ in regex.find_iter(&full_text) {
            scores.add(tag.to_string(), TECH_WEIGHT);
        }
    }

    if !session.project_name.is_empty() {
        scores.add(format!("project:{}", session.project_name.to_lowercase()), METADATA_WEIGHT);
    }
    if !session.harness.is_empty() {
        scores.add(format!("harness:{}", session.harness.to_lowercase()), METADATA_WEIGHT);
    }

    scores.top(MAX_TAGS)
}
