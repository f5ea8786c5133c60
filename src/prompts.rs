//! Prompt assembly and post-processing for the brief, generation, config
//! and edit calls.
//!
//! Generated source never carries its own import statements. The template's
//! import header is lifted off before the model sees the file and put back
//! verbatim afterwards; output that still contains an import line is
//! rejected with [`LlmError::ConstraintViolation`].

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{decode_envelope, strip_code_fences, LlmError};

/// Minimum length of a generated file before the model is asked again.
pub const MIN_GENERATED_CHARS: usize = 200;

static IMPORT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*import[\s{*'"]"#).expect("static regex is valid"));
static SECTION_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(/?)section\b[^>]*>").expect("static regex is valid"));

const NO_IMPORTS_RULE: &str = "Do not write any import statements. The import header of the \
     file is managed separately and will be added back unchanged; every component and helper \
     it imports is already in scope.";

// ── Brief ───────────────────────────────────────────────────────────────────

const BRIEF_SYSTEM: &str = "You are a web designer interviewing a small-business owner about \
their new website. Ask one short question at a time about audience, tone, services, colour and \
imagery preferences, calls to action and anything on their current site they want kept or \
dropped. When you have enough to design the site, reply with only a JSON object of the form \
{\"message\": \"<closing note to the owner>\", \"brief\": {\"businessName\": ..., \"audience\": ..., \
\"tone\": ..., \"services\": [...], \"palette\": [...], \"pages\": [...], \"callsToAction\": [...], \
\"notes\": ...}} and nothing else.";

/// Conversation turn as sent by the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BriefTurn {
    pub role: crate::llm::Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct BriefEnvelope {
    message: String,
    brief: Value,
}

/// One model turn of the brief conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum BriefReply {
    /// The model wants more information.
    Question(String),
    /// The model produced the finished brief.
    Complete { message: String, brief: Value },
}

pub fn brief_system_prompt(business_name: Option<&str>, scraped_summary: Option<&Value>) -> String {
    let mut prompt = String::from(BRIEF_SYSTEM);
    if let Some(name) = business_name {
        prompt.push_str(&format!("\n\nThe business is called \"{}\".", name));
    }
    if let Some(summary) = scraped_summary {
        prompt.push_str(
            "\n\nThis is what was scraped from their current website. Do not ask for facts it \
             already answers:\n",
        );
        prompt.push_str(&summary.to_string());
    }
    prompt
}

/// A reply that looks like the final JSON object must decode as one; any
/// other reply is a follow-up question.
pub fn parse_brief_reply(reply: &str) -> Result<BriefReply, LlmError> {
    let cleaned = strip_code_fences(reply);
    if !(cleaned.starts_with('{') && cleaned.contains("\"brief\"")) {
        return Ok(BriefReply::Question(reply.trim().to_string()));
    }
    let env: BriefEnvelope = decode_envelope(&cleaned, &["message", "brief"])?;
    if !env.brief.is_object() {
        return Err(LlmError::MalformedJson("brief is not an object".into()));
    }
    Ok(BriefReply::Complete { message: env.message, brief: env.brief })
}

// ── File generation ─────────────────────────────────────────────────────────

pub struct GenerationInput<'a> {
    pub path: &'a str,
    /// Template body with its import header already removed.
    pub template: &'a str,
    pub guide: Option<&'a str>,
    pub brief: &'a Value,
    pub site_config: Option<&'a Value>,
    pub scraped: Option<&'a Value>,
}

pub fn generation_prompt(input: &GenerationInput<'_>) -> (String, String) {
    let mut system = String::from(
        "You rewrite website template files for a specific business. Keep the template's \
         structure, components, props and styling system. Replace placeholder copy, images and \
         links with content that fits the brief and the business's real details. Reply with the \
         complete file content only, no explanation and no Markdown fences. ",
    );
    system.push_str(NO_IMPORTS_RULE);
    if let Some(guide) = input.guide {
        system.push_str("\n\nTemplate guide:\n");
        system.push_str(guide);
    }

    let mut user = format!("Creative brief:\n{}\n", input.brief);
    if let Some(cfg) = input.site_config {
        user.push_str(&format!("\nSite config:\n{}\n", cfg));
    }
    if let Some(scraped) = input.scraped {
        user.push_str(&format!("\nContent from the existing site:\n{}\n", scraped));
    }
    user.push_str(&format!("\nTemplate file `{}`:\n{}", input.path, input.template));
    (system, user)
}

// ── Site config ─────────────────────────────────────────────────────────────

pub fn config_prompt(template_config: &str, guide: Option<&str>, brief: &Value, scraped: Option<&Value>) -> (String, String) {
    let mut system = String::from(
        "You fill in a website's configuration JSON. Keep every key of the template, with the \
         same value types, and fill each one for the business described. Use real contact \
         details from the scraped site when present and never invent phone numbers, emails or \
         addresses. Reply with the JSON object only.",
    );
    if let Some(guide) = guide {
        system.push_str("\n\nTemplate guide:\n");
        system.push_str(guide);
    }
    let mut user = format!("Creative brief:\n{}\n", brief);
    if let Some(scraped) = scraped {
        user.push_str(&format!("\nContent from the existing site:\n{}\n", scraped));
    }
    user.push_str(&format!("\nTemplate config:\n{}", template_config));
    (system, user)
}

/// Top-level keys of the template config; all of them must come back.
pub fn required_config_keys(template_config: &Value) -> Vec<String> {
    template_config
        .as_object()
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default()
}

// ── Edit ────────────────────────────────────────────────────────────────────

pub fn edit_prompt(path: &str, code: &str, instruction: &str, section: Option<&str>) -> (String, String) {
    let mut system = String::from(
        "You edit one file of a live website. Apply the owner's instruction and change nothing \
         else. Reply with only a JSON object {\"explanation\": \"<one or two sentences for the \
         owner>\", \"code\": \"<the full edited code>\"}. ",
    );
    system.push_str(NO_IMPORTS_RULE);

    let scope = match section {
        Some(id) => format!("the `{}` section of `{}`", id, path),
        None => format!("`{}`", path),
    };
    let user = format!("Instruction: {}\n\nCurrent code of {}:\n{}", instruction, scope, code);
    (system, user)
}

// ── Import header ───────────────────────────────────────────────────────────

/// Import lines lifted from a source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportHeader {
    pub lines: Vec<String>,
    /// The imports sat inside `---` frontmatter.
    pub frontmatter: bool,
}

fn is_import_line(line: &str) -> bool {
    IMPORT_LINE.is_match(line)
}

/// Split `source` into its import header and the rest. In a file with `---`
/// frontmatter, imports are taken from the frontmatter; otherwise from the
/// leading block of the file. Multi-line `import { … }` statements are kept
/// whole.
pub fn split_imports(source: &str) -> (ImportHeader, String) {
    let lines: Vec<&str> = source.lines().collect();
    let frontmatter = lines.first().map(|l| l.trim() == "---").unwrap_or(false);
    let fm_end = if frontmatter {
        lines.iter().skip(1).position(|l| l.trim() == "---").map(|p| p + 1)
    } else {
        None
    };

    let mut header = ImportHeader { lines: Vec::new(), frontmatter: fm_end.is_some() };
    let mut rest = Vec::with_capacity(lines.len());
    let mut in_import = false;
    let mut leading = true;

    for (i, line) in lines.iter().enumerate() {
        let scannable = match fm_end {
            Some(end) => i > 0 && i < end,
            None => leading,
        };
        if in_import {
            header.lines.push(line.to_string());
            if line.contains('}') || line.trim_end().ends_with(';') {
                in_import = false;
            }
            continue;
        }
        if scannable && is_import_line(line) {
            header.lines.push(line.to_string());
            in_import = line.contains('{') && !line.contains('}');
            continue;
        }
        if fm_end.is_none() && !line.trim().is_empty() && !line.trim_start().starts_with("//") {
            leading = false;
        }
        rest.push(*line);
    }

    let mut body = rest.join("\n");
    if source.ends_with('\n') {
        body.push('\n');
    }
    (header, body)
}

/// Fail when generated code still carries import statements.
pub fn reject_imports(code: &str) -> Result<(), LlmError> {
    match code.lines().find(|l| is_import_line(l)) {
        Some(line) => Err(LlmError::ConstraintViolation(format!(
            "output contains an import statement: {}",
            line.trim()
        ))),
        None => Ok(()),
    }
}

/// Put `header` back on `body`: right after the opening `---` when the body
/// has frontmatter, in a new frontmatter block when the header came from
/// one, otherwise at the top.
pub fn attach_imports(header: &ImportHeader, body: &str) -> String {
    if header.lines.is_empty() {
        return body.to_string();
    }
    let imports = header.lines.join("\n");
    let trimmed = body.trim_start();
    if let Some(after) = trimmed.strip_prefix("---") {
        let after = after.strip_prefix('\n').unwrap_or(after);
        return format!("---\n{}\n{}", imports, after);
    }
    if header.frontmatter {
        return format!("---\n{}\n---\n{}", imports, trimmed);
    }
    format!("{}\n\n{}", imports, trimmed)
}

/// Check generated output and restore the template's import header.
pub fn finish_generated(header: &ImportHeader, raw: &str) -> Result<String, LlmError> {
    let code = strip_code_fences(raw);
    reject_imports(&code)?;
    let mut out = attach_imports(header, &code);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

// ── Sections ────────────────────────────────────────────────────────────────

/// Byte range of the `<section id="…">` element named `id`, tags included.
pub fn find_section(source: &str, id: &str) -> Option<Range<usize>> {
    let escaped = regex::escape(id);
    let id_attr = Regex::new(&format!(r#"\s(?i:id)\s*=\s*(?:"{0}"|'{0}')"#, escaped)).ok()?;

    let mut tags = SECTION_TAG.captures_iter(source);
    let start = loop {
        let cap = tags.next()?;
        let tag = cap.get(0)?;
        if cap[1].is_empty() && id_attr.is_match(tag.as_str()) {
            break tag.start();
        }
    };

    let mut depth = 1usize;
    for cap in tags {
        if cap[1].is_empty() {
            depth += 1;
        } else {
            depth -= 1;
            if depth == 0 {
                return cap.get(0).map(|m| start..m.end());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASTRO: &str = "---\nimport Layout from '../layouts/Layout.astro';\nimport {\n  Hero,\n  Cta,\n} from '../components';\nconst title = 'Home';\n---\n<Layout title={title}>\n  <Hero />\n</Layout>\n";

    #[test]
    fn splits_frontmatter_imports() {
        let (header, body) = split_imports(ASTRO);
        assert!(header.frontmatter);
        assert_eq!(header.lines.len(), 5);
        assert_eq!(header.lines[0], "import Layout from '../layouts/Layout.astro';");
        assert_eq!(header.lines[4], "} from '../components';");
        assert!(body.starts_with("---\nconst title = 'Home';\n---\n"));
        assert!(!body.contains("import"));
    }

    #[test]
    fn reattaches_header_after_opening_fence() {
        let (header, body) = split_imports(ASTRO);
        let out = finish_generated(&header, &body).unwrap();
        assert_eq!(out, ASTRO);
    }

    #[test]
    fn wraps_header_in_frontmatter_when_output_lost_it() {
        let (header, _) = split_imports(ASTRO);
        let out = attach_imports(&header, "<Layout title=\"x\" />\n");
        assert!(out.starts_with("---\nimport Layout"));
        assert!(out.contains("---\n<Layout"));
    }

    #[test]
    fn leading_imports_in_plain_modules() {
        let src = "// site nav\nimport { Link } from './Link';\nimport './nav.css';\n\nexport function Nav() {\n  return null;\n}\n";
        let (header, body) = split_imports(src);
        assert!(!header.frontmatter);
        assert_eq!(header.lines, vec!["import { Link } from './Link';", "import './nav.css';"]);
        assert!(body.starts_with("// site nav\n\nexport function Nav"));
        let out = attach_imports(&header, &body);
        assert!(out.starts_with("import { Link } from './Link';\nimport './nav.css';\n\n// site nav"));
    }

    #[test]
    fn output_with_imports_is_rejected() {
        let (header, _) = split_imports(ASTRO);
        let err = finish_generated(&header, "---\nimport X from 'y';\n---\n<X />").unwrap_err();
        assert!(matches!(err, LlmError::ConstraintViolation(_)));
        assert!(reject_imports("<p>important notice</p>").is_ok());
    }

    #[test]
    fn finds_nested_section() {
        let src = "<main><section id=\"hero\"><h1>Hi</h1></section><section id='services'><section class=\"inner\">x</section></section></main>";
        let range = find_section(src, "services").unwrap();
        assert_eq!(&src[range], "<section id='services'><section class=\"inner\">x</section></section>");
        let hero = find_section(src, "hero").unwrap();
        assert_eq!(&src[hero], "<section id=\"hero\"><h1>Hi</h1></section>");
        assert!(find_section(src, "pricing").is_none());
    }

    #[test]
    fn lookalike_id_attributes_do_not_match() {
        let src = "<section data-id=\"hero\">decoy</section><section aria-id='hero'>decoy</section>\n<section class=\"top\"\n  id=\"hero\">real</section>";
        let range = find_section(src, "hero").unwrap();
        assert_eq!(&src[range], "<section class=\"top\"\n  id=\"hero\">real</section>");
        assert!(find_section("<section data-id=\"a.b\"></section><section id=\"axb\"></section>", "a.b").is_none());
    }

    #[test]
    fn unclosed_section_is_not_found() {
        assert!(find_section("<section id=\"hero\"><p>x</p>", "hero").is_none());
    }

    #[test]
    fn brief_question_passes_through() {
        let reply = parse_brief_reply("Who are your typical customers?").unwrap();
        assert_eq!(reply, BriefReply::Question("Who are your typical customers?".into()));
    }

    #[test]
    fn brief_completion_decodes() {
        let raw = "```json\n{\"message\": \"Thanks!\", \"brief\": {\"tone\": \"friendly\"}}\n```";
        match parse_brief_reply(raw).unwrap() {
            BriefReply::Complete { message, brief } => {
                assert_eq!(message, "Thanks!");
                assert_eq!(brief["tone"], "friendly");
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn broken_brief_json_is_an_error() {
        let err = parse_brief_reply("{\"brief\": {\"tone\": ").unwrap_err();
        assert!(matches!(err, LlmError::MalformedJson(_)));
        let err = parse_brief_reply("{\"brief\": {}}").unwrap_err();
        assert!(matches!(err, LlmError::MissingKey(ref k) if k == "message"));
    }

    #[test]
    fn config_keys_come_from_template() {
        let tpl = serde_json::json!({"siteName": "", "phone": "", "nav": []});
        let mut keys = required_config_keys(&tpl);
        keys.sort();
        assert_eq!(keys, vec!["nav", "phone", "siteName"]);
    }
}
