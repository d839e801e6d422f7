//! Message templates
//!
//! Templates are Handlebars with two additions: `|` pipelines, where the
//! value on the left becomes the last argument of the helper on the right
//! (`{{check.status | upper}}`, `{{args.mount | default "/"}}`), and
//! `{{- ... -}}` as an alias for Handlebars whitespace control.
//!
//! The render context exposes `check` (alias `healthcheck`), `globals`,
//! `alert` and `args`. Check fields are also available at the top level, so
//! `{{status}}` is the same as `{{check.status}}`.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::format::{Item, StrftimeItems};
use handlebars::{
    handlebars_helper, Context, Handlebars, Helper, HelperResult, Output, RenderContext,
    RenderErrorReason, Template,
};
use regex::Regex;
use serde_json::{Map, Value as Json};

use crate::check::exec::value_to_string;

/// Data available to templates
#[derive(Debug, Clone, Default)]
pub struct TemplateData {
    pub globals: Map<String, Json>,
    pub alert: BTreeMap<String, String>,
    pub check: BTreeMap<String, String>,
    pub args: BTreeMap<String, String>,
}

impl TemplateData {
    /// Assemble template data from config values and parsed check fields.
    ///
    /// Adds the derived `status_emoji` field and stringifies arguments.
    pub fn build(
        globals: &Map<String, Json>,
        alert_name: &str,
        check_fields: &BTreeMap<String, String>,
        args: &BTreeMap<String, Json>,
    ) -> Self {
        let mut alert = BTreeMap::new();
        alert.insert("name".to_string(), alert_name.to_string());

        let mut check = check_fields.clone();
        let emoji = status_emoji(check.get("status").map_or("", String::as_str));
        check.insert("status_emoji".to_string(), emoji.to_string());

        let args = args
            .iter()
            .map(|(k, v)| (k.clone(), value_to_string(v)))
            .collect();

        Self {
            globals: globals.clone(),
            alert,
            check,
            args,
        }
    }

    /// JSON value handed to the template engine
    pub fn context(&self) -> Json {
        let check = string_map(&self.check);

        let mut root = match &check {
            Json::Object(fields) => fields.clone(),
            _ => Map::new(),
        };
        root.insert("check".to_string(), check.clone());
        root.insert("healthcheck".to_string(), check);
        root.insert("globals".to_string(), Json::Object(self.globals.clone()));
        root.insert("alert".to_string(), string_map(&self.alert));
        root.insert("args".to_string(), string_map(&self.args));
        Json::Object(root)
    }
}

fn string_map(map: &BTreeMap<String, String>) -> Json {
    Json::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Json::String(v.clone())))
            .collect(),
    )
}

/// Glyph for a check status
pub fn status_emoji(status: &str) -> &'static str {
    match status {
        "critical" => "\u{1F534}",
        "warning" => "\u{1F7E1}",
        "ok" => "\u{1F7E2}",
        _ => "\u{2753}",
    }
}

/// Template renderer with the helper library registered
pub struct Renderer {
    registry: Handlebars<'static>,
}

impl Renderer {
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        register_helpers(&mut registry);
        Self { registry }
    }

    /// Render `source` against `data`
    pub fn render(&self, source: &str, data: &TemplateData) -> Result<String, TemplateError> {
        let lowered = lower_pipelines(source)?;
        Template::compile(&lowered)?;
        let rendered = self.registry.render_template(&lowered, &data.context())?;
        Ok(rendered)
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a template once with a fresh renderer
pub fn render(source: &str, data: &TemplateData) -> Result<String, TemplateError> {
    Renderer::new().render(source, data)
}

fn text(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        Json::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_empty(value: &Json) -> bool {
    match value {
        Json::Null => true,
        Json::Bool(b) => !b,
        Json::Number(n) => n.as_f64() == Some(0.0),
        Json::String(s) => s.is_empty(),
        Json::Array(items) => items.is_empty(),
        Json::Object(fields) => fields.is_empty(),
    }
}

fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut at_word_start = true;
    for c in input.chars() {
        if c.is_whitespace() {
            at_word_start = true;
            out.push(c);
        } else if at_word_start {
            out.extend(c.to_uppercase());
            at_word_start = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn now_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let format = h
        .param(0)
        .and_then(|p| p.value().as_str())
        .unwrap_or("%Y-%m-%dT%H:%M:%SZ");
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(RenderErrorReason::Other(format!("invalid time format {:?}", format)).into());
    }
    out.write(&chrono::Utc::now().format(format).to_string())?;
    Ok(())
}

/// Largest string `repeat` may produce
const MAX_REPEAT_LEN: usize = 64 * 1024;

fn repeat_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let count = h
        .param(0)
        .and_then(|p| p.value().as_u64())
        .ok_or_else(|| RenderErrorReason::Other("repeat: count must be a non-negative integer".to_string()))?;
    let value = h.param(1).map(|p| text(p.value())).unwrap_or_default();

    let fits = usize::try_from(count)
        .ok()
        .and_then(|count| value.len().checked_mul(count))
        .is_some_and(|len| len <= MAX_REPEAT_LEN);
    if !fits {
        return Err(RenderErrorReason::Other(format!(
            "repeat: {} copies exceed {} bytes",
            count, MAX_REPEAT_LEN
        ))
        .into());
    }

    out.write(&value.repeat(count as usize))?;
    Ok(())
}

/// Called for unknown helpers and for expressions that resolve to nothing.
/// Missing nested fields (`args.mount`) render empty; a bare unknown name
/// is an undefined function or field.
fn missing_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    _: &mut dyn Output,
) -> HelperResult {
    let name = h.name();
    let is_nested = name.contains(&['.', '/'][..]) || name.starts_with('@');
    if is_nested && h.params().is_empty() && h.hash().is_empty() {
        return Ok(());
    }
    Err(RenderErrorReason::Other(format!("undefined function or field {:?}", name)).into())
}

fn register_helpers(registry: &mut Handlebars<'static>) {
    handlebars_helper!(upper: |value: Json| text(value).to_uppercase());
    handlebars_helper!(lower: |value: Json| text(value).to_lowercase());
    handlebars_helper!(title: |value: Json| title_case(&text(value)));
    handlebars_helper!(trim: |value: Json| text(value).trim().to_string());
    handlebars_helper!(replace: |old: str, new: str, value: Json| text(value).replace(old, new));
    handlebars_helper!(trunc: |len: u64, value: Json| {
        text(value).chars().take(len as usize).collect::<String>()
    });
    handlebars_helper!(quote: |value: Json| format!("{:?}", text(value)));
    handlebars_helper!(contains: |needle: str, value: Json| text(value).contains(needle));
    handlebars_helper!(has_prefix: |prefix: str, value: Json| text(value).starts_with(prefix));
    handlebars_helper!(has_suffix: |suffix: str, value: Json| text(value).ends_with(suffix));
    handlebars_helper!(empty: |value: Json| is_empty(value));
    handlebars_helper!(to_string: |value: Json| text(value));
    handlebars_helper!(join: |sep: str, value: Json| match value {
        Json::Array(items) => items.iter().map(text).collect::<Vec<_>>().join(sep),
        other => text(other),
    });
    handlebars_helper!(default_value: |fallback: Json, value: Json| {
        if is_empty(value) { fallback.clone() } else { value.clone() }
    });

    registry.register_helper("upper", Box::new(upper));
    registry.register_helper("lower", Box::new(lower));
    registry.register_helper("title", Box::new(title));
    registry.register_helper("trim", Box::new(trim));
    registry.register_helper("repeat", Box::new(repeat_helper));
    registry.register_helper("replace", Box::new(replace));
    registry.register_helper("trunc", Box::new(trunc));
    registry.register_helper("quote", Box::new(quote));
    registry.register_helper("contains", Box::new(contains));
    registry.register_helper("hasPrefix", Box::new(has_prefix));
    registry.register_helper("hasSuffix", Box::new(has_suffix));
    registry.register_helper("empty", Box::new(empty));
    registry.register_helper("toString", Box::new(to_string));
    registry.register_helper("join", Box::new(join));
    registry.register_helper("default", Box::new(default_value));
    registry.register_helper("now", Box::new(now_helper));
    registry.register_helper("helperMissing", Box::new(missing_helper));
}

fn expression_regex() -> &'static Regex {
    static EXPRESSION: OnceLock<Regex> = OnceLock::new();
    EXPRESSION.get_or_init(|| Regex::new(r"(?s)\{\{(.*?)\}\}").expect("valid expression regex"))
}

/// Rewrite `|` pipelines into nested Handlebars helper calls
pub fn lower_pipelines(source: &str) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(source.len());
    let mut last = 0;

    for caps in expression_regex().captures_iter(source) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&source[last..whole.start()]);
        out.push_str("{{");
        out.push_str(&lower_expression(inner.as_str())?);
        out.push_str("}}");
        last = whole.end();
    }

    out.push_str(&source[last..]);
    Ok(out)
}

fn lower_expression(inner: &str) -> Result<String, TemplateError> {
    let (open, body) = if let Some(rest) = inner.strip_prefix('~') {
        ("~", rest)
    } else if let Some(rest) = inner.strip_prefix("- ") {
        ("~", rest)
    } else {
        ("", inner)
    };
    let (body, close) = if let Some(rest) = body.strip_suffix('~') {
        (rest, "~")
    } else if let Some(rest) = body.strip_suffix(" -") {
        (rest, "~")
    } else {
        (body, "")
    };

    let trimmed = body.trim_start();
    let is_structural = trimmed.starts_with(&['#', '/', '!', '>', '^', '{', '&'][..])
        || trimmed.starts_with("else");
    if is_structural {
        return Ok(format!("{}{}{}", open, body, close));
    }

    let stages = split_top_level(body, |c| c == '|');
    if stages.len() == 1 {
        return Ok(format!("{}{}{}", open, body, close));
    }

    let mut expr = String::new();
    for (idx, stage) in stages.iter().map(|s| s.trim()).enumerate() {
        if stage.is_empty() {
            return Err(TemplateError::Pipeline(format!(
                "empty command in pipeline {:?}",
                body.trim()
            )));
        }
        expr = if idx == 0 {
            stage.to_string()
        } else if word_count(&expr) > 1 {
            format!("{} ({})", stage, expr)
        } else {
            format!("{} {}", stage, expr)
        };
    }

    Ok(format!("{}{}{}", open, expr, close))
}

fn word_count(expr: &str) -> usize {
    split_top_level(expr, char::is_whitespace)
        .into_iter()
        .filter(|w| !w.is_empty())
        .count()
}

/// Split on separator characters outside string literals and parentheses
fn split_top_level<F>(input: &str, is_sep: F) -> Vec<&str>
where
    F: Fn(char) -> bool,
{
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut depth = 0usize;
    let mut start = 0;

    for (idx, c) in input.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => quote = Some(c),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if depth == 0 && is_sep(c) => {
                parts.push(&input[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }

    parts.push(&input[start..]);
    parts
}

/// Template errors
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("parsing template: {0}")]
    Pipeline(String),

    #[error("parsing template: {0}")]
    Parse(#[from] handlebars::TemplateError),

    #[error("executing template: {0}")]
    Render(#[from] handlebars::RenderError),
}
