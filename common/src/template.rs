//! Rendering of the temperature segment of a remote command.
//!
//! Templates are plain text with `{temp}` placeholders. A placeholder may carry
//! a numeric format spec of the form `[0][width][.precision][f|F]`, so
//! `{temp:.0f}` renders `22` and `T{temp:04.1f}` renders `T22.5` or `T09.0`.
//! Literal braces are written as `{{` and `}}`.
//!
//! A bare `{temp}` renders the shortest decimal form, so a whole target of
//! `22.0` becomes `22` rather than `22.0`. Use `{temp:.1f}` when the remote
//! expects the trailing decimal.

use thiserror::Error;
use tracing::warn;

pub const DEFAULT_TEMPERATURE_TEMPLATE: &str = "{temp:.0f}";

const PLACEHOLDER: &str = "temp";
const DEFAULT_FIXED_PRECISION: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unbalanced '{0}' in template")]
    UnbalancedBrace(char),
    #[error("unknown placeholder '{0}'")]
    UnknownPlaceholder(String),
    #[error("unsupported format spec '{0}'")]
    UnsupportedSpec(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct FormatSpec {
    zero_pad: bool,
    width: usize,
    precision: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Temperature(FormatSpec),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemperatureTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl TemperatureTemplate {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(ch) = chars.next() {
            match ch {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(TemplateError::UnbalancedBrace('}')),
                '{' => {
                    let mut field = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') | None => return Err(TemplateError::UnbalancedBrace('{')),
                            Some(other) => field.push(other),
                        }
                    }

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Temperature(parse_field(&field)?));
                }
                other => literal.push(other),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    /// Parses `template`, falling back to [`DEFAULT_TEMPERATURE_TEMPLATE`]
    /// when it cannot be rendered.
    pub fn or_default(template: &str) -> Self {
        match Self::parse(template) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("invalid command_set_temp {template:?}: {err}");
                Self::fallback()
            }
        }
    }

    pub fn format(&self, temperature: f64) -> String {
        let mut rendered = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::Temperature(spec) => rendered.push_str(&render(temperature, *spec)),
            }
        }
        rendered
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    fn fallback() -> Self {
        Self {
            source: DEFAULT_TEMPERATURE_TEMPLATE.to_string(),
            segments: vec![Segment::Temperature(FormatSpec {
                precision: Some(0),
                ..FormatSpec::default()
            })],
        }
    }
}

impl Default for TemperatureTemplate {
    fn default() -> Self {
        Self::fallback()
    }
}

pub fn format_temperature(template: &str, temperature: f64) -> Result<String, TemplateError> {
    Ok(TemperatureTemplate::parse(template)?.format(temperature))
}

fn parse_field(field: &str) -> Result<FormatSpec, TemplateError> {
    let (name, spec) = match field.split_once(':') {
        Some((name, spec)) => (name, Some(spec)),
        None => (field, None),
    };

    if name != PLACEHOLDER {
        return Err(TemplateError::UnknownPlaceholder(name.to_string()));
    }

    match spec {
        Some(spec) => parse_spec(spec),
        None => Ok(FormatSpec::default()),
    }
}

fn parse_spec(spec: &str) -> Result<FormatSpec, TemplateError> {
    let unsupported = || TemplateError::UnsupportedSpec(spec.to_string());

    let (body, fixed) = match spec.strip_suffix(|c: char| c == 'f' || c == 'F') {
        Some(body) => (body, true),
        None => (spec, false),
    };

    let (width_part, precision_part) = match body.split_once('.') {
        Some((width, precision)) => (width, Some(precision)),
        None => (body, None),
    };

    let zero_pad = width_part.starts_with('0');
    let width = match width_part {
        "" => 0,
        digits => digits.parse::<usize>().map_err(|_| unsupported())?,
    };

    let precision = match precision_part {
        Some(digits) => {
            if !fixed {
                return Err(unsupported());
            }
            Some(digits.parse::<usize>().map_err(|_| unsupported())?)
        }
        None if fixed => Some(DEFAULT_FIXED_PRECISION),
        None => None,
    };

    Ok(FormatSpec {
        zero_pad,
        width,
        precision,
    })
}

fn render(temperature: f64, spec: FormatSpec) -> String {
    let body = match spec.precision {
        Some(precision) => format!("{temperature:.precision$}"),
        None => format!("{temperature}"),
    };

    if body.len() >= spec.width {
        return body;
    }

    let fill = spec.width - body.len();
    if spec.zero_pad {
        match body.strip_prefix('-') {
            Some(digits) => format!("-{}{digits}", "0".repeat(fill)),
            None => format!("{}{body}", "0".repeat(fill)),
        }
    } else {
        format!("{}{body}", " ".repeat(fill))
    }
}
