use regex::Regex;
use tracing::warn;
use urlencoding::{decode, encode};

use crate::error::NavigationError;
use crate::navigation::{ParamValue, Params};

/// How often a parameter may repeat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Modifier {
    None,
    Optional,
    OneOrMore,
    ZeroOrMore,
}

impl Modifier {
    fn is_repeatable(self) -> bool {
        matches!(self, Self::OneOrMore | Self::ZeroOrMore)
    }
}

#[derive(Clone, Debug)]
enum Token {
    Static(String),
    Param {
        name: String,
        pattern: String,
        modifier: Modifier,
    },
}

/// A single compiled path pattern: matchable, parseable and compilable.
///
/// Grammar per segment: `:name` (required), `:name?` (optional), `:name+`
/// (one or more, always an array), `:name*` (zero or more, array or absent),
/// `:name(regex)` (custom constraint, composable with the modifiers).
/// Everything else is matched literally.
#[derive(Clone, Debug)]
pub struct PathPattern {
    raw: String,
    regex: Regex,
    tokens: Vec<Token>,
}

const DEFAULT_PARAM_PATTERN: &str = "[^/]+";

impl PathPattern {
    /// Compile `path` into a pattern. `path` must be absolute (the matcher
    /// joins child paths onto their parents before compiling).
    pub fn compile(path: &str) -> Result<Self, NavigationError> {
        let tokens = tokenize(path)?;

        let mut source = String::from("^");
        for token in &tokens {
            match token {
                Token::Static(value) => {
                    source.push('/');
                    source.push_str(&regex::escape(value));
                }
                Token::Param {
                    name,
                    pattern,
                    modifier,
                } => match modifier {
                    Modifier::None => {
                        source.push_str(&format!("/(?P<{name}>{pattern})"));
                    }
                    Modifier::Optional => {
                        source.push_str(&format!("(?:/(?P<{name}>{pattern}))?"));
                    }
                    Modifier::OneOrMore => {
                        source.push_str(&format!("/(?P<{name}>(?:{pattern})(?:/(?:{pattern}))*)"));
                    }
                    Modifier::ZeroOrMore => {
                        source
                            .push_str(&format!("(?:/(?P<{name}>(?:{pattern})(?:/(?:{pattern}))*))?"));
                    }
                },
            }
        }
        // tolerate the normalized root ("/") and any stray trailing slash
        source.push_str("/?$");

        let regex = Regex::new(&source).map_err(|err| NavigationError::InvalidPattern {
            pattern: path.to_string(),
            reason: err.to_string(),
        })?;

        Ok(Self {
            raw: path.to_string(),
            regex,
            tokens,
        })
    }

    /// The pattern as configured.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Match `path` (normalized, base-stripped) and extract parameters.
    ///
    /// Repeatable parameters produce [`ParamValue::Multi`] even for a single
    /// captured repetition; an empty `*` produces no entry at all.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<Params> {
        let captures = self.regex.captures(path)?;

        let mut params = Params::new();
        for token in &self.tokens {
            let Token::Param {
                name, modifier, ..
            } = token
            else {
                continue;
            };
            let Some(captured) = captures.name(name) else {
                continue;
            };
            let value = if modifier.is_repeatable() {
                ParamValue::Multi(
                    captured
                        .as_str()
                        .split('/')
                        .map(decode_segment)
                        .collect(),
                )
            } else {
                ParamValue::Single(decode_segment(captured.as_str()))
            };
            params.insert(name.clone(), value);
        }

        Some(params)
    }

    /// Compile `params` back into a concrete path.
    pub fn compile_path(&self, params: &Params) -> Result<String, NavigationError> {
        let mut path = String::new();

        for token in &self.tokens {
            match token {
                Token::Static(value) => {
                    path.push('/');
                    path.push_str(value);
                }
                Token::Param {
                    name, modifier, ..
                } => {
                    let value = params.get(name);
                    match (value, modifier) {
                        (None, Modifier::Optional | Modifier::ZeroOrMore) => {}
                        (None, _) => {
                            return Err(NavigationError::MissingParameter(name.clone()));
                        }
                        (Some(value), _) => {
                            let segments = value.values();
                            if segments.is_empty() {
                                if !matches!(modifier, Modifier::Optional | Modifier::ZeroOrMore)
                                {
                                    return Err(NavigationError::MissingParameter(name.clone()));
                                }
                                continue;
                            }
                            for segment in segments {
                                path.push('/');
                                path.push_str(&encode(segment));
                            }
                        }
                    }
                }
            }
        }

        if path.is_empty() {
            path.push('/');
        }
        Ok(path)
    }

    /// Names of all parameters this pattern declares, in order.
    #[must_use]
    pub fn param_names(&self) -> Vec<&str> {
        self.tokens
            .iter()
            .filter_map(|t| match t {
                Token::Param { name, .. } => Some(name.as_str()),
                Token::Static(_) => None,
            })
            .collect()
    }
}

fn decode_segment(raw: &str) -> String {
    match decode(raw) {
        Ok(value) => value.into_owned(),
        Err(err) => {
            warn!(%err, raw, "failed to decode path segment, using it verbatim");
            raw.to_string()
        }
    }
}

fn tokenize(path: &str) -> Result<Vec<Token>, NavigationError> {
    let invalid = |reason: &str| NavigationError::InvalidPattern {
        pattern: path.to_string(),
        reason: reason.to_string(),
    };

    let mut tokens = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let Some(rest) = segment.strip_prefix(':') else {
            tokens.push(Token::Static(segment.to_string()));
            continue;
        };

        let name: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if name.is_empty() {
            return Err(invalid("parameter segment without a name"));
        }

        let mut trailer = &rest[name.len()..];
        let mut pattern = DEFAULT_PARAM_PATTERN.to_string();
        if trailer.starts_with('(') {
            let mut depth = 0usize;
            let mut end = None;
            for (i, c) in trailer.char_indices() {
                match c {
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            end = Some(i);
                            break;
                        }
                    }
                    _ => {}
                }
            }
            let end = end.ok_or_else(|| invalid("unbalanced custom regex parentheses"))?;
            pattern = trailer[1..end].to_string();
            trailer = &trailer[end + 1..];
        }

        let modifier = match trailer {
            "" => Modifier::None,
            "?" => Modifier::Optional,
            "+" => Modifier::OneOrMore,
            "*" => Modifier::ZeroOrMore,
            other => {
                return Err(invalid(&format!("unexpected trailing characters `{other}`")));
            }
        };

        tokens.push(Token::Param {
            name,
            pattern,
            modifier,
        });
    }

    Ok(tokens)
}
