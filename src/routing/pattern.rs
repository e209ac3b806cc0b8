//! URL route patterns.
//!
//! A pattern is compiled once into anchored regexes for the pathname and the
//! search component. Supported syntax:
//!
//! ```text
//! /tasks                 literal
//! /tasks/:id             named segment            ([^/]+?)
//! /tasks/:id([a-z0-9]+)  named segment with regex
//! /files/(.*)  /files/*  unnamed groups, keyed "0", "1", …
//! /books/:id?            optional group (the leading "/" is optional too)
//! /a{-:b}?               non-capturing group with modifier
//! /literal\:colon        escape
//! /search?q=:term        everything after a non-modifier "?" matches the query
//! ```
//!
//! Without a search part any query string matches.

use std::collections::HashMap;

use regex::Regex;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("unbalanced `{open}` in pattern `{pattern}`")]
    Unbalanced { pattern: String, open: char },

    #[error("missing parameter name after `:` in pattern `{0}`")]
    MissingName(String),

    #[error("duplicate parameter `{name}` in pattern `{pattern}`")]
    DuplicateName { pattern: String, name: String },

    #[error("invalid regex in pattern `{pattern}`: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A compiled route pattern.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    source: String,
    pathname: Regex,
    search: Option<Regex>,
    /// Regex group name → parameter key.
    groups: Vec<(String, String)>,
}

impl RoutePattern {
    /// Compile `pattern`. Patterns not starting with `/` are resolved against `base`.
    pub fn parse(pattern: &str, base: &str) -> Result<Self, PatternError> {
        let resolved = resolve(pattern, base);
        let (pathname, search) = split_search(&resolved);

        let mut compiler = Compiler {
            pattern: &resolved,
            groups: Vec::new(),
            unnamed: 0,
        };
        let pathname_re = compiler.compile(pathname, "[^/]+?", true)?;
        let search_re = match search {
            Some(search) => Some(compiler.compile(search, ".+?", false)?),
            None => None,
        };

        let anchored = |body: String| {
            Regex::new(&format!("^{body}$")).map_err(|source| PatternError::Regex {
                pattern: resolved.clone(),
                source,
            })
        };
        Ok(Self {
            pathname: anchored(pathname_re)?,
            search: search_re.map(anchored).transpose()?,
            groups: compiler.groups,
            source: resolved.clone(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `url` matches on pathname and search.
    pub fn test(&self, url: &Url) -> bool {
        self.pathname.is_match(url.path())
            && self
                .search
                .as_ref()
                .map_or(true, |re| re.is_match(url.query().unwrap_or("")))
    }

    /// Match `url` and return the captured parameters of every component.
    pub fn exec(&self, url: &Url) -> Option<HashMap<String, String>> {
        let path_caps = self.pathname.captures(url.path())?;
        let search_caps = match &self.search {
            Some(re) => Some(re.captures(url.query().unwrap_or(""))?),
            None => None,
        };

        let mut params = HashMap::new();
        for (group, key) in &self.groups {
            let value = path_caps
                .name(group)
                .or_else(|| search_caps.as_ref().and_then(|caps| caps.name(group)));
            if let Some(value) = value {
                params.insert(key.clone(), value.as_str().to_string());
            }
        }
        Some(params)
    }
}

impl std::fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

/// Join a relative pattern onto the directory part of `base`.
fn resolve(pattern: &str, base: &str) -> String {
    if pattern.starts_with('/') {
        return pattern.to_string();
    }
    let dir = match base.rfind('/') {
        Some(idx) => &base[..=idx],
        None => "/",
    };
    let dir = if dir.starts_with('/') {
        dir.to_string()
    } else {
        format!("/{dir}")
    };
    format!("{dir}{pattern}")
}

/// Split at the first `?` that is not escaped, inside a regex group, or a modifier.
fn split_search(pattern: &str) -> (&str, Option<&str>) {
    let mut chars = pattern.char_indices().peekable();
    let mut depth = 0usize;
    let mut modifiable = false;

    while let Some((idx, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
                modifiable = false;
            }
            '(' => depth += 1,
            ')' if depth > 0 => {
                depth -= 1;
                modifiable = depth == 0;
            }
            _ if depth > 0 => {}
            ':' => {
                while chars
                    .peek()
                    .is_some_and(|(_, c)| c.is_alphanumeric() || *c == '_')
                {
                    chars.next();
                }
                modifiable = !matches!(chars.peek(), Some((_, '(')));
            }
            '*' | '}' => modifiable = true,
            '?' if modifiable => modifiable = false,
            '?' => return (&pattern[..idx], Some(&pattern[idx + 1..])),
            _ => modifiable = false,
        }
    }
    (pattern, None)
}

struct Compiler<'p> {
    pattern: &'p str,
    groups: Vec<(String, String)>,
    unnamed: usize,
}

impl Compiler<'_> {
    fn compile(&mut self, part: &str, segment: &str, pathname: bool) -> Result<String, PatternError> {
        let chars: Vec<char> = part.chars().collect();
        let mut out = String::new();
        let mut i = 0;
        // Whether `out` ends with a literal `/` that an optional group may absorb.
        let mut trailing_slash = false;

        while i < chars.len() {
            let c = chars[i];
            match c {
                '\\' => {
                    if let Some(next) = chars.get(i + 1) {
                        out.push_str(&regex::escape(&next.to_string()));
                    }
                    trailing_slash = false;
                    i += 2;
                }
                ':' => {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                        end += 1;
                    }
                    if end == start {
                        return Err(PatternError::MissingName(self.pattern.to_string()));
                    }
                    let name: String = chars[start..end].iter().collect();
                    i = end;
                    let body = if chars.get(i) == Some(&'(') {
                        let (body, next) = self.read_regex(&chars, i)?;
                        i = next;
                        body
                    } else {
                        segment.to_string()
                    };
                    let group = self.group(name)?;
                    i = self.emit(&mut out, &chars, i, &format!("(?P<{group}>{body})"), pathname && trailing_slash);
                    trailing_slash = false;
                }
                '(' => {
                    let (body, next) = self.read_regex(&chars, i)?;
                    let group = self.numbered();
                    i = self.emit(&mut out, &chars, next, &format!("(?P<{group}>{body})"), pathname && trailing_slash);
                    trailing_slash = false;
                }
                '*' => {
                    let group = self.numbered();
                    i = self.emit(&mut out, &chars, i + 1, &format!("(?P<{group}>.*)"), pathname && trailing_slash);
                    trailing_slash = false;
                }
                '{' => {
                    let close = chars[i..]
                        .iter()
                        .position(|&c| c == '}')
                        .map(|p| i + p)
                        .ok_or_else(|| PatternError::Unbalanced {
                            pattern: self.pattern.to_string(),
                            open: '{',
                        })?;
                    let inner: String = chars[i + 1..close].iter().collect();
                    let body = self.compile(&inner, segment, pathname)?;
                    i = self.emit(&mut out, &chars, close + 1, &format!("(?:{body})"), false);
                    trailing_slash = false;
                }
                _ => {
                    out.push_str(&regex::escape(&c.to_string()));
                    trailing_slash = c == '/';
                    i += 1;
                }
            }
        }
        Ok(out)
    }

    /// Append `group` with its modifier (if any) at `chars[at]`. Returns the next index.
    fn emit(&self, out: &mut String, chars: &[char], at: usize, group: &str, absorb_slash: bool) -> usize {
        if chars.get(at) == Some(&'?') {
            if absorb_slash {
                out.pop();
                out.push_str(&format!("(?:/{group})?"));
            } else {
                out.push_str(&format!("(?:{group})?"));
            }
            at + 1
        } else {
            out.push_str(group);
            at
        }
    }

    /// Read a balanced `( … )` starting at `open`. Returns the inner regex and the index after `)`.
    fn read_regex(&self, chars: &[char], open: usize) -> Result<(String, usize), PatternError> {
        let mut depth = 0usize;
        let mut i = open;
        while i < chars.len() {
            match chars[i] {
                '\\' => i += 1,
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let inner: String = chars[open + 1..i].iter().collect();
                        return Ok((inner, i + 1));
                    }
                }
                _ => {}
            }
            i += 1;
        }
        Err(PatternError::Unbalanced {
            pattern: self.pattern.to_string(),
            open: '(',
        })
    }

    fn group(&mut self, key: String) -> Result<String, PatternError> {
        if self.groups.iter().any(|(_, existing)| *existing == key) {
            return Err(PatternError::DuplicateName {
                pattern: self.pattern.to_string(),
                name: key,
            });
        }
        let group = format!("p{}", self.groups.len());
        self.groups.push((group.clone(), key));
        Ok(group)
    }

    fn numbered(&mut self) -> String {
        let key = self.unnamed.to_string();
        self.unnamed += 1;
        let group = format!("p{}", self.groups.len());
        self.groups.push((group.clone(), key));
        group
    }
}
