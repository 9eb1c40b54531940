//! `go.mod` / `go.work` directive parser.

use crate::utils::error::{GenError, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Require {
    pub path: String,
    pub version: String,
}

/// Right-hand side of a replace directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceTarget {
    /// Another module version fetched into the package cache.
    Module { path: String, version: String },
    /// A directory, absolute or relative to the declaring file.
    Dir(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replace {
    pub path: String,
    /// Only this version is replaced when set.
    pub version: Option<String>,
    pub target: ReplaceTarget,
}

impl Replace {
    pub fn matches(&self, path: &str, version: &str) -> bool {
        self.path == path && self.version.as_deref().map_or(true, |v| v == version)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModFile {
    pub module: String,
    pub go: Option<String>,
    pub requires: Vec<Require>,
    pub replaces: Vec<Replace>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkFile {
    pub go: Option<String>,
    pub uses: Vec<PathBuf>,
    pub replaces: Vec<Replace>,
}

impl ModFile {
    pub fn read(file: &Path) -> Result<Self> {
        let content = read(file, "go.mod")?;
        Self::parse(file, &content)
    }

    pub fn parse(file: &Path, content: &str) -> Result<Self> {
        let mut out = ModFile::default();
        for directive in directives(file, content)? {
            let line = directive.line;
            match directive.verb.as_str() {
                "module" => {
                    out.module = directive.single(file, 1)?.remove(0);
                }
                "go" => out.go = directive.args.first().cloned(),
                "toolchain" | "exclude" | "retract" | "godebug" | "tool" | "ignore" => {}
                "require" => {
                    let [path, version] = directive.exact::<2>(file)?;
                    out.requires.push(Require { path, version });
                }
                "replace" => out.replaces.push(replace(file, line, directive.args)?),
                other => {
                    return Err(syntax(file, line, format!("unknown directive: {}", other)));
                }
            }
        }
        if out.module.is_empty() {
            return Err(syntax(file, 1, "no module directive found"));
        }
        Ok(out)
    }
}

impl WorkFile {
    pub fn read(file: &Path) -> Result<Self> {
        let content = read(file, "go.work")?;
        Self::parse(file, &content)
    }

    pub fn parse(file: &Path, content: &str) -> Result<Self> {
        let mut out = WorkFile::default();
        for directive in directives(file, content)? {
            let line = directive.line;
            match directive.verb.as_str() {
                "go" => out.go = directive.args.first().cloned(),
                "toolchain" | "godebug" => {}
                "use" => {
                    let [dir] = directive.exact::<1>(file)?;
                    out.uses.push(PathBuf::from(dir));
                }
                "replace" => out.replaces.push(replace(file, line, directive.args)?),
                other => {
                    return Err(syntax(file, line, format!("unknown directive: {}", other)));
                }
            }
        }
        Ok(out)
    }
}

fn read(file: &Path, what: &str) -> Result<String> {
    match std::fs::read_to_string(file) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(GenError::not_found(what, file.display().to_string()))
        }
        Err(e) => Err(GenError::file(file, e)),
    }
}

fn syntax(file: &Path, line: usize, message: impl Into<String>) -> GenError {
    GenError::SyntaxError {
        file: file.to_path_buf(),
        line,
        message: message.into(),
    }
}

/// A single directive with block forms flattened: `require ( a v1 )`
/// yields one `require a v1` per inner line.
#[derive(Debug)]
struct Directive {
    verb: String,
    args: Vec<String>,
    line: usize,
}

impl Directive {
    fn exact<const N: usize>(self, file: &Path) -> Result<[String; N]> {
        let line = self.line;
        let verb = self.verb;
        self.args.try_into().map_err(|args: Vec<String>| {
            syntax(
                file,
                line,
                format!("{} expects {} arguments, got {}", verb, N, args.len()),
            )
        })
    }

    fn single(self, file: &Path, count: usize) -> Result<Vec<String>> {
        if self.args.len() != count {
            return Err(syntax(
                file,
                self.line,
                format!("{} expects {} argument", self.verb, count),
            ));
        }
        Ok(self.args)
    }
}

fn directives(file: &Path, content: &str) -> Result<Vec<Directive>> {
    let mut out = Vec::new();
    let mut block: Option<(String, usize)> = None;

    for (index, raw) in content.lines().enumerate() {
        let line = index + 1;
        let tokens = tokenize(raw).map_err(|message| syntax(file, line, message))?;
        if tokens.is_empty() {
            continue;
        }

        if let Some((verb, _)) = &block {
            if tokens.len() == 1 && tokens[0] == ")" {
                block = None;
                continue;
            }
            out.push(Directive {
                verb: verb.clone(),
                args: tokens,
                line,
            });
            continue;
        }

        let mut tokens = tokens.into_iter();
        let Some(verb) = tokens.next() else {
            continue;
        };
        let args: Vec<String> = tokens.collect();
        if args.len() == 1 && args[0] == "(" {
            block = Some((verb, line));
            continue;
        }
        if args.first().map(String::as_str) == Some("(") {
            return Err(syntax(file, line, "unexpected tokens after ("));
        }
        out.push(Directive { verb, args, line });
    }

    if let Some((verb, line)) = block {
        return Err(syntax(file, line, format!("{} block is not closed", verb)));
    }
    Ok(out)
}

/// Splits one line into tokens, honoring `"..."` / `` `...` `` quoting and
/// dropping `//` comments.
fn tokenize(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut chars = line.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '/' if line[start..].starts_with("//") => break,
            '"' | '`' => {
                let quote = c;
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\\' if quote == '"' => {
                            if let Some((_, escaped)) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        c if c == quote => {
                            closed = true;
                            break;
                        }
                        c => value.push(c),
                    }
                }
                if !closed {
                    return Err("unterminated quoted string".to_string());
                }
                tokens.push(value);
            }
            '(' | ')' => tokens.push(c.to_string()),
            _ => {
                let mut end = start + c.len_utf8();
                while let Some(&(index, next)) = chars.peek() {
                    if next.is_whitespace() || next == '(' || next == ')' || next == '"' {
                        break;
                    }
                    if line[index..].starts_with("//") {
                        break;
                    }
                    end = index + next.len_utf8();
                    chars.next();
                }
                tokens.push(line[start..end].to_string());
            }
        }
    }
    Ok(tokens)
}

fn replace(file: &Path, line: usize, args: Vec<String>) -> Result<Replace> {
    let Some(arrow) = args.iter().position(|arg| arg == "=>") else {
        return Err(syntax(file, line, "replace directive without =>"));
    };
    let (old, new) = args.split_at(arrow);
    let new = &new[1..];

    let (path, version) = match old {
        [path] => (path.clone(), None),
        [path, version] => (path.clone(), Some(version.clone())),
        _ => return Err(syntax(file, line, "replace expects `path [version] =>`")),
    };

    let target = match new {
        [dir] if is_local_path(dir) => ReplaceTarget::Dir(PathBuf::from(dir)),
        [path, version] => ReplaceTarget::Module {
            path: path.clone(),
            version: version.clone(),
        },
        [other] => {
            return Err(syntax(
                file,
                line,
                format!("replacement module {} must have a version", other),
            ));
        }
        _ => return Err(syntax(file, line, "replace expects `=> path [version]`")),
    };

    Ok(Replace {
        path,
        version,
        target,
    })
}

fn is_local_path(path: &str) -> bool {
    path.starts_with("./") || path.starts_with("../") || Path::new(path).is_absolute() || path == "." || path == ".."
}
