//! Placeholder dialects.
//!
//! Instrumentation wrappers register drivers under new names (`nrpostgres`,
//! `nrmysql`) without changing the placeholder syntax underneath, so the
//! driver name is normalized before the bind type is looked up.
//!
//! | Bind type  | Placeholder | Drivers                                   |
//! |------------|-------------|-------------------------------------------|
//! | `Question` | `?`         | mysql, sqlite, sqlite3, mariadb           |
//! | `Dollar`   | `$1`        | postgres, pgx, cockroach, ...             |
//! | `Named`    | `:name`     | oci8, ora, goracle, godror                |
//! | `At`       | `@p1`       | sqlserver, mssql                          |

use serde::Serialize;
use serde_json::Value as Json;

use crate::error::{SqlDbError, SqlDbResult};
use crate::value::Value;

/// Instrumented driver names and the base driver they wrap.
const DRIVER_ALIASES: &[(&str, &str)] = &[("nrpostgres", "postgres"), ("nrmysql", "mysql")];

/// Collapse an instrumented driver name to its base driver.
///
/// Total and idempotent: names without an alias map to themselves.
pub fn normalize_driver(name: &str) -> &str {
    DRIVER_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, base)| *base)
        .unwrap_or(name)
}

/// Placeholder style of a SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindType {
    Unknown,
    Question,
    Dollar,
    Named,
    At,
}

impl BindType {
    /// Bind type for a driver name, aliases included.
    pub fn for_driver(name: &str) -> Self {
        match normalize_driver(name) {
            "postgres" | "postgresql" | "pgx" | "pq-timeouts" | "cloudsqlpostgres" | "ql"
            | "cockroach" => BindType::Dollar,
            "mysql" | "mariadb" | "sqlite" | "sqlite3" => BindType::Question,
            "oci8" | "ora" | "goracle" | "godror" => BindType::Named,
            "sqlserver" | "mssql" => BindType::At,
            _ => BindType::Unknown,
        }
    }

    /// Placeholder for the `position`-th (1-based) parameter called `name`.
    fn placeholder(self, out: &mut String, position: usize, name: &str) {
        match self {
            BindType::Question | BindType::Unknown => out.push('?'),
            BindType::Dollar => {
                out.push('$');
                out.push_str(&position.to_string());
            }
            BindType::Named => {
                out.push(':');
                out.push_str(name);
            }
            BindType::At => {
                out.push_str("@p");
                out.push_str(&position.to_string());
            }
        }
    }
}

/// Rewrite `?` placeholders into the target dialect.
///
/// `Named` dialects get positional `:argN` names.
pub fn rebind(bind: BindType, query: &str) -> String {
    let prefix = match bind {
        BindType::Dollar => "$",
        BindType::Named => ":arg",
        BindType::At => "@p",
        BindType::Question | BindType::Unknown => return query.to_string(),
    };

    let mut out = String::with_capacity(query.len() + 10);
    let mut n = 0;
    for c in query.chars() {
        if c == '?' {
            n += 1;
            out.push_str(prefix);
            out.push_str(&n.to_string());
        } else {
            out.push(c);
        }
    }
    out
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

/// Replace `:name` parameters with dialect placeholders.
///
/// Returns the rewritten query and the parameter names in order. `::` is
/// an escaped `:` and `:=` is left alone.
pub fn compile_named(query: &str, bind: BindType) -> SqlDbResult<(String, Vec<String>)> {
    let mut out = String::with_capacity(query.len());
    let mut names = Vec::new();
    let mut chars = query.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        if c != ':' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some((_, ':')) => {
                chars.next();
                out.push(':');
            }
            Some((_, '=')) => {
                chars.next();
                out.push_str(":=");
            }
            Some((_, next)) if is_name_char(*next) => {
                let mut name = String::new();
                while let Some((_, n)) = chars.peek() {
                    if !is_name_char(*n) {
                        break;
                    }
                    name.push(*n);
                    chars.next();
                }
                names.push(name);
                let name = &names[names.len() - 1];
                bind.placeholder(&mut out, names.len(), name);
            }
            _ => {
                return Err(SqlDbError::bind(format!(
                    "unnamed parameter at position {}",
                    pos
                )));
            }
        }
    }

    Ok((out, names))
}

/// Compile a named query and collect its arguments from `arg`.
///
/// `arg` is anything that serializes to a map: a struct, a `HashMap`, a
/// `serde_json::Value` object. Dotted names walk nested objects.
pub fn bind_named<A: Serialize + ?Sized>(
    bind: BindType,
    query: &str,
    arg: &A,
) -> SqlDbResult<(String, Vec<Value>)> {
    let (sql, names) = compile_named(query, bind)?;
    let source = serde_json::to_value(arg).map_err(|e| SqlDbError::bind(e.to_string()))?;
    if !source.is_object() {
        return Err(SqlDbError::bind(format!(
            "named arguments must serialize to a map, got {}",
            json_kind(&source)
        )));
    }

    let values = names
        .iter()
        .map(|name| {
            lookup(&source, name)
                .map(Value::from_json)
                .ok_or_else(|| {
                    SqlDbError::bind(format!("could not find name {} in argument", name))
                })
        })
        .collect::<SqlDbResult<Vec<_>>>()?;

    Ok((sql, values))
}

fn lookup<'a>(source: &'a Json, name: &str) -> Option<&'a Json> {
    if let Some(direct) = source.get(name) {
        return Some(direct);
    }
    name.split('.').try_fold(source, |node, part| node.get(part))
}

fn json_kind(v: &Json) -> &'static str {
    match v {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
