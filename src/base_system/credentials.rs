//! 账号密码来源：显式环境变量 > 普通环境变量 > `.env` 文件。

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to read env file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

// 避免密码出现在日志里
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CredentialSource<'a> {
    /// `--username-env` / `--password-env` 指定的变量名
    pub username_env: Option<&'a str>,
    pub password_env: Option<&'a str>,
    pub username_key: &'a str,
    pub password_key: &'a str,
    pub env_file: Option<&'a Path>,
}

/// 解析 `KEY=VALUE` 平面文件。文件不存在时返回空表。
pub fn load_env_file(path: &Path) -> Result<HashMap<String, String>, CredentialError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let raw = fs::read_to_string(path).map_err(|source| CredentialError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_env_text(&raw))
}

pub fn parse_env_text(raw: &str) -> HashMap<String, String> {
    let mut env = HashMap::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        env.insert(key.trim().to_string(), strip_quotes(value.trim()).to_string());
    }
    env
}

fn strip_quotes(value: &str) -> &str {
    let value = value.trim_matches('"');
    value.trim_matches('\'')
}

/// 按优先级解析账号。两者缺一时返回 `None`，调用方改为仅用 cookie 会话。
pub fn resolve_credentials(
    source: &CredentialSource<'_>,
) -> Result<Option<Credentials>, CredentialError> {
    resolve_with(source, |key| std::env::var(key).ok())
}

fn resolve_with<F>(
    source: &CredentialSource<'_>,
    lookup: F,
) -> Result<Option<Credentials>, CredentialError>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());

    if let (Some(user_var), Some(pass_var)) = (source.username_env, source.password_env) {
        let username = non_empty(lookup(user_var));
        let password = non_empty(lookup(pass_var));
        if let (Some(username), Some(password)) = (username, password) {
            debug!("使用显式环境变量 {} / {} 中的账号", user_var, pass_var);
            return Ok(Some(Credentials { username, password }));
        }
    }

    let file_values = match source.env_file {
        Some(path) => load_env_file(path)?,
        None => HashMap::new(),
    };

    let pick = |key: &str| non_empty(lookup(key)).or_else(|| non_empty(file_values.get(key).cloned()));
    match (pick(source.username_key), pick(source.password_key)) {
        (Some(username), Some(password)) => Ok(Some(Credentials { username, password })),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source<'a>(env_file: Option<&'a Path>) -> CredentialSource<'a> {
        CredentialSource {
            username_env: None,
            password_env: None,
            username_key: "KIDPLAN_USER",
            password_key: "KIDPLAN_PASS",
            env_file,
        }
    }

    #[test]
    fn parses_env_text_with_comments_and_quotes() {
        let env = parse_env_text(
            "# comment\n\nKIDPLAN_USER = \"ola@example.com\"\nKIDPLAN_PASS='hemmelig=1'\nnot a pair\n",
        );
        assert_eq!(env.get("KIDPLAN_USER").unwrap(), "ola@example.com");
        assert_eq!(env.get("KIDPLAN_PASS").unwrap(), "hemmelig=1");
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn missing_env_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let env = load_env_file(&dir.path().join("nope.env")).unwrap();
        assert!(env.is_empty());
    }

    #[test]
    fn explicit_env_vars_win() {
        let src = CredentialSource {
            username_env: Some("MY_USER"),
            password_env: Some("MY_PASS"),
            ..source(None)
        };
        let creds = resolve_with(&src, |k| match k {
            "MY_USER" => Some("a".to_string()),
            "MY_PASS" => Some("b".to_string()),
            "KIDPLAN_USER" => Some("x".to_string()),
            "KIDPLAN_PASS" => Some("y".to_string()),
            _ => None,
        })
        .unwrap()
        .unwrap();
        assert_eq!(creds.username, "a");
        assert_eq!(creds.password, "b");
    }

    #[test]
    fn falls_back_to_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "KIDPLAN_USER=fil\nKIDPLAN_PASS=pass\n").unwrap();

        let creds = resolve_with(&source(Some(&path)), |k| match k {
            "KIDPLAN_USER" => Some("env-user".to_string()),
            _ => None,
        })
        .unwrap()
        .unwrap();
        assert_eq!(creds.username, "env-user");
        assert_eq!(creds.password, "pass");
    }

    #[test]
    fn incomplete_credentials_resolve_to_none() {
        let creds = resolve_with(&source(None), |k| match k {
            "KIDPLAN_USER" => Some("only-user".to_string()),
            _ => None,
        })
        .unwrap();
        assert!(creds.is_none());
    }
}
