//! 登录：查询账号关联的幼儿园 → 选出目标 → 提交登录表单。
//!
//! 会话 Cookie 由 Transport 内部的 Jar 保存，之后所有请求复用。

use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::base_system::credentials::Credentials;
use crate::base_system::json_extract::pick_string;
use crate::network_parser::transport::{FetchError, Transport};

pub const ACCOUNT_LOOKUP_PATH: &str = "/Account/GetKinderGartenIds";
pub const LOGIN_PATH: &str = "/LogOn";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("kindergarten lookup failed: {0}")]
    Lookup(#[source] FetchError),
    #[error("login failed: no kindergarten IDs returned. Check credentials.")]
    NoAccounts,
    #[error("provided kid id {0} not found for this account")]
    IdNotFound(String),
    #[error("provided kid name '{0}' not found for this account")]
    NameNotFound(String),
    #[error("multiple kindergartens found. Provide --kid or --kid-name. Options: {options}")]
    Ambiguous { options: String },
    #[error("login failed: {0}")]
    Login(#[source] FetchError),
    #[error("invalid endpoint url: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// 账号关联的组织（幼儿园）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AccountSelector<'a> {
    pub kid_id: Option<&'a str>,
    pub kid_name: Option<&'a str>,
}

pub fn parse_accounts(value: &Value) -> Vec<Account> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|map| {
            Some(Account {
                id: pick_string(map, &["Id", "id"])?,
                name: pick_string(map, &["Name", "name"]).unwrap_or_default(),
            })
        })
        .collect()
}

/// 选出目标账号。多个候选且未指定时必须报错，绝不默认选第一个。
pub fn resolve_account<'a>(
    accounts: &'a [Account],
    selector: AccountSelector<'_>,
) -> Result<&'a Account, AuthError> {
    if let Some(id) = selector.kid_id {
        return accounts
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| AuthError::IdNotFound(id.to_string()));
    }
    if let Some(name) = selector.kid_name {
        let wanted = name.trim().to_lowercase();
        return accounts
            .iter()
            .find(|a| a.name.trim().to_lowercase() == wanted)
            .ok_or_else(|| AuthError::NameNotFound(name.to_string()));
    }
    match accounts {
        [only] => Ok(only),
        _ => Err(AuthError::Ambiguous {
            options: accounts
                .iter()
                .map(|a| format!("{} (id={})", a.name, a.id))
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

pub fn fetch_accounts(
    transport: &dyn Transport,
    base_url: &Url,
    credentials: &Credentials,
) -> Result<Vec<Account>, AuthError> {
    let url = base_url.join(ACCOUNT_LOOKUP_PATH)?;
    let value = transport
        .get_json(
            url.as_str(),
            &[
                ("username", credentials.username.clone()),
                ("password", credentials.password.clone()),
            ],
        )
        .map_err(AuthError::Lookup)?;
    Ok(parse_accounts(&value))
}

/// 登录并返回选中的账号。`return_url` 作为 `returnurl` 查询参数一并提交。
pub fn login(
    transport: &dyn Transport,
    base_url: &Url,
    credentials: &Credentials,
    selector: AccountSelector<'_>,
    return_url: Option<&str>,
) -> Result<Account, AuthError> {
    let accounts = fetch_accounts(transport, base_url, credentials)?;
    if accounts.is_empty() {
        error!("账号查询没有返回任何幼儿园");
        return Err(AuthError::NoAccounts);
    }

    let account = resolve_account(&accounts, selector)?.clone();
    info!("登录幼儿园: {} (id={})", account.name, account.id);

    let mut query = vec![("kid", account.id.clone())];
    if let Some(ret) = return_url {
        query.push(("returnurl", ret.to_string()));
    }
    let form = [
        ("UserName", credentials.username.as_str()),
        ("Password", credentials.password.as_str()),
        ("RememberMe", "true"),
    ];
    let url = base_url.join(LOGIN_PATH)?;
    transport
        .post_form(url.as_str(), &query, &form)
        .map_err(AuthError::Login)?;
    Ok(account)
}
