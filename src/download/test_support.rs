//! 测试用的内存 Transport。

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Cursor;

use serde_json::Value;

use crate::network_parser::transport::{FetchError, RemoteBody, Transport};

type JsonHandler = Box<dyn Fn(&str, &[(String, String)]) -> Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PostedForm {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
}

#[derive(Default)]
pub(crate) struct FakeTransport {
    pages: HashMap<String, String>,
    files: HashMap<String, Vec<u8>>,
    statuses: HashMap<String, u16>,
    json: Option<JsonHandler>,
    /// 是否在流式响应里声明 content-length
    declare_length: bool,
    pub text_calls: RefCell<Vec<String>>,
    pub json_calls: RefCell<Vec<(String, Vec<(String, String)>)>>,
    pub stream_calls: RefCell<Vec<String>>,
    pub posts: RefCell<Vec<PostedForm>>,
}

fn owned(pairs: &[(&str, String)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

impl FakeTransport {
    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn with_file(mut self, url: &str, bytes: &[u8]) -> Self {
        self.files.insert(url.to_string(), bytes.to_vec());
        self
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.statuses.insert(url.to_string(), status);
        self
    }

    pub fn with_json(mut self, handler: impl Fn(&str, &[(String, String)]) -> Value + 'static) -> Self {
        self.json = Some(Box::new(handler));
        self
    }

    pub fn declaring_length(mut self) -> Self {
        self.declare_length = true;
        self
    }

    fn check_status(&self, url: &str) -> Result<(), FetchError> {
        match self.statuses.get(url) {
            Some(&status) => Err(FetchError::Status {
                status,
                url: url.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn not_found(url: &str) -> FetchError {
        FetchError::Status {
            status: 404,
            url: url.to_string(),
        }
    }
}

impl Transport for FakeTransport {
    fn get_text(&self, url: &str) -> Result<String, FetchError> {
        self.text_calls.borrow_mut().push(url.to_string());
        self.check_status(url)?;
        self.pages.get(url).cloned().ok_or_else(|| Self::not_found(url))
    }

    fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, FetchError> {
        let query = owned(query);
        self.json_calls
            .borrow_mut()
            .push((url.to_string(), query.clone()));
        self.check_status(url)?;
        match &self.json {
            Some(handler) => Ok(handler(url, &query)),
            None => Err(Self::not_found(url)),
        }
    }

    fn post_form(
        &self,
        url: &str,
        query: &[(&str, String)],
        form: &[(&str, &str)],
    ) -> Result<(), FetchError> {
        self.posts.borrow_mut().push(PostedForm {
            url: url.to_string(),
            query: owned(query),
            form: form
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        self.check_status(url)
    }

    fn open_stream(&self, url: &str) -> Result<RemoteBody, FetchError> {
        self.stream_calls.borrow_mut().push(url.to_string());
        self.check_status(url)?;
        let bytes = self.files.get(url).cloned().ok_or_else(|| Self::not_found(url))?;
        Ok(RemoteBody {
            content_length: self.declare_length.then_some(bytes.len() as u64),
            reader: Box::new(Cursor::new(bytes)),
        })
    }
}
