use std::io::Cursor;

use curl::easy::{Easy, List};
use serde::Serialize;

use super::{timeout, user_agent, Error, Headers, Response};

pub struct Request {
    curl: Easy,
    header_list: List,
    url: Box<str>,
    queries: String,
}

impl Request {
    fn new(url: &str, post: bool) -> Self {
        let mut curl = Easy::new();
        // UNWRAP-SAFETY: HTTP is supported. And we are already screwed if it isn't...
        if post {
            curl.post(true).unwrap();
        } else {
            curl.get(true).unwrap();
        }
        curl.useragent(&user_agent()).expect("out of memory");
        // UNWRAP-SAFETY: setting a timeout is always CURLE_OK.
        curl.timeout(timeout()).unwrap();

        Self {
            curl,
            header_list: List::new(),
            url: url.into(),
            queries: String::new(),
        }
    }

    pub fn get(url: &str) -> Self {
        Self::new(url, false)
    }

    pub fn post(url: &str) -> Self {
        Self::new(url, true)
    }

    pub fn query(mut self, param: &str, value: &str) -> Self {
        let param = self.curl.url_encode(param.as_bytes());
        let value = self.curl.url_encode(value.as_bytes());

        if self.queries.is_empty() {
            self.queries = self.queries + "?" + &param + "=" + &value;
        } else {
            self.queries = self.queries + "&" + &param + "=" + &value;
        }

        self
    }

    pub fn set(mut self, header: &str, value: &str) -> Self {
        let header = String::from(header) + ": " + value;
        self.header_list.append(&header).expect("out of memory");
        self
    }

    pub fn headers(self, headers: &Headers) -> Self {
        headers
            .iter()
            .fold(self, |request, (name, value)| request.set(name, value))
    }

    pub fn send_form(self, data: &str) -> Result<Response, Error> {
        self.set("Content-Type", "application/x-www-form-urlencoded")
            .send_body(data.as_bytes())
    }

    pub fn send_json(self, data: impl Serialize) -> Result<Response, Error> {
        let body = serde_json::to_vec(&data)
            .map_err(|e| Error::Transport(e.to_string().into()))?;

        self.set("Content-Type", "application/json")
            .send_body(&body)
    }

    fn send_body(mut self, body: &[u8]) -> Result<Response, Error> {
        self.curl
            .post_fields_copy(body)
            .map_err(|e| Error::Transport(e.description().into()))?;

        self.call()
    }

    pub fn call(mut self) -> Result<Response, Error> {
        let url = String::from(self.url) + &self.queries;
        self.curl.url(&url).expect("out of memory");

        // UNWRAP-SAFETY: HTTP is supported.
        self.curl.http_headers(self.header_list).unwrap();

        let mut response = Vec::with_capacity(8192);
        let mut transfer = self.curl.transfer();

        transfer
            .write_function(|src| {
                response.extend(src.iter().copied());
                Ok(src.len())
            })
            .unwrap(); // UNWRAP-SAFETY: This is always CURLE_OK.

        if let Err(err) = transfer.perform() {
            return Err(Error::Transport(err.description().into()));
        };

        drop(transfer);

        let response = Response {
            reader: Box::new(Cursor::new(response)),
        };

        let response_code = self
            .curl
            .response_code()
            .map_err(|e| Error::Transport(e.description().into()))?;

        if !(200..300).contains(&response_code) {
            return Err(Error::Status(response_code as u16, response));
        };

        Ok(response)
    }
}
