use serde::Serialize;
use ureq;

use super::{timeout, user_agent, Error, Headers, Response};

pub struct Request {
    inner: ureq::Request,
}

fn convert(result: Result<ureq::Response, ureq::Error>) -> Result<Response, Error> {
    match result {
        // ureq only fails on 4xx/5xx; unfollowed 1xx and 3xx come back as Ok
        Ok(resp) if !(200..300).contains(&resp.status()) => Err(Error::Status(
            resp.status(),
            Response {
                reader: resp.into_reader(),
            },
        )),

        Ok(resp) => Ok(Response {
            reader: resp.into_reader(),
        }),

        Err(ureq::Error::Status(code, resp)) => Err(Error::Status(
            code,
            Response {
                reader: resp.into_reader(),
            },
        )),

        Err(ureq::Error::Transport(tp)) => Err(Error::Transport(tp.to_string().into())),
    }
}

impl Request {
    pub fn get(url: &str) -> Self {
        let inner = ureq::get(url)
            .timeout(timeout())
            .set("User-Agent", &user_agent());
        Self { inner }
    }

    pub fn post(url: &str) -> Self {
        let inner = ureq::post(url)
            .timeout(timeout())
            .set("User-Agent", &user_agent());
        Self { inner }
    }

    pub fn query(mut self, param: &str, value: &str) -> Self {
        self.inner = self.inner.query(param, value);
        self
    }

    pub fn set(mut self, header: &str, value: &str) -> Self {
        self.inner = self.inner.set(header, value);
        self
    }

    pub fn headers(mut self, headers: &Headers) -> Self {
        for (name, value) in headers {
            self.inner = self.inner.set(name, value);
        }
        self
    }

    pub fn send_form(self, data: &str) -> Result<Response, Error> {
        convert(
            self.inner
                .set("Content-Type", "application/x-www-form-urlencoded")
                .send_bytes(data.as_bytes()),
        )
    }

    pub fn send_json(self, data: impl Serialize) -> Result<Response, Error> {
        convert(self.inner.send_json(data))
    }

    pub fn call(self) -> Result<Response, Error> {
        convert(self.inner.call())
    }
}
