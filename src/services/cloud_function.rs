use std::path::PathBuf;

use serde_derive::{Deserialize, Serialize};

use crate::http::{Error, Headers, Request};

use super::{DdnsService, DdnsUpdateError, RecordUpdate};

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub url: Box<str>,

    /// Service account key used to mint identity tokens. Falls back to
    /// `GOOGLE_APPLICATION_CREDENTIALS`, then to the metadata server.
    #[serde(default)]
    pub credentials: Option<PathBuf>,
}

/// POSTs the record as JSON to an authenticated HTTP endpoint.
pub struct Service {
    config: Config,
}

impl From<Config> for Service {
    fn from(config: Config) -> Self {
        Self { config }
    }
}

impl DdnsService for Service {
    fn update_record(
        &mut self,
        headers: &Headers,
        record: &RecordUpdate,
    ) -> Result<(), DdnsUpdateError> {
        let response = Request::post(&self.config.url)
            .headers(headers)
            .send_json(record);

        match response {
            Ok(resp) => {
                let payload = resp.into_string().unwrap_or_default();
                log::info!("update endpoint response payload: {}", payload.trim());
                Ok(())
            }

            Err(Error::Status(code, resp)) => {
                let payload = resp.into_string().unwrap_or_default();
                Err(DdnsUpdateError::Status(code, payload.trim().into()))
            }

            Err(Error::Transport(tp)) => Err(DdnsUpdateError::TransportError(tp)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{Ipv4Addr, TcpListener};
    use std::thread;

    use super::*;

    /// Serves a single request with `reply` and hands back what was received.
    fn serve_once(reply: &'static str) -> (Box<str>, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/update", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut head = String::new();
            let mut length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        length = value.trim().parse().unwrap();
                    }
                }
                head.push_str(&line);
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }

            let mut body = vec![0; length];
            reader.read_exact(&mut body).unwrap();

            let mut stream = stream;
            stream.write_all(reply.as_bytes()).unwrap();
            stream.flush().unwrap();

            head + &String::from_utf8(body).unwrap()
        });

        (url.into(), handle)
    }

    fn record() -> RecordUpdate {
        RecordUpdate::new(
            "domain-com",
            "domain.com.",
            "home.domain.com",
            Ipv4Addr::new(93, 184, 216, 34),
        )
    }

    fn service(url: Box<str>) -> Service {
        Service::from(Config {
            url,
            credentials: None,
        })
    }

    #[test]
    fn posts_json_with_credentials() {
        let (url, server) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
        );
        let headers: Headers = vec![("Authorization".into(), "Bearer token-1".into())];

        assert_eq!(service(url).update_record(&headers, &record()), Ok(()));

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /update "));
        assert!(request.contains("Bearer token-1"));
        assert!(request.contains("\"ip_address\":\"93.184.216.34\""));
    }

    #[test]
    fn redirect_is_not_success() {
        let (url, server) = serve_once(
            "HTTP/1.1 302 Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );

        let result = service(url).update_record(&Headers::new(), &record());
        assert!(matches!(result, Err(DdnsUpdateError::Status(302, _))));
        server.join().unwrap();
    }

    #[test]
    fn server_error_is_reported() {
        let (url, server) = serve_once(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 4\r\nConnection: close\r\n\r\nboom",
        );

        assert_eq!(
            service(url).update_record(&Headers::new(), &record()),
            Err(DdnsUpdateError::Status(500, "boom".into()))
        );
        server.join().unwrap();
    }
}
