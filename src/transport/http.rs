use std::time::Duration;

use reqwest::header::COOKIE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use url::Url;

use crate::console::{CancelEndpoint, PageContext};
use crate::error::ConsoleError;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub status: u16,
    pub body: String,
}

/// Blocking facade over a reqwest client running on the shared runtime.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    runtime: Handle,
    cookie: Option<String>,
}

impl HttpClient {
    pub fn new(runtime: Handle, timeout: Duration, cookie: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("taskview/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            client,
            runtime,
            cookie: cookie.filter(|value| !value.trim().is_empty()),
        }
    }

    pub fn get(&self, url: &Url) -> Result<Fetched, ConsoleError> {
        debug!(%url, "http_get");
        self.runtime.block_on(async {
            let mut request = self.client.get(url.clone());
            if let Some(cookie) = &self.cookie {
                request = request.header(COOKIE, cookie);
            }
            let response = request
                .send()
                .await
                .map_err(|err| ConsoleError::Http(err.to_string()))?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|err| ConsoleError::Http(err.to_string()))?;
            Ok(Fetched { status, body })
        })
    }
}

impl CancelEndpoint for HttpClient {
    fn request_cancel(&self, url: &Url) -> Result<u16, ConsoleError> {
        self.get(url).map(|fetched| fetched.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provider {
    pub name: String,
    pub site_id: String,
    pub login_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct AuthUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Read-only view of the server's login endpoints.
pub struct AuthClient {
    http: HttpClient,
    page: PageContext,
}

impl AuthClient {
    pub fn new(http: HttpClient, page: PageContext) -> Self {
        Self { http, page }
    }

    pub fn providers(&self) -> Result<Vec<String>, ConsoleError> {
        let url = self.page.origin_endpoint(&["auth", "list"])?;
        let body = self.expect_ok(&url)?;
        serde_json::from_str(&body).map_err(|err| ConsoleError::InvalidResponse {
            endpoint: url.to_string(),
            reason: err.to_string(),
        })
    }

    pub fn site_id(&self, provider: &str) -> Result<String, ConsoleError> {
        let url = self.page.origin_endpoint(&["authinfo", provider])?;
        let body = self.expect_ok(&url)?;
        Ok(body.trim().to_lowercase())
    }

    /// Where a login should return to: the page's `from` parameter, else the
    /// page itself.
    pub fn return_to(&self) -> String {
        self.page
            .query_param("from")
            .unwrap_or_else(|| self.page.url().to_string())
    }

    pub fn login_url(&self, provider: &str, site: &str, from: &str) -> Result<Url, ConsoleError> {
        let mut url = self.page.origin_endpoint(&["auth", provider, "login"])?;
        url.query_pairs_mut()
            .append_pair("site", site)
            .append_pair("from", from);
        Ok(url)
    }

    pub fn logout_url(&self, provider: &str) -> Result<Url, ConsoleError> {
        self.page.origin_endpoint(&["auth", provider, "logout"])
    }

    /// Every provider whose site id resolves, with its login link.
    pub fn provider_links(&self) -> Result<Vec<Provider>, ConsoleError> {
        let from = self.return_to();
        let mut links = Vec::new();
        for name in self.providers()? {
            let site_id = match self.site_id(&name) {
                Ok(site_id) => site_id,
                Err(err) => {
                    warn!("provider_site_error: {name}: {err}");
                    continue;
                }
            };
            let login_url = self.login_url(&name, &site_id, &from)?.to_string();
            links.push(Provider {
                name,
                site_id,
                login_url,
            });
        }
        Ok(links)
    }

    /// `None` when the session is not logged in.
    pub fn current_user(&self) -> Result<Option<AuthUser>, ConsoleError> {
        let url = self.page.origin_endpoint(&["auth", "user"])?;
        let fetched = self.http.get(&url)?;
        match fetched.status {
            200 => serde_json::from_str(&fetched.body)
                .map(Some)
                .map_err(|err| ConsoleError::InvalidResponse {
                    endpoint: url.to_string(),
                    reason: err.to_string(),
                }),
            status => {
                info!(status, "no authenticated user");
                Ok(None)
            }
        }
    }

    fn expect_ok(&self, url: &Url) -> Result<String, ConsoleError> {
        let fetched = self.http.get(url)?;
        if fetched.status != 200 {
            return Err(ConsoleError::InvalidResponse {
                endpoint: url.to_string(),
                reason: format!("HTTP {}", fetched.status),
            });
        }
        Ok(fetched.body)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    use super::*;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("runtime")
    }

    fn response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    /// Serves one canned response per connection, returning each request head.
    fn serve(responses: Vec<String>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let base = format!("http://{}", listener.local_addr().expect("addr"));
        let handle = thread::spawn(move || {
            let mut heads = Vec::new();
            for canned in responses {
                let (mut stream, _) = listener.accept().expect("accept");
                let mut reader = BufReader::new(stream.try_clone().expect("clone"));
                let mut head = String::new();
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).expect("read");
                    if line == "\r\n" || line.is_empty() {
                        break;
                    }
                    head.push_str(&line);
                }
                stream.write_all(canned.as_bytes()).expect("write");
                heads.push(head);
            }
            heads
        });
        (base, handle)
    }

    fn client(runtime: &tokio::runtime::Runtime, cookie: Option<&str>) -> HttpClient {
        HttpClient::new(
            runtime.handle().clone(),
            Duration::from_secs(5),
            cookie.map(str::to_owned),
        )
    }

    #[test]
    fn cancel_request_returns_status_and_sends_cookie() {
        let runtime = runtime();
        let (base, server) = serve(vec![response("202 Accepted", "")]);
        let http = client(&runtime, Some("JWT=token"));
        let url = Url::parse(&format!("{base}/api/v1/cancel/5")).expect("url");

        assert_eq!(http.request_cancel(&url).expect("cancel"), 202);

        let heads = server.join().expect("server");
        assert!(heads[0].starts_with("GET /api/v1/cancel/5 HTTP/1.1"));
        assert!(heads[0].to_ascii_lowercase().contains("cookie: jwt=token"));
    }

    #[test]
    fn provider_links_skip_unresolved_sites() {
        let runtime = runtime();
        let (base, server) = serve(vec![
            response("200 OK", "[\"github\",\"google\"]"),
            response("200 OK", " Remark42\n"),
            response("500 Internal Server Error", ""),
        ]);
        let page = PageContext::parse(&format!("{base}/login?from=/console/%3Fid%3D3"))
            .expect("page");
        let auth = AuthClient::new(client(&runtime, None), page);

        let links = auth.provider_links().expect("providers");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].name, "github");
        assert_eq!(links[0].site_id, "remark42");
        assert_eq!(
            links[0].login_url,
            format!("{base}/auth/github/login?site=remark42&from=%2Fconsole%2F%3Fid%3D3")
        );

        let heads = server.join().expect("server");
        assert!(heads[0].starts_with("GET /auth/list "));
        assert!(heads[1].starts_with("GET /authinfo/github "));
        assert!(heads[2].starts_with("GET /authinfo/google "));
    }

    #[test]
    fn current_user_is_none_when_unauthorized() {
        let runtime = runtime();
        let (base, server) = serve(vec![
            response("401 Unauthorized", "Unauthorized"),
            response("200 OK", "{\"name\":\"dev\",\"id\":\"github_1\"}"),
        ]);
        let page = PageContext::parse(&format!("{base}/")).expect("page");
        let auth = AuthClient::new(client(&runtime, None), page);

        assert_eq!(auth.current_user().expect("anonymous"), None);
        let user = auth.current_user().expect("user").expect("logged in");
        assert_eq!(user.name, "dev");
        assert_eq!(user.id, "github_1");
        server.join().expect("server");
    }

    #[test]
    fn malformed_provider_list_is_an_invalid_response() {
        let runtime = runtime();
        let (base, server) = serve(vec![response("200 OK", "not json")]);
        let page = PageContext::parse(&format!("{base}/")).expect("page");
        let auth = AuthClient::new(client(&runtime, None), page);

        assert!(matches!(
            auth.providers(),
            Err(ConsoleError::InvalidResponse { .. })
        ));
        server.join().expect("server");
    }

    #[test]
    fn logout_url_is_rooted_at_origin() {
        let runtime = runtime();
        let page = PageContext::parse("https://tasks.example.com/console/?id=1").expect("page");
        let auth = AuthClient::new(client(&runtime, None), page);
        assert_eq!(
            auth.logout_url("github").expect("url").as_str(),
            "https://tasks.example.com/auth/github/logout"
        );
        assert_eq!(auth.return_to(), "https://tasks.example.com/console/?id=1");
    }
}
