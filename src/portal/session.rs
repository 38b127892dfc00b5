//! Authenticated portal session over a blocking reqwest client

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{HeaderName, CONTENT_DISPOSITION, CONTENT_TYPE, REFERER};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use super::html::{self, ListedLink};
use super::{Fetched, Portal};
use crate::config::{Credentials, PortalConfig};
use crate::error::{AuthenticationError, FetchError};
use crate::model::{Class, Course, ResourceKind, ResourceSource, Unit};

const USER_AGENT: &str = concat!("pesu-fetch/", env!("CARGO_PKG_VERSION"));

/// A raw response, fully read
struct Page {
    url: String,
    status: StatusCode,
    content_type: Option<String>,
    content_disposition: Option<String>,
    body: Vec<u8>,
}

impl Page {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn is_html(&self) -> bool {
        match &self.content_type {
            Some(ct) => ct.contains("html"),
            None => true,
        }
    }

    fn is_login_form(&self) -> bool {
        self.is_html() && html::looks_like_login_page(&self.text())
    }

    /// An `application/*` payload that is a file rather than markup or JSON
    fn is_direct_file(&self) -> bool {
        match &self.content_type {
            Some(ct) => ct.contains("application/") && !ct.contains("html") && !ct.contains("json"),
            None => false,
        }
    }
}

/// Logged-in portal session
///
/// Holds the cookie jar for the lifetime of the run and remembers the
/// credentials so an expired session can be renewed once per request.
pub struct PortalSession {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl PortalSession {
    /// Log in and return a session ready for catalog requests
    pub fn login(config: &PortalConfig, credentials: Credentials) -> Result<Self, AuthenticationError> {
        let client = Client::builder()
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(AuthenticationError::Unreachable)?;

        let session = Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
        };
        session.authenticate()?;
        info!(srn = %session.credentials.srn, "logged in");
        Ok(session)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authenticate(&self) -> Result<(), AuthenticationError> {
        let landing = self
            .client
            .get(self.endpoint(""))
            .send()
            .map_err(AuthenticationError::Unreachable)?;
        let body = landing.text().map_err(AuthenticationError::Unreachable)?;
        let csrf = html::extract_csrf(&body).ok_or(AuthenticationError::MissingCsrfToken)?;

        let form = [
            ("j_username", self.credentials.srn.as_str()),
            ("j_password", self.credentials.password.as_str()),
            ("_csrf", csrf.as_str()),
        ];
        let response = self
            .client
            .post(self.endpoint("j_spring_security_check"))
            .form(&form)
            .send()
            .map_err(AuthenticationError::Unreachable)?;

        let final_url = response.url().to_string();
        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        debug!(url = %final_url, status, "login response");
        classify_login(&final_url, status, &body)
    }

    fn send_once(&self, request: RequestBuilder, url: &str) -> Result<Page, FetchError> {
        let response = request.send().map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })?;

        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(CONTENT_TYPE);
        let content_disposition = header(CONTENT_DISPOSITION);
        let final_url = response.url().to_string();
        let status = response.status();
        let body = response
            .bytes()
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?
            .to_vec();

        Ok(Page {
            url: final_url,
            status,
            content_type,
            content_disposition,
            body,
        })
    }

    /// GET with one re-login if the portal answers with its login form
    fn get(&mut self, url: &str, query: &[(&str, String)], referer: bool) -> Result<Page, FetchError> {
        let build = |session: &Self| {
            let mut request = session.client.get(url).query(query);
            if referer {
                request = request.header(REFERER, session.endpoint("s/studentProfilePESU"));
            }
            request
        };

        debug!(url, "GET");
        let mut page = self.send_once(build(self), url)?;
        if page.is_login_form() {
            warn!("portal session expired, logging in again");
            self.authenticate()?;
            page = self.send_once(build(self), url)?;
            if page.is_login_form() {
                return Err(FetchError::SessionExpired { url: url.to_string() });
            }
        }

        if !page.status.is_success() {
            return Err(FetchError::Status {
                url: page.url,
                status: page.status.as_u16(),
            });
        }
        Ok(page)
    }

    fn get_options(&mut self, path: &str, what: &str) -> Result<Vec<html::OptionEntry>, FetchError> {
        let url = self.endpoint(path);
        let page = self.get(&url, &[], false)?;
        let body = html::unwrap_json_string(&page.text());
        if !html::has_option_list(&body) {
            return Err(FetchError::Malformed {
                url,
                reason: format!("no {} list in response", what),
            });
        }
        Ok(html::parse_options(&body))
    }
}

/// Decide whether the response to the login POST means success
///
/// Spring Security redirects to `...?authfailed` on bad credentials; the same
/// page mentions a locked or disabled account when that is the cause.
pub fn classify_login(final_url: &str, status: u16, body: &str) -> Result<(), AuthenticationError> {
    if final_url.contains("authfailed") {
        let lower = body.to_ascii_lowercase();
        if lower.contains("locked") || lower.contains("disabled") {
            return Err(AuthenticationError::Locked);
        }
        return Err(AuthenticationError::InvalidCredentials);
    }
    if status >= 400 {
        return Err(AuthenticationError::Rejected(format!("HTTP {}", status)));
    }
    Ok(())
}

impl Portal for PortalSession {
    fn list_courses(&mut self) -> Result<Vec<Course>, FetchError> {
        let courses: Vec<Course> = self
            .get_options("a/g/getSubjectsCode", "course")?
            .into_iter()
            .map(|entry| Course::new(entry.value, entry.label))
            .collect();
        info!(count = courses.len(), "fetched course catalog");
        Ok(courses)
    }

    fn list_units(&mut self, course: &Course) -> Result<Vec<Unit>, FetchError> {
        let path = format!("a/i/getCourse/{}", course.id);
        Ok(self
            .get_options(&path, "unit")?
            .into_iter()
            .enumerate()
            .map(|(index, entry)| Unit {
                id: entry.value,
                name: entry.label,
                course_id: course.id.clone(),
                number: index + 1,
            })
            .collect())
    }

    fn list_classes(&mut self, unit: &Unit) -> Result<Vec<Class>, FetchError> {
        let url = self.endpoint(&format!("a/i/getCourseClasses/{}", unit.id));
        let page = self.get(&url, &[], false)?;
        // A unit without classes comes back as an empty body
        let body = html::unwrap_json_string(&page.text());
        Ok(html::parse_options(&body)
            .into_iter()
            .map(|entry| Class {
                id: entry.value,
                name: entry.label,
            })
            .collect())
    }

    fn list_class_resources(
        &mut self,
        unit: &Unit,
        class: &Class,
        kind: ResourceKind,
    ) -> Result<Vec<ListedLink>, FetchError> {
        let url = self.endpoint("s/studentProfilePESUAdmin");
        let query = [
            ("url", "studentProfilePESUAdmin".to_string()),
            ("controllerMode", "6403".to_string()),
            ("actionType", "60".to_string()),
            ("selectedData", unit.course_id.clone()),
            ("id", kind.portal_id().to_string()),
            ("unitid", class.id.clone()),
        ];
        let page = self.get(&url, &query, false)?;

        if page.is_direct_file() {
            debug!(class = %class.name, %kind, "listing returned the file itself");
            return Ok(vec![ListedLink {
                title: page
                    .content_disposition
                    .as_deref()
                    .and_then(html::filename_from_disposition),
                source: ResourceSource::Inline {
                    content: page.body,
                    content_type: page.content_type,
                },
            }]);
        }

        Ok(html::parse_download_links(&page.text(), &self.base_url))
    }

    fn fetch(&mut self, url: &str) -> Result<Fetched, FetchError> {
        let page = self.get(url, &[], true)?;
        Ok(Fetched {
            file_name: page
                .content_disposition
                .as_deref()
                .and_then(html::filename_from_disposition),
            content_type: page.content_type,
            content: page.body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_login_success() {
        assert!(classify_login("https://portal/Academy/s/studentProfilePESU", 200, "<html>").is_ok());
    }

    #[test]
    fn test_classify_login_bad_credentials() {
        let result = classify_login("https://portal/Academy/?authfailed=1", 200, "Invalid username");
        assert!(matches!(result, Err(AuthenticationError::InvalidCredentials)));
    }

    #[test]
    fn test_classify_login_locked_account() {
        let result = classify_login("https://portal/Academy/?authfailed=1", 200, "Your account is Locked");
        assert!(matches!(result, Err(AuthenticationError::Locked)));
    }

    #[test]
    fn test_classify_login_server_error() {
        let result = classify_login("https://portal/Academy/j_spring_security_check", 503, "");
        assert!(matches!(result, Err(AuthenticationError::Rejected(_))));
    }

    #[test]
    fn test_unreachable_portal_is_authentication_error() {
        let config = PortalConfig {
            base_url: "http://127.0.0.1:9/Academy".to_string(),
            timeout_secs: 2,
            ..PortalConfig::default()
        };
        let creds = Credentials::new("PES1UG23CS001", "secret").unwrap();
        let result = PortalSession::login(&config, creds);
        assert!(matches!(result, Err(AuthenticationError::Unreachable(_))));
    }

    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::{Arc, Mutex};
    use std::thread;

    const LOGIN_FORM: &str = concat!(
        r#"<form action="j_spring_security_check" method="post">"#,
        r#"<input type="hidden" name="_csrf" value="tok-1"/>"#,
        r#"<input type="password" name="j_password"></form>"#
    );

    /// How the local portal treats the class listing after logins
    #[derive(Clone, Copy)]
    enum Expiry {
        /// The listing always answers with the login form
        Always,
        /// The listing works once a second login has happened
        Once,
        /// Like `Always`, and every login after the first is refused
        RefuseRelogin,
    }

    #[derive(Default)]
    struct Hits {
        logins: usize,
        listings: usize,
    }

    /// Minimal HTTP/1.1 portal on a loopback port
    fn serve(expiry: Expiry) -> (String, Arc<Mutex<Hits>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}/Academy", listener.local_addr().unwrap());
        let hits = Arc::new(Mutex::new(Hits::default()));
        let shared = Arc::clone(&hits);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let path = read_request(&mut stream);
                let mut hits = shared.lock().unwrap();
                if path.starts_with("/Academy/j_spring_security_check") {
                    hits.logins += 1;
                    if hits.logins > 1 && matches!(expiry, Expiry::RefuseRelogin) {
                        respond(&mut stream, "302 Found", Some("/Academy/?authfailed=1"), "");
                    } else {
                        respond(&mut stream, "200 OK", None, "<html>home</html>");
                    }
                } else if path.starts_with("/Academy/a/i/getCourseClasses/") {
                    hits.listings += 1;
                    let renewed = matches!(expiry, Expiry::Once) && hits.logins > 1;
                    let body = if renewed { r#"<option value="c1">Class 1</option>"# } else { LOGIN_FORM };
                    respond(&mut stream, "200 OK", None, body);
                } else {
                    respond(&mut stream, "200 OK", None, LOGIN_FORM);
                }
            }
        });
        (base_url, hits)
    }

    /// Read one request and return its path
    fn read_request(stream: &mut TcpStream) -> String {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        let mut content_length = 0;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            if line.trim().is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap();
                }
            }
        }
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).unwrap();
        request_line.split_whitespace().nth(1).unwrap_or("/").to_string()
    }

    fn respond(stream: &mut TcpStream, status: &str, location: Option<&str>, body: &str) {
        let location = location.map(|l| format!("Location: {}\r\n", l)).unwrap_or_default();
        write!(
            stream,
            "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n{}",
            status,
            body.len(),
            location,
            body
        )
        .unwrap();
        stream.flush().unwrap();
    }

    fn session_for(base_url: String) -> PortalSession {
        let config = PortalConfig {
            base_url,
            timeout_secs: 5,
            ..PortalConfig::default()
        };
        let creds = Credentials::new("PES1UG23CS001", "secret").unwrap();
        PortalSession::login(&config, creds).expect("Failed to log in to local portal")
    }

    fn unit() -> Unit {
        Unit {
            id: "u1".to_string(),
            name: "Unit 1".to_string(),
            course_id: "20967".to_string(),
            number: 1,
        }
    }

    #[test]
    fn test_expired_session_is_renewed_once() {
        let (base_url, hits) = serve(Expiry::Once);
        let mut session = session_for(base_url);

        let classes = session.list_classes(&unit()).expect("Listing after re-login failed");
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].id, "c1");

        let hits = hits.lock().unwrap();
        assert_eq!(hits.logins, 2);
        assert_eq!(hits.listings, 2);
    }

    #[test]
    fn test_session_that_stays_expired() {
        let (base_url, hits) = serve(Expiry::Always);
        let mut session = session_for(base_url);

        let result = session.list_classes(&unit());
        assert!(matches!(result, Err(FetchError::SessionExpired { .. })));

        // One re-login and one retry, never more
        let hits = hits.lock().unwrap();
        assert_eq!(hits.logins, 2);
        assert_eq!(hits.listings, 2);
    }

    #[test]
    fn test_refused_relogin_is_authentication_failure() {
        let (base_url, hits) = serve(Expiry::RefuseRelogin);
        let mut session = session_for(base_url);

        let result = session.list_classes(&unit());
        assert!(matches!(
            result,
            Err(FetchError::Reauthentication(AuthenticationError::InvalidCredentials))
        ));
        assert_eq!(hits.lock().unwrap().listings, 1);
    }
}
