//! Cookie header handling for forum sessions.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    values: BTreeMap<String, String>,
}

impl CookieJar {
    /// Parse a browser-style `name=value; name2=value2` string.
    ///
    /// Fragments without `=` are skipped. Values keep everything after the first `=`.
    pub fn parse(raw: &str) -> Self {
        let values = raw
            .split(';')
            .filter_map(|part| {
                let (name, value) = part.trim().split_once('=')?;
                let name = name.trim();
                (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
            })
            .collect();
        Self { values }
    }

    /// Merge the cookies a response sets, later values win.
    pub fn absorb(&mut self, response: &reqwest::Response) {
        for cookie in response.cookies() {
            if !cookie.name().is_empty() {
                self.values
                    .insert(cookie.name().to_string(), cookie.value().to_string());
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Keep only the named cookies
    pub fn retain_only(&mut self, names: &[String]) {
        self.values.retain(|k, _| names.iter().any(|n| n == k));
    }

    /// Names from `required` that are absent
    pub fn missing<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|n| !self.values.contains_key(n.as_str()))
            .map(String::as_str)
            .collect()
    }

    pub fn to_header(&self) -> String {
        self.values
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_browser_cookie_string() {
        let jar = CookieJar::parse("pvRK_2132_saltkey=abc; pvRK_2132_auth=x=y==; junk; =nope");
        assert_eq!(jar.get("pvRK_2132_saltkey"), Some("abc"));
        assert_eq!(jar.get("pvRK_2132_auth"), Some("x=y=="));
        assert_eq!(jar.to_header(), "pvRK_2132_auth=x=y==; pvRK_2132_saltkey=abc");
    }

    #[tokio::test]
    async fn test_absorb_response_cookies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .append_header("set-cookie", "flarum_session=s1; Path=/; HttpOnly")
                    .append_header("set-cookie", "flarum_remember=r1; Path=/; Max-Age=3600"),
            )
            .mount(&server)
            .await;

        let response = reqwest::get(server.uri()).await.unwrap();
        let mut jar = CookieJar::parse("flarum_session=old; other=kept");
        jar.absorb(&response);

        assert_eq!(jar.get("flarum_session"), Some("s1"));
        assert_eq!(jar.get("flarum_remember"), Some("r1"));
        assert_eq!(jar.get("other"), Some("kept"));
    }

    #[test]
    fn test_retain_and_missing() {
        let required = vec!["a".to_string(), "b".to_string()];
        let mut jar = CookieJar::parse("a=1; c=3");
        jar.retain_only(&required);
        assert_eq!(jar.to_header(), "a=1");
        assert_eq!(jar.missing(&required), vec!["b"]);
    }
}
