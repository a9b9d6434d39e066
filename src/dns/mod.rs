/*!
 * DNS Lookups
 * DNS-over-HTTPS client plus domain detection and ownership checks
 */
pub mod probe;
pub mod providers;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::settings;

/// NXDOMAIN response code.
pub const RCODE_NXDOMAIN: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Cname,
    Ns,
    Txt,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Cname => "CNAME",
            RecordType::Ns => "NS",
            RecordType::Txt => "TXT",
        }
    }

    /// IANA RR type code, as reported in DoH JSON answers.
    pub fn code(&self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Ns => 2,
            RecordType::Cname => 5,
            RecordType::Txt => 16,
        }
    }
}

#[derive(Debug, Error)]
pub enum DnsError {
    #[error("DNS request failed: {0}")]
    Transport(String),

    #[error("DNS resolver returned HTTP {0}")]
    Status(u16),

    #[error("Malformed DNS response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub name: String,
    pub rtype: u16,
    pub data: String,
}

/// Answer section of one query. `status` is the DNS RCODE (0 = NOERROR).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsAnswer {
    pub status: u32,
    pub records: Vec<DnsRecord>,
}

impl DnsAnswer {
    pub fn is_nxdomain(&self) -> bool {
        self.status == RCODE_NXDOMAIN
    }

    /// Record data of the requested type, lowercased for names and unquoted for TXT.
    pub fn values(&self, rtype: RecordType) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.rtype == rtype.code())
            .map(|r| match rtype {
                RecordType::Txt => unquote_txt(&r.data),
                RecordType::A => r.data.trim().to_string(),
                RecordType::Cname | RecordType::Ns => normalize_host(&r.data),
            })
            .collect()
    }
}

pub fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_lowercase()
}

/// TXT data arrives as one or more quoted chunks; join them.
fn unquote_txt(data: &str) -> String {
    let data = data.trim();
    if !data.starts_with('"') {
        return data.to_string();
    }
    data.split('"')
        .enumerate()
        .filter(|(i, _)| i % 2 == 1)
        .map(|(_, chunk)| chunk)
        .collect()
}

#[async_trait]
pub trait DnsResolver: Send + Sync {
    async fn lookup(&self, name: &str, rtype: RecordType) -> Result<DnsAnswer, DnsError>;
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohRecord>,
}

#[derive(Debug, Deserialize)]
struct DohRecord {
    name: String,
    #[serde(rename = "type")]
    rtype: u16,
    data: String,
}

/// Resolver speaking the `application/dns-json` DoH dialect.
pub struct DohResolver {
    client: reqwest::Client,
    endpoint: String,
}

impl DohResolver {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to default DoH client");
                reqwest::Client::new()
            });
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl DnsResolver for DohResolver {
    async fn lookup(&self, name: &str, rtype: RecordType) -> Result<DnsAnswer, DnsError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("name", name), ("type", rtype.as_str())])
            .header("Accept", "application/dns-json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(name = %name, rtype = rtype.as_str(), error = %e, "DoH request failed");
                DnsError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DnsError::Status(status.as_u16()));
        }

        let body: DohResponse = response
            .json()
            .await
            .map_err(|e| DnsError::Decode(e.to_string()))?;

        tracing::debug!(
            name = %name,
            rtype = rtype.as_str(),
            rcode = body.status,
            answers = body.answer.len(),
            "DoH lookup"
        );

        Ok(DnsAnswer {
            status: body.status,
            records: body
                .answer
                .into_iter()
                .map(|r| DnsRecord {
                    name: r.name,
                    rtype: r.rtype,
                    data: r.data,
                })
                .collect(),
        })
    }
}

static RESOLVER: Lazy<DohResolver> = Lazy::new(|| {
    let s = settings();
    DohResolver::new(
        s.doh_endpoint.clone(),
        Duration::from_secs(s.outbound_timeout_secs),
    )
});

/// Process-wide resolver used by the domain routes.
pub fn resolver() -> &'static DohResolver {
    &RESOLVER
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;

    /// In-memory resolver; unknown names answer NXDOMAIN.
    #[derive(Default)]
    pub struct StaticResolver {
        answers: HashMap<(String, RecordType), DnsAnswer>,
    }

    impl StaticResolver {
        pub fn with(mut self, name: &str, rtype: RecordType, data: &[&str]) -> Self {
            let answer = DnsAnswer {
                status: 0,
                records: data
                    .iter()
                    .map(|d| DnsRecord {
                        name: name.to_string(),
                        rtype: rtype.code(),
                        data: d.to_string(),
                    })
                    .collect(),
            };
            self.answers.insert((name.to_string(), rtype), answer);
            self
        }
    }

    #[async_trait]
    impl DnsResolver for StaticResolver {
        async fn lookup(&self, name: &str, rtype: RecordType) -> Result<DnsAnswer, DnsError> {
            Ok(self
                .answers
                .get(&(name.to_string(), rtype))
                .cloned()
                .unwrap_or(DnsAnswer {
                    status: RCODE_NXDOMAIN,
                    records: vec![],
                }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_unquote_txt_joins_chunks() {
        assert_eq!(unquote_txt("\"abc\""), "abc");
        assert_eq!(unquote_txt("\"abc\" \"def\""), "abcdef");
        assert_eq!(unquote_txt("plain"), "plain");
    }

    #[test]
    fn test_values_filters_by_type() {
        let answer = DnsAnswer {
            status: 0,
            records: vec![
                DnsRecord {
                    name: "www.example.com".into(),
                    rtype: 5,
                    data: "Example.Vercel-DNS.com.".into(),
                },
                DnsRecord {
                    name: "example.vercel-dns.com".into(),
                    rtype: 1,
                    data: "76.76.21.21".into(),
                },
            ],
        };
        assert_eq!(answer.values(RecordType::Cname), vec!["example.vercel-dns.com"]);
        assert_eq!(answer.values(RecordType::A), vec!["76.76.21.21"]);
        assert!(answer.values(RecordType::Ns).is_empty());
    }

    #[tokio::test]
    async fn test_doh_resolver_parses_answers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dns-query"))
            .and(query_param("name", "janedoe.dev"))
            .and(query_param("type", "NS"))
            .and(header("accept", "application/dns-json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Status": 0,
                "TC": false,
                "Answer": [
                    { "name": "janedoe.dev", "type": 2, "TTL": 300, "data": "ns1.domaincontrol.com." },
                    { "name": "janedoe.dev", "type": 2, "TTL": 300, "data": "ns2.domaincontrol.com." }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = DohResolver::new(format!("{}/dns-query", server.uri()), Duration::from_secs(2));
        let answer = resolver.lookup("janedoe.dev", RecordType::Ns).await.unwrap();
        assert_eq!(answer.status, 0);
        assert_eq!(
            answer.values(RecordType::Ns),
            vec!["ns1.domaincontrol.com", "ns2.domaincontrol.com"]
        );
    }

    #[tokio::test]
    async fn test_doh_resolver_nxdomain_without_answer_section() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Status": 3
            })))
            .mount(&server)
            .await;

        let resolver = DohResolver::new(server.uri(), Duration::from_secs(2));
        let answer = resolver.lookup("nothing-here.dev", RecordType::A).await.unwrap();
        assert!(answer.is_nxdomain());
        assert!(answer.records.is_empty());
    }

    #[tokio::test]
    async fn test_doh_resolver_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let resolver = DohResolver::new(server.uri(), Duration::from_secs(2));
        let err = resolver.lookup("janedoe.dev", RecordType::A).await.unwrap_err();
        assert!(matches!(err, DnsError::Status(502)));
    }
}
