//! Best-effort domain detection and ownership verification.
//!
//! Nothing here retries or caches; callers show the result as advice.

use serde::Serialize;

use super::providers::{active_signature, match_provider, ProviderMatch};
use super::{normalize_host, DnsError, DnsResolver, RecordType};
use crate::rules::domains::verification_record_name;

/// Second-level public suffixes where the registrable name has three labels.
const TWO_LEVEL_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "me.uk", "com.au", "net.au", "org.au", "co.nz", "co.jp",
    "com.br", "co.za", "com.mx", "co.in", "com.tr", "com.ar", "com.cn",
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainDetection {
    pub domain: String,
    pub apex: String,
    pub provider: Option<ProviderMatch>,
    pub nameservers: Vec<String>,
    /// Apex does not resolve at all; most likely unregistered.
    pub available: bool,
    /// Already serves a site on a known hosting platform.
    pub already_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_platform: Option<String>,
    /// Already pointed at this platform.
    pub points_to_platform: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub record_name: String,
    pub txt_found: bool,
    pub routing_ok: bool,
    pub passed: bool,
}

/// Bare lowercase hostname from user input such as `https://Jane.dev/about`.
pub fn normalize_domain(input: &str) -> Result<String, String> {
    let mut s = input.trim().to_lowercase();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = s.strip_prefix(scheme) {
            s = rest.to_string();
        }
    }
    let host = s
        .split(['/', '?', '#'])
        .next()
        .unwrap_or("")
        .split(':')
        .next()
        .unwrap_or("")
        .trim_end_matches('.')
        .to_string();

    if host.is_empty() {
        return Err("Domain is required".to_string());
    }
    if host.len() > 253 {
        return Err("Domain is too long".to_string());
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return Err("Enter a full domain such as example.com".to_string());
    }
    for label in &labels {
        let ok = !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !ok {
            return Err(format!("'{}' is not a valid domain", host));
        }
    }
    let tld = labels[labels.len() - 1];
    if tld.len() < 2 || !(tld.chars().all(|c| c.is_ascii_alphabetic()) || tld.starts_with("xn--")) {
        return Err(format!("'{}' has an invalid top-level domain", host));
    }

    Ok(host)
}

/// Registrable part of a normalized domain.
pub fn apex_of(domain: &str) -> String {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() <= 2 {
        return domain.to_string();
    }
    let last_two = labels[labels.len() - 2..].join(".");
    let keep = if TWO_LEVEL_SUFFIXES.contains(&last_two.as_str()) {
        3
    } else {
        2
    };
    labels[labels.len().saturating_sub(keep)..].join(".")
}

/// Lookup whose failure only weakens the heuristic.
async fn soft_values<R: DnsResolver + ?Sized>(
    resolver: &R,
    name: &str,
    rtype: RecordType,
) -> Vec<String> {
    match resolver.lookup(name, rtype).await {
        Ok(answer) => answer.values(rtype),
        Err(e) => {
            tracing::debug!(name = %name, rtype = rtype.as_str(), error = %e, "soft DNS lookup failed");
            Vec::new()
        }
    }
}

pub async fn detect<R: DnsResolver + ?Sized>(
    resolver: &R,
    input: &str,
    platform_target: &str,
) -> Result<DomainDetection, String> {
    let domain = normalize_domain(input)?;
    let apex = apex_of(&domain);

    let ns_answer = resolver
        .lookup(&apex, RecordType::Ns)
        .await
        .map_err(|e: DnsError| e.to_string())?;
    let nameservers = ns_answer.values(RecordType::Ns);
    let available = ns_answer.is_nxdomain();

    let mut a_records = Vec::new();
    let mut cnames = Vec::new();
    if !available {
        let www = format!("www.{}", domain);
        for host in [domain.as_str(), www.as_str()] {
            a_records.extend(soft_values(resolver, host, RecordType::A).await);
            cnames.extend(soft_values(resolver, host, RecordType::Cname).await);
        }
    }

    let target = normalize_host(platform_target);
    let points_to_platform = cnames.iter().any(|c| *c == target);
    let active_platform = if points_to_platform {
        None
    } else {
        active_signature(&a_records, &cnames)
    };

    tracing::info!(
        domain = %domain,
        available,
        active = active_platform.is_some(),
        points_to_platform,
        "domain detection finished"
    );

    Ok(DomainDetection {
        provider: match_provider(&nameservers, &apex),
        domain,
        apex,
        nameservers,
        available,
        already_active: active_platform.is_some(),
        active_platform: active_platform.map(str::to_string),
        points_to_platform,
    })
}

/// TXT token under `_devfolio.<domain>` plus routing to the platform, either by
/// CNAME or by sharing an address with the platform target.
pub async fn verify_ownership<R: DnsResolver + ?Sized>(
    resolver: &R,
    domain: &str,
    token: &str,
    platform_target: &str,
) -> Result<VerificationReport, DnsError> {
    let record_name = verification_record_name(domain);
    let txt = resolver.lookup(&record_name, RecordType::Txt).await?;
    let txt_found = txt.values(RecordType::Txt).iter().any(|v| v.trim() == token);

    let target = normalize_host(platform_target);
    let cnames = soft_values(resolver, domain, RecordType::Cname).await;
    let mut routing_ok = cnames.iter().any(|c| *c == target);
    if !routing_ok {
        let ours = soft_values(resolver, &target, RecordType::A).await;
        let theirs = soft_values(resolver, domain, RecordType::A).await;
        routing_ok = !ours.is_empty() && theirs.iter().any(|ip| ours.contains(ip));
    }

    Ok(VerificationReport {
        record_name,
        txt_found,
        routing_ok,
        passed: txt_found && routing_ok,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::testing::StaticResolver;

    const TARGET: &str = "sites.devfolio.app";

    #[test]
    fn test_normalize_domain_strips_noise() {
        assert_eq!(
            normalize_domain("  HTTPS://Jane-Doe.dev/about?x=1 ").unwrap(),
            "jane-doe.dev"
        );
        assert_eq!(normalize_domain("www.janedoe.dev.").unwrap(), "www.janedoe.dev");
        assert_eq!(normalize_domain("janedoe.dev:8080").unwrap(), "janedoe.dev");
    }

    #[test]
    fn test_normalize_domain_rejects_garbage() {
        assert!(normalize_domain("").is_err());
        assert!(normalize_domain("localhost").is_err());
        assert!(normalize_domain("-bad.dev").is_err());
        assert!(normalize_domain("bad_label.dev").is_err());
        assert!(normalize_domain("example.c0m").is_err());
        assert!(normalize_domain("a..dev").is_err());
    }

    #[test]
    fn test_apex_of() {
        assert_eq!(apex_of("janedoe.dev"), "janedoe.dev");
        assert_eq!(apex_of("www.janedoe.dev"), "janedoe.dev");
        assert_eq!(apex_of("portfolio.jane.co.uk"), "jane.co.uk");
        assert_eq!(apex_of("jane.co.uk"), "jane.co.uk");
    }

    #[tokio::test]
    async fn test_detect_unregistered_domain() {
        let resolver = StaticResolver::default();
        let d = detect(&resolver, "brand-new-name.dev", TARGET).await.unwrap();
        assert!(d.available);
        assert!(!d.already_active);
        assert!(d.provider.is_none());
    }

    #[tokio::test]
    async fn test_detect_registered_and_hosted_elsewhere() {
        let resolver = StaticResolver::default()
            .with("janedoe.dev", RecordType::Ns, &["ns1.domaincontrol.com.", "ns2.domaincontrol.com."])
            .with("janedoe.dev", RecordType::A, &["76.76.21.21"]);
        let d = detect(&resolver, "https://janedoe.dev", TARGET).await.unwrap();
        assert!(!d.available);
        assert!(d.already_active);
        assert_eq!(d.active_platform.as_deref(), Some("Vercel"));
        let provider = d.provider.unwrap();
        assert_eq!(provider.label, "GoDaddy");
        assert!(provider.dns_console_url.contains("janedoe.dev"));
    }

    #[tokio::test]
    async fn test_detect_already_pointing_here() {
        let resolver = StaticResolver::default()
            .with("janedoe.dev", RecordType::Ns, &["ns1.registrar-servers.com."])
            .with("www.janedoe.dev", RecordType::Cname, &["sites.devfolio.app."]);
        let d = detect(&resolver, "janedoe.dev", TARGET).await.unwrap();
        assert!(d.points_to_platform);
        assert!(!d.already_active);
        assert_eq!(d.provider.unwrap().id, "namecheap");
    }

    #[tokio::test]
    async fn test_detect_rejects_invalid_input() {
        let resolver = StaticResolver::default();
        assert!(detect(&resolver, "not a domain", TARGET).await.is_err());
    }

    #[tokio::test]
    async fn test_verify_requires_token_and_routing() {
        let token = "devfolio-verify=abc123";
        let txt = format!("\"{}\"", token);

        let only_txt = StaticResolver::default().with(
            "_devfolio.janedoe.dev",
            RecordType::Txt,
            &[txt.as_str()],
        );
        let report = verify_ownership(&only_txt, "janedoe.dev", token, TARGET).await.unwrap();
        assert!(report.txt_found);
        assert!(!report.routing_ok);
        assert!(!report.passed);

        let complete = StaticResolver::default()
            .with("_devfolio.janedoe.dev", RecordType::Txt, &[txt.as_str()])
            .with("janedoe.dev", RecordType::Cname, &["sites.devfolio.app."]);
        let report = verify_ownership(&complete, "janedoe.dev", token, TARGET).await.unwrap();
        assert!(report.passed);
    }

    #[tokio::test]
    async fn test_verify_accepts_matching_address() {
        let token = "devfolio-verify=xyz";
        let resolver = StaticResolver::default()
            .with("_devfolio.janedoe.dev", RecordType::Txt, &["\"devfolio-verify=xyz\""])
            .with("sites.devfolio.app", RecordType::A, &["203.0.113.10"])
            .with("janedoe.dev", RecordType::A, &["203.0.113.10"]);
        let report = verify_ownership(&resolver, "janedoe.dev", token, TARGET).await.unwrap();
        assert!(report.routing_ok);
        assert!(report.passed);
    }

    #[tokio::test]
    async fn test_verify_wrong_token_fails() {
        let resolver = StaticResolver::default()
            .with("_devfolio.janedoe.dev", RecordType::Txt, &["\"devfolio-verify=other\""])
            .with("janedoe.dev", RecordType::Cname, &["sites.devfolio.app"]);
        let report = verify_ownership(&resolver, "janedoe.dev", "devfolio-verify=mine", TARGET)
            .await
            .unwrap();
        assert!(!report.txt_found);
        assert!(!report.passed);
    }
}
