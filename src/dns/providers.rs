//! Known DNS hosts and hosting platforms, matched by record content.

use serde::Serialize;

pub struct Provider {
    pub id: &'static str,
    pub label: &'static str,
    /// Substrings of nameserver hostnames that identify the provider.
    pub nameserver_patterns: &'static [&'static str],
    /// DNS console link; `{domain}` is substituted.
    pub console_url: &'static str,
}

pub const PROVIDERS: &[Provider] = &[
    Provider {
        id: "cloudflare",
        label: "Cloudflare",
        nameserver_patterns: &["ns.cloudflare.com"],
        console_url: "https://dash.cloudflare.com/?to=/:account/{domain}/dns",
    },
    Provider {
        id: "godaddy",
        label: "GoDaddy",
        nameserver_patterns: &["domaincontrol.com"],
        console_url: "https://dcc.godaddy.com/manage/{domain}/dns",
    },
    Provider {
        id: "namecheap",
        label: "Namecheap",
        nameserver_patterns: &["registrar-servers.com"],
        console_url: "https://ap.www.namecheap.com/Domains/DomainControlPanel/{domain}/advancedns",
    },
    Provider {
        id: "ovh",
        label: "OVHcloud",
        nameserver_patterns: &["ovh.net", "ovh.ca", "anycast.me"],
        console_url: "https://www.ovh.com/manager/#/web/domain/{domain}/zone",
    },
    Provider {
        id: "route53",
        label: "Amazon Route 53",
        nameserver_patterns: &["awsdns"],
        console_url: "https://console.aws.amazon.com/route53/v2/hostedzones",
    },
    Provider {
        id: "google",
        label: "Google Domains / Squarespace",
        nameserver_patterns: &["googledomains.com", "squarespacedns.com"],
        console_url: "https://account.squarespace.com/domains/managed/{domain}/dns/dns-settings",
    },
    Provider {
        id: "gandi",
        label: "Gandi",
        nameserver_patterns: &["gandi.net"],
        console_url: "https://admin.gandi.net/domain/{domain}/records",
    },
    Provider {
        id: "ionos",
        label: "IONOS",
        nameserver_patterns: &["ui-dns.", "1and1"],
        console_url: "https://my.ionos.com/domain-dns-settings/{domain}",
    },
    Provider {
        id: "hostinger",
        label: "Hostinger",
        nameserver_patterns: &["dns-parking.com", "hostinger"],
        console_url: "https://hpanel.hostinger.com/domain/{domain}/dns",
    },
    Provider {
        id: "porkbun",
        label: "Porkbun",
        nameserver_patterns: &["porkbun.com"],
        console_url: "https://porkbun.com/account/domainsSpeedy",
    },
    Provider {
        id: "namecom",
        label: "Name.com",
        nameserver_patterns: &["name.com"],
        console_url: "https://www.name.com/account/domain/details/{domain}#dns",
    },
    Provider {
        id: "digitalocean",
        label: "DigitalOcean",
        nameserver_patterns: &["digitalocean.com"],
        console_url: "https://cloud.digitalocean.com/networking/domains/{domain}",
    },
    Provider {
        id: "vercel",
        label: "Vercel",
        nameserver_patterns: &["vercel-dns.com"],
        console_url: "https://vercel.com/dashboard/domains",
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMatch {
    pub id: String,
    pub label: String,
    pub dns_console_url: String,
}

/// First provider whose pattern appears in any of the nameservers.
pub fn match_provider(nameservers: &[String], domain: &str) -> Option<ProviderMatch> {
    PROVIDERS
        .iter()
        .find(|p| {
            nameservers.iter().any(|ns| {
                let ns = ns.to_lowercase();
                p.nameserver_patterns.iter().any(|pat| ns.contains(pat))
            })
        })
        .map(|p| ProviderMatch {
            id: p.id.to_string(),
            label: p.label.to_string(),
            dns_console_url: p.console_url.replace("{domain}", domain),
        })
}

/// Addresses of hosting platforms that mean the domain already serves a site.
const ACTIVE_A_RECORDS: &[(&str, &str)] = &[
    ("76.76.21.21", "Vercel"),
    ("75.2.60.5", "Netlify"),
    ("185.199.108.153", "GitHub Pages"),
    ("185.199.109.153", "GitHub Pages"),
    ("185.199.110.153", "GitHub Pages"),
    ("185.199.111.153", "GitHub Pages"),
    ("198.185.159.144", "Squarespace"),
    ("198.185.159.145", "Squarespace"),
    ("198.49.23.144", "Squarespace"),
    ("198.49.23.145", "Squarespace"),
    ("23.227.38.65", "Shopify"),
    ("23.236.62.147", "Wix"),
];

const ACTIVE_CNAME_SUFFIXES: &[(&str, &str)] = &[
    ("vercel-dns.com", "Vercel"),
    ("vercel.app", "Vercel"),
    ("netlify.app", "Netlify"),
    ("netlify.com", "Netlify"),
    ("github.io", "GitHub Pages"),
    ("herokudns.com", "Heroku"),
    ("pages.dev", "Cloudflare Pages"),
    ("wixdns.net", "Wix"),
    ("squarespace.com", "Squarespace"),
    ("myshopify.com", "Shopify"),
    ("webflow.io", "Webflow"),
    ("azurewebsites.net", "Azure App Service"),
    ("ghost.io", "Ghost"),
    ("wordpress.com", "WordPress.com"),
];

/// Hosting platform behind an A or CNAME value, if it is on the list.
pub fn active_signature(a_records: &[String], cnames: &[String]) -> Option<&'static str> {
    a_records
        .iter()
        .find_map(|ip| {
            ACTIVE_A_RECORDS
                .iter()
                .find(|(known, _)| known == ip)
                .map(|(_, label)| *label)
        })
        .or_else(|| {
            cnames.iter().find_map(|cname| {
                ACTIVE_CNAME_SUFFIXES
                    .iter()
                    .find(|(suffix, _)| cname == suffix || cname.ends_with(&format!(".{}", suffix)))
                    .map(|(_, label)| *label)
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns(hosts: &[&str]) -> Vec<String> {
        hosts.iter().map(|h| h.to_string()).collect()
    }

    #[test]
    fn test_match_godaddy_with_deep_link() {
        let m = match_provider(&ns(&["ns51.domaincontrol.com"]), "janedoe.dev").unwrap();
        assert_eq!(m.id, "godaddy");
        assert_eq!(m.dns_console_url, "https://dcc.godaddy.com/manage/janedoe.dev/dns");
    }

    #[test]
    fn test_match_route53_and_cloudflare() {
        assert_eq!(
            match_provider(&ns(&["ns-1234.awsdns-12.org"]), "x.io").unwrap().id,
            "route53"
        );
        assert_eq!(
            match_provider(&ns(&["ADA.NS.CLOUDFLARE.COM"]), "x.io").unwrap().id,
            "cloudflare"
        );
    }

    #[test]
    fn test_unknown_provider() {
        assert!(match_provider(&ns(&["ns1.my-own-dns.example"]), "x.io").is_none());
        assert!(match_provider(&[], "x.io").is_none());
    }

    #[test]
    fn test_active_signature_by_ip_and_cname() {
        assert_eq!(active_signature(&ns(&["76.76.21.21"]), &[]), Some("Vercel"));
        assert_eq!(
            active_signature(&[], &ns(&["janedoe.github.io"])),
            Some("GitHub Pages")
        );
        assert_eq!(active_signature(&ns(&["203.0.113.7"]), &ns(&["notgithub.io"])), None);
    }
}
