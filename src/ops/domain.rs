// src/ops/domain.rs
//
// Coolify's public address lives in `instance_settings.fqdn`. Writes go
// through the coolify-db container and are followed by a Coolify restart.

use std::net::Ipv4Addr;
use tracing::info;

use super::results::{DnsCheckResult, DomainResult, Issue, Outcome};
use super::{settle, FleetService};
use crate::error::{FleetError, Result};
use crate::models::{ServerMode, ServerRecord};
use crate::sys::commands::{coolify_db_ready, dns_lookup, domain_url, fqdn_read, fqdn_update, ip_url};
use crate::sys::parsers::{parse_dns_addresses, parse_fqdn};
use crate::sys::validate::{sanitize_domain, validate_domain, validate_url_chars};

/// URL-safe check, then sanitize, then the domain grammar.
fn clean_domain(input: &str) -> Result<String> {
    validate_url_chars(input)?;
    let domain = sanitize_domain(input);
    validate_domain(&domain)?;
    Ok(domain)
}

fn require_coolify(record: &ServerRecord) -> Result<()> {
    if record.mode == ServerMode::Bare {
        return Err(FleetError::Validation(format!(
            "Server '{}' runs in bare mode; domain management needs Coolify",
            record.name
        )));
    }
    Ok(())
}

impl FleetService {
    /// `Some(outcome)` when the coolify-db container cannot answer; no write is attempted then.
    async fn db_unavailable(&self, record: &ServerRecord) -> Result<Option<DomainResult>> {
        match self.run_checked(record, &coolify_db_ready()).await {
            Ok(_) => Ok(None),
            Err(e @ FleetError::Command { .. }) => {
                let mut issue = Issue::from_error(&e);
                issue.hint = Some(
                    "The Coolify database (coolify-db container) is not accepting connections. Check `docker ps` on the server and retry."
                        .to_string(),
                );
                Ok(Some(DomainResult {
                    server: Some(record.name.clone()),
                    ..DomainResult::failed(issue)
                }))
            }
            Err(e) => Err(e),
        }
    }

    async fn write_fqdn(&self, record: &ServerRecord, fqdn: String) -> Result<DomainResult> {
        let script = fqdn_update(&fqdn)?;
        if let Some(outcome) = self.db_unavailable(record).await? {
            return Ok(outcome);
        }

        self.run_script(record, &script).await?;
        info!("🌐 FQDN of '{}' set to {}", record.name, fqdn);

        Ok(DomainResult {
            success: true,
            server: Some(record.name.clone()),
            fqdn: Some(fqdn),
            issue: Issue::default(),
        })
    }

    // ==============================================================================
    // 1. Set / Remove
    // ==============================================================================

    pub async fn domain_set(&self, selector: &str, domain: &str, ssl: bool) -> Result<DomainResult> {
        settle(self.try_domain_set(selector, domain, ssl).await)
    }

    async fn try_domain_set(&self, selector: &str, domain: &str, ssl: bool) -> Result<DomainResult> {
        let domain = clean_domain(domain)?;
        let record = self.resolve_server(selector).await?;
        require_coolify(&record)?;

        self.write_fqdn(&record, domain_url(&domain, ssl)?).await
    }

    /// Back to `http://<ip>:<coolify_port>`.
    pub async fn domain_remove(&self, selector: &str) -> Result<DomainResult> {
        settle(self.try_domain_remove(selector).await)
    }

    async fn try_domain_remove(&self, selector: &str) -> Result<DomainResult> {
        let record = self.resolve_server(selector).await?;
        require_coolify(&record)?;

        let fqdn = ip_url(&record.ip, self.config.coolify_port)?;
        self.write_fqdn(&record, fqdn).await
    }

    // ==============================================================================
    // 2. Check / Info
    // ==============================================================================

    /// Resolves `domain` from the server itself and compares with its IP.
    pub async fn domain_check(&self, selector: &str, domain: &str) -> Result<DnsCheckResult> {
        settle(self.try_domain_check(selector, domain).await)
    }

    async fn try_domain_check(&self, selector: &str, domain: &str) -> Result<DnsCheckResult> {
        let domain = clean_domain(domain)?;
        let record = self.resolve_server(selector).await?;
        let server_ip: Ipv4Addr = record
            .ip
            .parse()
            .map_err(|_| FleetError::Inventory(format!("stored IP '{}' of '{}' is not IPv4", record.ip, record.name)))?;

        let output = self.run_checked(&record, &dns_lookup(&domain)?).await?;
        let addresses = parse_dns_addresses(&output);

        // Every answer has to be the server: a stray A record sends part of the traffic elsewhere.
        let resolved = addresses.first().copied();
        let strays: Vec<String> = addresses.iter().filter(|a| **a != server_ip).map(|a| a.to_string()).collect();
        let matches = resolved.is_some() && strays.is_empty();
        let issue = match resolved {
            _ if matches => Issue::default(),
            None => Issue::hint(format!(
                "No A record found for {}. Create an A record pointing to {}.",
                domain, server_ip
            )),
            Some(_) if addresses.contains(&server_ip) => Issue::hint(format!(
                "{} resolves to {} as well as the server IP {}. Remove the extra A records so it points only to {}.",
                domain,
                strays.join(", "),
                server_ip,
                server_ip
            )),
            Some(other) => Issue::hint(format!(
                "{} resolves to {} but the server IP is {}. Update the A record to point to {}.",
                domain, other, server_ip, server_ip
            )),
        };
        info!("DNS check {} -> {:?} (server {}): match={}", domain, resolved, server_ip, matches);

        Ok(DnsCheckResult {
            success: true,
            domain: Some(domain),
            server_ip: Some(record.ip),
            resolved_ip: resolved.map(|ip| ip.to_string()),
            matches,
            issue,
        })
    }

    pub async fn domain_info(&self, selector: &str) -> Result<DomainResult> {
        settle(self.try_domain_info(selector).await)
    }

    async fn try_domain_info(&self, selector: &str) -> Result<DomainResult> {
        let record = self.resolve_server(selector).await?;
        require_coolify(&record)?;

        let output = self.run_checked(&record, &fqdn_read()).await?;
        Ok(DomainResult {
            success: true,
            server: Some(record.name),
            fqdn: parse_fqdn(&output),
            issue: Issue::default(),
        })
    }
}
