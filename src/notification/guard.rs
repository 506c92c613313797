//! 出站地址校验（基础 SSRF 防护）
//!
//! - 仅允许 http/https
//! - host 不能为空
//! - 解析出的每个 IP 都不能落在回环、私网、链路本地、云元数据、IPv6 ULA 网段
//!
//! [`DnsGuard`] 只校验首个地址。默认 HTTP 客户端（[`guarded_client`]）还会
//! 在每次重定向时检查新地址，并在建立连接时重新解析、过滤域名，
//! 校验与连接之间换了 DNS 结果也会被拦下。

use async_trait::async_trait;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::{Host, Url};

use crate::error::{DisallowedTarget, NotifyError, Result};

/// 最多跟随的重定向次数
const MAX_REDIRECTS: usize = 10;

/// 出站校验
#[async_trait]
pub trait OutboundGuard: Send + Sync {
    /// 校验通过返回 Ok，否则返回 `NotifyError::Validation`
    async fn check(&self, url: &Url) -> Result<()>;
}

/// 基于 DNS 解析的默认校验
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsGuard;

#[async_trait]
impl OutboundGuard for DnsGuard {
    async fn check(&self, url: &Url) -> Result<()> {
        check_scheme(url)?;

        let ips: Vec<IpAddr> = match url.host() {
            None => return Err(NotifyError::validation("empty host")),
            Some(Host::Domain(d)) if d.is_empty() => {
                return Err(NotifyError::validation("empty host"))
            }
            Some(Host::Ipv4(ip)) => vec![IpAddr::V4(ip)],
            Some(Host::Ipv6(ip)) => vec![IpAddr::V6(ip)],
            Some(Host::Domain(domain)) => {
                let port = url.port_or_known_default().unwrap_or(80);
                let addrs = tokio::net::lookup_host((domain, port))
                    .await
                    .map_err(|e| NotifyError::validation(format!("dns lookup failed: {}", e)))?;
                addrs.map(|a| a.ip()).collect()
            }
        };

        check_resolved(&ips)?;
        debug!(host = ?url.host_str(), resolved = ips.len(), "Outbound target allowed");
        Ok(())
    }
}

/// 只检查 scheme，供不需要 DNS 的场景复用
pub fn check_scheme(url: &Url) -> Result<()> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(NotifyError::validation(format!("unsupported scheme: {}", other))),
    }
}

/// 解析结果不能为空，且每个地址都必须允许访问
fn check_resolved(ips: &[IpAddr]) -> Result<()> {
    if ips.is_empty() {
        return Err(NotifyError::validation("dns lookup failed: no addresses"));
    }
    for ip in ips {
        if is_disallowed_ip(*ip) {
            return Err(NotifyError::validation(format!("disallowed target ip: {}", ip)));
        }
    }
    Ok(())
}

/// 重定向目标的同步校验：scheme 与 IP 字面量
///
/// 域名在连接时交给 [`GuardedResolver`]。
pub fn check_redirect_target(url: &Url) -> Result<()> {
    check_scheme(url)?;
    match url.host() {
        None => Err(NotifyError::validation("empty host")),
        Some(Host::Domain(d)) if d.is_empty() => Err(NotifyError::validation("empty host")),
        Some(Host::Domain(_)) => Ok(()),
        Some(Host::Ipv4(ip)) => check_resolved(&[IpAddr::V4(ip)]),
        Some(Host::Ipv6(ip)) => check_resolved(&[IpAddr::V6(ip)]),
    }
}

/// 每一跳都经过 [`check_redirect_target`] 的重定向策略
pub fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        let verdict = check_redirect_target(attempt.url());
        match verdict {
            Ok(()) => attempt.follow(),
            Err(e) => {
                warn!(url = %attempt.url(), error = %e, "Redirect blocked");
                attempt.error(DisallowedTarget(e.to_string()))
            }
        }
    })
}

/// 连接时重新解析域名，结果中含禁止访问的地址则连接失败
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardedResolver;

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(async move {
            let host = name.as_str().to_string();
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0)).await?.collect();
            let ips: Vec<IpAddr> = addrs.iter().map(|a| a.ip()).collect();
            check_resolved(&ips).map_err(|e| DisallowedTarget(e.to_string()))?;
            let addrs: Addrs = Box::new(addrs.into_iter());
            Ok::<Addrs, Box<dyn std::error::Error + Send + Sync>>(addrs)
        })
    }
}

/// 带重定向校验与受控 DNS 解析的 HTTP 客户端
pub fn guarded_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .redirect(redirect_policy())
        .dns_resolver(Arc::new(GuardedResolver))
        .build()
}

/// 是否为禁止访问的地址
pub fn is_disallowed_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_disallowed_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_disallowed_v4(v4),
            None => is_disallowed_v6(v6),
        },
    }
}

fn is_disallowed_v4(ip: Ipv4Addr) -> bool {
    // 169.254.169.254 云元数据包含在链路本地段内
    ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified()
}

fn is_disallowed_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // fc00::/7
        || (first & 0xfe00) == 0xfc00
        // fe80::/10
        || (first & 0xffc0) == 0xfe80
}
