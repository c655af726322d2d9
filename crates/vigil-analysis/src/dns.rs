//! Resilient name resolution for the inference endpoint.
//!
//! The system resolver is consulted first; on failure a static
//! hostname→address table for the known endpoint host takes over. When
//! both fail, the original system-resolver error is the one surfaced.

use std::{
    collections::HashMap,
    io,
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use async_trait::async_trait;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use tracing::{error, warn};

#[async_trait]
pub trait ResolveHost: Send + Sync {
    async fn lookup(&self, host: &str) -> io::Result<Vec<SocketAddr>>;
}

/// Delegates to the operating system resolver.
pub struct SystemResolver;

#[async_trait]
impl ResolveHost for SystemResolver {
    async fn lookup(&self, host: &str) -> io::Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, 0)).await?.collect();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses for {host}"),
            ));
        }
        Ok(addrs)
    }
}

/// Fixed hostname→address table for hosts known ahead of time.
#[derive(Default)]
pub struct StaticTableResolver {
    table: HashMap<String, Vec<IpAddr>>,
}

impl StaticTableResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pinned(host: impl Into<String>, addrs: &[IpAddr]) -> Self {
        let mut resolver = Self::new();
        resolver.insert(host, addrs);
        resolver
    }

    pub fn insert(&mut self, host: impl Into<String>, addrs: &[IpAddr]) {
        self.table.insert(host.into(), addrs.to_vec());
    }
}

#[async_trait]
impl ResolveHost for StaticTableResolver {
    async fn lookup(&self, host: &str) -> io::Result<Vec<SocketAddr>> {
        match self.table.get(host) {
            Some(addrs) if !addrs.is_empty() => Ok(addrs
                .iter()
                .map(|addr| SocketAddr::new(*addr, 0))
                .collect()),
            _ => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{host} is not in the pinned address table"),
            )),
        }
    }
}

/// Primary-then-fallback resolution chain.
///
/// The fallback is consulted exactly once, and only after the primary
/// failed; a double failure surfaces the primary's error.
pub struct FallbackResolver<P, F> {
    primary: P,
    fallback: F,
}

impl<P: ResolveHost, F: ResolveHost> FallbackResolver<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl<P: ResolveHost, F: ResolveHost> ResolveHost for FallbackResolver<P, F> {
    async fn lookup(&self, host: &str) -> io::Result<Vec<SocketAddr>> {
        let primary_err = match self.primary.lookup(host).await {
            Ok(addrs) => return Ok(addrs),
            Err(err) => err,
        };
        warn!("System DNS failed for {host}, trying pinned addresses");
        match self.fallback.lookup(host).await {
            Ok(addrs) => Ok(addrs),
            Err(fallback_err) => {
                error!("Fallback resolution also failed for {host}: {fallback_err}");
                Err(primary_err)
            }
        }
    }
}

/// Adapter plugging a [`ResolveHost`] chain into reqwest's client.
#[derive(Clone)]
pub struct DnsChain {
    inner: Arc<dyn ResolveHost>,
}

impl DnsChain {
    pub fn new(resolver: impl ResolveHost + 'static) -> Self {
        Self {
            inner: Arc::new(resolver),
        }
    }
}

impl Resolve for DnsChain {
    fn resolve(&self, name: Name) -> Resolving {
        let inner = self.inner.clone();
        Box::pin(async move {
            let addrs = inner
                .lookup(name.as_str())
                .await
                .map_err(|err| Box::new(err) as Box<dyn std::error::Error + Send + Sync>)?;
            let addrs: Addrs = Box::new(addrs.into_iter());
            Ok(addrs)
        })
    }
}
