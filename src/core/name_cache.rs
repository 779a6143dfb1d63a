//! TTL cache from IP address to display name.
//!
//! Lookups run on the worker pool so a slow resolver never holds up a refresh,
//! except when the pool is saturated and the batch is resolved inline. Expired
//! entries are only swept when `append` runs; reads in between may still see
//! them.

use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use super::resolver::{name_or_numeric, Resolver};
use super::worker_pool::{Job, WorkerPool};

pub const DEFAULT_TTL: Duration = Duration::from_secs(120);

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnRecord {
    pub name: String,
    /// `None` when the TTL reaches past what `Instant` can represent.
    pub expires_at: Option<Instant>,
}

impl DnRecord {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at > now)
    }
}

struct Memory {
    records: HashMap<IpAddr, DnRecord>,
    ttl: Duration,
}

pub struct NameCache {
    memory: Arc<Mutex<Memory>>,
    pool: WorkerPool<IpAddr>,
    job: Job<IpAddr>,
    resolver: Arc<dyn Resolver>,
    clock: Arc<dyn Clock>,
}

impl NameCache {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self::with_parts(resolver, Arc::new(SystemClock), WorkerPool::new())
    }

    pub fn with_parts(
        resolver: Arc<dyn Resolver>,
        clock: Arc<dyn Clock>,
        pool: WorkerPool<IpAddr>,
    ) -> Self {
        let memory = Arc::new(Mutex::new(Memory {
            records: HashMap::new(),
            ttl: DEFAULT_TTL,
        }));
        let job = resolve_job(Arc::clone(&memory), Arc::clone(&resolver), Arc::clone(&clock));

        Self {
            memory,
            pool,
            job,
            resolver,
            clock,
        }
    }

    pub fn resolver(&self) -> Arc<dyn Resolver> {
        Arc::clone(&self.resolver)
    }

    /// Cached name for `addr`, or `default`. Never starts a lookup.
    pub fn domain_name(&self, addr: &IpAddr, default: &str) -> String {
        self.memory.lock()
            .records
            .get(addr)
            .map(|record| record.name.clone())
            .unwrap_or_else(|| default.to_string())
    }

    pub fn contains(&self, addr: &IpAddr) -> bool {
        self.memory.lock().records.contains_key(addr)
    }

    pub fn cached_addresses(&self) -> Vec<IpAddr> {
        let mut addrs: Vec<IpAddr> = self.memory.lock().records.keys().copied().collect();
        addrs.sort();
        addrs
    }

    pub fn len(&self) -> usize {
        self.memory.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sweeps expired entries, then resolves every address that is neither
    /// cached nor already in flight.
    pub fn append<I>(&mut self, addrs: I)
    where
        I: IntoIterator<Item = IpAddr>,
    {
        let candidates: Vec<IpAddr> = addrs.into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        // Reaps first: a worker that is gone by now has already stored its names.
        let unowned = self.pool.find_pending(&self.job, &candidates);

        let now = self.clock.now();
        let batch: Vec<IpAddr> = {
            let mut memory = self.memory.lock();
            let before = memory.records.len();
            memory.records.retain(|_, record| record.is_live(now));
            let evicted = before - memory.records.len();
            if evicted > 0 {
                debug!(evicted, "evicted expired names");
            }

            unowned.into_iter()
                .filter(|addr| !memory.records.contains_key(addr))
                .collect()
        };

        if batch.is_empty() {
            return;
        }

        if !self.pool.run(&self.job, &batch) {
            debug!(count = batch.len(), busy = self.pool.occupancy(), "resolving names inline");
            (self.job)(batch.as_slice());
        }
    }

    pub fn ttl(&self) -> Duration {
        self.memory.lock().ttl
    }

    /// Applies to entries inserted from now on.
    pub fn set_ttl(&mut self, ttl: Duration) {
        self.memory.lock().ttl = ttl;
    }

    pub fn clear(&mut self) {
        self.memory.lock().records.clear();
    }

    /// Blocks until every in-flight lookup has been stored.
    pub fn wait_for_pending(&mut self) {
        self.pool.wait_idle();
    }
}

fn resolve_job(
    memory: Arc<Mutex<Memory>>,
    resolver: Arc<dyn Resolver>,
    clock: Arc<dyn Clock>,
) -> Job<IpAddr> {
    Arc::new(move |addrs: &[IpAddr]| {
        for addr in addrs {
            let name = name_or_numeric(resolver.as_ref(), *addr);
            let mut memory = memory.lock();
            let expires_at = clock.now().checked_add(memory.ttl);
            memory.records.insert(*addr, DnRecord { name, expires_at });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{CountingResolver, GatedResolver, ManualClock, StaticResolver};
    use std::net::Ipv4Addr;

    fn addr(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn cache_with(resolver: Arc<dyn Resolver>, clock: Arc<ManualClock>) -> NameCache {
        NameCache::with_parts(resolver, clock, WorkerPool::with_capacity(4))
    }

    #[test]
    fn test_domain_name_falls_back_to_default() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache_with(Arc::new(StaticResolver::default()), clock);

        assert_eq!(cache.domain_name(&addr(1), "10.0.0.1"), "10.0.0.1");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_append_resolves_and_substitutes_numeric_on_failure() {
        let clock = Arc::new(ManualClock::new());
        let resolver = StaticResolver::default().with_name(addr(1), "one.example");
        let mut cache = cache_with(Arc::new(resolver), clock);

        cache.append([addr(1), addr(2)]);
        cache.wait_for_pending();

        assert_eq!(cache.domain_name(&addr(1), "-"), "one.example");
        assert_eq!(cache.domain_name(&addr(2), "-"), "10.0.0.2");
        assert_eq!(cache.cached_addresses(), vec![addr(1), addr(2)]);
    }

    #[test]
    fn test_ttl_eviction_is_lazy() {
        let clock = Arc::new(ManualClock::new());
        let resolver = StaticResolver::default().with_name(addr(1), "one.example");
        let mut cache = cache_with(Arc::new(resolver), Arc::clone(&clock));
        assert_eq!(cache.ttl(), Duration::from_secs(120));

        cache.append([addr(1)]);
        cache.wait_for_pending();

        clock.advance(Duration::from_secs(119));
        assert_eq!(cache.domain_name(&addr(1), "-"), "one.example");

        // Expired but not swept yet.
        clock.advance(Duration::from_secs(2));
        assert!(cache.contains(&addr(1)));

        cache.append([addr(2)]);
        cache.wait_for_pending();
        assert_eq!(cache.cached_addresses(), vec![addr(2)]);
    }

    #[test]
    fn test_set_ttl_and_clear() {
        let clock = Arc::new(ManualClock::new());
        let mut cache = cache_with(Arc::new(StaticResolver::default()), Arc::clone(&clock));
        cache.set_ttl(Duration::from_secs(5));
        assert_eq!(cache.ttl(), Duration::from_secs(5));

        cache.append([addr(1)]);
        cache.wait_for_pending();
        clock.advance(Duration::from_secs(6));
        cache.append(std::iter::empty());
        assert!(cache.is_empty());

        cache.append([addr(3)]);
        cache.wait_for_pending();
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_unrepresentable_ttl_never_expires() {
        let clock = Arc::new(ManualClock::new());
        let resolver = StaticResolver::default().with_name(addr(1), "one.example");
        let mut cache = cache_with(Arc::new(resolver), Arc::clone(&clock));
        cache.set_ttl(Duration::from_secs(u64::MAX));

        cache.append([addr(1)]);
        cache.wait_for_pending();
        assert_eq!(cache.domain_name(&addr(1), "-"), "one.example");

        clock.advance(Duration::from_secs(365 * 24 * 60 * 60));
        cache.append(std::iter::empty());
        assert!(cache.contains(&addr(1)));
    }

    #[test]
    fn test_finished_worker_is_not_redispatched() {
        let clock = Arc::new(ManualClock::new());
        let resolver = Arc::new(CountingResolver::default());
        let mut cache = cache_with(resolver.clone(), clock);
        let rounds = 20_000;

        for _ in 0..rounds {
            cache.clear();
            cache.append([addr(1)]);
            cache.append([addr(1)]);
            cache.wait_for_pending();
        }

        assert_eq!(resolver.calls(), rounds);
    }

    #[test]
    fn test_in_flight_address_is_resolved_once() {
        let clock = Arc::new(ManualClock::new());
        let resolver = Arc::new(GatedResolver::new());
        let mut cache = cache_with(resolver.clone(), clock);

        cache.append([addr(1)]);
        cache.append([addr(1), addr(2)]);
        cache.append([addr(2), addr(1)]);

        resolver.open();
        cache.wait_for_pending();

        assert_eq!(resolver.calls_for(addr(1)), 1);
        assert_eq!(resolver.calls_for(addr(2)), 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_saturated_pool_resolves_inline() {
        let clock = Arc::new(ManualClock::new());
        let resolver = Arc::new(GatedResolver::new());
        let mut cache = NameCache::with_parts(resolver.clone(), clock, WorkerPool::with_capacity(1));

        cache.append([addr(1)]);
        // Pool is full; addr(2) must be handled on this thread, so let it through.
        resolver.allow(addr(2));
        cache.append([addr(2)]);
        assert_eq!(cache.domain_name(&addr(2), "-"), "10.0.0.2");
        assert!(!cache.contains(&addr(1)));

        resolver.open();
        cache.wait_for_pending();
        assert!(cache.contains(&addr(1)));
    }
}
