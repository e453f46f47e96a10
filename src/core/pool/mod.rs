// src/core/pool/mod.rs

//! Implements the load-balanced connection pool for one target server.
//!
//! The pool owns a bounded idle ring of reusable connections, decides whether a new
//! request may open a connection right now, and tracks the target's health through
//! a throttled warmup/fail state machine. All state lives behind a single mutex;
//! transport I/O always happens outside of it.

pub mod config;
pub mod guard;
pub mod slot;
pub mod state;
pub mod stats;
pub mod warmup;

pub use config::PoolConfig;
pub use guard::PooledConnection;
pub use slot::ConnectionSlot;
pub use state::PoolState;
pub use stats::{PoolSnapshot, PoolStats};

use crate::core::clock::now_millis;
use crate::core::transport::{Connector, RequestBody, ResponseBody};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, info, warn};
use warmup::{DEGRADE_INTERVAL_MS, WARMUP_MAX, WARMUP_MIN, chunk_ms, connection_cap};

/// The fail-recover window used right after a success.
const INITIAL_FAIL_RECOVER_MS: u64 = 1000;
/// The latency factor decays to zero over this period without successes.
const LATENCY_DECAY_PERIOD_MS: u64 = 60_000;

/// How a request wants to be admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireMode {
    /// Generic load-balanced request, subject to warmup throttling.
    Soft,
    /// Only checks the fail-recover window; used for replication traffic.
    LiveOnly,
    /// A request pinned to this server by session affinity.
    SessionAffinity,
    /// Opens a connection whenever the pool is initialised.
    ForceLoadBalance,
}

/// Mutable pool state, guarded by the pool mutex.
#[derive(Debug)]
struct PoolInner {
    state: PoolState,
    /// Current ramp step, or a negative degraded level after failures.
    warmup_level: i32,
    first_success_at: u64,
    last_success_at: u64,
    prev_success_at: u64,
    fail_at: u64,
    last_fail_at: u64,
    last_fail_connect_at: u64,
    last_busy_at: u64,
    dynamic_fail_recover_ms: u64,
    latency_factor: f64,
    /// Most recently freed slot at the back.
    idle: VecDeque<ConnectionSlot>,
    active_count: usize,
    starting_count: usize,
}

impl PoolInner {
    fn total_count(&self) -> usize {
        self.active_count + self.starting_count + self.idle.len()
    }
}

/// Maintains 0..N live transport connections to exactly one remote server.
pub struct ConnectionPool {
    source_id: String,
    target_id: String,
    address: String,
    debug_id: String,
    config: PoolConfig,
    connector: Arc<dyn Connector>,
    warmup_ms: u64,
    warmup_chunk_ms: u64,
    fail_chunk_ms: u64,
    idle_timeout_ms: u64,
    fail_recover_ms: u64,
    busy_recover_ms: u64,
    inner: Mutex<PoolInner>,
    stats: PoolStats,
    next_slot_id: AtomicU64,
    next_request_id: AtomicU64,
    load_balance_allocations: AtomicUsize,
}

impl ConnectionPool {
    /// Creates a pool in the `NEW` state. Call `init` before use.
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        address: impl Into<String>,
        config: PoolConfig,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let source_id = source_id.into();
        let mut target_id = target_id.into();
        if target_id.is_empty() {
            target_id = "default".to_string();
        }
        let debug_id = format!("{source_id}->{target_id}");
        let warmup_ms = config.warmup_time.as_millis() as u64;
        let fail_recover_ms = config.fail_recover_time.as_millis() as u64;

        Self {
            source_id,
            target_id,
            address: address.into(),
            debug_id,
            warmup_ms,
            warmup_chunk_ms: chunk_ms(warmup_ms),
            fail_chunk_ms: chunk_ms(fail_recover_ms),
            idle_timeout_ms: config.idle_timeout.as_millis() as u64,
            fail_recover_ms,
            busy_recover_ms: config.busy_recover_time.as_millis() as u64,
            inner: Mutex::new(PoolInner {
                state: PoolState::New,
                warmup_level: 0,
                first_success_at: 0,
                last_success_at: 0,
                prev_success_at: 0,
                fail_at: 0,
                last_fail_at: 0,
                last_fail_connect_at: 0,
                last_busy_at: 0,
                dynamic_fail_recover_ms: INITIAL_FAIL_RECOVER_MS.min(fail_recover_ms),
                latency_factor: 0.0,
                idle: VecDeque::with_capacity(config.idle_pool_size),
                active_count: 0,
                starting_count: 0,
            }),
            config,
            connector,
            stats: PoolStats::new(),
            next_slot_id: AtomicU64::new(1),
            next_request_id: AtomicU64::new(1),
            load_balance_allocations: AtomicUsize::new(0),
        }
    }

    /// Moves a new pool to `STARTING`.
    pub fn init(&self) {
        let mut inner = self.inner.lock();
        if inner.state == PoolState::New {
            inner.state = PoolState::Starting;
            debug!("{} initialised at {}", self.debug_id, self.address);
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn debug_id(&self) -> &str {
        &self.debug_id
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// The configured load-balance weight.
    pub fn weight(&self) -> u32 {
        self.config.weight
    }

    /// Counts a request a load balancer has routed to this pool but not finished yet.
    pub fn allocate_load_balance(&self) -> usize {
        self.load_balance_allocations.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn free_load_balance(&self) {
        let _ = self.load_balance_allocations.fetch_update(
            Ordering::AcqRel,
            Ordering::Acquire,
            |n| n.checked_sub(1),
        );
    }

    pub fn load_balance_allocations(&self) -> usize {
        self.load_balance_allocations.load(Ordering::Acquire)
    }

    pub(crate) fn next_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    // --- Status ---

    /// Returns the current state after re-evaluating warmup progress.
    pub fn state(&self) -> PoolState {
        let mut inner = self.inner.lock();
        self.update_warmup(&mut inner, now_millis());
        inner.state
    }

    /// True when the target is believed reachable.
    pub fn is_active(&self) -> bool {
        self.inner.lock().state.is_live()
    }

    pub fn is_dead(&self) -> bool {
        !self.is_active()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().state.is_enabled()
    }

    pub fn warmup_level(&self) -> i32 {
        self.inner.lock().warmup_level
    }

    pub fn dynamic_fail_recover_ms(&self) -> u64 {
        self.inner.lock().dynamic_fail_recover_ms
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().active_count
    }

    pub fn starting_count(&self) -> usize {
        self.inner.lock().starting_count
    }

    pub fn idle_count(&self) -> usize {
        self.inner.lock().idle.len()
    }

    pub fn last_success_at(&self) -> u64 {
        self.inner.lock().last_success_at
    }

    pub fn first_success_at(&self) -> u64 {
        self.inner.lock().first_success_at
    }

    /// The smoothed inter-success latency, decayed to zero over 60s without successes.
    pub fn latency_factor(&self) -> f64 {
        let inner = self.inner.lock();
        let since = now_millis().saturating_sub(inner.last_success_at);
        if since >= LATENCY_DECAY_PERIOD_MS {
            0.0
        } else {
            let delta = (LATENCY_DECAY_PERIOD_MS - since) as f64;
            inner.latency_factor * delta / LATENCY_DECAY_PERIOD_MS as f64
        }
    }

    /// True while inside the fail-recover window of a failure that has not been
    /// superseded by a later success. Connect failures always count.
    pub fn is_failed(&self, now: u64) -> bool {
        self.is_failed_locked(&self.inner.lock(), now)
    }

    fn is_failed_locked(&self, inner: &PoolInner, now: u64) -> bool {
        if now <= inner.fail_at + inner.dynamic_fail_recover_ms {
            if inner.fail_at <= inner.last_fail_connect_at {
                return true;
            }
            if inner.last_success_at <= inner.fail_at {
                return true;
            }
        }
        false
    }

    pub fn is_busy(&self, now: u64) -> bool {
        now < self.inner.lock().last_busy_at + self.busy_recover_ms
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let latency_factor = self.latency_factor();
        let inner = self.inner.lock();
        PoolSnapshot {
            target: self.target_id.clone(),
            address: self.address.clone(),
            state: inner.state,
            warmup_level: inner.warmup_level,
            active: inner.active_count,
            starting: inner.starting_count,
            idle: inner.idle.len(),
            latency_factor,
            dynamic_fail_recover_ms: inner.dynamic_fail_recover_ms,
            last_fail_at: inner.last_fail_at,
            last_busy_at: inner.last_busy_at,
            last_success_at: inner.last_success_at,
            connect_count: self.stats.connect_count(),
            keepalive_count: self.stats.keepalive_count(),
            fail_count: self.stats.fail_count(),
            busy_count: self.stats.busy_count(),
            weight: self.config.weight,
            load_balance_allocations: self.load_balance_allocations(),
        }
    }

    // --- Admission ---

    /// True if a request could be served now, counting idle connections.
    pub fn can_open(&self) -> bool {
        let now = now_millis();
        let inner = self.inner.lock();
        if !inner.idle.is_empty() {
            return true;
        }
        match inner.state {
            PoolState::Active => true,
            state if !state.is_enabled() => false,
            _ => !self.is_failed_locked(&inner, now),
        }
    }

    /// The throttled admission decision for a new connection.
    pub fn can_open_warm(&self) -> bool {
        self.can_open_warm_at(now_millis())
    }

    pub fn can_open_warm_at(&self, now: u64) -> bool {
        self.can_open_warm_locked(&self.inner.lock(), now)
    }

    /// Like `can_open_warm`, but an idle connection also counts as admission.
    pub fn can_open_warm_or_recycle(&self) -> bool {
        let now = now_millis();
        let inner = self.inner.lock();
        if self.is_failed_locked(&inner, now) {
            return false;
        }
        !inner.idle.is_empty() || self.can_open_warm_locked(&inner, now)
    }

    fn can_open_warm_locked(&self, inner: &PoolInner, now: u64) -> bool {
        if inner.state == PoolState::Active {
            return true;
        }
        if !inner.state.is_enabled() || self.is_failed_locked(inner, now) {
            return false;
        }

        let level = self.effective_level(inner, now);
        if level < 0 {
            // Degraded: wait one fail chunk per lost level after the last failure.
            return inner.fail_at + (-level) as u64 * self.fail_chunk_ms < now;
        }

        match connection_cap(level) {
            None => true,
            Some(cap) => inner.total_count() < cap,
        }
    }

    /// The ramp step at `now` while a ramp is running, otherwise the stored level.
    fn effective_level(&self, inner: &PoolInner, now: u64) -> i32 {
        if inner.warmup_level < 0 || inner.first_success_at == 0 {
            return inner.warmup_level;
        }
        warmup::step_for_elapsed(
            now.saturating_sub(inner.first_success_at),
            self.warmup_chunk_ms,
        )
    }

    // --- Acquire / release ---

    /// Borrows a connection to the target.
    ///
    /// A fresh idle connection is reused first; otherwise a new one is opened if
    /// `mode` admits it. `None` means the server is unreachable right now and is
    /// never a fatal condition for the caller.
    pub async fn acquire(self: &Arc<Self>, mode: AcquireMode) -> Option<PooledConnection> {
        {
            let inner = self.inner.lock();
            let permitted = match mode {
                AcquireMode::Soft => inner.state.is_enabled(),
                AcquireMode::LiveOnly => !inner.state.is_closed(),
                AcquireMode::SessionAffinity => inner.state.is_session_enabled(),
                AcquireMode::ForceLoadBalance => inner.state.is_init(),
            };
            if !permitted {
                debug!(
                    "{} refuses {:?} request in state {}",
                    self.debug_id, mode, inner.state
                );
                return None;
            }
        }

        let now = now_millis();
        if let Some(slot) = self.open_recycle(now) {
            return Some(PooledConnection::new(self.clone(), slot));
        }

        let reservation = self.reserve_connect(mode, now)?;
        self.connect(reservation).await
    }

    /// Pops the most recently freed idle slot if it is still fresh.
    fn open_recycle(&self, now: u64) -> Option<ConnectionSlot> {
        let stale: Vec<ConnectionSlot> = {
            let mut inner = self.inner.lock();
            match inner.idle.pop_back() {
                None => return None,
                Some(mut slot) if slot.is_fresh(now, self.idle_timeout_ms) => {
                    inner.active_count += 1;
                    slot.free_at = 0;
                    self.stats.increment_keepalives();
                    return Some(slot);
                }
                Some(slot) => {
                    // Everything older than a stale slot is stale as well.
                    let mut stale: Vec<ConnectionSlot> = inner.idle.drain(..).collect();
                    stale.push(slot);
                    stale
                }
            }
        };

        debug!(
            "{} closing {} expired idle connection(s)",
            self.debug_id,
            stale.len()
        );
        drop(stale);
        None
    }

    /// Decides admission for a new connection and, if admitted, counts it as
    /// starting under the same lock.
    fn reserve_connect(&self, mode: AcquireMode, now: u64) -> Option<StartingReservation<'_>> {
        let mut inner = self.inner.lock();

        let admitted = match mode {
            AcquireMode::Soft => self.can_open_warm_locked(&inner, now),
            AcquireMode::LiveOnly => {
                // In FAIL only one caller at a time probes the target.
                !self.is_failed_locked(&inner, now)
                    && !(inner.state == PoolState::Fail && inner.starting_count > 0)
            }
            AcquireMode::SessionAffinity => {
                !self.is_failed_locked(&inner, now)
                    && now >= inner.last_busy_at + self.busy_recover_ms
            }
            AcquireMode::ForceLoadBalance => true,
        };
        if !admitted {
            debug!(
                "{} denied {:?} connection: state={} level={} total={}",
                self.debug_id,
                mode,
                inner.state,
                inner.warmup_level,
                inner.total_count()
            );
            return None;
        }

        if self.config.max_connections <= inner.active_count + inner.starting_count {
            warn!(
                "{} connect exceeded max-connections (max={}, active={}, starting={})",
                self.debug_id, self.config.max_connections, inner.active_count, inner.starting_count
            );
            return None;
        }

        inner.starting_count += 1;
        Some(StartingReservation {
            pool: self,
            armed: true,
        })
    }

    async fn connect(
        self: &Arc<Self>,
        mut reservation: StartingReservation<'_>,
    ) -> Option<PooledConnection> {
        let started_at = now_millis();
        let result =
            tokio::time::timeout(self.config.connect_timeout, self.connector.connect(&self.address))
                .await;

        match result {
            Ok(Ok(connection)) => {
                let now = now_millis();
                let mut inner = self.inner.lock();
                reservation.armed = false;
                inner.starting_count -= 1;

                if inner.state.is_closed() {
                    debug!("{} closed while connecting, dropping connection", self.debug_id);
                    return None;
                }

                inner.active_count += 1;
                self.stats.increment_connects();
                self.on_success(&mut inner, now);
                drop(inner);

                let id = self.next_slot_id.fetch_add(1, Ordering::Relaxed);
                debug!("{} connect #{}", self.debug_id, id);
                Some(PooledConnection::new(
                    self.clone(),
                    ConnectionSlot::new(id, connection, now),
                ))
            }
            Ok(Err(e)) => {
                drop(reservation);
                debug!("{} connect to {} failed: {}", self.debug_id, self.address, e);
                self.fail_connect_at(started_at);
                None
            }
            Err(_) => {
                drop(reservation);
                debug!(
                    "{} connect to {} timed out after {:?}",
                    self.debug_id, self.address, self.config.connect_timeout
                );
                self.fail_connect_at(started_at);
                None
            }
        }
    }

    /// Returns a healthy slot after a successful request.
    pub(crate) fn free(&self, mut slot: ConnectionSlot) {
        let now = now_millis();
        let mut expired = Vec::new();
        let mut rejected = None;

        {
            let mut inner = self.inner.lock();
            self.record_success(&mut inner, now);
            inner.active_count = inner.active_count.saturating_sub(1);

            if !inner.state.is_closed() && inner.idle.len() < self.config.idle_pool_size {
                slot.free_at = now;
                inner.idle.push_back(slot);
            } else {
                rejected = Some(slot);
            }

            if inner.prev_success_at > 0 {
                let gap = now.saturating_sub(inner.prev_success_at) as f64;
                inner.latency_factor = 0.95 * inner.latency_factor + 0.05 * gap;
            }
            inner.prev_success_at = if inner.active_count > 0 { now } else { 0 };
            inner.last_success_at = now;

            self.update_warmup(&mut inner, now);

            while let Some(oldest) = inner.idle.front() {
                if oldest.free_at + self.idle_timeout_ms < now {
                    if let Some(slot) = inner.idle.pop_front() {
                        expired.push(slot);
                    }
                } else {
                    break;
                }
            }
        }

        if !expired.is_empty() {
            debug!(
                "{} closing {} idle connection(s) past idle-timeout",
                self.debug_id,
                expired.len()
            );
        }
        drop(expired);
        drop(rejected);
    }

    /// Destroys a checked-out slot without returning it to the ring.
    pub(crate) fn close_slot(&self, slot: ConnectionSlot) {
        {
            let mut inner = self.inner.lock();
            inner.active_count = inner.active_count.saturating_sub(1);
        }
        debug!(
            "{} close connection #{} after {} use(s)",
            self.debug_id, slot.id, slot.lifetime_uses
        );
        drop(slot);
    }

    // --- Health transitions ---

    fn record_success(&self, inner: &mut PoolInner, now: u64) {
        self.on_success(inner, now);
        inner.dynamic_fail_recover_ms = INITIAL_FAIL_RECOVER_MS.min(self.fail_recover_ms);
    }

    fn on_success(&self, inner: &mut PoolInner, now: u64) {
        if inner.first_success_at == 0 {
            if inner.state.is_starting() {
                let previous = inner.state;
                inner.state = if self.warmup_ms > 0 {
                    PoolState::Warmup
                } else {
                    PoolState::Active
                };
                inner.first_success_at = now;
                if previous != inner.state {
                    info!("{} {} -> {}", self.debug_id, previous, inner.state);
                }
            }
            if inner.warmup_level < 0 {
                inner.warmup_level = 0;
            }
        }
    }

    /// Re-evaluates the ramp step and promotes the pool to `ACTIVE` once warmup ends.
    fn update_warmup(&self, inner: &mut PoolInner, now: u64) {
        if !inner.state.is_enabled() {
            return;
        }
        if inner.warmup_level >= 0 && inner.first_success_at > 0 {
            let mut level =
                warmup::step_for_elapsed(now.saturating_sub(inner.first_success_at), self.warmup_chunk_ms);
            inner.dynamic_fail_recover_ms = INITIAL_FAIL_RECOVER_MS.min(self.fail_recover_ms);

            if level >= WARMUP_MAX {
                level = WARMUP_MAX;
                let previous = inner.state;
                inner.state = inner.state.to_active();
                if previous != inner.state {
                    info!("{} {} -> {}", self.debug_id, previous, inner.state);
                }
            }
            inner.warmup_level = level;
        }
    }

    /// Lowers the warmup level one step below where the ramp currently stands,
    /// at most once per 100ms of failure time.
    fn degrade(&self, inner: &mut PoolInner, time: u64) -> bool {
        if time.saturating_sub(inner.fail_at) < DEGRADE_INTERVAL_MS {
            return false;
        }
        self.update_warmup(inner, time);
        inner.warmup_level = (inner.warmup_level - 1).max(WARMUP_MIN);
        true
    }

    /// Records a failed connect observed at the current time.
    pub fn fail_connect(&self) {
        self.fail_connect_at(now_millis());
    }

    /// Records a failed connect attempt that started at `time`.
    ///
    /// Doubles the dynamic fail-recover window, capped at `fail_recover_time`.
    pub fn fail_connect_at(&self, time: u64) {
        self.stats.increment_fails();

        let mut inner = self.inner.lock();
        if inner.fail_at < time {
            self.degrade(&mut inner, time);
            inner.first_success_at = 0;
            inner.fail_at = time;
            inner.last_fail_at = time;
            inner.last_fail_connect_at = time;
            inner.dynamic_fail_recover_ms =
                (inner.dynamic_fail_recover_ms * 2).min(self.fail_recover_ms);
            self.transition_to_fail(&mut inner, "connect failure");
        }
    }

    /// Records a read/write failure observed at the current time.
    pub fn fail_socket(&self) {
        self.fail_socket_at(now_millis());
    }

    /// Records a read/write failure at `time`. Does not grow the backoff window.
    pub fn fail_socket_at(&self, time: u64) {
        self.stats.increment_fails();

        let mut inner = self.inner.lock();
        if inner.fail_at < time {
            self.degrade(&mut inner, time);
            inner.first_success_at = 0;
            inner.fail_at = time;
            inner.last_fail_at = time;
            self.transition_to_fail(&mut inner, "socket failure");
        }
    }

    fn transition_to_fail(&self, inner: &mut PoolInner, reason: &str) {
        let previous = inner.state;
        inner.state = inner.state.to_fail();
        if previous != inner.state {
            warn!(
                "{} {} -> {} ({}, recover in {}ms, level {})",
                self.debug_id,
                previous,
                inner.state,
                reason,
                inner.dynamic_fail_recover_ms,
                inner.warmup_level
            );
        }
    }

    /// Records an explicit overload signal from the target.
    pub fn busy(&self) {
        self.busy_at(now_millis());
    }

    pub fn busy_at(&self, time: u64) {
        self.stats.increment_busy();

        let mut inner = self.inner.lock();
        // Busy is a backpressure signal, not a failure: step back once, never below zero.
        self.update_warmup(&mut inner, time);
        inner.warmup_level = (inner.warmup_level - 1).max(0);
        inner.last_busy_at = time;
        inner.first_success_at = 0;

        let previous = inner.state;
        inner.state = inner.state.to_busy();
        if previous != inner.state {
            warn!("{} {} -> {}", self.debug_id, previous, inner.state);
        }
    }

    /// Forces the pool into `FAIL` and drops every idle connection.
    pub fn to_fail(&self) {
        let now = now_millis();
        {
            let mut inner = self.inner.lock();
            inner.fail_at = now;
            inner.last_fail_at = now;
            inner.first_success_at = 0;
            self.transition_to_fail(&mut inner, "forced");
        }
        self.stats.increment_fails();
        self.clear_recycle();
    }

    /// Clears the fail state immediately, e.g. after a peer heartbeat.
    pub fn wake(&self) {
        let mut inner = self.inner.lock();
        if inner.state == PoolState::Fail {
            inner.state = PoolState::Starting;
            info!("{} woken: FAIL -> STARTING", self.debug_id);
        }
        inner.fail_at = 0;
    }

    // --- Administrative modes ---

    /// Enables the pool.
    pub fn start(&self) {
        let mut inner = self.inner.lock();
        inner.state = inner.state.to_start();
    }

    /// Moves the pool to `STANDBY`: no further admission.
    pub fn stop(&self) {
        {
            let mut inner = self.inner.lock();
            inner.state = inner.state.to_standby();
            inner.first_success_at = 0;
        }
        info!("{} stopped (standby)", self.debug_id);
        self.clear_recycle();
    }

    /// Only session-affinity requests are admitted from now on.
    pub fn enable_session_only(&self) {
        let mut inner = self.inner.lock();
        inner.state = inner.state.to_session_only();
    }

    /// The target's heartbeat came back: old connections are suspect, the target is not.
    pub fn notify_heartbeat_start(&self) {
        self.clear_recycle();
        self.wake();
    }

    /// The target's heartbeat was lost.
    pub fn notify_heartbeat_stop(&self) {
        self.clear_recycle();
        self.to_fail();
    }

    /// Closes every idle connection.
    pub fn clear_recycle(&self) {
        let drained: Vec<ConnectionSlot> = self.inner.lock().idle.drain(..).collect();
        if !drained.is_empty() {
            debug!(
                "{} cleared {} idle connection(s)",
                self.debug_id,
                drained.len()
            );
        }
    }

    /// Drains and closes the idle ring and refuses all further admission. Idempotent.
    pub fn close(&self) {
        let drained: Vec<ConnectionSlot> = {
            let mut inner = self.inner.lock();
            if inner.state.is_closed() {
                return;
            }
            inner.state = PoolState::Closed;
            inner.idle.drain(..).collect()
        };
        info!(
            "{} closed ({} idle connection(s) dropped)",
            self.debug_id,
            drained.len()
        );
    }

    /// Wakes the pool and probes the target with a ping.
    pub async fn can_connect(self: &Arc<Self>) -> bool {
        self.wake();

        let Some(mut conn) = self.acquire(AcquireMode::ForceLoadBalance).await else {
            return false;
        };
        match conn.call(RequestBody::Ping).await {
            Ok(ResponseBody::Pong) => {
                conn.release();
                true
            }
            Ok(other) => {
                debug!("{} unexpected ping reply: {:?}", self.debug_id, other);
                conn.release();
                false
            }
            Err(e) => {
                debug!("{} ping failed: {}", self.debug_id, e);
                false
            }
        }
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("id", &self.debug_id)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionPool[{},{}]", self.debug_id, self.address)
    }
}

/// Counts one connection attempt as `starting` until it resolves. Dropping an
/// armed reservation (failure or cancellation) releases the count.
struct StartingReservation<'a> {
    pool: &'a ConnectionPool,
    armed: bool,
}

impl Drop for StartingReservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.pool.inner.lock();
            inner.starting_count = inner.starting_count.saturating_sub(1);
        }
    }
}
