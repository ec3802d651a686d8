use crate::allocator::Allocator;
use crate::error::{RegistryError, Result};
use crate::export::{export_records, ExportFormat};
use crate::lifecycle::{SweepPolicy, SweepReport, Sweeper};
use jiff::Timestamp;
use std::sync::Arc;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;
use waypoint_codegen::CodeGenerator;
use waypoint_core::{
    normalize, validate_url, Clock, DefaultSuspicionFilter, ExpirationPolicy, LinkRecord,
    RecordId, RecordIdGenerator, RecordIdSettings, ShortCode, SuspicionFilter, SystemClock,
    VisitEvent, VisitMeta,
};
use waypoint_limiter::{RateLimitDecision, RateLimitSettings, SlidingWindowLimiter};
use waypoint_store::LinkStore;

/// Identity used for rate limiting when the caller does not supply one.
pub const GLOBAL_IDENTITY: &str = "global";

const MAX_USER_AGENT_LENGTH: usize = 255;

/// Configures a [`Registry`].
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct RegistrySettings {
    #[builder(default)]
    pub sweep: SweepPolicy,
    #[builder(default)]
    pub rate_limit: RateLimitSettings,
    /// Node index for the id generator, `[0, 3]`.
    #[builder(default = 0)]
    pub node: u8,
    /// Zero point for record id timestamps.
    #[builder(default = Timestamp::UNIX_EPOCH)]
    pub id_epoch: Timestamp,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Parameters for creating a short link.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    /// The original URL to be shortened.
    pub url: String,
    /// Optional custom alias (secondary lookup key).
    pub alias: Option<String>,
    pub expiry: ExpirationPolicy,
    /// Optional access gate a visit must present before being counted.
    pub secret: Option<String>,
    /// Mint a fresh code even if a normalized duplicate already exists.
    pub force: bool,
    /// Rate-limit identity; `None` falls back to [`GLOBAL_IDENTITY`].
    pub identity: Option<String>,
}

impl CreateRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            alias: None,
            expiry: ExpirationPolicy::Never,
            secret: None,
            force: false,
            identity: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(LinkRecord),
    /// A record for the same normalized URL already exists; no new code
    /// was minted and no rate-limit slot was consumed.
    DuplicateFound(LinkRecord),
}

impl CreateOutcome {
    pub fn record(&self) -> &LinkRecord {
        match self {
            CreateOutcome::Created(record) | CreateOutcome::DuplicateFound(record) => record,
        }
    }
}

/// Resolution-path outcomes. These are ordinary branches for the caller,
/// not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    /// The link is live; the visit has been recorded.
    Found(LinkRecord),
    NotFound,
    /// The link exists but its expiry has passed (it may still be within
    /// the sweeper's grace period).
    Expired,
    /// The link is gated and the supplied secret did not match.
    SecretRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Newest first.
    CreatedAt,
    /// Most visited first.
    VisitCount,
    /// Lexicographic by code.
    Code,
}

/// The registry service: the single entry point the presentation layer
/// talks to.
///
/// Wires the store, the allocator, the rate limiter and the lifecycle
/// sweeper together; owns no global state, so independent instances are
/// fully isolated (which is also what makes the tests hermetic).
pub struct Registry<S, G, C: Clock = SystemClock> {
    store: Arc<S>,
    allocator: Allocator<S, G>,
    sweeper: Sweeper<S, C>,
    limiter: SlidingWindowLimiter<C>,
    ids: RecordIdGenerator<C>,
    clock: C,
    filter: Box<dyn SuspicionFilter>,
}

impl<S: LinkStore, G: CodeGenerator> Registry<S, G, SystemClock> {
    /// Creates a registry with default settings on the system clock.
    pub fn new(store: S, generator: G) -> Self {
        Self::with_clock(store, generator, SystemClock, RegistrySettings::default())
    }
}

impl<S: LinkStore, G: CodeGenerator, C: Clock + Clone + 'static> Registry<S, G, C> {
    /// Creates a registry with explicit clock and settings.
    ///
    /// # Panics
    ///
    /// Panics if `settings.id_epoch` lies ahead of the clock; the default
    /// epoch (unix zero) never does.
    pub fn with_clock(store: S, generator: G, clock: C, settings: RegistrySettings) -> Self {
        let store = Arc::new(store);
        let generator = Arc::new(generator);

        let ids = RecordIdGenerator::with_clock(
            RecordIdSettings::builder()
                .node(settings.node)
                .start_epoch(settings.id_epoch)
                .build(),
            clock.clone(),
        )
        .expect("id epoch must not lie ahead of the clock");

        Self {
            allocator: Allocator::new(Arc::clone(&store), generator),
            sweeper: Sweeper::new(Arc::clone(&store), clock.clone(), settings.sweep),
            limiter: SlidingWindowLimiter::with_clock(settings.rate_limit, clock.clone()),
            ids,
            clock,
            filter: Box::new(DefaultSuspicionFilter::default()),
            store,
        }
    }

    /// Replaces the suspicious-URL heuristic. The default keyword list is
    /// best-effort; deployments with their own denylists plug in here.
    pub fn with_suspicion_filter(mut self, filter: impl SuspicionFilter + 'static) -> Self {
        self.filter = Box::new(filter);
        self
    }

    /// Creates a new short link.
    ///
    /// Validates and normalizes the URL, returns the existing record on a
    /// normalized duplicate (unless `force`), then admits the request
    /// through the rate limiter, allocates a code and commits the record.
    /// A capacity failure on commit triggers one sweep-and-retry before
    /// surfacing.
    pub async fn create(&self, request: CreateRequest) -> Result<CreateOutcome> {
        validate_url(&request.url, self.filter.as_ref())?;
        let normalized = normalize(&request.url);

        if !request.force {
            if let Some(existing) = self.store.get_by_normalized_url(&normalized).await? {
                debug!(code = %existing.code, url = %normalized, "duplicate URL, reusing record");
                return Ok(CreateOutcome::DuplicateFound(existing));
            }
        }

        let identity = request.identity.as_deref().unwrap_or(GLOBAL_IDENTITY);
        let decision = self.limiter.admit(identity);
        if !decision.allowed {
            return Err(RegistryError::RateLimited {
                remaining_wait: decision.reset_in,
                next_available_at: decision.next_available_at.unwrap_or_else(|| self.clock.now()),
            });
        }

        // The alias (when requested) is validated and uniqueness-checked
        // up front; the code itself is always generated.
        let alias = match request.alias.as_deref() {
            Some(alias) => Some(self.allocator.allocate(Some(alias)).await?),
            None => None,
        };
        let code = self.allocator.allocate(None).await?;

        let id = self.ids.next_id()?;

        let now = self.clock.now();
        let record = LinkRecord {
            id,
            original_url: request.url,
            normalized_url: normalized,
            code,
            alias,
            created_at: now,
            expires_at: request.expiry.expires_at(now),
            visit_count: 0,
            visit_history: Vec::new(),
            secret: request.secret,
        };

        match self.store.insert(record.clone()).await {
            Ok(()) => {}
            Err(err) if err.is_capacity() => {
                warn!(error = %err, "store at capacity, sweeping and retrying once");
                self.sweeper.sweep().await?;
                self.store.insert(record.clone()).await?;
            }
            Err(err) => return Err(err.into()),
        }

        info!(code = %record.code, id = %record.id, "short link created");
        Ok(CreateOutcome::Created(record))
    }

    /// Resolves a code or alias. A live hit records the visit (with the
    /// supplied metadata) before returning the updated record.
    pub async fn resolve(
        &self,
        key: &str,
        secret: Option<&str>,
        meta: Option<VisitMeta>,
    ) -> Result<ResolveOutcome> {
        let key = ShortCode::new_unchecked(key);
        let Some(record) = self.store.get_by_code(&key).await? else {
            return Ok(ResolveOutcome::NotFound);
        };

        if record.is_expired(self.clock.now()) {
            debug!(code = %record.code, "resolve hit an expired link");
            return Ok(ResolveOutcome::Expired);
        }

        if let Some(expected) = &record.secret {
            if secret != Some(expected.as_str()) {
                return Ok(ResolveOutcome::SecretRequired);
            }
        }

        // The record may be swept between lookup and visit accounting;
        // last-writer-wins through the shared update path keeps this safe.
        let updated = self.record_visit(record.id, meta).await?.unwrap_or(record);
        Ok(ResolveOutcome::Found(updated))
    }

    /// Atomically counts a visit against a record. Metadata is stored
    /// opaquely; only the user agent is truncated here.
    pub async fn record_visit(
        &self,
        id: RecordId,
        meta: Option<VisitMeta>,
    ) -> Result<Option<LinkRecord>> {
        let meta = meta.map(|mut meta| {
            if let Some(ua) = &mut meta.user_agent {
                if ua.chars().count() > MAX_USER_AGENT_LENGTH {
                    *ua = ua.chars().take(MAX_USER_AGENT_LENGTH).collect();
                }
            }
            meta
        });

        let event = VisitEvent {
            at: self.clock.now(),
            meta,
        };
        Ok(self.store.append_visit(id, event).await?)
    }

    /// Deletes a link. Idempotent.
    pub async fn delete(&self, id: RecordId) -> Result<bool> {
        Ok(self.store.delete(id).await?)
    }

    /// Deletes a batch of links, returning how many existed.
    pub async fn delete_many(&self, ids: &[RecordId]) -> Result<u64> {
        Ok(self.store.delete_many(ids).await?)
    }

    pub async fn list_all(&self) -> Result<Vec<LinkRecord>> {
        Ok(self.store.list_all().await?)
    }

    /// Case-insensitive substring filter over URL, code and alias.
    pub async fn search(&self, query: &str) -> Result<Vec<LinkRecord>> {
        let needle = query.to_lowercase();
        let records = self.store.list_all().await?;
        Ok(records
            .into_iter()
            .filter(|record| {
                record.original_url.to_lowercase().contains(&needle)
                    || record.normalized_url.to_lowercase().contains(&needle)
                    || record.code.as_str().to_lowercase().contains(&needle)
                    || record
                        .alias
                        .as_ref()
                        .is_some_and(|alias| alias.as_str().to_lowercase().contains(&needle))
            })
            .collect())
    }

    pub async fn sorted(&self, key: SortKey) -> Result<Vec<LinkRecord>> {
        let mut records = self.store.list_all().await?;
        match key {
            SortKey::CreatedAt => records.sort_by_key(|r| std::cmp::Reverse(r.created_at)),
            SortKey::VisitCount => records.sort_by_key(|r| std::cmp::Reverse(r.visit_count)),
            SortKey::Code => records.sort_by(|a, b| a.code.as_str().cmp(b.code.as_str())),
        }
        Ok(records)
    }

    /// Serializes every record, oldest first.
    pub async fn export(&self, format: ExportFormat) -> Result<Vec<u8>> {
        let mut records = self.store.list_all().await?;
        records.sort_by_key(|r| r.created_at);
        export_records(&records, format)
    }

    /// Runs one lifecycle pass; see [`Sweeper`].
    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweeper.sweep().await
    }

    /// Reports the admission state for an identity without consuming a slot.
    pub fn rate_limit_status(&self, identity: Option<&str>) -> RateLimitDecision {
        self.limiter.check(identity.unwrap_or(GLOBAL_IDENTITY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::SignedDuration;
    use waypoint_codegen::SeqGenerator;
    use waypoint_core::ManualClock;
    use waypoint_store::MemoryStore;

    fn registry_at(
        second: i64,
    ) -> (Registry<MemoryStore, SeqGenerator, ManualClock>, ManualClock) {
        registry_with(MemoryStore::new(), second, RegistrySettings::default())
    }

    fn registry_with(
        store: MemoryStore,
        second: i64,
        settings: RegistrySettings,
    ) -> (Registry<MemoryStore, SeqGenerator, ManualClock>, ManualClock) {
        let clock = ManualClock::at_second(second);
        let registry = Registry::with_clock(store, SeqGenerator::new(), clock.clone(), settings);
        (registry, clock)
    }

    #[tokio::test]
    async fn create_mints_a_seven_symbol_code() {
        let (registry, _) = registry_at(1_000);
        let outcome = registry
            .create(CreateRequest::new("https://example.com/a"))
            .await
            .unwrap();

        let CreateOutcome::Created(record) = outcome else {
            panic!("expected a fresh record");
        };
        assert_eq!(record.code.as_str().len(), 7);
        assert_eq!(record.original_url, "https://example.com/a");
        assert_eq!(record.normalized_url, "https://example.com/a");
        assert_eq!(record.visit_count, 0);
        assert!(record.expires_at.is_none());
    }

    #[tokio::test]
    async fn duplicate_url_returns_the_existing_record() {
        let (registry, _) = registry_at(1_000);
        let first = registry
            .create(CreateRequest::new("https://example.com/a?b=2&a=1"))
            .await
            .unwrap();

        // Same resource modulo query order and case.
        let second = registry
            .create(CreateRequest::new("HTTPS://EXAMPLE.COM/a?a=1&b=2"))
            .await
            .unwrap();

        let CreateOutcome::DuplicateFound(existing) = second else {
            panic!("expected duplicate detection");
        };
        assert_eq!(existing.id, first.record().id);
    }

    #[tokio::test]
    async fn force_mints_a_new_code_for_a_duplicate() {
        let (registry, _) = registry_at(1_000);
        let first = registry
            .create(CreateRequest::new("https://example.com/a"))
            .await
            .unwrap();

        let mut request = CreateRequest::new("https://example.com/a");
        request.force = true;
        let second = registry.create(request).await.unwrap();

        let CreateOutcome::Created(fresh) = second else {
            panic!("expected forced creation");
        };
        assert_ne!(fresh.id, first.record().id);
        assert_ne!(fresh.code, first.record().code);
    }

    #[tokio::test]
    async fn alias_becomes_a_second_lookup_key() {
        let (registry, _) = registry_at(1_000);
        let mut request = CreateRequest::new("https://example.com/a");
        request.alias = Some("my-alias".to_string());
        let record = match registry.create(request).await.unwrap() {
            CreateOutcome::Created(record) => record,
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert_eq!(record.alias.as_ref().unwrap().as_str(), "my-alias");

        let by_alias = registry.resolve("my-alias", None, None).await.unwrap();
        let ResolveOutcome::Found(found) = by_alias else {
            panic!("alias should resolve");
        };
        assert_eq!(found.id, record.id);

        let by_code = registry
            .resolve(record.code.as_str(), None, None)
            .await
            .unwrap();
        assert!(matches!(by_code, ResolveOutcome::Found(_)));
    }

    #[tokio::test]
    async fn taken_alias_is_a_conflict() {
        let (registry, _) = registry_at(1_000);
        let mut request = CreateRequest::new("https://example.com/a");
        request.alias = Some("my-alias".to_string());
        registry.create(request).await.unwrap();

        let mut request = CreateRequest::new("https://example.com/b");
        request.alias = Some("my-alias".to_string());
        let err = registry.create(request).await.unwrap_err();
        assert!(matches!(err, RegistryError::AliasTaken(_)));
    }

    #[tokio::test]
    async fn invalid_inputs_fail_fast() {
        let (registry, _) = registry_at(1_000);

        let err = registry
            .create(CreateRequest::new("javascript:alert(1)"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidUrl(_)));

        let mut request = CreateRequest::new("https://example.com/a");
        request.alias = Some("x".to_string());
        let err = registry.create(request).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidAlias(_)));
    }

    #[tokio::test]
    async fn creation_is_rate_limited() {
        let settings = RegistrySettings::builder()
            .rate_limit(
                RateLimitSettings::builder()
                    .max_requests(2)
                    .window(SignedDuration::from_secs(60))
                    .build(),
            )
            .build();
        let (registry, clock) = registry_with(MemoryStore::new(), 1_000, settings);
        let first_at = clock.now();

        for i in 0..2 {
            registry
                .create(CreateRequest::new(format!("https://example.com/{i}")))
                .await
                .unwrap();
        }

        let err = registry
            .create(CreateRequest::new("https://example.com/blocked"))
            .await
            .unwrap_err();
        let RegistryError::RateLimited {
            next_available_at, ..
        } = err
        else {
            panic!("expected rate limiting");
        };
        assert_eq!(next_available_at, first_at + SignedDuration::from_secs(60));

        // Duplicates keep working while blocked: no slot is consumed.
        let outcome = registry
            .create(CreateRequest::new("https://example.com/0"))
            .await
            .unwrap();
        assert!(matches!(outcome, CreateOutcome::DuplicateFound(_)));

        // Once the first slot exits the window, creation works again.
        clock.advance(SignedDuration::from_secs(60));
        registry
            .create(CreateRequest::new("https://example.com/later"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn resolve_counts_visits_and_honors_expiry() {
        let (registry, clock) = registry_at(1_000);
        let mut request = CreateRequest::new("https://example.com/a");
        request.expiry = ExpirationPolicy::AfterDuration(SignedDuration::from_secs(30));
        let record = match registry.create(request).await.unwrap() {
            CreateOutcome::Created(record) => record,
            other => panic!("unexpected outcome: {other:?}"),
        };

        let outcome = registry
            .resolve(record.code.as_str(), None, None)
            .await
            .unwrap();
        let ResolveOutcome::Found(found) = outcome else {
            panic!("link should be live");
        };
        assert_eq!(found.visit_count, 1);
        assert_eq!(found.visit_history.len(), 1);

        clock.advance(SignedDuration::from_secs(31));
        let outcome = registry
            .resolve(record.code.as_str(), None, None)
            .await
            .unwrap();
        assert_eq!(outcome, ResolveOutcome::Expired);

        // Expired resolves do not count as visits.
        let back = registry.list_all().await.unwrap();
        assert_eq!(back[0].visit_count, 1);
    }

    #[tokio::test]
    async fn secret_gates_the_visit() {
        let (registry, _) = registry_at(1_000);
        let mut request = CreateRequest::new("https://example.com/a");
        request.secret = Some("hunter2".to_string());
        let record = match registry.create(request).await.unwrap() {
            CreateOutcome::Created(record) => record,
            other => panic!("unexpected outcome: {other:?}"),
        };

        let outcome = registry
            .resolve(record.code.as_str(), None, None)
            .await
            .unwrap();
        assert_eq!(outcome, ResolveOutcome::SecretRequired);

        let outcome = registry
            .resolve(record.code.as_str(), Some("wrong"), None)
            .await
            .unwrap();
        assert_eq!(outcome, ResolveOutcome::SecretRequired);

        let outcome = registry
            .resolve(record.code.as_str(), Some("hunter2"), None)
            .await
            .unwrap();
        let ResolveOutcome::Found(found) = outcome else {
            panic!("matching secret should resolve");
        };
        // Gated attempts are not counted.
        assert_eq!(found.visit_count, 1);
    }

    #[tokio::test]
    async fn visit_metadata_is_stored_with_a_truncated_user_agent() {
        let (registry, _) = registry_at(1_000);
        let record = match registry
            .create(CreateRequest::new("https://example.com/a"))
            .await
            .unwrap()
        {
            CreateOutcome::Created(record) => record,
            other => panic!("unexpected outcome: {other:?}"),
        };

        let meta = VisitMeta {
            referrer: Some("https://example.org".to_string()),
            device: Some("mobile".to_string()),
            timezone: Some("UTC".to_string()),
            user_agent: Some("x".repeat(600)),
        };
        let updated = registry
            .record_visit(record.id, Some(meta))
            .await
            .unwrap()
            .unwrap();

        let stored = updated.visit_history[0].meta.as_ref().unwrap();
        assert_eq!(stored.user_agent.as_ref().unwrap().len(), 255);
        assert_eq!(stored.device.as_deref(), Some("mobile"));
    }

    #[tokio::test]
    async fn id_generation_failure_is_an_error_not_a_panic() {
        // A clock beyond the 34-bit seconds horizon exhausts the id space.
        let past_horizon = (1_i64 << 34) + 10;
        let (registry, _) = registry_at(past_horizon);

        let err = registry
            .create(CreateRequest::new("https://example.com/a"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::IdGeneration(_)));
    }

    #[tokio::test]
    async fn capacity_failure_sweeps_and_retries_once() {
        let store = MemoryStore::with_max_records(1);
        let now = Timestamp::from_second(100 * 24 * 3600).unwrap();

        // A record expired 8 days ago occupies the only slot; the sweep
        // triggered by the capacity failure frees it.
        let stale = LinkRecord {
            id: RecordId::from_u64(1),
            original_url: "https://example.com/stale".to_string(),
            normalized_url: "https://example.com/stale".to_string(),
            code: ShortCode::new_unchecked("stale12"),
            alias: None,
            created_at: now - SignedDuration::from_hours(30 * 24),
            expires_at: Some(now - SignedDuration::from_hours(8 * 24)),
            visit_count: 0,
            visit_history: Vec::new(),
            secret: None,
        };
        store.insert(stale).await.unwrap();

        let (registry, _) =
            registry_with(store, now.as_second(), RegistrySettings::default());
        let outcome = registry
            .create(CreateRequest::new("https://example.com/fresh"))
            .await
            .unwrap();
        assert!(matches!(outcome, CreateOutcome::Created(_)));

        let records = registry.list_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].original_url, "https://example.com/fresh");
    }

    #[tokio::test]
    async fn search_and_sort() {
        let (registry, clock) = registry_at(1_000);

        for (i, url) in [
            "https://example.com/rust-lang",
            "https://example.com/python",
            "https://docs.example.org/rust-book",
        ]
        .iter()
        .enumerate()
        {
            clock.advance(SignedDuration::from_secs(1));
            let mut request = CreateRequest::new(*url);
            if i == 0 {
                request.alias = Some("rustlang".to_string());
            }
            registry.create(request).await.unwrap();
        }

        let hits = registry.search("rust").await.unwrap();
        assert_eq!(hits.len(), 2);

        let by_created = registry.sorted(SortKey::CreatedAt).await.unwrap();
        assert_eq!(
            by_created[0].original_url,
            "https://docs.example.org/rust-book"
        );

        let by_code = registry.sorted(SortKey::Code).await.unwrap();
        let codes: Vec<&str> = by_code.iter().map(|r| r.code.as_str()).collect();
        let mut sorted_codes = codes.clone();
        sorted_codes.sort();
        assert_eq!(codes, sorted_codes);
    }

    #[tokio::test]
    async fn search_ignores_case_in_url_paths() {
        let (registry, _) = registry_at(1_000);
        // Normalization lowercases the host but leaves path case alone.
        registry
            .create(CreateRequest::new("https://example.com/RustBook"))
            .await
            .unwrap();

        let hits = registry.search("rustbook").await.unwrap();
        assert_eq!(hits.len(), 1);
        let hits = registry.search("RUSTBOOK").await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn delete_then_resolve_is_not_found() {
        let (registry, _) = registry_at(1_000);
        let record = match registry
            .create(CreateRequest::new("https://example.com/a"))
            .await
            .unwrap()
        {
            CreateOutcome::Created(record) => record,
            other => panic!("unexpected outcome: {other:?}"),
        };

        assert!(registry.delete(record.id).await.unwrap());
        assert!(!registry.delete(record.id).await.unwrap());

        let outcome = registry
            .resolve(record.code.as_str(), None, None)
            .await
            .unwrap();
        assert_eq!(outcome, ResolveOutcome::NotFound);
    }
}
