//! Compiled query cache
//!
//! Dashboards re-issue the same query on every refresh. Compilation is pure, so
//! the result is memoized under a fingerprint of everything that shapes it.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use sha2::{Digest, Sha256};

use super::{CompiledQuery, DeclarativeQuery, QueryCompiler};
use crate::error::QueryError;
use crate::scope::ProjectScope;
use crate::views::SchemaVersion;

pub struct CompiledQueryCache {
    cache: Cache<String, Arc<CompiledQuery>>,
}

impl CompiledQueryCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .initial_capacity((max_entries as usize / 4).min(1_000))
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    /// Return the cached compilation or compile and remember it. Failures are
    /// not cached.
    pub fn get_or_compile(
        &self,
        compiler: &QueryCompiler,
        query: &DeclarativeQuery,
        scope: &ProjectScope,
        version: SchemaVersion,
        split: bool,
    ) -> Result<Arc<CompiledQuery>, QueryError> {
        let key = fingerprint(compiler, query, scope, version, split);
        if let Some(hit) = self.cache.get(&key) {
            tracing::trace!(key = %key, "compiled query cache hit");
            return Ok(hit);
        }
        let compiled = Arc::new(compiler.build(query, scope, version, split)?);
        self.cache.insert(key, Arc::clone(&compiled));
        Ok(compiled)
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

fn fingerprint(
    compiler: &QueryCompiler,
    query: &DeclarativeQuery,
    scope: &ProjectScope,
    version: SchemaVersion,
    split: bool,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(compiler.backend().name().as_bytes());
    hasher.update([0]);
    hasher.update(version.as_str().as_bytes());
    hasher.update([0, u8::from(split), 0]);
    hasher.update(compiler.options().max_filters.to_le_bytes());
    hasher.update([0]);
    hasher.update(scope.project_id.as_bytes());
    hasher.update([0]);
    // Serialization of the IR cannot fail; an empty body only costs a miss
    hasher.update(serde_json::to_vec(query).unwrap_or_default());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompilerOptions;
    use crate::filters::{Filter, NullOp};
    use crate::sql::Backend;
    use crate::views::{Aggregation, ViewRegistry};
    use chrono::{TimeZone, Utc};

    fn compiler() -> QueryCompiler {
        QueryCompiler::new(Arc::new(ViewRegistry::builtin()), Backend::Clickhouse)
    }

    fn query() -> DeclarativeQuery {
        DeclarativeQuery::new(
            "traces",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        )
        .dimension("name")
        .metric("count", Aggregation::Count)
    }

    #[test]
    fn test_hit_returns_same_compilation() {
        let cache = CompiledQueryCache::new(100, Duration::from_secs(60));
        let compiler = compiler();
        let scope = ProjectScope::new("p1");
        let a = cache
            .get_or_compile(&compiler, &query(), &scope, SchemaVersion::V1, false)
            .unwrap();
        let b = cache
            .get_or_compile(&compiler, &query(), &scope, SchemaVersion::V1, false)
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn test_project_and_version_are_part_of_key() {
        let cache = CompiledQueryCache::new(100, Duration::from_secs(60));
        let compiler = compiler();
        let a = cache
            .get_or_compile(&compiler, &query(), &ProjectScope::new("p1"), SchemaVersion::V1, false)
            .unwrap();
        let b = cache
            .get_or_compile(&compiler, &query(), &ProjectScope::new("p2"), SchemaVersion::V1, false)
            .unwrap();
        let c = cache
            .get_or_compile(&compiler, &query(), &ProjectScope::new("p1"), SchemaVersion::V2, false)
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(b.params["projectId"], crate::sql::ParamValue::from("p2"));
        assert_eq!(c.version, SchemaVersion::V2);
        assert_eq!(cache.entry_count(), 3);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = CompiledQueryCache::new(100, Duration::from_secs(60));
        let q = query().dimension("bogus");
        let result =
            cache.get_or_compile(&compiler(), &q, &ProjectScope::new("p1"), SchemaVersion::V1, false);
        assert!(result.is_err());
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn test_compiler_options_are_part_of_key() {
        let cache = CompiledQueryCache::new(100, Duration::from_secs(60));
        let lenient = compiler();
        let strict = compiler().with_options(CompilerOptions { max_filters: 1 });
        let null = |column: &str| Filter::Null {
            column: column.into(),
            operator: NullOp::IsNull,
        };
        let q = query().filter(null("sessionId")).filter(null("userId"));
        let scope = ProjectScope::new("p1");

        assert!(
            cache
                .get_or_compile(&lenient, &q, &scope, SchemaVersion::V1, false)
                .is_ok()
        );
        let err = cache
            .get_or_compile(&strict, &q, &scope, SchemaVersion::V1, false)
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilter { .. }));
        assert_eq!(cache.entry_count(), 1);
    }
}
