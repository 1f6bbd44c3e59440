//! `resources_inc` sink
//!
//! Each delivery runs in one transaction: a multi-row upsert of every entry
//! followed by the cascade plans of the bundle's cancellations.

use super::client::PostgreSQLClient;
use crate::adapters::sink::traits::{
    encounter_reference_path, DeliveryStats, IntegrityCount, ResourceSink, INTEGRITY_CATEGORIES,
    SUBJECT_PATH,
};
use crate::core::bundle::Bundle;
use crate::core::cascade::{CascadeReconciler, CascadeStep, UNKNOWN_REFERENCE};
use crate::core::sync::stats::{ReadBackCategory, ReadBackCounts, SubtypeFilter};
use crate::domain::{MappedResource, Result, SyncError};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::sync::Arc;
use tokio_postgres::types::ToSql;

/// Rows per INSERT statement; three parameters each
const UPSERT_BATCH_SIZE: usize = 500;

type Param<'a> = &'a (dyn ToSql + Sync);

pub struct PostgresSink {
    client: Arc<PostgreSQLClient>,
    table: String,
}

impl PostgresSink {
    /// `table` must come from validated configuration; it is interpolated
    /// into every statement
    pub fn new(client: Arc<PostgreSQLClient>, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    pub fn client(&self) -> &Arc<PostgreSQLClient> {
        &self.client
    }

    fn upsert_statement(&self, rows: usize) -> String {
        let values = (0..rows)
            .map(|i| format!("(${}, ${}, ${}, FALSE)", i * 3 + 1, i * 3 + 2, i * 3 + 3))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} (fhir_id, type, data, is_deleted) VALUES {} \
             ON CONFLICT (fhir_id, type) DO UPDATE \
             SET data = EXCLUDED.data, last_updated_at = NOW(), is_deleted = FALSE",
            self.table, values
        )
    }

    async fn upsert_batch(
        &self,
        tx: &deadpool_postgres::Transaction<'_>,
        batch: &[&MappedResource],
    ) -> Result<u64> {
        let rows: Vec<(&str, &str, &serde_json::Value)> = batch
            .iter()
            .map(|r| (r.id().as_str(), r.resource_type().as_str(), r.body()))
            .collect();

        let mut params: Vec<Param<'_>> = Vec::with_capacity(rows.len() * 3);
        for (id, resource_type, data) in &rows {
            params.push(id);
            params.push(resource_type);
            params.push(data);
        }

        tx.execute(&self.upsert_statement(rows.len()), &params)
            .await
            .map_err(|e| SyncError::Database(format!("Upsert failed: {}", e)))
    }

    async fn apply_step(
        &self,
        tx: &deadpool_postgres::Transaction<'_>,
        step: &CascadeStep,
    ) -> Result<u64> {
        let table = &self.table;
        let unknown = UNKNOWN_REFERENCE;

        let affected = match step {
            CascadeStep::SoftDelete { key } => tx
                .execute(
                    &format!(
                        "UPDATE {table} SET is_deleted = TRUE, last_updated_at = NOW() \
                         WHERE fhir_id = $1 AND type = $2"
                    ),
                    &[&key.id.as_str(), &key.resource_type.as_str()],
                )
                .await,
            CascadeStep::SoftDeleteReferencing {
                child,
                path,
                reference,
            } => {
                let path = owned_path(path);
                tx.execute(
                    &format!(
                        "UPDATE {table} SET is_deleted = TRUE, last_updated_at = NOW() \
                         WHERE type = $1 AND data #>> $2::text[] = $3"
                    ),
                    &[&child.as_str(), &path, reference],
                )
                .await
            }
            CascadeStep::NullifyReference {
                child,
                path,
                reference,
            } => {
                let path = owned_path(path);
                tx.execute(
                    &format!(
                        "UPDATE {table} \
                         SET data = jsonb_set(data, $2::text[], to_jsonb($4::text), false), \
                             last_updated_at = NOW() \
                         WHERE type = $1 AND data #>> $2::text[] = $3"
                    ),
                    &[&child.as_str(), &path, reference, &unknown],
                )
                .await
            }
            CascadeStep::NullifyArrayEntry {
                child,
                array,
                element_path,
                reference,
            } => {
                return self
                    .nullify_array_entries(tx, child.as_str(), array, element_path, reference)
                    .await;
            }
        };

        affected.map_err(|e| SyncError::Database(format!("Cascade step failed: {}", e)))
    }

    /// Locates matching array elements first, then rewrites each one by
    /// index so sibling elements are left alone
    async fn nullify_array_entries(
        &self,
        tx: &deadpool_postgres::Transaction<'_>,
        child: &str,
        array: &str,
        element_path: &[&str],
        reference: &str,
    ) -> Result<u64> {
        let table = &self.table;
        let element_path = owned_path(element_path);

        let matches = tx
            .query(
                &format!(
                    "SELECT r.fhir_id, (e.idx - 1)::text AS idx \
                     FROM {table} r \
                     CROSS JOIN LATERAL jsonb_array_elements( \
                         CASE WHEN jsonb_typeof(r.data -> $2::text) = 'array' \
                              THEN r.data -> $2::text ELSE '[]'::jsonb END \
                     ) WITH ORDINALITY AS e(elem, idx) \
                     WHERE r.type = $1 AND e.elem #>> $3::text[] = $4 \
                     FOR UPDATE OF r"
                ),
                &[&child, &array, &element_path, &reference],
            )
            .await
            .map_err(|e| SyncError::Database(format!("Array entry lookup failed: {}", e)))?;

        let mut affected = 0;
        for row in matches {
            let fhir_id: String = row.get("fhir_id");
            let index: String = row.get("idx");

            let mut path = vec![array.to_string(), index];
            path.extend(element_path.iter().cloned());

            affected += tx
                .execute(
                    &format!(
                        "UPDATE {table} \
                         SET data = jsonb_set(data, $3::text[], to_jsonb($4::text), false), \
                             last_updated_at = NOW() \
                         WHERE fhir_id = $1 AND type = $2"
                    ),
                    &[&fhir_id, &child, &path, &UNKNOWN_REFERENCE],
                )
                .await
                .map_err(|e| SyncError::Database(format!("Array entry update failed: {}", e)))?;
        }
        Ok(affected)
    }
}

fn owned_path(path: &[&str]) -> Vec<String> {
    path.iter().map(|s| s.to_string()).collect()
}

/// `AND ...` clause for a subtype filter on `column`, numbered from `next`
fn filter_clause(
    filter: Option<SubtypeFilter>,
    column: &str,
    next: usize,
) -> (String, Vec<String>, Option<&'static str>) {
    match filter {
        None => (String::new(), Vec::new(), None),
        Some(SubtypeFilter::Equals { path, value }) => (
            format!(" AND {column} #>> ${}::text[] = ${}", next, next + 1),
            owned_path(path),
            Some(value),
        ),
        Some(SubtypeFilter::Present { path }) => (
            format!(" AND {column} #>> ${}::text[] IS NOT NULL", next),
            owned_path(path),
            None,
        ),
    }
}

#[async_trait]
impl ResourceSink for PostgresSink {
    fn name(&self) -> &'static str {
        "psql"
    }

    async fn test_connection(&self) -> Result<()> {
        self.client.test_connection().await
    }

    async fn read_back_marker(&self) -> Result<NaiveDateTime> {
        let rows = self.client.query("SELECT LOCALTIMESTAMP", &[]).await?;
        rows.first()
            .map(|row| row.get::<_, NaiveDateTime>(0))
            .ok_or_else(|| SyncError::Database("LOCALTIMESTAMP returned no row".to_string()))
    }

    async fn deliver(&self, bundle: &Bundle, dry_run: bool) -> Result<DeliveryStats> {
        let plans = CascadeReconciler::new().plan_bundle(bundle);

        if dry_run {
            tracing::info!(
                table = %self.table,
                entries = bundle.len(),
                cancellations = plans.len(),
                "DRY RUN: Would deliver {} resources and {} cancellations to PostgreSQL",
                bundle.len(),
                plans.len()
            );
            return Ok(DeliveryStats::dry_run(bundle));
        }

        let mut conn = self.client.get_connection().await?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| SyncError::Database(format!("Failed to begin transaction: {}", e)))?;

        let mut affected = 0;

        if !bundle.is_empty() {
            tracing::info!(entries = bundle.len(), "Send FHIR resources to FHIR DB for upsert ...");
        }
        let entries: Vec<&MappedResource> = bundle.entries().collect();
        for batch in entries.chunks(UPSERT_BATCH_SIZE) {
            affected += self.upsert_batch(&tx, batch).await?;
        }

        if !plans.is_empty() {
            tracing::info!(cancellations = plans.len(), "Send request to FHIR DB for deletion ...");
        }
        for plan in &plans {
            for step in &plan.steps {
                let rows = self.apply_step(&tx, step).await?;
                tracing::trace!(trigger = %plan.trigger, rows, "Cascade step applied");
                affected += rows;
            }
        }

        tx.commit()
            .await
            .map_err(|e| SyncError::Database(format!("Failed to commit delivery: {}", e)))?;

        Ok(DeliveryStats {
            entries_sent: bundle.len(),
            cancellations_applied: plans.len(),
            rows_affected: affected,
            dry_run: false,
        })
    }

    async fn read_back(
        &self,
        category: ReadBackCategory,
        since: NaiveDateTime,
    ) -> Result<Option<ReadBackCounts>> {
        let resource_type = category.resource_type().as_str();
        let (clause, path, value) = filter_clause(category.subtype_filter(), "data", 3);
        let sql = format!(
            "SELECT COUNT(*) FILTER (WHERE NOT is_deleted) AS upserted, \
                    COUNT(*) FILTER (WHERE is_deleted) AS removed \
             FROM {} \
             WHERE GREATEST(created_at, last_updated_at) >= $1 AND type = $2{}",
            self.table, clause
        );

        let mut params: Vec<Param<'_>> = vec![&since, &resource_type];
        if !clause.is_empty() {
            params.push(&path);
        }
        if let Some(ref value) = value {
            params.push(value);
        }

        let rows = self.client.query(&sql, &params).await?;
        let row = rows
            .first()
            .ok_or_else(|| SyncError::Database("Read-back returned no row".to_string()))?;

        Ok(Some(ReadBackCounts {
            upserted: row.get::<_, i64>("upserted") as u64,
            removed: row.get::<_, i64>("removed") as u64,
        }))
    }

    async fn integrity_counts(&self) -> Result<Option<Vec<IntegrityCount>>> {
        let mut counts = Vec::with_capacity(INTEGRITY_CATEGORIES.len());
        for category in INTEGRITY_CATEGORIES {
            let patients = self
                .distinct_live_targets(category, SUBJECT_PATH, "Patient")
                .await?;
            let encounters = match encounter_reference_path(category) {
                Some(path) => Some(
                    self.distinct_live_targets(category, path, "Encounter")
                        .await?,
                ),
                None => None,
            };
            counts.push(IntegrityCount {
                category,
                patients,
                encounters,
            });
        }
        Ok(Some(counts))
    }
}

impl PostgresSink {
    /// Distinct live `target_type` rows referenced at `path` by live rows of
    /// `category`
    async fn distinct_live_targets(
        &self,
        category: ReadBackCategory,
        path: &[&str],
        target_type: &str,
    ) -> Result<u64> {
        let resource_type = category.resource_type().as_str();
        let reference_path = owned_path(path);
        let (clause, filter_path, value) = filter_clause(category.subtype_filter(), "r.data", 4);
        let sql = format!(
            "SELECT COUNT(DISTINCT t.fhir_id) AS n \
             FROM {table} r \
             JOIN {table} t ON r.data #>> $2::text[] = concat($3::text, '/', t.fhir_id) \
             WHERE r.type = $1 AND t.type = $3 \
               AND NOT r.is_deleted AND NOT t.is_deleted{clause}",
            table = self.table,
            clause = clause
        );

        let mut params: Vec<Param<'_>> = vec![&resource_type, &reference_path, &target_type];
        if !clause.is_empty() {
            params.push(&filter_path);
        }
        if let Some(ref value) = value {
            params.push(value);
        }

        let rows = self.client.query(&sql, &params).await?;
        Ok(rows
            .first()
            .map(|row| row.get::<_, i64>("n") as u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResourceType;

    #[test]
    fn test_filter_clause_equals() {
        let (clause, path, value) =
            filter_clause(ReadBackCategory::Ventilation.subtype_filter(), "data", 3);
        assert_eq!(clause, " AND data #>> $3::text[] = $4");
        assert_eq!(path, vec!["code", "coding", "0", "code"]);
        assert_eq!(value, Some("74201-5"));
    }

    #[test]
    fn test_filter_clause_present_and_none() {
        let (clause, _, value) =
            filter_clause(ReadBackCategory::SubEncounter.subtype_filter(), "r.data", 4);
        assert_eq!(clause, " AND r.data #>> $4::text[] IS NOT NULL");
        assert_eq!(value, None);

        let (clause, path, _) = filter_clause(
            ReadBackCategory::Resource(ResourceType::Patient).subtype_filter(),
            "data",
            3,
        );
        assert!(clause.is_empty());
        assert!(path.is_empty());
    }
}
