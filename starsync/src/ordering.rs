//! Dependency ordering of table processing.
//!
//! Orders tables so that every table merges strictly after the tables it
//! depends on: dimensions before the facts that reference them, and
//! validation-only dependencies (DimTrack after DimArtist) alike. The order is
//! staged — tables in the same stage have no dependency edge between them and
//! may be processed in parallel, while stage boundaries act as barriers.

use std::collections::{HashMap, HashSet};

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::plan::TablePlan;

/// Computes the staged processing order for a set of resolved table plans.
///
/// Returns stages of indices into `plans`. Ties among independent tables are
/// broken by configuration order, so the output is deterministic for a given
/// configuration. Fails fast when a plan depends on a table missing from the
/// set, or when the declared graph contains a cycle — both are configuration
/// errors that must abort the cycle before any table is touched.
pub fn stage_tables(plans: &[TablePlan]) -> SyncResult<Vec<Vec<usize>>> {
    let index_by_name: HashMap<_, _> = plans
        .iter()
        .enumerate()
        .map(|(idx, plan)| (plan.table.clone(), idx))
        .collect();

    // Resolve dependency names to indices, failing on dangling edges.
    let mut dependencies: Vec<Vec<usize>> = Vec::with_capacity(plans.len());
    for plan in plans {
        let mut resolved = Vec::with_capacity(plan.dependencies.len());
        for dependency in &plan.dependencies {
            let Some(&dep_idx) = index_by_name.get(dependency) else {
                bail!(
                    ErrorKind::MissingDependencyTable,
                    "Dependency table is not configured",
                    format!(
                        "Table `{}` depends on `{}`, which is not part of the configured table set",
                        plan.table, dependency
                    )
                );
            };
            resolved.push(dep_idx);
        }
        dependencies.push(resolved);
    }

    // Kahn's algorithm by levels, emitting each stage in configuration order.
    let mut emitted: HashSet<usize> = HashSet::with_capacity(plans.len());
    let mut stages: Vec<Vec<usize>> = Vec::new();

    while emitted.len() < plans.len() {
        let stage: Vec<usize> = (0..plans.len())
            .filter(|idx| !emitted.contains(idx))
            .filter(|&idx| dependencies[idx].iter().all(|dep| emitted.contains(dep)))
            .collect();

        if stage.is_empty() {
            let stuck = (0..plans.len())
                .filter(|idx| !emitted.contains(idx))
                .map(|idx| plans[idx].table.to_string())
                .collect::<Vec<_>>()
                .join(", ");

            bail!(
                ErrorKind::ConfigError,
                "Dependency graph contains a cycle",
                format!("No valid processing order exists for: {stuck}")
            );
        }

        emitted.extend(stage.iter().copied());
        stages.push(stage);
    }

    Ok(stages)
}

#[cfg(test)]
mod tests {
    use starsync_config::shared::{TableConfig, TableReference};

    use super::*;

    fn table(name: &str, references: &[&str], depends_on: &[&str]) -> TablePlan {
        let config = TableConfig {
            schema: "analytics".to_string(),
            table: name.to_string(),
            columns: vec!["id".to_string(), "ref_id".to_string(), "updated_at".to_string()],
            cdc_column: "updated_at".to_string(),
            primary_key: vec!["id".to_string()],
            references: references
                .iter()
                .map(|target| TableReference {
                    column: "ref_id".to_string(),
                    table: format!("analytics.{target}"),
                })
                .collect(),
            depends_on: depends_on
                .iter()
                .map(|target| format!("analytics.{target}"))
                .collect(),
            from_date: None,
            initial_load: false,
        };

        TablePlan::resolve(&config).unwrap()
    }

    #[test]
    fn dimensions_stage_before_the_fact() {
        let plans = vec![
            table("dim_user", &[], &[]),
            table("dim_artist", &[], &[]),
            table("dim_track", &[], &["dim_artist"]),
            table("dim_date", &[], &[]),
            table("fact_stream", &["dim_user", "dim_track", "dim_date"], &[]),
        ];

        let stages = stage_tables(&plans).unwrap();

        assert_eq!(stages, vec![vec![0, 1, 3], vec![2], vec![4]]);
    }

    #[test]
    fn independent_tables_keep_configuration_order() {
        let plans = vec![
            table("dim_date", &[], &[]),
            table("dim_user", &[], &[]),
            table("dim_artist", &[], &[]),
        ];

        let stages = stage_tables(&plans).unwrap();

        assert_eq!(stages, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn missing_dependency_fails_fast() {
        let plans = vec![table("dim_track", &[], &["dim_artist"])];

        let err = stage_tables(&plans).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingDependencyTable);
    }

    #[test]
    fn cycles_are_rejected() {
        let plans = vec![
            table("a", &[], &["b"]),
            table("b", &[], &["a"]),
        ];

        let err = stage_tables(&plans).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }
}
