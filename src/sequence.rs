//! Grouping of table rows into `use_next` chains.

use crate::error::{EngineError, EngineResult};
use crate::model::{Sequence, TestNumber};
use crate::table::{dangling_links, TestTable};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Partition the table into chains of test numbers.
///
/// Every row not yet placed starts a new chain (in table order) that
/// follows `use_next` until the link is empty, dangling or points at a row
/// already placed in some chain. Each test number ends up in exactly one
/// chain.
pub fn group_sequences(table: &TestTable) -> Vec<Vec<TestNumber>> {
    for (target, sources) in duplicate_targets(table) {
        warn!(
            "test {} is the use_next target of {} rows ({}); it only runs in the first sequence that reaches it",
            target,
            sources.len(),
            sources
                .iter()
                .map(TestNumber::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    for (source, target) in dangling_links(table) {
        warn!(
            "test {} links to unknown test {}; treating it as the end of its sequence",
            source, target
        );
    }

    let mut sequences = Vec::new();
    let mut visited: HashSet<&TestNumber> = HashSet::new();

    for record in table.records() {
        if visited.contains(&record.test_number) {
            continue;
        }

        let mut sequence = Vec::new();
        let mut current = Some(&record.test_number);

        while let Some(id) = current {
            if !visited.insert(id) {
                debug!("use_next chain stops at already placed test {}", id);
                break;
            }
            sequence.push(id.clone());
            current = table
                .get(id)
                .and_then(|r| r.use_next.as_ref())
                .filter(|next| table.get(next).is_some());
        }

        sequences.push(sequence);
    }

    debug!(
        "grouped {} rows into {} sequences",
        table.len(),
        sequences.len()
    );
    sequences
}

/// Test numbers targeted by more than one `use_next` link, with the rows
/// pointing at them in table order.
pub fn duplicate_targets(table: &TestTable) -> Vec<(TestNumber, Vec<TestNumber>)> {
    let mut sources: HashMap<&TestNumber, Vec<TestNumber>> = HashMap::new();
    let mut order = Vec::new();

    for record in table.records() {
        if let Some(next) = &record.use_next {
            let entry = sources.entry(next).or_default();
            if entry.is_empty() {
                order.push(next);
            }
            entry.push(record.test_number.clone());
        }
    }

    order
        .into_iter()
        .filter_map(|target| {
            let rows = sources.remove(target)?;
            (rows.len() > 1).then(|| (target.clone(), rows))
        })
        .collect()
}

/// Look up the records of each chain, dropping skip-flagged rows.
///
/// A test number missing from the table aborts with
/// [`EngineError::MissingStep`] before anything runs.
pub fn resolve_sequences(
    table: &TestTable,
    groups: &[Vec<TestNumber>],
) -> EngineResult<Vec<Sequence>> {
    groups
        .iter()
        .map(|ids| {
            let mut steps = Vec::with_capacity(ids.len());
            let mut skipped = Vec::new();
            for id in ids {
                let record = table
                    .get(id)
                    .ok_or_else(|| EngineError::MissingStep(id.to_string()))?;
                if record.skip_flag {
                    debug!("step {} skipped due to skip flag", id);
                    skipped.push(id.clone());
                } else {
                    steps.push(record.clone());
                }
            }
            Ok(Sequence { steps, skipped })
        })
        .collect()
}
