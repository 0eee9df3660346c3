//! Per clause coverage proofs.
//!
//! Every planner step that uses a clause records how well the index answers it. Folding
//! the ledger over the input query gives the residual query: a clause is dropped only if
//! every proof recorded for it is exact, narrowed if a proof narrows it, and kept as is
//! otherwise. Clauses without proofs are always kept.

use crate::query::{Query, QueryParam};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "coverage", content = "detail", rename_all = "snake_case")]
pub enum Coverage {
    /// The index returns exactly the matching variants
    Exact,
    /// Part of the clause is answered exactly, the remaining value still applies
    Narrowed(String),
    /// The index returns a superset, the clause is re-applied
    Superset(&'static str),
}

#[derive(Debug, Clone, Default)]
pub struct CoverageLedger {
    proofs: Vec<(QueryParam, Coverage)>,
}

impl CoverageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, param: QueryParam, coverage: Coverage) {
        tracing::debug!(param = %param, ?coverage, "clause coverage");
        self.proofs.push((param, coverage));
    }

    pub fn exact(&mut self, param: QueryParam) {
        self.record(param, Coverage::Exact);
    }

    pub fn superset(&mut self, param: QueryParam, reason: &'static str) {
        self.record(param, Coverage::Superset(reason));
    }

    pub fn narrowed(&mut self, param: QueryParam, remaining: String) {
        self.record(param, Coverage::Narrowed(remaining));
    }

    /// Combined coverage of a clause, `None` when nothing was recorded for it
    pub fn coverage(&self, param: QueryParam) -> Option<Coverage> {
        let mut proofs = self
            .proofs
            .iter()
            .filter(|(p, _)| *p == param)
            .map(|(_, c)| c)
            .peekable();
        proofs.peek()?;

        let mut narrowed = None;
        for proof in proofs {
            match proof {
                Coverage::Superset(reason) => return Some(Coverage::Superset(*reason)),
                Coverage::Narrowed(value) if narrowed.is_none() => narrowed = Some(value.clone()),
                _ => {}
            }
        }
        Some(narrowed.map(Coverage::Narrowed).unwrap_or(Coverage::Exact))
    }

    pub fn summary(&self) -> BTreeMap<QueryParam, Coverage> {
        let mut params: Vec<QueryParam> = self.proofs.iter().map(|(p, _)| *p).collect();
        params.dedup();
        params
            .into_iter()
            .filter_map(|p| self.coverage(p).map(|c| (p, c)))
            .collect()
    }

    /// Residual query: the input without exactly covered clauses
    pub fn fold(&self, query: &Query) -> Query {
        query
            .iter()
            .filter_map(|(param, value)| match self.coverage(param) {
                Some(Coverage::Exact) => None,
                Some(Coverage::Narrowed(remaining)) => Some((param, remaining)),
                Some(Coverage::Superset(_)) | None => Some((param, value.to_string())),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> Query {
        Query::new()
            .with(QueryParam::Genotype, "s1:0/1")
            .with(QueryParam::Type, "SNV")
            .with(QueryParam::Qual, ">30")
            .with(QueryParam::PopulationAltFrequency, "a:ALL<0.01;b:ALL<0.002")
    }

    #[test]
    fn test_exact_clause_is_dropped() {
        let mut ledger = CoverageLedger::new();
        ledger.exact(QueryParam::Genotype);
        let residual = ledger.fold(&query());
        assert!(!residual.contains(QueryParam::Genotype));
        assert_eq!(residual.get(QueryParam::Qual), Some(">30"));
    }

    #[test]
    fn test_any_superset_keeps_clause() {
        let mut ledger = CoverageLedger::new();
        ledger.exact(QueryParam::Type);
        ledger.superset(QueryParam::Type, "SNP only");
        ledger.exact(QueryParam::Type);
        assert_eq!(ledger.coverage(QueryParam::Type), Some(Coverage::Superset("SNP only")));
        assert_eq!(ledger.fold(&query()).get(QueryParam::Type), Some("SNV"));
    }

    #[test]
    fn test_narrowed_clause() {
        let mut ledger = CoverageLedger::new();
        ledger.narrowed(QueryParam::PopulationAltFrequency, "b:ALL<0.002".to_string());
        let residual = ledger.fold(&query());
        assert_eq!(
            residual.get(QueryParam::PopulationAltFrequency),
            Some("b:ALL<0.002")
        );
    }

    #[test]
    fn test_unrecorded_clause_is_kept() {
        let ledger = CoverageLedger::new();
        assert_eq!(ledger.coverage(QueryParam::Qual), None);
        assert_eq!(ledger.fold(&query()), query());
    }

    #[test]
    fn test_summary() {
        let mut ledger = CoverageLedger::new();
        ledger.exact(QueryParam::Region);
        ledger.superset(QueryParam::Qual, "QUAL bucket");
        ledger.exact(QueryParam::Region);
        let summary = ledger.summary();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[&QueryParam::Region], Coverage::Exact);
    }
}
