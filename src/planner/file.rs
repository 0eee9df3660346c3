//! Per sample file byte sub-query: TYPE, FILTER, QUAL and DP.

use super::coverage::CoverageLedger;
use super::model::SampleFileIndexQuery;
use crate::codec::file::{
    self, DP_MASK, FILTER_PASS_MASK, PASS, QUAL_MASK, TYPE_MASK, is_imprecise_type_code,
};
use crate::codec::genotype::is_negated;
use crate::codec::range::{RangeQuery, UNBOUNDED, encode_range};
use crate::codec::EMPTY_MASK;
use crate::query::{Query, QueryParam, parse_keyed_filters, split_operator, split_value};
use crate::schema::IndexSchema;
use crate::types::VariantType;
use crate::{Error, Result};
use std::collections::BTreeSet;
use tracing::debug;

const DEPTH_KEY: &str = "DP";

pub(crate) fn parse_variant_types(value: &str) -> Result<Vec<VariantType>> {
    split_value(value)?
        .1
        .iter()
        .map(|t| t.parse())
        .collect()
}

/// SNP can not be told apart from SNV in the index, nor MNP from MNV
fn has_alias_only_filter(types: &[VariantType]) -> bool {
    (types.contains(&VariantType::Snp) && !types.contains(&VariantType::Snv))
        || (types.contains(&VariantType::Mnp) && !types.contains(&VariantType::Mnv))
}

fn parse_number(param: QueryParam, value: &str) -> Result<f64> {
    value
        .parse()
        .map_err(|_| Error::InvalidQuery(format!("invalid {} value '{}'", param, value)))
}

/// Range query for `op value`, `None` for operators the index can not express and for
/// predicates every code satisfies
fn range_query(op: &str, value: f64, thresholds: &[f64]) -> Option<RangeQuery> {
    encode_range(op, value, thresholds, 0.0, UNBOUNDED)
        .ok()
        .filter(|q| !q.is_always_true())
}

fn depth_query(filters: &[String], thresholds: &[f64]) -> Result<Option<RangeQuery>> {
    let mut dp = None;
    for filter in filters {
        let (key, op, value) = split_operator(filter);
        if key == DEPTH_KEY {
            let value = parse_number(QueryParam::Format, &value)?;
            if let Some(range) = range_query(&op, value, thresholds) {
                dp = Some(range);
            }
        }
    }
    Ok(dp)
}

pub fn parse_file_query(
    query: &Query,
    sample: &str,
    files: &[String],
    schema: &IndexSchema,
    ledger: &mut CoverageLedger,
) -> Result<SampleFileIndexQuery> {
    let mut mask = EMPTY_MASK;
    let mut type_codes = BTreeSet::new();

    if let Some(value) = query.get(QueryParam::Type) {
        let types = parse_variant_types(value)?;
        mask |= TYPE_MASK;
        type_codes.extend(types.iter().map(|t| file::type_code(*t)));

        if type_codes.iter().any(|c| is_imprecise_type_code(*c)) {
            ledger.superset(QueryParam::Type, "variant type shares its code with other types");
        } else if has_alias_only_filter(&types) {
            ledger.superset(QueryParam::Type, "SNP and MNP are indexed as SNV and MNV");
        } else {
            ledger.exact(QueryParam::Type);
        }
    }

    // FILTER, QUAL and DP differ between files of the same sample
    let single_file = files.len() <= 1;
    if !single_file {
        debug!(sample, files = files.len(), "multi file sample, FILTER/QUAL/DP not indexed");
    }

    let mut filter_pass = false;
    if let Some(value) = query.get(QueryParam::Filter) {
        let filters = split_value(value)?.1;
        if single_file {
            match filters.as_slice() {
                [only] if only == PASS => {
                    mask |= FILTER_PASS_MASK;
                    filter_pass = true;
                }
                [only] if only.strip_prefix('!') == Some(PASS) => mask |= FILTER_PASS_MASK,
                [only] if !is_negated(only) => mask |= FILTER_PASS_MASK,
                [_] => {}
                many => {
                    if !many.iter().any(|f| f == PASS) && !many.iter().any(|f| is_negated(f)) {
                        mask |= FILTER_PASS_MASK;
                    }
                }
            }
        }
        ledger.superset(QueryParam::Filter, "FILTER values are re-checked per file");
    }

    let mut qual_query = None;
    if let Some(value) = query.get(QueryParam::Qual) {
        let terms = split_value(value)?.1;
        if let ([term], true) = (terms.as_slice(), single_file) {
            let (_, op, number) = split_operator(term);
            let number = parse_number(QueryParam::Qual, &number)?;
            qual_query = range_query(&op, number, &schema.qual_thresholds);
            if qual_query.is_some() {
                mask |= QUAL_MASK;
            }
        }
        ledger.superset(QueryParam::Qual, "QUAL is re-checked per file");
    }

    let mut dp_query = None;
    if let Some(value) = query.get(QueryParam::Info) {
        if single_file {
            for (file, filters) in parse_keyed_filters(value) {
                if file.is_empty() || files.contains(&file) {
                    if let Some(dp) = depth_query(&filters, &schema.dp_thresholds)? {
                        dp_query = Some(dp);
                    }
                }
            }
        }
        ledger.superset(QueryParam::Info, "INFO is re-checked per file");
    }
    if let Some(value) = query.get(QueryParam::Format) {
        if single_file {
            for (name, filters) in parse_keyed_filters(value) {
                if name.is_empty() || name == sample {
                    if let Some(dp) = depth_query(&filters, &schema.dp_thresholds)? {
                        dp_query = Some(dp);
                    }
                }
            }
        }
        ledger.superset(QueryParam::Format, "FORMAT is re-checked per sample");
    }
    if dp_query.is_some() {
        mask |= DP_MASK;
    }

    let mut file_query = SampleFileIndexQuery::empty(sample);
    if mask != EMPTY_MASK {
        let (qual_min, qual_max) = qual_query
            .as_ref()
            .map(|q| (q.min_code_inclusive, q.max_code_exclusive))
            .unwrap_or((0, 1));
        let (dp_min, dp_max) = dp_query
            .as_ref()
            .map(|q| (q.min_code_inclusive, q.max_code_exclusive))
            .unwrap_or((0, 1));
        if type_codes.is_empty() {
            type_codes.insert(0);
        }
        for type_code in &type_codes {
            for qual in qual_min..qual_max {
                for dp in dp_min..dp_max {
                    let code = file::compose(filter_pass, *type_code, qual, dp);
                    file_query.valid_file_index[code as usize] = true;
                }
            }
        }
    }
    file_query.file_index_mask = mask;
    file_query.qual_query = qual_query;
    file_query.dp_query = dp_query;
    Ok(file_query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::file::{FileIndexEncoder, FileRecord};
    use crate::planner::coverage::Coverage;

    fn plan(query: &Query, files: &[&str]) -> (SampleFileIndexQuery, CoverageLedger) {
        let schema = IndexSchema::default();
        let files: Vec<String> = files.iter().map(|s| s.to_string()).collect();
        let mut ledger = CoverageLedger::new();
        let file_query = parse_file_query(query, "s1", &files, &schema, &mut ledger).unwrap();
        (file_query, ledger)
    }

    fn encode(filter: &str, qual: f64, dp: f64, t: VariantType) -> u8 {
        let schema = IndexSchema::default();
        FileIndexEncoder::new(&schema).encode(&FileRecord {
            filter: Some(filter.to_string()),
            qual: Some(qual),
            dp: Some(dp),
            variant_type: t,
        })
    }

    #[test]
    fn test_type_filter() {
        let query = Query::new().with(QueryParam::Type, "SNV,INDEL");
        let (fq, ledger) = plan(&query, &["f1"]);
        assert!(fq.accepts(encode("PASS", 50.0, 30.0, VariantType::Snv)));
        assert!(fq.accepts(encode("LowQual", 1.0, 1.0, VariantType::Indel)));
        assert!(!fq.accepts(encode("PASS", 50.0, 30.0, VariantType::Deletion)));
        assert_eq!(ledger.coverage(QueryParam::Type), Some(Coverage::Exact));
    }

    #[test]
    fn test_snp_only_type_filter_is_kept() {
        let query = Query::new().with(QueryParam::Type, "SNP");
        let (fq, ledger) = plan(&query, &["f1"]);
        assert!(fq.accepts(encode("PASS", 50.0, 30.0, VariantType::Snv)));
        assert!(matches!(
            ledger.coverage(QueryParam::Type),
            Some(Coverage::Superset(_))
        ));

        let query = Query::new().with(QueryParam::Type, "SNP,SNV");
        let (_, ledger) = plan(&query, &["f1"]);
        assert_eq!(ledger.coverage(QueryParam::Type), Some(Coverage::Exact));
    }

    #[test]
    fn test_other_type_code_is_kept() {
        let query = Query::new().with(QueryParam::Type, "INVERSION");
        let (_, ledger) = plan(&query, &["f1"]);
        assert!(matches!(
            ledger.coverage(QueryParam::Type),
            Some(Coverage::Superset(_))
        ));
    }

    #[test]
    fn test_filter_pass() {
        let query = Query::new().with(QueryParam::Filter, "PASS");
        let (fq, ledger) = plan(&query, &["f1"]);
        assert!(fq.accepts(encode("PASS", 5.0, 1.0, VariantType::Snv)));
        assert!(!fq.accepts(encode("LowQual", 5.0, 1.0, VariantType::Snv)));
        assert!(matches!(
            ledger.coverage(QueryParam::Filter),
            Some(Coverage::Superset(_))
        ));

        let query = Query::new().with(QueryParam::Filter, "!PASS");
        let (fq, _) = plan(&query, &["f1"]);
        assert!(!fq.accepts(encode("PASS", 5.0, 1.0, VariantType::Snv)));
        assert!(fq.accepts(encode("LowQual", 5.0, 1.0, VariantType::Snv)));
    }

    #[test]
    fn test_mixed_filter_is_not_indexed() {
        let query = Query::new().with(QueryParam::Filter, "PASS,LowQual");
        let (fq, _) = plan(&query, &["f1"]);
        assert!(fq.is_empty());

        let query = Query::new().with(QueryParam::Filter, "!LowQual");
        let (fq, _) = plan(&query, &["f1"]);
        assert!(fq.is_empty());

        let query = Query::new().with(QueryParam::Filter, "LowQual,LowDP");
        let (fq, _) = plan(&query, &["f1"]);
        assert_eq!(fq.file_index_mask, FILTER_PASS_MASK);
        assert!(!fq.accepts(encode("PASS", 5.0, 1.0, VariantType::Snv)));
    }

    #[test]
    fn test_qual_and_dp() {
        let query = Query::new()
            .with(QueryParam::Qual, ">=20")
            .with(QueryParam::Format, "s1:DP>=10;s2:DP<5");
        let (fq, _) = plan(&query, &["f1"]);
        assert_eq!(fq.file_index_mask, QUAL_MASK | DP_MASK);
        assert!(fq.accepts(encode("PASS", 25.0, 12.0, VariantType::Snv)));
        assert!(!fq.accepts(encode("PASS", 15.0, 12.0, VariantType::Snv)));
        assert!(!fq.accepts(encode("PASS", 25.0, 7.0, VariantType::Snv)));
    }

    #[test]
    fn test_dp_from_info_of_sample_file() {
        let query = Query::new().with(QueryParam::Info, "f1:DP>=20;f2:DP<5");
        let (fq, ledger) = plan(&query, &["f1"]);
        assert_eq!(fq.file_index_mask, DP_MASK);
        assert!(fq.accepts(encode("PASS", 25.0, 20.0, VariantType::Snv)));
        assert!(!fq.accepts(encode("PASS", 25.0, 3.0, VariantType::Snv)));
        assert!(matches!(
            ledger.coverage(QueryParam::Info),
            Some(Coverage::Superset(_))
        ));
    }

    #[test]
    fn test_multi_file_sample_skips_file_fields() {
        let query = Query::new()
            .with(QueryParam::Filter, "PASS")
            .with(QueryParam::Qual, ">30")
            .with(QueryParam::Type, "SNV");
        let (fq, _) = plan(&query, &["f1", "f2"]);
        assert_eq!(fq.file_index_mask, TYPE_MASK);
        assert!(fq.accepts(encode("LowQual", 1.0, 1.0, VariantType::Snv)));
    }

    #[test]
    fn test_invalid_qual() {
        let schema = IndexSchema::default();
        let query = Query::new().with(QueryParam::Qual, ">abc");
        let mut ledger = CoverageLedger::new();
        assert!(parse_file_query(&query, "s1", &[], &schema, &mut ledger).is_err());
    }
}
